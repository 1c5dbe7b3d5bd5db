//! Sqlite-backed inventory service: the equipment catalog the consultation
//! reads from and the tables a finalized quote is written to.

pub mod connection;
pub mod fixtures;
pub mod migrations;
pub mod repositories;

pub use connection::{connect, connect_from_config, connect_with_settings, ping, DbPool};
pub use fixtures::{DemoCatalog, SeedResult, VerificationResult};
pub use repositories::{InMemoryInventoryService, RepositoryError, SqlInventoryService};
