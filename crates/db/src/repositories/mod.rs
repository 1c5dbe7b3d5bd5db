use livequote_core::InventoryError;
use thiserror::Error;

pub mod inventory;
pub mod memory;
pub mod quote;

pub use inventory::SqlInventoryService;
pub use memory::{InMemoryInventoryService, StoredQuote};
pub use quote::generate_quote_number;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("rejected: {0}")]
    Rejected(String),
}

impl From<RepositoryError> for InventoryError {
    fn from(value: RepositoryError) -> Self {
        match value {
            RepositoryError::Rejected(message) => Self::Rejected(message),
            other => Self::Storage(other.to_string()),
        }
    }
}

fn decode(error: impl std::fmt::Display) -> RepositoryError {
    RepositoryError::Decode(error.to_string())
}

/// Checks that apply to every backend before a quote is persisted.
pub(crate) fn check_finalizable(
    request: &livequote_core::FinalizeRequest,
) -> Result<(), RepositoryError> {
    if request.quote.items.is_empty() {
        return Err(RepositoryError::Rejected("an empty quote cannot be finalized".to_owned()));
    }
    if request.client.name.trim().is_empty() {
        return Err(RepositoryError::Rejected("client name is required".to_owned()));
    }
    if !request.client.email.contains('@') {
        return Err(RepositoryError::Rejected(format!(
            "client email `{}` is not valid",
            request.client.email
        )));
    }
    Ok(())
}
