pub mod audit;
pub mod config;
pub mod cpq;
pub mod domain;
pub mod errors;
pub mod flows;
pub mod inventory;
pub mod ledger;

pub use cpq::{CatalogSnapshot, LedgerTotals, PricingEngine, TaxRatePricing};
pub use domain::conversation::{
    ConversationTurn, ConversationType, OracleDetails, OracleReply, Recommendation,
    RecommendedEquipment, TurnKind, TurnRole,
};
pub use domain::equipment::{Equipment, EquipmentId};
pub use domain::quote::{
    DeltaAction, DeltaLine, FreshnessFlag, LedgerItem, LineAdjustment, LineRef, QuoteDelta,
};
pub use domain::session::{ClientInfo, ConsultationContext, SessionId, SpaceDetails, UsageType};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use flows::{ConversationState, FlowEngine};
pub use inventory::{FinalizeRequest, FinalizedQuote, InventoryError, InventoryService};
pub use ledger::{LedgerError, LedgerSnapshot, LiveQuoteLedger, MergeOutcome, SnapshotItem};
