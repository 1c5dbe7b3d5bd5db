use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cpq::CatalogSnapshot;
use crate::domain::conversation::ConversationTurn;
use crate::domain::session::{ClientInfo, ConsultationContext, SessionId};
use crate::errors::ApplicationError;
use crate::ledger::LedgerSnapshot;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InventoryError {
    #[error("inventory storage failed: {0}")]
    Storage(String),
    #[error("quote cannot be finalized: {0}")]
    Rejected(String),
}

impl From<InventoryError> for ApplicationError {
    fn from(value: InventoryError) -> Self {
        match value {
            InventoryError::Storage(message) => Self::Persistence(message),
            InventoryError::Rejected(message) => {
                Self::Domain(crate::errors::DomainError::InvariantViolation(message))
            }
        }
    }
}

/// Everything needed to turn a live quote into a durable one.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalizeRequest {
    pub session_id: SessionId,
    pub quote: LedgerSnapshot,
    pub client: ClientInfo,
    pub context: ConsultationContext,
    pub transcript: Vec<ConversationTurn>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalizedQuote {
    pub quote_id: String,
    pub quote_number: String,
}

/// The external inventory service: the catalog source and the only place a
/// ledger crosses into durable storage.
#[async_trait]
pub trait InventoryService: Send + Sync {
    async fn list_equipment(&self) -> Result<CatalogSnapshot, InventoryError>;
    async fn finalize_quote(&self, request: &FinalizeRequest)
        -> Result<FinalizedQuote, InventoryError>;
}
