use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use livequote_core::{
    CatalogSnapshot, ClientInfo, Equipment, FinalizeRequest, FinalizedQuote, InventoryError,
    InventoryService,
};

use super::{check_finalizable, generate_quote_number, RepositoryError};

/// A finalized quote as the in-memory service keeps it.
#[derive(Clone, Debug, PartialEq)]
pub struct StoredQuote {
    pub finalized: FinalizedQuote,
    pub client_id: String,
    pub request: FinalizeRequest,
}

#[derive(Default)]
pub struct InMemoryInventoryService {
    equipment: RwLock<Vec<Equipment>>,
    clients: RwLock<HashMap<String, (String, ClientInfo)>>,
    quotes: RwLock<Vec<StoredQuote>>,
}

impl InMemoryInventoryService {
    pub fn new(equipment: Vec<Equipment>) -> Self {
        Self { equipment: RwLock::new(equipment), ..Self::default() }
    }

    pub async fn quotes(&self) -> Vec<StoredQuote> {
        self.quotes.read().await.clone()
    }

    pub async fn client_count(&self) -> usize {
        self.clients.read().await.len()
    }
}

#[async_trait]
impl InventoryService for InMemoryInventoryService {
    async fn list_equipment(&self) -> Result<CatalogSnapshot, InventoryError> {
        let equipment = self.equipment.read().await;
        Ok(CatalogSnapshot::new(equipment.iter().filter(|item| item.available).cloned().collect()))
    }

    async fn finalize_quote(
        &self,
        request: &FinalizeRequest,
    ) -> Result<FinalizedQuote, InventoryError> {
        check_finalizable(request)?;
        {
            let equipment = self.equipment.read().await;
            if let Some(missing) = request
                .quote
                .items
                .iter()
                .find(|line| !equipment.iter().any(|item| item.id == line.item.equipment_id))
            {
                return Err(RepositoryError::Rejected(format!(
                    "equipment not found: {}",
                    missing.item.equipment_id
                ))
                .into());
            }
        }

        let client_id = {
            let mut clients = self.clients.write().await;
            clients
                .entry(request.client.email.clone())
                .or_insert_with(|| (Uuid::new_v4().to_string(), request.client.clone()))
                .0
                .clone()
        };

        let finalized = FinalizedQuote {
            quote_id: Uuid::new_v4().to_string(),
            quote_number: generate_quote_number(Utc::now()),
        };
        self.quotes.write().await.push(StoredQuote {
            finalized: finalized.clone(),
            client_id,
            request: request.clone(),
        });
        Ok(finalized)
    }
}
