use std::str::FromStr;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::Row;
use uuid::Uuid;

use livequote_core::{
    CatalogSnapshot, Equipment, EquipmentId, FinalizeRequest, FinalizedQuote, InventoryError,
    InventoryService,
};

use super::{check_finalizable, decode, generate_quote_number, RepositoryError};
use crate::DbPool;

/// Inventory service over the sqlite catalog and quote tables.
pub struct SqlInventoryService {
    pool: DbPool,
}

impl SqlInventoryService {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn available_equipment(&self) -> Result<Vec<Equipment>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT e.id, e.name, c.name AS category, e.base_price, e.power_rating,
                    e.specifications, e.available
             FROM equipment e
             JOIN categories c ON c.id = e.category_id
             WHERE e.available = 1
             ORDER BY c.name, e.name",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_equipment).collect()
    }

    pub async fn persist(&self, request: &FinalizeRequest) -> Result<FinalizedQuote, RepositoryError> {
        check_finalizable(request)?;
        let now = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await?;

        for line in &request.quote.items {
            let known: i64 = sqlx::query("SELECT COUNT(*) AS count FROM equipment WHERE id = ?")
                .bind(line.item.equipment_id.as_str())
                .fetch_one(&mut *tx)
                .await?
                .try_get("count")
                .map_err(decode)?;
            if known == 0 {
                return Err(RepositoryError::Rejected(format!(
                    "equipment not found: {}",
                    line.item.equipment_id
                )));
            }
        }

        let existing: Option<String> = sqlx::query("SELECT id FROM clients WHERE email = ?")
            .bind(&request.client.email)
            .fetch_optional(&mut *tx)
            .await?
            .map(|row| row.try_get("id"))
            .transpose()
            .map_err(decode)?;
        let client_id = match existing {
            Some(client_id) => client_id,
            None => {
                let client_id = Uuid::new_v4().to_string();
                sqlx::query(
                    "INSERT INTO clients
                        (id, name, email, phone, company, address, created_at, updated_at)
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
                )
                .bind(&client_id)
                .bind(&request.client.name)
                .bind(&request.client.email)
                .bind(&request.client.phone)
                .bind(&request.client.company)
                .bind(&request.client.address)
                .bind(&now)
                .bind(&now)
                .execute(&mut *tx)
                .await?;
                client_id
            }
        };

        let requirements = serde_json::to_string(&request.context).map_err(decode)?;
        let transcript = serde_json::to_string(&request.transcript).map_err(decode)?;
        let finalized = FinalizedQuote {
            quote_id: Uuid::new_v4().to_string(),
            quote_number: generate_quote_number(Utc::now()),
        };
        sqlx::query(
            "INSERT INTO quotes
                (id, quote_number, client_id, session_id, usage_type, space_size, budget,
                 requirements, ai_conversation, subtotal, tax, total, tax_rate, currency, status,
                 created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 'draft', ?)",
        )
        .bind(&finalized.quote_id)
        .bind(&finalized.quote_number)
        .bind(&client_id)
        .bind(request.session_id.as_str())
        .bind(request.context.usage_type.as_str())
        .bind(&request.context.space_size)
        .bind(request.context.budget.map(|budget| budget.to_string()))
        .bind(requirements)
        .bind(transcript)
        .bind(request.quote.subtotal.to_string())
        .bind(request.quote.tax.to_string())
        .bind(request.quote.total.to_string())
        .bind(request.quote.tax_rate.to_string())
        .bind(&request.quote.currency)
        .bind(&now)
        .execute(&mut *tx)
        .await?;

        for line in &request.quote.items {
            sqlx::query(
                "INSERT INTO quote_items
                    (id, quote_id, equipment_id, quantity, unit_price, total_price,
                     installation_zone, reasoning)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(Uuid::new_v4().to_string())
            .bind(&finalized.quote_id)
            .bind(line.item.equipment_id.as_str())
            .bind(i64::from(line.item.quantity))
            .bind(line.item.unit_price.to_string())
            .bind(line.total_price.to_string())
            .bind(&line.item.installation_zone)
            .bind(&line.item.reasoning)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(finalized)
    }
}

fn row_to_equipment(row: &sqlx::sqlite::SqliteRow) -> Result<Equipment, RepositoryError> {
    let id: String = row.try_get("id").map_err(decode)?;
    let base_price: String = row.try_get("base_price").map_err(decode)?;
    let power_rating: Option<i64> = row.try_get("power_rating").map_err(decode)?;
    let specifications: Option<String> = row.try_get("specifications").map_err(decode)?;

    Ok(Equipment {
        base_price: Decimal::from_str(&base_price)
            .map_err(|error| decode(format!("equipment {id} base_price: {error}")))?,
        power_rating: power_rating
            .map(u32::try_from)
            .transpose()
            .map_err(|error| decode(format!("equipment {id} power_rating: {error}")))?,
        specifications: specifications
            .map(|raw| serde_json::from_str(&raw))
            .transpose()
            .map_err(|error| decode(format!("equipment {id} specifications: {error}")))?,
        name: row.try_get("name").map_err(decode)?,
        category: row.try_get("category").map_err(decode)?,
        available: row.try_get("available").map_err(decode)?,
        id: EquipmentId::new(id),
    })
}

#[async_trait]
impl InventoryService for SqlInventoryService {
    async fn list_equipment(&self) -> Result<CatalogSnapshot, InventoryError> {
        Ok(CatalogSnapshot::new(self.available_equipment().await?))
    }

    async fn finalize_quote(
        &self,
        request: &FinalizeRequest,
    ) -> Result<FinalizedQuote, InventoryError> {
        Ok(self.persist(request).await?)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use livequote_core::{
        ClientInfo, ConsultationContext, ConversationTurn, DeltaAction, DeltaLine, EquipmentId,
        FinalizeRequest, InventoryError, InventoryService, LiveQuoteLedger, QuoteDelta, SessionId,
        TaxRatePricing,
    };
    use rust_decimal::Decimal;
    use sqlx::Row;

    use super::SqlInventoryService;
    use crate::fixtures::DemoCatalog;
    use crate::{connect_with_settings, migrations, DbPool};

    async fn seeded_pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrate");
        DemoCatalog::load(&pool).await.expect("seed");
        pool
    }

    fn request(lines: &[(&str, u32, i64)], email: &str) -> FinalizeRequest {
        let ledger = LiveQuoteLedger::new(TaxRatePricing::default());
        let ledger = if lines.is_empty() {
            ledger
        } else {
            let delta = QuoteDelta::new(DeltaAction::Add(
                lines
                    .iter()
                    .map(|(id, quantity, price)| DeltaLine {
                        equipment_id: EquipmentId::new(*id),
                        name: (*id).to_owned(),
                        category: "Speakers".to_owned(),
                        quantity: *quantity,
                        unit_price: Decimal::new(*price, 0),
                        reasoning: Some("coverage".to_owned()),
                        installation_zone: Some("dining room".to_owned()),
                    })
                    .collect(),
            ));
            ledger.apply(&delta, Utc::now()).expect("valid delta").ledger
        };
        FinalizeRequest {
            session_id: SessionId::new("session_42"),
            quote: ledger.snapshot(),
            client: ClientInfo {
                name: "Sarah Johnson".to_owned(),
                email: email.to_owned(),
                company: Some("Downtown Bistro".to_owned()),
                ..ClientInfo::default()
            },
            context: ConsultationContext::default(),
            transcript: vec![ConversationTurn::user_answer("a bistro", Utc::now())],
        }
    }

    #[tokio::test]
    async fn list_joins_category_names_and_hides_unavailable_items() {
        let pool = seeded_pool().await;
        sqlx::query("UPDATE equipment SET available = 0 WHERE id = 'eq-yamaha-mg16xu'")
            .execute(&pool)
            .await
            .expect("mark unavailable");

        let catalog = SqlInventoryService::new(pool).list_equipment().await.expect("catalog");
        assert_eq!(catalog.len(), 3);
        assert!(!catalog.contains(&EquipmentId::new("eq-yamaha-mg16xu")));

        let speaker = catalog.find(&EquipmentId::new("eq-qsc-k12-2")).expect("speaker listed");
        assert_eq!(speaker.category, "Speakers");
        assert_eq!(speaker.base_price, Decimal::new(899, 0));
        assert_eq!(speaker.power_rating, Some(1000));
        assert!(speaker.specifications.is_some());
    }

    #[tokio::test]
    async fn finalize_persists_client_quote_and_items() {
        let pool = seeded_pool().await;
        let service = SqlInventoryService::new(pool.clone());

        let finalized = service
            .finalize_quote(&request(&[("eq-qsc-k12-2", 2, 899)], "sarah@bistro.test"))
            .await
            .expect("finalized");
        assert!(finalized.quote_number.starts_with("QT-"));

        let quote = sqlx::query(
            "SELECT status, subtotal, tax, total, currency, ai_conversation
             FROM quotes WHERE id = ?",
        )
        .bind(&finalized.quote_id)
        .fetch_one(&pool)
        .await
        .expect("quote row");
        assert_eq!(quote.get::<String, _>("status"), "draft");
        assert_eq!(quote.get::<String, _>("subtotal"), "1798");
        assert_eq!(quote.get::<String, _>("total"), "1941.84");
        assert_eq!(quote.get::<String, _>("currency"), "USD");
        let transcript: serde_json::Value =
            serde_json::from_str(&quote.get::<String, _>("ai_conversation")).expect("json");
        assert_eq!(transcript[0]["content"], "a bistro");

        let items = sqlx::query(
            "SELECT quantity, unit_price, total_price, installation_zone
             FROM quote_items WHERE quote_id = ?",
        )
        .bind(&finalized.quote_id)
        .fetch_all(&pool)
        .await
        .expect("item rows");
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].get::<i64, _>("quantity"), 2);
        assert_eq!(items[0].get::<String, _>("total_price"), "1798");
        assert_eq!(items[0].get::<Option<String>, _>("installation_zone").as_deref(), Some("dining room"));
    }

    #[tokio::test]
    async fn clients_are_upserted_by_email() {
        let pool = seeded_pool().await;
        let service = SqlInventoryService::new(pool.clone());

        for id in ["eq-shure-sm58", "eq-crown-xti-2002"] {
            service
                .finalize_quote(&request(&[(id, 1, 1)], "mike@techcorp.test"))
                .await
                .expect("finalized");
        }

        let clients: i64 = sqlx::query("SELECT COUNT(*) AS count FROM clients")
            .fetch_one(&pool)
            .await
            .expect("count")
            .get("count");
        let quotes: i64 = sqlx::query("SELECT COUNT(DISTINCT client_id) AS count FROM quotes")
            .fetch_one(&pool)
            .await
            .expect("count")
            .get("count");
        assert_eq!(clients, 1);
        assert_eq!(quotes, 1);
    }

    #[tokio::test]
    async fn rejected_finalization_writes_nothing() {
        let pool = seeded_pool().await;
        let service = SqlInventoryService::new(pool.clone());

        let empty = service.finalize_quote(&request(&[], "a@b.test")).await;
        assert!(matches!(empty, Err(InventoryError::Rejected(_))));

        let unknown = service
            .finalize_quote(&request(&[("eq-qsc-k12-2", 1, 899), ("eq-ghost", 1, 5)], "a@b.test"))
            .await;
        assert!(matches!(unknown, Err(InventoryError::Rejected(message)) if message.contains("eq-ghost")));

        let written: i64 = sqlx::query(
            "SELECT (SELECT COUNT(*) FROM clients) + (SELECT COUNT(*) FROM quotes) AS count",
        )
        .fetch_one(&pool)
        .await
        .expect("count")
        .get("count");
        assert_eq!(written, 0);
    }
}
