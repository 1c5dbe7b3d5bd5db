use rust_decimal::Decimal;
use serde_json::json;
use sqlx::Executor;

use livequote_core::{Equipment, EquipmentId};

use crate::connection::DbPool;
use crate::repositories::RepositoryError;

/// Seed contract for the demo catalog: one row per fixture item.
const SEED_EQUIPMENT: &[SeedEquipmentContract] = &[
    SeedEquipmentContract {
        id: "eq-qsc-k12-2",
        name: "QSC K12.2 Active Speaker",
        category: "Speakers",
        base_price: 899,
        power_rating: Some(1000),
    },
    SeedEquipmentContract {
        id: "eq-shure-sm58",
        name: "Shure SM58 Dynamic Microphone",
        category: "Microphones",
        base_price: 129,
        power_rating: None,
    },
    SeedEquipmentContract {
        id: "eq-yamaha-mg16xu",
        name: "Yamaha MG16XU Mixer",
        category: "Mixers",
        base_price: 399,
        power_rating: None,
    },
    SeedEquipmentContract {
        id: "eq-crown-xti-2002",
        name: "Crown XTi 2002 Amplifier",
        category: "Amplifiers",
        base_price: 549,
        power_rating: Some(800),
    },
];

const SEED_CATEGORY_IDS: &[&str] =
    &["cat-speakers", "cat-microphones", "cat-mixers", "cat-amplifiers"];

/// Demo equipment catalog: speakers, microphones, mixers, amplifiers.
pub struct DemoCatalog;

impl DemoCatalog {
    pub const SQL: &str = include_str!("../../../config/fixtures/demo_catalog.sql");

    /// Loads (or refreshes) the demo catalog.
    pub async fn load(pool: &DbPool) -> Result<SeedResult, RepositoryError> {
        let mut tx = pool.begin().await?;
        tx.execute(sqlx::query(Self::SQL)).await?;
        tx.commit().await?;

        Ok(SeedResult {
            categories_seeded: SEED_CATEGORY_IDS.len(),
            equipment_seeded: SEED_EQUIPMENT.iter().map(|item| item.id).collect(),
        })
    }

    /// The same catalog as in-memory values, for services that never touch sqlite.
    pub fn equipment() -> Vec<Equipment> {
        SEED_EQUIPMENT
            .iter()
            .map(|item| Equipment {
                id: EquipmentId::new(item.id),
                name: item.name.to_owned(),
                category: item.category.to_owned(),
                base_price: Decimal::from(item.base_price),
                power_rating: item.power_rating,
                specifications: Some(json!({})),
                available: true,
            })
            .collect()
    }

    /// Verify that seed data exists and matches the contract.
    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        let mut checks = Vec::new();

        for item in SEED_EQUIPMENT {
            let matches: i64 = sqlx::query_scalar(
                "SELECT EXISTS(
                     SELECT 1 FROM equipment e JOIN categories c ON c.id = e.category_id
                     WHERE e.id = ?1 AND e.name = ?2 AND c.name = ?3 AND e.base_price = ?4
                       AND e.available = 1)",
            )
            .bind(item.id)
            .bind(item.name)
            .bind(item.category)
            .bind(item.base_price.to_string())
            .fetch_one(pool)
            .await?;
            checks.push((item.id, matches == 1));
        }

        let categories: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(1) FROM categories WHERE id IN {}",
            sql_array_from_ids(SEED_CATEGORY_IDS)
        ))
        .fetch_one(pool)
        .await?;
        checks.push(("categories", categories == SEED_CATEGORY_IDS.len() as i64));

        let all_present = checks.iter().all(|(_, present)| *present);
        Ok(VerificationResult { all_present, checks })
    }

    /// Removes the demo catalog. Fails if finalized quotes still reference it.
    pub async fn clean(pool: &DbPool) -> Result<(), RepositoryError> {
        let ids = SEED_EQUIPMENT.iter().map(|item| item.id).collect::<Vec<_>>();
        let mut tx = pool.begin().await?;
        sqlx::query(&format!("DELETE FROM equipment WHERE id IN {}", sql_array_from_ids(&ids)))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!(
            "DELETE FROM categories WHERE id IN {}",
            sql_array_from_ids(SEED_CATEGORY_IDS)
        ))
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
struct SeedEquipmentContract {
    id: &'static str,
    name: &'static str,
    category: &'static str,
    base_price: i64,
    power_rating: Option<u32>,
}

fn sql_array_from_ids(ids: &[&str]) -> String {
    let quoted = ids.iter().map(|id| format!("'{id}'")).collect::<Vec<_>>().join(",");
    format!("({quoted})")
}

#[derive(Debug)]
pub struct SeedResult {
    pub categories_seeded: usize,
    pub equipment_seeded: Vec<&'static str>,
}

#[derive(Debug)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}
