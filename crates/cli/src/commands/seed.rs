use livequote_db::{connect_from_config, migrations, DemoCatalog};

use crate::commands::{prepare, CommandResult};

pub fn run() -> CommandResult {
    let (config, runtime) = match prepare("seed") {
        Ok(prepared) => prepared,
        Err(failure) => return failure,
    };

    let result = runtime.block_on(async {
        let pool = connect_from_config(&config.database)
            .await
            .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;

        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), 5u8))?;

        let seeded = DemoCatalog::load(&pool)
            .await
            .map_err(|error| ("seed_execution", error.to_string(), 5u8))?;

        let verification = DemoCatalog::verify(&pool)
            .await
            .map_err(|error| ("seed_verification", error.to_string(), 6u8))?;

        let run_result = if verification.all_present {
            Ok(seeded)
        } else {
            let failed = verification
                .checks
                .iter()
                .filter_map(|(check, present)| (!present).then_some(*check))
                .collect::<Vec<_>>();
            Err(("seed_verification", verification_failure_message(&failed), 6u8))
        };

        pool.close().await;
        run_result
    });

    match result {
        Ok(seeded) => {
            let items = seeded
                .equipment_seeded
                .iter()
                .map(|id| format!("  - {id}"))
                .collect::<Vec<_>>()
                .join("\n");
            CommandResult::success(
                "seed",
                format!(
                    "demo catalog loaded: {} categories, {} equipment items:\n{items}",
                    seeded.categories_seeded,
                    seeded.equipment_seeded.len()
                ),
            )
        }
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("seed", error_class, message, exit_code)
        }
    }
}

fn verification_failure_message(failed_checks: &[&str]) -> String {
    if failed_checks.is_empty() {
        "Some seed data failed to load".to_string()
    } else {
        format!("Seed verification failed for checks: {}", failed_checks.join(", "))
    }
}
