use livequote_core::config::{AppConfig, LlmProvider, LoadOptions};
use livequote_core::InventoryService;
use livequote_db::{connect_from_config, migrations, ping, DbPool, SqlInventoryService};
use serde::Serialize;

use crate::commands::CommandResult;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

impl DoctorCheck {
    fn pass(name: &'static str, details: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Pass, details: details.into() }
    }

    fn fail(name: &'static str, details: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Fail, details: details.into() }
    }

    fn skipped(name: &'static str, reason: &str) -> Self {
        Self { name, status: CheckStatus::Skipped, details: format!("skipped because {reason}") }
    }
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

/// Exits 0 when every check passes and 1 otherwise.
pub fn run(json_output: bool) -> CommandResult {
    let report = build_report();
    let exit_code = if report.overall_status == CheckStatus::Pass { 0 } else { 1 };

    let output = if json_output {
        serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        })
    } else {
        render_human(&report)
    };

    CommandResult { exit_code, output }
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck::pass(
                "config_validation",
                "configuration loaded and validated",
            ));
            checks.push(check_llm_settings(&config));
            checks.extend(check_database(&config));
        }
        Err(error) => {
            let reason = "configuration did not load";
            checks.push(DoctorCheck::fail("config_validation", error.to_string()));
            checks.push(DoctorCheck::skipped("llm_settings", reason));
            checks.push(DoctorCheck::skipped("database_connectivity", reason));
            checks.push(DoctorCheck::skipped("migration_status", reason));
            checks.push(DoctorCheck::skipped("catalog_readiness", reason));
        }
    }

    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_llm_settings(config: &AppConfig) -> DoctorCheck {
    let endpoint = match config.llm.provider {
        LlmProvider::OpenAi => config.llm.base_url.as_deref().unwrap_or("https://api.openai.com"),
        LlmProvider::Ollama => config.llm.base_url.as_deref().unwrap_or("<unset>"),
    };
    DoctorCheck::pass(
        "llm_settings",
        format!(
            "{:?} model `{}` via {endpoint} (timeout {}s, {} retries)",
            config.llm.provider, config.llm.model, config.llm.timeout_secs, config.llm.max_retries
        ),
    )
}

fn check_database(config: &AppConfig) -> Vec<DoctorCheck> {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            let reason = "the async runtime failed to start";
            return vec![
                DoctorCheck::fail(
                    "database_connectivity",
                    format!("failed to initialize async runtime: {error}"),
                ),
                DoctorCheck::skipped("migration_status", reason),
                DoctorCheck::skipped("catalog_readiness", reason),
            ];
        }
    };

    runtime.block_on(async {
        let pool = match connect_from_config(&config.database).await {
            Ok(pool) => pool,
            Err(error) => {
                let reason = "the database is unreachable";
                return vec![
                    DoctorCheck::fail(
                        "database_connectivity",
                        format!("failed to connect to database: {error}"),
                    ),
                    DoctorCheck::skipped("migration_status", reason),
                    DoctorCheck::skipped("catalog_readiness", reason),
                ];
            }
        };

        let mut checks = Vec::new();
        checks.push(match ping(&pool).await {
            Ok(()) => DoctorCheck::pass(
                "database_connectivity",
                format!("connected using `{}`", config.database.url),
            ),
            Err(error) => {
                DoctorCheck::fail("database_connectivity", format!("query failed: {error}"))
            }
        });

        let migrated = match migrations::status(&pool).await {
            Ok(status) if status.is_current() => {
                checks.push(DoctorCheck::pass(
                    "migration_status",
                    format!("{} of {} migrations applied", status.applied, status.known),
                ));
                true
            }
            Ok(status) => {
                checks.push(DoctorCheck::fail(
                    "migration_status",
                    format!(
                        "{} of {} migrations applied; run `livequote migrate`",
                        status.applied, status.known
                    ),
                ));
                false
            }
            Err(error) => {
                checks.push(DoctorCheck::fail("migration_status", error.to_string()));
                false
            }
        };

        if migrated {
            checks.push(check_catalog(&pool).await);
        } else {
            checks.push(DoctorCheck::skipped("catalog_readiness", "migrations are not current"));
        }

        pool.close().await;
        checks
    })
}

async fn check_catalog(pool: &DbPool) -> DoctorCheck {
    match SqlInventoryService::new(pool.clone()).list_equipment().await {
        Ok(catalog) if catalog.is_empty() => DoctorCheck::fail(
            "catalog_readiness",
            "no available equipment; run `livequote seed` or load a catalog",
        ),
        Ok(catalog) => DoctorCheck::pass(
            "catalog_readiness",
            format!("{} equipment items available", catalog.len()),
        ),
        Err(error) => DoctorCheck::fail("catalog_readiness", error.to_string()),
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
