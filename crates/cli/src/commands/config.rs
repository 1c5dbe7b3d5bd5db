use std::env;
use std::fs;
use std::path::Path;

use livequote_core::config::{AppConfig, LoadOptions};
use secrecy::ExposeSecret;
use toml::Value;

struct ConfigField {
    key: &'static str,
    env_key: &'static str,
    value: String,
}

impl ConfigField {
    fn new(key: &'static str, env_key: &'static str, value: impl Into<String>) -> Self {
        Self { key, env_key, value: value.into() }
    }
}

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = AppConfig::resolved_path(None);
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for field in effective_fields(&config) {
        let source = field_source(
            field.key,
            field.env_key,
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(render_line(field.key, &field.value, source));
    }

    lines.join("\n")
}

fn effective_fields(config: &AppConfig) -> Vec<ConfigField> {
    let api_key = config
        .llm
        .api_key
        .as_ref()
        .map_or_else(|| "<unset>".to_string(), |key| redact_secret(key.expose_secret()));

    vec![
        ConfigField::new("database.url", "LIVEQUOTE_DATABASE_URL", config.database.url.as_str()),
        ConfigField::new(
            "database.max_connections",
            "LIVEQUOTE_DATABASE_MAX_CONNECTIONS",
            config.database.max_connections.to_string(),
        ),
        ConfigField::new(
            "database.timeout_secs",
            "LIVEQUOTE_DATABASE_TIMEOUT_SECS",
            config.database.timeout_secs.to_string(),
        ),
        ConfigField::new(
            "llm.provider",
            "LIVEQUOTE_LLM_PROVIDER",
            format!("{:?}", config.llm.provider),
        ),
        ConfigField::new("llm.model", "LIVEQUOTE_LLM_MODEL", config.llm.model.as_str()),
        ConfigField::new(
            "llm.base_url",
            "LIVEQUOTE_LLM_BASE_URL",
            config.llm.base_url.as_deref().unwrap_or("<unset>"),
        ),
        ConfigField::new("llm.api_key", "LIVEQUOTE_LLM_API_KEY", api_key),
        ConfigField::new(
            "llm.timeout_secs",
            "LIVEQUOTE_LLM_TIMEOUT_SECS",
            config.llm.timeout_secs.to_string(),
        ),
        ConfigField::new(
            "llm.max_retries",
            "LIVEQUOTE_LLM_MAX_RETRIES",
            config.llm.max_retries.to_string(),
        ),
        ConfigField::new(
            "quote.tax_rate",
            "LIVEQUOTE_QUOTE_TAX_RATE",
            config.quote.tax_rate.to_string(),
        ),
        ConfigField::new(
            "quote.currency",
            "LIVEQUOTE_QUOTE_CURRENCY",
            config.quote.currency.as_str(),
        ),
        ConfigField::new(
            "quote.llm_can_set_prices",
            "LIVEQUOTE_QUOTE_LLM_CAN_SET_PRICES",
            config.quote.llm_can_set_prices.to_string(),
        ),
        ConfigField::new(
            "stream.heartbeat_secs",
            "LIVEQUOTE_STREAM_HEARTBEAT_SECS",
            config.stream.heartbeat_secs.to_string(),
        ),
        ConfigField::new(
            "stream.session_queue_depth",
            "LIVEQUOTE_STREAM_SESSION_QUEUE_DEPTH",
            config.stream.session_queue_depth.to_string(),
        ),
        ConfigField::new(
            "server.bind_address",
            "LIVEQUOTE_SERVER_BIND_ADDRESS",
            config.server.bind_address.as_str(),
        ),
        ConfigField::new("server.port", "LIVEQUOTE_SERVER_PORT", config.server.port.to_string()),
        ConfigField::new(
            "server.graceful_shutdown_secs",
            "LIVEQUOTE_SERVER_GRACEFUL_SHUTDOWN_SECS",
            config.server.graceful_shutdown_secs.to_string(),
        ),
        ConfigField::new(
            "logging.level",
            "LIVEQUOTE_LOGGING_LEVEL",
            config.logging.level.as_str(),
        ),
        ConfigField::new(
            "logging.format",
            "LIVEQUOTE_LOGGING_FORMAT",
            format!("{:?}", config.logging.format),
        ),
    ]
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_key: &str,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if env::var_os(env_key).is_some() {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

/// Keeps a key's vendor prefix (`sk-`) and hides the rest.
fn redact_secret(secret: &str) -> String {
    let trimmed = secret.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    if let Some((prefix, _)) = trimmed.split_once('-') {
        return format!("{prefix}-***");
    }

    "<redacted>".to_string()
}
