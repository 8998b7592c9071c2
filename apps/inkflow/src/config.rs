use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::llm_client::local::DEFAULT_SERVER_URL;

/// Host configuration loaded from environment variables (and `.env` when present).
/// Every variable is optional.
#[derive(Debug, Clone)]
pub struct Config {
    /// JSON file backing the key-value store.
    pub state_path: PathBuf,
    pub model_server_url: String,
    /// Model to load instead of the last-used one.
    pub model_id: Option<String>,
    pub load_timeout: Option<Duration>,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Ok(Config {
            state_path: optional_env("INKFLOW_STATE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("inkflow_state.json")),
            model_server_url: optional_env("INKFLOW_MODEL_SERVER")
                .unwrap_or_else(|| DEFAULT_SERVER_URL.to_string()),
            model_id: optional_env("INKFLOW_MODEL"),
            load_timeout: parse_timeout_secs(optional_env("INKFLOW_LOAD_TIMEOUT_SECS"))
                .context("INKFLOW_LOAD_TIMEOUT_SECS must be a whole number of seconds")?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        })
    }
}

/// Set and non-blank, trimmed.
fn optional_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_timeout_secs(raw: Option<String>) -> Result<Option<Duration>> {
    raw.map(|v| v.parse::<u64>().map(Duration::from_secs))
        .transpose()
        .map_err(Into::into)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_absent() {
        assert_eq!(parse_timeout_secs(None).unwrap(), None);
    }

    #[test]
    fn test_timeout_parsed() {
        assert_eq!(
            parse_timeout_secs(Some("90".to_string())).unwrap(),
            Some(Duration::from_secs(90))
        );
    }

    #[test]
    fn test_timeout_invalid() {
        assert!(parse_timeout_secs(Some("soon".to_string())).is_err());
    }
}
