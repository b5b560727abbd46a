//! Client configuration loaded from environment variables.

use crate::errors::{ClientError, Result};

#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the PolloPollo REST API.
    pub api_base_url: String,
    /// Bearer token for authenticated endpoints; listing endpoints work without it.
    pub bearer_token: Option<String>,
    /// Number of applications fetched per page.
    pub batch_size: u32,
    /// Timeout for every outbound HTTP request.
    pub http_timeout_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Config {
            api_base_url: env_var("API_BASE_URL")
                .unwrap_or_else(|_| "https://api.pollopollo.org/api".to_string()),
            bearer_token: env_var("BEARER_TOKEN").ok(),
            batch_size: parse_batch_size(
                &env_var("BATCH_SIZE").unwrap_or_else(|_| "20".to_string()),
            )?,
            http_timeout_secs: env_var("HTTP_TIMEOUT_SECS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .map_err(|_| ClientError::Config("Invalid HTTP_TIMEOUT_SECS".to_string()))?,
        })
    }
}

/// A page must hold at least one application; zero would make every page
/// count calculation meaningless.
fn parse_batch_size(raw: &str) -> Result<u32> {
    match raw.parse() {
        Ok(n) if n >= 1 => Ok(n),
        _ => Err(ClientError::Config("Invalid BATCH_SIZE".to_string())),
    }
}

fn env_var(key: &str) -> Result<String> {
    std::env::var(key).map_err(|_| ClientError::Config(format!("Missing env var: {key}")))
}
