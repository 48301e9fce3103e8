//! Server configuration from environment variables.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};

use linear_assistant_core::Budget;

pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8000";
pub const DEFAULT_LINEAR_API_URL: &str = "https://api.linear.app/graphql";
pub const DEFAULT_HUMANLAYER_API_BASE: &str = "https://api.humanlayer.dev/humanlayer/v1";
pub const DEFAULT_TEST_SENDER: &str = "overworked-admin@coolcompany.com";
pub const DEFAULT_CACHE_TTL_SECS: u64 = 120 * 60 * 60;

#[derive(Debug, Clone)]
pub struct Config {
    pub listen_addr: SocketAddr,
    pub linear_api_key: String,
    pub linear_api_url: String,
    pub humanlayer_api_key: String,
    pub humanlayer_api_base: String,
    pub redis_url: Option<String>,
    pub cache_ttl: Duration,
    /// Allowed senders (empty = allow all)
    pub allowed_source_emails: Vec<String>,
    /// Allowed recipients (empty = allow all)
    pub allowed_target_emails: Vec<String>,
    pub test_sender: String,
    pub budget: Budget,
    pub call_timeout: Duration,
    pub claude_bin: String,
    pub claude_model: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_vars(std::env::vars().collect())
    }

    /// Build from an explicit variable map.
    pub fn from_vars(vars: HashMap<String, String>) -> Result<Self> {
        let get = |key: &str| vars.get(key).map(|v| v.trim()).filter(|v| !v.is_empty());

        let listen_addr = get("LISTEN_ADDR")
            .unwrap_or(DEFAULT_LISTEN_ADDR)
            .parse()
            .context("Invalid LISTEN_ADDR")?;

        let linear_api_key = get("LINEAR_API_KEY")
            .context("LINEAR_API_KEY not set")?
            .to_string();

        // The key may be stored under an indirected variable name.
        let humanlayer_api_key = match get("HUMANLAYER_API_KEY_NAME") {
            Some(name) => get(name)
                .with_context(|| format!("{name} (from HUMANLAYER_API_KEY_NAME) not set"))?,
            None => get("HUMANLAYER_API_KEY").context("HUMANLAYER_API_KEY not set")?,
        }
        .to_string();

        let max_iterations = parse_or(get("MAX_ITERATIONS"), "MAX_ITERATIONS", Budget::default().max_iterations)?;
        let max_run_secs: u64 = parse_or(get("MAX_RUN_SECS"), "MAX_RUN_SECS", 600)?;
        let call_timeout_secs: u64 = parse_or(get("CALL_TIMEOUT_SECS"), "CALL_TIMEOUT_SECS", 180)?;
        let cache_ttl_secs: u64 =
            parse_or(get("CACHE_TTL_SECS"), "CACHE_TTL_SECS", DEFAULT_CACHE_TTL_SECS)?;

        Ok(Self {
            listen_addr,
            linear_api_key,
            linear_api_url: get("LINEAR_API_URL")
                .unwrap_or(DEFAULT_LINEAR_API_URL)
                .to_string(),
            humanlayer_api_key,
            humanlayer_api_base: get("HUMANLAYER_API_BASE")
                .unwrap_or(DEFAULT_HUMANLAYER_API_BASE)
                .trim_end_matches('/')
                .to_string(),
            redis_url: get("REDIS_URL").map(str::to_string),
            cache_ttl: Duration::from_secs(cache_ttl_secs),
            allowed_source_emails: parse_list(get("ALLOWED_SOURCE_EMAILS")),
            allowed_target_emails: parse_list(get("ALLOWED_TARGET_EMAILS")),
            test_sender: get("TEST_SENDER")
                .unwrap_or(DEFAULT_TEST_SENDER)
                .to_string(),
            budget: Budget {
                max_iterations,
                max_duration: (max_run_secs > 0).then(|| Duration::from_secs(max_run_secs)),
            },
            call_timeout: Duration::from_secs(call_timeout_secs),
            claude_bin: get("CLAUDE_BIN").unwrap_or("claude").to_string(),
            claude_model: get("CLAUDE_MODEL").map(str::to_string),
        })
    }
}

fn parse_or<T: std::str::FromStr>(value: Option<&str>, key: &str, default: T) -> Result<T> {
    match value {
        Some(v) => v.parse().ok().with_context(|| format!("Invalid {key}: {v}")),
        None => Ok(default),
    }
}

/// Parse a comma-separated list, dropping blanks.
pub fn parse_list(value: Option<&str>) -> Vec<String> {
    value
        .unwrap_or("")
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
