use anyhow::Context;
use dotenvy::dotenv;
use serde::Deserialize;
use std::env;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => anyhow::bail!("LOG_FORMAT must be 'text' or 'json', got '{}'", other),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub database_url: String,
    pub database_max_connections: u32,
    pub redis_url: Option<String>,
    pub order_service_url: Option<String>,
    pub ledger_max_attempts: u32,
    pub wallet_cache_ttl_secs: u64,
    pub wallet_cache_prefetch: bool,
    pub cache_timeout_ms: u64,
    pub log_format: LogFormat,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv().ok(); // Load .env file if present

        let ledger_max_attempts: u32 = parse_var("LEDGER_MAX_ATTEMPTS", "3")?;
        if ledger_max_attempts == 0 {
            anyhow::bail!("LEDGER_MAX_ATTEMPTS must be at least 1");
        }

        Ok(Config {
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            database_max_connections: parse_var("DATABASE_MAX_CONNECTIONS", "5")?,
            redis_url: optional_var("REDIS_URL"),
            order_service_url: optional_var("ORDER_SERVICE_URL"),
            ledger_max_attempts,
            wallet_cache_ttl_secs: parse_var("WALLET_CACHE_TTL_SECS", "7200")?,
            wallet_cache_prefetch: parse_bool(
                &env::var("WALLET_CACHE_PREFETCH").unwrap_or_else(|_| "true".to_string()),
            )
            .context("WALLET_CACHE_PREFETCH")?,
            cache_timeout_ms: parse_var("CACHE_TIMEOUT_MS", "250")?,
            log_format: parse_var("LOG_FORMAT", "text")?,
        })
    }

    pub fn wallet_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.wallet_cache_ttl_secs)
    }

    pub fn cache_timeout(&self) -> Duration {
        Duration::from_millis(self.cache_timeout_ms)
    }
}

/// Unset and blank both mean "not configured".
fn optional_var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_var<T>(name: &str, default: &str) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    raw.trim()
        .parse::<T>()
        .map_err(|e| anyhow::anyhow!("invalid {}='{}': {}", name, raw, e))
}

fn parse_bool(raw: &str) -> anyhow::Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => anyhow::bail!("expected a boolean, got '{}'", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bool_accepts_common_spellings() {
        assert!(parse_bool("TRUE").unwrap());
        assert!(parse_bool(" on ").unwrap());
        assert!(!parse_bool("0").unwrap());
        assert!(parse_bool("maybe").is_err());
    }

    #[test]
    fn test_log_format_parse() {
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("text".parse::<LogFormat>().unwrap(), LogFormat::Text);
        assert!("xml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn test_parse_var_falls_back_to_default() {
        let attempts: u32 = parse_var("WALLET_LEDGER_TEST_UNSET_VAR", "3").unwrap();
        assert_eq!(attempts, 3);
        assert!(parse_var::<u32>("WALLET_LEDGER_TEST_UNSET_VAR", "three").is_err());
    }
}
