//! Service configuration.
//!
//! Secrets come from the environment or, when unset, from Docker secret
//! files under `/run/secrets`.

use anyhow::{anyhow, Context, Result};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::espn::DEFAULT_BASE_URL;
use crate::retry::RetryPolicy;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub redis_url: String,
    pub leagues_config: PathBuf,
    pub report_dir: PathBuf,
    pub espn_base_url: String,
    pub fetch_retry: RetryPolicy,
    pub fetch_timeout: Duration,
    pub requests_per_second: u32,
    /// If true, run one scheduled cycle and exit
    pub run_once: bool,
    pub run_interval_seconds: u64,
    pub health_port: u16,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup; `from_env` passes the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let database_url = match lookup("DATABASE_URL") {
            Some(v) if !v.trim().is_empty() => v,
            Some(_) => return Err(anyhow!("DATABASE_URL is set but empty")),
            None => {
                let db_user = lookup("DB_USER").unwrap_or_else(|| "espn".to_string());
                let db_name = lookup("DB_NAME").unwrap_or_else(|| "espn".to_string());
                let db_host = lookup("DB_HOST").unwrap_or_else(|| "postgres".to_string());
                let db_port = lookup("DB_PORT").unwrap_or_else(|| "5432".to_string());
                let db_password = read_secret_file("/run/secrets/db_password", "db_password")?;
                format!("postgresql://{}:{}@{}:{}/{}", db_user, db_password, db_host, db_port, db_name)
            }
        };

        let redis_url = match lookup("REDIS_URL") {
            Some(v) if !v.trim().is_empty() => v,
            Some(_) => return Err(anyhow!("REDIS_URL is set but empty")),
            None => {
                let redis_password = read_secret_file("/run/secrets/redis_password", "redis_password")?;
                format!("redis://:{}@redis:6379", redis_password)
            }
        };

        let fetch_retry = RetryPolicy {
            max_attempts: parse_or(&lookup, "FETCH_MAX_ATTEMPTS", 5)?,
            base_backoff: Duration::from_millis(parse_or(&lookup, "FETCH_BACKOFF_MS", 1000)?),
            multiplier: parse_or(&lookup, "FETCH_BACKOFF_MULTIPLIER", 5)?,
            max_backoff: Duration::from_millis(parse_or(&lookup, "FETCH_MAX_BACKOFF_MS", 60_000)?),
        };
        if fetch_retry.max_attempts == 0 {
            return Err(anyhow!("FETCH_MAX_ATTEMPTS must be at least 1"));
        }

        Ok(Self {
            database_url,
            redis_url,
            leagues_config: lookup("LEAGUES_CONFIG")
                .unwrap_or_else(|| "config/leagues.json".to_string())
                .into(),
            report_dir: lookup("REPORT_DIR").unwrap_or_else(|| "reports".to_string()).into(),
            espn_base_url: lookup("ESPN_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            fetch_retry,
            fetch_timeout: Duration::from_secs(parse_or(&lookup, "FETCH_TIMEOUT_SECONDS", 30)?),
            requests_per_second: parse_or(&lookup, "REQUESTS_PER_SECOND", 2)?,
            run_once: lookup("RUN_ONCE")
                .unwrap_or_else(|| "false".to_string())
                .to_lowercase()
                == "true",
            run_interval_seconds: parse_or(&lookup, "RUN_INTERVAL_SECONDS", 86_400)?,
            health_port: parse_or(&lookup, "HEALTH_PORT", 8084)?,
        })
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|e| anyhow!("{} has an invalid value {:?}: {}", key, raw, e)),
        _ => Ok(default),
    }
}

/// Read a secret from a Docker secret file
fn read_secret_file(file_path: &str, secret_name: &str) -> Result<String> {
    std::fs::read_to_string(file_path)
        .map(|s| s.trim().to_string())
        .context(format!(
            "Secret file not found at {} ({}). Set the variable or mount the secret.",
            file_path, secret_name
        ))
}
