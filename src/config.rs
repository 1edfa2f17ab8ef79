//! Runtime configuration loaded from environment variables.
//!
//! A `.env` file in the working directory is honoured when present.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use tracing::info;

use crate::error::{Error, Result};
use crate::retry::RetryPolicy;

/// Store and server settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// `DATABASE_URL`
    pub database_url: String,
    /// `KICKROLL_DB_MAX_CONNECTIONS` (default 10)
    pub max_connections: u32,
    /// `KICKROLL_DB_MIN_CONNECTIONS` (default 2)
    pub min_connections: u32,
    /// `KICKROLL_DB_CONNECT_TIMEOUT_SECS` (default 10)
    pub connect_timeout: Duration,
    /// `KICKROLL_DB_ACQUIRE_TIMEOUT_SECS` (default 10)
    ///
    /// How long a request waits for a pooled connection once connected.
    pub acquire_timeout: Duration,
    /// `KICKROLL_TXN_MAX_ATTEMPTS` / `KICKROLL_TXN_BACKOFF_MS` (default 5 / 10)
    pub retry: RetryPolicy,
    /// `KICKROLL_AUDIT_QUEUE` (default 1024)
    pub audit_queue_capacity: usize,
    /// `KICKROLL_BIND_ADDR` (default `127.0.0.1:3000`)
    pub bind_addr: String,
}

impl StoreConfig {
    /// Reads the configuration, loading `.env` first.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL")
            .filter(|url| !url.is_empty())
            .ok_or_else(|| Error::Config("DATABASE_URL must be set".into()))?;

        let defaults = RetryPolicy::default();
        let max_attempts = parse_or(&lookup, "KICKROLL_TXN_MAX_ATTEMPTS", defaults.max_attempts)?;
        let backoff_ms = parse_or(
            &lookup,
            "KICKROLL_TXN_BACKOFF_MS",
            u64::try_from(defaults.backoff.as_millis()).unwrap_or(10),
        )?;

        Ok(Self {
            database_url,
            max_connections: parse_or(&lookup, "KICKROLL_DB_MAX_CONNECTIONS", 10)?,
            min_connections: parse_or(&lookup, "KICKROLL_DB_MIN_CONNECTIONS", 2)?,
            connect_timeout: Duration::from_secs(parse_or(
                &lookup,
                "KICKROLL_DB_CONNECT_TIMEOUT_SECS",
                10,
            )?),
            acquire_timeout: Duration::from_secs(parse_or(
                &lookup,
                "KICKROLL_DB_ACQUIRE_TIMEOUT_SECS",
                10,
            )?),
            retry: RetryPolicy::new(max_attempts, Duration::from_millis(backoff_ms)),
            audit_queue_capacity: parse_or(&lookup, "KICKROLL_AUDIT_QUEUE", 1024)?,
            bind_addr: lookup("KICKROLL_BIND_ADDR").unwrap_or_else(|| "127.0.0.1:3000".into()),
        })
    }

    /// Opens a pooled Sea-ORM connection.
    pub async fn connect(&self) -> Result<DatabaseConnection> {
        let mut opt = ConnectOptions::new(self.database_url.clone());
        opt.max_connections(self.max_connections)
            .min_connections(self.min_connections.min(self.max_connections))
            .connect_timeout(self.connect_timeout)
            .acquire_timeout(self.acquire_timeout)
            .sqlx_logging(false);

        let conn = Database::connect(opt).await?;
        info!(max_connections = self.max_connections, "connected to database");
        Ok(conn)
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|_| Error::Config(format!("{key} must be a number, got {raw:?}"))),
        _ => Ok(default),
    }
}
