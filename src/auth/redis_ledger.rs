//! Redis-backed nonce ledger for multi-instance deployments.
//!
//! Each nonce is a key written with `SET key 1 NX EX <ttl>`. Redis applies
//! the set-if-absent atomically, so concurrent instances agree on a single
//! winner, and the key's expiry replaces local purging.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use tracing::info;

use super::nonce::{NONCE_TTL_SECS, NonceLedger};
use crate::error::{AppError, AppResult};

/// Connection settings for [`RedisNonceLedger`].
#[derive(Debug, Clone)]
pub struct RedisLedgerConfig {
    pub url: String,
    /// Prepended to every nonce key.
    pub prefix: String,
    /// Bound on connecting and on every command.
    pub timeout: Duration,
}

impl RedisLedgerConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }
}

impl Default for RedisLedgerConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
            prefix: "privacy-inspector:nonce:".to_string(),
            timeout: Duration::from_secs(2),
        }
    }
}

/// Nonce ledger shared by every instance pointing at the same Redis.
#[derive(Clone)]
pub struct RedisNonceLedger {
    conn: MultiplexedConnection,
    config: RedisLedgerConfig,
}

impl std::fmt::Debug for RedisNonceLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisNonceLedger")
            .field("prefix", &self.config.prefix)
            .finish_non_exhaustive()
    }
}

impl RedisNonceLedger {
    /// Open a multiplexed connection and verify it with `PING`.
    ///
    /// # Errors
    ///
    /// `ConfigError` for an unparseable URL, `StoreUnavailable` when Redis
    /// cannot be reached within the timeout.
    pub async fn connect(config: RedisLedgerConfig) -> AppResult<Self> {
        let client = redis::Client::open(config.url.as_str())
            .map_err(|e| AppError::ConfigError(format!("invalid REDIS_URL: {e}")))?;

        let conn = tokio::time::timeout(config.timeout, client.get_multiplexed_async_connection())
            .await
            .map_err(|_| AppError::StoreUnavailable("timed out connecting to Redis".into()))?
            .map_err(store_error)?;

        let ledger = Self { conn, config };
        ledger.ping().await?;

        info!(prefix = %ledger.config.prefix, "Connected to Redis nonce store");
        Ok(ledger)
    }

    fn key(&self, nonce: &str) -> String {
        format!("{}{nonce}", self.config.prefix)
    }

    async fn run<T: redis::FromRedisValue>(&self, cmd: &redis::Cmd) -> AppResult<T> {
        let mut conn = self.conn.clone();
        tokio::time::timeout(self.config.timeout, cmd.query_async(&mut conn))
            .await
            .map_err(|_| AppError::StoreUnavailable("Redis command timed out".into()))?
            .map_err(store_error)
    }
}

fn store_error(e: redis::RedisError) -> AppError {
    AppError::StoreUnavailable(e.to_string())
}

#[async_trait]
impl NonceLedger for RedisNonceLedger {
    async fn consume(&self, nonce: &str) -> AppResult<bool> {
        let mut cmd = redis::cmd("SET");
        cmd.arg(self.key(nonce))
            .arg(1)
            .arg("NX")
            .arg("EX")
            .arg(NONCE_TTL_SECS);

        // "OK" when the key was set, nil when it already existed.
        let reply: Option<String> = self.run(&cmd).await?;
        Ok(reply.is_some())
    }

    async fn purge_expired(&self) -> AppResult<usize> {
        // Redis expires keys itself.
        Ok(0)
    }

    async fn ping(&self) -> AppResult<()> {
        let _: String = self.run(&redis::cmd("PING")).await?;
        Ok(())
    }

    fn entries(&self) -> Option<usize> {
        None
    }

    fn backend(&self) -> &'static str {
        "redis"
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RedisLedgerConfig::new("redis://cache:6379/2");
        assert_eq!(config.url, "redis://cache:6379/2");
        assert_eq!(config.prefix, "privacy-inspector:nonce:");
        assert_eq!(config.timeout, Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_invalid_url_is_config_error() {
        let result = RedisNonceLedger::connect(RedisLedgerConfig::new("not a url")).await;
        assert!(matches!(result, Err(AppError::ConfigError(_))));
    }

    #[tokio::test]
    async fn test_unreachable_store_is_unavailable() {
        let config = RedisLedgerConfig {
            timeout: Duration::from_millis(500),
            // Port 1 on loopback refuses connections.
            ..RedisLedgerConfig::new("redis://127.0.0.1:1")
        };
        let result = RedisNonceLedger::connect(config).await;
        assert!(matches!(result, Err(AppError::StoreUnavailable(_))));
    }
}
