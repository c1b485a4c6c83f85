//! Single-use nonce ledger for replay rejection.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use super::clock::Clock;
use crate::error::AppResult;

/// How long a consumed nonce blocks reuse (5 minutes).
pub const NONCE_TTL_SECS: i64 = 300;

/// Records consumed nonces.
///
/// `consume` must be atomic per nonce: among any number of concurrent calls
/// with the same value inside the TTL window, exactly one returns `true`.
#[async_trait]
pub trait NonceLedger: Send + Sync {
    /// Record `nonce`, returning `true` on first use and `false` on replay.
    ///
    /// # Errors
    ///
    /// Returns `AppError::StoreUnavailable` when a remote store cannot
    /// answer. Callers must treat that as a rejection.
    async fn consume(&self, nonce: &str) -> AppResult<bool>;

    /// Drop entries older than the TTL, returning how many were removed.
    async fn purge_expired(&self) -> AppResult<usize>;

    /// Check that the backing store answers.
    async fn ping(&self) -> AppResult<()> {
        Ok(())
    }

    /// Number of entries held locally, if the backend can tell cheaply.
    fn entries(&self) -> Option<usize>;

    /// Backend name for health reporting.
    fn backend(&self) -> &'static str;
}

/// Process-local ledger guarded by a mutex.
///
/// Entries are purged lazily on every `consume` and by the periodic sweep
/// task. State is lost on restart, and each instance has its own ledger.
#[derive(Debug)]
pub struct InMemoryNonceLedger {
    /// nonce -> first-seen time (Unix seconds)
    seen: Mutex<HashMap<String, i64>>,
    clock: Arc<dyn Clock>,
    ttl_secs: i64,
}

impl InMemoryNonceLedger {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            seen: Mutex::new(HashMap::new()),
            clock,
            ttl_secs: NONCE_TTL_SECS,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, i64>> {
        // A panic while holding the lock cannot leave the map half-updated.
        self.seen.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn purge_locked(&self, seen: &mut HashMap<String, i64>, now: i64) -> usize {
        let before = seen.len();
        seen.retain(|_, first_seen| now - *first_seen <= self.ttl_secs);
        before - seen.len()
    }
}

#[async_trait]
impl NonceLedger for InMemoryNonceLedger {
    async fn consume(&self, nonce: &str) -> AppResult<bool> {
        let now = self.clock.now();
        let mut seen = self.lock();

        self.purge_locked(&mut seen, now);

        if seen.contains_key(nonce) {
            return Ok(false);
        }
        seen.insert(nonce.to_owned(), now);
        Ok(true)
    }

    async fn purge_expired(&self) -> AppResult<usize> {
        let now = self.clock.now();
        let mut seen = self.lock();
        Ok(self.purge_locked(&mut seen, now))
    }

    fn entries(&self) -> Option<usize> {
        Some(self.lock().len())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

/// Ledger whose store never answers, for outage tests.
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct UnreachableNonceLedger;

#[cfg(test)]
#[async_trait]
impl NonceLedger for UnreachableNonceLedger {
    async fn consume(&self, _nonce: &str) -> AppResult<bool> {
        Err(crate::error::AppError::StoreUnavailable("connection refused".to_string()))
    }

    async fn purge_expired(&self) -> AppResult<usize> {
        Ok(0)
    }

    async fn ping(&self) -> AppResult<()> {
        Err(crate::error::AppError::StoreUnavailable("connection refused".to_string()))
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
    use crate::auth::clock::ManualClock;

    fn ledger() -> (InMemoryNonceLedger, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(1_700_000_000));
        (InMemoryNonceLedger::new(clock.clone()), clock)
    }

    #[tokio::test]
    async fn test_first_use_accepted_second_rejected() {
        let (ledger, _) = ledger();
        assert!(ledger.consume("n1").await.unwrap());
        assert!(!ledger.consume("n1").await.unwrap());
        assert!(ledger.consume("n2").await.unwrap());
    }

    #[tokio::test]
    async fn test_reuse_allowed_after_ttl() {
        let (ledger, clock) = ledger();
        assert!(ledger.consume("n1").await.unwrap());

        clock.advance(NONCE_TTL_SECS);
        assert!(!ledger.consume("n1").await.unwrap(), "still inside window");

        clock.advance(1);
        assert!(ledger.consume("n1").await.unwrap());
    }

    #[tokio::test]
    async fn test_purge_expired_counts_removed() {
        let (ledger, clock) = ledger();
        ledger.consume("old-1").await.unwrap();
        ledger.consume("old-2").await.unwrap();
        clock.advance(200);
        ledger.consume("fresh").await.unwrap();

        clock.advance(150);
        assert_eq!(ledger.purge_expired().await.unwrap(), 2);
        assert_eq!(ledger.entries(), Some(1));
    }

    #[tokio::test]
    async fn test_concurrent_identical_nonce_accepted_once() {
        let (ledger, _) = ledger();
        let ledger = Arc::new(ledger);

        let handles: Vec<_> = (0..64)
            .map(|_| {
                let ledger = Arc::clone(&ledger);
                tokio::spawn(async move { ledger.consume("abc-123").await.unwrap() })
            })
            .collect();

        let mut accepted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                accepted += 1;
            }
        }
        assert_eq!(accepted, 1);
    }

    #[test]
    fn test_backend_name() {
        let (ledger, _) = ledger();
        assert_eq!(ledger.backend(), "memory");
        assert_eq!(ledger.entries(), Some(0));
    }
}
