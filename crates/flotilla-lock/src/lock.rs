//! TableLock — expiring mutual exclusion over an atomic key/value table.
//!
//! One row per lock id, stamped with the acquisition time. `acquire` is a
//! single conditional write: create the row if absent, or re-stamp it if
//! the existing stamp has expired. Any storage engine with an atomic
//! conditional-write primitive can stand in behind the `DistributedLock`
//! trait; this implementation uses a redb table (one write transaction per
//! attempt).

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, error, info};

use crate::error::{LockError, LockResult};

/// Lock entries keyed by `{lock_id}`.
const LOCKS: TableDefinition<&str, &[u8]> = TableDefinition::new("locks");

/// Convert any `Display` error into a `LockError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| LockError::$variant(e.to_string())
    };
}

/// A persisted lock row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LockEntry {
    pub lock_id: String,
    /// Unix timestamp (nanoseconds) of the last successful acquisition.
    pub acquired_at_nanos: i64,
}

/// Cross-process mutual exclusion keyed by lock id.
pub trait DistributedLock: Send + Sync {
    /// Try to take the lock. `Ok(false)` means another holder has it —
    /// contention is an expected outcome, not an error.
    fn acquire(&self, lock_id: &str) -> LockResult<bool>;

    /// Drop the lock. Releasing a lock that does not exist is fine.
    fn release(&self, lock_id: &str) -> LockResult<()>;
}

/// redb-backed `DistributedLock` with a fixed expiry window.
#[derive(Clone)]
pub struct TableLock {
    db: Arc<Database>,
    expiry: Duration,
}

impl TableLock {
    /// Open (or create) a persistent lock table at the given path.
    pub fn open(path: &Path, expiry: Duration) -> LockResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let lock = Self {
            db: Arc::new(db),
            expiry,
        };
        lock.ensure_table()?;
        debug!(?path, "lock table opened");
        Ok(lock)
    }

    /// Create an ephemeral in-memory lock table (for testing).
    pub fn open_in_memory(expiry: Duration) -> LockResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let lock = Self {
            db: Arc::new(db),
            expiry,
        };
        lock.ensure_table()?;
        Ok(lock)
    }

    fn ensure_table(&self) -> LockResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        txn.open_table(LOCKS).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// List all lock rows (held and expired alike).
    pub fn list(&self) -> LockResult<Vec<LockEntry>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(LOCKS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let entry: LockEntry =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(entry);
        }
        Ok(results)
    }

    /// Release every lock whose stamp predates `now - expiry`. Returns the
    /// released ids. Safety net independent of any holder's liveness.
    pub fn release_expired(&self) -> LockResult<Vec<String>> {
        let cutoff = now_nanos() - self.expiry.as_nanos() as i64;
        let stale: Vec<String> = self
            .list()?
            .into_iter()
            .filter(|e| e.acquired_at_nanos < cutoff)
            .map(|e| e.lock_id)
            .collect();

        for lock_id in &stale {
            self.release(lock_id)?;
            info!(%lock_id, "expired lock released");
        }

        Ok(stale)
    }
}

impl DistributedLock for TableLock {
    fn acquire(&self, lock_id: &str) -> LockResult<bool> {
        let now = now_nanos();
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let acquired;
        {
            let mut table = txn.open_table(LOCKS).map_err(map_err!(Table))?;
            let existing = table
                .get(lock_id)
                .map_err(map_err!(Read))?
                .map(|guard| guard.value().to_vec());

            let stealable = match existing {
                None => true,
                Some(bytes) => {
                    let entry: LockEntry =
                        serde_json::from_slice(&bytes).map_err(map_err!(Deserialize))?;
                    // Only a stale stamp may be overwritten.
                    now - entry.acquired_at_nanos > self.expiry.as_nanos() as i64
                }
            };

            if stealable {
                let entry = LockEntry {
                    lock_id: lock_id.to_string(),
                    acquired_at_nanos: now,
                };
                let value = serde_json::to_vec(&entry).map_err(map_err!(Serialize))?;
                table
                    .insert(lock_id, value.as_slice())
                    .map_err(map_err!(Write))?;
            }
            acquired = stealable;
        }
        txn.commit().map_err(map_err!(Transaction))?;

        debug!(%lock_id, acquired, "lock acquisition attempted");
        Ok(acquired)
    }

    fn release(&self, lock_id: &str) -> LockResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(LOCKS).map_err(map_err!(Table))?;
            // Deleting a row that never existed is not an error.
            table.remove(lock_id).map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%lock_id, "lock released");
        Ok(())
    }
}

/// Background loop that releases expired locks on an interval.
///
/// Runs alongside the acquirers as a cleanup safety net: if a holder dies
/// without releasing, its lock becomes reusable after the expiry window
/// even if no new acquirer ever contends for it.
pub struct LockSweeper {
    lock: TableLock,
}

impl LockSweeper {
    pub fn new(lock: TableLock) -> Self {
        Self { lock }
    }

    /// Run the sweep loop until the shutdown signal fires.
    pub async fn run(&self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        info!(interval_secs = interval.as_secs(), "lock sweeper started");
        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    match self.lock.release_expired() {
                        Ok(released) if !released.is_empty() => {
                            info!(count = released.len(), "swept expired locks");
                        }
                        Ok(_) => {}
                        Err(e) => error!(error = %e, "lock sweep failed"),
                    }
                }
                _ = shutdown.changed() => {
                    info!("lock sweeper shutting down");
                    break;
                }
            }
        }
    }
}

/// Current Unix epoch in nanoseconds.
fn now_nanos() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_lock(expiry: Duration) -> TableLock {
        TableLock::open_in_memory(expiry).unwrap()
    }

    #[test]
    fn acquire_fresh_lock() {
        let lock = test_lock(Duration::from_secs(3600));
        assert!(lock.acquire("scaler").unwrap());
    }

    #[test]
    fn acquire_fails_on_contention() {
        let lock = test_lock(Duration::from_secs(3600));
        assert!(lock.acquire("scaler").unwrap());
        assert!(!lock.acquire("scaler").unwrap());
    }

    #[test]
    fn acquire_after_release() {
        let lock = test_lock(Duration::from_secs(3600));
        assert!(lock.acquire("scaler").unwrap());
        lock.release("scaler").unwrap();
        assert!(lock.acquire("scaler").unwrap());
    }

    #[test]
    fn acquire_after_expiry() {
        let lock = test_lock(Duration::from_nanos(1));
        assert!(lock.acquire("scaler").unwrap());
        std::thread::sleep(Duration::from_millis(5));
        assert!(lock.acquire("scaler").unwrap());
    }

    #[test]
    fn release_when_does_not_exist() {
        let lock = test_lock(Duration::from_secs(3600));
        lock.release("never-acquired").unwrap();
    }

    #[test]
    fn locks_are_discrete() {
        let lock = test_lock(Duration::from_secs(3600));
        for i in 0..10 {
            let lock_id = format!("lock-{i}");
            assert!(lock.acquire(&lock_id).unwrap());
        }
        // Each id is still held independently.
        for i in 0..10 {
            let lock_id = format!("lock-{i}");
            assert!(!lock.acquire(&lock_id).unwrap());
        }
    }

    #[tokio::test]
    async fn concurrent_acquire_yields_one_winner() {
        let lock = std::sync::Arc::new(test_lock(Duration::from_secs(3600)));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let lock = lock.clone();
            handles.push(tokio::task::spawn_blocking(move || {
                lock.acquire("contended").unwrap()
            }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[test]
    fn release_expired_sweeps_only_stale_entries() {
        let lock = test_lock(Duration::from_millis(10));
        assert!(lock.acquire("stale").unwrap());
        std::thread::sleep(Duration::from_millis(25));
        assert!(lock.acquire("fresh").unwrap());

        let released = lock.release_expired().unwrap();
        assert_eq!(released, vec!["stale".to_string()]);

        // The stale id is reusable again; the fresh one is still held.
        assert!(lock.acquire("stale").unwrap());
        assert!(!lock.acquire("fresh").unwrap());
    }

    #[test]
    fn list_reports_all_rows() {
        let lock = test_lock(Duration::from_secs(3600));
        lock.acquire("a").unwrap();
        lock.acquire("b").unwrap();

        let entries = lock.list().unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|e| e.acquired_at_nanos > 0));
    }

    #[test]
    fn persistent_lock_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("locks.redb");

        {
            let lock = TableLock::open(&path, Duration::from_secs(3600)).unwrap();
            assert!(lock.acquire("scaler").unwrap());
        }

        let lock = TableLock::open(&path, Duration::from_secs(3600)).unwrap();
        assert!(!lock.acquire("scaler").unwrap());
    }
}
