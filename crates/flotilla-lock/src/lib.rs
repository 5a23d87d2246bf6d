//! flotilla-lock — cross-process mutual exclusion for periodic daemons.
//!
//! Redundant API replicas all run the same periodic work (scaler trigger,
//! janitors); the distributed lock guarantees at most one replica actually
//! executes it. The guarantee rests entirely on the backing table's atomic
//! conditional write (create-if-absent or update-if-expired), never on
//! in-process coordination.
//!
//! - [`TableLock`] — redb-backed `DistributedLock` with expiry
//! - [`LockSweeper`] — background loop releasing expired entries
//! - [`Daemon`] — "acquire lock, run work, release" wrapper with a ticker

pub mod daemon;
pub mod error;
pub mod lock;

pub use daemon::Daemon;
pub use error::{LockError, LockResult};
pub use lock::{DistributedLock, LockEntry, LockSweeper, TableLock};
