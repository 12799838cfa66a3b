//! The process-wide execution lock.
//!
//! Embedded script runtimes are single-threaded: whatever the size of the
//! worker pool, only one thread may be inside the runtime at any instant.
//! This module models that constraint as one process-wide token with a scoped
//! guard, the same discipline an interpreter lock imposes on its embedder.

use parking_lot::{Mutex, MutexGuard};

/// The single process-wide exclusion token.
static EXECUTION_TOKEN: Mutex<()> = Mutex::new(());

/// The process-wide mutual-exclusion token serializing all runtime entry.
///
/// At most one thread holds the token at any instant, independent of how
/// many workers or engines exist. Two contracts worth spelling out:
///
/// - **Not reentrant.** A thread that acquires while already holding the
///   token deadlocks. Acquire once per run.
/// - **Not fair.** The order in which blocked waiters acquire the token is
///   unspecified; there is no FIFO handoff. This matches the lock semantics
///   of the runtimes this engine is built to host.
pub struct GlobalExecutionLock;

impl GlobalExecutionLock {
    /// Block the calling thread until the token is free, then hold it.
    ///
    /// The token is released when the returned guard drops, on every exit
    /// path including unwinding.
    pub fn acquire() -> ExecutionGuard {
        ExecutionGuard {
            _token: EXECUTION_TOKEN.lock(),
        }
    }
}

/// Scoped proof that the calling thread holds the execution token.
///
/// The guard cannot be sent to another thread; the thread that acquired the
/// token is the thread that releases it.
pub struct ExecutionGuard {
    _token: MutexGuard<'static, ()>,
}
