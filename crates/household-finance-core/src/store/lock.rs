//! Advisory locks serializing mutations against the shared store.
//!
//! One named lock per mutation scope ("loans", "expenses"). Acquisition
//! blocks up to a bounded wait and then fails retryably instead of
//! deadlocking; the guard releases on every exit path via Drop.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::lock_api::ArcMutexGuard;
use parking_lot::{Mutex, RawMutex};

use crate::error::LedgerError;
use crate::LedgerResult;

#[derive(Default)]
pub struct LockRegistry {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

/// Held for the duration of a mutating operation. Releases on drop.
pub struct LockGuard {
    _guard: ArcMutexGuard<RawMutex, ()>,
}

impl std::fmt::Debug for LockGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockGuard").finish_non_exhaustive()
    }
}

impl LockRegistry {
    pub fn new() -> Self {
        LockRegistry::default()
    }

    /// Acquire the named lock, waiting at most `timeout`.
    pub fn acquire(&self, key: &str, timeout: Duration) -> LedgerResult<LockGuard> {
        let slot = {
            let mut locks = self.locks.lock();
            locks
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        match slot.try_lock_arc_for(timeout) {
            Some(guard) => Ok(LockGuard { _guard: guard }),
            None => Err(LedgerError::LockTimeout {
                key: key.to_string(),
                waited_ms: timeout.as_millis() as u64,
            }),
        }
    }
}
