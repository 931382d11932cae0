//! Lock access that survives a panicked holder.
//!
//! Every guarded value in this crate is replaced whole (tables, engine
//! state, cache maps), so a poisoned lock still holds a usable value.

use std::sync::{Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::warn;

fn recover<G>(op: &'static str, poisoned: PoisonError<G>) -> G {
    warn!(op, "Lock poisoned by a panicked holder, continuing");
    poisoned.into_inner()
}

pub(crate) trait RwLockExt<T> {
    fn read_or_recover(&self, op: &'static str) -> RwLockReadGuard<'_, T>;
    fn write_or_recover(&self, op: &'static str) -> RwLockWriteGuard<'_, T>;
}

impl<T> RwLockExt<T> for RwLock<T> {
    fn read_or_recover(&self, op: &'static str) -> RwLockReadGuard<'_, T> {
        self.read().unwrap_or_else(|e| recover(op, e))
    }

    fn write_or_recover(&self, op: &'static str) -> RwLockWriteGuard<'_, T> {
        self.write().unwrap_or_else(|e| recover(op, e))
    }
}

pub(crate) trait MutexExt<T> {
    fn lock_or_recover(&self, op: &'static str) -> MutexGuard<'_, T>;
}

impl<T> MutexExt<T> for Mutex<T> {
    fn lock_or_recover(&self, op: &'static str) -> MutexGuard<'_, T> {
        self.lock().unwrap_or_else(|e| recover(op, e))
    }
}
