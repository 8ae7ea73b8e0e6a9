pub mod catalog;
pub mod live_tree;

pub use catalog::{Catalog, MessageFilter};
pub use live_tree::{LiveSession, LiveStore};

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Store state stays consistent even if a writer panicked mid-update.
pub(crate) fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
