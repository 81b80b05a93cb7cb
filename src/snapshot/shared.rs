// Thread-safe snapshot handle.
//
// The payload/version pair is committed under one mutex so it always moves
// together. The version is mirrored into an `AtomicI64` so readers can poll
// it without taking the lock. Racing writers each bump the version exactly
// once; the surviving payload is whichever writer committed last.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::{PatchError, Snapshot};
use crate::delta::Delta;

/// A `Snapshot` shareable across threads (`Arc<SharedSnapshot>`).
#[derive(Debug)]
pub struct SharedSnapshot {
    inner: Mutex<Snapshot>,
    version: AtomicI64,
}

impl SharedSnapshot {
    pub fn new(snapshot: Snapshot) -> Self {
        Self {
            version: AtomicI64::new(snapshot.version()),
            inner: Mutex::new(snapshot),
        }
    }

    // Snapshot methods never leave a half-committed state behind, so a
    // poisoned lock still guards consistent data.
    fn lock(&self) -> MutexGuard<'_, Snapshot> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current version, read without locking.
    #[inline]
    pub fn version(&self) -> i64 {
        self.version.load(Ordering::Acquire)
    }

    /// Copy of the current payload.
    pub fn data(&self) -> Option<Vec<u8>> {
        self.lock().data().map(<[u8]>::to_vec)
    }

    /// Copy of the whole snapshot.
    pub fn snapshot(&self) -> Snapshot {
        self.lock().clone()
    }

    pub fn change_data(&self, new: &[u8]) -> Delta {
        let mut guard = self.lock();
        let delta = guard.change_data(new);
        self.version.store(guard.version(), Ordering::Release);
        delta
    }

    pub fn clear_data(&self) -> Delta {
        let mut guard = self.lock();
        let delta = guard.clear_data();
        self.version.store(guard.version(), Ordering::Release);
        delta
    }

    pub fn increment_data(&self, delta: &Delta, forced: bool) -> Result<(), PatchError> {
        let mut guard = self.lock();
        guard.increment_data(delta, forced)?;
        self.version.store(guard.version(), Ordering::Release);
        Ok(())
    }

    pub fn into_inner(self) -> Snapshot {
        self.inner.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}

impl From<Snapshot> for SharedSnapshot {
    fn from(snapshot: Snapshot) -> Self {
        Self::new(snapshot)
    }
}
