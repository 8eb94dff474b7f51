use std::sync::Mutex;

use crate::handle::Handle;
use crate::registry::Slots;

/// Registry variant that stores an owned side payload next to each resource,
/// atomically with insertion.
///
/// `remove` hands both back so the caller can operate on the resource and,
/// on downstream failure, re-insert the pair instead of leaking the entry.
pub struct PayloadHandleRegistry<T, P> {
    inner: Mutex<Slots<(T, P)>>,
}

impl<T, P> Default for PayloadHandleRegistry<T, P> {
    fn default() -> Self {
        Self {
            inner: Mutex::new(Slots::default()),
        }
    }
}

impl<T, P> PayloadHandleRegistry<T, P> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, resource: T, payload: P) -> Handle {
        self.inner
            .lock()
            .expect("payload handle registry poisoned")
            .insert((resource, payload))
    }

    pub fn remove(&self, handle: Handle) -> Option<(T, P)> {
        self.inner
            .lock()
            .expect("payload handle registry poisoned")
            .take(handle)
    }

    /// Scoped non-owning access to the resource; payload stays put.
    pub fn with<R>(&self, handle: Handle, f: impl FnOnce(&T) -> R) -> Option<R> {
        let inner = self.inner.lock().expect("payload handle registry poisoned");
        inner.get(handle).map(|(resource, _)| f(resource))
    }

    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .expect("payload handle registry poisoned")
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T, P> std::fmt::Debug for PayloadHandleRegistry<T, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PayloadHandleRegistry")
            .field("entries", &self.len())
            .finish()
    }
}
