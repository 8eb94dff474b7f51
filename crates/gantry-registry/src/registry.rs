use std::sync::Mutex;

use crate::handle::Handle;

pub(crate) struct Slot<E> {
    pub(crate) generation: u32,
    pub(crate) entry: Option<E>,
}

/// Slot arena shared by both registry flavors. All access goes through the
/// owning registry's mutex.
pub(crate) struct Slots<E> {
    slots: Vec<Slot<E>>,
    free: Vec<u32>,
}

impl<E> Default for Slots<E> {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
        }
    }
}

impl<E> Slots<E> {
    pub(crate) fn insert(&mut self, entry: E) -> Handle {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.entry = Some(entry);
            return Handle::new(index, slot.generation);
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 1,
            entry: Some(entry),
        });
        Handle::new(index, 1)
    }

    pub(crate) fn take(&mut self, handle: Handle) -> Option<E> {
        let slot = self.slot_mut(handle)?;
        let entry = slot.entry.take()?;
        // retire the generation so the removed handle can never match again;
        // wrap past u32::MAX back to 1 to keep raw handles nonzero
        slot.generation = slot.generation.checked_add(1).unwrap_or(1);
        self.free.push(handle.slot());
        Some(entry)
    }

    pub(crate) fn get(&self, handle: Handle) -> Option<&E> {
        let slot = self.slots.get(handle.slot() as usize)?;
        if slot.generation != handle.generation() {
            return None;
        }
        slot.entry.as_ref()
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    fn slot_mut(&mut self, handle: Handle) -> Option<&mut Slot<E>> {
        let slot = self.slots.get_mut(handle.slot() as usize)?;
        if slot.generation != handle.generation() {
            return None;
        }
        Some(slot)
    }
}

/// Registry mapping opaque handles to owned resources.
///
/// `put` hands out a process-unique handle, `remove` is the only way to take
/// ownership back, and `with` gives scoped non-owning access. A stale or
/// forged handle always misses; operations are linearizable under the
/// registry lock. Dropping the registry drops every remaining resource.
pub struct HandleRegistry<T> {
    inner: Mutex<Slots<T>>,
}

impl<T> Default for HandleRegistry<T> {
    fn default() -> Self {
        Self {
            inner: Mutex::new(Slots::default()),
        }
    }
}

impl<T> HandleRegistry<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, resource: T) -> Handle {
        self.inner
            .lock()
            .expect("handle registry poisoned")
            .insert(resource)
    }

    /// Removes the resource, transferring ownership to the caller. A second
    /// remove of the same handle returns `None`, never the resource again.
    pub fn remove(&self, handle: Handle) -> Option<T> {
        self.inner
            .lock()
            .expect("handle registry poisoned")
            .take(handle)
    }

    /// Scoped non-owning access; the registry keeps custody.
    pub fn with<R>(&self, handle: Handle, f: impl FnOnce(&T) -> R) -> Option<R> {
        let inner = self.inner.lock().expect("handle registry poisoned");
        inner.get(handle).map(f)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("handle registry poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> std::fmt::Debug for HandleRegistry<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandleRegistry")
            .field("entries", &self.len())
            .finish()
    }
}
