//! Opaque-handle registries for natively-owned resources.
//!
//! Resources created on one side of the call boundary are referenced from the
//! other side through opaque integer handles. A handle is a slot index paired
//! with a generation counter, so a stale handle misses after its resource is
//! removed even if the slot is reused for a new resource. Removing an entry
//! is the only way to take ownership back out; dropping a registry drops
//! every remaining resource exactly once.

mod handle;
mod payload;
mod registry;

pub use handle::Handle;
pub use payload::PayloadHandleRegistry;
pub use registry::HandleRegistry;
