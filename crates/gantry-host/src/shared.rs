//! Process-wide blocking key/value store used for cross-callback
//! coordination between script contexts.

use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use serde::Deserialize;

use gantry_calls::{CallError, CallRegistry};

/// Shared map with a store-wide change notification.
///
/// Every mutation broadcasts on a single condition variable; waiters re-check
/// their own key/expected-value predicate after each wakeup, so wakeup
/// precision does not matter for correctness.
#[derive(Default)]
pub struct SharedStore {
    entries: Mutex<HashMap<String, String>>,
    changed: Condvar,
}

impl SharedStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, key: &str, value: &str) {
        let mut entries = self.entries.lock().expect("shared store poisoned");
        entries.insert(key.to_string(), value.to_string());
        self.changed.notify_all();
    }

    pub fn get(&self, key: &str) -> Option<String> {
        let entries = self.entries.lock().expect("shared store poisoned");
        entries.get(key).cloned()
    }

    /// Erases the entry; absence is not an error.
    pub fn remove(&self, key: &str) {
        let mut entries = self.entries.lock().expect("shared store poisoned");
        entries.remove(key);
        self.changed.notify_all();
    }

    /// Blocks until the value stored under `key` differs from `expected`, or
    /// the timeout elapses. Returns the new value, or `None` on timeout. A
    /// missing key is not a change; the waiter keeps waiting for a differing
    /// value to appear.
    pub fn wait_change(&self, key: &str, expected: &str, timeout: Duration) -> Option<String> {
        let deadline = Instant::now() + timeout;
        let mut entries = self.entries.lock().expect("shared store poisoned");
        loop {
            if let Some(value) = entries.get(key) {
                if value != expected {
                    return Some(value.clone());
                }
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            let (guard, _timeout_result) = self
                .changed
                .wait_timeout(entries, deadline - now)
                .expect("shared store poisoned");
            entries = guard;
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("shared store poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for SharedStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedStore")
            .field("entries", &self.len())
            .finish()
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
struct PutArgs {
    key: Option<String>,
    value: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
struct KeyArgs {
    key: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
struct WaitChangeArgs {
    key: Option<String>,
    current_value: Option<String>,
    timeout_millis: Option<i64>,
}

fn required(value: Option<String>, name: &'static str) -> Result<String, CallError> {
    match value {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(CallError::MissingParameter(name)),
    }
}

pub(crate) fn register(registry: &CallRegistry, store: Arc<SharedStore>) -> Result<(), CallError> {
    let shared = Arc::clone(&store);
    registry.register("shared_put", move |input| {
        let args: PutArgs = serde_json::from_slice(input)?;
        let key = required(args.key, "key")?;
        let value = required(args.value, "value")?;
        shared.put(&key, &value);
        Ok(b"{}".to_vec())
    })?;

    let shared = Arc::clone(&store);
    registry.register("shared_get", move |input| {
        let args: KeyArgs = serde_json::from_slice(input)?;
        let key = required(args.key, "key")?;
        // stored values are JSON documents; hand the bytes back verbatim,
        // empty when absent
        Ok(shared.get(&key).map(String::into_bytes).unwrap_or_default())
    })?;

    let shared = Arc::clone(&store);
    registry.register("shared_wait_change", move |input| {
        let args: WaitChangeArgs = serde_json::from_slice(input)?;
        let key = required(args.key, "key")?;
        let expected = required(args.current_value, "currentValue")?;
        let timeout_millis = args
            .timeout_millis
            .ok_or(CallError::MissingParameter("timeoutMillis"))?;
        if timeout_millis < 0 {
            return Err(CallError::invalid_parameter("timeoutMillis", timeout_millis));
        }
        let timeout = Duration::from_millis(timeout_millis as u64);
        Ok(shared
            .wait_change(&key, &expected, timeout)
            .map(String::into_bytes)
            .unwrap_or_default())
    })?;

    let shared = store;
    registry.register("shared_remove", move |input| {
        let args: KeyArgs = serde_json::from_slice(input)?;
        let key = required(args.key, "key")?;
        shared.remove(&key);
        Ok(b"{}".to_vec())
    })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn put_get_remove_round_trip() {
        let store = SharedStore::new();
        assert_eq!(store.get("k"), None);
        store.put("k", "v1");
        assert_eq!(store.get("k").as_deref(), Some("v1"));
        store.put("k", "v2");
        assert_eq!(store.get("k").as_deref(), Some("v2"));
        store.remove("k");
        assert_eq!(store.get("k"), None);
        store.remove("k");
    }

    #[test]
    fn waiter_wakes_on_change_well_before_timeout() {
        let store = Arc::new(SharedStore::new());
        store.put("k", "v1");

        let waiter_store = Arc::clone(&store);
        let waiter = thread::spawn(move || {
            let started = Instant::now();
            let value = waiter_store.wait_change("k", "v1", Duration::from_millis(5000));
            (value, started.elapsed())
        });

        thread::sleep(Duration::from_millis(50));
        store.put("k", "v2");

        let (value, elapsed) = waiter.join().unwrap();
        assert_eq!(value.as_deref(), Some("v2"));
        assert!(elapsed < Duration::from_millis(2000), "woke after {elapsed:?}");
    }

    #[test]
    fn wait_on_missing_key_times_out_after_the_full_timeout() {
        let store = SharedStore::new();
        let started = Instant::now();
        let value = store.wait_change("missing", "x", Duration::from_millis(100));
        let elapsed = started.elapsed();
        assert_eq!(value, None);
        assert!(elapsed >= Duration::from_millis(100), "returned after {elapsed:?}");
        assert!(elapsed < Duration::from_millis(1000), "returned after {elapsed:?}");
    }

    #[test]
    fn already_changed_value_returns_immediately() {
        let store = SharedStore::new();
        store.put("k", "v2");
        let started = Instant::now();
        let value = store.wait_change("k", "v1", Duration::from_millis(5000));
        assert_eq!(value.as_deref(), Some("v2"));
        assert!(started.elapsed() < Duration::from_millis(100));
    }

    #[test]
    fn removal_is_not_a_change() {
        let store = Arc::new(SharedStore::new());
        store.put("k", "v1");

        let waiter_store = Arc::clone(&store);
        let waiter = thread::spawn(move || {
            waiter_store.wait_change("k", "v1", Duration::from_millis(200))
        });

        thread::sleep(Duration::from_millis(50));
        store.remove("k");

        assert_eq!(waiter.join().unwrap(), None);
    }

    #[test]
    fn many_waiters_on_different_keys_all_wake() {
        let store = Arc::new(SharedStore::new());
        for i in 0..4 {
            store.put(&format!("k{i}"), "old");
        }

        let mut waiters = Vec::new();
        for i in 0..4 {
            let waiter_store = Arc::clone(&store);
            waiters.push(thread::spawn(move || {
                waiter_store.wait_change(&format!("k{i}"), "old", Duration::from_millis(5000))
            }));
        }

        thread::sleep(Duration::from_millis(50));
        for i in 0..4 {
            store.put(&format!("k{i}"), &format!("new{i}"));
        }

        for (i, waiter) in waiters.into_iter().enumerate() {
            assert_eq!(waiter.join().unwrap().as_deref(), Some(format!("new{i}").as_str()));
        }
    }
}
