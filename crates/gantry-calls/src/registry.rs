use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::error::CallError;

/// Boundary call handler: raw payload bytes in, raw payload bytes out.
pub type CallHandler = Arc<dyn Fn(&[u8]) -> Result<Vec<u8>, CallError> + Send + Sync>;

/// Name-indexed table of native call handlers.
///
/// This is the single funnel every boundary call is routed through. The map
/// lock covers registration and lookup only: `invoke` clones the handler out
/// under the lock and releases it before invoking, so a handler may itself
/// register, remove, or invoke calls without deadlocking the registry.
#[derive(Default)]
pub struct CallRegistry {
    calls: Mutex<HashMap<String, CallHandler>>,
}

impl CallRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&self, name: &str, handler: F) -> Result<(), CallError>
    where
        F: Fn(&[u8]) -> Result<Vec<u8>, CallError> + Send + Sync + 'static,
    {
        if name.is_empty() {
            return Err(CallError::EmptyName);
        }
        let mut calls = self.calls.lock().expect("call registry poisoned");
        if calls.contains_key(name) {
            return Err(CallError::DuplicateName(name.to_string()));
        }
        calls.insert(name.to_string(), Arc::new(handler));
        Ok(())
    }

    pub fn remove(&self, name: &str) -> Result<(), CallError> {
        if name.is_empty() {
            return Err(CallError::EmptyName);
        }
        let mut calls = self.calls.lock().expect("call registry poisoned");
        match calls.remove(name) {
            Some(_) => Ok(()),
            None => Err(CallError::UnknownName(name.to_string())),
        }
    }

    /// Routes `input` to the handler registered under `name`.
    ///
    /// Handler failures are wrapped into [`CallError::Dispatch`] carrying the
    /// call name and the original message.
    pub fn invoke(&self, name: &str, input: &[u8]) -> Result<Vec<u8>, CallError> {
        if name.is_empty() {
            return Err(CallError::EmptyName);
        }
        let handler = {
            let calls = self.calls.lock().expect("call registry poisoned");
            match calls.get(name) {
                Some(handler) => Arc::clone(handler),
                None => return Err(CallError::UnknownName(name.to_string())),
            }
        };
        handler(input).map_err(|err| CallError::Dispatch {
            name: name.to_string(),
            message: err.to_string(),
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.calls
            .lock()
            .expect("call registry poisoned")
            .contains_key(name)
    }
}

impl std::fmt::Debug for CallRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let calls = self.calls.lock().expect("call registry poisoned");
        f.debug_struct("CallRegistry")
            .field("calls", &calls.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invoke_routes_to_registered_handler() {
        let registry = CallRegistry::new();
        registry
            .register("echo", |input| Ok(input.to_vec()))
            .unwrap();

        let out = registry.invoke("echo", b"payload").unwrap();
        assert_eq!(out, b"payload");
    }

    #[test]
    fn register_rejects_duplicates_and_empty_names() {
        let registry = CallRegistry::new();
        registry.register("dup", |_| Ok(vec![])).unwrap();

        let err = registry.register("dup", |_| Ok(vec![])).unwrap_err();
        assert!(matches!(err, CallError::DuplicateName(name) if name == "dup"));

        let err = registry.register("", |_| Ok(vec![])).unwrap_err();
        assert!(matches!(err, CallError::EmptyName));
    }

    #[test]
    fn remove_unknown_name_fails() {
        let registry = CallRegistry::new();
        let err = registry.remove("missing").unwrap_err();
        assert!(matches!(err, CallError::UnknownName(name) if name == "missing"));
    }

    #[test]
    fn invoke_unknown_name_fails() {
        let registry = CallRegistry::new();
        let err = registry.invoke("missing", b"{}").unwrap_err();
        assert!(matches!(err, CallError::UnknownName(name) if name == "missing"));
    }

    #[test]
    fn handler_failure_is_wrapped_with_call_name() {
        let registry = CallRegistry::new();
        registry
            .register("fails", |_| Err(CallError::MissingParameter("key")))
            .unwrap();

        let err = registry.invoke("fails", b"{}").unwrap_err();
        match err {
            CallError::Dispatch { name, message } => {
                assert_eq!(name, "fails");
                assert!(message.contains("key"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn handler_may_reenter_the_registry() {
        let registry = Arc::new(CallRegistry::new());
        registry.register("inner", |_| Ok(b"inner".to_vec())).unwrap();
        let reg = Arc::clone(&registry);
        registry
            .register("outer", move |input| reg.invoke("inner", input))
            .unwrap();

        let out = registry.invoke("outer", b"{}").unwrap();
        assert_eq!(out, b"inner");
    }

    #[test]
    fn concurrent_invokes_race_safely_with_registration() {
        let registry = Arc::new(CallRegistry::new());
        registry.register("busy", |_| Ok(vec![1])).unwrap();

        let mut handles = Vec::new();
        for i in 0..8 {
            let reg = Arc::clone(&registry);
            handles.push(std::thread::spawn(move || {
                for j in 0..100 {
                    let _ = reg.invoke("busy", b"{}");
                    if i == 0 {
                        let name = format!("extra-{j}");
                        let _ = reg.register(&name, |_| Ok(vec![]));
                        let _ = reg.remove(&name);
                    }
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        assert!(registry.contains("busy"));
    }
}
