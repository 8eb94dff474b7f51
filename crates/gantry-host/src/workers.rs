//! Fire-and-forget background execution with a process-wide live-worker
//! counter for introspection.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use serde::Deserialize;
use tracing::error;

use gantry_calls::{CallError, CallRegistry, CallbackScript, ScriptEngine};

use crate::error::HostError;

/// Dispatches callbacks onto fresh background threads and tracks how many
/// are still running.
#[derive(Default)]
pub struct WorkerPool {
    active: Arc<AtomicUsize>,
}

struct ActiveGuard(Arc<AtomicUsize>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl WorkerPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `task` once on a new detached thread. The live counter is
    /// incremented before the spawn so the worker is observable immediately,
    /// and decremented when the task completes, panics included.
    pub fn run(&self, task: impl FnOnce() + Send + 'static) -> Result<(), HostError> {
        let active = Arc::clone(&self.active);
        active.fetch_add(1, Ordering::SeqCst);
        let spawned = thread::Builder::new()
            .name("gantry-worker".to_string())
            .spawn(move || {
                let _guard = ActiveGuard(active);
                task();
            });
        if let Err(err) = spawned {
            self.active.fetch_sub(1, Ordering::SeqCst);
            return Err(HostError::ThreadSpawn(err));
        }
        Ok(())
    }

    pub fn active_count(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("active", &self.active_count())
            .finish()
    }
}

/// Blocks the calling thread.
pub fn sleep_millis(millis: u64) {
    thread::sleep(Duration::from_millis(millis));
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
struct RunArgs {
    callback_script: Option<serde_json::Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
struct SleepArgs {
    millis: Option<i64>,
}

pub(crate) fn register(
    registry: &CallRegistry,
    pool: Arc<WorkerPool>,
    engine: Arc<dyn ScriptEngine>,
) -> Result<(), CallError> {
    registry.register("thread_run", move |input| {
        let args: RunArgs = serde_json::from_slice(input)?;
        let value = args
            .callback_script
            .ok_or(CallError::MissingParameter("callbackScript"))?;
        let script = CallbackScript::from_value(value)?;
        let engine = Arc::clone(&engine);
        pool.run(move || {
            // output is ignored; failures must not kill the worker silently
            if let Err(err) = engine.run_script(&script) {
                error!(target: "gantry.thread", error = %err, "thread callback failed");
            }
        })?;
        Ok(b"{}".to_vec())
    })?;

    registry.register("thread_sleep_millis", move |input| {
        let args: SleepArgs = serde_json::from_slice(input)?;
        let millis = args.millis.ok_or(CallError::MissingParameter("millis"))?;
        if millis < 0 {
            return Err(CallError::invalid_parameter("millis", millis));
        }
        sleep_millis(millis as u64);
        Ok(b"{}".to_vec())
    })?;

    Ok(())
}
