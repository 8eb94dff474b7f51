//! Periodic execution of script callbacks on dedicated background threads,
//! driven by cron expressions.

use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chrono::Utc;
use cron::Schedule;
use serde::{Deserialize, Serialize};
use tracing::error;

use gantry_calls::{CallError, CallRegistry, CallbackScript, ScriptEngine};
use gantry_registry::{Handle, PayloadHandleRegistry};

use crate::error::HostError;

struct CronShared {
    running: AtomicBool,
    lock: Mutex<()>,
    stopped: Condvar,
}

/// A repeating task bound to a cron expression.
///
/// The worker thread computes the next fire instant, sleeps interruptibly
/// until then or until stopped, and invokes the callback if still running.
/// `stop` is synchronous: it wakes the sleeper and joins the thread, so no
/// invocation can begin after it returns. Dropping a running task does the
/// same.
pub struct CronTask {
    shared: Arc<CronShared>,
    worker: Option<JoinHandle<()>>,
}

impl CronTask {
    pub fn start(
        expression: &str,
        mut task: impl FnMut() + Send + 'static,
    ) -> Result<CronTask, HostError> {
        let schedule = Schedule::from_str(expression).map_err(|err| HostError::CronExpression {
            expression: expression.to_string(),
            message: err.to_string(),
        })?;
        let shared = Arc::new(CronShared {
            running: AtomicBool::new(true),
            lock: Mutex::new(()),
            stopped: Condvar::new(),
        });
        let worker_shared = Arc::clone(&shared);
        let worker = thread::Builder::new()
            .name("gantry-cron".to_string())
            .spawn(move || {
                while worker_shared.running.load(Ordering::Acquire) {
                    let now = Utc::now();
                    // a schedule can run dry (e.g. a fixed past date)
                    let Some(next) = schedule.after(&now).next() else {
                        break;
                    };
                    let wait = (next - now).to_std().unwrap_or(Duration::ZERO);
                    let guard = worker_shared.lock.lock().expect("cron lock poisoned");
                    let (guard, _timeout) = worker_shared
                        .stopped
                        .wait_timeout_while(guard, wait, |_| {
                            worker_shared.running.load(Ordering::Acquire)
                        })
                        .expect("cron lock poisoned");
                    drop(guard);
                    if worker_shared.running.load(Ordering::Acquire) {
                        task();
                    }
                }
            })
            .map_err(HostError::ThreadSpawn)?;
        Ok(CronTask {
            shared,
            worker: Some(worker),
        })
    }

    /// Stops the task and joins the worker thread. After this returns no
    /// further invocation occurs.
    pub fn stop(mut self) -> Result<(), HostError> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<(), HostError> {
        self.shared.running.store(false, Ordering::Release);
        self.shared.stopped.notify_all();
        match self.worker.take() {
            Some(worker) => worker.join().map_err(|_| HostError::CronWorkerPanicked),
            None => Ok(()),
        }
    }
}

impl Drop for CronTask {
    fn drop(&mut self) {
        if let Err(err) = self.shutdown() {
            error!(target: "gantry.cron", error = %err, "cron task shutdown failed");
        }
    }
}

impl std::fmt::Debug for CronTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CronTask")
            .field("running", &self.shared.running.load(Ordering::Acquire))
            .finish()
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
struct StartArgs {
    callback_script: Option<serde_json::Value>,
    expression: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
struct StopArgs {
    cron_handle: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StartResponse {
    cron_handle: i64,
}

pub(crate) fn register(
    registry: &CallRegistry,
    tasks: Arc<PayloadHandleRegistry<CronTask, String>>,
    engine: Arc<dyn ScriptEngine>,
) -> Result<(), CallError> {
    let task_registry = Arc::clone(&tasks);
    registry.register("cron_start", move |input| {
        let args: StartArgs = serde_json::from_slice(input)?;
        let value = args
            .callback_script
            .ok_or(CallError::MissingParameter("callbackScript"))?;
        let script = CallbackScript::from_value(value)?;
        let expression = match args.expression {
            Some(expression) if !expression.is_empty() => expression,
            _ => return Err(CallError::MissingParameter("expression")),
        };
        let engine = Arc::clone(&engine);
        let descriptor = script.clone();
        let task = CronTask::start(&expression, move || {
            // a failing script callback must not kill the scheduler loop
            if let Err(err) = engine.run_script(&descriptor) {
                error!(target: "gantry.cron", error = %err, "cron callback failed");
            }
        })?;
        let handle = task_registry.put(task, script.to_json());
        Ok(serde_json::to_vec(&StartResponse {
            cron_handle: handle.raw(),
        })?)
    })?;

    registry.register("cron_stop", move |input| {
        let args: StopArgs = serde_json::from_slice(input)?;
        let raw = args
            .cron_handle
            .ok_or(CallError::MissingParameter("cronHandle"))?;
        let (task, _descriptor) = tasks
            .remove(Handle::from_raw(raw))
            .ok_or(CallError::HandleNotFound("cronHandle"))?;
        // a join failure means the worker already died; the handle stays
        // retired either way
        task.stop()?;
        Ok(b"{}".to_vec())
    })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Instant;

    #[test]
    fn invalid_expression_fails_before_any_thread_starts() {
        let err = CronTask::start("not a cron expr", || {}).unwrap_err();
        match err {
            HostError::CronExpression { expression, .. } => {
                assert_eq!(expression, "not a cron expr");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn every_second_schedule_fires_and_stops_cleanly() {
        let count = Arc::new(AtomicUsize::new(0));
        let observed = Arc::clone(&count);
        let task = CronTask::start("* * * * * *", move || {
            observed.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

        thread::sleep(Duration::from_millis(2500));
        task.stop().unwrap();
        let at_stop = count.load(Ordering::SeqCst);
        assert!(
            (1..=3).contains(&at_stop),
            "expected 1..=3 invocations, got {at_stop}"
        );

        // no invocation after stop() returned
        thread::sleep(Duration::from_millis(1500));
        assert_eq!(count.load(Ordering::SeqCst), at_stop);
    }

    #[test]
    fn stop_returns_promptly_mid_sleep() {
        let task = CronTask::start("0 0 0 1 1 *", || {}).unwrap();
        let started = Instant::now();
        task.stop().unwrap();
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn drop_joins_the_worker() {
        let count = Arc::new(AtomicUsize::new(0));
        let observed = Arc::clone(&count);
        {
            let _task = CronTask::start("* * * * * *", move || {
                observed.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        }
        let at_drop = count.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(1500));
        assert_eq!(count.load(Ordering::SeqCst), at_drop);
    }
}
