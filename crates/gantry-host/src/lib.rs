//! Natively-implemented capability modules behind the call boundary:
//! outbound HTTP sessions, cron scheduling, a shared blocking store,
//! fire-and-forget worker threads, and the logging bridge.
//!
//! All state is explicitly owned: a [`Host`] is constructed once at startup
//! with the script-engine collaborator and installed into a
//! [`CallRegistry`](gantry_calls::CallRegistry). Dropping the host drops
//! every resource that is still registered: open client sessions shut down
//! with their pools, running cron tasks are stopped and joined.

pub mod client;
pub mod cron;
mod error;
pub mod logging;
pub mod shared;
pub mod workers;

use std::sync::Arc;

use gantry_calls::{CallError, CallRegistry, ScriptEngine};
use gantry_registry::{HandleRegistry, PayloadHandleRegistry};

pub use client::{ClientResponse, HttpClientDefaults, HttpClientSession, RequestOptions, SessionOptions};
pub use cron::CronTask;
pub use error::HostError;
pub use shared::SharedStore;
pub use workers::WorkerPool;

/// Host-wide tunables.
#[derive(Clone, Debug, Default)]
pub struct HostConfig {
    pub http: HttpClientDefaults,
}

/// Owns the capability modules' state and wires them into a call registry.
pub struct Host {
    engine: Arc<dyn ScriptEngine>,
    config: HostConfig,
    shared: Arc<SharedStore>,
    workers: Arc<WorkerPool>,
    http_clients: Arc<HandleRegistry<Arc<HttpClientSession>>>,
    cron_tasks: Arc<PayloadHandleRegistry<CronTask, String>>,
}

impl Host {
    pub fn new(engine: Arc<dyn ScriptEngine>, config: HostConfig) -> Host {
        Host {
            engine,
            config,
            shared: Arc::new(SharedStore::new()),
            workers: Arc::new(WorkerPool::new()),
            http_clients: Arc::new(HandleRegistry::new()),
            cron_tasks: Arc::new(PayloadHandleRegistry::new()),
        }
    }

    /// Registers every boundary call this host provides. Fails with
    /// [`CallError::DuplicateName`] if installed twice into one registry.
    pub fn install(&self, registry: &CallRegistry) -> Result<(), CallError> {
        client::register(
            registry,
            Arc::clone(&self.http_clients),
            self.config.http.clone(),
        )?;
        cron::register(
            registry,
            Arc::clone(&self.cron_tasks),
            Arc::clone(&self.engine),
        )?;
        shared::register(registry, Arc::clone(&self.shared))?;
        workers::register(
            registry,
            Arc::clone(&self.workers),
            Arc::clone(&self.engine),
        )?;
        logging::register(registry)?;
        Ok(())
    }

    pub fn shared(&self) -> &SharedStore {
        &self.shared
    }

    /// Live background workers started through `thread_run`.
    pub fn active_workers(&self) -> usize {
        self.workers.active_count()
    }

    /// Client sessions and cron tasks currently held by handles.
    pub fn live_handles(&self) -> (usize, usize) {
        (self.http_clients.len(), self.cron_tasks.len())
    }
}

impl std::fmt::Debug for Host {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Host")
            .field("http_clients", &self.http_clients.len())
            .field("cron_tasks", &self.cron_tasks.len())
            .field("active_workers", &self.active_workers())
            .finish()
    }
}
