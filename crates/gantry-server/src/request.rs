use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::ServerError;
use crate::meta::{RequestMetadata, ResponseMetadata};

/// Parsed wire-level request, produced by the (out-of-scope) HTTP layer.
pub trait WireRequest: Send + Sync {
    fn http_version(&self) -> (u16, u16);
    fn method(&self) -> &str;
    /// Resource path without the query string.
    fn resource(&self) -> &str;
    fn query_string(&self) -> &str;
    /// Decoded query parameters, duplicates preserved in wire order.
    fn queries(&self) -> &[(String, String)];
    /// Raw header pairs, duplicates preserved in wire order.
    fn headers(&self) -> &[(String, String)];
    fn data(&self) -> &[u8];
    fn is_secure(&self) -> bool;
}

/// Connection abstraction the response is written through.
///
/// Status and headers may be set any time before the first body write;
/// `finish` flushes and completes the exchange.
pub trait ResponseChannel: Send {
    fn set_status(&mut self, code: u16, message: &str);
    fn set_header(&mut self, name: &str, value: &str);
    fn write_body(&mut self, data: &[u8]) -> std::io::Result<()>;
    fn finish(&mut self) -> std::io::Result<()>;
}

/// Template rendering collaborator used by [`Request::send_mustache`].
pub trait TemplateRenderer: Send + Sync {
    fn render(
        &self,
        template_path: &Path,
        values: &serde_json::Value,
        partials: &HashMap<String, String>,
    ) -> Result<Vec<u8>, ServerError>;
}

const CREATED: u8 = 0;
const COMMITTED: u8 = 1;

/// One in-flight HTTP exchange, answered exactly once.
///
/// Every commit path performs the CREATED -> COMMITTED transition through a
/// single compare-and-swap before any I/O; the losers observe
/// [`ServerError::AlreadyCommitted`] and write nothing. `finish` is the
/// fall-through default: it commits an empty response only if nothing else
/// already has.
pub struct Request {
    state: AtomicU8,
    wire: Box<dyn WireRequest>,
    channel: Mutex<Option<Box<dyn ResponseChannel>>>,
    partials: Arc<HashMap<String, String>>,
    renderer: Option<Arc<dyn TemplateRenderer>>,
}

impl Request {
    pub fn new(
        wire: Box<dyn WireRequest>,
        channel: Box<dyn ResponseChannel>,
        partials: Arc<HashMap<String, String>>,
        renderer: Option<Arc<dyn TemplateRenderer>>,
    ) -> Request {
        Request {
            state: AtomicU8::new(CREATED),
            wire,
            channel: Mutex::new(Some(channel)),
            partials,
            renderer,
        }
    }

    pub fn metadata(&self) -> RequestMetadata {
        RequestMetadata::from_wire(self.wire.as_ref())
    }

    pub fn data(&self) -> &[u8] {
        self.wire.data()
    }

    pub fn is_committed(&self) -> bool {
        self.state.load(Ordering::Acquire) == COMMITTED
    }

    /// Applies status, reason and headers to the channel. Not a commit path;
    /// may be called any time before the response body is produced.
    pub fn set_response_metadata(&self, meta: &ResponseMetadata) -> Result<(), ServerError> {
        let mut guard = self.channel.lock().expect("request channel poisoned");
        let channel = guard.as_mut().ok_or(ServerError::ChannelGone)?;
        channel.set_status(meta.status_code, &meta.status_message);
        for (name, value) in &meta.headers {
            channel.set_header(name, value);
        }
        Ok(())
    }

    pub fn send_response(&self, data: &[u8]) -> Result<(), ServerError> {
        self.try_commit()?;
        let mut guard = self.channel.lock().expect("request channel poisoned");
        let channel = guard.as_mut().ok_or(ServerError::ChannelGone)?;
        channel.write_body(data)?;
        channel.finish()?;
        Ok(())
    }

    /// Streams a file as the response body. The file is opened before the
    /// commit is claimed, so an unreadable path leaves the request
    /// committable. The finalizer observes whether the stream completed.
    pub fn send_file(
        &self,
        path: &Path,
        finalizer: impl FnOnce(bool),
    ) -> Result<(), ServerError> {
        let file = File::open(path)?;
        self.try_commit()?;
        let mut guard = self.channel.lock().expect("request channel poisoned");
        let channel = guard.as_mut().ok_or(ServerError::ChannelGone)?;
        match stream_into(channel.as_mut(), file) {
            Ok(()) => {
                finalizer(true);
                Ok(())
            }
            Err(err) => {
                finalizer(false);
                Err(err.into())
            }
        }
    }

    /// Renders a template through the configured renderer, with the server's
    /// shared partials, and streams the result.
    pub fn send_mustache(
        &self,
        template_path: &Path,
        values: &serde_json::Value,
    ) -> Result<(), ServerError> {
        let renderer = self
            .renderer
            .as_ref()
            .ok_or_else(|| ServerError::Template("no template renderer configured".to_string()))?
            .clone();
        self.try_commit()?;
        let body = renderer.render(template_path, values, &self.partials)?;
        let mut guard = self.channel.lock().expect("request channel poisoned");
        let channel = guard.as_mut().ok_or(ServerError::ChannelGone)?;
        channel.write_body(&body)?;
        channel.finish()?;
        Ok(())
    }

    /// Claims the commit now, hands the channel to a writer that produces
    /// the body later, possibly from another execution context.
    pub fn send_later(&self) -> Result<ResponseWriter, ServerError> {
        self.try_commit()?;
        let channel = self
            .channel
            .lock()
            .expect("request channel poisoned")
            .take()
            .ok_or(ServerError::ChannelGone)?;
        Ok(ResponseWriter { channel })
    }

    /// Default completion: commits an empty response if still uncommitted,
    /// no-op otherwise.
    pub fn finish(&self) -> Result<(), ServerError> {
        if self.try_commit().is_err() {
            return Ok(());
        }
        let mut guard = self.channel.lock().expect("request channel poisoned");
        if let Some(channel) = guard.as_mut() {
            channel.finish()?;
        }
        Ok(())
    }

    fn try_commit(&self) -> Result<(), ServerError> {
        self.state
            .compare_exchange(CREATED, COMMITTED, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|_| ServerError::AlreadyCommitted)
    }
}

impl std::fmt::Debug for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Request")
            .field("method", &self.wire.method())
            .field("resource", &self.wire.resource())
            .field("committed", &self.is_committed())
            .finish()
    }
}

/// Deferred body writer returned by [`Request::send_later`]. The commit is
/// already claimed; `send` performs the actual write.
pub struct ResponseWriter {
    channel: Box<dyn ResponseChannel>,
}

impl ResponseWriter {
    pub fn send(mut self, data: &[u8]) -> Result<(), ServerError> {
        self.channel.write_body(data)?;
        self.channel.finish()?;
        Ok(())
    }
}

fn stream_into(channel: &mut dyn ResponseChannel, mut source: impl Read) -> std::io::Result<()> {
    let mut buf = [0u8; 8192];
    loop {
        let n = source.read(&mut buf)?;
        if n == 0 {
            break;
        }
        channel.write_body(&buf[..n])?;
    }
    channel.finish()
}
