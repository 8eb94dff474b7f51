use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, error};

use crate::conf::ServerConfig;
use crate::meta::ResponseMetadata;
use crate::request::{Request, ResponseChannel, TemplateRenderer, WireRequest};

/// Gateway callback invoked for every routed request.
pub type Gateway = Box<dyn Fn(&Request) + Send + Sync>;

/// One routed endpoint: method plus path prefix plus handler.
pub struct HttpPath {
    pub method: String,
    pub path: String,
    pub handler: Gateway,
}

impl HttpPath {
    pub fn new(
        method: impl Into<String>,
        path: impl Into<String>,
        handler: impl Fn(&Request) + Send + Sync + 'static,
    ) -> HttpPath {
        HttpPath {
            method: method.into(),
            path: path.into(),
            handler: Box::new(handler),
        }
    }

    fn matches(&self, method: &str, resource: &str) -> bool {
        self.method.eq_ignore_ascii_case(method) && resource.starts_with(&self.path)
    }
}

impl std::fmt::Debug for HttpPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpPath")
            .field("method", &self.method)
            .field("path", &self.path)
            .finish()
    }
}

/// Serving facade over the wire layer.
///
/// The wire layer accepts connections, parses requests, and hands each one
/// here as a [`WireRequest`] plus [`ResponseChannel`] pair; `handle` wraps
/// them in a commit-once [`Request`], routes to the matching path handler,
/// and always finishes the request afterwards so an endpoint that commits
/// nothing still produces a default response.
pub struct Server {
    config: ServerConfig,
    paths: Vec<HttpPath>,
    partials: Arc<HashMap<String, String>>,
    renderer: Option<Arc<dyn TemplateRenderer>>,
}

impl Server {
    pub fn new(
        config: ServerConfig,
        paths: Vec<HttpPath>,
        partials: HashMap<String, String>,
        renderer: Option<Arc<dyn TemplateRenderer>>,
    ) -> Server {
        Server {
            config,
            paths,
            partials: Arc::new(partials),
            renderer,
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn handle(&self, wire: Box<dyn WireRequest>, channel: Box<dyn ResponseChannel>) {
        let request = Request::new(
            wire,
            channel,
            Arc::clone(&self.partials),
            self.renderer.clone(),
        );
        let (method, resource) = {
            let meta = request.metadata();
            (meta.method, meta.pathname)
        };
        match self
            .paths
            .iter()
            .find(|path| path.matches(&method, &resource))
        {
            Some(path) => {
                debug!(%method, %resource, path = %path.path, "routing request");
                (path.handler)(&request);
            }
            None => {
                debug!(%method, %resource, "no registered path");
                let not_found = ResponseMetadata {
                    status_code: 404,
                    status_message: "Not Found".to_string(),
                    headers: Default::default(),
                };
                if let Err(err) = request.set_response_metadata(&not_found) {
                    error!(error = %err, "failed to apply 404 metadata");
                }
            }
        }
        if let Err(err) = request.finish() {
            error!(%method, %resource, error = %err, "failed to finish request");
        }
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("paths", &self.paths)
            .field("tcp_port", &self.config.tcp_port)
            .finish()
    }
}
