//! Outbound HTTP client sessions.
//!
//! A session owns a connection pool and a small private tokio runtime that
//! drives the async transport, keeping the call boundary itself blocking.
//! Sessions live in a handle registry; scripts pass the handle back with
//! every request.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderName, HeaderValue, USER_AGENT};
use serde::{Deserialize, Serialize};
use tracing::warn;
use url::Url;

use gantry_calls::{CallError, CallRegistry};
use gantry_registry::{Handle, HandleRegistry};

use crate::error::HostError;

/// Built-in limits applied when session options leave them unset.
#[derive(Clone, Debug)]
pub struct HttpClientDefaults {
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
}

impl Default for HttpClientDefaults {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(30),
        }
    }
}

/// Session creation options. Pool sizing, redirects and TLS policy are fixed
/// per session; the transport pins them to the client, not to a request.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct SessionOptions {
    pub max_host_connections: Option<u32>,
    pub max_total_connections: Option<u32>,
    pub maxconnects: Option<u32>,
    pub connecttimeout_millis: Option<u64>,
    pub followlocation: bool,
    pub maxredirs: Option<u32>,
    pub useragent: Option<String>,
    pub require_tls: bool,
    pub ssl_verifypeer: bool,
    pub ssl_verifyhost: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            max_host_connections: None,
            max_total_connections: None,
            maxconnects: None,
            connecttimeout_millis: None,
            followlocation: true,
            maxredirs: None,
            useragent: None,
            require_tls: false,
            ssl_verifypeer: true,
            ssl_verifyhost: true,
        }
    }
}

/// Per-request options carried in the `metadata` field of
/// `httpclient_execute`.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct RequestOptions {
    pub headers: BTreeMap<String, String>,
    pub method: Option<String>,
    pub read_timeout_millis: Option<u64>,
    pub useragent: Option<String>,
    pub abort_on_connect_error: bool,
    pub failonerror: bool,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            headers: BTreeMap::new(),
            method: None,
            read_timeout_millis: None,
            useragent: None,
            abort_on_connect_error: true,
            failonerror: false,
        }
    }
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClientResponse {
    pub connection_success: bool,
    pub response_code: u16,
    pub headers: BTreeMap<String, String>,
    pub data: String,
}

pub struct HttpClientSession {
    runtime: tokio::runtime::Runtime,
    client: reqwest::Client,
    require_tls: bool,
    read_timeout: Duration,
}

impl HttpClientSession {
    pub fn open(
        options: SessionOptions,
        defaults: HttpClientDefaults,
    ) -> Result<HttpClientSession, HostError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("gantry-httpclient")
            .enable_all()
            .build()?;
        let connect_timeout = options
            .connecttimeout_millis
            .map(Duration::from_millis)
            .unwrap_or(defaults.connect_timeout);
        let mut builder = reqwest::Client::builder().connect_timeout(connect_timeout);
        if let Some(limit) = options.max_host_connections {
            builder = builder.pool_max_idle_per_host(limit as usize);
        }
        builder = if !options.followlocation {
            builder.redirect(reqwest::redirect::Policy::none())
        } else if let Some(limit) = options.maxredirs {
            builder.redirect(reqwest::redirect::Policy::limited(limit as usize))
        } else {
            builder
        };
        if let Some(useragent) = &options.useragent {
            builder = builder.user_agent(useragent.clone());
        }
        if !options.ssl_verifypeer || !options.ssl_verifyhost {
            builder = builder.danger_accept_invalid_certs(true);
        }
        let client = builder.build().map_err(HostError::HttpRequest)?;
        Ok(HttpClientSession {
            runtime,
            client,
            require_tls: options.require_tls,
            read_timeout: defaults.read_timeout,
        })
    }

    pub fn execute(
        &self,
        url: &str,
        body: Option<Vec<u8>>,
        options: &RequestOptions,
    ) -> Result<ClientResponse, HostError> {
        let parsed: Url = url
            .parse()
            .map_err(|err| HostError::HttpClient(format!("invalid url: [{url}]: {err}")))?;
        if self.require_tls && parsed.scheme() != "https" {
            return Err(HostError::HttpClient(format!(
                "non-TLS connections are disabled for this session, url: [{url}]"
            )));
        }

        let method = options.method.as_deref().map(str::to_uppercase);
        let mut request = match method.as_deref() {
            Some("GET") => self.client.get(parsed),
            Some("POST") => self.client.post(parsed),
            Some("PUT") => self.client.put(parsed),
            Some("DELETE") => self.client.delete(parsed),
            Some("PATCH") => self.client.patch(parsed),
            Some("HEAD") => self.client.head(parsed),
            Some(other) => {
                return Err(HostError::HttpClient(format!(
                    "unsupported method: [{other}]"
                )));
            }
            None if body.is_some() => self.client.post(parsed),
            None => self.client.get(parsed),
        };

        let timeout = options
            .read_timeout_millis
            .map(Duration::from_millis)
            .unwrap_or(self.read_timeout);
        request = request.timeout(timeout);

        for (name, value) in &options.headers {
            match (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                (Ok(header_name), Ok(header_value)) => {
                    request = request.header(header_name, header_value);
                }
                _ => {
                    return Err(HostError::HttpClient(format!("invalid header: [{name}]")));
                }
            }
        }
        if let Some(useragent) = &options.useragent {
            let value = HeaderValue::from_str(useragent)
                .map_err(|_| HostError::HttpClient("invalid useragent".to_string()))?;
            request = request.header(USER_AGENT, value);
        }
        if let Some(body) = body {
            request = request.body(body);
        }

        let outcome = self.runtime.block_on(async move {
            let response = request.send().await?;
            let status = response.status().as_u16();
            let mut headers = BTreeMap::new();
            for (name, value) in response.headers() {
                if let Ok(value) = value.to_str() {
                    headers.insert(name.to_string(), value.to_string());
                }
            }
            let bytes = response.bytes().await?;
            Ok::<_, reqwest::Error>((status, headers, bytes))
        });

        let (status, headers, bytes) = match outcome {
            Ok(parts) => parts,
            Err(err) if err.is_connect() && !options.abort_on_connect_error => {
                return Ok(ClientResponse {
                    connection_success: false,
                    response_code: 0,
                    headers: BTreeMap::new(),
                    data: String::new(),
                });
            }
            Err(err) => return Err(HostError::HttpRequest(err)),
        };

        if options.failonerror && status >= 400 {
            return Err(HostError::HttpClient(format!(
                "response status: [{status}], url: [{url}]"
            )));
        }

        Ok(ClientResponse {
            connection_success: true,
            response_code: status,
            headers,
            data: String::from_utf8_lossy(&bytes).into_owned(),
        })
    }
}

impl std::fmt::Debug for HttpClientSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClientSession")
            .field("require_tls", &self.require_tls)
            .finish()
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
struct CloseArgs {
    httpclient_handle: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
struct ExecuteArgs {
    httpclient_handle: Option<i64>,
    url: Option<String>,
    data: Option<String>,
    metadata: Option<RequestOptions>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
struct SendTempFileArgs {
    httpclient_handle: Option<i64>,
    url: Option<String>,
    file_path: Option<String>,
    metadata: Option<RequestOptions>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateResponse {
    httpclient_handle: i64,
}

fn lookup(
    sessions: &HandleRegistry<Arc<HttpClientSession>>,
    raw: Option<i64>,
) -> Result<Arc<HttpClientSession>, CallError> {
    let raw = raw.ok_or(CallError::MissingParameter("httpclientHandle"))?;
    sessions
        .with(Handle::from_raw(raw), Arc::clone)
        .ok_or(CallError::HandleNotFound("httpclientHandle"))
}

pub(crate) fn register(
    registry: &CallRegistry,
    sessions: Arc<HandleRegistry<Arc<HttpClientSession>>>,
    defaults: HttpClientDefaults,
) -> Result<(), CallError> {
    let session_registry = Arc::clone(&sessions);
    registry.register("httpclient_create", move |input| {
        let options: SessionOptions = if input.is_empty() {
            SessionOptions::default()
        } else {
            serde_json::from_slice(input)?
        };
        let session = HttpClientSession::open(options, defaults.clone())?;
        let handle = session_registry.put(Arc::new(session));
        Ok(serde_json::to_vec(&CreateResponse {
            httpclient_handle: handle.raw(),
        })?)
    })?;

    let session_registry = Arc::clone(&sessions);
    registry.register("httpclient_close", move |input| {
        let args: CloseArgs = serde_json::from_slice(input)?;
        let raw = args
            .httpclient_handle
            .ok_or(CallError::MissingParameter("httpclientHandle"))?;
        session_registry
            .remove(Handle::from_raw(raw))
            .ok_or(CallError::HandleNotFound("httpclientHandle"))?;
        // in-flight requests on other threads finish on their own clone;
        // the pool itself shuts down with the last reference
        Ok(b"{}".to_vec())
    })?;

    let session_registry = Arc::clone(&sessions);
    registry.register("httpclient_execute", move |input| {
        let args: ExecuteArgs = serde_json::from_slice(input)?;
        let session = lookup(&session_registry, args.httpclient_handle)?;
        let url = args.url.ok_or(CallError::MissingParameter("url"))?;
        let options = args.metadata.unwrap_or_default();
        let response = session.execute(&url, args.data.map(String::into_bytes), &options)?;
        Ok(serde_json::to_vec(&response)?)
    })?;

    registry.register("httpclient_send_temp_file", move |input| {
        let args: SendTempFileArgs = serde_json::from_slice(input)?;
        let session = lookup(&sessions, args.httpclient_handle)?;
        let url = args.url.ok_or(CallError::MissingParameter("url"))?;
        let file_path = args
            .file_path
            .ok_or(CallError::MissingParameter("filePath"))?;
        let options = args.metadata.unwrap_or_default();
        let body = std::fs::read(&file_path).map_err(HostError::Io)?;
        let result = session.execute(&url, Some(body), &options);
        // temp file contract: gone after the send, success or not
        if let Err(err) = std::fs::remove_file(&file_path) {
            warn!(target: "gantry.httpclient", %file_path, error = %err, "failed to remove temp file");
        }
        let response = result?;
        Ok(serde_json::to_vec(&response)?)
    })?;

    Ok(())
}
