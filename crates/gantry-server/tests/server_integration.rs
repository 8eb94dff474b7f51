use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use gantry_server::conf::ServerConfig;
use gantry_server::{
    HttpPath, RequestMetadata, ResponseChannel, Server, WireRequest,
};

struct Wire {
    method: String,
    resource: String,
    query_string: String,
    queries: Vec<(String, String)>,
    headers: Vec<(String, String)>,
    data: Vec<u8>,
    secure: bool,
}

impl Wire {
    fn get(resource: &str) -> Wire {
        Wire {
            method: "GET".to_string(),
            resource: resource.to_string(),
            query_string: String::new(),
            queries: Vec::new(),
            headers: Vec::new(),
            data: Vec::new(),
            secure: false,
        }
    }
}

impl WireRequest for Wire {
    fn http_version(&self) -> (u16, u16) {
        (1, 1)
    }
    fn method(&self) -> &str {
        &self.method
    }
    fn resource(&self) -> &str {
        &self.resource
    }
    fn query_string(&self) -> &str {
        &self.query_string
    }
    fn queries(&self) -> &[(String, String)] {
        &self.queries
    }
    fn headers(&self) -> &[(String, String)] {
        &self.headers
    }
    fn data(&self) -> &[u8] {
        &self.data
    }
    fn is_secure(&self) -> bool {
        self.secure
    }
}

#[derive(Clone, Default)]
struct Channel {
    written: Arc<Mutex<Vec<u8>>>,
    status: Arc<Mutex<Option<(u16, String)>>>,
    finished: Arc<AtomicBool>,
}

impl ResponseChannel for Channel {
    fn set_status(&mut self, code: u16, message: &str) {
        *self.status.lock().unwrap() = Some((code, message.to_string()));
    }
    fn set_header(&mut self, _name: &str, _value: &str) {}
    fn write_body(&mut self, data: &[u8]) -> std::io::Result<()> {
        self.written.lock().unwrap().extend_from_slice(data);
        Ok(())
    }
    fn finish(&mut self) -> std::io::Result<()> {
        self.finished.store(true, Ordering::SeqCst);
        Ok(())
    }
}

fn make_server(paths: Vec<HttpPath>) -> Server {
    Server::new(ServerConfig::default(), paths, HashMap::new(), None)
}

#[test]
fn routed_handler_commits_the_response() {
    let server = make_server(vec![HttpPath::new("GET", "/hello", |request| {
        request.send_response(b"hello\n").unwrap();
    })]);

    let channel = Channel::default();
    server.handle(Box::new(Wire::get("/hello")), Box::new(channel.clone()));

    assert_eq!(&*channel.written.lock().unwrap(), b"hello\n");
    assert!(channel.finished.load(Ordering::SeqCst));
}

#[test]
fn handler_that_commits_nothing_still_finishes() {
    let server = make_server(vec![HttpPath::new("GET", "/noop", |_request| {})]);

    let channel = Channel::default();
    server.handle(Box::new(Wire::get("/noop")), Box::new(channel.clone()));

    assert!(channel.written.lock().unwrap().is_empty());
    assert!(channel.finished.load(Ordering::SeqCst));
}

#[test]
fn unrouted_request_gets_404() {
    let server = make_server(vec![HttpPath::new("GET", "/only", |_request| {})]);

    let channel = Channel::default();
    server.handle(Box::new(Wire::get("/other")), Box::new(channel.clone()));

    assert_eq!(
        channel.status.lock().unwrap().as_ref().map(|(c, _)| *c),
        Some(404)
    );
    assert!(channel.finished.load(Ordering::SeqCst));
}

#[test]
fn method_must_match_the_route() {
    let server = make_server(vec![HttpPath::new("POST", "/submit", |request| {
        request.send_response(b"posted").unwrap();
    })]);

    let channel = Channel::default();
    server.handle(Box::new(Wire::get("/submit")), Box::new(channel.clone()));

    assert!(channel.written.lock().unwrap().is_empty());
    assert_eq!(
        channel.status.lock().unwrap().as_ref().map(|(c, _)| *c),
        Some(404)
    );
}

#[test]
fn path_prefix_routes_nested_resources() {
    let served: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&served);
    let server = make_server(vec![HttpPath::new("GET", "/views/", move |request| {
        seen.lock().unwrap().push(request.metadata().pathname);
        request.send_response(b"ok").unwrap();
    })]);

    let channel = Channel::default();
    server.handle(
        Box::new(Wire::get("/views/main/index")),
        Box::new(channel.clone()),
    );

    assert_eq!(
        served.lock().unwrap().as_slice(),
        &["/views/main/index".to_string()]
    );
}

#[test]
fn metadata_reaches_the_handler_folded_and_merged() {
    let captured: Arc<Mutex<Option<RequestMetadata>>> = Arc::new(Mutex::new(None));
    let sink = Arc::clone(&captured);
    let server = make_server(vec![HttpPath::new("GET", "/meta", move |request| {
        *sink.lock().unwrap() = Some(request.metadata());
        request.finish().unwrap();
    })]);

    let mut wire = Wire::get("/meta");
    wire.query_string = "q=1&q=2".to_string();
    wire.queries = vec![
        ("q".to_string(), "1".to_string()),
        ("q".to_string(), "2".to_string()),
    ];
    wire.headers = vec![
        ("Content-Type".to_string(), "a".to_string()),
        ("Content-Type".to_string(), "b".to_string()),
        ("X-Tag".to_string(), "a".to_string()),
        ("X-Tag".to_string(), "b".to_string()),
    ];
    server.handle(Box::new(wire), Box::new(Channel::default()));

    let meta = captured.lock().unwrap().take().unwrap();
    assert_eq!(meta.http_version, "1.1");
    assert_eq!(meta.protocol, "http");
    assert_eq!(meta.url, "/meta?q=1&q=2");
    assert_eq!(meta.queries.get("q").map(String::as_str), Some("1,2"));
    assert_eq!(
        meta.headers.get("Content-Type").map(String::as_str),
        Some("a")
    );
    assert_eq!(meta.headers.get("X-Tag").map(String::as_str), Some("a,b"));

    let json = serde_json::to_value(&meta).unwrap();
    assert_eq!(json["httpVersion"], "1.1");
    assert_eq!(json["pathname"], "/meta");
}

#[test]
fn deferred_writer_outlives_the_gateway_callback() {
    let server = make_server(vec![HttpPath::new("GET", "/later", |request| {
        let writer = request.send_later().unwrap();
        std::thread::spawn(move || {
            std::thread::sleep(std::time::Duration::from_millis(20));
            writer.send(b"deferred body").unwrap();
        });
    })]);

    let channel = Channel::default();
    server.handle(Box::new(Wire::get("/later")), Box::new(channel.clone()));

    // the gateway has returned; the body lands afterwards
    let deadline = std::time::Instant::now() + std::time::Duration::from_secs(2);
    while !channel.finished.load(Ordering::SeqCst) {
        assert!(std::time::Instant::now() < deadline, "writer never sent");
        std::thread::sleep(std::time::Duration::from_millis(5));
    }
    assert_eq!(&*channel.written.lock().unwrap(), b"deferred body");
}
