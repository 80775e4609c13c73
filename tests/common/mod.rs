//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::http::{HeaderMap, Method, Request, Response};
use axum::Router;
use tokio::io::AsyncReadExt;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use submission_relay::config::{FormConfig, RelayConfig};
use submission_relay::http::HttpServer;
use submission_relay::lifecycle::Shutdown;

/// A request as seen by the mock OpenRosa server.
#[derive(Debug, Clone)]
pub struct Captured {
    pub method: Method,
    pub uri: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl Captured {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// What the mock answers: status, extra headers, body.
pub type Reply = (u16, Vec<(&'static str, String)>, String);

pub struct MockUpstream {
    pub addr: SocketAddr,
    requests: Arc<Mutex<Vec<Captured>>>,
}

impl MockUpstream {
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn requests(&self) -> Vec<Captured> {
        self.requests.lock().unwrap().clone()
    }

    pub fn posts(&self) -> Vec<Captured> {
        self.requests()
            .into_iter()
            .filter(|r| r.method == Method::POST)
            .collect()
    }
}

/// Start a programmable OpenRosa server on an ephemeral port.
pub async fn start_upstream<F>(respond: F) -> MockUpstream
where
    F: Fn(&Captured) -> Reply + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let requests = Arc::new(Mutex::new(Vec::new()));
    let respond = Arc::new(respond);

    let recorded = requests.clone();
    let app = Router::new().fallback(move |request: Request<Body>| {
        let recorded = recorded.clone();
        let respond = respond.clone();
        async move {
            let (parts, body) = request.into_parts();
            let body = axum::body::to_bytes(body, usize::MAX).await.unwrap_or_default();
            let captured = Captured {
                method: parts.method,
                uri: parts.uri.to_string(),
                headers: parts.headers,
                body,
            };
            let (status, headers, text) = respond(&captured);
            recorded.lock().unwrap().push(captured);

            let mut builder = Response::builder().status(status);
            for (name, value) in headers {
                builder = builder.header(name, value);
            }
            builder.body(Body::from(text)).unwrap()
        }
    });

    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    MockUpstream { addr, requests }
}

/// An OpenRosa server that accepts everything and advertises `max_size`.
pub async fn start_accepting_upstream(max_size: u64) -> MockUpstream {
    start_upstream(move |req| {
        if req.method == Method::HEAD {
            (
                204,
                vec![("x-openrosa-accept-content-length", max_size.to_string())],
                String::new(),
            )
        } else {
            (201, vec![], "<OpenRosaResponse><message>ok</message></OpenRosaResponse>".into())
        }
    })
    .await
}

/// Reads part of each request, then closes the connection without answering.
pub async fn start_dropping_upstream() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut buf = [0u8; 64];
                let _ = socket.read(&mut buf).await;
                drop(socket);
            });
        }
    });

    addr
}

/// Accepts connections and never answers.
pub async fn start_stalled_upstream() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut buf = vec![0u8; 8192];
                while let Ok(n) = socket.read(&mut buf).await {
                    if n == 0 {
                        break;
                    }
                }
                tokio::time::sleep(Duration::from_secs(30)).await;
            });
        }
    });

    addr
}

/// A port nothing listens on.
pub async fn closed_port() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}

pub fn form(id: &str, server_url: &str) -> FormConfig {
    FormConfig {
        id: id.into(),
        server_url: server_url.into(),
        open_rosa_id: "household_survey".into(),
        active: true,
    }
}

pub fn config_with(forms: Vec<FormConfig>) -> RelayConfig {
    let mut config = RelayConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.forms = forms;
    config
}

/// Run `server` on an ephemeral port until the returned shutdown fires.
pub async fn start_relay(server: HttpServer) -> (SocketAddr, Shutdown) {
    let shutdown = Shutdown::new();
    let (_, config_updates) = mpsc::unbounded_channel();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server_shutdown = shutdown.subscribe();

    tokio::spawn(async move {
        let _ = server.run(listener, config_updates, server_shutdown).await;
    });

    tokio::time::sleep(Duration::from_millis(100)).await;
    (addr, shutdown)
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}

/// Multipart body the relay passes through untouched.
pub fn multipart_record(instance_xml: &str) -> reqwest::multipart::Form {
    reqwest::multipart::Form::new().part(
        "xml_submission_file",
        reqwest::multipart::Part::text(instance_xml.to_string())
            .file_name("xml_submission_file")
            .mime_str("text/xml")
            .unwrap(),
    )
}

/// Give spawned bookkeeping a moment to land.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(150)).await;
}
