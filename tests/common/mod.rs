//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::body::{to_bytes, Body};
use axum::extract::ConnectInfo;
use axum::http::{Request, StatusCode};
use axum::Router;
use fallback_proxy::config::{BackendConfig, ProxyConfig, RouteConfig, ServiceConfig};
use fallback_proxy::http::X_REQUEST_ID;
use fallback_proxy::service::ServiceRegistry;
use fallback_proxy::{HttpServer, Shutdown};
use tokio::net::TcpListener;

/// A backend answering every request from a closure.
pub struct MockBackend {
    pub addr: SocketAddr,
    hits: Arc<AtomicUsize>,
    request_ids: Arc<Mutex<Vec<String>>>,
    peers: Arc<Mutex<HashSet<SocketAddr>>>,
}

impl MockBackend {
    /// Distinct TCP connections the backend was reached on.
    pub fn connections(&self) -> usize {
        self.peers.lock().unwrap().len()
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    pub fn request_ids(&self) -> Vec<String> {
        self.request_ids.lock().unwrap().clone()
    }
}

/// Start a backend whose response depends on how many requests it has seen.
pub async fn start_programmable_backend<F>(respond: F) -> MockBackend
where
    F: Fn(usize) -> (u16, String) + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let hits = Arc::new(AtomicUsize::new(0));
    let request_ids = Arc::new(Mutex::new(Vec::new()));
    let peers = Arc::new(Mutex::new(HashSet::new()));
    let respond = Arc::new(respond);

    let counter = Arc::clone(&hits);
    let ids = Arc::clone(&request_ids);
    let seen = Arc::clone(&peers);
    let app = Router::new().fallback(move |ConnectInfo(peer): ConnectInfo<SocketAddr>, request: Request<Body>| {
        let respond = Arc::clone(&respond);
        let counter = Arc::clone(&counter);
        let ids = Arc::clone(&ids);
        let seen = Arc::clone(&seen);
        async move {
            seen.lock().unwrap().insert(peer);
            if let Some(id) = request.headers().get(X_REQUEST_ID).and_then(|v| v.to_str().ok()) {
                ids.lock().unwrap().push(id.to_string());
            }
            let _ = to_bytes(request.into_body(), usize::MAX).await;
            let (status, body) = respond(counter.fetch_add(1, Ordering::SeqCst));
            (StatusCode::from_u16(status).unwrap(), body)
        }
    });

    tokio::spawn(async move {
        axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
            .await
            .unwrap();
    });

    MockBackend {
        addr,
        hits,
        request_ids,
        peers,
    }
}

/// Start a backend that always returns `status` with `body`.
pub async fn start_mock_backend(status: u16, body: &'static str) -> MockBackend {
    start_programmable_backend(move |_| (status, body.to_string())).await
}

/// An address nothing listens on.
pub async fn closed_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

pub fn backend(name: &str, service: &str, addr: SocketAddr) -> BackendConfig {
    BackendConfig {
        name: name.into(),
        service: service.into(),
        address: addr.to_string(),
        max_connections: 100,
    }
}

/// `legacy` falls back to `modern` on `condition`; every path routes to `legacy`.
pub fn fallback_config(primary: SocketAddr, fallback: SocketAddr, condition: &str) -> ProxyConfig {
    let mut config = ProxyConfig::default();
    config
        .services
        .push(ServiceConfig::reverse_proxy("legacy").with_fallback("modern", condition));
    config.services.push(ServiceConfig::reverse_proxy("modern"));
    config.backends.push(backend("legacy-1", "legacy", primary));
    config.backends.push(backend("modern-1", "modern", fallback));
    config.routes.push(RouteConfig {
        name: "all".into(),
        host: None,
        path_prefix: Some("/".into()),
        service: "legacy".into(),
        priority: 0,
    });
    config
}

/// A proxy running on an ephemeral port. Shuts down on drop.
pub struct TestProxy {
    pub addr: SocketAddr,
    pub registry: Arc<ServiceRegistry>,
    shutdown: Shutdown,
}

impl TestProxy {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

impl Drop for TestProxy {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

pub async fn start_proxy(mut config: ProxyConfig) -> TestProxy {
    config.health_check.enabled = false;
    config.observability.metrics_enabled = false;

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = HttpServer::new(config).unwrap();
    let registry = server.registry();

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = server.run(listener, server_shutdown).await;
    });

    TestProxy {
        addr,
        registry,
        shutdown,
    }
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}
