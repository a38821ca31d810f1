/*!
Test Harness pour le reporter nextcloud-influx

Facilite l'écriture de tests avec:
- Un faux serveur Nextcloud (axum) qui sert des réponses serverinfo configurables
- Un faux InfluxDB qui enregistre les écritures line protocol
- Setup automatique du sink et du heartbeat mockés
*/

use crate::fixtures::{serverinfo_payload, SERVERINFO_PATH};
use crate::sink_stub::{MockSink, RecordingHeartbeat};
use anyhow::Result;
use axum::extract::{RawQuery, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::Router;
use nextcloud_influx::{InstanceConfig, NextcloudInstance, Reporter};
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// Requête reçue par un faux serveur
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub query: Option<String>,
    pub authorization: Option<String>,
    pub body: String,
}

fn record(query: Option<String>, headers: &HeaderMap, body: String) -> RecordedRequest {
    RecordedRequest {
        query,
        authorization: headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        body,
    }
}

async fn serve(app: Router) -> Result<(SocketAddr, JoinHandle<()>)> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!("fake server stopped: {}", e);
        }
    });
    Ok((addr, handle))
}

#[derive(Default)]
struct NextcloudState {
    response: Mutex<(u16, String)>,
    delay: Mutex<Option<Duration>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

/// Faux endpoint serverinfo
pub struct FakeNextcloud {
    addr: SocketAddr,
    state: Arc<NextcloudState>,
    handle: JoinHandle<()>,
}

impl FakeNextcloud {
    /// Démarre le serveur; il répond 200 avec `serverinfo_payload()` par défaut
    pub async fn start() -> Result<Self> {
        let state = Arc::new(NextcloudState::default());
        *state.response.lock() = (200, serverinfo_payload().to_string());

        let app = Router::new()
            .route(SERVERINFO_PATH, get(serverinfo))
            .with_state(state.clone());
        let (addr, handle) = serve(app).await?;

        Ok(Self { addr, state, handle })
    }

    /// URL à mettre dans la config de l'instance
    pub fn url(&self) -> String {
        format!("http://{}{}", self.addr, SERVERINFO_PATH)
    }

    /// Change la réponse servie
    pub fn respond_with(&self, status: u16, body: impl Into<String>) {
        *self.state.response.lock() = (status, body.into());
    }

    /// Retarde chaque réponse (pour tester les timeouts)
    pub fn delay_responses(&self, delay: Duration) {
        *self.state.delay.lock() = Some(delay);
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.requests.lock().clone()
    }
}

impl Drop for FakeNextcloud {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn serverinfo(
    State(state): State<Arc<NextcloudState>>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
) -> (StatusCode, String) {
    state.requests.lock().push(record(query.clone(), &headers, String::new()));

    let delay = *state.delay.lock();
    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }

    if query.as_deref() != Some("format=json") {
        return (StatusCode::BAD_REQUEST, "format=json expected".to_string());
    }

    let (status, body) = state.response.lock().clone();
    (
        StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
        body,
    )
}

#[derive(Default)]
struct InfluxState {
    status: Mutex<u16>,
    writes: Mutex<Vec<RecordedRequest>>,
}

/// Faux InfluxDB 1.x (`POST /write`)
pub struct FakeInflux {
    addr: SocketAddr,
    state: Arc<InfluxState>,
    handle: JoinHandle<()>,
}

impl FakeInflux {
    /// Démarre le serveur; il répond 204 par défaut
    pub async fn start() -> Result<Self> {
        let state = Arc::new(InfluxState::default());
        *state.status.lock() = 204;

        let app = Router::new()
            .route("/write", post(write))
            .with_state(state.clone());
        let (addr, handle) = serve(app).await?;

        Ok(Self { addr, state, handle })
    }

    pub fn host(&self) -> String {
        self.addr.ip().to_string()
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub fn respond_with(&self, status: u16) {
        *self.state.status.lock() = status;
    }

    pub fn writes(&self) -> Vec<RecordedRequest> {
        self.state.writes.lock().clone()
    }
}

impl Drop for FakeInflux {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn write(
    State(state): State<Arc<InfluxState>>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
    body: String,
) -> StatusCode {
    state.writes.lock().push(record(query, &headers, body));
    let status = *state.status.lock();
    StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

/// Harness de test complet pour le reporter
pub struct TestHarness {
    pub sink: MockSink,
    pub heartbeat: RecordingHeartbeat,
}

impl TestHarness {
    /// Crée un nouveau harness de test
    pub fn new() -> Self {
        // Init logging pour tests
        tracing_subscriber::fmt()
            .with_test_writer()
            .try_init()
            .ok();

        Self {
            sink: MockSink::new(),
            heartbeat: RecordingHeartbeat::new(),
        }
    }

    /// Config d'instance pointant sur `url`, avec un timeout court
    pub fn instance_config(name: &str, url: &str) -> InstanceConfig {
        InstanceConfig {
            name: name.to_string(),
            user: "admin".to_string(),
            password: "secret".to_string(),
            url: url.to_string(),
            timeout: Duration::from_secs(2),
            verify_ssl: true,
        }
    }

    pub fn instance(name: &str, url: &str) -> NextcloudInstance {
        NextcloudInstance::new(Self::instance_config(name, url))
            .expect("reqwest client should build")
    }

    /// Reporter branché sur le sink et le heartbeat du harness
    pub fn reporter(&self, instances: Vec<NextcloudInstance>, interval: Duration) -> Reporter {
        Reporter::new(
            instances,
            Box::new(self.sink.clone()),
            Box::new(self.heartbeat.clone()),
            interval,
        )
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fake_nextcloud_serves_payload() {
        let server = FakeNextcloud::start().await.unwrap();
        let sut = TestHarness::instance("sut", &server.url());

        let tree = sut.fetch().await.unwrap();
        assert_eq!(tree, serverinfo_payload());

        let requests = server.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].query.as_deref(), Some("format=json"));
        // admin:secret
        assert_eq!(requests[0].authorization.as_deref(), Some("Basic YWRtaW46c2VjcmV0"));
    }

    #[test]
    fn test_instance_config_defaults() {
        let cfg = TestHarness::instance_config("sut", "http://here.example");
        assert_eq!(cfg.timeout, Duration::from_secs(2));
        assert!(cfg.verify_ssl);
    }
}
