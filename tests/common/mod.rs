//! Shared test fixtures
//!
//! [`FakeAppliance`] serves the four iControl REST endpoints the exporter uses on
//! an ephemeral localhost port. Every endpoint counts its calls and can be
//! scripted with a queue of status codes to answer with before it behaves.
//!
//! [`StallingAppliance`] speaks raw HTTP/1.1 and goes silent halfway through a
//! response body, which axum cannot be made to do.

#![allow(dead_code)]

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Router,
};
use f5ltm_exporter::config::F5Config;
use f5ltm_exporter::f5::Endpoint;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::task::JoinHandle;

/// Expiry reported by the fake login endpoint
#[derive(Debug, Clone, Copy)]
pub enum Expiry {
    /// `expirationMicros` set to now + the given duration
    In(Duration),
    /// Literal `expirationMicros` value
    Micros(i64),
    /// No `expirationMicros` key at all
    Missing,
}

#[derive(Debug)]
pub struct FakeState {
    pub logins: AtomicUsize,
    pub logouts: AtomicUsize,
    pub stats_calls: AtomicUsize,
    pub sync_calls: AtomicUsize,

    pub login_statuses: Mutex<VecDeque<u16>>,
    pub stats_statuses: Mutex<VecDeque<u16>>,
    pub sync_statuses: Mutex<VecDeque<u16>>,

    pub expiry: Mutex<Expiry>,
    pub stats_body: Mutex<String>,
    pub sync_body: Mutex<String>,
    pub stats_delay: Mutex<Duration>,

    pub last_login_body: Mutex<Option<Value>>,
    pub last_token_header: Mutex<Option<String>>,
    pub last_logout_token: Mutex<Option<String>>,
    pub last_logout_authorization: Mutex<Option<String>>,
}

impl Default for FakeState {
    fn default() -> Self {
        Self {
            logins: AtomicUsize::new(0),
            logouts: AtomicUsize::new(0),
            stats_calls: AtomicUsize::new(0),
            sync_calls: AtomicUsize::new(0),
            login_statuses: Mutex::new(VecDeque::new()),
            stats_statuses: Mutex::new(VecDeque::new()),
            sync_statuses: Mutex::new(VecDeque::new()),
            expiry: Mutex::new(Expiry::In(Duration::from_secs(3600))),
            stats_body: Mutex::new(pool_stats(&[pool_entry(
                "/Common/app-pool",
                "available",
                3,
                4,
                5,
            )])),
            sync_body: Mutex::new(sync_status(&["In Sync"])),
            stats_delay: Mutex::new(Duration::ZERO),
            last_login_body: Mutex::new(None),
            last_token_header: Mutex::new(None),
            last_logout_token: Mutex::new(None),
            last_logout_authorization: Mutex::new(None),
        }
    }
}

pub struct FakeAppliance {
    pub addr: SocketAddr,
    pub state: Arc<FakeState>,
    handle: JoinHandle<()>,
}

impl FakeAppliance {
    pub async fn start() -> Self {
        let state = Arc::new(FakeState::default());

        let app = Router::new()
            .route("/mgmt/shared/authn/login", post(login))
            .route("/mgmt/shared/authz/tokens/{token}", delete(logout))
            .route("/mgmt/tm/ltm/pool/stats", get(pool_stats_handler))
            .route("/mgmt/tm/cm/sync-status", get(sync_status_handler))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind fake appliance");
        let addr = listener.local_addr().expect("local addr");
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.expect("fake appliance");
        });

        Self {
            addr,
            state,
            handle,
        }
    }

    /// `host:port` string suitable for the `target` parameter
    pub fn target(&self) -> String {
        self.addr.to_string()
    }

    pub fn endpoint(&self) -> Endpoint {
        Endpoint::new("http", self.addr.ip().to_string(), self.addr.port())
    }

    /// Plain-HTTP config with fast retries pointing at this appliance
    pub fn config(&self) -> F5Config {
        let mut config = F5Config::new("monitor", "s3cret");
        config.use_tls = false;
        config.port = self.addr.port();
        config.retry_delay_ms = 1;
        config.timeout_seconds = 5;
        config
    }

    pub fn logins(&self) -> usize {
        self.state.logins.load(Ordering::SeqCst)
    }

    pub fn logouts(&self) -> usize {
        self.state.logouts.load(Ordering::SeqCst)
    }

    pub fn stats_calls(&self) -> usize {
        self.state.stats_calls.load(Ordering::SeqCst)
    }

    pub fn sync_calls(&self) -> usize {
        self.state.sync_calls.load(Ordering::SeqCst)
    }

    pub fn outbound_calls(&self) -> usize {
        self.logins() + self.logouts() + self.stats_calls() + self.sync_calls()
    }

    pub fn script_login(&self, statuses: &[u16]) {
        self.state
            .login_statuses
            .lock()
            .unwrap()
            .extend(statuses.iter().copied());
    }

    pub fn script_stats(&self, statuses: &[u16]) {
        self.state
            .stats_statuses
            .lock()
            .unwrap()
            .extend(statuses.iter().copied());
    }

    pub fn script_sync(&self, statuses: &[u16]) {
        self.state
            .sync_statuses
            .lock()
            .unwrap()
            .extend(statuses.iter().copied());
    }

    pub fn set_expiry(&self, expiry: Expiry) {
        *self.state.expiry.lock().unwrap() = expiry;
    }

    pub fn set_stats_body(&self, body: impl Into<String>) {
        *self.state.stats_body.lock().unwrap() = body.into();
    }

    pub fn set_sync_body(&self, body: impl Into<String>) {
        *self.state.sync_body.lock().unwrap() = body.into();
    }

    pub fn set_stats_delay(&self, delay: Duration) {
        *self.state.stats_delay.lock().unwrap() = delay;
    }

    pub fn last_login_body(&self) -> Option<Value> {
        self.state.last_login_body.lock().unwrap().clone()
    }

    pub fn last_token_header(&self) -> Option<String> {
        self.state.last_token_header.lock().unwrap().clone()
    }

    pub fn last_logout_token(&self) -> Option<String> {
        self.state.last_logout_token.lock().unwrap().clone()
    }

    pub fn last_logout_authorization(&self) -> Option<String> {
        self.state.last_logout_authorization.lock().unwrap().clone()
    }
}

impl Drop for FakeAppliance {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn scripted(queue: &Mutex<VecDeque<u16>>) -> Option<StatusCode> {
    queue
        .lock()
        .unwrap()
        .pop_front()
        .and_then(|code| StatusCode::from_u16(code).ok())
}

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

async fn login(State(state): State<Arc<FakeState>>, body: Bytes) -> Response {
    let n = state.logins.fetch_add(1, Ordering::SeqCst) + 1;
    *state.last_login_body.lock().unwrap() = serde_json::from_slice(&body).ok();

    if let Some(status) = scripted(&state.login_statuses) {
        return (status, "scripted failure").into_response();
    }

    let token = format!("tok{}", n);
    let body = match *state.expiry.lock().unwrap() {
        Expiry::In(duration) => {
            let expires = SystemTime::now() + duration;
            let micros = expires
                .duration_since(UNIX_EPOCH)
                .unwrap()
                .as_micros() as i64;
            json!({"username": "monitor", "token": {"token": token, "expirationMicros": micros}})
        }
        Expiry::Micros(micros) => {
            json!({"token": {"token": token, "expirationMicros": micros}})
        }
        Expiry::Missing => json!({"token": {"token": token}}),
    };

    (StatusCode::OK, body.to_string()).into_response()
}

async fn logout(
    State(state): State<Arc<FakeState>>,
    Path(token): Path<String>,
    headers: HeaderMap,
) -> Response {
    state.logouts.fetch_add(1, Ordering::SeqCst);
    *state.last_logout_token.lock().unwrap() = Some(token);
    *state.last_logout_authorization.lock().unwrap() = header(&headers, "authorization");
    StatusCode::OK.into_response()
}

async fn pool_stats_handler(State(state): State<Arc<FakeState>>, headers: HeaderMap) -> Response {
    state.stats_calls.fetch_add(1, Ordering::SeqCst);
    *state.last_token_header.lock().unwrap() = header(&headers, "x-f5-auth-token");

    let delay = *state.stats_delay.lock().unwrap();
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }

    if let Some(status) = scripted(&state.stats_statuses) {
        return (status, "scripted failure").into_response();
    }
    let body = state.stats_body.lock().unwrap().clone();
    (StatusCode::OK, body).into_response()
}

async fn sync_status_handler(State(state): State<Arc<FakeState>>, headers: HeaderMap) -> Response {
    state.sync_calls.fetch_add(1, Ordering::SeqCst);
    *state.last_token_header.lock().unwrap() = header(&headers, "x-f5-auth-token");

    if let Some(status) = scripted(&state.sync_statuses) {
        return (status, "scripted failure").into_response();
    }
    let body = state.sync_body.lock().unwrap().clone();
    (StatusCode::OK, body).into_response()
}

/// One pool stats entry as the appliance nests it
pub fn pool_entry(name: &str, availability: &str, active: i64, available: i64, members: i64) -> Value {
    json!({
        "activeMemberCnt": {"value": active},
        "availableMemberCnt": {"value": available},
        "memberCnt": {"value": members},
        "minActiveMembers": {"value": 0},
        "serverside.curConns": {"value": 12},
        "serverside.totConns": {"value": 3400},
        "status.availabilityState": {"description": availability},
        "status.enabledState": {"description": "enabled"},
        "status.statusReason": {"description": "The pool is available"},
        "tmName": {"description": name}
    })
}

/// Pool stats collection body wrapping `pools`
pub fn pool_stats(pools: &[Value]) -> String {
    let entries: serde_json::Map<String, Value> = pools
        .iter()
        .enumerate()
        .map(|(i, stats)| {
            (
                format!("https://localhost/mgmt/tm/ltm/pool/~Common~pool{}/stats", i),
                json!({"nestedStats": {"entries": stats}}),
            )
        })
        .collect();

    json!({
        "kind": "tm:ltm:pool:poolcollectionstats",
        "selfLink": "https://localhost/mgmt/tm/ltm/pool/stats?ver=15.1.0",
        "entries": entries
    })
    .to_string()
}

/// Sync status body with one entry per description, in the given order
pub fn sync_status(descriptions: &[&str]) -> String {
    let entries: Vec<String> = descriptions
        .iter()
        .enumerate()
        .map(|(i, description)| {
            format!(
                r#""https://localhost/mgmt/tm/cm/sync-status/{}":{{"nestedStats":{{"entries":{{"color":{{"description":"green"}},"status":{{"description":"{}"}}}}}}}}"#,
                i, description
            )
        })
        .collect();

    format!(
        r#"{{"kind":"tm:cm:sync-status:sync-statusstats","entries":{{{}}}}}"#,
        entries.join(",")
    )
}

/// Appliance that sends status line, headers and the first bytes of a body,
/// then holds the connection open without sending the rest.
///
/// With `stall_login` unset, logins succeed and only telemetry stalls.
pub struct StallingAppliance {
    addr: SocketAddr,
}

impl StallingAppliance {
    pub fn start(stall_login: bool) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind stalling appliance");
        let addr = listener.local_addr().expect("local addr");
        std::thread::spawn(move || {
            for stream in listener.incoming().flatten() {
                std::thread::spawn(move || serve_stalling(stream, stall_login));
            }
        });
        Self { addr }
    }

    pub fn target(&self) -> String {
        self.addr.to_string()
    }

    pub fn endpoint(&self) -> Endpoint {
        Endpoint::new("http", self.addr.ip().to_string(), self.addr.port())
    }

    /// Client timeout far beyond any deadline a test arms
    pub fn config(&self) -> F5Config {
        let mut config = F5Config::new("monitor", "s3cret");
        config.use_tls = false;
        config.port = self.addr.port();
        config.retry_delay_ms = 1;
        config.timeout_seconds = 60;
        config
    }
}

/// Read one request including its body and return the request path.
fn read_request(stream: &mut TcpStream) -> Option<String> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];

    let head_end = loop {
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
        let n = stream.read(&mut chunk).ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
    };

    let head = String::from_utf8_lossy(&buf[..head_end]).to_string();
    let length = head
        .lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse::<usize>().ok())
        .unwrap_or(0);

    while buf.len() < head_end + length {
        let n = stream.read(&mut chunk).ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
    }

    head.lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .map(str::to_string)
}

fn serve_stalling(mut stream: TcpStream, stall_login: bool) {
    let Some(path) = read_request(&mut stream) else {
        return;
    };

    if path.starts_with("/mgmt/shared/authn/login") && !stall_login {
        let body = json!({"token": {"token": "tok1"}}).to_string();
        let response = format!(
            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            body.len(),
            body
        );
        let _ = stream.write_all(response.as_bytes());
        let _ = stream.flush();
        return;
    }

    let _ = stream.write_all(
        b"HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: 4096\r\n\r\n{\"entries\":",
    );
    let _ = stream.flush();
    std::thread::sleep(Duration::from_secs(120));
}
