//! In-process fake device serving the OTA endpoints over real HTTP.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Router;
use axum::body::Bytes;
use axum::extract::{Form, Multipart, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Json;
use otapush_protocol::ContainerHeader;
use serde::Deserialize;

/// Upload session held by the fake device.
#[derive(Debug, Clone)]
pub struct FakeSession {
    pub id: String,
    pub total: u64,
    pub data: Vec<u8>,
}

#[derive(Debug, Default)]
pub struct DeviceState {
    pub session: Option<FakeSession>,
    pub next_id: u32,
    /// Chunk offsets that fail once without storing anything.
    pub drop_chunk_at: HashSet<u64>,
    /// Chunk offsets that are stored but answered with an error once.
    pub lose_ack_at: HashSet<u64>,
    /// Offsets of every chunk-write received, in order.
    pub chunk_log: Vec<u64>,
    /// Finalize sleeps this long before answering.
    pub finalize_delay: Option<Duration>,
    /// Image applied by the last accepted finalize.
    pub applied: Option<Vec<u8>>,
    /// `(path, file name, bytes)` of each simple upload.
    pub simple_uploads: Vec<(String, String, Vec<u8>)>,
    pub release_progress: Vec<serde_json::Value>,
}

pub type Shared = Arc<Mutex<DeviceState>>;

pub struct FakeDevice {
    pub addr: SocketAddr,
    pub state: Shared,
}

impl FakeDevice {
    pub async fn start() -> Self {
        let state: Shared = Arc::new(Mutex::new(DeviceState::default()));
        let app = Router::new()
            .route("/api/ota/session/start", post(session_start))
            .route("/api/ota/session/chunk", post(session_chunk))
            .route("/api/ota/session/status", get(session_status))
            .route("/api/ota/session/finalize", post(session_finalize))
            .route("/api/ota/upload", post(simple_firmware))
            .route("/api/ota/updatezip", post(simple_container))
            .route("/api/ota/github_check", get(release_check))
            .route("/api/ota/github_update", post(release_update))
            .route("/api/ota/github_progress", get(release_progress))
            .route("/api/status", get(status))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, state }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut DeviceState) -> R) -> R {
        f(&mut self.state.lock().unwrap())
    }
}

fn text(status: StatusCode, body: impl Into<String>) -> Response {
    (status, body.into()).into_response()
}

async fn session_start(
    State(state): State<Shared>,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    let Some(total) = form.get("size").and_then(|s| s.parse::<u64>().ok()) else {
        return text(StatusCode::BAD_REQUEST, "missing size");
    };
    let mut st = state.lock().unwrap();

    let reuse = st.session.as_ref().is_some_and(|s| s.total == total);
    if !reuse {
        st.next_id += 1;
        st.session = Some(FakeSession {
            id: format!("sess-{}", st.next_id),
            total,
            data: Vec::new(),
        });
    }
    let s = st.session.as_ref().unwrap();
    Json(serde_json::json!({ "id": s.id, "have": s.data.len(), "total": s.total })).into_response()
}

#[derive(Deserialize)]
struct ChunkQuery {
    id: String,
    offset: u64,
}

async fn session_chunk(
    State(state): State<Shared>,
    Query(q): Query<ChunkQuery>,
    body: Bytes,
) -> Response {
    let mut st = state.lock().unwrap();
    st.chunk_log.push(q.offset);

    if st.drop_chunk_at.remove(&q.offset) {
        return text(StatusCode::SERVICE_UNAVAILABLE, "flash busy");
    }
    let lose_ack = st.lose_ack_at.remove(&q.offset);

    let Some(session) = st.session.as_mut().filter(|s| s.id == q.id) else {
        return text(StatusCode::NOT_FOUND, "no session");
    };
    let have = session.data.len() as u64;
    if q.offset > have {
        return text(StatusCode::CONFLICT, "offset beyond committed bytes");
    }
    if q.offset + body.len() as u64 > session.total {
        return text(StatusCode::PAYLOAD_TOO_LARGE, "chunk past end");
    }
    session.data.truncate(q.offset as usize);
    session.data.extend_from_slice(&body);

    if lose_ack {
        return text(StatusCode::INTERNAL_SERVER_ERROR, "ack lost");
    }
    text(StatusCode::OK, "OK")
}

async fn session_status(State(state): State<Shared>) -> Response {
    let st = state.lock().unwrap();
    match &st.session {
        Some(s) => Json(serde_json::json!({ "have": s.data.len() })).into_response(),
        None => text(StatusCode::NOT_FOUND, "no session"),
    }
}

#[derive(Deserialize)]
struct FinalizeQuery {
    id: String,
}

async fn session_finalize(State(state): State<Shared>, Query(q): Query<FinalizeQuery>) -> Response {
    let delay = state.lock().unwrap().finalize_delay;
    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }

    let mut st = state.lock().unwrap();
    let Some(session) = st.session.take_if(|s| s.id == q.id) else {
        return text(StatusCode::NOT_FOUND, "no session");
    };
    if session.data.len() as u64 != session.total {
        return text(StatusCode::BAD_REQUEST, "incomplete upload");
    }
    let verdict = ContainerHeader::parse(&session.data)
        .and_then(|h| h.validate_len(session.data.len() as u64));
    match verdict {
        Ok(()) => {
            st.applied = Some(session.data);
            text(StatusCode::OK, "OK, rebooting")
        }
        Err(e) => text(StatusCode::BAD_REQUEST, format!("invalid container: {e}")),
    }
}

async fn record_simple(state: &Shared, path: &str, mut multipart: Multipart) -> Response {
    while let Ok(Some(field)) = multipart.next_field().await {
        if field.name() != Some("file") {
            continue;
        }
        let name = field.file_name().unwrap_or_default().to_string();
        let Ok(bytes) = field.bytes().await else {
            return text(StatusCode::BAD_REQUEST, "bad multipart");
        };
        state
            .lock()
            .unwrap()
            .simple_uploads
            .push((path.to_string(), name, bytes.to_vec()));
        return text(StatusCode::OK, "Update OK");
    }
    text(StatusCode::BAD_REQUEST, "missing file field")
}

async fn simple_firmware(State(state): State<Shared>, multipart: Multipart) -> Response {
    record_simple(&state, "/api/ota/upload", multipart).await
}

async fn simple_container(State(state): State<Shared>, multipart: Multipart) -> Response {
    record_simple(&state, "/api/ota/updatezip", multipart).await
}

async fn release_check() -> Response {
    Json(serde_json::json!({ "ok": true, "tag": "v2.0.1", "size": 1_048_576 })).into_response()
}

async fn release_update() -> Response {
    text(StatusCode::OK, "Update started")
}

async fn release_progress(State(state): State<Shared>) -> Response {
    let mut st = state.lock().unwrap();
    if st.release_progress.is_empty() {
        return text(StatusCode::SERVICE_UNAVAILABLE, "idle");
    }
    Json(st.release_progress.remove(0)).into_response()
}

async fn status() -> Response {
    Json(serde_json::json!({
        "wifi": { "mode": "sta", "ip": "192.168.1.50", "ssid": "lab" },
        "app": { "name": "bridge", "version": "1.2.0" },
    }))
    .into_response()
}
