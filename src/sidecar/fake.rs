//! In-process backup-restore stand-in serving scripted responses.

use super::HttpSidecarClient;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::get,
    Router,
};
use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

#[derive(Default)]
struct Script {
    statuses: VecDeque<(StatusCode, String)>,
    last_status: Option<(StatusCode, String)>,
    trigger_code: Option<StatusCode>,
    config: Option<(StatusCode, String)>,
    trigger_modes: Vec<String>,
}

#[derive(Default)]
struct FakeState {
    script: Mutex<Script>,
    status_calls: AtomicU32,
    config_calls: AtomicU32,
}

pub(crate) struct FakeSidecar {
    addr: SocketAddr,
    state: Arc<FakeState>,
    shutdown: CancellationToken,
}

impl FakeSidecar {
    pub(crate) async fn start() -> Self {
        let state = Arc::new(FakeState::default());
        let app = Router::new()
            .route("/initialization/status", get(status_handler))
            .route("/initialization/start", get(start_handler))
            .route("/config", get(config_handler))
            .with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shutdown = CancellationToken::new();
        let stop = shutdown.clone();
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move { stop.cancelled().await })
                .await
                .unwrap();
        });

        Self {
            addr,
            state,
            shutdown,
        }
    }

    pub(crate) fn client(&self, etcd_config_path: PathBuf) -> HttpSidecarClient {
        HttpSidecarClient::new(
            reqwest::Client::new(),
            format!("http://{}", self.addr),
            etcd_config_path,
        )
    }

    /// Queue status responses; the last one keeps being served once the queue drains.
    pub(crate) fn push_status(&self, code: StatusCode, body: &str) {
        let mut script = self.state.script.lock().unwrap();
        script.statuses.push_back((code, body.to_string()));
    }

    pub(crate) fn set_trigger_code(&self, code: StatusCode) {
        self.state.script.lock().unwrap().trigger_code = Some(code);
    }

    pub(crate) fn set_config(&self, code: StatusCode, body: &str) {
        self.state.script.lock().unwrap().config = Some((code, body.to_string()));
    }

    pub(crate) fn status_calls(&self) -> u32 {
        self.state.status_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn config_calls(&self) -> u32 {
        self.state.config_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn trigger_modes(&self) -> Vec<String> {
        self.state.script.lock().unwrap().trigger_modes.clone()
    }
}

impl Drop for FakeSidecar {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn status_handler(State(state): State<Arc<FakeState>>) -> (StatusCode, String) {
    state.status_calls.fetch_add(1, Ordering::SeqCst);
    let mut script = state.script.lock().unwrap();
    if let Some(next) = script.statuses.pop_front() {
        script.last_status = Some(next.clone());
        return next;
    }
    script
        .last_status
        .clone()
        .unwrap_or((StatusCode::OK, "New".to_string()))
}

async fn start_handler(
    State(state): State<Arc<FakeState>>,
    Query(params): Query<HashMap<String, String>>,
) -> StatusCode {
    let mut script = state.script.lock().unwrap();
    script
        .trigger_modes
        .push(params.get("mode").cloned().unwrap_or_default());
    script.trigger_code.unwrap_or(StatusCode::OK)
}

async fn config_handler(State(state): State<Arc<FakeState>>) -> (StatusCode, String) {
    state.config_calls.fetch_add(1, Ordering::SeqCst);
    let script = state.script.lock().unwrap();
    script
        .config
        .clone()
        .unwrap_or((StatusCode::NOT_FOUND, String::new()))
}
