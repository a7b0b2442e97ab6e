use super::state::ReadinessState;
use crate::error::{Result, WrapperError};
use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use axum_server::tls_rustls::RustlsConfig;
use axum_server::Handle;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::Path;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Shared state for the readiness/control server
#[derive(Clone)]
pub struct ServerState {
    pub(crate) readiness: ReadinessState,
    pub(crate) token: CancellationToken,
}

impl ServerState {
    pub fn new(readiness: ReadinessState, token: CancellationToken) -> Self {
        Self { readiness, token }
    }
}

/// `/readyz` and `/stop` endpoints.
pub fn router(state: ServerState) -> Router {
    Router::new()
        .route("/readyz", get(readiness_handler))
        .route("/stop", post(stop_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Reports the last probe outcome, never probes itself.
pub async fn readiness_handler(State(state): State<ServerState>) -> impl IntoResponse {
    let ready = state.readiness.is_ready();
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(ready))
}

pub async fn stop_handler(State(state): State<ServerState>) -> impl IntoResponse {
    info!("Stop requested over HTTP, cancelling");
    state.token.cancel();
    StatusCode::OK
}

/// HTTP server for the orchestrator's readiness probe. Serves HTTPS when
/// bound with a certificate and key.
pub struct ReadyServer {
    listener: TcpListener,
    state: ServerState,
    tls: Option<RustlsConfig>,
}

impl ReadyServer {
    /// Bind on all interfaces. Port 0 picks an ephemeral port.
    pub async fn bind(port: u16, state: ServerState) -> Result<Self> {
        let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            state,
            tls: None,
        })
    }

    /// Bind like [`ReadyServer::bind`] and serve TLS with the given PEM files.
    /// Unreadable material fails here, before anything is served.
    pub async fn bind_tls(port: u16, state: ServerState, cert: &Path, key: &Path) -> Result<Self> {
        let tls = RustlsConfig::from_pem_file(cert, key)
            .await
            .map_err(|e| WrapperError::tls(cert.display().to_string(), e.to_string()))?;
        let mut server = Self::bind(port, state).await?;
        server.tls = Some(tls);
        Ok(server)
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn is_tls(&self) -> bool {
        self.tls.is_some()
    }

    /// Serve until the shared token is cancelled.
    pub async fn serve(self) -> Result<()> {
        let addr = self.local_addr()?;
        let token = self.state.token.clone();
        let app = router(self.state);

        match self.tls {
            Some(tls) => {
                info!("Readiness server listening on {} (https)", addr);
                let handle = Handle::new();
                let shutdown = handle.clone();
                tokio::spawn(async move {
                    token.cancelled().await;
                    shutdown.graceful_shutdown(None);
                });

                axum_server::from_tcp_rustls(self.listener.into_std()?, tls)
                    .handle(handle)
                    .serve(app.into_make_service())
                    .await
                    .map_err(|e| WrapperError::system(format!("readiness server error: {}", e)))?;
            }
            None => {
                info!("Readiness server listening on {}", addr);
                axum::serve(self.listener, app)
                    .with_graceful_shutdown(async move { token.cancelled().await })
                    .await
                    .map_err(|e| WrapperError::system(format!("readiness server error: {}", e)))?;
            }
        }

        info!("Readiness server stopped");
        Ok(())
    }
}
