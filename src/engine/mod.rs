mod config;
mod process;

pub use config::{ClientTlsFiles, EngineConfig, TransportSecurity};
pub use process::ProcessEngine;

use crate::error::{Result, WrapperError};
use crate::readiness::StoreProbe;
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Starts the etcd member once initialization is complete.
#[async_trait]
pub trait EngineLauncher: Send + Sync {
    /// Launch etcd with the configuration at `config_path`. `probe` decides
    /// when the member is ready; `token` stops it.
    async fn launch(
        &self,
        config_path: &Path,
        probe: Arc<dyn StoreProbe>,
        token: CancellationToken,
    ) -> Result<EngineHandle>;
}

/// Notifications from a running etcd member.
#[derive(Debug)]
pub struct EngineHandle {
    ready: CancellationToken,
    stopped: CancellationToken,
    errors: mpsc::Receiver<WrapperError>,
}

/// Sending half kept by the launcher implementation.
#[derive(Clone)]
pub struct EngineNotifier {
    pub ready: CancellationToken,
    pub stopped: CancellationToken,
    pub errors: mpsc::Sender<WrapperError>,
}

impl EngineHandle {
    pub fn channel() -> (EngineNotifier, EngineHandle) {
        let ready = CancellationToken::new();
        let stopped = CancellationToken::new();
        let (errors_tx, errors_rx) = mpsc::channel(4);
        (
            EngineNotifier {
                ready: ready.clone(),
                stopped: stopped.clone(),
                errors: errors_tx,
            },
            EngineHandle {
                ready,
                stopped,
                errors: errors_rx,
            },
        )
    }

    /// Resolves once etcd serves client requests.
    pub async fn ready(&self) {
        self.ready.cancelled().await
    }

    /// Resolves once etcd has stopped.
    pub async fn stopped(&self) {
        self.stopped.cancelled().await
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.is_cancelled()
    }

    /// Token fired once etcd has stopped, for waiting alongside [`Self::error`].
    pub fn stopped_token(&self) -> CancellationToken {
        self.stopped.clone()
    }

    /// Error already reported by etcd, if any.
    pub fn take_error(&mut self) -> Option<WrapperError> {
        self.errors.try_recv().ok()
    }

    /// Next fatal error reported by etcd. Pending forever once the sender is gone.
    pub async fn error(&mut self) -> WrapperError {
        match self.errors.recv().await {
            Some(err) => err,
            None => std::future::pending().await,
        }
    }
}
