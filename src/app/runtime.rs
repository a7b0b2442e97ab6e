use super::Application;
use crate::engine::EngineHandle;
use crate::error::{Result, WrapperError};
use std::time::Duration;
use tokio::time::timeout;
use tracing::{info, warn};

/// How long shutdown waits for etcd to exit after cancellation
pub const ENGINE_STOP_TIMEOUT: Duration = Duration::from_secs(20);

impl Application {
    /// Launch etcd and block until the token is cancelled, etcd stops, or
    /// etcd reports a fatal error.
    pub async fn start(&mut self) -> Result<()> {
        let mut engine = self.launch().await?;
        self.wait(&mut engine).await
    }

    /// Three-way wait on a running etcd.
    pub async fn wait(&self, engine: &mut EngineHandle) -> Result<()> {
        let stopped = engine.stopped_token();

        tokio::select! {
            biased;
            _ = self.token.cancelled() => {
                info!("Shutdown requested, waiting for etcd to stop");
                if timeout(ENGINE_STOP_TIMEOUT, stopped.cancelled()).await.is_err() {
                    warn!("etcd did not stop within {:?}", ENGINE_STOP_TIMEOUT);
                }
                Ok(())
            }
            err = engine.error() => Err(err),
            _ = stopped.cancelled() => Err(WrapperError::engine("etcd server has been aborted")),
        }
    }

    /// Cancel the shared token unless that already happened.
    pub fn close(&self) {
        if !self.token.is_cancelled() {
            info!("Closing application");
            self.token.cancel();
        }
    }

    /// Handshake, start etcd and wait, then close. Cancellation is a clean
    /// shutdown, any other error is returned.
    pub async fn run(&mut self) -> Result<()> {
        let result = match self.setup().await {
            Ok(()) => self.start().await,
            Err(e) => Err(e),
        };
        self.close();

        match result {
            Err(e) if e.is_cancelled() => {
                info!("Application cancelled before etcd was running");
                Ok(())
            }
            other => other,
        }
    }
}
