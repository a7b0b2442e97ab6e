use super::{EngineHandle, EngineLauncher, EngineNotifier};
use crate::error::{Result, WrapperError};
use crate::readiness::StoreProbe;
use async_trait::async_trait;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Time etcd gets to exit after SIGTERM before it is killed
pub const DEFAULT_STOP_GRACE: Duration = Duration::from_secs(10);

/// Time between readiness checks while etcd is starting
pub const DEFAULT_READY_POLL: Duration = Duration::from_millis(500);

/// Runs etcd as a child process.
pub struct ProcessEngine {
    binary: String,
    stop_grace: Duration,
    ready_poll: Duration,
}

impl ProcessEngine {
    pub fn new<S: Into<String>>(binary: S) -> Self {
        Self {
            binary: binary.into(),
            stop_grace: DEFAULT_STOP_GRACE,
            ready_poll: DEFAULT_READY_POLL,
        }
    }

    pub fn with_stop_grace(mut self, stop_grace: Duration) -> Self {
        self.stop_grace = stop_grace;
        self
    }

    pub fn with_ready_poll(mut self, ready_poll: Duration) -> Self {
        self.ready_poll = ready_poll;
        self
    }
}

#[async_trait]
impl EngineLauncher for ProcessEngine {
    async fn launch(
        &self,
        config_path: &Path,
        probe: Arc<dyn StoreProbe>,
        token: CancellationToken,
    ) -> Result<EngineHandle> {
        info!(
            "Launching {} with configuration {}",
            self.binary,
            config_path.display()
        );

        let child = Command::new(&self.binary)
            .arg("--config-file")
            .arg(config_path)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| WrapperError::engine(format!("failed to spawn {}: {}", self.binary, e)))?;

        let (notifier, handle) = EngineHandle::channel();

        tokio::spawn(watch_ready(
            probe,
            notifier.clone(),
            token.clone(),
            self.ready_poll,
        ));
        tokio::spawn(supervise(child, notifier, token, self.stop_grace));

        Ok(handle)
    }
}

/// Fire `ready` on the first successful probe.
async fn watch_ready(
    probe: Arc<dyn StoreProbe>,
    notifier: EngineNotifier,
    token: CancellationToken,
    poll: Duration,
) {
    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => return,
            _ = notifier.stopped.cancelled() => return,
            _ = sleep(poll) => {}
        }

        if probe.check().await.is_ok() {
            notifier.ready.cancel();
            return;
        }
    }
}

/// Reap the child, stopping it when `token` is cancelled.
async fn supervise(
    mut child: Child,
    notifier: EngineNotifier,
    token: CancellationToken,
    stop_grace: Duration,
) {
    let exited = tokio::select! {
        status = child.wait() => Some(status),
        _ = token.cancelled() => None,
    };
    let status = match exited {
        Some(status) => status,
        None => stop_child(&mut child, stop_grace).await,
    };

    match status {
        Ok(status) if status.success() => info!("etcd exited cleanly"),
        Ok(status) => {
            error!("etcd exited with {}", status);
            let _ = notifier
                .errors
                .send(WrapperError::engine(format!("etcd exited with {}", status)))
                .await;
        }
        Err(e) => {
            error!("Failed waiting for etcd: {}", e);
            let _ = notifier.errors.send(e.into()).await;
        }
    }

    notifier.stopped.cancel();
}

async fn stop_child(child: &mut Child, stop_grace: Duration) -> std::io::Result<ExitStatus> {
    if let Some(pid) = child.id() {
        info!("Sending SIGTERM to etcd (pid {})", pid);
        // SAFETY: plain kill(2) on a pid we spawned and have not reaped yet
        let rc = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
        if rc != 0 {
            warn!(
                "Failed to send SIGTERM to etcd: {}",
                std::io::Error::last_os_error()
            );
        }
    }

    match timeout(stop_grace, child.wait()).await {
        Ok(status) => status,
        Err(_) => {
            warn!("etcd did not stop within {:?}, killing it", stop_grace);
            child.kill().await?;
            child.wait().await
        }
    }
}
