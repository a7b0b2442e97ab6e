use crate::engine::EngineConfig;
use crate::error::{Result, WrapperError};
use crate::marker::CrashMarker;
use crate::retry::{always_retry, retry};
use crate::sidecar::{InitStatus, SidecarClient};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Prepares the data directory and returns the configuration etcd starts with.
#[async_trait]
pub trait StoreInitializer: Send + Sync {
    async fn run(&self, token: &CancellationToken) -> Result<EngineConfig>;
}

/// Timing of the initialization handshake.
#[derive(Debug, Clone)]
pub struct InitializerSettings {
    /// Wait between two status polls
    pub poll_interval: Duration,
    /// Attempts at fetching the etcd configuration after success
    pub config_fetch_attempts: u32,
    pub config_fetch_backoff: Duration,
}

impl Default for InitializerSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            config_fetch_attempts: 5,
            config_fetch_backoff: Duration::from_secs(1),
        }
    }
}

/// Drives the handshake with the backup-restore sidecar: poll the status,
/// trigger initialization when it is `New`, and once it is `Successful`
/// fetch the etcd configuration.
///
/// Status and trigger failures are logged and polled again without limit.
/// Only cancellation and an exhausted configuration fetch end the handshake
/// with an error.
pub struct Initializer {
    client: Arc<dyn SidecarClient>,
    marker: CrashMarker,
    settings: InitializerSettings,
}

impl Initializer {
    pub fn new(client: Arc<dyn SidecarClient>, marker: CrashMarker) -> Self {
        Self::with_settings(client, marker, InitializerSettings::default())
    }

    pub fn with_settings(
        client: Arc<dyn SidecarClient>,
        marker: CrashMarker,
        settings: InitializerSettings,
    ) -> Self {
        Self {
            client,
            marker,
            settings,
        }
    }

    async fn wait_for_initialization(&self, token: &CancellationToken) -> Result<()> {
        loop {
            if token.is_cancelled() {
                return Err(WrapperError::Cancelled);
            }

            let status = match self.client.get_initialization_status(token).await {
                Ok(status) => status,
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) => {
                    error!("Error while fetching initialization status: {}", e);
                    InitStatus::Unknown
                }
            };
            info!(status = %status, "Fetched initialization status");

            if status == InitStatus::Successful {
                return Ok(());
            }

            if status == InitStatus::New {
                let mode = self.marker.validation_mode();
                info!(mode = %mode, "Initialization status is New, triggering initialization");
                match self.client.trigger_initialization(token, mode).await {
                    Ok(()) => {}
                    Err(e) if e.is_cancelled() => return Err(e),
                    Err(e) => error!("Error while triggering initialization: {}", e),
                }
            }

            tokio::select! {
                biased;
                _ = token.cancelled() => return Err(WrapperError::Cancelled),
                _ = tokio::time::sleep(self.settings.poll_interval) => {}
            }
        }
    }
}

#[async_trait]
impl StoreInitializer for Initializer {
    async fn run(&self, token: &CancellationToken) -> Result<EngineConfig> {
        self.wait_for_initialization(token).await?;
        info!("Etcd initialization succeeded");

        // The config endpoint may lag behind the reported success
        let config_path = retry(
            token,
            "GetEtcdConfig",
            || self.client.get_etcd_config(token),
            self.settings.config_fetch_attempts,
            self.settings.config_fetch_backoff,
            always_retry,
        )
        .await?;
        info!("Fetched etcd configuration into {}", config_path.display());

        EngineConfig::from_file(&config_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::marker::{INTERRUPT_MARKER, TERMINATED_MARKER};
    use crate::sidecar::fake::FakeSidecar;
    use crate::sidecar::ValidationType;
    use axum::http::StatusCode;
    use std::collections::VecDeque;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use tempfile::TempDir;

    const ETCD_CONFIG: &str = "name: etcd-main-0\ndata-dir: /var/etcd/data/new.etcd\n";

    fn fast_settings(attempts: u32) -> InitializerSettings {
        InitializerSettings {
            poll_interval: Duration::from_millis(5),
            config_fetch_attempts: attempts,
            config_fetch_backoff: Duration::from_millis(5),
        }
    }

    /// Test double answering from a script instead of over HTTP.
    struct ScriptedClient {
        statuses: Mutex<VecDeque<Result<InitStatus>>>,
        triggers: Mutex<Vec<ValidationType>>,
        status_calls: AtomicU32,
        config_calls: AtomicU32,
        config_path: PathBuf,
    }

    impl ScriptedClient {
        fn new(statuses: Vec<Result<InitStatus>>, config_path: PathBuf) -> Arc<Self> {
            Arc::new(Self {
                statuses: Mutex::new(statuses.into()),
                triggers: Mutex::new(Vec::new()),
                status_calls: AtomicU32::new(0),
                config_calls: AtomicU32::new(0),
                config_path,
            })
        }
    }

    #[async_trait]
    impl SidecarClient for ScriptedClient {
        async fn get_initialization_status(&self, _token: &CancellationToken) -> Result<InitStatus> {
            self.status_calls.fetch_add(1, Ordering::SeqCst);
            self.statuses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Ok(InitStatus::InProgress))
        }

        async fn trigger_initialization(
            &self,
            _token: &CancellationToken,
            validation: ValidationType,
        ) -> Result<()> {
            self.triggers.lock().unwrap().push(validation);
            Ok(())
        }

        async fn get_etcd_config(&self, _token: &CancellationToken) -> Result<PathBuf> {
            self.config_calls.fetch_add(1, Ordering::SeqCst);
            std::fs::write(&self.config_path, ETCD_CONFIG)?;
            Ok(self.config_path.clone())
        }
    }

    #[tokio::test]
    async fn test_in_progress_then_successful_never_triggers() {
        let dir = TempDir::new().unwrap();
        let client = ScriptedClient::new(
            vec![
                Ok(InitStatus::InProgress),
                Ok(InitStatus::InProgress),
                Ok(InitStatus::InProgress),
                Ok(InitStatus::Successful),
            ],
            dir.path().join("etcd.conf.yaml"),
        );
        let initializer = Initializer::with_settings(
            client.clone(),
            CrashMarker::new(dir.path().join("exit_code")),
            fast_settings(5),
        );

        let config = initializer.run(&CancellationToken::new()).await.unwrap();

        assert_eq!(config.name, "etcd-main-0");
        assert_eq!(client.status_calls.load(Ordering::SeqCst), 4);
        assert!(client.triggers.lock().unwrap().is_empty());
        assert_eq!(client.config_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_wait_per_unfinished_poll() {
        let dir = TempDir::new().unwrap();
        let client = ScriptedClient::new(
            vec![
                Ok(InitStatus::InProgress),
                Ok(InitStatus::InProgress),
                Ok(InitStatus::InProgress),
                Ok(InitStatus::Successful),
            ],
            dir.path().join("etcd.conf.yaml"),
        );
        let initializer = Initializer::with_settings(
            client.clone(),
            CrashMarker::new(dir.path().join("exit_code")),
            InitializerSettings {
                poll_interval: Duration::from_secs(1),
                config_fetch_attempts: 5,
                config_fetch_backoff: Duration::from_secs(1),
            },
        );

        let started = tokio::time::Instant::now();
        initializer.run(&CancellationToken::new()).await.unwrap();
        let elapsed = started.elapsed();

        // No wait after the Successful poll nor before the first config fetch
        assert!(elapsed >= Duration::from_secs(3), "elapsed {:?}", elapsed);
        assert!(elapsed < Duration::from_secs(4), "elapsed {:?}", elapsed);
        assert_eq!(client.status_calls.load(Ordering::SeqCst), 4);
        assert_eq!(client.config_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_status_errors_are_polled_again() {
        let dir = TempDir::new().unwrap();
        let client = ScriptedClient::new(
            vec![
                Err(WrapperError::system("connection refused")),
                Err(WrapperError::sidecar(
                    "get initialization status",
                    reqwest::StatusCode::BAD_REQUEST,
                )),
                Ok(InitStatus::Successful),
            ],
            dir.path().join("etcd.conf.yaml"),
        );
        let initializer = Initializer::with_settings(
            client.clone(),
            CrashMarker::new(dir.path().join("exit_code")),
            fast_settings(5),
        );

        assert!(initializer.run(&CancellationToken::new()).await.is_ok());
        assert_eq!(client.status_calls.load(Ordering::SeqCst), 3);
        assert!(client.triggers.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_trigger_mode_follows_crash_marker() {
        let cases = [
            (None, ValidationType::Full),
            (Some(INTERRUPT_MARKER), ValidationType::Sanity),
            (Some(TERMINATED_MARKER), ValidationType::Sanity),
            (Some("banana"), ValidationType::Full),
        ];

        for (content, expected) in cases {
            let dir = TempDir::new().unwrap();
            let marker = CrashMarker::new(dir.path().join("exit_code"));
            if let Some(content) = content {
                marker.capture(content).unwrap();
            }
            let client = ScriptedClient::new(
                vec![Ok(InitStatus::New), Ok(InitStatus::Successful)],
                dir.path().join("etcd.conf.yaml"),
            );
            let initializer = Initializer::with_settings(client.clone(), marker, fast_settings(5));

            initializer.run(&CancellationToken::new()).await.unwrap();

            assert_eq!(*client.triggers.lock().unwrap(), vec![expected], "marker: {:?}", content);
        }
    }

    #[tokio::test]
    async fn test_cancellation_while_polling() {
        let dir = TempDir::new().unwrap();
        // Never reports success
        let client = ScriptedClient::new(Vec::new(), dir.path().join("etcd.conf.yaml"));
        let initializer = Initializer::with_settings(
            client.clone(),
            CrashMarker::new(dir.path().join("exit_code")),
            InitializerSettings {
                poll_interval: Duration::from_secs(30),
                ..fast_settings(5)
            },
        );
        let token = CancellationToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            canceller.cancel();
        });

        let result = tokio::time::timeout(Duration::from_secs(5), initializer.run(&token))
            .await
            .expect("initializer ignored cancellation");

        assert!(result.unwrap_err().is_cancelled());
        assert_eq!(client.status_calls.load(Ordering::SeqCst), 1);
        assert_eq!(client.config_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_handshake_over_http_triggers_full_validation() {
        let dir = TempDir::new().unwrap();
        let sidecar = FakeSidecar::start().await;
        sidecar.push_status(StatusCode::OK, "New");
        sidecar.push_status(StatusCode::OK, "Successful");
        sidecar.set_config(StatusCode::OK, ETCD_CONFIG);

        let initializer = Initializer::with_settings(
            Arc::new(sidecar.client(dir.path().join("etcd.conf.yaml"))),
            CrashMarker::new(dir.path().join("exit_code")),
            fast_settings(5),
        );

        let config = initializer.run(&CancellationToken::new()).await.unwrap();

        assert_eq!(config.data_dir, "/var/etcd/data/new.etcd");
        assert_eq!(sidecar.trigger_modes(), vec!["full"]);
        assert_eq!(sidecar.status_calls(), 2);
        assert_eq!(sidecar.config_calls(), 1);
    }

    #[tokio::test]
    async fn test_failed_trigger_is_retried_on_next_new() {
        let dir = TempDir::new().unwrap();
        let sidecar = FakeSidecar::start().await;
        sidecar.push_status(StatusCode::OK, "New");
        sidecar.push_status(StatusCode::OK, "New");
        sidecar.push_status(StatusCode::OK, "Successful");
        sidecar.set_trigger_code(StatusCode::INTERNAL_SERVER_ERROR);
        sidecar.set_config(StatusCode::OK, ETCD_CONFIG);

        let initializer = Initializer::with_settings(
            Arc::new(sidecar.client(dir.path().join("etcd.conf.yaml"))),
            CrashMarker::new(dir.path().join("exit_code")),
            fast_settings(5),
        );

        let config = initializer.run(&CancellationToken::new()).await.unwrap();

        assert_eq!(config.name, "etcd-main-0");
        assert_eq!(sidecar.trigger_modes(), vec!["full", "full"]);
        assert_eq!(sidecar.status_calls(), 3);
        assert_eq!(sidecar.config_calls(), 1);
    }

    #[tokio::test]
    async fn test_config_fetch_exhausted_returns_error() {
        let dir = TempDir::new().unwrap();
        let sidecar = FakeSidecar::start().await;
        sidecar.push_status(StatusCode::OK, "Successful");
        sidecar.set_config(StatusCode::NOT_FOUND, "");

        let initializer = Initializer::with_settings(
            Arc::new(sidecar.client(dir.path().join("etcd.conf.yaml"))),
            CrashMarker::new(dir.path().join("exit_code")),
            fast_settings(3),
        );

        let result = initializer.run(&CancellationToken::new()).await;

        match result {
            Err(WrapperError::Sidecar { status, .. }) => assert_eq!(status.as_u16(), 404),
            other => panic!("expected sidecar error, got {:?}", other.map(|c| c.name)),
        }
        assert_eq!(sidecar.config_calls(), 3);
    }

    #[tokio::test]
    async fn test_malformed_config_is_fatal() {
        let dir = TempDir::new().unwrap();
        let sidecar = FakeSidecar::start().await;
        sidecar.push_status(StatusCode::OK, "Successful");
        sidecar.set_config(StatusCode::OK, "data-dir: [unterminated\n");

        let initializer = Initializer::with_settings(
            Arc::new(sidecar.client(dir.path().join("etcd.conf.yaml"))),
            CrashMarker::new(dir.path().join("exit_code")),
            fast_settings(3),
        );

        let result = initializer.run(&CancellationToken::new()).await;

        assert!(matches!(result, Err(WrapperError::Config(_))));
        assert_eq!(sidecar.config_calls(), 1);
    }
}
