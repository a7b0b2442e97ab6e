use crate::bootstrap::{Initializer, StoreInitializer};
use crate::config::WrapperConfig;
use crate::engine::{EngineConfig, EngineLauncher, ProcessEngine};
use crate::error::Result;
use crate::marker::CrashMarker;
use crate::readiness::StoreProbe;
use crate::sidecar::HttpSidecarClient;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Top-level coordinator: runs the sidecar handshake, starts etcd and
/// serves readiness until the shared token is cancelled.
pub struct Application {
    pub(super) config: WrapperConfig,
    pub(super) token: CancellationToken,
    pub(super) marker: CrashMarker,

    // Components
    pub(super) initializer: Arc<dyn StoreInitializer>,
    pub(super) launcher: Arc<dyn EngineLauncher>,
    pub(super) probe: Option<Arc<dyn StoreProbe>>,

    // Filled in while starting up
    pub(super) engine_config: Option<EngineConfig>,
    pub(super) ready_addr: Option<SocketAddr>,
}

impl Application {
    /// Wire the HTTP sidecar client and the etcd process launcher.
    pub fn new(config: WrapperConfig, token: CancellationToken) -> Result<Self> {
        let client =
            HttpSidecarClient::from_config(&config.sidecar, config.engine_config_path.clone())?;
        let initializer = Initializer::new(
            Arc::new(client),
            CrashMarker::new(config.crash_marker_path.clone()),
        );
        let launcher = ProcessEngine::new(config.etcd_binary.clone());

        Ok(Self::with_components(
            config,
            token,
            Arc::new(initializer),
            Arc::new(launcher),
        ))
    }

    pub fn with_components(
        config: WrapperConfig,
        token: CancellationToken,
        initializer: Arc<dyn StoreInitializer>,
        launcher: Arc<dyn EngineLauncher>,
    ) -> Self {
        let marker = CrashMarker::new(config.crash_marker_path.clone());
        Self {
            config,
            token,
            marker,
            initializer,
            launcher,
            probe: None,
            engine_config: None,
            ready_addr: None,
        }
    }

    /// Use `probe` instead of building an [`crate::readiness::EtcdProbe`] from the configuration.
    pub fn with_probe(mut self, probe: Arc<dyn StoreProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    pub fn config(&self) -> &WrapperConfig {
        &self.config
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// etcd configuration obtained by [`Application::setup`].
    pub fn engine_config(&self) -> Option<&EngineConfig> {
        self.engine_config.as_ref()
    }

    /// Address the readiness server is bound to once started.
    pub fn ready_addr(&self) -> Option<SocketAddr> {
        self.ready_addr
    }
}
