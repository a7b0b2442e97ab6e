use super::Application;
use crate::engine::{EngineConfig, EngineHandle};
use crate::error::{Result, WrapperError};
use crate::readiness::{
    readiness, EtcdProbe, ProbeTls, ReadinessMonitor, ReadyServer, ServerState, StoreProbe,
};
use std::sync::Arc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

impl Application {
    /// Run the sidecar handshake and keep the resulting etcd configuration.
    pub async fn setup(&mut self) -> Result<()> {
        info!(
            "Starting initialization handshake with sidecar at {}",
            self.config.sidecar.base_address()
        );

        let engine_config = self.initializer.run(&self.token).await?;
        info!(
            name = %engine_config.name,
            data_dir = %engine_config.data_dir,
            "Initialization handshake complete"
        );

        self.engine_config = Some(engine_config);
        Ok(())
    }

    /// Start the readiness subsystem and etcd, then wait for etcd to serve.
    /// The crash marker is removed once etcd is ready.
    pub async fn launch(&mut self) -> Result<EngineHandle> {
        let engine_config = self.engine_config.as_ref().ok_or_else(|| {
            WrapperError::system("etcd configuration missing, setup has not completed")
        })?;
        let tls = self.probe_tls(engine_config);
        let probe: Arc<dyn StoreProbe> = match &self.probe {
            Some(probe) => Arc::clone(probe),
            None => Arc::new(EtcdProbe::new(self.config.client_port, tls.as_ref())?),
        };

        // etcd's client certificate also secures the readiness endpoint
        let (reporter, readiness_state) = readiness();
        let state = ServerState::new(readiness_state, self.token.clone());
        let server = match &tls {
            Some(tls) => {
                ReadyServer::bind_tls(self.config.ready_port, state, &tls.cert, &tls.key).await?
            }
            None => ReadyServer::bind(self.config.ready_port, state).await?,
        };
        self.ready_addr = Some(server.local_addr()?);
        tokio::spawn(async move {
            if let Err(e) = server.serve().await {
                error!("Readiness server failed: {}", e);
            }
        });
        tokio::spawn(ReadinessMonitor::new(Arc::clone(&probe), reporter).run(self.token.clone()));

        let mut engine = self
            .launcher
            .launch(&self.config.engine_config_path, probe, self.token.clone())
            .await?;

        self.wait_until_ready(&mut engine).await?;
        info!("etcd is ready");

        if let Err(e) = self.marker.cleanup() {
            warn!(
                "Failed to remove crash marker {}: {}",
                self.marker.path().display(),
                e
            );
        }

        Ok(engine)
    }

    /// Client TLS for the probe and the readiness server. Flags win over the
    /// etcd configuration.
    pub(super) fn probe_tls(&self, engine_config: &EngineConfig) -> Option<ProbeTls> {
        let client = &self.config.client;
        if let (Some(ca), Some(cert), Some(key)) =
            (&client.ca_path, &client.cert_path, &client.key_path)
        {
            return Some(ProbeTls {
                server_name: client.server_name.clone(),
                ca: ca.clone(),
                cert: cert.clone(),
                key: key.clone(),
            });
        }

        engine_config.client_tls().map(|files| ProbeTls {
            server_name: client.server_name.clone(),
            ca: files.ca,
            cert: files.cert,
            key: files.key,
        })
    }

    async fn wait_until_ready(&self, engine: &mut EngineHandle) -> Result<()> {
        let became_ready = {
            let waiting = ready_or_stopped(&self.token, engine);
            match self.config.wait_ready_timeout() {
                Some(limit) => timeout(limit, waiting).await.map_err(|_| {
                    WrapperError::engine(format!("etcd did not become ready within {:?}", limit))
                })??,
                None => waiting.await?,
            }
        };

        if became_ready {
            return Ok(());
        }
        Err(engine
            .take_error()
            .unwrap_or_else(|| WrapperError::engine("etcd stopped before becoming ready")))
    }
}

/// `true` once etcd is ready, `false` if it stopped first.
async fn ready_or_stopped(token: &CancellationToken, engine: &EngineHandle) -> Result<bool> {
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(WrapperError::Cancelled),
        _ = engine.ready() => Ok(true),
        _ = engine.stopped() => Ok(false),
    }
}
