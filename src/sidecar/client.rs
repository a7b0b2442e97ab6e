use super::types::{InitStatus, ValidationType};
use crate::config::SidecarConfig;
use crate::error::{Result, WrapperError};
use crate::tls::load_ca_bundle;
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Timeout applied to every request sent to the sidecar
pub const SIDECAR_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Permissions of the etcd configuration written to disk
const CONFIG_FILE_MODE: u32 = 0o600;

const OK_STATUS_CODES: [StatusCode; 3] = [StatusCode::OK, StatusCode::CREATED, StatusCode::ACCEPTED];

/// The three calls of the initialization handshake with the sidecar.
///
/// Implementations report failures as errors and never retry; retry policy
/// belongs to the caller.
#[async_trait]
pub trait SidecarClient: Send + Sync {
    /// Latest initialization state known to the sidecar
    async fn get_initialization_status(&self, token: &CancellationToken) -> Result<InitStatus>;

    /// Ask the sidecar to initialize the data directory with the given validation
    async fn trigger_initialization(
        &self,
        token: &CancellationToken,
        validation: ValidationType,
    ) -> Result<()>;

    /// Fetch the etcd configuration, store it locally and return its path
    async fn get_etcd_config(&self, token: &CancellationToken) -> Result<PathBuf>;
}

/// [`SidecarClient`] speaking plain-text HTTP(S) to backup-restore.
pub struct HttpSidecarClient {
    client: Client,
    base_address: String,
    etcd_config_path: PathBuf,
}

impl HttpSidecarClient {
    pub fn new(client: Client, base_address: String, etcd_config_path: PathBuf) -> Self {
        Self {
            client,
            base_address,
            etcd_config_path,
        }
    }

    /// Build a client from the sidecar settings. With TLS only the configured
    /// CA bundle is trusted; without it certificate verification is skipped.
    pub fn from_config(config: &SidecarConfig, etcd_config_path: PathBuf) -> Result<Self> {
        let mut builder = Client::builder().timeout(SIDECAR_REQUEST_TIMEOUT);

        if config.tls_enabled {
            let bundle = config.ca_cert_bundle_path.as_ref().ok_or_else(|| {
                WrapperError::invalid_config("certificate bundle path is required when TLS is enabled")
            })?;
            builder = builder.tls_built_in_root_certs(false);
            for certificate in load_ca_bundle(bundle)? {
                builder = builder.add_root_certificate(certificate);
            }
        } else {
            builder = builder.danger_accept_invalid_certs(true);
        }

        Ok(Self::new(
            builder.build()?,
            config.base_address(),
            etcd_config_path,
        ))
    }

    pub fn base_address(&self) -> &str {
        &self.base_address
    }

    async fn get(&self, token: &CancellationToken, path_and_query: &str) -> Result<Response> {
        let url = format!("{}{}", self.base_address, path_and_query);
        let request_token = token.child_token();
        let _guard = request_token.clone().drop_guard();

        debug!("GET {}", url);
        tokio::select! {
            biased;
            _ = request_token.cancelled() => Err(WrapperError::Cancelled),
            response = self.client.get(&url).send() => Ok(response?),
        }
    }

    async fn read_body(token: &CancellationToken, response: Response) -> Result<Vec<u8>> {
        tokio::select! {
            biased;
            _ = token.cancelled() => Err(WrapperError::Cancelled),
            body = response.bytes() => Ok(body?.to_vec()),
        }
    }
}

pub(crate) fn has_ok_code(status: StatusCode) -> bool {
    OK_STATUS_CODES.contains(&status)
}

#[async_trait]
impl SidecarClient for HttpSidecarClient {
    async fn get_initialization_status(&self, token: &CancellationToken) -> Result<InitStatus> {
        let response = self.get(token, "/initialization/status").await?;
        if !has_ok_code(response.status()) {
            return Err(WrapperError::sidecar(
                "get initialization status",
                response.status(),
            ));
        }

        let body = Self::read_body(token, response).await?;
        Ok(InitStatus::from_body(&String::from_utf8_lossy(&body)))
    }

    async fn trigger_initialization(
        &self,
        token: &CancellationToken,
        validation: ValidationType,
    ) -> Result<()> {
        // The sidecar only exposes GET for this state-changing call
        let path = format!("/initialization/start?mode={}", validation);
        let response = self.get(token, &path).await?;
        if !has_ok_code(response.status()) {
            return Err(WrapperError::sidecar(
                "trigger initialization",
                response.status(),
            ));
        }
        Ok(())
    }

    async fn get_etcd_config(&self, token: &CancellationToken) -> Result<PathBuf> {
        let response = self.get(token, "/config").await?;
        if !has_ok_code(response.status()) {
            return Err(WrapperError::sidecar("fetch etcd config", response.status()));
        }

        let body = Self::read_body(token, response).await?;

        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(CONFIG_FILE_MODE)
            .open(&self.etcd_config_path)
            .await?;
        file.write_all(&body).await?;
        file.flush().await?;
        // `mode` only applies on creation, an existing file keeps its bits otherwise
        file.set_permissions(std::fs::Permissions::from_mode(CONFIG_FILE_MODE))
            .await?;

        Ok(self.etcd_config_path.clone())
    }
}
