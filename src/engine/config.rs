use crate::error::{Result, WrapperError};
use config::{Config, File, FileFormat};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Subset of the etcd configuration document the wrapper cares about.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(rename_all = "kebab-case")]
pub struct EngineConfig {
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub data_dir: String,

    /// Comma separated list, as etcd expects it
    #[serde(default)]
    pub listen_client_urls: String,

    #[serde(default)]
    pub advertise_client_urls: String,

    #[serde(default)]
    pub client_transport_security: TransportSecurity,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(rename_all = "kebab-case")]
pub struct TransportSecurity {
    #[serde(default)]
    pub cert_file: String,

    #[serde(default)]
    pub key_file: String,

    #[serde(default)]
    pub trusted_ca_file: String,

    #[serde(default)]
    pub client_cert_auth: bool,
}

/// Client certificate material taken from the etcd configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientTlsFiles {
    pub cert: PathBuf,
    pub key: PathBuf,
    pub ca: PathBuf,
}

impl EngineConfig {
    /// Parse the YAML document fetched from the sidecar.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        debug!("Loading etcd configuration from: {}", path.display());

        let settings = Config::builder()
            .add_source(File::from(path).format(FileFormat::Yaml).required(true))
            .build()?;
        let config: EngineConfig = settings.try_deserialize()?;
        config.validate()?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.data_dir.trim().is_empty() {
            return Err(WrapperError::invalid_config(
                "etcd configuration does not define data-dir",
            ));
        }
        Ok(())
    }

    /// Cert, key and CA are only usable together.
    pub fn client_tls(&self) -> Option<ClientTlsFiles> {
        let tls = &self.client_transport_security;
        if tls.cert_file.is_empty() || tls.key_file.is_empty() || tls.trusted_ca_file.is_empty() {
            return None;
        }
        Some(ClientTlsFiles {
            cert: PathBuf::from(&tls.cert_file),
            key: PathBuf::from(&tls.key_file),
            ca: PathBuf::from(&tls.trusted_ca_file),
        })
    }
}
