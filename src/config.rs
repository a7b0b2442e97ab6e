use crate::error::{Result, WrapperError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub const SCHEME_HTTP: &str = "http";
pub const SCHEME_HTTPS: &str = "https";

/// Immutable snapshot of everything the wrapper needs at startup.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct WrapperConfig {
    /// Port of the readiness/control HTTP server
    #[serde(default = "default_ready_port")]
    pub ready_port: u16,

    /// Client port of the local etcd member
    #[serde(default = "default_client_port")]
    pub client_port: u16,

    /// Seconds to wait for etcd to become ready, 0 waits forever
    #[serde(default)]
    pub wait_ready_timeout_seconds: u64,

    /// File recording the signal that ended the previous run
    #[serde(default = "default_crash_marker_path")]
    pub crash_marker_path: PathBuf,

    /// Where the etcd configuration fetched from the sidecar is written
    #[serde(default = "default_engine_config_path")]
    pub engine_config_path: PathBuf,

    /// etcd executable to launch
    #[serde(default = "default_etcd_binary")]
    pub etcd_binary: String,

    #[serde(default)]
    pub sidecar: SidecarConfig,

    #[serde(default)]
    pub client: ClientTlsConfig,
}

/// Connection settings for the backup-restore sidecar.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SidecarConfig {
    /// `<host>:<port>` without scheme, the host may be empty
    #[serde(default = "default_sidecar_host_port")]
    pub host_port: String,

    #[serde(default)]
    pub tls_enabled: bool,

    pub ca_cert_bundle_path: Option<PathBuf>,
}

/// TLS material used by the readiness probe to talk to etcd.
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct ClientTlsConfig {
    pub server_name: Option<String>,
    pub ca_path: Option<PathBuf>,
    pub cert_path: Option<PathBuf>,
    pub key_path: Option<PathBuf>,
}

impl WrapperConfig {
    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        self.sidecar.validate()?;

        if self.ready_port == 0 {
            return Err(WrapperError::invalid_config(
                "ready port must be greater than 0",
            ));
        }
        if self.client_port == 0 {
            return Err(WrapperError::invalid_config(
                "client port must be greater than 0",
            ));
        }
        if self.etcd_binary.trim().is_empty() {
            return Err(WrapperError::invalid_config("etcd binary cannot be empty"));
        }

        Ok(())
    }

    /// `None` means wait for etcd forever
    pub fn wait_ready_timeout(&self) -> Option<Duration> {
        match self.wait_ready_timeout_seconds {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}

impl SidecarConfig {
    /// Collects every violation into a single error.
    pub fn validate(&self) -> Result<()> {
        let mut problems = Vec::new();

        if !self.host_port.contains(':') {
            problems.push(
                "both host and port need to be specified and should adhere to format: <host>:<port>",
            );
        }
        if self.host_port.starts_with("http:") || self.host_port.starts_with("https:") {
            problems.push("sidecar host-port should not contain scheme");
        }
        if self.tls_enabled {
            let blank = self
                .ca_cert_bundle_path
                .as_ref()
                .map(|p| p.to_string_lossy().trim().is_empty())
                .unwrap_or(true);
            if blank {
                problems.push("certificate bundle path cannot be empty when TLS is enabled");
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(WrapperError::invalid_config(problems.join("; ")))
        }
    }

    /// Host part of `host_port`, `localhost` when empty.
    pub fn host(&self) -> &str {
        let host = self
            .host_port
            .rsplit_once(':')
            .map(|(host, _)| host)
            .unwrap_or(&self.host_port)
            .trim();
        if host.is_empty() {
            "localhost"
        } else {
            host
        }
    }

    pub fn port(&self) -> &str {
        self.host_port
            .rsplit_once(':')
            .map(|(_, port)| port.trim())
            .unwrap_or_default()
    }

    pub fn base_address(&self) -> String {
        let scheme = if self.tls_enabled {
            SCHEME_HTTPS
        } else {
            SCHEME_HTTP
        };
        format!("{}://{}:{}", scheme, self.host(), self.port())
    }
}

impl Default for SidecarConfig {
    fn default() -> Self {
        Self {
            host_port: default_sidecar_host_port(),
            tls_enabled: false,
            ca_cert_bundle_path: None,
        }
    }
}

impl Default for WrapperConfig {
    fn default() -> Self {
        Self {
            ready_port: default_ready_port(),
            client_port: default_client_port(),
            wait_ready_timeout_seconds: 0,
            crash_marker_path: default_crash_marker_path(),
            engine_config_path: default_engine_config_path(),
            etcd_binary: default_etcd_binary(),
            sidecar: SidecarConfig::default(),
            client: ClientTlsConfig::default(),
        }
    }
}

pub fn default_sidecar_host_port() -> String {
    ":8080".to_string()
}

pub fn default_ready_port() -> u16 {
    9095
}

pub fn default_client_port() -> u16 {
    2379
}

pub fn default_crash_marker_path() -> PathBuf {
    PathBuf::from("/var/etcd/data/exit_code")
}

pub fn default_engine_config_path() -> PathBuf {
    PathBuf::from("/etc/etcd.conf.yaml")
}

pub fn default_etcd_binary() -> String {
    "etcd".to_string()
}
