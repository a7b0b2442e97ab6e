use crate::error::{Result, WrapperError};
use crate::tls::{load_ca_bundle, load_identity};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::Client;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

/// Per-probe timeout
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Key read by the probe; it does not need to exist
const PROBE_KEY: &str = "foo";

/// Health check against the running store.
#[async_trait]
pub trait StoreProbe: Send + Sync {
    async fn check(&self) -> Result<()>;
}

/// Client TLS material for talking to the local etcd member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeTls {
    pub server_name: Option<String>,
    pub ca: PathBuf,
    pub cert: PathBuf,
    pub key: PathBuf,
}

/// Serializable range read through etcd's gRPC gateway.
pub struct EtcdProbe {
    client: Client,
    url: String,
    body: serde_json::Value,
}

impl EtcdProbe {
    pub fn new(client_port: u16, tls: Option<&ProbeTls>) -> Result<Self> {
        let mut builder = Client::builder().timeout(PROBE_TIMEOUT);

        let (scheme, host) = match tls {
            Some(tls) => {
                builder = builder
                    .tls_built_in_root_certs(false)
                    .identity(load_identity(&tls.cert, &tls.key)?);
                for certificate in load_ca_bundle(&tls.ca)? {
                    builder = builder.add_root_certificate(certificate);
                }

                let host = match &tls.server_name {
                    Some(name) => {
                        // Verify against the server name while still dialing the local member
                        let local = SocketAddr::from((Ipv4Addr::LOCALHOST, client_port));
                        builder = builder.resolve(name, local);
                        name.clone()
                    }
                    None => "localhost".to_string(),
                };
                ("https", host)
            }
            None => ("http", Ipv4Addr::LOCALHOST.to_string()),
        };

        Ok(Self::with_client(
            builder.build()?,
            format!("{}://{}:{}", scheme, host, client_port),
        ))
    }

    /// Probe `base_url` with an existing client.
    pub fn with_client(client: Client, base_url: String) -> Self {
        Self {
            client,
            url: format!("{}/v3/kv/range", base_url),
            body: serde_json::json!({
                "key": STANDARD.encode(PROBE_KEY),
                "serializable": true,
            }),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl StoreProbe for EtcdProbe {
    async fn check(&self) -> Result<()> {
        let response = self.client.post(&self.url).json(&self.body).send().await?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(WrapperError::Probe {
                message: format!("range request returned {}", status),
            })
        }
    }
}
