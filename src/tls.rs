use crate::error::{Result, WrapperError};
use reqwest::{Certificate, Identity};
use std::fs;
use std::path::Path;

/// Load every certificate of a PEM CA bundle.
pub fn load_ca_bundle(path: &Path) -> Result<Vec<Certificate>> {
    let bundle = fs::read(path)
        .map_err(|e| WrapperError::tls(path.display().to_string(), e.to_string()))?;

    let certificates = Certificate::from_pem_bundle(&bundle)
        .map_err(|e| WrapperError::tls(path.display().to_string(), e.to_string()))?;
    if certificates.is_empty() {
        return Err(WrapperError::tls(
            path.display().to_string(),
            "no PEM certificates found in bundle",
        ));
    }

    Ok(certificates)
}

/// Build a client identity from a PEM certificate chain and its private key.
pub fn load_identity(cert_path: &Path, key_path: &Path) -> Result<Identity> {
    let mut pem = fs::read(cert_path)
        .map_err(|e| WrapperError::tls(cert_path.display().to_string(), e.to_string()))?;
    let key = fs::read(key_path)
        .map_err(|e| WrapperError::tls(key_path.display().to_string(), e.to_string()))?;

    if !pem.ends_with(b"\n") {
        pem.push(b'\n');
    }
    pem.extend_from_slice(&key);

    Identity::from_pem(&pem)
        .map_err(|e| WrapperError::tls(cert_path.display().to_string(), e.to_string()))
}
