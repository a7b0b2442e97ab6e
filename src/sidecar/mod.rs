mod client;
mod types;
#[cfg(test)]
pub(crate) mod fake;

pub use client::{HttpSidecarClient, SidecarClient, SIDECAR_REQUEST_TIMEOUT};
pub use types::{InitStatus, ValidationType};
