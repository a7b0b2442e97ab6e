use thiserror::Error;

#[derive(Error, Debug)]
pub enum WrapperError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Sidecar returned {status} when attempting to {operation}")]
    Sidecar {
        operation: String,
        status: reqwest::StatusCode,
    },

    #[error("TLS error for {path}: {message}")]
    Tls { path: String, message: String },

    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    #[error("Store engine error: {message}")]
    Engine { message: String },

    #[error("Store probe failed: {message}")]
    Probe { message: String },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("System error: {message}")]
    System { message: String },
}

impl WrapperError {
    pub fn system<S: Into<String>>(message: S) -> Self {
        Self::System {
            message: message.into(),
        }
    }

    pub fn engine<S: Into<String>>(message: S) -> Self {
        Self::Engine {
            message: message.into(),
        }
    }

    pub fn invalid_config<S: Into<String>>(message: S) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    pub fn tls<P: Into<String>, S: Into<String>>(path: P, message: S) -> Self {
        Self::Tls {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn sidecar<S: Into<String>>(operation: S, status: reqwest::StatusCode) -> Self {
        Self::Sidecar {
            operation: operation.into(),
            status,
        }
    }

    /// Cancellation is terminal but is not a failure worth reporting as one.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

pub type Result<T> = std::result::Result<T, WrapperError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancelled_is_distinguishable() {
        assert!(WrapperError::Cancelled.is_cancelled());
        assert!(!WrapperError::system("boom").is_cancelled());
    }

    #[test]
    fn test_sidecar_error_message() {
        let err = WrapperError::sidecar("fetch etcd config", reqwest::StatusCode::NOT_FOUND);
        assert_eq!(
            err.to_string(),
            "Sidecar returned 404 Not Found when attempting to fetch etcd config"
        );
    }
}
