use std::fmt;

/// Initialization state reported by the backup-restore sidecar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitStatus {
    /// Status could not be determined, e.g. the sidecar was unreachable
    Unknown,
    /// Initialization has not been triggered yet
    New,
    InProgress,
    Successful,
}

impl InitStatus {
    /// Exact match on the sidecar's response body. Unrecognized text is
    /// treated as `InProgress`.
    pub fn from_body(body: &str) -> Self {
        match body {
            "New" => InitStatus::New,
            "Successful" => InitStatus::Successful,
            _ => InitStatus::InProgress,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            InitStatus::Unknown => "Unknown",
            InitStatus::New => "New",
            InitStatus::InProgress => "InProgress",
            InitStatus::Successful => "Successful",
        }
    }
}

impl fmt::Display for InitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Depth of validation the sidecar applies to the etcd data directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationType {
    Sanity,
    Full,
}

impl ValidationType {
    /// Value of the `mode` query parameter.
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationType::Sanity => "sanity",
            ValidationType::Full => "full",
        }
    }
}

impl fmt::Display for ValidationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
