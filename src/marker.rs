use crate::error::Result;
use crate::sidecar::ValidationType;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Marker text written for SIGINT.
pub const INTERRUPT_MARKER: &str = "interrupt";
/// Marker text written for SIGTERM.
pub const TERMINATED_MARKER: &str = "terminated";

/// Single-line file recording the signal that ended the previous run.
#[derive(Debug, Clone)]
pub struct CrashMarker {
    path: PathBuf,
}

impl CrashMarker {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Record `signal_name` atomically: a temp file is written, synced and
    /// renamed over the marker so a concurrent reader never sees a torn write.
    pub fn capture(&self, signal_name: &str) -> Result<()> {
        let tmp_path = self.tmp_path();
        {
            let mut file = fs::File::create(&tmp_path)?;
            file.write_all(signal_name.as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&tmp_path, &self.path)?;
        debug!("Captured shutdown signal '{}' in {}", signal_name, self.path.display());
        Ok(())
    }

    /// Trimmed marker content, `None` if there is no marker.
    pub fn read(&self) -> Result<Option<String>> {
        match fs::read_to_string(&self.path) {
            Ok(data) => Ok(Some(data.trim().to_string())),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// A marker left by an interrupt or termination means the last run shut
    /// down normally and a sanity check suffices. Anything else, including a
    /// missing or unreadable marker, requires full validation.
    pub fn validation_mode(&self) -> ValidationType {
        match self.read() {
            Ok(Some(marker)) if marker == INTERRUPT_MARKER || marker == TERMINATED_MARKER => {
                ValidationType::Sanity
            }
            Ok(_) => ValidationType::Full,
            Err(e) => {
                warn!(
                    "Failed to read crash marker {}, assuming full validation: {}",
                    self.path.display(),
                    e
                );
                ValidationType::Full
            }
        }
    }

    /// Remove the marker. A missing marker is not an error.
    pub fn cleanup(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn marker_in(dir: &TempDir) -> CrashMarker {
        CrashMarker::new(dir.path().join("exit_code"))
    }

    #[test]
    fn test_validation_mode_from_marker_content() {
        let cases = [
            (None, ValidationType::Full),
            (Some(INTERRUPT_MARKER), ValidationType::Sanity),
            (Some(TERMINATED_MARKER), ValidationType::Sanity),
            (Some("terminated\n"), ValidationType::Sanity),
            (Some("banana"), ValidationType::Full),
            (Some(""), ValidationType::Full),
        ];

        for (content, expected) in cases {
            let dir = TempDir::new().unwrap();
            let marker = marker_in(&dir);
            if let Some(content) = content {
                fs::write(marker.path(), content).unwrap();
            }
            assert_eq!(marker.validation_mode(), expected, "content: {:?}", content);
        }
    }

    #[test]
    fn test_unreadable_marker_means_full_validation() {
        let dir = TempDir::new().unwrap();
        let marker = marker_in(&dir);
        // A directory at the marker path cannot be read as a file
        fs::create_dir(marker.path()).unwrap();
        assert!(marker.read().is_err());
        assert_eq!(marker.validation_mode(), ValidationType::Full);
    }

    #[test]
    fn test_capture_writes_signal_name() {
        let dir = TempDir::new().unwrap();
        let marker = marker_in(&dir);

        marker.capture(INTERRUPT_MARKER).unwrap();

        assert_eq!(fs::read_to_string(marker.path()).unwrap(), "interrupt");
        assert!(!marker.tmp_path().exists());
        assert_eq!(marker.validation_mode(), ValidationType::Sanity);
    }

    #[test]
    fn test_capture_overwrites_previous_marker() {
        let dir = TempDir::new().unwrap();
        let marker = marker_in(&dir);

        marker.capture("banana").unwrap();
        marker.capture(TERMINATED_MARKER).unwrap();

        assert_eq!(marker.read().unwrap().as_deref(), Some(TERMINATED_MARKER));
    }

    #[test]
    fn test_cleanup_removes_marker() {
        let dir = TempDir::new().unwrap();
        let marker = marker_in(&dir);
        marker.capture(INTERRUPT_MARKER).unwrap();

        marker.cleanup().unwrap();

        assert!(!marker.path().exists());
        assert_eq!(marker.read().unwrap(), None);
    }

    #[test]
    fn test_cleanup_without_marker_is_ok() {
        let dir = TempDir::new().unwrap();
        assert!(marker_in(&dir).cleanup().is_ok());
    }
}
