//! Card reader control through sysfs
//!
//! Writes go straight to the USB subsystem's control files. Nothing is read
//! back: the kernel treats repeated bind/authorize writes as no-ops, and a
//! failed write has no useful recovery, so failures are logged and dropped.

use common::ReaderControl;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub struct SysfsReader {
    bind_path: PathBuf,
    interface: String,
    authorized_path: PathBuf,
}

impl SysfsReader {
    pub fn new(bind_path: PathBuf, interface: String, authorized_path: PathBuf) -> Self {
        Self {
            bind_path,
            interface,
            authorized_path,
        }
    }

    fn write(path: &Path, value: &str) -> std::io::Result<()> {
        // Never create attribute files
        let mut file = OpenOptions::new().write(true).open(path)?;
        file.write_all(value.as_bytes())
    }
}

impl ReaderControl for SysfsReader {
    fn bind(&mut self) {
        match Self::write(&self.bind_path, &self.interface) {
            Ok(()) => debug!("Bound {} to usb-storage", self.interface),
            // Already bound is the common case here
            Err(e) => debug!("Bind of {} not accepted: {}", self.interface, e),
        }
    }

    fn connect(&mut self) {
        if let Err(e) = Self::write(&self.authorized_path, "1") {
            warn!(
                "Failed to authorize reader via {}: {}",
                self.authorized_path.display(),
                e
            );
        }
    }

    fn disconnect(&mut self) {
        if let Err(e) = Self::write(&self.authorized_path, "0") {
            warn!(
                "Failed to deauthorize reader via {}: {}",
                self.authorized_path.display(),
                e
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::ReaderAction;
    use std::fs;
    use tempfile::tempdir;

    fn reader(dir: &Path) -> SysfsReader {
        SysfsReader::new(
            dir.join("bind"),
            "1-1.4:1.0".to_string(),
            dir.join("authorized"),
        )
    }

    #[test]
    fn test_connect_and_disconnect_write_flag() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("authorized"), "0").unwrap();
        let mut reader = reader(dir.path());

        reader.connect();
        assert_eq!(fs::read_to_string(dir.path().join("authorized")).unwrap(), "1");

        reader.apply(ReaderAction::Disconnect);
        assert_eq!(fs::read_to_string(dir.path().join("authorized")).unwrap(), "0");
    }

    #[test]
    fn test_bind_writes_interface() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("bind"), "").unwrap();
        let mut reader = reader(dir.path());

        reader.bind();
        assert_eq!(
            fs::read_to_string(dir.path().join("bind")).unwrap(),
            "1-1.4:1.0"
        );
    }

    #[test]
    fn test_missing_control_files_are_ignored() {
        let dir = tempdir().unwrap();
        let mut reader = reader(dir.path());

        reader.bind();
        reader.connect();
        reader.disconnect();

        assert!(!dir.path().join("bind").exists());
        assert!(!dir.path().join("authorized").exists());
    }
}
