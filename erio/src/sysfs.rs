//! Device attribute discovery through the sysfs device database.

use crate::device::DevNum;
use crate::error::{ErioError, Result};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::trace;

/// Resolves character devices to their sysfs entry and reads or writes
/// string attributes on it.
#[derive(Debug, Clone)]
pub struct Sysfs {
    root: PathBuf,
}

impl Sysfs {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Sysfs { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `<root>/dev/char/<major>:<minor>`, if the device is known.
    pub fn device_path(&self, devnum: DevNum) -> Result<PathBuf> {
        let path = self
            .root
            .join("dev/char")
            .join(format!("{}:{}", devnum.major, devnum.minor));
        if path.is_dir() {
            Ok(path)
        } else {
            Err(ErioError::NotSupportedDevice)
        }
    }

    pub fn read_attribute(&self, devnum: DevNum, name: &str) -> Result<String> {
        let path = self.attribute_path(devnum, name)?;
        let value = std::fs::read_to_string(&path).map_err(|e| not_found_or_io(e, name))?;
        trace!(path = %path.display(), value = %value.trim_end(), "read attribute");
        Ok(value.trim_end().to_string())
    }

    pub fn write_attribute(&self, devnum: DevNum, name: &str, value: &str) -> Result<()> {
        let path = self.attribute_path(devnum, name)?;
        if !path.exists() {
            return Err(ErioError::AttributeNotFound(name.to_string()));
        }
        std::fs::write(&path, value).map_err(|e| not_found_or_io(e, name))?;
        trace!(path = %path.display(), value = value, "wrote attribute");
        Ok(())
    }

    fn attribute_path(&self, devnum: DevNum, name: &str) -> Result<PathBuf> {
        if name.is_empty() || name.contains('/') || name == ".." {
            return Err(ErioError::AttributeNotFound(name.to_string()));
        }
        Ok(self.device_path(devnum)?.join(name))
    }
}

impl Default for Sysfs {
    fn default() -> Self {
        Sysfs::new("/sys")
    }
}

fn not_found_or_io(e: std::io::Error, name: &str) -> ErioError {
    if e.kind() == ErrorKind::NotFound {
        ErioError::AttributeNotFound(name.to_string())
    } else {
        ErioError::Io(e)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use rstest::{fixture, rstest};
    use tempfile::TempDir;

    pub(crate) const DEVNUM: DevNum = DevNum {
        major: 243,
        minor: 0,
    };

    /// Lays out `dev/char/243:0` with the given attributes.
    pub(crate) fn fake_sysfs(attrs: &[(&str, &str)]) -> TempDir {
        let dir = TempDir::new().unwrap();
        let device = dir.path().join("dev/char/243:0");
        std::fs::create_dir_all(&device).unwrap();
        for (name, value) in attrs {
            std::fs::write(device.join(name), value).unwrap();
        }
        dir
    }

    #[fixture]
    fn sysfs_dir() -> TempDir {
        fake_sysfs(&[("api_maj", "1\n"), ("api_min", "4\n"), ("port", "tx-dma0")])
    }

    #[rstest]
    #[case("api_maj", "1")]
    #[case("api_min", "4")]
    #[case("port", "tx-dma0")]
    fn test_read_attribute(sysfs_dir: TempDir, #[case] name: &str, #[case] expected: &str) {
        let sysfs = Sysfs::new(sysfs_dir.path());
        assert_eq!(sysfs.read_attribute(DEVNUM, name).unwrap(), expected);
    }

    #[rstest]
    fn test_missing_attribute(sysfs_dir: TempDir) {
        let sysfs = Sysfs::new(sysfs_dir.path());
        assert!(matches!(
            sysfs.read_attribute(DEVNUM, "nope"),
            Err(ErioError::AttributeNotFound(name)) if name == "nope"
        ));
        assert!(matches!(
            sysfs.read_attribute(DEVNUM, "../243:0"),
            Err(ErioError::AttributeNotFound(_))
        ));
    }

    #[rstest]
    fn test_unknown_device(sysfs_dir: TempDir) {
        let sysfs = Sysfs::new(sysfs_dir.path());
        let other = DevNum {
            major: 1,
            minor: 3,
        };
        assert!(matches!(
            sysfs.read_attribute(other, "api_maj"),
            Err(ErioError::NotSupportedDevice)
        ));
    }

    #[rstest]
    fn test_write_attribute(sysfs_dir: TempDir) {
        let sysfs = Sysfs::new(sysfs_dir.path());
        sysfs.write_attribute(DEVNUM, "port", "tx-dma1").unwrap();
        assert_eq!(sysfs.read_attribute(DEVNUM, "port").unwrap(), "tx-dma1");

        assert!(matches!(
            sysfs.write_attribute(DEVNUM, "missing", "1"),
            Err(ErioError::AttributeNotFound(_))
        ));
    }
}
