//! Abstractions for filesystem access to enable testing and mocking.
//!
//! The `FileSystem` trait lets the collectors read the real `/proc` and `/sys`
//! trees on Linux, or an in-memory mock in tests.

use std::io;
use std::path::{Path, PathBuf};

/// Abstraction for filesystem operations.
pub trait FileSystem: Send + Sync {
    /// Reads the entire contents of a file as a string.
    fn read_to_string(&self, path: &Path) -> io::Result<String>;

    /// Checks if a path exists.
    fn exists(&self, path: &Path) -> bool;

    /// Lists entries in a directory as full paths.
    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>>;
}

/// Real filesystem implementation that delegates to `std::fs`.
#[derive(Debug, Default, Clone, Copy)]
pub struct RealFs;

impl RealFs {
    pub fn new() -> Self {
        Self
    }
}

impl FileSystem for RealFs {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        std::fs::read_to_string(path)
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        std::fs::read_dir(path)?
            .map(|entry| entry.map(|e| e.path()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_real_fs_read_and_exists() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("loadavg");
        fs::write(&file, "0.15 0.10 0.05 1/150 1234\n").unwrap();

        let real = RealFs::new();
        assert!(real.exists(&file));
        assert!(!real.exists(&dir.path().join("missing")));
        assert!(real.read_to_string(&file).unwrap().starts_with("0.15"));
    }

    #[test]
    fn test_real_fs_read_dir() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("cpu0")).unwrap();
        fs::create_dir(dir.path().join("cpu1")).unwrap();

        let mut entries = RealFs::new().read_dir(dir.path()).unwrap();
        entries.sort();
        assert_eq!(entries, vec![dir.path().join("cpu0"), dir.path().join("cpu1")]);
    }

    #[test]
    fn test_real_fs_missing_file() {
        let err = RealFs::new()
            .read_to_string(Path::new("/nonexistent/path/12345"))
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
