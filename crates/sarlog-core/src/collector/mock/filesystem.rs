//! In-memory `/proc` and `/sys` trees for collector tests.

use crate::collector::traits::FileSystem;
use std::collections::{BTreeMap, BTreeSet};
use std::io;
use std::path::{Path, PathBuf};

const PROC_ROOT: &str = "/proc";
const SYS_ROOT: &str = "/sys";

/// A fake kernel view: pseudo-files under [`PROC_ROOT`], plus the sysfs
/// directories the collector probes for processors and block devices.
#[derive(Debug, Clone, Default)]
pub struct MockFs {
    files: BTreeMap<PathBuf, String>,
    dirs: BTreeSet<PathBuf>,
}

impl MockFs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `/proc/<rel>`, replacing an earlier version of the file.
    pub fn set_proc(&mut self, rel: &str, content: impl Into<String>) {
        let path = Path::new(PROC_ROOT).join(rel);
        if let Some(parent) = path.parent() {
            self.mkdirs(parent);
        }
        self.files.insert(path, content.into());
    }

    pub fn with_proc(mut self, rel: &str, content: impl Into<String>) -> Self {
        self.set_proc(rel, content);
        self
    }

    /// Drops `/proc/<rel>`, as when a kernel lacks the pseudo-file.
    pub fn remove_proc(&mut self, rel: &str) {
        self.files.remove(&Path::new(PROC_ROOT).join(rel));
    }

    /// Adds `cpu0`..`cpu<n-1>` under sysfs with the usual siblings.
    pub fn with_sys_cpus(mut self, n: u32) -> Self {
        let root = Path::new(SYS_ROOT).join("devices/system/cpu");
        for id in 0..n {
            self.mkdirs(&root.join(format!("cpu{}", id)));
        }
        self.mkdirs(&root.join("cpufreq"));
        let online = match n {
            0 => String::new(),
            1 => "0\n".to_string(),
            _ => format!("0-{}\n", n - 1),
        };
        self.files.insert(root.join("online"), online);
        self
    }

    /// Marks the named devices as whole disks in `/sys/block`.
    pub fn with_block_devices(mut self, names: &[&str]) -> Self {
        for name in names {
            self.mkdirs(&Path::new(SYS_ROOT).join("block").join(name));
        }
        self
    }

    fn mkdirs(&mut self, dir: &Path) {
        for d in dir.ancestors().filter(|d| !d.as_os_str().is_empty()) {
            self.dirs.insert(d.to_path_buf());
        }
    }
}

impl FileSystem for MockFs {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        self.files
            .get(path)
            .cloned()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, path.display().to_string()))
    }

    fn exists(&self, path: &Path) -> bool {
        self.files.contains_key(path) || self.dirs.contains(path)
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        if !self.dirs.contains(path) {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                path.display().to_string(),
            ));
        }
        let children = self.files.keys().chain(self.dirs.iter());
        Ok(children
            .filter(|p| p.parent() == Some(path))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_proc_file_replaced_and_removed() {
        let mut fs = MockFs::new().with_proc("loadavg", "0.00 0.00 0.00 1/100 1\n");
        fs.set_proc("loadavg", "1.00 0.50 0.25 2/101 7\n");
        let content = fs.read_to_string(Path::new("/proc/loadavg")).unwrap();
        assert!(content.starts_with("1.00"));

        fs.remove_proc("loadavg");
        let err = fs.read_to_string(Path::new("/proc/loadavg")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
        assert!(fs.exists(Path::new("/proc")));
    }

    #[test]
    fn test_nested_proc_file_creates_directories() {
        let fs = MockFs::new().with_proc("tty/driver/serial", "serinfo:1.0\n");
        assert!(fs.exists(Path::new("/proc/tty/driver")));
        let entries = fs.read_dir(Path::new("/proc/tty")).unwrap();
        assert_eq!(entries, vec![PathBuf::from("/proc/tty/driver")]);
    }

    #[test]
    fn test_sys_cpus_layout() {
        let fs = MockFs::new().with_sys_cpus(2);
        let dir = Path::new("/sys/devices/system/cpu");
        // cpu0, cpu1, cpufreq and online
        assert_eq!(fs.read_dir(dir).unwrap().len(), 4);
        assert_eq!(fs.read_to_string(&dir.join("online")).unwrap(), "0-1\n");
        assert!(fs.read_dir(&dir.join("cpu0")).unwrap().is_empty());
    }

    #[test]
    fn test_block_devices() {
        let fs = MockFs::new().with_block_devices(&["sda", "cciss!c0d0"]);
        assert!(fs.exists(Path::new("/sys/block/sda")));
        assert!(fs.exists(Path::new("/sys/block/cciss!c0d0")));
        assert!(!fs.exists(Path::new("/sys/block/sda1")));
        assert!(fs.read_dir(Path::new("/sys/nope")).is_err());
    }
}
