use std::io;
use std::path::PathBuf;

/// Errors from reading or writing a data file or stream.
#[derive(Debug)]
pub enum StoreError {
    /// Underlying I/O failure on `path`.
    Io { path: PathBuf, source: io::Error },
    /// Fewer bytes than a complete structure, including a premature EOF.
    ShortRead {
        what: &'static str,
        expected: usize,
        got: usize,
    },
    /// The device accepted fewer bytes than a complete structure.
    ShortWrite { what: &'static str },
    /// The magic number is not ours at all.
    NotADataFile { path: PathBuf },
    /// A data file of this family written by an incompatible version.
    IncompatibleFormat { path: PathBuf, version: String },
    /// The file's stat record size cannot hold a record leader.
    RecordSizeMismatch { file: u32, expected: u32 },
    /// A header count is beyond what any machine could have produced.
    CountOutOfRange {
        domain: &'static str,
        count: u32,
        max: u32,
    },
    /// Appending per-CPU data at a different CPU count would corrupt the file.
    CpuCountMismatch { file: u32, live: u32 },
    /// Another process holds the advisory lock.
    Locked { path: PathBuf },
    UnknownRecordType(u8),
}

impl StoreError {
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        StoreError::Io {
            path: path.into(),
            source,
        }
    }

    /// Process exit code for this error: 2 I/O, 3 bad or incompatible file,
    /// 4 lock held.
    pub fn exit_code(&self) -> i32 {
        match self {
            StoreError::Io { .. } | StoreError::ShortWrite { .. } => 2,
            StoreError::ShortRead { .. }
            | StoreError::NotADataFile { .. }
            | StoreError::IncompatibleFormat { .. }
            | StoreError::RecordSizeMismatch { .. }
            | StoreError::CountOutOfRange { .. }
            | StoreError::CpuCountMismatch { .. }
            | StoreError::UnknownRecordType(_) => 3,
            StoreError::Locked { .. } => 4,
        }
    }
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Io { path, source } => write!(f, "{}: {}", path.display(), source),
            StoreError::ShortRead {
                what,
                expected,
                got,
            } => write!(
                f,
                "end of data reached while reading {what} ({got} of {expected} bytes)"
            ),
            StoreError::ShortWrite { what } => write!(f, "short write while writing {what}"),
            StoreError::NotADataFile { path } => {
                write!(f, "{}: not a system activity data file", path.display())
            }
            StoreError::IncompatibleFormat { path, version } => write!(
                f,
                "{}: invalid data format (file created by version {version}, use a matching version)",
                path.display()
            ),
            StoreError::RecordSizeMismatch { file, expected } => write!(
                f,
                "stat record size {file} in file header is unusable (expected {expected})"
            ),
            StoreError::CountOutOfRange { domain, count, max } => write!(
                f,
                "{domain} count {count} in file header exceeds {max}"
            ),
            StoreError::CpuCountMismatch { file, live } => write!(
                f,
                "file was created for {file} CPUs but this system has {live}; use --force to overwrite"
            ),
            StoreError::Locked { path } => {
                write!(f, "{}: locked by another collector", path.display())
            }
            StoreError::UnknownRecordType(t) => write!(f, "unknown record type {t}"),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        let io = StoreError::io("/tmp/x", io::Error::other("boom"));
        assert_eq!(io.exit_code(), 2);
        assert_eq!(
            StoreError::NotADataFile {
                path: PathBuf::from("sa01")
            }
            .exit_code(),
            3
        );
        assert_eq!(StoreError::CpuCountMismatch { file: 2, live: 4 }.exit_code(), 3);
        assert_eq!(
            StoreError::CountOutOfRange {
                domain: "disk",
                count: 1 << 20,
                max: 8192
            }
            .exit_code(),
            3
        );
        assert_eq!(
            StoreError::Locked {
                path: PathBuf::from("sa01")
            }
            .exit_code(),
            4
        );
    }

    #[test]
    fn test_incompatible_message_names_version() {
        let e = StoreError::IncompatibleFormat {
            path: PathBuf::from("sa17"),
            version: "0.3.1".to_string(),
        };
        assert!(e.to_string().contains("0.3.1"));
        assert!(e.to_string().starts_with("sa17"));
    }
}
