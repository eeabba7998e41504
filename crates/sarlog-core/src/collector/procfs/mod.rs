//! Collectors for the Linux `/proc` and `/sys` filesystems.
//!
//! `parser` holds pure functions over pseudo-file contents; `system` reads
//! the files through a [`FileSystem`](crate::collector::traits::FileSystem)
//! and fills samples.

pub mod parser;
pub mod system;

pub use system::{CollectError, SystemCollector};
