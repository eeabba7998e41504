//! System counter collector for Linux.
//!
//! This module reads `/proc` and `/sys` into [`Sample`](crate::storage::model::Sample)
//! buffers, with support for mocking for tests on any platform.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  Collector (SampleSource)                   │
//! │             ┌─────────────────────────────────┐             │
//! │             │        SystemCollector          │             │
//! │             │  - read_<domain>(&mut Sample)   │             │
//! │             │  - get_<domain>_nr()            │             │
//! │             └────────────────┬────────────────┘             │
//! │                              │                              │
//! │                       ┌──────▼──────┐                       │
//! │                       │  FileSystem │ (trait)               │
//! │                       └──────┬──────┘                       │
//! └──────────────────────────────┼──────────────────────────────┘
//!                                │
//!                ┌───────────────┼───────────────┐
//!                │               │               │
//!         ┌──────▼──────┐ ┌──────▼──────┐ ┌──────▼──────┐
//!         │   RealFs    │ │   MockFs    │ │  Scenarios  │
//!         │ (Linux)     │ │ (Testing)   │ │ (Fixtures)  │
//!         └─────────────┘ └─────────────┘ └─────────────┘
//! ```
//!
//! # Usage
//!
//! ## Production (Linux)
//!
//! ```ignore
//! use sarlog_core::collector::{Collector, RealFs};
//!
//! let mut collector = Collector::new(RealFs::new(), "/proc", "/sys");
//! ```
//!
//! ## Testing (with MockFs)
//!
//! ```
//! use sarlog_core::collector::{Collector, MockFs};
//! use sarlog_core::sampler::SampleSource;
//! use sarlog_core::storage::{Activities, Sample};
//!
//! let mut collector = Collector::new(MockFs::typical_system(), "/proc", "/sys");
//! let counts = collector.discover_counts(Activities::ALL);
//! let mut sample = Sample::with_counts(&counts);
//! collector.collect(&mut sample, Activities::ALL).unwrap();
//! assert_eq!(sample.stat.memory.total, 16_384_000);
//! ```

#[allow(clippy::module_inception)]
mod collector;
pub mod mock;
pub mod procfs;
pub mod traits;

pub use collector::{Collector, CollectorTiming};
pub use mock::MockFs;
pub use procfs::{CollectError, SystemCollector};
pub use traits::{FileSystem, RealFs};
