//! sarlog-core - shared library for the sarlog tools.
//!
//! Provides:
//! - `collector` - kernel counter collection from `/proc` and `/sys`
//! - `storage` - sample model, binary data file codec and sessions
//! - `rates`, `interval` - counter arithmetic and time base
//! - `reconcile` - matching disks, interfaces and interrupts across samples
//! - `sampler` - the collection loop (collect, persist, wait)
//! - `select` - CPU and IRQ selections
//! - `util` - host facts
//!
//! With `provider` feature (default):
//! - `provider` - sample source abstraction (live, history)
//! - `report` - report tables, formatters and the reporter driver

pub mod collector;
pub mod interval;
pub mod rates;
pub mod reconcile;
pub mod sampler;
pub mod select;
pub mod storage;
pub mod util;

#[cfg(feature = "provider")]
pub mod provider;

#[cfg(feature = "provider")]
pub mod report;
