//! Provider abstraction for sample sources.
//!
//! This module defines the `SampleProvider` trait that lets the reporter work
//! with live collection or with recorded data (a file, or the collector's
//! stream on standard input) through one interface.

mod history;
mod live;

pub use history::HistoryProvider;
pub use live::LiveProvider;

use crate::collector::CollectError;
use crate::storage::{FileHeader, RecordTime, Sample, StoreError};

/// Error types that can occur while fetching samples.
#[derive(Debug)]
pub enum ProviderError {
    /// Error reading or decoding recorded data.
    Store(StoreError),
    /// Error during live collection.
    Collection(CollectError),
}

impl ProviderError {
    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            ProviderError::Store(e) => e.exit_code(),
            ProviderError::Collection(_) => 2,
        }
    }
}

impl std::fmt::Display for ProviderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderError::Store(e) => write!(f, "{}", e),
            ProviderError::Collection(e) => write!(f, "Collection error: {}", e),
        }
    }
}

impl std::error::Error for ProviderError {}

impl From<StoreError> for ProviderError {
    fn from(e: StoreError) -> Self {
        ProviderError::Store(e)
    }
}

impl From<CollectError> for ProviderError {
    fn from(e: CollectError) -> Self {
        ProviderError::Collection(e)
    }
}

/// One entry of a sample sequence.
#[derive(Debug, Clone, PartialEq)]
pub enum Entry {
    /// The buffer passed to [`SampleProvider::next_entry`] holds a new sample.
    Sample,
    /// The collector restarted; the series is broken at this point.
    Restart(RecordTime),
    Comment(RecordTime, String),
}

/// Abstraction for sample sources.
///
/// - `LiveProvider`: collects from the running system, paced by the interval
/// - `HistoryProvider`: reads a data file or stream sequentially
///
/// The trait is object-safe and designed to be used with `Box<dyn SampleProvider>`.
pub trait SampleProvider {
    /// Header describing the samples: counts, activities, HZ and host.
    fn header(&self) -> &FileHeader;

    /// Produces the next entry. For [`Entry::Sample`], `sample` was filled.
    ///
    /// Returns `Ok(None)` at the end of the data (or when a live provider was
    /// asked to stop).
    fn next_entry(&mut self, sample: &mut Sample) -> Result<Option<Entry>, ProviderError>;

    /// Returns `true` if this provider is collecting live data.
    fn is_live(&self) -> bool;
}
