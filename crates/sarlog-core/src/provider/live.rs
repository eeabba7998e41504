//! Live data provider: in-process collection paced by the report interval.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use crate::sampler::{SampleSource, Ticker};
use crate::storage::{Activities, FileHeader, Sample};

use super::{Entry, ProviderError, SampleProvider};

/// Provider for real-time system data collection.
///
/// The first sample is collected immediately; every following one waits for
/// the next tick boundary.
pub struct LiveProvider<S: SampleSource> {
    source: S,
    header: FileHeader,
    interval: Duration,
    ticker: Option<Ticker>,
    shutdown: Arc<AtomicBool>,
}

impl<S: SampleSource> LiveProvider<S> {
    /// Creates a new live provider.
    ///
    /// # Arguments
    /// * `source` - The collector to use for gathering system counters
    /// * `activities` - Domains to collect
    /// * `interval` - Spacing between samples
    pub fn new(source: S, activities: Activities, interval: Duration) -> Self {
        let counts = source.discover_counts(activities);
        let header = FileHeader::new(
            activities,
            counts,
            source.hz(),
            source.host().clone(),
            source.now().epoch,
        );
        Self {
            source,
            header,
            interval,
            ticker: None,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flag that makes the next wait return end of data.
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }
}

impl<S: SampleSource> SampleProvider for LiveProvider<S> {
    fn header(&self) -> &FileHeader {
        &self.header
    }

    fn next_entry(&mut self, sample: &mut Sample) -> Result<Option<Entry>, ProviderError> {
        match &mut self.ticker {
            Some(ticker) => {
                if !ticker.wait(&self.shutdown) {
                    return Ok(None);
                }
            }
            None => self.ticker = Some(Ticker::new(self.interval)),
        }
        self.source.collect(sample, self.header.activities)?;
        Ok(Some(Entry::Sample))
    }

    fn is_live(&self) -> bool {
        true
    }
}
