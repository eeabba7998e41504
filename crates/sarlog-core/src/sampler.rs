//! Sampling loop driver: INIT, then COLLECT, PERSIST and WAIT per tick.
//!
//! ```text
//!  INIT ──► COLLECT ──► PERSIST ──► WAIT ──┐
//!   │          ▲                           │
//!   │          └───────────────────────────┘
//!   └─ interval 0: one RESTART/COMMENT record, then DONE
//! ```
//!
//! The loop is synchronous. Stopping is requested through the shared
//! shutdown flag and honoured at the next WAIT point, after the current tick
//! was fully written.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::collector::CollectError;
use crate::storage::{
    Activities, DomainCounts, FileSpec, Record, RecordTime, Sample, SampleSlots, SessionWriter,
    StoreError, StoreOptions, WriteOutcome,
};
use crate::util::HostIdentity;

/// Granularity at which WAIT checks the shutdown flag.
const WAIT_SLICE: Duration = Duration::from_millis(100);

/// Producer of live samples.
pub trait SampleSource {
    /// Current cardinality of every domain selected by `activities`, margins
    /// included.
    fn discover_counts(&self, activities: Activities) -> DomainCounts;

    /// Fills `sample` (already reset by the caller) and stamps its time.
    fn collect(&mut self, sample: &mut Sample, activities: Activities) -> Result<(), CollectError>;

    /// Kernel ticks per second.
    fn hz(&self) -> u32;

    fn host(&self) -> &HostIdentity;

    /// Wall-clock time used for file creation and special records.
    fn now(&self) -> RecordTime {
        RecordTime::now()
    }
}

/// Error type for the sampling loop.
#[derive(Debug)]
pub enum SamplerError {
    Collect(CollectError),
    Store(StoreError),
}

impl SamplerError {
    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            SamplerError::Collect(_) => 2,
            SamplerError::Store(e) => e.exit_code(),
        }
    }
}

impl std::fmt::Display for SamplerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SamplerError::Collect(e) => write!(f, "collection failed: {}", e),
            SamplerError::Store(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for SamplerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SamplerError::Collect(e) => Some(e),
            SamplerError::Store(e) => Some(e),
        }
    }
}

impl From<CollectError> for SamplerError {
    fn from(e: CollectError) -> Self {
        SamplerError::Collect(e)
    }
}

impl From<StoreError> for SamplerError {
    fn from(e: StoreError) -> Self {
        SamplerError::Store(e)
    }
}

/// Loop parameters.
#[derive(Debug, Clone)]
pub struct SamplerConfig {
    /// Spacing between ticks. Zero writes a single special record and stops.
    pub interval: Duration,
    /// Number of ticks; `None` runs until stopped.
    pub count: Option<u64>,
    /// Comment record written before the first tick (or instead of the
    /// RESTART record when the interval is zero).
    pub comment: Option<String>,
    pub activities: Activities,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            count: None,
            comment: None,
            activities: Activities::ALL,
        }
    }
}

/// Deadline timer. The next deadline is armed before blocking, so a slow
/// tick shortens the following wait instead of shifting the whole series.
#[derive(Debug)]
pub struct Ticker {
    interval: Duration,
    next: Instant,
}

impl Ticker {
    /// Arms the first deadline one interval from now.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            next: Instant::now() + interval,
        }
    }

    /// Blocks until the armed deadline. Returns `false` when `shutdown` was
    /// raised while waiting.
    pub fn wait(&mut self, shutdown: &AtomicBool) -> bool {
        let deadline = self.next;
        self.next = deadline + self.interval;
        let now = Instant::now();
        if self.next <= now {
            // Fell more than an interval behind: restart the cadence.
            self.next = now + self.interval;
        }

        loop {
            if shutdown.load(Ordering::SeqCst) {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            thread::sleep((deadline - now).min(WAIT_SLICE));
        }
    }
}

/// Collector-side sampling session.
pub struct Sampler<S: SampleSource> {
    source: S,
    config: SamplerConfig,
    writer: SessionWriter,
    slots: SampleSlots,
    shutdown: Arc<AtomicBool>,
    ticks: u64,
}

impl<S: SampleSource> Sampler<S> {
    /// INIT: discovers domain sizes, opens the outputs and allocates the slots.
    ///
    /// When appending to an existing file, slots follow that file's counts.
    pub fn new(
        source: S,
        config: SamplerConfig,
        output: Option<PathBuf>,
        stream: Option<Box<dyn Write + Send>>,
        options: StoreOptions,
    ) -> Result<Self, SamplerError> {
        let counts = source.discover_counts(config.activities);
        let spec = FileSpec {
            activities: config.activities,
            counts,
            hz: source.hz(),
            host: source.host().clone(),
        };
        let writer = SessionWriter::open(output, stream, spec, options, source.now().epoch)?;
        let slots = SampleSlots::new(&writer.counts(), false);
        info!(
            counts = ?writer.counts(),
            activities = ?writer.activities().names(),
            "sampler initialized"
        );

        Ok(Self {
            source,
            config,
            writer,
            slots,
            shutdown: Arc::new(AtomicBool::new(false)),
            ticks: 0,
        })
    }

    /// Flag that stops the loop at the next WAIT point.
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// Ticks collected so far.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn writer(&self) -> &SessionWriter {
        &self.writer
    }

    /// Runs the loop until the configured count is reached or shutdown is
    /// requested.
    pub fn run(&mut self) -> Result<(), SamplerError> {
        if self.config.interval.is_zero() {
            return self.write_special();
        }
        if let Some(text) = self.config.comment.clone() {
            let record = Record::Comment(self.source.now(), text);
            self.writer.write(&record, &Sample::default())?;
        }

        let mut ticker = Ticker::new(self.config.interval);
        loop {
            self.collect()?;
            self.persist()?;
            self.ticks += 1;

            if self.config.count.is_some_and(|count| self.ticks >= count) {
                break;
            }
            self.slots.flip();
            if !ticker.wait(&self.shutdown) {
                info!(ticks = self.ticks, "stop requested");
                break;
            }
        }
        Ok(())
    }

    /// Interval zero: marks a restart (or inserts a comment) and stops.
    fn write_special(&mut self) -> Result<(), SamplerError> {
        let time = self.source.now();
        let record = match self.config.comment.clone() {
            Some(text) => Record::Comment(time, text),
            None => Record::Restart(time),
        };
        self.writer.write(&record, &Sample::default())?;
        info!(kind = ?record.kind(), "special record written");
        Ok(())
    }

    fn collect(&mut self) -> Result<(), SamplerError> {
        self.slots.prepare_current();
        self.source
            .collect(self.slots.current_mut(), self.config.activities)?;
        debug!(tick = self.ticks, "collected");
        Ok(())
    }

    /// Writes the current tick; on a day change the tick lands in both the
    /// old and the new daily file.
    fn persist(&mut self) -> Result<(), SamplerError> {
        let time = self.slots.current().stat.time;
        let record = Record::Normal(self.slots.current().stat);

        if self.writer.write(&record, self.slots.current())? == WriteOutcome::SkippedLocked {
            warn!(tick = self.ticks, "tick kept in memory only");
        }

        if let Some(next) = self.writer.rotation_due(time.epoch) {
            let counts = self.source.discover_counts(self.config.activities);
            if self.writer.rotate(&next, counts, time)? {
                self.slots.resize(&self.writer.counts());
                self.writer.write_file(&record, self.slots.current())?;
            }
        }
        Ok(())
    }
}
