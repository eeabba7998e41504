//! Reporter: walks a sample sequence and prints one report per interval.
//!
//! ```text
//!  next_entry ──► Sample ──► first of segment? ──yes──► keep as reference
//!                                 │ no
//!                                 ▼
//!                  compute_tables(prev, curr) ──► print ──► flip
//!
//!  Restart / end of data ──► averages against the reference ──► new segment
//! ```

use std::io::{self, Write};

use tracing::debug;

use crate::interval::Intervals;
use crate::provider::{Entry, ProviderError, SampleProvider};
use crate::select::Selection;
use crate::storage::{Activities, SampleSlots};

use super::{Formatter, OutputFormat, Table, TableKind, compute_tables};

/// What to report and how.
#[derive(Clone, Debug)]
pub struct ReportOptions {
    pub activities: Activities,
    /// Per-CPU rows; `None` prints the `all` row only.
    pub cpus: Option<Selection>,
    /// Per-IRQ rows; `None` prints the `sum` row only.
    pub irqs: Option<Selection>,
    pub format: OutputFormat,
    /// Stop after this many reports.
    pub count: Option<u64>,
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self {
            activities: Activities::CPU,
            cpus: None,
            irqs: None,
            format: OutputFormat::Text,
            count: None,
        }
    }
}

#[derive(Debug)]
pub enum ReportError {
    Provider(ProviderError),
    Io(io::Error),
}

impl ReportError {
    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            ReportError::Provider(e) => e.exit_code(),
            ReportError::Io(_) => 2,
        }
    }
}

impl std::fmt::Display for ReportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReportError::Provider(e) => write!(f, "{}", e),
            ReportError::Io(e) => write!(f, "cannot write report: {}", e),
        }
    }
}

impl std::error::Error for ReportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ReportError::Provider(e) => Some(e),
            ReportError::Io(e) => Some(e),
        }
    }
}

impl From<ProviderError> for ReportError {
    fn from(e: ProviderError) -> Self {
        ReportError::Provider(e)
    }
}

impl From<io::Error> for ReportError {
    fn from(e: io::Error) -> Self {
        ReportError::Io(e)
    }
}

/// Running state of one continuous series of samples.
#[derive(Default)]
struct Segment {
    /// A first sample has been kept as reference.
    started: bool,
    reports: u64,
    /// Sums of every printed level table.
    levels: Vec<Table>,
}

impl Segment {
    fn accumulate(&mut self, tables: &[Table]) {
        let levels = tables.iter().filter(|t| t.kind == TableKind::Level);
        if self.levels.is_empty() {
            self.levels = levels.cloned().collect();
            return;
        }
        for (sum, table) in self.levels.iter_mut().zip(levels) {
            for (sum_row, row) in sum.rows.iter_mut().zip(&table.rows) {
                for (s, v) in sum_row.values.iter_mut().zip(&row.values) {
                    *s += v;
                }
            }
        }
    }

    /// Mean of the printed level tables, by name.
    fn level_average(&self, name: &str) -> Option<Table> {
        let n = self.reports.max(1) as f64;
        let mut table = self.levels.iter().find(|t| t.name == name)?.clone();
        for row in &mut table.rows {
            for v in &mut row.values {
                *v /= n;
            }
        }
        Some(table)
    }
}

/// Drives a [`SampleProvider`] and prints reports to `out`.
pub struct Reporter<W: Write> {
    out: W,
    options: ReportOptions,
}

impl<W: Write> Reporter<W> {
    pub fn new(out: W, options: ReportOptions) -> Self {
        Self { out, options }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    /// Prints one report per pair of consecutive samples, with averages at
    /// the end of each continuous segment. Returns the number of reports.
    ///
    /// A restart record ends the segment: the sample after it becomes the
    /// reference of a new one.
    pub fn run(&mut self, provider: &mut dyn SampleProvider) -> Result<u64, ReportError> {
        let header = provider.header().clone();
        let formatter = Formatter::new(self.options.format, &header);
        let mut slots = SampleSlots::new(&header.counts, true);
        let mut segment = Segment::default();
        let mut total = 0;

        formatter.banner(&mut self.out, &header)?;
        while self.options.count.is_none_or(|count| total < count) {
            slots.prepare_current();
            let Some(entry) = provider.next_entry(slots.current_mut())? else {
                break;
            };
            match entry {
                Entry::Sample if !segment.started => {
                    slots.snapshot_reference();
                    slots.flip();
                    segment.started = true;
                }
                Entry::Sample => {
                    let time = slots.current().stat.time;
                    let (prev, curr) = slots.pair_mut();
                    let seconds = Intervals::between(&prev.stat, &curr.stat).seconds(header.hz);
                    let tables = compute_tables(prev, curr, header.hz, &self.options);
                    formatter.tables(&mut self.out, &time, seconds.round() as u64, &tables)?;
                    segment.accumulate(&tables);
                    segment.reports += 1;
                    total += 1;
                    slots.flip();
                }
                Entry::Restart(time) => {
                    self.close_segment(&formatter, &mut slots, &mut segment, header.hz)?;
                    formatter.restart(&mut self.out, &time)?;
                }
                Entry::Comment(time, text) => {
                    formatter.comment(&mut self.out, &time, &text)?;
                }
            }
        }
        self.close_segment(&formatter, &mut slots, &mut segment, header.hz)?;
        self.out.flush()?;
        Ok(total)
    }

    /// Prints averages of the segment, if it produced any report, and
    /// resets it.
    fn close_segment(
        &mut self,
        formatter: &Formatter,
        slots: &mut SampleSlots,
        segment: &mut Segment,
        hz: u32,
    ) -> Result<(), ReportError> {
        let finished = std::mem::take(segment);
        if finished.reports == 0 {
            return Ok(());
        }
        debug!(reports = finished.reports, "closing segment");

        // The last sample is in the previous slot after the final flip.
        slots.flip();
        let Some((reference, last)) = slots.average_pair_mut() else {
            return Ok(());
        };
        let tables: Vec<Table> = compute_tables(reference, last, hz, &self.options)
            .into_iter()
            .map(|table| match table.kind {
                TableKind::Rate => table,
                TableKind::Level => finished.level_average(table.name).unwrap_or(table),
            })
            .collect();
        slots.flip();
        formatter.averages(&mut self.out, &tables)?;
        Ok(())
    }

    /// Prints a single report covering the time since boot: the first
    /// sample is compared against all-zero counters.
    pub fn since_boot(&mut self, provider: &mut dyn SampleProvider) -> Result<(), ReportError> {
        let header = provider.header().clone();
        let formatter = Formatter::new(self.options.format, &header);
        let mut slots = SampleSlots::new(&header.counts, false);

        formatter.banner(&mut self.out, &header)?;
        loop {
            slots.prepare_current();
            match provider.next_entry(slots.current_mut())? {
                None => return Ok(()),
                Some(Entry::Sample) => break,
                Some(_) => continue,
            }
        }
        slots.clear_previous();
        let time = slots.current().stat.time;
        let (prev, curr) = slots.pair_mut();
        let seconds = Intervals::between(&prev.stat, &curr.stat).seconds(header.hz);
        let tables = compute_tables(prev, curr, header.hz, &self.options);
        formatter.tables(&mut self.out, &time, seconds.round() as u64, &tables)?;
        self.out.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::{Collector, MockFs};
    use crate::sampler::SampleSource;
    use crate::storage::model::IrqCpuStats;
    use crate::storage::{DomainCounts, FileHeader, RecordTime, Sample};
    use crate::util::HostIdentity;
    use std::collections::VecDeque;

    /// Replays a fixed list of entries.
    struct ScriptedProvider {
        header: FileHeader,
        entries: VecDeque<(Entry, Option<Sample>)>,
    }

    impl ScriptedProvider {
        fn new(counts: DomainCounts) -> Self {
            Self {
                header: FileHeader::new(
                    Activities::ALL,
                    counts,
                    100,
                    HostIdentity {
                        nodename: "db1".into(),
                        ..Default::default()
                    },
                    0,
                ),
                entries: VecDeque::new(),
            }
        }

        fn sample(mut self, sample: Sample) -> Self {
            self.entries.push_back((Entry::Sample, Some(sample)));
            self
        }

        fn restart(mut self, epoch: i64) -> Self {
            self.entries
                .push_back((Entry::Restart(RecordTime::from_epoch(epoch)), None));
            self
        }

        fn comment(mut self, epoch: i64, text: &str) -> Self {
            self.entries.push_back((
                Entry::Comment(RecordTime::from_epoch(epoch), text.to_string()),
                None,
            ));
            self
        }
    }

    impl SampleProvider for ScriptedProvider {
        fn header(&self) -> &FileHeader {
            &self.header
        }

        fn next_entry(&mut self, sample: &mut Sample) -> Result<Option<Entry>, ProviderError> {
            Ok(self.entries.pop_front().map(|(entry, s)| {
                if let Some(s) = s {
                    *sample = s;
                }
                entry
            }))
        }

        fn is_live(&self) -> bool {
            false
        }
    }

    fn counts() -> DomainCounts {
        DomainCounts {
            cpu_nr: 1,
            ..Default::default()
        }
    }

    /// Uniprocessor sample after `ticks` ticks, `busy` of them in user mode.
    fn tick(epoch: i64, ticks: u64, busy: u64, free_kb: u64) -> Sample {
        let mut s = Sample::with_counts(&counts());
        s.stat.time = RecordTime::from_epoch(epoch);
        s.stat.cpu.user = busy;
        s.stat.cpu.idle = ticks - busy;
        s.stat.uptime = ticks;
        s.stat.uptime0 = ticks;
        s.stat.memory.free = free_kb;
        s
    }

    fn options() -> ReportOptions {
        ReportOptions {
            activities: Activities::CPU | Activities::MEMORY,
            format: OutputFormat::Delimited,
            ..Default::default()
        }
    }

    fn lines(out: Vec<u8>) -> Vec<String> {
        String::from_utf8(out)
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    fn collected(fs: MockFs) -> Sample {
        let mut collector = Collector::new(fs, "/proc", "/sys").with_hz(100);
        let counts = collector.discover_counts(Activities::ALL);
        let mut sample = Sample::with_counts(&counts);
        collector.collect(&mut sample, Activities::ALL).unwrap();
        sample
    }

    #[test]
    fn test_reports_between_consecutive_samples() {
        let mut provider = ScriptedProvider::new(counts())
            .sample(tick(1000, 1000, 0, 100))
            .sample(tick(1001, 1100, 50, 300))
            .sample(tick(1002, 1200, 60, 500));

        let mut reporter = Reporter::new(Vec::new(), options());
        assert_eq!(reporter.run(&mut provider).unwrap(), 2);
        let out = lines(reporter.into_inner());

        let user: Vec<_> = out.iter().filter(|l| l.contains(";all;%user;")).collect();
        assert_eq!(user.len(), 2);
        assert!(user[0].ends_with(";50.00"));
        assert!(user[1].ends_with(";10.00"));
        assert!(user[0].starts_with("db1;1;"));
    }

    #[test]
    fn test_averages_recomputed_over_segment() {
        let mut provider = ScriptedProvider::new(counts())
            .sample(tick(1000, 1000, 0, 100))
            .sample(tick(1001, 1100, 50, 300))
            .sample(tick(1002, 1200, 60, 500));

        let mut options = options();
        options.format = OutputFormat::Text;
        let mut reporter = Reporter::new(Vec::new(), options);
        reporter.run(&mut provider).unwrap();
        let out = lines(reporter.into_inner());

        let averages: Vec<_> = out
            .iter()
            .filter(|l| l.starts_with("Average:") && !l.contains('%'))
            .collect();
        // cpu row: 60 busy ticks over 200.
        assert!(averages.iter().any(|l| l.contains("all") && l.contains("30.00")));
        // memory: mean of the two printed levels (300 and 500).
        assert!(
            averages
                .iter()
                .any(|l| l.split_whitespace().nth(1) == Some("400"))
        );
    }

    #[test]
    fn test_restart_starts_new_segment() {
        let mut provider = ScriptedProvider::new(counts())
            .sample(tick(1000, 1000, 0, 100))
            .sample(tick(1001, 1100, 50, 100))
            .restart(2000)
            // Counters start over after the reboot.
            .sample(tick(2001, 100, 10, 100))
            .comment(2001, "after reboot")
            .sample(tick(2002, 200, 30, 100));

        let mut reporter = Reporter::new(Vec::new(), options());
        assert_eq!(reporter.run(&mut provider).unwrap(), 2);
        let out = lines(reporter.into_inner());

        let restart = out.iter().position(|l| l.ends_with("LINUX-RESTART")).unwrap();
        let comment = out.iter().position(|l| l.ends_with("COM after reboot")).unwrap();
        assert!(restart < comment);
        let user: Vec<_> = out.iter().filter(|l| l.contains(";all;%user;")).collect();
        assert!(user[0].ends_with(";50.00"));
        // Compared to the first sample after the restart, not the one before.
        assert!(user[1].ends_with(";20.00"));
    }

    #[test]
    fn test_count_limits_reports() {
        let mut provider = ScriptedProvider::new(counts())
            .sample(tick(1000, 1000, 0, 100))
            .sample(tick(1001, 1100, 10, 100))
            .sample(tick(1002, 1200, 20, 100));

        let mut options = options();
        options.count = Some(1);
        let mut reporter = Reporter::new(Vec::new(), options);
        assert_eq!(reporter.run(&mut provider).unwrap(), 1);
    }

    #[test]
    fn test_since_boot_report() {
        let mut provider = ScriptedProvider::new(counts()).sample(tick(1000, 1000, 250, 100));
        let mut reporter = Reporter::new(Vec::new(), options());
        reporter.since_boot(&mut provider).unwrap();
        let out = lines(reporter.into_inner());
        assert!(out.iter().any(|l| l.contains(";all;%user;25.00")));
        assert!(out.iter().any(|l| l.contains(";all;%idle;75.00")));
    }

    #[test]
    fn test_since_boot_per_cpu_interrupts() {
        let counts = DomainCounts {
            cpu_nr: 1,
            irqcpu_nr: 3,
            ..Default::default()
        };
        let mut sample = Sample::with_counts(&counts);
        sample.stat.time = RecordTime::from_epoch(1000);
        sample.stat.cpu.idle = 1000;
        sample.stat.uptime = 1000;
        sample.stat.uptime0 = 1000;
        sample.irqcpus[0][0] = IrqCpuStats {
            irq: 0,
            interrupts: 500,
        };
        sample.irqcpus[0][1] = IrqCpuStats {
            irq: 9,
            interrupts: 100,
        };
        let mut provider = ScriptedProvider::new(counts).sample(sample);
        let mut reporter = Reporter::new(
            Vec::new(),
            ReportOptions {
                activities: Activities::IRQCPU,
                format: OutputFormat::Delimited,
                ..Default::default()
            },
        );
        reporter.since_boot(&mut provider).unwrap();
        let out = lines(reporter.into_inner());
        // 10 seconds since boot at 100 Hz.
        assert!(out.iter().any(|l| l.ends_with(";0;i000/s;50.00")), "{out:?}");
        assert!(out.iter().any(|l| l.ends_with(";0;i009/s;10.00")), "{out:?}");
    }

    #[test]
    fn test_end_to_end_cpu_from_proc() {
        let before = collected(MockFs::typical_system());
        let after = collected(MockFs::after_one_second());
        let mut provider = ScriptedProvider::new(before.counts())
            .sample(before)
            .sample(after);

        let mut reporter = Reporter::new(Vec::new(), options());
        reporter.run(&mut provider).unwrap();
        let out = lines(reporter.into_inner());

        let value = |field: &str| {
            out.iter()
                .find(|l| l.contains(&format!(";all;{};", field)))
                .and_then(|l| l.rsplit(';').next())
                .map(str::to_string)
        };
        assert_eq!(value("%user").as_deref(), Some("10.00"));
        assert_eq!(value("%system").as_deref(), Some("5.00"));
        assert_eq!(value("%idle").as_deref(), Some("85.00"));
    }
}
