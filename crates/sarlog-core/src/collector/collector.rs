//! Main collector that drives the system collector for one tick.
//!
//! The `Collector` struct is the live [`SampleSource`]: it discovers domain
//! cardinalities at startup and fills one `Sample` per tick.

use std::time::{Duration, Instant};

use tracing::debug;

use crate::collector::procfs::{CollectError, SystemCollector};
use crate::collector::traits::FileSystem;
use crate::sampler::SampleSource;
use crate::storage::model::{Activities, DomainCounts, RecordTime, Sample};
use crate::util::{HostIdentity, clock_ticks, host_identity};

/// Timing information for each collector phase.
///
/// Used for debugging and performance monitoring.
#[derive(Debug, Clone, Default)]
pub struct CollectorTiming {
    /// Total tick collection time.
    pub total: Duration,
    /// `/proc/stat`.
    pub stat: Duration,
    /// `/proc/interrupts`.
    pub interrupts: Duration,
    /// meminfo, vmstat, loadavg, kernel tables and sockets.
    pub memory: Duration,
    pub serial: Duration,
    pub netdev: Duration,
    pub diskstats: Duration,
}

/// Main collector that gathers all system metrics of one tick.
pub struct Collector<F: FileSystem> {
    system_collector: SystemCollector<F>,
    hz: u32,
    host: HostIdentity,
    /// Timing information from the last collect call.
    last_timing: Option<CollectorTiming>,
}

impl<F: FileSystem> Collector<F> {
    /// Creates a new collector.
    ///
    /// # Arguments
    /// * `fs` - Filesystem implementation (real or mock)
    /// * `proc_path` - Base path to proc filesystem (usually "/proc")
    /// * `sys_path` - Base path to sysfs (usually "/sys")
    ///
    /// Ticks per second and host identity are taken from the running kernel.
    pub fn new(fs: F, proc_path: impl Into<String>, sys_path: impl Into<String>) -> Self {
        Self {
            system_collector: SystemCollector::new(fs, proc_path, sys_path),
            hz: clock_ticks(),
            host: host_identity(),
            last_timing: None,
        }
    }

    /// Overrides the kernel tick rate.
    pub fn with_hz(mut self, hz: u32) -> Self {
        self.hz = hz;
        self
    }

    pub fn with_host(mut self, host: HostIdentity) -> Self {
        self.host = host;
        self
    }

    /// Reports partitions as well as whole disks.
    pub fn with_partitions(mut self, partitions: bool) -> Self {
        self.system_collector = self.system_collector.with_partitions(partitions);
        self
    }

    /// Returns timing information from the last collect call.
    pub fn last_timing(&self) -> Option<&CollectorTiming> {
        self.last_timing.as_ref()
    }

    /// Reads every selected domain into `sample`.
    ///
    /// `/proc/stat` is mandatory; any other missing source leaves its domain
    /// zeroed.
    pub fn collect_into(
        &mut self,
        sample: &mut Sample,
        activities: Activities,
    ) -> Result<(), CollectError> {
        let total_start = Instant::now();
        let mut timing = CollectorTiming::default();
        let sys = &self.system_collector;

        let start = Instant::now();
        sys.read_stat(sample)?;
        timing.stat = start.elapsed();

        if activities.contains(Activities::IRQCPU) && !sample.irqcpus.is_empty() {
            let start = Instant::now();
            soft("interrupts", sys.read_interrupts(sample));
            timing.interrupts = start.elapsed();
        }

        let start = Instant::now();
        if activities.contains(Activities::MEMORY) {
            soft("meminfo", sys.read_meminfo(sample));
        }
        if activities.contains(Activities::PAGE) || activities.contains(Activities::SWAP) {
            soft("vmstat", sys.read_vmstat(sample));
        }
        if activities.contains(Activities::QUEUE) {
            soft("loadavg", sys.read_loadavg(sample));
        }
        if activities.contains(Activities::KTABLES) {
            soft("ktables", sys.read_ktables(sample));
        }
        if activities.contains(Activities::SOCKETS) {
            soft("sockstat", sys.read_sockstat(sample));
        }
        timing.memory = start.elapsed();

        if !sample.serials.is_empty() {
            let start = Instant::now();
            soft("serial", sys.read_serial(sample));
            timing.serial = start.elapsed();
        }
        if !sample.ifaces.is_empty() {
            let start = Instant::now();
            soft("netdev", sys.read_net_dev(sample));
            timing.netdev = start.elapsed();
        }
        if !sample.disks.is_empty() {
            let start = Instant::now();
            soft("diskstats", sys.read_diskstats(sample));
            timing.diskstats = start.elapsed();
        }

        timing.total = total_start.elapsed();
        self.last_timing = Some(timing);
        Ok(())
    }
}

/// Absorbs a domain that could not be read: it stays zeroed for this tick.
fn soft(domain: &str, result: Result<(), CollectError>) {
    if let Err(e) = result {
        debug!(domain, error = %e, "domain not collected");
    }
}

impl<F: FileSystem> SampleSource for Collector<F> {
    fn discover_counts(&self, activities: Activities) -> DomainCounts {
        let sys = &self.system_collector;
        DomainCounts {
            cpu_nr: sys.get_cpu_nr().unwrap_or(1),
            irq_nr: sys.get_irq_nr().unwrap_or(0),
            irqcpu_nr: sys.get_irqcpu_nr().unwrap_or(0),
            serial_nr: sys.get_serial_nr().unwrap_or(0),
            iface_nr: sys.get_iface_nr().unwrap_or(0),
            disk_nr: sys.get_disk_nr().unwrap_or(0),
        }
        .restrict(activities)
        .with_prealloc()
    }

    fn collect(&mut self, sample: &mut Sample, activities: Activities) -> Result<(), CollectError> {
        self.collect_into(sample, activities)?;
        sample.stat.time = RecordTime::now();
        Ok(())
    }

    fn hz(&self) -> u32 {
        self.hz
    }

    fn host(&self) -> &HostIdentity {
        &self.host
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::mock::MockFs;

    fn collector(fs: MockFs) -> Collector<MockFs> {
        Collector::new(fs, "/proc", "/sys").with_hz(100)
    }

    #[test]
    fn test_discover_counts_with_prealloc() {
        let c = collector(MockFs::typical_system());
        let counts = c.discover_counts(Activities::ALL);
        assert_eq!(
            counts,
            DomainCounts {
                cpu_nr: 4,
                irq_nr: 16,
                irqcpu_nr: 6,
                serial_nr: 3,
                iface_nr: 4,
                disk_nr: 5,
            }
        );
    }

    #[test]
    fn test_discover_counts_restricted() {
        let c = collector(MockFs::typical_system());
        let counts = c.discover_counts(Activities::CPU | Activities::DISK);
        assert_eq!(counts.cpu_nr, 4);
        assert_eq!(counts.disk_nr, 5);
        assert_eq!(counts.irq_nr, 0);
        assert_eq!(counts.iface_nr, 0);
        assert_eq!(counts.irqcpu_nr, 0);
    }

    #[test]
    fn test_collect_fills_sample() {
        let mut c = collector(MockFs::typical_system());
        let counts = c.discover_counts(Activities::ALL);
        let mut sample = Sample::with_counts(&counts);

        c.collect(&mut sample, Activities::ALL).unwrap();

        assert!(sample.stat.time.epoch > 0);
        assert_eq!(sample.stat.cpu.user, 10000);
        assert_eq!(sample.stat.memory.total, 16_384_000);
        assert_eq!(sample.ifaces[1].name, "eth0");
        assert_eq!(sample.disks[0].key(), (8, 0));
        assert!(c.last_timing().is_some());
    }

    #[test]
    fn test_collect_skips_unselected_domains() {
        let mut c = collector(MockFs::typical_system());
        let counts = c.discover_counts(Activities::ALL);
        let mut sample = Sample::with_counts(&counts);

        c.collect(&mut sample, Activities::CPU).unwrap();
        assert_eq!(sample.stat.memory.total, 0);
        assert_eq!(sample.stat.sockets.tcp_inuse, 0);
    }

    #[test]
    fn test_missing_optional_source_is_absorbed() {
        let mut fs = MockFs::typical_system();
        fs.remove_proc("net/sockstat");
        let mut c = collector(fs);
        let mut sample = Sample::with_counts(&c.discover_counts(Activities::ALL));

        assert!(c.collect(&mut sample, Activities::ALL).is_ok());
        assert_eq!(sample.stat.sockets.tcp_inuse, 0);
    }

    #[test]
    fn test_missing_proc_stat_is_an_error() {
        let mut fs = MockFs::typical_system();
        fs.remove_proc("stat");
        let mut c = collector(fs);
        let mut sample = Sample::with_counts(&DomainCounts::default());
        assert!(c.collect(&mut sample, Activities::ALL).is_err());
    }
}
