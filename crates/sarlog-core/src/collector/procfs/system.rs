//! System collector: fills one [`Sample`] from `/proc` and `/sys`, and
//! discovers the cardinality of every variable-size domain.

use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::warn;

use crate::collector::procfs::parser::{
    ParseError, parse_dentry_state, parse_diskstats, parse_file_nr, parse_inode_nr,
    parse_interrupts, parse_loadavg, parse_meminfo, parse_net_dev, parse_serial, parse_single,
    parse_sockstat, parse_stat, parse_vmstat,
};
use crate::collector::traits::FileSystem;
use crate::storage::model::{DiskStats, IrqCpuStats, Sample};

/// Error type for collection operations.
#[derive(Debug)]
pub enum CollectError {
    /// I/O error reading a pseudo-file.
    Io(io::Error),
    /// Unexpected content in a pseudo-file.
    Parse(String),
    /// The pseudo-file does not exist on this kernel.
    Unavailable(String),
}

impl std::fmt::Display for CollectError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CollectError::Io(e) => write!(f, "I/O error: {}", e),
            CollectError::Parse(msg) => write!(f, "parse error: {}", msg),
            CollectError::Unavailable(path) => write!(f, "{} not available", path),
        }
    }
}

impl std::error::Error for CollectError {}

impl From<io::Error> for CollectError {
    fn from(e: io::Error) -> Self {
        CollectError::Io(e)
    }
}

impl From<ParseError> for CollectError {
    fn from(e: ParseError) -> Self {
        CollectError::Parse(e.message)
    }
}

/// Copies `items` into the fixed slots of `slots`; returns how many did not fit.
fn fill_slots<T: Clone>(slots: &mut [T], items: impl IntoIterator<Item = T>) -> usize {
    let mut dropped = 0;
    let mut i = 0;
    for item in items {
        match slots.get_mut(i) {
            Some(slot) => *slot = item,
            None => dropped += 1,
        }
        i += 1;
    }
    dropped
}

/// Collects system-wide metrics from `/proc/` and `/sys/`.
pub struct SystemCollector<F: FileSystem> {
    fs: F,
    proc_path: String,
    sys_path: String,
    /// Report partitions as well as whole disks.
    partitions: bool,
    overflow_warned: AtomicBool,
}

impl<F: FileSystem> SystemCollector<F> {
    /// Creates a new system collector.
    ///
    /// # Arguments
    /// * `fs` - Filesystem implementation (real or mock)
    /// * `proc_path` - Base path to proc filesystem (usually "/proc")
    /// * `sys_path` - Base path to sysfs (usually "/sys")
    pub fn new(fs: F, proc_path: impl Into<String>, sys_path: impl Into<String>) -> Self {
        Self {
            fs,
            proc_path: proc_path.into(),
            sys_path: sys_path.into(),
            partitions: false,
            overflow_warned: AtomicBool::new(false),
        }
    }

    pub fn with_partitions(mut self, partitions: bool) -> Self {
        self.partitions = partitions;
        self
    }

    fn read(&self, path: String) -> Result<String, CollectError> {
        match self.fs.read_to_string(Path::new(&path)) {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(CollectError::Unavailable(path)),
            Err(e) => Err(CollectError::Io(e)),
        }
    }

    fn read_proc(&self, rel: &str) -> Result<String, CollectError> {
        self.read(format!("{}/{}", self.proc_path, rel))
    }

    fn note_dropped(&self, domain: &str, dropped: usize) {
        if dropped > 0 && !self.overflow_warned.swap(true, Ordering::Relaxed) {
            warn!(
                domain,
                dropped, "more entities than preallocated slots, extra ones ignored"
            );
        }
    }

    // ---------------------------------------------------------------------
    // read_<domain>: fill one sample
    // ---------------------------------------------------------------------

    /// Reads `/proc/stat`: CPU totals and rows, uptimes, IRQ sums, context
    /// switches, forks and blocked processes.
    ///
    /// Rows of offline CPUs are absent from the file and left untouched.
    pub fn read_stat(&self, sample: &mut Sample) -> Result<(), CollectError> {
        let stat = parse_stat(&self.read_proc("stat")?)?;
        let s = &mut sample.stat;

        s.cpu = stat.total;
        s.uptime = stat.total.total_ticks();
        s.uptime0 = s.uptime;
        for &(id, cpu) in &stat.cpus {
            if let Some(row) = sample.cpus.get_mut(id as usize) {
                *row = cpu;
            }
        }
        if !sample.cpus.is_empty() {
            // cpu0 is the per-processor clock; without it, average the total
            // over the online rows.
            s.uptime0 = match stat.cpus.iter().find(|(id, _)| *id == 0) {
                Some((_, cpu0)) => cpu0.total_ticks(),
                None => s.uptime / stat.cpus.len().max(1) as u64,
            };
        }

        if let Some((&sum, per_irq)) = stat.intr.split_first() {
            s.irq_sum = sum;
            for (slot, &count) in sample.irqs.iter_mut().zip(per_irq) {
                slot.count = count;
            }
        }
        s.context_switches = stat.ctxt;
        s.processes = stat.processes;
        s.queue.procs_blocked = stat.procs_blocked;
        Ok(())
    }

    /// Reads `/proc/interrupts` into the per-CPU IRQ rows.
    pub fn read_interrupts(&self, sample: &mut Sample) -> Result<(), CollectError> {
        let irqs = parse_interrupts(&self.read_proc("interrupts")?)?;
        let mut dropped = 0;
        for (col, &cpu) in irqs.cpus.iter().enumerate() {
            let Some(row) = sample.irqcpus.get_mut(cpu as usize) else {
                continue;
            };
            dropped = fill_slots(
                row,
                irqs.rows.iter().map(|(irq, counts)| IrqCpuStats {
                    irq: *irq,
                    interrupts: counts.get(col).copied().unwrap_or(0),
                }),
            );
        }
        self.note_dropped("irqcpu", dropped);
        Ok(())
    }

    pub fn read_meminfo(&self, sample: &mut Sample) -> Result<(), CollectError> {
        sample.stat.memory = parse_meminfo(&self.read_proc("meminfo")?)?;
        Ok(())
    }

    pub fn read_vmstat(&self, sample: &mut Sample) -> Result<(), CollectError> {
        let (paging, swap) = parse_vmstat(&self.read_proc("vmstat")?)?;
        sample.stat.paging = paging;
        sample.stat.swap = swap;
        Ok(())
    }

    /// Reads `/proc/loadavg`; keeps `procs_blocked` from `/proc/stat`.
    pub fn read_loadavg(&self, sample: &mut Sample) -> Result<(), CollectError> {
        let queue = parse_loadavg(&self.read_proc("loadavg")?)?;
        let q = &mut sample.stat.queue;
        q.nr_running = queue.nr_running;
        q.nr_threads = queue.nr_threads;
        q.load_avg_1 = queue.load_avg_1;
        q.load_avg_5 = queue.load_avg_5;
        q.load_avg_15 = queue.load_avg_15;
        Ok(())
    }

    /// Reads kernel table usage. Each file is optional.
    pub fn read_ktables(&self, sample: &mut Sample) -> Result<(), CollectError> {
        let k = &mut sample.stat.ktables;
        if let Ok(c) = self.read_proc("sys/fs/dentry-state") {
            k.dentry_unused = parse_dentry_state(&c)?;
        }
        if let Ok(c) = self.read_proc("sys/fs/file-nr") {
            k.file_used = parse_file_nr(&c)?;
        }
        if let Ok(c) = self.read_proc("sys/fs/inode-nr") {
            k.inode_used = parse_inode_nr(&c)?;
        }
        if let Ok(c) = self.read_proc("sys/kernel/pty/nr") {
            k.pty_nr = parse_single(&c)?;
        }
        Ok(())
    }

    pub fn read_sockstat(&self, sample: &mut Sample) -> Result<(), CollectError> {
        sample.stat.sockets = parse_sockstat(&self.read_proc("net/sockstat")?)?;
        Ok(())
    }

    pub fn read_serial(&self, sample: &mut Sample) -> Result<(), CollectError> {
        let lines = parse_serial(&self.read_proc("tty/driver/serial")?)?;
        let dropped = fill_slots(&mut sample.serials, lines);
        self.note_dropped("serial", dropped);
        Ok(())
    }

    pub fn read_net_dev(&self, sample: &mut Sample) -> Result<(), CollectError> {
        let devs = parse_net_dev(&self.read_proc("net/dev")?)?;
        let dropped = fill_slots(&mut sample.ifaces, devs);
        self.note_dropped("netdev", dropped);
        Ok(())
    }

    /// Reads `/proc/diskstats`, keeping devices that did some I/O.
    pub fn read_diskstats(&self, sample: &mut Sample) -> Result<(), CollectError> {
        let disks = self.active_disks()?;
        let dropped = fill_slots(&mut sample.disks, disks);
        self.note_dropped("disk", dropped);
        Ok(())
    }

    fn is_whole_disk(&self, name: &str) -> bool {
        // sysfs spells '/' in device names as '!'
        let path = format!("{}/block/{}", self.sys_path, name.replace('/', "!"));
        self.fs.exists(Path::new(&path))
    }

    fn active_disks(&self) -> Result<Vec<DiskStats>, CollectError> {
        let entries = parse_diskstats(&self.read_proc("diskstats")?)?;
        Ok(entries
            .into_iter()
            .filter(|e| e.stats.nr_ios > 0)
            .filter(|e| self.partitions || self.is_whole_disk(&e.name))
            .map(|e| e.stats)
            .collect())
    }

    // ---------------------------------------------------------------------
    // get_<domain>_nr: cardinality discovery
    // ---------------------------------------------------------------------

    /// Number of processors: highest `cpuN` in sysfs plus one, falling back
    /// to the `cpuN` lines of `/proc/stat`.
    pub fn get_cpu_nr(&self) -> Result<u32, CollectError> {
        let dir = format!("{}/devices/system/cpu", self.sys_path);
        let from_sysfs = self
            .fs
            .read_dir(Path::new(&dir))
            .unwrap_or_default()
            .iter()
            .filter_map(|p| p.file_name()?.to_str()?.strip_prefix("cpu")?.parse::<u32>().ok())
            .max();
        if let Some(max) = from_sysfs {
            return Ok(max + 1);
        }

        let stat = parse_stat(&self.read_proc("stat")?)?;
        Ok(stat
            .cpus
            .iter()
            .map(|(id, _)| id + 1)
            .max()
            .unwrap_or(1))
    }

    /// Number of interrupt lines on the `intr` line of `/proc/stat`.
    pub fn get_irq_nr(&self) -> Result<u32, CollectError> {
        let stat = parse_stat(&self.read_proc("stat")?)?;
        Ok(stat.intr.len().saturating_sub(1) as u32)
    }

    /// Number of numbered IRQ rows in `/proc/interrupts`.
    pub fn get_irqcpu_nr(&self) -> Result<u32, CollectError> {
        Ok(parse_interrupts(&self.read_proc("interrupts")?)?.rows.len() as u32)
    }

    pub fn get_serial_nr(&self) -> Result<u32, CollectError> {
        Ok(parse_serial(&self.read_proc("tty/driver/serial")?)?.len() as u32)
    }

    pub fn get_iface_nr(&self) -> Result<u32, CollectError> {
        Ok(parse_net_dev(&self.read_proc("net/dev")?)?.len() as u32)
    }

    pub fn get_disk_nr(&self) -> Result<u32, CollectError> {
        Ok(self.active_disks()?.len() as u32)
    }
}
