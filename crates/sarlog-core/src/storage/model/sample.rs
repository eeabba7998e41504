//! One collection tick: the fixed stat record plus every variable-cardinality
//! domain array, and the counts that size those arrays.

use std::ops::BitOr;

use chrono::{Local, TimeZone, Timelike};
use serde::{Deserialize, Serialize};

use super::system::{
    CpuStats, DiskStats, IrqCpuStats, IrqStats, KernelTables, MemoryStats, NetDevStats,
    PagingStats, QueueStats, SerialStats, SocketStats, SwapStats,
};

/// Extra disk slots allocated beyond the count discovered at startup.
pub const NR_DISK_PREALLOC: u32 = 3;
/// Extra network interface slots.
pub const NR_IFACE_PREALLOC: u32 = 2;
/// Extra serial line slots.
pub const NR_SERIAL_PREALLOC: u32 = 2;
/// Extra IRQ slots per CPU.
pub const NR_IRQPREALLOC: u32 = 3;

/// Upper bounds on the counts a data file header may carry.
pub const NR_CPUS_MAX: u32 = 8192;
pub const NR_IRQS_MAX: u32 = 4096;
pub const NR_SERIAL_MAX: u32 = 512;
pub const NR_IFACE_MAX: u32 = 4096;
pub const NR_DISK_MAX: u32 = 8192;

/// Bitmask of the activities recorded in a data file.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Activities(u32);

impl Activities {
    pub const CPU: Self = Self(1 << 0);
    pub const PCSW: Self = Self(1 << 1);
    pub const IRQ: Self = Self(1 << 2);
    pub const SWAP: Self = Self(1 << 3);
    pub const PAGE: Self = Self(1 << 4);
    pub const MEMORY: Self = Self(1 << 5);
    pub const KTABLES: Self = Self(1 << 6);
    pub const SOCKETS: Self = Self(1 << 7);
    pub const QUEUE: Self = Self(1 << 8);
    pub const SERIAL: Self = Self(1 << 9);
    pub const IRQCPU: Self = Self(1 << 10);
    pub const NET_DEV: Self = Self(1 << 11);
    pub const DISK: Self = Self(1 << 12);
    pub const ALL: Self = Self((1 << 13) - 1);

    const NAMES: [(Self, &'static str); 13] = [
        (Self::CPU, "cpu"),
        (Self::PCSW, "pcsw"),
        (Self::IRQ, "irq"),
        (Self::SWAP, "swap"),
        (Self::PAGE, "paging"),
        (Self::MEMORY, "memory"),
        (Self::KTABLES, "ktables"),
        (Self::SOCKETS, "sockets"),
        (Self::QUEUE, "queue"),
        (Self::SERIAL, "serial"),
        (Self::IRQCPU, "irqcpu"),
        (Self::NET_DEV, "netdev"),
        (Self::DISK, "disk"),
    ];

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Builds a mask from raw bits, dropping bits this version does not know.
    pub const fn from_bits_truncate(bits: u32) -> Self {
        Self(bits & Self::ALL.0)
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Short names of the activities present, in bit order.
    pub fn names(self) -> Vec<&'static str> {
        Self::NAMES
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect()
    }

    /// Parses a comma-separated list of activity names; `ALL` selects
    /// everything.
    pub fn parse_list(list: &str) -> Result<Self, String> {
        let mut activities = Self::empty();
        for name in list.split(',').map(str::trim) {
            if name.eq_ignore_ascii_case("all") {
                activities.insert(Self::ALL);
                continue;
            }
            let (flag, _) = Self::NAMES
                .iter()
                .find(|(_, n)| n.eq_ignore_ascii_case(name))
                .ok_or_else(|| format!("unknown activity {:?}", name))?;
            activities.insert(*flag);
        }
        Ok(activities)
    }
}

impl BitOr for Activities {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl Default for Activities {
    fn default() -> Self {
        Self::ALL
    }
}

/// Cardinality of every variable-size domain.
///
/// These are the counts written in the file header; they bound every array
/// read back from that file.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DomainCounts {
    /// Number of processors (1 on a uniprocessor machine).
    pub cpu_nr: u32,
    /// Interrupt lines listed on the `intr` line of `/proc/stat`.
    pub irq_nr: u32,
    /// IRQ rows per CPU from `/proc/interrupts`.
    pub irqcpu_nr: u32,
    pub serial_nr: u32,
    pub iface_nr: u32,
    pub disk_nr: u32,
}

impl DomainCounts {
    /// Adds the preallocation margin that absorbs entities appearing mid-run.
    pub fn with_prealloc(self) -> Self {
        Self {
            cpu_nr: self.cpu_nr,
            irq_nr: self.irq_nr,
            irqcpu_nr: if self.irqcpu_nr > 0 {
                self.irqcpu_nr + NR_IRQPREALLOC
            } else {
                0
            },
            serial_nr: if self.serial_nr > 0 {
                self.serial_nr + NR_SERIAL_PREALLOC
            } else {
                0
            },
            iface_nr: if self.iface_nr > 0 {
                self.iface_nr + NR_IFACE_PREALLOC
            } else {
                0
            },
            disk_nr: if self.disk_nr > 0 {
                self.disk_nr + NR_DISK_PREALLOC
            } else {
                0
            },
        }
    }

    /// Zeroes the counts of domains that are not collected.
    pub fn restrict(self, activities: Activities) -> Self {
        let keep = |flag: Activities, n: u32| if activities.contains(flag) { n } else { 0 };
        Self {
            cpu_nr: self.cpu_nr.max(1),
            irq_nr: keep(Activities::IRQ, self.irq_nr),
            irqcpu_nr: keep(Activities::IRQCPU, self.irqcpu_nr),
            serial_nr: keep(Activities::SERIAL, self.serial_nr),
            iface_nr: keep(Activities::NET_DEV, self.iface_nr),
            disk_nr: keep(Activities::DISK, self.disk_nr),
        }
    }

    /// First count above its bound, as `(domain, count, max)`.
    pub fn out_of_range(&self) -> Option<(&'static str, u32, u32)> {
        [
            ("cpu", self.cpu_nr, NR_CPUS_MAX),
            ("irq", self.irq_nr, NR_IRQS_MAX),
            ("irqcpu", self.irqcpu_nr, NR_IRQS_MAX),
            ("serial", self.serial_nr, NR_SERIAL_MAX),
            ("iface", self.iface_nr, NR_IFACE_MAX),
            ("disk", self.disk_nr, NR_DISK_MAX),
        ]
        .into_iter()
        .find(|&(_, count, max)| count > max)
    }

    /// Rows in the per-CPU block: none on a uniprocessor machine.
    pub fn per_cpu_rows(&self) -> usize {
        if self.cpu_nr > 1 {
            self.cpu_nr as usize
        } else {
            0
        }
    }

    /// Rows in the per-CPU per-IRQ block (one per processor, at least one).
    pub fn irqcpu_rows(&self) -> usize {
        self.cpu_nr.max(1) as usize
    }
}

/// Collection time of a record: epoch seconds plus the collector's local
/// wall-clock time, so reports do not depend on the reader's timezone.
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq, Default)]
pub struct RecordTime {
    pub epoch: i64,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

impl RecordTime {
    pub fn from_epoch(epoch: i64) -> Self {
        match Local.timestamp_opt(epoch, 0).earliest() {
            Some(local) => Self {
                epoch,
                hour: local.hour() as u8,
                minute: local.minute() as u8,
                second: local.second() as u8,
            },
            None => Self {
                epoch,
                ..Self::default()
            },
        }
    }

    pub fn now() -> Self {
        Self::from_epoch(Local::now().timestamp())
    }

    /// `HH:MM:SS` in the collector's local time.
    pub fn clock(&self) -> String {
        format!("{:02}:{:02}:{:02}", self.hour, self.minute, self.second)
    }
}

/// Fixed-cardinality counters of one tick.
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq, Default)]
pub struct StatRecord {
    pub time: RecordTime,
    /// Machine uptime in ticks, summed over all processors.
    pub uptime: u64,
    /// Uptime of one reference processor; equals `uptime` on a uniprocessor.
    pub uptime0: u64,
    /// Totals over all processors (the `cpu` line).
    pub cpu: CpuStats,
    pub irq_sum: u64,
    pub context_switches: u64,
    /// Processes created since boot.
    pub processes: u64,
    pub paging: PagingStats,
    pub swap: SwapStats,
    pub memory: MemoryStats,
    pub ktables: KernelTables,
    pub sockets: SocketStats,
    pub queue: QueueStats,
}

/// One complete tick: the stat record and every domain array.
///
/// Arrays are sized once from [`DomainCounts`] and overwritten in place on
/// each collection cycle.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct Sample {
    pub stat: StatRecord,
    pub cpus: Vec<CpuStats>,
    pub irqs: Vec<IrqStats>,
    pub serials: Vec<SerialStats>,
    /// One row per processor, `irqcpu_nr` entries per row.
    pub irqcpus: Vec<Vec<IrqCpuStats>>,
    pub ifaces: Vec<NetDevStats>,
    pub disks: Vec<DiskStats>,
}

impl Sample {
    pub fn with_counts(counts: &DomainCounts) -> Self {
        let mut sample = Self::default();
        sample.resize(counts);
        sample
    }

    /// Grows or shrinks every array to `counts`, keeping existing entries.
    pub fn resize(&mut self, counts: &DomainCounts) {
        self.cpus.resize(counts.per_cpu_rows(), CpuStats::default());
        self.irqs.resize(counts.irq_nr as usize, IrqStats::default());
        self.serials
            .resize(counts.serial_nr as usize, SerialStats::default());
        let irqcpu_nr = if counts.irqcpu_nr > 0 {
            counts.irqcpu_rows()
        } else {
            0
        };
        self.irqcpus.resize_with(irqcpu_nr, Vec::new);
        for row in &mut self.irqcpus {
            row.resize(counts.irqcpu_nr as usize, IrqCpuStats::default());
        }
        self.ifaces
            .resize(counts.iface_nr as usize, NetDevStats::default());
        self.disks.resize(counts.disk_nr as usize, DiskStats::default());
    }

    /// Current array sizes expressed as counts.
    pub fn counts(&self) -> DomainCounts {
        DomainCounts {
            cpu_nr: (self.cpus.len().max(self.irqcpus.len()).max(1)) as u32,
            irq_nr: self.irqs.len() as u32,
            irqcpu_nr: self.irqcpus.first().map_or(0, |row| row.len()) as u32,
            serial_nr: self.serials.len() as u32,
            iface_nr: self.ifaces.len() as u32,
            disk_nr: self.disks.len() as u32,
        }
    }

    /// Zeroes every domain before a parser fills it, except the per-CPU rows:
    /// an offline CPU keeps its last known counters.
    pub fn reset_keep_cpus(&mut self) {
        self.stat = StatRecord::default();
        self.irqs.fill(IrqStats::default());
        self.serials.fill(SerialStats::default());
        for row in &mut self.irqcpus {
            row.fill(IrqCpuStats::default());
        }
        self.ifaces.fill(NetDevStats::default());
        self.disks.fill(DiskStats::default());
    }

    /// Zeroes everything, per-CPU rows included.
    pub fn clear(&mut self) {
        self.reset_keep_cpus();
        self.cpus.fill(CpuStats::default());
    }
}
