//! System-wide counter groups sampled from `/proc` and `/sys`.
//!
//! Every structure here has a fixed binary footprint in the data file (see
//! [`crate::storage::codec`]). Counters are cumulative unless stated otherwise;
//! rates are derived later from two samples.

use serde::{Deserialize, Serialize};

/// IRQ value marking an unused per-CPU interrupt slot.
pub const IRQ_FREE: u32 = !0;

/// Maximum interface name length stored on disk (including the NUL terminator).
pub const IFNAMSIZ: usize = 16;

/// CPU time counters from `/proc/stat`.
///
/// Source: `/proc/stat` (`cpu` and `cpuN` lines)
///
/// All values are in clock ticks. `guest` and `guest_nice` are already
/// included in `user` and `nice` by the kernel.
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq, Default)]
pub struct CpuStats {
    /// Source: `/proc/stat` column 1
    pub user: u64,
    /// Source: `/proc/stat` column 2
    pub nice: u64,
    /// Source: `/proc/stat` column 3
    pub system: u64,
    /// Source: `/proc/stat` column 4
    pub idle: u64,
    /// Source: `/proc/stat` column 5
    pub iowait: u64,
    /// Time servicing hardware interrupts.
    /// Source: `/proc/stat` column 6
    pub irq: u64,
    /// Source: `/proc/stat` column 7
    pub softirq: u64,
    /// Source: `/proc/stat` column 8
    pub steal: u64,
    /// Source: `/proc/stat` column 9
    pub guest: u64,
    /// Source: `/proc/stat` column 10
    pub guest_nice: u64,
}

impl CpuStats {
    /// Sum of every mode counter, i.e. the uptime of this row in ticks.
    ///
    /// Guest time is not added again since the kernel folds it into user/nice.
    pub fn total_ticks(&self) -> u64 {
        self.user
            .wrapping_add(self.nice)
            .wrapping_add(self.system)
            .wrapping_add(self.idle)
            .wrapping_add(self.iowait)
            .wrapping_add(self.irq)
            .wrapping_add(self.softirq)
            .wrapping_add(self.steal)
    }

    /// `true` when every counter is zero (a CPU never seen online).
    pub fn is_zero(&self) -> bool {
        *self == Self::default()
    }
}

/// Counter for one interrupt line.
///
/// Source: `/proc/stat` `intr` line, one entry per IRQ number (ordinal).
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq, Default)]
pub struct IrqStats {
    pub count: u64,
}

/// Serial line counters.
///
/// Source: `/proc/tty/driver/serial`
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq, Default)]
pub struct SerialStats {
    /// 1-based line number (`ttyS{line - 1}`); 0 marks an unused slot.
    pub line: u32,
    pub rx: u32,
    pub tx: u32,
    pub frame: u32,
    pub parity: u32,
    pub brk: u32,
    pub overrun: u32,
}

impl SerialStats {
    pub fn is_free(&self) -> bool {
        self.line == 0
    }
}

/// Interrupts received by one CPU for one IRQ.
///
/// Source: `/proc/interrupts`
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct IrqCpuStats {
    /// IRQ number, or [`IRQ_FREE`] for an unused slot.
    pub irq: u32,
    pub interrupts: u32,
}

impl Default for IrqCpuStats {
    fn default() -> Self {
        Self {
            irq: IRQ_FREE,
            interrupts: 0,
        }
    }
}

impl IrqCpuStats {
    pub fn is_free(&self) -> bool {
        self.irq == IRQ_FREE
    }
}

/// Network interface counters.
///
/// Source: `/proc/net/dev`
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Eq, Default)]
pub struct NetDevStats {
    /// Interface name; empty (or `"?"`) marks an unused slot.
    pub name: String,
    pub rx_packets: u64,
    pub tx_packets: u64,
    pub rx_bytes: u64,
    pub tx_bytes: u64,
    pub rx_compressed: u64,
    pub tx_compressed: u64,
    pub multicast: u64,
    pub rx_errors: u64,
    pub tx_errors: u64,
    pub collisions: u64,
    pub rx_dropped: u64,
    pub tx_dropped: u64,
}

impl NetDevStats {
    pub fn is_free(&self) -> bool {
        self.name.is_empty() || self.name == "?"
    }

    /// Zeroes every counter and keeps only the interface name.
    pub fn reset_to(&mut self, name: &str) {
        *self = Self {
            name: name.to_string(),
            ..Self::default()
        };
    }
}

/// Block device counters.
///
/// Source: `/proc/diskstats`
///
/// Tick fields are milliseconds and, like the kernel's, only 32 bits wide.
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq, Default)]
pub struct DiskStats {
    /// Zero major and minor mark an unused slot.
    pub major: u32,
    pub minor: u32,
    /// Reads plus writes completed.
    /// Source: `/proc/diskstats` fields 4 + 8
    pub nr_ios: u64,
    /// Source: `/proc/diskstats` field 6
    pub rd_sect: u64,
    /// Source: `/proc/diskstats` field 10
    pub wr_sect: u64,
    /// Source: `/proc/diskstats` field 7
    pub rd_ticks: u32,
    /// Source: `/proc/diskstats` field 11
    pub wr_ticks: u32,
    /// Source: `/proc/diskstats` field 13
    pub tot_ticks: u32,
    /// Weighted time doing I/O.
    /// Source: `/proc/diskstats` field 14
    pub rq_ticks: u32,
}

impl DiskStats {
    pub fn is_free(&self) -> bool {
        self.major == 0 && self.minor == 0
    }

    pub fn key(&self) -> (u32, u32) {
        (self.major, self.minor)
    }

    /// Zeroes every counter and keeps only the device numbers.
    pub fn reset_to(&mut self, major: u32, minor: u32) {
        *self = Self {
            major,
            minor,
            ..Self::default()
        };
    }
}

/// Paging counters.
///
/// Source: `/proc/vmstat`
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq, Default)]
pub struct PagingStats {
    pub pgpgin: u64,
    pub pgpgout: u64,
    pub pgfault: u64,
    pub pgmajfault: u64,
    pub pgfree: u64,
    pub pgscan_kswapd: u64,
    pub pgscan_direct: u64,
    pub pgsteal: u64,
}

/// Swapping counters.
///
/// Source: `/proc/vmstat` (`pswpin`, `pswpout`)
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq, Default)]
pub struct SwapStats {
    pub pswpin: u64,
    pub pswpout: u64,
}

/// Memory snapshot. Not a counter: reported as-is.
///
/// Source: `/proc/meminfo`, all values in kB.
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq, Default)]
pub struct MemoryStats {
    pub total: u64,
    pub free: u64,
    pub available: u64,
    pub buffers: u64,
    pub cached: u64,
    pub swap_cached: u64,
    pub active: u64,
    pub inactive: u64,
    pub dirty: u64,
    pub committed_as: u64,
    pub swap_total: u64,
    pub swap_free: u64,
}

/// Kernel table usage.
///
/// Source: `/proc/sys/fs/dentry-state`, `/proc/sys/fs/file-nr`,
/// `/proc/sys/fs/inode-nr`, `/proc/sys/kernel/pty/nr`
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq, Default)]
pub struct KernelTables {
    pub dentry_unused: u32,
    pub file_used: u32,
    pub inode_used: u32,
    pub pty_nr: u32,
}

/// Socket usage.
///
/// Source: `/proc/net/sockstat`
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq, Default)]
pub struct SocketStats {
    pub sock_inuse: u32,
    pub tcp_inuse: u32,
    pub tcp_tw: u32,
    pub udp_inuse: u32,
    pub raw_inuse: u32,
    pub frag_inuse: u32,
}

/// Run queue and load averages.
///
/// Source: `/proc/loadavg`, `/proc/stat` (`procs_blocked`)
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq, Default)]
pub struct QueueStats {
    pub nr_running: u32,
    pub nr_threads: u32,
    pub procs_blocked: u32,
    /// Load averages multiplied by 100.
    pub load_avg_1: u32,
    pub load_avg_5: u32,
    pub load_avg_15: u32,
}

impl QueueStats {
    pub fn load(value: u32) -> f64 {
        value as f64 / 100.0
    }
}
