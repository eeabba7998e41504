//! Data models for the storage system.
//!
//! - [`system`]: per-domain counter structures read from `/proc` and `/sys`
//! - [`sample`]: one collection tick ([`Sample`]) and its sizing ([`DomainCounts`])
//!
//! # Layout
//!
//! ```text
//! Sample
//!   ├── stat: StatRecord        <- fixed-cardinality counters + timestamp
//!   ├── cpus: Vec<CpuStats>     <- only on SMP machines
//!   ├── irqs: Vec<IrqStats>
//!   ├── serials: Vec<SerialStats>
//!   ├── irqcpus: Vec<Vec<IrqCpuStats>>   <- one row per CPU
//!   ├── ifaces: Vec<NetDevStats>
//!   └── disks: Vec<DiskStats>
//! ```
//!
//! Array lengths always equal the counts of the file being written or read.

mod sample;
mod system;

pub use sample::{
    Activities, DomainCounts, NR_CPUS_MAX, NR_DISK_MAX, NR_DISK_PREALLOC, NR_IFACE_MAX,
    NR_IFACE_PREALLOC, NR_IRQPREALLOC, NR_IRQS_MAX, NR_SERIAL_MAX, NR_SERIAL_PREALLOC,
    RecordTime, Sample, StatRecord,
};
pub use system::{
    CpuStats, DiskStats, IFNAMSIZ, IRQ_FREE, IrqCpuStats, IrqStats, KernelTables, MemoryStats,
    NetDevStats, PagingStats, QueueStats, SerialStats, SocketStats, SwapStats,
};
