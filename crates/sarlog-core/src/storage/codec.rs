//! Fixed-layout binary encoding of data files and live streams.
//!
//! Layout (all integers native-endian, no implicit padding):
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │ FILE MAGIC (16 bytes)                                   │
//! │   magic: u16                  = 0xd596                  │
//! │   format_magic: u16           (layout revision)         │
//! │   version: [u8; 4]            (producer major.minor.patch) │
//! │   header_size: u32            = 312                     │
//! │   _reserved: u32                                        │
//! ├─────────────────────────────────────────────────────────┤
//! │ FILE HEADER (312 bytes)                                 │
//! │   activities, header_magic, stat_size, hz: u32          │
//! │   cpu_nr, irq_nr, irqcpu_nr, serial_nr, iface_nr,       │
//! │   disk_nr: u32                                          │
//! │   day, month, year (since 1900), _pad: u8               │
//! │   time: i64                                             │
//! │   sysname, release, nodename, machine: [u8; 65]         │
//! ├─────────────────────────────────────────────────────────┤
//! │ TICK GROUP (repeated)                                   │
//! │   stat record (stat_size bytes)                         │
//! │     record_type, hour, minute, second: u8               │
//! │     _reserved: u32, time: i64                           │
//! │     counters | comment text [u8; 64] | nothing          │
//! │   NORMAL records only, sized from the header counts:    │
//! │     per-CPU (only when cpu_nr > 1), irqs, serial lines, │
//! │     per-CPU irqs (CPU-major), interfaces, disks         │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! The same framing is used for a file and for the stream a collector writes
//! to a reporter through a pipe.

use std::io::{self, Read, Write};
use std::path::Path;

use chrono::{Datelike, Local, TimeZone};
use serde::Serialize;

use super::error::StoreError;
use super::model::{
    Activities, CpuStats, DiskStats, DomainCounts, IFNAMSIZ, IrqCpuStats, IrqStats, KernelTables,
    MemoryStats, NetDevStats, PagingStats, QueueStats, RecordTime, Sample, SerialStats,
    SocketStats, StatRecord, SwapStats,
};
use crate::util::HostIdentity;

pub const FILE_MAGIC: u16 = 0xd596;
/// Bumped whenever any structure below changes shape.
pub const FORMAT_MAGIC: u16 = 0x2175;
pub const HEADER_MAGIC: u32 = 0x5341_0001;

pub const FILE_MAGIC_SIZE: usize = 16;
pub const FILE_HEADER_SIZE: usize = 312;
pub const RECORD_LEADER_SIZE: usize = 16;
pub const STAT_RECORD_SIZE: usize = RECORD_LEADER_SIZE + 360;
pub const COMMENT_LEN: usize = 64;
/// Largest stat record a header may announce.
pub const MAX_STAT_SIZE: usize = 64 * 1024;
/// Largest block of domain arrays a header may imply.
pub const MAX_ARRAYS_SIZE: usize = 64 * 1024 * 1024;
const UTSNAME_LEN: usize = 65;

// ---------------------------------------------------------------------------
// Primitive encoding
// ---------------------------------------------------------------------------

/// Appends native-endian fields to a buffer.
pub struct WireWriter<'a> {
    buf: &'a mut Vec<u8>,
}

impl<'a> WireWriter<'a> {
    pub fn new(buf: &'a mut Vec<u8>) -> Self {
        Self { buf }
    }

    pub fn u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_ne_bytes());
    }

    pub fn u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_ne_bytes());
    }

    pub fn u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_ne_bytes());
    }

    pub fn i64(&mut self, v: i64) {
        self.buf.extend_from_slice(&v.to_ne_bytes());
    }

    /// NUL-padded string of exactly `len` bytes, always NUL-terminated.
    /// Text that does not fit is cut at a character boundary.
    pub fn str(&mut self, s: &str, len: usize) {
        let mut n = s.len().min(len.saturating_sub(1));
        while !s.is_char_boundary(n) {
            n -= 1;
        }
        self.buf.extend_from_slice(&s.as_bytes()[..n]);
        self.zeros(len - n);
    }

    pub fn zeros(&mut self, n: usize) {
        self.buf.resize(self.buf.len() + n, 0);
    }
}

/// Reads native-endian fields from a buffer.
///
/// Buffers are always sized from the structure's `SIZE` before decoding;
/// bytes past the end read as zero.
pub struct WireReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> WireReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take<const N: usize>(&mut self) -> [u8; N] {
        let mut out = [0u8; N];
        if let Some(src) = self.buf.get(self.pos..self.pos + N) {
            out.copy_from_slice(src);
        }
        self.pos += N;
        out
    }

    pub fn u8(&mut self) -> u8 {
        u8::from_ne_bytes(self.take())
    }

    pub fn u16(&mut self) -> u16 {
        u16::from_ne_bytes(self.take())
    }

    pub fn u32(&mut self) -> u32 {
        u32::from_ne_bytes(self.take())
    }

    pub fn u64(&mut self) -> u64 {
        u64::from_ne_bytes(self.take())
    }

    pub fn i64(&mut self) -> i64 {
        i64::from_ne_bytes(self.take())
    }

    pub fn str(&mut self, len: usize) -> String {
        let start = self.pos.min(self.buf.len());
        let end = (self.pos + len).min(self.buf.len());
        self.pos += len;
        let raw = &self.buf[start..end];
        let raw = raw.split(|&b| b == 0).next().unwrap_or_default();
        String::from_utf8_lossy(raw).into_owned()
    }

    pub fn skip(&mut self, n: usize) {
        self.pos += n;
    }
}

/// A structure with a fixed on-disk footprint.
pub trait Wire: Sized {
    const SIZE: usize;
    fn encode(&self, w: &mut WireWriter<'_>);
    fn decode(r: &mut WireReader<'_>) -> Self;
}

// ---------------------------------------------------------------------------
// Domain elements
// ---------------------------------------------------------------------------

impl Wire for CpuStats {
    const SIZE: usize = 80;

    fn encode(&self, w: &mut WireWriter<'_>) {
        for v in [
            self.user,
            self.nice,
            self.system,
            self.idle,
            self.iowait,
            self.irq,
            self.softirq,
            self.steal,
            self.guest,
            self.guest_nice,
        ] {
            w.u64(v);
        }
    }

    fn decode(r: &mut WireReader<'_>) -> Self {
        Self {
            user: r.u64(),
            nice: r.u64(),
            system: r.u64(),
            idle: r.u64(),
            iowait: r.u64(),
            irq: r.u64(),
            softirq: r.u64(),
            steal: r.u64(),
            guest: r.u64(),
            guest_nice: r.u64(),
        }
    }
}

impl Wire for IrqStats {
    const SIZE: usize = 8;

    fn encode(&self, w: &mut WireWriter<'_>) {
        w.u64(self.count);
    }

    fn decode(r: &mut WireReader<'_>) -> Self {
        Self { count: r.u64() }
    }
}

impl Wire for SerialStats {
    const SIZE: usize = 28;

    fn encode(&self, w: &mut WireWriter<'_>) {
        for v in [
            self.line,
            self.rx,
            self.tx,
            self.frame,
            self.parity,
            self.brk,
            self.overrun,
        ] {
            w.u32(v);
        }
    }

    fn decode(r: &mut WireReader<'_>) -> Self {
        Self {
            line: r.u32(),
            rx: r.u32(),
            tx: r.u32(),
            frame: r.u32(),
            parity: r.u32(),
            brk: r.u32(),
            overrun: r.u32(),
        }
    }
}

impl Wire for IrqCpuStats {
    const SIZE: usize = 8;

    fn encode(&self, w: &mut WireWriter<'_>) {
        w.u32(self.irq);
        w.u32(self.interrupts);
    }

    fn decode(r: &mut WireReader<'_>) -> Self {
        Self {
            irq: r.u32(),
            interrupts: r.u32(),
        }
    }
}

impl Wire for NetDevStats {
    const SIZE: usize = IFNAMSIZ + 12 * 8;

    fn encode(&self, w: &mut WireWriter<'_>) {
        w.str(&self.name, IFNAMSIZ);
        for v in [
            self.rx_packets,
            self.tx_packets,
            self.rx_bytes,
            self.tx_bytes,
            self.rx_compressed,
            self.tx_compressed,
            self.multicast,
            self.rx_errors,
            self.tx_errors,
            self.collisions,
            self.rx_dropped,
            self.tx_dropped,
        ] {
            w.u64(v);
        }
    }

    fn decode(r: &mut WireReader<'_>) -> Self {
        Self {
            name: r.str(IFNAMSIZ),
            rx_packets: r.u64(),
            tx_packets: r.u64(),
            rx_bytes: r.u64(),
            tx_bytes: r.u64(),
            rx_compressed: r.u64(),
            tx_compressed: r.u64(),
            multicast: r.u64(),
            rx_errors: r.u64(),
            tx_errors: r.u64(),
            collisions: r.u64(),
            rx_dropped: r.u64(),
            tx_dropped: r.u64(),
        }
    }
}

impl Wire for DiskStats {
    const SIZE: usize = 48;

    fn encode(&self, w: &mut WireWriter<'_>) {
        w.u32(self.major);
        w.u32(self.minor);
        w.u64(self.nr_ios);
        w.u64(self.rd_sect);
        w.u64(self.wr_sect);
        w.u32(self.rd_ticks);
        w.u32(self.wr_ticks);
        w.u32(self.tot_ticks);
        w.u32(self.rq_ticks);
    }

    fn decode(r: &mut WireReader<'_>) -> Self {
        Self {
            major: r.u32(),
            minor: r.u32(),
            nr_ios: r.u64(),
            rd_sect: r.u64(),
            wr_sect: r.u64(),
            rd_ticks: r.u32(),
            wr_ticks: r.u32(),
            tot_ticks: r.u32(),
            rq_ticks: r.u32(),
        }
    }
}

// ---------------------------------------------------------------------------
// Stat record counters
// ---------------------------------------------------------------------------

fn encode_counters(s: &StatRecord, w: &mut WireWriter<'_>) {
    w.u64(s.uptime);
    w.u64(s.uptime0);
    s.cpu.encode(w);
    w.u64(s.irq_sum);
    w.u64(s.context_switches);
    w.u64(s.processes);

    let p = &s.paging;
    for v in [
        p.pgpgin,
        p.pgpgout,
        p.pgfault,
        p.pgmajfault,
        p.pgfree,
        p.pgscan_kswapd,
        p.pgscan_direct,
        p.pgsteal,
    ] {
        w.u64(v);
    }
    w.u64(s.swap.pswpin);
    w.u64(s.swap.pswpout);

    let m = &s.memory;
    for v in [
        m.total,
        m.free,
        m.available,
        m.buffers,
        m.cached,
        m.swap_cached,
        m.active,
        m.inactive,
        m.dirty,
        m.committed_as,
        m.swap_total,
        m.swap_free,
    ] {
        w.u64(v);
    }

    let k = &s.ktables;
    for v in [k.dentry_unused, k.file_used, k.inode_used, k.pty_nr] {
        w.u32(v);
    }
    let so = &s.sockets;
    for v in [
        so.sock_inuse,
        so.tcp_inuse,
        so.tcp_tw,
        so.udp_inuse,
        so.raw_inuse,
        so.frag_inuse,
    ] {
        w.u32(v);
    }
    let q = &s.queue;
    for v in [
        q.nr_running,
        q.nr_threads,
        q.procs_blocked,
        q.load_avg_1,
        q.load_avg_5,
        q.load_avg_15,
    ] {
        w.u32(v);
    }
}

fn decode_counters(time: RecordTime, r: &mut WireReader<'_>) -> StatRecord {
    StatRecord {
        time,
        uptime: r.u64(),
        uptime0: r.u64(),
        cpu: CpuStats::decode(r),
        irq_sum: r.u64(),
        context_switches: r.u64(),
        processes: r.u64(),
        paging: PagingStats {
            pgpgin: r.u64(),
            pgpgout: r.u64(),
            pgfault: r.u64(),
            pgmajfault: r.u64(),
            pgfree: r.u64(),
            pgscan_kswapd: r.u64(),
            pgscan_direct: r.u64(),
            pgsteal: r.u64(),
        },
        swap: SwapStats {
            pswpin: r.u64(),
            pswpout: r.u64(),
        },
        memory: MemoryStats {
            total: r.u64(),
            free: r.u64(),
            available: r.u64(),
            buffers: r.u64(),
            cached: r.u64(),
            swap_cached: r.u64(),
            active: r.u64(),
            inactive: r.u64(),
            dirty: r.u64(),
            committed_as: r.u64(),
            swap_total: r.u64(),
            swap_free: r.u64(),
        },
        ktables: KernelTables {
            dentry_unused: r.u32(),
            file_used: r.u32(),
            inode_used: r.u32(),
            pty_nr: r.u32(),
        },
        sockets: SocketStats {
            sock_inuse: r.u32(),
            tcp_inuse: r.u32(),
            tcp_tw: r.u32(),
            udp_inuse: r.u32(),
            raw_inuse: r.u32(),
            frag_inuse: r.u32(),
        },
        queue: QueueStats {
            nr_running: r.u32(),
            nr_threads: r.u32(),
            procs_blocked: r.u32(),
            load_avg_1: r.u32(),
            load_avg_5: r.u32(),
            load_avg_15: r.u32(),
        },
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// Record type tag stored in the first byte of every stat record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[repr(u8)]
pub enum RecordKind {
    Normal = 1,
    Restart = 2,
    Comment = 3,
    EndOfRotation = 4,
}

impl TryFrom<u8> for RecordKind {
    type Error = StoreError;

    fn try_from(v: u8) -> Result<Self, StoreError> {
        match v {
            1 => Ok(RecordKind::Normal),
            2 => Ok(RecordKind::Restart),
            3 => Ok(RecordKind::Comment),
            4 => Ok(RecordKind::EndOfRotation),
            other => Err(StoreError::UnknownRecordType(other)),
        }
    }
}

/// One stat record.
#[allow(clippy::large_enum_variant)]
#[derive(Clone, Debug, PartialEq)]
pub enum Record {
    /// A sample; followed by the domain arrays in the stream.
    Normal(StatRecord),
    /// Collection restarted: no continuous series spans this point.
    Restart(RecordTime),
    /// Free-text annotation, at most 63 bytes.
    Comment(RecordTime, String),
    /// The collector moved on to the next daily file.
    EndOfRotation(RecordTime),
}

impl Record {
    pub fn kind(&self) -> RecordKind {
        match self {
            Record::Normal(_) => RecordKind::Normal,
            Record::Restart(_) => RecordKind::Restart,
            Record::Comment(..) => RecordKind::Comment,
            Record::EndOfRotation(_) => RecordKind::EndOfRotation,
        }
    }

    pub fn time(&self) -> RecordTime {
        match self {
            Record::Normal(stat) => stat.time,
            Record::Restart(t) | Record::Comment(t, _) | Record::EndOfRotation(t) => *t,
        }
    }

    /// Whether domain arrays follow this record in the stream.
    pub fn is_extended(&self) -> bool {
        matches!(self, Record::Normal(_))
    }

    /// Encodes the record padded (or cut) to `stat_size` bytes.
    pub fn encode(&self, out: &mut Vec<u8>, stat_size: usize) {
        let start = out.len();
        let mut w = WireWriter::new(out);
        let time = self.time();
        w.u8(self.kind() as u8);
        w.u8(time.hour);
        w.u8(time.minute);
        w.u8(time.second);
        w.u32(0);
        w.i64(time.epoch);
        match self {
            Record::Normal(stat) => encode_counters(stat, &mut w),
            Record::Comment(_, text) => w.str(text, COMMENT_LEN),
            Record::Restart(_) | Record::EndOfRotation(_) => {}
        }
        out.resize(start + stat_size, 0);
    }

    /// Decodes one stat record of any size; missing trailing bytes read as 0.
    pub fn decode(buf: &[u8]) -> Result<Self, StoreError> {
        let mut r = WireReader::new(buf);
        let kind = RecordKind::try_from(r.u8())?;
        let hour = r.u8();
        let minute = r.u8();
        let second = r.u8();
        r.skip(4);
        let time = RecordTime {
            epoch: r.i64(),
            hour,
            minute,
            second,
        };
        Ok(match kind {
            RecordKind::Normal => Record::Normal(decode_counters(time, &mut r)),
            RecordKind::Restart => Record::Restart(time),
            RecordKind::Comment => Record::Comment(time, r.str(COMMENT_LEN)),
            RecordKind::EndOfRotation => Record::EndOfRotation(time),
        })
    }
}

// ---------------------------------------------------------------------------
// Domain arrays
// ---------------------------------------------------------------------------

fn irqcpu_rows(counts: &DomainCounts) -> usize {
    if counts.irqcpu_nr > 0 {
        counts.irqcpu_rows()
    } else {
        0
    }
}

/// Bytes of domain arrays following a NORMAL record, `None` if the size
/// does not fit in `usize`.
pub fn arrays_size(counts: &DomainCounts) -> Option<usize> {
    let block = |n: usize, size: usize| n.checked_mul(size);
    let irqcpu = irqcpu_rows(counts).checked_mul(counts.irqcpu_nr as usize)?;
    [
        block(counts.per_cpu_rows(), CpuStats::SIZE)?,
        block(counts.irq_nr as usize, IrqStats::SIZE)?,
        block(counts.serial_nr as usize, SerialStats::SIZE)?,
        block(irqcpu, IrqCpuStats::SIZE)?,
        block(counts.iface_nr as usize, NetDevStats::SIZE)?,
        block(counts.disk_nr as usize, DiskStats::SIZE)?,
    ]
    .into_iter()
    .try_fold(0usize, usize::checked_add)
}

fn encode_block<T: Wire + Default + Clone>(w: &mut WireWriter<'_>, items: &[T], n: usize) {
    for i in 0..n {
        match items.get(i) {
            Some(item) => item.encode(w),
            None => T::default().encode(w),
        }
    }
}

/// Encodes the domain arrays of `sample` framed to `counts`.
///
/// Arrays longer than the counts are cut, shorter ones padded with free
/// entries, so the output always matches the header it follows.
pub fn encode_arrays(out: &mut Vec<u8>, sample: &Sample, counts: &DomainCounts) {
    let mut w = WireWriter::new(out);
    encode_block(&mut w, &sample.cpus, counts.per_cpu_rows());
    encode_block(&mut w, &sample.irqs, counts.irq_nr as usize);
    encode_block(&mut w, &sample.serials, counts.serial_nr as usize);
    for cpu in 0..irqcpu_rows(counts) {
        let row = sample.irqcpus.get(cpu).map(Vec::as_slice).unwrap_or(&[]);
        encode_block(&mut w, row, counts.irqcpu_nr as usize);
    }
    encode_block(&mut w, &sample.ifaces, counts.iface_nr as usize);
    encode_block(&mut w, &sample.disks, counts.disk_nr as usize);
}

fn decode_block<T: Wire>(r: &mut WireReader<'_>, items: &mut [T]) {
    for item in items {
        *item = T::decode(r);
    }
}

/// Decodes domain arrays into `sample`, resizing it to `counts` first.
pub fn decode_arrays(buf: &[u8], counts: &DomainCounts, sample: &mut Sample) {
    sample.resize(counts);
    let mut r = WireReader::new(buf);
    decode_block(&mut r, &mut sample.cpus);
    decode_block(&mut r, &mut sample.irqs);
    decode_block(&mut r, &mut sample.serials);
    for row in &mut sample.irqcpus {
        decode_block(&mut r, row);
    }
    decode_block(&mut r, &mut sample.ifaces);
    decode_block(&mut r, &mut sample.disks);
}

/// Encodes one complete tick group: the record and, for a NORMAL record,
/// the domain arrays of `sample`.
pub fn encode_tick(
    out: &mut Vec<u8>,
    record: &Record,
    sample: &Sample,
    counts: &DomainCounts,
    stat_size: usize,
) {
    record.encode(out, stat_size);
    if record.is_extended() {
        encode_arrays(out, sample, counts);
    }
}

// ---------------------------------------------------------------------------
// File magic and header
// ---------------------------------------------------------------------------

/// Leading block that identifies the file family and layout revision.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct FileMagic {
    pub magic: u16,
    pub format_magic: u16,
    /// Producer version: major, minor, patch, 0.
    pub version: [u8; 4],
    pub header_size: u32,
}

impl FileMagic {
    pub fn current() -> Self {
        let part = |s: &str| s.parse::<u8>().unwrap_or(0);
        Self {
            magic: FILE_MAGIC,
            format_magic: FORMAT_MAGIC,
            version: [
                part(env!("CARGO_PKG_VERSION_MAJOR")),
                part(env!("CARGO_PKG_VERSION_MINOR")),
                part(env!("CARGO_PKG_VERSION_PATCH")),
                0,
            ],
            header_size: FILE_HEADER_SIZE as u32,
        }
    }

    pub fn version_string(&self) -> String {
        format!("{}.{}.{}", self.version[0], self.version[1], self.version[2])
    }

    pub fn encode(&self, out: &mut Vec<u8>) {
        let mut w = WireWriter::new(out);
        w.u16(self.magic);
        w.u16(self.format_magic);
        for b in self.version {
            w.u8(b);
        }
        w.u32(self.header_size);
        w.u32(0);
    }

    pub fn decode(buf: &[u8]) -> Self {
        let mut r = WireReader::new(buf);
        Self {
            magic: r.u16(),
            format_magic: r.u16(),
            version: [r.u8(), r.u8(), r.u8(), r.u8()],
            header_size: r.u32(),
        }
    }

    /// Rejects foreign files, and files of our family with another layout.
    pub fn validate(&self, path: &Path) -> Result<(), StoreError> {
        if self.magic != FILE_MAGIC {
            return Err(StoreError::NotADataFile {
                path: path.to_path_buf(),
            });
        }
        if self.format_magic != FORMAT_MAGIC || self.header_size != FILE_HEADER_SIZE as u32 {
            return Err(StoreError::IncompatibleFormat {
                path: path.to_path_buf(),
                version: self.version_string(),
            });
        }
        Ok(())
    }
}

/// Per-file header: what was collected, array counts, and who collected it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FileHeader {
    pub activities: Activities,
    /// Size of each stat record in this file.
    pub stat_size: u32,
    /// Ticks per second of the collecting kernel.
    pub hz: u32,
    pub counts: DomainCounts,
    /// Local creation date: day of month, month (1-12), years since 1900.
    pub day: u8,
    pub month: u8,
    pub year: u8,
    pub time: i64,
    pub host: HostIdentity,
}

impl FileHeader {
    pub fn new(
        activities: Activities,
        counts: DomainCounts,
        hz: u32,
        host: HostIdentity,
        time: i64,
    ) -> Self {
        let (day, month, year) = local_date(time);
        Self {
            activities,
            stat_size: STAT_RECORD_SIZE as u32,
            hz,
            counts,
            day,
            month,
            year,
            time,
            host,
        }
    }

    /// Whether `epoch` falls on this file's creation date (local time).
    pub fn same_day(&self, epoch: i64) -> bool {
        local_date(epoch) == (self.day, self.month, self.year)
    }

    pub fn encode(&self, out: &mut Vec<u8>) {
        let mut w = WireWriter::new(out);
        w.u32(self.activities.bits());
        w.u32(HEADER_MAGIC);
        w.u32(self.stat_size);
        w.u32(self.hz);
        let c = &self.counts;
        for v in [
            c.cpu_nr,
            c.irq_nr,
            c.irqcpu_nr,
            c.serial_nr,
            c.iface_nr,
            c.disk_nr,
        ] {
            w.u32(v);
        }
        w.u8(self.day);
        w.u8(self.month);
        w.u8(self.year);
        w.u8(0);
        w.i64(self.time);
        w.str(&self.host.sysname, UTSNAME_LEN);
        w.str(&self.host.release, UTSNAME_LEN);
        w.str(&self.host.nodename, UTSNAME_LEN);
        w.str(&self.host.machine, UTSNAME_LEN);
    }

    pub fn decode(buf: &[u8], path: &Path, magic: &FileMagic) -> Result<Self, StoreError> {
        let mut r = WireReader::new(buf);
        let activities = Activities::from_bits_truncate(r.u32());
        if r.u32() != HEADER_MAGIC {
            return Err(StoreError::IncompatibleFormat {
                path: path.to_path_buf(),
                version: magic.version_string(),
            });
        }
        let stat_size = r.u32();
        if !(RECORD_LEADER_SIZE..=MAX_STAT_SIZE).contains(&(stat_size as usize)) {
            return Err(StoreError::RecordSizeMismatch {
                file: stat_size,
                expected: STAT_RECORD_SIZE as u32,
            });
        }
        let hz = r.u32();
        let counts = DomainCounts {
            cpu_nr: r.u32(),
            irq_nr: r.u32(),
            irqcpu_nr: r.u32(),
            serial_nr: r.u32(),
            iface_nr: r.u32(),
            disk_nr: r.u32(),
        };
        check_counts(&counts)?;
        let day = r.u8();
        let month = r.u8();
        let year = r.u8();
        r.skip(1);
        let time = r.i64();
        let host = HostIdentity {
            sysname: r.str(UTSNAME_LEN),
            release: r.str(UTSNAME_LEN),
            nodename: r.str(UTSNAME_LEN),
            machine: r.str(UTSNAME_LEN),
        };
        Ok(Self {
            activities,
            stat_size,
            hz,
            counts,
            day,
            month,
            year,
            time,
            host,
        })
    }

    /// Encodes the file magic followed by this header.
    pub fn encode_file_start(&self, out: &mut Vec<u8>) {
        FileMagic::current().encode(out);
        self.encode(out);
    }
}

/// Rejects counts that would size arrays beyond any real machine.
fn check_counts(counts: &DomainCounts) -> Result<(), StoreError> {
    if let Some((domain, count, max)) = counts.out_of_range() {
        return Err(StoreError::CountOutOfRange { domain, count, max });
    }
    match arrays_size(counts) {
        Some(size) if size <= MAX_ARRAYS_SIZE => Ok(()),
        _ => Err(StoreError::CountOutOfRange {
            domain: "irqcpu",
            count: counts.irqcpu_nr,
            max: (MAX_ARRAYS_SIZE / IrqCpuStats::SIZE / counts.irqcpu_rows()) as u32,
        }),
    }
}

fn local_date(epoch: i64) -> (u8, u8, u8) {
    match Local.timestamp_opt(epoch, 0).earliest() {
        Some(dt) => (
            dt.day() as u8,
            dt.month() as u8,
            (dt.year() - 1900).clamp(0, u8::MAX as i32) as u8,
        ),
        None => (0, 0, 0),
    }
}

// ---------------------------------------------------------------------------
// Framing
// ---------------------------------------------------------------------------

/// How a short read is treated.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReadMode {
    /// Zero bytes is a clean end of data.
    Soft,
    /// Anything short of a full structure is an error.
    Hard,
}

/// Fills `buf` completely.
///
/// Returns `Ok(false)` when a [`ReadMode::Soft`] read hits end of data before
/// the first byte.
pub fn read_frame<R: Read>(
    reader: &mut R,
    buf: &mut [u8],
    mode: ReadMode,
    what: &'static str,
    path: &Path,
) -> Result<bool, StoreError> {
    let mut got = 0;
    while got < buf.len() {
        match reader.read(&mut buf[got..]) {
            Ok(0) => break,
            Ok(n) => got += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(StoreError::io(path, e)),
        }
    }
    if got == buf.len() {
        return Ok(true);
    }
    if got == 0 && mode == ReadMode::Soft {
        return Ok(false);
    }
    Err(StoreError::ShortRead {
        what,
        expected: buf.len(),
        got,
    })
}

/// Writes `buf` completely with one `write_all`.
pub fn write_frame<W: Write>(
    writer: &mut W,
    buf: &[u8],
    what: &'static str,
    path: &Path,
) -> Result<(), StoreError> {
    match writer.write_all(buf) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::WriteZero => Err(StoreError::ShortWrite { what }),
        Err(e) => Err(StoreError::io(path, e)),
    }
}

/// Reads and validates the file magic and header.
pub fn read_file_start<R: Read>(reader: &mut R, path: &Path) -> Result<FileHeader, StoreError> {
    let mut buf = [0u8; FILE_MAGIC_SIZE];
    read_frame(reader, &mut buf, ReadMode::Hard, "file magic", path)?;
    let magic = FileMagic::decode(&buf);
    magic.validate(path)?;

    let mut buf = [0u8; FILE_HEADER_SIZE];
    read_frame(reader, &mut buf, ReadMode::Hard, "file header", path)?;
    FileHeader::decode(&buf, path, &magic)
}

/// Reads the next record, or `None` at a clean end of data.
pub fn read_record<R: Read>(
    reader: &mut R,
    stat_size: usize,
    path: &Path,
) -> Result<Option<Record>, StoreError> {
    let mut buf = vec![0u8; stat_size];
    if !read_frame(reader, &mut buf, ReadMode::Soft, "stat record", path)? {
        return Ok(None);
    }
    Record::decode(&buf).map(Some)
}

/// Reads the domain arrays that follow a NORMAL record into `sample`.
pub fn read_arrays<R: Read>(
    reader: &mut R,
    counts: &DomainCounts,
    sample: &mut Sample,
    path: &Path,
) -> Result<(), StoreError> {
    check_counts(counts)?;
    let mut buf = vec![0u8; arrays_size(counts).unwrap_or(0)];
    read_frame(reader, &mut buf, ReadMode::Hard, "domain arrays", path)?;
    decode_arrays(&buf, counts, sample);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::model::{NR_CPUS_MAX, NR_IRQS_MAX};
    use std::io::Cursor;

    fn counts() -> DomainCounts {
        DomainCounts {
            cpu_nr: 2,
            irq_nr: 3,
            irqcpu_nr: 2,
            serial_nr: 1,
            iface_nr: 2,
            disk_nr: 2,
        }
    }

    fn sample() -> Sample {
        let mut s = Sample::with_counts(&counts());
        s.stat.time = RecordTime::from_epoch(1_700_000_000);
        s.stat.uptime = 123_456;
        s.stat.uptime0 = 61_728;
        s.stat.cpu.user = 1000;
        s.stat.cpu.guest_nice = 7;
        s.stat.memory.total = 16_000_000;
        s.stat.queue.load_avg_15 = 142;
        s.cpus[1].idle = 99;
        s.irqs[2].count = 5;
        s.serials[0].line = 1;
        s.serials[0].rx = 12;
        s.irqcpus[1][0] = IrqCpuStats {
            irq: 16,
            interrupts: 4,
        };
        s.ifaces[0].reset_to("eth0");
        s.ifaces[0].rx_bytes = 4096;
        s.disks[1].reset_to(8, 0);
        s.disks[1].rq_ticks = 33;
        s
    }

    #[test]
    fn test_element_sizes_match_encoding() {
        fn size_of<T: Wire>(v: &T) -> usize {
            let mut buf = Vec::new();
            v.encode(&mut WireWriter::new(&mut buf));
            buf.len()
        }
        assert_eq!(size_of(&CpuStats::default()), CpuStats::SIZE);
        assert_eq!(size_of(&SerialStats::default()), SerialStats::SIZE);
        assert_eq!(size_of(&NetDevStats::default()), NetDevStats::SIZE);
        assert_eq!(size_of(&DiskStats::default()), DiskStats::SIZE);

        let mut buf = Vec::new();
        Record::Normal(StatRecord::default()).encode(&mut buf, STAT_RECORD_SIZE);
        assert_eq!(buf.len(), STAT_RECORD_SIZE);

        let mut unpadded = Vec::new();
        encode_counters(&StatRecord::default(), &mut WireWriter::new(&mut unpadded));
        assert_eq!(RECORD_LEADER_SIZE + unpadded.len(), STAT_RECORD_SIZE);

        let mut buf = Vec::new();
        FileHeader::new(Activities::ALL, counts(), 100, HostIdentity::default(), 0)
            .encode(&mut buf);
        assert_eq!(buf.len(), FILE_HEADER_SIZE);

        let mut buf = Vec::new();
        FileMagic::current().encode(&mut buf);
        assert_eq!(buf.len(), FILE_MAGIC_SIZE);
    }

    #[test]
    fn test_tick_group_round_trip() {
        let s = sample();
        let mut buf = Vec::new();
        encode_tick(
            &mut buf,
            &Record::Normal(s.stat),
            &s,
            &counts(),
            STAT_RECORD_SIZE,
        );
        assert_eq!(buf.len(), STAT_RECORD_SIZE + arrays_size(&counts()).unwrap());

        let path = Path::new("stream");
        let mut cursor = Cursor::new(buf);
        let record = read_record(&mut cursor, STAT_RECORD_SIZE, path)
            .unwrap()
            .unwrap();
        assert_eq!(record, Record::Normal(s.stat));

        let mut decoded = Sample::default();
        read_arrays(&mut cursor, &counts(), &mut decoded, path).unwrap();
        decoded.stat = s.stat;
        assert_eq!(decoded, s);
        assert!(read_record(&mut cursor, STAT_RECORD_SIZE, path)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_special_records_have_no_arrays() {
        let t = RecordTime::from_epoch(1_700_000_000);
        let s = sample();
        for record in [
            Record::Restart(t),
            Record::Comment(t, "kernel upgrade".to_string()),
            Record::EndOfRotation(t),
        ] {
            let mut buf = Vec::new();
            encode_tick(&mut buf, &record, &s, &counts(), STAT_RECORD_SIZE);
            assert_eq!(buf.len(), STAT_RECORD_SIZE);
            assert!(!record.is_extended());
            assert_eq!(Record::decode(&buf).unwrap(), record);
        }
    }

    #[test]
    fn test_comment_is_truncated_to_field() {
        let t = RecordTime::default();
        let long = "x".repeat(200);
        let mut buf = Vec::new();
        Record::Comment(t, long).encode(&mut buf, STAT_RECORD_SIZE);
        match Record::decode(&buf).unwrap() {
            Record::Comment(_, text) => assert_eq!(text.len(), COMMENT_LEN - 1),
            other => panic!("unexpected record {other:?}"),
        }
    }

    #[test]
    fn test_comment_cut_on_char_boundary() {
        let t = RecordTime::default();
        // 62 ASCII bytes then a 2-byte character straddling the 63-byte limit.
        let text = format!("{}é", "a".repeat(62));
        let mut buf = Vec::new();
        Record::Comment(t, text).encode(&mut buf, STAT_RECORD_SIZE);
        match Record::decode(&buf).unwrap() {
            Record::Comment(_, decoded) => assert_eq!(decoded, "a".repeat(62)),
            other => panic!("unexpected record {other:?}"),
        }

        let fits = format!("{}é", "a".repeat(61));
        let mut buf = Vec::new();
        Record::Comment(t, fits.clone()).encode(&mut buf, STAT_RECORD_SIZE);
        assert!(matches!(Record::decode(&buf).unwrap(), Record::Comment(_, d) if d == fits));
    }

    #[test]
    fn test_arrays_framed_to_counts() {
        let s = sample();
        let smaller = DomainCounts {
            disk_nr: 1,
            iface_nr: 4,
            ..counts()
        };
        let mut buf = Vec::new();
        encode_arrays(&mut buf, &s, &smaller);
        assert_eq!(Some(buf.len()), arrays_size(&smaller));

        let mut decoded = Sample::default();
        decode_arrays(&buf, &smaller, &mut decoded);
        assert_eq!(decoded.disks.len(), 1);
        assert!(decoded.disks[0].is_free());
        assert_eq!(decoded.ifaces.len(), 4);
        assert_eq!(decoded.ifaces[0].name, "eth0");
        assert!(decoded.ifaces[3].is_free());
    }

    #[test]
    fn test_uniprocessor_has_no_per_cpu_block() {
        let up = DomainCounts {
            cpu_nr: 1,
            irqcpu_nr: 3,
            ..DomainCounts::default()
        };
        assert_eq!(arrays_size(&up), Some(3 * IrqCpuStats::SIZE));
    }

    #[test]
    fn test_header_round_trip() {
        let host = HostIdentity {
            sysname: "Linux".into(),
            release: "6.8.0".into(),
            nodename: "db-01".into(),
            machine: "x86_64".into(),
        };
        let header = FileHeader::new(
            Activities::CPU | Activities::DISK,
            counts(),
            250,
            host,
            1_700_000_000,
        );
        let mut buf = Vec::new();
        header.encode_file_start(&mut buf);

        let decoded = read_file_start(&mut Cursor::new(buf), Path::new("sa14")).unwrap();
        assert_eq!(decoded, header);
        assert!(decoded.same_day(1_700_000_000));
        assert!(!decoded.same_day(1_700_000_000 + 3 * 86_400));
    }

    /// Valid file start with the count fields at `offsets` (within the
    /// header) overwritten.
    fn file_start_with_counts(overrides: &[(usize, u32)]) -> Vec<u8> {
        let header = FileHeader::new(Activities::ALL, counts(), 100, HostIdentity::default(), 0);
        let mut buf = Vec::new();
        header.encode_file_start(&mut buf);
        for &(offset, value) in overrides {
            let at = FILE_MAGIC_SIZE + offset;
            buf[at..at + 4].copy_from_slice(&value.to_ne_bytes());
        }
        buf
    }

    #[test]
    fn test_arrays_size_overflow_is_none() {
        let huge = DomainCounts {
            cpu_nr: u32::MAX,
            irqcpu_nr: u32::MAX,
            ..DomainCounts::default()
        };
        assert_eq!(arrays_size(&huge), None);
    }

    #[test]
    fn test_header_with_absurd_counts_rejected() {
        // cpu_nr at 16, irqcpu_nr at 24.
        let buf = file_start_with_counts(&[(16, u32::MAX), (24, u32::MAX)]);
        let err = read_file_start(&mut Cursor::new(buf), Path::new("sa09")).unwrap_err();
        assert!(matches!(err, StoreError::CountOutOfRange { domain: "cpu", .. }));
        assert_eq!(err.exit_code(), 3);

        // Each count within bounds, but together far too large.
        let buf = file_start_with_counts(&[(16, NR_CPUS_MAX), (24, NR_IRQS_MAX)]);
        let err = read_file_start(&mut Cursor::new(buf), Path::new("sa09")).unwrap_err();
        assert!(matches!(err, StoreError::CountOutOfRange { .. }));

        // stat_size at 8.
        let buf = file_start_with_counts(&[(8, u32::MAX)]);
        let err = read_file_start(&mut Cursor::new(buf), Path::new("sa09")).unwrap_err();
        assert!(matches!(err, StoreError::RecordSizeMismatch { .. }));
    }

    #[test]
    fn test_foreign_file_rejected() {
        let buf = vec![0x7fu8; FILE_MAGIC_SIZE + FILE_HEADER_SIZE];
        let err = read_file_start(&mut Cursor::new(buf), Path::new("x")).unwrap_err();
        assert!(matches!(err, StoreError::NotADataFile { .. }));
        assert_eq!(err.exit_code(), 3);
    }

    #[test]
    fn test_incompatible_format_reports_version() {
        let magic = FileMagic {
            format_magic: FORMAT_MAGIC - 1,
            version: [0, 9, 4, 0],
            ..FileMagic::current()
        };
        let mut buf = Vec::new();
        magic.encode(&mut buf);
        buf.resize(FILE_MAGIC_SIZE + FILE_HEADER_SIZE, 0);

        match read_file_start(&mut Cursor::new(buf), Path::new("sa02")) {
            Err(StoreError::IncompatibleFormat { version, .. }) => assert_eq!(version, "0.9.4"),
            other => panic!("expected incompatible format, got {other:?}"),
        }
    }

    #[test]
    fn test_soft_and_hard_reads() {
        let path = Path::new("p");
        let mut buf = [0u8; 8];
        let mut empty = Cursor::new(Vec::<u8>::new());
        assert!(!read_frame(&mut empty, &mut buf, ReadMode::Soft, "x", path).unwrap());

        let mut empty = Cursor::new(Vec::<u8>::new());
        assert!(matches!(
            read_frame(&mut empty, &mut buf, ReadMode::Hard, "x", path),
            Err(StoreError::ShortRead { got: 0, .. })
        ));

        let mut partial = Cursor::new(vec![1u8; 3]);
        assert!(matches!(
            read_frame(&mut partial, &mut buf, ReadMode::Soft, "x", path),
            Err(StoreError::ShortRead {
                expected: 8,
                got: 3,
                ..
            })
        ));
    }

    #[test]
    fn test_short_write_detected() {
        let mut small = [0u8; 4];
        let mut sink: &mut [u8] = &mut small;
        let err = write_frame(&mut sink, &[1u8; 8], "stat record", Path::new("p")).unwrap_err();
        assert!(matches!(err, StoreError::ShortWrite { .. }));
    }

    #[test]
    fn test_unknown_record_type() {
        let mut buf = vec![0u8; STAT_RECORD_SIZE];
        buf[0] = 99;
        assert!(matches!(
            Record::decode(&buf),
            Err(StoreError::UnknownRecordType(99))
        ));
    }

    #[test]
    fn test_larger_stat_size_is_tolerated() {
        let stat = sample().stat;
        let mut buf = Vec::new();
        Record::Normal(stat).encode(&mut buf, STAT_RECORD_SIZE + 24);
        assert_eq!(buf.len(), STAT_RECORD_SIZE + 24);
        assert_eq!(Record::decode(&buf).unwrap(), Record::Normal(stat));
    }
}
