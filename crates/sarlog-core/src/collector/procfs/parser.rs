//! Parsers for `/proc` and `/sys` pseudo-files.
//!
//! Each parser is a pure function over the file content so it can be tested
//! without a Linux system.

use crate::storage::model::{
    CpuStats, DiskStats, MemoryStats, NetDevStats, PagingStats, QueueStats, SerialStats,
    SocketStats, SwapStats,
};

/// Error type for parsing operations.
#[derive(Debug)]
pub struct ParseError {
    pub message: String,
}

impl ParseError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self {
            message: msg.into(),
        }
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Parse error: {}", self.message)
    }
}

impl std::error::Error for ParseError {}

fn field<T: std::str::FromStr + Default>(parts: &[&str], idx: usize) -> T {
    parts
        .get(idx)
        .and_then(|s| s.parse().ok())
        .unwrap_or_default()
}

// ============ /proc/stat ============

/// Parsed data from `/proc/stat`.
#[derive(Debug, Clone, Default)]
pub struct ProcStat {
    /// The aggregate `cpu` line.
    pub total: CpuStats,
    /// `cpuN` lines of online processors: (N, counters).
    pub cpus: Vec<(u32, CpuStats)>,
    /// `intr` line: total first, then one count per IRQ number.
    pub intr: Vec<u64>,
    pub ctxt: u64,
    pub processes: u64,
    pub procs_running: u32,
    pub procs_blocked: u32,
}

fn parse_cpu_line(parts: &[&str]) -> CpuStats {
    CpuStats {
        user: field(parts, 1),
        nice: field(parts, 2),
        system: field(parts, 3),
        idle: field(parts, 4),
        iowait: field(parts, 5),
        irq: field(parts, 6),
        softirq: field(parts, 7),
        steal: field(parts, 8),
        guest: field(parts, 9),
        guest_nice: field(parts, 10),
    }
}

/// Parses `/proc/stat` content.
pub fn parse_stat(content: &str) -> Result<ProcStat, ParseError> {
    let mut stat = ProcStat::default();
    let mut seen_total = false;

    for line in content.lines() {
        let parts: Vec<&str> = line.split_whitespace().collect();
        let Some(&key) = parts.first() else {
            continue;
        };

        if key == "cpu" {
            stat.total = parse_cpu_line(&parts);
            seen_total = true;
        } else if let Some(id) = key.strip_prefix("cpu").and_then(|s| s.parse().ok()) {
            stat.cpus.push((id, parse_cpu_line(&parts)));
        } else if key == "intr" {
            stat.intr = parts[1..]
                .iter()
                .map(|s| s.parse().unwrap_or(0))
                .collect();
        } else if key == "ctxt" {
            stat.ctxt = field(&parts, 1);
        } else if key == "processes" {
            stat.processes = field(&parts, 1);
        } else if key == "procs_running" {
            stat.procs_running = field(&parts, 1);
        } else if key == "procs_blocked" {
            stat.procs_blocked = field(&parts, 1);
        }
    }

    if !seen_total {
        return Err(ParseError::new("missing aggregate cpu line"));
    }
    Ok(stat)
}

// ============ /proc/interrupts ============

/// Parsed data from `/proc/interrupts`.
#[derive(Debug, Clone, Default)]
pub struct Interrupts {
    /// Processor number of each column.
    pub cpus: Vec<u32>,
    /// Numbered IRQ rows: (irq, one count per column).
    pub rows: Vec<(u32, Vec<u32>)>,
}

/// Parses `/proc/interrupts`. Only numbered IRQ lines are kept; named lines
/// (`NMI`, `LOC`, ...) are skipped.
pub fn parse_interrupts(content: &str) -> Result<Interrupts, ParseError> {
    let mut lines = content.lines();
    let header = lines
        .next()
        .ok_or_else(|| ParseError::new("empty interrupts file"))?;
    let cpus: Vec<u32> = header
        .split_whitespace()
        .filter_map(|col| col.strip_prefix("CPU").and_then(|n| n.parse().ok()))
        .collect();
    if cpus.is_empty() {
        return Err(ParseError::new("no CPU columns in interrupts header"));
    }

    let mut rows = Vec::new();
    for line in lines {
        let Some((label, rest)) = line.split_once(':') else {
            continue;
        };
        let Ok(irq) = label.trim().parse::<u32>() else {
            continue;
        };
        let counts = rest
            .split_whitespace()
            .take(cpus.len())
            .map(|s| s.parse::<u64>().unwrap_or(0) as u32)
            .collect();
        rows.push((irq, counts));
    }

    Ok(Interrupts { cpus, rows })
}

// ============ /proc/meminfo ============

/// Parses `/proc/meminfo` content. Values are in kB.
pub fn parse_meminfo(content: &str) -> Result<MemoryStats, ParseError> {
    let mut info = MemoryStats::default();

    for line in content.lines() {
        let Some((key, rest)) = line.split_once(':') else {
            continue;
        };
        let value: u64 = rest
            .split_whitespace()
            .next()
            .and_then(|s| s.parse().ok())
            .unwrap_or(0);
        match key {
            "MemTotal" => info.total = value,
            "MemFree" => info.free = value,
            "MemAvailable" => info.available = value,
            "Buffers" => info.buffers = value,
            "Cached" => info.cached = value,
            "SwapCached" => info.swap_cached = value,
            "Active" => info.active = value,
            "Inactive" => info.inactive = value,
            "Dirty" => info.dirty = value,
            "Committed_AS" => info.committed_as = value,
            "SwapTotal" => info.swap_total = value,
            "SwapFree" => info.swap_free = value,
            _ => {}
        }
    }

    if info.total == 0 {
        return Err(ParseError::new("MemTotal missing"));
    }
    Ok(info)
}

// ============ /proc/vmstat ============

/// Parses paging and swapping counters from `/proc/vmstat`.
///
/// Per-zone scan and steal counters (`pgscan_kswapd_normal`, ...) are summed.
pub fn parse_vmstat(content: &str) -> Result<(PagingStats, SwapStats), ParseError> {
    let mut paging = PagingStats::default();
    let mut swap = SwapStats::default();

    for line in content.lines() {
        let mut parts = line.split_whitespace();
        let (Some(key), Some(value)) = (parts.next(), parts.next()) else {
            continue;
        };
        let value: u64 = value.parse().unwrap_or(0);
        match key {
            "pgpgin" => paging.pgpgin = value,
            "pgpgout" => paging.pgpgout = value,
            "pgfault" => paging.pgfault = value,
            "pgmajfault" => paging.pgmajfault = value,
            "pgfree" => paging.pgfree = value,
            "pswpin" => swap.pswpin = value,
            "pswpout" => swap.pswpout = value,
            k if k.starts_with("pgscan_kswapd") => paging.pgscan_kswapd += value,
            k if k.starts_with("pgscan_direct") && !k.starts_with("pgscan_direct_throttle") => {
                paging.pgscan_direct += value
            }
            k if k.starts_with("pgsteal_") => paging.pgsteal += value,
            _ => {}
        }
    }

    Ok((paging, swap))
}

// ============ /proc/loadavg ============

/// Parses `/proc/loadavg` into run queue fields. Loads are stored x100.
pub fn parse_loadavg(content: &str) -> Result<QueueStats, ParseError> {
    let parts: Vec<&str> = content.split_whitespace().collect();
    if parts.len() < 4 {
        return Err(ParseError::new("invalid loadavg format"));
    }

    let load = |idx: usize, name: &str| -> Result<u32, ParseError> {
        parts[idx]
            .parse::<f64>()
            .map(|v| (v * 100.0).round() as u32)
            .map_err(|_| ParseError::new(format!("invalid {name}")))
    };

    // Format: running/total
    let (running, total) = parts[3]
        .split_once('/')
        .map(|(r, t)| (r.parse().unwrap_or(0), t.parse().unwrap_or(0)))
        .unwrap_or((0, 0));

    Ok(QueueStats {
        nr_running: running,
        nr_threads: total,
        procs_blocked: 0,
        load_avg_1: load(0, "load1")?,
        load_avg_5: load(1, "load5")?,
        load_avg_15: load(2, "load15")?,
    })
}

// ============ /proc/diskstats ============

/// One `/proc/diskstats` line.
#[derive(Debug, Clone, Default)]
pub struct DiskEntry {
    pub name: String,
    pub stats: DiskStats,
}

/// Parses `/proc/diskstats` content.
///
/// Format: major minor name reads r_merged r_sectors r_time writes w_merged
/// w_sectors w_time io_pending io_time w_io_time [discards ...]
///
/// Tick fields are kept to 32 bits like the kernel's own counters.
pub fn parse_diskstats(content: &str) -> Result<Vec<DiskEntry>, ParseError> {
    let mut disks = Vec::new();

    for line in content.lines() {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 14 {
            continue; // Skip malformed lines
        }

        let ticks = |idx: usize| -> u32 { field::<u64>(&parts, idx) as u32 };

        disks.push(DiskEntry {
            name: parts[2].to_string(),
            stats: DiskStats {
                major: field(&parts, 0),
                minor: field(&parts, 1),
                nr_ios: field::<u64>(&parts, 3).wrapping_add(field(&parts, 7)),
                rd_sect: field(&parts, 5),
                wr_sect: field(&parts, 9),
                rd_ticks: ticks(6),
                wr_ticks: ticks(10),
                tot_ticks: ticks(12),
                rq_ticks: ticks(13),
            },
        });
    }

    Ok(disks)
}

// ============ /proc/net/dev ============

/// Parses `/proc/net/dev` content.
///
/// Format:
/// Inter-|   Receive                                                |  Transmit
///  face |bytes    packets errs drop fifo frame compressed multicast|bytes    packets errs drop fifo colls carrier compressed
///    lo: 1234567     1234    0    0    0     0          0         0  1234567     1234    0    0    0     0       0          0
pub fn parse_net_dev(content: &str) -> Result<Vec<NetDevStats>, ParseError> {
    let mut devices = Vec::new();

    for line in content.lines() {
        // Skip header lines
        if line.contains('|') || line.trim().is_empty() {
            continue;
        }
        let Some((name, rest)) = line.split_once(':') else {
            continue;
        };
        let values: Vec<&str> = rest.split_whitespace().collect();
        if values.len() < 16 {
            continue;
        }

        devices.push(NetDevStats {
            name: name.trim().to_string(),
            rx_bytes: field(&values, 0),
            rx_packets: field(&values, 1),
            rx_errors: field(&values, 2),
            rx_dropped: field(&values, 3),
            rx_compressed: field(&values, 6),
            multicast: field(&values, 7),
            tx_bytes: field(&values, 8),
            tx_packets: field(&values, 9),
            tx_errors: field(&values, 10),
            tx_dropped: field(&values, 11),
            collisions: field(&values, 13),
            tx_compressed: field(&values, 15),
        });
    }

    Ok(devices)
}

// ============ /proc/net/sockstat ============

/// Parses `/proc/net/sockstat` content.
pub fn parse_sockstat(content: &str) -> Result<SocketStats, ParseError> {
    let mut stats = SocketStats::default();

    for line in content.lines() {
        let Some((proto, rest)) = line.split_once(':') else {
            continue;
        };
        let parts: Vec<&str> = rest.split_whitespace().collect();
        // Fields come as "name value" pairs.
        let get = |name: &str| -> u32 {
            parts
                .chunks(2)
                .find(|pair| pair[0] == name)
                .and_then(|pair| pair.get(1))
                .and_then(|v| v.parse().ok())
                .unwrap_or(0)
        };
        match proto {
            "sockets" => stats.sock_inuse = get("used"),
            "TCP" => {
                stats.tcp_inuse = get("inuse");
                stats.tcp_tw = get("tw");
            }
            "UDP" => stats.udp_inuse = get("inuse"),
            "RAW" => stats.raw_inuse = get("inuse"),
            "FRAG" => stats.frag_inuse = get("inuse"),
            _ => {}
        }
    }

    Ok(stats)
}

// ============ /proc/sys/fs and /proc/sys/kernel ============

fn numbers(content: &str) -> Vec<u64> {
    content
        .split_whitespace()
        .map(|s| s.parse().unwrap_or(0))
        .collect()
}

/// Unused dentries: second field of `/proc/sys/fs/dentry-state`.
pub fn parse_dentry_state(content: &str) -> Result<u32, ParseError> {
    numbers(content)
        .get(1)
        .map(|&v| v as u32)
        .ok_or_else(|| ParseError::new("invalid dentry-state format"))
}

/// File handles in use from `/proc/sys/fs/file-nr`: allocated minus free.
pub fn parse_file_nr(content: &str) -> Result<u32, ParseError> {
    match numbers(content)[..] {
        [allocated, free, ..] => Ok(allocated.saturating_sub(free) as u32),
        _ => Err(ParseError::new("invalid file-nr format")),
    }
}

/// Inodes in use from `/proc/sys/fs/inode-nr`: allocated minus free.
pub fn parse_inode_nr(content: &str) -> Result<u32, ParseError> {
    match numbers(content)[..] {
        [allocated, free, ..] => Ok(allocated.saturating_sub(free) as u32),
        _ => Err(ParseError::new("invalid inode-nr format")),
    }
}

/// Single integer files such as `/proc/sys/kernel/pty/nr`.
pub fn parse_single(content: &str) -> Result<u32, ParseError> {
    content
        .trim()
        .parse()
        .map_err(|_| ParseError::new(format!("not a number: {:?}", content.trim())))
}

// ============ /proc/tty/driver/serial ============

/// Parses `/proc/tty/driver/serial`. Lines of ports without a UART are
/// skipped.
///
/// Format:
/// `0: uart:16550A port:000003F8 irq:4 tx:12 rx:34 fe:0 pe:0 brk:0 oe:0 RTS|DTR`
pub fn parse_serial(content: &str) -> Result<Vec<SerialStats>, ParseError> {
    let mut lines = Vec::new();

    for line in content.lines() {
        let Some((num, rest)) = line.split_once(':') else {
            continue;
        };
        let Ok(num) = num.trim().parse::<u32>() else {
            continue;
        };
        if rest.contains("uart:unknown") {
            continue;
        }

        let mut stats = SerialStats {
            line: num + 1,
            ..Default::default()
        };
        for token in rest.split_whitespace() {
            let Some((key, value)) = token.split_once(':') else {
                continue;
            };
            let value = value.parse().unwrap_or(0);
            match key {
                "tx" => stats.tx = value,
                "rx" => stats.rx = value,
                "fe" => stats.frame = value,
                "pe" => stats.parity = value,
                "brk" => stats.brk = value,
                "oe" => stats.overrun = value,
                _ => {}
            }
        }
        lines.push(stats);
    }

    Ok(lines)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_stat() {
        let content = "\
cpu  10000 500 3000 80000 1000 200 100 0 40 0
cpu0 5000 250 1500 40000 500 100 50 0 20 0
cpu2 5000 250 1500 40000 500 100 50 0 20 0
intr 1000000 50 0 7
ctxt 500000
btime 1700000000
processes 10000
procs_running 2
procs_blocked 1
";
        let stat = parse_stat(content).unwrap();
        assert_eq!(stat.total.user, 10000);
        assert_eq!(stat.total.guest, 40);
        assert_eq!(stat.cpus.len(), 2);
        assert_eq!(stat.cpus[1].0, 2);
        assert_eq!(stat.cpus[1].1.idle, 40000);
        assert_eq!(stat.intr, vec![1000000, 50, 0, 7]);
        assert_eq!(stat.ctxt, 500000);
        assert_eq!(stat.processes, 10000);
        assert_eq!(stat.procs_blocked, 1);
    }

    #[test]
    fn test_parse_stat_old_kernel_short_cpu_line() {
        let stat = parse_stat("cpu 1 2 3 4\n").unwrap();
        assert_eq!(stat.total.idle, 4);
        assert_eq!(stat.total.iowait, 0);
        assert!(parse_stat("intr 1 2\n").is_err());
    }

    #[test]
    fn test_parse_interrupts() {
        let content = "\
           CPU0       CPU1       CPU3
  0:         44          0          0   IO-APIC   2-edge      timer
  8:          1          2          3   IO-APIC   8-edge      rtc0
 16:    5000000000      7          0   IO-APIC  16-fasteoi   ehci_hcd
NMI:          0          0          0   Non-maskable interrupts
";
        let irqs = parse_interrupts(content).unwrap();
        assert_eq!(irqs.cpus, vec![0, 1, 3]);
        assert_eq!(irqs.rows.len(), 3);
        assert_eq!(irqs.rows[1], (8, vec![1, 2, 3]));
        // Wider than 32 bits: kept modulo 2^32.
        assert_eq!(irqs.rows[2].1[0], 5_000_000_000u64 as u32);
    }

    #[test]
    fn test_parse_meminfo() {
        let content = "\
MemTotal:       16384000 kB
MemFree:         8192000 kB
MemAvailable:   12000000 kB
Cached:          2048000 kB
SwapCached:          128 kB
Committed_AS:    3000000 kB
SwapTotal:       4096000 kB
SwapFree:        4000000 kB
";
        let mem = parse_meminfo(content).unwrap();
        assert_eq!(mem.total, 16384000);
        assert_eq!(mem.cached, 2048000);
        assert_eq!(mem.swap_cached, 128);
        assert_eq!(mem.committed_as, 3000000);
        assert_eq!(mem.swap_free, 4000000);
        assert!(parse_meminfo("").is_err());
    }

    #[test]
    fn test_parse_vmstat() {
        let content = "\
pgpgin 1000
pgpgout 2000
pswpin 3
pswpout 4
pgfault 50000
pgmajfault 12
pgfree 60000
pgsteal_kswapd 10
pgsteal_direct 5
pgscan_kswapd 30
pgscan_direct 7
pgscan_direct_throttle 99
";
        let (paging, swap) = parse_vmstat(content).unwrap();
        assert_eq!(paging.pgpgin, 1000);
        assert_eq!(paging.pgfault, 50000);
        assert_eq!(paging.pgsteal, 15);
        assert_eq!(paging.pgscan_kswapd, 30);
        assert_eq!(paging.pgscan_direct, 7);
        assert_eq!(swap.pswpin, 3);
        assert_eq!(swap.pswpout, 4);
    }

    #[test]
    fn test_parse_loadavg() {
        let q = parse_loadavg("0.15 1.10 12.05 3/150 1234\n").unwrap();
        assert_eq!(q.load_avg_1, 15);
        assert_eq!(q.load_avg_5, 110);
        assert_eq!(q.load_avg_15, 1205);
        assert_eq!(q.nr_running, 3);
        assert_eq!(q.nr_threads, 150);
        assert!(parse_loadavg("garbage").is_err());
    }

    #[test]
    fn test_parse_diskstats() {
        let content = "\
   8       0 sda 12345 100 987654 5000 6789 50 456789 3000 0 4000 8000 0 0 0 0
   8       1 sda1 10000 80 800000 4000 5000 40 400000 2500 0 3500 6500
 bad line
";
        let disks = parse_diskstats(content).unwrap();
        assert_eq!(disks.len(), 2);
        let sda = &disks[0].stats;
        assert_eq!(disks[0].name, "sda");
        assert_eq!(sda.key(), (8, 0));
        assert_eq!(sda.nr_ios, 12345 + 6789);
        assert_eq!(sda.rd_sect, 987654);
        assert_eq!(sda.wr_sect, 456789);
        assert_eq!(sda.rd_ticks, 5000);
        assert_eq!(sda.wr_ticks, 3000);
        assert_eq!(sda.tot_ticks, 4000);
        assert_eq!(sda.rq_ticks, 8000);
    }

    #[test]
    fn test_parse_net_dev() {
        let content = "\
Inter-|   Receive                                                |  Transmit
 face |bytes    packets errs drop fifo frame compressed multicast|bytes    packets errs drop fifo colls carrier compressed
    lo: 1234567     1234    0    0    0     0          0         0  1234567     1234    0    0    0     0       0          0
  eth0: 9876543     8765    1    2    0     0          3         4  5432100     4321    5    6    0     7       0          8
";
        let devs = parse_net_dev(content).unwrap();
        assert_eq!(devs.len(), 2);
        let eth0 = &devs[1];
        assert_eq!(eth0.name, "eth0");
        assert_eq!(eth0.rx_bytes, 9876543);
        assert_eq!(eth0.rx_packets, 8765);
        assert_eq!(eth0.rx_errors, 1);
        assert_eq!(eth0.rx_dropped, 2);
        assert_eq!(eth0.rx_compressed, 3);
        assert_eq!(eth0.multicast, 4);
        assert_eq!(eth0.tx_bytes, 5432100);
        assert_eq!(eth0.tx_errors, 5);
        assert_eq!(eth0.tx_dropped, 6);
        assert_eq!(eth0.collisions, 7);
        assert_eq!(eth0.tx_compressed, 8);
    }

    #[test]
    fn test_parse_sockstat() {
        let content = "\
sockets: used 215
TCP: inuse 12 orphan 0 tw 3 alloc 15 mem 2
UDP: inuse 4 mem 1
UDPLITE: inuse 0
RAW: inuse 1
FRAG: inuse 0 memory 0
";
        let s = parse_sockstat(content).unwrap();
        assert_eq!(s.sock_inuse, 215);
        assert_eq!(s.tcp_inuse, 12);
        assert_eq!(s.tcp_tw, 3);
        assert_eq!(s.udp_inuse, 4);
        assert_eq!(s.raw_inuse, 1);
        assert_eq!(s.frag_inuse, 0);
    }

    #[test]
    fn test_parse_kernel_tables() {
        assert_eq!(parse_dentry_state("45000 30000 45 0 0 0\n").unwrap(), 30000);
        assert_eq!(parse_file_nr("2048 48 9223372036854775807\n").unwrap(), 2000);
        assert_eq!(parse_inode_nr("50000 1000\n").unwrap(), 49000);
        assert_eq!(parse_single("3\n").unwrap(), 3);
        assert!(parse_file_nr("").is_err());
        assert!(parse_single("x").is_err());
    }

    #[test]
    fn test_parse_serial() {
        let content = "\
serinfo:1.0 driver revision:
0: uart:16550A port:000003F8 irq:4 tx:12 rx:34 fe:1 pe:2 brk:3 oe:4 RTS|DTR
1: uart:unknown port:000002F8 irq:3
2: uart:16550A port:000003E8 irq:4 tx:0 rx:0
";
        let lines = parse_serial(content).unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].line, 1);
        assert_eq!(lines[0].tx, 12);
        assert_eq!(lines[0].rx, 34);
        assert_eq!(lines[0].frame, 1);
        assert_eq!(lines[0].parity, 2);
        assert_eq!(lines[0].brk, 3);
        assert_eq!(lines[0].overrun, 4);
        assert_eq!(lines[1].line, 3);
    }
}
