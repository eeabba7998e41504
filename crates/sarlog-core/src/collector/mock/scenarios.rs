//! Pre-built mock filesystem scenarios for testing.
//!
//! These scenarios provide realistic `/proc` and `/sys` states of a small
//! four-processor machine, and of the same machine one second later.

use super::filesystem::MockFs;

const STAT: &str = "\
cpu  10000 500 3000 80000 1000 200 100 0 0 0
cpu0 2500 125 750 20000 250 50 25 0 0 0
cpu1 2500 125 750 20000 250 50 25 0 0 0
cpu2 2500 125 750 20000 250 50 25 0 0 0
cpu3 2500 125 750 20000 250 50 25 0 0 0
intr 1000000 50 0 0 0 0 0 0 0 1 0 0 0 100 0 0 1000
ctxt 500000
btime 1700000000
processes 10000
procs_running 2
procs_blocked 1
";

// One second later on a 100 Hz machine: each processor spent 10 ticks in
// user mode, 5 in system mode and 85 idle.
const STAT_LATER: &str = "\
cpu  10040 500 3020 80340 1000 200 100 0 0 0
cpu0 2510 125 755 20085 250 50 25 0 0 0
cpu1 2510 125 755 20085 250 50 25 0 0 0
cpu2 2510 125 755 20085 250 50 25 0 0 0
cpu3 2510 125 755 20085 250 50 25 0 0 0
intr 1001000 150 0 0 0 0 0 0 0 1 0 0 0 100 0 0 1900
ctxt 502000
btime 1700000000
processes 10010
procs_running 3
procs_blocked 0
";

// cpu2 went offline and is missing from the file.
const STAT_CPU_OFFLINE: &str = "\
cpu  7700 375 2250 60000 750 150 75 0 0 0
cpu0 2600 125 750 20000 250 50 25 0 0 0
cpu1 2600 125 750 20000 250 50 25 0 0 0
cpu3 2500 125 750 20000 250 50 25 0 0 0
intr 1000000 50 0 0 0 0 0 0 0 1 0 0 0 100 0 0 1000
ctxt 500000
btime 1700000000
processes 10000
procs_running 2
procs_blocked 1
";

const INTERRUPTS: &str = "\
           CPU0       CPU1       CPU2       CPU3
  0:         10          0          0          0   IO-APIC   2-edge      timer
  1:          5          4          0          1   IO-APIC   1-edge      i8042
 16:        100        300         50          0   IO-APIC  16-fasteoi   ehci_hcd
NMI:          0          0          0          0   Non-maskable interrupts
LOC:     100000     100000     100000     100000   Local timer interrupts
";

const INTERRUPTS_LATER: &str = "\
           CPU0       CPU1       CPU2       CPU3
  0:         10          0          0          0   IO-APIC   2-edge      timer
  1:          5          4          0          1   IO-APIC   1-edge      i8042
 16:        100        400         50          0   IO-APIC  16-fasteoi   ehci_hcd
NMI:          0          0          0          0   Non-maskable interrupts
LOC:     100100     100100     100100     100100   Local timer interrupts
";

const DISKSTATS: &str = "\
   7       0 loop0 0 0 0 0 0 0 0 0 0 0 0 0 0 0 0
   8       0 sda 12345 100 987654 5000 6789 50 456789 3000 0 4000 8000 0 0 0 0
   8       1 sda1 10000 80 800000 4000 5000 40 400000 2500 0 3500 6500 0 0 0 0
 259       0 nvme0n1 50000 200 2000000 10000 30000 150 1500000 8000 5 15000 18000 0 0 0 0
";

// sda: 60 reads of 400 sectors and 40 writes of 200 sectors, busy 500 ms.
const DISKSTATS_LATER: &str = "\
   7       0 loop0 0 0 0 0 0 0 0 0 0 0 0 0 0 0 0
   8       0 sda 12405 100 988054 5300 6829 50 456989 3200 0 4500 8500 0 0 0 0
   8       1 sda1 10060 80 800400 4300 5040 40 400200 2700 0 4000 7000 0 0 0 0
 259       0 nvme0n1 50000 200 2000000 10000 30000 150 1500000 8000 5 15000 18000 0 0 0 0
";

// sda was pulled and plugged back in: its counters restarted from zero.
const DISKSTATS_REINSERTED: &str = "\
   8       0 sda 10 0 80 5 2 0 16 1 0 6 6 0 0 0 0
 259       0 nvme0n1 50000 200 2000000 10000 30000 150 1500000 8000 5 15000 18000 0 0 0 0
";

const NET_DEV: &str = "\
Inter-|   Receive                                                |  Transmit
 face |bytes    packets errs drop fifo frame compressed multicast|bytes    packets errs drop fifo colls carrier compressed
    lo: 12345678     9876    0    0    0     0          0         0 12345678     9876    0    0    0     0       0          0
  eth0: 987654321   654321    5   10    0     0          0       100 123456789   456789    2    5    0     0       0          0
";

const NET_DEV_LATER: &str = "\
Inter-|   Receive                                                |  Transmit
 face |bytes    packets errs drop fifo frame compressed multicast|bytes    packets errs drop fifo colls carrier compressed
    lo: 12345678     9876    0    0    0     0          0         0 12345678     9876    0    0    0     0       0          0
  eth0: 987756721   654421    5   10    0     0          0       100 123507989   456839    2    5    0     0       0          0
";

const MEMINFO: &str = "\
MemTotal:       16384000 kB
MemFree:         8192000 kB
MemAvailable:   12000000 kB
Buffers:          512000 kB
Cached:          2048000 kB
SwapCached:            0 kB
Active:          4096000 kB
Inactive:        2048000 kB
SwapTotal:       4096000 kB
SwapFree:        4096000 kB
Dirty:              1024 kB
Writeback:             0 kB
Committed_AS:    6000000 kB
";

const VMSTAT: &str = "\
pgpgin 123456
pgpgout 654321
pswpin 10
pswpout 20
pgfault 5000000
pgmajfault 1234
pgfree 3000000
pgsteal_kswapd 5000
pgsteal_direct 1000
pgscan_kswapd 10000
pgscan_direct 2000
pgscan_direct_throttle 0
oom_kill 0
";

const VMSTAT_LATER: &str = "\
pgpgin 123856
pgpgout 654521
pswpin 10
pswpout 20
pgfault 5000500
pgmajfault 1236
pgfree 3001000
pgsteal_kswapd 5000
pgsteal_direct 1000
pgscan_kswapd 10000
pgscan_direct 2000
pgscan_direct_throttle 0
oom_kill 0
";

const SOCKSTAT: &str = "\
sockets: used 180
TCP: inuse 12 orphan 0 tw 4 alloc 15 mem 3
UDP: inuse 5 mem 2
UDPLITE: inuse 0
RAW: inuse 1
FRAG: inuse 0 memory 0
";

const SERIAL: &str = "\
serinfo:1.0 driver revision:
0: uart:16550A port:000003F8 irq:4 tx:1200 rx:340 fe:0 pe:0 brk:0 oe:1 RTS|DTR
1: uart:unknown port:000002F8 irq:3
";

impl MockFs {
    /// Creates a typical four-processor system.
    ///
    /// Includes: three numbered IRQs, one serial line, `lo` and `eth0`, the
    /// whole disks `sda` and `nvme0n1` (plus the partition `sda1` and an idle
    /// `loop0`).
    pub fn typical_system() -> Self {
        Self::new()
            .with_proc("stat", STAT)
            .with_proc("interrupts", INTERRUPTS)
            .with_proc("meminfo", MEMINFO)
            .with_proc("vmstat", VMSTAT)
            .with_proc("loadavg", "0.15 0.10 0.05 2/150 1234\n")
            .with_proc("diskstats", DISKSTATS)
            .with_proc("net/dev", NET_DEV)
            .with_proc("net/sockstat", SOCKSTAT)
            .with_proc("tty/driver/serial", SERIAL)
            .with_proc("sys/fs/dentry-state", "50000 45000 45 0 0 0\n")
            .with_proc("sys/fs/file-nr", "3000 1000 9223372036854775807\n")
            .with_proc("sys/fs/inode-nr", "60000 5000\n")
            .with_proc("sys/kernel/pty/nr", "2\n")
            .with_sys_cpus(4)
            .with_block_devices(&["loop0", "sda", "nvme0n1"])
    }

    /// The typical system one second later.
    pub fn after_one_second() -> Self {
        Self::typical_system()
            .with_proc("stat", STAT_LATER)
            .with_proc("interrupts", INTERRUPTS_LATER)
            .with_proc("vmstat", VMSTAT_LATER)
            .with_proc("diskstats", DISKSTATS_LATER)
            .with_proc("net/dev", NET_DEV_LATER)
            .with_proc("loadavg", "0.20 0.11 0.05 3/152 1240\n")
    }

    /// The typical system with cpu2 offline.
    pub fn cpu_offline() -> Self {
        Self::typical_system().with_proc("stat", STAT_CPU_OFFLINE)
    }

    /// The typical system after `sda` was replugged and `loop0` detached.
    pub fn disk_reinserted() -> Self {
        Self::typical_system().with_proc("diskstats", DISKSTATS_REINSERTED)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::traits::FileSystem;
    use std::path::Path;

    #[test]
    fn test_typical_system_layout() {
        let fs = MockFs::typical_system();
        assert!(fs.exists(Path::new("/proc/stat")));
        assert!(fs.exists(Path::new("/sys/block/sda")));
        assert!(!fs.exists(Path::new("/sys/block/sda1")));
        let cpus = fs.read_dir(Path::new("/sys/devices/system/cpu")).unwrap();
        assert_eq!(cpus.len(), 6);
    }

    #[test]
    fn test_later_scenarios_override_files() {
        let later = MockFs::after_one_second();
        let stat = later.read_to_string(Path::new("/proc/stat")).unwrap();
        assert!(stat.starts_with("cpu  10040"));

        let offline = MockFs::cpu_offline();
        let stat = offline.read_to_string(Path::new("/proc/stat")).unwrap();
        assert!(!stat.contains("cpu2"));
    }
}
