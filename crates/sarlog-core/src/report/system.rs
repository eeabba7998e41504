//! Fixed-cardinality activities: task creation and context switches, paging,
//! swapping, memory, kernel tables, sockets and the run queue.

use crate::rates::{delta, per_event};
use crate::storage::model::{QueueStats, Sample};

use super::{Span, Table, TableKind, columns};

/// `proc/s` and `cswch/s`.
pub fn task_creation(prev: &Sample, curr: &Sample, span: &Span) -> Table {
    let mut table = Table::new(
        "pcsw",
        "",
        TableKind::Rate,
        columns(&[("proc/s", 2), ("cswch/s", 2)]),
    );
    table.push(
        "",
        vec![
            span.rate(prev.stat.processes, curr.stat.processes),
            span.rate(prev.stat.context_switches, curr.stat.context_switches),
        ],
    );
    table
}

pub fn swapping(prev: &Sample, curr: &Sample, span: &Span) -> Table {
    let (p, c) = (&prev.stat.swap, &curr.stat.swap);
    let mut table = Table::new(
        "swap",
        "",
        TableKind::Rate,
        columns(&[("pswpin/s", 2), ("pswpout/s", 2)]),
    );
    table.push(
        "",
        vec![span.rate(p.pswpin, c.pswpin), span.rate(p.pswpout, c.pswpout)],
    );
    table
}

/// Paging rates; `%vmeff` is pages stolen per page scanned.
pub fn paging(prev: &Sample, curr: &Sample, span: &Span) -> Table {
    let (p, c) = (&prev.stat.paging, &curr.stat.paging);
    let mut table = Table::new(
        "paging",
        "",
        TableKind::Rate,
        columns(&[
            ("pgpgin/s", 2),
            ("pgpgout/s", 2),
            ("fault/s", 2),
            ("majflt/s", 2),
            ("pgfree/s", 2),
            ("pgscank/s", 2),
            ("pgscand/s", 2),
            ("pgsteal/s", 2),
            ("%vmeff", 2),
        ]),
    );
    let scanned =
        delta(p.pgscan_kswapd, c.pgscan_kswapd) + delta(p.pgscan_direct, c.pgscan_direct);
    table.push(
        "",
        vec![
            span.rate(p.pgpgin, c.pgpgin),
            span.rate(p.pgpgout, c.pgpgout),
            span.rate(p.pgfault, c.pgfault),
            span.rate(p.pgmajfault, c.pgmajfault),
            span.rate(p.pgfree, c.pgfree),
            span.rate(p.pgscan_kswapd, c.pgscan_kswapd),
            span.rate(p.pgscan_direct, c.pgscan_direct),
            span.rate(p.pgsteal, c.pgsteal),
            per_event(delta(p.pgsteal, c.pgsteal), scanned) * 100.0,
        ],
    );
    table
}

fn percent_of(part: u64, whole: u64) -> f64 {
    per_event(part, whole) * 100.0
}

/// Memory usage in kB. Used memory excludes buffers and page cache.
pub fn memory(curr: &Sample) -> Table {
    let m = &curr.stat.memory;
    let mut table = Table::new(
        "memory",
        "",
        TableKind::Level,
        columns(&[
            ("kbmemfree", 0),
            ("kbavail", 0),
            ("kbmemused", 0),
            ("%memused", 2),
            ("kbbuffers", 0),
            ("kbcached", 0),
            ("kbcommit", 0),
            ("%commit", 2),
            ("kbactive", 0),
            ("kbinact", 0),
            ("kbdirty", 0),
        ]),
    );
    let used = m
        .total
        .saturating_sub(m.free)
        .saturating_sub(m.buffers)
        .saturating_sub(m.cached);
    table.push(
        "",
        vec![
            m.free as f64,
            m.available as f64,
            used as f64,
            percent_of(used, m.total),
            m.buffers as f64,
            m.cached as f64,
            m.committed_as as f64,
            percent_of(m.committed_as, m.total + m.swap_total),
            m.active as f64,
            m.inactive as f64,
            m.dirty as f64,
        ],
    );
    table
}

/// Swap space usage in kB; `%swpcad` is the cached share of used swap.
pub fn swap_space(curr: &Sample) -> Table {
    let m = &curr.stat.memory;
    let mut table = Table::new(
        "swap-space",
        "",
        TableKind::Level,
        columns(&[
            ("kbswpfree", 0),
            ("kbswpused", 0),
            ("%swpused", 2),
            ("kbswpcad", 0),
            ("%swpcad", 2),
        ]),
    );
    let used = m.swap_total.saturating_sub(m.swap_free);
    table.push(
        "",
        vec![
            m.swap_free as f64,
            used as f64,
            percent_of(used, m.swap_total),
            m.swap_cached as f64,
            percent_of(m.swap_cached, used),
        ],
    );
    table
}

pub fn kernel_tables(curr: &Sample) -> Table {
    let k = &curr.stat.ktables;
    let mut table = Table::new(
        "ktables",
        "",
        TableKind::Level,
        columns(&[("dentunusd", 0), ("file-nr", 0), ("inode-nr", 0), ("pty-nr", 0)]),
    );
    table.push(
        "",
        vec![
            k.dentry_unused as f64,
            k.file_used as f64,
            k.inode_used as f64,
            k.pty_nr as f64,
        ],
    );
    table
}

pub fn sockets(curr: &Sample) -> Table {
    let s = &curr.stat.sockets;
    let mut table = Table::new(
        "sockets",
        "",
        TableKind::Level,
        columns(&[
            ("totsck", 0),
            ("tcpsck", 0),
            ("udpsck", 0),
            ("rawsck", 0),
            ("ip-frag", 0),
            ("tcp-tw", 0),
        ]),
    );
    table.push(
        "",
        vec![
            s.sock_inuse as f64,
            s.tcp_inuse as f64,
            s.udp_inuse as f64,
            s.raw_inuse as f64,
            s.frag_inuse as f64,
            s.tcp_tw as f64,
        ],
    );
    table
}

pub fn queue(curr: &Sample) -> Table {
    let q = &curr.stat.queue;
    let mut table = Table::new(
        "queue",
        "",
        TableKind::Level,
        columns(&[
            ("runq-sz", 0),
            ("plist-sz", 0),
            ("ldavg-1", 2),
            ("ldavg-5", 2),
            ("ldavg-15", 2),
            ("blocked", 0),
        ]),
    );
    table.push(
        "",
        vec![
            q.nr_running as f64,
            q.nr_threads as f64,
            QueueStats::load(q.load_avg_1),
            QueueStats::load(q.load_avg_5),
            QueueStats::load(q.load_avg_15),
            q.procs_blocked as f64,
        ],
    );
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interval::Intervals;

    fn span() -> Span {
        // Two seconds at 100 Hz.
        Span {
            itv: Intervals {
                global: 800,
                per_processor: 200,
            },
            hz: 100,
        }
    }

    #[test]
    fn test_task_creation_rates() {
        let mut prev = Sample::default();
        let mut curr = Sample::default();
        prev.stat.processes = 100;
        curr.stat.processes = 110;
        prev.stat.context_switches = 5_000;
        curr.stat.context_switches = 9_000;

        let table = task_creation(&prev, &curr, &span());
        assert_eq!(table.value("", "proc/s"), Some(5.0));
        assert_eq!(table.value("", "cswch/s"), Some(2000.0));
    }

    #[test]
    fn test_paging_vmeff() {
        let mut prev = Sample::default();
        let mut curr = Sample::default();
        curr.stat.paging.pgscan_kswapd = 300;
        curr.stat.paging.pgscan_direct = 100;
        curr.stat.paging.pgsteal = 200;
        curr.stat.paging.pgfault = 1000;
        prev.stat.paging.pgfault = 400;

        let table = paging(&prev, &curr, &span());
        assert_eq!(table.value("", "fault/s"), Some(300.0));
        assert_eq!(table.value("", "%vmeff"), Some(50.0));

        // Nothing scanned: no efficiency to report.
        let idle = paging(&prev, &prev, &span());
        assert_eq!(idle.value("", "%vmeff"), Some(0.0));
    }

    #[test]
    fn test_memory_levels() {
        let mut curr = Sample::default();
        let m = &mut curr.stat.memory;
        m.total = 1000;
        m.free = 200;
        m.buffers = 50;
        m.cached = 250;
        m.committed_as = 600;
        m.swap_total = 1000;
        m.swap_free = 750;
        m.swap_cached = 25;

        let mem = memory(&curr);
        assert_eq!(mem.kind, TableKind::Level);
        assert_eq!(mem.value("", "kbmemused"), Some(500.0));
        assert_eq!(mem.value("", "%memused"), Some(50.0));
        assert_eq!(mem.value("", "%commit"), Some(30.0));

        let swap = swap_space(&curr);
        assert_eq!(swap.value("", "kbswpused"), Some(250.0));
        assert_eq!(swap.value("", "%swpused"), Some(25.0));
        assert_eq!(swap.value("", "%swpcad"), Some(10.0));
    }

    #[test]
    fn test_queue_loads() {
        let mut curr = Sample::default();
        curr.stat.queue.load_avg_1 = 150;
        curr.stat.queue.nr_threads = 320;
        let table = queue(&curr);
        assert_eq!(table.value("", "ldavg-1"), Some(1.5));
        assert_eq!(table.value("", "plist-sz"), Some(320.0));
    }
}
