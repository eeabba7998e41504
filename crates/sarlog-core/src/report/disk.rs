//! Block device activity.

use crate::rates::{delta, delta_wrap32, per_event};
use crate::reconcile::find_disk_reference;
use crate::storage::model::{DiskStats, Sample};

use super::{Span, Table, TableKind, columns};

/// One row per device, labelled `dev<major>-<minor>`.
///
/// - `avgrq-sz`: sectors per request.
/// - `avgqu-sz`: mean queue length, from the weighted I/O time.
/// - `await`: milliseconds per request, queueing included.
/// - `svctm`: milliseconds of device busy time per request.
/// - `%util`: share of the interval the device was busy.
pub fn devices(prev: &mut Sample, curr: &Sample, span: &Span) -> Table {
    let mut table = Table::new(
        "disk",
        "DEV",
        TableKind::Rate,
        columns(&[
            ("tps", 2),
            ("rd_sec/s", 2),
            ("wr_sec/s", 2),
            ("avgrq-sz", 2),
            ("avgqu-sz", 2),
            ("await", 2),
            ("svctm", 2),
            ("%util", 2),
        ]),
    );

    let zero = DiskStats::default();
    for (pos, c) in curr.disks.iter().enumerate() {
        if c.is_free() {
            continue;
        }
        let p = match find_disk_reference(c, &mut prev.disks, pos) {
            Some(i) => &prev.disks[i],
            None => &zero,
        };
        table.push(format!("dev{}-{}", c.major, c.minor), disk_values(p, c, span));
    }
    table
}

fn disk_values(p: &DiskStats, c: &DiskStats, span: &Span) -> Vec<f64> {
    let ios = delta(p.nr_ios, c.nr_ios);
    let sectors = delta(p.rd_sect, c.rd_sect) + delta(p.wr_sect, c.wr_sect);
    let io_ticks = delta_wrap32(p.rd_ticks as u64, c.rd_ticks as u64)
        + delta_wrap32(p.wr_ticks as u64, c.wr_ticks as u64);

    let tps = span.rate(p.nr_ios, c.nr_ios);
    // Busy milliseconds per second.
    let busy = span.rate(p.tot_ticks as u64, c.tot_ticks as u64);
    let svctm = if tps > 0.0 { busy / tps } else { 0.0 };

    vec![
        tps,
        span.rate(p.rd_sect, c.rd_sect),
        span.rate(p.wr_sect, c.wr_sect),
        per_event(sectors, ios),
        span.rate(p.rq_ticks as u64, c.rq_ticks as u64) / 1000.0,
        per_event(io_ticks, ios),
        svctm,
        busy / 10.0,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interval::Intervals;
    use crate::storage::model::DomainCounts;

    fn span() -> Span {
        // One second at 100 Hz.
        Span {
            itv: Intervals {
                global: 400,
                per_processor: 100,
            },
            hz: 100,
        }
    }

    fn samples() -> (Sample, Sample) {
        let counts = DomainCounts {
            cpu_nr: 1,
            disk_nr: 3,
            ..Default::default()
        };
        (Sample::with_counts(&counts), Sample::with_counts(&counts))
    }

    #[test]
    fn test_disk_metrics() {
        let (mut prev, mut curr) = samples();
        prev.disks[0] = DiskStats {
            major: 8,
            minor: 0,
            nr_ios: 1000,
            rd_sect: 8000,
            wr_sect: 4000,
            rd_ticks: 500,
            wr_ticks: 500,
            tot_ticks: 2000,
            rq_ticks: 3000,
        };
        curr.disks[0] = DiskStats {
            major: 8,
            minor: 0,
            nr_ios: 1100,
            rd_sect: 8800,
            wr_sect: 4800,
            rd_ticks: 700,
            wr_ticks: 800,
            tot_ticks: 2250,
            rq_ticks: 4500,
        };

        let table = devices(&mut prev, &curr, &span());
        assert_eq!(table.value("dev8-0", "tps"), Some(100.0));
        assert_eq!(table.value("dev8-0", "rd_sec/s"), Some(800.0));
        assert_eq!(table.value("dev8-0", "avgrq-sz"), Some(16.0));
        assert_eq!(table.value("dev8-0", "avgqu-sz"), Some(1.5));
        assert_eq!(table.value("dev8-0", "await"), Some(5.0));
        assert_eq!(table.value("dev8-0", "svctm"), Some(2.5));
        assert_eq!(table.value("dev8-0", "%util"), Some(25.0));
    }

    #[test]
    fn test_new_disk_claims_free_slot() {
        let (mut prev, mut curr) = samples();
        curr.disks[0] = DiskStats {
            major: 8,
            minor: 0,
            nr_ios: 50,
            ..Default::default()
        };

        let table = devices(&mut prev, &curr, &span());
        // No previous reading: the first rate is the counter over the interval.
        assert_eq!(table.value("dev8-0", "tps"), Some(50.0));
        assert_eq!(prev.disks[0].key(), (8, 0));
    }

    #[test]
    fn test_idle_disk_has_no_service_time() {
        let (mut prev, mut curr) = samples();
        let idle = DiskStats {
            major: 259,
            minor: 0,
            nr_ios: 10,
            ..Default::default()
        };
        prev.disks[0] = idle;
        curr.disks[0] = idle;

        let table = devices(&mut prev, &curr, &span());
        assert_eq!(table.value("dev259-0", "svctm"), Some(0.0));
        assert_eq!(table.value("dev259-0", "await"), Some(0.0));
    }
}
