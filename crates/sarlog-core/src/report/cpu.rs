//! CPU utilisation.

use crate::interval::per_cpu_interval;
use crate::rates::{ll_sp_value, round2, spread_to_hundred};
use crate::select::Selection;
use crate::storage::model::{CpuStats, Sample};

use super::{Span, Table, TableKind, columns};

const COLUMNS: [(&str, usize); 7] = [
    ("%user", 2),
    ("%nice", 2),
    ("%system", 2),
    ("%iowait", 2),
    ("%steal", 2),
    ("%guest", 2),
    ("%idle", 2),
];

/// Index of `%idle` in a row.
const IDLE: usize = COLUMNS.len() - 1;

/// Share of `itv` ticks spent in each mode, rounded so the row adds up to
/// 100.00.
///
/// Guest time is already counted in user (and guest_nice in nice) by the
/// kernel; it is moved out of those buckets into `%guest`. irq and softirq
/// are folded into system. Idle takes the rounding remainder unless it went
/// backwards, in which case it reads as 0.
pub fn percentages(prev: &CpuStats, curr: &CpuStats, itv: u64) -> [f64; COLUMNS.len()] {
    let idle_backwards = curr.idle < prev.idle;
    let mut values = [
        ll_sp_value(
            prev.user.saturating_sub(prev.guest),
            curr.user.saturating_sub(curr.guest),
            itv,
        ),
        ll_sp_value(
            prev.nice.saturating_sub(prev.guest_nice),
            curr.nice.saturating_sub(curr.guest_nice),
            itv,
        ),
        ll_sp_value(
            prev.system + prev.irq + prev.softirq,
            curr.system + curr.irq + curr.softirq,
            itv,
        ),
        ll_sp_value(prev.iowait, curr.iowait, itv),
        ll_sp_value(prev.steal, curr.steal, itv),
        ll_sp_value(
            prev.guest + prev.guest_nice,
            curr.guest + curr.guest_nice,
            itv,
        ),
        if idle_backwards {
            0.0
        } else {
            ll_sp_value(prev.idle, curr.idle, itv)
        },
    ];
    if idle_backwards {
        for v in &mut values {
            *v = round2(*v);
        }
    } else {
        spread_to_hundred(&mut values);
    }
    values
}

/// `all` row over the global interval, then one row per selected CPU over
/// that CPU's own interval. An offline CPU prints as zeros.
pub fn utilisation(
    prev: &Sample,
    curr: &Sample,
    span: &Span,
    cpus: Option<&Selection>,
) -> Table {
    let mut table = Table::new("cpu", "CPU", TableKind::Rate, columns(&COLUMNS));
    table.push(
        "all",
        percentages(&prev.stat.cpu, &curr.stat.cpu, span.itv.global).to_vec(),
    );

    let Some(selection) = cpus else {
        return table;
    };
    for (i, (p, c)) in prev.cpus.iter().zip(&curr.cpus).enumerate() {
        if !selection.contains(i as u32) {
            continue;
        }
        let itv = per_cpu_interval(p, c);
        let values = if itv == 0 || c.is_zero() {
            [0.0; COLUMNS.len()]
        } else if c.total_ticks() < p.total_ticks() {
            // Counters restarted: the whole row is new time.
            percentages(&CpuStats::default(), c, itv)
        } else {
            percentages(p, c, itv)
        };
        table.push(i.to_string(), values.to_vec());
    }
    table
}
