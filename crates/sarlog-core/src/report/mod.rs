//! Report computations: rates and levels derived from a pair of samples.
//!
//! Every activity turns `(reference, current)` into one or more [`Table`]s;
//! formatters print tables, and the [`Reporter`] drives the sample sequence.
//!
//! ```text
//!  SampleProvider ──► SampleSlots ──► compute_tables ──► Formatter ──► output
//!                     (prev, curr,     (reconcile +
//!                      reference)       counter arithmetic)
//! ```

pub mod cpu;
pub mod disk;
mod format;
pub mod irq;
pub mod net;
mod reporter;
pub mod serial;
pub mod system;

pub use format::{Formatter, OutputFormat};
pub use reporter::{ReportError, ReportOptions, Reporter};

use crate::interval::Intervals;
use crate::storage::{Activities, Sample};

/// A printed column.
#[derive(Clone, Debug, PartialEq)]
pub struct Column {
    pub name: String,
    pub decimals: usize,
}

impl Column {
    pub fn new(name: impl Into<String>, decimals: usize) -> Self {
        Self {
            name: name.into(),
            decimals,
        }
    }
}

fn columns(specs: &[(&str, usize)]) -> Vec<Column> {
    specs
        .iter()
        .map(|&(name, decimals)| Column::new(name, decimals))
        .collect()
}

/// Whether values are per-interval rates or point-in-time levels. Rate
/// averages are recomputed over the whole segment; level averages are the
/// mean of the printed values.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TableKind {
    Rate,
    Level,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Row {
    /// Entity label (`all`, `0`, `eth0`, `dev8-0`...); empty when the
    /// table has no item column.
    pub item: String,
    pub values: Vec<f64>,
}

/// Values of one activity over one interval.
#[derive(Clone, Debug, PartialEq)]
pub struct Table {
    /// Short name used in delimited output.
    pub name: &'static str,
    /// Header of the item column; empty when there is none.
    pub item_label: &'static str,
    pub kind: TableKind,
    pub columns: Vec<Column>,
    pub rows: Vec<Row>,
}

impl Table {
    fn new(
        name: &'static str,
        item_label: &'static str,
        kind: TableKind,
        columns: Vec<Column>,
    ) -> Self {
        Self {
            name,
            item_label,
            kind,
            columns,
            rows: Vec::new(),
        }
    }

    fn push(&mut self, item: impl Into<String>, values: Vec<f64>) {
        self.rows.push(Row {
            item: item.into(),
            values,
        });
    }

    /// Value of `column` in the row labelled `item`.
    pub fn value(&self, item: &str, column: &str) -> Option<f64> {
        let col = self.columns.iter().position(|c| c.name == column)?;
        let row = self.rows.iter().find(|r| r.item == item)?;
        row.values.get(col).copied()
    }
}

/// Time base of one computation.
#[derive(Clone, Copy, Debug)]
pub struct Span {
    pub itv: Intervals,
    pub hz: u32,
}

impl Span {
    pub fn between(prev: &Sample, curr: &Sample, hz: u32) -> Self {
        Self {
            itv: Intervals::between(&prev.stat, &curr.stat),
            hz,
        }
    }

    /// Per-second rate of a counter scaled by the per-processor interval.
    fn rate(&self, prev: u64, curr: u64) -> f64 {
        crate::rates::s_value(prev, curr, self.itv.per_processor, self.hz)
    }
}

/// Computes every table selected by `options.activities`.
///
/// `prev` is mutable because entity reconciliation may reset stale entries
/// of the reference sample.
pub fn compute_tables(
    prev: &mut Sample,
    curr: &Sample,
    hz: u32,
    options: &ReportOptions,
) -> Vec<Table> {
    let span = Span::between(prev, curr, hz);
    let a = options.activities;
    let mut tables = Vec::new();

    if a.contains(Activities::CPU) {
        tables.push(cpu::utilisation(prev, curr, &span, options.cpus.as_ref()));
    }
    if a.contains(Activities::PCSW) {
        tables.push(system::task_creation(prev, curr, &span));
    }
    if a.contains(Activities::IRQ) {
        tables.push(irq::interrupts(prev, curr, &span, options.irqs.as_ref()));
    }
    if a.contains(Activities::IRQCPU) && !curr.irqcpus.is_empty() {
        tables.push(irq::per_cpu_interrupts(prev, curr, &span, options.cpus.as_ref()));
    }
    if a.contains(Activities::SWAP) {
        tables.push(system::swapping(prev, curr, &span));
    }
    if a.contains(Activities::PAGE) {
        tables.push(system::paging(prev, curr, &span));
    }
    if a.contains(Activities::MEMORY) {
        tables.push(system::memory(curr));
        tables.push(system::swap_space(curr));
    }
    if a.contains(Activities::KTABLES) {
        tables.push(system::kernel_tables(curr));
    }
    if a.contains(Activities::SOCKETS) {
        tables.push(system::sockets(curr));
    }
    if a.contains(Activities::QUEUE) {
        tables.push(system::queue(curr));
    }
    if a.contains(Activities::SERIAL) && !curr.serials.is_empty() {
        tables.push(serial::lines(prev, curr, &span));
    }
    if a.contains(Activities::NET_DEV) && !curr.ifaces.is_empty() {
        tables.extend(net::devices(prev, curr, &span));
    }
    if a.contains(Activities::DISK) && !curr.disks.is_empty() {
        tables.push(disk::devices(prev, curr, &span));
    }
    tables
}
