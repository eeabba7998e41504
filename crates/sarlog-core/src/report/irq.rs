//! Interrupt rates: per IRQ line, and per CPU per IRQ.

use crate::reconcile::find_irqcpu_reference;
use crate::select::Selection;
use crate::storage::model::{IrqCpuStats, Sample};

use super::{Column, Span, Table, TableKind};

/// `sum` row over every line, then one row per selected IRQ.
pub fn interrupts(prev: &Sample, curr: &Sample, span: &Span, irqs: Option<&Selection>) -> Table {
    let mut table = Table::new(
        "intr",
        "INTR",
        TableKind::Rate,
        vec![Column::new("intr/s", 2)],
    );
    table.push("sum", vec![span.rate(prev.stat.irq_sum, curr.stat.irq_sum)]);

    let Some(selection) = irqs else {
        return table;
    };
    for (i, (p, c)) in prev.irqs.iter().zip(&curr.irqs).enumerate() {
        if selection.contains(i as u32) {
            table.push(i.to_string(), vec![span.rate(p.count, c.count)]);
        }
    }
    table
}

/// IRQ numbers in the order they appear in `row`, free slots skipped.
fn irq_columns(row: &[IrqCpuStats]) -> Vec<u32> {
    row.iter().filter(|e| !e.is_free()).map(|e| e.irq).collect()
}

/// One column per IRQ seen on the first CPU, one row per selected CPU.
///
/// Each entry is matched against the same CPU's row of the previous sample
/// by IRQ number; an IRQ absent from the previous sample (including a
/// cleared since-boot sample) counts from zero.
pub fn per_cpu_interrupts(
    prev: &Sample,
    curr: &Sample,
    span: &Span,
    cpus: Option<&Selection>,
) -> Table {
    let irqs = curr
        .irqcpus
        .first()
        .map(|row| irq_columns(row))
        .unwrap_or_default();
    let mut table = Table::new(
        "intr-cpu",
        "CPU",
        TableKind::Rate,
        irqs.iter()
            .map(|irq| Column::new(format!("i{:03}/s", irq), 2))
            .collect(),
    );

    let all = Selection::All;
    let selection = cpus.unwrap_or(&all);
    for (cpu, row) in curr.irqcpus.iter().enumerate() {
        if !selection.contains(cpu as u32) {
            continue;
        }
        let reference = prev.irqcpus.get(cpu).map(Vec::as_slice).unwrap_or(&[]);
        let values = irqs
            .iter()
            .map(|&irq| {
                let Some(pos) = row.iter().position(|e| e.irq == irq) else {
                    return 0.0;
                };
                let before = find_irqcpu_reference(irq, pos, reference)
                    .map_or(0, |j| reference[j].interrupts);
                span.rate(before as u64, row[pos].interrupts as u64)
            })
            .collect();
        table.push(cpu.to_string(), values);
    }
    table
}
