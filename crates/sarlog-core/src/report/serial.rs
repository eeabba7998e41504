//! Serial line rates.

use crate::storage::model::{Sample, SerialStats};

use super::{Span, Table, TableKind, columns};

/// One row per serial line in use, labelled `ttyS<n>`. A line missing from
/// the previous sample is compared against zero counters.
pub fn lines(prev: &Sample, curr: &Sample, span: &Span) -> Table {
    let mut table = Table::new(
        "serial",
        "TTY",
        TableKind::Rate,
        columns(&[
            ("rcvin/s", 2),
            ("xmtin/s", 2),
            ("framerr/s", 2),
            ("prtyerr/s", 2),
            ("brk/s", 2),
            ("ovrun/s", 2),
        ]),
    );
    let zero = SerialStats::default();
    for c in curr.serials.iter().filter(|s| !s.is_free()) {
        let p = prev
            .serials
            .iter()
            .find(|p| p.line == c.line)
            .unwrap_or(&zero);
        let rate = |a: u32, b: u32| span.rate(a as u64, b as u64);
        table.push(
            format!("ttyS{}", c.line - 1),
            vec![
                rate(p.rx, c.rx),
                rate(p.tx, c.tx),
                rate(p.frame, c.frame),
                rate(p.parity, c.parity),
                rate(p.brk, c.brk),
                rate(p.overrun, c.overrun),
            ],
        );
    }
    table
}
