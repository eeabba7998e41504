//! Network interface rates: traffic and errors.

use crate::reconcile::find_net_reference;
use crate::storage::model::{NetDevStats, Sample};

use super::{Span, Table, TableKind, columns};

/// Traffic (`net-dev`) and error (`net-edev`) tables, one row per
/// interface.
///
/// Each interface is first located in `prev`; a stale entry there is reset
/// so the rate restarts from zero.
pub fn devices(prev: &mut Sample, curr: &Sample, span: &Span) -> Vec<Table> {
    let mut traffic = Table::new(
        "net-dev",
        "IFACE",
        TableKind::Rate,
        columns(&[
            ("rxpck/s", 2),
            ("txpck/s", 2),
            ("rxkB/s", 2),
            ("txkB/s", 2),
            ("rxcmp/s", 2),
            ("txcmp/s", 2),
            ("rxmcst/s", 2),
        ]),
    );
    let mut errors = Table::new(
        "net-edev",
        "IFACE",
        TableKind::Rate,
        columns(&[
            ("rxerr/s", 2),
            ("txerr/s", 2),
            ("coll/s", 2),
            ("rxdrop/s", 2),
            ("txdrop/s", 2),
        ]),
    );

    let zero = NetDevStats::default();
    for (pos, c) in curr.ifaces.iter().enumerate() {
        if c.is_free() {
            continue;
        }
        let p = match find_net_reference(c, &mut prev.ifaces, pos) {
            Some(i) => &prev.ifaces[i],
            None => &zero,
        };
        let rate = |a: u64, b: u64| span.rate(a, b);
        traffic.push(
            c.name.clone(),
            vec![
                rate(p.rx_packets, c.rx_packets),
                rate(p.tx_packets, c.tx_packets),
                rate(p.rx_bytes, c.rx_bytes) / 1024.0,
                rate(p.tx_bytes, c.tx_bytes) / 1024.0,
                rate(p.rx_compressed, c.rx_compressed),
                rate(p.tx_compressed, c.tx_compressed),
                rate(p.multicast, c.multicast),
            ],
        );
        errors.push(
            c.name.clone(),
            vec![
                rate(p.rx_errors, c.rx_errors),
                rate(p.tx_errors, c.tx_errors),
                rate(p.collisions, c.collisions),
                rate(p.rx_dropped, c.rx_dropped),
                rate(p.tx_dropped, c.tx_dropped),
            ],
        );
    }
    vec![traffic, errors]
}
