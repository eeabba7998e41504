//! Matching variable-cardinality entities between two samples.
//!
//! Disks, interfaces and interrupts can appear, disappear or be re-registered
//! between two collection ticks. Before a rate is computed for an entity of the
//! current sample, the entity is located in the reference sample (the previous
//! or first tick). When the reference holds stale data for it, the reference
//! entry is reset so the next rate starts from zero instead of going negative.

use crate::storage::model::{DiskStats, IrqCpuStats, NetDevStats};

// ---------------------------------------------------------------------------
// Disks
// ---------------------------------------------------------------------------

fn disk_decreased(reference: &DiskStats, current: &DiskStats) -> bool {
    reference.nr_ios > current.nr_ios
        || reference.rd_sect > current.rd_sect
        || reference.wr_sect > current.wr_sect
        || reference.rd_ticks > current.rd_ticks
        || reference.wr_ticks > current.wr_ticks
        || reference.tot_ticks > current.tot_ticks
        || reference.rq_ticks > current.rq_ticks
}

/// Locates `disk` (found at `pos` in the current sample) in `reference`.
///
/// 1. Same `(major, minor)`: returned as is, or reset to zero (key kept) when
///    any counter decreased, meaning the device was unregistered and
///    registered again.
/// 2. Otherwise the first free slot is claimed for the key.
/// 3. Otherwise the slot at `pos` is reset and reused.
///
/// Returns `None` only when `reference` has no room at all.
pub fn find_disk_reference(
    disk: &DiskStats,
    reference: &mut [DiskStats],
    pos: usize,
) -> Option<usize> {
    if let Some(i) = reference.iter().position(|r| r.key() == disk.key()) {
        if disk_decreased(&reference[i], disk) {
            reference[i].reset_to(disk.major, disk.minor);
        }
        return Some(i);
    }
    let i = reference
        .iter()
        .position(DiskStats::is_free)
        .or_else(|| (pos < reference.len()).then_some(pos))?;
    reference[i].reset_to(disk.major, disk.minor);
    Some(i)
}

// ---------------------------------------------------------------------------
// Network interfaces
// ---------------------------------------------------------------------------

/// Half the range of the counter width `prev` fits in.
fn half_range(prev: u64) -> u64 {
    if prev <= u32::MAX as u64 {
        (u32::MAX >> 1) as u64
    } else {
        u64::MAX >> 1
    }
}

/// One counter went down while its companion went up, and the counter that
/// went down was above half its range: it wrapped.
fn pair_wrapped(prev_a: u64, curr_a: u64, prev_b: u64, curr_b: u64) -> bool {
    (curr_a < prev_a && curr_b > prev_b && prev_a > half_range(prev_a))
        || (curr_b < prev_b && curr_a > prev_a && prev_b > half_range(prev_b))
}

/// Whether an apparent decrease of `curr` against `prev` is counter overflow
/// rather than the interface having been unregistered.
///
/// Heuristic: bytes decreased while packets increased (or the reverse), in
/// either direction, with the decreased counter previously above half its
/// range. This is a best-effort classification; a re-registered interface
/// whose counters happen to match the pattern is taken for an overflow.
pub fn net_counter_overflow(prev: &NetDevStats, curr: &NetDevStats) -> bool {
    pair_wrapped(prev.rx_bytes, curr.rx_bytes, prev.rx_packets, curr.rx_packets)
        || pair_wrapped(prev.tx_bytes, curr.tx_bytes, prev.tx_packets, curr.tx_packets)
}

fn net_decreased(reference: &NetDevStats, current: &NetDevStats) -> bool {
    reference.rx_packets > current.rx_packets
        || reference.tx_packets > current.tx_packets
        || reference.rx_bytes > current.rx_bytes
        || reference.tx_bytes > current.tx_bytes
        || reference.rx_compressed > current.rx_compressed
        || reference.tx_compressed > current.tx_compressed
        || reference.multicast > current.multicast
        || reference.rx_errors > current.rx_errors
        || reference.tx_errors > current.tx_errors
        || reference.collisions > current.collisions
        || reference.rx_dropped > current.rx_dropped
        || reference.tx_dropped > current.tx_dropped
}

/// Locates `iface` (found at `pos` in the current sample) in `reference`.
///
/// Same rules as [`find_disk_reference`], keyed by name, except that a
/// decrease explained by [`net_counter_overflow`] does not reset the entry.
pub fn find_net_reference(
    iface: &NetDevStats,
    reference: &mut [NetDevStats],
    pos: usize,
) -> Option<usize> {
    if let Some(i) = reference.iter().position(|r| r.name == iface.name) {
        let stale = &reference[i];
        if net_decreased(stale, iface) && !net_counter_overflow(stale, iface) {
            reference[i].reset_to(&iface.name);
        }
        return Some(i);
    }
    let i = reference
        .iter()
        .position(NetDevStats::is_free)
        .or_else(|| (pos < reference.len()).then_some(pos))?;
    reference[i].reset_to(&iface.name);
    Some(i)
}

// ---------------------------------------------------------------------------
// Per-CPU interrupts
// ---------------------------------------------------------------------------

/// Locates IRQ `irq` (found at `pos` in one CPU row of the current sample) in
/// the same CPU row of the reference sample.
///
/// The IRQ list may shift by one when an interrupt source appears or goes
/// away, so `pos`, then `pos - 1`, then `pos + 1` are tried. Free slots never
/// match. `None` means the IRQ was not present before.
pub fn find_irqcpu_reference(irq: u32, pos: usize, reference: &[IrqCpuStats]) -> Option<usize> {
    let wanted = IrqCpuStats {
        irq,
        interrupts: 0,
    };
    if wanted.is_free() {
        return None;
    }
    [Some(pos), pos.checked_sub(1), pos.checked_add(1)]
        .into_iter()
        .flatten()
        .find(|&j| reference.get(j).is_some_and(|r| r.irq == irq))
}
