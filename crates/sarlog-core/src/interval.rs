//! Elapsed time between two samples, in clock ticks.
//!
//! Uptime (the sum of every CPU mode counter) is the time base rather than the
//! wall clock, so clock adjustments between two samples do not skew rates.

use crate::storage::model::{CpuStats, StatRecord};

/// Ticks elapsed between two uptime readings.
///
/// A zero `prev` means "since boot": the interval is `curr` itself. Otherwise
/// the difference is masked to 32 bits. The result is never 0.
pub fn get_interval(prev_uptime: u64, curr_uptime: u64) -> u64 {
    let itv = if prev_uptime == 0 {
        curr_uptime
    } else {
        curr_uptime.wrapping_sub(prev_uptime) & 0xFFFF_FFFF
    };
    itv.max(1)
}

/// Interval of one CPU row, from the row's own mode counters.
///
/// Returns 0 when the row did not advance, meaning the CPU is offline (or was
/// never seen online). Callers display such a CPU as all zeros.
pub fn per_cpu_interval(prev: &CpuStats, curr: &CpuStats) -> u64 {
    let prev_ticks = prev.total_ticks();
    let curr_ticks = curr.total_ticks();
    if curr_ticks < prev_ticks {
        // Counters went backwards: treat the CPU as freshly started.
        return curr_ticks;
    }
    curr_ticks - prev_ticks
}

/// Both interval flavours of one sample pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Intervals {
    /// Uptime summed over all processors; scales CPU-summed counters.
    pub global: u64,
    /// Uptime of a single processor; scales everything else (disks, IRQs...).
    pub per_processor: u64,
}

impl Intervals {
    pub fn between(prev: &StatRecord, curr: &StatRecord) -> Self {
        Self {
            global: get_interval(prev.uptime, curr.uptime),
            per_processor: get_interval(prev.uptime0, curr.uptime0),
        }
    }

    /// Length of the interval in seconds.
    pub fn seconds(&self, hz: u32) -> f64 {
        self.per_processor as f64 / hz.max(1) as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interval_floor_is_one() {
        for x in [0u64, 1, 12_345, 0xFFFF_FFFF, u64::MAX] {
            assert_eq!(get_interval(x, x), 1, "interval({x}, {x})");
        }
    }

    #[test]
    fn test_since_boot_interval() {
        for u in [1u64, 100, 987_654_321, 0x1_0000_0005] {
            assert_eq!(get_interval(0, u), u);
        }
    }

    #[test]
    fn test_interval_masks_to_32_bits() {
        assert_eq!(get_interval(1000, 1500), 500);
        assert_eq!(get_interval(0xFFFF_FFF0, 0x1_0000_0010), 0x20);
        // Wrapped uptime still yields the small forward step.
        assert_eq!(get_interval(0xFFFF_FFF0, 0x10), 0x20);
    }

    #[test]
    fn test_per_cpu_interval() {
        let prev = CpuStats {
            user: 100,
            system: 50,
            idle: 850,
            ..Default::default()
        };
        let curr = CpuStats {
            user: 110,
            system: 55,
            idle: 935,
            guest: 3,
            ..Default::default()
        };
        assert_eq!(per_cpu_interval(&prev, &curr), 100);
        assert_eq!(per_cpu_interval(&curr, &curr), 0);
        assert_eq!(per_cpu_interval(&curr, &prev), prev.total_ticks());
    }

    #[test]
    fn test_intervals_between() {
        let prev = StatRecord {
            uptime: 4000,
            uptime0: 1000,
            ..Default::default()
        };
        let curr = StatRecord {
            uptime: 8000,
            uptime0: 2000,
            ..Default::default()
        };
        let itv = Intervals::between(&prev, &curr);
        assert_eq!(itv.global, 4000);
        assert_eq!(itv.per_processor, 1000);
        assert!((itv.seconds(100) - 10.0).abs() < 1e-9);
    }
}
