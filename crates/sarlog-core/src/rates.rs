//! Counter arithmetic: rates and percentages derived from two readings of a
//! cumulative kernel counter.
//!
//! This module is the single place where counter differences are taken. Every
//! report computation goes through these helpers so that wraparound and
//! interval handling stay consistent.

// ---------------------------------------------------------------------------
// Deltas
// ---------------------------------------------------------------------------

/// Largest value of a counter the kernel historically exposed as 32 bits.
pub const U32_RANGE: u64 = 0xFFFF_FFFF;

/// Plain difference. A decrease yields zero.
pub fn delta(prev: u64, curr: u64) -> u64 {
    curr.saturating_sub(prev)
}

/// Difference of a counter that may have wrapped at 32 bits.
///
/// - `curr >= prev`: plain difference.
/// - `curr < prev <= 0xFFFF_FFFF`: the counter wrapped, the result is
///   `(curr - prev) mod 2^32`.
/// - `curr < prev` with `prev` beyond 32 bits: a transient bad read, the
///   result is 0.
pub fn delta_wrap32(prev: u64, curr: u64) -> u64 {
    if curr >= prev {
        curr - prev
    } else if prev <= U32_RANGE {
        curr.wrapping_sub(prev) & U32_RANGE
    } else {
        0
    }
}

/// Interval floored at one tick so divisions stay defined.
fn floor_itv(itv: u64) -> f64 {
    itv.max(1) as f64
}

// ---------------------------------------------------------------------------
// Rates
// ---------------------------------------------------------------------------

/// Per-second rate of a counter over `itv` ticks at `hz` ticks per second.
pub fn s_value(prev: u64, curr: u64, itv: u64, hz: u32) -> f64 {
    delta_wrap32(prev, curr) as f64 / floor_itv(itv) * hz as f64
}

/// Percentage of `itv` spent in a counter, without wraparound correction.
pub fn sp_value(prev: u64, curr: u64, itv: u64) -> f64 {
    delta(prev, curr) as f64 / floor_itv(itv) * 100.0
}

/// Percentage of `itv` spent in a counter, with 32-bit wraparound correction.
///
/// Used for CPU tick counters. A decrease beyond the 32-bit range reads as 0.
pub fn ll_sp_value(prev: u64, curr: u64, itv: u64) -> f64 {
    delta_wrap32(prev, curr) as f64 / floor_itv(itv) * 100.0
}

/// Ratio of two deltas, 0 when the denominator did not move.
pub fn per_event(numerator: u64, events: u64) -> f64 {
    if events == 0 {
        0.0
    } else {
        numerator as f64 / events as f64
    }
}

// ---------------------------------------------------------------------------
// Display rounding
// ---------------------------------------------------------------------------

/// Rounds to two decimals, the precision every report prints.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Rounds a set of percentages that partition one interval so the printed
/// values add up to exactly 100.00.
///
/// Every bucket but the last is rounded independently; the last bucket
/// receives the remainder, floored at zero. Works for any number of buckets.
pub fn spread_to_hundred(values: &mut [f64]) {
    let Some((last, others)) = values.split_last_mut() else {
        return;
    };
    let mut sum = 0.0;
    for v in others.iter_mut() {
        *v = round2(*v);
        sum += *v;
    }
    *last = round2((100.0 - sum).max(0.0));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_delta_wraps_at_32_bits() {
        // Wrap from near u32::MAX back to a small value.
        assert_eq!(delta_wrap32(0xFFFF_FFF0, 0x10), 0x20);
        assert_eq!(delta_wrap32(U32_RANGE, 0), 1);
        for (prev, curr) in [(100u64, 5u64), (0xFFFF_FFFF, 0xFFFF_FFFE), (7, 0)] {
            let expected = (curr as u32).wrapping_sub(prev as u32) as u64;
            assert_eq!(delta_wrap32(prev, curr), expected, "{prev} -> {curr}");
        }
    }

    #[test]
    fn test_delta_decrease_beyond_32_bits_is_zero() {
        assert_eq!(delta_wrap32(0x1_0000_0000, 5), 0);
        assert_eq!(delta_wrap32(u64::MAX, 0), 0);
        assert_eq!(ll_sp_value(0x1_0000_0005, 0x1_0000_0000, 100), 0.0);
    }

    #[test]
    fn test_plain_delta() {
        assert_eq!(delta(10, 25), 15);
        assert_eq!(delta(25, 10), 0);
        assert_eq!(delta_wrap32(10, 25), 15);
    }

    #[test]
    fn test_zero_interval_does_not_divide_by_zero() {
        assert!(approx(s_value(0, 50, 0, 100), 5000.0));
        assert!(approx(sp_value(0, 1, 0), 100.0));
        assert!(s_value(0, 0, 0, 100).is_finite());
    }

    #[test]
    fn test_rate_scaling() {
        // 250 events over 500 ticks at HZ=100 is 5 seconds: 50/s.
        assert!(approx(s_value(1000, 1250, 500, 100), 50.0));
        assert!(approx(ll_sp_value(1000, 1100, 1000), 10.0));
        assert!(approx(per_event(30, 0), 0.0));
        assert!(approx(per_event(30, 4), 7.5));
    }

    #[test]
    fn test_spread_to_hundred_sums_exactly() {
        let mut v = [33.333, 33.333, 33.334];
        spread_to_hundred(&mut v);
        assert!(approx(v[0], 33.33));
        assert!(approx(v[1], 33.33));
        assert!(approx(v[2], 33.34));
        assert!(approx(v.iter().sum::<f64>(), 100.0));
    }

    #[test]
    fn test_spread_to_hundred_floors_last_bucket() {
        let mut v = [60.006, 40.006, 0.0];
        spread_to_hundred(&mut v);
        assert!(approx(v[2], 0.0));

        let mut empty: [f64; 0] = [];
        spread_to_hundred(&mut empty);
    }
}
