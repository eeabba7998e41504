//! Selection of CPUs or IRQs to report on.

use std::collections::BTreeSet;
use std::str::FromStr;

use crate::storage::model::{NR_CPUS_MAX, NR_IRQS_MAX};

/// Highest CPU or IRQ number a selection may name.
pub const SELECTION_MAX: u32 = if NR_CPUS_MAX > NR_IRQS_MAX {
    NR_CPUS_MAX
} else {
    NR_IRQS_MAX
} - 1;

/// A set of CPU or IRQ numbers, or every one of them.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum Selection {
    #[default]
    All,
    Only(BTreeSet<u32>),
}

impl Selection {
    pub fn contains(&self, n: u32) -> bool {
        match self {
            Selection::All => true,
            Selection::Only(set) => set.contains(&n),
        }
    }

    pub fn is_all(&self) -> bool {
        matches!(self, Selection::All)
    }
}

impl FromStr for Selection {
    type Err = String;

    /// Parses `ALL` or a comma-separated list of numbers and ranges, e.g.
    /// `0,2-3`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("all") {
            return Ok(Selection::All);
        }
        let number = |t: &str| {
            let n = t
                .trim()
                .parse::<u32>()
                .map_err(|_| format!("invalid number {:?} in {:?}", t, s))?;
            if n > SELECTION_MAX {
                return Err(format!("{} is above the maximum of {}", n, SELECTION_MAX));
            }
            Ok(n)
        };

        let mut set = BTreeSet::new();
        for part in s.split(',') {
            match part.split_once('-') {
                Some((lo, hi)) => {
                    let (lo, hi) = (number(lo)?, number(hi)?);
                    if lo > hi {
                        return Err(format!("empty range {:?}", part));
                    }
                    set.extend(lo..=hi);
                }
                None => {
                    set.insert(number(part)?);
                }
            }
        }
        Ok(Selection::Only(set))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_all() {
        assert_eq!("ALL".parse::<Selection>().unwrap(), Selection::All);
        assert!(Selection::default().contains(4096));
    }

    #[test]
    fn test_parse_list_and_ranges() {
        let sel: Selection = "0,2-4,9".parse().unwrap();
        for n in [0, 2, 3, 4, 9] {
            assert!(sel.contains(n), "{n}");
        }
        for n in [1, 5, 8, 10] {
            assert!(!sel.contains(n), "{n}");
        }
        assert!(!sel.is_all());
    }

    #[test]
    fn test_parse_errors() {
        assert!("x".parse::<Selection>().is_err());
        assert!("3-1".parse::<Selection>().is_err());
        assert!("1,".parse::<Selection>().is_err());
    }

    #[test]
    fn test_numbers_above_maximum_rejected() {
        assert!("0-4000000000".parse::<Selection>().is_err());
        assert!(format!("{}", SELECTION_MAX + 1).parse::<Selection>().is_err());
        let sel: Selection = format!("0-{}", SELECTION_MAX).parse().unwrap();
        assert!(sel.contains(SELECTION_MAX));
    }
}
