//! Rotating sample buffers.
//!
//! Two slots alternate as current/previous; an optional third slot keeps the
//! first sample of a continuous series so averages can be computed against it.
//! All slots are resized together so an index means the same entity in each.

use super::model::{DomainCounts, Sample};

const REFERENCE: usize = 2;

#[derive(Debug)]
pub struct SampleSlots {
    slots: Vec<Sample>,
    curr: usize,
}

impl SampleSlots {
    /// Allocates two slots, or three when `with_reference` is set.
    pub fn new(counts: &DomainCounts, with_reference: bool) -> Self {
        let n = if with_reference { 3 } else { 2 };
        Self {
            slots: (0..n).map(|_| Sample::with_counts(counts)).collect(),
            curr: 0,
        }
    }

    pub fn current(&self) -> &Sample {
        &self.slots[self.curr]
    }

    pub fn previous(&self) -> &Sample {
        &self.slots[self.curr ^ 1]
    }

    pub fn reference(&self) -> Option<&Sample> {
        self.slots.get(REFERENCE)
    }

    pub fn current_mut(&mut self) -> &mut Sample {
        &mut self.slots[self.curr]
    }

    pub fn previous_mut(&mut self) -> &mut Sample {
        &mut self.slots[self.curr ^ 1]
    }

    /// Previous slot (mutable, for reconciliation) alongside the current one.
    pub fn pair_mut(&mut self) -> (&mut Sample, &Sample) {
        let (first, second) = self.slots.split_at_mut(1);
        if self.curr == 0 {
            (&mut second[0], &first[0])
        } else {
            (&mut first[0], &second[0])
        }
    }

    /// Reference slot (mutable, for reconciliation) alongside the current one.
    pub fn average_pair_mut(&mut self) -> Option<(&mut Sample, &Sample)> {
        if self.slots.len() <= REFERENCE {
            return None;
        }
        let (live, reference) = self.slots.split_at_mut(REFERENCE);
        Some((&mut reference[0], &live[self.curr]))
    }

    /// Makes the current slot the previous one.
    pub fn flip(&mut self) {
        self.curr ^= 1;
    }

    /// Copies the current sample into the reference slot.
    pub fn snapshot_reference(&mut self) {
        if self.slots.len() > REFERENCE {
            let current = self.slots[self.curr].clone();
            self.slots[REFERENCE] = current;
        }
    }

    /// Readies the current slot for collection.
    ///
    /// Every domain is zeroed except per-CPU rows, which start from the
    /// previous values: a CPU that is offline this tick keeps its last known
    /// counters instead of dropping to zero.
    pub fn prepare_current(&mut self) {
        let cpus = self.previous().cpus.clone();
        let curr = self.current_mut();
        curr.reset_keep_cpus();
        curr.cpus.clone_from(&cpus);
    }

    /// Zeroes the previous slot, used for "since boot" computations.
    pub fn clear_previous(&mut self) {
        self.previous_mut().clear();
    }

    /// Resizes every slot in lockstep.
    pub fn resize(&mut self, counts: &DomainCounts) {
        for slot in &mut self.slots {
            slot.resize(counts);
        }
    }

    pub fn counts(&self) -> DomainCounts {
        self.current().counts()
    }

    pub fn has_reference(&self) -> bool {
        self.slots.len() > REFERENCE
    }
}
