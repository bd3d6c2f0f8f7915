//! Membrane-potential history of voltage-archiving targets.

use std::collections::VecDeque;

use nestling_core::Time;

use crate::rules::VoltageSample;

/// Per-step voltage samples, oldest first
#[derive(Debug, Clone, Default)]
pub struct VoltageArchive {
    entries: VecDeque<(Time, VoltageSample)>,
}

impl VoltageArchive {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Append a sample. Times must be non-decreasing.
    pub fn push(&mut self, t: Time, sample: VoltageSample) {
        debug_assert!(self.entries.back().map_or(true, |(last, _)| *last <= t));
        self.entries.push_back((t, sample));
    }

    /// Samples with `t0 < t <= t1`
    pub fn range(&self, t0: Time, t1: Time) -> impl Iterator<Item = &(Time, VoltageSample)> {
        self.entries.iter().filter(move |(t, _)| *t > t0 && *t <= t1)
    }

    /// Most recent sample taken at or before `t`
    pub fn sample_at(&self, t: Time) -> Option<VoltageSample> {
        self.entries
            .iter()
            .rev()
            .find(|(ts, _)| *ts <= t)
            .map(|(_, s)| *s)
    }

    /// Drop samples no reader needs any more, keeping the newest one at or before `t`.
    pub fn prune_before(&mut self, t: Time) {
        while self.entries.len() > 1 && self.entries[1].0 <= t {
            self.entries.pop_front();
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
