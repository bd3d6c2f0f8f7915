//! Per-VP event queue keyed by arrival step.
//!
//! Events keep their exact (possibly off-grid) arrival time; the queue only uses
//! the grid to decide in which step they become due. Popping a step yields the
//! events in canonical order with coincident duplicates merged into a single
//! event carrying the summed multiplicity, so the result does not depend on
//! push order.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use nestling_core::{ConnectionId, NodeId, Step, Time, TimeGrid};
use serde::{Deserialize, Serialize};

use crate::delay::Delay;

/// What the event means to the receiving synapse.
///
/// The derived order is the tie-break inside a coincident group: presynaptic
/// spikes first, then back-propagated postsynaptic spikes, then dopamine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EventKind {
    /// Presynaptic spike reaching the synapse (and the target soma)
    Pre,
    /// Postsynaptic spike back-propagated to the synapse
    Post,
    /// Volume-transmitter broadcast
    Dopamine,
}

/// Spike as seen by one connection
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpikeEvent {
    pub source: NodeId,
    pub target: NodeId,
    pub connection: ConnectionId,
    /// Synapse-local arrival time (ms)
    pub time: Time,
    pub multiplicity: u32,
    pub port: usize,
    pub kind: EventKind,
}

impl SpikeEvent {
    fn canonical_cmp(&self, other: &Self) -> Ordering {
        self.connection
            .cmp(&other.connection)
            .then(self.time.total_cmp(&other.time))
            .then(self.kind.cmp(&other.kind))
            .then(self.source.cmp(&other.source))
    }
}

/// Synapse-local arrival time of a spike emitted at `emitted`.
///
/// Synapse time is measured in the frame of delivery to the target soma, so
/// every stream carries one extra dendritic delay on top of its physical
/// arrival at the synapse:
/// - presynaptic spikes reach the synapse after `axonal`, the soma after `axonal + dendritic`;
/// - postsynaptic spikes reach the synapse after `dendritic`, stamped `2·dendritic`;
/// - dopamine reaches the synapse when the volume transmitter receives it.
///
/// The pairing interval is then `(t_post + dendritic) − (t_pre + axonal)`.
pub fn arrival_time(emitted: Time, delay: &Delay, kind: EventKind) -> Time {
    match kind {
        EventKind::Pre => emitted + delay.total(),
        EventKind::Post => emitted + 2.0 * delay.dendritic,
        EventKind::Dopamine => emitted + delay.dendritic,
    }
}

/// Spike timestamp semantics of a source node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TimingMode {
    /// Times are rounded up to the next resolution step
    #[default]
    Grid,
    /// Exact sub-step times are kept
    OffGrid,
}

impl TimingMode {
    pub fn from_flag(precise: bool) -> Self {
        if precise {
            Self::OffGrid
        } else {
            Self::Grid
        }
    }

    pub fn stamp(&self, grid: &TimeGrid, t: Time) -> Time {
        match self {
            Self::Grid => grid.ceil_time(t),
            Self::OffGrid => t,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EventQueue {
    grid: TimeGrid,
    buckets: BTreeMap<Step, Vec<SpikeEvent>>,
    len: usize,
}

impl EventQueue {
    pub fn new(grid: TimeGrid) -> Self {
        Self {
            grid,
            buckets: BTreeMap::new(),
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Step at which `event` will be delivered
    pub fn due_step(&self, event: &SpikeEvent) -> Step {
        self.grid.ceil_step(event.time)
    }

    pub fn push(&mut self, mut event: SpikeEvent) {
        event.time = self.grid.snap(event.time);
        let step = self.due_step(&event);
        self.buckets.entry(step).or_default().push(event);
        self.len += 1;
    }

    /// Remove every event due at or before `step`, canonically ordered and merged.
    pub fn pop_due(&mut self, step: Step) -> Vec<SpikeEvent> {
        let later = self.buckets.split_off(&(step + 1));
        let due = std::mem::replace(&mut self.buckets, later);

        let mut events: Vec<SpikeEvent> = due.into_values().flatten().collect();
        self.len -= events.len();
        events.sort_by(SpikeEvent::canonical_cmp);

        let mut merged: Vec<SpikeEvent> = Vec::with_capacity(events.len());
        for ev in events {
            match merged.last_mut() {
                Some(last)
                    if last.connection == ev.connection
                        && last.kind == ev.kind
                        && self.grid.same_instant(last.time, ev.time) =>
                {
                    last.multiplicity = last.multiplicity.saturating_add(ev.multiplicity);
                }
                _ => merged.push(ev),
            }
        }
        merged
    }

    pub fn clear(&mut self) {
        self.buckets.clear();
        self.len = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ev(conn: usize, time: Time, kind: EventKind) -> SpikeEvent {
        SpikeEvent {
            source: 1,
            target: 2,
            connection: ConnectionId(conn),
            time,
            multiplicity: 1,
            port: 0,
            kind,
        }
    }

    #[test]
    fn test_pop_due_orders_and_merges() {
        let grid = TimeGrid::new(0.1).unwrap();
        let mut q = EventQueue::new(grid);
        q.push(ev(1, 1.0, EventKind::Post));
        q.push(ev(0, 1.0, EventKind::Pre));
        q.push(ev(1, 1.0, EventKind::Pre));
        q.push(ev(1, 0.1 * 10.0, EventKind::Pre));
        q.push(ev(0, 1.05, EventKind::Pre));
        assert_eq!(q.len(), 5);

        assert!(q.pop_due(9).is_empty());
        let due = q.pop_due(10);
        assert_eq!(due.len(), 3);
        assert_eq!(due[0].connection, ConnectionId(0));
        assert_eq!(due[1].kind, EventKind::Pre);
        assert_eq!(due[1].multiplicity, 2);
        assert_eq!(due[2].kind, EventKind::Post);

        let due = q.pop_due(11);
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].time, 1.05);
        assert!(q.is_empty());
    }

    #[test]
    fn test_push_order_does_not_matter() {
        let grid = TimeGrid::new(0.1).unwrap();
        let events = [
            ev(3, 0.25, EventKind::Pre),
            ev(3, 0.22, EventKind::Post),
            ev(1, 0.3, EventKind::Dopamine),
        ];
        let mut a = EventQueue::new(grid);
        let mut b = EventQueue::new(grid);
        for e in events.iter() {
            a.push(*e);
        }
        for e in events.iter().rev() {
            b.push(*e);
        }
        assert_eq!(a.pop_due(3), b.pop_due(3));
    }

    #[test]
    fn test_arrival_time() {
        let d = Delay::split(2.0, 3.0);
        assert_eq!(arrival_time(10.0, &d, EventKind::Pre), 15.0);
        assert_eq!(arrival_time(10.0, &d, EventKind::Post), 16.0);
        assert_eq!(arrival_time(10.0, &d, EventKind::Dopamine), 13.0);

        // pre reaches the synapse at 12, post at 14
        let pre = arrival_time(10.0, &d, EventKind::Pre);
        let post = arrival_time(11.0, &d, EventKind::Post);
        assert_eq!(post - pre, (11.0 + 3.0) - (10.0 + 2.0));
    }

    #[test]
    fn test_merge_saturates_multiplicity() {
        let grid = TimeGrid::new(0.1).unwrap();
        let mut q = EventQueue::new(grid);
        for _ in 0..2 {
            let mut e = ev(0, 1.0, EventKind::Pre);
            e.multiplicity = u32::MAX - 1;
            q.push(e);
        }
        let due = q.pop_due(10);
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].multiplicity, u32::MAX);
    }

    #[test]
    fn test_grid_stamp() {
        let grid = TimeGrid::new(0.1).unwrap();
        assert!((TimingMode::Grid.stamp(&grid, 1.03) - 1.1).abs() < 1e-12);
        assert_eq!(TimingMode::OffGrid.stamp(&grid, 1.03), 1.03);
    }
}
