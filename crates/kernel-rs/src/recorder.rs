//! Weight recorder device.

use std::collections::BTreeSet;

use nestling_core::{ConnectionId, NodeId, Result, Time};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::node::merge_json;

/// One transmitted weight
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeightEvent {
    pub sender: NodeId,
    pub target: NodeId,
    pub port: usize,
    pub time: Time,
    pub weight: f64,
    #[serde(skip)]
    pub connection: Option<ConnectionId>,
}

impl WeightEvent {
    /// Merge order: time, then sender/target pair, then connection
    fn sort_key(&self) -> (Time, NodeId, NodeId, Option<ConnectionId>) {
        (self.time, self.sender, self.target, self.connection)
    }
}

/// Sender / target filters. Empty means "record everything".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RecorderFilter {
    pub senders: Vec<NodeId>,
    pub targets: Vec<NodeId>,
}

#[derive(Debug, Clone, Default)]
pub struct WeightRecorder {
    filter: RecorderFilter,
    senders: BTreeSet<NodeId>,
    targets: BTreeSet<NodeId>,
    events: Vec<WeightEvent>,
}

impl WeightRecorder {
    pub fn accepts(&self, sender: NodeId, target: NodeId) -> bool {
        (self.senders.is_empty() || self.senders.contains(&sender))
            && (self.targets.is_empty() || self.targets.contains(&target))
    }

    /// Append events collected by the virtual processes during one slice.
    pub fn extend_sorted(&mut self, mut batch: Vec<WeightEvent>) {
        batch.retain(|ev| self.accepts(ev.sender, ev.target));
        batch.sort_by(|a, b| {
            let (ta, sa, ga, ca) = a.sort_key();
            let (tb, sb, gb, cb) = b.sort_key();
            ta.total_cmp(&tb)
                .then(sa.cmp(&sb))
                .then(ga.cmp(&gb))
                .then(ca.cmp(&cb))
        });
        self.events.extend(batch);
    }

    pub fn events(&self) -> &[WeightEvent] {
        &self.events
    }

    pub fn n_events(&self) -> usize {
        self.events.len()
    }

    pub fn clear_events(&mut self) {
        self.events.clear();
    }

    pub fn status(&self) -> Value {
        let mut status = serde_json::to_value(&self.filter).unwrap_or(Value::Null);
        if let Some(obj) = status.as_object_mut() {
            obj.insert("n_events".into(), self.events.len().into());
        }
        status
    }

    pub fn set_status(&mut self, updates: &Value) -> Result<()> {
        let mut updates = updates.clone();
        let clear = updates
            .as_object_mut()
            .and_then(|obj| obj.remove("n_events"))
            .and_then(|v| v.as_u64())
            == Some(0);
        let filter: RecorderFilter = merge_json("weight_recorder", &self.filter, &updates)?;
        self.senders = filter.senders.iter().copied().collect();
        self.targets = filter.targets.iter().copied().collect();
        self.filter = filter;
        if clear {
            self.events.clear();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ev(sender: NodeId, target: NodeId, time: Time) -> WeightEvent {
        WeightEvent {
            sender,
            target,
            port: 0,
            time,
            weight: 1.0,
            connection: None,
        }
    }

    #[test]
    fn test_filters() {
        let mut rec = WeightRecorder::default();
        rec.set_status(&json!({"senders": [1], "targets": [3]})).unwrap();
        rec.extend_sorted(vec![ev(1, 3, 1.0), ev(2, 3, 1.0), ev(1, 4, 1.0)]);
        assert_eq!(rec.n_events(), 1);
        assert_eq!(rec.events()[0].sender, 1);
    }

    #[test]
    fn test_batches_are_time_ordered() {
        let mut rec = WeightRecorder::default();
        rec.extend_sorted(vec![ev(2, 5, 3.0), ev(1, 5, 3.0), ev(7, 5, 1.0)]);
        let order: Vec<_> = rec.events().iter().map(|e| (e.time, e.sender)).collect();
        assert_eq!(order, vec![(1.0, 7), (3.0, 1), (3.0, 2)]);
    }

    #[test]
    fn test_reset_events() {
        let mut rec = WeightRecorder::default();
        rec.extend_sorted(vec![ev(1, 2, 1.0)]);
        rec.set_status(&json!({"n_events": 0})).unwrap();
        assert_eq!(rec.n_events(), 0);
        assert!(rec.set_status(&json!({"interval": 1.0})).is_err());
    }
}
