//! Exponentially decaying synaptic traces, advanced lazily between spikes.

use nestling_core::Time;
use serde::{Deserialize, Serialize};

/// How a spike increments a trace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BumpKind {
    /// `+= 1`
    Unit,
    /// `+= 1/tau` (low-pass filtered rate)
    RateCoded,
}

/// `value · exp(-dt/tau)`
#[inline]
pub fn decay(value: f64, dt: f64, tau: f64) -> f64 {
    debug_assert!(dt >= 0.0, "trace decay over negative interval {dt}");
    value * (-dt / tau).exp()
}

/// Single trace owned by one synapse
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Trace {
    pub value: f64,
    pub last_update: Time,
    pub tau: f64,
    pub bump: BumpKind,
}

impl Trace {
    pub fn new(tau: f64, bump: BumpKind) -> Self {
        Self {
            value: 0.0,
            last_update: 0.0,
            tau,
            bump,
        }
    }

    /// Decay to `t`
    pub fn advance_to(&mut self, t: Time) {
        self.value = decay(self.value, t - self.last_update, self.tau);
        self.last_update = t;
    }

    /// Value at `t` without mutating
    pub fn value_at(&self, t: Time) -> f64 {
        decay(self.value, t - self.last_update, self.tau)
    }

    pub fn increment(&mut self, multiplicity: u32) {
        let step = match self.bump {
            BumpKind::Unit => 1.0,
            BumpKind::RateCoded => 1.0 / self.tau,
        };
        for _ in 0..multiplicity {
            self.value += step;
        }
    }
}

/// Integrator phase for one synapse
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TracePhase {
    #[default]
    Idle,
    Decaying,
    Incremented,
}

/// Pre- and postsynaptic traces of one synapse (pair + triplet)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TraceSet {
    pub pre: Trace,
    pub pre_triplet: Trace,
    pub post: Trace,
    pub post_triplet: Trace,
    pub phase: TracePhase,
}

/// Presynaptic trace values frozen at the start of a coincident group
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PreSnapshot {
    pub pre: f64,
    pub pre_triplet: f64,
}

impl TraceSet {
    pub fn new(pre: Trace, pre_triplet: Trace, post: Trace, post_triplet: Trace) -> Self {
        Self {
            pre,
            pre_triplet,
            post,
            post_triplet,
            phase: TracePhase::Idle,
        }
    }

    /// Idle → Decaying: bring every trace to `t`
    pub fn begin(&mut self, t: Time) -> PreSnapshot {
        debug_assert_eq!(self.phase, TracePhase::Idle);
        self.phase = TracePhase::Decaying;
        self.pre.advance_to(t);
        self.pre_triplet.advance_to(t);
        self.post.advance_to(t);
        self.post_triplet.advance_to(t);
        PreSnapshot {
            pre: self.pre.value,
            pre_triplet: self.pre_triplet.value,
        }
    }

    pub fn bump_pre(&mut self) {
        debug_assert_ne!(self.phase, TracePhase::Idle);
        self.phase = TracePhase::Incremented;
        self.pre.increment(1);
        self.pre_triplet.increment(1);
    }

    pub fn bump_post(&mut self) {
        debug_assert_ne!(self.phase, TracePhase::Idle);
        self.phase = TracePhase::Incremented;
        self.post.increment(1);
        self.post_triplet.increment(1);
    }

    /// Back to Idle
    pub fn finish(&mut self) {
        self.phase = TracePhase::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decay_matches_closed_form() {
        let mut tr = Trace::new(20.0, BumpKind::Unit);
        tr.increment(1);
        tr.advance_to(20.0);
        assert!((tr.value - (-1.0f64).exp()).abs() < 1e-15);
    }

    #[test]
    fn test_lazy_decay_is_path_independent() {
        let mut a = Trace::new(10.0, BumpKind::Unit);
        let mut b = a;
        a.increment(1);
        b.increment(1);
        a.advance_to(30.0);
        b.advance_to(10.0);
        b.advance_to(30.0);
        assert!((a.value - b.value).abs() < 1e-15);
    }

    #[test]
    fn test_rate_coded_bump() {
        let mut tr = Trace::new(4.0, BumpKind::RateCoded);
        tr.increment(2);
        assert_eq!(tr.value, 0.5);
    }

    #[test]
    fn test_phase_cycle() {
        let t = Trace::new(1.0, BumpKind::Unit);
        let mut set = TraceSet::new(t, t, t, t);
        assert_eq!(set.phase, TracePhase::Idle);
        set.begin(1.0);
        assert_eq!(set.phase, TracePhase::Decaying);
        set.bump_pre();
        assert_eq!(set.phase, TracePhase::Incremented);
        set.finish();
        assert_eq!(set.phase, TracePhase::Idle);
    }
}
