//! Per-connection plasticity state and coincident-group processing.
//!
//! A synapse sees three event streams in its own (synapse-local) clock:
//! presynaptic spikes, back-propagated postsynaptic spikes and dopamine
//! broadcasts. The clock runs in the soma-delivery frame, one dendritic delay
//! behind the physical synapse: a presynaptic spike is stamped
//! `t_pre + axonal + dendritic`, a postsynaptic one `t_post + 2·dendritic`.
//! Events with the same timestamp are handled together as one
//! group, in a fixed order that does not depend on how they were delivered:
//!
//! 1. every trace decays to the group time and the presynaptic traces are frozen;
//! 2. each presynaptic spike depresses and then bumps the presynaptic traces;
//! 3. each postsynaptic spike facilitates against the *frozen* presynaptic
//!    traces, so a coincident pre/post pair never changes the weight;
//! 4. dopamine spikes raise the dopamine concentration.

use std::collections::HashMap;

use nestling_core::{ensure_non_negative, ConnectionId, KernelError, NodeId, Result, Time, TimeGrid};
use serde::{Deserialize, Serialize};

use crate::archive::VoltageArchive;
use crate::delay::{self, Delay, DelayKind, DelaySpec, DelaySteps};
use crate::rules::{dopamine_weight_drift, PairingTraces, SynapseModel};
use crate::trace::TraceSet;

/// Multiplicities of the events sharing one timestamp
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GroupCounts {
    pub pre: u32,
    pub post: u32,
    pub dopamine: u32,
}

/// Plastic state of one connection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Synapse {
    pub model: SynapseModel,
    pub weight: f64,
    pub traces: TraceSet,
    /// Eligibility trace (dopamine rule)
    pub c: f64,
    /// Dopamine concentration (dopamine rule)
    pub n: f64,
    /// Synapse-local time of the last processed group
    pub t_last: Time,
}

impl Synapse {
    pub fn new(model: SynapseModel, weight: f64) -> Self {
        let weight = if model.is_plastic() {
            model.clamp_weight(weight)
        } else {
            weight
        };
        Self {
            traces: model.trace_set(),
            model,
            weight,
            c: 0.0,
            n: 0.0,
            t_last: 0.0,
        }
    }

    /// Process every event at synapse-local time `t`.
    ///
    /// `archive` is the voltage history of the target (Clopath only) and
    /// `dendritic_delay` maps archive times onto the synapse clock.
    /// Returns the weight transmitted to the target when presynaptic spikes were
    /// part of the group.
    pub fn process_group(
        &mut self,
        t: Time,
        counts: GroupCounts,
        archive: Option<&VoltageArchive>,
        dendritic_delay: f64,
        resolution: f64,
    ) -> Option<f64> {
        debug_assert!(t >= self.t_last, "synapse event at {t} before {}", self.t_last);

        if let SynapseModel::StdpDopamine(p) = &self.model {
            let minus_dt = self.t_last - t;
            self.weight = self
                .model
                .clamp_weight(self.weight + dopamine_weight_drift(p, self.c, self.n, minus_dt));
            self.c *= (minus_dt / p.tau_c).exp();
            self.n *= (minus_dt / p.tau_n).exp();
        }

        if let (SynapseModel::Clopath(p), Some(archive)) = (&self.model, archive) {
            if counts.pre > 0 {
                let from = self.t_last - dendritic_delay;
                let to = t - dendritic_delay;
                for (ts, sample) in archive.range(from, to) {
                    let x_bar = self.traces.pre.value_at(ts + dendritic_delay);
                    let dw = p.ltp_increment(sample, resolution) * x_bar;
                    self.weight = (self.weight + dw).min(p.w_max);
                }
            }
        }

        let frozen = self.traces.begin(t);

        for _ in 0..counts.pre {
            match &self.model {
                SynapseModel::StdpDopamine(p) => self.c -= p.a_minus * self.traces.post.value,
                SynapseModel::Clopath(p) => {
                    let ltd = archive
                        .and_then(|a| a.sample_at(t - dendritic_delay))
                        .map_or(0.0, |s| p.ltd_amplitude(&s));
                    self.weight = (self.weight - ltd).max(p.w_min);
                }
                model => self.weight = model.on_pre_spike(self.weight, &self.pairing(None)),
            }
            self.traces.bump_pre();
        }

        for _ in 0..counts.post {
            match &self.model {
                SynapseModel::StdpDopamine(p) => self.c += p.a_plus * frozen.pre,
                model => {
                    let tr = self.pairing(Some((frozen.pre, frozen.pre_triplet)));
                    self.weight = model.on_post_spike(self.weight, &tr);
                }
            }
            self.traces.bump_post();
        }

        if let SynapseModel::StdpDopamine(p) = &self.model {
            self.n += counts.dopamine as f64 / p.tau_n;
        }

        self.traces.finish();
        self.t_last = t;

        (counts.pre > 0).then_some(self.weight)
    }

    fn pairing(&self, frozen_pre: Option<(f64, f64)>) -> PairingTraces {
        let (pre, pre_triplet) =
            frozen_pre.unwrap_or((self.traces.pre.value, self.traces.pre_triplet.value));
        PairingTraces {
            pre,
            pre_triplet,
            post: self.traces.post.value,
            post_triplet: self.traces.post_triplet.value,
        }
    }

    /// Weight, stored trace values and model parameters
    pub fn status(&self) -> HashMap<String, f64> {
        let mut status = self.model.params();
        status.insert("weight".into(), self.weight);
        if self.model.is_plastic() {
            status.insert("Kplus".into(), self.traces.pre.value);
            status.insert("Kplus_triplet".into(), self.traces.pre_triplet.value);
            status.insert("Kminus".into(), self.traces.post.value);
            status.insert("Kminus_triplet".into(), self.traces.post_triplet.value);
            status.insert("t_lastspike".into(), self.t_last);
        }
        if self.model.needs_volume_transmitter() {
            status.insert("c".into(), self.c);
            status.insert("n".into(), self.n);
        }
        status
    }

    /// Apply a state or parameter dictionary. Atomic: on error `self` is unchanged.
    pub fn apply(&mut self, updates: &HashMap<String, f64>) -> Result<()> {
        let mut next = self.clone();
        let mut params = HashMap::new();
        let mut weight = None;

        for (key, &value) in updates {
            match key.as_str() {
                "weight" => weight = Some(value),
                "Kplus" | "Kplus_triplet" | "Kminus" | "Kminus_triplet" | "n"
                    if next.model.is_plastic() =>
                {
                    ensure_non_negative(key, value)?;
                    let slot = match key.as_str() {
                        "Kplus" => &mut next.traces.pre.value,
                        "Kplus_triplet" => &mut next.traces.pre_triplet.value,
                        "Kminus" => &mut next.traces.post.value,
                        "Kminus_triplet" => &mut next.traces.post_triplet.value,
                        _ => &mut next.n,
                    };
                    *slot = value;
                }
                "c" if next.model.needs_volume_transmitter() => next.c = value,
                _ => {
                    params.insert(key.clone(), value);
                }
            }
        }

        if !params.is_empty() {
            next.model = next.model.with_params(&params)?;
            next.traces = next.model.retune(&next.traces);
        }
        if let Some(w) = weight {
            if !w.is_finite() {
                return Err(KernelError::bad_property("weight", w, "must be finite"));
            }
            next.weight = w;
        }
        if next.model.is_plastic() {
            next.weight = next.model.clamp_weight(next.weight);
        }

        *self = next;
        Ok(())
    }
}

// ============================================================================
// CONNECTIONS
// ============================================================================

/// Keys of a connection dictionary that can only be read
const READ_ONLY_KEYS: &[&str] = &["source", "target", "receptor_type", "weight_recorder", "vt"];

/// Edge of the network, stored on the virtual process that owns its target
#[derive(Debug, Clone, PartialEq)]
pub struct Connection {
    pub id: ConnectionId,
    pub source: NodeId,
    pub target: NodeId,
    pub port: usize,
    pub model_name: String,
    pub delay: Delay,
    pub synapse: Synapse,
    pub weight_recorder: Option<NodeId>,
    pub volume_transmitter: Option<NodeId>,
}

impl Connection {
    pub fn delay_kind(&self) -> DelayKind {
        self.synapse.model.delay_kind()
    }

    pub fn delay_steps(&self, grid: &TimeGrid) -> Result<DelaySteps> {
        delay::to_steps(&self.delay, grid)
    }

    /// Delay rounded onto the grid, in ms
    pub fn grid_delay(&self, grid: &TimeGrid) -> Result<Delay> {
        let steps = self.delay_steps(grid)?;
        Ok(Delay::split(grid.time_of(steps.axonal), grid.time_of(steps.dendritic)))
    }

    pub fn status(&self) -> HashMap<String, f64> {
        let mut status = self.synapse.status();
        status.insert("source".into(), self.source as f64);
        status.insert("target".into(), self.target as f64);
        status.insert("receptor_type".into(), self.port as f64);
        match self.delay_kind() {
            DelayKind::Total => {
                status.insert("delay".into(), self.delay.total());
            }
            DelayKind::Split => {
                status.insert("axonal_delay".into(), self.delay.axonal);
                status.insert("dendritic_delay".into(), self.delay.dendritic);
            }
        }
        if let Some(wr) = self.weight_recorder {
            status.insert("weight_recorder".into(), wr as f64);
        }
        if let Some(vt) = self.volume_transmitter {
            status.insert("vt".into(), vt as f64);
        }
        status
    }

    /// Apply a connection dictionary. On error nothing changes.
    pub fn apply(&mut self, updates: &HashMap<String, f64>, grid: &TimeGrid) -> Result<()> {
        let mut spec = DelaySpec::default();
        let mut rest = HashMap::new();
        for (key, &value) in updates {
            if READ_ONLY_KEYS.contains(&key.as_str()) {
                return Err(KernelError::Configuration(format!(
                    "'{key}' cannot be changed on an existing connection"
                )));
            }
            if !spec.take_field(key, value) {
                rest.insert(key.clone(), value);
            }
        }

        let kind = self.delay_kind();
        let new_delay = delay::apply(&self.model_name, kind, self.delay, &spec)?;
        delay::to_steps(&new_delay, grid)?;

        let mut synapse = self.synapse.clone();
        synapse.apply(&rest)?;

        self.delay = new_delay;
        self.synapse = synapse;
        Ok(())
    }
}
