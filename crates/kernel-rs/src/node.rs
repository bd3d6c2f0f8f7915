//! Node plug-in contract and the built-in spike sources.
//!
//! The kernel only sees [`NodeModel`]: once per step a node receives the inputs
//! delivered at the start of the step and returns the spikes it emits inside
//! the step interval `(n·h, (n+1)·h]`. Neuron dynamics live outside the kernel;
//! the built-ins here are the spike sources and relays the plasticity tests
//! are written against.

use std::collections::HashMap;
use std::fmt::Debug;

use nestling_core::{KernelError, NodeId, Result, Step, Time, TimeGrid};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::archive::VoltageArchive;
use crate::event::TimingMode;
use crate::recorder::WeightRecorder;

/// Step being integrated
#[derive(Debug, Clone, Copy)]
pub struct StepContext {
    pub step: Step,
    pub grid: TimeGrid,
}

impl StepContext {
    pub fn t_start(&self) -> Time {
        self.grid.time_of(self.step)
    }

    pub fn t_end(&self) -> Time {
        self.grid.time_of(self.step + 1)
    }

    /// Whether `t` falls inside `(t_start, t_end]`
    pub fn contains(&self, t: Time) -> bool {
        let t = self.grid.snap(t);
        t > self.t_start() && t <= self.t_end()
    }
}

/// Spike delivered to a node
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NodeInput {
    pub source: NodeId,
    pub time: Time,
    pub weight: f64,
    pub multiplicity: u32,
    pub port: usize,
}

/// Spike emitted by a node during one step
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EmittedSpike {
    pub time: Time,
    pub multiplicity: u32,
}

/// Capability surface every node model exposes to the kernel
pub trait NodeModel: Debug + Send {
    fn model_name(&self) -> &str;

    /// Timestamp semantics of emitted spikes
    fn timing(&self) -> TimingMode {
        TimingMode::Grid
    }

    /// Integrate one step. Emitted times must lie in `(t_start, t_end]`.
    fn update(&mut self, ctx: &StepContext, inputs: &[NodeInput]) -> Vec<EmittedSpike>;

    fn status(&self) -> Value {
        Value::Object(Default::default())
    }

    fn set_status(&mut self, updates: &Value, _grid: &TimeGrid) -> Result<()> {
        match updates.as_object().and_then(|obj| obj.keys().next()) {
            Some(key) => Err(KernelError::UnknownParameter {
                model: self.model_name().to_string(),
                name: key.clone(),
            }),
            None => Ok(()),
        }
    }

    /// Membrane history for voltage-based plasticity
    fn voltage_archive(&self) -> Option<&VoltageArchive> {
        None
    }

    /// Mutable access for pruning history no synapse can read any more
    fn voltage_archive_mut(&mut self) -> Option<&mut VoltageArchive> {
        None
    }
}

// ============================================================================
// SPIKE GENERATOR
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SpikeGeneratorParams {
    pub spike_times: Vec<f64>,
    /// Per-spike multiplicities; empty means 1 for every spike
    pub spike_multiplicities: Vec<u32>,
    pub precise_times: bool,
    pub allow_offgrid_times: bool,
}

/// Emits a fixed list of spike times
#[derive(Debug, Clone, Default)]
pub struct SpikeGenerator {
    params: SpikeGeneratorParams,
    next: usize,
}

impl SpikeGenerator {
    pub fn new(params: SpikeGeneratorParams, grid: &TimeGrid) -> Result<Self> {
        validate_spike_times(&params, grid)?;
        Ok(Self { params, next: 0 })
    }
}

fn validate_spike_times(p: &SpikeGeneratorParams, grid: &TimeGrid) -> Result<()> {
    if !p.spike_multiplicities.is_empty() && p.spike_multiplicities.len() != p.spike_times.len() {
        return Err(KernelError::Configuration(
            "spike_multiplicities must match spike_times in length".into(),
        ));
    }
    if p.precise_times && p.allow_offgrid_times {
        return Err(KernelError::Configuration(
            "precise_times and allow_offgrid_times cannot both be set".into(),
        ));
    }
    let mut last = 0.0;
    for &t in &p.spike_times {
        if t <= 0.0 || !t.is_finite() {
            return Err(KernelError::bad_property("spike_times", t, "must be positive"));
        }
        if t < last {
            return Err(KernelError::bad_property("spike_times", t, "must be sorted"));
        }
        if !p.precise_times && !p.allow_offgrid_times && grid.snap(t) != grid.ceil_time(t) {
            return Err(KernelError::bad_property(
                "spike_times",
                t,
                "must lie on the grid unless precise_times or allow_offgrid_times is set",
            ));
        }
        last = t;
    }
    Ok(())
}

impl NodeModel for SpikeGenerator {
    fn model_name(&self) -> &str {
        "spike_generator"
    }

    fn timing(&self) -> TimingMode {
        TimingMode::from_flag(self.params.precise_times)
    }

    fn update(&mut self, ctx: &StepContext, _inputs: &[NodeInput]) -> Vec<EmittedSpike> {
        let mode = self.timing();
        let mut out = Vec::new();
        while let Some(&t) = self.params.spike_times.get(self.next) {
            let stamped = mode.stamp(&ctx.grid, t);
            if ctx.grid.snap(stamped) > ctx.t_end() {
                break;
            }
            if ctx.contains(stamped) {
                let multiplicity = self
                    .params
                    .spike_multiplicities
                    .get(self.next)
                    .copied()
                    .unwrap_or(1);
                if multiplicity > 0 {
                    out.push(EmittedSpike {
                        time: stamped,
                        multiplicity,
                    });
                }
            }
            self.next += 1;
        }
        out
    }

    fn status(&self) -> Value {
        serde_json::to_value(&self.params).unwrap_or(Value::Null)
    }

    fn set_status(&mut self, updates: &Value, grid: &TimeGrid) -> Result<()> {
        let params: SpikeGeneratorParams = merge_json(self.model_name(), &self.params, updates)?;
        validate_spike_times(&params, grid)?;
        self.params = params;
        self.next = 0;
        Ok(())
    }
}

// ============================================================================
// PARROT NEURONS
// ============================================================================

/// Re-emits every spike arriving on port 0 one step later.
///
/// Port 1 is silent, so a parrot can be the target of a plastic connection
/// without relaying it.
#[derive(Debug, Clone)]
pub struct ParrotNeuron {
    timing: TimingMode,
}

impl ParrotNeuron {
    pub fn new(precise: bool) -> Self {
        Self {
            timing: TimingMode::from_flag(precise),
        }
    }
}

impl NodeModel for ParrotNeuron {
    fn model_name(&self) -> &str {
        match self.timing {
            TimingMode::Grid => "parrot_neuron",
            TimingMode::OffGrid => "parrot_neuron_ps",
        }
    }

    fn timing(&self) -> TimingMode {
        self.timing
    }

    fn update(&mut self, ctx: &StepContext, inputs: &[NodeInput]) -> Vec<EmittedSpike> {
        let h = ctx.grid.resolution();
        inputs
            .iter()
            .filter(|input| input.port == 0 && input.multiplicity > 0)
            .map(|input| EmittedSpike {
                time: self.timing.stamp(&ctx.grid, ctx.grid.snap(input.time + h)),
                multiplicity: input.multiplicity,
            })
            .collect()
    }
}

/// Target for dopaminergic input; synapses subscribed to it receive the spikes.
#[derive(Debug, Clone, Default)]
pub struct VolumeTransmitter;

impl NodeModel for VolumeTransmitter {
    fn model_name(&self) -> &str {
        "volume_transmitter"
    }

    fn update(&mut self, _ctx: &StepContext, _inputs: &[NodeInput]) -> Vec<EmittedSpike> {
        Vec::new()
    }
}

// ============================================================================
// REGISTRY
// ============================================================================

/// Names accepted by `Kernel::create`
pub const NODE_MODELS: &[&str] = &[
    "spike_generator",
    "parrot_neuron",
    "parrot_neuron_ps",
    "volume_transmitter",
    "weight_recorder",
];

/// Freshly built node
#[derive(Debug)]
pub enum NodeSpec {
    Model(Box<dyn NodeModel>),
    VolumeTransmitter(Box<dyn NodeModel>),
    WeightRecorder(WeightRecorder),
}

pub fn build(name: &str) -> Result<NodeSpec> {
    let spec = match name {
        "spike_generator" => NodeSpec::Model(Box::<SpikeGenerator>::default()),
        "parrot_neuron" => NodeSpec::Model(Box::new(ParrotNeuron::new(false))),
        "parrot_neuron_ps" => NodeSpec::Model(Box::new(ParrotNeuron::new(true))),
        "volume_transmitter" => NodeSpec::VolumeTransmitter(Box::new(VolumeTransmitter)),
        "weight_recorder" => NodeSpec::WeightRecorder(WeightRecorder::default()),
        other => return Err(KernelError::UnknownModel(other.to_string())),
    };
    Ok(spec)
}

/// Apply a JSON dictionary to a serde parameter struct, rejecting unknown keys.
pub(crate) fn merge_json<T: Serialize + DeserializeOwned>(
    model: &str,
    current: &T,
    updates: &Value,
) -> Result<T> {
    let mut value = serde_json::to_value(current)
        .map_err(|e| KernelError::Configuration(format!("{model}: {e}")))?;
    let (Some(obj), Some(upd)) = (value.as_object_mut(), updates.as_object()) else {
        return Err(KernelError::Configuration(format!(
            "{model}: status must be a dictionary"
        )));
    };
    for (key, v) in upd {
        if !obj.contains_key(key) {
            return Err(KernelError::UnknownParameter {
                model: model.to_string(),
                name: key.clone(),
            });
        }
        obj.insert(key.clone(), v.clone());
    }
    serde_json::from_value(value).map_err(|e| KernelError::Configuration(format!("{model}: {e}")))
}

/// Numeric entries of a status dictionary
pub fn numeric_entries(status: &Value) -> HashMap<String, f64> {
    status
        .as_object()
        .map(|obj| {
            obj.iter()
                .filter_map(|(k, v)| v.as_f64().map(|f| (k.clone(), f)))
                .collect()
        })
        .unwrap_or_default()
}
