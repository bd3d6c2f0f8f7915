//! # nestling kernel
//!
//! Event-driven spiking-network simulation kernel in the style of NEST
//! (https://www.nest-simulator.org/).
//!
//! Key features:
//! - Fixed-resolution time grid with off-grid (precise) spike times
//! - Axonal / dendritic delay split per synapse type
//! - Lazily integrated synaptic traces and a family of plasticity rules
//!   (STDP, power-law, triplet, Vogels-Sprekeler, Jonke, Clopath, dopamine)
//! - Deterministic multi-threaded stepping over virtual processes
//! - Weight recorder and volume transmitter devices
//!
//! ```no_run
//! use nestling_kernel::{ConnectionRule, Kernel, KernelParams, SynSpec};
//! use serde_json::json;
//!
//! let mut kernel = Kernel::new(KernelParams::default())?;
//! let sg = kernel.create_with("spike_generator", 1, &json!({"spike_times": [10.0]}))?;
//! let parrots = kernel.create("parrot_neuron", 2)?;
//! kernel.connect(&sg, &parrots.slice(0, 1), ConnectionRule::AllToAll, &SynSpec::new("static_synapse"))?;
//! kernel.connect(
//!     &parrots.slice(0, 1),
//!     &parrots.slice(1, 2),
//!     ConnectionRule::AllToAll,
//!     &SynSpec::new("stdp_synapse").with("weight", 10.0).with("receptor_type", 1.0),
//! )?;
//! kernel.simulate(100.0)?;
//! # Ok::<(), nestling_core::KernelError>(())
//! ```

use serde::{Deserialize, Serialize};

pub mod archive;
pub mod delay;
pub mod distribution;
pub mod event;
pub mod kernel;
pub mod node;
pub mod recorder;
pub mod rules;
pub mod scheduler;
pub mod synapse;
pub mod trace;

pub use kernel::{ConnectionRule, Kernel, KernelParams, SynSpec, SynapsePrototype};
pub use nestling_core::{ConnectionId, ErrorKind, KernelError, NodeId, Result, Time, TimeGrid};
pub use node::{EmittedSpike, NodeInput, NodeModel, StepContext};
pub use recorder::WeightEvent;
pub use rules::{SynapseModel, VoltageSample};
pub use scheduler::SimulationState;

/// Collection of node IDs (like NEST's NodeCollection)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeCollection {
    pub ids: Vec<NodeId>,
}

impl NodeCollection {
    pub fn new(ids: Vec<NodeId>) -> Self {
        Self { ids }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn first(&self) -> Option<NodeId> {
        self.ids.first().copied()
    }

    pub fn last(&self) -> Option<NodeId> {
        self.ids.last().copied()
    }

    /// Slice of nodes
    pub fn slice(&self, start: usize, end: usize) -> Self {
        Self::new(self.ids[start..end].to_vec())
    }

    /// Concatenation of two collections
    pub fn join(&self, other: &NodeCollection) -> Self {
        Self::new(self.ids.iter().chain(other.ids.iter()).copied().collect())
    }
}

impl From<NodeId> for NodeCollection {
    fn from(id: NodeId) -> Self {
        Self::new(vec![id])
    }
}

impl IntoIterator for NodeCollection {
    type Item = NodeId;
    type IntoIter = std::vec::IntoIter<NodeId>;

    fn into_iter(self) -> Self::IntoIter {
        self.ids.into_iter()
    }
}
