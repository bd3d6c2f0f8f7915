//! Owned simulation context.
//!
//! Everything the kernel knows lives in one [`Kernel`] value: nodes,
//! connections, synapse model defaults, virtual processes and the scheduler.
//! Several kernels can coexist in one process.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use nestling_core::{ConnectionId, KernelError, NodeId, Result, Time, TimeGrid};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::delay::{self, Delay, DelayKind, DelaySpec};
use crate::distribution::{VirtualProcess, VpLayout};
use crate::node::{self, merge_json, NodeModel, NodeSpec};
use crate::recorder::{WeightEvent, WeightRecorder};
use crate::rules::SynapseModel;
use crate::scheduler::{Scheduler, SimulationState};
use crate::synapse::{Connection, Synapse};
use crate::NodeCollection;

// ============================================================================
// KERNEL PARAMETERS
// ============================================================================

/// Kernel parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct KernelParams {
    pub resolution: f64,       // Time step (ms)
    pub num_processes: usize,  // Simulated MPI ranks
    pub local_num_threads: usize,
    pub print_time: bool,      // Log progress after every slice
}

impl Default for KernelParams {
    fn default() -> Self {
        Self {
            resolution: 0.1,
            num_processes: 1,
            local_num_threads: 1,
            print_time: false,
        }
    }
}

impl KernelParams {
    pub fn from_json(text: &str) -> Result<Self> {
        let params: Self = serde_json::from_str(text)
            .map_err(|e| KernelError::Configuration(format!("kernel parameters: {e}")))?;
        params.validate()?;
        Ok(params)
    }

    pub fn validate(&self) -> Result<()> {
        TimeGrid::new(self.resolution)?;
        VpLayout::new(self.num_processes, self.local_num_threads)?;
        Ok(())
    }

    fn layout(&self) -> Result<VpLayout> {
        VpLayout::new(self.num_processes, self.local_num_threads)
    }
}

// ============================================================================
// SYNAPSE DEFAULTS
// ============================================================================

/// Defaults of a registered synapse model, copied into every new connection
#[derive(Debug, Clone, PartialEq)]
pub struct SynapsePrototype {
    pub model: SynapseModel,
    pub weight: f64,
    pub delay: Delay,
    pub receptor_type: usize,
    pub weight_recorder: Option<NodeId>,
    pub vt: Option<NodeId>,
}

impl SynapsePrototype {
    pub fn new(model: SynapseModel) -> Self {
        Self {
            delay: Delay::default_for(model.delay_kind()),
            model,
            weight: 1.0,
            receptor_type: 0,
            weight_recorder: None,
            vt: None,
        }
    }

    pub fn status(&self) -> HashMap<String, f64> {
        let mut status = self.model.params();
        status.insert("weight".into(), self.weight);
        status.insert("receptor_type".into(), self.receptor_type as f64);
        match self.model.delay_kind() {
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
        if let Some(vt) = self.vt {
            status.insert("vt".into(), vt as f64);
        }
        status
    }
}

// ============================================================================
// KERNEL
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodeKind {
    Model,
    VolumeTransmitter,
    WeightRecorder,
}

#[derive(Debug, Clone)]
struct NodeRecord {
    model: String,
    kind: NodeKind,
    vp: usize,
}

/// How sources are paired with targets in `connect`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConnectionRule {
    #[default]
    AllToAll,
    OneToOne,
}

/// Synapse part of a `connect` call: model name plus per-connection overrides
#[derive(Debug, Clone, Default)]
pub struct SynSpec {
    pub model: String,
    pub params: HashMap<String, f64>,
}

impl SynSpec {
    pub fn new(model: &str) -> Self {
        Self {
            model: model.to_string(),
            params: HashMap::new(),
        }
    }

    pub fn with(mut self, key: &str, value: f64) -> Self {
        self.params.insert(key.to_string(), value);
        self
    }
}

/// NEST-style simulation kernel
#[derive(Debug)]
pub struct Kernel {
    params: KernelParams,
    grid: TimeGrid,
    layout: VpLayout,
    pool: rayon::ThreadPool,
    scheduler: Scheduler,
    nodes: Vec<NodeRecord>,
    vps: Vec<VirtualProcess>,
    recorders: BTreeMap<NodeId, WeightRecorder>,
    volume_transmitters: BTreeSet<NodeId>,
    synapse_models: BTreeMap<String, SynapsePrototype>,
    connection_vp: Vec<usize>,
}

fn build_pool(threads: usize) -> Result<rayon::ThreadPool> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build()
        .map_err(|e| KernelError::Configuration(format!("thread pool: {e}")))
}

fn default_synapse_models() -> BTreeMap<String, SynapsePrototype> {
    SynapseModel::catalog()
        .into_iter()
        .map(|m| (m.name().to_string(), SynapsePrototype::new(m)))
        .collect()
}

impl Kernel {
    pub fn new(params: KernelParams) -> Result<Self> {
        params.validate()?;
        let grid = TimeGrid::new(params.resolution)?;
        let layout = params.layout()?;
        let vps = (0..layout.total_vps())
            .map(|i| VirtualProcess::new(i, grid))
            .collect();
        Ok(Self {
            pool: build_pool(params.local_num_threads)?,
            params,
            grid,
            layout,
            scheduler: Scheduler::new(),
            nodes: Vec::new(),
            vps,
            recorders: BTreeMap::new(),
            volume_transmitters: BTreeSet::new(),
            synapse_models: default_synapse_models(),
            connection_vp: Vec::new(),
        })
    }

    /// Discard nodes, connections, queues and model defaults. Kernel parameters are kept.
    pub fn reset(&mut self) {
        self.scheduler = Scheduler::new();
        self.nodes.clear();
        self.vps = (0..self.layout.total_vps())
            .map(|i| VirtualProcess::new(i, self.grid))
            .collect();
        self.recorders.clear();
        self.volume_transmitters.clear();
        self.synapse_models = default_synapse_models();
        self.connection_vp.clear();
        info!("kernel reset");
    }

    pub fn params(&self) -> &KernelParams {
        &self.params
    }

    pub fn grid(&self) -> &TimeGrid {
        &self.grid
    }

    pub fn layout(&self) -> &VpLayout {
        &self.layout
    }

    pub fn state(&self) -> SimulationState {
        self.scheduler.state
    }

    /// Current simulation time (ms)
    pub fn time(&self) -> Time {
        self.grid.time_of(self.scheduler.step)
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn num_connections(&self) -> usize {
        self.connection_vp.len()
    }

    // ------------------------------------------------------------------------
    // Kernel status
    // ------------------------------------------------------------------------

    pub fn get_kernel_status(&self) -> Value {
        let mut status = serde_json::to_value(&self.params).unwrap_or_else(|_| json!({}));
        if let Some(obj) = status.as_object_mut() {
            let router = self.scheduler.router();
            let h = self.grid.resolution();
            obj.insert("time".into(), json!(self.time()));
            obj.insert("total_num_virtual_procs".into(), json!(self.layout.total_vps()));
            obj.insert("network_size".into(), json!(self.nodes.len()));
            obj.insert("num_connections".into(), json!(self.num_connections()));
            obj.insert("state".into(), json!(self.state().name()));
            obj.insert("min_delay".into(), json!(router.min_delay().map_or(h, |d| d as f64 * h)));
            obj.insert("max_delay".into(), json!(router.max_delay().map_or(h, |d| d as f64 * h)));
        }
        status
    }

    /// Change kernel parameters. Resolution and VP layout can only change on an empty kernel.
    pub fn set_kernel_status(&mut self, updates: &Value) -> Result<()> {
        let params: KernelParams = merge_json("kernel", &self.params, updates)?;
        params.validate()?;

        let structural = params.resolution != self.params.resolution
            || params.num_processes != self.params.num_processes
            || params.local_num_threads != self.params.local_num_threads;
        if structural {
            if !self.nodes.is_empty() || self.scheduler.step != 0 {
                return Err(KernelError::KernelState(
                    "resolution and thread layout can only change before nodes are created".into(),
                ));
            }
            let pool = build_pool(params.local_num_threads)?;
            self.grid = TimeGrid::new(params.resolution)?;
            self.layout = params.layout()?;
            self.pool = pool;
            self.vps = (0..self.layout.total_vps())
                .map(|i| VirtualProcess::new(i, self.grid))
                .collect();
            debug!(?params, "kernel layout changed");
        }
        self.params = params;
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Nodes
    // ------------------------------------------------------------------------

    fn next_id(&self) -> NodeId {
        self.nodes.len() + 1
    }

    fn record(&self, id: NodeId) -> Result<&NodeRecord> {
        id.checked_sub(1)
            .and_then(|i| self.nodes.get(i))
            .ok_or(KernelError::UnknownNode(id))
    }

    fn insert_node(&mut self, spec: NodeSpec, model: String) -> NodeId {
        let id = self.next_id();
        let vp = self.layout.assign_virtual_process(id);
        let kind = match spec {
            NodeSpec::Model(m) => {
                self.vps[vp].add_node(id, m);
                NodeKind::Model
            }
            NodeSpec::VolumeTransmitter(m) => {
                self.vps[vp].add_node(id, m);
                self.volume_transmitters.insert(id);
                NodeKind::VolumeTransmitter
            }
            NodeSpec::WeightRecorder(r) => {
                self.recorders.insert(id, r);
                NodeKind::WeightRecorder
            }
        };
        self.nodes.push(NodeRecord { model, kind, vp });
        if self.scheduler.state == SimulationState::Uninitialized {
            self.scheduler.state = SimulationState::Built;
        }
        id
    }

    /// Create `n` nodes of a built-in model
    pub fn create(&mut self, model: &str, n: usize) -> Result<NodeCollection> {
        self.create_with(model, n, &json!({}))
    }

    /// Create `n` nodes of a built-in model and apply `params` to each of them.
    pub fn create_with(&mut self, model: &str, n: usize, params: &Value) -> Result<NodeCollection> {
        self.scheduler.state.ensure_structural_change("create nodes")?;
        let mut specs = Vec::with_capacity(n);
        for _ in 0..n {
            let mut spec = node::build(model)?;
            match &mut spec {
                NodeSpec::Model(m) | NodeSpec::VolumeTransmitter(m) => {
                    m.set_status(params, &self.grid)?
                }
                NodeSpec::WeightRecorder(r) => r.set_status(params)?,
            }
            specs.push(spec);
        }
        let ids = specs
            .into_iter()
            .map(|spec| self.insert_node(spec, model.to_string()))
            .collect();
        debug!(model, n, "created nodes");
        Ok(NodeCollection::new(ids))
    }

    /// Create `n` nodes from a user-supplied model implementation
    pub fn create_custom<F>(&mut self, n: usize, mut factory: F) -> Result<NodeCollection>
    where
        F: FnMut() -> Box<dyn NodeModel>,
    {
        self.scheduler.state.ensure_structural_change("create nodes")?;
        let ids = (0..n)
            .map(|_| {
                let model = factory();
                let name = model.model_name().to_string();
                self.insert_node(NodeSpec::Model(model), name)
            })
            .collect();
        Ok(NodeCollection::new(ids))
    }

    pub fn get_node_status(&self, id: NodeId) -> Result<Value> {
        let rec = self.record(id)?;
        let mut status = match rec.kind {
            NodeKind::WeightRecorder => self
                .recorders
                .get(&id)
                .map(|r| r.status())
                .ok_or(KernelError::UnknownNode(id))?,
            _ => self.vps[rec.vp]
                .node(id)
                .map(|n| n.status())
                .ok_or(KernelError::UnknownNode(id))?,
        };
        if let Some(obj) = status.as_object_mut() {
            obj.insert("model".into(), json!(rec.model));
            obj.insert("global_id".into(), json!(id));
            obj.insert("vp".into(), json!(rec.vp));
        }
        Ok(status)
    }

    /// Apply `updates` to every node in `nodes`, stopping at the first node that rejects them.
    pub fn set_node_status(&mut self, nodes: &NodeCollection, updates: &Value) -> Result<()> {
        for &id in &nodes.ids {
            self.record(id)?;
        }
        for &id in &nodes.ids {
            let rec = self.record(id)?.clone();
            match rec.kind {
                NodeKind::WeightRecorder => {
                    if let Some(r) = self.recorders.get_mut(&id) {
                        r.set_status(updates)?;
                    }
                }
                NodeKind::Model | NodeKind::VolumeTransmitter => {
                    if let Some(n) = self.vps[rec.vp].node_mut(id) {
                        n.set_status(updates, &self.grid)?;
                    }
                }
            }
        }
        Ok(())
    }

    pub fn weight_recorder_events(&self, recorder: NodeId) -> Result<&[WeightEvent]> {
        self.recorders
            .get(&recorder)
            .map(|r| r.events())
            .ok_or(KernelError::UnknownNode(recorder))
    }

    // ------------------------------------------------------------------------
    // Synapse models
    // ------------------------------------------------------------------------

    pub fn synapse_models(&self) -> Vec<&str> {
        self.synapse_models.keys().map(|k| k.as_str()).collect()
    }

    fn prototype(&self, name: &str) -> Result<&SynapsePrototype> {
        self.synapse_models
            .get(name)
            .ok_or_else(|| KernelError::UnknownModel(name.to_string()))
    }

    pub fn get_defaults(&self, model: &str) -> Result<HashMap<String, f64>> {
        Ok(self.prototype(model)?.status())
    }

    pub fn set_defaults(&mut self, model: &str, updates: &HashMap<String, f64>) -> Result<()> {
        let proto = self.prototype(model)?.clone();
        let proto = self.apply_to_prototype(model, proto, updates)?;
        self.synapse_models.insert(model.to_string(), proto);
        Ok(())
    }

    /// Register `new_name` as a copy of `existing` with `updates` applied
    pub fn copy_model(
        &mut self,
        existing: &str,
        new_name: &str,
        updates: &HashMap<String, f64>,
    ) -> Result<()> {
        if self.synapse_models.contains_key(new_name) || node::NODE_MODELS.contains(&new_name) {
            return Err(KernelError::Configuration(format!(
                "model name '{new_name}' is already in use"
            )));
        }
        let proto = self.prototype(existing)?.clone();
        let proto = self.apply_to_prototype(new_name, proto, updates)?;
        self.synapse_models.insert(new_name.to_string(), proto);
        Ok(())
    }

    fn node_of_kind(&self, key: &str, value: f64, kind: NodeKind) -> Result<NodeId> {
        let id = value as NodeId;
        match self.record(id) {
            Ok(rec) if rec.kind == kind && value >= 1.0 && value.fract() == 0.0 => Ok(id),
            _ => Err(KernelError::Configuration(format!(
                "'{key}' = {value} does not name a {}",
                match kind {
                    NodeKind::WeightRecorder => "weight_recorder",
                    NodeKind::VolumeTransmitter => "volume_transmitter",
                    NodeKind::Model => "node",
                }
            ))),
        }
    }

    /// Validate `updates` against `proto` and return the merged prototype
    fn apply_to_prototype(
        &self,
        name: &str,
        mut proto: SynapsePrototype,
        updates: &HashMap<String, f64>,
    ) -> Result<SynapsePrototype> {
        let mut spec = DelaySpec::default();
        let mut params = HashMap::new();
        for (key, &value) in updates {
            if spec.take_field(key, value) {
                continue;
            }
            match key.as_str() {
                "weight" => {
                    if !value.is_finite() {
                        return Err(KernelError::bad_property("weight", value, "must be finite"));
                    }
                    proto.weight = value;
                }
                "receptor_type" => {
                    if value < 0.0 || value.fract() != 0.0 {
                        return Err(KernelError::bad_property(
                            "receptor_type",
                            value,
                            "must be a non-negative integer",
                        ));
                    }
                    proto.receptor_type = value as usize;
                }
                "weight_recorder" => {
                    proto.weight_recorder =
                        Some(self.node_of_kind(key, value, NodeKind::WeightRecorder)?)
                }
                "vt" if proto.model.needs_volume_transmitter() => {
                    proto.vt = Some(self.node_of_kind(key, value, NodeKind::VolumeTransmitter)?)
                }
                _ => {
                    params.insert(key.clone(), value);
                }
            }
        }
        proto.delay = delay::apply(name, proto.model.delay_kind(), proto.delay, &spec)?;
        delay::to_steps(&proto.delay, &self.grid)?;
        proto.model = proto.model.with_params(&params)?;
        Ok(proto)
    }

    // ------------------------------------------------------------------------
    // Connections
    // ------------------------------------------------------------------------

    /// Connect `sources` to `targets`. Either every connection is created or none.
    pub fn connect(
        &mut self,
        sources: &NodeCollection,
        targets: &NodeCollection,
        rule: ConnectionRule,
        syn_spec: &SynSpec,
    ) -> Result<Vec<ConnectionId>> {
        self.scheduler.state.ensure_structural_change("connect")?;

        let proto = self.prototype(&syn_spec.model)?.clone();
        let proto = self.apply_to_prototype(&syn_spec.model, proto, &syn_spec.params)?;
        if proto.model.needs_volume_transmitter() && proto.vt.is_none() {
            return Err(KernelError::Configuration(format!(
                "{} needs a volume transmitter; set 'vt' on the model first",
                syn_spec.model
            )));
        }

        let pairs: Vec<(NodeId, NodeId)> = match rule {
            ConnectionRule::AllToAll => sources
                .ids
                .iter()
                .flat_map(|&s| targets.ids.iter().map(move |&t| (s, t)))
                .collect(),
            ConnectionRule::OneToOne => {
                if sources.len() != targets.len() {
                    return Err(KernelError::Configuration(
                        "one_to_one requires equal population sizes".into(),
                    ));
                }
                sources.ids.iter().copied().zip(targets.ids.iter().copied()).collect()
            }
        };

        for &(source, target) in &pairs {
            if self.record(source)?.kind == NodeKind::WeightRecorder {
                return Err(KernelError::Configuration(format!(
                    "weight_recorder {source} cannot send spikes"
                )));
            }
            let rec = self.record(target)?;
            if rec.kind == NodeKind::WeightRecorder {
                return Err(KernelError::Configuration(format!(
                    "weight_recorder {target} cannot receive spikes"
                )));
            }
            if proto.model.needs_voltage_archive()
                && self.vps[rec.vp]
                    .node(target)
                    .and_then(|n| n.voltage_archive())
                    .is_none()
            {
                return Err(KernelError::Configuration(format!(
                    "{} requires a voltage-archiving target, node {target} is {}",
                    syn_spec.model, rec.model
                )));
            }
        }

        let mut ids = Vec::with_capacity(pairs.len());
        for (source, target) in pairs {
            let id = ConnectionId(self.connection_vp.len());
            let vp = self.record(target)?.vp;
            self.vps[vp].add_connection(Connection {
                id,
                source,
                target,
                port: proto.receptor_type,
                model_name: syn_spec.model.clone(),
                delay: proto.delay,
                synapse: Synapse::new(proto.model.clone(), proto.weight),
                weight_recorder: proto.weight_recorder,
                volume_transmitter: proto.vt,
            });
            self.connection_vp.push(vp);
            ids.push(id);
        }
        if self.scheduler.state == SimulationState::Uninitialized {
            self.scheduler.state = SimulationState::Built;
        }
        debug!(model = %syn_spec.model, n = ids.len(), "connected");
        Ok(ids)
    }

    fn connection(&self, id: ConnectionId) -> Result<&Connection> {
        self.connection_vp
            .get(id.0)
            .and_then(|&vp| self.vps[vp].connection(id))
            .ok_or(KernelError::UnknownConnection(id))
    }

    /// Connection ids filtered by source, target and model, in creation order
    pub fn get_connections(
        &self,
        sources: Option<&NodeCollection>,
        targets: Option<&NodeCollection>,
        model: Option<&str>,
    ) -> Vec<ConnectionId> {
        let src: Option<BTreeSet<NodeId>> = sources.map(|c| c.ids.iter().copied().collect());
        let tgt: Option<BTreeSet<NodeId>> = targets.map(|c| c.ids.iter().copied().collect());
        let mut ids: Vec<ConnectionId> = self
            .vps
            .iter()
            .flat_map(|vp| vp.connections())
            .filter(|c| src.as_ref().map_or(true, |s| s.contains(&c.source)))
            .filter(|c| tgt.as_ref().map_or(true, |t| t.contains(&c.target)))
            .filter(|c| model.map_or(true, |m| c.model_name == m))
            .map(|c| c.id)
            .collect();
        ids.sort();
        ids
    }

    pub fn get_status(&self, id: ConnectionId) -> Result<HashMap<String, f64>> {
        let conn = self.connection(id)?;
        let mut status = conn.status();
        status.insert("id".into(), id.0 as f64);
        Ok(status)
    }

    /// Apply `updates` to every listed connection; all or nothing.
    pub fn set_status(&mut self, ids: &[ConnectionId], updates: &HashMap<String, f64>) -> Result<()> {
        let mut staged = Vec::with_capacity(ids.len());
        for &id in ids {
            let mut conn = self.connection(id)?.clone();
            conn.apply(updates, &self.grid)?;
            if conn.delay != self.connection(id)?.delay
                && !self.scheduler.state.allows_structural_change()
            {
                return Err(KernelError::KernelState(
                    "delays cannot change between prepare() and cleanup()".into(),
                ));
            }
            staged.push(conn);
        }
        for conn in staged {
            let vp = self.connection_vp[conn.id.0];
            if let Some(slot) = self.vps[vp].connection_mut(conn.id) {
                *slot = conn;
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Simulation
    // ------------------------------------------------------------------------

    pub fn prepare(&mut self) -> Result<()> {
        self.scheduler
            .prepare(&mut self.vps, &self.volume_transmitters, &self.grid)
    }

    /// Advance by `duration` ms; must follow `prepare()`
    pub fn run(&mut self, duration: Time) -> Result<()> {
        let n_steps = self.grid.steps_exact(duration)?;
        let recorders = &mut self.recorders;
        self.scheduler.run(
            n_steps,
            &mut self.vps,
            &self.pool,
            &self.grid,
            self.params.print_time,
            |events| {
                let mut by_recorder: BTreeMap<NodeId, Vec<WeightEvent>> = BTreeMap::new();
                for (recorder, ev) in events {
                    by_recorder.entry(recorder).or_default().push(ev);
                }
                for (recorder, batch) in by_recorder {
                    if let Some(r) = recorders.get_mut(&recorder) {
                        r.extend_sorted(batch);
                    }
                }
            },
        )
    }

    pub fn cleanup(&mut self) -> Result<()> {
        self.scheduler.cleanup()
    }

    /// `prepare(); run(duration); cleanup()`
    pub fn simulate(&mut self, duration: Time) -> Result<()> {
        self.grid.steps_exact(duration)?;
        self.prepare()?;
        self.run(duration)?;
        self.cleanup()?;
        info!(time = self.time(), "simulation segment done");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kernel_params_from_json() {
        let p = KernelParams::from_json(r#"{"resolution": 0.05, "local_num_threads": 2}"#).unwrap();
        assert_eq!(p.resolution, 0.05);
        assert_eq!(p.local_num_threads, 2);
        assert_eq!(p.num_processes, 1);
        assert!(KernelParams::from_json(r#"{"resolution": -1.0}"#).is_err());
        assert!(KernelParams::from_json(r#"{"rng": 1}"#).is_err());
    }

    #[test]
    fn test_node_ids_start_at_one() {
        let mut k = Kernel::new(KernelParams::default()).unwrap();
        let a = k.create("parrot_neuron", 3).unwrap();
        let b = k.create("weight_recorder", 1).unwrap();
        assert_eq!(a.ids, vec![1, 2, 3]);
        assert_eq!(b.ids, vec![4]);
        assert_eq!(k.state(), SimulationState::Built);
        assert!(matches!(k.get_node_status(9), Err(KernelError::UnknownNode(9))));
    }

    #[test]
    fn test_layout_locked_after_create() {
        let mut k = Kernel::new(KernelParams::default()).unwrap();
        k.set_kernel_status(&json!({"local_num_threads": 2})).unwrap();
        assert_eq!(k.layout().total_vps(), 2);
        k.create("parrot_neuron", 1).unwrap();
        assert!(k.set_kernel_status(&json!({"resolution": 0.01})).is_err());
        k.set_kernel_status(&json!({"print_time": true})).unwrap();
    }

    #[test]
    fn test_structural_change_while_prepared() {
        let mut k = Kernel::new(KernelParams::default()).unwrap();
        let n = k.create("parrot_neuron", 2).unwrap();
        k.prepare().unwrap();
        assert!(matches!(
            k.create("parrot_neuron", 1),
            Err(KernelError::KernelState(_))
        ));
        assert!(k
            .connect(&n, &n, ConnectionRule::OneToOne, &SynSpec::new("static_synapse"))
            .is_err());
        k.run(1.0).unwrap();
        k.cleanup().unwrap();
        assert!(k.create("parrot_neuron", 1).is_ok());
    }

    #[test]
    fn test_dopamine_synapse_needs_vt() {
        let mut k = Kernel::new(KernelParams::default()).unwrap();
        let n = k.create("parrot_neuron", 2).unwrap();
        let err = k
            .connect(&n, &n, ConnectionRule::OneToOne, &SynSpec::new("stdp_dopamine_synapse"))
            .unwrap_err();
        assert!(matches!(err, KernelError::Configuration(_)));
    }

    #[test]
    fn test_copy_model() {
        let mut k = Kernel::new(KernelParams::default()).unwrap();
        let mut upd = HashMap::new();
        upd.insert("Wmax".to_string(), 10.0);
        k.copy_model("stdp_synapse", "my_stdp", &upd).unwrap();
        assert_eq!(k.get_defaults("my_stdp").unwrap()["Wmax"], 10.0);
        assert_eq!(k.get_defaults("stdp_synapse").unwrap()["Wmax"], 100.0);
        assert!(k.copy_model("stdp_synapse", "my_stdp", &HashMap::new()).is_err());
    }
}
