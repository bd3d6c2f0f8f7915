//! Virtual processes and spike exchange.
//!
//! Nodes are dealt round-robin onto `num_processes × local_num_threads`
//! virtual processes (VPs). A VP owns its nodes, every connection that targets
//! one of them and the event queue those connections read from, so synapse
//! state is only ever touched by one worker. VPs run a `min_delay` slice
//! independently; spikes are then exchanged through [`SpikeRouter`] in a
//! canonical order before the next slice starts.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use nestling_core::{ConnectionId, KernelError, NodeId, Result, Step, Time, TimeGrid};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::delay::Delay;
use crate::event::{arrival_time, EventKind, EventQueue, SpikeEvent};
use crate::node::{NodeInput, NodeModel, StepContext};
use crate::recorder::WeightEvent;
use crate::synapse::{Connection, GroupCounts};

// ============================================================================
// LAYOUT
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VpLayout {
    pub num_processes: usize,
    pub local_num_threads: usize,
}

impl Default for VpLayout {
    fn default() -> Self {
        Self {
            num_processes: 1,
            local_num_threads: 1,
        }
    }
}

impl VpLayout {
    pub fn new(num_processes: usize, local_num_threads: usize) -> Result<Self> {
        if num_processes == 0 || local_num_threads == 0 {
            return Err(KernelError::Configuration(
                "num_processes and local_num_threads must be at least 1".into(),
            ));
        }
        Ok(Self {
            num_processes,
            local_num_threads,
        })
    }

    pub fn total_vps(&self) -> usize {
        self.num_processes * self.local_num_threads
    }

    pub fn assign_virtual_process(&self, node: NodeId) -> usize {
        node % self.total_vps()
    }

    /// Rank owning `vp`. VPs are interleaved over ranks: `vp = thread · p + rank`.
    pub fn vp_to_rank(&self, vp: usize) -> usize {
        vp % self.num_processes
    }

    pub fn vp_to_thread(&self, vp: usize) -> usize {
        vp / self.num_processes
    }

    pub fn is_local(&self, node: NodeId, rank: usize) -> bool {
        self.vp_to_rank(self.assign_virtual_process(node)) == rank
    }
}

// ============================================================================
// VIRTUAL PROCESS
// ============================================================================

/// Spike leaving a VP, exchanged at the end of a slice
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutgoingSpike {
    pub source: NodeId,
    pub time: Time,
    pub multiplicity: u32,
}

#[derive(Debug)]
pub struct VirtualProcess {
    pub index: usize,
    nodes: BTreeMap<NodeId, Box<dyn NodeModel>>,
    connections: Vec<Connection>,
    by_id: HashMap<ConnectionId, usize>,
    queue: EventQueue,
    /// Grid-rounded delay per local connection, built by `prepare`
    grid_delays: Vec<Delay>,
    /// Target node → local connections that receive its back-propagated spikes
    post_routes: HashMap<NodeId, Vec<usize>>,
    outbox: Vec<OutgoingSpike>,
    weight_events: Vec<(NodeId, WeightEvent)>,
}

impl VirtualProcess {
    pub fn new(index: usize, grid: TimeGrid) -> Self {
        Self {
            index,
            nodes: BTreeMap::new(),
            connections: Vec::new(),
            by_id: HashMap::new(),
            queue: EventQueue::new(grid),
            grid_delays: Vec::new(),
            post_routes: HashMap::new(),
            outbox: Vec::new(),
            weight_events: Vec::new(),
        }
    }

    pub fn add_node(&mut self, id: NodeId, model: Box<dyn NodeModel>) {
        self.nodes.insert(id, model);
    }

    pub fn node(&self, id: NodeId) -> Option<&dyn NodeModel> {
        self.nodes.get(&id).map(|n| n.as_ref())
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut Box<dyn NodeModel>> {
        self.nodes.get_mut(&id)
    }

    pub fn add_connection(&mut self, conn: Connection) {
        self.by_id.insert(conn.id, self.connections.len());
        self.connections.push(conn);
    }

    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    pub fn connection(&self, id: ConnectionId) -> Option<&Connection> {
        self.by_id.get(&id).map(|&i| &self.connections[i])
    }

    pub fn connection_mut(&mut self, id: ConnectionId) -> Option<&mut Connection> {
        self.by_id.get(&id).map(|&i| &mut self.connections[i])
    }

    pub fn pending_events(&self) -> usize {
        self.queue.len()
    }

    pub fn enqueue(&mut self, event: SpikeEvent) {
        self.queue.push(event);
    }

    /// Build the per-run lookup tables
    pub fn prepare(&mut self, grid: &TimeGrid) -> Result<()> {
        self.grid_delays = self
            .connections
            .iter()
            .map(|c| c.grid_delay(grid))
            .collect::<Result<_>>()?;
        self.post_routes.clear();
        for (i, conn) in self.connections.iter().enumerate() {
            if conn.synapse.model.needs_post_spikes() {
                self.post_routes.entry(conn.target).or_default().push(i);
            }
        }
        Ok(())
    }

    /// Run steps `from..to`
    pub fn run_slice(&mut self, from: Step, to: Step, grid: &TimeGrid) {
        for step in from..to {
            self.step(StepContext { step, grid: *grid });
        }
        self.prune_archives();
    }

    /// Drop membrane samples older than every incoming voltage-based synapse's
    /// last event, seen at the soma (`t_last - dendritic`).
    fn prune_archives(&mut self) {
        let mut horizon: BTreeMap<NodeId, Time> = BTreeMap::new();
        for (conn, delay) in self.connections.iter().zip(&self.grid_delays) {
            if !conn.synapse.model.needs_voltage_archive() {
                continue;
            }
            let t = conn.synapse.t_last - delay.dendritic;
            horizon
                .entry(conn.target)
                .and_modify(|h| *h = h.min(t))
                .or_insert(t);
        }
        for (id, t) in horizon {
            if let Some(archive) = self.nodes.get_mut(&id).and_then(|n| n.voltage_archive_mut()) {
                archive.prune_before(t);
            }
        }
    }

    fn step(&mut self, ctx: StepContext) {
        let grid = ctx.grid;
        let due = self.queue.pop_due(ctx.step);
        let mut inputs: BTreeMap<NodeId, Vec<NodeInput>> = BTreeMap::new();

        let mut i = 0;
        while i < due.len() {
            let head = due[i];
            let mut counts = GroupCounts::default();
            let mut j = i;
            while j < due.len()
                && due[j].connection == head.connection
                && grid.same_instant(due[j].time, head.time)
            {
                let m = due[j].multiplicity;
                match due[j].kind {
                    EventKind::Pre => counts.pre = counts.pre.saturating_add(m),
                    EventKind::Post => counts.post = counts.post.saturating_add(m),
                    EventKind::Dopamine => counts.dopamine = counts.dopamine.saturating_add(m),
                }
                j += 1;
            }
            self.deliver_group(&head, counts, &grid, &mut inputs);
            i = j;
        }

        for (&id, node) in self.nodes.iter_mut() {
            let node_inputs = inputs.remove(&id).unwrap_or_default();
            let timing = node.timing();
            for spike in node.update(&ctx, &node_inputs) {
                let time = timing.stamp(&grid, spike.time);
                if !ctx.contains(time) {
                    warn!(
                        node = id,
                        time,
                        step = ctx.step,
                        "dropping spike emitted outside the step interval"
                    );
                    continue;
                }
                self.outbox.push(OutgoingSpike {
                    source: id,
                    time,
                    multiplicity: spike.multiplicity,
                });
                for &c in self.post_routes.get(&id).into_iter().flatten() {
                    let conn = &self.connections[c];
                    self.queue.push(SpikeEvent {
                        source: id,
                        target: conn.target,
                        connection: conn.id,
                        time: arrival_time(time, &self.grid_delays[c], EventKind::Post),
                        multiplicity: spike.multiplicity,
                        port: conn.port,
                        kind: EventKind::Post,
                    });
                }
            }
        }
    }

    fn deliver_group(
        &mut self,
        head: &SpikeEvent,
        counts: GroupCounts,
        grid: &TimeGrid,
        inputs: &mut BTreeMap<NodeId, Vec<NodeInput>>,
    ) {
        let Some(&idx) = self.by_id.get(&head.connection) else {
            warn!(connection = %head.connection, "event for unknown connection");
            return;
        };
        let conn = &mut self.connections[idx];
        let archive = if conn.synapse.model.needs_voltage_archive() {
            self.nodes.get(&conn.target).and_then(|n| n.voltage_archive())
        } else {
            None
        };
        let dendritic = self.grid_delays[idx].dendritic;

        let transmitted = conn.synapse.process_group(
            head.time,
            counts,
            archive,
            dendritic,
            grid.resolution(),
        );
        let Some(weight) = transmitted else {
            return;
        };

        inputs.entry(conn.target).or_default().push(NodeInput {
            source: conn.source,
            time: head.time,
            weight,
            multiplicity: counts.pre,
            port: conn.port,
        });
        if let Some(recorder) = conn.weight_recorder {
            self.weight_events.push((
                recorder,
                WeightEvent {
                    sender: conn.source,
                    target: conn.target,
                    port: conn.port,
                    time: head.time,
                    weight,
                    connection: Some(conn.id),
                },
            ));
        }
    }

    pub fn take_outbox(&mut self) -> Vec<OutgoingSpike> {
        std::mem::take(&mut self.outbox)
    }

    pub fn take_weight_events(&mut self) -> Vec<(NodeId, WeightEvent)> {
        std::mem::take(&mut self.weight_events)
    }
}

// ============================================================================
// SPIKE ROUTER
// ============================================================================

/// One outgoing edge of a source node
#[derive(Debug, Clone, Copy, PartialEq)]
struct Route {
    connection: ConnectionId,
    target: NodeId,
    port: usize,
    vp: usize,
    delay: Delay,
}

/// Source → connection table built from every VP when a run is prepared.
#[derive(Debug, Clone, Default)]
pub struct SpikeRouter {
    routes: BTreeMap<NodeId, Vec<Route>>,
    /// Volume transmitter → synapses listening to it
    dopamine: BTreeMap<NodeId, Vec<Route>>,
    min_delay: Option<Step>,
    max_delay: Option<Step>,
}

impl SpikeRouter {
    pub fn build(
        vps: &[VirtualProcess],
        volume_transmitters: &BTreeSet<NodeId>,
        grid: &TimeGrid,
    ) -> Result<Self> {
        let mut router = Self::default();
        for vp in vps {
            for conn in vp.connections() {
                let steps = conn.delay_steps(grid)?;
                let route = Route {
                    connection: conn.id,
                    target: conn.target,
                    port: conn.port,
                    vp: vp.index,
                    delay: conn.grid_delay(grid)?,
                };
                router.routes.entry(conn.source).or_default().push(route);
                if let Some(vt) = conn.volume_transmitter {
                    router.dopamine.entry(vt).or_default().push(route);
                }
                router.min_delay = Some(router.min_delay.map_or(steps.total(), |d| d.min(steps.total())));
                router.max_delay = Some(router.max_delay.map_or(steps.total(), |d| d.max(steps.total())));
            }
        }
        for routes in router.routes.values_mut().chain(router.dopamine.values_mut()) {
            routes.sort_by_key(|r| r.connection);
        }
        router.dopamine.retain(|vt, _| volume_transmitters.contains(vt));
        Ok(router)
    }

    /// Smallest total delay in steps, if any connection exists
    pub fn min_delay(&self) -> Option<Step> {
        self.min_delay
    }

    pub fn max_delay(&self) -> Option<Step> {
        self.max_delay
    }

    /// Deliver spikes collected from every VP into the target queues.
    pub fn route(&self, mut spikes: Vec<OutgoingSpike>, vps: &mut [VirtualProcess]) {
        spikes.sort_by(|a, b| a.time.total_cmp(&b.time).then(a.source.cmp(&b.source)));
        for spike in spikes {
            for r in self.routes.get(&spike.source).into_iter().flatten() {
                let arrival = arrival_time(spike.time, &r.delay, EventKind::Pre);
                vps[r.vp].enqueue(SpikeEvent {
                    source: spike.source,
                    target: r.target,
                    connection: r.connection,
                    time: arrival,
                    multiplicity: spike.multiplicity,
                    port: r.port,
                    kind: EventKind::Pre,
                });
                for d in self.dopamine.get(&r.target).into_iter().flatten() {
                    vps[d.vp].enqueue(SpikeEvent {
                        source: r.target,
                        target: d.target,
                        connection: d.connection,
                        time: arrival_time(arrival, &d.delay, EventKind::Dopamine),
                        multiplicity: spike.multiplicity,
                        port: d.port,
                        kind: EventKind::Dopamine,
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::VoltageArchive;
    use crate::node::{EmittedSpike, ParrotNeuron};
    use crate::rules::{ClopathParams, SynapseModel, VoltageSample};
    use crate::synapse::Synapse;

    #[test]
    fn test_assignment_is_layout_arithmetic() {
        let layout = VpLayout::new(2, 3).unwrap();
        assert_eq!(layout.total_vps(), 6);
        assert_eq!(layout.assign_virtual_process(13), 1);
        assert_eq!(layout.vp_to_rank(5), 1);
        assert_eq!(layout.vp_to_thread(5), 2);
        assert!(layout.is_local(13, 1));
        assert!(VpLayout::new(0, 1).is_err());
    }

    fn static_conn(id: usize, source: NodeId, target: NodeId, delay: f64) -> Connection {
        Connection {
            id: ConnectionId(id),
            source,
            target,
            port: 0,
            model_name: "static_synapse".into(),
            delay: Delay::total_only(delay),
            synapse: Synapse::new(SynapseModel::Static, 1.0),
            weight_recorder: None,
            volume_transmitter: None,
        }
    }

    #[test]
    fn test_router_min_delay_and_delivery() {
        let grid = TimeGrid::new(0.1).unwrap();
        let mut vps = vec![VirtualProcess::new(0, grid), VirtualProcess::new(1, grid)];
        vps[0].add_node(2, Box::new(ParrotNeuron::new(false)));
        vps[1].add_node(3, Box::new(ParrotNeuron::new(false)));
        vps[0].add_connection(static_conn(0, 1, 2, 1.5));
        vps[1].add_connection(static_conn(1, 1, 3, 0.5));
        for vp in vps.iter_mut() {
            vp.prepare(&grid).unwrap();
        }

        let router = SpikeRouter::build(&vps, &BTreeSet::new(), &grid).unwrap();
        assert_eq!(router.min_delay(), Some(5));
        assert_eq!(router.max_delay(), Some(15));

        let spike = OutgoingSpike {
            source: 1,
            time: 1.0,
            multiplicity: 1,
        };
        router.route(vec![spike], &mut vps);
        assert_eq!(vps[0].pending_events(), 1);
        assert_eq!(vps[1].pending_events(), 1);

        vps[1].run_slice(0, 16, &grid);
        let out = vps[1].take_outbox();
        assert_eq!(out.len(), 1);
        assert!((out[0].time - 1.6).abs() < 1e-9);
    }
    /// Archives a resting sample every step
    #[derive(Debug, Default)]
    struct Resting {
        archive: VoltageArchive,
    }

    impl NodeModel for Resting {
        fn model_name(&self) -> &str {
            "resting"
        }

        fn update(&mut self, ctx: &StepContext, _inputs: &[NodeInput]) -> Vec<EmittedSpike> {
            let sample = VoltageSample {
                u: -65.0,
                u_bar_plus: -65.0,
                u_bar_minus: -65.0,
            };
            self.archive.push(ctx.t_end(), sample);
            Vec::new()
        }

        fn voltage_archive(&self) -> Option<&VoltageArchive> {
            Some(&self.archive)
        }

        fn voltage_archive_mut(&mut self) -> Option<&mut VoltageArchive> {
            Some(&mut self.archive)
        }
    }

    #[test]
    fn test_slice_end_prunes_archive_to_oldest_reader() {
        let grid = TimeGrid::new(0.1).unwrap();
        let mut vp = VirtualProcess::new(0, grid);
        vp.add_node(2, Box::new(Resting::default()));
        vp.add_node(3, Box::new(Resting::default()));
        for (id, t_last) in [(0, 6.0), (1, 8.0)] {
            let mut conn = static_conn(id, 1, 2, 1.0);
            conn.model_name = "clopath_synapse".into();
            conn.synapse = Synapse::new(SynapseModel::Clopath(ClopathParams::default()), 1.0);
            conn.synapse.t_last = t_last;
            vp.add_connection(conn);
        }
        vp.prepare(&grid).unwrap();

        vp.run_slice(0, 100, &grid);
        // node 2 is read back to 6.0 - 1.0 ms, node 3 has no reader
        let pruned = vp.node(2).and_then(|n| n.voltage_archive()).unwrap();
        assert!((50..=52).contains(&pruned.len()), "{}", pruned.len());
        assert!(pruned.sample_at(5.0).is_some());
        let kept = vp.node(3).and_then(|n| n.voltage_archive()).unwrap();
        assert_eq!(kept.len(), 100);
    }
}
