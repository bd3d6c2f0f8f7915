//! Simulation state machine and the slice loop.

use std::collections::BTreeSet;

use nestling_core::{KernelError, NodeId, Result, Step, TimeGrid};
use rayon::prelude::*;
use rayon::ThreadPool;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::distribution::{SpikeRouter, VirtualProcess};
use crate::recorder::WeightEvent;

/// Kernel lifecycle
///
/// ```text
/// Uninitialized --create--> Built --prepare--> Paused --run--> Running --> Paused
///                                                 |
///                                              cleanup --> Stopped --prepare--> Paused
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SimulationState {
    #[default]
    Uninitialized,
    Built,
    Running,
    Paused,
    Stopped,
}

impl SimulationState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Built => "built",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Stopped => "stopped",
        }
    }

    /// Nodes and connections can only be added outside prepare/cleanup
    pub fn allows_structural_change(&self) -> bool {
        !matches!(self, Self::Running | Self::Paused)
    }

    pub fn ensure_structural_change(&self, what: &str) -> Result<()> {
        if self.allows_structural_change() {
            Ok(())
        } else {
            Err(KernelError::KernelState(format!(
                "cannot {what} while the kernel is {}; call cleanup() first",
                self.name()
            )))
        }
    }
}

/// Step counter and slice loop
#[derive(Debug, Default)]
pub struct Scheduler {
    pub state: SimulationState,
    /// Next step to integrate; simulation time is `step · h`
    pub step: Step,
    slice_len: Step,
    router: SpikeRouter,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn router(&self) -> &SpikeRouter {
        &self.router
    }

    pub fn prepare(
        &mut self,
        vps: &mut [VirtualProcess],
        volume_transmitters: &BTreeSet<NodeId>,
        grid: &TimeGrid,
    ) -> Result<()> {
        match self.state {
            SimulationState::Paused | SimulationState::Running => {
                return Err(KernelError::KernelState(format!(
                    "prepare() called while the kernel is {}",
                    self.state.name()
                )))
            }
            _ => {}
        }
        for vp in vps.iter_mut() {
            vp.prepare(grid)?;
        }
        self.router = SpikeRouter::build(vps, volume_transmitters, grid)?;
        self.slice_len = self.router.min_delay().unwrap_or(1).max(1);
        self.state = SimulationState::Paused;
        info!(
            step = self.step,
            min_delay_steps = self.slice_len,
            vps = vps.len(),
            "kernel prepared"
        );
        Ok(())
    }

    /// Advance `n_steps` in `min_delay` slices. Weight events of every slice are
    /// handed to `sink` in VP order.
    pub fn run(
        &mut self,
        n_steps: Step,
        vps: &mut [VirtualProcess],
        pool: &ThreadPool,
        grid: &TimeGrid,
        print_time: bool,
        mut sink: impl FnMut(Vec<(NodeId, WeightEvent)>),
    ) -> Result<()> {
        if self.state != SimulationState::Paused {
            return Err(KernelError::KernelState(format!(
                "run() requires a prepared kernel, state is {}",
                self.state.name()
            )));
        }
        self.state = SimulationState::Running;
        let end = self.step + n_steps;

        while self.step < end {
            let from = self.step;
            let to = (from + self.slice_len).min(end);

            pool.install(|| {
                vps.par_iter_mut()
                    .for_each(|vp| vp.run_slice(from, to, grid));
            });

            let mut spikes = Vec::new();
            let mut weights = Vec::new();
            for vp in vps.iter_mut() {
                spikes.extend(vp.take_outbox());
                weights.extend(vp.take_weight_events());
            }
            debug!(from, to, spikes = spikes.len(), "slice done");
            self.router.route(spikes, vps);
            sink(weights);

            self.step = to;
            if print_time {
                info!(
                    "[ {:>5.1}% ] t = {:.3} ms",
                    100.0 * (self.step - (end - n_steps)) as f64 / n_steps.max(1) as f64,
                    grid.time_of(self.step)
                );
            }
        }

        self.state = SimulationState::Paused;
        Ok(())
    }

    pub fn cleanup(&mut self) -> Result<()> {
        if self.state != SimulationState::Paused {
            return Err(KernelError::KernelState(format!(
                "cleanup() called while the kernel is {}",
                self.state.name()
            )));
        }
        self.state = SimulationState::Stopped;
        debug!(step = self.step, "kernel cleaned up");
        Ok(())
    }
}
