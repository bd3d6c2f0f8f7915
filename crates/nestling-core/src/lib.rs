//! # nestling core
//!
//! Shared types for the nestling spiking-network kernel.
//!
//! ## Contents
//!
//! | Item | Purpose |
//! |------|---------|
//! | [`KernelError`] | Closed error taxonomy raised by every kernel call |
//! | [`TimeGrid`] | Resolution-sized step grid with sub-step (off-grid) times |
//! | [`NodeId`], [`ConnectionId`] | Global identifiers |
//!
//! ## Design Philosophy
//!
//! 1. Configuration errors are raised where they happen and leave state unchanged
//! 2. Numerical saturation (weight clamping) is normal behaviour, not an error
//! 3. Results never depend on how many threads or processes run the kernel

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Global node identifier. Node ids start at 1.
pub type NodeId = usize;

/// Time point (ms)
pub type Time = f64;

/// Index of a resolution step on the simulation grid
pub type Step = i64;

/// Global connection identifier (creation order)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ConnectionId(pub usize);

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn#{}", self.0)
    }
}

/// Error category, independent of the concrete variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Ambiguous, missing or unknown configuration fields
    Configuration,
    /// Out-of-range value for a parameter that must stay positive / non-negative
    Range,
    /// Operation attempted in the wrong scheduler state
    KernelState,
    /// Unknown node, connection or model
    Lookup,
}

/// Kernel errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum KernelError {
    #[error("Ambiguous delay for {model}: '{field}' cannot be set on this synapse type")]
    AmbiguousDelay { model: String, field: String },

    #[error("Zero delay for {model}: axonal_delay and dendritic_delay cannot both be zero")]
    ZeroDelay { model: String },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Unknown parameter '{name}' for {model}")]
    UnknownParameter { model: String, name: String },

    #[error("Unknown model: {0}")]
    UnknownModel(String),

    #[error("Bad property '{name}' = {value}: {reason}")]
    BadProperty { name: String, value: f64, reason: String },

    #[error("Kernel state error: {0}")]
    KernelState(String),

    #[error("Node not found: {0}")]
    UnknownNode(NodeId),

    #[error("Connection not found: {0}")]
    UnknownConnection(ConnectionId),
}

impl KernelError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::AmbiguousDelay { .. }
            | Self::ZeroDelay { .. }
            | Self::Configuration(_)
            | Self::UnknownParameter { .. } => ErrorKind::Configuration,
            Self::BadProperty { .. } => ErrorKind::Range,
            Self::KernelState(_) => ErrorKind::KernelState,
            Self::UnknownModel(_) | Self::UnknownNode(_) | Self::UnknownConnection(_) => {
                ErrorKind::Lookup
            }
        }
    }

    pub fn bad_property(name: &str, value: f64, reason: &str) -> Self {
        Self::BadProperty {
            name: name.to_string(),
            value,
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, KernelError>;

/// Require `value > 0`
pub fn ensure_positive(name: &str, value: f64) -> Result<()> {
    if value > 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(KernelError::bad_property(name, value, "must be positive"))
    }
}

/// Require `value >= 0`
pub fn ensure_non_negative(name: &str, value: f64) -> Result<()> {
    if value >= 0.0 && !value.is_nan() {
        Ok(())
    } else {
        Err(KernelError::bad_property(name, value, "must not be negative"))
    }
}

// ============================================================================
// TIME GRID
// ============================================================================

/// Relative tolerance (in steps) under which a time counts as lying on the grid
pub const GRID_EPS: f64 = 1e-9;

/// Fixed-resolution time grid.
///
/// Step `n` covers the interval `(n·h, (n+1)·h]`. An arrival time `t` is due at
/// step `ceil(t / h)`; times within [`GRID_EPS`] steps of a grid point snap to it,
/// so `0.1 * 3` and `0.3` land on the same step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeGrid {
    resolution: Time,
}

impl TimeGrid {
    pub fn new(resolution: Time) -> Result<Self> {
        ensure_positive("resolution", resolution)?;
        Ok(Self { resolution })
    }

    pub fn resolution(&self) -> Time {
        self.resolution
    }

    /// Grid time of step `n`
    pub fn time_of(&self, step: Step) -> Time {
        step as f64 * self.resolution
    }

    /// Step at which an event arriving at `t` becomes due
    pub fn ceil_step(&self, t: Time) -> Step {
        let x = t / self.resolution;
        let r = x.round();
        if (x - r).abs() < GRID_EPS {
            r as Step
        } else {
            x.ceil() as Step
        }
    }

    /// Times within [`GRID_EPS`] steps of a grid point are moved onto it
    pub fn snap(&self, t: Time) -> Time {
        let x = t / self.resolution;
        let r = x.round();
        if (x - r).abs() < GRID_EPS {
            self.time_of(r as Step)
        } else {
            t
        }
    }

    /// `t` rounded up onto the grid
    pub fn ceil_time(&self, t: Time) -> Time {
        self.time_of(self.ceil_step(t))
    }

    /// Number of whole steps in a duration, rounded to nearest
    pub fn steps_rounded(&self, duration: Time) -> Step {
        (duration / self.resolution).round() as Step
    }

    /// Number of steps in a duration that must be a multiple of the resolution
    pub fn steps_exact(&self, duration: Time) -> Result<Step> {
        ensure_non_negative("duration", duration)?;
        let x = duration / self.resolution;
        let r = x.round();
        if (x - r).abs() < GRID_EPS * x.abs().max(1.0) {
            Ok(r as Step)
        } else {
            Err(KernelError::bad_property(
                "duration",
                duration,
                "must be a multiple of the resolution",
            ))
        }
    }

    /// Whether two times denote the same instant
    pub fn same_instant(&self, a: Time, b: Time) -> bool {
        ((a - b) / self.resolution).abs() < GRID_EPS
    }
}

impl Default for TimeGrid {
    fn default() -> Self {
        Self { resolution: 0.1 }
    }
}
