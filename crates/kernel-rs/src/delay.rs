//! Axonal / dendritic delay split.
//!
//! Synapse types either expose a single total `delay` or the two parts
//! `axonal_delay` and `dendritic_delay`, never both. Total-only types store the
//! whole delay as dendritic.

use nestling_core::{ensure_non_negative, KernelError, Result, Step, TimeGrid};
use serde::{Deserialize, Serialize};

/// Which delay fields a synapse type accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DelayKind {
    /// Only `delay`
    Total,
    /// Only `axonal_delay` and `dendritic_delay`
    Split,
}

/// Connection delay (ms)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Delay {
    pub axonal: f64,
    pub dendritic: f64,
}

impl Delay {
    pub fn total_only(delay: f64) -> Self {
        Self {
            axonal: 0.0,
            dendritic: delay,
        }
    }

    pub fn split(axonal: f64, dendritic: f64) -> Self {
        Self { axonal, dendritic }
    }

    pub fn total(&self) -> f64 {
        self.axonal + self.dendritic
    }

    pub fn default_for(kind: DelayKind) -> Self {
        match kind {
            DelayKind::Total => Self::total_only(1.0),
            DelayKind::Split => Self::split(0.0, 1.0),
        }
    }
}

/// Delay fields present in a connect / set-status request
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DelaySpec {
    pub delay: Option<f64>,
    pub axonal_delay: Option<f64>,
    pub dendritic_delay: Option<f64>,
}

impl DelaySpec {
    pub fn is_empty(&self) -> bool {
        self.delay.is_none() && self.axonal_delay.is_none() && self.dendritic_delay.is_none()
    }

    /// Consume a dictionary key if it is a delay field
    pub fn take_field(&mut self, key: &str, value: f64) -> bool {
        match key {
            "delay" => self.delay = Some(value),
            "axonal_delay" => self.axonal_delay = Some(value),
            "dendritic_delay" => self.dendritic_delay = Some(value),
            _ => return false,
        }
        true
    }
}

/// Reject delay fields the synapse type does not own
pub fn validate(model: &str, kind: DelayKind, requested: &DelaySpec) -> Result<()> {
    let offending = match kind {
        DelayKind::Total if requested.axonal_delay.is_some() => Some("axonal_delay"),
        DelayKind::Total if requested.dendritic_delay.is_some() => Some("dendritic_delay"),
        DelayKind::Split if requested.delay.is_some() => Some("delay"),
        _ => None,
    };
    match offending {
        Some(field) => Err(KernelError::AmbiguousDelay {
            model: model.to_string(),
            field: field.to_string(),
        }),
        None => Ok(()),
    }
}

/// Reject a split delay whose parts are both zero
pub fn validate_nonzero(model: &str, kind: DelayKind, delay: &Delay) -> Result<()> {
    if kind == DelayKind::Split && delay.axonal == 0.0 && delay.dendritic == 0.0 {
        return Err(KernelError::ZeroDelay {
            model: model.to_string(),
        });
    }
    Ok(())
}

/// Merge a request into the current delay, validating field ownership and ranges.
pub fn apply(model: &str, kind: DelayKind, current: Delay, requested: &DelaySpec) -> Result<Delay> {
    validate(model, kind, requested)?;

    let delay = match kind {
        DelayKind::Total => match requested.delay {
            Some(d) => {
                ensure_non_negative("delay", d)?;
                Delay::total_only(d)
            }
            None => current,
        },
        DelayKind::Split => {
            let axonal = requested.axonal_delay.unwrap_or(current.axonal);
            let dendritic = requested.dendritic_delay.unwrap_or(current.dendritic);
            ensure_non_negative("axonal_delay", axonal)?;
            ensure_non_negative("dendritic_delay", dendritic)?;
            Delay::split(axonal, dendritic)
        }
    };

    validate_nonzero(model, kind, &delay)?;
    Ok(delay)
}

/// Delay converted onto the step grid
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelaySteps {
    pub axonal: Step,
    pub dendritic: Step,
}

impl DelaySteps {
    pub fn total(&self) -> Step {
        self.axonal + self.dendritic
    }
}

/// Round a delay onto the grid. The total must be at least one step.
pub fn to_steps(delay: &Delay, grid: &TimeGrid) -> Result<DelaySteps> {
    let steps = DelaySteps {
        axonal: grid.steps_rounded(delay.axonal),
        dendritic: grid.steps_rounded(delay.dendritic),
    };
    if steps.total() < 1 {
        return Err(KernelError::bad_property(
            "delay",
            delay.total(),
            "must be at least one resolution step",
        ));
    }
    Ok(steps)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nestling_core::ErrorKind;

    #[test]
    fn test_total_type_rejects_split_fields() {
        let spec = DelaySpec {
            axonal_delay: Some(1.0),
            ..Default::default()
        };
        let err = validate("stdp_synapse", DelayKind::Total, &spec).unwrap_err();
        assert!(matches!(err, KernelError::AmbiguousDelay { ref field, .. } if field == "axonal_delay"));

        let spec = DelaySpec {
            dendritic_delay: Some(1.0),
            ..Default::default()
        };
        assert!(validate("stdp_synapse", DelayKind::Total, &spec).is_err());
    }

    #[test]
    fn test_split_type_rejects_total() {
        let spec = DelaySpec {
            delay: Some(1.0),
            ..Default::default()
        };
        let err = validate("stdp_pl_synapse_hom_ax_delay", DelayKind::Split, &spec).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn test_zero_split_delay() {
        let spec = DelaySpec {
            axonal_delay: Some(0.0),
            dendritic_delay: Some(0.0),
            ..Default::default()
        };
        let err = apply("ax", DelayKind::Split, Delay::default_for(DelayKind::Split), &spec)
            .unwrap_err();
        assert!(matches!(err, KernelError::ZeroDelay { .. }));
    }

    #[test]
    fn test_partial_split_update_keeps_other_part() {
        let spec = DelaySpec {
            axonal_delay: Some(2.0),
            ..Default::default()
        };
        let d = apply("ax", DelayKind::Split, Delay::split(0.0, 1.5), &spec).unwrap();
        assert_eq!(d, Delay::split(2.0, 1.5));
        assert_eq!(d.total(), 3.5);
    }

    #[test]
    fn test_negative_delay_is_range_error() {
        let spec = DelaySpec {
            delay: Some(-1.0),
            ..Default::default()
        };
        let err = apply("static_synapse", DelayKind::Total, Delay::total_only(1.0), &spec)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Range);
    }

    #[test]
    fn test_to_steps() {
        let grid = TimeGrid::new(0.1).unwrap();
        let s = to_steps(&Delay::split(0.3, 0.7), &grid).unwrap();
        assert_eq!(s, DelaySteps { axonal: 3, dendritic: 7 });
        assert!(to_steps(&Delay::total_only(0.01), &grid).is_err());
    }
}
