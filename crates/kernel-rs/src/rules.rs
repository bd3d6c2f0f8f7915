//! Synapse models and their weight-update rules.
//!
//! Parameters use NEST names (`tau_plus`, `Wmax`, ...) and are read and written
//! through `serde_json` maps, so `set_defaults` / `set_status` dictionaries map
//! one-to-one onto the parameter structs.

use std::collections::HashMap;

use nestling_core::{ensure_non_negative, ensure_positive, KernelError, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::delay::DelayKind;
use crate::trace::{BumpKind, Trace, TraceSet};

// ============================================================================
// PARAMETERS
// ============================================================================

/// Multiplicative (Gütig) STDP
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StdpParams {
    pub tau_plus: f64,   // Time constant for potentiation (ms)
    pub tau_minus: f64,  // Time constant for depression (ms)
    pub lambda: f64,     // Step size for potentiation
    pub alpha: f64,      // Asymmetry parameter
    #[serde(rename = "Wmax")]
    pub w_max: f64,      // Maximum weight
    pub mu_plus: f64,    // Weight dependence exponent for LTP
    pub mu_minus: f64,   // Weight dependence exponent for LTD
}

impl Default for StdpParams {
    fn default() -> Self {
        Self {
            tau_plus: 20.0,
            tau_minus: 20.0,
            lambda: 0.01,
            alpha: 1.0,
            w_max: 100.0,
            mu_plus: 1.0,
            mu_minus: 1.0,
        }
    }
}

/// Power-law STDP (Morrison 2007), with axonal/dendritic delay split
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StdpPowerLawParams {
    pub tau_plus: f64,
    pub tau_minus: f64,
    pub lambda: f64,
    pub alpha: f64,
    pub mu: f64,         // Exponent of the potentiation weight dependence
    #[serde(rename = "Wmax")]
    pub w_max: f64,
}

impl Default for StdpPowerLawParams {
    fn default() -> Self {
        Self {
            tau_plus: 20.0,
            tau_minus: 20.0,
            lambda: 0.1,
            alpha: 1.0,
            mu: 0.4,
            w_max: 100.0,
        }
    }
}

/// Triplet STDP (Pfister & Gerstner 2006)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StdpTripletParams {
    pub tau_plus: f64,
    pub tau_plus_triplet: f64,
    pub tau_minus: f64,
    pub tau_minus_triplet: f64,
    #[serde(rename = "Aplus")]
    pub a_plus: f64,
    #[serde(rename = "Aminus")]
    pub a_minus: f64,
    #[serde(rename = "Aplus_triplet")]
    pub a_plus_triplet: f64,
    #[serde(rename = "Aminus_triplet")]
    pub a_minus_triplet: f64,
    #[serde(rename = "Wmax")]
    pub w_max: f64,
}

impl Default for StdpTripletParams {
    fn default() -> Self {
        Self {
            tau_plus: 16.8,
            tau_plus_triplet: 101.0,
            tau_minus: 33.7,
            tau_minus_triplet: 125.0,
            a_plus: 5e-10,
            a_minus: 7e-3,
            a_plus_triplet: 6.2e-3,
            a_minus_triplet: 2.3e-4,
            w_max: 100.0,
        }
    }
}

/// Inhibitory STDP (Vogels & Sprekeler 2011). The sign of `Wmax` fixes the sign of the weight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VogelsSprekelerParams {
    pub tau: f64,      // Time constant (ms)
    pub eta: f64,      // Learning rate
    pub alpha: f64,    // Target rate parameter
    #[serde(rename = "Wmax")]
    pub w_max: f64,    // Maximum weight
}

impl Default for VogelsSprekelerParams {
    fn default() -> Self {
        Self {
            tau: 20.0,
            eta: 0.001,
            alpha: 0.12,
            w_max: 1.0,
        }
    }
}

/// Exponentially weight-dependent STDP (Jonke et al. 2017)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JonkeParams {
    pub lambda: f64,
    pub alpha: f64,
    pub beta: f64,
    pub mu_plus: f64,
    pub mu_minus: f64,
    pub tau_plus: f64,
    pub tau_minus: f64,
    #[serde(rename = "Wmax")]
    pub w_max: f64,
}

impl Default for JonkeParams {
    fn default() -> Self {
        Self {
            lambda: 0.01,
            alpha: 1.0,
            beta: 0.0,
            mu_plus: 0.0,
            mu_minus: 0.0,
            tau_plus: 20.0,
            tau_minus: 20.0,
            w_max: 100.0,
        }
    }
}

/// Voltage-based STDP (Clopath et al. 2010)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClopathParams {
    pub tau_x: f64,
    #[serde(rename = "A_LTD")]
    pub a_ltd: f64,
    #[serde(rename = "A_LTP")]
    pub a_ltp: f64,
    pub theta_minus: f64,
    pub theta_plus: f64,
    #[serde(rename = "Wmin")]
    pub w_min: f64,
    #[serde(rename = "Wmax")]
    pub w_max: f64,
}

impl Default for ClopathParams {
    fn default() -> Self {
        Self {
            tau_x: 15.0,
            a_ltd: 14e-5,
            a_ltp: 8e-5,
            theta_minus: -70.6,
            theta_plus: -45.3,
            w_min: 0.0,
            w_max: 100.0,
        }
    }
}

/// Dopamine-modulated STDP (Izhikevich 2007, Potjans 2010)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StdpDopamineParams {
    #[serde(rename = "A_plus")]
    pub a_plus: f64,
    #[serde(rename = "A_minus")]
    pub a_minus: f64,
    pub tau_plus: f64,
    pub tau_minus: f64,
    pub tau_c: f64,    // Eligibility trace time constant (ms)
    pub tau_n: f64,    // Dopamine trace time constant (ms)
    pub b: f64,        // Dopaminergic baseline concentration
    #[serde(rename = "Wmin")]
    pub w_min: f64,
    #[serde(rename = "Wmax")]
    pub w_max: f64,
}

impl Default for StdpDopamineParams {
    fn default() -> Self {
        Self {
            a_plus: 1.0,
            a_minus: 1.5,
            tau_plus: 20.0,
            tau_minus: 20.0,
            tau_c: 1000.0,
            tau_n: 200.0,
            b: 0.0,
            w_min: 0.0,
            w_max: 200.0,
        }
    }
}

// ============================================================================
// SYNAPSE MODELS
// ============================================================================

/// Synapse model types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SynapseModel {
    /// Fixed weight
    Static,

    /// STDP synapse
    Stdp(StdpParams),

    /// Power-law STDP with split delays
    StdpPowerLaw(StdpPowerLawParams),

    /// Triplet STDP
    StdpTriplet(StdpTripletParams),

    /// Vogels-Sprekeler inhibitory STDP
    VogelsSprekeler(VogelsSprekelerParams),

    /// Jonke weight-dependent STDP
    Jonke(JonkeParams),

    /// Clopath voltage-based STDP
    Clopath(ClopathParams),

    /// Dopamine-modulated STDP
    StdpDopamine(StdpDopamineParams),
}

/// Trace values a rule reads at one spike
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PairingTraces {
    pub pre: f64,
    pub pre_triplet: f64,
    pub post: f64,
    pub post_triplet: f64,
}

impl SynapseModel {
    /// Default instance of every registered model
    pub fn catalog() -> Vec<SynapseModel> {
        vec![
            Self::Static,
            Self::Stdp(StdpParams::default()),
            Self::StdpPowerLaw(StdpPowerLawParams::default()),
            Self::StdpTriplet(StdpTripletParams::default()),
            Self::VogelsSprekeler(VogelsSprekelerParams::default()),
            Self::Jonke(JonkeParams::default()),
            Self::Clopath(ClopathParams::default()),
            Self::StdpDopamine(StdpDopamineParams::default()),
        ]
    }

    pub fn by_name(name: &str) -> Result<SynapseModel> {
        Self::catalog()
            .into_iter()
            .find(|m| m.name() == name)
            .ok_or_else(|| KernelError::UnknownModel(name.to_string()))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Static => "static_synapse",
            Self::Stdp(_) => "stdp_synapse",
            Self::StdpPowerLaw(_) => "stdp_pl_synapse_hom_ax_delay",
            Self::StdpTriplet(_) => "stdp_triplet_synapse",
            Self::VogelsSprekeler(_) => "vogels_sprekeler_synapse",
            Self::Jonke(_) => "jonke_synapse",
            Self::Clopath(_) => "clopath_synapse",
            Self::StdpDopamine(_) => "stdp_dopamine_synapse",
        }
    }

    pub fn delay_kind(&self) -> DelayKind {
        match self {
            Self::StdpPowerLaw(_) => DelayKind::Split,
            _ => DelayKind::Total,
        }
    }

    pub fn is_plastic(&self) -> bool {
        !matches!(self, Self::Static)
    }

    /// Whether postsynaptic spikes must be back-propagated to this synapse
    pub fn needs_post_spikes(&self) -> bool {
        !matches!(self, Self::Static | Self::Clopath(_))
    }

    pub fn needs_volume_transmitter(&self) -> bool {
        matches!(self, Self::StdpDopamine(_))
    }

    pub fn needs_voltage_archive(&self) -> bool {
        matches!(self, Self::Clopath(_))
    }

    /// Inclusive weight bounds enforced after every update
    pub fn weight_bounds(&self) -> (f64, f64) {
        match self {
            Self::Static => (f64::NEG_INFINITY, f64::INFINITY),
            Self::Stdp(p) => (0.0, p.w_max),
            Self::StdpPowerLaw(p) => (0.0, p.w_max),
            Self::StdpTriplet(p) => (0.0, p.w_max),
            Self::VogelsSprekeler(p) => {
                if p.w_max >= 0.0 {
                    (0.0, p.w_max)
                } else {
                    (p.w_max, 0.0)
                }
            }
            Self::Jonke(p) => (0.0, p.w_max),
            Self::Clopath(p) => (p.w_min, p.w_max),
            Self::StdpDopamine(p) => (p.w_min, p.w_max),
        }
    }

    pub fn clamp_weight(&self, w: f64) -> f64 {
        let (lo, hi) = self.weight_bounds();
        w.max(lo).min(hi)
    }

    /// Fresh traces with this model's time constants
    pub fn trace_set(&self) -> TraceSet {
        let unit = |tau| Trace::new(tau, BumpKind::Unit);
        let (pre, pre_triplet, post, post_triplet) = match self {
            Self::Static => (unit(1.0), unit(1.0), unit(1.0), unit(1.0)),
            Self::Stdp(p) => (unit(p.tau_plus), unit(p.tau_plus), unit(p.tau_minus), unit(p.tau_minus)),
            Self::StdpPowerLaw(p) => {
                (unit(p.tau_plus), unit(p.tau_plus), unit(p.tau_minus), unit(p.tau_minus))
            }
            Self::StdpTriplet(p) => (
                unit(p.tau_plus),
                unit(p.tau_plus_triplet),
                unit(p.tau_minus),
                unit(p.tau_minus_triplet),
            ),
            Self::VogelsSprekeler(p) => (unit(p.tau), unit(p.tau), unit(p.tau), unit(p.tau)),
            Self::Jonke(p) => (unit(p.tau_plus), unit(p.tau_plus), unit(p.tau_minus), unit(p.tau_minus)),
            Self::Clopath(p) => {
                let x_bar = Trace::new(p.tau_x, BumpKind::RateCoded);
                (x_bar, x_bar, unit(1.0), unit(1.0))
            }
            Self::StdpDopamine(p) => {
                (unit(p.tau_plus), unit(p.tau_plus), unit(p.tau_minus), unit(p.tau_minus))
            }
        };
        TraceSet::new(pre, pre_triplet, post, post_triplet)
    }

    /// Copy of `traces` with this model's time constants, keeping values and times
    pub fn retune(&self, traces: &TraceSet) -> TraceSet {
        let mut fresh = self.trace_set();
        for (dst, src) in [
            (&mut fresh.pre, &traces.pre),
            (&mut fresh.pre_triplet, &traces.pre_triplet),
            (&mut fresh.post, &traces.post),
            (&mut fresh.post_triplet, &traces.post_triplet),
        ] {
            dst.value = src.value;
            dst.last_update = src.last_update;
        }
        fresh
    }

    // ------------------------------------------------------------------------
    // Pair-based rules
    // ------------------------------------------------------------------------

    /// Weight after a presynaptic spike (depression side)
    pub fn on_pre_spike(&self, w: f64, tr: &PairingTraces) -> f64 {
        let new_w = match self {
            Self::Stdp(p) => {
                let norm = w / p.w_max;
                let norm = norm - p.alpha * p.lambda * norm.powf(p.mu_minus) * tr.post;
                norm.max(0.0) * p.w_max
            }
            Self::StdpPowerLaw(p) => w - p.lambda * p.alpha * w * tr.post,
            Self::StdpTriplet(p) => w - tr.post * (p.a_minus + p.a_minus_triplet * tr.pre_triplet),
            Self::VogelsSprekeler(p) => {
                let w = vogels_facilitate(p, w, tr.post);
                vogels_depress(p, w)
            }
            Self::Jonke(p) => {
                if p.lambda == 0.0 {
                    w
                } else {
                    w - p.lambda * p.alpha * (p.mu_minus * w).exp() * tr.post
                }
            }
            Self::Static | Self::Clopath(_) | Self::StdpDopamine(_) => w,
        };
        self.clamp_weight(new_w)
    }

    /// Weight after a postsynaptic spike (facilitation side)
    pub fn on_post_spike(&self, w: f64, tr: &PairingTraces) -> f64 {
        let new_w = match self {
            Self::Stdp(p) => {
                let norm = w / p.w_max;
                let norm = norm + p.lambda * (1.0 - norm).powf(p.mu_plus) * tr.pre;
                norm.min(1.0) * p.w_max
            }
            Self::StdpPowerLaw(p) => w + p.lambda * w.powf(p.mu) * tr.pre,
            Self::StdpTriplet(p) => w + tr.pre * (p.a_plus + p.a_plus_triplet * tr.post_triplet),
            Self::VogelsSprekeler(p) => vogels_facilitate(p, w, tr.pre),
            Self::Jonke(p) => {
                if p.lambda == 0.0 {
                    w
                } else {
                    w + p.lambda * ((p.mu_plus * w).exp() * tr.pre - p.beta)
                }
            }
            Self::Static | Self::Clopath(_) | Self::StdpDopamine(_) => w,
        };
        self.clamp_weight(new_w)
    }

    // ------------------------------------------------------------------------
    // Parameter dictionaries
    // ------------------------------------------------------------------------

    /// Parameters as a NEST-style dictionary
    pub fn params(&self) -> HashMap<String, f64> {
        let value = match self {
            Self::Static => return HashMap::new(),
            Self::Stdp(p) => serde_json::to_value(p),
            Self::StdpPowerLaw(p) => serde_json::to_value(p),
            Self::StdpTriplet(p) => serde_json::to_value(p),
            Self::VogelsSprekeler(p) => serde_json::to_value(p),
            Self::Jonke(p) => serde_json::to_value(p),
            Self::Clopath(p) => serde_json::to_value(p),
            Self::StdpDopamine(p) => serde_json::to_value(p),
        };
        value
            .ok()
            .and_then(|v| v.as_object().cloned())
            .map(|obj| {
                obj.into_iter()
                    .filter_map(|(k, v)| v.as_f64().map(|f| (k, f)))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Copy with `updates` applied and validated. Leaves `self` untouched.
    pub fn with_params(&self, updates: &HashMap<String, f64>) -> Result<SynapseModel> {
        if updates.is_empty() {
            return Ok(self.clone());
        }
        let name = self.name();
        let model = match self {
            Self::Static => {
                let key = updates.keys().min().cloned().unwrap_or_default();
                return Err(KernelError::UnknownParameter {
                    model: name.to_string(),
                    name: key,
                });
            }
            Self::Stdp(p) => Self::Stdp(merge(name, p, updates)?),
            Self::StdpPowerLaw(p) => Self::StdpPowerLaw(merge(name, p, updates)?),
            Self::StdpTriplet(p) => Self::StdpTriplet(merge(name, p, updates)?),
            Self::VogelsSprekeler(p) => Self::VogelsSprekeler(merge(name, p, updates)?),
            Self::Jonke(p) => Self::Jonke(merge(name, p, updates)?),
            Self::Clopath(p) => Self::Clopath(merge(name, p, updates)?),
            Self::StdpDopamine(p) => Self::StdpDopamine(merge(name, p, updates)?),
        };
        model.validate()?;
        Ok(model)
    }

    /// Range checks on time constants and learning parameters
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Static => {}
            Self::Stdp(p) => {
                ensure_positive("tau_plus", p.tau_plus)?;
                ensure_positive("tau_minus", p.tau_minus)?;
                ensure_positive("Wmax", p.w_max)?;
                ensure_non_negative("lambda", p.lambda)?;
            }
            Self::StdpPowerLaw(p) => {
                ensure_positive("tau_plus", p.tau_plus)?;
                ensure_positive("tau_minus", p.tau_minus)?;
                ensure_non_negative("lambda", p.lambda)?;
                ensure_positive("Wmax", p.w_max)?;
            }
            Self::StdpTriplet(p) => {
                ensure_positive("tau_plus", p.tau_plus)?;
                ensure_positive("tau_plus_triplet", p.tau_plus_triplet)?;
                ensure_positive("tau_minus", p.tau_minus)?;
                ensure_positive("tau_minus_triplet", p.tau_minus_triplet)?;
                ensure_positive("Wmax", p.w_max)?;
            }
            Self::VogelsSprekeler(p) => {
                ensure_positive("tau", p.tau)?;
                ensure_non_negative("eta", p.eta)?;
            }
            Self::Jonke(p) => {
                ensure_positive("tau_plus", p.tau_plus)?;
                ensure_positive("tau_minus", p.tau_minus)?;
                ensure_positive("Wmax", p.w_max)?;
            }
            Self::Clopath(p) => {
                ensure_positive("tau_x", p.tau_x)?;
                ensure_non_negative("A_LTD", p.a_ltd)?;
                ensure_non_negative("A_LTP", p.a_ltp)?;
                if p.w_min > p.w_max {
                    return Err(KernelError::bad_property("Wmin", p.w_min, "must not exceed Wmax"));
                }
            }
            Self::StdpDopamine(p) => {
                ensure_positive("tau_plus", p.tau_plus)?;
                ensure_positive("tau_minus", p.tau_minus)?;
                ensure_positive("tau_c", p.tau_c)?;
                ensure_positive("tau_n", p.tau_n)?;
                if p.w_min > p.w_max {
                    return Err(KernelError::bad_property("Wmin", p.w_min, "must not exceed Wmax"));
                }
            }
        }
        Ok(())
    }
}

fn vogels_facilitate(p: &VogelsSprekelerParams, w: f64, k: f64) -> f64 {
    let new_w = w.abs() + p.eta * k;
    new_w.min(p.w_max.abs()).copysign(p.w_max)
}

fn vogels_depress(p: &VogelsSprekelerParams, w: f64) -> f64 {
    let new_w = w.abs() - p.alpha * p.eta;
    new_w.max(0.0).copysign(p.w_max)
}

fn merge<T: Serialize + DeserializeOwned>(
    model: &str,
    params: &T,
    updates: &HashMap<String, f64>,
) -> Result<T> {
    let mut value = serde_json::to_value(params)
        .map_err(|e| KernelError::Configuration(format!("{model}: {e}")))?;
    let obj = value
        .as_object_mut()
        .ok_or_else(|| KernelError::Configuration(format!("{model}: parameters are not a map")))?;

    for (key, v) in updates {
        if !obj.contains_key(key) {
            return Err(KernelError::UnknownParameter {
                model: model.to_string(),
                name: key.clone(),
            });
        }
        let number = serde_json::Number::from_f64(*v)
            .ok_or_else(|| KernelError::bad_property(key, *v, "must be finite"))?;
        obj.insert(key.clone(), serde_json::Value::Number(number));
    }

    serde_json::from_value(value).map_err(|e| KernelError::Configuration(format!("{model}: {e}")))
}

// ============================================================================
// DOPAMINE AND CLOPATH HELPERS
// ============================================================================

/// Weight change of a dopamine synapse over `minus_dt = t_last - t` (≤ 0)
/// with eligibility `c` and dopamine `n` taken at `t_last`.
pub fn dopamine_weight_drift(p: &StdpDopamineParams, c: f64, n: f64, minus_dt: f64) -> f64 {
    let taus = (p.tau_c + p.tau_n) / (p.tau_c * p.tau_n);
    -c * (n / taus * (taus * minus_dt).exp_m1() - p.b * p.tau_c * (minus_dt / p.tau_c).exp_m1())
}

/// Membrane sample provided by voltage-archiving targets
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VoltageSample {
    /// Membrane potential (mV)
    pub u: f64,
    /// Slow low-pass filtered potential (mV)
    pub u_bar_plus: f64,
    /// Fast low-pass filtered potential (mV)
    pub u_bar_minus: f64,
}

impl ClopathParams {
    /// LTP rate over one step of length `h`
    pub fn ltp_increment(&self, s: &VoltageSample, h: f64) -> f64 {
        self.a_ltp * (s.u - self.theta_plus).max(0.0) * (s.u_bar_plus - self.theta_minus).max(0.0) * h
    }

    /// LTD amplitude at a presynaptic spike
    pub fn ltd_amplitude(&self, s: &VoltageSample) -> f64 {
        self.a_ltd * (s.u_bar_minus - self.theta_minus).max(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nestling_core::ErrorKind;

    #[test]
    fn test_catalog_names_are_unique() {
        let names: Vec<_> = SynapseModel::catalog().iter().map(|m| m.name()).collect();
        let mut dedup = names.clone();
        dedup.sort();
        dedup.dedup();
        assert_eq!(names.len(), dedup.len());
        assert!(SynapseModel::by_name("stdp_synapse").is_ok());
        assert_eq!(
            SynapseModel::by_name("no_such_synapse").unwrap_err().kind(),
            ErrorKind::Lookup
        );
    }

    #[test]
    fn test_with_params_roundtrip_names() {
        let m = SynapseModel::by_name("stdp_synapse").unwrap();
        let mut upd = HashMap::new();
        upd.insert("Wmax".to_string(), 50.0);
        upd.insert("tau_plus".to_string(), 10.0);
        let m2 = m.with_params(&upd).unwrap();
        assert_eq!(m2.params()["Wmax"], 50.0);
        assert_eq!(m2.params()["tau_plus"], 10.0);
        assert_eq!(m.params()["Wmax"], 100.0);
    }

    #[test]
    fn test_negative_tau_is_bad_property() {
        let m = SynapseModel::by_name("jonke_synapse").unwrap();
        let mut upd = HashMap::new();
        upd.insert("tau_plus".to_string(), -1.0);
        assert_eq!(m.with_params(&upd).unwrap_err().kind(), ErrorKind::Range);
    }

    #[test]
    fn test_unknown_parameter() {
        let m = SynapseModel::by_name("vogels_sprekeler_synapse").unwrap();
        let mut upd = HashMap::new();
        upd.insert("tau_plus".to_string(), 1.0);
        assert!(matches!(
            m.with_params(&upd),
            Err(KernelError::UnknownParameter { .. })
        ));
    }

    #[test]
    fn test_stdp_clamps_at_bounds() {
        let m = SynapseModel::Stdp(StdpParams {
            lambda: 10.0,
            ..Default::default()
        });
        let tr = PairingTraces {
            pre: 100.0,
            post: 100.0,
            ..Default::default()
        };
        assert_eq!(m.on_post_spike(90.0, &tr), 100.0);
        assert_eq!(m.on_pre_spike(10.0, &tr), 0.0);
    }

    #[test]
    fn test_vogels_keeps_sign_of_wmax() {
        let p = VogelsSprekelerParams {
            w_max: -1.0,
            ..Default::default()
        };
        let m = SynapseModel::VogelsSprekeler(p);
        let tr = PairingTraces {
            pre: 1.0,
            ..Default::default()
        };
        let w = m.on_post_spike(-0.5, &tr);
        assert!(w < -0.5);
        assert!(w >= -1.0);
    }

    #[test]
    fn test_dopamine_drift_without_dopamine_is_zero() {
        let p = StdpDopamineParams::default();
        assert_eq!(dopamine_weight_drift(&p, 1.0, 0.0, -10.0), 0.0);
        assert!(dopamine_weight_drift(&p, 1.0, 1.0, -10.0) > 0.0);
    }
}
