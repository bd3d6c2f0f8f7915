//! Shared network builders for the integration tests.
#![allow(dead_code)]

use std::collections::HashMap;

use nestling_kernel::{ConnectionId, ConnectionRule, Kernel, KernelParams, NodeCollection, NodeId, SynSpec};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::{json, Value};

/// Delay of the generator → parrot connections (ms)
pub const RELAY_DELAY: f64 = 1.0;

/// Pre- and postsynaptic parrot driven by spike generators, joined by one
/// plastic connection onto the silent port of the postsynaptic parrot.
pub struct Pairing {
    pub kernel: Kernel,
    pub conn: ConnectionId,
    pub pre: NodeCollection,
    pub post: NodeCollection,
    pub recorder: NodeId,
}

impl Pairing {
    pub fn weight(&self) -> f64 {
        self.kernel.get_status(self.conn).unwrap()["weight"]
    }

    pub fn status(&self) -> HashMap<String, f64> {
        self.kernel.get_status(self.conn).unwrap()
    }
}

/// Time at which a generator spike at `t` leaves the parrot it drives
pub fn relayed(t: f64, resolution: f64) -> f64 {
    t + RELAY_DELAY + resolution
}

pub fn params(pairs: &[(&str, f64)]) -> HashMap<String, f64> {
    pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
}

pub fn pairing_network(
    kernel_params: KernelParams,
    model: &str,
    syn_params: &[(&str, f64)],
    pre_times: &[f64],
    post_times: &[f64],
    precise: bool,
) -> Pairing {
    pairing_network_with(
        kernel_params,
        model,
        syn_params,
        &json!({"spike_times": pre_times, "precise_times": precise}),
        &json!({"spike_times": post_times, "precise_times": precise}),
        precise,
    )
}

/// Like [`pairing_network`] with full generator dictionaries
pub fn pairing_network_with(
    kernel_params: KernelParams,
    model: &str,
    syn_params: &[(&str, f64)],
    pre_generator: &Value,
    post_generator: &Value,
    precise: bool,
) -> Pairing {
    let mut kernel = Kernel::new(kernel_params).unwrap();
    let parrot = if precise { "parrot_neuron_ps" } else { "parrot_neuron" };

    let sg_pre = kernel.create_with("spike_generator", 1, pre_generator).unwrap();
    let sg_post = kernel.create_with("spike_generator", 1, post_generator).unwrap();
    let pre = kernel.create(parrot, 1).unwrap();
    let post = kernel.create(parrot, 1).unwrap();
    let recorder = kernel.create("weight_recorder", 1).unwrap().ids[0];

    let relay = SynSpec::new("static_synapse").with("delay", RELAY_DELAY);
    kernel.connect(&sg_pre, &pre, ConnectionRule::OneToOne, &relay).unwrap();
    kernel.connect(&sg_post, &post, ConnectionRule::OneToOne, &relay).unwrap();

    kernel
        .copy_model(model, "recorded_synapse", &params(&[("weight_recorder", recorder as f64)]))
        .unwrap();
    let mut spec = SynSpec::new("recorded_synapse").with("receptor_type", 1.0);
    for (k, v) in syn_params {
        spec = spec.with(k, *v);
    }
    let conn = kernel.connect(&pre, &post, ConnectionRule::OneToOne, &spec).unwrap()[0];

    Pairing {
        kernel,
        conn,
        pre,
        post,
        recorder,
    }
}

/// Spike times on a 0.1 ms grid, spread irregularly over `[5, horizon)`
pub fn irregular_train(seed: u64, horizon: f64) -> Vec<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut t = 5.0;
    let mut times = Vec::new();
    while t < horizon {
        times.push((t * 10.0f64).round() / 10.0);
        t += rng.gen_range(2.0..32.0);
    }
    times
}
