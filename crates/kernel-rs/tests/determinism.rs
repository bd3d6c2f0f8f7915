//! Reproducibility: segmented runs, thread/process layouts and spike
//! multiplicity.

mod common;

use std::collections::HashMap;

use common::{irregular_train, pairing_network_with, params, RELAY_DELAY};
use nestling_kernel::{ConnectionRule, Kernel, KernelParams, NodeId, SynSpec, WeightEvent};
use serde_json::json;

const HORIZON: f64 = 1000.0;

struct Net {
    kernel: Kernel,
    recorder: NodeId,
}

/// Six generator-driven parrots joined all-to-all by two plastic models
/// with different delays, all recorded.
fn recurrent_network(kernel_params: KernelParams) -> Net {
    let mut k = Kernel::new(kernel_params).unwrap();
    let parrots = k.create("parrot_neuron", 6).unwrap();
    let recorder = k.create("weight_recorder", 1).unwrap().ids[0];
    let relay = SynSpec::new("static_synapse").with("delay", RELAY_DELAY);
    for (i, &p) in parrots.ids.iter().enumerate() {
        let sg = k
            .create_with(
                "spike_generator",
                1,
                &json!({ "spike_times": irregular_train(10 + i as u64, HORIZON - 50.0) }),
            )
            .unwrap();
        k.connect(&sg, &p.into(), ConnectionRule::OneToOne, &relay).unwrap();
    }

    let rec = params(&[("weight_recorder", recorder as f64)]);
    k.copy_model("stdp_synapse", "rec_stdp", &rec).unwrap();
    k.copy_model("stdp_triplet_synapse", "rec_triplet", &rec).unwrap();
    k.connect(
        &parrots,
        &parrots,
        ConnectionRule::AllToAll,
        &SynSpec::new("rec_stdp").with("weight", 50.0).with("receptor_type", 1.0),
    )
    .unwrap();
    k.connect(
        &parrots,
        &parrots,
        ConnectionRule::AllToAll,
        &SynSpec::new("rec_triplet")
            .with("weight", 5.0)
            .with("delay", 2.3)
            .with("Aplus", 0.01)
            .with("receptor_type", 1.0),
    )
    .unwrap();
    Net { kernel: k, recorder }
}

fn snapshot(net: &Net) -> (Vec<HashMap<String, f64>>, Vec<WeightEvent>) {
    let statuses = net
        .kernel
        .get_connections(None, None, None)
        .into_iter()
        .map(|id| net.kernel.get_status(id).unwrap())
        .collect();
    let events = net.kernel.weight_recorder_events(net.recorder).unwrap().to_vec();
    (statuses, events)
}

#[test]
fn segmented_simulation_is_bit_identical() {
    let mut whole = recurrent_network(KernelParams::default());
    whole.kernel.simulate(HORIZON).unwrap();

    let mut pieces = recurrent_network(KernelParams::default());
    for dt in [0.5, 99.5, 250.0, 650.0] {
        pieces.kernel.simulate(dt).unwrap();
    }

    assert!((pieces.kernel.time() - whole.kernel.time()).abs() < 1e-9);
    let (a, b) = (snapshot(&whole), snapshot(&pieces));
    assert!(!a.1.is_empty());
    assert_eq!(a, b);
}

#[test]
fn prepare_run_cleanup_matches_simulate() {
    let mut whole = recurrent_network(KernelParams::default());
    whole.kernel.simulate(300.0).unwrap();

    let mut stepped = recurrent_network(KernelParams::default());
    stepped.kernel.prepare().unwrap();
    for _ in 0..3 {
        stepped.kernel.run(100.0).unwrap();
    }
    stepped.kernel.cleanup().unwrap();

    assert_eq!(snapshot(&whole), snapshot(&stepped));
}

#[test]
fn results_do_not_depend_on_layout() {
    let layout = |num_processes, local_num_threads| KernelParams {
        num_processes,
        local_num_threads,
        ..KernelParams::default()
    };
    let mut reference = recurrent_network(layout(1, 1));
    reference.kernel.simulate(HORIZON).unwrap();
    let expected = snapshot(&reference);

    for (p, t) in [(1, 4), (2, 3), (3, 1)] {
        let mut net = recurrent_network(layout(p, t));
        net.kernel.simulate(HORIZON).unwrap();
        assert_eq!(snapshot(&net), expected, "{p} processes x {t} threads");
    }
}

#[test]
fn irregular_trains_are_seeded_and_on_grid() {
    let train = irregular_train(7, 500.0);
    assert_eq!(train, irregular_train(7, 500.0));
    assert_ne!(train, irregular_train(8, 500.0));
    assert!(train.windows(2).all(|w| w[1] - w[0] > 1.9));
    assert!(train.iter().all(|t| (t * 10.0 - (t * 10.0).round()).abs() < 1e-9));
}

// ----------------------------------------------------------------------------
// Multiplicity
// ----------------------------------------------------------------------------

const PRE: f64 = 100.0;

/// Weight after one pairing whose presynaptic side is given by `pre_generator`
fn weight_after(pre_generator: serde_json::Value, post_time: f64) -> f64 {
    let mut net = pairing_network_with(
        KernelParams::default(),
        "stdp_synapse",
        &[("weight", 50.0)],
        &pre_generator,
        &json!({"spike_times": [post_time], "precise_times": true}),
        true,
    );
    net.kernel.simulate(200.0).unwrap();
    net.weight()
}

fn check_multiplicity_limit(delta_t: f64) {
    let post_time = PRE + delta_t;
    let doubled = weight_after(
        json!({"spike_times": [PRE], "spike_multiplicities": [2], "precise_times": true}),
        post_time,
    );
    assert!(doubled != 50.0);

    let mut last_diff = f64::INFINITY;
    for delta in [0.05, 0.01, 0.001, 0.0001] {
        let spread = weight_after(
            json!({"spike_times": [PRE, PRE + delta], "precise_times": true}),
            post_time,
        );
        let diff = (spread - doubled).abs();
        assert!(diff < last_diff, "Δt {delta_t}, δ {delta}: {diff} !< {last_diff}");
        last_diff = diff;
    }
    assert!(last_diff < 1e-3, "Δt {delta_t}: {last_diff}");
}

#[test]
fn multiplicity_is_the_coincident_limit_for_facilitation() {
    check_multiplicity_limit(10.0);
}

#[test]
fn multiplicity_is_the_coincident_limit_for_depression() {
    check_multiplicity_limit(-10.0);
}
