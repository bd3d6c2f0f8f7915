//! # nestling CLI
//!
//! Pairing protocols and model catalog for the nestling kernel.

use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use nestling_kernel::delay::DelayKind;
use nestling_kernel::{ConnectionRule, Kernel, KernelParams, SynSpec, SynapseModel};
use serde_json::json;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "nestling")]
#[command(version)]
#[command(about = "Event-driven spiking-network kernel with synaptic plasticity", long_about = None)]
struct Cli {
    /// Kernel parameters as JSON (resolution, num_processes, local_num_threads, print_time)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// More log output (-v info, -vv debug); RUST_LOG overrides
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a pre/post pairing protocol through one plastic synapse
    Pair {
        /// Synapse model
        #[arg(short, long, default_value = "stdp_synapse")]
        rule: String,
        /// Post minus pre spike time (ms)
        #[arg(long, default_value_t = 10.0, allow_hyphen_values = true)]
        dt: f64,
        /// Number of pairings
        #[arg(short, long, default_value_t = 60)]
        pairings: usize,
        /// Interval between pairings (ms)
        #[arg(long, default_value_t = 1000.0)]
        period: f64,
        /// Initial weight
        #[arg(short, long, default_value_t = 1.0)]
        weight: f64,
        /// Extra synapse parameters, e.g. `--set lambda=0.05`
        #[arg(long = "set", value_parser = parse_key_val)]
        params: Vec<(String, f64)>,
    },

    /// List synapse models with their defaults
    Models,

    /// Print the effective kernel parameters as JSON
    Config,
}

fn parse_key_val(s: &str) -> Result<(String, f64), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got `{s}`"))?;
    let value = value
        .trim()
        .parse::<f64>()
        .map_err(|e| format!("{key}: {e}"))?;
    Ok((key.trim().to_string(), value))
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

fn load_params(path: Option<&PathBuf>) -> anyhow::Result<KernelParams> {
    let Some(path) = path else {
        return Ok(KernelParams::default());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let params = KernelParams::from_json(&text)
        .with_context(|| format!("parsing {}", path.display()))?;
    debug!(?params, "kernel parameters loaded");
    Ok(params)
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let params = load_params(cli.config.as_ref())?;

    match cli.command {
        Commands::Pair {
            rule,
            dt,
            pairings,
            period,
            weight,
            params: syn_params,
        } => pair(params, &rule, dt, pairings, period, weight, &syn_params)?,

        Commands::Models => {
            let kernel = Kernel::new(params)?;
            println!("{}", "Synapse models:".green().bold());
            for name in kernel.synapse_models() {
                let model = SynapseModel::by_name(name)?;
                let delays = match model.delay_kind() {
                    DelayKind::Total => "delay",
                    DelayKind::Split => "axonal_delay + dendritic_delay",
                };
                println!();
                println!("  {} ({})", name.cyan(), delays.dimmed());
                let mut defaults: Vec<_> = kernel.get_defaults(name)?.into_iter().collect();
                defaults.sort_by(|a, b| a.0.cmp(&b.0));
                for (key, value) in defaults {
                    println!("    {key:<18} {value}");
                }
            }
        }

        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&params)?);
        }
    }

    Ok(())
}

/// Pre spike every `period` ms, post spike `dt` later, relayed through parrots
fn pair(
    params: KernelParams,
    rule: &str,
    dt: f64,
    pairings: usize,
    period: f64,
    weight: f64,
    syn_params: &[(String, f64)],
) -> anyhow::Result<()> {
    let model = SynapseModel::by_name(rule)?;
    if model.needs_volume_transmitter() || model.needs_voltage_archive() {
        bail!("{rule} needs extra wiring and cannot run a plain pairing protocol");
    }
    if dt.abs() >= period / 2.0 {
        bail!("|dt| must be smaller than half the pairing period");
    }

    let mut kernel = Kernel::new(params)?;
    let onset = period / 2.0;
    let pre_times: Vec<f64> = (0..pairings).map(|i| onset + i as f64 * period).collect();
    let post_times: Vec<f64> = pre_times.iter().map(|t| t + dt).collect();

    let sg_pre = kernel.create_with("spike_generator", 1, &json!({ "spike_times": pre_times }))?;
    let sg_post = kernel.create_with("spike_generator", 1, &json!({ "spike_times": post_times }))?;
    let pre = kernel.create("parrot_neuron", 1)?;
    let post = kernel.create("parrot_neuron", 1)?;
    let relay = SynSpec::new("static_synapse");
    kernel.connect(&sg_pre, &pre, ConnectionRule::OneToOne, &relay)?;
    kernel.connect(&sg_post, &post, ConnectionRule::OneToOne, &relay)?;

    let mut spec = SynSpec::new(rule).with("weight", weight).with("receptor_type", 1.0);
    for (key, value) in syn_params {
        spec = spec.with(key, *value);
    }
    let conn = kernel.connect(&pre, &post, ConnectionRule::OneToOne, &spec)?[0];

    println!(
        "{} {} with dt = {} ms, {} pairings",
        "Pairing".green().bold(),
        rule.cyan(),
        dt,
        pairings
    );
    let bar = ProgressBar::new(pairings as u64);
    bar.set_style(
        ProgressStyle::with_template("{bar:40.cyan/blue} {pos}/{len} pairings {msg}")?
            .progress_chars("=> "),
    );
    for _ in 0..pairings {
        kernel.simulate(period)?;
        let w = kernel.get_status(conn)?["weight"];
        bar.set_message(format!("w = {w:.6}"));
        bar.inc(1);
    }
    bar.finish_and_clear();

    let status = kernel.get_status(conn)?;
    let w = status["weight"];
    info!(time = kernel.time(), weight = w, "pairing protocol done");
    let change = if weight != 0.0 { 100.0 * (w - weight) / weight.abs() } else { 0.0 };
    let summary = format!("{weight} -> {w:.6} ({change:+.2}%)");
    let summary = if w > weight {
        summary.green()
    } else if w < weight {
        summary.red()
    } else {
        summary.normal()
    };
    println!("  weight: {summary}");
    Ok(())
}
