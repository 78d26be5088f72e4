use clap::Parser;
use serde::Serialize;
use serde_json::json;
use std::error::Error;
use std::fs;
use std::path::PathBuf;
use wns_core_rs::config::Params;
use wns_core_rs::harq::{DecoderRegistry, HarqConfig};
use wns_core_rs::link::{HarqLinkConfig, HarqLinkSummary, HarqLinkWorld};
use wns_core_rs::probe::RecordingSink;
use wns_core_rs::sim::{SimTime, Simulator};

#[derive(Debug, Parser)]
#[command(
    name = "harq-link",
    about = "Run HARQ over a fixed-TTI link and print a JSON summary"
)]
struct Args {
    /// Number of transport blocks to send
    #[arg(long, default_value_t = 100)]
    blocks: u64,

    #[arg(long, default_value_t = 64)]
    payload_bytes: usize,

    /// Parallel HARQ processes (sender and receiver)
    #[arg(long, default_value_t = 8)]
    processes: usize,

    /// Number of redundancy versions
    #[arg(long, default_value_t = 4)]
    rvs: usize,

    #[arg(long, default_value_t = 3)]
    retransmission_limit: u32,

    /// uniform_random | threshold
    #[arg(long, default_value = "uniform_random")]
    decoder: String,

    /// uniform_random: block error rate of a single transmission
    #[arg(long, default_value_t = 0.1)]
    initial_per: f64,

    #[arg(long, default_value_t = 1.0)]
    rolloff_factor: f64,

    /// threshold: transmissions needed to decode
    #[arg(long, default_value_t = 2)]
    required_transmissions: u64,

    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// TTI length (us)
    #[arg(long, default_value_t = 1000)]
    tti_us: u64,

    /// Block propagation latency (us)
    #[arg(long, default_value_t = 100)]
    latency_us: u64,

    /// Delay before ACK/NACK reaches the sender (us)
    #[arg(long, default_value_t = 4000)]
    feedback_delay_us: u64,

    /// JSON file with HARQ keys (numSenderProcesses, decoder, ...) overriding the flags
    #[arg(long)]
    config: Option<PathBuf>,

    /// Output viz JSON file
    #[arg(long)]
    viz_json: Option<PathBuf>,

    /// Disable logging
    #[arg(long)]
    quiet: bool,
}

#[derive(Serialize)]
struct Report {
    #[serde(flatten)]
    summary: HarqLinkSummary,
    decoder: String,
    mean_retransmissions: Option<f64>,
}

fn harq_config(args: &Args) -> Result<HarqConfig, Box<dyn Error>> {
    let decoder = match args.decoder.as_str() {
        "threshold" => json!({
            "name": "threshold",
            "requiredTransmissions": args.required_transmissions,
        }),
        name => json!({
            "name": name,
            "initialPER": args.initial_per,
            "rolloffFactor": args.rolloff_factor,
            "seed": args.seed,
        }),
    };
    let mut params = Params::new()
        .with("numSenderProcesses", args.processes)
        .with("numReceiverProcesses", args.processes)
        .with("numRVs", args.rvs)
        .with("retransmissionLimit", args.retransmission_limit)
        .with("decoder", decoder);
    if let Some(path) = &args.config {
        params.merge(&Params::from_json_file(path)?);
    }
    Ok(HarqConfig::from_source(&params)?)
}

fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(if args.quiet {
            tracing_subscriber::EnvFilter::new("off")
        } else {
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
        })
        .with_writer(std::io::stderr)
        .with_file(true)
        .with_line_number(true)
        .with_target(true)
        .init();

    let harq = harq_config(&args)?;
    let decoder = harq.decoder.clone();
    let cfg = HarqLinkConfig {
        harq,
        blocks: args.blocks,
        payload_bytes: args.payload_bytes,
        tti: SimTime::from_micros(args.tti_us),
        latency: SimTime::from_micros(args.latency_us),
        feedback_delay: SimTime::from_micros(args.feedback_delay_us),
    };

    let sink = RecordingSink::new();
    let mut sim = Simulator::default();
    let mut world = HarqLinkWorld::new(cfg, &DecoderRegistry::with_builtin(), sink.clone())?;
    if args.viz_json.is_some() {
        world.enable_viz();
    }
    world.start(&mut sim)?;
    sim.run(&mut world);
    if let Some(e) = world.take_error() {
        return Err(e.into());
    }

    if let Some(path) = &args.viz_json
        && let Some(viz) = world.viz.as_ref()
    {
        fs::write(path, viz.to_json()?)?;
    }

    let report = Report {
        summary: world.summary(),
        decoder,
        mean_retransmissions: sink.mean("harq.retransmissions"),
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
