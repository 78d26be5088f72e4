use clap::Parser;
use serde::Serialize;
use std::error::Error;
use std::fs;
use std::path::PathBuf;
use wns_core_rs::config::Params;
use wns_core_rs::link::{ArqLinkConfig, ArqLinkSummary, ArqLinkWorld, EngineKind, LossModel};
use wns_core_rs::probe::RecordingSink;
use wns_core_rs::sim::{SimTime, Simulator};

#[derive(Debug, Parser)]
#[command(
    name = "arq-link",
    about = "Run an ARQ engine over a lossy fixed-latency link and print a JSON summary"
)]
struct Args {
    /// stop_and_wait | cumulative_ack | selective_repeat (or saw / gbn / sr)
    #[arg(long, default_value = "selective_repeat")]
    engine: EngineKind,

    /// Number of data frames produced by the source
    #[arg(long, default_value_t = 100)]
    packets: u64,

    /// Payload size in bytes (at least 8, the frame id)
    #[arg(long, default_value_t = 64)]
    payload_bytes: usize,

    /// windowSize (sequence space for cumulative_ack, send window for selective_repeat)
    #[arg(long, default_value_t = 8)]
    window: usize,

    /// sequenceNumberSize for selective_repeat; defaults to 2 * window
    #[arg(long)]
    sequence_number_size: Option<usize>,

    /// resendTimeout in seconds
    #[arg(long, default_value_t = 0.01)]
    resend_timeout: f64,

    /// One-way link latency (us)
    #[arg(long, default_value_t = 1000)]
    latency_us: u64,

    /// Source inter-frame interval (us)
    #[arg(long, default_value_t = 100)]
    interval_us: u64,

    /// Loss on the data direction: none, every:N, random:P[:SEED]
    #[arg(long, default_value = "none")]
    forward_loss: LossModel,

    /// Loss on the acknowledgement direction
    #[arg(long, default_value = "none")]
    reverse_loss: LossModel,

    /// JSON file with engine keys (windowSize, resendTimeout, ...) overriding the flags
    #[arg(long)]
    config: Option<PathBuf>,

    /// Run until this time (ms); defaults to running until completion
    #[arg(long)]
    until_ms: Option<u64>,

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
    summary: ArqLinkSummary,
    complete: bool,
    sim_secs: f64,
    rtt_mean_secs: Option<f64>,
}

fn engine_params(args: &Args) -> Result<Params, Box<dyn Error>> {
    let mut params = Params::new()
        .with("windowSize", args.window)
        .with("resendTimeout", args.resend_timeout)
        .with(
            "sequenceNumberSize",
            args.sequence_number_size.unwrap_or(2 * args.window),
        );
    if let Some(path) = &args.config {
        params.merge(&Params::from_json_file(path)?);
    }
    Ok(params)
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

    let cfg = ArqLinkConfig {
        engine: args.engine,
        params: engine_params(&args)?,
        latency: SimTime::from_micros(args.latency_us),
        packets: args.packets,
        payload_bytes: args.payload_bytes,
        interval: SimTime::from_micros(args.interval_us),
        forward_loss: args.forward_loss,
        reverse_loss: args.reverse_loss,
    };

    let sink = RecordingSink::new();
    let mut sim = Simulator::default();
    let mut world = ArqLinkWorld::new(cfg, sink.clone())?;
    if args.viz_json.is_some() {
        world.enable_viz();
    }
    world.start(&mut sim)?;

    match args.until_ms {
        Some(ms) => sim.run_until(SimTime::from_millis(ms), &mut world),
        None => sim.run(&mut world),
    }
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
        complete: world.is_complete(),
        sim_secs: sim.now().as_secs_f64(),
        rtt_mean_secs: sink.mean("arq.rtt"),
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
