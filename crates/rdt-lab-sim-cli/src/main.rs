use anyhow::{Context, Result};
use clap::Parser;
use std::fs;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tracing::{Level, info};

use rdt_lab_abstract::{AppFeed, Generation, SimConfig};
use rdt_lab_simulator::{
    LineFeed, LogSink, ScriptedFeed, SimulationReport, Simulator, SyntheticFeed, scenario_runner,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Stop-and-wait reliable transfer simulator")]
struct Args {
    /// Protocol generation: 2.0, 2.1, 2.2 or 3.0.
    #[arg(short, long, default_value = "3.0")]
    generation: Generation,

    /// Probability that a packet is corrupted in transit.
    #[arg(short = 'm', long = "munge", default_value_t = 0.0)]
    corrupt_rate: f64,

    /// Probability that a packet is lost in transit (3.0 only).
    #[arg(short = 'l', long = "loss", default_value_t = 0.0)]
    loss_rate: f64,

    /// Retransmission timeout in milliseconds (3.0 only).
    #[arg(short = 't', long = "timeout")]
    timeout_ms: Option<u64>,

    #[arg(long)]
    min_latency: Option<u64>,
    #[arg(long)]
    max_latency: Option<u64>,

    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Give up after this many milliseconds spent awaiting acknowledgements.
    /// Time spent waiting for input is not counted.
    #[arg(long = "max-duration")]
    max_duration_ms: Option<u64>,

    /// Read messages from a file, one per line.
    #[arg(short, long, conflicts_with = "count")]
    file: Option<PathBuf>,

    /// Send this many generated messages instead of reading input.
    #[arg(long)]
    count: Option<u32>,

    /// Send these messages, in order.
    #[arg(long = "message", conflicts_with_all = ["file", "count"])]
    messages: Vec<String>,

    /// Load a scenario from disk. Other session flags are ignored.
    #[arg(long)]
    scenario: Option<PathBuf>,

    /// Write a JSON trace of the finished simulation.
    #[arg(long)]
    trace_out: Option<PathBuf>,

    /// More output (-v debug, -vv trace).
    #[arg(short, long, action = clap::ArgAction::Count, conflicts_with = "quiet")]
    verbose: u8,

    /// Only warnings and errors.
    #[arg(short, long)]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args);
    info!("rdt-lab starting…");

    let report = if let Some(path) = &args.scenario {
        scenario_runner::run_scenario(path).await?
    } else {
        run_session(&args).await?
    };

    print_summary(&report);
    if let Some(trace_path) = &args.trace_out {
        write_trace(trace_path, &report)?;
    }

    Ok(())
}

impl Args {
    fn sim_config(&self) -> SimConfig {
        let defaults = SimConfig::default();
        SimConfig {
            loss_rate: self.loss_rate,
            corrupt_rate: self.corrupt_rate,
            min_latency: self.min_latency.unwrap_or(defaults.min_latency),
            max_latency: self.max_latency.unwrap_or(defaults.max_latency),
            timeout_ms: self.timeout_ms.unwrap_or(defaults.timeout_ms),
            seed: self.seed,
            max_duration_ms: self.max_duration_ms.unwrap_or(defaults.max_duration_ms),
            ..defaults
        }
    }

    fn feed(&self) -> Result<Box<dyn AppFeed>> {
        if let Some(path) = &self.file {
            return Ok(Box::new(LineFeed::open(path)?));
        }
        if let Some(count) = self.count {
            return Ok(Box::new(SyntheticFeed::new("Packet", count)));
        }
        if !self.messages.is_empty() {
            return Ok(Box::new(ScriptedFeed::new(self.messages.iter().cloned())));
        }
        info!("Reading messages from stdin, one per line (EOF to finish)");
        Ok(Box::new(LineFeed::new(
            BufReader::new(std::io::stdin()),
            "stdin",
        )))
    }
}

fn init_logging(args: &Args) {
    let level = if args.quiet {
        Level::WARN
    } else {
        match args.verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };
    tracing_subscriber::fmt().with_max_level(level).init();
}

async fn run_session(args: &Args) -> Result<SimulationReport> {
    let sim = Simulator::new(
        args.generation,
        args.sim_config(),
        args.feed()?,
        Box::new(LogSink),
    );
    sim.run_until_complete()
        .await
        .with_context(|| format!("{} session failed", args.generation))
}

fn print_summary(report: &SimulationReport) {
    info!(
        "{}: {} delivered in {} ms; sender sent {} packets ({} retransmissions, {} timeouts); receiver saw {} duplicates, {} corrupt",
        report.generation,
        report.delivered_data.len(),
        report.duration_ms,
        report.sender.packets_sent,
        report.sender.retransmissions,
        report.sender.timeouts,
        report.receiver.duplicates,
        report.receiver.corrupt
    );
    info!(
        "links: forward {}/{}/{} backward {}/{}/{} (sent/dropped/corrupted)",
        report.forward.transmissions,
        report.forward.dropped,
        report.forward.corrupted,
        report.backward.transmissions,
        report.backward.dropped,
        report.backward.corrupted
    );
}

fn write_trace(path: &Path, report: &SimulationReport) -> Result<()> {
    let data = serde_json::to_vec_pretty(report).context("Failed to serialize simulation trace")?;
    fs::write(path, &data)
        .with_context(|| format!("Failed to write trace file {}", path.display()))?;
    Ok(())
}
