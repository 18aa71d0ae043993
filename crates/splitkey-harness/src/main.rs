//! Split keyboard link simulator.
//!
//! # Usage
//!
//! ```bash
//! # Ten thousand steps with frequent rotation and a lossy ack channel
//! splitkey-sim --ticks 10000 --rekey-interval 8 --ack-loss 0.2
//!
//! # Reproduce a run with full protocol logging
//! RUST_LOG=splitkey_core=debug splitkey-sim --seed 42
//! ```

use std::process::ExitCode;

use clap::Parser;
use splitkey_core::{Half, ReceiverConfig};
use splitkey_harness::{InvariantRegistry, SimConfig, SimLink};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Split keyboard link simulator
#[derive(Parser, Debug)]
#[command(name = "splitkey-sim")]
#[command(about = "Deterministic simulation of the split keyboard radio link")]
#[command(version)]
struct Args {
    /// Seed for every random choice in the run
    #[arg(short, long, default_value = "0")]
    seed: u64,

    /// Number of simulation steps
    #[arg(short, long, default_value = "10000")]
    ticks: u64,

    /// Packets under the confirmed key before a rotation is pushed
    #[arg(long, default_value = "100")]
    rekey_interval: u32,

    /// Probability that an acknowledgement is lost
    #[arg(long, default_value = "0.0")]
    ack_loss: f64,

    /// Probability that a keyboard half power-cycles on a step
    #[arg(long, default_value = "0.0")]
    reset_rate: f64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> ExitCode {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    let config = SimConfig {
        seed: args.seed,
        receiver: ReceiverConfig { rekey_interval: args.rekey_interval, ..Default::default() },
        ack_loss: args.ack_loss,
        reset_rate: args.reset_rate,
        ..Default::default()
    };

    tracing::info!(seed = args.seed, ticks = args.ticks, "splitkey simulation starting");

    let mut link = match SimLink::new(config) {
        Ok(link) => link,
        Err(err) => {
            tracing::error!(error = %err, "failed to derive bootstrap keys");
            return ExitCode::FAILURE;
        },
    };

    let result = link.run(args.ticks, &InvariantRegistry::standard());

    let stats = link.stats();
    tracing::info!(
        steps = stats.steps,
        packets = stats.packets_sent,
        acks = stats.acks_sent,
        acks_lost = stats.acks_lost,
        acks_adopted = stats.acks_adopted,
        resets = stats.resets,
        "link stats"
    );
    tracing::info!(diagnostics = ?link.receiver().diagnostics(), "receiver");
    for half in Half::ALL {
        tracing::info!(
            half = ?half,
            key_id = link.keyboard(half).key_id(),
            diagnostics = ?link.keyboard(half).diagnostics(),
            "keyboard"
        );
    }

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(violations) => {
            for violation in &violations {
                tracing::error!(%violation, "invariant violated");
            }
            ExitCode::FAILURE
        },
    }
}
