use std::{
    process::ExitCode,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};

use anyhow::{Context, Result};
use clap::Parser;
use signal_hook::consts::{SIGINT, SIGTERM};
use tracing::info;

use udp_stats_relay::{args::Args, config::ConfigLayer, daemon, logging};

fn main() -> ExitCode {
    let args = Args::parse();

    if args.version {
        println!("UDP Forwarder Version: {}", env!("CARGO_PKG_VERSION"));
        return ExitCode::SUCCESS;
    }

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<()> {
    logging::init_logging(args.verbose, args.daemon);

    let file_layer = ConfigLayer::load(&args.config)?;
    let config = args
        .layer()
        .or(file_layer)
        .resolve(args.silent, args.daemon)?;

    if config.daemon {
        daemon::daemonize()?;
    }

    let term = Arc::new(AtomicBool::new(false));
    for signal in [SIGINT, SIGTERM] {
        signal_hook::flag::register(signal, Arc::clone(&term))
            .with_context(|| format!("failed to register handler for signal {signal}"))?;
    }

    let daemon_mode = config.daemon;
    let mut relay = udp_stats_relay::start(config)?;

    while !term.load(Ordering::Relaxed) {
        thread::sleep(Duration::from_millis(100));
    }

    if !daemon_mode {
        println!("\nStopping the forwarder.");
    }
    info!("Received shutdown signal");
    relay.shutdown();
    Ok(())
}
