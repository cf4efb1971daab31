//! # vprop Hub Binary
//!
//! Vehicle property hub over the simulated transport.
//!
//! # Usage
//!
//! ```bash
//! # Run until Ctrl-C
//! vprop_hub --config-dir config/
//!
//! # Run diagnostic commands, print the dump, stop after 50 ticks
//! vprop_hub --config-dir config/ --command read-speed --command fold-mirrors --dump --ticks 50
//!
//! # Verbose JSON logging
//! vprop_hub --config-dir config/ -v --json
//! ```

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use vprop_common::config::LogLevel;
use vprop_common::vhal::config::load_config_dir;
use vprop_common::vhal::consts::DEFAULT_CONFIG_DIR;
use vprop_hub::commands;
use vprop_hub::{HandlerRegistry, RetryPolicy, SimulatedTransport, VehicleHub};

/// vprop Hub - vehicle property hub with pluggable domain handlers
#[derive(Parser, Debug)]
#[command(name = "vprop_hub")]
#[command(version)]
#[command(about = "Vehicle property hub with pluggable domain handlers")]
#[command(long_about = None)]
struct Args {
    /// Config directory holding hub.toml and properties.toml
    #[arg(long, value_name = "DIR", default_value = DEFAULT_CONFIG_DIR)]
    config_dir: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long)]
    json: bool,

    /// Run a diagnostic command after init (can be specified multiple times)
    #[arg(long = "command", value_name = "LABEL", action = clap::ArgAction::Append)]
    commands: Vec<String>,

    /// Print the hub dump after init
    #[arg(long)]
    dump: bool,

    /// Stop after this many simulation ticks instead of waiting for Ctrl-C
    #[arg(long, value_name = "N")]
    ticks: Option<u64>,
}

fn main() {
    if let Err(e) = run() {
        error!("Hub failed: {}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = load_config_dir(&args.config_dir);
    setup_tracing(
        &args,
        config.as_ref().map(|c| c.hub.shared.log_level).unwrap_or_default(),
    );
    let config = config?;

    info!(
        "vprop hub v{} starting as '{}'",
        env!("CARGO_PKG_VERSION"),
        config.hub.shared.service_name
    );

    let transport = Arc::new(SimulatedTransport::new(
        &config.properties,
        &config.hub.simulation,
    ));
    let handlers = HandlerRegistry::with_builtin_handlers().create_handlers(&config.hub.handlers)?;
    let hub = VehicleHub::new(
        transport.clone(),
        handlers,
        RetryPolicy::from(&config.hub.retry),
    )?;

    let running = Arc::new(AtomicBool::new(true));
    let flag = running.clone();
    ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        flag.store(false, Ordering::SeqCst);
    })?;

    hub.init()?;

    for label in &args.commands {
        match commands::run(&hub, label) {
            Ok(outcome) => println!("{label}: {outcome}"),
            Err(e) => error!("Command '{label}' failed: {e}"),
        }
    }
    if args.dump {
        print!("{}", hub.dump());
    }

    let mut ticks = 0u64;
    while running.load(Ordering::SeqCst) && args.ticks.is_none_or(|max| ticks < max) {
        transport.tick();
        ticks += 1;
        thread::sleep(transport.tick_period());
    }

    hub.release();
    info!("vprop hub stopped after {ticks} ticks");
    Ok(())
}

/// Setup tracing subscriber.
///
/// `--verbose` forces DEBUG; otherwise `RUST_LOG` wins over the configured level.
fn setup_tracing(args: &Args, configured: LogLevel) {
    let filter = if args.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(configured.as_directive()))
    };

    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
