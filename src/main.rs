// src/main.rs - Marionette host entry point
use clap::Parser;
use marionette_host::config::{self, Config};
use marionette_host::gestures::GestureLibrary;
use marionette_host::hardware::serial::SerialLink;
use marionette_host::kinematics::Marionette;
use marionette_host::positions::PositionStore;
use marionette_host::scheduler::MotionScheduler;
use marionette_host::tracking::Calibration;
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "marionette-host", about = "Motion control host for a string marionette")]
struct Args {
    /// Configuration file
    #[arg(short, long, default_value = "marionette.toml")]
    config: String,

    /// Override the serial port from the config
    #[arg(short, long)]
    port: Option<String>,

    /// Log at debug level
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_max_level(if args.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        })
        .init();

    tracing::info!("Starting marionette host");
    tracing::info!("Loading configuration from: {}", args.config);

    let mut config: Config = if Path::new(&args.config).exists() {
        config::load_config(&args.config).map_err(|e| {
            tracing::error!("Failed to load config from '{}': {}", args.config, e);
            Box::new(e) as Box<dyn std::error::Error + Send + Sync + 'static>
        })?
    } else {
        tracing::warn!("config file '{}' not found, using defaults", args.config);
        Config::default()
    };
    if let Some(port) = args.port {
        config.link.serial = port;
    }

    tracing::info!("Serial link: {} @ {} baud", config.link.serial, config.link.baud);
    tracing::info!(
        "Control interval: {}s, {} motors",
        config.motion.interval,
        config.motors.len()
    );

    let puppet = Marionette::from_config(&config)?;
    let positions = PositionStore::load(
        Path::new(&config.files.positions),
        &config
            .files
            .extra_positions
            .iter()
            .map(PathBuf::from)
            .collect::<Vec<_>>(),
    )?;
    let gestures = GestureLibrary::load(Path::new(&config.files.gestures))?;
    let calibration = Calibration::load(Path::new(&config.files.calibration))?;

    let link = SerialLink::open(&config.link)?;
    let scheduler = MotionScheduler::new(&config, puppet, positions, gestures, calibration);
    scheduler.start(Box::new(link));

    // Settle into the rest pose, then serve until interrupted.
    if scheduler.go_back_to_zero().is_none() {
        tracing::warn!(
            "rest position '{}' not defined, staying put",
            config.motion.rest_position
        );
    }

    tokio::signal::ctrl_c().await?;
    tracing::info!("Interrupt received, shutting down");
    scheduler.clear_pending();
    scheduler.shutdown().await;
    Ok(())
}
