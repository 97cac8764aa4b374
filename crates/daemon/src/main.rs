//! card-presenced
//!
//! Keeps a USB multi-format card reader's connection state in step with the
//! card-detect GPIO lines, so the host never sees an empty block device and
//! the reader is never left unbound by a bootloader-installed quirk.

mod config;
mod engine;
mod gpio;
mod quirk;
mod reader;
mod sampler;
mod service;

use anyhow::{Context, anyhow};
use clap::Parser;
use common::{PresenceEvent, PresenceEvents, PresenceMask, Slot, create_presence_bridge, setup_logging};
use config::DaemonConfig;
use engine::{EngineError, SyncEngine};
use gpio::{CdevLines, GpioError};
use reader::SysfsReader;
use sampler::PresenceSampler;
use std::convert::Infallible;
use std::process::ExitCode;
use std::thread::JoinHandle;
use thiserror::Error;
use tokio::signal;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "card-presenced")]
#[command(
    author,
    version,
    about = "Card reader presence daemon - connect the USB reader only while a card is inserted"
)]
#[command(long_about = "
Watches the card-detect lines of a multi-format card reader and authorizes
the reader's USB device only while at least one slot holds a card.

EXAMPLES:
    # Run with built-in board wiring
    card-presenced

    # Print which slots hold a card and exit
    card-presenced --sample

    # Run with debug logging
    card-presenced --log-level debug

CONFIGURATION:
    The daemon looks for configuration files in the following order:
    1. Path specified with --config
    2. ~/.config/card-presenced/daemon.toml
    3. /etc/card-presenced/daemon.toml
    4. Built-in defaults

EXIT STATUS:
    1  GPIO chip not found
    2  presence lines unavailable
    3  edge event request refused
    4  edge wait failed while idle
    5  edge wait failed while debouncing
    6  configuration or setup error
")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "PATH")]
    config: Option<std::path::PathBuf>,

    /// Save default configuration and exit
    #[arg(long)]
    save_config: bool,

    /// Print the effective configuration and exit
    #[arg(long)]
    print_config: bool,

    /// Print the current card presence and exit without touching USB state
    #[arg(long)]
    sample: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,
}

/// Reasons the daemon stops
#[derive(Debug, Error)]
enum DaemonExit {
    #[error(transparent)]
    Gpio(#[from] GpioError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("{0:#}")]
    Setup(anyhow::Error),
}

impl DaemonExit {
    fn exit_code(&self) -> u8 {
        match self {
            DaemonExit::Gpio(GpioError::ChipNotFound(_)) => 1,
            DaemonExit::Gpio(GpioError::LineRequest { .. }) => 2,
            DaemonExit::Gpio(GpioError::EdgeRequest { .. }) => 3,
            DaemonExit::Engine(e) => e.exit_code(),
            DaemonExit::Setup(_) => 6,
        }
    }
}

impl From<anyhow::Error> for DaemonExit {
    fn from(e: anyhow::Error) -> Self {
        DaemonExit::Setup(e)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(exit) => {
            error!("Exiting: {}", exit);
            eprintln!("Error: {}", exit);
            ExitCode::from(exit.exit_code())
        }
    }
}

async fn run(args: Args) -> Result<(), DaemonExit> {
    if args.save_config {
        let path = args
            .config
            .as_deref()
            .map(config::expand_path)
            .unwrap_or_else(DaemonConfig::default_path);
        DaemonConfig::default()
            .save(&path)
            .context("Failed to save configuration")?;
        println!("Configuration saved to: {}", path.display());
        return Ok(());
    }

    // A file that exists but does not parse is fatal; only a missing file means defaults
    let config_path = DaemonConfig::locate(args.config.as_deref().map(config::expand_path));
    let config = match &config_path {
        Some(path) => DaemonConfig::load(path).context("Failed to load configuration")?,
        None => DaemonConfig::default(),
    };

    if args.print_config {
        print!("{}", config.to_toml()?);
        return Ok(());
    }

    let log_level = args
        .log_level
        .as_deref()
        .unwrap_or(&config.daemon.log_level);
    setup_logging(log_level).context("Failed to setup logging")?;

    info!("card-presenced v{}", env!("CARGO_PKG_VERSION"));
    match &config_path {
        Some(path) => info!("Loaded configuration from: {}", path.display()),
        None => info!("No configuration file found, using built-in board defaults"),
    }

    let lines = CdevLines::open(
        &config.gpio.chip_label,
        &config.gpio.offsets(),
        &config.gpio.consumer,
    )?;
    let mut sampler = PresenceSampler::new(lines);
    let slot_order = config.gpio.slot_order();

    if args.sample {
        let mask = sampler.sample();
        println!("{} {}", mask, describe(mask, &slot_order));
        return Ok(());
    }

    quirk::remove_quirk(&config.usb.quirks_path, &config.usb.quirk);

    let reader = SysfsReader::new(
        config.usb.bind_path.clone(),
        config.usb.interface.clone(),
        config.usb.authorized_path.clone(),
    );
    let (engine_events, events) = create_presence_bridge();
    let engine = SyncEngine::new(sampler, reader, config.debounce.quiet_period())
        .with_events(engine_events);
    let engine_handle = spawn_engine(engine)?;

    monitor(events, engine_handle, &slot_order).await
}

/// Run the engine on its own thread; it owns all presence state from here on
fn spawn_engine(
    mut engine: SyncEngine<CdevLines, SysfsReader>,
) -> anyhow::Result<JoinHandle<Result<Infallible, EngineError>>> {
    std::thread::Builder::new()
        .name("presence-engine".to_string())
        .spawn(move || {
            engine.synchronize();
            engine.run()
        })
        .context("Failed to spawn presence engine thread")
}

/// Relay engine events to systemd until the engine fails or Ctrl+C arrives
async fn monitor(
    events: PresenceEvents,
    engine_handle: JoinHandle<Result<Infallible, EngineError>>,
    slot_order: &[Slot],
) -> Result<(), DaemonExit> {
    if service::is_systemd() {
        info!("Running under systemd");
    }
    let watchdog = service::spawn_watchdog_task();

    loop {
        tokio::select! {
            event = events.recv() => {
                let Ok(event) = event else {
                    // Engine thread has exited
                    break;
                };
                if matches!(event, PresenceEvent::Synced { .. }) {
                    if let Err(e) = service::notify_ready() {
                        warn!("{:#}", e);
                    }
                }
                if let Err(e) = service::notify_status(&describe(event.mask(), slot_order)) {
                    warn!("{:#}", e);
                }
            }
            result = signal::ctrl_c() => {
                if let Err(e) = result {
                    error!("Error waiting for Ctrl+C: {}", e);
                }
                info!("Received Ctrl+C, shutting down");
                if let Err(e) = service::notify_stopping() {
                    warn!("{:#}", e);
                }
                if let Some(watchdog) = &watchdog {
                    watchdog.abort();
                }
                return Ok(());
            }
        }
    }

    if let Some(watchdog) = &watchdog {
        watchdog.abort();
    }

    let joined = tokio::task::spawn_blocking(move || engine_handle.join())
        .await
        .context("Failed to join presence engine thread")?;
    match joined {
        Ok(Ok(never)) => match never {},
        Ok(Err(e)) => Err(DaemonExit::Engine(e)),
        Err(_) => Err(DaemonExit::Setup(anyhow!("Presence engine thread panicked"))),
    }
}

/// Human-readable presence summary
fn describe(mask: PresenceMask, slot_order: &[Slot]) -> String {
    if !mask.is_any() {
        return "No card".to_string();
    }
    let slots: Vec<&str> = mask.slots(slot_order).map(|s| s.name()).collect();
    format!("Card present: {}", slots.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe() {
        let order = [Slot::Sd, Slot::Xd, Slot::Ms, Slot::Cf];
        assert_eq!(describe(PresenceMask::EMPTY, &order), "No card");
        assert_eq!(
            describe(PresenceMask::from_bits(0b1001), &order),
            "Card present: SD, CF"
        );
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(
            DaemonExit::from(GpioError::ChipNotFound("gpio-pxa".into())).exit_code(),
            1
        );
        assert_eq!(
            DaemonExit::from(GpioError::LineRequest {
                chip: "/dev/gpiochip0".into(),
                offset: 100,
                reason: "EINVAL".into(),
            })
            .exit_code(),
            2
        );
        assert_eq!(
            DaemonExit::from(GpioError::EdgeRequest {
                chip: "/dev/gpiochip0".into(),
                reason: "EBUSY".into(),
            })
            .exit_code(),
            3
        );
        assert_eq!(
            DaemonExit::from(EngineError::IdleWait("EIO".into())).exit_code(),
            4
        );
        assert_eq!(
            DaemonExit::from(EngineError::SettleWait("EIO".into())).exit_code(),
            5
        );
        assert_eq!(DaemonExit::from(anyhow!("bad config")).exit_code(), 6);
    }

    #[test]
    fn test_args_parse() {
        let args = Args::try_parse_from(["card-presenced", "--sample", "-l", "debug"]).unwrap();
        assert!(args.sample);
        assert_eq!(args.log_level.as_deref(), Some("debug"));
        assert!(args.config.is_none());
    }
}
