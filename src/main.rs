//! rngcap - hardware random number generator capture
//!
//! Reads raw entropy from TrueRNG (serial) and BitBabbler (FTDI bulk USB)
//! devices and prints it as hex.
//!
//! # Architecture
//!
//! The binary is a thin shell over `rngcap-acquire`:
//! - **list / detect** enumerate every compiled-in device family
//! - **read** takes one framed sample
//! - **collect** runs the sampling loop, either opening the device on every
//!   tick or keeping one session and reconnecting after failures

mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands};
use rngcap_acquire::DeviceSelection;
use rngcap_core::CancelToken;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    // Set log level based on verbosity
    match cli.verbose {
        0 => {} // default (info)
        1 => log::set_max_level(log::LevelFilter::Debug),
        _ => log::set_max_level(log::LevelFilter::Trace),
    }

    match cli.command {
        Commands::List => commands::list_devices(),
        Commands::Detect => {
            if !commands::detect()? {
                std::process::exit(1);
            }
            Ok(())
        }
        Commands::Read { device, bits, mode } => {
            let selection = build_selection(&device, mode.as_deref())?;
            commands::read(&selection, bits)
        }
        Commands::Collect {
            device,
            bits,
            interval,
            mode,
            reconnect,
        } => {
            let selection = build_selection(&device, mode.as_deref())?;
            let cancel = install_interrupt_handler();
            commands::collect(&selection, bits, interval, reconnect, &cancel)
        }
        Commands::ListSources => {
            commands::list_sources();
            Ok(())
        }
    }
}

/// Parse the device string and apply a `--mode` override
fn build_selection(
    device: &str,
    mode: Option<&str>,
) -> Result<DeviceSelection, Box<dyn std::error::Error>> {
    let mut selection = DeviceSelection::parse(device)?;
    if let Some(mode) = mode {
        selection.set_option("mode", mode)?;
    }
    Ok(selection)
}

/// Cancel the returned token on Ctrl+C
fn install_interrupt_handler() -> CancelToken {
    let cancel = CancelToken::new();
    let handler_token = cancel.clone();

    if let Err(e) = ctrlc::set_handler(move || handler_token.cancel()) {
        log::warn!("Failed to install Ctrl+C handler: {}", e);
    }

    cancel
}
