//! Read and collect commands

use std::time::Duration;

use rngcap_acquire::DeviceSelection;
use rngcap_core::{CancelToken, Error};

use super::to_hex;

/// Read one sample and print it as hex
pub fn read(selection: &DeviceSelection, bits: usize) -> Result<(), Box<dyn std::error::Error>> {
    let data = rngcap_acquire::read_once(bits, selection)?;
    log::info!("Read {} bits ({} bytes)", bits, data.len());
    println!("{}", to_hex(&data));
    Ok(())
}

/// Print one sample per interval until interrupted
///
/// Ctrl+C fires `cancel`; a cancelled loop counts as success.
pub fn collect(
    selection: &DeviceSelection,
    bits: usize,
    interval: Duration,
    reconnect: bool,
    cancel: &CancelToken,
) -> Result<(), Box<dyn std::error::Error>> {
    log::info!(
        "Reading {} bits every {:?}{}. Press Ctrl+C to stop...",
        bits,
        interval,
        if reconnect { " with auto-reconnect" } else { "" }
    );

    let mut count = 0u64;
    let reason = rngcap_acquire::collect_at_interval(
        bits,
        interval,
        selection,
        reconnect,
        |sample| {
            count += 1;
            println!("{:>6}  {} bits  {}", count, bits, to_hex(sample));
        },
        cancel,
    );

    match reason {
        Error::Cancelled => {
            log::info!("Stopped after {} sample(s)", count);
            Ok(())
        }
        e => Err(e.into()),
    }
}
