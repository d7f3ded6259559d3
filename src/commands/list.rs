//! List and detect commands

use rngcap_acquire::available_sources;

/// Print every connected device
pub fn list_devices() -> Result<(), Box<dyn std::error::Error>> {
    let devices = rngcap_acquire::list_devices()?;
    if devices.is_empty() {
        println!("No devices found");
        return Ok(());
    }

    println!("Found {} device(s):", devices.len());
    println!();
    println!(
        "{:<14} {:<20} {:<10} {:<20} {}",
        "Model", "Path", "ID", "Product", "Serial"
    );
    println!("{}", "-".repeat(80));
    for dev in &devices {
        println!(
            "{:<14} {:<20} {:04X}:{:04X}  {:<20} {}",
            dev.model.name(),
            dev.path,
            dev.vendor_id,
            dev.product_id,
            dev.display_name,
            dev.serial_number.as_deref().unwrap_or("-")
        );
    }
    Ok(())
}

/// Report whether any supported device is connected
///
/// Returns `false` when nothing was found so the caller can set the exit
/// status.
pub fn detect() -> Result<bool, Box<dyn std::error::Error>> {
    match rngcap_acquire::find_first(&Default::default()) {
        Ok(device) => {
            println!("Device detected: {}", device);
            Ok(true)
        }
        Err(rngcap_core::Error::DeviceNotFound) => {
            println!("No supported device found");
            println!("Known IDs: TrueRNG 04D8:F5FE, TrueRNGpro 16D0:0AA0, TrueRNGproV2 04D8:EBB5, BitBabbler 0403:7840");
            Ok(false)
        }
        Err(e) => Err(e.into()),
    }
}

/// Print the compiled-in device families and capture modes
pub fn list_sources() {
    println!("Supported devices:");
    println!();
    for source in available_sources() {
        let aliases = if source.aliases.is_empty() {
            String::new()
        } else {
            format!(" (aliases: {})", source.aliases.join(", "))
        };
        println!("  {:<12} - {}{}", source.name, source.description, aliases);
    }

    #[cfg(feature = "truerng")]
    {
        println!();
        println!("TrueRNG capture modes:");
        println!();
        for info in rngcap_acquire::MODES {
            println!(
                "  {:<16} {:>7} baud{}",
                info.name,
                info.baud,
                if info.v2_only { "  (TrueRNGproV2 only)" } else { "" }
            );
        }
    }
}
