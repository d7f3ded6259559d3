//! BitBabbler device implementation
//!
//! This module provides the `BitBabbler` session. Opening brings the FTDI
//! bridge into MPSSE mode, proves the command stream is in sync and
//! programs the sampling clock; reads then clock entropy in with MPSSE read
//! commands and strip the FTDI status headers from every USB packet.

use std::time::Instant;

use nusb::MaybeFuture;
use rngcap_core::{DeviceDescriptor, EntropySource, Error, PortMetadata, Result, TransportKind};

use crate::link::{NusbLink, UsbLink};
use crate::protocol::*;

/// Session options for a BitBabbler
#[derive(Debug, Clone)]
pub struct BitBabblerConfig {
    /// Sampling bit rate in bits per second
    pub bitrate: u32,
    /// FTDI latency timer in milliseconds
    pub latency_ms: u8,
    /// USB interface number to claim
    pub interface: u8,
}

impl Default for BitBabblerConfig {
    fn default() -> Self {
        Self {
            bitrate: DEFAULT_BITRATE,
            latency_ms: DEFAULT_LATENCY_MS,
            interface: 0,
        }
    }
}

impl BitBabblerConfig {
    /// Set the sampling bit rate
    ///
    /// Pick rates that divide 30 MHz evenly; others are rounded up to the
    /// next achievable rate.
    pub fn bitrate(mut self, bitrate: u32) -> Result<Self> {
        clock_divisor(bitrate)?;
        self.bitrate = bitrate;
        Ok(self)
    }

    /// Set the FTDI latency timer
    pub fn latency_ms(mut self, latency_ms: u8) -> Result<Self> {
        if latency_ms == 0 {
            return Err(Error::InvalidArgument(
                "latency timer must be at least 1 ms".into(),
            ));
        }
        self.latency_ms = latency_ms;
        Ok(self)
    }

    /// Set the USB interface number
    pub fn interface(mut self, interface: u8) -> Self {
        self.interface = interface;
        self
    }

    /// `wIndex` selecting this interface in SIO requests
    fn sio_index(&self) -> u16 {
        self.interface as u16 + 1
    }
}

/// Open session on a BitBabbler
///
/// Dropping the session releases the endpoints, then the interface claim,
/// then the device handle.
pub struct BitBabbler<L: UsbLink = NusbLink> {
    link: L,
    max_packet_size: usize,
}

impl BitBabbler<NusbLink> {
    /// Open the first connected BitBabbler
    pub fn open(config: &BitBabblerConfig) -> Result<Self> {
        let info = find_usb_devices()?
            .into_iter()
            .next()
            .ok_or(Error::DeviceNotFound)?;
        Self::open_info(&info, config)
    }

    /// Open a discovered device
    ///
    /// Devices are located by their bus location, so a descriptor from an
    /// earlier enumeration still opens the same physical unit.
    pub fn open_device(device: &DeviceDescriptor, config: &BitBabblerConfig) -> Result<Self> {
        if device.kind != TransportKind::BulkUsb {
            return Err(Error::InvalidArgument(format!(
                "{} is not a bulk USB device",
                device
            )));
        }
        let info = find_usb_devices()?
            .into_iter()
            .find(|d| usb_path(d) == device.path)
            .ok_or(Error::DeviceNotFound)?;
        Self::open_info(&info, config)
    }

    fn open_info(info: &nusb::DeviceInfo, config: &BitBabblerConfig) -> Result<Self> {
        log::info!(
            "Opening BitBabbler at bus {} address {}",
            info.bus_id(),
            info.device_address()
        );
        let link = NusbLink::open(info, config.interface)?;
        Self::with_link(link, config)
    }
}

impl<L: UsbLink> BitBabbler<L> {
    /// Bring up a session over an already claimed link
    ///
    /// On any failure the link is dropped, which releases everything
    /// acquired so far.
    pub fn with_link(link: L, config: &BitBabblerConfig) -> Result<Self> {
        let divisor = clock_divisor(config.bitrate)?;
        let max_packet_size = link.max_packet_size();
        if max_packet_size <= STATUS_HEADER_LEN {
            return Err(Error::OpenFailed(format!(
                "USB max packet size {} is too small for FTDI status headers",
                max_packet_size
            )));
        }

        let mut bb = Self {
            link,
            max_packet_size,
        };
        bb.configure(config, divisor).map_err(open_error)?;

        log::info!("BitBabbler ready at {} bit/s", config.bitrate);
        Ok(bb)
    }

    fn configure(&mut self, config: &BitBabblerConfig, divisor: u16) -> Result<()> {
        let index = config.sio_index();

        // Reset and drop whatever the chip still had queued
        self.link.control_out(SIO_RESET_REQUEST, SIO_RESET_SIO, index)?;
        self.purge()?;

        log::debug!("Configuring MPSSE (latency {} ms)", config.latency_ms);
        self.link.control_out(SIO_SET_EVENT_CHAR_REQUEST, 0, index)?;
        self.link.control_out(SIO_SET_ERROR_CHAR_REQUEST, 0, index)?;
        self.link.control_out(SIO_SET_LATENCY_TIMER_REQUEST, config.latency_ms as u16, index)?;
        self.link.control_out(SIO_SET_FLOW_CTRL_REQUEST, 0, SIO_RTS_CTS_HS | index)?;
        self.link.control_out(SIO_SET_BITMODE_REQUEST, BITMODE_RESET, index)?;
        self.link.control_out(SIO_SET_BITMODE_REQUEST, BITMODE_MPSSE, index)?;

        self.synchronize()?;

        log::debug!(
            "Setting clock divisor to {} for {} bit/s",
            divisor,
            config.bitrate
        );
        self.link.write(&clock_setup_command(divisor))?;
        self.purge()
    }

    /// Discard stale bytes queued on the IN endpoint
    ///
    /// The queue counts as clean after `PURGE_EMPTY_READS` reads that
    /// returned nothing but status headers. A device that keeps streaming
    /// for `PURGE_MAX_READS` reads fails the open.
    fn purge(&mut self) -> Result<()> {
        let mut empty = 0;
        let mut discarded = 0;
        for _ in 0..PURGE_MAX_READS {
            let data = self.link.read(self.max_packet_size, SHORT_TRANSFER_TIMEOUT)?;
            let payload = data
                .chunks(self.max_packet_size)
                .map(|p| p.len().saturating_sub(STATUS_HEADER_LEN))
                .sum::<usize>();
            if payload == 0 {
                empty += 1;
                if empty == PURGE_EMPTY_READS {
                    log::trace!("Purged {} stale bytes", discarded);
                    return Ok(());
                }
            } else {
                discarded += payload;
            }
        }
        Err(Error::OpenFailed(format!(
            "purge did not settle after {} reads ({} bytes discarded)",
            PURGE_MAX_READS, discarded
        )))
    }

    /// Verify the MPSSE command stream is aligned
    ///
    /// Each probe is an invalid opcode; an engine in sync answers with the
    /// bad-command marker followed by the opcode. The probe pair is tried
    /// `SYNC_ATTEMPTS` times.
    fn synchronize(&mut self) -> Result<()> {
        for attempt in 1..=SYNC_ATTEMPTS {
            let mut in_sync = true;
            for probe in SYNC_PROBES {
                if !self.probe(probe)? {
                    log::debug!(
                        "No echo for sync probe 0x{:02X} (attempt {})",
                        probe,
                        attempt
                    );
                    in_sync = false;
                    break;
                }
            }
            if in_sync {
                log::debug!("MPSSE synchronized");
                return Ok(());
            }
        }
        Err(Error::SyncFailed {
            attempts: SYNC_ATTEMPTS,
        })
    }

    fn probe(&mut self, probe: u8) -> Result<bool> {
        self.link.write(&[probe, SEND_IMMEDIATE])?;
        for _ in 0..SYNC_READS_PER_PROBE {
            let data = self.link.read(self.max_packet_size, SHORT_TRANSFER_TIMEOUT)?;
            if data
                .chunks(self.max_packet_size)
                .any(|packet| is_sync_echo(packet, probe))
            {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Clock in `out.len()` bytes, at most `MAX_READ_CHUNK` at a time
    ///
    /// `done` is the count already delivered by earlier chunks, reported in
    /// a timeout.
    fn read_chunk(
        &mut self,
        out: &mut [u8],
        done: usize,
        wanted: usize,
        deadline: Instant,
    ) -> Result<()> {
        self.link.write(&read_command(out.len()))?;

        let mut filled = 0;
        while filled < out.len() {
            let now = Instant::now();
            if now >= deadline {
                return Err(Error::ReadTimeout {
                    read: done + filled,
                    wanted,
                });
            }
            let timeout = BULK_TRANSFER_TIMEOUT.min(deadline - now);
            let len = scratch_len(out.len() - filled, self.max_packet_size);
            let data = self.link.read(len, timeout)?;
            filled += strip_status_headers(&data, self.max_packet_size, &mut out[filled..]);
        }
        Ok(())
    }
}

impl<L: UsbLink> EntropySource for BitBabbler<L> {
    fn kind(&self) -> TransportKind {
        TransportKind::BulkUsb
    }

    fn read_exact(&mut self, buf: &mut [u8], deadline: Instant) -> Result<()> {
        let wanted = buf.len();
        for (i, chunk) in buf.chunks_mut(MAX_READ_CHUNK).enumerate() {
            self.read_chunk(chunk, i * MAX_READ_CHUNK, wanted, deadline)?;
        }
        log::trace!("Read {} bytes of entropy", wanted);
        Ok(())
    }
}

/// Errors while bringing a session up are open failures, except for a
/// vanished device and a failed sync check.
fn open_error(e: Error) -> Error {
    match e {
        Error::Disconnected(_) | Error::SyncFailed { .. } | Error::OpenFailed(_) => e,
        other => Error::OpenFailed(other.to_string()),
    }
}

/// Stable path of a USB device: `usb:<bus>-<address>`
fn usb_path(info: &nusb::DeviceInfo) -> String {
    format!("usb:{}-{}", info.bus_id(), info.device_address())
}

fn usb_metadata(info: &nusb::DeviceInfo) -> PortMetadata {
    PortMetadata {
        port_name: usb_path(info),
        usb_id: Some((info.vendor_id(), info.product_id())),
        product: info.product_string().map(str::to_string),
        serial_number: info.serial_number().map(str::to_string),
    }
}

fn find_usb_devices() -> Result<Vec<nusb::DeviceInfo>> {
    let devices = nusb::list_devices()
        .wait()
        .map_err(|e| Error::Enumeration(e.to_string()))?
        .filter(|d| BITBABBLER_FAMILY.identify(&usb_metadata(d)).is_some())
        .collect();
    Ok(devices)
}

/// List all connected BitBabbler devices
pub fn list_devices() -> Result<Vec<DeviceDescriptor>> {
    let devices = nusb::list_devices()
        .wait()
        .map_err(|e| Error::Enumeration(e.to_string()))?;
    let metadata: Vec<PortMetadata> = devices.map(|d| usb_metadata(&d)).collect();
    Ok(BITBABBLER_FAMILY.filter(&metadata))
}

/// Find the first connected BitBabbler
pub fn find_first() -> Result<DeviceDescriptor> {
    list_devices()?
        .into_iter()
        .next()
        .ok_or(Error::DeviceNotFound)
}
