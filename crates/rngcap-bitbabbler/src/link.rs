//! USB link to the FTDI bridge
//!
//! [`UsbLink`] is the small set of USB operations the BitBabbler session
//! needs. [`NusbLink`] implements it on top of `nusb`; tests substitute a
//! scripted link.

use std::time::Duration;

use nusb::descriptors::TransferType;
use nusb::transfer::{
    Buffer, Bulk, ControlOut, ControlType, Direction, In, Out, Recipient, TransferError,
};
use nusb::{Endpoint, MaybeFuture};
use rngcap_core::{Error, Result};

use crate::protocol::CONTROL_TIMEOUT;

/// USB operations used by the BitBabbler session
pub trait UsbLink {
    /// Send a vendor control request with no data stage
    fn control_out(&mut self, request: u8, value: u16, index: u16) -> Result<()>;

    /// Write `data` to the bulk OUT endpoint
    fn write(&mut self, data: &[u8]) -> Result<()>;

    /// Read up to `len` raw bytes from the bulk IN endpoint
    ///
    /// The result still carries the per-packet status headers. A transfer
    /// that times out yields an empty buffer.
    fn read(&mut self, len: usize, timeout: Duration) -> Result<Vec<u8>>;

    /// Max packet size of the bulk IN endpoint
    fn max_packet_size(&self) -> usize;
}

fn transfer_error(e: TransferError) -> Error {
    match e {
        TransferError::Disconnected => Error::Disconnected(e.to_string()),
        _ => Error::TransientRead(e.to_string()),
    }
}

/// `nusb` backed link
///
/// Field order matters: endpoints are released before the interface claim,
/// and the claim before the device handle.
pub struct NusbLink {
    out_ep: Endpoint<Bulk, Out>,
    in_ep: Endpoint<Bulk, In>,
    interface: nusb::Interface,
    _device: nusb::Device,
}

impl NusbLink {
    /// Open `info`, claim `interface_number` and bind its bulk endpoints
    pub fn open(info: &nusb::DeviceInfo, interface_number: u8) -> Result<Self> {
        let device = info
            .open()
            .wait()
            .map_err(|e| Error::OpenFailed(e.to_string()))?;

        let config_desc = device
            .active_configuration()
            .map_err(|e| Error::OpenFailed(format!("Failed to get config: {}", e)))?;

        let mut in_ep = None;
        let mut out_ep = None;
        for iface in config_desc.interface_alt_settings() {
            if iface.interface_number() != interface_number || iface.alternate_setting() != 0 {
                continue;
            }
            for ep in iface.endpoints() {
                if ep.transfer_type() != TransferType::Bulk {
                    continue;
                }
                match ep.direction() {
                    Direction::In => in_ep = in_ep.or(Some(ep.address())),
                    Direction::Out => out_ep = out_ep.or(Some(ep.address())),
                }
            }
        }

        let in_addr =
            in_ep.ok_or_else(|| Error::OpenFailed("bulk IN endpoint not found".into()))?;
        let out_addr =
            out_ep.ok_or_else(|| Error::OpenFailed("bulk OUT endpoint not found".into()))?;

        log::debug!(
            "Using interface {}, IN EP 0x{:02X}, OUT EP 0x{:02X}",
            interface_number,
            in_addr,
            out_addr
        );

        let interface = device
            .detach_and_claim_interface(interface_number)
            .wait()
            .map_err(|e| Error::OpenFailed(format!("Failed to claim interface: {}", e)))?;

        let in_ep = interface
            .endpoint::<Bulk, In>(in_addr)
            .map_err(|e| Error::OpenFailed(e.to_string()))?;
        let out_ep = interface
            .endpoint::<Bulk, Out>(out_addr)
            .map_err(|e| Error::OpenFailed(e.to_string()))?;

        Ok(Self {
            out_ep,
            in_ep,
            interface,
            _device: device,
        })
    }
}

impl UsbLink for NusbLink {
    fn control_out(&mut self, request: u8, value: u16, index: u16) -> Result<()> {
        let control = ControlOut {
            control_type: ControlType::Vendor,
            recipient: Recipient::Device,
            request,
            value,
            index,
            data: &[],
        };
        self.interface
            .control_out(control, CONTROL_TIMEOUT)
            .wait()
            .map_err(|e| {
                let e = transfer_error(e);
                match e {
                    Error::TransientRead(msg) => {
                        Error::Io(format!("Control request 0x{:02X} failed: {}", request, msg))
                    }
                    other => other,
                }
            })
    }

    fn write(&mut self, data: &[u8]) -> Result<()> {
        self.out_ep.submit(Buffer::from(data.to_vec()));

        let Some(completion) = self.out_ep.wait_next_complete(CONTROL_TIMEOUT) else {
            self.out_ep.cancel_all();
            while self.out_ep.pending() > 0 {
                let _ = self.out_ep.wait_next_complete(Duration::from_secs(1));
            }
            return Err(Error::Io("USB write timed out".into()));
        };
        completion.status.map_err(transfer_error)?;

        log::trace!("USB write {} bytes", data.len());
        Ok(())
    }

    fn read(&mut self, len: usize, timeout: Duration) -> Result<Vec<u8>> {
        let mut buf = Buffer::new(len);
        buf.set_requested_len(len);
        self.in_ep.submit(buf);

        let completion = match self.in_ep.wait_next_complete(timeout) {
            Some(c) => c,
            None => {
                self.in_ep.cancel_all();
                let mut late = None;
                while self.in_ep.pending() > 0 {
                    if let Some(c) = self.in_ep.wait_next_complete(Duration::from_secs(1)) {
                        late = Some(c);
                    }
                }
                match late {
                    // Data that landed while cancelling is still good.
                    Some(c) if c.status.is_ok() || c.actual_len > 0 => c,
                    _ => return Ok(Vec::new()),
                }
            }
        };

        match completion.status {
            Ok(()) => {}
            Err(TransferError::Cancelled) => {}
            Err(e) => return Err(transfer_error(e)),
        }

        let data = completion.buffer[..completion.actual_len].to_vec();
        log::trace!("USB read {} bytes (raw)", data.len());
        Ok(data)
    }

    fn max_packet_size(&self) -> usize {
        self.in_ep.max_packet_size()
    }
}

impl Drop for NusbLink {
    fn drop(&mut self) {
        self.out_ep.cancel_all();
        while self.out_ep.pending() > 0 {
            let _ = self.out_ep.wait_next_complete(Duration::from_secs(1));
        }
        self.in_ep.cancel_all();
        while self.in_ep.pending() > 0 {
            let _ = self.in_ep.wait_next_complete(Duration::from_secs(1));
        }
    }
}
