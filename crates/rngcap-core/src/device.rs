//! Device descriptors produced by enumeration

use std::fmt;

/// How a device is reached
///
/// Selected at discovery time. Each variant is served by its own transport
/// crate, and all of them implement [`EntropySource`](crate::EntropySource).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TransportKind {
    /// Character-stream device presented as a UART (CDC-ACM / tty)
    Serial,
    /// FTDI chip driven in MPSSE bit-bang mode over bulk USB transfers
    BulkUsb,
}

impl TransportKind {
    /// Short lowercase name, as used in device strings
    pub fn name(&self) -> &'static str {
        match self {
            TransportKind::Serial => "serial",
            TransportKind::BulkUsb => "bulk-usb",
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Hardware model behind a descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DeviceModel {
    /// TrueRNG (original)
    TrueRng,
    /// TrueRNGpro
    TrueRngPro,
    /// TrueRNGproV2
    TrueRngProV2,
    /// BitBabbler
    BitBabbler,
}

impl DeviceModel {
    /// Human readable model name
    pub fn name(&self) -> &'static str {
        match self {
            DeviceModel::TrueRng => "TrueRNG",
            DeviceModel::TrueRngPro => "TrueRNGpro",
            DeviceModel::TrueRngProV2 => "TrueRNGproV2",
            DeviceModel::BitBabbler => "BitBabbler",
        }
    }

    /// Transport used by this model
    pub fn transport(&self) -> TransportKind {
        match self {
            DeviceModel::TrueRng | DeviceModel::TrueRngPro | DeviceModel::TrueRngProV2 => {
                TransportKind::Serial
            }
            DeviceModel::BitBabbler => TransportKind::BulkUsb,
        }
    }
}

impl fmt::Display for DeviceModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A device found during enumeration
///
/// Descriptors are rebuilt on every enumeration call and never cached. They do
/// not hold any OS handle; opening one creates a session owned by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceDescriptor {
    /// Transport required to talk to the device
    pub kind: TransportKind,
    /// Identified hardware model
    pub model: DeviceModel,
    /// System path (`/dev/ttyACM0`, `COM3`) or USB location (`usb:<bus>:<addr>`)
    pub path: String,
    /// USB vendor ID
    pub vendor_id: u16,
    /// USB product ID
    pub product_id: u16,
    /// Product string or port description
    pub display_name: String,
    /// USB serial number, when the device reports one
    pub serial_number: Option<String>,
}

impl fmt::Display for DeviceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} on {} ({:04X}:{:04X}",
            self.model, self.path, self.vendor_id, self.product_id
        )?;
        if !self.display_name.is_empty() {
            write!(f, ", \"{}\"", self.display_name)?;
        }
        if let Some(serial) = &self.serial_number {
            write!(f, ", serial {}", serial)?;
        }
        write!(f, ")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_transport() {
        assert_eq!(DeviceModel::TrueRngPro.transport(), TransportKind::Serial);
        assert_eq!(DeviceModel::BitBabbler.transport(), TransportKind::BulkUsb);
    }

    #[test]
    fn test_descriptor_display() {
        let desc = DeviceDescriptor {
            kind: TransportKind::Serial,
            model: DeviceModel::TrueRngProV2,
            path: "/dev/ttyACM0".into(),
            vendor_id: 0x04D8,
            product_id: 0xEBB5,
            display_name: "TrueRNGproV2".into(),
            serial_number: Some("TR2-0042".into()),
        };
        assert_eq!(
            desc.to_string(),
            "TrueRNGproV2 on /dev/ttyACM0 (04D8:EBB5, \"TrueRNGproV2\", serial TR2-0042)"
        );
    }
}
