//! Device identification
//!
//! Each device family describes itself with a static [`DeviceFamily`] table.
//! Transport crates turn whatever the OS enumerates into [`PortMetadata`] and
//! ask [`DeviceFamily::identify`] whether it belongs to the family.
//!
//! Matching rules, first match wins:
//!
//! 1. exact vendor/product ID pair from the signature table
//! 2. case-insensitive name fragment in the product string
//! 3. case-insensitive fragment in the serial number
//! 4. case-insensitive fragment in the system port name
//!
//! Rules 2-4 only prove that the device belongs to the family. They report
//! the family's `fallback_model`, which is the most capable variant. This is
//! a known approximation: a generic match may misreport the exact model.

use crate::device::{DeviceDescriptor, DeviceModel, TransportKind};

/// An exact USB vendor/product pair and the model it identifies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsbSignature {
    /// USB vendor ID
    pub vendor_id: u16,
    /// USB product ID
    pub product_id: u16,
    /// Model reported for this pair
    pub model: DeviceModel,
}

/// Static identification table for one device family
#[derive(Debug)]
pub struct DeviceFamily {
    /// Family name used in log messages
    pub name: &'static str,
    /// Transport every member of the family uses
    pub kind: TransportKind,
    /// Exact VID/PID signatures
    pub signatures: &'static [UsbSignature],
    /// Upper-case fragments searched in the product string
    pub product_fragments: &'static [&'static str],
    /// Upper-case fragments searched in the serial number
    pub serial_fragments: &'static [&'static str],
    /// Upper-case prefixes of the serial number
    pub serial_prefixes: &'static [&'static str],
    /// Upper-case fragments searched in the system port name
    pub port_fragments: &'static [&'static str],
    /// Model reported for generic (non VID/PID) matches
    pub fallback_model: DeviceModel,
}

/// Which rule identified a device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchRule {
    /// Exact VID/PID
    Signature,
    /// Product string fragment
    ProductName,
    /// Serial number fragment
    SerialNumber,
    /// System port name fragment
    PortName,
}

/// Metadata of one enumerated system device, independent of the OS API
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PortMetadata {
    /// System path or location string
    pub port_name: String,
    /// USB vendor/product pair, if the device sits on USB
    pub usb_id: Option<(u16, u16)>,
    /// Product string
    pub product: Option<String>,
    /// Serial number string
    pub serial_number: Option<String>,
}

fn contains_any(haystack: Option<&str>, fragments: &[&str]) -> bool {
    match haystack {
        Some(s) if !s.is_empty() => {
            let upper = s.to_uppercase();
            fragments.iter().any(|f| upper.contains(f))
        }
        _ => false,
    }
}

fn starts_with_any(haystack: Option<&str>, prefixes: &[&str]) -> bool {
    haystack.map_or(false, |s| {
        let upper = s.to_uppercase();
        prefixes.iter().any(|p| upper.starts_with(p))
    })
}

impl DeviceFamily {
    /// Identify a device, returning the model and the rule that matched
    pub fn identify(&self, port: &PortMetadata) -> Option<(DeviceModel, MatchRule)> {
        if let Some((vid, pid)) = port.usb_id {
            if let Some(sig) = self
                .signatures
                .iter()
                .find(|s| s.vendor_id == vid && s.product_id == pid)
            {
                return Some((sig.model, MatchRule::Signature));
            }
        }

        let rule = if contains_any(port.product.as_deref(), self.product_fragments) {
            MatchRule::ProductName
        } else if contains_any(port.serial_number.as_deref(), self.serial_fragments)
            || starts_with_any(port.serial_number.as_deref(), self.serial_prefixes)
        {
            MatchRule::SerialNumber
        } else if contains_any(Some(&port.port_name), self.port_fragments) {
            MatchRule::PortName
        } else {
            return None;
        };

        log::debug!(
            "{}: generic match on {} via {:?}, assuming {}",
            self.name,
            port.port_name,
            rule,
            self.fallback_model
        );
        Some((self.fallback_model, rule))
    }

    /// Build a descriptor for a device of this family, if it matches
    pub fn describe(&self, port: &PortMetadata) -> Option<DeviceDescriptor> {
        let (model, _) = self.identify(port)?;
        let (vendor_id, product_id) = port.usb_id.unwrap_or((0, 0));
        Some(DeviceDescriptor {
            kind: self.kind,
            model,
            path: port.port_name.clone(),
            vendor_id,
            product_id,
            display_name: port.product.clone().unwrap_or_default(),
            serial_number: port.serial_number.clone(),
        })
    }

    /// Filter an enumeration down to the members of this family
    ///
    /// Output order follows input order, so the same system device set always
    /// yields the same descriptor list.
    pub fn filter<'a, I>(&self, ports: I) -> Vec<DeviceDescriptor>
    where
        I: IntoIterator<Item = &'a PortMetadata>,
    {
        ports.into_iter().filter_map(|p| self.describe(p)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static FAMILY: DeviceFamily = DeviceFamily {
        name: "Test",
        kind: TransportKind::Serial,
        signatures: &[
            UsbSignature {
                vendor_id: 0x04D8,
                product_id: 0xF5FE,
                model: DeviceModel::TrueRng,
            },
            UsbSignature {
                vendor_id: 0x04D8,
                product_id: 0xEBB5,
                model: DeviceModel::TrueRngProV2,
            },
        ],
        product_fragments: &["TRUERNG"],
        serial_fragments: &["TRUERNG"],
        serial_prefixes: &["TRNG-"],
        port_fragments: &["TRUERNG"],
        fallback_model: DeviceModel::TrueRngPro,
    };

    fn port(name: &str) -> PortMetadata {
        PortMetadata {
            port_name: name.into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_signature_wins() {
        let p = PortMetadata {
            usb_id: Some((0x04D8, 0xF5FE)),
            product: Some("TrueRNGpro".into()),
            ..port("/dev/ttyACM0")
        };
        assert_eq!(
            FAMILY.identify(&p),
            Some((DeviceModel::TrueRng, MatchRule::Signature))
        );
    }

    #[test]
    fn test_generic_matches_report_capable_model() {
        let p = PortMetadata {
            usb_id: Some((0x1234, 0x5678)),
            product: Some("my truerng stick".into()),
            ..port("/dev/ttyACM1")
        };
        assert_eq!(
            FAMILY.identify(&p),
            Some((DeviceModel::TrueRngPro, MatchRule::ProductName))
        );

        let p = PortMetadata {
            serial_number: Some("TrueRNG-0001".into()),
            ..port("/dev/ttyACM2")
        };
        assert_eq!(
            FAMILY.identify(&p),
            Some((DeviceModel::TrueRngPro, MatchRule::SerialNumber))
        );

        assert_eq!(
            FAMILY.identify(&port("/dev/cu.usbmodemTrueRNG1")),
            Some((DeviceModel::TrueRngPro, MatchRule::PortName))
        );
    }

    #[test]
    fn test_serial_prefix_match() {
        let p = PortMetadata {
            serial_number: Some("trng-0042".into()),
            ..port("/dev/ttyACM3")
        };
        assert_eq!(
            FAMILY.identify(&p),
            Some((DeviceModel::TrueRngPro, MatchRule::SerialNumber))
        );

        // prefix only, not anywhere in the serial
        let p = PortMetadata {
            serial_number: Some("X-TRNG-0042".into()),
            ..port("/dev/ttyACM3")
        };
        assert_eq!(FAMILY.identify(&p), None);
    }

    #[test]
    fn test_no_match() {
        let p = PortMetadata {
            usb_id: Some((0x0403, 0x6001)),
            product: Some("FT232R USB UART".into()),
            serial_number: Some("A50285BI".into()),
            ..port("/dev/ttyUSB0")
        };
        assert_eq!(FAMILY.identify(&p), None);
        assert_eq!(FAMILY.identify(&port("")), None);
    }

    #[test]
    fn test_filter_is_idempotent() {
        let ports = vec![
            port("/dev/ttyS0"),
            PortMetadata {
                usb_id: Some((0x04D8, 0xEBB5)),
                product: Some("TrueRNGproV2".into()),
                ..port("/dev/ttyACM0")
            },
            port("/dev/ttyTRUERNG"),
        ];
        let first = FAMILY.filter(&ports);
        let second = FAMILY.filter(&ports);
        assert_eq!(first, second);
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].model, DeviceModel::TrueRngProV2);
        assert_eq!(first[0].display_name, "TrueRNGproV2");
        assert_eq!(first[1].vendor_id, 0);
    }
}
