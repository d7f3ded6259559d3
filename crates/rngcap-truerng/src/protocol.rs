//! TrueRNG identification table and link constants

use std::time::Duration;

use rngcap_core::{DeviceFamily, DeviceModel, TransportKind, UsbSignature};

/// Microchip vendor ID (TrueRNG, TrueRNGproV2)
pub const MICROCHIP_VID: u16 = 0x04D8;

/// MCS / ubld.it vendor ID (TrueRNGpro)
pub const MCS_VID: u16 = 0x16D0;

/// TrueRNG product ID
pub const TRUERNG_PID: u16 = 0xF5FE;

/// TrueRNGpro product ID
pub const TRUERNG_PRO_PID: u16 = 0x0AA0;

/// TrueRNGpro variant product IDs
pub const TRUERNG_PRO_ALT_PIDS: [u16; 2] = [0x0AA2, 0x0AA4];

/// TrueRNGproV2 product ID
pub const TRUERNG_PRO_V2_PID: u16 = 0xEBB5;

/// Identification table for the TrueRNG family
///
/// Generic name matches report the TrueRNGpro.
pub static TRUERNG_FAMILY: DeviceFamily = DeviceFamily {
    name: "TrueRNG",
    kind: TransportKind::Serial,
    signatures: &[
        UsbSignature {
            vendor_id: MICROCHIP_VID,
            product_id: TRUERNG_PID,
            model: DeviceModel::TrueRng,
        },
        UsbSignature {
            vendor_id: MCS_VID,
            product_id: TRUERNG_PRO_PID,
            model: DeviceModel::TrueRngPro,
        },
        UsbSignature {
            vendor_id: MICROCHIP_VID,
            product_id: TRUERNG_PRO_V2_PID,
            model: DeviceModel::TrueRngProV2,
        },
        UsbSignature {
            vendor_id: MCS_VID,
            product_id: TRUERNG_PRO_ALT_PIDS[0],
            model: DeviceModel::TrueRngPro,
        },
        UsbSignature {
            vendor_id: MCS_VID,
            product_id: TRUERNG_PRO_ALT_PIDS[1],
            model: DeviceModel::TrueRngPro,
        },
    ],
    product_fragments: &["TRUERNG"],
    serial_fragments: &["TRUERNG"],
    serial_prefixes: &[],
    port_fragments: &["TRUERNG"],
    fallback_model: DeviceModel::TrueRngPro,
};

/// Baud rate requested on a plain open
///
/// This is the stock rate of the host serial stack. It coincides with the
/// `rng2white` entry of the mode table, but a mode only changes after the
/// knock sequence, so a plain open leaves the firmware in its current mode.
pub const DEFAULT_OPEN_BAUD: u32 = 9600;

/// Baud rates of the knock sequence, in order
pub const KNOCK_SEQUENCE: [u32; 3] = [110, 300, 110];

/// How long each knock stays open
pub const KNOCK_HOLD: Duration = Duration::from_millis(500);

/// Timeout of a single OS read call
pub const READ_POLL_TIMEOUT: Duration = Duration::from_millis(1000);

/// Pause after a read that returned no data
pub const EMPTY_READ_BACKOFF: Duration = Duration::from_millis(5);

/// DTR low/high settle time of the stability pulse
pub const DTR_PULSE_SETTLE: Duration = Duration::from_millis(100);
