//! BitBabbler protocol constants and framing helpers
//!
//! The BitBabbler is an FTDI FT232H-class bridge with a custom product ID.
//! Entropy is clocked in through the MPSSE engine, so the command set below
//! is the subset of MPSSE the device needs plus the FTDI SIO vendor
//! requests used to bring the chip into MPSSE mode.

use std::time::Duration;

use rngcap_core::{DeviceFamily, DeviceModel, Error, Result, TransportKind, UsbSignature};

// ============================================================================
// USB VID/PID constants
// ============================================================================

/// FTDI vendor ID
pub const FTDI_VID: u16 = 0x0403;

/// BitBabbler product ID
pub const BITBABBLER_PID: u16 = 0x7840;

/// Identification table for the BitBabbler family
pub static BITBABBLER_FAMILY: DeviceFamily = DeviceFamily {
    name: "BitBabbler",
    kind: TransportKind::BulkUsb,
    signatures: &[UsbSignature {
        vendor_id: FTDI_VID,
        product_id: BITBABBLER_PID,
        model: DeviceModel::BitBabbler,
    }],
    product_fragments: &["BITBABBLER", "BIT BABBLER", "BB "],
    serial_fragments: &["BITBABBLER"],
    // stock serials look like "BB000001"
    serial_prefixes: &["BB"],
    port_fragments: &["BITBABBLER"],
    fallback_model: DeviceModel::BitBabbler,
};

// ============================================================================
// MPSSE commands
// ============================================================================

/// Clock bytes in, MSB first, sampled on the rising edge
pub const MPSSE_DO_READ: u8 = 0x20;

/// Disable loopback mode
pub const LOOPBACK_END: u8 = 0x85;

/// Set clock divisor
pub const TCK_DIVISOR: u8 = 0x86;

/// Flush the command result buffer back to the host
pub const SEND_IMMEDIATE: u8 = 0x87;

/// Disable divide-by-5 prescaler (60 MHz clock)
pub const DIS_DIV_5: u8 = 0x8A;

/// Disable 3-phase data clocking
pub const DIS_3_PHASE: u8 = 0x8D;

/// Disable adaptive clocking
pub const CLK_NO_ADAPTIVE: u8 = 0x97;

/// Marker the MPSSE engine returns for an unknown opcode
pub const BAD_COMMAND_ACK: u8 = 0xFA;

/// Deliberately invalid opcodes used to verify synchronization
pub const SYNC_PROBES: [u8; 2] = [0xAA, 0xAB];

/// Number of times the probe pair is attempted
pub const SYNC_ATTEMPTS: u32 = 2;

/// Reads spent waiting for one probe echo
pub const SYNC_READS_PER_PROBE: usize = 8;

// ============================================================================
// FTDI SIO vendor requests
// ============================================================================

pub const SIO_RESET_REQUEST: u8 = 0x00;
pub const SIO_SET_FLOW_CTRL_REQUEST: u8 = 0x02;
pub const SIO_SET_EVENT_CHAR_REQUEST: u8 = 0x06;
pub const SIO_SET_ERROR_CHAR_REQUEST: u8 = 0x07;
pub const SIO_SET_LATENCY_TIMER_REQUEST: u8 = 0x09;
pub const SIO_SET_BITMODE_REQUEST: u8 = 0x0B;

/// Reset value of `SIO_RESET_REQUEST`
pub const SIO_RESET_SIO: u16 = 0x0000;

/// RTS/CTS flow control, carried in the high byte of the index
pub const SIO_RTS_CTS_HS: u16 = 0x0100;

/// Bitmode value leaving bit-bang mode
pub const BITMODE_RESET: u16 = 0x0000;

/// Bitmode value entering MPSSE mode
pub const BITMODE_MPSSE: u16 = 0x0200;

// ============================================================================
// Link parameters
// ============================================================================

/// MPSSE base clock after the divide-by-5 prescaler is disabled
pub const MPSSE_BASE_CLOCK: u32 = 30_000_000;

/// Default sampling bit rate
pub const DEFAULT_BITRATE: u32 = 2_500_000;

/// Default FTDI latency timer in milliseconds
pub const DEFAULT_LATENCY_MS: u8 = 1;

/// Size of the per-packet modem status header
pub const STATUS_HEADER_LEN: usize = 2;

/// Largest single MPSSE read command
pub const MAX_READ_CHUNK: usize = 65536;

/// Empty reads tolerated before a purge declares the queue clean
pub const PURGE_EMPTY_READS: usize = 10;

/// Upper bound on reads during one purge, empty or not
pub const PURGE_MAX_READS: usize = 256;

/// Timeout of one bulk transfer while purging or syncing
pub const SHORT_TRANSFER_TIMEOUT: Duration = Duration::from_millis(50);

/// Timeout of one bulk transfer while sampling
pub const BULK_TRANSFER_TIMEOUT: Duration = Duration::from_millis(500);

/// Timeout of vendor control requests and bulk writes
pub const CONTROL_TIMEOUT: Duration = Duration::from_secs(5);

/// Compute the MPSSE clock divisor for `bitrate`
///
/// `divisor = 30 MHz / bitrate - 1`, truncated. Bit rates that do not
/// divide 30 MHz evenly end up slightly faster than requested.
pub fn clock_divisor(bitrate: u32) -> Result<u16> {
    if bitrate == 0 || bitrate > MPSSE_BASE_CLOCK {
        return Err(Error::InvalidArgument(format!(
            "bitrate {} out of range (1..={})",
            bitrate, MPSSE_BASE_CLOCK
        )));
    }
    let divisor = MPSSE_BASE_CLOCK / bitrate - 1;
    u16::try_from(divisor).map_err(|_| {
        Error::InvalidArgument(format!(
            "bitrate {} too low: divisor {} exceeds 16 bits",
            bitrate, divisor
        ))
    })
}

/// Command that programs the MPSSE clock for `divisor`
pub fn clock_setup_command(divisor: u16) -> [u8; 7] {
    let [lo, hi] = divisor.to_le_bytes();
    [
        DIS_DIV_5,
        CLK_NO_ADAPTIVE,
        DIS_3_PHASE,
        LOOPBACK_END,
        TCK_DIVISOR,
        lo,
        hi,
    ]
}

/// Command that clocks in `len` bytes and flushes them immediately
///
/// `len` must be in `1..=MAX_READ_CHUNK`.
pub fn read_command(len: usize) -> [u8; 4] {
    let [lo, hi] = ((len - 1) as u16).to_le_bytes();
    [MPSSE_DO_READ, lo, hi, SEND_IMMEDIATE]
}

/// Whether `packet` is the echo of the invalid opcode `probe`
pub fn is_sync_echo(packet: &[u8], probe: u8) -> bool {
    packet.len() >= 4 && packet[2] == BAD_COMMAND_ACK && packet[3] == probe
}

/// Bulk request size for `remaining` payload bytes
///
/// Rounded up to whole packets plus one spare packet, since every packet
/// spends two bytes on its status header.
pub fn scratch_len(remaining: usize, max_packet_size: usize) -> usize {
    remaining.div_ceil(max_packet_size) * max_packet_size + max_packet_size
}

/// Copy the payload of the packets in `received` into `out`
///
/// `received` is split into `max_packet_size` packets. Each one starts with
/// a two byte modem status header that is dropped; packets with no payload
/// are skipped. Returns the number of bytes written.
pub fn strip_status_headers(received: &[u8], max_packet_size: usize, out: &mut [u8]) -> usize {
    let mut written = 0;
    for packet in received.chunks(max_packet_size) {
        if written == out.len() {
            break;
        }
        if packet.len() <= STATUS_HEADER_LEN {
            continue;
        }
        let payload = &packet[STATUS_HEADER_LEN..];
        let n = payload.len().min(out.len() - written);
        out[written..written + n].copy_from_slice(&payload[..n]);
        written += n;
    }
    written
}
