//! rngcap-bitbabbler - BitBabbler entropy source support
//!
//! The BitBabbler is an FTDI based USB device. Instead of a UART stream it
//! is driven through the chip's MPSSE engine: the host programs a sampling
//! clock and issues byte-read commands, and the noise source is clocked in
//! over bulk USB.
//!
//! Every USB packet coming back from the FTDI chip starts with two modem
//! status bytes. They are stripped packet by packet before the payload
//! reaches the caller (see [`protocol::strip_status_headers`]).
//!
//! # Example
//!
//! ```no_run
//! use std::time::{Duration, Instant};
//! use rngcap_core::EntropySource;
//! use rngcap_bitbabbler::{BitBabbler, BitBabblerConfig};
//!
//! let config = BitBabblerConfig::default().bitrate(2_500_000)?;
//! let mut bb = BitBabbler::open(&config)?;
//!
//! let mut buf = [0u8; 64];
//! bb.read_exact(&mut buf, Instant::now() + Duration::from_secs(5))?;
//! # Ok::<(), rngcap_core::Error>(())
//! ```

pub mod device;
pub mod link;
pub mod protocol;

pub use device::{find_first, list_devices, BitBabbler, BitBabblerConfig};
pub use link::{NusbLink, UsbLink};
pub use protocol::BITBABBLER_FAMILY;
