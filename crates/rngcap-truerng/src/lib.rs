//! rngcap-truerng - TrueRNG entropy source support
//!
//! This crate reads entropy from the TrueRNG family of hardware random
//! number generators (TrueRNG, TrueRNGpro, TrueRNGproV2). The devices show
//! up as USB CDC serial ports and stream random bytes as soon as the port
//! is open.
//!
//! # Capture modes
//!
//! The firmware has no command protocol. Modes are switched by "knocking":
//! opening the port at 110, 300 and 110 baud in turn and then once more at
//! the baud rate assigned to the wanted mode (see [`CaptureMode`]).
//!
//! # Example
//!
//! ```no_run
//! use std::time::{Duration, Instant};
//! use rngcap_core::EntropySource;
//! use rngcap_truerng::{TrueRng, TrueRngConfig};
//!
//! let device = rngcap_truerng::find_first()?;
//! let mut trng = TrueRng::open_device(&device, &TrueRngConfig::default(), false)?;
//!
//! let mut buf = [0u8; 32];
//! trng.read_exact(&mut buf, Instant::now() + Duration::from_secs(10))?;
//! # Ok::<(), rngcap_core::Error>(())
//! ```

mod error;

pub mod device;
pub mod mode;
pub mod protocol;

pub use device::{change_mode, find_first, list_devices, read_until, TrueRng, TrueRngConfig};
pub use mode::{CaptureMode, ModeInfo, MODES};
pub use protocol::TRUERNG_FAMILY;
