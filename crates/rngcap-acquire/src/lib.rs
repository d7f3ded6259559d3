//! Entropy acquisition API
//!
//! This crate is what collaborators (CLI, file writers, analyzers) use. It
//! hides the transports behind four calls:
//!
//! - [`detect_presence`]: is any supported device connected
//! - [`list_devices`]: every connected device, all families merged
//! - [`read_once`]: one framed sample
//! - [`collect_at_interval`]: a sampling loop feeding a callback until it
//!   fails or is cancelled
//!
//! Every sample handed out is exactly `ceil(bit_count / 8)` bytes with the
//! unused trailing bits of the last byte cleared.
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                CLI (rngcap)                  │
//! └──────────────────────────────────────────────┘
//!                       │
//!                       ▼
//! ┌──────────────────────────────────────────────┐
//! │         rngcap-acquire (this crate)          │
//! │  DeviceSelection, HardwareConnector, API     │
//! └──────────────────────────────────────────────┘
//!          │                         │
//!          ▼                         ▼
//! ┌──────────────────┐   ┌───────────────────────┐
//! │  rngcap-core     │   │  rngcap-truerng       │
//! │  Sampler, bits,  │   │  rngcap-bitbabbler    │
//! │  identifier      │   │  (EntropySource impls)│
//! └──────────────────┘   └───────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use rngcap_acquire::{collect_at_interval, DeviceSelection};
//! use rngcap_core::{CancelToken, Error};
//!
//! let selection = DeviceSelection::parse("truerng:mode=normal")?;
//! let cancel = CancelToken::new();
//! let reason = collect_at_interval(
//!     2048,
//!     Duration::from_secs(1),
//!     &selection,
//!     true,
//!     |sample| println!("{} bytes", sample.len()),
//!     &cancel,
//! );
//! assert_eq!(reason, Error::Cancelled);
//! # Ok::<(), rngcap_core::Error>(())
//! ```

mod registry;

use std::time::Duration;

use rngcap_core::sampler::{self, ONE_SHOT_READ_TIMEOUT};
use rngcap_core::{CancelToken, Error, Result, Sampler, SamplerConfig};

pub use registry::{
    available_sources, detect_presence, find_first, list_devices, parse_device_params,
    source_names_short, DeviceParams, DeviceSelection, Family, HardwareConnector, SourceInfo,
};
#[cfg(feature = "truerng")]
pub use rngcap_truerng::{CaptureMode, ModeInfo, MODES};

/// Read one sample of `bit_count` bits
///
/// Discovers the device, opens it, reads under a 10 second deadline and
/// closes it again. Arguments are checked before any I/O.
pub fn read_once(bit_count: usize, selection: &DeviceSelection) -> Result<Vec<u8>> {
    let mut connector = HardwareConnector::new(selection.clone());
    sampler::read_once(&mut connector, bit_count, ONE_SHOT_READ_TIMEOUT)
}

/// Sample `bit_count` bits every `interval` until failure or cancellation
///
/// With `reconnect` one session is kept open and replaced when it breaks;
/// without it every tick opens and closes the device and the first error
/// ends the loop. The returned error is the reason the loop stopped,
/// [`Error::Cancelled`] after `cancel` fired.
pub fn collect_at_interval<F>(
    bit_count: usize,
    interval: Duration,
    selection: &DeviceSelection,
    reconnect: bool,
    on_sample: F,
    cancel: &CancelToken,
) -> Error
where
    F: FnMut(&[u8]),
{
    let config = SamplerConfig::new(bit_count, interval).reconnect(reconnect);
    collect_with(config, selection, on_sample, cancel)
}

/// Run a sampling loop with a fully specified configuration
pub fn collect_with<F>(
    config: SamplerConfig,
    selection: &DeviceSelection,
    on_sample: F,
    cancel: &CancelToken,
) -> Error
where
    F: FnMut(&[u8]),
{
    let connector = HardwareConnector::new(selection.clone());
    match Sampler::new(connector, config) {
        Ok(mut sampler) => sampler.run(on_sample, cancel),
        Err(e) => e,
    }
}
