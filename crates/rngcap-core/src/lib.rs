//! rngcap-core - shared building blocks for hardware entropy acquisition
//!
//! This crate holds everything that does not depend on a particular device:
//!
//! - [`DeviceDescriptor`], [`TransportKind`] and [`DeviceModel`]
//! - the [`identify`] matcher used by every device family
//! - the [`EntropySource`] / [`Connector`] traits implemented by transports
//! - bit-count framing ([`bits`]) with partial-byte masking
//! - the [`sampler`] loop with per-tick and reconnecting strategies
//! - a [`CancelToken`] for cooperative cancellation
//!
//! Transports live in their own crates (`rngcap-truerng`,
//! `rngcap-bitbabbler`) and the public acquisition API in `rngcap-acquire`.

pub mod bits;
pub mod cancel;
pub mod device;
pub mod error;
pub mod identify;
pub mod sampler;
pub mod source;

pub use bits::SampleBuffer;
pub use cancel::CancelToken;
pub use device::{DeviceDescriptor, DeviceModel, TransportKind};
pub use error::{Error, Result};
pub use identify::{DeviceFamily, MatchRule, PortMetadata, UsbSignature};
pub use sampler::{Cadence, Sampler, SamplerConfig, Strategy};
pub use source::{Connector, EntropySource};
