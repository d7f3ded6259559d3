//! Entropy source trait definitions
//!
//! Every transport exposes the same contract: fill a buffer completely before
//! a deadline or fail. The session owns its OS handle and releases it when
//! dropped, so a value of a type implementing [`EntropySource`] *is* the open
//! session.

use std::time::Instant;

use crate::device::{DeviceDescriptor, TransportKind};
use crate::error::Result;

/// An open session on an entropy device
///
/// ## Contract
///
/// - `read_exact` either fills all of `buf` or returns an error; a partially
///   filled buffer is never reported as success.
/// - The call blocks at most until `deadline` (plus the granularity of one OS
///   read). On expiry it returns [`Error::ReadTimeout`](crate::Error::ReadTimeout)
///   carrying the number of bytes received so far.
/// - Dropping the session releases the handle exactly once.
pub trait EntropySource {
    /// Transport variant implementing this session
    fn kind(&self) -> TransportKind;

    /// Fill `buf` with device output before `deadline`
    fn read_exact(&mut self, buf: &mut [u8], deadline: Instant) -> Result<()>;
}

impl<T: EntropySource + ?Sized> EntropySource for Box<T> {
    fn kind(&self) -> TransportKind {
        (**self).kind()
    }

    fn read_exact(&mut self, buf: &mut [u8], deadline: Instant) -> Result<()> {
        (**self).read_exact(buf, deadline)
    }
}

/// Discovers devices and opens sessions on them
///
/// The sampler only talks to hardware through this trait, which lets it
/// re-discover a device that moved to a new system path after a reconnect.
pub trait Connector {
    /// Session type produced by [`Connector::open`]
    type Source: EntropySource;

    /// Find the device to sample from
    ///
    /// Returns [`Error::DeviceNotFound`](crate::Error::DeviceNotFound) when
    /// nothing matches.
    fn discover(&mut self) -> Result<DeviceDescriptor>;

    /// Open a session on a discovered device
    ///
    /// `long_lived` is true when the session will be reused across ticks,
    /// which allows transports to apply extra settling steps.
    fn open(&mut self, device: &DeviceDescriptor, long_lived: bool) -> Result<Self::Source>;
}
