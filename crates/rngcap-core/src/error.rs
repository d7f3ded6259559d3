//! Error types for rngcap-core
//!
//! A single error type is shared by every transport and by the sampling loop
//! so that the supervisor can classify failures without knowing which
//! hardware produced them.

use thiserror::Error;

/// Errors that can occur while discovering, opening or reading an entropy source
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// No matching device during discovery
    #[error("No supported entropy device found")]
    DeviceNotFound,

    /// OS or USB failure while acquiring the device handle or interface
    #[error("Failed to open device: {0}")]
    OpenFailed(String),

    /// Bit-bang handshake could not be verified
    #[error("Device synchronization failed after {attempts} attempts (power-cycle the device)")]
    SyncFailed {
        /// Number of probe rounds that were tried
        attempts: u32,
    },

    /// Deadline elapsed before the requested byte count was satisfied
    #[error("Read timeout: read {read}/{wanted} bytes")]
    ReadTimeout {
        /// Bytes received before the deadline
        read: usize,
        /// Bytes requested
        wanted: usize,
    },

    /// A single read failed but may succeed on retry
    #[error("Transient read error: {0}")]
    TransientRead(String),

    /// The device went away while a session was open
    #[error("Device disconnected: {0}")]
    Disconnected(String),

    /// Consecutive read failures crossed the configured limit
    #[error("Too many consecutive read errors ({count}): {last}")]
    TooManyConsecutiveErrors {
        /// Number of consecutive failures
        count: u32,
        /// Message of the last failure
        last: String,
    },

    /// Caller supplied a bad argument; no I/O was attempted
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// System device enumeration failed
    #[error("Device enumeration failed: {0}")]
    Enumeration(String),

    /// Other transport I/O failure
    #[error("I/O error: {0}")]
    Io(String),

    /// The collection loop was stopped through its cancel token
    #[error("Cancelled")]
    Cancelled,
}

/// Result type for rngcap operations
pub type Result<T> = core::result::Result<T, Error>;

impl Error {
    /// Whether this error means the underlying handle is gone for good
    ///
    /// Besides [`Error::Disconnected`], any message mentioning a closed port
    /// or a broken pipe counts, since some platforms only report it as text.
    pub fn is_disconnect(&self) -> bool {
        match self {
            Error::Disconnected(_) => true,
            Error::Io(msg) | Error::TransientRead(msg) => message_is_disconnect(msg),
            _ => false,
        }
    }
}

fn message_is_disconnect(msg: &str) -> bool {
    let lower = msg.to_ascii_lowercase();
    lower.contains("closed") || lower.contains("broken pipe")
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        use std::io::ErrorKind;

        match e.kind() {
            ErrorKind::BrokenPipe
            | ErrorKind::NotConnected
            | ErrorKind::ConnectionAborted
            | ErrorKind::ConnectionReset
            | ErrorKind::UnexpectedEof => Error::Disconnected(e.to_string()),
            _ if message_is_disconnect(&e.to_string()) => Error::Disconnected(e.to_string()),
            _ => Error::Io(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_io_error_classification() {
        let e: Error = io::Error::new(io::ErrorKind::BrokenPipe, "pipe").into();
        assert!(matches!(e, Error::Disconnected(_)));
        assert!(e.is_disconnect());

        let e: Error = io::Error::new(io::ErrorKind::Other, "port has been closed").into();
        assert!(e.is_disconnect());

        let e: Error = io::Error::new(io::ErrorKind::Other, "framing error").into();
        assert_eq!(e, Error::Io("framing error".into()));
        assert!(!e.is_disconnect());
    }

    #[test]
    fn test_message_based_disconnect() {
        assert!(Error::Io("Broken Pipe".into()).is_disconnect());
        assert!(Error::TransientRead("file descriptor closed".into()).is_disconnect());
        assert!(!Error::ReadTimeout { read: 1, wanted: 2 }.is_disconnect());
        assert!(!Error::DeviceNotFound.is_disconnect());
    }
}
