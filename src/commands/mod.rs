//! CLI command implementations
//!
//! Commands only talk to `rngcap-acquire`; they never open transports
//! directly.

mod list;
mod sample;

pub use list::{detect, list_devices, list_sources};
pub use sample::{collect, read};

/// Lower-case hex encoding of `bytes`
pub fn to_hex(bytes: &[u8]) -> String {
    use std::fmt::Write;

    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(out, "{:02x}", b);
    }
    out
}
