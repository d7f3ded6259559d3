//! Bit-count framing of samples
//!
//! A request for `n` bits is served with `ceil(n / 8)` bytes. When `n` is not
//! a multiple of 8, the low `(8 - n % 8) % 8` bits of the last byte carry no
//! requested data and are cleared before the sample leaves the crate.

use crate::error::{Error, Result};

/// Number of bytes needed to hold `bit_count` bits
pub const fn byte_len(bit_count: usize) -> usize {
    bit_count.div_ceil(8)
}

/// Number of unused low-order bits in the final byte
pub const fn unused_trailing_bits(bit_count: usize) -> u32 {
    ((8 - bit_count % 8) % 8) as u32
}

/// Clear the unused low-order bits of the final byte
pub fn mask_trailing_bits(buf: &mut [u8], bit_count: usize) {
    let extra = unused_trailing_bits(bit_count);
    if extra == 0 {
        return;
    }
    if let Some(last) = buf.last_mut() {
        *last &= 0xFFu8 << extra;
    }
}

/// Check a requested bit count
pub fn validate_bit_count(bit_count: usize) -> Result<()> {
    if bit_count == 0 {
        return Err(Error::InvalidArgument("bit count must be positive".into()));
    }
    Ok(())
}

/// Fixed-length buffer for one sample
///
/// Transports fill [`SampleBuffer::as_mut_bytes`] in place; [`SampleBuffer::finish`]
/// applies the trailing-bit mask and hands out the bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleBuffer {
    bit_count: usize,
    bytes: Vec<u8>,
}

impl SampleBuffer {
    /// Allocate a zeroed buffer for `bit_count` bits
    pub fn new(bit_count: usize) -> Result<Self> {
        validate_bit_count(bit_count)?;
        Ok(Self {
            bit_count,
            bytes: vec![0u8; byte_len(bit_count)],
        })
    }

    /// Requested number of bits
    pub fn bit_count(&self) -> usize {
        self.bit_count
    }

    /// Number of bytes the transport must deliver
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Always false; a sample holds at least one byte
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Byte view for the transport to read into
    pub fn as_mut_bytes(&mut self) -> &mut [u8] {
        &mut self.bytes
    }

    /// Mask the trailing bits and return the sample bytes
    pub fn finish(mut self) -> Vec<u8> {
        mask_trailing_bits(&mut self.bytes, self.bit_count);
        self.bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_byte_len() {
        assert_eq!(byte_len(1), 1);
        assert_eq!(byte_len(8), 1);
        assert_eq!(byte_len(9), 2);
        assert_eq!(byte_len(10), 2);
        assert_eq!(byte_len(2048), 256);
    }

    #[test]
    fn test_unused_trailing_bits() {
        assert_eq!(unused_trailing_bits(8), 0);
        assert_eq!(unused_trailing_bits(2048), 0);
        assert_eq!(unused_trailing_bits(10), 6);
        assert_eq!(unused_trailing_bits(1), 7);
        assert_eq!(unused_trailing_bits(15), 1);
    }

    #[test]
    fn test_2048_bits_unmasked() {
        let mut sample = SampleBuffer::new(2048).unwrap();
        sample.as_mut_bytes().fill(0xFF);
        let bytes = sample.finish();
        assert_eq!(bytes.len(), 256);
        assert!(bytes.iter().all(|&b| b == 0xFF));
    }

    #[test]
    fn test_10_bits_masked() {
        let mut sample = SampleBuffer::new(10).unwrap();
        sample.as_mut_bytes().copy_from_slice(&[0xAB, 0xFF]);
        let bytes = sample.finish();
        assert_eq!(bytes, vec![0xAB, 0xC0]);
        assert_eq!(bytes[1] & 0x3F, 0);
    }

    #[test]
    fn test_mask_every_remainder() {
        for bits in 1..=64usize {
            let mut buf = vec![0xFFu8; byte_len(bits)];
            mask_trailing_bits(&mut buf, bits);
            let ones: u32 = buf.iter().map(|b| b.count_ones()).sum();
            assert_eq!(ones as usize, bits);
        }
    }

    #[test]
    fn test_zero_bits_rejected() {
        assert!(matches!(
            SampleBuffer::new(0),
            Err(Error::InvalidArgument(_))
        ));
    }
}
