//! Fixed 128-bit vector shared by trigger masks and captured frames.
//!
//! Global bit `n` lives in byte `15 - (n >> 3)`, bit `n & 7` of that byte. Byte 0 therefore
//! carries bits 127..=120, which is also the first data byte sent on the wire.

use std::fmt;

/// Number of addressable bits.
pub const VECTOR_BITS: usize = 128;

/// Number of bytes backing one vector.
pub const VECTOR_BYTES: usize = VECTOR_BITS / 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct BitVector128 {
    bytes: [u8; VECTOR_BYTES],
}

/// Byte index and bit-in-byte for a global bit number.
pub const fn locate(bit: usize) -> (usize, u8) {
    (VECTOR_BYTES - 1 - (bit >> 3), (bit & 7) as u8)
}

impl BitVector128 {
    pub const fn zeroed() -> Self {
        Self {
            bytes: [0; VECTOR_BYTES],
        }
    }

    pub const fn from_bytes(bytes: [u8; VECTOR_BYTES]) -> Self {
        Self { bytes }
    }

    pub const fn as_bytes(&self) -> &[u8; VECTOR_BYTES] {
        &self.bytes
    }

    /// Returns `None` for bits outside 0..128.
    pub fn bit(&self, bit: usize) -> Option<bool> {
        if bit >= VECTOR_BITS {
            return None;
        }
        let (byte, shift) = locate(bit);
        Some((self.bytes[byte] >> shift) & 1 == 1)
    }

    /// Sets a bit, returning `false` if it is out of range.
    pub fn set(&mut self, bit: usize) -> bool {
        if bit >= VECTOR_BITS {
            return false;
        }
        let (byte, shift) = locate(bit);
        self.bytes[byte] |= 1 << shift;
        true
    }

    pub fn is_zero(&self) -> bool {
        self.bytes.iter().all(|b| *b == 0)
    }

    pub fn count_ones(&self) -> u32 {
        self.bytes.iter().map(|b| b.count_ones()).sum()
    }

    /// Binary digits of `[low..=high]`, most significant first.
    ///
    /// Returns `None` when the range is empty or reaches past bit 127.
    pub fn range_binary(&self, low: usize, high: usize) -> Option<String> {
        if low > high || high >= VECTOR_BITS {
            return None;
        }
        let mut digits = String::with_capacity(high - low + 1);
        for bit in (low..=high).rev() {
            digits.push(if self.bit(bit)? { '1' } else { '0' });
        }
        Some(digits)
    }

    /// Value of `[low..=high]` as an integer. Ranges wider than 128 bits are rejected.
    pub fn range_value(&self, low: usize, high: usize) -> Option<u128> {
        if low > high || high >= VECTOR_BITS {
            return None;
        }
        let mut value = 0u128;
        for bit in (low..=high).rev() {
            value = (value << 1) | u128::from(self.bit(bit)?);
        }
        Some(value)
    }
}

impl From<[u8; VECTOR_BYTES]> for BitVector128 {
    fn from(bytes: [u8; VECTOR_BYTES]) -> Self {
        Self::from_bytes(bytes)
    }
}

/// Renders all 128 bits, byte 0 first, MSB of each byte first.
impl fmt::Display for BitVector128 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.bytes {
            write!(f, "{byte:08b}")?;
        }
        Ok(())
    }
}
