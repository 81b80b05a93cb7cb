// Packed change bitmap: one bit per target byte position.
//
// Bit `i` lives in byte `i / 8` at shift `i % 8` (LSB-first).  The byte
// length is fixed at construction to `ceil(target_len / 8)`.

/// Number of bitmap bytes needed to cover `target_len` positions.
#[inline]
pub const fn byte_length(target_len: usize) -> usize {
    target_len.div_ceil(8)
}

/// Bit-set over target byte positions marking "differs from the baseline".
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChangeBitmap {
    bits: Vec<u8>,
}

impl ChangeBitmap {
    /// Create an all-clear bitmap covering `target_len` positions.
    pub fn new(target_len: usize) -> Self {
        Self {
            bits: vec![0u8; byte_length(target_len)],
        }
    }

    /// Wrap raw bitmap bytes (e.g. read from the wire).
    pub fn from_bytes(bits: Vec<u8>) -> Self {
        Self { bits }
    }

    /// Mark position `i` as changed.
    ///
    /// `i` must be below `8 * len_bytes()`.
    #[inline]
    pub fn set(&mut self, i: usize) {
        self.bits[i / 8] |= 1 << (i % 8);
    }

    /// Whether position `i` is marked. Positions past the end read as clear.
    #[inline]
    pub fn test(&self, i: usize) -> bool {
        self.bits
            .get(i / 8)
            .is_some_and(|byte| byte & (1 << (i % 8)) != 0)
    }

    /// Total number of set bits.
    pub fn count_ones(&self) -> usize {
        self.bits.iter().map(|b| b.count_ones() as usize).sum()
    }

    #[inline]
    pub fn len_bytes(&self) -> usize {
        self.bits.len()
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bits
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bits
    }
}
