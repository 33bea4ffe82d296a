//! # 2-bit frame state bitmap
//!
//! Each frame of a pool owns two bits. Four frames share a byte, the
//! lowest-numbered frame in the most-significant pair:
//!
//! ```text
//! byte k:  | 7 6     | 5 4       | 3 2       | 1 0       |
//!          | frame 4k| frame 4k+1| frame 4k+2| frame 4k+3|
//! ```
//!
//! | Code   | State |
//! |--------|-------|
//! | `0b00` | [`FrameState::Free`] |
//! | `0b10` | [`FrameState::Head`] |
//! | `0b11` | [`FrameState::Allocated`] |
//! | `0b01` | never written; decodes as [`FrameState::Invalid`] |

/// State of a single frame.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum FrameState {
    Free,
    /// First frame of an allocated run (also single-frame runs).
    Head,
    /// Interior frame of an allocated run.
    Allocated,
    /// The unused `0b01` code.
    Invalid,
}

impl FrameState {
    #[inline]
    #[must_use]
    pub const fn bits(self) -> u8 {
        match self {
            Self::Free => 0b00,
            Self::Invalid => 0b01,
            Self::Head => 0b10,
            Self::Allocated => 0b11,
        }
    }

    #[inline]
    #[must_use]
    pub const fn from_bits(bits: u8) -> Self {
        match bits & 0b11 {
            0b00 => Self::Free,
            0b10 => Self::Head,
            0b11 => Self::Allocated,
            _ => Self::Invalid,
        }
    }

    #[inline]
    #[must_use]
    pub const fn is_free(self) -> bool {
        matches!(self, Self::Free)
    }
}

/// Number of bitmap bytes needed for `n_frames` frames.
#[inline]
#[must_use]
pub const fn bitmap_bytes(n_frames: u32) -> usize {
    (n_frames as usize).div_ceil(4)
}

/// Borrowed view over a packed 2-bit state bitmap.
pub struct FrameBitmap<'m> {
    bytes: &'m mut [u8],
}

impl<'m> FrameBitmap<'m> {
    #[must_use]
    pub const fn new(bytes: &'m mut [u8]) -> Self {
        Self { bytes }
    }

    /// Number of frames the bitmap can describe.
    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.bytes.len() * 4
    }

    #[inline]
    #[allow(clippy::cast_possible_truncation)]
    const fn locate(index: usize) -> (usize, u32) {
        (index / 4, 6 - 2 * (index % 4) as u32)
    }

    /// State of the frame at `index` (relative to the pool base).
    #[inline]
    #[must_use]
    pub fn get(&self, index: usize) -> FrameState {
        let (byte, shift) = Self::locate(index);
        FrameState::from_bits(self.bytes[byte] >> shift)
    }

    #[inline]
    pub fn set(&mut self, index: usize, state: FrameState) {
        let (byte, shift) = Self::locate(index);
        let b = &mut self.bytes[byte];
        *b = (*b & !(0b11 << shift)) | (state.bits() << shift);
    }

    /// Mark every frame free.
    pub fn clear(&mut self) {
        self.bytes.fill(0);
    }

    /// Raw bytes, for inspection.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8] {
        &*self.bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn most_significant_pair_is_first_frame() {
        let mut raw = [0u8; 2];
        let mut bm = FrameBitmap::new(&mut raw);
        bm.set(0, FrameState::Head);
        assert_eq!(bm.as_bytes()[0], 0x80);

        bm.set(1, FrameState::Allocated);
        assert_eq!(bm.as_bytes()[0], 0xB0);

        bm.set(7, FrameState::Head);
        assert_eq!(bm.as_bytes()[1], 0x02);

        assert_eq!(bm.get(0), FrameState::Head);
        assert_eq!(bm.get(1), FrameState::Allocated);
        assert_eq!(bm.get(2), FrameState::Free);
    }

    #[test]
    fn set_overwrites_only_its_pair() {
        let mut raw = [0xFFu8; 1];
        let mut bm = FrameBitmap::new(&mut raw);
        bm.set(2, FrameState::Free);
        assert_eq!(bm.as_bytes()[0], 0b1111_0011);
        assert_eq!(bm.get(3), FrameState::Allocated);
    }

    #[test]
    fn unused_code_decodes_as_invalid() {
        let mut raw = [0b0100_0000u8];
        let bm = FrameBitmap::new(&mut raw);
        assert_eq!(bm.get(0), FrameState::Invalid);
        assert!(!bm.get(0).is_free());
    }

    #[test]
    fn byte_count_rounds_up() {
        assert_eq!(bitmap_bytes(8), 2);
        assert_eq!(bitmap_bytes(1024), 256);
        assert_eq!(bitmap_bytes(9), 3);
    }
}
