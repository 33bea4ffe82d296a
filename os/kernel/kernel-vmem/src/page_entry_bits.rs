use bitfield_struct::bitfield;
use kernel_memory_addresses::FrameNumber;

/// A single 32-bit page directory or page table entry in its raw bitfield form.
///
/// Directory entries and table entries share one layout, which is what makes
/// the self-mapped directory work: the MMU can walk the directory as if it
/// were a second-level table.
///
/// ### Bit layout
///
/// | Bits  | Name / Mnemonic | Meaning |
/// |-------|-----------------|---------|
/// | 0     | `P` (present)   | Valid entry if set |
/// | 1     | `RW`            | Writable if set |
/// | 2     | `US`            | User-mode accessible if set |
/// | 3     | `PWT`           | Write-through caching |
/// | 4     | `PCD`           | Disable caching |
/// | 5     | `A`             | Accessed |
/// | 6     | `D`             | Dirty (leaf only) |
/// | 7     | `PS`            | 4 MiB page (directory only; never set here) |
/// | 8     | `G`             | Global (leaf only) |
/// | 9–11  | OS avail        | Reserved for OS use |
/// | 12–31 | `frame`         | Physical frame number |
///
/// ### Example
/// ```rust
/// # use kernel_vmem::PageEntryBits;
/// # use kernel_memory_addresses::FrameNumber;
/// let e = PageEntryBits::user_rw().with_frame(FrameNumber::new(0x402));
/// assert_eq!(e.into_bits(), 0x0040_2007);
/// ```
#[bitfield(u32)]
#[derive(PartialEq, Eq)]
pub struct PageEntryBits {
    /// Present (P, bit 0).
    ///
    /// Clear means any access through this entry raises a not-present fault.
    pub present: bool,

    /// Writable (RW, bit 1).
    pub writable: bool,

    /// User/Supervisor (US, bit 2).
    ///
    /// Set to allow user-mode access; clear restricts to supervisor only.
    pub user_access: bool,

    /// Page Write-Through (PWT, bit 3).
    pub write_through: bool,

    /// Page Cache Disable (PCD, bit 4).
    pub cache_disabled: bool,

    /// Accessed (A, bit 5). Set by the CPU.
    pub accessed: bool,

    /// Dirty (D, bit 6) — **leaf only**. Set by the CPU on first write.
    pub dirty: bool,

    /// Page Size (PS, bit 7).
    ///
    /// Would select a 4 MiB page in a directory entry. Huge pages are not
    /// used, so this stays clear.
    pub large_page: bool,

    /// Global (G, bit 8) — **leaf only**.
    pub global_translation: bool,

    /// OS-available (bits 9..=11); ignored by hardware.
    #[bits(3)]
    pub os_available: u8,

    /// Physical frame number (bits 12..=31).
    #[bits(20)]
    frame_bits: u32,
}

impl PageEntryBits {
    #[inline]
    #[must_use]
    pub const fn frame(&self) -> FrameNumber {
        FrameNumber::new(self.frame_bits())
    }

    #[inline]
    #[must_use]
    pub const fn with_frame(self, frame: FrameNumber) -> Self {
        self.with_frame_bits(frame.as_u32())
    }

    /// Present, supervisor-only, read/write.
    #[inline]
    #[must_use]
    pub const fn kernel_rw() -> Self {
        Self::new().with_present(true).with_writable(true)
    }

    /// Present, user-accessible, read/write.
    #[inline]
    #[must_use]
    pub const fn user_rw() -> Self {
        Self::kernel_rw().with_user_access(true)
    }

    /// Not present, user. The default for slots of a fresh second-level table.
    #[inline]
    #[must_use]
    pub const fn not_present_user() -> Self {
        Self::new().with_user_access(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn low_flag_encoding() {
        assert_eq!(PageEntryBits::kernel_rw().into_bits(), 0b011);
        assert_eq!(PageEntryBits::user_rw().into_bits(), 0b111);
        assert_eq!(PageEntryBits::not_present_user().into_bits(), 0b100);
    }

    #[test]
    fn frame_lives_in_high_bits() {
        let e = PageEntryBits::from_bits(0xFFFF_F003);
        assert!(e.present());
        assert!(e.writable());
        assert!(!e.user_access());
        assert_eq!(e.frame(), FrameNumber::new(0xFFFFF));
    }
}
