//! # 32-bit Page Directory and Page Table
//!
//! - [`PdEntry`]: a directory entry; when present it points to a second-level table.
//! - [`PtEntry`]: a table entry; when present it maps one 4 KiB page.
//! - [`PageDirectory`] / [`PageTable`]: 4 KiB-aligned arrays of 1024 entries.
//!
//! Both entry kinds wrap the same [`PageEntryBits`] layout. Raw constructors
//! don't validate anything; after changing active mappings the caller reloads
//! the translation root.

use crate::PageEntryBits;
use kernel_memory_addresses::{DirectoryIndex, ENTRIES_PER_TABLE, FrameNumber, PAGE_SIZE, TableIndex};

/// A single page directory entry (PDE).
#[doc(alias = "PDE")]
#[repr(transparent)]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct PdEntry(PageEntryBits);

/// A single page table entry (PTE).
#[doc(alias = "PTE")]
#[repr(transparent)]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct PtEntry(PageEntryBits);

/// The page directory: 1024 entries, 4 KiB-aligned.
#[repr(C, align(4096))]
pub struct PageDirectory {
    entries: [PdEntry; ENTRIES_PER_TABLE],
}

/// A second-level page table: 1024 entries, 4 KiB-aligned.
#[doc(alias = "PT")]
#[repr(C, align(4096))]
pub struct PageTable {
    entries: [PtEntry; ENTRIES_PER_TABLE],
}

const _: () = {
    assert!(size_of::<PageDirectory>() == PAGE_SIZE as usize);
    assert!(size_of::<PageTable>() == PAGE_SIZE as usize);
};

impl PdEntry {
    /// Create a zero (non-present) entry.
    #[inline]
    #[must_use]
    pub const fn zero() -> Self {
        Self(PageEntryBits::new())
    }

    /// Point at the second-level table in `frame`. Forces `present=1`, `PS=0`.
    #[inline]
    #[must_use]
    pub const fn make_table(frame: FrameNumber, flags: PageEntryBits) -> Self {
        Self(flags.with_present(true).with_large_page(false).with_frame(frame))
    }

    #[inline]
    #[must_use]
    pub const fn is_present(self) -> bool {
        self.0.present()
    }

    #[inline]
    #[must_use]
    pub const fn flags(self) -> PageEntryBits {
        self.0
    }

    /// The frame of the second-level table, if present.
    #[inline]
    #[must_use]
    pub const fn table(self) -> Option<FrameNumber> {
        if self.is_present() {
            Some(self.0.frame())
        } else {
            None
        }
    }

    #[inline]
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0.into_bits()
    }

    #[inline]
    #[must_use]
    pub const fn from_raw(v: u32) -> Self {
        Self(PageEntryBits::from_bits(v))
    }
}

impl PtEntry {
    /// Create a zero (non-present, supervisor) entry.
    #[inline]
    #[must_use]
    pub const fn zero() -> Self {
        Self(PageEntryBits::new())
    }

    /// Create a non-present entry that keeps `flags` (minus `present`).
    #[inline]
    #[must_use]
    pub const fn not_present(flags: PageEntryBits) -> Self {
        Self(flags.with_present(false))
    }

    /// Create a 4 KiB leaf mapping `frame`. Forces `present=1`.
    #[inline]
    #[must_use]
    pub const fn make_4k(frame: FrameNumber, flags: PageEntryBits) -> Self {
        Self(flags.with_present(true).with_large_page(false).with_frame(frame))
    }

    #[inline]
    #[must_use]
    pub const fn is_present(self) -> bool {
        self.0.present()
    }

    #[inline]
    #[must_use]
    pub const fn flags(self) -> PageEntryBits {
        self.0
    }

    /// The mapped frame, if present.
    #[inline]
    #[must_use]
    pub const fn frame(self) -> Option<FrameNumber> {
        if self.is_present() {
            Some(self.0.frame())
        } else {
            None
        }
    }

    #[inline]
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0.into_bits()
    }

    #[inline]
    #[must_use]
    pub const fn from_raw(v: u32) -> Self {
        Self(PageEntryBits::from_bits(v))
    }
}

impl PageDirectory {
    /// Read the entry at `i`.
    #[inline]
    #[must_use]
    pub const fn get(&self, i: DirectoryIndex) -> PdEntry {
        self.entries[i.as_usize()]
    }

    /// Write the entry at `i`.
    #[inline]
    pub const fn set(&mut self, i: DirectoryIndex, e: PdEntry) {
        self.entries[i.as_usize()] = e;
    }

    /// Mark every entry non-present.
    #[inline]
    pub fn zero(&mut self) {
        self.entries.fill(PdEntry::zero());
    }
}

impl PageTable {
    /// Read the entry at `i`.
    #[inline]
    #[must_use]
    pub const fn get(&self, i: TableIndex) -> PtEntry {
        self.entries[i.as_usize()]
    }

    /// Write the entry at `i`.
    #[inline]
    pub const fn set(&mut self, i: TableIndex, e: PtEntry) {
        self.entries[i.as_usize()] = e;
    }

    /// Set every entry to `e`.
    #[inline]
    pub fn fill(&mut self, e: PtEntry) {
        self.entries.fill(e);
    }

    /// Number of present entries.
    #[must_use]
    pub fn present_count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_present()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_entry_points_at_frame() {
        let e = PdEntry::make_table(FrameNumber::new(0x200), PageEntryBits::kernel_rw());
        assert_eq!(e.raw(), 0x0020_0003);
        assert_eq!(e.table(), Some(FrameNumber::new(0x200)));
        assert_eq!(PdEntry::zero().table(), None);
    }

    #[test]
    fn leaf_keeps_flags() {
        let e = PtEntry::make_4k(FrameNumber::new(7), PageEntryBits::not_present_user());
        assert!(e.is_present());
        assert!(e.flags().user_access());
        assert!(!e.flags().writable());
        assert_eq!(e.frame(), Some(FrameNumber::new(7)));

        let gone = PtEntry::not_present(e.flags());
        assert_eq!(gone.frame(), None);
        assert!(gone.flags().user_access());
    }
}
