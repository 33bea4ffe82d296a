//! # Self-mapped page directory
//!
//! The last directory slot points back at the directory's own frame. When the
//! MMU resolves an address whose directory index is 1023 it therefore uses the
//! directory as the second-level table, and the table index selects *another
//! directory entry*. The result is a fixed 4 MiB window in which every
//! second-level table of the address space appears as a 4 KiB page:
//!
//! ```text
//! 0xFFC0_0000 + i * 4096   second-level table for directory index i
//! 0xFFFF_F000              the directory itself (i = 1023)
//! ```
//!
//! [`TableHandle`] records that arithmetic. `AddressSpace::translate`
//! resolves a handle by walking the same two entries the MMU would read,
//! so no separate virtual pointers to tables are kept anywhere.

use core::fmt;
use kernel_memory_addresses::{DirectoryIndex, FrameNumber, PAGE_SIZE, VirtualAddress};

/// Directory slot that maps the directory itself.
pub const SELF_MAP_INDEX: DirectoryIndex = DirectoryIndex::LAST;

/// First address of the 4 MiB window exposing every second-level table.
pub const SELF_MAP_WINDOW: VirtualAddress = VirtualAddress::new(0xFFC0_0000);

/// Virtual address of the directory inside the self-map window.
pub const DIRECTORY_WINDOW: VirtualAddress = table_window(SELF_MAP_INDEX);

const _: () = {
    assert!(DIRECTORY_WINDOW.as_u32() == 0xFFFF_F000);
};

/// Virtual address at which the table for directory slot `i` is visible.
#[inline]
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub const fn table_window(i: DirectoryIndex) -> VirtualAddress {
    VirtualAddress::new(SELF_MAP_WINDOW.as_u32() | (i.as_usize() as u32 * PAGE_SIZE))
}

/// A second-level table reached through the self-map window.
#[derive(Copy, Clone, Eq, PartialEq)]
pub struct TableHandle {
    index: DirectoryIndex,
    frame: FrameNumber,
}

impl TableHandle {
    #[inline]
    #[must_use]
    pub(crate) const fn new(index: DirectoryIndex, frame: FrameNumber) -> Self {
        Self { index, frame }
    }

    /// Directory slot this table hangs off.
    #[inline]
    #[must_use]
    pub const fn index(&self) -> DirectoryIndex {
        self.index
    }

    /// Physical frame holding the table.
    #[inline]
    #[must_use]
    pub const fn frame(&self) -> FrameNumber {
        self.frame
    }

    /// Where the table is visible while its address space is active.
    #[inline]
    #[must_use]
    pub const fn window(&self) -> VirtualAddress {
        table_window(self.index)
    }
}

impl fmt::Debug for TableHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TableHandle")
            .field("index", &self.index)
            .field("frame", &self.frame)
            .field("window", &self.window())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn windows_follow_directory_index() {
        assert_eq!(table_window(DirectoryIndex::new(0)).as_u32(), 0xFFC0_0000);
        assert_eq!(table_window(DirectoryIndex::new(1)).as_u32(), 0xFFC0_1000);
        assert_eq!(table_window(DirectoryIndex::new(0x3FE)).as_u32(), 0xFFFF_E000);
        assert_eq!(DIRECTORY_WINDOW.directory_index(), SELF_MAP_INDEX);
    }
}
