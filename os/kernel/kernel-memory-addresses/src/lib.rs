//! # Physical and Virtual Memory Address Types (32-bit, two-level paging)
//!
//! Strongly typed wrappers for raw 32-bit addresses, frame numbers and page
//! numbers used by the frame allocator and the paging code.
//!
//! ## Overview
//!
//! | Type | Description |
//! |------|-------------|
//! | [`MemoryAddress`] | A raw 32-bit address, either physical or virtual. |
//! | [`PhysicalAddress`] / [`FrameNumber`] | Physical memory and the 4 KiB frame that contains it. |
//! | [`VirtualAddress`] / [`PageNumber`] | Virtual memory and the 4 KiB page that contains it. |
//! | [`DirectoryIndex`] / [`TableIndex`] | The two 10-bit indices a virtual address is split into. |
//!
//! ## Address split
//!
//! ```text
//! | 31‒22           | 21‒12       | 11‒0   |
//! | directory index | table index | offset |
//! ```
//!
//! Each level holds [`ENTRIES_PER_TABLE`] (1024) 32-bit entries, so one
//! second-level table spans [`TABLE_SPAN`] (4 MiB) of virtual memory.
//!
//! ## Typical Usage
//!
//! ```rust
//! # use kernel_memory_addresses::*;
//! let va = VirtualAddress::new(0x0040_2123);
//! assert_eq!(va.directory_index().as_usize(), 1);
//! assert_eq!(va.table_index().as_usize(), 2);
//! assert_eq!(va.offset(), 0x123);
//!
//! let frame = FrameNumber::new(3);
//! assert_eq!(frame.base().as_u32(), 0x3000);
//! assert_eq!(PhysicalAddress::new(0x3fff).frame(), frame);
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]

mod frame_number;
mod page_number;
mod physical_address;
mod table_index;
mod virtual_address;

pub use crate::frame_number::FrameNumber;
pub use crate::page_number::PageNumber;
pub use crate::physical_address::PhysicalAddress;
pub use crate::table_index::{DirectoryIndex, TableIndex};
pub use crate::virtual_address::VirtualAddress;

use core::fmt;
use core::ops::{Add, AddAssign};

/// Size of a physical frame in bytes.
pub const FRAME_SIZE: u32 = 4096;

/// Size of a virtual page in bytes. Pages and frames are the same size.
pub const PAGE_SIZE: u32 = FRAME_SIZE;

/// log2([`PAGE_SIZE`]); number of offset bits in an address.
pub const PAGE_SHIFT: u32 = 12;

/// Number of entries in the page directory and in every second-level table.
pub const ENTRIES_PER_TABLE: usize = 1024;

/// Shift of the directory index inside a virtual address.
pub const DIRECTORY_SHIFT: u32 = 22;

/// Bytes of virtual memory covered by one second-level table.
pub const TABLE_SPAN: u32 = 1 << DIRECTORY_SHIFT;

/// Number of frames addressable with 32-bit physical addresses.
pub const FRAME_COUNT_LIMIT: u32 = 1 << (32 - PAGE_SHIFT);

const _: () = {
    assert!(1 << PAGE_SHIFT == PAGE_SIZE);
    assert!(ENTRIES_PER_TABLE * 4 == PAGE_SIZE as usize);
    assert!(TABLE_SPAN == ENTRIES_PER_TABLE as u32 * PAGE_SIZE);
};

/// Principal raw memory address ([virtual](VirtualAddress) or [physical](PhysicalAddress)).
#[repr(transparent)]
#[derive(Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct MemoryAddress(u32);

impl MemoryAddress {
    #[inline]
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    #[inline]
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    /// Align down to a page boundary.
    #[inline]
    #[must_use]
    pub const fn align_down(self) -> Self {
        Self(self.0 & !(PAGE_SIZE - 1))
    }

    /// The offset of this address inside its page.
    #[inline]
    #[must_use]
    pub const fn offset(self) -> u32 {
        self.0 & (PAGE_SIZE - 1)
    }

    #[inline]
    #[must_use]
    pub const fn is_page_aligned(self) -> bool {
        self.offset() == 0
    }

    #[inline]
    #[must_use]
    pub const fn checked_add(self, rhs: u32) -> Option<Self> {
        match self.0.checked_add(rhs) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }
}

impl fmt::Debug for MemoryAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MemoryAddress(0x{:08X})", self.0)
    }
}

impl fmt::Display for MemoryAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08X}", self.0)
    }
}

impl Add<u32> for MemoryAddress {
    type Output = Self;
    #[inline]
    fn add(self, rhs: u32) -> Self::Output {
        Self(self.0 + rhs)
    }
}

impl AddAssign<u32> for MemoryAddress {
    #[inline]
    fn add_assign(&mut self, rhs: u32) {
        self.0 += rhs;
    }
}

/// Align `x` up to the next page boundary, or `None` on overflow.
///
/// ```rust
/// # use kernel_memory_addresses::page_align_up;
/// assert_eq!(page_align_up(0), Some(0));
/// assert_eq!(page_align_up(1), Some(4096));
/// assert_eq!(page_align_up(4096), Some(4096));
/// assert_eq!(page_align_up(8193), Some(12288));
/// assert_eq!(page_align_up(u32::MAX), None);
/// ```
#[inline]
#[must_use]
pub const fn page_align_up(x: u32) -> Option<u32> {
    match x.checked_add(PAGE_SIZE - 1) {
        Some(v) => Some(v & !(PAGE_SIZE - 1)),
        None => None,
    }
}
