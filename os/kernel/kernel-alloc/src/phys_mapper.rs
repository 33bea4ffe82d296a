//! # Access to physical memory
//!
//! Frame pools keep their bitmap in physical frames and the paging code edits
//! page directories and tables that live in physical frames. Rust can only
//! dereference addresses of the current address space, so both go through a
//! [`PhysMapper`] that turns a physical address into a usable reference.
//!
//! - [`IdentityPhysMapper`]: physical address == pointer. Valid while paging
//!   is off and for the identity-mapped shared region afterwards.
//! - [`HostPhysMemory`] (feature `host-memory`): a host-allocated, 4 KiB
//!   aligned frame array. Physical address `pa` is byte `pa` of the array.

use kernel_memory_addresses::{FRAME_SIZE, FrameNumber, PhysicalAddress};

/// Converts physical addresses to *temporarily* usable references in the
/// current address space.
///
/// # Safety
/// - `pa` must be backed by memory the caller may write for the lifetime `'a`.
/// - Type `T` must match the bytes at `pa` (no aliasing UB).
/// - Two live references to the same frame must not be created.
pub trait PhysMapper {
    /// Convert a *physical* address to a mutable reference.
    ///
    /// # Safety
    /// See the trait documentation.
    unsafe fn phys_to_mut<'a, T>(&self, pa: PhysicalAddress) -> &'a mut T;

    /// View `len` bytes starting at physical address `pa`.
    ///
    /// # Safety
    /// See the trait documentation.
    unsafe fn phys_bytes_mut<'a>(&self, pa: PhysicalAddress, len: usize) -> &'a mut [u8];

    /// Fill a whole frame with zeros.
    ///
    /// # Safety
    /// The frame must not be referenced elsewhere while it is cleared.
    unsafe fn zero_frame(&self, frame: FrameNumber) {
        let bytes = unsafe { self.phys_bytes_mut(frame.base(), FRAME_SIZE as usize) };
        bytes.fill(0);
    }
}

/// [`PhysMapper`] for memory that is identity mapped (or not translated at all).
#[derive(Debug, Default, Copy, Clone)]
pub struct IdentityPhysMapper;

impl PhysMapper for IdentityPhysMapper {
    unsafe fn phys_to_mut<'a, T>(&self, pa: PhysicalAddress) -> &'a mut T {
        let ptr = pa.as_usize() as *mut T;
        debug_assert!(ptr.is_aligned());
        // SAFETY: Caller guarantees `pa` is identity mapped and holds a `T`.
        unsafe { &mut *ptr }
    }

    unsafe fn phys_bytes_mut<'a>(&self, pa: PhysicalAddress, len: usize) -> &'a mut [u8] {
        let ptr = pa.as_usize() as *mut u8;
        // SAFETY: Caller guarantees `[pa, pa + len)` is identity mapped.
        unsafe { core::slice::from_raw_parts_mut(ptr, len) }
    }
}

#[cfg(any(test, feature = "host-memory"))]
pub use host::HostPhysMemory;

#[cfg(any(test, feature = "host-memory"))]
mod host {
    use super::PhysMapper;
    use alloc::alloc::{Layout, alloc_zeroed, dealloc, handle_alloc_error};
    use core::ptr::NonNull;
    use kernel_memory_addresses::{FRAME_SIZE, FrameNumber, PhysicalAddress};

    /// Simulated physical RAM: `frames` zeroed, 4 KiB aligned frames starting
    /// at physical address 0.
    ///
    /// Accesses outside the array panic, which turns stray physical addresses
    /// into test failures instead of host memory corruption.
    pub struct HostPhysMemory {
        base: NonNull<u8>,
        frames: usize,
    }

    impl HostPhysMemory {
        /// Allocate `frames` zeroed frames.
        ///
        /// # Panics
        /// Panics if `frames` is zero or the size overflows a host allocation.
        #[must_use]
        pub fn with_frames(frames: usize) -> Self {
            let layout = Self::layout(frames);
            // SAFETY: The layout has a non-zero size.
            let ptr = unsafe { alloc_zeroed(layout) };
            let Some(base) = NonNull::new(ptr) else {
                handle_alloc_error(layout)
            };
            Self { base, frames }
        }

        fn layout(frames: usize) -> Layout {
            assert!(frames > 0, "host memory needs at least one frame");
            let size = frames
                .checked_mul(FRAME_SIZE as usize)
                .unwrap_or_else(|| panic!("{frames} frames do not fit the host address space"));
            Layout::from_size_align(size, FRAME_SIZE as usize)
                .unwrap_or_else(|_| panic!("invalid host memory layout for {frames} frames"))
        }

        #[inline]
        #[must_use]
        pub const fn frame_count(&self) -> usize {
            self.frames
        }

        /// One past the last simulated frame.
        #[inline]
        #[must_use]
        #[allow(clippy::cast_possible_truncation)]
        pub const fn end_frame(&self) -> FrameNumber {
            FrameNumber::new(self.frames as u32)
        }

        fn checked_ptr(&self, pa: PhysicalAddress, len: usize) -> *mut u8 {
            let start = pa.as_usize();
            let in_bounds = start
                .checked_add(len)
                .is_some_and(|end| end <= self.frames * FRAME_SIZE as usize);
            assert!(in_bounds, "physical access {pa}..+{len:#x} outside host memory");
            // SAFETY: `start + len` lies inside the allocation.
            unsafe { self.base.as_ptr().add(start) }
        }
    }

    impl PhysMapper for HostPhysMemory {
        unsafe fn phys_to_mut<'a, T>(&self, pa: PhysicalAddress) -> &'a mut T {
            let ptr = self.checked_ptr(pa, size_of::<T>()).cast::<T>();
            assert!(ptr.is_aligned(), "misaligned physical access at {pa}");
            // SAFETY: In bounds and aligned; the caller promises `T` matches the bytes.
            unsafe { &mut *ptr }
        }

        unsafe fn phys_bytes_mut<'a>(&self, pa: PhysicalAddress, len: usize) -> &'a mut [u8] {
            let ptr = self.checked_ptr(pa, len);
            // SAFETY: In bounds; the caller promises exclusive access.
            unsafe { core::slice::from_raw_parts_mut(ptr, len) }
        }
    }

    impl Drop for HostPhysMemory {
        fn drop(&mut self) {
            // SAFETY: Allocated in `with_frames` with the same layout.
            unsafe { dealloc(self.base.as_ptr(), Self::layout(self.frames)) }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_memory_is_zeroed_and_addressable() {
        let ram = HostPhysMemory::with_frames(4);
        let bytes = unsafe { ram.phys_bytes_mut(PhysicalAddress::new(0x2000), 16) };
        assert!(bytes.iter().all(|&b| b == 0));
        bytes[3] = 0xAB;

        let word: &mut u32 = unsafe { ram.phys_to_mut(PhysicalAddress::new(0x2000)) };
        assert_eq!(*word, 0xAB00_0000);
    }

    #[test]
    fn zero_frame_clears_the_whole_frame() {
        let ram = HostPhysMemory::with_frames(2);
        unsafe { ram.phys_bytes_mut(FrameNumber::new(1).base(), 4096) }.fill(0xFF);
        unsafe { ram.zero_frame(FrameNumber::new(1)) };
        let bytes = unsafe { ram.phys_bytes_mut(FrameNumber::new(1).base(), 4096) };
        assert!(bytes.iter().all(|&b| b == 0));
    }

    #[test]
    #[should_panic(expected = "outside host memory")]
    fn out_of_bounds_access_panics() {
        let ram = HostPhysMemory::with_frames(1);
        let _ = unsafe { ram.phys_bytes_mut(PhysicalAddress::new(0x0FF0), 32) };
    }
}
