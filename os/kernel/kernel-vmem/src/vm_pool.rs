//! # Virtual memory pools
//!
//! A [`VmPool`] hands out regions of the virtual range `[base, base + size)`
//! of one address space. Allocation only reserves addresses; frames arrive
//! later through the fault handler, and go back to the frame pool when the
//! region is released.
//!
//! The pool describes itself: its [`RegionTable`] lives in the pool's first
//! page, which is never part of a region. Touching the table the first time
//! faults that page in like any other.
//!
//! ```text
//! base            base + 4 KiB                              base + size
//! | region table  | region 0 | region 1 | ...  →  bump       |
//! ```
//!
//! Placement is a pure bump pointer after the last region. Holes left by
//! released regions are never reused; releasing the last region makes its
//! range available to the next allocation.

use crate::self_map::SELF_MAP_WINDOW;
use crate::{AddressSpace, Paging, PagingError, PagingHardware};
use kernel_alloc::{FramePoolError, FramePools, PhysMapper, PoolId};
use kernel_memory_addresses::{PAGE_SIZE, PageNumber, VirtualAddress, page_align_up};
use log::{debug, warn};

/// Maximum number of regions one VM pool tracks.
pub const MAX_REGIONS: usize = 32;

/// A contiguous range of virtual memory handed out by a [`VmPool`].
#[repr(C)]
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Region {
    base: VirtualAddress,
    size: u32,
}

impl Region {
    #[inline]
    #[must_use]
    pub const fn base(&self) -> VirtualAddress {
        self.base
    }

    /// Size in bytes; always a whole number of pages.
    #[inline]
    #[must_use]
    pub const fn size(&self) -> u32 {
        self.size
    }

    /// One past the last byte of the region.
    #[inline]
    #[must_use]
    pub const fn end(&self) -> VirtualAddress {
        VirtualAddress::new(self.base.as_u32() + self.size)
    }

    /// `base <= va < base + size`.
    #[inline]
    #[must_use]
    pub const fn contains(&self, va: VirtualAddress) -> bool {
        va.as_u32() >= self.base.as_u32() && va.as_u32() - self.base.as_u32() < self.size
    }

    /// Every page of the region in ascending order.
    pub fn pages(&self) -> impl Iterator<Item = PageNumber> + use<> {
        let first = self.base.page();
        (0..self.size / PAGE_SIZE).map(move |i| first + i)
    }
}

/// In-place region table stored in the first page of a [`VmPool`].
#[repr(C)]
pub(crate) struct RegionTable {
    len: u32,
    regions: [Region; MAX_REGIONS],
}

const _: () = {
    assert!(size_of::<RegionTable>() <= PAGE_SIZE as usize);
};

impl RegionTable {
    fn clear(&mut self) {
        self.len = 0;
    }

    #[allow(clippy::cast_possible_truncation)]
    pub(crate) fn as_slice(&self) -> &[Region] {
        let len = (self.len as usize).min(MAX_REGIONS);
        &self.regions[..len]
    }

    fn is_full(&self) -> bool {
        self.as_slice().len() == MAX_REGIONS
    }

    fn last(&self) -> Option<&Region> {
        self.as_slice().last()
    }

    #[allow(clippy::cast_possible_truncation)]
    fn push(&mut self, region: Region) {
        let len = self.as_slice().len();
        self.regions[len] = region;
        self.len = len as u32 + 1;
    }

    fn position(&self, base: VirtualAddress) -> Option<usize> {
        self.as_slice().iter().position(|r| r.base == base)
    }

    /// Remove entry `i`, shifting later entries down.
    #[allow(clippy::cast_possible_truncation)]
    fn remove(&mut self, i: usize) -> Region {
        let len = self.as_slice().len();
        let region = self.regions[i];
        self.regions.copy_within(i + 1..len, i);
        self.len = len as u32 - 1;
        region
    }

    pub(crate) fn contains(&self, va: VirtualAddress) -> bool {
        self.as_slice().iter().any(|r| r.contains(va))
    }
}

/// Bump allocator of virtual regions inside one address space.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct VmPool {
    base: VirtualAddress,
    size: u32,
    frame_pool: PoolId,
}

impl VmPool {
    /// Create a pool over `[base, base + size)` whose pages come from `frame_pool`,
    /// and register it with `space`.
    ///
    /// The region table page is faulted in right away.
    ///
    /// # Errors
    /// - [`PagingError::Config`] when the range is not page aligned, smaller
    ///   than a page, reaches into the shared region or the self-map window,
    ///   or overlaps another pool of `space`.
    /// - [`FramePoolError::UnknownPool`] when `frame_pool` is not registered.
    /// - [`PagingError::RegistryFull`] when `space` tracks too many pools.
    /// - Whatever faulting in the region table page reports.
    pub fn new<M: PhysMapper>(
        base: VirtualAddress,
        size: u32,
        frame_pool: PoolId,
        space: &mut AddressSpace<'_, M>,
        frames: &mut FramePools<'_>,
    ) -> Result<Self, PagingError> {
        if !base.is_page_aligned() || size == 0 || !size.is_multiple_of(PAGE_SIZE) {
            return Err(PagingError::Config(
                "VM pool must be page aligned and at least one page",
            ));
        }
        if base.as_u32() < space.config().shared_size {
            return Err(PagingError::Config("VM pool overlaps the shared region"));
        }
        if base
            .checked_add(size)
            .is_none_or(|end| end > SELF_MAP_WINDOW)
        {
            return Err(PagingError::Config("VM pool overlaps the self-map window"));
        }
        if !frames.contains_id(frame_pool) {
            return Err(FramePoolError::UnknownPool(frame_pool).into());
        }

        let pool = Self {
            base,
            size,
            frame_pool,
        };
        space.register_pool(&pool)?;

        match space.region_table_mut(frames, base) {
            Ok(table) => table.clear(),
            Err(e) => {
                space.unregister_pool(base);
                return Err(e);
            }
        }

        debug!("Created VM pool {base}..+{size:#x} backed by frame pool {frame_pool}");
        Ok(pool)
    }

    #[inline]
    #[must_use]
    pub const fn base(&self) -> VirtualAddress {
        self.base
    }

    #[inline]
    #[must_use]
    pub const fn size(&self) -> u32 {
        self.size
    }

    /// One past the last byte of the pool.
    #[inline]
    #[must_use]
    pub const fn end(&self) -> VirtualAddress {
        VirtualAddress::new(self.base.as_u32() + self.size)
    }

    /// Frame pool backing the pages of this pool.
    #[inline]
    #[must_use]
    pub const fn frame_pool(&self) -> PoolId {
        self.frame_pool
    }

    /// Reserve a region of `size` bytes, rounded up to whole pages, and
    /// return its first address.
    ///
    /// # Errors
    /// - [`PagingError::InvalidSize`] for `size == 0`.
    /// - [`PagingError::CapacityExceeded`] when [`MAX_REGIONS`] regions are active.
    /// - [`PagingError::PoolExhausted`] when the region would run past the pool.
    pub fn allocate<M: PhysMapper>(
        &self,
        space: &mut AddressSpace<'_, M>,
        frames: &mut FramePools<'_>,
        size: u32,
    ) -> Result<VirtualAddress, PagingError> {
        if size == 0 {
            return Err(PagingError::InvalidSize);
        }
        let size = page_align_up(size).ok_or(PagingError::PoolExhausted)?;

        let table = space.region_table_mut(frames, self.base)?;
        if table.is_full() {
            warn!("VM pool {}: region table is full", self.base);
            return Err(PagingError::CapacityExceeded);
        }

        let start = table.last().map_or(self.base + PAGE_SIZE, Region::end);
        let fits = start
            .checked_add(size)
            .is_some_and(|end| end <= self.end());
        if !fits {
            warn!("VM pool {}: no room for {size:#x} bytes at {start}", self.base);
            return Err(PagingError::PoolExhausted);
        }

        table.push(Region { base: start, size });
        debug!("VM pool {}: allocated region {start}..+{size:#x}", self.base);
        Ok(start)
    }

    /// Release the region starting exactly at `start`: free its pages, drop it
    /// from the table and flush cached translations.
    ///
    /// # Errors
    /// - [`PagingError::RegionNotFound`] when no region starts at `start`.
    /// - Whatever freeing a page reports.
    pub fn release<M: PhysMapper, H: PagingHardware>(
        &self,
        space: &mut AddressSpace<'_, M>,
        frames: &mut FramePools<'_>,
        paging: &mut Paging<H>,
        start: VirtualAddress,
    ) -> Result<(), PagingError> {
        let table = space.region_table_mut(frames, self.base)?;
        let Some(i) = table.position(start) else {
            warn!("VM pool {}: no region starts at {start}", self.base);
            return Err(PagingError::RegionNotFound(start));
        };
        let region = table.as_slice()[i];

        let mut freed = 0;
        for page in region.pages() {
            if space.free_page(frames, page)?.is_some() {
                freed += 1;
            }
        }

        space.region_table_mut(frames, self.base)?.remove(i);
        paging.flush(space);

        debug!(
            "VM pool {}: released region {start}..+{:#x}, {freed} frames returned",
            self.base, region.size
        );
        Ok(())
    }

    /// Whether `addr` lies inside one of the active regions.
    ///
    /// Never faults and never changes anything.
    #[must_use]
    pub fn is_legitimate<M: PhysMapper>(
        &self,
        space: &AddressSpace<'_, M>,
        addr: VirtualAddress,
    ) -> bool {
        space
            .region_table(self.base)
            .is_some_and(|table| table.contains(addr))
    }

    /// Active regions in ascending address order.
    pub fn regions<'s, M: PhysMapper>(
        &self,
        space: &'s AddressSpace<'_, M>,
    ) -> impl Iterator<Item = Region> + 's {
        space
            .region_table(self.base)
            .map(RegionTable::as_slice)
            .unwrap_or_default()
            .iter()
            .copied()
    }

    /// Number of active regions.
    #[must_use]
    pub fn len<M: PhysMapper>(&self, space: &AddressSpace<'_, M>) -> usize {
        self.regions(space).count()
    }

    #[must_use]
    pub fn is_empty<M: PhysMapper>(&self, space: &AddressSpace<'_, M>) -> bool {
        self.len(space) == 0
    }
}
