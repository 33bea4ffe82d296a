//! # Address Space (32-bit, two-level, self-mapped)
//!
//! One [`AddressSpace`] per process: a page directory, the second-level tables
//! it grows on demand, and the VM pools whose regions are legal to touch.
//!
//! ## Layout at construction
//!
//! - Directory slot 0 points to a table that identity maps the first
//!   `shared_size` bytes as present, supervisor-only, read/write.
//! - Directory slot 1023 points to the directory itself (see [`crate::self_map`]).
//! - Every other slot is not present.
//!
//! Directory and second-level tables are taken from the kernel frame pool.
//! Pages backing VM pool regions are taken from the frame pool the claiming
//! [`VmPool`] was created with.
//!
//! ## Fault handling
//!
//! [`AddressSpace::handle_fault`] implements the not-present fault path:
//!
//! 1. Protection violations (error code bit 0) are fatal.
//! 2. Addresses no VM pool claims are fatal (segmentation fault).
//! 3. A missing second-level table is created and installed.
//! 4. A page that is already present is left alone; otherwise a zeroed frame
//!    is mapped present, user, read/write.
//!
//! ## Safety
//!
//! Changing mappings of the active space requires a reload of the
//! translation root ([`Paging::flush`](crate::Paging::flush)).

use crate::page_table::{PageDirectory, PageTable, PdEntry, PtEntry};
use crate::self_map::{SELF_MAP_INDEX, SELF_MAP_WINDOW, TableHandle};
use crate::vm_pool::{RegionTable, VmPool};
use crate::{PageEntryBits, PageFault, Paging, PagingConfig, PagingError, PagingHardware};
use core::fmt;
use kernel_alloc::{FramePools, PhysMapper, PoolId};
use kernel_memory_addresses::{
    DirectoryIndex, FrameNumber, PAGE_SIZE, PageNumber, PhysicalAddress, TableIndex, VirtualAddress,
};
use log::{debug, error, trace, warn};

/// Maximum number of VM pools one address space tracks.
pub const MAX_VM_POOLS: usize = 16;

/// What the fault handler did.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum FaultOutcome {
    /// A fresh frame was mapped.
    Mapped(FrameNumber),
    /// The page was already mapped to this frame; nothing changed.
    AlreadyPresent(FrameNumber),
}

/// What the address space remembers about a registered VM pool.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
struct VmPoolRef {
    base: VirtualAddress,
    size: u32,
    frame_pool: PoolId,
}

impl VmPoolRef {
    const fn contains(&self, va: VirtualAddress) -> bool {
        va.as_u32() >= self.base.as_u32() && va.as_u32() - self.base.as_u32() < self.size
    }

    const fn end(&self) -> u32 {
        self.base.as_u32() + self.size
    }

    const fn overlaps(&self, other: &Self) -> bool {
        self.base.as_u32() < other.end() && other.base.as_u32() < self.end()
    }
}

/// Handle to a single, concrete address space.
pub struct AddressSpace<'m, M: PhysMapper> {
    mapper: &'m M,
    directory: FrameNumber,
    config: PagingConfig,
    pools: [Option<VmPoolRef>; MAX_VM_POOLS],
    n_pools: usize,
}

impl<'m, M: PhysMapper> AddressSpace<'m, M> {
    /// Build a new address space: directory, shared-region table, self map.
    ///
    /// # Errors
    /// - [`PagingError::NotInitialized`] before [`Paging::init_paging`].
    /// - [`PagingError::FramePool`] when the kernel pool has no two free
    ///   frames; nothing stays allocated in that case.
    ///
    /// # Safety
    /// `mapper` must give access to every frame of the kernel pool.
    pub unsafe fn new<H: PagingHardware>(
        mapper: &'m M,
        paging: &Paging<H>,
        frames: &mut FramePools<'_>,
    ) -> Result<Self, PagingError> {
        let config = paging.config().ok_or(PagingError::NotInitialized)?;

        let directory = frames.get_frames(config.kernel_pool, 1)?;
        let shared_table = match frames.get_frames(config.kernel_pool, 1) {
            Ok(frame) => frame,
            Err(e) => {
                if let Err(undo) = frames.release_frames(directory) {
                    warn!("Could not return directory frame {directory}: {undo}");
                }
                return Err(e.into());
            }
        };

        let mut space = Self {
            mapper,
            directory,
            config,
            pools: [None; MAX_VM_POOLS],
            n_pools: 0,
        };

        let shared_pages = config.shared_size / PAGE_SIZE;
        let table = space.table_mut(shared_table);
        for i in TableIndex::all() {
            #[allow(clippy::cast_possible_truncation)]
            let page = i.as_usize() as u32;
            let entry = if page < shared_pages {
                PtEntry::make_4k(FrameNumber::new(page), PageEntryBits::kernel_rw())
            } else {
                PtEntry::zero()
            };
            table.set(i, entry);
        }

        let dir = space.directory_mut();
        dir.zero();
        dir.set(
            DirectoryIndex::new(0),
            PdEntry::make_table(shared_table, PageEntryBits::kernel_rw()),
        );
        dir.set(
            SELF_MAP_INDEX,
            PdEntry::make_table(directory, PageEntryBits::kernel_rw()),
        );

        debug!(
            "Created address space: directory in frame {directory}, {shared_pages} shared pages"
        );
        Ok(space)
    }

    /// Frame holding the page directory.
    #[inline]
    #[must_use]
    pub const fn directory(&self) -> FrameNumber {
        self.directory
    }

    /// Physical address loaded into the translation root for this space.
    #[inline]
    #[must_use]
    pub const fn directory_phys(&self) -> PhysicalAddress {
        self.directory.base()
    }

    #[inline]
    #[must_use]
    pub const fn config(&self) -> PagingConfig {
        self.config
    }

    fn directory_ref(&self) -> &PageDirectory {
        // SAFETY: The directory frame is owned by this address space.
        unsafe { self.mapper.phys_to_mut::<PageDirectory>(self.directory.base()) }
    }

    fn directory_mut(&mut self) -> &mut PageDirectory {
        // SAFETY: The directory frame is owned by this address space.
        unsafe { self.mapper.phys_to_mut(self.directory.base()) }
    }

    fn table_ref(&self, frame: FrameNumber) -> &PageTable {
        // SAFETY: Only frames reached through this directory are passed in.
        unsafe { self.mapper.phys_to_mut::<PageTable>(frame.base()) }
    }

    fn table_mut(&mut self, frame: FrameNumber) -> &mut PageTable {
        // SAFETY: Only frames owned by this address space are passed in.
        unsafe { self.mapper.phys_to_mut(frame.base()) }
    }

    /// Raw directory entry at `i`.
    #[must_use]
    pub fn directory_entry(&self, i: DirectoryIndex) -> PdEntry {
        self.directory_ref().get(i)
    }

    /// Resolve the second-level table for directory slot `i` through the
    /// self map, the way the MMU does for an address in the window at
    /// `0xFFC0_0000 + i * 4096`.
    ///
    /// Returns `None` when slot `i` is not present.
    #[must_use]
    pub fn translate(&self, i: DirectoryIndex) -> Option<TableHandle> {
        // First step of the walk: slot 1023 leads back to the directory ...
        let own = self.directory_ref().get(SELF_MAP_INDEX).table()?;
        // ... which is then read as a second-level table, indexed by `i`.
        let frame = self
            .table_ref(own)
            .get(TableIndex::from_directory_index(i))
            .frame()?;
        Some(TableHandle::new(i, frame))
    }

    /// Every present second-level table, including the directory itself.
    pub fn tables(&self) -> impl Iterator<Item = TableHandle> + '_ {
        DirectoryIndex::all().filter_map(|i| self.translate(i))
    }

    /// Leaf entry for `va`, if its second-level table exists.
    #[must_use]
    pub fn entry(&self, va: VirtualAddress) -> Option<PtEntry> {
        let table = self.translate(va.directory_index())?;
        Some(self.table_ref(table.frame()).get(va.table_index()))
    }

    /// Translate a `VirtualAddress` to a `PhysicalAddress` if mapped.
    #[must_use]
    pub fn translate_address(&self, va: VirtualAddress) -> Option<PhysicalAddress> {
        let frame = self.entry(va)?.frame()?;
        Some(frame.base() + va.offset())
    }

    /// Register a VM pool with this address space.
    ///
    /// # Errors
    /// - [`PagingError::RegistryFull`] when [`MAX_VM_POOLS`] pools are registered.
    /// - [`PagingError::Config`] when the pool overlaps a registered one.
    pub fn register_pool(&mut self, pool: &VmPool) -> Result<(), PagingError> {
        let entry = VmPoolRef {
            base: pool.base(),
            size: pool.size(),
            frame_pool: pool.frame_pool(),
        };
        if self.n_pools == MAX_VM_POOLS {
            warn!("Cannot register VM pool at {}: registry full", entry.base);
            return Err(PagingError::RegistryFull);
        }
        if self.pools().any(|p| p.overlaps(&entry)) {
            return Err(PagingError::Config("VM pool overlaps a registered pool"));
        }

        self.pools[self.n_pools] = Some(entry);
        self.n_pools += 1;
        debug!(
            "Registered VM pool {}..+{:#x} ({} of {MAX_VM_POOLS})",
            entry.base, entry.size, self.n_pools
        );
        Ok(())
    }

    /// Forget the VM pool starting at `base`, keeping the order of the others.
    pub(crate) fn unregister_pool(&mut self, base: VirtualAddress) {
        let Some(i) = self.pools().position(|p| p.base == base) else {
            return;
        };
        self.pools.copy_within(i + 1..self.n_pools, i);
        self.n_pools -= 1;
        self.pools[self.n_pools] = None;
    }

    /// Number of registered VM pools.
    #[inline]
    #[must_use]
    pub const fn pool_count(&self) -> usize {
        self.n_pools
    }

    fn pools(&self) -> impl Iterator<Item = VmPoolRef> + '_ {
        self.pools[..self.n_pools].iter().flatten().copied()
    }

    /// Region table of the VM pool at `base`, if its page is mapped.
    pub(crate) fn region_table(&self, base: VirtualAddress) -> Option<&RegionTable> {
        let pa = self.translate_address(base)?;
        // SAFETY: The first page of a VM pool holds its region table.
        Some(unsafe { self.mapper.phys_to_mut::<RegionTable>(pa) })
    }

    /// Region table of the VM pool at `base`, faulting its page in if needed.
    pub(crate) fn region_table_mut(
        &mut self,
        frames: &mut FramePools<'_>,
        base: VirtualAddress,
    ) -> Result<&mut RegionTable, PagingError> {
        let pa = self.touch(frames, base)?;
        // SAFETY: The first page of a VM pool holds its region table.
        Ok(unsafe { self.mapper.phys_to_mut::<RegionTable>(pa) })
    }

    /// The VM pool that makes `va` legal to touch.
    ///
    /// A pool claims its own region-table page and every address inside one
    /// of its active regions.
    fn claiming_pool(&self, va: VirtualAddress) -> Option<VmPoolRef> {
        self.pools().find(|pool| {
            if !pool.contains(va) {
                return false;
            }
            va.as_u32() - pool.base.as_u32() < PAGE_SIZE
                || self
                    .region_table(pool.base)
                    .is_some_and(|table| table.contains(va))
        })
    }

    /// Whether any registered VM pool claims `va`.
    #[must_use]
    pub fn claims(&self, va: VirtualAddress) -> bool {
        self.claiming_pool(va).is_some()
    }

    fn create_table(
        &mut self,
        frames: &mut FramePools<'_>,
        i: DirectoryIndex,
    ) -> Result<TableHandle, PagingError> {
        let frame = frames.get_frames(self.config.kernel_pool, 1)?;
        self.table_mut(frame)
            .fill(PtEntry::not_present(PageEntryBits::not_present_user()));
        self.directory_mut()
            .set(i, PdEntry::make_table(frame, PageEntryBits::kernel_rw()));
        debug!("Created second-level table for {i:?} in frame {frame}");
        Ok(TableHandle::new(i, frame))
    }

    /// Resolve a page fault in this address space.
    ///
    /// # Errors
    /// - [`PagingError::ProtectionFault`] for protection violations.
    /// - [`PagingError::SegmentationFault`] when no VM pool claims the address.
    /// - [`PagingError::FramePool`] when no frame is left for a table or the page.
    pub fn handle_fault(
        &mut self,
        frames: &mut FramePools<'_>,
        fault: PageFault,
    ) -> Result<FaultOutcome, PagingError> {
        let va = fault.address;
        if fault.is_protection_violation() {
            error!("Protection fault at {va}: {}", fault.error.explain());
            return Err(PagingError::ProtectionFault(va));
        }

        let Some(pool) = self.claiming_pool(va) else {
            error!("Segmentation fault at {va}: no VM pool claims the address");
            return Err(PagingError::SegmentationFault(va));
        };

        let i = va.directory_index();
        let table = match self.translate(i) {
            Some(table) => table,
            None => self.create_table(frames, i)?,
        };

        let slot = va.table_index();
        if let Some(frame) = self.table_ref(table.frame()).get(slot).frame() {
            trace!("Fault at {va}: already mapped to frame {frame}");
            return Ok(FaultOutcome::AlreadyPresent(frame));
        }

        let frame = frames.get_frames(pool.frame_pool, 1)?;
        // SAFETY: The frame was just allocated; nothing references it.
        unsafe { self.mapper.zero_frame(frame) };
        self.table_mut(table.frame())
            .set(slot, PtEntry::make_4k(frame, PageEntryBits::user_rw()));

        debug!("Fault at {va}: mapped page {} to frame {frame}", va.page());
        Ok(FaultOutcome::Mapped(frame))
    }

    /// Make sure `va` is backed by a frame, running the fault handler if it is
    /// not, and return its physical address.
    ///
    /// # Errors
    /// Whatever [`handle_fault`](Self::handle_fault) reports.
    pub fn touch(
        &mut self,
        frames: &mut FramePools<'_>,
        va: VirtualAddress,
    ) -> Result<PhysicalAddress, PagingError> {
        if let Some(pa) = self.translate_address(va) {
            return Ok(pa);
        }
        self.handle_fault(frames, PageFault::not_present(va))?;
        self.translate_address(va)
            .ok_or(PagingError::SegmentationFault(va))
    }

    /// Unmap `page` and return its frame to the frame pool that owns it.
    ///
    /// Returns `Ok(None)` when the page was never faulted in.
    ///
    /// # Errors
    /// - [`PagingError::Config`] for pages of the shared region or the
    ///   self-map window; those frames are not owned by the page.
    /// - [`PagingError::FramePool`] when the frame pools reject the release.
    pub fn free_page(
        &mut self,
        frames: &mut FramePools<'_>,
        page: PageNumber,
    ) -> Result<Option<FrameNumber>, PagingError> {
        let va = page.base();
        if va.as_u32() < self.config.shared_size || va >= SELF_MAP_WINDOW {
            return Err(PagingError::Config(
                "shared and self-mapped pages cannot be freed",
            ));
        }

        let Some(table) = self.translate(page.directory_index()) else {
            return Ok(None);
        };
        let slot = page.table_index();
        let entry = self.table_ref(table.frame()).get(slot);
        let Some(frame) = entry.frame() else {
            return Ok(None);
        };

        frames.release_frames(frame)?;
        self.table_mut(table.frame())
            .set(slot, PtEntry::not_present(entry.flags()));
        trace!("Freed page {page} (frame {frame})");
        Ok(Some(frame))
    }
}

impl<M: PhysMapper> fmt::Debug for AddressSpace<'_, M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AddressSpace")
            .field("directory", &self.directory)
            .field("config", &self.config)
            .field("pools", &self.n_pools)
            .finish_non_exhaustive()
    }
}
