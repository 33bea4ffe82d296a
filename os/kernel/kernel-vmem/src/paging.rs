//! # Process-wide paging state
//!
//! [`Paging`] holds what is shared by every address space: the frame pools
//! page tables and process pages come from, the size of the identity-mapped
//! shared region, which directory is loaded into the MMU, and whether
//! translation has been switched on. The hardware itself sits behind
//! [`PagingHardware`] so the same logic runs against the real control
//! registers or a recording fake.

use crate::{AddressSpace, FaultOutcome, PageFault, PagingError};
use kernel_alloc::{FramePoolError, FramePools, PhysMapper, PoolId};
use kernel_memory_addresses::{FrameNumber, PAGE_SIZE, PhysicalAddress, TABLE_SPAN};
use log::{debug, info};

/// The two operations the paging layer needs from the MMU.
pub trait PagingHardware {
    /// Make the directory at `directory` the translation root (CR3 on x86).
    ///
    /// Reloading the current root also flushes cached translations.
    fn load_address_space(&mut self, directory: PhysicalAddress);

    /// Switch address translation on or off (CR0.PG on x86).
    fn set_translation_enabled(&mut self, enabled: bool);
}

/// Configuration fixed once at startup.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct PagingConfig {
    /// Pool for page directories and second-level tables.
    pub kernel_pool: PoolId,
    /// Pool for pages handed to processes.
    pub process_pool: PoolId,
    /// Bytes identity mapped at the bottom of every address space.
    pub shared_size: u32,
}

/// Process-wide paging state.
pub struct Paging<H> {
    hardware: H,
    config: Option<PagingConfig>,
    active: Option<FrameNumber>,
    enabled: bool,
}

impl<H: PagingHardware> Paging<H> {
    pub const fn new(hardware: H) -> Self {
        Self {
            hardware,
            config: None,
            active: None,
            enabled: false,
        }
    }

    /// Fix the pools and the shared region size.
    ///
    /// # Errors
    /// - [`PagingError::Config`] when called twice, or `shared_size` is not
    ///   page aligned or does not fit one second-level table (4 MiB).
    /// - [`FramePoolError::UnknownPool`] when a pool id is not registered in `frames`.
    pub fn init_paging(
        &mut self,
        frames: &FramePools<'_>,
        config: PagingConfig,
    ) -> Result<(), PagingError> {
        if self.config.is_some() {
            return Err(PagingError::Config("paging is already initialized"));
        }
        if !config.shared_size.is_multiple_of(PAGE_SIZE) {
            return Err(PagingError::Config("shared size must be page aligned"));
        }
        if config.shared_size > TABLE_SPAN {
            return Err(PagingError::Config(
                "shared region must fit in one second-level table",
            ));
        }
        for id in [config.kernel_pool, config.process_pool] {
            if !frames.contains_id(id) {
                return Err(FramePoolError::UnknownPool(id).into());
            }
        }

        info!(
            "Initialized paging: kernel pool {}, process pool {}, shared size {:#x}",
            config.kernel_pool, config.process_pool, config.shared_size
        );
        self.config = Some(config);
        Ok(())
    }

    #[inline]
    #[must_use]
    pub const fn config(&self) -> Option<PagingConfig> {
        self.config
    }

    #[inline]
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Directory frame of the loaded address space.
    #[inline]
    #[must_use]
    pub const fn active(&self) -> Option<FrameNumber> {
        self.active
    }

    #[must_use]
    pub fn is_active<M: PhysMapper>(&self, space: &AddressSpace<'_, M>) -> bool {
        self.active == Some(space.directory())
    }

    /// Make `space` the active address space.
    pub fn load<M: PhysMapper>(&mut self, space: &AddressSpace<'_, M>) {
        debug!("Loading address space with directory {}", space.directory_phys());
        self.active = Some(space.directory());
        self.hardware.load_address_space(space.directory_phys());
    }

    /// Turn on address translation. From now on every address is translated.
    ///
    /// Calling it again is a no-op.
    ///
    /// # Errors
    /// [`PagingError::NotActive`] when no address space has been loaded yet.
    pub fn enable_paging(&mut self) -> Result<(), PagingError> {
        if self.enabled {
            return Ok(());
        }
        if self.active.is_none() {
            return Err(PagingError::NotActive);
        }
        self.hardware.set_translation_enabled(true);
        self.enabled = true;
        info!("Enabled paging");
        Ok(())
    }

    /// Reload the translation root if `space` is active, discarding cached
    /// translations. Inactive spaces have nothing cached.
    pub fn flush<M: PhysMapper>(&mut self, space: &AddressSpace<'_, M>) {
        if self.is_active(space) {
            self.hardware.load_address_space(space.directory_phys());
        }
    }

    /// Fault entry: resolve `fault` in the active address space `space`.
    ///
    /// # Errors
    /// - [`PagingError::TranslationDisabled`] before [`enable_paging`](Self::enable_paging).
    /// - [`PagingError::NotActive`] when `space` is not loaded.
    /// - Anything [`AddressSpace::handle_fault`] reports.
    pub fn handle_fault<M: PhysMapper>(
        &mut self,
        space: &mut AddressSpace<'_, M>,
        frames: &mut FramePools<'_>,
        fault: PageFault,
    ) -> Result<FaultOutcome, PagingError> {
        if !self.enabled {
            return Err(PagingError::TranslationDisabled);
        }
        if !self.is_active(space) {
            return Err(PagingError::NotActive);
        }
        space.handle_fault(frames, fault)
    }

    #[inline]
    #[must_use]
    pub const fn hardware(&self) -> &H {
        &self.hardware
    }
}
