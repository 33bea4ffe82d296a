//! [`PagingHardware`] backed by the real control registers.

use crate::{PageFault, PagingHardware};
use kernel_memory_addresses::PhysicalAddress;
use kernel_registers::cr0::Cr0;
use kernel_registers::cr2::Cr2;
use kernel_registers::cr3::Cr3;
use kernel_registers::{LoadRegisterUnsafe, StoreRegisterUnsafe};

/// Drives CR3 and CR0.PG directly.
pub struct RegisterPaging {
    _private: (),
}

impl RegisterPaging {
    /// # Safety
    /// Must run in ring 0, and only one instance may exist.
    #[must_use]
    pub const unsafe fn new() -> Self {
        Self { _private: () }
    }

    /// Build the fault description for the `#PF` being handled.
    ///
    /// # Safety
    /// Must be called from the page fault handler before anything else can
    /// fault and overwrite CR2.
    #[must_use]
    pub unsafe fn current_fault(error_code: u32) -> PageFault {
        let cr2 = unsafe { Cr2::load_unsafe() };
        PageFault::from_raw(cr2.fault_address(), error_code)
    }
}

impl PagingHardware for RegisterPaging {
    fn load_address_space(&mut self, directory: PhysicalAddress) {
        let cr3 = Cr3::from_directory_phys(directory, false, false);
        // SAFETY: The directory belongs to a fully built address space.
        unsafe { cr3.store_unsafe() };
    }

    fn set_translation_enabled(&mut self, enabled: bool) {
        // SAFETY: Constructing `RegisterPaging` asserted ring 0.
        unsafe {
            let cr0 = Cr0::load_unsafe().with_pg_paging(enabled);
            cr0.store_unsafe();
        }
    }
}
