use bitfield_struct::bitfield;
use kernel_memory_addresses::VirtualAddress;

#[cfg(all(feature = "asm", target_arch = "x86"))]
use crate::LoadRegisterUnsafe;

/// CR2 — Page-Fault Linear Address.
///
/// The processor stores the faulting linear address here before raising `#PF`.
#[bitfield(u32)]
pub struct Cr2 {
    /// Bits 0–31 — The linear address that caused the last page fault.
    pub fault_address: u32,
}

impl Cr2 {
    #[inline]
    #[must_use]
    pub const fn address(&self) -> VirtualAddress {
        VirtualAddress::new(self.fault_address())
    }
}

#[cfg(all(feature = "asm", target_arch = "x86"))]
impl LoadRegisterUnsafe for Cr2 {
    unsafe fn load_unsafe() -> Self {
        let mut cr2: u32;
        unsafe {
            core::arch::asm!("mov {}, cr2", out(reg) cr2, options(nomem, nostack, preserves_flags));
        }
        Self::from_bits(cr2)
    }
}
