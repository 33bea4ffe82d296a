//! # Page faults
//!
//! The CPU reports a page fault with the faulting linear address (CR2) and a
//! 32-bit error code pushed onto the stack. [`PageFault`] bundles both for
//! the fault handler.

use bitfield_struct::bitfield;
use kernel_memory_addresses::VirtualAddress;

/// Page-fault error code layout.
///
/// Reference: Intel SDM Vol. 3A, §4.7 “Page-Fault Exceptions”.
#[bitfield(u32)]
#[derive(PartialEq, Eq)]
pub struct PageFaultError {
    /// 0 = non-present page.
    /// 1 = protection violation (page present but access disallowed).
    pub present: bool, // bit 0

    /// 0 = read or execute.
    /// 1 = write access.
    pub write: bool, // bit 1

    /// 0 = supervisor.
    /// 1 = user mode (CPL 3).
    pub user: bool, // bit 2

    /// 1 = caused by reserved bit set in a paging structure.
    pub reserved_bit: bool, // bit 3

    /// 1 = instruction fetch.
    pub instruction_fetch: bool, // bit 4

    /// 1 = protection-key violation.
    pub protection_key: bool, // bit 5

    /// 1 = shadow stack access.
    pub shadow_stack: bool, // bit 6

    #[bits(25)]
    __: u32, // reserved / ignored bits
}

impl PageFaultError {
    #[must_use]
    pub const fn explain(&self) -> &'static str {
        if !self.present() {
            "Non-present page (page not mapped yet)"
        } else if self.instruction_fetch() {
            if self.user() {
                "User-mode instruction fetch on protected page"
            } else {
                "Kernel instruction fetch on protected page"
            }
        } else if self.write() {
            "Write access to protected page"
        } else {
            "Read access to protected page"
        }
    }
}

/// A page fault as delivered by the fault entry.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct PageFault {
    pub address: VirtualAddress,
    pub error: PageFaultError,
}

impl PageFault {
    #[inline]
    #[must_use]
    pub const fn new(address: VirtualAddress, error: PageFaultError) -> Self {
        Self { address, error }
    }

    /// Build from the raw CR2 value and the pushed error code.
    #[inline]
    #[must_use]
    pub const fn from_raw(address: u32, error_code: u32) -> Self {
        Self::new(
            VirtualAddress::new(address),
            PageFaultError::from_bits(error_code),
        )
    }

    /// A not-present fault on `address`, as raised by a first access.
    #[inline]
    #[must_use]
    pub const fn not_present(address: VirtualAddress) -> Self {
        Self::new(address, PageFaultError::new())
    }

    /// Whether the page was present and the access violated its permissions.
    #[inline]
    #[must_use]
    pub const fn is_protection_violation(&self) -> bool {
        self.error.present()
    }
}
