use kernel_alloc::FramePoolError;
use kernel_memory_addresses::VirtualAddress;

/// Errors reported by the paging layer and the VM pools.
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum PagingError {
    /// A frame pool refused the request.
    #[error(transparent)]
    FramePool(#[from] FramePoolError),
    /// `Paging::init_paging` has not been called.
    #[error("paging has not been initialized")]
    NotInitialized,
    /// The address space cannot register another VM pool.
    #[error("VM pool registry of the address space is full")]
    RegistryFull,
    /// The region table of a VM pool is full.
    #[error("region table is full")]
    CapacityExceeded,
    /// No active region starts at the given address.
    #[error("no region starts at {0}")]
    RegionNotFound(VirtualAddress),
    /// No VM pool of the address space claims the faulting address.
    #[error("segmentation fault at {0}")]
    SegmentationFault(VirtualAddress),
    /// The page is present but the access violated its permissions.
    #[error("protection fault at {0}")]
    ProtectionFault(VirtualAddress),
    /// A region of zero bytes was requested.
    #[error("region size must be non-zero")]
    InvalidSize,
    /// The region does not fit in the remaining VM pool range.
    #[error("VM pool has no room for the region")]
    PoolExhausted,
    /// Faults are only handled once translation is enabled.
    #[error("address translation is not enabled")]
    TranslationDisabled,
    /// The address space is not the one loaded into the MMU.
    #[error("address space is not active")]
    NotActive,
    /// Malformed paging or VM pool parameters.
    #[error("invalid paging configuration: {0}")]
    Config(&'static str),
}
