use crate::registry::PoolId;
use kernel_memory_addresses::FrameNumber;

/// Errors reported by [`FramePool`](crate::FramePool) and
/// [`FramePools`](crate::FramePools).
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum FramePoolError {
    /// Malformed construction parameters; the pool was not created.
    #[error("invalid frame pool configuration: {0}")]
    Config(&'static str),
    /// No run of `requested` contiguous free frames exists.
    #[error("no contiguous run of {requested} free frames")]
    NoContiguousRun { requested: u32 },
    /// The frame handed to release is not the head of an allocated run.
    #[error("frame {0} is not the head of an allocated run")]
    InvalidRelease(FrameNumber),
    /// No registered pool contains the frame handed to release.
    #[error("no registered pool owns frame {0}")]
    PoolNotFound(FrameNumber),
    /// A directed reservation is not fully contained in the pool.
    #[error("frames {first}..+{count} are outside the pool")]
    OutOfRange { first: FrameNumber, count: u32 },
    /// A directed reservation overlaps frames that are already in use.
    #[error("frame {0} is already allocated")]
    AlreadyAllocated(FrameNumber),
    /// The pool registry has no free slot left.
    #[error("frame pool registry is full")]
    RegistryFull,
    /// The pool id does not name a registered pool.
    #[error("unknown frame pool {0}")]
    UnknownPool(PoolId),
}
