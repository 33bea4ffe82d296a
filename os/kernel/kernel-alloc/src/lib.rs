//! # Physical Frame Allocation
//!
//! This crate owns physical memory on behalf of the kernel. Physical memory is
//! split into one or more [`FramePool`]s, each managing a contiguous range of
//! 4 KiB frames, and a [`FramePools`] registry that resolves a bare frame
//! number back to the pool that owns it.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                 FramePools registry                 │
//! │    • PoolId → FramePool                             │
//! │    • release by frame number alone                  │
//! └─────────────────┬───────────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────────┐
//! │                    FramePool                        │
//! │    • first-fit runs of contiguous frames            │
//! │    • directed reservations (kernel image, holes)    │
//! └─────────────────┬───────────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────────┐
//! │          FrameBitmap (2 bits per frame)             │
//! │    • lives in physical frames                       │
//! │    • reached through a PhysMapper                   │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! # #[cfg(feature = "host-memory")] {
//! use kernel_alloc::{BitmapPlacement, FramePool, FramePools, HostPhysMemory};
//! use kernel_memory_addresses::FrameNumber;
//!
//! let ram = HostPhysMemory::with_frames(1026);
//! let pool = unsafe { FramePool::new(&ram, FrameNumber::new(2), 1024, BitmapPlacement::InPool) }?;
//! assert_eq!(pool.n_free_frames(), 1023);
//!
//! let mut pools = FramePools::new();
//! let id = pools.register(pool)?;
//! let first = pools.get_frames(id, 5)?;
//! assert_eq!(first, FrameNumber::new(3));
//! assert_eq!(pools.release_frames(first)?, 5);
//! # }
//! # Ok::<(), kernel_alloc::FramePoolError>(())
//! ```
//!
//! ## Concurrency
//!
//! Nothing in here locks. Every mutating operation takes `&mut self`; callers
//! serialise access, e.g. by running with interrupts disabled.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

#[cfg(any(test, feature = "host-memory"))]
extern crate alloc;

mod error;
pub mod frame_bitmap;
mod frame_pool;
pub mod phys_mapper;
mod registry;

pub use crate::error::FramePoolError;
pub use crate::frame_bitmap::FrameState;
pub use crate::frame_pool::{BitmapPlacement, FramePool, needed_info_frames};
pub use crate::phys_mapper::{IdentityPhysMapper, PhysMapper};
pub use crate::registry::{FramePools, MAX_FRAME_POOLS, PoolId};

#[cfg(any(test, feature = "host-memory"))]
pub use crate::phys_mapper::HostPhysMemory;
