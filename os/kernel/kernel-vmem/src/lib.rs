//! # Virtual Memory Support
//!
//! Two-level 32-bit x86 paging for the teaching kernel: per-process address
//! spaces with a self-mapped page directory, demand paging through the fault
//! handler, and bump-allocated virtual memory pools.
//!
//! ## 32-bit Virtual Address → Physical Address Walk
//!
//! ```text
//! | 31‒22     | 21‒12 | 11‒0   |
//! | directory | table | offset |
//! ```
//!
//! Both levels hold 1024 four-byte entries and occupy exactly one 4 KiB frame.
//! A directory entry points at a second-level table; a table entry points at
//! the frame backing one page.
//!
//! | Level | Table | Entry | Covers |
//! |:------|:------|:------|:-------|
//! | 1 | Page directory (loaded into CR3) | PDE | 4 MiB |
//! | 2 | Page table | PTE | 4 KiB |
//!
//! ## Pieces
//!
//! - [`Paging`]: process-wide state (frame pools, shared region size, active
//!   space, translation switch) on top of a [`PagingHardware`].
//! - [`AddressSpace`]: one directory and its tables, the fault handler.
//! - [`VmPool`]: regions of virtual memory whose pages are faulted in lazily.
//! - [`self_map`]: where every table of the active space is visible.
//!
//! ## Example
//!
//! ```rust
//! use kernel_alloc::{BitmapPlacement, FramePool, FramePools, HostPhysMemory};
//! use kernel_memory_addresses::{FrameNumber, VirtualAddress};
//! use kernel_vmem::{AddressSpace, Paging, PagingConfig, PagingHardware, VmPool};
//! # use kernel_memory_addresses::PhysicalAddress;
//!
//! struct NoHardware;
//! impl PagingHardware for NoHardware {
//!     fn load_address_space(&mut self, _directory: PhysicalAddress) {}
//!     fn set_translation_enabled(&mut self, _enabled: bool) {}
//! }
//!
//! let mem = HostPhysMemory::with_frames(2048);
//! let mut frames = FramePools::new();
//! let kernel = unsafe {
//!     FramePool::new(&mem, FrameNumber::new(512), 512, BitmapPlacement::InPool)
//! }.unwrap();
//! let process = unsafe {
//!     FramePool::new(&mem, FrameNumber::new(1024), 1024, BitmapPlacement::InPool)
//! }.unwrap();
//! let kernel_pool = frames.register(kernel).unwrap();
//! let process_pool = frames.register(process).unwrap();
//!
//! let mut paging = Paging::new(NoHardware);
//! paging.init_paging(&frames, PagingConfig { kernel_pool, process_pool, shared_size: 4 << 20 }).unwrap();
//! let mut space = unsafe { AddressSpace::new(&mem, &paging, &mut frames) }.unwrap();
//! paging.load(&space);
//! paging.enable_paging().unwrap();
//!
//! let heap = VmPool::new(VirtualAddress::new(0x0040_0000), 4 << 20, process_pool, &mut space, &mut frames).unwrap();
//! let region = heap.allocate(&mut space, &mut frames, 4096).unwrap();
//! assert_eq!(region, VirtualAddress::new(0x0040_1000));
//! assert!(space.touch(&mut frames, region).is_ok());
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

mod address_space;
mod error;
mod fault;
mod page_entry_bits;
pub mod page_table;
mod paging;
pub mod self_map;
mod vm_pool;

#[cfg(all(feature = "asm", target_arch = "x86"))]
mod register_paging;

pub use crate::address_space::{AddressSpace, FaultOutcome, MAX_VM_POOLS};
pub use crate::error::PagingError;
pub use crate::fault::{PageFault, PageFaultError};
pub use crate::page_entry_bits::PageEntryBits;
pub use crate::paging::{Paging, PagingConfig, PagingHardware};
pub use crate::self_map::{DIRECTORY_WINDOW, SELF_MAP_INDEX, SELF_MAP_WINDOW, TableHandle};
pub use crate::vm_pool::{MAX_REGIONS, Region, VmPool};

#[cfg(all(feature = "asm", target_arch = "x86"))]
pub use crate::register_paging::RegisterPaging;
