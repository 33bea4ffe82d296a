#![allow(dead_code)]

use kernel_alloc::{BitmapPlacement, FramePool, FramePools, HostPhysMemory};
use kernel_memory_addresses::{FrameNumber, PhysicalAddress};
use kernel_vmem::{Paging, PagingConfig, PagingHardware};

/// Simulated RAM: 8 MiB.
pub const FRAMES: usize = 2048;
pub const SHARED_SIZE: u32 = 4 << 20;

pub const KERNEL_BASE: FrameNumber = FrameNumber::new(512);
pub const PROCESS_BASE: FrameNumber = FrameNumber::new(1024);

/// Records what the paging layer asked of the MMU.
#[derive(Debug, Default)]
pub struct RecordingHardware {
    pub loads: Vec<PhysicalAddress>,
    pub enabled: bool,
}

impl PagingHardware for RecordingHardware {
    fn load_address_space(&mut self, directory: PhysicalAddress) {
        self.loads.push(directory);
    }

    fn set_translation_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }
}

pub fn memory() -> HostPhysMemory {
    HostPhysMemory::with_frames(FRAMES)
}

/// Kernel pool over frames 512..1024, process pool over 1024..2048.
pub fn frame_pools(mem: &HostPhysMemory) -> (FramePools<'_>, PagingConfig) {
    let kernel = unsafe { FramePool::new(mem, KERNEL_BASE, 512, BitmapPlacement::InPool) }
        .expect("kernel pool");
    let process = unsafe { FramePool::new(mem, PROCESS_BASE, 1024, BitmapPlacement::InPool) }
        .expect("process pool");

    let mut frames = FramePools::new();
    let kernel_pool = frames.register(kernel).expect("register kernel pool");
    let process_pool = frames.register(process).expect("register process pool");
    let config = PagingConfig {
        kernel_pool,
        process_pool,
        shared_size: SHARED_SIZE,
    };
    (frames, config)
}

pub fn paging(frames: &FramePools<'_>, config: PagingConfig) -> Paging<RecordingHardware> {
    let mut paging = Paging::new(RecordingHardware::default());
    paging.init_paging(frames, config).expect("init paging");
    paging
}
