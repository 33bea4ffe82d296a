mod common;

use common::{KERNEL_BASE, PROCESS_BASE, SHARED_SIZE};
use kernel_alloc::{FramePools, FrameState, HostPhysMemory, PhysMapper};
use kernel_memory_addresses::{DirectoryIndex, PAGE_SIZE, PageNumber, PhysicalAddress, VirtualAddress};
use kernel_vmem::{
    AddressSpace, DIRECTORY_WINDOW, FaultOutcome, PageFault, Paging, PagingConfig, PagingError,
    SELF_MAP_INDEX, SELF_MAP_WINDOW, VmPool,
};

fn free_frames(frames: &FramePools<'_>, config: PagingConfig) -> (u32, u32) {
    (
        frames.get(config.kernel_pool).unwrap().n_free_frames(),
        frames.get(config.process_pool).unwrap().n_free_frames(),
    )
}

fn space<'m>(
    mem: &'m HostPhysMemory,
    frames: &mut FramePools<'_>,
    config: PagingConfig,
) -> AddressSpace<'m, HostPhysMemory> {
    let paging = common::paging(frames, config);
    unsafe { AddressSpace::new(mem, &paging, frames) }.unwrap()
}

#[test]
fn new_requires_initialized_paging() {
    let mem = common::memory();
    let (mut frames, config) = common::frame_pools(&mem);
    let paging = Paging::new(common::RecordingHardware::default());

    let err = unsafe { AddressSpace::new(&mem, &paging, &mut frames) }.unwrap_err();
    assert_eq!(err, PagingError::NotInitialized);
    assert_eq!(free_frames(&frames, config), (511, 1023));
}

#[test]
fn new_builds_directory_shared_table_and_self_map() {
    let mem = common::memory();
    let (mut frames, config) = common::frame_pools(&mem);
    let space = space(&mem, &mut frames, config);

    // Frame 512 holds the kernel pool's bitmap.
    let directory = KERNEL_BASE + 1;
    let shared = KERNEL_BASE + 2;
    assert_eq!(space.directory(), directory);
    assert_eq!(space.directory_phys(), directory.base());
    assert_eq!(free_frames(&frames, config), (509, 1023));

    let pde0 = space.directory_entry(DirectoryIndex::new(0));
    assert_eq!(pde0.table(), Some(shared));
    assert!(pde0.flags().writable());
    assert!(!pde0.flags().user_access());

    let last = space.directory_entry(SELF_MAP_INDEX);
    assert_eq!(last.table(), Some(directory));
    assert!(last.flags().writable());
    assert!(!last.flags().user_access());

    for i in (1..1023).map(DirectoryIndex::new) {
        assert!(!space.directory_entry(i).is_present(), "{i:?}");
    }
}

#[test]
fn shared_region_is_identity_mapped_supervisor_only() {
    let mem = common::memory();
    let (mut frames, config) = common::frame_pools(&mem);
    let space = space(&mem, &mut frames, config);

    for addr in [0, 0x1234, 0x0020_0000, SHARED_SIZE - 1] {
        let va = VirtualAddress::new(addr);
        assert_eq!(space.translate_address(va), Some(PhysicalAddress::new(addr)));
        let entry = space.entry(va).unwrap();
        assert!(entry.flags().writable());
        assert!(!entry.flags().user_access());
    }
    assert_eq!(space.translate_address(VirtualAddress::new(SHARED_SIZE)), None);
}

#[test]
fn self_map_exposes_tables_through_the_window() {
    let mem = common::memory();
    let (mut frames, config) = common::frame_pools(&mem);
    let space = space(&mem, &mut frames, config);

    let table0 = space.translate(DirectoryIndex::new(0)).unwrap();
    assert_eq!(table0.frame(), KERNEL_BASE + 2);
    assert_eq!(table0.window(), SELF_MAP_WINDOW);

    let dir = space.translate(SELF_MAP_INDEX).unwrap();
    assert_eq!(dir.frame(), space.directory());
    assert_eq!(dir.window(), DIRECTORY_WINDOW);

    // Walking the window itself lands on the directory frame.
    assert_eq!(
        space.translate_address(DIRECTORY_WINDOW),
        Some(space.directory_phys())
    );
    assert_eq!(
        space.translate_address(SELF_MAP_WINDOW + 0x10),
        Some((KERNEL_BASE + 2).base() + 0x10)
    );

    assert!(space.translate(DirectoryIndex::new(1)).is_none());
    assert_eq!(space.tables().count(), 2);
}

#[test]
fn faults_outside_any_pool_are_segmentation_faults() {
    let mem = common::memory();
    let (mut frames, config) = common::frame_pools(&mem);
    let mut space = space(&mem, &mut frames, config);

    let va = VirtualAddress::new(0x0080_0000);
    let err = space
        .handle_fault(&mut frames, PageFault::not_present(va))
        .unwrap_err();
    assert_eq!(err, PagingError::SegmentationFault(va));
    assert!(space.translate(va.directory_index()).is_none());
    assert_eq!(free_frames(&frames, config), (509, 1023));
}

#[test]
fn protection_violations_are_fatal() {
    let mem = common::memory();
    let (mut frames, config) = common::frame_pools(&mem);
    let mut space = space(&mem, &mut frames, config);

    let err = space
        .handle_fault(&mut frames, PageFault::from_raw(0x1000, 0b011))
        .unwrap_err();
    assert_eq!(err, PagingError::ProtectionFault(VirtualAddress::new(0x1000)));
}

#[test]
fn fault_in_region_maps_a_zeroed_user_page() {
    let mem = common::memory();
    let (mut frames, config) = common::frame_pools(&mem);
    let mut space = space(&mem, &mut frames, config);

    let pool = VmPool::new(
        VirtualAddress::new(0x0040_0000),
        4 << 20,
        config.process_pool,
        &mut space,
        &mut frames,
    )
    .unwrap();
    // The region table page needed a second-level table and one process frame.
    assert_eq!(free_frames(&frames, config), (508, 1022));
    let table = space.translate(DirectoryIndex::new(1)).unwrap();
    assert_eq!(table.window(), VirtualAddress::new(0xFFC0_1000));

    assert_eq!(
        pool.allocate(&mut space, &mut frames, 4096),
        Ok(VirtualAddress::new(0x0040_1000))
    );
    let region = pool.allocate(&mut space, &mut frames, 8192).unwrap();
    assert_eq!(region, VirtualAddress::new(0x0040_2000));

    // Frame 1024 is the bitmap, 1025 the region table; 1026 comes next.
    let next = PROCESS_BASE + 2;
    unsafe { mem.phys_bytes_mut(next.base(), PAGE_SIZE as usize) }.fill(0xAA);

    let outcome = space
        .handle_fault(&mut frames, PageFault::from_raw(0x0040_2010, 0b110))
        .unwrap();
    let FaultOutcome::Mapped(frame) = outcome else {
        panic!("expected a fresh mapping, got {outcome:?}");
    };
    assert_eq!(frame, next);
    assert_eq!(frames.frame_state(frame), Some(FrameState::Head));

    let entry = space.entry(region).unwrap();
    assert!(entry.is_present());
    assert!(entry.flags().writable());
    assert!(entry.flags().user_access());
    assert_eq!(entry.frame(), Some(frame));

    let bytes = unsafe { mem.phys_bytes_mut(frame.base(), PAGE_SIZE as usize) };
    assert!(bytes.iter().all(|&b| b == 0));
    assert_eq!(free_frames(&frames, config), (508, 1021));
}

#[test]
fn second_fault_on_same_page_is_a_no_op() {
    let mem = common::memory();
    let (mut frames, config) = common::frame_pools(&mem);
    let mut space = space(&mem, &mut frames, config);
    let pool = VmPool::new(
        VirtualAddress::new(0x0040_0000),
        4 << 20,
        config.process_pool,
        &mut space,
        &mut frames,
    )
    .unwrap();
    let region = pool.allocate(&mut space, &mut frames, 4096).unwrap();

    let first = space
        .handle_fault(&mut frames, PageFault::not_present(region))
        .unwrap();
    let before = free_frames(&frames, config);
    let second = space
        .handle_fault(&mut frames, PageFault::not_present(region + 0x800))
        .unwrap();

    let FaultOutcome::Mapped(frame) = first else {
        panic!("expected a fresh mapping, got {first:?}");
    };
    assert_eq!(second, FaultOutcome::AlreadyPresent(frame));
    assert_eq!(free_frames(&frames, config), before);
}

#[test]
fn fault_outside_active_regions_of_a_pool_is_rejected() {
    let mem = common::memory();
    let (mut frames, config) = common::frame_pools(&mem);
    let mut space = space(&mem, &mut frames, config);
    let pool = VmPool::new(
        VirtualAddress::new(0x0040_0000),
        4 << 20,
        config.process_pool,
        &mut space,
        &mut frames,
    )
    .unwrap();
    pool.allocate(&mut space, &mut frames, 4096).unwrap();

    let past = VirtualAddress::new(0x0040_2000);
    assert!(!space.claims(past));
    assert_eq!(
        space.handle_fault(&mut frames, PageFault::not_present(past)),
        Err(PagingError::SegmentationFault(past))
    );

    // The region table page is always claimed by its pool.
    assert!(space.claims(pool.base()));
    assert!(matches!(
        space.handle_fault(&mut frames, PageFault::not_present(pool.base())),
        Ok(FaultOutcome::AlreadyPresent(_))
    ));
}

#[test]
fn touch_faults_in_once() {
    let mem = common::memory();
    let (mut frames, config) = common::frame_pools(&mem);
    let mut space = space(&mem, &mut frames, config);
    let pool = VmPool::new(
        VirtualAddress::new(0x0040_0000),
        4 << 20,
        config.process_pool,
        &mut space,
        &mut frames,
    )
    .unwrap();
    let region = pool.allocate(&mut space, &mut frames, 4096).unwrap();

    let pa = space.touch(&mut frames, region + 0x20).unwrap();
    assert_eq!(pa.offset(), 0x20);
    assert_eq!(space.touch(&mut frames, region + 0x20), Ok(pa));

    let unclaimed = VirtualAddress::new(0x0080_0000);
    assert_eq!(
        space.touch(&mut frames, unclaimed),
        Err(PagingError::SegmentationFault(unclaimed))
    );
}

#[test]
fn free_page_returns_frame_and_clears_present() {
    let mem = common::memory();
    let (mut frames, config) = common::frame_pools(&mem);
    let mut space = space(&mem, &mut frames, config);
    let pool = VmPool::new(
        VirtualAddress::new(0x0040_0000),
        4 << 20,
        config.process_pool,
        &mut space,
        &mut frames,
    )
    .unwrap();
    let region = pool.allocate(&mut space, &mut frames, 4096).unwrap();
    let pa = space.touch(&mut frames, region).unwrap();

    assert_eq!(space.free_page(&mut frames, region.page()), Ok(Some(pa.frame())));
    assert_eq!(frames.frame_state(pa.frame()), Some(FrameState::Free));
    let entry = space.entry(region).unwrap();
    assert!(!entry.is_present());
    assert!(entry.flags().user_access());

    assert_eq!(space.free_page(&mut frames, region.page()), Ok(None));
    assert_eq!(
        space.free_page(&mut frames, PageNumber::new(0x0800)),
        Ok(None)
    );
    assert!(matches!(
        space.free_page(&mut frames, PageNumber::new(1)),
        Err(PagingError::Config(_))
    ));
    assert!(matches!(
        space.free_page(&mut frames, DIRECTORY_WINDOW.page()),
        Err(PagingError::Config(_))
    ));
}

#[test]
fn spaces_do_not_share_pool_registrations() {
    let mem = common::memory();
    let (mut frames, config) = common::frame_pools(&mem);
    let mut a = space(&mem, &mut frames, config);
    let mut b = space(&mem, &mut frames, config);
    assert_ne!(a.directory(), b.directory());

    let pool = VmPool::new(
        VirtualAddress::new(0x0040_0000),
        4 << 20,
        config.process_pool,
        &mut a,
        &mut frames,
    )
    .unwrap();
    let region = pool.allocate(&mut a, &mut frames, 4096).unwrap();

    assert!(a.claims(region));
    assert!(!b.claims(region));
    assert_eq!(
        b.handle_fault(&mut frames, PageFault::not_present(region)),
        Err(PagingError::SegmentationFault(region))
    );
    assert_eq!(b.pool_count(), 0);
}
