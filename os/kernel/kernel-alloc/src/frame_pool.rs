//! # Contiguous physical frame pool
//!
//! A [`FramePool`] manages the frames `[base_frame_no, base_frame_no + n_frames)`
//! with a [`FrameBitmap`] of two bits per frame. Runs of frames are handed out
//! first-fit in ascending order; the first frame of every run is marked
//! [`FrameState::Head`] and the remaining ones [`FrameState::Allocated`], so a
//! run can later be released knowing only its first frame.
//!
//! The bitmap itself lives in physical memory, either in the pool's own first
//! frame ([`BitmapPlacement::InPool`], which is then reserved as a one-frame
//! run) or in caller-provided frames outside the pool
//! ([`BitmapPlacement::External`]).

use crate::frame_bitmap::{FrameBitmap, FrameState, bitmap_bytes};
use crate::{FramePoolError, PhysMapper};
use kernel_memory_addresses::{FRAME_COUNT_LIMIT, FRAME_SIZE, FrameNumber};
use log::{debug, trace, warn};

/// Where the frame pool keeps its bitmap.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum BitmapPlacement {
    /// In the pool's first frame; that frame is reserved for the pool's lifetime.
    InPool,
    /// In `count` frames starting at `first`, outside the managed range.
    External { first: FrameNumber, count: u32 },
}

/// Number of frames needed to hold the bitmap of a pool of `n_frames` frames.
///
/// ```rust
/// # use kernel_alloc::needed_info_frames;
/// assert_eq!(needed_info_frames(8), 1);
/// assert_eq!(needed_info_frames(16 * 1024), 1);
/// assert_eq!(needed_info_frames(16 * 1024 + 8), 2);
/// ```
#[inline]
#[must_use]
pub const fn needed_info_frames(n_frames: u32) -> u32 {
    (2 * n_frames).div_ceil(8 * FRAME_SIZE)
}

/// Bitmap-based allocator of contiguous physical frame runs.
pub struct FramePool<'m> {
    base_frame_no: FrameNumber,
    n_frames: u32,
    n_free_frames: u32,
    placement: BitmapPlacement,
    bitmap: FrameBitmap<'m>,
}

impl<'m> FramePool<'m> {
    /// Create a pool over `n_frames` frames starting at `base_frame_no`.
    ///
    /// # Errors
    /// [`FramePoolError::Config`] when `n_frames` is zero or not a multiple
    /// of 8, the range exceeds the 32-bit physical address space, the bitmap
    /// does not fit the info frames, or external info frames overlap the pool.
    ///
    /// # Safety
    /// The pool range and the info frames must be RAM reachable through
    /// `mapper` and not used by anything else while the pool is alive.
    pub unsafe fn new<M: PhysMapper>(
        mapper: &'m M,
        base_frame_no: FrameNumber,
        n_frames: u32,
        placement: BitmapPlacement,
    ) -> Result<Self, FramePoolError> {
        if n_frames == 0 || !n_frames.is_multiple_of(8) {
            return Err(FramePoolError::Config(
                "frame count must be a non-zero multiple of 8",
            ));
        }

        let end = base_frame_no.as_u32().checked_add(n_frames);
        if end.is_none_or(|end| end > FRAME_COUNT_LIMIT) {
            return Err(FramePoolError::Config(
                "pool exceeds the physical address space",
            ));
        }

        let needed = needed_info_frames(n_frames);
        let bitmap_frame = match placement {
            BitmapPlacement::InPool => {
                if needed > 1 {
                    return Err(FramePoolError::Config(
                        "bitmap does not fit in the pool's first frame",
                    ));
                }
                base_frame_no
            }
            BitmapPlacement::External { first, count } => {
                if needed > count {
                    return Err(FramePoolError::Config(
                        "bitmap does not fit in the info frames",
                    ));
                }
                let Some(info_end) = first.as_u32().checked_add(count) else {
                    return Err(FramePoolError::Config(
                        "info frames exceed the physical address space",
                    ));
                };
                let pool_end = base_frame_no.as_u32() + n_frames;
                if first.as_u32() < pool_end && base_frame_no.as_u32() < info_end {
                    return Err(FramePoolError::Config("info frames overlap the pool"));
                }
                first
            }
        };

        // SAFETY: The caller hands the info frames to this pool exclusively.
        let bytes = unsafe { mapper.phys_bytes_mut(bitmap_frame.base(), bitmap_bytes(n_frames)) };
        let mut bitmap = FrameBitmap::new(bytes);
        bitmap.clear();

        let mut n_free_frames = n_frames;
        if placement == BitmapPlacement::InPool {
            bitmap.set(0, FrameState::Head);
            n_free_frames -= 1;
        }

        debug!(
            "Frame pool {base_frame_no}..+{n_frames}: bitmap at frame {bitmap_frame}, {n_free_frames} frames free"
        );

        Ok(Self {
            base_frame_no,
            n_frames,
            n_free_frames,
            placement,
            bitmap,
        })
    }

    #[inline]
    #[must_use]
    pub const fn base_frame_no(&self) -> FrameNumber {
        self.base_frame_no
    }

    #[inline]
    #[must_use]
    pub const fn n_frames(&self) -> u32 {
        self.n_frames
    }

    #[inline]
    #[must_use]
    pub const fn n_free_frames(&self) -> u32 {
        self.n_free_frames
    }

    #[inline]
    #[must_use]
    pub const fn placement(&self) -> BitmapPlacement {
        self.placement
    }

    /// One past the last frame of the pool.
    #[inline]
    #[must_use]
    pub const fn end_frame(&self) -> FrameNumber {
        FrameNumber::new(self.base_frame_no.as_u32() + self.n_frames)
    }

    /// Whether `frame` lies in `[base_frame_no, base_frame_no + n_frames)`.
    #[inline]
    #[must_use]
    pub const fn contains(&self, frame: FrameNumber) -> bool {
        frame.as_u32() >= self.base_frame_no.as_u32() && frame.as_u32() < self.end_frame().as_u32()
    }

    /// Whether the two pools manage at least one common frame.
    #[must_use]
    pub const fn overlaps(&self, other: &Self) -> bool {
        self.base_frame_no.as_u32() < other.end_frame().as_u32()
            && other.base_frame_no.as_u32() < self.end_frame().as_u32()
    }

    /// Bitmap state of `frame`, or `None` if the pool does not own it.
    #[must_use]
    pub fn frame_state(&self, frame: FrameNumber) -> Option<FrameState> {
        self.contains(frame)
            .then(|| self.bitmap.get(self.index_of(frame)))
    }

    #[inline]
    const fn index_of(&self, frame: FrameNumber) -> usize {
        (frame.as_u32() - self.base_frame_no.as_u32()) as usize
    }

    #[inline]
    #[allow(clippy::cast_possible_truncation)]
    const fn frame_at(&self, index: usize) -> FrameNumber {
        FrameNumber::new(self.base_frame_no.as_u32() + index as u32)
    }

    fn mark_run(&mut self, start: usize, n: u32) {
        self.bitmap.set(start, FrameState::Head);
        for i in start + 1..start + n as usize {
            self.bitmap.set(i, FrameState::Allocated);
        }
        self.n_free_frames -= n;
    }

    /// Allocate `n` contiguous frames and return the first one.
    ///
    /// The scan is first-fit from the lowest frame and does not wrap.
    ///
    /// # Errors
    /// [`FramePoolError::NoContiguousRun`] when `n` is zero, exceeds the
    /// number of free frames, or no run of `n` free frames exists.
    pub fn get_frames(&mut self, n: u32) -> Result<FrameNumber, FramePoolError> {
        if n == 0 || n > self.n_free_frames {
            warn!(
                "Frame pool {}: cannot satisfy {n} frames ({} free)",
                self.base_frame_no, self.n_free_frames
            );
            return Err(FramePoolError::NoContiguousRun { requested: n });
        }

        let mut run_start = 0;
        let mut run_len = 0;
        for i in 0..self.n_frames as usize {
            if !self.bitmap.get(i).is_free() {
                run_len = 0;
                continue;
            }
            if run_len == 0 {
                run_start = i;
            }
            run_len += 1;
            if run_len == n {
                self.mark_run(run_start, n);
                let first = self.frame_at(run_start);
                debug!("Allocated frames {first}..+{n} ({} free)", self.n_free_frames);
                return Ok(first);
            }
        }

        warn!(
            "Frame pool {}: no run of {n} contiguous free frames",
            self.base_frame_no
        );
        Err(FramePoolError::NoContiguousRun { requested: n })
    }

    /// Reserve the caller-specified frames `[first, first + n)` without searching.
    ///
    /// Nothing is modified when the call fails.
    ///
    /// # Errors
    /// - [`FramePoolError::OutOfRange`] when `n` is zero or the range is not
    ///   fully inside the pool.
    /// - [`FramePoolError::AlreadyAllocated`] when a frame of the range is in use.
    pub fn mark_inaccessible(&mut self, first: FrameNumber, n: u32) -> Result<(), FramePoolError> {
        let in_range = n > 0
            && self.contains(first)
            && first
                .checked_add(n)
                .is_some_and(|end| end.as_u32() <= self.end_frame().as_u32());
        if !in_range {
            return Err(FramePoolError::OutOfRange { first, count: n });
        }

        let start = self.index_of(first);
        if let Some(used) = (start..start + n as usize).find(|&i| !self.bitmap.get(i).is_free()) {
            return Err(FramePoolError::AlreadyAllocated(self.frame_at(used)));
        }

        self.mark_run(start, n);
        debug!("Reserved frames {first}..+{n} ({} free)", self.n_free_frames);
        Ok(())
    }

    /// Release the run starting at `first` and return how many frames were freed.
    ///
    /// Frees the head and every following [`FrameState::Allocated`] frame up to
    /// the next free frame, the next head, or the end of the pool.
    ///
    /// # Errors
    /// [`FramePoolError::InvalidRelease`] when `first` is not the head of a run
    /// owned by this pool, or is the pool's own bitmap frame.
    pub fn release(&mut self, first: FrameNumber) -> Result<u32, FramePoolError> {
        let is_bitmap_frame =
            self.placement == BitmapPlacement::InPool && first == self.base_frame_no;
        if is_bitmap_frame || self.frame_state(first) != Some(FrameState::Head) {
            warn!("Rejected release of frame {first}: not the head of a run");
            return Err(FramePoolError::InvalidRelease(first));
        }

        let start = self.index_of(first);
        self.bitmap.set(start, FrameState::Free);
        let mut freed = 1;
        let mut i = start + 1;
        while i < self.n_frames as usize && self.bitmap.get(i) == FrameState::Allocated {
            self.bitmap.set(i, FrameState::Free);
            freed += 1;
            i += 1;
        }
        self.n_free_frames += freed;

        trace!("Released frames {first}..+{freed} ({} free)", self.n_free_frames);
        Ok(freed)
    }

    /// Iterate the bitmap states of all frames in ascending order.
    pub fn states(&self) -> impl Iterator<Item = FrameState> + '_ {
        (0..self.n_frames as usize).map(|i| self.bitmap.get(i))
    }
}

impl core::fmt::Debug for FramePool<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("FramePool")
            .field("base_frame_no", &self.base_frame_no)
            .field("n_frames", &self.n_frames)
            .field("n_free_frames", &self.n_free_frames)
            .field("placement", &self.placement)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::HostPhysMemory;

    /// Every `Allocated` frame continues a run; `n_free` matches the bitmap.
    fn assert_consistent(pool: &FramePool<'_>) {
        let mut in_run = false;
        let mut free = 0;
        for (i, state) in pool.states().enumerate() {
            match state {
                FrameState::Free => {
                    free += 1;
                    in_run = false;
                }
                FrameState::Head => in_run = true,
                FrameState::Allocated => assert!(in_run, "orphan allocated frame at index {i}"),
                FrameState::Invalid => panic!("invalid code at index {i}"),
            }
        }
        assert_eq!(free, pool.n_free_frames());
    }

    fn in_pool(ram: &HostPhysMemory, base: u32, n: u32) -> FramePool<'_> {
        unsafe { FramePool::new(ram, FrameNumber::new(base), n, BitmapPlacement::InPool) }
            .expect("valid pool")
    }

    #[test]
    fn reserves_first_frame_for_bitmap() {
        let ram = HostPhysMemory::with_frames(1026);
        let pool = in_pool(&ram, 2, 1024);
        assert_eq!(pool.n_free_frames(), 1023);
        assert_eq!(pool.frame_state(FrameNumber::new(2)), Some(FrameState::Head));
        assert_eq!(pool.frame_state(FrameNumber::new(3)), Some(FrameState::Free));

        let byte = unsafe { ram.phys_bytes_mut(FrameNumber::new(2).base(), 1) }[0];
        assert_eq!(byte, 0x80);
        assert_consistent(&pool);
    }

    #[test]
    fn get_and_release_restore_the_pool() {
        let ram = HostPhysMemory::with_frames(1026);
        let mut pool = in_pool(&ram, 2, 1024);

        let first = pool.get_frames(5).expect("five frames");
        assert_eq!(first, FrameNumber::new(3));
        assert_eq!(pool.n_free_frames(), 1018);
        assert_eq!(pool.frame_state(first), Some(FrameState::Head));
        for f in 4..8 {
            assert_eq!(pool.frame_state(FrameNumber::new(f)), Some(FrameState::Allocated));
        }
        assert_eq!(pool.frame_state(FrameNumber::new(8)), Some(FrameState::Free));
        assert_consistent(&pool);

        assert_eq!(pool.release(first), Ok(5));
        assert_eq!(pool.n_free_frames(), 1023);
        for f in 3..8 {
            assert_eq!(pool.frame_state(FrameNumber::new(f)), Some(FrameState::Free));
        }
        assert_consistent(&pool);
    }

    #[test]
    fn adjacent_runs_release_independently() {
        let ram = HostPhysMemory::with_frames(16);
        let mut pool = in_pool(&ram, 0, 16);

        let a = pool.get_frames(3).unwrap();
        let b = pool.get_frames(2).unwrap();
        assert_eq!(b, a + 3);

        assert_eq!(pool.release(a), Ok(3));
        assert_eq!(pool.frame_state(b), Some(FrameState::Head));
        assert_eq!(pool.frame_state(b + 1), Some(FrameState::Allocated));
        assert_consistent(&pool);
    }

    #[test]
    fn first_fit_reuses_lowest_hole() {
        let ram = HostPhysMemory::with_frames(16);
        let mut pool = in_pool(&ram, 0, 16);

        let a = pool.get_frames(2).unwrap();
        let _b = pool.get_frames(2).unwrap();
        pool.release(a).unwrap();

        assert_eq!(pool.get_frames(3).unwrap(), FrameNumber::new(5));
        assert_eq!(pool.get_frames(2).unwrap(), a);
        assert_consistent(&pool);
    }

    #[test]
    fn fragmented_pool_reports_no_run() {
        let ram = HostPhysMemory::with_frames(8);
        let mut pool = in_pool(&ram, 0, 8);
        let runs: Vec<_> = (0..7).map(|_| pool.get_frames(1).unwrap()).collect();
        pool.release(runs[1]).unwrap();
        pool.release(runs[3]).unwrap();

        assert_eq!(pool.n_free_frames(), 2);
        assert_eq!(
            pool.get_frames(2),
            Err(FramePoolError::NoContiguousRun { requested: 2 })
        );
        assert_eq!(pool.n_free_frames(), 2);
    }

    #[test]
    fn zero_and_oversized_requests_fail() {
        let ram = HostPhysMemory::with_frames(8);
        let mut pool = in_pool(&ram, 0, 8);
        assert_eq!(
            pool.get_frames(0),
            Err(FramePoolError::NoContiguousRun { requested: 0 })
        );
        assert_eq!(
            pool.get_frames(8),
            Err(FramePoolError::NoContiguousRun { requested: 8 })
        );
        assert_eq!(pool.get_frames(7).unwrap(), FrameNumber::new(1));
        assert_eq!(pool.n_free_frames(), 0);
    }

    #[test]
    fn release_requires_a_head() {
        let ram = HostPhysMemory::with_frames(16);
        let mut pool = in_pool(&ram, 0, 16);
        let first = pool.get_frames(4).unwrap();

        assert_eq!(pool.release(first + 1), Err(FramePoolError::InvalidRelease(first + 1)));
        assert_eq!(pool.release(first + 8), Err(FramePoolError::InvalidRelease(first + 8)));
        assert_eq!(
            pool.release(FrameNumber::new(0)),
            Err(FramePoolError::InvalidRelease(FrameNumber::new(0)))
        );
        assert_eq!(pool.n_free_frames(), 11);
    }

    #[test]
    fn mark_inaccessible_reserves_exact_range() {
        let ram = HostPhysMemory::with_frames(32);
        let mut pool = in_pool(&ram, 0, 32);

        pool.mark_inaccessible(FrameNumber::new(10), 4).unwrap();
        assert_eq!(pool.n_free_frames(), 27);
        assert_eq!(pool.frame_state(FrameNumber::new(10)), Some(FrameState::Head));
        assert_eq!(pool.frame_state(FrameNumber::new(13)), Some(FrameState::Allocated));

        // A search never hands out reserved frames.
        assert_eq!(pool.get_frames(9).unwrap(), FrameNumber::new(1));
        assert_eq!(pool.get_frames(1).unwrap(), FrameNumber::new(14));
        assert_consistent(&pool);
    }

    #[test]
    fn mark_inaccessible_rejects_without_mutation() {
        let ram = HostPhysMemory::with_frames(40);
        let mut pool = in_pool(&ram, 8, 32);
        let before: Vec<_> = pool.states().collect();

        assert_eq!(
            pool.mark_inaccessible(FrameNumber::new(36), 8),
            Err(FramePoolError::OutOfRange { first: FrameNumber::new(36), count: 8 })
        );
        assert_eq!(
            pool.mark_inaccessible(FrameNumber::new(4), 2),
            Err(FramePoolError::OutOfRange { first: FrameNumber::new(4), count: 2 })
        );
        assert_eq!(
            pool.mark_inaccessible(FrameNumber::new(12), 0),
            Err(FramePoolError::OutOfRange { first: FrameNumber::new(12), count: 0 })
        );
        // The bitmap frame is already in use.
        assert_eq!(
            pool.mark_inaccessible(FrameNumber::new(8), 2),
            Err(FramePoolError::AlreadyAllocated(FrameNumber::new(8)))
        );

        assert_eq!(pool.states().collect::<Vec<_>>(), before);
        assert_eq!(pool.n_free_frames(), 31);
    }

    #[test]
    fn construction_is_validated() {
        let ram = HostPhysMemory::with_frames(8);
        let bad = |n, placement| unsafe { FramePool::new(&ram, FrameNumber::new(0), n, placement) };

        assert!(matches!(bad(0, BitmapPlacement::InPool), Err(FramePoolError::Config(_))));
        assert!(matches!(bad(12, BitmapPlacement::InPool), Err(FramePoolError::Config(_))));
        assert!(matches!(
            bad(16 * 1024 + 8, BitmapPlacement::InPool),
            Err(FramePoolError::Config(_))
        ));
        assert!(matches!(
            bad(8, BitmapPlacement::External { first: FrameNumber::new(4), count: 1 }),
            Err(FramePoolError::Config(_))
        ));
        assert!(matches!(
            bad(8, BitmapPlacement::External { first: FrameNumber::new(8), count: 0 }),
            Err(FramePoolError::Config(_))
        ));
        assert!(matches!(
            unsafe {
                FramePool::new(&ram, FrameNumber::new(FRAME_COUNT_LIMIT - 8), 16, BitmapPlacement::InPool)
            },
            Err(FramePoolError::Config(_))
        ));
    }

    #[test]
    fn external_bitmap_leaves_every_frame_free() {
        let ram = HostPhysMemory::with_frames(64);
        let placement = BitmapPlacement::External { first: FrameNumber::new(0), count: 1 };
        let mut pool =
            unsafe { FramePool::new(&ram, FrameNumber::new(32), 32, placement) }.unwrap();

        assert_eq!(pool.n_free_frames(), 32);
        assert_eq!(pool.get_frames(1).unwrap(), FrameNumber::new(32));
        let byte = unsafe { ram.phys_bytes_mut(FrameNumber::new(0).base(), 1) }[0];
        assert_eq!(byte, 0x80);
    }

    #[test]
    fn info_frame_count() {
        assert_eq!(needed_info_frames(1024), 1);
        assert_eq!(needed_info_frames(16 * 1024), 1);
        assert_eq!(needed_info_frames(16 * 1024 + 8), 2);
        assert_eq!(needed_info_frames(1 << 20), 64);
    }
}
