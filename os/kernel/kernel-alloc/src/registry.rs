//! # Frame pool registry
//!
//! Frames are released by frame number alone, so something has to know which
//! pool owns a given frame. [`FramePools`] keeps every pool in insertion order
//! and resolves a frame to its owner by half-open range containment. Pools are
//! addressed by [`PoolId`], an index into the registry.

use crate::frame_bitmap::FrameState;
use crate::{FramePool, FramePoolError};
use core::fmt;
use kernel_memory_addresses::FrameNumber;
use log::{debug, warn};

/// Maximum number of pools a [`FramePools`] registry holds.
pub const MAX_FRAME_POOLS: usize = 8;

/// Index of a pool inside a [`FramePools`] registry.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct PoolId(u8);

impl PoolId {
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for PoolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PoolId({})", self.0)
    }
}

impl fmt::Display for PoolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Registry of all frame pools, in insertion order.
pub struct FramePools<'m> {
    pools: [Option<FramePool<'m>>; MAX_FRAME_POOLS],
    len: usize,
}

impl Default for FramePools<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'m> FramePools<'m> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            pools: [const { None }; MAX_FRAME_POOLS],
            len: 0,
        }
    }

    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Append `pool` to the registry.
    ///
    /// # Errors
    /// - [`FramePoolError::RegistryFull`] when all slots are taken.
    /// - [`FramePoolError::Config`] when `pool` shares frames with a registered pool.
    #[allow(clippy::cast_possible_truncation)]
    pub fn register(&mut self, pool: FramePool<'m>) -> Result<PoolId, FramePoolError> {
        if self.len == MAX_FRAME_POOLS {
            return Err(FramePoolError::RegistryFull);
        }
        if self.iter().any(|(_, other)| other.overlaps(&pool)) {
            return Err(FramePoolError::Config("pool overlaps a registered pool"));
        }

        let id = PoolId(self.len as u8);
        debug!(
            "Registered frame pool {id}: frames {}..{}",
            pool.base_frame_no(),
            pool.end_frame()
        );
        self.pools[self.len] = Some(pool);
        self.len += 1;
        Ok(id)
    }

    /// Whether `id` names a registered pool.
    #[inline]
    #[must_use]
    pub const fn contains_id(&self, id: PoolId) -> bool {
        id.index() < self.len
    }

    /// # Errors
    /// [`FramePoolError::UnknownPool`] when `id` is not registered.
    pub fn get(&self, id: PoolId) -> Result<&FramePool<'m>, FramePoolError> {
        self.pools
            .get(id.index())
            .and_then(Option::as_ref)
            .ok_or(FramePoolError::UnknownPool(id))
    }

    /// # Errors
    /// [`FramePoolError::UnknownPool`] when `id` is not registered.
    pub fn get_mut(&mut self, id: PoolId) -> Result<&mut FramePool<'m>, FramePoolError> {
        self.pools
            .get_mut(id.index())
            .and_then(Option::as_mut)
            .ok_or(FramePoolError::UnknownPool(id))
    }

    /// Allocate `n` contiguous frames from pool `id`.
    ///
    /// # Errors
    /// [`FramePoolError::UnknownPool`], or whatever [`FramePool::get_frames`] reports.
    pub fn get_frames(&mut self, id: PoolId, n: u32) -> Result<FrameNumber, FramePoolError> {
        self.get_mut(id)?.get_frames(n)
    }

    /// Reserve `[first, first + n)` in pool `id`.
    ///
    /// # Errors
    /// [`FramePoolError::UnknownPool`], or whatever
    /// [`FramePool::mark_inaccessible`] reports.
    pub fn mark_inaccessible(
        &mut self,
        id: PoolId,
        first: FrameNumber,
        n: u32,
    ) -> Result<(), FramePoolError> {
        self.get_mut(id)?.mark_inaccessible(first, n)
    }

    /// Release the run starting at `first`, whichever pool owns it.
    ///
    /// Returns the number of frames freed.
    ///
    /// # Errors
    /// - [`FramePoolError::PoolNotFound`] when no registered pool contains `first`.
    /// - [`FramePoolError::InvalidRelease`] when `first` is not the head of a run.
    pub fn release_frames(&mut self, first: FrameNumber) -> Result<u32, FramePoolError> {
        let Some(pool) = self.pools[..self.len]
            .iter_mut()
            .flatten()
            .find(|pool| pool.contains(first))
        else {
            warn!("Release of frame {first}: no registered pool owns it");
            return Err(FramePoolError::PoolNotFound(first));
        };
        pool.release(first)
    }

    /// The pool owning `frame`, if any.
    #[must_use]
    pub fn owner_of(&self, frame: FrameNumber) -> Option<PoolId> {
        self.iter()
            .find(|(_, pool)| pool.contains(frame))
            .map(|(id, _)| id)
    }

    /// Bitmap state of `frame` in its owning pool.
    #[must_use]
    pub fn frame_state(&self, frame: FrameNumber) -> Option<FrameState> {
        self.iter().find_map(|(_, pool)| pool.frame_state(frame))
    }

    /// Iterate registered pools in insertion order.
    #[allow(clippy::cast_possible_truncation)]
    pub fn iter(&self) -> impl Iterator<Item = (PoolId, &FramePool<'m>)> {
        self.pools[..self.len]
            .iter()
            .enumerate()
            .filter_map(|(i, pool)| pool.as_ref().map(|p| (PoolId(i as u8), p)))
    }
}
