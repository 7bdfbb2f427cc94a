// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Size-fuzzy pooling allocator with separate free and in-use locks.
//!
//! The [`PoolAllocator`] caches returned blocks and hands them out again
//! when a later request is "close enough" in size:
//!
//! ```text
//! reuse block of size bs for a request of size s  ⇔  bs ≥ s  and  bs·r ≤ s
//! ```
//!
//! where `r` is the size-compare ratio (default 0.75, kept as a fixed-point
//! fraction of 256). A block is never reused for a request that would leave
//! more than `1 - r` of it idle.
//!
//! # Locking
//! The free list and the in-use list each have their own `Mutex` and no code
//! path holds both. A block moving between the lists is briefly in neither;
//! at that point it is owned exclusively by the thread doing the move, so no
//! other operation can observe the gap.
//!
//! # Misuse
//! Freeing an unknown pointer, or dropping the pool while blocks are still
//! checked out, is reported through the pool's [`FatalHandler`].

use crate::fatal::{self, panic_handler, FatalHandler};
use crate::raw::{fast_free, fast_malloc};
use crate::{AllocationStats, Allocator, MemoryError};
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Default size-compare ratio for both pool flavours.
pub const DEFAULT_SIZE_COMPARE_RATIO: f32 = 0.75;

const RATIO_SHIFT: u32 = 8;

// 0.75 * 256
pub(crate) const DEFAULT_FIXED_RATIO: u32 = 192;

/// A block tracked by a pool: its usable size and address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Block {
    pub(crate) size: usize,
    pub(crate) ptr: NonNull<u8>,
}

// SAFETY: a Block is bookkeeping for memory the pool owns; whoever holds the
// Block in one of the pool's lists is the only party that touches it.
unsafe impl Send for Block {}

/// Converts a ratio in `(0, 1)` to its fixed-point form.
pub(crate) fn ratio_to_fixed(ratio: f32) -> Result<u32, MemoryError> {
    if !(ratio > 0.0 && ratio < 1.0) {
        return Err(MemoryError::InvalidSizeCompareRatio(ratio));
    }
    Ok((ratio * (1u32 << RATIO_SHIFT) as f32) as u32)
}

pub(crate) fn fixed_to_ratio(fixed: u32) -> f32 {
    fixed as f32 / (1u32 << RATIO_SHIFT) as f32
}

/// Whether a cached block of `block_size` may serve a request of `request`.
pub(crate) fn fits(block_size: usize, request: usize, ratio: u32) -> bool {
    block_size >= request && ((block_size as u128 * ratio as u128) >> RATIO_SHIFT) <= request as u128
}

/// Removes and returns the first block that fits `request`.
pub(crate) fn take_fit(list: &mut Vec<Block>, request: usize, ratio: u32) -> Option<Block> {
    let idx = list.iter().position(|b| fits(b.size, request, ratio))?;
    Some(list.remove(idx))
}

/// Removes and returns the block starting at `ptr`.
pub(crate) fn take_ptr(list: &mut Vec<Block>, ptr: NonNull<u8>) -> Option<Block> {
    let idx = list.iter().position(|b| b.ptr == ptr)?;
    Some(list.swap_remove(idx))
}

/// Raw-frees every block in `list`, returning how many were released.
pub(crate) fn release_all(list: &mut Vec<Block>) -> usize {
    let n = list.len();
    for block in list.drain(..) {
        // SAFETY: blocks on a free list came from fast_malloc and are owned
        // by the pool alone.
        unsafe { fast_free(block.ptr) };
    }
    n
}

/// Logs every leaked block and builds the matching error.
pub(crate) fn leak_report(in_use: &[Block]) -> MemoryError {
    for block in in_use {
        tracing::error!("{:p} still in use ({} bytes)", block.ptr, block.size);
    }
    MemoryError::DestroyedTooEarly {
        blocks: in_use.len(),
        bytes: in_use.iter().map(|b| b.size).sum(),
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Thread-safe pooling allocator.
///
/// # Example
/// ```
/// use memory_manager::{Allocator, PoolAllocator};
///
/// let pool = PoolAllocator::new();
/// let a = pool.allocate(1000);
/// unsafe { pool.free(a) };
///
/// // 900 bytes is within 75% of the cached 1000-byte block: reused.
/// let b = pool.allocate(900);
/// assert_eq!(a, b);
/// unsafe { pool.free(b) };
/// ```
pub struct PoolAllocator {
    size_compare_ratio: AtomicU32,
    free: Mutex<Vec<Block>>,
    in_use: Mutex<Vec<Block>>,
    in_use_bytes: AtomicUsize,
    stats: Mutex<AllocationStats>,
    on_fatal: FatalHandler,
}

impl PoolAllocator {
    /// Creates an empty pool with the default ratio of 0.75.
    pub fn new() -> Self {
        Self {
            size_compare_ratio: AtomicU32::new(DEFAULT_FIXED_RATIO),
            free: Mutex::new(Vec::new()),
            in_use: Mutex::new(Vec::new()),
            in_use_bytes: AtomicUsize::new(0),
            stats: Mutex::new(AllocationStats::default()),
            on_fatal: panic_handler(),
        }
    }

    /// Creates an empty pool with the given ratio.
    pub fn with_size_compare_ratio(ratio: f32) -> Result<Self, MemoryError> {
        let pool = Self::new();
        pool.try_set_size_compare_ratio(ratio)?;
        Ok(pool)
    }

    /// Replaces the handler invoked on wild frees, early destruction and
    /// invalid ratios.
    pub fn with_fatal_handler(mut self, handler: FatalHandler) -> Self {
        self.on_fatal = handler;
        self
    }

    /// Sets the size-compare ratio.
    ///
    /// A ratio outside `0 < ratio < 1` goes to the fatal handler, which
    /// panics by default, and the current ratio is kept.
    pub fn set_size_compare_ratio(&self, ratio: f32) {
        if let Err(err) = self.try_set_size_compare_ratio(ratio) {
            fatal::raise(&self.on_fatal, err);
        }
    }

    /// Sets the size-compare ratio. Fails unless `0 < ratio < 1`.
    pub fn try_set_size_compare_ratio(&self, ratio: f32) -> Result<(), MemoryError> {
        let fixed = ratio_to_fixed(ratio)?;
        self.size_compare_ratio.store(fixed, Ordering::Relaxed);
        Ok(())
    }

    /// Returns the effective ratio (after fixed-point truncation).
    pub fn size_compare_ratio(&self) -> f32 {
        fixed_to_ratio(self.size_compare_ratio.load(Ordering::Relaxed))
    }

    /// Releases every cached free block to the system immediately.
    ///
    /// Blocks currently checked out are not affected.
    pub fn clear(&self) {
        let released = {
            let mut free = lock(&self.free);
            release_all(&mut free)
        };
        if released > 0 {
            tracing::debug!("pool cleared {released} free blocks");
        }
        lock(&self.stats).record_clear(released);
    }

    /// Number of blocks currently checked out.
    pub fn in_use_blocks(&self) -> usize {
        lock(&self.in_use).len()
    }

    /// Bytes currently checked out, counting reused blocks at full size.
    pub fn in_use_bytes(&self) -> usize {
        self.in_use_bytes.load(Ordering::Acquire)
    }

    /// Number of cached blocks waiting for reuse.
    pub fn free_blocks(&self) -> usize {
        lock(&self.free).len()
    }

    /// Bytes held by cached blocks.
    pub fn free_bytes(&self) -> usize {
        lock(&self.free).iter().map(|b| b.size).sum()
    }

    /// Returns a snapshot of allocation statistics.
    pub fn stats(&self) -> AllocationStats {
        lock(&self.stats).clone()
    }
}

impl Default for PoolAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl Allocator for PoolAllocator {
    fn allocate(&self, size: usize) -> NonNull<u8> {
        let ratio = self.size_compare_ratio.load(Ordering::Relaxed);
        let reused = {
            let mut free = lock(&self.free);
            take_fit(&mut free, size, ratio)
        };

        let block = match reused {
            Some(block) => {
                tracing::trace!("pool reused {} byte block for {size} bytes", block.size);
                block
            }
            None => {
                tracing::trace!("pool allocating fresh {size} byte block");
                Block {
                    size,
                    ptr: fast_malloc(size),
                }
            }
        };

        lock(&self.in_use).push(block);
        let now = self.in_use_bytes.fetch_add(block.size, Ordering::AcqRel) + block.size;

        let mut stats = lock(&self.stats);
        if reused.is_some() {
            stats.record_cache_hit(block.size);
        } else {
            stats.record_cache_miss(block.size);
        }
        stats.update_peak(now);

        block.ptr
    }

    unsafe fn free(&self, ptr: NonNull<u8>) {
        let returned = {
            let mut in_use = lock(&self.in_use);
            take_ptr(&mut in_use, ptr)
        };

        match returned {
            Some(block) => {
                self.in_use_bytes.fetch_sub(block.size, Ordering::AcqRel);
                lock(&self.free).push(block);
                lock(&self.stats).record_deallocation();
            }
            None => fatal::raise(
                &self.on_fatal,
                MemoryError::WildFree {
                    ptr: ptr.as_ptr() as usize,
                },
            ),
        }
    }

    fn name(&self) -> &'static str {
        "pool"
    }

    fn stats(&self) -> Option<AllocationStats> {
        Some(PoolAllocator::stats(self))
    }
}

impl Drop for PoolAllocator {
    fn drop(&mut self) {
        self.clear();

        let in_use = self.in_use.get_mut().unwrap_or_else(PoisonError::into_inner);
        if in_use.is_empty() {
            return;
        }
        let err = leak_report(in_use);
        fatal::raise(&self.on_fatal, err);
    }
}

impl std::fmt::Debug for PoolAllocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolAllocator")
            .field("size_compare_ratio", &self.size_compare_ratio())
            .field("in_use_blocks", &self.in_use_blocks())
            .field("free_blocks", &self.free_blocks())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn recording_handler() -> (FatalHandler, Arc<Mutex<Vec<MemoryError>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let handler: FatalHandler = Arc::new(move |e: &MemoryError| {
            sink.lock().unwrap().push(e.clone());
        });
        (handler, seen)
    }

    #[test]
    fn test_fits() {
        let r = ratio_to_fixed(0.75).unwrap();
        assert_eq!(r, 192);
        assert!(fits(1000, 1000, r));
        assert!(fits(1000, 750, r));
        assert!(!fits(1000, 749, r));
        assert!(!fits(1000, 1001, r));
    }

    #[test]
    fn test_ratio_validation() {
        assert!(ratio_to_fixed(0.5).is_ok());
        assert!(matches!(
            ratio_to_fixed(0.0),
            Err(MemoryError::InvalidSizeCompareRatio(_))
        ));
        assert!(ratio_to_fixed(1.0).is_err());
        assert!(ratio_to_fixed(-0.2).is_err());
        assert!(ratio_to_fixed(f32::NAN).is_err());

        let pool = PoolAllocator::new();
        assert!(pool.try_set_size_compare_ratio(1.5).is_err());
        assert_eq!(pool.size_compare_ratio(), 0.75);
        pool.try_set_size_compare_ratio(0.5).unwrap();
        assert_eq!(pool.size_compare_ratio(), 0.5);
        pool.set_size_compare_ratio(0.625);
        assert_eq!(pool.size_compare_ratio(), 0.625);
    }

    #[test]
    #[should_panic(expected = "invalid size compare ratio")]
    fn test_set_invalid_ratio_panics() {
        PoolAllocator::new().set_size_compare_ratio(1.5);
    }

    #[test]
    fn test_set_invalid_ratio_reported() {
        let (handler, seen) = recording_handler();
        let pool = PoolAllocator::new().with_fatal_handler(handler);
        pool.set_size_compare_ratio(0.0);
        assert_eq!(pool.size_compare_ratio(), 0.75);
        assert_eq!(
            seen.lock().unwrap().as_slice(),
            &[MemoryError::InvalidSizeCompareRatio(0.0)]
        );
    }

    #[test]
    fn test_reuse_within_ratio() {
        let pool = PoolAllocator::new();
        let a = pool.allocate(1024);
        unsafe { pool.free(a) };
        assert_eq!(pool.free_blocks(), 1);

        let b = pool.allocate(800);
        assert_eq!(a, b);
        assert_eq!(pool.free_blocks(), 0);
        assert_eq!(pool.in_use_bytes(), 1024);

        let stats = pool.stats();
        assert_eq!(stats.cache_hits, 1);
        assert_eq!(stats.cache_misses, 1);
        unsafe { pool.free(b) };
    }

    #[test]
    fn test_no_reuse_for_oversized_block() {
        let pool = PoolAllocator::new();
        let a = pool.allocate(1000);
        unsafe { pool.free(a) };

        let b = pool.allocate(700);
        assert_ne!(a, b);
        assert_eq!(pool.free_blocks(), 1);
        assert_eq!(pool.stats().cache_misses, 2);
        unsafe { pool.free(b) };
    }

    #[test]
    fn test_no_reuse_for_larger_request() {
        let pool = PoolAllocator::new();
        let a = pool.allocate(512);
        unsafe { pool.free(a) };

        let b = pool.allocate(513);
        assert_ne!(a, b);
        unsafe { pool.free(b) };
        assert_eq!(pool.free_blocks(), 2);
    }

    #[test]
    fn test_first_fit_order() {
        let pool = PoolAllocator::new();
        let a = pool.allocate(100);
        let b = pool.allocate(110);
        unsafe {
            pool.free(a);
            pool.free(b);
        }
        // Both fit 95 bytes; the earlier-returned block wins.
        let c = pool.allocate(95);
        assert_eq!(c, a);
        unsafe { pool.free(c) };
    }

    #[test]
    fn test_clear_releases_free_blocks_only() {
        let pool = PoolAllocator::new();
        let held = pool.allocate(64);
        let returned = pool.allocate(128);
        unsafe { pool.free(returned) };

        assert_eq!(pool.free_bytes(), 128);
        pool.clear();
        assert_eq!(pool.free_blocks(), 0);
        assert_eq!(pool.in_use_blocks(), 1);
        assert_eq!(pool.stats().cleared_blocks, 1);

        unsafe { pool.free(held) };
    }

    #[test]
    fn test_wild_free_reported() {
        let (handler, seen) = recording_handler();
        let pool = PoolAllocator::new().with_fatal_handler(handler);

        let a = pool.allocate(32);
        unsafe {
            pool.free(a);
            pool.free(a);
        }

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert!(matches!(seen[0], MemoryError::WildFree { .. }));
    }

    #[test]
    #[should_panic(expected = "wild pointer")]
    fn test_wild_free_panics_by_default() {
        let pool = PoolAllocator::new();
        let foreign = fast_malloc(16);
        unsafe { pool.free(foreign) };
    }

    #[test]
    fn test_leak_detected_on_drop() {
        let (handler, seen) = recording_handler();
        let pool = PoolAllocator::new().with_fatal_handler(handler);
        let _leaked = pool.allocate(256);
        drop(pool);

        let seen = seen.lock().unwrap();
        assert_eq!(
            seen.as_slice(),
            &[MemoryError::DestroyedTooEarly {
                blocks: 1,
                bytes: 256
            }]
        );
    }

    #[test]
    #[should_panic(expected = "destroyed too early")]
    fn test_leak_panics_by_default() {
        let pool = PoolAllocator::new();
        let _leaked = pool.allocate(8);
        drop(pool);
    }

    #[test]
    fn test_concurrent_allocate_free() {
        let pool = Arc::new(PoolAllocator::new());
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let pool = Arc::clone(&pool);
                std::thread::spawn(move || {
                    for i in 0..200 {
                        let size = 64 + (t * 16) + (i % 8);
                        let p = pool.allocate(size);
                        unsafe {
                            p.as_ptr().write(t as u8);
                            pool.free(p);
                        }
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(pool.in_use_blocks(), 0);
        assert_eq!(pool.in_use_bytes(), 0);
        let stats = pool.stats();
        assert_eq!(stats.total_allocations, 800);
        assert_eq!(stats.total_deallocations, 800);
        assert!(stats.cache_hits > 0);
    }

    #[test]
    fn test_debug_format() {
        let pool = PoolAllocator::new();
        let debug = format!("{pool:?}");
        assert!(debug.contains("PoolAllocator"));
        assert!(debug.contains("size_compare_ratio"));
    }
}
