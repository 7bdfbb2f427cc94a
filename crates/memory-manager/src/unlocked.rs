// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Pooling allocator for single-threaded producer/consumer loops.
//!
//! [`UnlockedPoolAllocator`] follows the same reuse rule and the same
//! wild-free and leak reporting as [`PoolAllocator`](crate::PoolAllocator),
//! but keeps both lists in one unsynchronised cell. The caller guarantees
//! that only one thread uses the allocator at a time. Overlapping entry is
//! caught by a single atomic flag and reported through the fatal handler; it
//! never blocks. When the handler returns instead of panicking, the
//! overlapping call leaves the state alone: queries report zero (the ratio
//! reports NaN), frees are dropped, and allocations come straight from
//! [`fast_malloc`] without being tracked.

use crate::fatal::{self, panic_handler, FatalHandler};
use crate::pool::{
    fixed_to_ratio, leak_report, ratio_to_fixed, release_all, take_fit, take_ptr, Block,
    DEFAULT_FIXED_RATIO,
};
use crate::raw::fast_malloc;
use crate::{AllocationStats, Allocator, MemoryError};
use std::cell::UnsafeCell;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicBool, Ordering};

struct PoolState {
    size_compare_ratio: u32,
    free: Vec<Block>,
    in_use: Vec<Block>,
    in_use_bytes: usize,
    stats: AllocationStats,
}

struct ExitGuard<'a>(&'a AtomicBool);

impl Drop for ExitGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Non-locking pooling allocator.
///
/// # Example
/// ```
/// use memory_manager::{Allocator, UnlockedPoolAllocator};
///
/// let pool = UnlockedPoolAllocator::new();
/// let a = pool.allocate(256);
/// unsafe { pool.free(a) };
/// assert_eq!(pool.allocate(200), a);
/// # unsafe { pool.free(a) };
/// ```
pub struct UnlockedPoolAllocator {
    state: UnsafeCell<PoolState>,
    entered: AtomicBool,
    on_fatal: FatalHandler,
}

// SAFETY: the state is only reached through `with_state`, which claims the
// `entered` flag first and refuses to run if another caller holds it.
unsafe impl Sync for UnlockedPoolAllocator {}

// SAFETY: every block in the state is owned by the allocator, and the fatal
// handler is Send + Sync.
unsafe impl Send for UnlockedPoolAllocator {}

impl UnlockedPoolAllocator {
    /// Creates an empty pool with the default ratio of 0.75.
    pub fn new() -> Self {
        Self {
            state: UnsafeCell::new(PoolState {
                size_compare_ratio: DEFAULT_FIXED_RATIO,
                free: Vec::new(),
                in_use: Vec::new(),
                in_use_bytes: 0,
                stats: AllocationStats::default(),
            }),
            entered: AtomicBool::new(false),
            on_fatal: panic_handler(),
        }
    }

    /// Creates an empty pool with the given ratio.
    pub fn with_size_compare_ratio(ratio: f32) -> Result<Self, MemoryError> {
        let pool = Self::new();
        pool.try_set_size_compare_ratio(ratio)?;
        Ok(pool)
    }

    /// Replaces the handler invoked on wild frees, early destruction,
    /// invalid ratios and concurrent entry.
    pub fn with_fatal_handler(mut self, handler: FatalHandler) -> Self {
        self.on_fatal = handler;
        self
    }

    /// Runs `f` on the state, or reports concurrent entry and returns
    /// `None` without running it.
    fn with_state<R>(&self, f: impl FnOnce(&mut PoolState) -> R) -> Option<R> {
        if self.entered.swap(true, Ordering::Acquire) {
            fatal::raise(&self.on_fatal, MemoryError::ConcurrentAccess);
            return None;
        }
        let _exit = ExitGuard(&self.entered);
        // SAFETY: the flag is ours until `_exit` drops, so no other reference
        // to the state exists.
        Some(f(unsafe { &mut *self.state.get() }))
    }

    /// Sets the size-compare ratio.
    ///
    /// A ratio outside `0 < ratio < 1` goes to the fatal handler, which
    /// panics by default, and the current ratio is kept.
    pub fn set_size_compare_ratio(&self, ratio: f32) {
        if let Err(err) = ratio_to_fixed(ratio) {
            fatal::raise(&self.on_fatal, err);
            return;
        }
        let _ = self.try_set_size_compare_ratio(ratio);
    }

    /// Sets the size-compare ratio. Fails unless `0 < ratio < 1`, or when
    /// the pool is entered concurrently.
    pub fn try_set_size_compare_ratio(&self, ratio: f32) -> Result<(), MemoryError> {
        let fixed = ratio_to_fixed(ratio)?;
        self.with_state(|s| s.size_compare_ratio = fixed)
            .ok_or(MemoryError::ConcurrentAccess)
    }

    /// Returns the effective ratio (after fixed-point truncation).
    pub fn size_compare_ratio(&self) -> f32 {
        self.with_state(|s| fixed_to_ratio(s.size_compare_ratio))
            .unwrap_or(f32::NAN)
    }

    /// Releases every cached free block to the system immediately.
    pub fn clear(&self) {
        self.with_state(|s| {
            let released = release_all(&mut s.free);
            s.stats.record_clear(released);
        });
    }

    /// Number of blocks currently checked out.
    pub fn in_use_blocks(&self) -> usize {
        self.with_state(|s| s.in_use.len()).unwrap_or(0)
    }

    /// Bytes currently checked out.
    pub fn in_use_bytes(&self) -> usize {
        self.with_state(|s| s.in_use_bytes).unwrap_or(0)
    }

    /// Number of cached blocks waiting for reuse.
    pub fn free_blocks(&self) -> usize {
        self.with_state(|s| s.free.len()).unwrap_or(0)
    }

    /// Returns a snapshot of allocation statistics.
    pub fn stats(&self) -> AllocationStats {
        self.with_state(|s| s.stats.clone()).unwrap_or_default()
    }
}

impl Default for UnlockedPoolAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl Allocator for UnlockedPoolAllocator {
    fn allocate(&self, size: usize) -> NonNull<u8> {
        self.with_state(|s| {
            let block = match take_fit(&mut s.free, size, s.size_compare_ratio) {
                Some(block) => {
                    s.stats.record_cache_hit(block.size);
                    block
                }
                None => {
                    s.stats.record_cache_miss(size);
                    Block {
                        size,
                        ptr: fast_malloc(size),
                    }
                }
            };
            s.in_use.push(block);
            s.in_use_bytes += block.size;
            s.stats.update_peak(s.in_use_bytes);
            block.ptr
        })
        .unwrap_or_else(|| {
            tracing::warn!("serving {size} bytes untracked after concurrent entry");
            fast_malloc(size)
        })
    }

    unsafe fn free(&self, ptr: NonNull<u8>) {
        let known = self.with_state(|s| match take_ptr(&mut s.in_use, ptr) {
            Some(block) => {
                s.in_use_bytes -= block.size;
                s.free.push(block);
                s.stats.record_deallocation();
                true
            }
            None => false,
        });

        if known == Some(false) {
            fatal::raise(
                &self.on_fatal,
                MemoryError::WildFree {
                    ptr: ptr.as_ptr() as usize,
                },
            );
        }
    }

    fn name(&self) -> &'static str {
        "unlocked-pool"
    }

    fn stats(&self) -> Option<AllocationStats> {
        Some(UnlockedPoolAllocator::stats(self))
    }
}

impl Drop for UnlockedPoolAllocator {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        let released = release_all(&mut state.free);
        state.stats.record_clear(released);

        if state.in_use.is_empty() {
            return;
        }
        let err = leak_report(&state.in_use);
        fatal::raise(&self.on_fatal, err);
    }
}

impl std::fmt::Debug for UnlockedPoolAllocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnlockedPoolAllocator")
            .field("size_compare_ratio", &self.size_compare_ratio())
            .field("in_use_blocks", &self.in_use_blocks())
            .field("free_blocks", &self.free_blocks())
            .finish()
    }
}
