// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Allocation statistics for profiling and diagnostics.
//!
//! [`AllocationStats`] counts how often a pool recycled a block versus
//! falling back to raw allocation. Tests use it to observe reuse without
//! poking at pool internals.

/// Cumulative statistics about pool usage.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct AllocationStats {
    /// Total number of `allocate` calls.
    pub total_allocations: u64,
    /// Allocations served from the free list.
    pub cache_hits: u64,
    /// Allocations that went to raw allocation.
    pub cache_misses: u64,
    /// Blocks handed back through `free`.
    pub total_deallocations: u64,
    /// Blocks released to the system by `clear`.
    pub cleared_blocks: u64,
    /// High-water mark of bytes checked out at once.
    pub peak_in_use_bytes: usize,
    /// Total bytes ever handed out, counting reused blocks at their full size.
    pub cumulative_allocated_bytes: u64,
}

impl AllocationStats {
    /// Returns the fraction of allocations served from the free list.
    ///
    /// Returns `0.0` if no allocations have been made.
    pub fn cache_hit_ratio(&self) -> f64 {
        let total = self.cache_hits + self.cache_misses;
        if total == 0 {
            return 0.0;
        }
        self.cache_hits as f64 / total as f64
    }

    pub(crate) fn record_cache_hit(&mut self, block_size: usize) {
        self.total_allocations += 1;
        self.cache_hits += 1;
        self.cumulative_allocated_bytes += block_size as u64;
    }

    pub(crate) fn record_cache_miss(&mut self, block_size: usize) {
        self.total_allocations += 1;
        self.cache_misses += 1;
        self.cumulative_allocated_bytes += block_size as u64;
    }

    pub(crate) fn record_deallocation(&mut self) {
        self.total_deallocations += 1;
    }

    pub(crate) fn record_clear(&mut self, blocks: usize) {
        self.cleared_blocks += blocks as u64;
    }

    pub(crate) fn update_peak(&mut self, in_use_bytes: usize) {
        if in_use_bytes > self.peak_in_use_bytes {
            self.peak_in_use_bytes = in_use_bytes;
        }
    }

    /// Returns a human-readable summary.
    pub fn summary(&self) -> String {
        let peak_kb = self.peak_in_use_bytes as f64 / 1024.0;
        format!(
            "Allocations: {} total ({} reused, {} fresh, {:.0}% hit rate), \
             {} frees, {} cleared, peak {:.2} KB in use",
            self.total_allocations,
            self.cache_hits,
            self.cache_misses,
            self.cache_hit_ratio() * 100.0,
            self.total_deallocations,
            self.cleared_blocks,
            peak_kb,
        )
    }
}
