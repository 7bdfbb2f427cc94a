// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The allocator capability shared by every buffer source.

use crate::raw::{fast_free, fast_malloc};
use crate::AllocationStats;
use std::ptr::NonNull;

/// A source of untyped byte buffers.
///
/// Tensors hold an `Arc<dyn Allocator>` and route both allocation and the
/// final free through it, so a buffer always returns to the allocator that
/// produced it.
pub trait Allocator: Send + Sync {
    /// Returns a buffer of at least `size` bytes aligned to
    /// [`MALLOC_ALIGN`](crate::MALLOC_ALIGN).
    fn allocate(&self, size: usize) -> NonNull<u8>;

    /// Gives a buffer back.
    ///
    /// # Safety
    /// `ptr` must have been returned by `allocate` on this same allocator and
    /// must not have been freed since.
    unsafe fn free(&self, ptr: NonNull<u8>);

    /// Short label used in logs and CLI output.
    fn name(&self) -> &'static str {
        "custom"
    }

    /// Reuse statistics, for allocators that keep them.
    fn stats(&self) -> Option<AllocationStats> {
        None
    }
}

/// Forwards straight to [`fast_malloc`]/[`fast_free`] with no caching.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawAllocator;

impl Allocator for RawAllocator {
    fn allocate(&self, size: usize) -> NonNull<u8> {
        fast_malloc(size)
    }

    unsafe fn free(&self, ptr: NonNull<u8>) {
        fast_free(ptr)
    }

    fn name(&self) -> &'static str {
        "raw"
    }
}
