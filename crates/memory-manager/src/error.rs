// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for memory management.

/// Errors raised by the allocators.
///
/// [`MemoryError::InvalidSizeCompareRatio`] and [`MemoryError::Config`] are
/// returned by the constructors and the `try_*` setters; the plain setters
/// route them through the allocator's fatal handler. The other variants
/// describe a programming error upstream and always go to the fatal handler.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MemoryError {
    /// The size-compare ratio must lie strictly between 0 and 1.
    #[error("invalid size compare ratio {0}: expected 0 < ratio < 1")]
    InvalidSizeCompareRatio(f32),

    /// `free` was called with a pointer the pool never handed out, or one
    /// that was already returned.
    #[error("pool allocator got wild pointer {ptr:#x}")]
    WildFree { ptr: usize },

    /// The pool was dropped while callers still held blocks from it.
    #[error("pool allocator destroyed too early: {blocks} blocks ({bytes} bytes) still in use")]
    DestroyedTooEarly { blocks: usize, bytes: usize },

    /// The non-locking pool was entered from two places at once.
    #[error("unlocked pool allocator entered concurrently")]
    ConcurrentAccess,

    /// Allocator configuration could not be read or parsed.
    #[error("allocator configuration error: {0}")]
    Config(String),
}
