// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # memory-manager
//!
//! Interchangeable byte-buffer allocators for tensor storage.
//!
//! # Key Components
//!
//! - [`fast_malloc`] / [`fast_free`]: zeroed allocation aligned to
//!   [`MALLOC_ALIGN`] bytes; the leaf every strategy ends in.
//! - [`Allocator`]: the `allocate(size)` / `free(ptr)` capability that
//!   tensors hold on to.
//! - [`RawAllocator`]: no caching.
//! - [`PoolAllocator`]: thread-safe cache with separate free and in-use
//!   locks and size-fuzzy reuse.
//! - [`UnlockedPoolAllocator`]: the same policy without locks, for
//!   single-threaded loops.
//! - [`AllocatorConfig`]: TOML-driven selection of one of the above.
//! - [`AllocationStats`]: reuse/fresh counters and peak usage.
//!
//! # Ownership Model
//!
//! ```text
//! Allocator::allocate(size)
//!       │
//!       ▼
//!   in-use list ──free(ptr)──► free list ──allocate(size')──► in-use list
//!                                  │            (if size' fits)
//!                                  │ clear() / drop
//!                                  ▼
//!                              fast_free
//! ```
//!
//! Freeing an address the pool did not hand out, or dropping a pool while
//! blocks are still checked out, is a caller bug: it is logged and then
//! passed to the pool's [`FatalHandler`], which panics unless replaced.
//!
//! # Example
//! ```
//! use memory_manager::{Allocator, PoolAllocator};
//!
//! let pool = PoolAllocator::new();
//! let a = pool.allocate(4096);
//! unsafe { pool.free(a) };
//!
//! let b = pool.allocate(4000);
//! assert_eq!(a, b);
//! assert_eq!(pool.stats().cache_hits, 1);
//! unsafe { pool.free(b) };
//! ```

mod allocator;
mod config;
mod error;
mod fatal;
pub mod pool;
mod raw;
mod stats;
mod unlocked;

pub use allocator::{Allocator, RawAllocator};
pub use config::{AllocatorConfig, AllocatorKind};
pub use error::MemoryError;
pub use fatal::{panic_handler, FatalHandler};
pub use pool::{PoolAllocator, DEFAULT_SIZE_COMPARE_RATIO};
pub use raw::{align_ptr, align_size, fast_free, fast_malloc, MALLOC_ALIGN};
pub use stats::AllocationStats;
pub use unlocked::UnlockedPoolAllocator;
