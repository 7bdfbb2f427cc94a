// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Aligned raw allocation, the primitive every allocator bottoms out in.
//!
//! # Layout
//! ```text
//!   base (16-aligned)            returned pointer (16-aligned)
//!   │                            │
//!   ▼                            ▼
//!   ┌───────────────────────────┬──────────────────────────────┐
//!   │ header: requested size    │ payload (size bytes, zeroed) │
//!   └───────────────────────────┴──────────────────────────────┘
//!        MALLOC_ALIGN bytes
//! ```
//!
//! Keeping the size in front of the payload lets [`fast_free`] take only a
//! pointer, which is the contract the [`Allocator`](crate::Allocator) trait
//! exposes.

use std::alloc::{self, Layout};
use std::ptr::NonNull;

/// Alignment, in bytes, of every buffer handed out by [`fast_malloc`].
pub const MALLOC_ALIGN: usize = 16;

const HEADER: usize = MALLOC_ALIGN;

/// Rounds `size` up to the next multiple of `n`.
///
/// # Panics
/// Panics if `n` is not a power of two.
///
/// # Examples
/// ```
/// use memory_manager::align_size;
/// assert_eq!(align_size(13, 16), 16);
/// assert_eq!(align_size(32, 16), 32);
/// ```
pub fn align_size(size: usize, n: usize) -> usize {
    assert!(n.is_power_of_two(), "alignment {n} is not a power of two");
    (size + n - 1) & !(n - 1)
}

/// Advances `ptr` to the next address that is a multiple of `n`.
///
/// # Panics
/// Panics if `n` is not a power of two.
pub fn align_ptr(ptr: *mut u8, n: usize) -> *mut u8 {
    let addr = ptr as usize;
    ptr.wrapping_add(align_size(addr, n) - addr)
}

fn layout_for(size: usize) -> Layout {
    let total = size
        .checked_add(HEADER)
        .expect("allocation size overflows usize");
    Layout::from_size_align(total, MALLOC_ALIGN).expect("allocation size overflows isize")
}

/// Allocates `size` zeroed bytes aligned to [`MALLOC_ALIGN`].
///
/// A zero `size` is valid and yields a unique, non-dereferenceable pointer
/// that must still be released with [`fast_free`].
pub fn fast_malloc(size: usize) -> NonNull<u8> {
    let layout = layout_for(size);
    // SAFETY: the layout always includes the header, so it is never zero-sized.
    let base = unsafe { alloc::alloc_zeroed(layout) };
    let Some(base) = NonNull::new(base) else {
        alloc::handle_alloc_error(layout)
    };
    // SAFETY: the header is MALLOC_ALIGN bytes, enough for and aligned to a
    // usize, and the payload starts right after it inside the same block.
    unsafe {
        base.as_ptr().cast::<usize>().write(size);
        NonNull::new_unchecked(base.as_ptr().add(HEADER))
    }
}

/// Releases a buffer obtained from [`fast_malloc`].
///
/// # Safety
/// `ptr` must come from [`fast_malloc`] and must not have been freed yet.
pub unsafe fn fast_free(ptr: NonNull<u8>) {
    let base = ptr.as_ptr().sub(HEADER);
    let size = base.cast::<usize>().read();
    alloc::dealloc(base, layout_for(size));
}
