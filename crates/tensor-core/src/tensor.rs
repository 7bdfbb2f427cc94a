// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Core tensor type: buffer ownership, reference counting and raw access.
//!
//! # Buffer Layout
//!
//! ```text
//! data ──► ┌──────── slab 0 ────────┬─pad─┬──────── slab 1 ────────┬─pad─┬ ... ┬──────┬───────┐
//!          │ shape[-2] * shape[-1]  │     │                        │     │     │ tail │ count │
//!          └────────────────────────┴─────┴────────────────────────┴─────┴ ... ┴──────┴───────┘
//!          |◄──────── cstep ─────────────►|
//!          |◄───────────── align_size(total * elem_size, 4) ──────────────────────────►|◄ 4 B ►|
//! ```
//!
//! Every tensor aliasing a buffer points at the same trailing [`AtomicU32`].
//! The release that takes it from 1 to 0 hands the buffer back to the
//! allocator captured at creation, or to [`fast_free`] when there was none.

use crate::error::fatal;
use crate::{Depth, Element, Shape, TensorError};
use memory_manager::{align_size, fast_free, fast_malloc, Allocator, MALLOC_ALIGN};
use std::fmt;
use std::ptr::{self, NonNull};
use std::sync::atomic::{fence, AtomicU32, Ordering};
use std::sync::Arc;

/// A reference-counted, shape-aware view of a byte buffer.
///
/// A tensor is either empty, owns a share of a counted buffer, or borrows
/// caller memory (see [`Tensor::from_raw_parts`]). Cloning shares the buffer;
/// the bytes are never copied except by [`flatten`](Tensor::flatten),
/// [`reshape`](Tensor::reshape) and the image conversions.
///
/// # Examples
/// ```
/// use tensor_core::{Depth, Tensor};
///
/// let t = Tensor::new([2, 3, 4, 4], Depth::F32, false, None);
/// assert_eq!(t.cstep(), 16);
/// assert_eq!(t.total(), 96);
///
/// let alias = t.clone();
/// assert_eq!(t.ref_count(), Some(2));
/// drop(alias);
/// assert_eq!(t.ref_count(), Some(1));
/// ```
pub struct Tensor {
    pub(crate) data: *mut u8,
    count: Option<NonNull<AtomicU32>>,
    allocator: Option<Arc<dyn Allocator>>,
    pub(crate) shape: Shape,
    pub(crate) dims: usize,
    pub(crate) depth: Option<Depth>,
    pub(crate) aligned: bool,
    pub(crate) cstep: usize,
}

// SAFETY: the count is atomic and the allocator is Send + Sync. Safe
// mutable access to the bytes needs `&mut self` plus a count of 1; borrowed
// tensors only mutate through `as_bytes_mut_unchecked`, which hands the
// aliasing obligations to the caller.
unsafe impl Send for Tensor {}
unsafe impl Sync for Tensor {}

/// Element and byte extents of a buffer laid out for one shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct BufferLayout {
    pub cstep: usize,
    pub total: usize,
    /// Element bytes rounded up to 4, where the count word starts.
    pub payload: usize,
}

/// Computes the layout of `shape`, refusing any shape whose slab, element
/// span or byte size does not fit in `isize`.
///
/// The channel step is the innermost two extents, padded to [`MALLOC_ALIGN`]
/// bytes when `aligned` and there are at least three dimensions.
pub(crate) fn buffer_layout(
    shape: &Shape,
    depth: Depth,
    aligned: bool,
) -> Result<BufferLayout, TensorError> {
    let overflow = || TensorError::ShapeOverflow {
        shape: shape.clone(),
        depth,
    };
    let elem = depth.size_bytes();
    // Leaves room for the count word and the raw allocation header.
    let limit = isize::MAX as usize - 4 * MALLOC_ALIGN;
    let dims = shape.len();

    let natural = match dims {
        0 => 0,
        1 => shape[0],
        _ => shape[dims - 2]
            .checked_mul(shape[dims - 1])
            .ok_or_else(overflow)?,
    };
    let cstep = if aligned && dims >= 3 {
        let slab_bytes = natural
            .checked_mul(elem)
            .filter(|&b| b <= limit)
            .ok_or_else(overflow)?;
        align_size(slab_bytes, MALLOC_ALIGN) / elem
    } else {
        natural
    };
    let total = match dims {
        0 => 0,
        1 | 2 => cstep,
        n => shape.dims()[..n - 2]
            .iter()
            .try_fold(cstep, |acc, &d| acc.checked_mul(d))
            .ok_or_else(overflow)?,
    };
    let payload = total
        .checked_mul(elem)
        .filter(|&b| b <= limit)
        .map(|b| align_size(b, 4))
        .ok_or_else(overflow)?;
    Ok(BufferLayout {
        cstep,
        total,
        payload,
    })
}

fn same_allocator(a: &Option<Arc<dyn Allocator>>, b: &Option<Arc<dyn Allocator>>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b)),
        _ => false,
    }
}

impl Tensor {
    /// Creates an empty tensor: no data, no shape, no depth.
    pub fn empty() -> Self {
        Self {
            data: ptr::null_mut(),
            count: None,
            allocator: None,
            shape: Shape::default(),
            dims: 0,
            depth: None,
            aligned: false,
            cstep: 0,
        }
    }

    /// Creates a tensor owning a fresh buffer.
    ///
    /// `allocator = None` sources bytes from [`fast_malloc`], which zeroes
    /// them. Pool allocators may hand back a previously used block, so the
    /// contents are unspecified in that case.
    ///
    /// # Panics
    /// Panics when the buffer for `shape` would not fit in the address space.
    pub fn new(
        shape: impl Into<Shape>,
        depth: Depth,
        aligned: bool,
        allocator: Option<Arc<dyn Allocator>>,
    ) -> Self {
        let mut tensor = Self::empty();
        tensor.create(shape, depth, aligned, allocator);
        tensor
    }

    /// Fallible form of [`new`](Tensor::new).
    pub fn try_new(
        shape: impl Into<Shape>,
        depth: Depth,
        aligned: bool,
        allocator: Option<Arc<dyn Allocator>>,
    ) -> Result<Self, TensorError> {
        let mut tensor = Self::empty();
        tensor.try_create(shape, depth, aligned, allocator)?;
        Ok(tensor)
    }

    /// (Re)initialises this tensor with a freshly allocated buffer.
    ///
    /// Does nothing when `shape`, `depth` and the allocator instance already
    /// match; the alignment flag is not part of that comparison. Otherwise the
    /// current buffer share is released first.
    ///
    /// # Panics
    /// Panics when the buffer for `shape` would not fit in the address space.
    pub fn create(
        &mut self,
        shape: impl Into<Shape>,
        depth: Depth,
        aligned: bool,
        allocator: Option<Arc<dyn Allocator>>,
    ) {
        if let Err(e) = self.try_create(shape, depth, aligned, allocator) {
            fatal(e);
        }
    }

    /// Fallible form of [`create`](Tensor::create). On error the tensor is
    /// left untouched.
    pub fn try_create(
        &mut self,
        shape: impl Into<Shape>,
        depth: Depth,
        aligned: bool,
        allocator: Option<Arc<dyn Allocator>>,
    ) -> Result<(), TensorError> {
        let shape = shape.into();
        if self.shape == shape
            && self.depth == Some(depth)
            && same_allocator(&self.allocator, &allocator)
        {
            return Ok(());
        }
        let layout = buffer_layout(&shape, depth, aligned)?;

        self.release();

        self.cstep = layout.cstep;
        self.dims = shape.len();
        self.shape = shape;
        self.depth = Some(depth);
        self.aligned = aligned;
        self.allocator = allocator;

        if layout.total == 0 {
            return Ok(());
        }

        let bytes = layout.payload + std::mem::size_of::<AtomicU32>();
        let base = match &self.allocator {
            Some(allocator) => allocator.allocate(bytes),
            None => fast_malloc(bytes),
        };

        // SAFETY: the buffer holds `payload + 4` bytes and `payload` is a
        // multiple of 4 from a 16-byte aligned base, so the trailing word is
        // in bounds and aligned for AtomicU32.
        unsafe {
            let count = base.as_ptr().add(layout.payload).cast::<AtomicU32>();
            count.write(AtomicU32::new(1));
            self.count = Some(NonNull::new_unchecked(count));
        }
        self.data = base.as_ptr();

        tracing::trace!(
            "created {} tensor {} (cstep {}, {} bytes)",
            depth,
            self.shape,
            self.cstep,
            bytes
        );
        Ok(())
    }

    /// Wraps caller-owned memory without taking ownership.
    ///
    /// The result never frees `data`; clones alias it without a count.
    /// `allocator` is only recorded so that [`create`](Tensor::create) on the
    /// result can compare against it.
    ///
    /// # Safety
    /// `data` must be valid for reads and writes of `total()` elements of
    /// `depth` (padding included when `aligned`) for as long as this tensor
    /// or any clone of it is alive, and nothing else may write to that
    /// memory while a tensor reads it.
    ///
    /// Borrowed tensors never hand out safe mutable access, since clones
    /// share the memory without a count. Writes go through
    /// [`as_bytes_mut_unchecked`](Tensor::as_bytes_mut_unchecked).
    ///
    /// # Panics
    /// Panics when `data` is null, not aligned to the element width, or the
    /// layout of `shape` would not fit in the address space.
    pub unsafe fn from_raw_parts(
        shape: impl Into<Shape>,
        depth: Depth,
        data: *mut u8,
        aligned: bool,
        allocator: Option<Arc<dyn Allocator>>,
    ) -> Self {
        assert!(!data.is_null(), "borrowed tensor data must not be null");
        assert_eq!(
            data as usize % depth.size_bytes(),
            0,
            "borrowed tensor data is not aligned to {depth}"
        );
        let shape = shape.into();
        let layout = buffer_layout(&shape, depth, aligned).unwrap_or_else(|e| fatal(e));
        Self {
            data,
            count: None,
            allocator,
            dims: shape.len(),
            cstep: layout.cstep,
            shape,
            depth: Some(depth),
            aligned,
        }
    }

    /// Gives up this tensor's share of its buffer and resets it to empty.
    ///
    /// The buffer is freed when this was the last owning share. Borrowed
    /// memory is never freed.
    pub fn release(&mut self) {
        if let Some(count) = self.count.take() {
            // SAFETY: the count lives inside the buffer, which stays allocated
            // until the share that observes 1 here frees it.
            if unsafe { count.as_ref() }.fetch_sub(1, Ordering::Release) == 1 {
                fence(Ordering::Acquire);
                if let Some(data) = NonNull::new(self.data) {
                    // SAFETY: this was the last share, and the buffer came from
                    // exactly this allocator (or fast_malloc) in `create`.
                    unsafe {
                        match &self.allocator {
                            Some(allocator) => allocator.free(data),
                            None => fast_free(data),
                        }
                    }
                }
            }
        }

        self.data = ptr::null_mut();
        self.allocator = None;
        self.shape.clear();
        self.dims = 0;
        self.depth = None;
        self.aligned = false;
        self.cstep = 0;
    }

    /// Returns the tensor's shape.
    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    /// Returns the number of dimensions.
    pub fn dims(&self) -> usize {
        self.dims
    }

    /// Returns the element type, or `None` for an empty tensor.
    pub fn depth(&self) -> Option<Depth> {
        self.depth
    }

    /// Returns the element width in bytes (0 for an empty tensor).
    pub fn elem_size(&self) -> usize {
        self.depth.map_or(0, Depth::size_bytes)
    }

    /// Whether slabs were padded at creation.
    pub fn aligned(&self) -> bool {
        self.aligned
    }

    /// Elements between the starts of consecutive slabs.
    pub fn cstep(&self) -> usize {
        self.cstep
    }

    /// Returns the allocator this tensor's buffer came from, if any.
    pub fn allocator(&self) -> Option<&Arc<dyn Allocator>> {
        self.allocator.as_ref()
    }

    /// Returns `true` when the tensor holds no data.
    pub fn is_empty(&self) -> bool {
        self.data.is_null()
    }

    /// Returns `true` for a tensor wrapping caller-owned memory.
    pub fn is_borrowed(&self) -> bool {
        !self.data.is_null() && self.count.is_none()
    }

    /// Number of tensors sharing this buffer, `None` when nothing is owned.
    pub fn ref_count(&self) -> Option<usize> {
        // SAFETY: the buffer outlives every share, including this one.
        self.count
            .map(|c| unsafe { c.as_ref() }.load(Ordering::Acquire) as usize)
    }

    /// Whether `&mut self` grants exclusive access to the bytes.
    ///
    /// Always `false` for a borrowed tensor, whose clones are not counted.
    pub fn is_unique(&self) -> bool {
        match self.ref_count() {
            Some(n) => n == 1,
            None => self.data.is_null(),
        }
    }

    /// Start of the element storage (null when empty), for handing to
    /// inference backends.
    pub fn data_ptr(&self) -> *const u8 {
        self.data
    }

    /// Mutable start of the element storage.
    pub fn data_mut_ptr(&mut self) -> *mut u8 {
        self.data
    }

    /// Bytes spanned by the elements, padding included.
    pub fn byte_len(&self) -> usize {
        self.total() * self.elem_size()
    }

    /// Returns the element bytes, padding included.
    pub fn as_bytes(&self) -> &[u8] {
        if self.data.is_null() {
            return &[];
        }
        // SAFETY: data spans `total * elem_size` initialised bytes for owned
        // buffers (fast_malloc zeroes, pools recycle those buffers), and the
        // borrowing constructor requires the same of caller memory.
        unsafe { std::slice::from_raw_parts(self.data, self.byte_len()) }
    }

    /// Returns the element bytes mutably, padding included.
    ///
    /// # Panics
    /// Panics when the buffer is shared with another tensor or borrowed.
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        if !self.is_unique() {
            let err = match self.ref_count() {
                Some(n) => format!("mutable access to a tensor buffer shared by {n} tensors"),
                None => "mutable access to a borrowed tensor buffer".to_string(),
            };
            tracing::error!("{err}");
            panic!("{err}");
        }
        // SAFETY: uniqueness checked above.
        unsafe { self.as_bytes_mut_unchecked() }
    }

    /// Returns the element bytes mutably, or `None` if the buffer is shared
    /// or borrowed.
    pub fn try_as_bytes_mut(&mut self) -> Option<&mut [u8]> {
        if !self.is_unique() {
            return None;
        }
        // SAFETY: uniqueness checked above.
        Some(unsafe { self.as_bytes_mut_unchecked() })
    }

    /// Returns the element bytes mutably without checking for other shares.
    ///
    /// # Safety
    /// No other tensor aliasing this buffer, borrowed clones included, may
    /// be read or written while the returned slice is alive.
    pub unsafe fn as_bytes_mut_unchecked(&mut self) -> &mut [u8] {
        if self.data.is_null() {
            return &mut [];
        }
        // SAFETY: data spans `byte_len` initialised bytes (see `as_bytes`) and
        // the caller rules out other live references into it.
        unsafe { std::slice::from_raw_parts_mut(self.data, self.byte_len()) }
    }

    pub(crate) fn require_depth(&self, op: &'static str) -> Result<Depth, TensorError> {
        self.depth.ok_or(TensorError::EmptyTensor { op })
    }

    pub(crate) fn check_element<T: Element>(&self, op: &'static str) -> Result<(), TensorError> {
        let depth = self.require_depth(op)?;
        if T::DEPTH.size_bytes() != depth.size_bytes() {
            return Err(TensorError::ElementMismatch {
                requested: T::DEPTH,
                actual: depth,
            });
        }
        Ok(())
    }

    /// Returns all elements, padding included, as `T`.
    ///
    /// `T` must have the element width of the tensor's depth.
    pub fn as_slice<T: Element>(&self) -> &[T] {
        if let Err(e) = self.check_element::<T>("as_slice") {
            fatal(e);
        }
        if self.data.is_null() {
            return &[];
        }
        // SAFETY: width matches, data is aligned to at least the element width
        // and spans `total` elements.
        unsafe { std::slice::from_raw_parts(self.data.cast::<T>(), self.total()) }
    }

    /// Mutable counterpart of [`as_slice`](Tensor::as_slice).
    ///
    /// # Panics
    /// Panics when the buffer is shared or `T` has the wrong width.
    pub fn as_mut_slice<T: Element>(&mut self) -> &mut [T] {
        if let Err(e) = self.check_element::<T>("as_mut_slice") {
            fatal(e);
        }
        let total = self.total();
        let bytes = self.as_bytes_mut();
        // SAFETY: see `as_slice`; uniqueness checked by `as_bytes_mut`.
        unsafe { std::slice::from_raw_parts_mut(bytes.as_mut_ptr().cast::<T>(), total) }
    }
}

impl Default for Tensor {
    fn default() -> Self {
        Self::empty()
    }
}

impl Clone for Tensor {
    /// Shares the buffer, bumping its count.
    fn clone(&self) -> Self {
        if let Some(count) = self.count {
            // SAFETY: `self` holds a share, so the buffer is alive.
            unsafe { count.as_ref() }.fetch_add(1, Ordering::Relaxed);
        }
        Self {
            data: self.data,
            count: self.count,
            allocator: self.allocator.clone(),
            shape: self.shape.clone(),
            dims: self.dims,
            depth: self.depth,
            aligned: self.aligned,
            cstep: self.cstep,
        }
    }

    /// Takes a share of `source` before giving up the current one, so
    /// assigning between aliases of the same buffer never frees it.
    fn clone_from(&mut self, source: &Self) {
        let shared = source.clone();
        self.release();
        *self = shared;
    }
}

impl Drop for Tensor {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tensor")
            .field("shape", &self.shape)
            .field("depth", &self.depth)
            .field("aligned", &self.aligned)
            .field("cstep", &self.cstep)
            .field("ref_count", &self.ref_count())
            .field("borrowed", &self.is_borrowed())
            .field(
                "allocator",
                &self.allocator.as_ref().map(|a| a.name()),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use memory_manager::PoolAllocator;

    fn pool() -> (Arc<PoolAllocator>, Option<Arc<dyn Allocator>>) {
        let pool = Arc::new(PoolAllocator::new());
        let alloc: Arc<dyn Allocator> = pool.clone();
        (pool, Some(alloc))
    }

    #[test]
    fn test_empty_tensor() {
        let t = Tensor::default();
        assert!(t.is_empty());
        assert_eq!(t.dims(), 0);
        assert_eq!(t.depth(), None);
        assert_eq!(t.total(), 0);
        assert_eq!(t.ref_count(), None);
        assert!(t.as_bytes().is_empty());
    }

    #[test]
    fn test_concrete_layout() {
        let t = Tensor::new([2, 3, 4, 4], Depth::F32, false, None);
        assert_eq!(t.dims(), 4);
        assert_eq!(t.cstep(), 16);
        assert_eq!(t.total(), 96);
        assert_eq!(t.size(), 96);
        assert_eq!(t.byte_len(), 384);
        assert!(t.is_continue());
        assert_eq!(t.ref_count(), Some(1));
        // fast_malloc zeroes fresh buffers.
        assert!(t.as_slice::<f32>().iter().all(|&x| x == 0.0));
    }

    #[test]
    fn test_aligned_padding() {
        let t = Tensor::new([2, 13, 1], Depth::F32, true, None);
        assert_eq!(t.cstep(), 16);
        assert_eq!(t.total(), 32);
        assert_eq!(t.size(), 26);
        assert!(!t.is_continue());
        assert_eq!((t.cstep() * t.elem_size()) % MALLOC_ALIGN, 0);

        // Fewer than three dimensions are never padded.
        let m = Tensor::new([13, 1], Depth::F32, true, None);
        assert_eq!(m.cstep(), 13);
        assert!(m.is_continue());
    }

    #[test]
    fn test_alignment_invariant_across_depths() {
        for depth in Depth::ALL {
            for shape in [[3, 5, 7], [2, 1, 3], [1, 4, 4], [2, 3, 3]] {
                let t = Tensor::new(shape, depth, true, None);
                assert_eq!((t.cstep() * t.elem_size()) % MALLOC_ALIGN, 0);
                assert!(t.total() >= t.size());
            }
        }
    }

    #[test]
    fn test_cstep_by_rank() {
        assert_eq!(Tensor::new([7], Depth::U8, false, None).cstep(), 7);
        assert_eq!(Tensor::new([3, 5], Depth::U8, false, None).cstep(), 15);
        assert_eq!(Tensor::new([2, 3, 5], Depth::U8, false, None).cstep(), 15);
        assert_eq!(Tensor::new([2, 3, 5], Depth::U8, true, None).cstep(), 16);
    }

    #[test]
    fn test_refcount_through_pool() {
        let (pool, alloc) = pool();
        let a = Tensor::new([4, 4], Depth::F32, false, alloc);
        let b = a.clone();
        let mut c = Tensor::default();
        c.clone_from(&b);
        assert_eq!(a.ref_count(), Some(3));
        assert_eq!(pool.in_use_blocks(), 1);

        drop(a);
        drop(b);
        assert_eq!(pool.in_use_blocks(), 1);
        assert_eq!(c.ref_count(), Some(1));

        c.release();
        assert!(c.is_empty());
        assert_eq!(pool.in_use_blocks(), 0);
        assert_eq!(pool.free_blocks(), 1);
        assert_eq!(pool.stats().total_deallocations, 1);
    }

    #[test]
    fn test_clone_from_same_buffer_keeps_it_alive() {
        let (pool, alloc) = pool();
        let mut a = Tensor::new([8], Depth::U8, false, alloc);
        let b = a.clone();
        a.clone_from(&b);
        assert_eq!(b.ref_count(), Some(2));
        assert_eq!(pool.in_use_blocks(), 1);
        drop(a);
        drop(b);
        assert_eq!(pool.in_use_blocks(), 0);
    }

    #[test]
    fn test_create_is_idempotent() {
        let (pool, alloc) = pool();
        let mut t = Tensor::new([2, 3, 4], Depth::S16, false, alloc.clone());
        let before = t.data_ptr();
        t.create([2, 3, 4], Depth::S16, true, alloc.clone());
        assert_eq!(t.data_ptr(), before);
        assert_eq!(pool.stats().total_allocations, 1);

        // A different shape reallocates; the old block goes back to the pool.
        t.create([2, 3, 5], Depth::S16, false, alloc);
        assert_eq!(pool.stats().total_allocations, 2);
        assert_eq!(pool.in_use_blocks(), 1);

        // A different allocator instance also reallocates.
        t.create([2, 3, 5], Depth::S16, false, None);
        assert_eq!(pool.in_use_blocks(), 0);
        assert!(t.allocator().is_none());
    }

    #[test]
    fn test_request_size() {
        let (pool, alloc) = pool();
        let _t = Tensor::new([3], Depth::U8, false, alloc);
        // align_size(3, 4) + 4 byte count.
        assert_eq!(pool.in_use_bytes(), 8);
    }

    #[test]
    fn test_layout_overflow_rejected() {
        let huge = [usize::MAX / 4 + 2, 4, 1];
        for aligned in [false, true] {
            assert!(matches!(
                Tensor::try_new(huge, Depth::U8, aligned, None),
                Err(TensorError::ShapeOverflow { depth: Depth::U8, .. })
            ));
        }
        // Slab product, padded slab and byte size each overflow on their own.
        assert!(buffer_layout(&Shape::from([2, usize::MAX, 2]), Depth::U8, false).is_err());
        assert!(buffer_layout(&Shape::from([1, usize::MAX / 2, 1]), Depth::F32, true).is_err());
        assert!(buffer_layout(&Shape::from([usize::MAX / 4]), Depth::F64, false).is_err());

        let ok = buffer_layout(&Shape::from([2, 13, 1]), Depth::F32, true).unwrap();
        assert_eq!(ok, BufferLayout { cstep: 16, total: 32, payload: 128 });
    }

    #[test]
    fn test_failed_create_leaves_tensor_untouched() {
        let (pool, alloc) = pool();
        let mut t = Tensor::new([2, 3], Depth::S16, false, alloc.clone());
        let before = t.data_ptr();
        assert!(t.try_create([usize::MAX, 2, 2], Depth::S16, false, alloc).is_err());
        assert_eq!(t.data_ptr(), before);
        assert_eq!(t.shape().dims(), &[2, 3]);
        assert_eq!(pool.in_use_blocks(), 1);
    }

    #[test]
    #[should_panic(expected = "overflows the address space")]
    fn test_new_with_overflowing_shape_panics() {
        let _ = Tensor::new([usize::MAX / 4 + 2, 4, 1], Depth::U8, false, None);
    }

    #[test]
    #[should_panic(expected = "overflows the address space")]
    fn test_borrow_with_overflowing_shape_panics() {
        let mut storage = [0u8; 8];
        let _ = unsafe {
            Tensor::from_raw_parts(
                [usize::MAX / 4 + 2, 4, 1],
                Depth::U8,
                storage.as_mut_ptr(),
                false,
                None,
            )
        };
    }

    #[test]
    fn test_zero_sized_shape_allocates_nothing() {
        let (pool, alloc) = pool();
        let t = Tensor::new([0, 3], Depth::F32, false, alloc);
        assert!(t.is_empty());
        assert_eq!(t.dims(), 2);
        assert_eq!(pool.stats().total_allocations, 0);
    }

    #[test]
    fn test_release_resets_everything() {
        let mut t = Tensor::new([2, 3, 4], Depth::F64, true, None);
        t.release();
        assert!(t.is_empty());
        assert!(t.shape().is_empty());
        assert_eq!(t.depth(), None);
        assert!(!t.aligned());
        assert_eq!(t.cstep(), 0);
        t.release();
    }

    #[test]
    fn test_borrowed_never_frees() {
        let mut storage = vec![0f32; 12];
        let (pool, alloc) = pool();
        let t = unsafe {
            Tensor::from_raw_parts([3, 4], Depth::F32, storage.as_mut_ptr().cast(), false, alloc)
        };
        assert!(t.is_borrowed());
        assert_eq!(t.ref_count(), None);
        let alias = t.clone();
        drop(t);
        drop(alias);
        assert_eq!(pool.stats().total_allocations, 0);
        storage[0] = 1.0;
    }

    #[test]
    fn test_borrowed_mutation_visible_to_caller() {
        let mut storage = [0u8; 6];
        let mut t = unsafe {
            Tensor::from_raw_parts([2, 3], Depth::U8, storage.as_mut_ptr(), false, None)
        };
        unsafe { t.as_bytes_mut_unchecked()[4] = 9 };
        drop(t);
        assert_eq!(storage[4], 9);
    }

    #[test]
    fn test_borrowed_clones_refuse_safe_mutation() {
        let mut storage = [0u8; 6];
        let mut a = unsafe {
            Tensor::from_raw_parts([2, 3], Depth::U8, storage.as_mut_ptr(), false, None)
        };
        let mut b = a.clone();
        assert!(!a.is_unique());
        assert!(!b.is_unique());
        assert!(a.try_as_bytes_mut().is_none());
        assert!(b.try_as_bytes_mut().is_none());
        assert_eq!(a.as_bytes(), b.as_bytes());
        // Empty tensors stay trivially unique.
        assert!(Tensor::default().is_unique());
    }

    #[test]
    #[should_panic(expected = "borrowed tensor buffer")]
    fn test_borrowed_as_bytes_mut_panics() {
        let mut storage = [0u8; 4];
        let mut t = unsafe {
            Tensor::from_raw_parts([4], Depth::U8, storage.as_mut_ptr(), false, None)
        };
        t.as_bytes_mut()[0] = 1;
    }

    #[test]
    #[should_panic(expected = "shared by 2 tensors")]
    fn test_shared_as_bytes_mut_panics() {
        let mut a = Tensor::new([4], Depth::U8, false, None);
        let _b = a.clone();
        a.as_bytes_mut()[0] = 1;
    }

    #[test]
    fn test_shared_buffer_refuses_mutation() {
        let mut a = Tensor::new([4], Depth::S32, false, None);
        let b = a.clone();
        assert!(a.try_as_bytes_mut().is_none());
        drop(b);
        a.as_mut_slice::<i32>()[2] = 7;
        assert_eq!(a.as_slice::<i32>(), &[0, 0, 7, 0]);
    }

    #[test]
    #[should_panic(expected = "does not match tensor depth")]
    fn test_wrong_element_width_panics() {
        let t = Tensor::new([4], Depth::U8, false, None);
        let _ = t.as_slice::<f32>();
    }

    #[test]
    fn test_clone_and_release_across_threads() {
        let (pool, alloc) = pool();
        let t = Tensor::new([16, 16], Depth::F32, false, alloc);
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let shared = t.clone();
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        let c = shared.clone();
                        drop(c);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(t.ref_count(), Some(1));
        drop(t);
        assert_eq!(pool.in_use_blocks(), 0);
    }

    #[test]
    fn test_debug_names_allocator() {
        let (_pool, alloc) = pool();
        let t = Tensor::new([2], Depth::U8, false, alloc);
        let s = format!("{t:?}");
        assert!(s.contains("pool"));
        assert!(s.contains("ref_count: Some(1)"));
    }
}
