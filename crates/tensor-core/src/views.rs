// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Element addressing, layout queries and layout-changing copies.
//!
//! A tensor of `dims >= 3` is a sequence of slabs, one per index of the outer
//! dimensions. Each slab holds `shape[-2] * shape[-1]` elements in row-major
//! order and starts `cstep` elements after the previous one.

use crate::error::fatal;
use crate::{Element, Shape, Tensor, TensorError};
use memory_manager::Allocator;
use ndarray::{ArrayD, ArrayViewD, IxDyn, ShapeBuilder};
use std::ptr::NonNull;
use std::sync::Arc;

impl Tensor {
    /// Elements spanned by the buffer, slab padding included.
    pub fn total(&self) -> usize {
        match self.dims {
            0 => 0,
            1 | 2 => self.cstep,
            n => self.cstep * self.shape.dims()[..n - 2].iter().product::<usize>(),
        }
    }

    /// Logical element count.
    pub fn size(&self) -> usize {
        self.shape.num_elements()
    }

    /// Elements per slab without padding.
    pub(crate) fn slab_len(&self) -> usize {
        match self.dims {
            0 => 0,
            1 => self.shape[0],
            n => self.shape[n - 2] * self.shape[n - 1],
        }
    }

    /// `true` when the elements are laid out without gaps.
    pub fn is_continue(&self) -> bool {
        self.dims < 3 || self.cstep == self.slab_len()
    }

    /// Per-dimension steps in elements.
    ///
    /// The innermost dimension steps by 1, the next by `shape[-1]`, the third
    /// from the end by `cstep`, and each outer dimension by the product of
    /// the inner extents counted in slabs.
    pub fn strides(&self) -> Vec<usize> {
        let d = self.dims;
        let mut strides = vec![0usize; d];
        if d == 0 {
            return strides;
        }
        strides[d - 1] = 1;
        if d >= 2 {
            strides[d - 2] = self.shape[d - 1];
        }
        if d >= 3 {
            strides[d - 3] = self.cstep;
            for i in (0..d - 3).rev() {
                strides[i] = strides[i + 1] * self.shape[i + 1];
            }
        }
        strides
    }

    fn offset_of(&self, position: &[usize]) -> Result<usize, TensorError> {
        if position.len() != self.dims {
            return Err(TensorError::RankMismatch {
                op: "at",
                expected: self.dims,
                actual: position.len(),
            });
        }
        if position.iter().zip(self.shape.iter()).any(|(&p, &d)| p >= d) {
            return Err(TensorError::IndexOutOfBounds {
                position: position.to_vec(),
                shape: self.shape.clone(),
            });
        }
        Ok(position
            .iter()
            .zip(self.strides())
            .map(|(p, s)| p * s)
            .sum())
    }

    /// Returns a reference to the element at `position`.
    pub fn try_at<T: Element>(&self, position: &[usize]) -> Result<&T, TensorError> {
        self.check_element::<T>("at")?;
        let offset = self.offset_of(position)?;
        // SAFETY: offset < total for an in-bounds position, data is non-null
        // because an in-bounds position implies a non-zero element count.
        Ok(unsafe { &*self.data.cast::<T>().add(offset) })
    }

    /// Returns a reference to the element at `position`.
    ///
    /// # Panics
    /// Panics when `position` has the wrong length, an index is out of
    /// bounds, or `T` has the wrong width.
    pub fn at<T: Element>(&self, position: &[usize]) -> &T {
        self.try_at(position).unwrap_or_else(|e| fatal(e))
    }

    /// Mutable counterpart of [`at`](Tensor::at). The buffer must not be
    /// shared.
    pub fn at_mut<T: Element>(&mut self, position: &[usize]) -> &mut T {
        let offset = match self
            .check_element::<T>("at_mut")
            .and_then(|_| self.offset_of(position))
        {
            Ok(offset) => offset,
            Err(e) => fatal(e),
        };
        let bytes = self.as_bytes_mut();
        // SAFETY: see `try_at`; uniqueness checked by `as_bytes_mut`.
        unsafe { &mut *bytes.as_mut_ptr().cast::<T>().add(offset) }
    }

    /// Returns a tensor whose elements are laid out without padding.
    ///
    /// A continuous tensor is returned as another share of the same buffer.
    /// Otherwise the slabs are copied into a new unaligned tensor from the
    /// same allocator.
    pub fn flatten(&self) -> Tensor {
        if self.is_continue() {
            return self.clone();
        }
        // A padded tensor always has data and a depth.
        let depth = match self.require_depth("flatten") {
            Ok(depth) => depth,
            Err(e) => fatal(e),
        };
        let elem = depth.size_bytes();
        let slab = self.slab_len() * elem;
        let stride = self.cstep * elem;

        let mut flat = Tensor::new(self.shape.clone(), depth, false, self.allocator().cloned());
        let src = self.as_bytes();
        for (i, chunk) in flat.as_bytes_mut().chunks_exact_mut(slab).enumerate() {
            chunk.copy_from_slice(&src[i * stride..i * stride + slab]);
        }
        flat
    }

    /// Copies a contiguous run of elements into this tensor's slab layout.
    pub(crate) fn scatter_from_contiguous(&mut self, src: &[u8]) {
        let elem = self.elem_size();
        let slab = self.slab_len() * elem;
        let stride = self.cstep * elem;
        if slab == 0 {
            return;
        }
        let dst = self.as_bytes_mut();
        if slab == stride {
            dst[..src.len()].copy_from_slice(src);
            return;
        }
        for (i, chunk) in src.chunks_exact(slab).enumerate() {
            dst[i * stride..i * stride + slab].copy_from_slice(chunk);
        }
    }

    /// Copies the elements into a new tensor of shape `new_shape`, keeping
    /// depth, alignment and allocator.
    pub fn try_reshape(&self, new_shape: impl Into<Shape>) -> Result<Tensor, TensorError> {
        let new_shape = new_shape.into();
        let depth = self.require_depth("reshape")?;
        let to_elements = new_shape
            .checked_num_elements()
            .ok_or_else(|| TensorError::ShapeOverflow {
                shape: new_shape.clone(),
                depth,
            })?;
        if to_elements != self.size() {
            return Err(TensorError::ElementCountMismatch {
                from_elements: self.size(),
                to_elements,
                from: self.shape.clone(),
                to: new_shape,
            });
        }
        let len = self.size() * depth.size_bytes();

        let mut out = Tensor::try_new(new_shape, depth, self.aligned, self.allocator().cloned())?;
        if self.aligned {
            let flat = self.flatten();
            out.scatter_from_contiguous(&flat.as_bytes()[..len]);
        } else {
            out.as_bytes_mut()[..len].copy_from_slice(&self.as_bytes()[..len]);
        }
        tracing::trace!("reshaped {} into {}", self.shape, out.shape);
        Ok(out)
    }

    /// Panicking form of [`try_reshape`](Tensor::try_reshape).
    pub fn reshape(&self, new_shape: impl Into<Shape>) -> Tensor {
        self.try_reshape(new_shape).unwrap_or_else(|e| fatal(e))
    }

    /// Builds a tensor from elements in row-major order.
    ///
    /// # Examples
    /// ```
    /// use tensor_core::Tensor;
    /// let t = Tensor::from_slice([2, 2, 3], &[1.0f32; 12], true, None).unwrap();
    /// assert_eq!(t.cstep(), 8);
    /// assert_eq!(*t.at::<f32>(&[1, 1, 2]), 1.0);
    /// ```
    pub fn from_slice<T: Element>(
        shape: impl Into<Shape>,
        values: &[T],
        aligned: bool,
        allocator: Option<Arc<dyn Allocator>>,
    ) -> Result<Tensor, TensorError> {
        let shape = shape.into();
        let elem = T::DEPTH.size_bytes();
        if values.len() != shape.num_elements() {
            return Err(TensorError::BufferSizeMismatch {
                expected: shape.num_elements().saturating_mul(elem),
                actual: values.len() * elem,
            });
        }
        // SAFETY: reinterpreting &[T] as &[u8] is safe for plain scalar types.
        let bytes =
            unsafe { std::slice::from_raw_parts(values.as_ptr().cast::<u8>(), values.len() * elem) };
        let mut tensor = Tensor::try_new(shape, T::DEPTH, aligned, allocator)?;
        tensor.scatter_from_contiguous(bytes);
        Ok(tensor)
    }

    /// Zero-copy strided view of the elements as `T`.
    pub fn try_view<T: Element>(&self) -> Result<ArrayViewD<'_, T>, TensorError> {
        self.check_element::<T>("view")?;
        let ptr = if self.data.is_null() {
            NonNull::<T>::dangling().as_ptr()
        } else {
            self.data.cast::<T>()
        };
        let shape = IxDyn(self.shape.dims()).strides(IxDyn(&self.strides()));
        // SAFETY: every in-bounds index maps below `total`, slabs never
        // overlap because cstep >= slab length, and the buffer lives as long
        // as `&self`.
        Ok(unsafe { ArrayViewD::from_shape_ptr(shape, ptr as *const T) })
    }

    /// Panicking form of [`try_view`](Tensor::try_view).
    pub fn view<T: Element>(&self) -> ArrayViewD<'_, T> {
        self.try_view().unwrap_or_else(|e| fatal(e))
    }

    /// Copies the elements, without padding, into an owned array.
    pub fn to_ndarray<T: Element>(&self) -> ArrayD<T> {
        self.view::<T>().to_owned()
    }
}
