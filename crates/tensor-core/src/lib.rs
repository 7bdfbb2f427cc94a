// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # tensor-core
//!
//! Reference-counted, slab-strided tensors for vision and inference
//! pipelines.
//!
//! This crate provides:
//! - [`Tensor`]: a shape-aware view of a byte buffer obtained from any
//!   [`memory_manager::Allocator`], shared between clones through an atomic
//!   count stored in the buffer itself.
//! - [`Shape`]: ordered dimension extents.
//! - [`Depth`]: element types, with [`Element`] linking them to Rust scalars.
//! - [`Image`] / [`ImageDepth`]: the interleaved-channel image boundary used
//!   by [`Tensor::unroll`] and [`Tensor::rollup`].
//! - [`npy`]: `.npy` file reading and writing.
//!
//! # Slab Layout
//! The innermost two dimensions form a slab. With `aligned = true` and at
//! least three dimensions, each slab is padded so consecutive slabs start on
//! 16-byte boundaries; [`Tensor::cstep`] is the distance between slab starts
//! in elements. [`Tensor::flatten`] removes the padding.
//!
//! # Failure Policy
//! Misuse (out-of-bounds access, mismatched reshape, unmapped depths) is
//! logged with `tracing::error!` and panics. Each such operation has a
//! `try_*` form returning [`TensorError`] instead.
//!
//! # Example
//! ```
//! use std::sync::Arc;
//! use memory_manager::{Allocator, PoolAllocator};
//! use tensor_core::{Depth, Tensor};
//!
//! let pool: Arc<dyn Allocator> = Arc::new(PoolAllocator::new());
//! let mut t = Tensor::new([1, 3, 5, 5], Depth::F32, true, Some(pool));
//! assert_eq!(t.cstep(), 28);
//! *t.at_mut::<f32>(&[0, 2, 4, 4]) = 1.0;
//!
//! let flat = t.flatten();
//! assert!(flat.is_continue());
//! assert_eq!(flat.as_slice::<f32>()[74], 1.0);
//! ```

mod depth;
mod error;
mod image;
pub mod npy;
mod shape;
mod tensor;
mod views;

pub use depth::{Depth, Element, NumericKind, DEPTH_SHIFT};
pub use error::TensorError;
pub use image::{Image, ImageDepth};
pub use shape::Shape;
pub use tensor::Tensor;
