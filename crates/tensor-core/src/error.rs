// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for tensor operations.

use crate::{Depth, Shape};

/// Errors that can occur during tensor operations.
///
/// The plain methods on [`Tensor`](crate::Tensor) treat these as caller bugs
/// and panic; the `try_*` variants return them instead.
#[derive(Debug, thiserror::Error)]
pub enum TensorError {
    /// A raw depth code does not name any [`Depth`].
    #[error("unknown depth code {0}")]
    UnknownDepth(i32),

    /// A raw image depth code is outside the translation table.
    #[error("unknown image depth code {0}")]
    UnknownImageDepth(i32),

    /// A depth has no counterpart in the image representation.
    #[error("depth {0} has no image equivalent")]
    UnmappedDepth(Depth),

    /// The operation needs data but the tensor is empty.
    #[error("{op} called on an empty tensor")]
    EmptyTensor { op: &'static str },

    /// The number of indices or dimensions is wrong for the operation.
    #[error("{op} expects {expected} dimensions, got {actual}")]
    RankMismatch {
        op: &'static str,
        expected: usize,
        actual: usize,
    },

    /// An index lies outside its dimension.
    #[error("position {position:?} out of bounds for shape {shape}")]
    IndexOutOfBounds { position: Vec<usize>, shape: Shape },

    /// A reshape would change the number of elements.
    #[error("cannot reshape {from} ({from_elements} elements) into {to} ({to_elements} elements)")]
    ElementCountMismatch {
        from: Shape,
        to: Shape,
        from_elements: usize,
        to_elements: usize,
    },

    /// The slab, element span or byte size of a shape does not fit in the
    /// address space.
    #[error("shape {shape} of {depth} elements overflows the address space")]
    ShapeOverflow { shape: Shape, depth: Depth },

    /// The requested element type does not have the tensor's element width.
    #[error("element type {requested} does not match tensor depth {actual}")]
    ElementMismatch { requested: Depth, actual: Depth },

    /// No images were given to unroll.
    #[error("cannot unroll an empty image list")]
    EmptyImageList,

    /// An image differs from the first one in size, channels or depth.
    #[error("image {index} does not match the first image: {detail}")]
    ImageMismatch { index: usize, detail: String },

    /// The provided buffer size does not match the expected size.
    #[error("buffer size mismatch: expected {expected} bytes, got {actual}")]
    BufferSizeMismatch { expected: usize, actual: usize },

    /// An NPY stream is malformed or uses an unsupported feature.
    #[error("npy format error: {0}")]
    Npy(String),

    /// Underlying I/O failure while reading or writing a tensor file.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Logs `err` and panics. Used by the non-`try_` entry points.
#[track_caller]
pub(crate) fn fatal(err: TensorError) -> ! {
    tracing::error!("{err}");
    panic!("{err}")
}
