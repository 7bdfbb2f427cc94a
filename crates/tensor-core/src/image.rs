// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Conversion between planar tensors and interleaved multi-channel images.
//!
//! # Layout
//!
//! ```text
//!  Image (rows x cols, C interleaved)        Tensor [N, C, H, W]
//!  ┌────────────────────────┐                slab (n, 0): channel 0 plane
//!  │ c0 c1 c2 │ c0 c1 c2 │..│   unroll ──►   slab (n, 1): channel 1 plane
//!  └────────────────────────┘   ◄── rollup   slab (n, 2): channel 2 plane
//! ```
//!
//! With `rechannel` the channel order is reversed on the way in and out, so a
//! BGR image becomes an RGB planar tensor and back.

use crate::error::fatal;
use crate::{Depth, Element, Shape, Tensor, TensorError};
use memory_manager::Allocator;
use std::sync::Arc;

/// Element type codes of the external image library.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageDepth {
    U8 = 0,
    S8 = 1,
    U16 = 2,
    S16 = 3,
    S32 = 4,
    F32 = 5,
    F64 = 6,
    F16 = 7,
}

impl ImageDepth {
    /// Decodes an image library depth code.
    pub fn from_code(code: i32) -> Result<Self, TensorError> {
        Ok(match code {
            0 => ImageDepth::U8,
            1 => ImageDepth::S8,
            2 => ImageDepth::U16,
            3 => ImageDepth::S16,
            4 => ImageDepth::S32,
            5 => ImageDepth::F32,
            6 => ImageDepth::F64,
            7 => ImageDepth::F16,
            other => return Err(TensorError::UnknownImageDepth(other)),
        })
    }

    /// Returns the image library code.
    pub fn code(self) -> i32 {
        self as i32
    }

    /// Bytes per channel value.
    pub fn size_bytes(self) -> usize {
        Depth::from(self).size_bytes()
    }
}

impl From<ImageDepth> for Depth {
    fn from(depth: ImageDepth) -> Self {
        match depth {
            ImageDepth::U8 => Depth::U8,
            ImageDepth::S8 => Depth::S8,
            ImageDepth::U16 => Depth::U16,
            ImageDepth::S16 => Depth::S16,
            ImageDepth::S32 => Depth::S32,
            ImageDepth::F32 => Depth::F32,
            ImageDepth::F64 => Depth::F64,
            ImageDepth::F16 => Depth::F16,
        }
    }
}

impl TryFrom<Depth> for ImageDepth {
    type Error = TensorError;

    fn try_from(depth: Depth) -> Result<Self, Self::Error> {
        Ok(match depth {
            Depth::U8 => ImageDepth::U8,
            Depth::S8 => ImageDepth::S8,
            Depth::U16 => ImageDepth::U16,
            Depth::S16 => ImageDepth::S16,
            Depth::S32 => ImageDepth::S32,
            Depth::F32 => ImageDepth::F32,
            Depth::F64 => ImageDepth::F64,
            Depth::F16 => ImageDepth::F16,
            Depth::S64 => return Err(TensorError::UnmappedDepth(depth)),
        })
    }
}

/// A 2-D image with interleaved channels, as exchanged with the image
/// library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    rows: usize,
    cols: usize,
    channels: usize,
    depth: ImageDepth,
    data: Vec<u8>,
}

/// Byte length of an interleaved image.
fn image_bytes(
    rows: usize,
    cols: usize,
    channels: usize,
    depth: ImageDepth,
) -> Result<usize, TensorError> {
    [rows, cols, channels, depth.size_bytes()]
        .iter()
        .try_fold(1usize, |acc, &d| acc.checked_mul(d))
        .filter(|&b| b <= isize::MAX as usize)
        .ok_or_else(|| TensorError::ShapeOverflow {
            shape: Shape::from([rows, cols, channels]),
            depth: Depth::from(depth),
        })
}

impl Image {
    /// Creates a zero-filled image.
    ///
    /// # Panics
    /// Panics when the pixel bytes would not fit in the address space.
    pub fn new(rows: usize, cols: usize, channels: usize, depth: ImageDepth) -> Self {
        let len = image_bytes(rows, cols, channels, depth).unwrap_or_else(|e| fatal(e));
        Self {
            rows,
            cols,
            channels,
            depth,
            data: vec![0; len],
        }
    }

    /// Wraps interleaved pixel bytes.
    pub fn from_bytes(
        rows: usize,
        cols: usize,
        channels: usize,
        depth: ImageDepth,
        data: Vec<u8>,
    ) -> Result<Self, TensorError> {
        let expected = image_bytes(rows, cols, channels, depth)?;
        if data.len() != expected {
            return Err(TensorError::BufferSizeMismatch {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            rows,
            cols,
            channels,
            depth,
            data,
        })
    }

    /// Builds an image from interleaved channel values.
    pub fn from_pixels<T: Element>(
        rows: usize,
        cols: usize,
        channels: usize,
        values: &[T],
    ) -> Result<Self, TensorError> {
        let depth = ImageDepth::try_from(T::DEPTH)?;
        let len = std::mem::size_of_val(values);
        // SAFETY: reinterpreting &[T] as &[u8] is safe for plain scalar types.
        let bytes = unsafe { std::slice::from_raw_parts(values.as_ptr().cast::<u8>(), len) };
        Self::from_bytes(rows, cols, channels, depth, bytes.to_vec())
    }

    /// Returns the image height in pixels.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Returns the image width in pixels.
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Returns the number of interleaved channels per pixel.
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Returns the per-channel element type.
    pub fn depth(&self) -> ImageDepth {
        self.depth
    }

    /// Interleaved pixel bytes, row by row.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Mutable access to the interleaved pixel bytes.
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    fn mismatch(&self, first: &Image) -> Option<String> {
        if self.depth != first.depth {
            Some(format!("depth {:?} vs {:?}", self.depth, first.depth))
        } else if self.channels != first.channels {
            Some(format!("{} channels vs {}", self.channels, first.channels))
        } else if (self.rows, self.cols) != (first.rows, first.cols) {
            Some(format!(
                "{}x{} vs {}x{}",
                self.rows, self.cols, first.rows, first.cols
            ))
        } else {
            None
        }
    }
}

/// Slab holding channel `k` of `channels`.
fn channel_slot(k: usize, channels: usize, rechannel: bool) -> usize {
    if rechannel {
        channels - 1 - k
    } else {
        k
    }
}

impl Tensor {
    /// Packs `images` into an `[N, C, H, W]` tensor, one channel plane per
    /// slab.
    pub fn try_unroll(
        images: &[Image],
        rechannel: bool,
        aligned: bool,
        allocator: Option<Arc<dyn Allocator>>,
    ) -> Result<Tensor, TensorError> {
        let first = images.first().ok_or(TensorError::EmptyImageList)?;
        for (index, image) in images.iter().enumerate().skip(1) {
            if let Some(detail) = image.mismatch(first) {
                return Err(TensorError::ImageMismatch { index, detail });
            }
        }

        let (c, h, w) = (first.channels, first.rows, first.cols);
        let depth = Depth::from(first.depth);
        let elem = depth.size_bytes();
        let plane = h * w * elem;

        let mut tensor = Tensor::try_new([images.len(), c, h, w], depth, aligned, allocator)?;
        let stride = tensor.cstep() * elem;
        let dst = tensor.as_bytes_mut();
        for (n, image) in images.iter().enumerate() {
            for k in 0..c {
                let base = (c * n + channel_slot(k, c, rechannel)) * stride;
                let slab = &mut dst[base..base + plane];
                for (p, px) in slab.chunks_exact_mut(elem).enumerate() {
                    let src = (p * c + k) * elem;
                    px.copy_from_slice(&image.data[src..src + elem]);
                }
            }
        }
        tracing::debug!("unrolled {} images into {}", images.len(), tensor.shape());
        Ok(tensor)
    }

    /// Panicking form of [`try_unroll`](Tensor::try_unroll).
    pub fn unroll(
        images: &[Image],
        rechannel: bool,
        aligned: bool,
        allocator: Option<Arc<dyn Allocator>>,
    ) -> Tensor {
        Self::try_unroll(images, rechannel, aligned, allocator).unwrap_or_else(|e| fatal(e))
    }

    /// Splits an `[N, C, H, W]` tensor back into `N` interleaved images.
    pub fn try_rollup(&self, rechannel: bool) -> Result<Vec<Image>, TensorError> {
        if self.dims != 4 {
            return Err(TensorError::RankMismatch {
                op: "rollup",
                expected: 4,
                actual: self.dims,
            });
        }
        let depth = self.require_depth("rollup")?;
        let image_depth = ImageDepth::try_from(depth)?;
        let (n, c, h, w) = (self.shape[0], self.shape[1], self.shape[2], self.shape[3]);
        let elem = depth.size_bytes();
        let plane = h * w * elem;
        let stride = self.cstep * elem;
        let src = self.as_bytes();

        let images = (0..n)
            .map(|i| {
                let mut image = Image::new(h, w, c, image_depth);
                for k in 0..c {
                    let base = (c * i + channel_slot(k, c, rechannel)) * stride;
                    for (p, px) in src[base..base + plane].chunks_exact(elem).enumerate() {
                        let dst = (p * c + k) * elem;
                        image.data[dst..dst + elem].copy_from_slice(px);
                    }
                }
                image
            })
            .collect();
        Ok(images)
    }

    /// Panicking form of [`try_rollup`](Tensor::try_rollup).
    pub fn rollup(&self, rechannel: bool) -> Vec<Image> {
        self.try_rollup(rechannel).unwrap_or_else(|e| fatal(e))
    }
}
