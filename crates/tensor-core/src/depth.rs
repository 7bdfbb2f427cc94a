// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Tensor element types.

use crate::TensorError;
use std::fmt;

/// Number of low bits of a depth code reserved for the numeric kind.
pub const DEPTH_SHIFT: u32 = 3;

/// Element type of a [`crate::Tensor`].
///
/// The discriminant packs the byte width above [`DEPTH_SHIFT`] and a kind
/// tag below it, so `code >> DEPTH_SHIFT` is always the width in bytes.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Depth {
    /// 8-bit unsigned integer.
    U8 = 1 << DEPTH_SHIFT,
    /// 8-bit signed integer.
    S8 = (1 << DEPTH_SHIFT) + 1,
    /// 16-bit IEEE 754 floating point.
    F16 = 2 << DEPTH_SHIFT,
    /// 16-bit signed integer.
    S16 = (2 << DEPTH_SHIFT) + 1,
    /// 16-bit unsigned integer.
    U16 = (2 << DEPTH_SHIFT) + 2,
    /// 32-bit IEEE 754 floating point.
    F32 = 4 << DEPTH_SHIFT,
    /// 32-bit signed integer.
    S32 = (4 << DEPTH_SHIFT) + 1,
    /// 64-bit IEEE 754 floating point.
    F64 = 8 << DEPTH_SHIFT,
    /// 64-bit signed integer.
    S64 = (8 << DEPTH_SHIFT) + 1,
}

/// Numeric interpretation of a [`Depth`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NumericKind {
    Float,
    Signed,
    Unsigned,
}

impl Depth {
    /// All depths, narrowest first.
    pub const ALL: [Depth; 9] = [
        Depth::U8,
        Depth::S8,
        Depth::F16,
        Depth::S16,
        Depth::U16,
        Depth::F32,
        Depth::S32,
        Depth::F64,
        Depth::S64,
    ];

    /// Returns the packed depth code.
    pub fn code(self) -> i32 {
        self as i32
    }

    /// Decodes a packed depth code.
    ///
    /// # Examples
    /// ```
    /// use tensor_core::Depth;
    /// assert_eq!(Depth::from_code(32).unwrap(), Depth::F32);
    /// assert!(Depth::from_code(-1).is_err());
    /// ```
    pub fn from_code(code: i32) -> Result<Self, TensorError> {
        Depth::ALL
            .into_iter()
            .find(|d| d.code() == code)
            .ok_or(TensorError::UnknownDepth(code))
    }

    /// Returns the size of a single element in bytes.
    pub fn size_bytes(self) -> usize {
        (self.code() >> DEPTH_SHIFT) as usize
    }

    /// Returns whether elements are floats, signed or unsigned integers.
    pub fn kind(self) -> NumericKind {
        match self {
            Depth::F16 | Depth::F32 | Depth::F64 => NumericKind::Float,
            Depth::S8 | Depth::S16 | Depth::S32 | Depth::S64 => NumericKind::Signed,
            Depth::U8 | Depth::U16 => NumericKind::Unsigned,
        }
    }

    /// Returns a human-readable label for this depth.
    pub fn as_str(self) -> &'static str {
        match self {
            Depth::U8 => "u8",
            Depth::S8 => "i8",
            Depth::F16 => "f16",
            Depth::S16 => "i16",
            Depth::U16 => "u16",
            Depth::F32 => "f32",
            Depth::S32 => "i32",
            Depth::F64 => "f64",
            Depth::S64 => "i64",
        }
    }
}

impl fmt::Display for Depth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Depth {
    type Err = TensorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_lowercase();
        Depth::ALL
            .into_iter()
            .find(|d| d.as_str() == s)
            .ok_or(TensorError::UnknownDepth(-1))
    }
}

/// A Rust scalar type that can be read out of a tensor buffer.
pub trait Element: Copy + Send + Sync + 'static {
    /// The depth whose elements have this type.
    const DEPTH: Depth;
}

macro_rules! impl_element {
    ($($ty:ty => $depth:ident),* $(,)?) => {
        $(impl Element for $ty {
            const DEPTH: Depth = Depth::$depth;
        })*
    };
}

impl_element! {
    u8 => U8,
    i8 => S8,
    half::f16 => F16,
    i16 => S16,
    u16 => U16,
    f32 => F32,
    i32 => S32,
    f64 => F64,
    i64 => S64,
}
