// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! `tensor-rt inspect` command: summarise an `.npy` file.

use std::fmt::Display;
use std::path::PathBuf;
use tensor_core::{npy, Depth, Element, Tensor};

pub fn execute(path: PathBuf, preview: usize) -> anyhow::Result<()> {
    let tensor = npy::load(&path)
        .map_err(|e| anyhow::anyhow!("failed to load tensor from '{}': {e}", path.display()))?;
    tracing::info!("loaded {}", path.display());

    // A loaded tensor always has a depth.
    let depth = tensor
        .depth()
        .ok_or_else(|| anyhow::anyhow!("'{}' holds no data", path.display()))?;

    println!("  File:      {}", path.display());
    println!("  Shape:     {}", tensor.shape());
    println!("  Depth:     {depth}");
    println!("  Elements:  {}", tensor.size());
    println!(
        "  Bytes:     {:.2} KB",
        (tensor.size() * depth.size_bytes()) as f64 / 1024.0
    );

    let head = match depth {
        Depth::U8 => head::<u8>(&tensor, preview),
        Depth::S8 => head::<i8>(&tensor, preview),
        Depth::F16 => head::<half::f16>(&tensor, preview),
        Depth::S16 => head::<i16>(&tensor, preview),
        Depth::U16 => head::<u16>(&tensor, preview),
        Depth::F32 => head::<f32>(&tensor, preview),
        Depth::S32 => head::<i32>(&tensor, preview),
        Depth::F64 => head::<f64>(&tensor, preview),
        Depth::S64 => head::<i64>(&tensor, preview),
    };
    let ellipsis = if tensor.size() > preview { ", ..." } else { "" };
    println!("  Values:    [{}{ellipsis}]", head.join(", "));
    Ok(())
}

fn head<T: Element + Display>(tensor: &Tensor, n: usize) -> Vec<String> {
    tensor
        .as_slice::<T>()
        .iter()
        .take(n)
        .map(ToString::to_string)
        .collect()
}
