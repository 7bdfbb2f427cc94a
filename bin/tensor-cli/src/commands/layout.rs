// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! `tensor-rt layout` command: show how a shape maps onto a buffer.

use anyhow::Context;
use memory_manager::{align_size, AllocatorConfig};
use tensor_core::{Depth, Tensor};

pub fn execute(
    config: &AllocatorConfig,
    shape: &str,
    depth: &str,
    aligned: bool,
) -> anyhow::Result<()> {
    let shape = super::parse_shape(shape)?;
    let depth: Depth = depth
        .parse()
        .with_context(|| format!("unknown depth '{depth}'"))?;
    if aligned && shape.len() < 3 {
        tracing::warn!("alignment has no effect on {}-dimensional shapes", shape.len());
    }

    let allocator = config.build().context("failed to build allocator")?;
    let tensor = Tensor::try_new(shape, depth, aligned, Some(allocator))?;

    let elem = depth.size_bytes();
    let natural = match tensor.dims() {
        0 => 0,
        1 => tensor.shape()[0],
        n => tensor.shape()[n - 2] * tensor.shape()[n - 1],
    };
    let request = if tensor.total() > 0 {
        align_size(tensor.total() * elem, 4) + 4
    } else {
        0
    };

    println!("  Shape:       {}", tensor.shape());
    println!("  Depth:       {depth} ({elem} bytes, code {})", depth.code());
    println!("  Aligned:     {}", tensor.aligned());
    println!("  Slab:        {natural} elements");
    println!("  Cstep:       {} elements ({} bytes)", tensor.cstep(), tensor.cstep() * elem);
    println!("  Size:        {} elements", tensor.size());
    println!("  Total:       {} elements", tensor.total());
    println!("  Padding:     {} elements", tensor.total() - tensor.size());
    println!("  Continuous:  {}", tensor.is_continue());
    println!("  Strides:     {:?}", tensor.strides());
    println!("  Allocation:  {request} bytes from {}", config.kind.as_str());
    Ok(())
}
