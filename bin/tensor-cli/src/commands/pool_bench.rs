// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! `tensor-rt pool-bench` command: time tensor create/release cycles.
//!
//! Each cycle creates a one-dimensional `u8` tensor of the requested size
//! and drops it, so a pooling allocator should serve every cycle after the
//! first from its free list.

use anyhow::Context;
use memory_manager::AllocatorConfig;
use std::time::Instant;
use tensor_core::{Depth, Tensor};

pub fn execute(
    mut config: AllocatorConfig,
    kind: Option<String>,
    sizes: &str,
    iterations: usize,
) -> anyhow::Result<()> {
    if let Some(kind) = kind {
        config.kind = kind.parse()?;
    }
    let sizes: Vec<usize> = sizes
        .split(',')
        .map(super::parse_size)
        .collect::<anyhow::Result<_>>()?;
    let allocator = config.build().context("failed to build allocator")?;

    tracing::info!(
        "benchmarking {} allocator over {} sizes",
        allocator.name(),
        sizes.len()
    );
    println!("  Allocator: {} (ratio {})", allocator.name(), config.size_compare_ratio);
    println!();
    println!("  {:>12} {:>12} {:>12}", "Size", "Cycles", "ns/cycle");
    println!("  {}", "-".repeat(38));

    for &size in &sizes {
        let start = Instant::now();
        for _ in 0..iterations {
            let tensor = Tensor::try_new([size], Depth::U8, false, Some(allocator.clone()))?;
            std::hint::black_box(tensor.data_ptr());
        }
        let elapsed = start.elapsed();
        let per_cycle = elapsed.as_nanos() as f64 / iterations.max(1) as f64;
        println!("  {size:>12} {iterations:>12} {per_cycle:>12.1}");
    }
    println!();

    match allocator.stats() {
        Some(stats) => {
            println!("  Stats:     {}", stats.summary());
            println!("  Hit ratio: {:.1}%", stats.cache_hit_ratio() * 100.0);
        }
        None => println!("  Stats:     not tracked by this allocator"),
    }
    Ok(())
}
