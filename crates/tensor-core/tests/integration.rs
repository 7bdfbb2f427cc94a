// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Integration tests: allocator configuration through tensor pipelines.
//!
//! These tests exercise the flow from a TOML allocator config → tensors
//! sharing pooled buffers → layout changes → `.npy` files and images, proving
//! that the two crates compose and that every buffer finds its way back to
//! the pool.

use memory_manager::{Allocator, AllocatorConfig, PoolAllocator, UnlockedPoolAllocator};
use std::io::Cursor;
use std::sync::Arc;
use tensor_core::{npy, Depth, Image, Tensor};

// ── Helpers ────────────────────────────────────────────────────

fn gradient(rows: usize, cols: usize, channels: usize, offset: u8) -> Image {
    let pixels: Vec<u8> = (0..rows * cols * channels)
        .map(|i| (i % 251) as u8 ^ offset)
        .collect();
    Image::from_pixels(rows, cols, channels, &pixels).unwrap()
}

fn pooled() -> (Arc<PoolAllocator>, Arc<dyn Allocator>) {
    let pool = Arc::new(PoolAllocator::new());
    let alloc: Arc<dyn Allocator> = pool.clone();
    (pool, alloc)
}

// ── Tests ──────────────────────────────────────────────────────

#[test]
fn concrete_scenario_with_pool() {
    let (pool, alloc) = pooled();

    let a = Tensor::new([2, 3, 4, 4], Depth::F32, false, Some(alloc.clone()));
    assert_eq!(a.cstep(), 16);
    assert_eq!(a.total(), 96);
    assert_eq!(pool.in_use_bytes(), 96 * 4 + 4);

    let b = a.clone();
    drop(a);
    assert_eq!(pool.in_use_blocks(), 1);
    drop(b);
    assert_eq!(pool.in_use_blocks(), 0);
    assert_eq!(pool.free_blocks(), 1);

    // The next tensor of the same size reuses the cached block.
    let c = Tensor::new([6, 16], Depth::F32, false, Some(alloc));
    let stats = pool.stats();
    assert_eq!(stats.cache_hits, 1);
    assert_eq!(stats.cache_misses, 1);
    drop(c);
}

#[test]
fn padded_tensor_reports_natural_and_padded_steps() {
    // Natural slab of 13 elements is padded to 16.
    let t = Tensor::new([4, 13, 1], Depth::F32, true, None);
    assert_eq!(t.cstep(), 16);
    assert_eq!(t.total(), 64);
    assert_eq!(t.size(), 52);
    assert!(!t.is_continue());
}

#[test]
fn config_driven_pipeline() {
    let config = AllocatorConfig::from_toml("kind = \"pool\"\nsize_compare_ratio = 0.5").unwrap();
    let alloc = config.build().unwrap();

    let images = vec![gradient(5, 7, 3, 0), gradient(5, 7, 3, 0x55)];
    let t = Tensor::unroll(&images, true, true, Some(alloc.clone()));
    assert_eq!(t.shape().dims(), &[2, 3, 5, 7]);
    assert!(!t.is_continue());

    let reshaped = t.reshape([6, 35, 1]);
    let restored = reshaped.reshape([2, 3, 5, 7]);
    assert_eq!(restored.to_ndarray::<u8>(), t.to_ndarray::<u8>());
    assert_eq!(restored.rollup(true), images);

    let mut buf = Vec::new();
    npy::write_npy(&mut buf, &t.flatten()).unwrap();
    let loaded = npy::read_npy(Cursor::new(buf)).unwrap();
    assert_eq!(loaded.shape(), t.shape());
    assert_eq!(loaded.to_ndarray::<u8>(), t.to_ndarray::<u8>());
}

#[test]
fn unlocked_pool_single_threaded_loop() {
    let pool = Arc::new(UnlockedPoolAllocator::new());
    let alloc: Arc<dyn Allocator> = pool.clone();

    for frame in 0..10u8 {
        let images = [gradient(8, 8, 3, frame)];
        let t = Tensor::unroll(&images, false, true, Some(alloc.clone()));
        let back = t.rollup(false);
        assert_eq!(back[0], images[0]);
    }

    let stats = pool.stats();
    assert_eq!(stats.total_allocations, 10);
    assert_eq!(stats.cache_misses, 1);
    assert_eq!(pool.in_use_blocks(), 0);
}

#[test]
fn clones_released_on_other_threads_return_to_pool() {
    let (pool, alloc) = pooled();
    let t = Tensor::new([1, 3, 32, 32], Depth::U8, true, Some(alloc));

    let workers: Vec<_> = (0..4)
        .map(|_| {
            let share = t.clone();
            std::thread::spawn(move || share.as_slice::<u8>().iter().map(|&v| v as u64).sum::<u64>())
        })
        .collect();
    drop(t);
    for w in workers {
        w.join().unwrap();
    }
    assert_eq!(pool.in_use_blocks(), 0);
    assert_eq!(pool.stats().total_deallocations, 1);
}

#[test]
fn flatten_of_continuous_tensor_is_shared() {
    let t = Tensor::new([3, 8, 2], Depth::F64, true, None);
    let f = t.flatten();
    assert_eq!(f.data_ptr(), t.data_ptr());
    assert_eq!(f.flatten().data_ptr(), t.data_ptr());
}

#[test]
fn borrowed_tensor_reads_caller_memory() {
    let mut storage: Vec<i32> = (0..24).collect();
    let t = unsafe {
        Tensor::from_raw_parts([2, 3, 4], Depth::S32, storage.as_mut_ptr().cast(), false, None)
    };
    assert_eq!(*t.at::<i32>(&[1, 2, 3]), 23);
    let copy = t.reshape([4, 6]);
    assert!(!copy.is_borrowed());
    drop(t);
    storage.clear();
    assert_eq!(*copy.at::<i32>(&[3, 5]), 23);
}
