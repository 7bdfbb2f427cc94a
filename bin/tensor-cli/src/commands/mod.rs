// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Subcommand implementations and shared argument parsing.

pub mod inspect;
pub mod layout;
pub mod pool_bench;

use anyhow::Context;
use memory_manager::AllocatorConfig;
use std::path::Path;
use tensor_core::Shape;
use tracing_subscriber::EnvFilter;

/// Installs the global subscriber. `RUST_LOG` takes precedence over `-v`.
pub fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Reads the allocator config file, or returns the default pool config.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<AllocatorConfig> {
    match path {
        Some(path) => {
            let config = AllocatorConfig::from_file(path)
                .with_context(|| format!("failed to load config '{}'", path.display()))?;
            tracing::info!("loaded {} allocator config from {}", config.kind.as_str(), path.display());
            Ok(config)
        }
        None => Ok(AllocatorConfig::default()),
    }
}

/// Parses `"2,3,4,4"` into a shape.
pub(crate) fn parse_shape(s: &str) -> anyhow::Result<Shape> {
    s.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(|p| {
            p.parse::<usize>()
                .with_context(|| format!("invalid extent '{p}' in shape '{s}'"))
        })
        .collect()
}

/// Parses a byte count with an optional `K`, `M` or `G` suffix.
pub(crate) fn parse_size(s: &str) -> anyhow::Result<usize> {
    let s = s.trim();
    let (digits, multiplier) = match s.char_indices().last() {
        Some((i, 'K' | 'k')) => (&s[..i], 1024),
        Some((i, 'M' | 'm')) => (&s[..i], 1024 * 1024),
        Some((i, 'G' | 'g')) => (&s[..i], 1024 * 1024 * 1024),
        _ => (s, 1),
    };
    let value: usize = digits
        .parse()
        .with_context(|| format!("invalid size '{s}'"))?;
    Ok(value * multiplier)
}
