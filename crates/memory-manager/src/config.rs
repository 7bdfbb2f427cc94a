// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Allocator configuration loaded from TOML files or constructed programmatically.
//!
//! # TOML Format
//! ```toml
//! kind = "pool"              # "raw", "pool" or "unlocked-pool"
//! size_compare_ratio = 0.75
//! ```

use crate::pool::DEFAULT_SIZE_COMPARE_RATIO;
use crate::{Allocator, MemoryError, PoolAllocator, RawAllocator, UnlockedPoolAllocator};
use std::path::Path;
use std::sync::Arc;

/// Which allocator strategy to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AllocatorKind {
    /// Plain aligned allocation, no caching.
    Raw,
    /// Locking pool, safe to share across threads.
    Pool,
    /// Non-locking pool for single-threaded loops.
    UnlockedPool,
}

impl AllocatorKind {
    /// Returns the config spelling of this kind.
    pub fn as_str(self) -> &'static str {
        match self {
            AllocatorKind::Raw => "raw",
            AllocatorKind::Pool => "pool",
            AllocatorKind::UnlockedPool => "unlocked-pool",
        }
    }
}

impl std::str::FromStr for AllocatorKind {
    type Err = MemoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "raw" => Ok(AllocatorKind::Raw),
            "pool" | "locked-pool" => Ok(AllocatorKind::Pool),
            "unlocked-pool" | "unlocked" => Ok(AllocatorKind::UnlockedPool),
            other => Err(MemoryError::Config(format!(
                "unknown allocator kind '{other}'; expected 'raw', 'pool' or 'unlocked-pool'"
            ))),
        }
    }
}

/// Configuration for the allocator backing tensor buffers.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct AllocatorConfig {
    /// Allocator strategy.
    pub kind: AllocatorKind,
    /// Reuse ratio for the pool kinds (ignored for `raw`).
    #[serde(default = "default_ratio")]
    pub size_compare_ratio: f32,
}

fn default_ratio() -> f32 {
    DEFAULT_SIZE_COMPARE_RATIO
}

impl AllocatorConfig {
    /// Loads configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, MemoryError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            MemoryError::Config(format!("cannot read config '{}': {e}", path.display()))
        })?;
        Self::from_toml(&content)
    }

    /// Parses configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, MemoryError> {
        toml::from_str(toml_str).map_err(|e| MemoryError::Config(format!("TOML parse error: {e}")))
    }

    /// Serialises configuration to TOML.
    pub fn to_toml(&self) -> Result<String, MemoryError> {
        toml::to_string_pretty(self)
            .map_err(|e| MemoryError::Config(format!("TOML serialise error: {e}")))
    }

    /// Builds the configured allocator.
    ///
    /// Fails with [`MemoryError::InvalidSizeCompareRatio`] for a pool kind
    /// whose ratio lies outside `(0, 1)`.
    pub fn build(&self) -> Result<Arc<dyn Allocator>, MemoryError> {
        let allocator: Arc<dyn Allocator> = match self.kind {
            AllocatorKind::Raw => Arc::new(RawAllocator),
            AllocatorKind::Pool => {
                Arc::new(PoolAllocator::with_size_compare_ratio(self.size_compare_ratio)?)
            }
            AllocatorKind::UnlockedPool => Arc::new(
                UnlockedPoolAllocator::with_size_compare_ratio(self.size_compare_ratio)?,
            ),
        };
        tracing::debug!(
            "built {} allocator (ratio {})",
            allocator.name(),
            self.size_compare_ratio
        );
        Ok(allocator)
    }
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self {
            kind: AllocatorKind::Pool,
            size_compare_ratio: DEFAULT_SIZE_COMPARE_RATIO,
        }
    }
}
