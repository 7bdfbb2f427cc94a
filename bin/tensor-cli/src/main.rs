// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # tensor-rt
//!
//! Command-line tools for the tensor runtime.
//!
//! ## Usage
//! ```bash
//! # Show how a shape is laid out in memory
//! tensor-rt layout --shape 1,3,13,13 --depth f32 --aligned
//!
//! # Summarise an .npy file
//! tensor-rt inspect ./frame.npy
//!
//! # Exercise an allocator
//! tensor-rt --config alloc.toml pool-bench --sizes 256,64K,4M --iterations 10000
//! ```

mod commands;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "tensor-rt",
    about = "Inspect slab tensor layouts and exercise buffer allocators",
    version,
    author
)]
struct Cli {
    /// Path to a TOML allocator configuration file.
    #[arg(short, long, global = true)]
    config: Option<std::path::PathBuf>,

    /// Enable verbose logging (repeat for more: -v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print cstep, total, size and strides for a shape.
    Layout {
        /// Comma-separated extents (e.g., "2,3,4,4").
        #[arg(short, long)]
        shape: String,

        /// Element type: u8, i8, f16, i16, u16, f32, i32, f64, i64.
        #[arg(short, long, default_value = "f32")]
        depth: String,

        /// Pad each slab to a 16-byte boundary.
        #[arg(short, long)]
        aligned: bool,
    },

    /// Summarise the tensor stored in an .npy file.
    Inspect {
        /// Path to the .npy file.
        path: std::path::PathBuf,

        /// Number of leading elements to print.
        #[arg(short, long, default_value_t = 8)]
        preview: usize,
    },

    /// Drive an allocator through tensor create/release cycles.
    PoolBench {
        /// Allocator kind, overriding the config file: raw, pool, unlocked-pool.
        #[arg(short, long)]
        kind: Option<String>,

        /// Comma-separated buffer sizes (e.g., "256,64K,4M").
        #[arg(short, long, default_value = "256,64K,4M")]
        sizes: String,

        /// Create/release cycles per size.
        #[arg(short, long, default_value_t = 10_000)]
        iterations: usize,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing/logging based on verbosity.
    commands::init_tracing(cli.verbose);

    let config = commands::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Layout {
            shape,
            depth,
            aligned,
        } => commands::layout::execute(&config, &shape, &depth, aligned),
        Commands::Inspect { path, preview } => commands::inspect::execute(path, preview),
        Commands::PoolBench {
            kind,
            sizes,
            iterations,
        } => commands::pool_bench::execute(config, kind, &sizes, iterations),
    }
}
