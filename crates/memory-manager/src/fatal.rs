// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Fail-fast reporting for allocator misuse.
//!
//! Wild frees and leaked blocks are never returned as errors: they mean the
//! bookkeeping of some caller is already broken. The pool logs the problem
//! and hands it to a [`FatalHandler`], which panics by default. Tests swap
//! in a recording handler to observe the failure without unwinding.

use crate::MemoryError;
use std::sync::Arc;

/// Callback invoked when an allocator detects unrecoverable misuse.
pub type FatalHandler = Arc<dyn Fn(&MemoryError) + Send + Sync>;

/// The default handler: panic with the error message.
pub fn panic_handler() -> FatalHandler {
    Arc::new(|err: &MemoryError| panic!("{err}"))
}

/// Logs `err` and passes it to `handler`.
///
/// While the current thread is already unwinding the handler is skipped,
/// since a second panic would abort the process.
pub(crate) fn raise(handler: &FatalHandler, err: MemoryError) {
    tracing::error!("{err}");
    if std::thread::panicking() {
        return;
    }
    handler(&err);
}
