//! Central place to pin the async runtime and its companion crates.
//!
//! Every crate in this workspace that touches async I/O depends on
//! `ii-async-compat` instead of depending on `tokio`/`futures`/`bytes`
//! directly, so the whole workspace moves to a new runtime version at once.

pub use bytes;
pub use futures;
pub use tokio;
pub use tokio_util;

use std::future::Future;

/// Spawn a future on the current runtime, consistent entry point across the
/// workspace so callers never have to reach into `tokio::spawn` themselves.
pub fn spawn<F>(future: F) -> tokio::task::JoinHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    tokio::spawn(future)
}

/// Build a multi-threaded runtime and block on `future` until it completes.
/// Used by binaries instead of `#[tokio::main]` so the runtime configuration
/// (thread count, etc.) stays explicit and data-driven from `Config`.
pub fn run<F>(worker_threads: usize, future: F) -> F::Output
where
    F: Future,
{
    let mut builder = tokio::runtime::Builder::new_multi_thread();
    builder.enable_all();
    if worker_threads > 0 {
        builder.worker_threads(worker_threads);
    }
    let runtime = builder.build().expect("failed to start tokio runtime");
    runtime.block_on(future)
}
