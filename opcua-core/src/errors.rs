// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0

//! Rust OpcUa specific errors that don't reduce cleanly to a wire `StatusCode`.

use thiserror::Error;

/// Errors raised by core utilities (the Looper, config loading) rather than by
/// protocol handling itself.
#[derive(Error, Debug)]
pub enum CoreError {
    /// A [`crate::Looper`]'s queue was at `MaxAsyncQueueElements` capacity.
    #[error("event queue is full")]
    QueueFull,
    /// The Looper's worker task has already shut down.
    #[error("looper is closed")]
    Closed,
}
