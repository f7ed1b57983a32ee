// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0

//! Utilities shared between the session layer's client and server halves:
//! the [`Looper`](looper::Looper) event bus (C1) that every other session
//! component is wired through, and the [`Config`](config::Config) trait
//! config files are loaded/saved through.

pub mod config;
pub mod errors;
pub mod looper;

pub use config::{Config, ConfigError};
pub use errors::CoreError;
pub use looper::{Event, EventParam, Handler, Looper, LooperError, LooperHandle, PostMode};
