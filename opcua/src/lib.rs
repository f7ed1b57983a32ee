#![warn(missing_docs)]

//! This is the OPC UA Session layer for Rust.
//!
//! The actual implementation is spread across a handful of crates below this
//! one (`opcua-types`, `opcua-crypto`, `opcua-core`, `opcua-session`); this is
//! the master crate that re-exports them and wires the remaining collaborators
//! — the Timeout Manager, the Application Dispatcher, the Discovery Request
//! Queue, and the Services Bridge — around `opcua-session`'s state machine.
//!
//! OPC-UA is an industry standard for information modeling and communication,
//! used for control systems, IoT, and industrial automation generally. Its
//! Session layer is the part of the stack that turns an anonymous, already
//! encrypted Secure Channel into an authenticated, per-user conversation.

pub mod discovery_queue;
pub mod dispatcher;
pub mod services_bridge;
pub mod timeout;

pub use opcua_core as core;
pub use opcua_crypto as crypto;
pub use opcua_session as session;
pub use opcua_types as types;

pub use discovery_queue::{DiscoveryRequest, DiscoveryRequestQueue};
pub use dispatcher::{AppEvent, ApplicationDispatcher, CallContext, MessageType, Payload};
pub use services_bridge::{SecureChannelEvent, ServicesBridge, ServicesBridgeHandle};
pub use timeout::{SessionTimeoutHandler, TimeoutManager};
