// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0

//! The Services Bridge (C9, §4.9): translates Secure-Channel events into
//! Session events, application commands into Service events, and mediates the
//! synchronous `close_all_connections` request with `tokio::sync::Notify`
//! standing in for a condition variable, the same way a session manager
//! wakes waiters for its own "a session was added" event.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;

use opcua_core::{Event, LooperHandle, PostMode};
use opcua_session::SessionId;
use opcua_types::StatusCode;

use crate::dispatcher::{MessageType, Payload};

/// Event kind tags posted onto the Services Looper once a Secure-Channel
/// event has been translated (`SecureChannels → Session`, §6).
pub mod sc_to_session_kind {
    /// `EpConnected`.
    pub const EP_CONNECTED: u32 = 10;
    /// `EpClosed`.
    pub const EP_CLOSED: u32 = 11;
    /// `EpReverseClosed`.
    pub const EP_REVERSE_CLOSED: u32 = 12;
    /// `ScConnected`.
    pub const SC_CONNECTED: u32 = 13;
    /// `ScReverseConnected`.
    pub const SC_REVERSE_CONNECTED: u32 = 14;
    /// `ScConnectionTimeout`.
    pub const SC_CONNECTION_TIMEOUT: u32 = 15;
    /// `ScDisconnected`.
    pub const SC_DISCONNECTED: u32 = 16;
    /// `ScServiceReceiveMsg`.
    pub const SC_SERVICE_RECEIVE_MSG: u32 = 17;
    /// `ScSendFailure`.
    pub const SC_SEND_FAILURE: u32 = 18;
    /// `ScRequestTimeout`.
    pub const SC_REQUEST_TIMEOUT: u32 = 19;
}

/// Event kind tags posted onto the Secure-Channels Looper once a
/// Session-originated event has been translated (`Session → SecureChannels`,
/// §6).
pub mod session_to_sc_kind {
    /// `EpOpen`.
    pub const EP_OPEN: u32 = 20;
    /// `EpClose`.
    pub const EP_CLOSE: u32 = 21;
    /// `ReverseEpOpen`.
    pub const REVERSE_EP_OPEN: u32 = 22;
    /// `ReverseEpClose`.
    pub const REVERSE_EP_CLOSE: u32 = 23;
    /// `ScServiceSendErr`.
    pub const SC_SERVICE_SEND_ERR: u32 = 24;
    /// `ScServiceSendMsg`.
    pub const SC_SERVICE_SEND_MSG: u32 = 25;
    /// `ScDisconnect`.
    pub const SC_DISCONNECT: u32 = 26;
    /// `ScDisconnectedAck`.
    pub const SC_DISCONNECTED_ACK: u32 = 27;
    /// `ScsReevaluate`.
    pub const SCS_REEVALUATE: u32 = 28;
}

/// Event kind tags posted onto the Services Looper for an `Application →
/// Session` command (§6). `CloseAllConnections` is handled specially by
/// [`ServicesBridge::close_all_connections`] rather than a plain post.
pub mod app_to_session_kind {
    /// `OpenEndpoint`.
    pub const OPEN_ENDPOINT: u32 = 30;
    /// `CloseEndpoint`.
    pub const CLOSE_ENDPOINT: u32 = 31;
    /// `LocalServiceRequest`.
    pub const LOCAL_SERVICE_REQUEST: u32 = 32;
    /// `ActivateSession`.
    pub const ACTIVATE_SESSION: u32 = 33;
    /// `SendSessionRequest`.
    pub const SEND_SESSION_REQUEST: u32 = 34;
    /// `SendDiscoveryRequest`.
    pub const SEND_DISCOVERY_REQUEST: u32 = 35;
    /// `CloseSession`.
    pub const CLOSE_SESSION: u32 = 36;
    /// `CloseAllConnections`.
    pub const CLOSE_ALL_CONNECTIONS: u32 = 37;
    /// `TriggerEvent`.
    pub const TRIGGER_EVENT: u32 = 38;
    /// `OpenReverseEndpoint`.
    pub const OPEN_REVERSE_ENDPOINT: u32 = 39;
    /// `CloseReverseEndpoint`.
    pub const CLOSE_REVERSE_ENDPOINT: u32 = 40;
    /// `ReevaluateSCs`.
    pub const REEVALUATE_SCS: u32 = 41;
    /// `EvalUserCertificateSessions`.
    pub const EVAL_USER_CERTIFICATE_SESSIONS: u32 = 42;
    /// `UninitializeServices`.
    pub const UNINITIALIZE_SERVICES: u32 = 43;
}

use app_to_session_kind::CLOSE_ALL_CONNECTIONS;

/// A Secure-Channel-originated event, in the vocabulary of §6's
/// `SecureChannels → Session` interface.
pub enum SecureChannelEvent {
    /// An endpoint finished opening.
    EpConnected { endpoint_config_idx: u32 },
    /// An endpoint stopped listening.
    EpClosed { endpoint_config_idx: u32, status: StatusCode },
    /// A reverse-connect endpoint stopped listening.
    EpReverseClosed { endpoint_config_idx: u32, status: StatusCode },
    /// A Secure Channel finished the handshake.
    ScConnected { secure_channel_id: u32, channel_config_idx: u32 },
    /// A reverse-connect Secure Channel finished the handshake.
    ScReverseConnected { secure_channel_id: u32, channel_config_idx: u32 },
    /// A Secure Channel failed to establish within `ScConnectionTimeoutMs`.
    ScConnectionTimeout { channel_config_idx: u32 },
    /// A Secure Channel was lost.
    ScDisconnected { secure_channel_id: u32 },
    /// A decoded service-layer message arrived on a Secure Channel.
    ScServiceReceiveMsg { secure_channel_id: u32, message: Payload, message_type: MessageType },
    /// Sending on a Secure Channel failed.
    ScSendFailure { secure_channel_id: u32, status: StatusCode },
    /// A request on a Secure Channel timed out (`RequestTimeoutMs`).
    ScRequestTimeout { secure_channel_id: u32, request_handle: u32 },
}

/// Translate one [`SecureChannelEvent`] and post it onto the Services Looper.
pub fn translate_from_secure_channel(services: &LooperHandle, event: SecureChannelEvent) {
    use sc_to_session_kind::*;
    let posted = match event {
        SecureChannelEvent::EpConnected { endpoint_config_idx } => {
            Event::new(EP_CONNECTED, endpoint_config_idx)
        }
        SecureChannelEvent::EpClosed { endpoint_config_idx, status } => {
            Event::new(EP_CLOSED, endpoint_config_idx).with_aux_scalar(status as u64)
        }
        SecureChannelEvent::EpReverseClosed { endpoint_config_idx, status } => {
            Event::new(EP_REVERSE_CLOSED, endpoint_config_idx).with_aux_scalar(status as u64)
        }
        SecureChannelEvent::ScConnected { secure_channel_id, channel_config_idx } => {
            Event::new(SC_CONNECTED, secure_channel_id).with_aux_scalar(channel_config_idx as u64)
        }
        SecureChannelEvent::ScReverseConnected { secure_channel_id, channel_config_idx } => {
            Event::new(SC_REVERSE_CONNECTED, secure_channel_id)
                .with_aux_scalar(channel_config_idx as u64)
        }
        SecureChannelEvent::ScConnectionTimeout { channel_config_idx } => {
            Event::new(SC_CONNECTION_TIMEOUT, channel_config_idx)
        }
        SecureChannelEvent::ScDisconnected { secure_channel_id } => {
            Event::new(SC_DISCONNECTED, secure_channel_id)
        }
        SecureChannelEvent::ScServiceReceiveMsg { secure_channel_id, message, message_type } => {
            Event::new(SC_SERVICE_RECEIVE_MSG, secure_channel_id)
                .with_owned(message)
                .with_aux_scalar(message_type as u64)
        }
        SecureChannelEvent::ScSendFailure { secure_channel_id, status } => {
            Event::new(SC_SEND_FAILURE, secure_channel_id).with_aux_scalar(status as u64)
        }
        SecureChannelEvent::ScRequestTimeout { secure_channel_id, request_handle } => {
            Event::new(SC_REQUEST_TIMEOUT, secure_channel_id).with_aux_scalar(request_handle as u64)
        }
    };
    let _ = services.post(posted, PostMode::WarnAndDrop);
}

/// A Session-originated event, in the vocabulary of §6's `Session →
/// SecureChannels` interface.
pub enum SessionOutboundEvent {
    /// Open a listening endpoint.
    EpOpen { endpoint_config_idx: u32 },
    /// Stop listening on an endpoint.
    EpClose { endpoint_config_idx: u32 },
    /// Open a reverse-connect endpoint.
    ReverseEpOpen { endpoint_config_idx: u32 },
    /// Stop a reverse-connect endpoint.
    ReverseEpClose { endpoint_config_idx: u32 },
    /// Sending a service-layer message failed before it reached the wire.
    ScServiceSendErr { secure_channel_id: u32, status: StatusCode },
    /// Send an encoded service-layer message on a Secure Channel.
    ScServiceSendMsg { secure_channel_id: u32, message: Payload },
    /// Tear down a Secure Channel.
    ScDisconnect { secure_channel_id: u32 },
    /// Acknowledge a Secure Channel's disconnection.
    ScDisconnectedAck { secure_channel_id: u32 },
    /// Re-evaluate which Secure Channels should be open.
    ScsReevaluate,
}

/// Translate one [`SessionOutboundEvent`] and post it onto the
/// Secure-Channels Looper.
pub fn translate_to_secure_channel(secure_channels: &LooperHandle, event: SessionOutboundEvent) {
    use session_to_sc_kind::*;
    let posted = match event {
        SessionOutboundEvent::EpOpen { endpoint_config_idx } => Event::new(EP_OPEN, endpoint_config_idx),
        SessionOutboundEvent::EpClose { endpoint_config_idx } => Event::new(EP_CLOSE, endpoint_config_idx),
        SessionOutboundEvent::ReverseEpOpen { endpoint_config_idx } => {
            Event::new(REVERSE_EP_OPEN, endpoint_config_idx)
        }
        SessionOutboundEvent::ReverseEpClose { endpoint_config_idx } => {
            Event::new(REVERSE_EP_CLOSE, endpoint_config_idx)
        }
        SessionOutboundEvent::ScServiceSendErr { secure_channel_id, status } => {
            Event::new(SC_SERVICE_SEND_ERR, secure_channel_id).with_aux_scalar(status as u64)
        }
        SessionOutboundEvent::ScServiceSendMsg { secure_channel_id, message } => {
            Event::new(SC_SERVICE_SEND_MSG, secure_channel_id).with_owned(message)
        }
        SessionOutboundEvent::ScDisconnect { secure_channel_id } => {
            Event::new(SC_DISCONNECT, secure_channel_id)
        }
        SessionOutboundEvent::ScDisconnectedAck { secure_channel_id } => {
            Event::new(SC_DISCONNECTED_ACK, secure_channel_id)
        }
        SessionOutboundEvent::ScsReevaluate => Event::new(SCS_REEVALUATE, 0),
    };
    let _ = secure_channels.post(posted, PostMode::WarnAndDrop);
}

/// An application command, in the vocabulary of §6's `Application → Session`
/// interface. `CloseAllConnections` is not posted through here; call
/// [`ServicesBridge::close_all_connections`] directly.
pub enum AppCommand {
    /// Open a listening endpoint.
    OpenEndpoint { endpoint_config_idx: u32 },
    /// Stop listening on an endpoint.
    CloseEndpoint { endpoint_config_idx: u32 },
    /// A request the application built itself, not scoped to a session.
    LocalServiceRequest { endpoint_config_idx: u32, request: Payload, app_context: u64 },
    /// Activate (or reactivate) a session.
    ActivateSession { session_id: SessionId, request: Payload },
    /// Send a session-scoped request.
    SendSessionRequest { session_id: SessionId, request: Payload, app_context: u64 },
    /// Enqueue a discovery-service request (§4.8).
    SendDiscoveryRequest {
        channel_config_idx: u32,
        request: Payload,
        message_type: MessageType,
        app_context: u64,
    },
    /// Close a session.
    CloseSession { session_id: SessionId },
    /// Trigger an opaque application-defined event.
    TriggerEvent { payload: Payload },
    /// Open a reverse-connect endpoint.
    OpenReverseEndpoint { endpoint_config_idx: u32 },
    /// Close a reverse-connect endpoint.
    CloseReverseEndpoint { endpoint_config_idx: u32 },
    /// Re-evaluate which Secure Channels should be open.
    ReevaluateSCs,
    /// Re-validate every session whose activation depends on a user
    /// certificate that may have just been revoked or renewed.
    EvalUserCertificateSessions,
    /// Tear the whole Services subsystem down.
    UninitializeServices,
}

/// Translate one [`AppCommand`] and post it onto the Services Looper.
pub fn dispatch_app_command(services: &LooperHandle, command: AppCommand) {
    use app_to_session_kind::*;
    let posted = match command {
        AppCommand::OpenEndpoint { endpoint_config_idx } => Event::new(OPEN_ENDPOINT, endpoint_config_idx),
        AppCommand::CloseEndpoint { endpoint_config_idx } => Event::new(CLOSE_ENDPOINT, endpoint_config_idx),
        AppCommand::LocalServiceRequest { endpoint_config_idx, request, app_context } => {
            Event::new(LOCAL_SERVICE_REQUEST, endpoint_config_idx)
                .with_owned(request)
                .with_aux_scalar(app_context)
        }
        AppCommand::ActivateSession { session_id, request } => {
            Event::new(ACTIVATE_SESSION, session_id.value()).with_owned(request)
        }
        AppCommand::SendSessionRequest { session_id, request, app_context } => {
            Event::new(SEND_SESSION_REQUEST, session_id.value())
                .with_owned(request)
                .with_aux_scalar(app_context)
        }
        AppCommand::SendDiscoveryRequest { channel_config_idx, request, message_type, .. } => {
            Event::new(SEND_DISCOVERY_REQUEST, channel_config_idx)
                .with_owned(request)
                .with_aux_scalar(message_type as u64)
        }
        AppCommand::CloseSession { session_id } => Event::new(CLOSE_SESSION, session_id.value()),
        AppCommand::TriggerEvent { payload } => Event::new(TRIGGER_EVENT, 0).with_owned(payload),
        AppCommand::OpenReverseEndpoint { endpoint_config_idx } => {
            Event::new(OPEN_REVERSE_ENDPOINT, endpoint_config_idx)
        }
        AppCommand::CloseReverseEndpoint { endpoint_config_idx } => {
            Event::new(CLOSE_REVERSE_ENDPOINT, endpoint_config_idx)
        }
        AppCommand::ReevaluateSCs => Event::new(REEVALUATE_SCS, 0),
        AppCommand::EvalUserCertificateSessions => Event::new(EVAL_USER_CERTIFICATE_SESSIONS, 0),
        AppCommand::UninitializeServices => Event::new(UNINITIALIZE_SERVICES, 0),
    };
    let _ = services.post(posted, PostMode::WarnAndDrop);
}

/// The fixed internal-status-tag → wire-`StatusCode` mapping table (§4.9).
/// These tags are what the Secure-Channels/Services collaborators hand the
/// bridge internally; the bridge is the single place that turns them into
/// the `StatusCode`s this crate's public API exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InternalStatusTag {
    /// `sc_ok`.
    ScOk,
    /// `sc_bad_identity_token_invalid`.
    ScBadIdentityTokenInvalid,
    /// `sc_bad_identity_token_rejected`.
    ScBadIdentityTokenRejected,
    /// `sc_bad_user_access_denied`.
    ScBadUserAccessDenied,
    /// `sc_bad_user_signature_invalid`.
    ScBadUserSignatureInvalid,
    /// `sc_bad_communication_error`.
    ScBadCommunicationError,
    /// `sc_closed`.
    ScClosed,
}

impl InternalStatusTag {
    /// Map this tag onto its wire `StatusCode`.
    pub fn to_wire_status(self) -> StatusCode {
        match self {
            InternalStatusTag::ScOk => StatusCode::Good,
            InternalStatusTag::ScBadIdentityTokenInvalid => StatusCode::BadIdentityTokenInvalid,
            InternalStatusTag::ScBadIdentityTokenRejected => StatusCode::BadIdentityTokenRejected,
            InternalStatusTag::ScBadUserAccessDenied => StatusCode::BadUserAccessDenied,
            InternalStatusTag::ScBadUserSignatureInvalid => StatusCode::BadUserSignatureInvalid,
            InternalStatusTag::ScBadCommunicationError => StatusCode::BadCommunicationError,
            InternalStatusTag::ScClosed => StatusCode::BadClosed,
        }
    }
}

struct CloseAllFlags {
    requested: bool,
    all_disconnected: bool,
    client_only: bool,
}

/// Owns the two Loopers this bridge mediates between and the `close_all`
/// condition state (§4.9, §5: "the only inter-Looper primitives").
#[derive(Clone)]
pub struct ServicesBridge {
    services: LooperHandle,
    secure_channels: LooperHandle,
    close_all: Arc<Mutex<CloseAllFlags>>,
    close_all_notify: Arc<Notify>,
}

/// A handle into the bridge's close-all state, given to whatever Services
/// handler observes the internal `ScAllDisconnected(client_only)` event.
pub type ServicesBridgeHandle = ServicesBridge;

impl ServicesBridge {
    /// Build a bridge mediating between `services` and `secure_channels`.
    pub fn new(services: LooperHandle, secure_channels: LooperHandle) -> Self {
        Self {
            services,
            secure_channels,
            close_all: Arc::new(Mutex::new(CloseAllFlags {
                requested: false,
                all_disconnected: false,
                client_only: false,
            })),
            close_all_notify: Arc::new(Notify::new()),
        }
    }

    /// Borrow the Services Looper handle.
    pub fn services(&self) -> &LooperHandle {
        &self.services
    }

    /// Borrow the Secure-Channels Looper handle.
    pub fn secure_channels(&self) -> &LooperHandle {
        &self.secure_channels
    }

    /// `SecureChannels → Session`.
    pub fn translate_from_secure_channel(&self, event: SecureChannelEvent) {
        translate_from_secure_channel(&self.services, event);
    }

    /// `Session → SecureChannels`.
    pub fn translate_to_secure_channel(&self, event: SessionOutboundEvent) {
        translate_to_secure_channel(&self.secure_channels, event);
    }

    /// `Application → Session`, excluding `CloseAllConnections`.
    pub fn dispatch_app_command(&self, command: AppCommand) {
        dispatch_app_command(&self.services, command);
    }

    /// Synchronously close every connection (or only client-sourced ones, if
    /// `client_only`), as §4.9 specifies: set the request flags, post
    /// `CloseAllConnections` to Services, and wait for `ScAllDisconnected`.
    ///
    /// `zero_now` is consulted once, under the same lock that sets the
    /// request flags: if it reports there is nothing to close already, the
    /// bridge synthesizes `ScAllDisconnected` itself instead of posting,
    /// guaranteeing the waiter always wakes (§4.9's "already-zero case").
    pub async fn close_all_connections(&self, client_only: bool, zero_now: impl FnOnce() -> bool) {
        let notified = self.close_all_notify.notified();
        tokio::pin!(notified);

        let synthesize = {
            let mut flags = self.close_all.lock();
            flags.requested = true;
            flags.client_only = client_only;
            flags.all_disconnected = false;
            zero_now()
        };

        if synthesize {
            self.notify_all_disconnected(client_only);
        } else {
            let _ = self.services.post(
                Event::new(CLOSE_ALL_CONNECTIONS, 0).with_aux_scalar(client_only as u64),
                PostMode::Fail,
            );
        }

        if !self.close_all.lock().all_disconnected {
            notified.await;
        }
    }

    /// Signal that every relevant connection has now disconnected. Called by
    /// the Services handler on the internal `ScAllDisconnected(client_only)`
    /// event, and by [`ServicesBridge::close_all_connections`] itself for the
    /// already-zero case. A mismatched `client_only` (a stale signal from a
    /// request that was since superseded) is ignored.
    pub fn notify_all_disconnected(&self, client_only: bool) {
        let mut flags = self.close_all.lock();
        if flags.requested && flags.client_only == client_only {
            flags.requested = false;
            flags.all_disconnected = true;
            drop(flags);
            self.close_all_notify.notify_waiters();
        }
    }
}
