// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0

//! The Application Dispatcher (C7, §4.7): posts application-visible
//! notifications onto their own Looper and owns payload deallocation for
//! every event that carries a decoded response. Built directly on
//! `opcua_core::Looper`, the way `opcua-session`'s state machine runs on the
//! Services Looper.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;

use opcua_core::{Event, EventParam, Handler, Looper, LooperError, LooperHandle, PostMode};
use opcua_session::{SessionId, UserToken};
use opcua_types::StatusCode;

/// A type-erased, owned response payload. The "known type descriptor" §4.7
/// calls for is Rust's own drop glue: whatever concrete type was boxed here
/// is dropped, and therefore deallocated, the instant the owning [`AppEvent`]
/// is dropped — whether or not a callback consumed it.
pub type Payload = Box<dyn Any + Send>;

/// The outbound service being retried or reported on, tagging
/// `SendRequestFailed` (§4.7) and discovery-queue entries (§4.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    /// `CreateSessionRequest`.
    CreateSession,
    /// `ActivateSessionRequest`.
    ActivateSession,
    /// `CloseSessionRequest`.
    CloseSession,
    /// `FindServersRequest`/`FindServersOnNetworkRequest`.
    FindServers,
    /// `GetEndpointsRequest`.
    GetEndpoints,
    /// `RegisterServerRequest`/`RegisterServer2Request`.
    RegisterServer,
    /// Any other already-built outbound request the application sent
    /// directly via `LocalServiceRequest`.
    LocalService,
}

/// Per-invocation bundle carried across the event bus for address-space write
/// notifications (§4.7, GLOSSARY "Call Context"): which user and session
/// produced the write, plus the auxiliary status the write itself completed
/// with.
#[derive(Debug, Clone)]
pub struct CallContext {
    /// The session the write was issued under, `None` for a purely internal
    /// write.
    pub session_id: Option<SessionId>,
    /// The bound user identity at the time of the write, if any.
    pub user: Option<UserToken>,
    /// An application-chosen opaque auxiliary value, carried verbatim.
    pub app_context: u64,
}

/// Every event the Session layer posts to the application (§4.7, verbatim).
pub enum AppEvent {
    /// `ActivateSessionRequest` was rejected; the session did not bind a user.
    SessionActivationFailure {
        /// The session the activation was attempted against.
        session_id: SessionId,
        /// Why activation failed.
        status: StatusCode,
        /// Application-chosen opaque context.
        app_context: u64,
    },
    /// A session finished activating and is now live.
    ActivatedSession {
        /// The newly activated session.
        session_id: SessionId,
        /// Application-chosen opaque context.
        app_context: u64,
    },
    /// A session orphaned by a lost Secure Channel is being reactivated on a
    /// new one.
    SessionReactivating {
        /// The session being reactivated.
        session_id: SessionId,
        /// Application-chosen opaque context.
        app_context: u64,
    },
    /// A decoded response to a session-scoped request the application sent.
    ReceivedSessionResponse {
        /// The session the response belongs to.
        session_id: SessionId,
        /// The decoded response payload; freed once this event is dropped.
        response: Payload,
        /// Application-chosen opaque context.
        app_context: u64,
    },
    /// A decoded response to a discovery-service request.
    ReceivedDiscoveryResponse {
        /// The decoded response payload; freed once this event is dropped.
        response: Payload,
        /// Application-chosen opaque context.
        app_context: u64,
    },
    /// An outbound request could not be sent.
    SendRequestFailed {
        /// Why the send failed.
        status: StatusCode,
        /// Which service the request belonged to.
        message_type: MessageType,
        /// Application-chosen opaque context.
        app_context: u64,
    },
    /// A session reached its terminal `closed` state.
    ClosedSession {
        /// The session that closed.
        session_id: SessionId,
        /// Why it closed.
        reason: StatusCode,
        /// Application-chosen opaque context.
        app_context: u64,
    },
    /// An endpoint stopped listening.
    ClosedEndpoint {
        /// Which endpoint configuration.
        endpoint_config_idx: u32,
        /// Why it closed.
        status: StatusCode,
    },
    /// A response to an `OpenEndpoint`/`LocalServiceRequest` not scoped to a
    /// session (e.g. a direct endpoint-level service call).
    LocalServiceResponse {
        /// Which endpoint configuration the response belongs to.
        endpoint_config_idx: u32,
        /// The decoded response payload; freed once this event is dropped.
        response: Payload,
        /// Application-chosen opaque context.
        app_context: u64,
    },
    /// A write to the address space completed, carrying the call context that
    /// produced it.
    AddressSpaceWriteNotification {
        /// Who/what issued the write.
        call_context: CallContext,
        /// The write payload; freed once this event is dropped.
        write_value: Payload,
        /// The status the write completed with.
        status: StatusCode,
    },
}

impl fmt::Debug for AppEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppEvent::SessionActivationFailure { session_id, status, .. } => f
                .debug_struct("SessionActivationFailure")
                .field("session_id", session_id)
                .field("status", status)
                .finish(),
            AppEvent::ActivatedSession { session_id, .. } => {
                f.debug_struct("ActivatedSession").field("session_id", session_id).finish()
            }
            AppEvent::SessionReactivating { session_id, .. } => {
                f.debug_struct("SessionReactivating").field("session_id", session_id).finish()
            }
            AppEvent::ReceivedSessionResponse { session_id, .. } => {
                f.debug_struct("ReceivedSessionResponse").field("session_id", session_id).finish()
            }
            AppEvent::ReceivedDiscoveryResponse { .. } => {
                f.debug_struct("ReceivedDiscoveryResponse").finish()
            }
            AppEvent::SendRequestFailed { status, message_type, .. } => f
                .debug_struct("SendRequestFailed")
                .field("status", status)
                .field("message_type", message_type)
                .finish(),
            AppEvent::ClosedSession { session_id, reason, .. } => f
                .debug_struct("ClosedSession")
                .field("session_id", session_id)
                .field("reason", reason)
                .finish(),
            AppEvent::ClosedEndpoint { endpoint_config_idx, status } => f
                .debug_struct("ClosedEndpoint")
                .field("endpoint_config_idx", endpoint_config_idx)
                .field("status", status)
                .finish(),
            AppEvent::LocalServiceResponse { endpoint_config_idx, .. } => f
                .debug_struct("LocalServiceResponse")
                .field("endpoint_config_idx", endpoint_config_idx)
                .finish(),
            AppEvent::AddressSpaceWriteNotification { status, .. } => {
                f.debug_struct("AddressSpaceWriteNotification").field("status", status).finish()
            }
        }
    }
}

type Callback = Box<dyn FnMut(AppEvent) + Send>;

struct DispatchHandler {
    callback: Arc<Mutex<Option<Callback>>>,
}

impl Handler for DispatchHandler {
    fn handle(&mut self, event: Event) {
        let EventParam::Owned(payload) = event.params else {
            return;
        };
        let Ok(app_event) = payload.downcast::<AppEvent>() else {
            return;
        };
        let app_event = *app_event;
        let mut callback = self.callback.lock();
        if let Some(callback) = callback.as_mut() {
            callback(app_event);
        }
        // `app_event` is dropped here either way, which is the dispatcher's
        // always-deallocate guarantee even with no callback registered.
    }
}

/// Owns the Application Looper (§4.1, §4.7) and the currently registered
/// application callback. Cheap to clone: every clone posts to the same
/// Looper and shares the same callback slot.
#[derive(Clone)]
pub struct ApplicationDispatcher {
    looper: LooperHandle,
    callback: Arc<Mutex<Option<Callback>>>,
}

impl ApplicationDispatcher {
    /// Spawn the Application Looper with capacity `capacity`
    /// (`MaxAsyncQueueElements`).
    pub fn spawn(capacity: usize) -> (Self, JoinHandle<()>) {
        let callback: Arc<Mutex<Option<Callback>>> = Arc::new(Mutex::new(None));
        let (looper, join) = Looper::spawn(
            "application",
            capacity,
            DispatchHandler { callback: callback.clone() },
        );
        (Self { looper, callback }, join)
    }

    /// Register the callback the application receives every [`AppEvent`]
    /// through. Replaces whatever callback was registered before.
    pub fn set_callback(&self, callback: impl FnMut(AppEvent) + Send + 'static) {
        *self.callback.lock() = Some(Box::new(callback));
    }

    /// Post an event at normal priority.
    pub fn post(&self, event: AppEvent, mode: PostMode) -> Result<(), LooperError> {
        self.looper.post(Event::new(0, 0).with_owned(Box::new(event)), mode)
    }

    /// Post an event ahead of everything already queued (§5: "session
    /// inactivated" notifications must precede any publish-response
    /// notification for the same session).
    pub fn post_as_next(&self, event: AppEvent, mode: PostMode) -> Result<(), LooperError> {
        self.looper.post_as_next(Event::new(0, 0).with_owned(Box::new(event)), mode)
    }

    /// Signal the Application Looper's worker to stop once its queue drains.
    pub fn close(&self) {
        self.looper.close();
    }
}
