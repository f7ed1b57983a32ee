// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0

//! The Session Table (C4, §4.5): fixed-capacity twin arrays indexed by
//! [`SessionId`], plus the per-id records each side of the session layer
//! keeps. Structurally owned by whatever runs on the Services Looper
//! (§9: "hide them behind a `SessionTable` handle owned by the Services
//! Looper; cross-Looper access is structurally impossible rather than
//! merely discouraged").

use std::time::Instant;

use opcua_crypto::{SecureBytes, SecurityPolicy, X509};
use opcua_types::{ApplicationDescription, NodeId, UAString, UserIdentityToken};

use crate::auth_manager::UserToken;

/// A small positive integer in `[1, MaxSessions]`. `0` is reserved to mean
/// "no session" and is never a valid, active id (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u32);

impl SessionId {
    /// The reserved "no session" value.
    pub const NONE: SessionId = SessionId(0);

    fn new(value: u32) -> Self {
        Self(value)
    }

    /// The underlying integer value.
    pub fn value(self) -> u32 {
        self.0
    }

    /// `true` for [`SessionId::NONE`].
    pub fn is_none(self) -> bool {
        self.0 == 0
    }
}

/// Session state per §4.3's transition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Slot is free.
    Init,
    /// `CreateSessionRequest` is being processed.
    Creating,
    /// Created, awaiting the first `ActivateSessionRequest`.
    Created,
    /// An `ActivateSessionRequest` is being processed.
    UserActivating,
    /// Activated on a new Secure Channel, about to finish re-binding.
    ScActivating,
    /// The bound Secure Channel was lost; awaiting reactivation or timeout.
    ScOrphaned,
    /// A user identity is bound and the session is live.
    UserActivated,
    /// `CloseSessionRequest` is being processed.
    Closing,
    /// Terminal: the slot is free again once observed in this state.
    Closed,
}

/// Server-side per-id record (§3 `ServerSessionRecord`).
#[derive(Debug)]
pub struct ServerSessionRecord {
    state: SessionState,
    /// Opaque, server-assigned authentication token; empty (`NodeId::null`)
    /// until `CreateSession` succeeds, cleared on close (invariant 1).
    pub auth_token: NodeId,
    /// 32-byte nonce regenerated on create and on every reactivation;
    /// cleared immediately after the activation that consumes it.
    pub server_nonce: SecureBytes,
    /// Scratch storage for the outgoing server signature; cleared once sent.
    pub signature_buffer: SecureBytes,
    /// The bound user identity; `None` except in `UserActivated` (invariant 3).
    pub user: Option<UserToken>,
    /// Negotiated inactivity timeout, clamped into
    /// `[MinSessionTimeoutMs, MaxSessionTimeoutMs]`.
    pub revised_session_timeout_ms: u32,
    /// Monotonic timestamp of the last inbound session message (§4.6).
    pub last_msg_received_at: Instant,
    /// The secure channel id this session currently believes it is bound to
    /// (ADDED, §2.1): used for the mismatch checks on activate/close.
    pub secure_channel_id: u32,
    /// The client's application instance certificate, if the secure channel
    /// policy required one.
    pub client_certificate: Option<X509>,
    /// The session name the client chose on `CreateSession`.
    pub session_name: UAString,
    /// The client application description from `CreateSession`.
    pub client_description: Option<ApplicationDescription>,
}

impl ServerSessionRecord {
    fn free(now: Instant) -> Self {
        Self {
            state: SessionState::Init,
            auth_token: NodeId::null(),
            server_nonce: SecureBytes::empty(),
            signature_buffer: SecureBytes::empty(),
            user: None,
            revised_session_timeout_ms: 0,
            last_msg_received_at: now,
            secure_channel_id: 0,
            client_certificate: None,
            session_name: UAString::null(),
            client_description: None,
        }
    }

    /// `true` iff the slot is currently unoccupied (invariant 1: active ⇔
    /// `auth_token` non-empty).
    pub fn is_free(&self) -> bool {
        matches!(self.state, SessionState::Init | SessionState::Closed) && self.auth_token.is_null()
    }

    /// The record's current state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Drive a state transition. Restricted to the crate: the state machine
    /// module is the only code allowed to move a record between states.
    pub(crate) fn set_state(&mut self, state: SessionState) {
        self.state = state;
    }

    /// Deadline at which the inactivity timer should next fire, given the
    /// last recorded message (§4.6).
    pub fn deadline(&self) -> Instant {
        self.last_msg_received_at + std::time::Duration::from_millis(self.revised_session_timeout_ms as u64)
    }
}

/// Client-side per-id record (§3 `ClientSessionRecord`).
#[derive(Debug)]
pub struct ClientSessionRecord {
    state: SessionState,
    /// Authentication token returned by the server (owned copy).
    pub auth_token: NodeId,
    /// Server-side nonce for the pending cryptographic challenge.
    pub server_nonce: SecureBytes,
    /// Client-generated nonce for the pending cryptographic challenge.
    pub client_nonce: SecureBytes,
    /// Scratch for the outgoing client signature.
    pub signature_buffer: SecureBytes,
    /// The current user-identity token this client activates with.
    pub user_token: Option<UserIdentityToken>,
    /// Security policy chosen for user-token cryptography; may differ from
    /// the secure channel's own policy.
    pub user_security_policy: SecurityPolicy,
    /// Owned copy of the server certificate from the `CreateSessionResponse`
    /// (Open Question 3, §9: explicit owned copy, not a borrow).
    pub user_server_certificate: Option<X509>,
    /// Application-chosen opaque context value.
    pub app_context: u64,
    /// User-provided human-readable session name, sent as
    /// `CreateSessionRequest::session_name`.
    pub session_name: UAString,
}

impl ClientSessionRecord {
    fn free() -> Self {
        Self {
            state: SessionState::Init,
            auth_token: NodeId::null(),
            server_nonce: SecureBytes::empty(),
            client_nonce: SecureBytes::empty(),
            signature_buffer: SecureBytes::empty(),
            user_token: None,
            user_security_policy: SecurityPolicy::None,
            user_server_certificate: None,
            app_context: 0,
            session_name: UAString::null(),
        }
    }

    /// The record's current state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Drive a state transition. Restricted to the crate: the client-side
    /// state machine is the only code allowed to move a record between states.
    pub(crate) fn set_state(&mut self, state: SessionState) {
        self.state = state;
    }
}

/// Fixed-capacity twin-array session table (§4.5). Slot allocation walks the
/// array top-down so ids spread out rather than clustering at the low end.
pub struct SessionTable {
    server_records: Vec<ServerSessionRecord>,
    client_records: Vec<ClientSessionRecord>,
    max_sessions: usize,
}

impl SessionTable {
    /// Build an empty table sized for up to `max_sessions` concurrent
    /// sessions (`MaxSessions`, §6).
    pub fn new(max_sessions: usize) -> Self {
        let now = Instant::now();
        Self {
            server_records: (0..max_sessions).map(|_| ServerSessionRecord::free(now)).collect(),
            client_records: (0..max_sessions).map(|_| ClientSessionRecord::free()).collect(),
            max_sessions,
        }
    }

    /// Capacity this table was built with.
    pub fn capacity(&self) -> usize {
        self.max_sessions
    }

    /// Number of currently occupied server-side slots.
    pub fn server_len(&self) -> usize {
        self.server_records.iter().filter(|r| !r.is_free()).count()
    }

    /// Reserve the first free slot, walking top-down (§4.5), and initialize
    /// it to `Creating`. Returns `None` if the table is at `MaxSessions`
    /// (`BadTooManySessions`, §7).
    pub fn reserve_server_slot(&mut self) -> Option<SessionId> {
        for idx in (0..self.max_sessions).rev() {
            if self.server_records[idx].is_free() {
                self.server_records[idx].state = SessionState::Creating;
                return Some(SessionId::new((idx + 1) as u32));
            }
        }
        None
    }

    /// Borrow the server record for `id`.
    pub fn server_record(&self, id: SessionId) -> Option<&ServerSessionRecord> {
        self.server_records.get(id.value().checked_sub(1)? as usize)
    }

    /// Mutably borrow the server record for `id`.
    pub fn server_record_mut(&mut self, id: SessionId) -> Option<&mut ServerSessionRecord> {
        self.server_records.get_mut(id.value().checked_sub(1)? as usize)
    }

    /// `session_from_token` (§4.5): O(MaxSessions) scan comparing
    /// authentication tokens by structural equality. Acceptable because
    /// `MaxSessions` defaults to 20 and is bounded by `INT32_MAX` (§6).
    pub fn find_by_token(&self, authentication_token: &NodeId) -> Option<SessionId> {
        self.server_records
            .iter()
            .enumerate()
            .find(|(_, r)| !r.is_free() && &r.auth_token == authentication_token)
            .map(|(idx, _)| SessionId::new((idx + 1) as u32))
    }

    /// Free a server slot back to `Init`/`Closed`, clearing every owned
    /// buffer (§3 invariant 7).
    pub fn free_server_slot(&mut self, id: SessionId) {
        if let Some(record) = self.server_record_mut(id) {
            record.server_nonce.clear();
            record.signature_buffer.clear();
            *record = ServerSessionRecord::free(Instant::now());
        }
    }

    /// All currently occupied server-side session ids.
    pub fn active_server_sessions(&self) -> Vec<SessionId> {
        self.server_records
            .iter()
            .enumerate()
            .filter(|(_, r)| !r.is_free())
            .map(|(idx, _)| SessionId::new((idx + 1) as u32))
            .collect()
    }

    /// Reserve the first free client-side slot.
    pub fn reserve_client_slot(&mut self) -> Option<SessionId> {
        for idx in 0..self.max_sessions {
            if self.client_records[idx].state == SessionState::Init {
                self.client_records[idx].state = SessionState::Creating;
                return Some(SessionId::new((idx + 1) as u32));
            }
        }
        None
    }

    /// Borrow the client record for `id`.
    pub fn client_record(&self, id: SessionId) -> Option<&ClientSessionRecord> {
        self.client_records.get(id.value().checked_sub(1)? as usize)
    }

    /// Mutably borrow the client record for `id`.
    pub fn client_record_mut(&mut self, id: SessionId) -> Option<&mut ClientSessionRecord> {
        self.client_records.get_mut(id.value().checked_sub(1)? as usize)
    }

    /// Free a client slot, clearing every owned buffer.
    pub fn free_client_slot(&mut self, id: SessionId) {
        if let Some(record) = self.client_record_mut(id) {
            record.server_nonce.clear();
            record.client_nonce.clear();
            record.signature_buffer.clear();
            *record = ClientSessionRecord::free();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserve_walks_top_down() {
        let mut table = SessionTable::new(3);
        let first = table.reserve_server_slot().unwrap();
        assert_eq!(first.value(), 3);
        let second = table.reserve_server_slot().unwrap();
        assert_eq!(second.value(), 2);
    }

    #[test]
    fn table_at_capacity_refuses_further_reservations() {
        let mut table = SessionTable::new(1);
        assert!(table.reserve_server_slot().is_some());
        assert!(table.reserve_server_slot().is_none());
    }

    #[test]
    fn find_by_token_scans_occupied_slots() {
        let mut table = SessionTable::new(2);
        let id = table.reserve_server_slot().unwrap();
        let token = NodeId::new(0, 42);
        table.server_record_mut(id).unwrap().auth_token = token.clone();
        table.server_record_mut(id).unwrap().state = SessionState::Created;

        assert_eq!(table.find_by_token(&token), Some(id));
        assert_eq!(table.find_by_token(&NodeId::new(0, 43)), None);
    }

    #[test]
    fn freeing_a_slot_clears_its_nonce_and_makes_it_reusable() {
        let mut table = SessionTable::new(1);
        let id = table.reserve_server_slot().unwrap();
        table.server_record_mut(id).unwrap().server_nonce = SecureBytes::new(vec![1; 32]);
        table.server_record_mut(id).unwrap().auth_token = NodeId::new(0, 7);

        table.free_server_slot(id);

        assert!(table.reserve_server_slot().is_some());
    }
}
