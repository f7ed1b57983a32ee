// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0

//! The wire-visible `StatusCode` taxonomy consumed/produced by the session layer.
//!
//! This is not the full ~700-entry OPC UA status code table (that belongs to the
//! address-space/codec layers, out of scope here); it is the closed
//! set §7 names plus `Good`.

use std::fmt;

/// A status code as carried on response headers and application notifications.
///
/// Every variant here maps 1-to-1 either to a wire `StatusCode` (server to client)
/// or to an internal-only kind (application notifications); see §7's "Propagation
/// policy" and `opcua-session`'s services-bridge error-mapping table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "json", derive(serde::Serialize, serde::Deserialize))]
pub enum StatusCode {
    /// Operation succeeded.
    Good,
    /// ClientNonce was shorter than the policy's required nonce length.
    BadNonceInvalid,
    /// ApplicationUri did not match the client certificate's Subject Alternative Name.
    BadCertificateUriInvalid,
    /// Generic protocol-level failure with no more specific code.
    BadUnexpectedError,
    /// A request carried parameters that are individually well-formed but jointly invalid,
    /// e.g. a plaintext user-name token sent under `SecurityPolicy::None`.
    BadInvalidParameters,
    /// The identity token could not be decoded or failed basic structural validation.
    BadIdentityTokenInvalid,
    /// The identity token was well-formed but rejected by the Authentication Manager.
    BadIdentityTokenRejected,
    /// The Authentication Manager denied access to an otherwise-valid identity.
    BadUserAccessDenied,
    /// The user-token signature did not verify.
    BadUserSignatureInvalid,
    /// Communication with the peer failed below the session layer.
    BadCommunicationError,
    /// The secure channel the session depended on has closed.
    BadSecureChannelClosed,
    /// The secure channel id presented does not match the one the session was created on.
    BadSecureChannelIdInvalid,
    /// Out of memory / resource exhaustion.
    BadOutOfMemory,
    /// An event queue was at capacity (`MaxAsyncQueueElements`).
    BadQueueFull,
    /// The inactivity timer elapsed before any further session message arrived.
    BadSessionIdExpired,
    /// A request timed out before a response arrived (`RequestTimeoutMs`).
    BadRequestTimeout,
    /// No session exists for the authentication token presented.
    BadSessionIdInvalid,
    /// The endpoint named by `CreateSessionRequest::endpoint_url` does not exist.
    BadTcpEndpointUrlInvalid,
    /// `MaxSessions` live sessions already exist.
    BadTooManySessions,
    /// The request or secure channel is being closed; any queued work should be abandoned.
    BadClosed,
}

impl StatusCode {
    /// `true` for [`StatusCode::Good`].
    pub fn is_good(self) -> bool {
        matches!(self, StatusCode::Good)
    }

    /// `true` for anything other than [`StatusCode::Good`].
    pub fn is_bad(self) -> bool {
        !self.is_good()
    }
}

impl Default for StatusCode {
    fn default() -> Self {
        StatusCode::Good
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}
