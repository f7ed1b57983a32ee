// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0

//! The Session service set messages (OPC UA Part 4 §5.6) the session layer
//! consumes and produces, plus their small supporting types.

use crate::{ByteString, MessageSecurityMode, SignatureData, StatusCode, UAString, UserTokenPolicy};

/// Common header carried on every request.
#[derive(Debug, Clone, Default)]
pub struct RequestHeader {
    /// The authentication token identifying the session the request is for;
    /// null on `CreateSessionRequest`, which has no session yet.
    pub authentication_token: crate::NodeId,
}

impl RequestHeader {
    /// Build a request header for an established session.
    pub fn for_session(authentication_token: crate::NodeId) -> Self {
        Self {
            authentication_token,
        }
    }
}

/// Common header carried on every response.
#[derive(Debug, Clone)]
pub struct ResponseHeader {
    /// Overall service result; `Good` unless the operation failed end-to-end.
    pub service_result: StatusCode,
}

impl ResponseHeader {
    /// A response header reporting success.
    pub fn good() -> Self {
        Self {
            service_result: StatusCode::Good,
        }
    }

    /// A response header reporting the given failure.
    pub fn bad(status: StatusCode) -> Self {
        Self {
            service_result: status,
        }
    }
}

/// The kind of OPC UA application (client, server, or both).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplicationType {
    /// A server application.
    Server,
    /// A client application.
    Client,
    /// Both client and server.
    ClientAndServer,
    /// A discovery server.
    DiscoveryServer,
}

/// A human-readable piece of text tagged with a locale, e.g. `en-US`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalizedText {
    /// BCP-47 locale tag; empty if unspecified.
    pub locale: UAString,
    /// The text itself.
    pub text: UAString,
}

impl LocalizedText {
    /// Construct a localized text value.
    pub fn new(locale: &str, text: &str) -> Self {
        Self {
            locale: locale.into(),
            text: text.into(),
        }
    }
}

/// Identifies an application: used both as `ClientDescription` on
/// `CreateSessionRequest` and to describe a server in `GetEndpoints` responses.
#[derive(Debug, Clone)]
pub struct ApplicationDescription {
    /// The application instance URI; must match the client certificate's SAN URI
    /// when non-empty (§4.3 edge case).
    pub application_uri: UAString,
    /// Human-readable product URI.
    pub product_uri: UAString,
    /// Human-readable application name.
    pub application_name: LocalizedText,
    /// The application type.
    pub application_type: ApplicationType,
    /// Discovery URLs this application can be reached at.
    pub discovery_urls: Vec<UAString>,
}

/// Describes one endpoint: its URL, security settings, and accepted user-token policies.
#[derive(Debug, Clone)]
pub struct EndpointDescription {
    /// The endpoint URL clients connect to.
    pub endpoint_url: UAString,
    /// The server application this endpoint belongs to.
    pub server: Option<ApplicationDescription>,
    /// The server's application instance certificate, DER-encoded; empty under
    /// `SecurityPolicy::None`.
    pub server_certificate: ByteString,
    /// Security mode for the secure channel.
    pub security_mode: MessageSecurityMode,
    /// Security policy URI for the secure channel (not necessarily the user-token policy).
    pub security_policy_uri: String,
    /// User-token policies this endpoint accepts (§2.1 ADDED catalog).
    pub user_identity_tokens: Vec<UserTokenPolicy>,
    /// The binary transport profile URI this endpoint uses.
    pub transport_profile_uri: String,
    /// Relative priority among endpoints with otherwise identical settings, 0-255.
    pub security_level: u8,
}

/// `CreateSessionRequest` (Part 4 §5.6.2).
#[derive(Debug, Clone)]
pub struct CreateSessionRequest {
    /// Common request header. `CreateSession` is the one request with no prior session,
    /// so its `authentication_token` is always null.
    pub request_header: RequestHeader,
    /// Identifies the requesting client application.
    pub client_description: ApplicationDescription,
    /// The endpoint URL the client believes it connected to.
    pub endpoint_url: UAString,
    /// Client-chosen human-readable session name.
    pub session_name: UAString,
    /// Fresh random value the client generated for this handshake; must be
    /// ≥ `NonceLength` bytes under a non-`None` security policy (§4.3).
    pub client_nonce: ByteString,
    /// The client's application instance certificate, DER-encoded.
    pub client_certificate: ByteString,
    /// Requested inactivity timeout in milliseconds; the server clamps this (§4.6).
    pub requested_session_timeout: f64,
    /// Maximum size in bytes the client will accept for a single response message.
    pub max_response_message_size: u32,
}

/// `CreateSessionResponse`.
#[derive(Debug, Clone)]
pub struct CreateSessionResponse {
    /// Common response header.
    pub response_header: ResponseHeader,
    /// The session id assigned by the server.
    pub session_id: crate::NodeId,
    /// The authentication token the client must echo on every subsequent request
    /// for this session.
    pub authentication_token: crate::NodeId,
    /// The timeout actually in force, after server-side clamping (§4.6).
    pub revised_session_timeout: f64,
    /// Fresh server nonce; must be consumed by the client's `ActivateSessionRequest`
    /// signature, and is cleared server-side the instant that activation completes or
    /// fails (invariant 2).
    pub server_nonce: ByteString,
    /// The server's application instance certificate, DER-encoded; empty under
    /// `SecurityPolicy::None`.
    pub server_certificate: ByteString,
    /// Endpoints the server offers for this URL, re-sent here so the client can
    /// detect a man-in-the-middle substitution of `GetEndpoints`.
    pub server_endpoints: Vec<EndpointDescription>,
    /// Signature over `client_certificate ∥ client_nonce`, proving the server holds
    /// the private key for `server_certificate`.
    pub server_signature: SignatureData,
    /// Maximum request message size the server will accept.
    pub max_request_message_size: u32,
}

/// `ActivateSessionRequest`.
#[derive(Debug, Clone)]
pub struct ActivateSessionRequest {
    /// Common request header, carrying the authentication token of the session
    /// being (re)activated.
    pub request_header: RequestHeader,
    /// Signature over `server_certificate ∥ server_nonce` from the prior
    /// `CreateSessionResponse`/activation, proving the client holds its private key.
    pub client_signature: SignatureData,
    /// Locales the client prefers for any localized text in subsequent responses.
    pub locale_ids: Vec<String>,
    /// The user identity being bound (or rebound) to the session.
    pub user_identity_token: UserIdentityToken,
    /// Signature over the user identity token, required for X509 user tokens.
    pub user_token_signature: SignatureData,
}

/// `ActivateSessionResponse`.
#[derive(Debug, Clone)]
pub struct ActivateSessionResponse {
    /// Common response header.
    pub response_header: ResponseHeader,
    /// Fresh server nonce for the *next* activation (invariant 2: the one just
    /// consumed is cleared the instant this response is built).
    pub server_nonce: ByteString,
}

/// `CloseSessionRequest`.
#[derive(Debug, Clone)]
pub struct CloseSessionRequest {
    /// Common request header.
    pub request_header: RequestHeader,
    /// Whether the server should also tear down this session's subscriptions.
    pub delete_subscriptions: bool,
}

/// `CloseSessionResponse`.
#[derive(Debug, Clone)]
pub struct CloseSessionResponse {
    /// Common response header.
    pub response_header: ResponseHeader,
}
