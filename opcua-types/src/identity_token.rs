// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0

//! User identity token variants (OPC UA Part 4 §7.35-7.38) and the
//! per-endpoint policy catalog entries that govern which are accepted.

use crate::{ByteString, UAString};

/// The four user-token variants recognized by the session layer (§4.4/C3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserIdentityToken {
    /// No credentials presented.
    Anonymous(AnonymousIdentityToken),
    /// Username + password, plaintext or encrypted depending on policy.
    UserName(UserNameIdentityToken),
    /// An X509 certificate, proven via signature rather than a shared secret.
    X509(X509IdentityToken),
    /// An opaque, server-issued token (e.g. a JWT), plaintext or encrypted.
    Issued(IssuedIdentityToken),
}

impl UserIdentityToken {
    /// The `PolicyId` this token claims to satisfy.
    pub fn policy_id(&self) -> &str {
        match self {
            UserIdentityToken::Anonymous(t) => t.policy_id.as_ref(),
            UserIdentityToken::UserName(t) => t.policy_id.as_ref(),
            UserIdentityToken::X509(t) => t.policy_id.as_ref(),
            UserIdentityToken::Issued(t) => t.policy_id.as_ref(),
        }
    }
}

/// An anonymous identity token: just the policy it was issued under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnonymousIdentityToken {
    /// PolicyId this anonymous token claims, e.g. `"anonymous"`.
    pub policy_id: UAString,
}

/// A username/password identity token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserNameIdentityToken {
    /// PolicyId this token claims.
    pub policy_id: UAString,
    /// The username, always plaintext.
    pub user_name: UAString,
    /// The password, plaintext under `SecurityPolicy::None` or the encrypted
    /// `[len ∥ password ∥ server_nonce]` payload otherwise (§4.3/§6).
    pub password: ByteString,
    /// Encryption algorithm URI for `password`; empty when plaintext.
    pub encryption_algorithm: UAString,
}

/// An X509 certificate identity token, authenticated by signature rather than secret.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct X509IdentityToken {
    /// PolicyId this token claims.
    pub policy_id: UAString,
    /// DER-encoded certificate.
    pub certificate_data: ByteString,
}

/// An opaque, server-issued identity token (e.g. a JWT or Kerberos ticket).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedIdentityToken {
    /// PolicyId this token claims.
    pub policy_id: UAString,
    /// The opaque token data, plaintext or encrypted per `encryption_algorithm`.
    pub token_data: ByteString,
    /// Encryption algorithm URI for `token_data`; empty when plaintext.
    pub encryption_algorithm: UAString,
}

/// The wire tag for a user-token variant, independent of its contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UserTokenType {
    /// Anonymous.
    Anonymous,
    /// Username/password.
    UserName,
    /// X509 certificate.
    Certificate,
    /// Issued token.
    IssuedToken,
}

/// One entry in an endpoint's advertised user-token-policy catalog (§2.1 ADDED).
///
/// `ActivateSession` is rejected with `BadIdentityTokenInvalid` unless the presented
/// token's `PolicyId` matches one of these and its type/algorithm line up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserTokenPolicy {
    /// The policy id a client selects in its identity token.
    pub policy_id: String,
    /// The token type this policy accepts.
    pub token_type: UserTokenType,
    /// Security policy URI to use for token-level cryptography; empty means
    /// "use the secure channel's policy".
    pub security_policy_uri: String,
}

impl UserTokenPolicy {
    /// The always-present anonymous policy most endpoints advertise.
    pub fn anonymous(policy_id: impl Into<String>) -> Self {
        Self {
            policy_id: policy_id.into(),
            token_type: UserTokenType::Anonymous,
            security_policy_uri: String::new(),
        }
    }
}
