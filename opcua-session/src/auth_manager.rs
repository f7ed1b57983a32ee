// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0

//! The Authentication Manager collaborator (§6, §4.4 step 4): validates a
//! presented [`opcua_types::UserIdentityToken`] and maps the outcome onto the
//! fixed `{Ok, InvalidToken, RejectedToken, AccessDenied, SignatureInvalid}`
//! taxonomy.

use std::fmt::Debug;

use async_trait::async_trait;

use opcua_types::{Error, StatusCode, UserTokenPolicy};

/// Debug-safe wrapper around a password: the `Debug` impl never prints the
/// contents, so accidentally logging a credential is a compile-time-visible
/// mistake rather than a silent leak.
#[derive(Clone, PartialEq, Eq)]
pub struct Password(String);

impl Debug for Password {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Password").field(&"****").finish()
    }
}

impl Password {
    /// Wrap a plaintext password.
    pub fn new(password: String) -> Self {
        Self(password)
    }

    /// Borrow the plaintext. Callers must not log this.
    pub fn get(&self) -> &str {
        &self.0
    }
}

/// A unique identifier for a user, distinct from a session: one user may own
/// several concurrent sessions.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UserToken(pub String);

impl UserToken {
    /// The shared identity every anonymous activation resolves to (§4.4:
    /// "the PolicyId is not re-checked for Anonymous").
    pub const ANONYMOUS: &'static str = "anonymous";

    /// `true` for the anonymous identity.
    pub fn is_anonymous(&self) -> bool {
        self.0 == Self::ANONYMOUS
    }
}

/// The outcome taxonomy an [`AuthManager`] maps its internal decision onto
/// (§4.4 step 4, §6 `is_valid_user_identity`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthOutcome {
    /// Accepted.
    Ok,
    /// The token failed structural validation.
    InvalidToken,
    /// The token was well-formed but this manager rejects it outright.
    RejectedToken,
    /// The identity is known but access is denied.
    AccessDenied,
    /// A required signature did not verify.
    SignatureInvalid,
}

impl AuthOutcome {
    /// Map onto the wire [`StatusCode`] an `ActivateSessionResponse` carries
    /// (§4.4 step 4's closed mapping).
    pub fn to_status_code(self) -> StatusCode {
        match self {
            AuthOutcome::Ok => StatusCode::Good,
            AuthOutcome::InvalidToken => StatusCode::BadIdentityTokenInvalid,
            AuthOutcome::RejectedToken => StatusCode::BadIdentityTokenRejected,
            AuthOutcome::AccessDenied => StatusCode::BadUserAccessDenied,
            AuthOutcome::SignatureInvalid => StatusCode::BadUserSignatureInvalid,
        }
    }
}

/// Lets an application control who may activate a session. Two clients that
/// resolve to the same [`UserToken`] are considered the same user.
///
/// Only the token-validating methods are async, since the session layer
/// never awaits anything else while deciding access.
#[async_trait]
pub trait AuthManager: Send + Sync + 'static {
    /// Validate an anonymous activation. Does not return a token: all
    /// anonymous users share [`UserToken::ANONYMOUS`].
    async fn authenticate_anonymous(&self) -> Result<(), Error> {
        Err(Error::new(
            StatusCode::BadIdentityTokenRejected,
            "anonymous identity token unsupported",
        ))
    }

    /// Validate a username/password pair, already decrypted if it arrived
    /// encrypted (§4.4 step 2 has already run by the time this is called).
    async fn authenticate_username(
        &self,
        username: &str,
        password: &Password,
    ) -> Result<UserToken, Error> {
        let _ = (username, password);
        Err(Error::new(
            StatusCode::BadIdentityTokenRejected,
            "username identity token unsupported",
        ))
    }

    /// Validate an X509 identity token whose signature has already verified
    /// (§4.4 step 3 has already run).
    async fn authenticate_x509(&self, certificate_thumbprint: &[u8]) -> Result<UserToken, Error> {
        let _ = certificate_thumbprint;
        Err(Error::new(
            StatusCode::BadIdentityTokenRejected,
            "x509 identity token unsupported",
        ))
    }

    /// Validate an opaque issued token, already decrypted if applicable.
    async fn authenticate_issued(&self, token_data: &[u8]) -> Result<UserToken, Error> {
        let _ = token_data;
        Err(Error::new(
            StatusCode::BadIdentityTokenRejected,
            "issued identity token unsupported",
        ))
    }

    /// The user-token policies this manager accepts, advertised on
    /// `CreateSessionResponse::server_endpoints` (§2.1's per-endpoint catalog).
    fn user_token_policies(&self) -> Vec<UserTokenPolicy>;
}

/// An in-memory `AuthManager` for tests and simple deployments: one fixed
/// anonymous identity, plus a static username/password table.
pub struct StaticAuthManager {
    users: Vec<(String, String)>,
    allow_anonymous: bool,
}

impl StaticAuthManager {
    /// An authenticator that accepts only anonymous activations.
    pub fn anonymous_only() -> Self {
        Self {
            users: Vec::new(),
            allow_anonymous: true,
        }
    }

    /// An authenticator backed by a fixed username/password table.
    pub fn with_users(users: Vec<(String, String)>) -> Self {
        Self {
            users,
            allow_anonymous: false,
        }
    }
}

#[async_trait]
impl AuthManager for StaticAuthManager {
    async fn authenticate_anonymous(&self) -> Result<(), Error> {
        if self.allow_anonymous {
            Ok(())
        } else {
            Err(Error::new(
                StatusCode::BadIdentityTokenRejected,
                "this endpoint does not support anonymous authentication",
            ))
        }
    }

    async fn authenticate_username(
        &self,
        username: &str,
        password: &Password,
    ) -> Result<UserToken, Error> {
        let matched = self
            .users
            .iter()
            .any(|(u, p)| u == username && p.as_str() == password.get());
        if matched {
            Ok(UserToken(username.to_string()))
        } else {
            log::warn!("authentication failed for user \"{username}\"");
            Err(Error::new(
                StatusCode::BadIdentityTokenRejected,
                format!("cannot authenticate \"{username}\""),
            ))
        }
    }

    fn user_token_policies(&self) -> Vec<UserTokenPolicy> {
        let mut policies = Vec::with_capacity(2);
        if self.allow_anonymous {
            policies.push(UserTokenPolicy::anonymous("anonymous"));
        }
        if !self.users.is_empty() {
            policies.push(UserTokenPolicy {
                policy_id: "username_basic256sha256".to_string(),
                token_type: opcua_types::UserTokenType::UserName,
                security_policy_uri: opcua_crypto::SecurityPolicy::Basic256Sha256.to_uri().to_string(),
            });
        }
        policies
    }
}
