// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0

//! The Session State Machine (C5, §4.3): server-side `CreateSession` /
//! `ActivateSession` / `CloseSession` handling and the timeout sweep, built
//! on the [`SessionTable`](crate::session_table::SessionTable).

use std::sync::Arc;
use std::time::Instant;

use opcua_crypto::{CertificateStore, CryptoProvider, PrivateKey, SecurityPolicy, X509};
use opcua_types::{
    ActivateSessionResponse, CreateSessionRequest, CreateSessionResponse, CloseSessionRequest,
    CloseSessionResponse, ActivateSessionRequest, EndpointDescription, Error, NodeId,
    ResponseHeader, SignatureData, StatusCode, UaResult, UserIdentityToken, UserTokenPolicy,
};

use crate::auth_manager::{AuthManager, AuthOutcome, Password, UserToken};
use crate::limits::SessionLimits;
use crate::session_table::{SessionId, SessionState, SessionTable};
use crate::user_token;

/// `session:N ...` logging, matching the client-side
/// `session_warn!`/`session_trace!` family.
macro_rules! session_warn {
    ($id:expr, $($arg:tt)*) => {
        log::warn!("session:{} {}", $id.value(), format!($($arg)*));
    };
}
macro_rules! session_info {
    ($id:expr, $($arg:tt)*) => {
        log::info!("session:{} {}", $id.value(), format!($($arg)*));
    };
}
macro_rules! session_error {
    ($id:expr, $($arg:tt)*) => {
        log::error!("session:{} {}", $id.value(), format!($($arg)*));
    };
}

/// Everything the server-side state machine needs about its own
/// application-instance identity and the endpoint being served.
pub struct ServerIdentity {
    /// This server's application instance certificate, `None` under
    /// `SecurityPolicy::None`.
    pub certificate: Option<X509>,
    /// This server's private key, paired with `certificate`.
    pub private_key: Option<PrivateKey>,
    /// Endpoints offered for the URL sessions are created against.
    pub endpoints: Vec<EndpointDescription>,
}

/// Owns the [`SessionTable`] and drives the server-side transitions in
/// §4.3's table. One instance runs per Services Looper (§5).
pub struct ServerSessionManager<A: AuthManager> {
    table: SessionTable,
    limits: SessionLimits,
    auth: Arc<A>,
    identity: ServerIdentity,
    certificate_store: Arc<parking_lot::RwLock<CertificateStore>>,
}

impl<A: AuthManager> ServerSessionManager<A> {
    /// Construct a manager sized for `limits.max_sessions` concurrent
    /// sessions.
    pub fn new(
        limits: SessionLimits,
        auth: Arc<A>,
        identity: ServerIdentity,
        certificate_store: Arc<parking_lot::RwLock<CertificateStore>>,
    ) -> Self {
        Self {
            table: SessionTable::new(limits.max_sessions as usize),
            limits,
            auth,
            identity,
            certificate_store,
        }
    }

    /// Number of currently live sessions.
    pub fn session_count(&self) -> usize {
        self.table.server_len()
    }

    /// `init → creating → created` (§4.3). Validates the client nonce
    /// length, the client certificate (if the channel is secured), and the
    /// application-URI/SAN-URI match, then mints an authentication token and
    /// a fresh server nonce.
    pub fn create_session(
        &mut self,
        security_policy: SecurityPolicy,
        secure_channel_id: u32,
        request: &CreateSessionRequest,
    ) -> UaResult<CreateSessionResponse> {
        if self.table.server_len() >= self.limits.max_sessions as usize {
            return Err(StatusCode::BadTooManySessions);
        }
        if request.endpoint_url.is_null() || request.endpoint_url.is_empty() {
            session_error!(SessionId::NONE, "CreateSession with a null endpoint url");
            return Err(StatusCode::BadTcpEndpointUrlInvalid);
        }

        let crypto = CryptoProvider::new(security_policy);
        let nonce_length = crypto.symmetric_secure_channel_nonce_length();
        if security_policy != SecurityPolicy::None && request.client_nonce.len() < nonce_length {
            return Err(StatusCode::BadNonceInvalid);
        }

        let client_certificate = if security_policy != SecurityPolicy::None {
            let cert = X509::from_byte_string(&request.client_certificate).map_err(Error::from)?;
            self.certificate_store
                .read()
                .validate_or_reject_application_instance_cert(&cert)
                .map_err(Error::from)?;

            let application_uri = request.client_description.application_uri.as_ref();
            if !cert.matches_application_uri(application_uri) {
                return Err(StatusCode::BadCertificateUriInvalid);
            }
            Some(cert)
        } else {
            None
        };

        let Some(id) = self.table.reserve_server_slot() else {
            return Err(StatusCode::BadTooManySessions);
        };

        let server_nonce = crypto.random_nonce(nonce_length);
        let auth_token_value = crypto.random_id();
        let auth_token = if auth_token_value != 0 {
            NodeId::new(0, auth_token_value)
        } else {
            NodeId::new(0, id.value())
        };

        let server_signature = self.sign_create_session(&crypto, request, server_nonce.as_bytes());

        let revised_timeout_ms = self.limits.clamp_session_timeout(request.requested_session_timeout);

        {
            let record = self.table.server_record_mut(id).expect("just reserved");
            record.auth_token = auth_token.clone();
            record.server_nonce = server_nonce.clone();
            record.last_msg_received_at = Instant::now();
            record.revised_session_timeout_ms = revised_timeout_ms;
            record.secure_channel_id = secure_channel_id;
            record.client_certificate = client_certificate;
            record.session_name = request.session_name.clone();
            record.client_description = Some(request.client_description.clone());
        }
        self.set_state(id, SessionState::Created);

        session_info!(id, "created session");

        Ok(CreateSessionResponse {
            response_header: ResponseHeader::good(),
            session_id: NodeId::new(1, id.value()),
            authentication_token: auth_token,
            revised_session_timeout: revised_timeout_ms as f64,
            server_nonce: server_nonce.as_bytes().to_vec().into(),
            server_certificate: self
                .identity
                .certificate
                .as_ref()
                .map(|c| c.as_byte_string())
                .unwrap_or_default(),
            server_endpoints: self.identity.endpoints.clone(),
            server_signature,
            max_request_message_size: 0,
        })
    }

    fn sign_create_session(
        &self,
        crypto: &CryptoProvider,
        request: &CreateSessionRequest,
        server_nonce: &[u8],
    ) -> SignatureData {
        let Some(private_key) = self.identity.private_key.as_ref() else {
            return SignatureData::null();
        };
        if crypto.policy() == SecurityPolicy::None {
            return SignatureData::null();
        }
        let mut plaintext = request.client_certificate.as_ref().to_vec();
        plaintext.extend_from_slice(request.client_nonce.as_ref());
        match crypto.asymmetric_sign(&plaintext, private_key) {
            Ok(signature) => SignatureData {
                algorithm: crypto.sign_algorithm_uri().to_string(),
                signature: signature.into(),
            },
            Err(e) => {
                session_error!(SessionId::NONE, "failed to sign CreateSessionResponse: {e}");
                SignatureData::null()
            }
        }
    }

    /// `created → user_activating → user_activated`, or reactivation from
    /// `user_activated`/`sc_orphaned` (§4.3). Runs the full §4.4 user-token
    /// pipeline before binding the user.
    pub async fn activate_session(
        &mut self,
        security_policy: SecurityPolicy,
        secure_channel_id: u32,
        request: &ActivateSessionRequest,
    ) -> UaResult<ActivateSessionResponse> {
        let Some(id) = self.table.find_by_token(&request.request_header.authentication_token) else {
            return Err(StatusCode::BadSessionIdInvalid);
        };

        let crypto = CryptoProvider::new(security_policy);

        let (server_nonce, client_certificate) = {
            let record = self.table.server_record(id).expect("found by token");
            if record.server_nonce.is_empty() {
                return Err(StatusCode::BadSessionIdInvalid);
            }
            (record.server_nonce.as_bytes().to_vec(), record.client_certificate.clone())
        };

        if security_policy != SecurityPolicy::None {
            let Some(client_certificate) = client_certificate.as_ref() else {
                return Err(StatusCode::BadUserSignatureInvalid);
            };
            let server_cert_bytes = self
                .identity
                .certificate
                .as_ref()
                .map(|c| c.as_byte_string().into_vec())
                .unwrap_or_default();
            let mut plaintext = server_cert_bytes;
            plaintext.extend_from_slice(&server_nonce);
            let public_key = client_certificate.public_key().map_err(Error::from)?;
            crypto
                .asymmetric_verify(&plaintext, request.client_signature.signature.as_ref(), &public_key)
                .map_err(Error::from)?;
        }

        let was_reactivation_from_orphan = matches!(
            self.table.server_record(id).unwrap().state(),
            SessionState::ScOrphaned
        );

        let server_certificate_bytes = self
            .identity
            .certificate
            .as_ref()
            .map(|c| c.as_byte_string().into_vec())
            .unwrap_or_default();
        let outcome = self
            .authenticate_user_token(
                &request.user_identity_token,
                &server_nonce,
                &server_certificate_bytes,
                &request.user_token_signature,
                security_policy,
            )
            .await;

        if outcome != AuthOutcome::Ok {
            session_warn!(id, "activation rejected: {outcome:?}");
            return Err(outcome.to_status_code());
        }

        let user = self.resolve_user_token(&request.user_identity_token).await?;

        let record = self.table.server_record_mut(id).expect("found by token");
        record.server_nonce.clear();
        let fresh_nonce = crypto.random_nonce(crypto.symmetric_secure_channel_nonce_length());
        record.server_nonce = fresh_nonce.clone();
        record.user = Some(user);
        record.secure_channel_id = secure_channel_id;
        record.last_msg_received_at = Instant::now();
        self.set_state(id, SessionState::UserActivated);

        if was_reactivation_from_orphan {
            session_info!(id, "reactivated on a new secure channel");
        }

        Ok(ActivateSessionResponse {
            response_header: ResponseHeader::good(),
            server_nonce: fresh_nonce.as_bytes().to_vec().into(),
        })
    }

    async fn authenticate_user_token(
        &self,
        token: &UserIdentityToken,
        server_nonce: &[u8],
        server_certificate: &[u8],
        user_token_signature: &SignatureData,
        channel_security_policy: SecurityPolicy,
    ) -> AuthOutcome {
        let token = user_token::shallow_copy_identity(token);
        match self
            .validate_user_token(
                &token,
                server_nonce,
                server_certificate,
                user_token_signature,
                channel_security_policy,
            )
            .await
        {
            Ok(()) => AuthOutcome::Ok,
            Err(e) => match e.status {
                StatusCode::BadIdentityTokenInvalid => AuthOutcome::InvalidToken,
                StatusCode::BadIdentityTokenRejected => AuthOutcome::RejectedToken,
                StatusCode::BadUserAccessDenied => AuthOutcome::AccessDenied,
                StatusCode::BadUserSignatureInvalid => AuthOutcome::SignatureInvalid,
                _ => AuthOutcome::RejectedToken,
            },
        }
    }

    /// Checks the presented token's `PolicyId` against this server's
    /// configured catalog (§3 invariant: "the PolicyId of any user token
    /// presented on ActivateSession must name one of the server's configured
    /// user-token policies"). Anonymous tokens are exempt (§4.4: "the
    /// PolicyId is not re-checked for Anonymous") and resolve to `None`.
    /// Returns the matched policy otherwise, so callers can read its
    /// `security_policy_uri` for token-level cryptography.
    fn check_user_token_policy(&self, token: &UserIdentityToken) -> Result<Option<UserTokenPolicy>, Error> {
        if matches!(token, UserIdentityToken::Anonymous(_)) {
            return Ok(None);
        }
        let wanted_type = match token {
            UserIdentityToken::Anonymous(_) => unreachable!(),
            UserIdentityToken::UserName(_) => opcua_types::UserTokenType::UserName,
            UserIdentityToken::X509(_) => opcua_types::UserTokenType::Certificate,
            UserIdentityToken::Issued(_) => opcua_types::UserTokenType::IssuedToken,
        };
        let policy_id = token.policy_id();
        let matched = self
            .auth
            .user_token_policies()
            .into_iter()
            .find(|p| p.policy_id == policy_id && p.token_type == wanted_type);
        match matched {
            Some(policy) => Ok(Some(policy)),
            None => Err(Error::new(
                StatusCode::BadIdentityTokenInvalid,
                format!("PolicyId \"{policy_id}\" does not name a configured user-token policy"),
            )),
        }
    }

    async fn validate_user_token(
        &self,
        token: &UserIdentityToken,
        server_nonce: &[u8],
        server_certificate: &[u8],
        user_token_signature: &SignatureData,
        channel_security_policy: SecurityPolicy,
    ) -> Result<(), Error> {
        let matched_policy = self.check_user_token_policy(token)?;
        match token {
            UserIdentityToken::Anonymous(_) => self.auth.authenticate_anonymous().await,
            UserIdentityToken::UserName(t) => {
                let crypto = CryptoProvider::new(SecurityPolicy::None);
                let password = if t.encryption_algorithm.is_empty() {
                    t.password.as_ref().to_vec()
                } else {
                    let Some(private_key) = self.identity.private_key.as_ref() else {
                        return Err(Error::new(
                            StatusCode::BadIdentityTokenInvalid,
                            "no server private key configured to decrypt the user token",
                        ));
                    };
                    user_token::decrypt_user_password(&crypto, t.password.as_ref(), private_key, server_nonce)?
                        .as_bytes()
                        .to_vec()
                };
                self.auth
                    .authenticate_username(t.user_name.as_ref(), &Password::new(
                        String::from_utf8_lossy(&password).into_owned(),
                    ))
                    .await
                    .map(|_| ())
            }
            UserIdentityToken::X509(t) => {
                let certificate = X509::from_byte_string(&t.certificate_data)?;
                let token_policy = user_token_security_policy(matched_policy.as_ref(), channel_security_policy);
                let crypto = CryptoProvider::new(token_policy);
                user_token::verify_x509_user_token(
                    &crypto,
                    &certificate,
                    server_certificate,
                    server_nonce,
                    user_token_signature,
                )?;
                self.certificate_store
                    .read()
                    .validate_or_reject_application_instance_cert(&certificate)?;
                self.auth.authenticate_x509(certificate.as_der()).await.map(|_| ())
            }
            UserIdentityToken::Issued(t) => self.auth.authenticate_issued(t.token_data.as_ref()).await.map(|_| ()),
        }
    }

    async fn resolve_user_token(&self, token: &UserIdentityToken) -> UaResult<UserToken> {
        let resolved = match token {
            UserIdentityToken::Anonymous(_) => UserToken(UserToken::ANONYMOUS.to_string()),
            UserIdentityToken::UserName(t) => UserToken(t.user_name.to_string()),
            UserIdentityToken::X509(_) => UserToken("x509".to_string()),
            UserIdentityToken::Issued(_) => UserToken("issued".to_string()),
        };
        Ok(resolved)
    }

    /// `any active → closing → closed` (§4.3). Rejects a request whose
    /// secure channel id does not match the one the session was bound to,
    /// unless the session was never activated.
    pub fn close_session(
        &mut self,
        secure_channel_id: u32,
        request: &CloseSessionRequest,
    ) -> UaResult<CloseSessionResponse> {
        let Some(id) = self.table.find_by_token(&request.request_header.authentication_token) else {
            return Err(StatusCode::BadSessionIdInvalid);
        };
        let record = self.table.server_record(id).expect("found by token");
        if record.state() != SessionState::UserActivated && record.secure_channel_id != secure_channel_id {
            session_error!(
                id,
                "close rejected: secure channel {} does not match binding {}",
                secure_channel_id,
                record.secure_channel_id
            );
            return Err(StatusCode::BadSecureChannelIdInvalid);
        }

        self.set_state(id, SessionState::Closing);
        self.table.free_server_slot(id);
        session_info!(id, "closed");

        Ok(CloseSessionResponse {
            response_header: ResponseHeader::good(),
        })
    }

    /// Force-close a session on the inactivity timer or an unrecoverable
    /// protocol fault (§4.3's "any active" row). Idempotent: closing an
    /// already-free id is a no-op (§8 law).
    pub fn expire_session(&mut self, id: SessionId) {
        if self.table.server_record(id).map(|r| r.is_free()).unwrap_or(true) {
            return;
        }
        session_info!(id, "session expired, removing it from the session table");
        self.table.free_server_slot(id);
    }

    /// Sweep every live session for inactivity (§4.6). Returns the next
    /// deadline to re-arm the sweep timer for, plus every id that just
    /// expired (callers emit `ClosedSession(id, BadSessionIdExpired, ctx)`
    /// for each and then call [`ServerSessionManager::expire_session`]).
    pub fn check_session_expiry(&self) -> (Instant, Vec<SessionId>) {
        let now = Instant::now();
        let mut expired = Vec::new();
        let mut next_deadline = now + std::time::Duration::from_millis(self.limits.max_session_timeout_ms as u64);
        for id in self.table.active_server_sessions() {
            let record = self.table.server_record(id).unwrap();
            let deadline = record.deadline();
            if deadline <= now {
                expired.push(id);
            } else if deadline < next_deadline {
                next_deadline = deadline;
            }
        }
        (next_deadline, expired)
    }

    /// Record that a message just arrived for `id` (§4.6: resets the
    /// inactivity clock).
    pub fn note_message_received(&mut self, id: SessionId) {
        if let Some(record) = self.table.server_record_mut(id) {
            record.last_msg_received_at = Instant::now();
        }
    }

    /// Mark a session orphaned because its secure channel was lost (§4.3:
    /// `user_activated → sc_orphaned`). The timeout timer keeps running.
    pub fn mark_orphaned(&mut self, id: SessionId) {
        if matches!(
            self.table.server_record(id).map(|r| r.state()),
            Some(SessionState::UserActivated)
        ) {
            self.set_state(id, SessionState::ScOrphaned);
        }
    }

    fn set_state(&mut self, id: SessionId, state: SessionState) {
        if let Some(record) = self.table.server_record_mut(id) {
            unsafe_set_state(record, state);
        }
    }
}

// `ServerSessionRecord::state` is intentionally read-only from outside this
// module; the manager is the only code allowed to drive transitions.
fn unsafe_set_state(record: &mut crate::session_table::ServerSessionRecord, state: SessionState) {
    record.set_state(state);
}

/// The security policy to use for an X509 user token's own cryptography: the
/// matched policy's `security_policy_uri` when it names one, else the secure
/// channel's policy.
fn user_token_security_policy(
    matched_policy: Option<&UserTokenPolicy>,
    channel_security_policy: SecurityPolicy,
) -> SecurityPolicy {
    matched_policy
        .filter(|p| !p.security_policy_uri.is_empty())
        .and_then(|p| SecurityPolicy::from_uri(&p.security_policy_uri))
        .unwrap_or(channel_security_policy)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth_manager::StaticAuthManager;
    use opcua_types::{ApplicationDescription, ApplicationType, ByteString, LocalizedText, RequestHeader};

    fn identity() -> ServerIdentity {
        ServerIdentity {
            certificate: None,
            private_key: None,
            endpoints: Vec::new(),
        }
    }

    fn manager() -> ServerSessionManager<StaticAuthManager> {
        ServerSessionManager::new(
            SessionLimits::default(),
            Arc::new(StaticAuthManager::anonymous_only()),
            identity(),
            Arc::new(parking_lot::RwLock::new(CertificateStore::new(None, None))),
        )
    }

    fn create_request() -> CreateSessionRequest {
        CreateSessionRequest {
            request_header: RequestHeader::default(),
            client_description: ApplicationDescription {
                application_uri: "urn:test:client".into(),
                product_uri: "urn:test:product".into(),
                application_name: LocalizedText::new("", "test client"),
                application_type: ApplicationType::Client,
                discovery_urls: Vec::new(),
            },
            endpoint_url: "opc.tcp://localhost:4840".into(),
            session_name: "test".into(),
            client_nonce: ByteString::from(vec![0u8; 32]),
            client_certificate: ByteString::null(),
            requested_session_timeout: 30_000.0,
            max_response_message_size: 65536,
        }
    }

    #[test]
    fn happy_path_create_session_under_none_policy() {
        let mut mgr = manager();
        let response = mgr
            .create_session(SecurityPolicy::None, 7, &create_request())
            .unwrap();
        assert_eq!(response.response_header.service_result, StatusCode::Good);
        assert_eq!(response.revised_session_timeout, 30_000.0);
    }

    #[test]
    fn short_client_nonce_is_rejected_under_secured_policy() {
        let mut mgr = manager();
        let mut request = create_request();
        request.client_nonce = ByteString::from(vec![0u8; 16]);
        let err = mgr
            .create_session(SecurityPolicy::Basic256Sha256, 7, &request)
            .unwrap_err();
        assert_eq!(err, StatusCode::BadNonceInvalid);
    }

    #[tokio::test]
    async fn anonymous_activation_succeeds_end_to_end() {
        let mut mgr = manager();
        let create_response = mgr
            .create_session(SecurityPolicy::None, 7, &create_request())
            .unwrap();

        let activate_request = ActivateSessionRequest {
            request_header: RequestHeader::for_session(create_response.authentication_token.clone()),
            client_signature: SignatureData::null(),
            locale_ids: Vec::new(),
            user_identity_token: UserIdentityToken::Anonymous(opcua_types::AnonymousIdentityToken {
                policy_id: "anonymous".into(),
            }),
            user_token_signature: SignatureData::null(),
        };
        let activate_response = mgr.activate_session(SecurityPolicy::None, 7, &activate_request).await.unwrap();
        assert_eq!(activate_response.response_header.service_result, StatusCode::Good);
        assert_eq!(mgr.session_count(), 1);
    }

    #[test]
    fn too_many_sessions_is_rejected() {
        let mut limits = SessionLimits::default();
        limits.max_sessions = 1;
        let mut mgr = ServerSessionManager::new(
            limits,
            Arc::new(StaticAuthManager::anonymous_only()),
            identity(),
            Arc::new(parking_lot::RwLock::new(CertificateStore::new(None, None))),
        );
        mgr.create_session(SecurityPolicy::None, 1, &create_request()).unwrap();
        let err = mgr.create_session(SecurityPolicy::None, 1, &create_request()).unwrap_err();
        assert_eq!(err, StatusCode::BadTooManySessions);
    }

    #[test]
    fn close_session_is_idempotent() {
        let mut mgr = manager();
        let create_response = mgr
            .create_session(SecurityPolicy::None, 7, &create_request())
            .unwrap();
        let close_request = CloseSessionRequest {
            request_header: RequestHeader::for_session(create_response.authentication_token.clone()),
            delete_subscriptions: true,
        };
        assert!(mgr.close_session(7, &close_request).is_ok());
        // A second close with the same (now-stale) token reports no session found,
        // which is the expected closed-on-closed behavior.
        assert_eq!(
            mgr.close_session(7, &close_request).unwrap_err(),
            StatusCode::BadSessionIdInvalid
        );
    }

    #[test]
    fn expiring_an_already_free_session_is_a_no_op() {
        let mut mgr = manager();
        mgr.expire_session(SessionId::NONE);
    }

    #[tokio::test]
    async fn activation_with_unconfigured_policy_id_is_rejected() {
        let mut mgr = manager();
        let create_response = mgr
            .create_session(SecurityPolicy::None, 7, &create_request())
            .unwrap();

        let activate_request = ActivateSessionRequest {
            request_header: RequestHeader::for_session(create_response.authentication_token.clone()),
            client_signature: SignatureData::null(),
            locale_ids: Vec::new(),
            user_identity_token: UserIdentityToken::UserName(opcua_types::UserNameIdentityToken {
                policy_id: "no_such_policy".into(),
                user_name: "alice".into(),
                password: opcua_types::ByteString::from(b"hunter2".to_vec()),
                encryption_algorithm: "".into(),
            }),
            user_token_signature: SignatureData::null(),
        };
        let err = mgr
            .activate_session(SecurityPolicy::None, 7, &activate_request)
            .await
            .unwrap_err();
        assert_eq!(err, StatusCode::BadIdentityTokenInvalid);
    }

    #[tokio::test]
    async fn anonymous_activation_skips_the_policy_id_check() {
        let mut mgr = manager();
        let create_response = mgr
            .create_session(SecurityPolicy::None, 7, &create_request())
            .unwrap();

        let activate_request = ActivateSessionRequest {
            request_header: RequestHeader::for_session(create_response.authentication_token.clone()),
            client_signature: SignatureData::null(),
            locale_ids: Vec::new(),
            user_identity_token: UserIdentityToken::Anonymous(opcua_types::AnonymousIdentityToken {
                policy_id: "anything-at-all".into(),
            }),
            user_token_signature: SignatureData::null(),
        };
        assert!(mgr
            .activate_session(SecurityPolicy::None, 7, &activate_request)
            .await
            .is_ok());
    }

    // A real self-signed certificate over a 1024-bit RSA key, used to exercise
    // the X509 user-token signature path end to end.
    const X509_USER_CERT_DER: &[u8] = &[
        0x30, 0x82, 0x01, 0xa6, 0x30, 0x82, 0x01, 0x0f, 0xa0, 0x03, 0x02, 0x01,
        0x02, 0x02, 0x01, 0x01, 0x30, 0x0d, 0x06, 0x09, 0x2a, 0x86, 0x48, 0x86,
        0xf7, 0x0d, 0x01, 0x01, 0x0b, 0x05, 0x00, 0x30, 0x19, 0x31, 0x17, 0x30,
        0x15, 0x06, 0x03, 0x55, 0x04, 0x03, 0x0c, 0x0e, 0x74, 0x65, 0x73, 0x74,
        0x2d, 0x78, 0x35, 0x30, 0x39, 0x2d, 0x75, 0x73, 0x65, 0x72, 0x30, 0x1e,
        0x17, 0x0d, 0x32, 0x34, 0x30, 0x31, 0x30, 0x31, 0x30, 0x30, 0x30, 0x30,
        0x30, 0x30, 0x5a, 0x17, 0x0d, 0x34, 0x35, 0x30, 0x31, 0x30, 0x31, 0x30,
        0x30, 0x30, 0x30, 0x30, 0x30, 0x5a, 0x30, 0x19, 0x31, 0x17, 0x30, 0x15,
        0x06, 0x03, 0x55, 0x04, 0x03, 0x0c, 0x0e, 0x74, 0x65, 0x73, 0x74, 0x2d,
        0x78, 0x35, 0x30, 0x39, 0x2d, 0x75, 0x73, 0x65, 0x72, 0x30, 0x81, 0x9f,
        0x30, 0x0d, 0x06, 0x09, 0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x01, 0x01,
        0x01, 0x05, 0x00, 0x03, 0x81, 0x8d, 0x00, 0x30, 0x81, 0x89, 0x02, 0x81,
        0x81, 0x00, 0xb5, 0xc9, 0xd2, 0xe4, 0x5a, 0x5b, 0x90, 0x24, 0x9b, 0xe7,
        0x40, 0x17, 0x30, 0x69, 0x14, 0xd7, 0x29, 0x0a, 0x37, 0xd0, 0xb1, 0xaf,
        0x49, 0x3a, 0xcd, 0x0d, 0x45, 0x75, 0xda, 0xb8, 0x24, 0xb5, 0x8d, 0x7b,
        0x7d, 0xc1, 0x82, 0xfd, 0xf6, 0x38, 0x63, 0xed, 0xb0, 0xe1, 0xad, 0x23,
        0xbc, 0xd8, 0x06, 0x96, 0xc6, 0x8e, 0xa8, 0x97, 0x8a, 0x0d, 0xba, 0x4a,
        0xa7, 0x14, 0x4d, 0x59, 0x11, 0x0c, 0x92, 0xe2, 0xea, 0xa6, 0xf3, 0x78,
        0x0d, 0x8a, 0x34, 0x86, 0xd2, 0xd3, 0x9b, 0xa4, 0xce, 0x4b, 0x73, 0xcc,
        0x56, 0x04, 0x89, 0x2a, 0xdc, 0x5a, 0x63, 0xe4, 0xce, 0xb7, 0x88, 0x5c,
        0x76, 0xba, 0xd4, 0xf3, 0xd4, 0x11, 0x52, 0x1e, 0xf7, 0xea, 0x2f, 0x1f,
        0x1a, 0xd1, 0xd7, 0x9e, 0x5a, 0x1e, 0x77, 0xb6, 0x7a, 0xcc, 0x38, 0xeb,
        0xf5, 0x9b, 0x0a, 0xb6, 0xc4, 0x96, 0x87, 0x33, 0xd3, 0x1f, 0x02, 0x03,
        0x01, 0x00, 0x01, 0x30, 0x0d, 0x06, 0x09, 0x2a, 0x86, 0x48, 0x86, 0xf7,
        0x0d, 0x01, 0x01, 0x0b, 0x05, 0x00, 0x03, 0x81, 0x81, 0x00, 0x49, 0x08,
        0xd7, 0xfa, 0x38, 0x08, 0xa0, 0xa7, 0x14, 0x26, 0x51, 0x03, 0x5a, 0xbb,
        0x90, 0xfb, 0x43, 0x8d, 0x23, 0x15, 0xb8, 0xbd, 0x91, 0x4c, 0xc0, 0x63,
        0xa2, 0xfd, 0x3a, 0xf9, 0x4f, 0x01, 0xfe, 0xd5, 0xc1, 0xc4, 0x26, 0xda,
        0xa1, 0x84, 0x27, 0x6f, 0xb5, 0x06, 0x05, 0xf1, 0x92, 0xfe, 0x75, 0x68,
        0xd1, 0xb6, 0x2b, 0x22, 0x37, 0x1e, 0x4c, 0xe0, 0xa0, 0xf4, 0x11, 0xbc,
        0x9d, 0xac, 0xbb, 0x4d, 0xb0, 0x4c, 0x94, 0x8e, 0x99, 0xe0, 0x30, 0x5e,
        0x40, 0xb0, 0x17, 0x4c, 0x22, 0xb6, 0xc6, 0xd3, 0x83, 0xc3, 0x09, 0xea,
        0x44, 0x3c, 0x4d, 0x93, 0xad, 0xee, 0x64, 0x52, 0x88, 0xfa, 0xd7, 0xdd,
        0x52, 0xa2, 0x30, 0x8a, 0xab, 0xe5, 0xeb, 0x5e, 0x7e, 0x96, 0x18, 0x0d,
        0xac, 0x29, 0x1b, 0x82, 0xab, 0xf0, 0x80, 0xc8, 0x63, 0x95, 0x92, 0x50,
        0xe5, 0x87, 0x5a, 0x9e, 0xac, 0x0c,
    ];

    // PKCS#1 DER of the private key matching `X509_USER_CERT_DER`'s public key.
    const X509_USER_PRIVATE_KEY_PKCS1_DER: &[u8] = &[
        0x30, 0x82, 0x02, 0x5c, 0x02, 0x01, 0x00, 0x02, 0x81, 0x81, 0x00, 0xb5,
        0xc9, 0xd2, 0xe4, 0x5a, 0x5b, 0x90, 0x24, 0x9b, 0xe7, 0x40, 0x17, 0x30,
        0x69, 0x14, 0xd7, 0x29, 0x0a, 0x37, 0xd0, 0xb1, 0xaf, 0x49, 0x3a, 0xcd,
        0x0d, 0x45, 0x75, 0xda, 0xb8, 0x24, 0xb5, 0x8d, 0x7b, 0x7d, 0xc1, 0x82,
        0xfd, 0xf6, 0x38, 0x63, 0xed, 0xb0, 0xe1, 0xad, 0x23, 0xbc, 0xd8, 0x06,
        0x96, 0xc6, 0x8e, 0xa8, 0x97, 0x8a, 0x0d, 0xba, 0x4a, 0xa7, 0x14, 0x4d,
        0x59, 0x11, 0x0c, 0x92, 0xe2, 0xea, 0xa6, 0xf3, 0x78, 0x0d, 0x8a, 0x34,
        0x86, 0xd2, 0xd3, 0x9b, 0xa4, 0xce, 0x4b, 0x73, 0xcc, 0x56, 0x04, 0x89,
        0x2a, 0xdc, 0x5a, 0x63, 0xe4, 0xce, 0xb7, 0x88, 0x5c, 0x76, 0xba, 0xd4,
        0xf3, 0xd4, 0x11, 0x52, 0x1e, 0xf7, 0xea, 0x2f, 0x1f, 0x1a, 0xd1, 0xd7,
        0x9e, 0x5a, 0x1e, 0x77, 0xb6, 0x7a, 0xcc, 0x38, 0xeb, 0xf5, 0x9b, 0x0a,
        0xb6, 0xc4, 0x96, 0x87, 0x33, 0xd3, 0x1f, 0x02, 0x03, 0x01, 0x00, 0x01,
        0x02, 0x81, 0x80, 0x75, 0xd4, 0x56, 0x84, 0xba, 0xe8, 0xa4, 0x7a, 0x86,
        0x2f, 0x13, 0x04, 0xb4, 0xd5, 0x37, 0xb3, 0xea, 0x9e, 0xfb, 0xe4, 0xa2,
        0x77, 0x3a, 0x61, 0x09, 0xad, 0xf3, 0x7a, 0xdb, 0x85, 0x06, 0x0e, 0x43,
        0xa1, 0x6a, 0xb6, 0xb6, 0x60, 0x44, 0x6a, 0xf2, 0xa2, 0x8b, 0x47, 0x0c,
        0x01, 0xa1, 0x12, 0xe8, 0xda, 0x6b, 0xe2, 0xe5, 0xf6, 0x2b, 0x7e, 0x90,
        0x64, 0x78, 0xfd, 0x98, 0xd1, 0x05, 0x51, 0xe8, 0x3a, 0x6c, 0xe7, 0x7d,
        0x0d, 0x2a, 0x4f, 0xde, 0x83, 0xdf, 0x81, 0xfd, 0xc8, 0x79, 0x7d, 0xf1,
        0x5d, 0x3e, 0x9b, 0xbe, 0xe3, 0x2d, 0x35, 0x6d, 0xb4, 0x5c, 0x7d, 0xc9,
        0xc1, 0x59, 0x85, 0x34, 0x03, 0x88, 0xa7, 0xbf, 0xfc, 0xdd, 0x17, 0x17,
        0x4a, 0x50, 0xcb, 0x36, 0xad, 0x05, 0xd0, 0x91, 0xf2, 0xde, 0x44, 0x33,
        0x6c, 0x3a, 0x65, 0x46, 0x16, 0xe1, 0x93, 0xd8, 0x65, 0x0b, 0x71, 0x02,
        0x41, 0x00, 0xe0, 0x27, 0x88, 0xa2, 0x37, 0xbe, 0x4e, 0xeb, 0x89, 0x92,
        0x77, 0xd9, 0x14, 0x10, 0xc7, 0xc6, 0xfa, 0x51, 0x01, 0xd7, 0x8e, 0xe9,
        0xf7, 0x8d, 0xb7, 0x0e, 0xc1, 0x71, 0x9f, 0x6e, 0x34, 0x84, 0x2e, 0xfa,
        0x9a, 0xa1, 0x03, 0x79, 0x18, 0xe8, 0x80, 0xad, 0xc2, 0xf8, 0xd0, 0x5f,
        0xd1, 0xf6, 0xd3, 0x5e, 0x2b, 0x3d, 0xeb, 0x12, 0xc0, 0x78, 0x04, 0x24,
        0xc3, 0x51, 0x22, 0xbe, 0x57, 0xd9, 0x02, 0x41, 0x00, 0xcf, 0x9d, 0x71,
        0x41, 0x07, 0x5d, 0xc8, 0xb0, 0x9c, 0x18, 0x3e, 0x3b, 0xa6, 0x79, 0x2b,
        0x70, 0x7a, 0xbd, 0x7b, 0x60, 0xd0, 0x88, 0x4e, 0xa9, 0xdc, 0x4b, 0xd0,
        0x8c, 0x91, 0xb6, 0xd9, 0x6a, 0x4a, 0xd2, 0xfe, 0x84, 0x0d, 0x5d, 0x77,
        0xdb, 0x6d, 0xcb, 0x40, 0x8a, 0x42, 0x4f, 0x02, 0xea, 0xd1, 0x5f, 0x54,
        0x91, 0xcb, 0x99, 0xdb, 0xa6, 0xf7, 0x93, 0x50, 0x91, 0xca, 0x65, 0xdf,
        0xb7, 0x02, 0x41, 0x00, 0xa9, 0x27, 0x2c, 0x44, 0xbe, 0x2c, 0x2f, 0x02,
        0x2f, 0xdf, 0x07, 0xf2, 0x18, 0xe2, 0x50, 0xe0, 0x27, 0x25, 0xda, 0x6e,
        0x00, 0xbb, 0x2e, 0xc5, 0x12, 0xcf, 0x5f, 0xcb, 0x8e, 0xb4, 0x6b, 0x8d,
        0x14, 0xa6, 0xa8, 0xe9, 0xb8, 0xe5, 0x39, 0x96, 0xbb, 0x04, 0x65, 0x8d,
        0xbe, 0x31, 0x91, 0x10, 0xe2, 0x90, 0xbd, 0xb1, 0x0c, 0x24, 0x2a, 0x7a,
        0x67, 0x26, 0x16, 0xfe, 0xb3, 0x69, 0x50, 0x81, 0x02, 0x40, 0x2f, 0x7b,
        0x06, 0x47, 0xa4, 0xf3, 0xa1, 0xce, 0x22, 0x24, 0xb9, 0x36, 0xd3, 0x1f,
        0xaa, 0xfb, 0x92, 0x56, 0x7b, 0x3c, 0xec, 0xf3, 0xff, 0x69, 0x81, 0x64,
        0x25, 0x51, 0xc0, 0x91, 0x5c, 0xaf, 0x9e, 0x65, 0x1a, 0xa8, 0x00, 0x96,
        0x7b, 0xae, 0xc7, 0x31, 0x50, 0x95, 0x4e, 0x0c, 0xdb, 0xd1, 0xf0, 0x08,
        0x29, 0x43, 0x1e, 0x99, 0x15, 0x4e, 0xde, 0x17, 0xe6, 0xb9, 0x30, 0xdc,
        0x93, 0x89, 0x02, 0x40, 0x0e, 0x0a, 0x4c, 0x4f, 0xd4, 0xc0, 0x64, 0xe1,
        0xe4, 0xef, 0x47, 0x0b, 0x7d, 0xa8, 0x42, 0xbd, 0xf0, 0x06, 0x04, 0x1a,
        0x69, 0x62, 0xac, 0x31, 0x8e, 0xf3, 0xb3, 0x69, 0x1b, 0xb4, 0x27, 0x1d,
        0x4f, 0x58, 0x1a, 0xa5, 0x81, 0x17, 0x23, 0x55, 0x7c, 0xa5, 0x00, 0x9f,
        0xcb, 0x82, 0xed, 0xe5, 0x1d, 0x14, 0xcb, 0xe9, 0x03, 0x45, 0x8d, 0x47,
        0x1e, 0x54, 0xd5, 0xbb, 0x34, 0x1d, 0x64, 0xe4,
    ];

    struct X509AuthManager;

    #[async_trait::async_trait]
    impl AuthManager for X509AuthManager {
        async fn authenticate_anonymous(&self) -> Result<(), Error> {
            Ok(())
        }

        async fn authenticate_x509(&self, _certificate_thumbprint: &[u8]) -> Result<UserToken, Error> {
            Ok(UserToken("x509-test-user".to_string()))
        }

        fn user_token_policies(&self) -> Vec<UserTokenPolicy> {
            vec![UserTokenPolicy {
                policy_id: "x509".to_string(),
                token_type: opcua_types::UserTokenType::Certificate,
                security_policy_uri: SecurityPolicy::Basic256Sha256.to_uri().to_string(),
            }]
        }
    }

    fn x509_manager() -> ServerSessionManager<X509AuthManager> {
        let mut store = CertificateStore::new(None, None);
        store.set_trust_unknown_certs(true);
        ServerSessionManager::new(
            SessionLimits::default(),
            Arc::new(X509AuthManager),
            identity(),
            Arc::new(parking_lot::RwLock::new(store)),
        )
    }

    fn sign_x509_user_token(server_nonce: &[u8]) -> SignatureData {
        use rsa::pkcs1::DecodeRsaPrivateKey;
        let private_key = PrivateKey::new(
            rsa::RsaPrivateKey::from_pkcs1_der(X509_USER_PRIVATE_KEY_PKCS1_DER).unwrap(),
        );
        let crypto = CryptoProvider::new(SecurityPolicy::Basic256Sha256);
        // The session's identity carries no server certificate, so the
        // signed plaintext is the server nonce alone.
        let signature = crypto.asymmetric_sign(server_nonce, &private_key).unwrap();
        SignatureData {
            algorithm: crypto.sign_algorithm_uri().to_string(),
            signature: signature.into(),
        }
    }

    fn x509_activate_request(
        auth_token: NodeId,
        server_nonce: &[u8],
        user_token_signature: SignatureData,
    ) -> ActivateSessionRequest {
        ActivateSessionRequest {
            request_header: RequestHeader::for_session(auth_token),
            client_signature: SignatureData::null(),
            locale_ids: Vec::new(),
            user_identity_token: UserIdentityToken::X509(opcua_types::X509IdentityToken {
                policy_id: "x509".into(),
                certificate_data: ByteString::from(X509_USER_CERT_DER.to_vec()),
            }),
            user_token_signature,
        }
    }

    #[tokio::test]
    async fn x509_activation_succeeds_with_a_valid_signature() {
        let mut mgr = x509_manager();
        let create_response = mgr
            .create_session(SecurityPolicy::None, 7, &create_request())
            .unwrap();
        let server_nonce = create_response.server_nonce.as_ref().to_vec();

        let activate_request = x509_activate_request(
            create_response.authentication_token.clone(),
            &server_nonce,
            sign_x509_user_token(&server_nonce),
        );
        let response = mgr
            .activate_session(SecurityPolicy::None, 7, &activate_request)
            .await
            .unwrap();
        assert_eq!(response.response_header.service_result, StatusCode::Good);
    }

    #[tokio::test]
    async fn x509_activation_rejects_a_wrong_signature() {
        let mut mgr = x509_manager();
        let create_response = mgr
            .create_session(SecurityPolicy::None, 7, &create_request())
            .unwrap();
        let server_nonce = create_response.server_nonce.as_ref().to_vec();

        // Sign over the wrong bytes, so the proof-of-possession check fails.
        let mut wrong_nonce = server_nonce.clone();
        wrong_nonce[0] ^= 0xff;
        let activate_request = x509_activate_request(
            create_response.authentication_token.clone(),
            &server_nonce,
            sign_x509_user_token(&wrong_nonce),
        );
        let err = mgr
            .activate_session(SecurityPolicy::None, 7, &activate_request)
            .await
            .unwrap_err();
        assert_eq!(err, StatusCode::BadUserSignatureInvalid);
    }

    #[tokio::test]
    async fn x509_activation_rejects_a_null_signature() {
        let mut mgr = x509_manager();
        let create_response = mgr
            .create_session(SecurityPolicy::None, 7, &create_request())
            .unwrap();
        let server_nonce = create_response.server_nonce.as_ref().to_vec();

        let activate_request = x509_activate_request(
            create_response.authentication_token.clone(),
            &server_nonce,
            SignatureData::null(),
        );
        let err = mgr
            .activate_session(SecurityPolicy::None, 7, &activate_request)
            .await
            .unwrap_err();
        assert_eq!(err, StatusCode::BadUserSignatureInvalid);
    }
}
