// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0

//! The client-side half of the Session State Machine (C5, §4.3): mirrors
//! the server-side state machine but drives CreateSession and
//! ActivateSession requests from application events and interprets
//! responses.

use opcua_crypto::{CryptoProvider, PrivateKey, SecureBytes, SecurityPolicy, X509};
use opcua_types::{
    ActivateSessionRequest, ActivateSessionResponse, ApplicationDescription, ApplicationType,
    CloseSessionRequest, CloseSessionResponse, CreateSessionRequest, CreateSessionResponse,
    LocalizedText, NodeId, RequestHeader, SignatureData, StatusCode, UAString, UaResult,
    UserIdentityToken,
};

use crate::session_table::{SessionId, SessionState, SessionTable};
use crate::user_token;

/// `session:N ...` logging, matching the server-side macros in
/// `state_machine.rs`.
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

/// This client application's own instance identity, used to sign
/// `ActivateSessionRequest::client_signature`.
pub struct ClientIdentity {
    /// This client's application instance certificate; `None` under
    /// `SecurityPolicy::None`.
    pub certificate: Option<X509>,
    /// This client's private key, paired with `certificate`.
    pub private_key: Option<PrivateKey>,
}

/// Owns the client-side half of the [`SessionTable`] and drives the
/// transitions in §4.3's table from the application's point of view: build a
/// request, hand it to the Secure-Channels collaborator, interpret the
/// response.
pub struct ClientSessionManager {
    table: SessionTable,
    identity: ClientIdentity,
}

impl ClientSessionManager {
    /// Construct a manager sized for `max_sessions` concurrent sessions
    /// (normally 1 per physical client connection, but the table supports
    /// more for multiplexed applications).
    pub fn new(max_sessions: usize, identity: ClientIdentity) -> Self {
        Self {
            table: SessionTable::new(max_sessions),
            identity,
        }
    }

    /// Borrow the client-side session table.
    pub fn table(&self) -> &SessionTable {
        &self.table
    }

    /// `init → creating`: reserve a slot, generate a fresh 32-byte client
    /// nonce, and build the outgoing `CreateSessionRequest`.
    pub fn build_create_session_request(
        &mut self,
        security_policy: SecurityPolicy,
        endpoint_url: &str,
        session_name: &str,
        app_context: u64,
        requested_session_timeout_ms: f64,
    ) -> UaResult<(SessionId, CreateSessionRequest)> {
        let Some(id) = self.table.reserve_client_slot() else {
            return Err(StatusCode::BadTooManySessions);
        };

        let crypto = CryptoProvider::new(security_policy);
        let client_nonce = crypto.random_nonce(crypto.symmetric_secure_channel_nonce_length());

        let record = self.table.client_record_mut(id).expect("just reserved");
        record.client_nonce = client_nonce.clone();
        record.app_context = app_context;
        record.session_name = session_name.into();

        let client_certificate = self
            .identity
            .certificate
            .as_ref()
            .map(|c| c.as_byte_string())
            .unwrap_or_default();

        Ok((
            id,
            CreateSessionRequest {
                request_header: RequestHeader::default(),
                client_description: ApplicationDescription {
                    application_uri: UAString::null(),
                    product_uri: UAString::null(),
                    application_name: LocalizedText::new("", session_name),
                    application_type: ApplicationType::Client,
                    discovery_urls: Vec::new(),
                },
                endpoint_url: endpoint_url.into(),
                session_name: session_name.into(),
                client_nonce: client_nonce.as_bytes().to_vec().into(),
                client_certificate,
                requested_session_timeout: requested_session_timeout_ms,
                max_response_message_size: 0,
            },
        ))
    }

    /// `creating → created`: record the server's assigned authentication
    /// token and nonce, and take an owned copy of the server certificate
    /// (Open Question 3, §9: explicit owned copy, not a borrow, since the
    /// decoded response message that the reference would otherwise point
    /// into is freed elsewhere).
    pub fn handle_create_session_response(
        &mut self,
        id: SessionId,
        response: &CreateSessionResponse,
    ) -> UaResult<()> {
        let server_certificate = if response.server_certificate.is_empty() {
            None
        } else {
            Some(X509::from_byte_string(&response.server_certificate)?)
        };

        let record = self
            .table
            .client_record_mut(id)
            .ok_or(StatusCode::BadSessionIdInvalid)?;
        record.auth_token = response.authentication_token.clone();
        record.server_nonce = SecureBytes::new(response.server_nonce.as_ref().to_vec());
        record.user_server_certificate = server_certificate;
        record.set_state(SessionState::Created);

        session_info!(id, "session created, authentication token assigned");
        Ok(())
    }

    /// `created → user_activating`, also used for reactivation from
    /// `user_activated`/`sc_orphaned` (§4.3 mirrors the server-side table).
    /// Signs `server_certificate ∥ server_nonce` with this client's private
    /// key and, for a non-`None` user-security-policy, encrypts the outgoing
    /// user token per §6's wire format.
    ///
    /// Per §4.3's edge case, if the prior response carried an empty
    /// `ServerCertificate` while `user_security_policy` is not `None`, this
    /// aborts locally with `BadInvalidParameters` without building a request.
    pub fn build_activate_session_request(
        &mut self,
        id: SessionId,
        security_policy: SecurityPolicy,
        user_security_policy: SecurityPolicy,
        user_identity_token: UserIdentityToken,
        channel_mode_is_sign_and_encrypt: bool,
    ) -> UaResult<ActivateSessionRequest> {
        if matches!(user_identity_token, UserIdentityToken::UserName(_))
            && !user_token::plaintext_password_allowed(user_security_policy, channel_mode_is_sign_and_encrypt)
        {
            session_warn!(id, "refusing to send a plaintext password under an insecure channel");
            return Err(StatusCode::BadInvalidParameters);
        }

        let (auth_token, server_certificate, server_nonce) = {
            let record = self
                .table
                .client_record(id)
                .ok_or(StatusCode::BadSessionIdInvalid)?;
            (
                record.auth_token.clone(),
                record.user_server_certificate.clone(),
                record.server_nonce.as_bytes().to_vec(),
            )
        };

        if server_certificate.is_none() && user_security_policy != SecurityPolicy::None {
            session_warn!(
                id,
                "aborting activation locally: server presented no certificate but a user security policy is required"
            );
            return Err(StatusCode::BadInvalidParameters);
        }

        let crypto = CryptoProvider::new(security_policy);
        let client_signature =
            self.sign_activate_session(&crypto, server_certificate.as_ref(), &server_nonce)?;

        let user_identity_token = self.encrypt_user_token_if_needed(
            user_identity_token,
            user_security_policy,
            server_certificate.as_ref(),
            &server_nonce,
        )?;

        let record = self
            .table
            .client_record_mut(id)
            .ok_or(StatusCode::BadSessionIdInvalid)?;
        record.user_token = Some(user_identity_token.clone());
        record.user_security_policy = user_security_policy;
        record.set_state(SessionState::UserActivating);

        Ok(ActivateSessionRequest {
            request_header: RequestHeader::for_session(auth_token),
            client_signature,
            locale_ids: Vec::new(),
            user_identity_token,
            user_token_signature: SignatureData::null(),
        })
    }

    fn sign_activate_session(
        &self,
        crypto: &CryptoProvider,
        server_certificate: Option<&X509>,
        server_nonce: &[u8],
    ) -> UaResult<SignatureData> {
        let Some(private_key) = self.identity.private_key.as_ref() else {
            return Ok(SignatureData::null());
        };
        if crypto.policy() == SecurityPolicy::None {
            return Ok(SignatureData::null());
        }
        let mut plaintext = server_certificate.map(|c| c.as_der().to_vec()).unwrap_or_default();
        plaintext.extend_from_slice(server_nonce);
        let signature = crypto.asymmetric_sign(&plaintext, private_key)?;
        Ok(SignatureData {
            algorithm: crypto.sign_algorithm_uri().to_string(),
            signature: signature.into(),
        })
    }

    fn encrypt_user_token_if_needed(
        &self,
        token: UserIdentityToken,
        user_security_policy: SecurityPolicy,
        server_certificate: Option<&X509>,
        server_nonce: &[u8],
    ) -> UaResult<UserIdentityToken> {
        if user_security_policy == SecurityPolicy::None {
            return Ok(token);
        }
        let UserIdentityToken::UserName(mut username_token) = token else {
            return Ok(token);
        };
        let Some(server_certificate) = server_certificate else {
            return Err(StatusCode::BadInvalidParameters);
        };
        let crypto = CryptoProvider::new(user_security_policy);
        let public_key = server_certificate.public_key()?;
        let ciphertext = user_token::encrypt_user_password(
            &crypto,
            username_token.password.as_ref(),
            &public_key,
            server_nonce,
        )?;
        username_token.password = ciphertext.into();
        username_token.encryption_algorithm = crypto.user_token_encryption_algorithm_uri().into();
        Ok(UserIdentityToken::UserName(username_token))
    }

    /// `user_activating → user_activated`: record the fresh server nonce
    /// returned for the *next* activation (invariant 2) and mark the session
    /// live.
    pub fn handle_activate_session_response(
        &mut self,
        id: SessionId,
        response: &ActivateSessionResponse,
    ) -> UaResult<()> {
        let record = self
            .table
            .client_record_mut(id)
            .ok_or(StatusCode::BadSessionIdInvalid)?;
        record.server_nonce = SecureBytes::new(response.server_nonce.as_ref().to_vec());
        record.set_state(SessionState::UserActivated);
        session_info!(id, "activated");
        Ok(())
    }

    /// `user_activated → sc_orphaned`: the bound secure channel was lost.
    /// The client-side record is kept (not freed) so a later reactivation on
    /// a new channel can reuse it.
    pub fn mark_orphaned(&mut self, id: SessionId) {
        if let Some(record) = self.table.client_record_mut(id) {
            if record.state() == SessionState::UserActivated {
                record.set_state(SessionState::ScOrphaned);
                session_info!(id, "orphaned: secure channel lost");
            }
        }
    }

    /// Build a `CloseSessionRequest` for an active session.
    pub fn build_close_session_request(
        &self,
        id: SessionId,
        delete_subscriptions: bool,
    ) -> UaResult<CloseSessionRequest> {
        let record = self.table.client_record(id).ok_or(StatusCode::BadSessionIdInvalid)?;
        Ok(CloseSessionRequest {
            request_header: RequestHeader::for_session(record.auth_token.clone()),
            delete_subscriptions,
        })
    }

    /// `any active → closed`: free the client-side slot after a
    /// `CloseSessionResponse` (or after giving up on one).
    pub fn handle_close_session_response(&mut self, id: SessionId, _response: &CloseSessionResponse) {
        self.table.free_client_slot(id);
        session_info!(id, "closed");
    }

    /// The authentication token the server assigned for `id`, `None` before
    /// `CreateSessionResponse` arrives.
    pub fn authentication_token(&self, id: SessionId) -> Option<NodeId> {
        self.table
            .client_record(id)
            .filter(|r| !r.auth_token.is_null())
            .map(|r| r.auth_token.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opcua_types::{AnonymousIdentityToken, ByteString, ResponseHeader, UserNameIdentityToken};

    // A real self-signed certificate over a P-256 key, not RSA, so
    // `X509::public_key`'s RSA extraction fails further down the activation
    // path while parsing itself succeeds.
    const EC_ONLY_CERT_DER: &[u8] = &[
        0x30, 0x82, 0x01, 0x21, 0x30, 0x81, 0xc7, 0xa0, 0x03, 0x02, 0x01, 0x02,
        0x02, 0x01, 0x01, 0x30, 0x0a, 0x06, 0x08, 0x2a, 0x86, 0x48, 0xce, 0x3d,
        0x04, 0x03, 0x02, 0x30, 0x1a, 0x31, 0x18, 0x30, 0x16, 0x06, 0x03, 0x55,
        0x04, 0x03, 0x0c, 0x0f, 0x74, 0x65, 0x73, 0x74, 0x2d, 0x6e, 0x6f, 0x2d,
        0x72, 0x73, 0x61, 0x2d, 0x6b, 0x65, 0x79, 0x30, 0x1e, 0x17, 0x0d, 0x32,
        0x34, 0x30, 0x31, 0x30, 0x31, 0x30, 0x30, 0x30, 0x30, 0x30, 0x30, 0x5a,
        0x17, 0x0d, 0x34, 0x35, 0x30, 0x31, 0x30, 0x31, 0x30, 0x30, 0x30, 0x30,
        0x30, 0x30, 0x5a, 0x30, 0x1a, 0x31, 0x18, 0x30, 0x16, 0x06, 0x03, 0x55,
        0x04, 0x03, 0x0c, 0x0f, 0x74, 0x65, 0x73, 0x74, 0x2d, 0x6e, 0x6f, 0x2d,
        0x72, 0x73, 0x61, 0x2d, 0x6b, 0x65, 0x79, 0x30, 0x59, 0x30, 0x13, 0x06,
        0x07, 0x2a, 0x86, 0x48, 0xce, 0x3d, 0x02, 0x01, 0x06, 0x08, 0x2a, 0x86,
        0x48, 0xce, 0x3d, 0x03, 0x01, 0x07, 0x03, 0x42, 0x00, 0x04, 0x20, 0x71,
        0xfe, 0xe1, 0x58, 0xab, 0x0d, 0xe8, 0xf0, 0x74, 0x36, 0xc8, 0xe8, 0x72,
        0xb2, 0x6a, 0x65, 0x6a, 0xf9, 0xe7, 0x96, 0xbb, 0xdf, 0x96, 0xe5, 0x6d,
        0xf0, 0xe9, 0x13, 0x0b, 0x64, 0x14, 0xb7, 0x85, 0xfc, 0x0d, 0x54, 0x06,
        0x0f, 0x7f, 0xbc, 0x63, 0xfe, 0xe5, 0xec, 0xdb, 0xd9, 0xcb, 0xee, 0xee,
        0x25, 0xd0, 0x7f, 0xb9, 0x3a, 0x62, 0x9c, 0x30, 0x72, 0x4e, 0xea, 0x52,
        0x74, 0x04, 0x30, 0x0a, 0x06, 0x08, 0x2a, 0x86, 0x48, 0xce, 0x3d, 0x04,
        0x03, 0x02, 0x03, 0x49, 0x00, 0x30, 0x46, 0x02, 0x21, 0x00, 0x94, 0x3d,
        0xa6, 0x23, 0x81, 0x78, 0x22, 0x80, 0x73, 0xb4, 0x7f, 0xdb, 0x0a, 0x1b,
        0x47, 0x2b, 0xf3, 0x64, 0x67, 0x58, 0x15, 0x4d, 0xe6, 0x82, 0xfd, 0xc6,
        0x89, 0x36, 0x80, 0xb0, 0xd9, 0xda, 0x02, 0x21, 0x00, 0xf1, 0xf5, 0xa0,
        0xbe, 0x8d, 0x20, 0xe5, 0x18, 0x47, 0x46, 0x6f, 0x0f, 0x38, 0x81, 0x7e,
        0xba, 0x0b, 0xd8, 0x85, 0xad, 0xdd, 0x7d, 0xfd, 0x4f, 0xe4, 0xd9, 0xdc,
        0x33, 0xe9, 0xe5, 0x2c, 0x54,
    ];

    fn manager() -> ClientSessionManager {
        ClientSessionManager::new(
            10,
            ClientIdentity {
                certificate: None,
                private_key: None,
            },
        )
    }

    fn create_response(id: SessionId, server_certificate: ByteString) -> CreateSessionResponse {
        CreateSessionResponse {
            response_header: ResponseHeader::good(),
            session_id: NodeId::new(1, id.value()),
            authentication_token: NodeId::new(0, 7),
            revised_session_timeout: 30_000.0,
            server_nonce: ByteString::from(vec![9u8; 32]),
            server_certificate,
            server_endpoints: Vec::new(),
            server_signature: SignatureData::null(),
            max_request_message_size: 0,
        }
    }

    #[test]
    fn create_session_request_carries_a_full_length_nonce() {
        let mut mgr = manager();
        let (id, request) = mgr
            .build_create_session_request(SecurityPolicy::None, "opc.tcp://localhost:4840", "test", 42, 30_000.0)
            .unwrap();
        assert_eq!(request.client_nonce.len(), 32);
        assert_eq!(mgr.table().client_record(id).unwrap().app_context, 42);
    }

    #[test]
    fn anonymous_activation_round_trips_under_none_policy() {
        let mut mgr = manager();
        let (id, _request) = mgr
            .build_create_session_request(SecurityPolicy::None, "opc.tcp://localhost:4840", "test", 0, 30_000.0)
            .unwrap();

        mgr.handle_create_session_response(id, &create_response(id, ByteString::null()))
            .unwrap();

        let activate_request = mgr
            .build_activate_session_request(
                id,
                SecurityPolicy::None,
                SecurityPolicy::None,
                UserIdentityToken::Anonymous(AnonymousIdentityToken {
                    policy_id: "anonymous".into(),
                }),
                false,
            )
            .unwrap();
        assert!(activate_request.client_signature.is_null());

        let activate_response = ActivateSessionResponse {
            response_header: ResponseHeader::good(),
            server_nonce: ByteString::from(vec![1u8; 32]),
        };
        mgr.handle_activate_session_response(id, &activate_response).unwrap();
        assert_eq!(
            mgr.table().client_record(id).unwrap().state(),
            SessionState::UserActivated
        );
    }

    #[test]
    fn activation_aborts_locally_when_server_certificate_is_missing() {
        let mut mgr = manager();
        let (id, _request) = mgr
            .build_create_session_request(SecurityPolicy::Basic256Sha256, "opc.tcp://localhost:4840", "test", 0, 30_000.0)
            .unwrap();
        mgr.handle_create_session_response(id, &create_response(id, ByteString::null()))
            .unwrap();

        let err = mgr
            .build_activate_session_request(
                id,
                SecurityPolicy::Basic256Sha256,
                SecurityPolicy::Basic256Sha256,
                UserIdentityToken::UserName(UserNameIdentityToken {
                    policy_id: "username".into(),
                    user_name: "alice".into(),
                    password: ByteString::from(b"hunter2".to_vec()),
                    encryption_algorithm: UAString::null(),
                }),
                false,
            )
            .unwrap_err();
        assert_eq!(err, StatusCode::BadInvalidParameters);
    }

    #[test]
    fn plaintext_password_under_none_policy_without_sign_and_encrypt_is_rejected() {
        let mut mgr = manager();
        let (id, _request) = mgr
            .build_create_session_request(SecurityPolicy::None, "opc.tcp://localhost:4840", "test", 0, 30_000.0)
            .unwrap();
        mgr.handle_create_session_response(id, &create_response(id, ByteString::null()))
            .unwrap();

        let err = mgr
            .build_activate_session_request(
                id,
                SecurityPolicy::None,
                SecurityPolicy::None,
                UserIdentityToken::UserName(UserNameIdentityToken {
                    policy_id: "username".into(),
                    user_name: "alice".into(),
                    password: ByteString::from(b"hunter2".to_vec()),
                    encryption_algorithm: UAString::null(),
                }),
                false,
            )
            .unwrap_err();
        assert_eq!(err, StatusCode::BadInvalidParameters);
    }

    #[test]
    fn encrypted_user_token_fails_cleanly_against_a_certificate_with_no_rsa_key() {
        let mut mgr = manager();
        let (id, _request) = mgr
            .build_create_session_request(SecurityPolicy::Basic256Sha256, "opc.tcp://localhost:4840", "test", 0, 30_000.0)
            .unwrap();
        mgr.handle_create_session_response(id, &create_response(id, ByteString::from(EC_ONLY_CERT_DER.to_vec())))
            .unwrap();

        let err = mgr
            .build_activate_session_request(
                id,
                SecurityPolicy::Basic256Sha256,
                SecurityPolicy::Basic256Sha256,
                UserIdentityToken::UserName(UserNameIdentityToken {
                    policy_id: "username".into(),
                    user_name: "alice".into(),
                    password: ByteString::from(b"hunter2".to_vec()),
                    encryption_algorithm: UAString::null(),
                }),
                false,
            )
            .unwrap_err();
        assert_eq!(err, StatusCode::BadCertificateUriInvalid);
    }

    #[test]
    fn orphaning_an_inactive_session_is_a_no_op() {
        let mut mgr = manager();
        let (id, _request) = mgr
            .build_create_session_request(SecurityPolicy::None, "opc.tcp://localhost:4840", "test", 0, 30_000.0)
            .unwrap();
        mgr.mark_orphaned(id);
        assert_eq!(mgr.table().client_record(id).unwrap().state(), SessionState::Creating);
    }
}
