// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0

//! User-token handling (C3, §4.4): the shallow copy out of the inbound
//! request, username/password encryption and decryption under the wire
//! format in §6, and X509 user-token signature verification.

use opcua_crypto::{CryptoProvider, PrivateKey, PublicKey, SecureBytes, SecurityPolicy, X509};
use opcua_types::{EndpointDescription, Error, SignatureData, StatusCode, UserIdentityToken, UserTokenPolicy};

/// Take ownership of the identity token out of the inbound request (§4.4
/// step 1: "shallow copy the token ... cannot retain a reference into the
/// decoded request buffer, which is freed when handling returns").
///
/// `UserIdentityToken` already owns its contents, so in safe Rust this is a
/// plain clone; the function exists to name the step the way the protocol
/// does and to give future callers one place to add copy-time validation.
pub fn shallow_copy_identity(token: &UserIdentityToken) -> UserIdentityToken {
    token.clone()
}

/// Encrypt a username/password user token under the wire format in §6:
/// `u32 little-endian total-length ∥ password_bytes ∥ server_nonce_bytes`,
/// RSA-OAEP-encrypted under the server certificate's public key. The length
/// field excludes itself (covers only `password` and `nonce`).
pub fn encrypt_user_password(
    provider: &CryptoProvider,
    password: &[u8],
    server_certificate_public_key: &PublicKey,
    nonce: &[u8],
) -> Result<Vec<u8>, Error> {
    let total_len = password.len() + nonce.len();
    let total_len: u32 = total_len.try_into().map_err(|_| {
        Error::new(
            StatusCode::BadInvalidParameters,
            "password + nonce too large to encode a u32 length",
        )
    })?;

    let mut plaintext = Vec::with_capacity(4 + password.len() + nonce.len());
    plaintext.extend_from_slice(&total_len.to_le_bytes());
    plaintext.extend_from_slice(password);
    plaintext.extend_from_slice(nonce);

    provider.asymmetric_encrypt(&plaintext, server_certificate_public_key)
}

/// Decrypt a username/password user token and validate the embedded nonce
/// against `expected_nonce` (§4.4 step 2). Returns the decrypted password on
/// success; a nonce mismatch is reported as `BadUserAccessDenied` per the
/// round-trip property in §8.
pub fn decrypt_user_password(
    provider: &CryptoProvider,
    ciphertext: &[u8],
    server_private_key: &PrivateKey,
    expected_nonce: &[u8],
) -> Result<SecureBytes, Error> {
    // Wrapping the raw plaintext in `SecureBytes` immediately means it is
    // zeroized once this function returns, on every exit path (§3 invariant 7).
    let mut plaintext = SecureBytes::new(provider.asymmetric_decrypt(ciphertext, server_private_key)?);

    let result = (|| -> Result<Vec<u8>, Error> {
        let bytes = plaintext.as_bytes();
        if bytes.len() < 4 {
            return Err(Error::new(
                StatusCode::BadIdentityTokenInvalid,
                "encrypted password payload shorter than its length prefix",
            ));
        }
        let total_len = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
        if total_len < expected_nonce.len() || bytes.len() < 4 + total_len {
            return Err(Error::new(
                StatusCode::BadIdentityTokenInvalid,
                "encrypted password payload shorter than its declared length",
            ));
        }
        let password_len = total_len - expected_nonce.len();
        let password_start = 4;
        let password_end = password_start + password_len;
        let nonce_end = password_end + expected_nonce.len();

        if &bytes[password_end..nonce_end] != expected_nonce {
            return Err(Error::new(
                StatusCode::BadUserAccessDenied,
                "server nonce embedded in encrypted password does not match the current challenge",
            ));
        }
        Ok(bytes[password_start..password_end].to_vec())
    })();

    plaintext.clear();
    result.map(SecureBytes::new)
}

/// Verify an X509 user token's signature over `server_certificate ∥
/// server_nonce` (§4.4 step 3), then run the policy-specific certificate
/// trust check through the Crypto Adapter.
pub fn verify_x509_user_token(
    provider: &CryptoProvider,
    user_certificate: &X509,
    server_certificate: &[u8],
    server_nonce: &[u8],
    signature: &SignatureData,
) -> Result<(), Error> {
    if signature.is_null() {
        return Err(Error::new(
            StatusCode::BadUserSignatureInvalid,
            "x509 user token requires a non-null signature",
        ));
    }
    if signature.algorithm != provider.sign_algorithm_uri() {
        return Err(Error::new(
            StatusCode::BadUserSignatureInvalid,
            format!(
                "user token signature algorithm \"{}\" does not match policy algorithm \"{}\"",
                signature.algorithm,
                provider.sign_algorithm_uri()
            ),
        ));
    }
    let public_key = user_certificate.public_key()?;
    let mut plaintext = Vec::with_capacity(server_certificate.len() + server_nonce.len());
    plaintext.extend_from_slice(server_certificate);
    plaintext.extend_from_slice(server_nonce);
    provider.asymmetric_verify(&plaintext, signature.signature.as_ref(), &public_key)
}

/// Pick the user-token policy a client should activate with out of the
/// endpoints a `CreateSessionResponse` advertised (§4.3's edge case): "when
/// multiple user-token policies are compatible, the first in endpoint order
/// that matches both the requested PolicyId and the encryption-algo URI
/// wins." Endpoints, and each endpoint's policies, are scanned in the order
/// they were returned; `None` if nothing matches.
pub fn select_user_token_policy<'a>(
    endpoints: &'a [EndpointDescription],
    policy_id: &str,
    encryption_algorithm_uri: &str,
) -> Option<&'a UserTokenPolicy> {
    endpoints.iter().find_map(|endpoint| {
        endpoint.user_identity_tokens.iter().find(|policy| {
            policy.policy_id == policy_id
                && policy_algorithm_uri(policy) == encryption_algorithm_uri
        })
    })
}

fn policy_algorithm_uri(policy: &UserTokenPolicy) -> &'static str {
    if policy.security_policy_uri.is_empty() {
        ""
    } else {
        SecurityPolicy::from_uri(&policy.security_policy_uri)
            .map(|p| p.user_token_encryption_algorithm_uri())
            .unwrap_or("")
    }
}

/// `true` if a username-password token may be sent in plaintext: only ever
/// when the user-security-policy is `None` *and* the secure channel carries
/// its own encryption (`SignAndEncrypt`). Anything else sending a plaintext
/// password under `None` is forbidden (§4.3: "attempts return
/// `InvalidParameters`").
pub fn plaintext_password_allowed(
    user_security_policy: SecurityPolicy,
    channel_mode_is_sign_and_encrypt: bool,
) -> bool {
    user_security_policy != SecurityPolicy::None || channel_mode_is_sign_and_encrypt
}

#[cfg(test)]
mod tests {
    use super::*;
    use opcua_crypto::PrivateKey;

    #[test]
    fn password_round_trips_through_encrypt_decrypt() {
        let (private, public) = PrivateKey::generate(1024).unwrap();
        let provider = CryptoProvider::new(SecurityPolicy::Basic256Sha256);
        let nonce = vec![0x7a_u8; 32];

        let ciphertext =
            encrypt_user_password(&provider, b"hunter2", &public, &nonce).unwrap();
        let decrypted = decrypt_user_password(&provider, &ciphertext, &private, &nonce).unwrap();

        assert_eq!(decrypted.as_bytes(), b"hunter2");
    }

    #[test]
    fn mismatched_nonce_is_rejected() {
        let (private, public) = PrivateKey::generate(1024).unwrap();
        let provider = CryptoProvider::new(SecurityPolicy::Basic256Sha256);
        let nonce = vec![0x11_u8; 32];
        let other_nonce = vec![0x22_u8; 32];

        let ciphertext =
            encrypt_user_password(&provider, b"hunter2", &public, &nonce).unwrap();
        let result = decrypt_user_password(&provider, &ciphertext, &private, &other_nonce);

        assert_eq!(result.unwrap_err().status, StatusCode::BadUserAccessDenied);
    }

    #[test]
    fn plaintext_password_forbidden_under_none_without_sign_and_encrypt() {
        assert!(!plaintext_password_allowed(SecurityPolicy::None, false));
        assert!(plaintext_password_allowed(SecurityPolicy::None, true));
        assert!(plaintext_password_allowed(SecurityPolicy::Basic256Sha256, false));
    }

    fn endpoint(policies: Vec<UserTokenPolicy>) -> opcua_types::EndpointDescription {
        opcua_types::EndpointDescription {
            endpoint_url: "opc.tcp://localhost:4840".into(),
            server: None,
            server_certificate: opcua_types::ByteString::null(),
            security_mode: opcua_types::MessageSecurityMode::None,
            security_policy_uri: SecurityPolicy::None.to_uri().to_string(),
            user_identity_tokens: policies,
            transport_profile_uri: String::new(),
            security_level: 0,
        }
    }

    #[test]
    fn select_user_token_policy_picks_first_matching_endpoint_in_order() {
        let username_policy = UserTokenPolicy {
            policy_id: "username_basic256sha256".to_string(),
            token_type: opcua_types::UserTokenType::UserName,
            security_policy_uri: SecurityPolicy::Basic256Sha256.to_uri().to_string(),
        };
        let endpoints = vec![
            endpoint(vec![UserTokenPolicy::anonymous("anonymous")]),
            endpoint(vec![username_policy.clone()]),
        ];
        let found = select_user_token_policy(
            &endpoints,
            "username_basic256sha256",
            SecurityPolicy::Basic256Sha256.user_token_encryption_algorithm_uri(),
        );
        assert_eq!(found, Some(&username_policy));
    }

    #[test]
    fn select_user_token_policy_rejects_algorithm_mismatch() {
        let endpoints = vec![endpoint(vec![UserTokenPolicy {
            policy_id: "username".to_string(),
            token_type: opcua_types::UserTokenType::UserName,
            security_policy_uri: SecurityPolicy::Basic256Sha256.to_uri().to_string(),
        }])];
        let found = select_user_token_policy(&endpoints, "username", "http://bogus-algorithm");
        assert!(found.is_none());
    }

    #[test]
    fn select_user_token_policy_returns_none_when_no_endpoint_matches() {
        let endpoints = vec![endpoint(vec![UserTokenPolicy::anonymous("anonymous")])];
        let found = select_user_token_policy(&endpoints, "username", "");
        assert!(found.is_none());
    }
}
