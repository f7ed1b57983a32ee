// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0

//! The Crypto Adapter (C2): a thin, policy-keyed wrapper over the RSA/SHA/
//! x509 primitives in this crate, exposing sign/verify/encrypt/decrypt,
//! random-nonce, and certificate validation as the pure operations §4.2
//! enumerates. Constructed on demand; every operation returns `Ok` or a
//! concrete [`Error`] with a reason string suitable for logging.

use opcua_types::{ByteString, Error, StatusCode};

use crate::certificate_store::CertificateStore;
use crate::pkey::{PrivateKey, PublicKey};
use crate::random;
use crate::secure_bytes::SecureBytes;
use crate::security_policy::SecurityPolicy;
use crate::x509::X509;

/// A handle bound to one security policy. Stateless per-call; reuse across a
/// session is allowed but never required (§5, "the Crypto Provider is
/// stateless per-call").
#[derive(Debug, Clone, Copy)]
pub struct CryptoProvider {
    policy: SecurityPolicy,
}

impl CryptoProvider {
    /// Construct an adapter keyed to `policy`.
    pub fn new(policy: SecurityPolicy) -> Self {
        Self { policy }
    }

    /// The security policy this adapter was constructed with.
    pub fn policy(&self) -> SecurityPolicy {
        self.policy
    }

    /// Generate `len` bytes of cryptographically strong randomness, wrapped
    /// for zeroize-on-drop since every caller uses this for nonces (§4.2
    /// `random_nonce`).
    pub fn random_nonce(&self, len: usize) -> SecureBytes {
        SecureBytes::new(random::byte_string(len).into_vec())
    }

    /// The secure-channel's standard 32-byte nonce (§4.2
    /// `symmetric_secure_channel_nonce_length`, always 32 in this policy
    /// table).
    pub fn symmetric_secure_channel_nonce_length(&self) -> usize {
        self.policy.symmetric_nonce_length()
    }

    /// Generate a random 32-bit id, used for server-side authentication
    /// tokens (§4.2/§4.5 `random_id`).
    pub fn random_id(&self) -> u32 {
        random::id()
    }

    /// Sign `plaintext` with `private_key` under this adapter's policy
    /// (§4.2 `asymmetric_sign`). Fails under `SecurityPolicy::None`, and on
    /// zero-length input (§7: "never silently succeed on zero-length
    /// inputs").
    pub fn asymmetric_sign(
        &self,
        plaintext: &[u8],
        private_key: &PrivateKey,
    ) -> Result<Vec<u8>, Error> {
        if plaintext.is_empty() {
            return Err(Error::new(
                StatusCode::BadInvalidParameters,
                "cannot sign zero-length plaintext",
            ));
        }
        private_key.sign(self.policy, plaintext)
    }

    /// Verify `signature` over `plaintext` with `public_key` under this
    /// adapter's policy (§4.2 `asymmetric_verify`).
    pub fn asymmetric_verify(
        &self,
        plaintext: &[u8],
        signature: &[u8],
        public_key: &PublicKey,
    ) -> Result<(), Error> {
        if plaintext.is_empty() {
            return Err(Error::new(
                StatusCode::BadInvalidParameters,
                "cannot verify a signature over zero-length plaintext",
            ));
        }
        public_key.verify(self.policy, plaintext, signature)
    }

    /// Encrypt `plaintext` under `public_key` (§4.2 `asymmetric_encrypt`).
    /// Every policy in scope uses RSA-OAEP/SHA-256 for user-token encryption.
    pub fn asymmetric_encrypt(
        &self,
        plaintext: &[u8],
        public_key: &PublicKey,
    ) -> Result<Vec<u8>, Error> {
        public_key.encrypt_oaep(plaintext)
    }

    /// Decrypt `ciphertext` with `private_key` (§4.2 `asymmetric_decrypt`).
    pub fn asymmetric_decrypt(
        &self,
        ciphertext: &[u8],
        private_key: &PrivateKey,
    ) -> Result<Vec<u8>, Error> {
        if ciphertext.is_empty() {
            return Err(Error::new(
                StatusCode::BadInvalidParameters,
                "cannot decrypt zero-length ciphertext",
            ));
        }
        private_key.decrypt_oaep(ciphertext)
    }

    /// Ciphertext length `public_key` produces for `plaintext_len` bytes of
    /// plaintext (§4.2 `encrypt_length`).
    pub fn encrypt_length(&self, public_key: &PublicKey, plaintext_len: usize) -> usize {
        public_key.encrypt_length(plaintext_len)
    }

    /// Signature length `private_key` produces under this policy (§4.2
    /// `signature_length`).
    pub fn signature_length(&self, private_key: &PrivateKey) -> usize {
        private_key.signature_length()
    }

    /// The URI of the asymmetric signature algorithm this policy uses (§4.2
    /// `sign_algorithm_uri`).
    pub fn sign_algorithm_uri(&self) -> &'static str {
        self.policy.asymmetric_signature_algorithm_uri()
    }

    /// The user-token encryption algorithm URI for this policy, empty under
    /// `None` (§4.2's closed table).
    pub fn user_token_encryption_algorithm_uri(&self) -> &'static str {
        self.policy.user_token_encryption_algorithm_uri()
    }

    /// Parse a DER-encoded certificate from a `ByteString` (§4.2
    /// `certificate_from_der`).
    pub fn certificate_from_der(&self, data: &ByteString) -> Result<X509, Error> {
        X509::from_byte_string(data)
    }

    /// Extract the RSA public key from a parsed certificate (§4.2
    /// `public_key_from_certificate`).
    pub fn public_key_from_certificate(&self, certificate: &X509) -> Result<PublicKey, Error> {
        certificate.public_key()
    }

    /// Validate `certificate` against `pki`'s trust policy (§4.2
    /// `certificate_validate`).
    pub fn certificate_validate(
        &self,
        pki: &CertificateStore,
        certificate: &X509,
    ) -> Result<(), Error> {
        pki.validate_or_reject_application_instance_cert(certificate)
    }
}
