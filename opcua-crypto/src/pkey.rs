// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0

//! RSA private/public key wrappers and the sign/verify/encrypt/decrypt primitives
//! the Crypto Adapter (§4.2) is built on. The `rsa`/`sha2` crates stand in for the
//! externally supplied "Crypto Provider" collaborator.

use rsa::{
    pkcs1v15::{Signature as Pkcs1v15Signature, SigningKey, VerifyingKey},
    sha2::Sha256,
    signature::{RandomizedSigner, SignatureEncoding, Verifier},
    Oaep, RsaPrivateKey, RsaPublicKey,
};
use sha1::Sha1;

use opcua_types::{Error, StatusCode};

use crate::security_policy::SecurityPolicy;

/// A private key used for signing and decryption.
#[derive(Clone)]
pub struct PrivateKey(RsaPrivateKey);

impl PrivateKey {
    /// Wrap an existing RSA private key.
    pub fn new(key: RsaPrivateKey) -> Self {
        Self(key)
    }

    /// Generate a fresh key pair, used by tests and sample certificate tooling.
    pub fn generate(bits: usize) -> Result<(Self, PublicKey), Error> {
        let mut rng = rand::thread_rng();
        let key = RsaPrivateKey::new(&mut rng, bits).map_err(|e| {
            Error::new(
                StatusCode::BadUnexpectedError,
                format!("failed to generate RSA key: {e}"),
            )
        })?;
        let public = PublicKey(key.to_public_key());
        Ok((Self(key), public))
    }

    /// The size of a signature produced by this key, in bytes (§4.2 `signature_length`).
    pub fn signature_length(&self) -> usize {
        use rsa::traits::PublicKeyParts;
        self.0.size()
    }

    fn sign_sha1(&self, data: &[u8]) -> Result<Vec<u8>, Error> {
        let signing_key = SigningKey::<Sha1>::new(self.0.clone());
        let mut rng = rand::thread_rng();
        let signature: Pkcs1v15Signature = signing_key.sign_with_rng(&mut rng, data);
        Ok(signature.to_bytes().to_vec())
    }

    fn sign_sha256(&self, data: &[u8]) -> Result<Vec<u8>, Error> {
        let signing_key = SigningKey::<Sha256>::new(self.0.clone());
        let mut rng = rand::thread_rng();
        let signature: Pkcs1v15Signature = signing_key.sign_with_rng(&mut rng, data);
        Ok(signature.to_bytes().to_vec())
    }

    /// Sign `data` under `policy`'s asymmetric signature algorithm (§4.2 `asymmetric_sign`).
    pub fn sign(&self, policy: SecurityPolicy, data: &[u8]) -> Result<Vec<u8>, Error> {
        match policy {
            SecurityPolicy::None => Err(Error::new(
                StatusCode::BadInvalidParameters,
                "cannot sign under SecurityPolicy::None",
            )),
            SecurityPolicy::Basic256 => self.sign_sha1(data),
            SecurityPolicy::Basic256Sha256
            | SecurityPolicy::Aes128Sha256RsaOaep
            | SecurityPolicy::Aes256Sha256RsaPss => self.sign_sha256(data),
        }
    }

    /// Decrypt `ciphertext` with RSA-OAEP/SHA-256, the scheme used for every
    /// non-`None` policy's user-token encryption (§6).
    pub fn decrypt_oaep(&self, ciphertext: &[u8]) -> Result<Vec<u8>, Error> {
        self.0
            .decrypt(Oaep::new::<Sha256>(), ciphertext)
            .map_err(|e| Error::new(StatusCode::BadUserAccessDenied, format!("decrypt failed: {e}")))
    }
}

/// A public key used for verification and encryption.
#[derive(Clone)]
pub struct PublicKey(RsaPublicKey);

impl PublicKey {
    /// Wrap an existing RSA public key.
    pub fn new(key: RsaPublicKey) -> Self {
        Self(key)
    }

    /// The ciphertext length this key produces for OAEP encryption: equal to the
    /// RSA modulus size regardless of plaintext length (§4.2 `encrypt_length`).
    pub fn encrypt_length(&self, _plaintext_len: usize) -> usize {
        use rsa::traits::PublicKeyParts;
        self.0.size()
    }

    fn verify_sha1(&self, data: &[u8], signature: &[u8]) -> Result<(), Error> {
        let verifying_key: VerifyingKey<Sha1> = VerifyingKey::new(self.0.clone());
        let sig = Pkcs1v15Signature::try_from(signature).map_err(|e| {
            Error::new(StatusCode::BadUserSignatureInvalid, format!("malformed signature: {e}"))
        })?;
        verifying_key
            .verify(data, &sig)
            .map_err(|e| Error::new(StatusCode::BadUserSignatureInvalid, format!("{e}")))
    }

    fn verify_sha256(&self, data: &[u8], signature: &[u8]) -> Result<(), Error> {
        let verifying_key: VerifyingKey<Sha256> = VerifyingKey::new(self.0.clone());
        let sig = Pkcs1v15Signature::try_from(signature).map_err(|e| {
            Error::new(StatusCode::BadUserSignatureInvalid, format!("malformed signature: {e}"))
        })?;
        verifying_key
            .verify(data, &sig)
            .map_err(|e| Error::new(StatusCode::BadUserSignatureInvalid, format!("{e}")))
    }

    /// Verify `signature` over `data` under `policy`'s asymmetric signature algorithm
    /// (§4.2 `asymmetric_verify`). Zero-length signatures always fail (§7).
    pub fn verify(&self, policy: SecurityPolicy, data: &[u8], signature: &[u8]) -> Result<(), Error> {
        if signature.is_empty() {
            return Err(Error::new(
                StatusCode::BadUserSignatureInvalid,
                "zero-length signature",
            ));
        }
        match policy {
            SecurityPolicy::None => Err(Error::new(
                StatusCode::BadInvalidParameters,
                "cannot verify under SecurityPolicy::None",
            )),
            SecurityPolicy::Basic256 => self.verify_sha1(data, signature),
            SecurityPolicy::Basic256Sha256
            | SecurityPolicy::Aes128Sha256RsaOaep
            | SecurityPolicy::Aes256Sha256RsaPss => self.verify_sha256(data, signature),
        }
    }

    /// Encrypt `plaintext` with RSA-OAEP/SHA-256 (§4.2 `asymmetric_encrypt`).
    /// Zero-length plaintext always fails (§7).
    pub fn encrypt_oaep(&self, plaintext: &[u8]) -> Result<Vec<u8>, Error> {
        if plaintext.is_empty() {
            return Err(Error::new(
                StatusCode::BadInvalidParameters,
                "cannot encrypt zero-length plaintext",
            ));
        }
        let mut rng = rand::thread_rng();
        self.0
            .encrypt(&mut rng, Oaep::new::<Sha256>(), plaintext)
            .map_err(|e| Error::new(StatusCode::BadUnexpectedError, format!("encrypt failed: {e}")))
    }
}
