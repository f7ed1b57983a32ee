// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0

//! Crypto Adapter (C2) and the cryptographic primitives it wraps: RSA
//! sign/verify/encrypt/decrypt, X509 certificate parsing, random nonces/ids,
//! and the certificate trust store consulted on session creation/activation.
//!
//! This crate plays the role of the externally supplied "Crypto Provider"
//! collaborator (§1); `rsa`/`sha1`/`sha2`/`x509-cert` stand in for whatever
//! real PKI/crypto library a production deployment would link.

mod certificate_store;
mod pkey;
mod provider;
mod random;
mod secure_bytes;
mod security_policy;
mod x509;

pub use certificate_store::CertificateStore;
pub use pkey::{PrivateKey, PublicKey};
pub use provider::CryptoProvider;
pub use secure_bytes::SecureBytes;
pub use security_policy::{SecurityPolicy, NONCE_LENGTH};
pub use x509::X509;
