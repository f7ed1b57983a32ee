// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0

//! Security-mode and signature wire types.

use crate::ByteString;

/// The message security mode negotiated for a secure channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageSecurityMode {
    /// No signing or encryption.
    None,
    /// Messages are signed but not encrypted.
    Sign,
    /// Messages are signed and encrypted.
    SignAndEncrypt,
}

/// A signature plus the URI of the algorithm that produced it, as carried on
/// `CreateSessionResponse::server_signature` and `ActivateSessionRequest::client_signature`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SignatureData {
    /// URI of the asymmetric signature algorithm, e.g.
    /// `http://www.w3.org/2000/09/xmldsig#rsa-sha1`. Empty when the signature is null.
    pub algorithm: String,
    /// The signature bytes, null when no signature was produced (`SecurityPolicy::None`).
    pub signature: ByteString,
}

impl SignatureData {
    /// A null signature, used under `SecurityPolicy::None` where no signing takes place.
    pub fn null() -> Self {
        Self::default()
    }

    /// `true` if this carries no signature bytes.
    pub fn is_null(&self) -> bool {
        self.signature.is_null()
    }
}
