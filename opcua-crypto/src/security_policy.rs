// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0

//! The closed table of security policies the session layer's crypto adapter
//! understands, and the URI mappings that hang off it (§4.2).

use std::fmt;

/// A security policy tag. Used both for the secure channel's own policy and,
/// independently, for the `user_security_policy` chosen for user-token
/// cryptography (§3, `ClientSessionRecord::user_security_policy`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SecurityPolicy {
    /// No signing, no encryption.
    None,
    /// RSA-15 signing, AES-256-CBC encryption, SHA-1 digests.
    Basic256,
    /// RSA-OAEP signing/encryption, AES-256-CBC, SHA-256 digests.
    Basic256Sha256,
    /// RSA-OAEP encryption, AES-128-CBC, SHA-256 digests.
    Aes128Sha256RsaOaep,
    /// RSA-PSS encryption, AES-256-CBC, SHA-256 digests.
    Aes256Sha256RsaPss,
}

/// Every policy requires a 32-byte nonce for the session layer's purposes (§6, `NonceLength`).
pub const NONCE_LENGTH: usize = 32;

impl SecurityPolicy {
    /// Parse a policy from its OPC UA URI. Unknown URIs are rejected rather than
    /// silently defaulted, per §4.2 ("unknown URIs cause Fail").
    pub fn from_uri(uri: &str) -> Option<Self> {
        Some(match uri {
            "http://opcfoundation.org/UA/SecurityPolicy#None" | "" => SecurityPolicy::None,
            "http://opcfoundation.org/UA/SecurityPolicy#Basic256" => SecurityPolicy::Basic256,
            "http://opcfoundation.org/UA/SecurityPolicy#Basic256Sha256" => {
                SecurityPolicy::Basic256Sha256
            }
            "http://opcfoundation.org/UA/SecurityPolicy#Aes128_Sha256_RsaOaep" => {
                SecurityPolicy::Aes128Sha256RsaOaep
            }
            "http://opcfoundation.org/UA/SecurityPolicy#Aes256_Sha256_RsaPss" => {
                SecurityPolicy::Aes256Sha256RsaPss
            }
            _ => return None,
        })
    }

    /// The OPC UA URI for this policy.
    pub fn to_uri(self) -> &'static str {
        match self {
            SecurityPolicy::None => "http://opcfoundation.org/UA/SecurityPolicy#None",
            SecurityPolicy::Basic256 => "http://opcfoundation.org/UA/SecurityPolicy#Basic256",
            SecurityPolicy::Basic256Sha256 => {
                "http://opcfoundation.org/UA/SecurityPolicy#Basic256Sha256"
            }
            SecurityPolicy::Aes128Sha256RsaOaep => {
                "http://opcfoundation.org/UA/SecurityPolicy#Aes128_Sha256_RsaOaep"
            }
            SecurityPolicy::Aes256Sha256RsaPss => {
                "http://opcfoundation.org/UA/SecurityPolicy#Aes256_Sha256_RsaPss"
            }
        }
    }

    /// The user-token encryption algorithm URI for this policy (§4.2's closed table).
    /// Empty for `None`.
    pub fn user_token_encryption_algorithm_uri(self) -> &'static str {
        match self {
            SecurityPolicy::None => "",
            SecurityPolicy::Basic256
            | SecurityPolicy::Basic256Sha256
            | SecurityPolicy::Aes128Sha256RsaOaep => {
                "http://www.w3.org/2001/04/xmlenc#rsa-oaep"
            }
            SecurityPolicy::Aes256Sha256RsaPss => {
                "http://opcfoundation.org/UA/security/rsa-oaep-sha2-256"
            }
        }
    }

    /// The asymmetric signature algorithm URI for this policy.
    pub fn asymmetric_signature_algorithm_uri(self) -> &'static str {
        match self {
            SecurityPolicy::None => "",
            SecurityPolicy::Basic256 => "http://www.w3.org/2000/09/xmldsig#rsa-sha1",
            SecurityPolicy::Basic256Sha256
            | SecurityPolicy::Aes128Sha256RsaOaep
            | SecurityPolicy::Aes256Sha256RsaPss => {
                "http://www.w3.org/2001/04/xmldsig-more#rsa-sha256"
            }
        }
    }

    /// The secure-channel symmetric nonce length for this policy: always 32 for
    /// every policy in scope (§4.2).
    pub fn symmetric_nonce_length(self) -> usize {
        NONCE_LENGTH
    }
}

impl fmt::Display for SecurityPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_uri())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_uri_is_rejected() {
        assert!(SecurityPolicy::from_uri("http://example.com/bogus").is_none());
    }

    #[test]
    fn uri_roundtrips() {
        for policy in [
            SecurityPolicy::None,
            SecurityPolicy::Basic256,
            SecurityPolicy::Basic256Sha256,
            SecurityPolicy::Aes128Sha256RsaOaep,
            SecurityPolicy::Aes256Sha256RsaPss,
        ] {
            assert_eq!(SecurityPolicy::from_uri(policy.to_uri()), Some(policy));
        }
    }

    #[test]
    fn encryption_algorithm_table_matches_spec() {
        assert_eq!(SecurityPolicy::None.user_token_encryption_algorithm_uri(), "");
        assert_eq!(
            SecurityPolicy::Basic256Sha256.user_token_encryption_algorithm_uri(),
            "http://www.w3.org/2001/04/xmlenc#rsa-oaep"
        );
        assert_eq!(
            SecurityPolicy::Aes256Sha256RsaPss.user_token_encryption_algorithm_uri(),
            "http://opcfoundation.org/UA/security/rsa-oaep-sha2-256"
        );
    }

    #[test]
    fn nonce_length_is_always_32() {
        for policy in [
            SecurityPolicy::None,
            SecurityPolicy::Basic256,
            SecurityPolicy::Basic256Sha256,
            SecurityPolicy::Aes128Sha256RsaOaep,
            SecurityPolicy::Aes256Sha256RsaPss,
        ] {
            assert_eq!(policy.symmetric_nonce_length(), 32);
        }
    }
}
