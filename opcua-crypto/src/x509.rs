// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0

//! DER-encoded X509 certificate handling: parsing, public-key extraction, and
//! the Subject Alternative Name URI check used by the application-URI edge
//! case in §4.3. Trust-chain validation itself belongs to the externally
//! supplied PKI (§1); this module only exposes what the session layer reads
//! off a certificate directly.

use const_oid::db::rfc5280::ID_CE_SUBJECT_ALT_NAME;
use rsa::pkcs1::DecodeRsaPublicKey;
use rsa::pkcs8::DecodePublicKey;
use x509_cert::der::{Decode, Encode};
use x509_cert::ext::pkix::name::GeneralName;
use x509_cert::ext::pkix::SubjectAltName;
use x509_cert::Certificate;

use opcua_types::{ByteString, Error, StatusCode};

use crate::pkey::PublicKey;

/// A parsed X509 certificate. Cheap to clone (the DER bytes are the only state
/// that matters for equality and the session layer only ever reads it back).
#[derive(Debug, Clone)]
pub struct X509 {
    der: Vec<u8>,
}

impl PartialEq for X509 {
    fn eq(&self, other: &Self) -> bool {
        self.der == other.der
    }
}

impl X509 {
    /// Parse a certificate from a `ByteString` as carried on the wire
    /// (`CreateSessionRequest::client_certificate`, `X509IdentityToken::certificate_data`, ...).
    pub fn from_byte_string(data: &ByteString) -> Result<Self, Error> {
        if data.is_empty() {
            return Err(Error::new(
                StatusCode::BadInvalidParameters,
                "certificate is empty",
            ));
        }
        Self::from_der(data.as_ref())
    }

    /// Parse a certificate from raw DER bytes.
    pub fn from_der(der: &[u8]) -> Result<Self, Error> {
        Certificate::from_der(der).map_err(|e| {
            Error::new(
                StatusCode::BadCertificateUriInvalid,
                format!("failed to parse certificate: {e}"),
            )
        })?;
        Ok(Self { der: der.to_vec() })
    }

    /// The DER bytes of this certificate.
    pub fn as_der(&self) -> &[u8] {
        &self.der
    }

    /// As a `ByteString`, ready to be put back on the wire.
    pub fn as_byte_string(&self) -> ByteString {
        ByteString::from(self.der.clone())
    }

    fn parsed(&self) -> Result<Certificate, Error> {
        Certificate::from_der(&self.der).map_err(|e| {
            Error::new(
                StatusCode::BadCertificateUriInvalid,
                format!("failed to re-parse certificate: {e}"),
            )
        })
    }

    /// Extract the RSA public key from this certificate's SubjectPublicKeyInfo.
    pub fn public_key(&self) -> Result<PublicKey, Error> {
        let cert = self.parsed()?;
        let spki_der = cert
            .tbs_certificate
            .subject_public_key_info
            .to_der()
            .map_err(|e| {
                Error::new(
                    StatusCode::BadCertificateUriInvalid,
                    format!("failed to re-encode SubjectPublicKeyInfo: {e}"),
                )
            })?;
        let key = rsa::RsaPublicKey::from_public_key_der(&spki_der)
            .or_else(|_| rsa::RsaPublicKey::from_pkcs1_der(&spki_der))
            .map_err(|e| {
                Error::new(
                    StatusCode::BadCertificateUriInvalid,
                    format!("certificate does not carry an RSA key: {e}"),
                )
            })?;
        Ok(PublicKey::new(key))
    }

    /// The URI entries of this certificate's Subject Alternative Name extension,
    /// if present. Used by the `ApplicationUri` check in §4.3.
    pub fn subject_alt_name_uris(&self) -> Vec<String> {
        let Ok(cert) = self.parsed() else {
            return Vec::new();
        };
        let Some(extensions) = cert.tbs_certificate.extensions.as_ref() else {
            return Vec::new();
        };
        let Some(ext) = extensions
            .iter()
            .find(|e| e.extn_id == ID_CE_SUBJECT_ALT_NAME)
        else {
            return Vec::new();
        };
        let Ok(san) = SubjectAltName::from_der(ext.extn_value.as_bytes()) else {
            return Vec::new();
        };
        san.0
            .into_iter()
            .filter_map(|name| match name {
                GeneralName::UniformResourceIdentifier(uri) => Some(uri.to_string()),
                _ => None,
            })
            .collect()
    }

    /// `true` if `application_uri` matches one of this certificate's SAN URIs, or if
    /// `application_uri` is empty (the check is skipped per §4.3's edge case).
    pub fn matches_application_uri(&self, application_uri: &str) -> bool {
        if application_uri.is_empty() {
            return true;
        }
        self.subject_alt_name_uris()
            .iter()
            .any(|uri| uri == application_uri)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_certificate_is_rejected() {
        assert!(X509::from_byte_string(&ByteString::null()).is_err());
    }

    #[test]
    fn empty_application_uri_skips_the_check() {
        // A malformed cert still satisfies the "empty application uri" shortcut,
        // since the comparison never needs to parse the certificate.
        let stub = X509 { der: vec![] };
        assert!(stub.matches_application_uri(""));
    }
}
