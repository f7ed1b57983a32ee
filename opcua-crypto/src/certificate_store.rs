// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0

//! The PKI trust boundary the Crypto Adapter's `certificate_validate` operation
//! delegates to (§4.2). Full chain-of-trust validation against a CA bundle is
//! the externally supplied "Crypto Provider"'s job (§1); this store only tracks
//! the small, explicit policy knobs the session layer is allowed to see:
//! an own keypair, and whether unknown peer certificates are trusted.

use std::collections::HashSet;

use opcua_types::{Error, StatusCode};

use crate::pkey::PrivateKey;
use crate::x509::X509;

/// Holds this application's own certificate/private key, plus the trust policy
/// applied to peer certificates presented during session creation and activation.
pub struct CertificateStore {
    own_certificate: Option<X509>,
    own_private_key: Option<PrivateKey>,
    trusted_thumbprints: HashSet<Vec<u8>>,
    trust_unknown_certs: bool,
}

impl CertificateStore {
    /// Construct a store around an application instance keypair.
    pub fn new(own_certificate: Option<X509>, own_private_key: Option<PrivateKey>) -> Self {
        Self {
            own_certificate,
            own_private_key,
            trusted_thumbprints: HashSet::new(),
            trust_unknown_certs: false,
        }
    }

    /// This application's own certificate, if configured.
    pub fn own_certificate(&self) -> Option<&X509> {
        self.own_certificate.as_ref()
    }

    /// This application's own private key, if configured.
    pub fn own_private_key(&self) -> Option<&PrivateKey> {
        self.own_private_key.as_ref()
    }

    /// Explicitly trust a peer certificate by its raw DER bytes.
    pub fn trust(&mut self, certificate: &X509) {
        self.trusted_thumbprints.insert(certificate.as_der().to_vec());
    }

    /// When set, any certificate not explicitly trusted is still accepted. Intended
    /// for development endpoints; production endpoints should leave this `false`.
    pub fn set_trust_unknown_certs(&mut self, trust: bool) {
        self.trust_unknown_certs = trust;
    }

    /// Validate a peer's application instance certificate (§4.2 `certificate_validate`).
    /// A real deployment would chain this to PKI trust-chain validation; here it
    /// enforces the two policy knobs this store owns.
    pub fn validate_or_reject_application_instance_cert(
        &self,
        certificate: &X509,
    ) -> Result<(), Error> {
        if certificate.as_der().is_empty() {
            return Err(Error::new(
                StatusCode::BadInvalidParameters,
                "certificate is empty",
            ));
        }
        if self.trust_unknown_certs
            || self
                .trusted_thumbprints
                .contains(certificate.as_der())
        {
            Ok(())
        } else {
            Err(Error::new(
                StatusCode::BadUserAccessDenied,
                "certificate is not in the trust list",
            ))
        }
    }
}
