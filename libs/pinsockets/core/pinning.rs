//! Public-key pinning
//!
//! The server is trusted if and only if the SHA-256 of its leaf certificate's
//! SubjectPublicKeyInfo, base64 encoded, equals the pinned value.
//!
//! The pin is the sole trust criterion. Chain of trust and expiry are not
//! checked, nor is the hostname. Handshake signatures are still verified
//! against the leaf key, so the peer must hold the pinned private key.

use crate::traits::{PinSocketError, Result, TrustError};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{verify_tls12_signature, verify_tls13_signature, CryptoProvider, WebPkiSupportedAlgorithms};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{CertificateError, DigitallySignedStruct, OtherError, SignatureScheme};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, warn};

/// Length of a SHA-256 digest in bytes
const SHA256_LEN: usize = 32;

/// Base64 SHA-256 digest of the server's SPKI-encoded public key
///
/// Supplied by the caller and never derived from anything received over the wire.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ExpectedKeyHash(String);

impl ExpectedKeyHash {
    /// Validate that `value` is standard base64 of exactly 32 bytes
    pub fn parse(value: impl Into<String>) -> Result<Self> {
        let value = value.into();
        let decoded = STANDARD
            .decode(value.as_bytes())
            .map_err(|e| PinSocketError::InvalidKeyHash(format!("not base64: {}", e)))?;

        if decoded.len() != SHA256_LEN {
            return Err(PinSocketError::InvalidKeyHash(format!(
                "expected a {}-byte SHA-256 digest, got {} bytes",
                SHA256_LEN,
                decoded.len()
            )));
        }

        Ok(Self(value))
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for ExpectedKeyHash {
    type Err = PinSocketError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for ExpectedKeyHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for ExpectedKeyHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ExpectedKeyHash").field(&self.0).finish()
    }
}

/// base64(SHA-256(spki_der))
pub fn spki_sha256_base64(spki_der: &[u8]) -> String {
    let digest = Sha256::digest(spki_der);
    STANDARD.encode(digest)
}

/// Pin value of a DER certificate: the hash of its SubjectPublicKeyInfo
pub fn leaf_key_hash(cert_der: &[u8]) -> std::result::Result<String, TrustError> {
    let (_, cert) = x509_parser::parse_x509_certificate(cert_der)
        .map_err(|e| TrustError::MalformedCertificate(e.to_string()))?;

    Ok(spki_sha256_base64(cert.public_key().raw))
}

/// Check a presented chain against the pin
///
/// Only `chain[0]`, the leaf, is looked at. The comparison is byte-for-byte on
/// the base64 text, so a pin differing only in letter case is a mismatch.
pub fn evaluate(
    chain: &[CertificateDer<'_>],
    expected: &ExpectedKeyHash,
) -> std::result::Result<(), TrustError> {
    let leaf = chain.first().ok_or(TrustError::EmptyChain)?;
    let actual = leaf_key_hash(leaf.as_ref())?;

    if actual.as_bytes() == expected.as_str().as_bytes() {
        Ok(())
    } else {
        Err(TrustError::PinMismatch {
            expected: expected.to_string(),
            actual,
        })
    }
}

/// rustls certificate verifier that trusts exactly one pinned public key
///
/// Installed as the only server-identity check of the TLS client config.
/// Stateless apart from its configuration, so one instance serves every
/// reconnect attempt.
pub struct PinnedTrustEvaluator {
    expected: ExpectedKeyHash,
    algorithms: WebPkiSupportedAlgorithms,
}

impl PinnedTrustEvaluator {
    /// Create an evaluator verifying handshake signatures with `provider`'s algorithms
    pub fn new(expected: ExpectedKeyHash, provider: &CryptoProvider) -> Self {
        Self {
            expected,
            algorithms: provider.signature_verification_algorithms,
        }
    }

    pub fn expected(&self) -> &ExpectedKeyHash {
        &self.expected
    }

    pub fn evaluate(&self, chain: &[CertificateDer<'_>]) -> std::result::Result<(), TrustError> {
        evaluate(chain, &self.expected)
    }
}

impl fmt::Debug for PinnedTrustEvaluator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PinnedTrustEvaluator")
            .field("expected", &self.expected)
            .finish()
    }
}

/// Wrap a pinning failure so it survives the trip through rustls and tokio-rustls
pub(crate) fn trust_error_to_tls(err: TrustError) -> rustls::Error {
    rustls::Error::InvalidCertificate(CertificateError::Other(OtherError(Arc::new(err))))
}

/// Recover a pinning failure from a rustls error, if that is what it was
pub(crate) fn trust_error_from_tls(err: &rustls::Error) -> Option<TrustError> {
    match err {
        rustls::Error::InvalidCertificate(CertificateError::Other(other)) => {
            other.0.downcast_ref::<TrustError>().cloned()
        }
        _ => None,
    }
}

impl ServerCertVerifier for PinnedTrustEvaluator {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        match self.evaluate(std::slice::from_ref(end_entity)) {
            Ok(()) => {
                debug!("Server {:?} matched pinned key", server_name);
                Ok(ServerCertVerified::assertion())
            }
            Err(e) => {
                warn!("Rejecting server {:?}: {}", server_name, e);
                Err(trust_error_to_tls(e))
            }
        }
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(message, cert, dss, &self.algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(message, cert, dss, &self.algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.algorithms.supported_schemes()
    }
}
