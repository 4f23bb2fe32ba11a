//! Public key format helpers
//!
//! For callers deriving or converting pins outside the handshake. The pinning
//! path itself compares hashes of the SubjectPublicKeyInfo and never calls
//! these conversions.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use tracing::debug;
use x509_parser::oid_registry::OID_PKCS1_RSAENCRYPTION;
use x509_parser::prelude::FromDer;
use x509_parser::x509::SubjectPublicKeyInfo;

pub use crate::pinning::{leaf_key_hash, spki_sha256_base64};

/// Unwrap an RSA SubjectPublicKeyInfo to its PKCS#1 `RSAPublicKey`
///
/// `key_b64` is standard base64. If it decodes to an RSA SPKI, the base64 of
/// the inner key is returned. Any other input (non-RSA keys, bare PKCS#1,
/// invalid base64) comes back unchanged.
pub fn pkcs8_to_pkcs1_if_needed(key_b64: &str) -> String {
    let Ok(der) = STANDARD.decode(key_b64) else {
        debug!("Key is not valid base64, leaving unchanged");
        return key_b64.to_string();
    };

    let spki = match SubjectPublicKeyInfo::from_der(&der) {
        Ok((rest, spki)) if rest.is_empty() => spki,
        _ => return key_b64.to_string(),
    };

    if spki.algorithm.algorithm != OID_PKCS1_RSAENCRYPTION {
        return key_b64.to_string();
    }
    if spki.subject_public_key.unused_bits != 0 {
        debug!("RSA key bit string has unused bits, leaving unchanged");
        return key_b64.to_string();
    }

    STANDARD.encode(spki.subject_public_key.data.as_ref())
}
