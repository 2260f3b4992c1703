//! DKIM TXT record key material extraction and RSA modulus parsing.
//!
//! A DKIM key record carries its key as base64 SPKI in the `p=` tag. The
//! published material is re-wrapped into the standard PEM public-key
//! envelope at 64 columns and parsed as an RSA public key; only the modulus
//! is part of the output contract.

use base64::Engine;
use rsa::pkcs8::DecodePublicKey;
use rsa::traits::PublicKeyParts;
use rsa::{BigUint, RsaPublicKey};
use thiserror::Error;

const PEM_LINE_WIDTH: usize = 64;

#[derive(Debug, Error)]
pub enum KeyParseError {
    #[error("no p= tag in DKIM record")]
    MissingKeyTag,
    #[error("empty p= tag (key revoked)")]
    RevokedKey,
    #[error("invalid base64 in p=: {0}")]
    InvalidBase64(String),
    #[error("not an RSA public key: {0}")]
    NotRsa(String),
}

/// Extract the base64 key material following `p=`, up to the next `;` or
/// end of record. Whitespace inside the value (from TXT string splits) is
/// preserved here and stripped during decoding.
pub fn extract_key_material(txt: &str) -> Option<&str> {
    let start = txt.find("p=")? + 2;
    let rest = &txt[start..];
    let end = rest.find(';').unwrap_or(rest.len());
    Some(rest[..end].trim())
}

/// Wrap raw key bytes in the standard PEM public-key envelope.
pub fn wrap_pem(der: &[u8]) -> String {
    let b64 = base64::engine::general_purpose::STANDARD.encode(der);
    let mut pem = String::with_capacity(b64.len() + 64);
    pem.push_str("-----BEGIN PUBLIC KEY-----\n");
    for chunk in b64.as_bytes().chunks(PEM_LINE_WIDTH) {
        // b64 is ASCII, so chunk boundaries are char boundaries.
        pem.push_str(std::str::from_utf8(chunk).unwrap());
        pem.push('\n');
    }
    pem.push_str("-----END PUBLIC KEY-----\n");
    pem
}

/// Parse the modulus of the RSA key a DKIM TXT record publishes.
///
/// `txt` is the concatenation of all strings of one TXT record.
pub fn modulus_from_txt(txt: &str) -> Result<BigUint, KeyParseError> {
    let material = extract_key_material(txt).ok_or(KeyParseError::MissingKeyTag)?;
    if material.is_empty() {
        return Err(KeyParseError::RevokedKey);
    }

    // Decode and re-encode rather than trusting the published formatting:
    // TXT string splits may inject whitespace mid-value.
    let cleaned: String = material.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    let der = base64::engine::general_purpose::STANDARD
        .decode(&cleaned)
        .map_err(|e| KeyParseError::InvalidBase64(e.to_string()))?;

    let pem = wrap_pem(&der);
    let key = RsaPublicKey::from_public_key_pem(&pem)
        .map_err(|e| KeyParseError::NotRsa(e.to_string()))?;
    Ok(key.n().clone())
}
