//! DKIM-Signature header tag parsing, limited to the tags the extraction
//! pipeline needs (`d=`, `s=`, `b=`, `h=`, `c=`). Body-hash tags are
//! deliberately ignored: body verification is skipped by contract.

use base64::Engine;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SignatureParseError {
    #[error("missing required tag: {0}")]
    MissingTag(&'static str),
    #[error("invalid base64 in b=: {0}")]
    InvalidBase64(String),
    #[error("invalid canonicalization: {0}")]
    InvalidCanonicalization(String),
}

/// Canonicalization method for the signed header bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CanonicalizationMethod {
    #[default]
    Simple,
    Relaxed,
}

/// The subset of a DKIM-Signature header the extractor acts on.
#[derive(Debug, Clone)]
pub struct SignatureTags {
    pub domain: String,
    pub selector: String,
    pub signature: Vec<u8>,
    pub signed_headers: Vec<String>,
    pub header_canonicalization: CanonicalizationMethod,
}

impl SignatureTags {
    pub fn parse(header_value: &str) -> Result<Self, SignatureParseError> {
        let tags = parse_tag_list(header_value);
        let get = |name: &str| -> Option<&str> {
            tags.iter().find(|(n, _)| n == name).map(|(_, v)| v.as_str())
        };

        let domain = get("d")
            .ok_or(SignatureParseError::MissingTag("d"))?
            .to_string();
        let selector = get("s")
            .ok_or(SignatureParseError::MissingTag("s"))?
            .to_string();

        let b = get("b").ok_or(SignatureParseError::MissingTag("b"))?;
        let cleaned: String = b.chars().filter(|c| !c.is_ascii_whitespace()).collect();
        let signature = base64::engine::general_purpose::STANDARD
            .decode(&cleaned)
            .map_err(|e| SignatureParseError::InvalidBase64(e.to_string()))?;

        let signed_headers: Vec<String> = get("h")
            .ok_or(SignatureParseError::MissingTag("h"))?
            .split(':')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        if signed_headers.is_empty() {
            return Err(SignatureParseError::MissingTag("h"));
        }

        // c= is "<header>/<body>" or "<header>"; only the header half
        // matters here. Default per RFC 6376 is simple/simple.
        let header_canonicalization = match get("c") {
            None => CanonicalizationMethod::Simple,
            Some(c) => {
                let header_half = c.split('/').next().unwrap_or(c).trim();
                match header_half {
                    "simple" => CanonicalizationMethod::Simple,
                    "relaxed" => CanonicalizationMethod::Relaxed,
                    other => {
                        return Err(SignatureParseError::InvalidCanonicalization(
                            other.to_string(),
                        ))
                    }
                }
            }
        };

        Ok(Self {
            domain,
            selector,
            signature,
            signed_headers,
            header_canonicalization,
        })
    }
}

/// Parse tag=value pairs from a DKIM header value.
/// Handles folded headers (CRLF+WSP) and whitespace around tags/values.
pub fn parse_tag_list(input: &str) -> Vec<(String, String)> {
    let unfolded = unfold(input);

    let mut tags = Vec::new();
    for part in unfolded.split(';') {
        let trimmed = part.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some((name, value)) = trimmed.split_once('=') {
            tags.push((name.trim().to_string(), value.trim().to_string()));
        }
    }
    tags
}

/// Unfold a header value: remove CRLF when followed by whitespace.
/// Copies around the dropped ASCII bytes, so non-ASCII values survive
/// untouched.
fn unfold(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let bytes = s.as_bytes();
    let mut start = 0;
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\r'
            && i + 2 < bytes.len()
            && bytes[i + 1] == b'\n'
            && (bytes[i + 2] == b' ' || bytes[i + 2] == b'\t')
        {
            // Splits only at the CR byte, always a char boundary.
            result.push_str(&s[start..i]);
            i += 2; // drop the CRLF, keep the WSP
            start = i;
        } else {
            i += 1;
        }
    }
    result.push_str(&s[start..]);
    result
}
