//! Header/signature extraction collaborator.
//!
//! Given a raw email, reconstructs the exact header byte string the DKIM
//! signer hashed (the buffer the proof circuit indexes into), decodes the
//! signature, and resolves the signer's public key. Body-hash verification
//! is skipped by contract: a body hash the caller does not care about must
//! not block an otherwise valid domain proof.

mod canon;
mod signature;

pub use canon::{canonicalize_header, normalize_line_endings, select_headers, strip_b_tag_value};
pub use signature::{CanonicalizationMethod, SignatureParseError, SignatureTags};

use std::future::Future;

use rsa::BigUint;
use thiserror::Error;
use tracing::debug;

use crate::common::dns::DnsResolver;
use crate::dkim::resolve_public_key;

/// Extraction output: the signed header bytes plus everything else the
/// proof-input record needs from the signature side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedEmail {
    /// The canonicalized header byte string, exactly as hashed by the
    /// signer. All proof-input offsets index into this buffer.
    pub header_bytes: Vec<u8>,
    /// Raw message body (line endings normalized). Unused when body-hash
    /// checking is skipped, carried for callers that persist it.
    pub body_bytes: Vec<u8>,
    /// Decoded b= signature bytes.
    pub signature: Vec<u8>,
    /// Modulus of the signer's published RSA key.
    pub pubkey_modulus: BigUint,
    pub signing_domain: String,
    pub selector: String,
}

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("raw email is not valid UTF-8")]
    InvalidUtf8,
    #[error("no DKIM-Signature header in message")]
    NoDkimSignature,
    #[error(transparent)]
    Signature(#[from] SignatureParseError),
    #[error("no DKIM key published for {selector}._domainkey.{domain}")]
    KeyNotFound { domain: String, selector: String },
}

/// Extraction seam. The assembler only depends on this trait; production
/// code uses [`DkimExtractor`], tests use [`MockExtractor`].
pub trait EmailExtractor: Send + Sync {
    fn extract(
        &self,
        raw_email: &[u8],
    ) -> impl Future<Output = Result<ExtractedEmail, ExtractError>> + Send;
}

/// Extractor backed by the first DKIM-Signature header of the message.
#[derive(Clone)]
pub struct DkimExtractor<R: DnsResolver> {
    resolver: R,
}

impl<R: DnsResolver> DkimExtractor<R> {
    pub fn new(resolver: R) -> Self {
        Self { resolver }
    }
}

impl<R: DnsResolver> EmailExtractor for DkimExtractor<R> {
    async fn extract(&self, raw_email: &[u8]) -> Result<ExtractedEmail, ExtractError> {
        let normalized = normalize_line_endings(raw_email);
        let message = std::str::from_utf8(&normalized).map_err(|_| ExtractError::InvalidUtf8)?;

        let (header_block, body) = split_message(message);
        let headers = parse_headers(header_block);

        let sig_idx = headers
            .iter()
            .position(|(name, _)| name.eq_ignore_ascii_case("dkim-signature"))
            .ok_or(ExtractError::NoDkimSignature)?;
        let tags = SignatureTags::parse(&headers[sig_idx].1)?;
        debug!(
            domain = %tags.domain,
            selector = %tags.selector,
            "extracting signed header bytes"
        );

        let header_bytes = signed_header_bytes(&headers, &tags, sig_idx);

        let pubkey_modulus = resolve_public_key(&self.resolver, &tags.domain, &tags.selector)
            .await
            .ok_or_else(|| ExtractError::KeyNotFound {
                domain: tags.domain.clone(),
                selector: tags.selector.clone(),
            })?;

        Ok(ExtractedEmail {
            header_bytes,
            body_bytes: body.as_bytes().to_vec(),
            signature: tags.signature,
            pubkey_modulus,
            signing_domain: tags.domain,
            selector: tags.selector,
        })
    }
}

/// Split a message at the first blank line. Returns (header block, body);
/// the header block keeps its trailing CRLF.
fn split_message(message: &str) -> (&str, &str) {
    match message.find("\r\n\r\n") {
        Some(pos) => (&message[..pos + 2], &message[pos + 4..]),
        None => (message, ""),
    }
}

/// Parse a header block into (name, value) pairs in message order.
/// Folded continuation lines stay part of the value, with their CRLF+WSP
/// preserved so simple canonicalization can reproduce the original bytes.
fn parse_headers(header_block: &str) -> Vec<(String, String)> {
    let mut headers: Vec<(String, String)> = Vec::new();

    for line in header_block.split_inclusive("\r\n") {
        let content = line.strip_suffix("\r\n").unwrap_or(line);
        if content.starts_with(' ') || content.starts_with('\t') {
            if let Some((_, value)) = headers.last_mut() {
                value.push_str("\r\n");
                value.push_str(content);
            }
            continue;
        }
        if let Some((name, value)) = content.split_once(':') {
            headers.push((name.to_string(), value.to_string()));
        }
    }
    headers
}

/// Rebuild the byte string the signer hashed: the h= headers in order, then
/// the DKIM-Signature header itself with the b= value emptied, without a
/// trailing CRLF.
fn signed_header_bytes(
    headers: &[(String, String)],
    tags: &SignatureTags,
    sig_idx: usize,
) -> Vec<u8> {
    let message_headers: Vec<(&str, &str)> = headers
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != sig_idx)
        .map(|(_, (name, value))| (name.as_str(), value.as_str()))
        .collect();

    let selected = select_headers(
        tags.header_canonicalization,
        &tags.signed_headers,
        &message_headers,
    );

    let mut out = Vec::new();
    for line in &selected {
        out.extend_from_slice(line.as_bytes());
    }

    let (sig_name, sig_value) = &headers[sig_idx];
    let stripped = strip_b_tag_value(sig_value);
    let canon_sig = match tags.header_canonicalization {
        // Simple preserves the original header name casing.
        CanonicalizationMethod::Simple => format!("{}:{}", sig_name, stripped),
        CanonicalizationMethod::Relaxed => {
            canonicalize_header(CanonicalizationMethod::Relaxed, "dkim-signature", &stripped)
        }
    };
    out.extend_from_slice(canon_sig.as_bytes());
    out
}

/// Canned extractor for assembler tests.
#[derive(Clone)]
pub struct MockExtractor {
    output: ExtractedEmail,
}

impl MockExtractor {
    pub fn new(output: ExtractedEmail) -> Self {
        Self { output }
    }
}

impl EmailExtractor for MockExtractor {
    async fn extract(&self, _raw_email: &[u8]) -> Result<ExtractedEmail, ExtractError> {
        Ok(self.output.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::dns::MockResolver;
    use base64::Engine;

    // n=3233, e=17 SPKI; see dkim::key tests for the DER layout.
    const TINY_RSA_SPKI: &[u8] = &[
        0x30, 0x1b, 0x30, 0x0d, 0x06, 0x09, 0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x01, 0x01, 0x01,
        0x05, 0x00, 0x03, 0x0a, 0x00, 0x30, 0x07, 0x02, 0x02, 0x0c, 0xa1, 0x02, 0x01, 0x11,
    ];

    fn publish_key(resolver: &MockResolver, domain: &str, selector: &str) {
        let b64 = base64::engine::general_purpose::STANDARD.encode(TINY_RSA_SPKI);
        resolver.add_txt(
            &format!("{}._domainkey.{}", selector, domain),
            vec![format!("v=DKIM1; k=rsa; p={}", b64)],
        );
    }

    fn test_email() -> String {
        concat!(
            "From: Bob <bob@sender.org>\r\n",
            "To: alice@openblocklabs.com\r\n",
            "Subject: hello\r\n",
            "DKIM-Signature: v=1; a=rsa-sha256; c=relaxed/relaxed; d=example.com;\r\n",
            " s=google; h=from:to:subject; bh=ZmFrZQ==; b=c2lnbmF0dXJl\r\n",
            "\r\n",
            "body text\r\n",
        )
        .to_string()
    }

    #[tokio::test]
    async fn extracts_signed_header_bytes() {
        let resolver = MockResolver::new();
        publish_key(&resolver, "example.com", "google");

        let extractor = DkimExtractor::new(resolver);
        let out = extractor.extract(test_email().as_bytes()).await.unwrap();

        let text = String::from_utf8(out.header_bytes.clone()).unwrap();
        assert!(text.starts_with("from:Bob <bob@sender.org>\r\n"));
        assert!(text.contains("to:alice@openblocklabs.com\r\n"));
        assert!(text.contains("subject:hello\r\n"));
        // DKIM-Signature comes last, b= emptied, no trailing CRLF.
        assert!(text.contains("dkim-signature:"));
        assert!(text.ends_with("b="));
        assert!(!text.contains("c2lnbmF0dXJl"));

        assert_eq!(out.signature, b"signature");
        assert_eq!(out.signing_domain, "example.com");
        assert_eq!(out.selector, "google");
        assert_eq!(out.pubkey_modulus, BigUint::from(3233u32));
        assert_eq!(out.body_bytes, b"body text\r\n");
    }

    #[tokio::test]
    async fn locator_finds_recipient_in_extracted_header() {
        // The two pipelines meet here: offsets located in the extracted
        // buffer must be self-consistent with its bytes.
        let resolver = MockResolver::new();
        publish_key(&resolver, "example.com", "google");

        let extractor = DkimExtractor::new(resolver);
        let out = extractor.extract(test_email().as_bytes()).await.unwrap();

        // Relaxed canonicalization lowercases the field name.
        let loc = crate::header::locate(&out.header_bytes, b"to:").unwrap();
        assert_eq!(loc.domain_bytes(&out.header_bytes), b"openblocklabs.com");
    }

    #[tokio::test]
    async fn bare_lf_email_is_normalized() {
        let resolver = MockResolver::new();
        publish_key(&resolver, "example.com", "google");

        let extractor = DkimExtractor::new(resolver);
        let email = test_email().replace("\r\n", "\n");
        let out = extractor.extract(email.as_bytes()).await.unwrap();
        assert!(String::from_utf8(out.header_bytes).unwrap().contains("to:alice@openblocklabs.com"));
    }

    #[tokio::test]
    async fn message_without_signature_is_rejected() {
        let extractor = DkimExtractor::new(MockResolver::new());
        let err = extractor
            .extract(b"From: a@b.com\r\nTo: c@d.com\r\n\r\nhi\r\n")
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractError::NoDkimSignature));
    }

    #[tokio::test]
    async fn unresolvable_key_is_rejected() {
        let resolver = MockResolver::new();
        resolver.set_nxdomain("google._domainkey.example.com");

        let extractor = DkimExtractor::new(resolver);
        let err = extractor.extract(test_email().as_bytes()).await.unwrap_err();
        assert!(matches!(
            err,
            ExtractError::KeyNotFound { ref domain, ref selector }
                if domain == "example.com" && selector == "google"
        ));
    }

    #[test]
    fn split_keeps_header_trailing_crlf() {
        let (header, body) = split_message("A: 1\r\nB: 2\r\n\r\nbody");
        assert_eq!(header, "A: 1\r\nB: 2\r\n");
        assert_eq!(body, "body");
    }

    #[test]
    fn parse_headers_preserves_folds() {
        let headers = parse_headers("A: one\r\n two\r\nB: three\r\n");
        assert_eq!(headers.len(), 2);
        assert_eq!(headers[0], ("A".to_string(), " one\r\n two".to_string()));
        assert_eq!(headers[1], ("B".to_string(), " three".to_string()));
    }
}
