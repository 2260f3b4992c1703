//! Header index locator.
//!
//! Finds, within the raw header bytes of one email, the byte offset of the
//! recipient field's address portion and the offset of the email domain
//! inside it. A downstream proof circuit indexes into the same byte buffer
//! and asserts the domain was genuinely present at that offset, so both
//! offsets are absolute into the header buffer and byte-exact.
//!
//! The search is pure and deterministic: header bytes are treated as a fixed
//! single-byte-per-character address space, matching how the circuit packs
//! them. No locale or encoding dependent behavior.

use once_cell::sync::Lazy;
use regex::bytes::Regex;
use thiserror::Error;

/// Default recipient-field anchor.
///
/// Matching is case-sensitive: a corpus with lowercased header names must
/// pass its own preselector (e.g. `"to:"`) explicitly rather than rely on
/// whichever case happens to match.
pub const TO_PRESELECTOR: &str = "To: ";

/// Byte offsets of the recipient address and its domain, both measured from
/// the start of the header buffer. `domain_start >= field_start` always
/// holds on success.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldLocation {
    /// Offset immediately after the preselector, i.e. where the address
    /// portion of the recipient field begins.
    pub field_start: usize,
    /// Offset of the first byte of the domain substring.
    pub domain_start: usize,
    /// Length of the domain substring in bytes.
    pub domain_len: usize,
}

impl FieldLocation {
    /// The domain bytes this location points at.
    pub fn domain_bytes<'a>(&self, header: &'a [u8]) -> &'a [u8] {
        &header[self.domain_start..self.domain_start + self.domain_len]
    }
}

/// Structural failures. Either one means no valid proof input can be built
/// from this header — callers must not substitute default offsets.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LocateError {
    #[error("recipient field {0:?} not found in header")]
    FieldNotFound(String),
    #[error("no email address found after recipient field")]
    AddressNotFound,
}

// Permissive local part, domain restricted to alphanumerics, dots and
// hyphens. Only the domain is captured.
static ADDRESS_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[A-Za-z0-9!#$%&'*+=?\-\^_`{|}~./]+@([A-Za-z0-9.\-]+)").unwrap()
});

/// Locate the recipient address and its domain within `header`.
///
/// Finds the first occurrence of `preselector` (case-sensitive byte match),
/// then matches an address-shaped token over the remaining bytes. On success
/// `header[domain_start..domain_start + domain_len]` equals the captured
/// domain exactly.
pub fn locate(header: &[u8], preselector: &[u8]) -> Result<FieldLocation, LocateError> {
    let at = find(header, preselector).ok_or_else(|| {
        LocateError::FieldNotFound(String::from_utf8_lossy(preselector).into_owned())
    })?;
    let field_start = at + preselector.len();
    let remaining = &header[field_start..];

    let caps = ADDRESS_PATTERN
        .captures(remaining)
        .ok_or(LocateError::AddressNotFound)?;
    // Group 1 is non-optional in the pattern, so it is present in any match.
    let domain = caps.get(1).unwrap();

    Ok(FieldLocation {
        field_start,
        domain_start: field_start + domain.start(),
        domain_len: domain.len(),
    })
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &[u8] =
        b"From: bob@sender.org\r\nTo: alice@openblocklabs.com\r\nSubject: hi\r\n";

    #[test]
    fn locates_field_and_domain() {
        let loc = locate(HEADER, TO_PRESELECTOR.as_bytes()).unwrap();
        // "From: bob@sender.org\r\n" is 22 bytes, "To: " is 4 more.
        assert_eq!(loc.field_start, 26);
        // Domain starts after "alice@".
        assert_eq!(loc.domain_start, 26 + "alice@".len());
        assert_eq!(loc.domain_len, "openblocklabs.com".len());
    }

    #[test]
    fn domain_offset_is_self_consistent() {
        let loc = locate(HEADER, TO_PRESELECTOR.as_bytes()).unwrap();
        assert_eq!(loc.domain_bytes(HEADER), b"openblocklabs.com");
    }

    #[test]
    fn mutated_offset_breaks_self_consistency() {
        // Crate-side counterpart of the circuit's negative-path assertion:
        // shifting the located offset must break the byte equality the
        // circuit enforces.
        let loc = locate(HEADER, TO_PRESELECTOR.as_bytes()).unwrap();
        let shifted = &HEADER[loc.domain_start + 1..loc.domain_start + 1 + loc.domain_len];
        assert_ne!(shifted, b"openblocklabs.com");
    }

    #[test]
    fn field_start_is_byte_after_preselector() {
        let header = b"To: alice@openblocklabs.com\r\n";
        let loc = locate(header, b"To: ").unwrap();
        assert_eq!(loc.field_start, 4);
        assert_eq!(loc.domain_start, 4 + "alice@".len());
    }

    #[test]
    fn missing_field_is_structural_failure() {
        let header = b"From: bob@sender.org\r\nSubject: hi\r\n";
        let err = locate(header, TO_PRESELECTOR.as_bytes()).unwrap_err();
        assert_eq!(err, LocateError::FieldNotFound("To: ".to_string()));
    }

    #[test]
    fn preselector_match_is_case_sensitive() {
        let header = b"to: alice@openblocklabs.com\r\n";
        let err = locate(header, TO_PRESELECTOR.as_bytes()).unwrap_err();
        assert!(matches!(err, LocateError::FieldNotFound(_)));
        // The lowercased corpus passes its own preselector instead.
        assert!(locate(header, b"to: ").is_ok());
    }

    #[test]
    fn field_without_address_is_structural_failure() {
        let header = b"To: undisclosed recipients;;\r\n";
        let err = locate(header, TO_PRESELECTOR.as_bytes()).unwrap_err();
        assert_eq!(err, LocateError::AddressNotFound);
    }

    #[test]
    fn first_preselector_occurrence_wins() {
        let header = b"To: a@first.com\r\nTo: b@second.com\r\n";
        let loc = locate(header, b"To: ").unwrap();
        assert_eq!(loc.domain_bytes(header), b"first.com");
    }

    #[test]
    fn display_name_before_address() {
        let header = b"To: Alice Example <alice@openblocklabs.com>\r\n";
        let loc = locate(header, b"To: ").unwrap();
        assert_eq!(loc.domain_bytes(header), b"openblocklabs.com");
    }

    #[test]
    fn empty_header_fails() {
        assert!(matches!(
            locate(b"", b"To: "),
            Err(LocateError::FieldNotFound(_))
        ));
    }

    #[test]
    fn deterministic_across_calls() {
        let a = locate(HEADER, TO_PRESELECTOR.as_bytes()).unwrap();
        let b = locate(HEADER, TO_PRESELECTOR.as_bytes()).unwrap();
        assert_eq!(a, b);
    }
}
