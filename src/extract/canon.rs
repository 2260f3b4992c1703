//! Header canonicalization and selection for rebuilding the byte string a
//! DKIM signer hashed. That byte string is the buffer the proof circuit
//! indexes into, so it must be reproduced exactly.

use super::signature::CanonicalizationMethod;

/// Normalize bare LF to CRLF. Leaves existing CRLF intact.
/// Must be applied before any header splitting or canonicalization.
pub fn normalize_line_endings(input: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(input.len());
    let mut i = 0;
    while i < input.len() {
        if input[i] == b'\r' && i + 1 < input.len() && input[i + 1] == b'\n' {
            out.push(b'\r');
            out.push(b'\n');
            i += 2;
        } else if input[i] == b'\n' {
            out.push(b'\r');
            out.push(b'\n');
            i += 1;
        } else {
            out.push(input[i]);
            i += 1;
        }
    }
    out
}

/// Canonicalize a single header.
/// `name` is the header field name, `value` is everything after the colon.
pub fn canonicalize_header(
    method: CanonicalizationMethod,
    name: &str,
    value: &str,
) -> String {
    match method {
        CanonicalizationMethod::Simple => {
            // Simple: output as name:value, exactly as-is.
            format!("{}:{}", name, value)
        }
        CanonicalizationMethod::Relaxed => {
            // Relaxed: lowercase name, unfold, collapse WSP runs to one SP,
            // trim WSP at both ends of the value, no space around the colon.
            let lower_name = name.to_ascii_lowercase();

            let unfolded = unfold(value);

            let mut collapsed = String::with_capacity(unfolded.len());
            let mut in_wsp = false;
            for ch in unfolded.chars() {
                if ch == ' ' || ch == '\t' {
                    if !in_wsp {
                        collapsed.push(' ');
                        in_wsp = true;
                    }
                } else {
                    collapsed.push(ch);
                    in_wsp = false;
                }
            }

            let trimmed = collapsed
                .trim_matches(|c: char| c == ' ' || c == '\t');

            format!("{}:{}", lower_name, trimmed)
        }
    }
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
            i += 2;
            start = i;
        } else {
            i += 1;
        }
    }
    result.push_str(&s[start..]);
    result
}

/// Select headers for the signed byte string per the h= tag.
/// `signed_headers`: the h= list (may repeat names for over-signing).
/// `message_headers`: (name, value) pairs in message order, top first.
/// Returns canonicalized header lines, each ending with CRLF; the
/// DKIM-Signature header itself is appended separately by the caller.
pub fn select_headers(
    method: CanonicalizationMethod,
    signed_headers: &[String],
    message_headers: &[(&str, &str)],
) -> Vec<String> {
    // Repeated names are consumed bottom-up: the first h= mention takes the
    // last occurrence in the message, the next mention the one above it.
    let mut consumed: std::collections::HashMap<String, usize> = std::collections::HashMap::new();

    let mut result = Vec::new();
    for h_name in signed_headers {
        let lower = h_name.to_ascii_lowercase();
        let count = consumed.entry(lower.clone()).or_insert(0);

        let occurrences: Vec<usize> = message_headers
            .iter()
            .enumerate()
            .filter(|(_, (name, _))| name.eq_ignore_ascii_case(&lower))
            .map(|(i, _)| i)
            .collect();

        if *count < occurrences.len() {
            let idx = occurrences[occurrences.len() - 1 - *count];
            let (name, value) = message_headers[idx];
            result.push(format!("{}\r\n", canonicalize_header(method, name, value)));
            *count += 1;
        } else {
            // Over-signed: no occurrence left, contributes an empty header.
            result.push(format!("{}:\r\n", lower));
        }
    }
    result
}

/// Strip the value of the b= tag from a DKIM-Signature header value,
/// keeping `b=` itself. Leaves bh= untouched.
pub fn strip_b_tag_value(header_value: &str) -> String {
    let mut result = String::with_capacity(header_value.len());
    for (i, segment) in header_value.split(';').enumerate() {
        if i > 0 {
            result.push(';');
        }
        if let Some(eq) = segment.find('=') {
            // base64 cannot contain ';', so the whole value is in this segment.
            if segment[..eq].trim() == "b" {
                result.push_str(&segment[..eq + 1]);
                continue;
            }
        }
        result.push_str(segment);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_bare_lf() {
        assert_eq!(normalize_line_endings(b"a\nb\r\nc"), b"a\r\nb\r\nc");
    }

    #[test]
    fn simple_header_is_untouched() {
        let out = canonicalize_header(CanonicalizationMethod::Simple, "To", " Alice <a@b.com>");
        assert_eq!(out, "To: Alice <a@b.com>");
    }

    #[test]
    fn relaxed_lowercases_and_collapses() {
        let out = canonicalize_header(
            CanonicalizationMethod::Relaxed,
            "To",
            "  Alice   <a@b.com> ",
        );
        assert_eq!(out, "to:Alice <a@b.com>");
    }

    #[test]
    fn relaxed_preserves_non_ascii_values() {
        let out = canonicalize_header(
            CanonicalizationMethod::Relaxed,
            "Subject",
            " caf\u{e9} au\r\n lait",
        );
        assert_eq!(out, "subject:caf\u{e9} au lait");
    }

    #[test]
    fn relaxed_unfolds_continuation_lines() {
        let out = canonicalize_header(
            CanonicalizationMethod::Relaxed,
            "Subject",
            " one\r\n\ttwo",
        );
        assert_eq!(out, "subject:one two");
    }

    #[test]
    fn selects_headers_in_h_order() {
        let headers = [("From", " a@x.com"), ("To", " b@y.com"), ("Subject", " hi")];
        let signed = vec!["to".to_string(), "from".to_string()];
        let out = select_headers(CanonicalizationMethod::Relaxed, &signed, &headers);
        assert_eq!(out, vec!["to:b@y.com\r\n", "from:a@x.com\r\n"]);
    }

    #[test]
    fn repeated_names_are_consumed_bottom_up() {
        let headers = [("Received", " first"), ("Received", " second")];
        let signed = vec!["received".to_string(), "received".to_string()];
        let out = select_headers(CanonicalizationMethod::Relaxed, &signed, &headers);
        assert_eq!(out, vec!["received:second\r\n", "received:first\r\n"]);
    }

    #[test]
    fn over_signed_header_is_empty() {
        let headers = [("From", " a@x.com")];
        let signed = vec!["from".to_string(), "from".to_string()];
        let out = select_headers(CanonicalizationMethod::Relaxed, &signed, &headers);
        assert_eq!(out[1], "from:\r\n");
    }

    #[test]
    fn strips_b_value_only() {
        let sig = "v=1; d=example.com; bh=ZmFrZQ==; b=c2lnbmF0dXJl";
        assert_eq!(
            strip_b_tag_value(sig),
            "v=1; d=example.com; bh=ZmFrZQ==; b="
        );
    }

    #[test]
    fn strips_b_value_in_the_middle() {
        let sig = "v=1; b=c2ln; d=example.com";
        assert_eq!(strip_b_tag_value(sig), "v=1; b=; d=example.com");
    }
}
