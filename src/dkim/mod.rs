//! DKIM public key discovery.
//!
//! Resolves the RSA modulus a domain publishes under
//! `<selector>._domainkey.<domain>`, either for one known selector or by
//! probing a catalog of common selector names concurrently.

mod discover;
mod key;

pub use discover::{KeyDiscovery, SELECTOR_CATALOG};
pub use key::{extract_key_material, modulus_from_txt, wrap_pem, KeyParseError};

use rsa::BigUint;
use serde::{Serialize, Serializer};
use tracing::{debug, warn};

use crate::common::dns::DnsResolver;

/// One successfully resolved (domain, selector) key pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DkimKeyRecord {
    #[serde(skip)]
    pub domain: String,
    pub selector: String,
    #[serde(rename = "publicKey", serialize_with = "serialize_modulus")]
    pub modulus: BigUint,
}

fn serialize_modulus<S: Serializer>(modulus: &BigUint, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&modulus.to_string())
}

/// Resolve the RSA modulus published for `(domain, selector)`.
///
/// Every failure mode — resolution error, empty answer, missing `p=`,
/// unparseable key — is a non-fatal "no key for this selector" outcome,
/// reported as `None` so sibling probes are unaffected.
pub async fn resolve_public_key<R: DnsResolver>(
    resolver: &R,
    domain: &str,
    selector: &str,
) -> Option<BigUint> {
    let query = format!("{}._domainkey.{}", selector, domain);

    let records = match resolver.query_txt(&query).await {
        Ok(r) => r,
        Err(e) => {
            debug!(%query, %e, "no DKIM record for selector");
            return None;
        }
    };
    // Each answer entry is one TXT record with its character-strings
    // already concatenated. Only the first record is read: a stray extra
    // record at the same name (an SPF string, say) must not bleed into
    // the key material.
    let Some(txt) = records.first() else {
        debug!(%query, "empty TXT answer");
        return None;
    };

    match modulus_from_txt(txt) {
        Ok(modulus) => Some(modulus),
        Err(e) => {
            warn!(%query, %e, "unusable DKIM record");
            None
        }
    }
}
