//! Proof input assembly.
//!
//! Merges the extraction collaborator's output, the header index locator's
//! offsets, and the claimant address into the record the external witness
//! and proving pipeline consumes. Field names and encodings must match that
//! pipeline exactly: header bytes as decimal byte strings padded to the
//! circuit width, lengths and offsets as decimal strings, signature and
//! public key as fixed chunks.

mod address;

pub use address::{claimant_address_to_decimal, parse_claimant_address, AddressError,
    ADDRESS_BYTE_LENGTH};

use rsa::BigUint;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::extract::{EmailExtractor, ExtractError};
use crate::header::{locate, LocateError};

/// Fixed header width of the circuit buffer.
pub const MAX_HEADER_BYTES: usize = 1024;
/// Signature and public key are packed as 17 chunks of 121 bits each.
pub const KEY_CHUNK_BITS: usize = 121;
pub const KEY_CHUNK_COUNT: usize = 17;

/// The assembled proof-input record. Created once per proof request and
/// never mutated after assembly; serialized field names match the witness
/// pipeline's expectations.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProofInputRecord {
    pub email_header: Vec<String>,
    pub email_header_length: String,
    pub pubkey: Vec<String>,
    pub signature: Vec<String>,
    pub to_addr_index: String,
    pub domain_index: String,
    pub address: String,
}

#[derive(Debug, Error)]
pub enum AssembleError {
    #[error(transparent)]
    Extract(#[from] ExtractError),
    #[error(transparent)]
    Locate(#[from] LocateError),
    #[error(transparent)]
    Address(#[from] AddressError),
    #[error("header is {len} bytes, circuit accepts at most {max}")]
    HeaderTooLong { len: usize, max: usize },
    #[error("value is {bits} bits, chunk encoding holds at most {max}")]
    ValueTooWide { bits: usize, max: usize },
}

/// Split a big integer into `count` chunks of `bits` bits, least
/// significant chunk first, each rendered as a decimal string. This is the
/// fixed-width numeric encoding the circuit uses for RSA-sized values.
///
/// A value wider than `bits * count` is rejected: dropping its high bits
/// would yield a well-formed but wrong proof input.
pub fn chunk_biguint(value: &BigUint, bits: usize, count: usize) -> Result<Vec<String>, AssembleError> {
    if value.bits() > bits * count {
        return Err(AssembleError::ValueTooWide {
            bits: value.bits(),
            max: bits * count,
        });
    }
    let mask = (BigUint::from(1u8) << bits) - BigUint::from(1u8);
    let mut rest = value.clone();
    let mut chunks = Vec::with_capacity(count);
    for _ in 0..count {
        chunks.push((&rest & &mask).to_string());
        rest >>= bits;
    }
    Ok(chunks)
}

/// Header bytes as decimal byte strings, zero-padded to the circuit width.
fn pack_header(header: &[u8]) -> Result<Vec<String>, AssembleError> {
    if header.len() > MAX_HEADER_BYTES {
        return Err(AssembleError::HeaderTooLong {
            len: header.len(),
            max: MAX_HEADER_BYTES,
        });
    }
    let mut packed: Vec<String> = header.iter().map(|b| b.to_string()).collect();
    packed.resize(MAX_HEADER_BYTES, "0".to_string());
    Ok(packed)
}

/// Assemble one proof-input record.
///
/// Runs the extraction collaborator (body-hash checking skipped by its
/// contract), locates the recipient-field offsets in the extracted header
/// bytes, and converts the claimant address. Either locator hard failure
/// propagates — a record with missing indices is meaningless and is never
/// emitted.
pub async fn assemble<E: EmailExtractor>(
    extractor: &E,
    raw_email: &[u8],
    claimant_address: &str,
    preselector: &str,
) -> Result<ProofInputRecord, AssembleError> {
    let extracted = extractor.extract(raw_email).await?;
    let location = locate(&extracted.header_bytes, preselector.as_bytes())?;
    let address = claimant_address_to_decimal(claimant_address)?;

    debug!(
        domain = %extracted.signing_domain,
        field_start = location.field_start,
        domain_start = location.domain_start,
        "assembling proof input"
    );

    let email_header = pack_header(&extracted.header_bytes)?;
    let signature_int = BigUint::from_bytes_be(&extracted.signature);

    Ok(ProofInputRecord {
        email_header,
        email_header_length: extracted.header_bytes.len().to_string(),
        pubkey: chunk_biguint(&extracted.pubkey_modulus, KEY_CHUNK_BITS, KEY_CHUNK_COUNT)?,
        signature: chunk_biguint(&signature_int, KEY_CHUNK_BITS, KEY_CHUNK_COUNT)?,
        to_addr_index: location.field_start.to_string(),
        domain_index: location.domain_start.to_string(),
        address,
    })
}
