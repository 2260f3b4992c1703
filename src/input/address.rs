//! Claimant address conversion.
//!
//! The claimant is identified by a fixed-length 20-byte hexadecimal value.
//! The circuit consumes it as a decimal string of the big-endian unsigned
//! integer those bytes encode. The conversion is exact: malformed input is
//! rejected, never truncated or wrapped.

use rsa::BigUint;
use thiserror::Error;

/// Fixed claimant identifier width.
pub const ADDRESS_BYTE_LENGTH: usize = 20;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AddressError {
    #[error("claimant address must be {} hex digits, got {0}", ADDRESS_BYTE_LENGTH * 2)]
    BadLength(usize),
    #[error("claimant address is not valid hex: {0}")]
    BadHex(String),
}

/// Parse a claimant address (`0x`-prefixed or bare) into its 20 bytes.
pub fn parse_claimant_address(addr: &str) -> Result<[u8; ADDRESS_BYTE_LENGTH], AddressError> {
    let digits = addr
        .strip_prefix("0x")
        .or_else(|| addr.strip_prefix("0X"))
        .unwrap_or(addr);
    if digits.len() != ADDRESS_BYTE_LENGTH * 2 {
        return Err(AddressError::BadLength(digits.len()));
    }
    let decoded = hex::decode(digits).map_err(|e| AddressError::BadHex(e.to_string()))?;
    let mut bytes = [0u8; ADDRESS_BYTE_LENGTH];
    bytes.copy_from_slice(&decoded);
    Ok(bytes)
}

/// Convert a claimant address to the decimal string the circuit consumes.
pub fn claimant_address_to_decimal(addr: &str) -> Result<String, AddressError> {
    let bytes = parse_claimant_address(addr)?;
    Ok(BigUint::from_bytes_be(&bytes).to_string())
}
