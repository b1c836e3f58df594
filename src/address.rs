//! Address formatting and integer conversion
//!
//! Addresses are 20 bytes. Their canonical text form is `0x` followed by
//! 40 lowercase hex digits, and they map one-to-one onto 160-bit integers.
//! No checksum or on-chain existence validation happens here.

use alloy_primitives::{Address, U160};
use anyhow::{Context, Result};

/// Length of the canonical text form, prefix included.
pub const ADDRESS_STRING_LEN: usize = 42;

/// Parse an address from a hex string.
///
/// Accepts addresses with or without 0x prefix, in any case.
pub fn parse_address(s: &str) -> Result<Address> {
    let s = s.trim();
    let s = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    let bytes = hex::decode(s).with_context(|| format!("Invalid hex address: {}", s))?;

    if bytes.len() != 20 {
        anyhow::bail!(
            "Address must be 20 bytes (40 hex chars), got {} bytes",
            bytes.len()
        );
    }

    Ok(Address::from_slice(&bytes))
}

/// Canonical lowercase `0x`-prefixed form.
pub fn format_address(address: &Address) -> String {
    format!("0x{}", hex::encode(address.as_slice()))
}

/// Interpret the address bytes as a big-endian 160-bit integer.
pub fn address_to_int(address: &Address) -> U160 {
    U160::from_be_slice(address.as_slice())
}

/// Inverse of [`address_to_int`].
pub fn int_to_address(value: U160) -> Address {
    Address::from_slice(&value.to_be_bytes_vec())
}

/// Parse an address string into its integer value.
pub fn to_big_int(address: &str) -> Result<U160> {
    parse_address(address).map(|addr| address_to_int(&addr))
}

/// Render an integer as a zero-padded canonical address string.
pub fn to_address(value: U160) -> String {
    format_address(&int_to_address(value))
}
