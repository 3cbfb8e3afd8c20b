//!
//! Utility module for the account client.
//!
//! Amount formatting and parsing, serde helpers for wire amounts, and shared HTTP plumbing.
/// Serde helpers for string-encoded amounts
pub mod amount;
/// HTTP client construction and response decoding
pub mod http;
/// Utility functions for formatting and display
pub mod index;

pub use amount::u128_string;
pub use index::{format_token_amount, parse_units};

/// Returns true for a `0x`-prefixed 20-byte hex address.
pub fn is_eth_address(value: &str) -> bool {
	is_prefixed_hex(value, 20)
}

/// Returns true for a `0x`-prefixed 32-byte hex public key.
pub fn is_public_key(value: &str) -> bool {
	is_prefixed_hex(value, 32)
}

fn is_prefixed_hex(value: &str, bytes: usize) -> bool {
	value
		.strip_prefix("0x")
		.or_else(|| value.strip_prefix("0X"))
		.is_some_and(|hex| hex.len() == bytes * 2 && hex.bytes().all(|b| b.is_ascii_hexdigit()))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_address_shapes() {
		assert!(is_eth_address("0x81f3843aF1FBaB046B771f0d440C04EBB2b7513F"));
		assert!(!is_eth_address("0x81f3843aF1FBaB046B771f0d440C04EBB2b7513"));
		assert!(!is_eth_address("81f3843aF1FBaB046B771f0d440C04EBB2b7513F"));
		assert!(is_public_key(&format!("0x{}", "ab".repeat(32))));
		assert!(!is_public_key("0x81f3843aF1FBaB046B771f0d440C04EBB2b7513F"));
	}
}
