//! Hex and address helpers shared by the configuration factories.

use alloy::primitives::Address;
use std::str::FromStr;

/// Adds "0x" prefix to a hex string if it doesn't already have one.
pub fn with_0x_prefix(hex_str: &str) -> String {
	if hex_str.to_lowercase().starts_with("0x") {
		hex_str.to_string()
	} else {
		format!("0x{}", hex_str)
	}
}

/// Removes "0x" or "0X" prefix from a hex string if present.
pub fn without_0x_prefix(hex_str: &str) -> &str {
	hex_str
		.strip_prefix("0x")
		.or_else(|| hex_str.strip_prefix("0X"))
		.unwrap_or(hex_str)
}

/// Parses a 20-byte hex address, with or without prefix.
pub fn parse_address(value: &str) -> Result<Address, String> {
	let hex_part = without_0x_prefix(value);
	if hex_part.len() != 40 {
		return Err(format!(
			"Address must be 40 hex characters, got {}",
			hex_part.len()
		));
	}
	Address::from_str(&with_0x_prefix(hex_part)).map_err(|e| format!("Invalid address: {}", e))
}

/// Reads an address field from a TOML table.
pub fn toml_address(config: &toml::Value, field: &str) -> Result<Address, String> {
	let raw = config
		.get(field)
		.and_then(|v| v.as_str())
		.ok_or_else(|| format!("Missing string field '{}'", field))?;
	parse_address(raw)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_prefix_helpers() {
		assert_eq!(with_0x_prefix("abcd"), "0xabcd");
		assert_eq!(with_0x_prefix("0Xabcd"), "0Xabcd");
		assert_eq!(without_0x_prefix("0xabcd"), "abcd");
		assert_eq!(without_0x_prefix("abcd"), "abcd");
	}

	#[test]
	fn test_parse_address() {
		let addr = parse_address("5fbdb2315678afecb367f032d93f642f64180aa3").unwrap();
		assert_eq!(
			addr,
			parse_address("0x5FbDB2315678afecb367f032d93F642f64180aa3").unwrap()
		);
		assert!(parse_address("0x1234").is_err());
		assert!(parse_address("0xzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzz").is_err());
	}

	#[test]
	fn test_toml_address() {
		let config: toml::Value =
			toml::from_str("authority = \"0x5FbDB2315678afecb367f032d93F642f64180aa3\"").unwrap();
		assert!(toml_address(&config, "authority").is_ok());
		assert!(toml_address(&config, "missing").is_err());
	}
}
