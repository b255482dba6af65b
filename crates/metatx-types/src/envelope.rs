//! Signed meta-transaction envelopes and the replay protection token.

use crate::call::{CallType, MinimalTx};
use alloy::primitives::{Address, Bytes, U256};
use alloy::sol_types::SolValue;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error returned when a token's bytes are not `abi.encode(uint256, uint256)`.
#[derive(Debug, Error)]
#[error("Invalid replay protection token: {0}")]
pub struct TokenDecodeError(pub String);

/// Opaque single-use replay protection token.
///
/// Both schemes encode two 256-bit words. For the queue scheme they are
/// `(queueIndex, counter)`, for the bitmap scheme `(wordIndex, bitmask)`.
/// The authority address travels beside the token, never inside it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReplayProtectionToken(pub Bytes);

impl ReplayProtectionToken {
	/// Encodes a pair of words as `abi.encode(uint256, uint256)`.
	pub fn from_words(first: U256, second: U256) -> Self {
		Self(Bytes::from((first, second).abi_encode_params()))
	}

	/// Decodes the pair of words carried by this token.
	pub fn decode(&self) -> Result<(U256, U256), TokenDecodeError> {
		<(U256, U256)>::abi_decode_params(&self.0)
			.map_err(|e| TokenDecodeError(e.to_string()))
	}

	/// Raw token bytes.
	pub fn as_bytes(&self) -> &Bytes {
		&self.0
	}
}

impl From<Bytes> for ReplayProtectionToken {
	fn from(bytes: Bytes) -> Self {
		Self(bytes)
	}
}

/// A fully signed single call, ready to be encoded for its forwarder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForwardEnvelope {
	/// Forwarder contract the relayer submits to.
	pub to: Address,
	/// Identity that signed the canonical hash.
	pub signer: Address,
	/// Destination of the lowered call.
	pub target: Address,
	pub value: U256,
	pub data: Bytes,
	pub call_type: CallType,
	pub replay_protection: ReplayProtectionToken,
	pub replay_protection_authority: Address,
	pub chain_id: u64,
	/// 65-byte `r || s || v` signature.
	pub signature: Bytes,
}

impl ForwardEnvelope {
	/// The lowered call carried by this envelope.
	pub fn call(&self) -> MinimalTx {
		MinimalTx {
			to: self.target,
			value: self.value,
			data: self.data.clone(),
			call_type: self.call_type,
		}
	}
}

/// A fully signed ordered batch of calls sharing one token and one signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchForwardEnvelope {
	pub to: Address,
	pub signer: Address,
	pub calls: Vec<MinimalTx>,
	pub replay_protection: ReplayProtectionToken,
	pub replay_protection_authority: Address,
	pub chain_id: u64,
	pub signature: Bytes,
}

/// Destination and payload handed to the relayer for broadcast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaTransaction {
	pub to: Address,
	pub data: Bytes,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_token_is_two_words() {
		let token = ReplayProtectionToken::from_words(U256::from(3), U256::from(9));
		assert_eq!(token.as_bytes().len(), 64);
		assert_eq!(token.decode().unwrap(), (U256::from(3), U256::from(9)));
	}

	#[test]
	fn test_token_rejects_short_payload() {
		let token = ReplayProtectionToken::from(Bytes::from_static(&[1, 2, 3]));
		assert!(token.decode().is_err());
	}
}
