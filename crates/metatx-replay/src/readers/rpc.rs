//! JSON-RPC nonce reader.
//!
//! Reads a verifier's `nonceStore(bytes32)` through an `eth_call` against an
//! HTTP endpoint using Alloy's provider.

use crate::{NonceReader, ReplayProtectionError};
use alloy::primitives::{Address, Bytes, B256, U256};
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::rpc::types::TransactionRequest;
use alloy::sol;
use alloy::sol_types::{SolCall, SolValue};
use alloy::transports::http::reqwest::Url;
use async_trait::async_trait;

sol! {
	/// View shared by the queue and bitmap verifier contracts.
	interface IReplayProtection {
		function nonceStore(bytes32 key) external view returns (uint256);
	}
}

/// Nonce reader backed by an HTTP JSON-RPC provider.
pub struct RpcNonceReader {
	provider: DynProvider,
}

impl RpcNonceReader {
	/// Creates a reader for the chain served at `rpc_url`.
	pub fn new(rpc_url: &str) -> Result<Self, ReplayProtectionError> {
		let url: Url = rpc_url.parse().map_err(|e| {
			ReplayProtectionError::InvalidConfig(format!("Invalid RPC URL {}: {}", rpc_url, e))
		})?;
		let provider = ProviderBuilder::new().connect_http(url).erased();
		Ok(Self { provider })
	}

	/// Creates a reader over an existing provider.
	pub fn with_provider(provider: DynProvider) -> Self {
		Self { provider }
	}
}

#[async_trait]
impl NonceReader for RpcNonceReader {
	async fn nonce_store(
		&self,
		authority: Address,
		key: B256,
	) -> Result<U256, ReplayProtectionError> {
		let calldata = IReplayProtection::nonceStoreCall { key }.abi_encode();
		let request = TransactionRequest::default()
			.to(authority)
			.input(Bytes::from(calldata).into());

		let output = self.provider.call(request).await.map_err(|e| {
			ReplayProtectionError::Unavailable(format!(
				"nonceStore call to {} failed: {}",
				authority, e
			))
		})?;

		U256::abi_decode(&output).map_err(|e| {
			ReplayProtectionError::Unavailable(format!(
				"Unexpected nonceStore response from {}: {}",
				authority, e
			))
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_invalid_url_rejected() {
		let result = RpcNonceReader::new("not a url");
		assert!(matches!(result, Err(ReplayProtectionError::InvalidConfig(_))));
	}

	#[test]
	fn test_nonce_store_selector() {
		let calldata = IReplayProtection::nonceStoreCall { key: B256::ZERO }.abi_encode();
		assert_eq!(calldata.len(), 4 + 32);
		assert_eq!(&calldata[..4], IReplayProtection::nonceStoreCall::SELECTOR.as_slice());
	}
}
