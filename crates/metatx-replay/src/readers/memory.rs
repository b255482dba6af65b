//! In-memory nonce store.
//!
//! Mirrors the verifier's `nonceStore` mapping in process. Used for dry runs
//! and tests; it can also simulate an unreachable chain.

use crate::{NonceReader, ReplayProtectionError};
use alloy::primitives::{Address, B256, U256};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::RwLock;

/// In-memory `nonceStore` table keyed by verifier address and storage key.
#[derive(Default)]
pub struct MemoryNonceReader {
	store: RwLock<HashMap<(Address, B256), U256>>,
	unavailable: AtomicBool,
	reads: AtomicUsize,
}

impl MemoryNonceReader {
	pub fn new() -> Self {
		Self::default()
	}

	/// Sets the stored word for `key` at `authority`.
	pub async fn set(&self, authority: Address, key: B256, value: U256) {
		self.store.write().await.insert((authority, key), value);
	}

	/// Makes subsequent reads fail with [`ReplayProtectionError::Unavailable`].
	pub fn set_unavailable(&self, unavailable: bool) {
		self.unavailable.store(unavailable, Ordering::SeqCst);
	}

	/// Number of reads served so far, failed ones included.
	pub fn reads(&self) -> usize {
		self.reads.load(Ordering::SeqCst)
	}
}

#[async_trait]
impl NonceReader for MemoryNonceReader {
	async fn nonce_store(
		&self,
		authority: Address,
		key: B256,
	) -> Result<U256, ReplayProtectionError> {
		self.reads.fetch_add(1, Ordering::SeqCst);
		if self.unavailable.load(Ordering::SeqCst) {
			return Err(ReplayProtectionError::Unavailable(
				"memory nonce store is offline".to_string(),
			));
		}
		let store = self.store.read().await;
		Ok(store.get(&(authority, key)).copied().unwrap_or_default())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn test_unset_key_reads_zero() {
		let reader = MemoryNonceReader::new();
		let value = reader
			.nonce_store(Address::ZERO, B256::ZERO)
			.await
			.unwrap();
		assert_eq!(value, U256::ZERO);
		assert_eq!(reader.reads(), 1);
	}

	#[tokio::test]
	async fn test_set_and_offline() {
		let reader = MemoryNonceReader::new();
		reader.set(Address::ZERO, B256::ZERO, U256::from(5)).await;
		assert_eq!(
			reader.nonce_store(Address::ZERO, B256::ZERO).await.unwrap(),
			U256::from(5)
		);

		reader.set_unavailable(true);
		let result = reader.nonce_store(Address::ZERO, B256::ZERO).await;
		assert!(matches!(result, Err(ReplayProtectionError::Unavailable(_))));
	}
}
