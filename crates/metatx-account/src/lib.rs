//! Signing identities for meta-transactions.
//!
//! The forwarder never touches key material directly. It asks an
//! [`AccountService`] for the signer's address and for a signature over the
//! canonical hash, and the service delegates to a pluggable
//! [`AccountInterface`] implementation.

use alloy::primitives::{Address, Signature, B256};
use async_trait::async_trait;
use metatx_types::{ConfigSchema, ImplementationRegistry};
use thiserror::Error;

/// Re-export implementations
pub mod implementations {
	pub mod local;
}

/// Errors that can occur during account operations.
#[derive(Debug, Error)]
pub enum AccountError {
	/// The signing identity declined or failed to sign.
	#[error("Signing failed: {0}")]
	SigningFailed(String),
	/// A key is invalid or malformed.
	#[error("Invalid key: {0}")]
	InvalidKey(String),
}

/// Interface every signing identity implements.
///
/// Implementations may be local keys, remote signers or hardware devices, so
/// both operations are async.
#[async_trait]
pub trait AccountInterface: Send + Sync {
	/// Returns the configuration schema for this account implementation.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Address that on-chain verifiers recover from this account's signatures.
	async fn address(&self) -> Result<Address, AccountError>;

	/// Signs `message` as an EIP-191 personal message.
	async fn sign_message(&self, message: &[u8]) -> Result<Signature, AccountError>;
}

/// Type alias for account factory functions.
pub type AccountFactory = fn(&toml::Value) -> Result<Box<dyn AccountInterface>, AccountError>;

/// Registry trait for account implementations.
pub trait AccountRegistry: ImplementationRegistry<Factory = AccountFactory> {}

/// Get all registered account implementations.
pub fn get_all_implementations() -> Vec<(&'static str, AccountFactory)> {
	use implementations::local;

	vec![(local::Registry::NAME, local::Registry::factory())]
}

/// Service that wraps the configured signing identity.
pub struct AccountService {
	implementation: Box<dyn AccountInterface>,
}

impl AccountService {
	pub fn new(implementation: Box<dyn AccountInterface>) -> Self {
		Self { implementation }
	}

	/// Retrieves the address associated with the managed account.
	pub async fn get_address(&self) -> Result<Address, AccountError> {
		self.implementation.address().await
	}

	/// Signs the 32 raw bytes of `hash` as a personal message.
	///
	/// Verifiers check the result with
	/// `ecrecover(keccak256("\x19Ethereum Signed Message:\n32" || hash))`.
	pub async fn sign_hash(&self, hash: B256) -> Result<Signature, AccountError> {
		let signature = self.implementation.sign_message(hash.as_slice()).await;
		if let Err(e) = &signature {
			tracing::warn!(hash = %hash, error = %e, "Signer rejected hash");
		}
		signature
	}
}
