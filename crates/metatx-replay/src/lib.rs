//! Replay protection authorities for meta-transactions.
//!
//! An authority hands out single-use tokens that an on-chain verifier
//! contract checks and consumes before a forwarded call executes. Two schemes
//! are provided:
//!
//! - `multi_nonce`: N independent strictly increasing counters. Tokens are
//!   spread round-robin across queues so unconfirmed authorizations on
//!   different queues never block each other.
//! - `bit_flip`: numbered 256-bit words where each token flips one bit. Any
//!   bit in a word may be confirmed in any order.
//!
//! Both keep optimistic local state that is read lazily from the verifier
//! through a [`NonceReader`] and never rolled back. A token handed to a caller
//! whose signing step later fails stays burnt.

use alloy::primitives::{keccak256, Address, B256, U256};
use alloy::sol_types::SolValue;
use async_trait::async_trait;
use metatx_types::{ConfigSchema, ImplementationRegistry, ReplayProtectionToken};
use std::sync::Arc;
use thiserror::Error;

/// Re-export implementations
pub mod implementations {
	pub mod bit_flip;
	pub mod multi_nonce;
}

/// Views of the verifier's stored counters and bitmaps.
pub mod readers {
	pub mod memory;
	pub mod rpc;
}

/// Errors that can occur while issuing replay protection tokens.
#[derive(Debug, Error)]
pub enum ReplayProtectionError {
	/// The verifier state could not be read. Local state is unchanged.
	#[error("Replay protection authority unavailable: {0}")]
	Unavailable(String),
	/// The authority configuration is invalid.
	#[error("Invalid configuration: {0}")]
	InvalidConfig(String),
	/// No further token can be derived from the current state.
	#[error("Replay protection exhausted: {0}")]
	Exhausted(String),
}

/// Capability implemented by every replay protection scheme.
///
/// Called N times in sequence on one instance, the returned tokens are
/// pairwise distinct. Concurrent callers are serialized internally.
#[async_trait]
pub trait ReplayProtectionInterface: Send + Sync {
	/// Returns the configuration schema for this implementation.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Issues the next token and advances local state.
	///
	/// May suspend while the verifier's state is read for the first time.
	async fn encoded_replay_protection(&self) -> Result<ReplayProtectionToken, ReplayProtectionError>;

	/// Address of the on-chain verifier that validates this authority's tokens.
	fn authority_address(&self) -> Address;
}

/// Read access to the `nonceStore` mapping of a verifier contract.
#[async_trait]
pub trait NonceReader: Send + Sync {
	/// Returns the stored word for `key` at `authority`.
	///
	/// For the queue scheme this is the next valid counter of a queue, for the
	/// bitmap scheme the 256-bit word of consumed bits.
	async fn nonce_store(&self, authority: Address, key: B256)
		-> Result<U256, ReplayProtectionError>;
}

/// Storage key of a signer's queue or word in the verifier:
/// `keccak256(abi.encode(signer, index))`.
pub fn nonce_store_key(signer: Address, index: U256) -> B256 {
	keccak256((signer, index).abi_encode_params())
}

/// Type alias for replay protection factory functions.
///
/// Factories receive the implementation's TOML table, the signer whose
/// tokens are issued, and the reader used for the verifier's state.
pub type ReplayProtectionFactory = fn(
	&toml::Value,
	Address,
	Arc<dyn NonceReader>,
) -> Result<Box<dyn ReplayProtectionInterface>, ReplayProtectionError>;

/// Registry trait for replay protection implementations.
pub trait ReplayProtectionRegistry:
	ImplementationRegistry<Factory = ReplayProtectionFactory>
{
}

/// Get all registered replay protection implementations.
pub fn get_all_implementations() -> Vec<(&'static str, ReplayProtectionFactory)> {
	use implementations::{bit_flip, multi_nonce};

	vec![
		(multi_nonce::Registry::NAME, multi_nonce::Registry::factory()),
		(bit_flip::Registry::NAME, bit_flip::Registry::factory()),
	]
}
