//! Meta-transaction forwarders.
//!
//! A [`Forwarder`] turns a call description into a signed payload a relayer
//! can submit. Every invocation runs the same steps:
//!
//! 1. classify and validate the descriptor (no suspension, nothing mutated)
//! 2. lower deploy calls to a call on the delegate deployer
//! 3. encode the call data for the target forwarder contract
//! 4. acquire a replay protection token from the bound authority
//! 5. build the canonical hash over call data, token, authority, forwarder
//!    and chain id
//! 6. sign the hash with the bound account
//! 7. encode the final transaction for the forwarder contract
//!
//! Steps 3 and 7 differ per contract shape and live behind
//! [`ForwarderInterface`]; everything else is shared.
//!
//! A signing failure in step 6 happens after step 4 advanced the authority.
//! That token is not reused: a retry receives a fresh token and the earlier
//! queue slot or bitmap bit stays unusable.

use alloy::primitives::{Address, Bytes};
use metatx_account::{AccountError, AccountService};
use metatx_replay::{ReplayProtectionError, ReplayProtectionInterface};
use metatx_types::{
	BatchForwardEnvelope, CallDescriptor, CallType, ConfigSchema, DeploymentAddresses,
	DescriptorError, ForwardEnvelope, ImplementationRegistry, MetaTransaction, MinimalTx,
	ReplayProtectionToken,
};
use std::sync::Arc;
use thiserror::Error;

pub mod abi;
pub mod builder;
pub mod encoding;

/// Re-export implementations
pub mod implementations {
	pub mod proxy_account;
	pub mod relay_hub;
}

pub use builder::ForwarderBuilder;
pub use encoding::{canonical_hash, lower_call, salt_hash};

/// Errors that can occur while building or decoding forwarded transactions.
#[derive(Debug, Error)]
pub enum ForwarderError {
	/// The call descriptor failed local validation.
	#[error("Malformed call descriptor: {0}")]
	MalformedCallDescriptor(#[from] DescriptorError),
	/// The replay protection authority could not issue a token.
	#[error("Replay protection authority failed: {0}")]
	AuthorityUnavailable(#[from] ReplayProtectionError),
	/// The signing identity declined or failed.
	#[error("Signing rejected: {0}")]
	SigningRejected(#[from] AccountError),
	/// A payload did not come from the matching encode path.
	#[error("Decode mismatch: {0}")]
	DecodeMismatch(String),
	/// The forwarder configuration is invalid.
	#[error("Configuration error: {0}")]
	Configuration(String),
}

/// A single forwarded call recovered from transaction data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedTx {
	pub call: MinimalTx,
	pub replay_protection: ReplayProtectionToken,
	pub replay_protection_authority: Address,
	/// Present only for shapes that carry the signer explicitly.
	pub signer: Option<Address>,
	pub signature: Bytes,
}

/// A forwarded batch recovered from transaction data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedBatchTx {
	pub calls: Vec<MinimalTx>,
	pub replay_protection: ReplayProtectionToken,
	pub replay_protection_authority: Address,
	pub signer: Option<Address>,
	pub signature: Bytes,
}

/// Contract-specific encoding of a forwarder shape.
pub trait ForwarderInterface: Send + Sync {
	/// Returns the configuration schema for this forwarder implementation.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Address of the forwarder contract; bound into the canonical hash.
	fn address(&self) -> Address;

	/// How lowered deploy calls are executed by this forwarder.
	fn deploy_call_type(&self) -> CallType;

	/// Call data of a single call as hashed and verified on-chain.
	fn encode_call_data(&self, call: &MinimalTx) -> Bytes;

	/// Call data of an ordered batch as hashed and verified on-chain.
	fn encode_batch_call_data(&self, calls: &[MinimalTx]) -> Bytes;

	/// Final transaction data for a single call.
	fn encode_tx(&self, envelope: &ForwardEnvelope) -> Bytes;

	/// Final transaction data for a batch.
	fn encode_batch_tx(&self, envelope: &BatchForwardEnvelope) -> Bytes;

	/// Inverse of [`ForwarderInterface::encode_tx`].
	fn decode_tx(&self, data: &[u8]) -> Result<DecodedTx, ForwarderError>;

	/// Inverse of [`ForwarderInterface::encode_batch_tx`].
	fn decode_batch_tx(&self, data: &[u8]) -> Result<DecodedBatchTx, ForwarderError>;
}

/// What a forwarder factory needs beyond its own TOML table.
#[derive(Debug, Clone, Copy)]
pub struct ForwarderContext {
	/// The signing identity the forwarder serves.
	pub signer: Address,
	pub deployments: DeploymentAddresses,
}

/// Type alias for forwarder factory functions.
pub type ForwarderFactory =
	fn(&toml::Value, &ForwarderContext) -> Result<Box<dyn ForwarderInterface>, ForwarderError>;

/// Registry trait for forwarder implementations.
pub trait ForwarderRegistry: ImplementationRegistry<Factory = ForwarderFactory> {}

/// Get all registered forwarder implementations.
pub fn get_all_implementations() -> Vec<(&'static str, ForwarderFactory)> {
	use implementations::{proxy_account, relay_hub};

	vec![
		(relay_hub::Registry::NAME, relay_hub::Registry::factory()),
		(proxy_account::Registry::NAME, proxy_account::Registry::factory()),
	]
}

/// Signs and encodes meta-transactions for one forwarder, authority and account.
pub struct Forwarder {
	implementation: Box<dyn ForwarderInterface>,
	replay_protection: Arc<dyn ReplayProtectionInterface>,
	account: Arc<AccountService>,
	chain_id: u64,
	delegate_deployer: Address,
}

/// Token, authority, signer and signature produced for one call data blob.
struct Authorization {
	signer: Address,
	replay_protection: ReplayProtectionToken,
	replay_protection_authority: Address,
	signature: Bytes,
}

impl Forwarder {
	pub fn new(
		implementation: Box<dyn ForwarderInterface>,
		replay_protection: Arc<dyn ReplayProtectionInterface>,
		account: Arc<AccountService>,
		chain_id: u64,
		delegate_deployer: Address,
	) -> Self {
		Self {
			implementation,
			replay_protection,
			account,
			chain_id,
			delegate_deployer,
		}
	}

	/// Address of the forwarder contract transactions are sent to.
	pub fn address(&self) -> Address {
		self.implementation.address()
	}

	pub fn chain_id(&self) -> u64 {
		self.chain_id
	}

	/// Validates and lowers one descriptor.
	pub fn lower(&self, call: &CallDescriptor) -> Result<MinimalTx, ForwarderError> {
		Ok(lower_call(
			call,
			self.delegate_deployer,
			self.implementation.deploy_call_type(),
		)?)
	}

	/// Builds the signed envelope for a single call.
	pub async fn forward_params(
		&self,
		call: &CallDescriptor,
	) -> Result<ForwardEnvelope, ForwarderError> {
		let lowered = self.lower(call)?;
		let call_data = self.implementation.encode_call_data(&lowered);
		let auth = self.authorize(&call_data).await?;

		Ok(ForwardEnvelope {
			to: self.address(),
			signer: auth.signer,
			target: lowered.to,
			value: lowered.value,
			data: lowered.data,
			call_type: lowered.call_type,
			replay_protection: auth.replay_protection,
			replay_protection_authority: auth.replay_protection_authority,
			chain_id: self.chain_id,
			signature: auth.signature,
		})
	}

	/// Builds the signed envelope for an ordered batch under one token.
	pub async fn batch_forward_params(
		&self,
		calls: &[CallDescriptor],
	) -> Result<BatchForwardEnvelope, ForwarderError> {
		// Every entry is validated before the authority is touched
		let lowered = calls
			.iter()
			.map(|call| self.lower(call))
			.collect::<Result<Vec<_>, _>>()?;
		let call_data = self.implementation.encode_batch_call_data(&lowered);
		let auth = self.authorize(&call_data).await?;

		Ok(BatchForwardEnvelope {
			to: self.address(),
			signer: auth.signer,
			calls: lowered,
			replay_protection: auth.replay_protection,
			replay_protection_authority: auth.replay_protection_authority,
			chain_id: self.chain_id,
			signature: auth.signature,
		})
	}

	/// Signs a single call and returns the relayer payload.
	pub async fn sign_meta_transaction(
		&self,
		call: &CallDescriptor,
	) -> Result<MetaTransaction, ForwarderError> {
		let envelope = self.forward_params(call).await?;
		Ok(MetaTransaction {
			to: envelope.to,
			data: self.implementation.encode_tx(&envelope),
		})
	}

	/// Signs an ordered batch and returns the relayer payload.
	pub async fn sign_meta_transaction_batch(
		&self,
		calls: &[CallDescriptor],
	) -> Result<MetaTransaction, ForwarderError> {
		let envelope = self.batch_forward_params(calls).await?;
		Ok(MetaTransaction {
			to: envelope.to,
			data: self.implementation.encode_batch_tx(&envelope),
		})
	}

	pub fn decode_tx(&self, data: &[u8]) -> Result<DecodedTx, ForwarderError> {
		self.implementation.decode_tx(data)
	}

	pub fn decode_batch_tx(&self, data: &[u8]) -> Result<DecodedBatchTx, ForwarderError> {
		self.implementation.decode_batch_tx(data)
	}

	/// Encoded call data of a single call, as bound into the canonical hash.
	pub fn encode_call_data(&self, call: &MinimalTx) -> Bytes {
		self.implementation.encode_call_data(call)
	}

	/// Encoded call data of a batch, as bound into the canonical hash.
	pub fn encode_batch_call_data(&self, calls: &[MinimalTx]) -> Bytes {
		self.implementation.encode_batch_call_data(calls)
	}

	async fn authorize(&self, call_data: &Bytes) -> Result<Authorization, ForwarderError> {
		// Resolved first so an unreachable signer does not burn a token
		let signer = self.account.get_address().await?;

		let replay_protection = self.replay_protection.encoded_replay_protection().await?;
		let replay_protection_authority = self.replay_protection.authority_address();

		let hash = canonical_hash(
			call_data,
			&replay_protection,
			replay_protection_authority,
			self.address(),
			self.chain_id,
		);
		tracing::debug!(
			forwarder = %self.address(),
			chain_id = self.chain_id,
			authority = %replay_protection_authority,
			hash = %hash,
			"Signing meta-transaction"
		);

		let signature = match self.account.sign_hash(hash).await {
			Ok(signature) => signature,
			Err(e) => {
				tracing::warn!(
					authority = %replay_protection_authority,
					token = %replay_protection.as_bytes(),
					"Replay protection token burnt by signing failure"
				);
				return Err(e.into());
			},
		};

		Ok(Authorization {
			signer,
			replay_protection,
			replay_protection_authority,
			signature: Bytes::from(signature.as_bytes().to_vec()),
		})
	}
}
