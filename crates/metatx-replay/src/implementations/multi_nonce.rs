//! Queue based replay protection.
//!
//! The verifier keeps one strictly increasing counter per `(signer, queue)`.
//! A token `(queue, counter)` is valid only when `counter` equals the stored
//! value, and consuming it increments the stored value. Issuing tokens
//! round-robin across `queue_count` queues lets up to `queue_count`
//! authorizations be outstanding without any one waiting on another.

use crate::{
	nonce_store_key, NonceReader, ReplayProtectionError, ReplayProtectionInterface,
};
use alloy::primitives::{Address, U256};
use async_trait::async_trait;
use metatx_types::{
	toml_address, ConfigSchema, Field, FieldType, ReplayProtectionToken, Schema, ValidationError,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Number of queues used when the configuration does not specify one.
pub const DEFAULT_QUEUE_COUNT: usize = 30;

/// Process-local view of the signer's queues.
#[derive(Debug, Default)]
struct QueueState {
	/// Queue the next token is drawn from.
	next_queue: usize,
	/// Next counter to hand out per queue, present once the queue was read.
	counters: HashMap<usize, U256>,
}

/// Replay protection over `queue_count` independent nonce queues.
pub struct MultiNonceReplayProtection {
	queue_count: usize,
	signer: Address,
	authority: Address,
	reader: Arc<dyn NonceReader>,
	state: Mutex<QueueState>,
}

impl MultiNonceReplayProtection {
	/// Creates an authority for `signer` validated by the verifier at `authority`.
	///
	/// Counters are not read here; each queue is read from the verifier the
	/// first time a token is drawn from it and cached afterwards.
	pub fn new(
		queue_count: usize,
		signer: Address,
		authority: Address,
		reader: Arc<dyn NonceReader>,
	) -> Result<Self, ReplayProtectionError> {
		if queue_count == 0 {
			return Err(ReplayProtectionError::InvalidConfig(
				"queue_count must be at least 1".to_string(),
			));
		}

		Ok(Self {
			queue_count,
			signer,
			authority,
			reader,
			state: Mutex::new(QueueState::default()),
		})
	}

	pub fn queue_count(&self) -> usize {
		self.queue_count
	}
}

/// Configuration schema for the queue scheme.
///
/// ```toml
/// [replay_protection.implementations.multi_nonce]
/// authority = "0x..."
/// queue_count = 30  # optional
/// ```
pub struct MultiNonceSchema;

impl ConfigSchema for MultiNonceSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![Field::new("authority", FieldType::Address)],
			vec![Field::new(
				"queue_count",
				FieldType::Integer {
					min: Some(1),
					max: Some(u32::MAX as i64),
				},
			)],
		);

		schema.validate(config)
	}
}

#[async_trait]
impl ReplayProtectionInterface for MultiNonceReplayProtection {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(MultiNonceSchema)
	}

	async fn encoded_replay_protection(&self) -> Result<ReplayProtectionToken, ReplayProtectionError> {
		// Held across the chain read so two callers never observe the same counter
		let mut state = self.state.lock().await;
		let queue = state.next_queue;

		let counter = match state.counters.get(&queue) {
			Some(counter) => *counter,
			None => {
				let key = nonce_store_key(self.signer, U256::from(queue));
				let stored = self.reader.nonce_store(self.authority, key).await?;
				tracing::debug!(
					queue_index = queue,
					stored = %stored,
					authority = %self.authority,
					"Loaded queue counter"
				);
				stored
			},
		};

		let next = counter.checked_add(U256::from(1)).ok_or_else(|| {
			ReplayProtectionError::Exhausted(format!("queue {} counter overflow", queue))
		})?;

		state.counters.insert(queue, next);
		state.next_queue = (queue + 1) % self.queue_count;

		tracing::debug!(
			queue_index = queue,
			counter = %counter,
			authority = %self.authority,
			"Issued queue token"
		);

		Ok(ReplayProtectionToken::from_words(U256::from(queue), counter))
	}

	fn authority_address(&self) -> Address {
		self.authority
	}
}

/// Factory function to create a queue authority from configuration.
pub fn create_replay_protection(
	config: &toml::Value,
	signer: Address,
	reader: Arc<dyn NonceReader>,
) -> Result<Box<dyn ReplayProtectionInterface>, ReplayProtectionError> {
	MultiNonceSchema
		.validate(config)
		.map_err(|e| ReplayProtectionError::InvalidConfig(e.to_string()))?;

	let authority =
		toml_address(config, "authority").map_err(ReplayProtectionError::InvalidConfig)?;
	let queue_count = config
		.get("queue_count")
		.and_then(|v| v.as_integer())
		.map(|v| v as usize)
		.unwrap_or(DEFAULT_QUEUE_COUNT);

	Ok(Box::new(MultiNonceReplayProtection::new(
		queue_count,
		signer,
		authority,
		reader,
	)?))
}

/// Registry for the queue implementation.
pub struct Registry;

impl metatx_types::ImplementationRegistry for Registry {
	const NAME: &'static str = "multi_nonce";
	type Factory = crate::ReplayProtectionFactory;

	fn factory() -> Self::Factory {
		create_replay_protection
	}
}

impl crate::ReplayProtectionRegistry for Registry {}
