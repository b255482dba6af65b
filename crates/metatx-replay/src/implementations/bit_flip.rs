//! Bitmap based replay protection.
//!
//! The verifier keeps a sequence of 256-bit words per signer. A token
//! `(word, mask)` with exactly one bit set is valid while that bit is unset
//! in the stored word; consuming it sets the bit permanently. Bits of one word
//! may be consumed in any order, so none of up to 256 outstanding
//! authorizations blocks another.

use crate::{
	nonce_store_key, NonceReader, ReplayProtectionError, ReplayProtectionInterface,
};
use alloy::primitives::{Address, U256};
use async_trait::async_trait;
use metatx_types::{
	toml_address, ConfigSchema, Field, FieldType, ReplayProtectionToken, Schema, ValidationError,
};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Bits per word in the verifier's bitmap.
pub const BITS_PER_WORD: usize = 256;

/// Process-local cursor over the signer's bitmap words.
#[derive(Debug, Default, Clone)]
struct BitmapState {
	word_index: U256,
	cursor: usize,
	/// Bits known to be consumed or issued in the current word, once read.
	bitmap: Option<U256>,
}

impl BitmapState {
	fn advance_word(&mut self) -> Result<(), ReplayProtectionError> {
		self.word_index = self.word_index.checked_add(U256::from(1)).ok_or_else(|| {
			ReplayProtectionError::Exhausted("bitmap word index overflow".to_string())
		})?;
		self.cursor = 0;
		self.bitmap = None;
		Ok(())
	}
}

/// Replay protection that flips one bit per token.
pub struct BitFlipReplayProtection {
	signer: Address,
	authority: Address,
	reader: Arc<dyn NonceReader>,
	state: Mutex<BitmapState>,
}

impl BitFlipReplayProtection {
	/// Creates an authority for `signer` starting at word 0, bit 0.
	///
	/// Each word is read from the verifier when the cursor first enters it,
	/// and bits already consumed on-chain are skipped.
	pub fn new(signer: Address, authority: Address, reader: Arc<dyn NonceReader>) -> Self {
		Self {
			signer,
			authority,
			reader,
			state: Mutex::new(BitmapState::default()),
		}
	}
}

/// Configuration schema for the bitmap scheme.
///
/// ```toml
/// [replay_protection.implementations.bit_flip]
/// authority = "0x..."
/// ```
pub struct BitFlipSchema;

impl ConfigSchema for BitFlipSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		Schema::new(vec![Field::new("authority", FieldType::Address)], vec![]).validate(config)
	}
}

#[async_trait]
impl ReplayProtectionInterface for BitFlipReplayProtection {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(BitFlipSchema)
	}

	async fn encoded_replay_protection(&self) -> Result<ReplayProtectionToken, ReplayProtectionError> {
		let mut guard = self.state.lock().await;
		// Work on a copy and commit only once a token is issued
		let mut state = guard.clone();

		loop {
			let bitmap = match state.bitmap {
				Some(bitmap) => bitmap,
				None => {
					let key = nonce_store_key(self.signer, state.word_index);
					let stored = self.reader.nonce_store(self.authority, key).await?;
					tracing::debug!(
						word_index = %state.word_index,
						authority = %self.authority,
						"Loaded bitmap word"
					);
					stored
				},
			};

			let free_bit = (state.cursor..BITS_PER_WORD).find(|bit| !bitmap.bit(*bit));
			let Some(bit) = free_bit else {
				state.advance_word()?;
				continue;
			};

			let mask = U256::from(1) << bit;
			let word_index = state.word_index;
			state.bitmap = Some(bitmap | mask);
			state.cursor = bit + 1;
			if state.cursor == BITS_PER_WORD {
				state.advance_word()?;
			}
			*guard = state;

			tracing::debug!(
				word_index = %word_index,
				bit = bit,
				authority = %self.authority,
				"Issued bitmap token"
			);

			return Ok(ReplayProtectionToken::from_words(word_index, mask));
		}
	}

	fn authority_address(&self) -> Address {
		self.authority
	}
}

/// Factory function to create a bitmap authority from configuration.
pub fn create_replay_protection(
	config: &toml::Value,
	signer: Address,
	reader: Arc<dyn NonceReader>,
) -> Result<Box<dyn ReplayProtectionInterface>, ReplayProtectionError> {
	BitFlipSchema
		.validate(config)
		.map_err(|e| ReplayProtectionError::InvalidConfig(e.to_string()))?;

	let authority =
		toml_address(config, "authority").map_err(ReplayProtectionError::InvalidConfig)?;

	Ok(Box::new(BitFlipReplayProtection::new(
		signer, authority, reader,
	)))
}

/// Registry for the bitmap implementation.
pub struct Registry;

impl metatx_types::ImplementationRegistry for Registry {
	const NAME: &'static str = "bit_flip";
	type Factory = crate::ReplayProtectionFactory;

	fn factory() -> Self::Factory {
		create_replay_protection
	}
}

impl crate::ReplayProtectionRegistry for Registry {}
