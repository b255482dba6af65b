//! Relay-style forwarder.
//!
//! One hub contract serves every signer. The signer is passed explicitly and
//! the hub recovers it from the signature before executing the call with
//! `CALL`, so deploy calls forward their value to the delegate deployer.

use crate::abi::{IRelayHub, MetaCall};
use crate::{
	DecodedBatchTx, DecodedTx, ForwarderContext, ForwarderError, ForwarderInterface,
};
use alloy::primitives::{Address, Bytes};
use alloy::sol_types::{SolCall, SolValue};
use metatx_types::{
	toml_address, BatchForwardEnvelope, CallType, ConfigSchema, Field, FieldType,
	ForwardEnvelope, MinimalTx, ReplayProtectionToken, Schema, ValidationError,
};

/// Forwarder encoding for the shared relay hub.
pub struct RelayHubForwarder {
	address: Address,
}

impl RelayHubForwarder {
	pub fn new(address: Address) -> Self {
		Self { address }
	}
}

/// Configuration schema for the relay hub.
///
/// ```toml
/// [forwarder.implementations.relay_hub]
/// address = "0x..."  # optional, defaults to deployments.relay_hub
/// ```
pub struct RelayHubSchema;

impl ConfigSchema for RelayHubSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		Schema::new(vec![], vec![Field::new("address", FieldType::Address)]).validate(config)
	}
}

fn to_minimal(call: MetaCall) -> Result<MinimalTx, ForwarderError> {
	MinimalTx::try_from(call).map_err(ForwarderError::DecodeMismatch)
}

impl ForwarderInterface for RelayHubForwarder {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(RelayHubSchema)
	}

	fn address(&self) -> Address {
		self.address
	}

	fn deploy_call_type(&self) -> CallType {
		CallType::Call
	}

	fn encode_call_data(&self, call: &MinimalTx) -> Bytes {
		Bytes::from(MetaCall::from(call).abi_encode())
	}

	fn encode_batch_call_data(&self, calls: &[MinimalTx]) -> Bytes {
		let calls: Vec<MetaCall> = calls.iter().map(MetaCall::from).collect();
		Bytes::from(calls.abi_encode())
	}

	fn encode_tx(&self, envelope: &ForwardEnvelope) -> Bytes {
		let call = IRelayHub::forwardCall {
			metaCall: MetaCall::from(&envelope.call()),
			replayProtection: envelope.replay_protection.as_bytes().clone(),
			replayProtectionAuthority: envelope.replay_protection_authority,
			signer: envelope.signer,
			signature: envelope.signature.clone(),
		};
		Bytes::from(call.abi_encode())
	}

	fn encode_batch_tx(&self, envelope: &BatchForwardEnvelope) -> Bytes {
		let call = IRelayHub::batchCall {
			metaCalls: envelope.calls.iter().map(MetaCall::from).collect(),
			replayProtection: envelope.replay_protection.as_bytes().clone(),
			replayProtectionAuthority: envelope.replay_protection_authority,
			signer: envelope.signer,
			signature: envelope.signature.clone(),
		};
		Bytes::from(call.abi_encode())
	}

	fn decode_tx(&self, data: &[u8]) -> Result<DecodedTx, ForwarderError> {
		let decoded = IRelayHub::forwardCall::abi_decode_validate(data)
			.map_err(|e| ForwarderError::DecodeMismatch(e.to_string()))?;

		Ok(DecodedTx {
			call: to_minimal(decoded.metaCall)?,
			replay_protection: ReplayProtectionToken::from(decoded.replayProtection),
			replay_protection_authority: decoded.replayProtectionAuthority,
			signer: Some(decoded.signer),
			signature: decoded.signature,
		})
	}

	fn decode_batch_tx(&self, data: &[u8]) -> Result<DecodedBatchTx, ForwarderError> {
		let decoded = IRelayHub::batchCall::abi_decode_validate(data)
			.map_err(|e| ForwarderError::DecodeMismatch(e.to_string()))?;

		Ok(DecodedBatchTx {
			calls: decoded
				.metaCalls
				.into_iter()
				.map(to_minimal)
				.collect::<Result<Vec<_>, _>>()?,
			replay_protection: ReplayProtectionToken::from(decoded.replayProtection),
			replay_protection_authority: decoded.replayProtectionAuthority,
			signer: Some(decoded.signer),
			signature: decoded.signature,
		})
	}
}

/// Factory function to create a relay hub forwarder from configuration.
pub fn create_forwarder(
	config: &toml::Value,
	context: &ForwarderContext,
) -> Result<Box<dyn ForwarderInterface>, ForwarderError> {
	RelayHubSchema
		.validate(config)
		.map_err(|e| ForwarderError::Configuration(e.to_string()))?;

	let address = if config.get("address").is_some() {
		toml_address(config, "address").map_err(ForwarderError::Configuration)?
	} else {
		context.deployments.relay_hub
	};

	Ok(Box::new(RelayHubForwarder::new(address)))
}

/// Registry for the relay hub implementation.
pub struct Registry;

impl metatx_types::ImplementationRegistry for Registry {
	const NAME: &'static str = "relay_hub";
	type Factory = crate::ForwarderFactory;

	fn factory() -> Self::Factory {
		create_forwarder
	}
}

impl crate::ForwarderRegistry for Registry {}
