//! Proxy-style forwarder.
//!
//! Each signer owns a proxy account that only accepts calls authorized by
//! that signer, so the signer is implicit in the contract address and never
//! encoded. The proxy executes lowered deploy calls with `DELEGATECALL`, which
//! lets the deployed contract be created from the proxy's own address.

use crate::abi::{IProxyAccount, MetaCall};
use crate::{
	DecodedBatchTx, DecodedTx, ForwarderContext, ForwarderError, ForwarderInterface,
};
use alloy::primitives::{keccak256, Address, Bytes};
use alloy::sol_types::{sol_data, SolCall, SolType, SolValue};
use metatx_types::{
	toml_address, BatchForwardEnvelope, CallType, ConfigSchema, Field, FieldType,
	ForwardEnvelope, MinimalTx, ReplayProtectionToken, Schema, ValidationError,
};

const CLONE_PREFIX: [u8; 20] = [
	0x3d, 0x60, 0x2d, 0x80, 0x60, 0x0a, 0x3d, 0x39, 0x81, 0xf3, 0x36, 0x3d, 0x3d, 0x37, 0x3d, 0x3d,
	0x3d, 0x36, 0x3d, 0x73,
];
const CLONE_SUFFIX: [u8; 15] = [
	0x5a, 0xf4, 0x3d, 0x82, 0x80, 0x3e, 0x90, 0x3d, 0x91, 0x60, 0x2b, 0x57, 0xfd, 0x5b, 0xf3,
];

/// Creation code of an EIP-1167 minimal proxy delegating to `implementation`.
pub fn clone_init_code(implementation: Address) -> Bytes {
	let mut code = Vec::with_capacity(CLONE_PREFIX.len() + 20 + CLONE_SUFFIX.len());
	code.extend_from_slice(&CLONE_PREFIX);
	code.extend_from_slice(implementation.as_slice());
	code.extend_from_slice(&CLONE_SUFFIX);
	Bytes::from(code)
}

/// Counterfactual address of `signer`'s proxy account.
///
/// The deployer creates proxies with CREATE2 using
/// `keccak256(abi.encode(signer))` as salt and a minimal clone of
/// `base_account` as init code.
pub fn proxy_account_address(deployer: Address, base_account: Address, signer: Address) -> Address {
	let salt = keccak256(signer.abi_encode());
	deployer.create2_from_code(salt, clone_init_code(base_account))
}

/// Forwarder encoding for a signer's proxy account.
pub struct ProxyAccountForwarder {
	address: Address,
}

impl ProxyAccountForwarder {
	pub fn new(address: Address) -> Self {
		Self { address }
	}
}

/// Configuration schema for proxy accounts.
///
/// ```toml
/// [forwarder.implementations.proxy_account]
/// proxy_account = "0x..."  # optional, derived from the signer otherwise
/// ```
pub struct ProxyAccountSchema;

impl ConfigSchema for ProxyAccountSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		Schema::new(vec![], vec![Field::new("proxy_account", FieldType::Address)])
			.validate(config)
	}
}

fn to_minimal(call: MetaCall) -> Result<MinimalTx, ForwarderError> {
	MinimalTx::try_from(call).map_err(ForwarderError::DecodeMismatch)
}

impl ForwarderInterface for ProxyAccountForwarder {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(ProxyAccountSchema)
	}

	fn address(&self) -> Address {
		self.address
	}

	fn deploy_call_type(&self) -> CallType {
		CallType::DelegateCall
	}

	fn encode_call_data(&self, call: &MinimalTx) -> Bytes {
		let encoded = <(
			sol_data::Address,
			sol_data::Uint<256>,
			sol_data::Bytes,
			sol_data::Uint<8>,
		) as SolType>::abi_encode_params(&(
			call.to,
			call.value,
			call.data.clone(),
			call.call_type.as_u8(),
		));
		Bytes::from(encoded)
	}

	fn encode_batch_call_data(&self, calls: &[MinimalTx]) -> Bytes {
		let calls: Vec<MetaCall> = calls.iter().map(MetaCall::from).collect();
		Bytes::from(calls.abi_encode())
	}

	fn encode_tx(&self, envelope: &ForwardEnvelope) -> Bytes {
		let call = IProxyAccount::forwardCall {
			target: envelope.target,
			value: envelope.value,
			data: envelope.data.clone(),
			callType: envelope.call_type.as_u8(),
			replayProtection: envelope.replay_protection.as_bytes().clone(),
			replayProtectionAuthority: envelope.replay_protection_authority,
			signature: envelope.signature.clone(),
		};
		Bytes::from(call.abi_encode())
	}

	fn encode_batch_tx(&self, envelope: &BatchForwardEnvelope) -> Bytes {
		let call = IProxyAccount::batchCall {
			metaCalls: envelope.calls.iter().map(MetaCall::from).collect(),
			replayProtection: envelope.replay_protection.as_bytes().clone(),
			replayProtectionAuthority: envelope.replay_protection_authority,
			signature: envelope.signature.clone(),
		};
		Bytes::from(call.abi_encode())
	}

	fn decode_tx(&self, data: &[u8]) -> Result<DecodedTx, ForwarderError> {
		let decoded = IProxyAccount::forwardCall::abi_decode_validate(data)
			.map_err(|e| ForwarderError::DecodeMismatch(e.to_string()))?;
		let call = to_minimal(MetaCall {
			to: decoded.target,
			value: decoded.value,
			data: decoded.data,
			callType: decoded.callType,
		})?;

		Ok(DecodedTx {
			call,
			replay_protection: ReplayProtectionToken::from(decoded.replayProtection),
			replay_protection_authority: decoded.replayProtectionAuthority,
			signer: None,
			signature: decoded.signature,
		})
	}

	fn decode_batch_tx(&self, data: &[u8]) -> Result<DecodedBatchTx, ForwarderError> {
		let decoded = IProxyAccount::batchCall::abi_decode_validate(data)
			.map_err(|e| ForwarderError::DecodeMismatch(e.to_string()))?;

		Ok(DecodedBatchTx {
			calls: decoded
				.metaCalls
				.into_iter()
				.map(to_minimal)
				.collect::<Result<Vec<_>, _>>()?,
			replay_protection: ReplayProtectionToken::from(decoded.replayProtection),
			replay_protection_authority: decoded.replayProtectionAuthority,
			signer: None,
			signature: decoded.signature,
		})
	}
}

/// Factory function to create a proxy account forwarder from configuration.
pub fn create_forwarder(
	config: &toml::Value,
	context: &ForwarderContext,
) -> Result<Box<dyn ForwarderInterface>, ForwarderError> {
	ProxyAccountSchema
		.validate(config)
		.map_err(|e| ForwarderError::Configuration(e.to_string()))?;

	let address = if config.get("proxy_account").is_some() {
		toml_address(config, "proxy_account").map_err(ForwarderError::Configuration)?
	} else {
		let deployments = &context.deployments;
		let derived = proxy_account_address(
			deployments.proxy_account_deployer,
			deployments.base_account,
			context.signer,
		);
		tracing::info!(signer = %context.signer, proxy_account = %derived, "Derived proxy account");
		derived
	};

	Ok(Box::new(ProxyAccountForwarder::new(address)))
}

/// Registry for the proxy account implementation.
pub struct Registry;

impl metatx_types::ImplementationRegistry for Registry {
	const NAME: &'static str = "proxy_account";
	type Factory = crate::ForwarderFactory;

	fn factory() -> Self::Factory {
		create_forwarder
	}
}

impl crate::ForwarderRegistry for Registry {}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::abi::IDelegateDeployer;
	use crate::test_support::*;
	use crate::{canonical_hash, salt_hash, Forwarder};
	use alloy::primitives::{address, Signature, B256, U256};
	use metatx_types::CallDescriptor;

	const DESTINATION: Address = address!("0x3333333333333333333333333333333333333333");

	fn proxy() -> Address {
		let d = deployments();
		proxy_account_address(d.proxy_account_deployer, d.base_account, SIGNER)
	}

	fn forwarder() -> Forwarder {
		Forwarder::new(
			Box::new(ProxyAccountForwarder::new(proxy())),
			bit_flip(),
			local_account(),
			CHAIN_ID,
			deployments().delegate_deployer,
		)
	}

	fn recover(signature: &Bytes, hash: B256) -> Address {
		Signature::try_from(signature.as_ref())
			.unwrap()
			.recover_address_from_msg(hash.as_slice())
			.unwrap()
	}

	#[test]
	fn test_clone_init_code_layout() {
		let implementation = deployments().base_account;
		let code = clone_init_code(implementation);
		assert_eq!(code.len(), 55);
		assert_eq!(&code[..20], &CLONE_PREFIX);
		assert_eq!(&code[20..40], implementation.as_slice());
		assert_eq!(&code[40..], &CLONE_SUFFIX);
	}

	#[test]
	fn test_proxy_address_is_per_signer() {
		let d = deployments();
		let other = address!("0x70997970C51812dc3A010C7d01b50e0d17dc79C8");
		let mine = proxy_account_address(d.proxy_account_deployer, d.base_account, SIGNER);
		assert_ne!(mine, proxy_account_address(d.proxy_account_deployer, d.base_account, other));
		assert_eq!(mine, proxy());

		let expected = d.proxy_account_deployer.create2(
			keccak256(SIGNER.abi_encode()),
			keccak256(clone_init_code(d.base_account)),
		);
		assert_eq!(mine, expected);
	}

	#[tokio::test]
	async fn test_decode_recovers_single_call() {
		let forwarder = forwarder();
		let payload = Bytes::from_static(b"\x12\x34\x56");
		let call = CallDescriptor::direct(DESTINATION, payload.clone(), U256::ZERO);

		let tx = forwarder.sign_meta_transaction(&call).await.unwrap();
		assert_eq!(tx.to, proxy());

		let decoded = forwarder.decode_tx(&tx.data).unwrap();
		assert_eq!(decoded.call.to, DESTINATION);
		assert_eq!(decoded.call.data, payload);
		assert_eq!(decoded.replay_protection_authority, AUTHORITY);
		assert_eq!(decoded.signer, None);

		let hash = canonical_hash(
			&forwarder.encode_call_data(&decoded.call),
			&decoded.replay_protection,
			decoded.replay_protection_authority,
			forwarder.address(),
			CHAIN_ID,
		);
		assert_eq!(recover(&decoded.signature, hash), SIGNER);
	}

	#[tokio::test]
	async fn test_deploy_is_delegated_without_value() {
		let forwarder = forwarder();
		let init_code = Bytes::from_static(&[0x60, 0x80, 0x60, 0x40, 0x52]);
		let call = CallDescriptor::deploy(init_code.clone(), U256::from(100), "my-salt");

		let envelope = forwarder.forward_params(&call).await.unwrap();
		assert_eq!(envelope.target, deployments().delegate_deployer);
		assert_eq!(envelope.call_type, CallType::DelegateCall);
		assert_eq!(envelope.value, U256::ZERO);

		let deploy = IDelegateDeployer::deployCall::abi_decode(&envelope.data).unwrap();
		assert_eq!(deploy.initCode, init_code);
		assert_eq!(deploy.value, U256::from(100));
		assert_eq!(deploy.salt, salt_hash("my-salt"));
	}

	#[tokio::test]
	async fn test_batch_deploy_and_direct_share_one_signature() {
		let forwarder = forwarder();
		let calls = vec![
			CallDescriptor::deploy(Bytes::from_static(&[0x60, 0x00]), U256::ZERO, "a"),
			CallDescriptor::direct(DESTINATION, Bytes::from_static(b"\xff"), U256::ZERO),
		];

		let tx = forwarder.sign_meta_transaction_batch(&calls).await.unwrap();
		let decoded = forwarder.decode_batch_tx(&tx.data).unwrap();
		assert_eq!(decoded.calls.len(), 2);
		assert_eq!(decoded.calls[0].call_type, CallType::DelegateCall);
		assert_eq!(decoded.calls[1].call_type, CallType::Call);
		assert_eq!(decoded.calls[1].to, DESTINATION);

		let hash = canonical_hash(
			&forwarder.encode_batch_call_data(&decoded.calls),
			&decoded.replay_protection,
			decoded.replay_protection_authority,
			forwarder.address(),
			CHAIN_ID,
		);
		assert_eq!(recover(&decoded.signature, hash), SIGNER);
	}

	#[tokio::test]
	async fn test_empty_batch_round_trip() {
		let forwarder = forwarder();
		let tx = forwarder.sign_meta_transaction_batch(&[]).await.unwrap();
		let decoded = forwarder.decode_batch_tx(&tx.data).unwrap();
		assert!(decoded.calls.is_empty());
		assert_eq!(decoded.replay_protection_authority, AUTHORITY);
	}

	#[tokio::test]
	async fn test_single_decoder_rejects_batch_payload() {
		let forwarder = forwarder();
		let tx = forwarder.sign_meta_transaction_batch(&[]).await.unwrap();
		assert!(matches!(
			forwarder.decode_tx(&tx.data),
			Err(ForwarderError::DecodeMismatch(_))
		));
	}

	#[tokio::test]
	async fn test_decode_rejects_altered_single_payload() {
		let forwarder = forwarder();
		let call = CallDescriptor::direct(DESTINATION, Bytes::from_static(b"\x01"), U256::ZERO);
		let tx = forwarder.sign_meta_transaction(&call).await.unwrap();
		assert!(forwarder.decode_tx(&tx.data).is_ok());

		let mut trailing = tx.data.to_vec();
		trailing.extend_from_slice(&[0u8; 32]);
		assert!(matches!(
			forwarder.decode_tx(&trailing),
			Err(ForwarderError::DecodeMismatch(_))
		));

		// callType is the fourth head word after the selector; give it 0x0100
		let mut dirty = tx.data.to_vec();
		dirty[4 + 3 * 32 + 30] = 0x01;
		assert!(matches!(
			forwarder.decode_tx(&dirty),
			Err(ForwarderError::DecodeMismatch(_))
		));
	}

	#[tokio::test]
	async fn test_batch_decoder_rejects_trailing_bytes() {
		let forwarder = forwarder();
		let tx = forwarder.sign_meta_transaction_batch(&[]).await.unwrap();
		let mut trailing = tx.data.to_vec();
		trailing.extend_from_slice(&[0xffu8; 32]);
		assert!(matches!(
			forwarder.decode_batch_tx(&trailing),
			Err(ForwarderError::DecodeMismatch(_))
		));
	}

	#[test]
	fn test_factory_derives_or_overrides_address() {
		let context = ForwarderContext {
			signer: SIGNER,
			deployments: deployments(),
		};
		let empty = toml::Value::Table(toml::map::Map::new());
		assert_eq!(create_forwarder(&empty, &context).unwrap().address(), proxy());

		let config: toml::Value =
			toml::from_str("proxy_account = \"0x4444444444444444444444444444444444444444\"")
				.unwrap();
		assert_eq!(
			create_forwarder(&config, &context).unwrap().address(),
			address!("0x4444444444444444444444444444444444444444")
		);
	}
}
