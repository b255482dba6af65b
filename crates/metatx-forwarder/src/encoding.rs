//! Encoding steps shared by every forwarder shape.
//!
//! Deploy lowering and the canonical hash are identical for all forwarders;
//! only the call data layout and the final transaction differ.

use crate::abi::IDelegateDeployer;
use alloy::primitives::{keccak256, Address, Bytes, B256, U256};
use alloy::sol_types::{SolCall, SolValue};
use metatx_types::{CallDescriptor, CallType, DescriptorError, MinimalTx, ReplayProtectionToken};

/// CREATE2 salt derived from a deploy call's salt string.
pub fn salt_hash(salt: &str) -> B256 {
	keccak256(salt.as_bytes())
}

/// Lowers a descriptor into the uniform call shape.
///
/// Direct calls pass through. Deploy calls become a call to
/// `delegate_deployer.deploy(initCode, value, keccak256(salt))` executed with
/// `deploy_call_type`. Under `DelegateCall` no wei travels with the call
/// itself; the `value` argument endows the new contract from the forwarder's
/// own balance.
pub fn lower_call(
	descriptor: &CallDescriptor,
	delegate_deployer: Address,
	deploy_call_type: CallType,
) -> Result<MinimalTx, DescriptorError> {
	descriptor.validate()?;

	match descriptor {
		CallDescriptor::Direct(call) => Ok(MinimalTx {
			to: call.to,
			value: call.value.unwrap_or_default(),
			data: call.data.clone().unwrap_or_default(),
			call_type: CallType::Call,
		}),
		CallDescriptor::Deploy(call) => {
			let value = call.value.unwrap_or_default();
			let data = IDelegateDeployer::deployCall {
				initCode: call.init_code.clone(),
				value,
				salt: salt_hash(&call.salt),
			}
			.abi_encode();

			let forwarded_value = match deploy_call_type {
				CallType::Call => value,
				CallType::DelegateCall => U256::ZERO,
			};

			Ok(MinimalTx {
				to: delegate_deployer,
				value: forwarded_value,
				data: Bytes::from(data),
				call_type: deploy_call_type,
			})
		},
	}
}

/// The value a signer signs:
/// `keccak256(abi.encode(callData, replayProtection, authority, forwarder, chainId))`.
pub fn canonical_hash(
	call_data: &Bytes,
	replay_protection: &ReplayProtectionToken,
	replay_protection_authority: Address,
	forwarder: Address,
	chain_id: u64,
) -> B256 {
	let encoded = (
		call_data.clone(),
		replay_protection.as_bytes().clone(),
		replay_protection_authority,
		forwarder,
		U256::from(chain_id),
	)
		.abi_encode_params();
	keccak256(encoded)
}

#[cfg(test)]
mod tests {
	use super::*;
	use alloy::primitives::address;

	const DEPLOYER: Address = address!("0x9fE46736679d2D9a65F0992F2272dE9f3c7fa6e0");
	const TARGET: Address = address!("0x1111111111111111111111111111111111111111");

	#[test]
	fn test_direct_call_passes_through() {
		let call = CallDescriptor::direct(TARGET, Bytes::from_static(b"\x01\x02"), U256::from(3));
		let lowered = lower_call(&call, DEPLOYER, CallType::DelegateCall).unwrap();
		assert_eq!(lowered.to, TARGET);
		assert_eq!(lowered.value, U256::from(3));
		assert_eq!(lowered.data, Bytes::from_static(b"\x01\x02"));
		assert_eq!(lowered.call_type, CallType::Call);
	}

	#[test]
	fn test_deploy_call_is_lowered_to_deployer() {
		let init_code = Bytes::from_static(&[0x60, 0x80, 0x60, 0x40]);
		let call = CallDescriptor::deploy(init_code.clone(), U256::from(10), "salty");
		let lowered = lower_call(&call, DEPLOYER, CallType::DelegateCall).unwrap();

		assert_eq!(lowered.to, DEPLOYER);
		assert_eq!(lowered.call_type, CallType::DelegateCall);
		assert_eq!(lowered.value, U256::ZERO);

		let decoded = IDelegateDeployer::deployCall::abi_decode(&lowered.data).unwrap();
		assert_eq!(decoded.initCode, init_code);
		assert_eq!(decoded.value, U256::from(10));
		assert_eq!(decoded.salt, keccak256(b"salty"));
	}

	#[test]
	fn test_deploy_under_plain_call_forwards_value() {
		let call = CallDescriptor::deploy(Bytes::from_static(&[0x60]), U256::from(10), "s");
		let lowered = lower_call(&call, DEPLOYER, CallType::Call).unwrap();
		assert_eq!(lowered.value, U256::from(10));
		assert_eq!(lowered.call_type, CallType::Call);
	}

	#[test]
	fn test_malformed_deploy_rejected() {
		let call = CallDescriptor::deploy(Bytes::new(), U256::ZERO, "s");
		assert_eq!(
			lower_call(&call, DEPLOYER, CallType::Call),
			Err(DescriptorError::MissingInitCode)
		);
	}

	#[test]
	fn test_canonical_hash_binds_every_field() {
		let data = Bytes::from_static(b"call");
		let token = ReplayProtectionToken::from_words(U256::ZERO, U256::ZERO);
		let base = canonical_hash(&data, &token, TARGET, DEPLOYER, 1);

		let other_token = ReplayProtectionToken::from_words(U256::ZERO, U256::from(1));
		assert_ne!(base, canonical_hash(&data, &other_token, TARGET, DEPLOYER, 1));
		assert_ne!(base, canonical_hash(&data, &token, DEPLOYER, DEPLOYER, 1));
		assert_ne!(base, canonical_hash(&data, &token, TARGET, TARGET, 1));
		assert_ne!(base, canonical_hash(&data, &token, TARGET, DEPLOYER, 5));
		assert_eq!(base, canonical_hash(&data, &token, TARGET, DEPLOYER, 1));
	}
}
