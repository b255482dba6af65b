//! Solidity shapes of the forwarder contracts.

use alloy::sol;
use metatx_types::{CallType, MinimalTx};

sol! {
	/// One call inside a forwarded transaction.
	#[derive(Debug, PartialEq, Eq)]
	struct MetaCall {
		address to;
		uint256 value;
		bytes data;
		uint8 callType;
	}

	/// Relay-style forwarder shared by every signer.
	interface IRelayHub {
		function forward(MetaCall metaCall, bytes replayProtection, address replayProtectionAuthority, address signer, bytes signature) external payable;
		function batch(MetaCall[] metaCalls, bytes replayProtection, address replayProtectionAuthority, address signer, bytes signature) external payable;
	}

	/// Per-signer proxy account.
	interface IProxyAccount {
		function forward(address target, uint256 value, bytes data, uint8 callType, bytes replayProtection, address replayProtectionAuthority, bytes signature) external payable;
		function batch(MetaCall[] metaCalls, bytes replayProtection, address replayProtectionAuthority, bytes signature) external payable;
	}

	/// Deployer reached by lowered deploy calls.
	interface IDelegateDeployer {
		function deploy(bytes initCode, uint256 value, bytes32 salt) external returns (address);
	}
}

impl From<&MinimalTx> for MetaCall {
	fn from(tx: &MinimalTx) -> Self {
		MetaCall {
			to: tx.to,
			value: tx.value,
			data: tx.data.clone(),
			callType: tx.call_type.as_u8(),
		}
	}
}

impl TryFrom<MetaCall> for MinimalTx {
	type Error = String;

	fn try_from(call: MetaCall) -> Result<Self, Self::Error> {
		let call_type = CallType::try_from(call.callType)
			.map_err(|raw| format!("Unknown call type {}", raw))?;
		Ok(MinimalTx {
			to: call.to,
			value: call.value,
			data: call.data,
			call_type,
		})
	}
}
