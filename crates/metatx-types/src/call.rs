//! Call description types for meta-transactions.
//!
//! A caller describes what it wants executed with a [`CallDescriptor`]. The
//! forwarder lowers every descriptor into a [`MinimalTx`], the uniform shape
//! that all forwarder contracts encode.

use alloy::primitives::{Address, Bytes, U256};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised when a call descriptor cannot be classified or is incomplete.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DescriptorError {
	/// A deploy call carried no init code.
	#[error("Deploy call is missing init code")]
	MissingInitCode,
	/// A deploy call carried an empty salt.
	#[error("Deploy call requires a non-empty salt")]
	EmptySalt,
	/// A direct call carried no destination.
	#[error("Direct call is missing a destination address")]
	MissingDestination,
	/// A call specified both a destination and a salt.
	#[error("Call cannot have both a destination and a salt")]
	AmbiguousShape,
}

/// Execution mode the forwarder contract uses for a single call.
///
/// Encoded on the wire as a `uint8`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum CallType {
	/// Plain `CALL` from the forwarder to the target.
	Call = 0,
	/// `DELEGATECALL` from the forwarder into the target's code.
	DelegateCall = 1,
}

impl CallType {
	/// Wire representation of this call type.
	pub fn as_u8(self) -> u8 {
		self as u8
	}
}

impl TryFrom<u8> for CallType {
	type Error = u8;

	fn try_from(value: u8) -> Result<Self, Self::Error> {
		match value {
			0 => Ok(CallType::Call),
			1 => Ok(CallType::DelegateCall),
			other => Err(other),
		}
	}
}

/// A call to an existing contract or account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectCall {
	/// Destination of the call.
	pub to: Address,
	/// Calldata, empty when absent.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub data: Option<Bytes>,
	/// Wei forwarded with the call, zero when absent.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub value: Option<U256>,
}

/// A call that creates a contract at a salt-derived deterministic address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployCall {
	/// Creation bytecode of the new contract.
	pub init_code: Bytes,
	/// Wei endowed to the new contract, zero when absent.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub value: Option<U256>,
	/// Salt string; its keccak256 hash is the CREATE2 salt.
	pub salt: String,
}

/// Description of a single action to be authorized by the signer.
///
/// The variant is fixed at construction time. Use [`CallDescriptor::classify`]
/// to build one from loosely shaped input where only the presence of a salt
/// tells the two kinds apart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CallDescriptor {
	Direct(DirectCall),
	Deploy(DeployCall),
}

/// Ordered list of calls authorized together under one signature.
pub type BatchCallDescriptor = Vec<CallDescriptor>;

impl CallDescriptor {
	/// Convenience constructor for a direct call.
	pub fn direct(to: Address, data: impl Into<Bytes>, value: U256) -> Self {
		CallDescriptor::Direct(DirectCall {
			to,
			data: Some(data.into()),
			value: Some(value),
		})
	}

	/// Convenience constructor for a deploy call.
	pub fn deploy(init_code: impl Into<Bytes>, value: U256, salt: impl Into<String>) -> Self {
		CallDescriptor::Deploy(DeployCall {
			init_code: init_code.into(),
			value: Some(value),
			salt: salt.into(),
		})
	}

	/// Classifies a loosely shaped call.
	///
	/// A non-empty `salt` makes the call a deploy call and the `data` its init
	/// code. An absent or empty `salt` makes it a direct call to `to`.
	pub fn classify(
		to: Option<Address>,
		data: Option<Bytes>,
		value: Option<U256>,
		salt: Option<String>,
	) -> Result<Self, DescriptorError> {
		match salt.filter(|s| !s.is_empty()) {
			Some(salt) => {
				if to.is_some() {
					return Err(DescriptorError::AmbiguousShape);
				}
				let init_code = data
					.filter(|d| !d.is_empty())
					.ok_or(DescriptorError::MissingInitCode)?;
				Ok(CallDescriptor::Deploy(DeployCall {
					init_code,
					value,
					salt,
				}))
			},
			None => {
				let to = to.ok_or(DescriptorError::MissingDestination)?;
				Ok(CallDescriptor::Direct(DirectCall { to, data, value }))
			},
		}
	}

	/// Checks that a constructed descriptor is complete.
	pub fn validate(&self) -> Result<(), DescriptorError> {
		match self {
			CallDescriptor::Direct(_) => Ok(()),
			CallDescriptor::Deploy(deploy) => {
				if deploy.init_code.is_empty() {
					return Err(DescriptorError::MissingInitCode);
				}
				if deploy.salt.is_empty() {
					return Err(DescriptorError::EmptySalt);
				}
				Ok(())
			},
		}
	}

	/// Returns true when this descriptor is routed through deploy lowering.
	pub fn is_deploy(&self) -> bool {
		matches!(self, CallDescriptor::Deploy(_))
	}

	/// Value attached to the call, zero when unspecified.
	pub fn value(&self) -> U256 {
		match self {
			CallDescriptor::Direct(call) => call.value.unwrap_or_default(),
			CallDescriptor::Deploy(call) => call.value.unwrap_or_default(),
		}
	}
}

/// A lowered call in the uniform shape every forwarder encodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MinimalTx {
	/// Destination the forwarder calls.
	pub to: Address,
	/// Wei sent along.
	pub value: U256,
	/// Calldata.
	pub data: Bytes,
	/// How the forwarder executes the call.
	pub call_type: CallType,
}

#[cfg(test)]
mod tests {
	use super::*;
	use alloy::primitives::address;

	const TARGET: Address = address!("0x1111111111111111111111111111111111111111");

	#[test]
	fn test_salt_routes_to_deploy() {
		let call = CallDescriptor::classify(
			None,
			Some(Bytes::from_static(&[0x60, 0x80])),
			None,
			Some("my-salt".to_string()),
		)
		.unwrap();
		assert!(call.is_deploy());
	}

	#[test]
	fn test_empty_or_missing_salt_routes_to_direct() {
		let empty = CallDescriptor::classify(Some(TARGET), None, None, Some(String::new())).unwrap();
		assert!(!empty.is_deploy());

		let missing = CallDescriptor::classify(Some(TARGET), None, None, None).unwrap();
		assert!(!missing.is_deploy());
	}

	#[test]
	fn test_deploy_without_init_code_is_malformed() {
		let result = CallDescriptor::classify(None, None, None, Some("salt".to_string()));
		assert_eq!(result, Err(DescriptorError::MissingInitCode));

		let constructed = CallDescriptor::deploy(Bytes::new(), U256::ZERO, "salt");
		assert_eq!(constructed.validate(), Err(DescriptorError::MissingInitCode));
	}

	#[test]
	fn test_direct_without_destination_is_malformed() {
		let result = CallDescriptor::classify(None, Some(Bytes::from_static(b"x")), None, None);
		assert_eq!(result, Err(DescriptorError::MissingDestination));
	}

	#[test]
	fn test_destination_and_salt_is_ambiguous() {
		let result = CallDescriptor::classify(
			Some(TARGET),
			Some(Bytes::from_static(b"x")),
			None,
			Some("salt".to_string()),
		);
		assert_eq!(result, Err(DescriptorError::AmbiguousShape));
	}

	#[test]
	fn test_descriptor_serde_tag() {
		let json = r#"{"kind":"deploy","init_code":"0x6080","salt":"abc"}"#;
		let call: CallDescriptor = serde_json::from_str(json).unwrap();
		assert!(call.is_deploy());
		assert_eq!(call.value(), U256::ZERO);

		let direct = CallDescriptor::direct(TARGET, Bytes::new(), U256::from(5));
		let encoded = serde_json::to_string(&direct).unwrap();
		assert!(encoded.contains("\"kind\":\"direct\""));
	}

	#[test]
	fn test_call_type_wire_values() {
		assert_eq!(CallType::Call.as_u8(), 0);
		assert_eq!(CallType::DelegateCall.as_u8(), 1);
		assert_eq!(CallType::try_from(1), Ok(CallType::DelegateCall));
		assert_eq!(CallType::try_from(7), Err(7));
	}
}
