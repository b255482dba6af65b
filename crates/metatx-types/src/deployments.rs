//! Well-known contract addresses used by the forwarders.
//!
//! These are produced by a deterministic deployment outside this workspace and
//! are treated here as opaque constants loaded from configuration.

use alloy::primitives::Address;
use serde::{Deserialize, Serialize};

/// Addresses of the forwarder infrastructure on one chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentAddresses {
	/// Relay-style forwarder shared by all signers.
	pub relay_hub: Address,
	/// Factory that deploys per-signer proxy accounts via CREATE2.
	pub proxy_account_deployer: Address,
	/// Implementation contract every proxy account clones.
	pub base_account: Address,
	/// Contract exposing `deploy(bytes,uint256,bytes32)`, the target of lowered deploy calls.
	pub delegate_deployer: Address,
}
