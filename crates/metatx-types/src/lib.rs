//! Shared types for the meta-transaction workspace.
//!
//! Call descriptors, signed envelopes, replay protection tokens and the
//! configuration validation framework used by the account, replay protection
//! and forwarder crates.

/// Call descriptors and the lowered call shape.
pub mod call;
/// Well-known deployment addresses.
pub mod deployments;
/// Signed envelopes, the relayer payload and replay protection tokens.
pub mod envelope;
/// Registry trait for named implementations.
pub mod registry;
/// Zeroizing secret wrapper.
pub mod secret_string;
/// Hex and address helpers.
pub mod utils;
/// Configuration validation.
pub mod validation;

pub use call::*;
pub use deployments::DeploymentAddresses;
pub use envelope::*;
pub use registry::ImplementationRegistry;
pub use secret_string::SecretString;
pub use utils::{parse_address, toml_address, with_0x_prefix, without_0x_prefix};
pub use validation::*;

pub use alloy::primitives::{Address, Bytes, B256, U256};
