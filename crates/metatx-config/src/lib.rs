//! Configuration for the meta-transaction forwarder.
//!
//! Configuration is TOML. String values may reference environment variables
//! as `${VAR}` or `${VAR:-default}`, and a file may pull in other files with
//! `include = ["replay.toml", "forwarder.toml"]`. Each top-level section must
//! be defined in exactly one file.
//!
//! ```toml
//! [network]
//! chain_id = 31337
//! rpc_url = "${RPC_URL:-http://localhost:8545}"
//!
//! [account]
//! primary = "local"
//! [account.implementations.local]
//! private_key = "${SIGNER_KEY}"
//!
//! [replay_protection]
//! primary = "multi_nonce"
//! [replay_protection.implementations.multi_nonce]
//! authority = "0x..."
//!
//! [forwarder]
//! primary = "relay_hub"
//! [forwarder.implementations.relay_hub]
//!
//! [deployments]
//! relay_hub = "0x..."
//! proxy_account_deployer = "0x..."
//! base_account = "0x..."
//! delegate_deployer = "0x..."
//! ```

mod loader;

use metatx_types::DeploymentAddresses;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

/// Largest configuration text accepted for environment resolution.
const MAX_INPUT_SIZE: usize = 1024 * 1024;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
	#[error("Configuration error: {0}")]
	Parse(String),
	#[error("Validation error: {0}")]
	Validation(String),
}

impl From<toml::de::Error> for ConfigError {
	fn from(err: toml::de::Error) -> Self {
		// The default rendering repeats the whole input
		ConfigError::Parse(err.message().to_string())
	}
}

/// Complete configuration of one forwarder instance.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
	pub network: NetworkConfig,
	pub account: ImplementationsConfig,
	pub replay_protection: ImplementationsConfig,
	pub forwarder: ImplementationsConfig,
	pub deployments: DeploymentAddresses,
}

/// The chain transactions are signed for.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NetworkConfig {
	/// Bound into every canonical hash.
	pub chain_id: u64,
	/// Endpoint used to read replay protection state.
	pub rpc_url: String,
}

/// A set of named implementations with one of them selected.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ImplementationsConfig {
	/// Which implementation to use.
	pub primary: String,
	/// Implementation name to its raw TOML table.
	pub implementations: HashMap<String, toml::Value>,
}

impl ImplementationsConfig {
	/// Name and table of the selected implementation.
	pub fn primary_implementation(&self) -> Option<(&str, &toml::Value)> {
		self.implementations
			.get(&self.primary)
			.map(|table| (self.primary.as_str(), table))
	}

	fn validate(&self, section: &str) -> Result<(), ConfigError> {
		if self.primary.is_empty() {
			return Err(ConfigError::Validation(format!(
				"{}.primary cannot be empty",
				section
			)));
		}
		if !self.implementations.contains_key(&self.primary) {
			return Err(ConfigError::Validation(format!(
				"{}.primary '{}' has no entry in {}.implementations",
				section, self.primary, section
			)));
		}
		Ok(())
	}
}

/// Replaces `${VAR}` and `${VAR:-default}` with environment values.
///
/// A referenced variable that is unset and has no default is an error.
pub(crate) fn resolve_env_vars(input: &str) -> Result<String, ConfigError> {
	if input.len() > MAX_INPUT_SIZE {
		return Err(ConfigError::Validation(format!(
			"Configuration file too large: {} bytes (max: {} bytes)",
			input.len(),
			MAX_INPUT_SIZE
		)));
	}

	let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]{0,127})(?::-([^}]{0,256}))?\}")
		.map_err(|e| ConfigError::Parse(format!("Regex error: {}", e)))?;

	let mut resolved = String::with_capacity(input.len());
	let mut last = 0;
	for cap in re.captures_iter(input) {
		let (Some(whole), Some(name)) = (cap.get(0), cap.get(1)) else {
			continue;
		};
		let value = match (std::env::var(name.as_str()), cap.get(2)) {
			(Ok(value), _) => value,
			(Err(_), Some(default)) => default.as_str().to_string(),
			(Err(_), None) => {
				return Err(ConfigError::Validation(format!(
					"Environment variable '{}' not found",
					name.as_str()
				)));
			},
		};
		resolved.push_str(&input[last..whole.start()]);
		resolved.push_str(&value);
		last = whole.end();
	}
	resolved.push_str(&input[last..]);

	Ok(resolved)
}

impl Config {
	/// Loads configuration from a file, following `include` directives.
	pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
		let path = path.as_ref();
		let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
		let file_name = path.file_name().ok_or_else(|| {
			ConfigError::Validation(format!("Invalid path: {}", path.display()))
		})?;

		let mut loader = loader::ConfigLoader::new(base_dir);
		let config = loader.load_config(file_name).await?;
		tracing::info!(
			chain_id = config.network.chain_id,
			forwarder = %config.forwarder.primary,
			replay_protection = %config.replay_protection.primary,
			"Loaded configuration"
		);
		Ok(config)
	}

	/// Parses and validates text whose environment references are already resolved.
	pub(crate) fn from_resolved(resolved: &str) -> Result<Self, ConfigError> {
		let config: Config = toml::from_str(resolved)?;
		config.validate()?;
		Ok(config)
	}

	fn validate(&self) -> Result<(), ConfigError> {
		if self.network.chain_id == 0 {
			return Err(ConfigError::Validation("network.chain_id cannot be 0".into()));
		}
		if self.network.rpc_url.is_empty() {
			return Err(ConfigError::Validation("network.rpc_url cannot be empty".into()));
		}

		self.account.validate("account")?;
		self.replay_protection.validate("replay_protection")?;
		self.forwarder.validate("forwarder")?;

		for (name, table) in &self.replay_protection.implementations {
			if let Some(count) = table.get("queue_count") {
				match count.as_integer() {
					Some(n) if n >= 1 => {},
					_ => {
						return Err(ConfigError::Validation(format!(
							"replay_protection.implementations.{}.queue_count must be an integer >= 1",
							name
						)));
					},
				}
			}
		}

		Ok(())
	}
}

impl FromStr for Config {
	type Err = ConfigError;

	/// Resolves environment variables, parses and validates.
	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Config::from_resolved(&resolve_env_vars(s)?)
	}
}
