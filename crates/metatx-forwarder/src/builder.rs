//! Assembles a [`Forwarder`] from configuration.
//!
//! Each section's `primary` selects a registered implementation by name, and
//! that implementation's table is handed to its factory.

use crate::{Forwarder, ForwarderContext, ForwarderError};
use metatx_account::AccountService;
use metatx_config::{Config, ImplementationsConfig};
use metatx_replay::readers::rpc::RpcNonceReader;
use metatx_replay::NonceReader;
use std::sync::Arc;

/// Builds a forwarder from a validated [`Config`].
pub struct ForwarderBuilder {
	config: Config,
	nonce_reader: Option<Arc<dyn NonceReader>>,
}

fn lookup<F: Copy>(
	section: &str,
	selection: &ImplementationsConfig,
	registered: Vec<(&'static str, F)>,
) -> Result<(F, toml::Value), ForwarderError> {
	let (name, table) = selection.primary_implementation().ok_or_else(|| {
		ForwarderError::Configuration(format!(
			"{} primary '{}' is not configured",
			section, selection.primary
		))
	})?;
	let factory = registered
		.into_iter()
		.find(|(registered_name, _)| *registered_name == name)
		.map(|(_, factory)| factory)
		.ok_or_else(|| {
			ForwarderError::Configuration(format!("Unknown {} implementation '{}'", section, name))
		})?;
	Ok((factory, table.clone()))
}

impl ForwarderBuilder {
	pub fn new(config: Config) -> Self {
		Self {
			config,
			nonce_reader: None,
		}
	}

	/// Reads replay protection state through `reader` instead of the
	/// configured RPC endpoint.
	pub fn with_nonce_reader(mut self, reader: Arc<dyn NonceReader>) -> Self {
		self.nonce_reader = Some(reader);
		self
	}

	pub async fn build(self) -> Result<Forwarder, ForwarderError> {
		let config = self.config;

		let (account_factory, account_table) = lookup(
			"account",
			&config.account,
			metatx_account::get_all_implementations(),
		)?;
		let account = account_factory(&account_table)
			.map_err(|e| ForwarderError::Configuration(e.to_string()))?;
		let account = Arc::new(AccountService::new(account));
		let signer = account.get_address().await?;

		let reader = match self.nonce_reader {
			Some(reader) => reader,
			None => Arc::new(
				RpcNonceReader::new(&config.network.rpc_url)
					.map_err(|e| ForwarderError::Configuration(e.to_string()))?,
			),
		};
		let (replay_factory, replay_table) = lookup(
			"replay_protection",
			&config.replay_protection,
			metatx_replay::get_all_implementations(),
		)?;
		let replay_protection = replay_factory(&replay_table, signer, reader)
			.map_err(|e| ForwarderError::Configuration(e.to_string()))?;

		let (forwarder_factory, forwarder_table) = lookup(
			"forwarder",
			&config.forwarder,
			crate::get_all_implementations(),
		)?;
		let context = ForwarderContext {
			signer,
			deployments: config.deployments,
		};
		let implementation = forwarder_factory(&forwarder_table, &context)?;

		tracing::info!(
			chain_id = config.network.chain_id,
			forwarder = %implementation.address(),
			authority = %replay_protection.authority_address(),
			signer = %signer,
			"Forwarder ready"
		);

		Ok(Forwarder::new(
			implementation,
			Arc::from(replay_protection),
			account,
			config.network.chain_id,
			config.deployments.delegate_deployer,
		))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::implementations::proxy_account::proxy_account_address;
	use crate::test_support::{deployments, AUTHORITY, SIGNER};
	use alloy::primitives::{Bytes, U256};
	use metatx_replay::readers::memory::MemoryNonceReader;
	use metatx_types::CallDescriptor;

	const CONFIG: &str = r#"
[network]
chain_id = 31337
rpc_url = "http://localhost:8545"

[account]
primary = "local"
[account.implementations.local]
private_key = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80"

[replay_protection]
primary = "bit_flip"
[replay_protection.implementations.bit_flip]
authority = "0x5FbDB2315678afecb367f032d93F642f64180aa3"

[forwarder]
primary = "proxy_account"
[forwarder.implementations.proxy_account]

[deployments]
relay_hub = "0xCf7Ed3AccA5a467e9e704C703E8D87F634fB0Fc9"
proxy_account_deployer = "0xDc64a140Aa3E981100a9becA4E685f962f0cF6C9"
base_account = "0x5FC8d32690cc91D4c39d9d3abcBD16989F875707"
delegate_deployer = "0x9fE46736679d2D9a65F0992F2272dE9f3c7fa6e0"
"#;

	#[tokio::test]
	async fn test_build_from_config() {
		let config: Config = CONFIG.parse().unwrap();
		let forwarder = ForwarderBuilder::new(config)
			.with_nonce_reader(Arc::new(MemoryNonceReader::new()))
			.build()
			.await
			.unwrap();

		let d = deployments();
		assert_eq!(
			forwarder.address(),
			proxy_account_address(d.proxy_account_deployer, d.base_account, SIGNER)
		);
		assert_eq!(forwarder.chain_id(), 31337);

		let call = CallDescriptor::direct(d.relay_hub, Bytes::new(), U256::ZERO);
		let envelope = forwarder.forward_params(&call).await.unwrap();
		assert_eq!(envelope.signer, SIGNER);
		assert_eq!(envelope.replay_protection_authority, AUTHORITY);
		assert_eq!(
			envelope.replay_protection.decode().unwrap(),
			(U256::ZERO, U256::from(1))
		);
	}

	#[tokio::test]
	async fn test_unknown_implementation_rejected() {
		let input = CONFIG
			.replace("primary = \"proxy_account\"", "primary = \"gas_station\"")
			.replace(
				"[forwarder.implementations.proxy_account]",
				"[forwarder.implementations.gas_station]",
			);
		let config: Config = input.parse().unwrap();
		let result = ForwarderBuilder::new(config)
			.with_nonce_reader(Arc::new(MemoryNonceReader::new()))
			.build()
			.await;
		assert!(matches!(result, Err(ForwarderError::Configuration(_))));
	}

	#[tokio::test]
	async fn test_invalid_key_is_configuration_error() {
		let input = CONFIG.replace(
			"0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80",
			"0x1234",
		);
		let config: Config = input.parse().unwrap();
		let result = ForwarderBuilder::new(config).build().await;
		assert!(matches!(result, Err(ForwarderError::Configuration(_))));
	}
}
