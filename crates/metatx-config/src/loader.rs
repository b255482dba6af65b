//! Multi-file configuration loading.
//!
//! A file may list other files under `include`. Included files are resolved
//! relative to the directory of the top-level file, each top-level section
//! may appear in only one file, and a file included twice is rejected.

use crate::{resolve_env_vars, Config, ConfigError};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

pub(crate) struct ConfigLoader {
	base_path: PathBuf,
	loaded_files: HashSet<PathBuf>,
	/// Top-level section name to the file that defined it.
	section_sources: HashMap<String, PathBuf>,
}

impl ConfigLoader {
	pub(crate) fn new(base_path: impl AsRef<Path>) -> Self {
		Self {
			base_path: base_path.as_ref().to_path_buf(),
			loaded_files: HashSet::new(),
			section_sources: HashMap::new(),
		}
	}

	/// Loads `config_path` and everything it includes into one [`Config`].
	pub(crate) async fn load_config(
		&mut self,
		config_path: impl AsRef<Path>,
	) -> Result<Config, ConfigError> {
		let config_path = self.resolve_path(config_path)?;
		let content = self.load_file(&config_path).await?;
		let mut root: toml::Value = toml::from_str(&content)?;

		let includes = extract_includes(&root)?;
		if includes.is_empty() {
			return Config::from_resolved(&content);
		}

		if let Some(table) = root.as_table_mut() {
			table.remove("include");
			for key in table.keys() {
				self.section_sources.insert(key.clone(), config_path.clone());
			}
		}

		for include in includes {
			let include_path = self.resolve_path(&include)?;
			let include_content = self.load_file(&include_path).await?;
			let included: toml::Value = toml::from_str(&include_content)?;
			self.merge(&mut root, included, &include_path)?;
		}

		let combined = toml::to_string(&root).map_err(|e| {
			ConfigError::Parse(format!("Failed to serialize combined config: {}", e))
		})?;
		Config::from_resolved(&combined)
	}

	fn merge(
		&mut self,
		root: &mut toml::Value,
		included: toml::Value,
		source: &Path,
	) -> Result<(), ConfigError> {
		let toml::Value::Table(included) = included else {
			return Ok(());
		};
		let Some(root) = root.as_table_mut() else {
			return Err(ConfigError::Validation(
				"Top-level configuration must be a table".into(),
			));
		};

		for (key, value) in included {
			if key == "include" {
				return Err(ConfigError::Validation(format!(
					"Nested include in {} is not supported",
					source.display()
				)));
			}
			if let Some(existing) = self.section_sources.get(&key) {
				return Err(ConfigError::Validation(format!(
					"Duplicate section '{}' found in {} and {}",
					key,
					existing.display(),
					source.display()
				)));
			}
			tracing::debug!(section = %key, file = %source.display(), "Merged included section");
			self.section_sources.insert(key.clone(), source.to_path_buf());
			root.insert(key, value);
		}

		Ok(())
	}

	/// Reads a file once and resolves its environment references.
	async fn load_file(&mut self, path: &Path) -> Result<String, ConfigError> {
		let canonical = tokio::fs::canonicalize(path).await?;
		if !self.loaded_files.insert(canonical.clone()) {
			return Err(ConfigError::Validation(format!(
				"Circular include detected: {} was already loaded",
				canonical.display()
			)));
		}

		let content = tokio::fs::read_to_string(path).await?;
		resolve_env_vars(&content)
	}

	fn resolve_path(&self, path: impl AsRef<Path>) -> Result<PathBuf, ConfigError> {
		let path = path.as_ref();
		let resolved = if path.is_absolute() {
			path.to_path_buf()
		} else {
			self.base_path.join(path)
		};

		if !resolved.exists() {
			return Err(ConfigError::Io(std::io::Error::new(
				std::io::ErrorKind::NotFound,
				format!("Configuration file not found: {}", resolved.display()),
			)));
		}
		Ok(resolved)
	}
}

/// Reads `include` as a single path or an array of paths.
fn extract_includes(root: &toml::Value) -> Result<Vec<PathBuf>, ConfigError> {
	match root.get("include") {
		None => Ok(Vec::new()),
		Some(toml::Value::String(path)) => Ok(vec![PathBuf::from(path)]),
		Some(toml::Value::Array(items)) => items
			.iter()
			.map(|item| {
				item.as_str().map(PathBuf::from).ok_or_else(|| {
					ConfigError::Validation("Include array must contain only strings".into())
				})
			})
			.collect(),
		Some(_) => Err(ConfigError::Validation(
			"Include must be a string or array of strings".into(),
		)),
	}
}

#[cfg(test)]
mod tests {
	use crate::test_config::VALID;
	use crate::{Config, ConfigError};
	use std::fs;
	use tempfile::TempDir;

	fn split_at_section(section: &str) -> (String, String) {
		let at = VALID.find(section).unwrap();
		(VALID[..at].to_string(), VALID[at..].to_string())
	}

	#[tokio::test]
	async fn test_single_file_config() {
		let dir = TempDir::new().unwrap();
		let path = dir.path().join("config.toml");
		fs::write(&path, VALID).unwrap();

		let config = Config::from_file(&path).await.unwrap();
		assert_eq!(config.network.chain_id, 31337);
	}

	#[tokio::test]
	async fn test_include_merges_sections() {
		let dir = TempDir::new().unwrap();
		let (head, deployments) = split_at_section("[deployments]");
		fs::write(dir.path().join("deployments.toml"), deployments).unwrap();
		fs::write(
			dir.path().join("config.toml"),
			format!("include = [\"deployments.toml\"]\n{}", head),
		)
		.unwrap();

		let config = Config::from_file(dir.path().join("config.toml"))
			.await
			.unwrap();
		assert_eq!(
			config.deployments.delegate_deployer.to_string(),
			"0x9fE46736679d2D9a65F0992F2272dE9f3c7fa6e0"
		);
	}

	#[tokio::test]
	async fn test_duplicate_section_rejected() {
		let dir = TempDir::new().unwrap();
		fs::write(
			dir.path().join("network.toml"),
			"[network]\nchain_id = 1\nrpc_url = \"http://other\"\n",
		)
		.unwrap();
		fs::write(
			dir.path().join("config.toml"),
			format!("include = \"network.toml\"\n{}", VALID),
		)
		.unwrap();

		let err = Config::from_file(dir.path().join("config.toml"))
			.await
			.unwrap_err();
		assert!(err.to_string().contains("Duplicate section 'network'"));
	}

	#[tokio::test]
	async fn test_same_file_included_twice_rejected() {
		let dir = TempDir::new().unwrap();
		let (head, deployments) = split_at_section("[deployments]");
		fs::write(dir.path().join("deployments.toml"), deployments).unwrap();
		fs::write(
			dir.path().join("config.toml"),
			format!(
				"include = [\"deployments.toml\", \"./deployments.toml\"]\n{}",
				head
			),
		)
		.unwrap();

		let result = Config::from_file(dir.path().join("config.toml")).await;
		assert!(matches!(result, Err(ConfigError::Validation(_))));
	}

	#[tokio::test]
	async fn test_env_values_are_not_expanded_twice() {
		std::env::set_var("METATX_LOADER_RPC_URL", "http://node/${METATX_LOADER_UNSET}");
		let dir = TempDir::new().unwrap();
		let path = dir.path().join("config.toml");
		fs::write(
			&path,
			VALID.replace("http://localhost:8545", "${METATX_LOADER_RPC_URL}"),
		)
		.unwrap();

		let config = Config::from_file(&path).await.unwrap();
		assert_eq!(config.network.rpc_url, "http://node/${METATX_LOADER_UNSET}");
		std::env::remove_var("METATX_LOADER_RPC_URL");
	}

	#[tokio::test]
	async fn test_missing_include_is_io_error() {
		let dir = TempDir::new().unwrap();
		fs::write(
			dir.path().join("config.toml"),
			format!("include = [\"absent.toml\"]\n{}", VALID),
		)
		.unwrap();

		let result = Config::from_file(dir.path().join("config.toml")).await;
		assert!(matches!(result, Err(ConfigError::Io(_))));
	}
}
