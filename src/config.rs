use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::atomic::write_atomic;
use crate::rpc::RetryPolicy;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
	pub network: NetworkSection,
	pub rpc: RpcSection,
	pub transaction: TransactionSection,
	pub contract: ContractSection,
	pub keystore: KeystoreSection,
}

/// Which chain to talk to.  Unset fields fall back to the preset named by
/// `name`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkSection {
	pub name: NetworkPreset,
	pub rpc_url: Option<String>,
	pub chain_id: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RpcSection {
	pub timeout_secs: u64,
	pub max_attempts: u32,
	pub initial_backoff_ms: u64,
	pub max_backoff_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeeMode {
	Legacy,
	Eip1559,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransactionSection {
	pub fee_mode: FeeMode,
	/// Applied to `eth_estimateGas` to get the signed gas limit.
	pub gas_limit_multiplier_percent: u64,
	pub receipt_timeout_secs: u64,
	pub poll_interval_ms: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContractSection {
	/// Compiled contract artifact (JSON with a `bytecode` field).
	pub artifact_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeystoreSection {
	pub path: Option<PathBuf>,
}

impl Default for NetworkSection {
	fn default() -> Self {
		Self {
			name: NetworkPreset::Localhost,
			rpc_url: None,
			chain_id: None,
		}
	}
}

impl Default for RpcSection {
	fn default() -> Self {
		Self {
			timeout_secs: 30,
			max_attempts: 3,
			initial_backoff_ms: 250,
			max_backoff_ms: 4_000,
		}
	}
}

impl Default for TransactionSection {
	fn default() -> Self {
		Self {
			fee_mode: FeeMode::Legacy,
			gas_limit_multiplier_percent: 120,
			receipt_timeout_secs: 120,
			poll_interval_ms: 1_500,
		}
	}
}

// -- Networks --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum NetworkPreset {
	Localhost,
	Sepolia,
	Mainnet,
	Base,
	BaseSepolia,
}

impl NetworkPreset {
	pub fn as_str(&self) -> &'static str {
		match self {
			Self::Localhost => "localhost",
			Self::Sepolia => "sepolia",
			Self::Mainnet => "mainnet",
			Self::Base => "base",
			Self::BaseSepolia => "base-sepolia",
		}
	}

	pub fn chain_id(&self) -> u64 {
		match self {
			Self::Localhost => 1337,
			Self::Sepolia => 11_155_111,
			Self::Mainnet => 1,
			Self::Base => 8453,
			Self::BaseSepolia => 84_532,
		}
	}

	pub fn default_rpc_url(&self) -> &'static str {
		match self {
			Self::Localhost => "http://127.0.0.1:8545",
			Self::Sepolia => "https://rpc.sepolia.org",
			Self::Mainnet => "https://eth.llamarpc.com",
			Self::Base => "https://mainnet.base.org",
			Self::BaseSepolia => "https://sepolia.base.org",
		}
	}
}

/// The resolved network the remote client talks to.  Read-only once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkConfig {
	pub name: String,
	pub rpc_url: String,
	pub chain_id: u64,
}

impl Config {
	/// Directory where CLI state is stored (~/.polyportal/).
	pub fn dir() -> anyhow::Result<PathBuf> {
		dirs::home_dir()
			.map(|home| home.join(".polyportal"))
			.context("could not determine home directory")
	}

	/// Path to the config file.
	pub fn path() -> anyhow::Result<PathBuf> {
		Ok(Self::dir()?.join("config.toml"))
	}

	/// Load config from disk, falling back to defaults if no file exists.
	pub fn load() -> anyhow::Result<Self> {
		let path = Self::path()?;
		if path.exists() {
			let content = std::fs::read_to_string(&path)
				.with_context(|| format!("reading {}", path.display()))?;
			toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))
		} else {
			Ok(Self::default())
		}
	}

	/// Persist the current config to disk, creating the directory if needed.
	pub fn save(&self) -> anyhow::Result<()> {
		let path = Self::path()?;
		write_atomic(&path, toml::to_string_pretty(self)?.as_bytes())?;
		Ok(())
	}

	/// Combine the config file with command-line overrides.  A `--network`
	/// flag replaces the configured network wholesale, including its chain
	/// id; `--rpc-url` only replaces the endpoint.
	pub fn resolve_network(
		&self,
		preset: Option<NetworkPreset>,
		rpc_url: Option<&str>,
	) -> NetworkConfig {
		let (name, configured_url, chain_id) = match preset {
			Some(p) if p != self.network.name => (p, None, p.chain_id()),
			_ => {
				let p = self.network.name;
				(
					p,
					self.network.rpc_url.as_deref(),
					self.network.chain_id.unwrap_or(p.chain_id()),
				)
			}
		};
		NetworkConfig {
			name: name.as_str().to_owned(),
			rpc_url: rpc_url
				.or(configured_url)
				.unwrap_or(name.default_rpc_url())
				.to_owned(),
			chain_id,
		}
	}

	pub fn keystore_path(&self) -> anyhow::Result<PathBuf> {
		match &self.keystore.path {
			Some(p) => Ok(p.clone()),
			None => Ok(Self::dir()?.join("keystore.json")),
		}
	}

	pub fn retry_policy(&self) -> RetryPolicy {
		RetryPolicy {
			max_attempts: self.rpc.max_attempts.max(1),
			initial_backoff: Duration::from_millis(self.rpc.initial_backoff_ms),
			max_backoff: Duration::from_millis(self.rpc.max_backoff_ms),
		}
	}

	pub fn rpc_timeout(&self) -> Duration {
		Duration::from_secs(self.rpc.timeout_secs)
	}
}
