pub mod admin;
pub mod config;
pub mod deploy;
pub mod endpoint;
pub mod key;
pub mod tx;

use std::path::PathBuf;

use anyhow::{Context, Result};
use zeroize::Zeroizing;

use crate::cli::Cli;
use crate::config::{Config, NetworkConfig};
use crate::contracts;
use crate::registry::{RegistryClient, WriteSettings};
use crate::rpc::{RpcClient, TransactionReceipt};
use crate::types::{Address, TxHash};
use crate::vault::KeyRecord;

/// Non-interactive password source, checked before prompting.
pub const PASSWORD_ENV: &str = "POLYPORTAL_PASSWORD";
pub const MIN_PASSWORD_LEN: usize = 8;

/// Resolve the network from CLI flags + config.
pub fn resolve_network(cli: &Cli, config: &Config) -> NetworkConfig {
	config.resolve_network(cli.network, cli.rpc_url.as_deref())
}

/// Build a registry client for the resolved network.
pub fn connect(cli: &Cli, config: &Config) -> Result<(NetworkConfig, RegistryClient)> {
	let network = resolve_network(cli, config);
	let rpc = RpcClient::new(&network.rpc_url, config.rpc_timeout(), config.retry_policy())?;
	let registry = RegistryClient::new(
		rpc,
		network.chain_id,
		WriteSettings::from(&config.transaction),
	);
	Ok((network, registry))
}

/// Use `--contract` if given, otherwise the known deployment for the chain.
pub fn resolve_contract(arg: Option<Address>, network: &NetworkConfig) -> Result<Address> {
	arg.or_else(|| contracts::deployment_for(network.chain_id)).with_context(|| {
		format!(
			"No registry deployment known for {} (chain {}). Pass --contract <address>.",
			network.name, network.chain_id
		)
	})
}

pub fn keystore_path(cli: &Cli, config: &Config) -> Result<PathBuf> {
	match &cli.keystore {
		Some(p) => Ok(p.clone()),
		None => config.keystore_path(),
	}
}

/// Load the keystore, pointing at `import-key` when there is none.
pub fn load_keystore(cli: &Cli, config: &Config) -> Result<KeyRecord> {
	let path = keystore_path(cli, config)?;
	if !path.exists() {
		anyhow::bail!(
			"No keystore at {}. Run: polyportal import-key",
			path.display()
		);
	}
	Ok(KeyRecord::load(&path)?)
}

// -- Passwords --

/// Password for unlocking: from the environment, else prompted.
pub fn read_password() -> Result<Zeroizing<String>> {
	if let Ok(pw) = std::env::var(PASSWORD_ENV) {
		return Ok(Zeroizing::new(pw));
	}
	let pw = rpassword::prompt_password("Keystore password: ").context("reading password")?;
	Ok(Zeroizing::new(pw))
}

/// Password for a new keystore: prompted twice and length-checked.
pub fn read_new_password() -> Result<Zeroizing<String>> {
	if let Ok(pw) = std::env::var(PASSWORD_ENV) {
		check_password_strength(&pw)?;
		return Ok(Zeroizing::new(pw));
	}
	let pw = Zeroizing::new(
		rpassword::prompt_password("New keystore password: ").context("reading password")?,
	);
	check_password_strength(&pw)?;
	let confirm = Zeroizing::new(
		rpassword::prompt_password("Confirm password: ").context("reading password")?,
	);
	if *pw != *confirm {
		anyhow::bail!("Passwords do not match.");
	}
	Ok(pw)
}

pub fn check_password_strength(pw: &str) -> Result<()> {
	if pw.chars().count() < MIN_PASSWORD_LEN {
		anyhow::bail!("Password must be at least {MIN_PASSWORD_LEN} characters.");
	}
	Ok(())
}

// -- Output --

/// Print the hash, then wait for the receipt unless told not to.
pub async fn finish_write(
	registry: &RegistryClient,
	hash: &TxHash,
	no_wait: bool,
) -> Result<Option<TransactionReceipt>> {
	println!("TX: {hash}");
	if no_wait {
		return Ok(None);
	}
	println!("Waiting for confirmation...");
	let receipt = registry
		.wait_for_receipt(hash)
		.await
		.with_context(|| format!("transaction {hash}"))?;
	println!("Confirmed in block {}.", receipt.block_number);
	Ok(Some(receipt))
}

#[cfg(test)]
mod tests {
	use super::*;

	fn network(chain_id: u64) -> NetworkConfig {
		NetworkConfig {
			name: "test".into(),
			rpc_url: "http://127.0.0.1:8545".into(),
			chain_id,
		}
	}

	#[test]
	fn contract_falls_back_to_known_deployment() {
		let explicit: Address = "0x5FbDB2315678afecb367f032d93F642f64180aa3".parse().unwrap();
		assert_eq!(resolve_contract(Some(explicit), &network(84_532)).unwrap(), explicit);
		assert!(resolve_contract(None, &network(84_532)).is_ok());
		assert!(resolve_contract(None, &network(1337)).is_err());
	}

	#[test]
	fn short_passwords_are_rejected() {
		assert!(check_password_strength("1234567").is_err());
		assert!(check_password_strength("12345678").is_ok());
		// Counted in characters, not bytes.
		assert!(check_password_strength("ééééééé").is_err());
	}
}
