use anyhow::{Context, Result};

use crate::abi::AbiValue;
use crate::cli::Cli;
use crate::commands::{connect, finish_write, load_keystore, read_password, resolve_contract};
use crate::config::Config;
use crate::contracts::Function;
use crate::types::Address;
use crate::vault;

/// Add or remove an endpoint URL.
pub async fn write(
	cli: &Cli,
	f: Function,
	contract: Option<Address>,
	url: &str,
	no_wait: bool,
) -> Result<()> {
	if url.trim().is_empty() {
		anyhow::bail!("Endpoint URL must not be empty.");
	}
	let config = Config::load()?;
	let record = load_keystore(cli, &config)?;
	let (network, registry) = connect(cli, &config)?;
	let contract = resolve_contract(contract, &network)?;
	let password = read_password()?;

	println!("{} {url} on {}...", f.name(), network.name);
	let hash = registry
		.transact(
			record.address,
			contract,
			f,
			&[AbiValue::String(url.to_owned())],
			|| vault::unlock(&record, &password),
		)
		.await
		.with_context(|| format!("{} failed", f.name()))?;

	finish_write(&registry, &hash, no_wait).await?;
	Ok(())
}

pub async fn list(cli: &Cli, contract: Option<Address>) -> Result<()> {
	let config = Config::load()?;
	let (network, registry) = connect(cli, &config)?;
	let contract = resolve_contract(contract, &network)?;

	let endpoints = registry.all_endpoints(&contract).await?;
	if endpoints.is_empty() {
		println!("No endpoints registered.");
		return Ok(());
	}
	println!("{} endpoint(s):", endpoints.len());
	for (i, url) in endpoints.iter().enumerate() {
		println!("  [{i}] {url}");
	}
	Ok(())
}

pub async fn count(cli: &Cli, contract: Option<Address>) -> Result<()> {
	let config = Config::load()?;
	let (network, registry) = connect(cli, &config)?;
	let contract = resolve_contract(contract, &network)?;
	println!("{}", registry.endpoint_count(&contract).await?);
	Ok(())
}

pub async fn get(cli: &Cli, contract: Option<Address>, index: u128) -> Result<()> {
	let config = Config::load()?;
	let (network, registry) = connect(cli, &config)?;
	let contract = resolve_contract(contract, &network)?;
	let url = registry
		.endpoint(&contract, index)
		.await
		.with_context(|| format!("reading endpoint {index}"))?;
	println!("{url}");
	Ok(())
}

pub async fn has(cli: &Cli, contract: Option<Address>, url: &str) -> Result<()> {
	let config = Config::load()?;
	let (network, registry) = connect(cli, &config)?;
	let contract = resolve_contract(contract, &network)?;
	let present = registry.has_endpoint(&contract, url).await?;
	println!("{url}: {}", if present { "registered" } else { "not registered" });
	Ok(())
}
