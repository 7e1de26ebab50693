use anyhow::{Context, Result};

use crate::abi::AbiValue;
use crate::cli::Cli;
use crate::commands::{connect, finish_write, load_keystore, read_password, resolve_contract};
use crate::config::Config;
use crate::contracts::Function;
use crate::types::Address;
use crate::vault;

/// Any write whose single argument is an account: add/remove admin and
/// ownership transfer.
pub async fn write(
	cli: &Cli,
	f: Function,
	contract: Option<Address>,
	account: Address,
	no_wait: bool,
) -> Result<()> {
	if account.is_zero() {
		anyhow::bail!("Refusing to use the zero address as {}'s argument.", f.name());
	}
	let config = Config::load()?;
	let record = load_keystore(cli, &config)?;
	let (network, registry) = connect(cli, &config)?;
	let contract = resolve_contract(contract, &network)?;
	let password = read_password()?;

	println!("{} {} on {}...", f.name(), account.to_checksum(), network.name);
	let hash = registry
		.transact(
			record.address,
			contract,
			f,
			&[AbiValue::Address(account)],
			|| vault::unlock(&record, &password),
		)
		.await
		.with_context(|| format!("{} failed", f.name()))?;

	finish_write(&registry, &hash, no_wait).await?;
	Ok(())
}

pub async fn owner(cli: &Cli, contract: Option<Address>) -> Result<()> {
	let config = Config::load()?;
	let (network, registry) = connect(cli, &config)?;
	let contract = resolve_contract(contract, &network)?;
	println!("{}", registry.owner(&contract).await?.to_checksum());
	Ok(())
}

pub async fn is_admin(cli: &Cli, contract: Option<Address>, account: Address) -> Result<()> {
	let config = Config::load()?;
	let (network, registry) = connect(cli, &config)?;
	let contract = resolve_contract(contract, &network)?;
	let admin = registry.is_admin(&contract, &account).await?;
	println!(
		"{}: {}",
		account.to_checksum(),
		if admin { "admin" } else { "not an admin" }
	);
	Ok(())
}
