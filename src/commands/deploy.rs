use std::path::Path;

use anyhow::{Context, Result};

use crate::cli::Cli;
use crate::commands::{connect, load_keystore, read_password};
use crate::config::Config;
use crate::contracts;
use crate::vault;

pub async fn run(cli: &Cli, artifact: Option<&Path>) -> Result<()> {
	let config = Config::load()?;
	let artifact = artifact
		.or(config.contract.artifact_path.as_deref())
		.context("No contract artifact. Pass --artifact or set [contract] artifact_path.")?;
	let bytecode = contracts::load_bytecode(artifact)
		.with_context(|| format!("loading {}", artifact.display()))?;

	let record = load_keystore(cli, &config)?;
	let (network, registry) = connect(cli, &config)?;
	let password = read_password()?;

	println!(
		"Deploying {} bytes of init code to {} as {}...",
		bytecode.len(),
		network.name,
		record.address.to_checksum()
	);
	let hash = registry
		.execute(record.address, None, bytecode, || vault::unlock(&record, &password))
		.await
		.context("deployment failed")?;
	println!("TX: {hash}");

	println!("Waiting for confirmation...");
	let receipt = registry.wait_for_receipt(&hash).await?;
	let address = receipt
		.contract_address
		.context("receipt has no contract address")?;
	tracing::info!(contract = %address, block = receipt.block_number, "registry deployed");

	println!("Contract deployed at {}", address.to_checksum());
	println!("Block: {}", receipt.block_number);
	Ok(())
}
