use anyhow::Result;

use crate::cli::{Cli, ConfigCommand};
use crate::commands::{keystore_path, resolve_network};
use crate::config::Config;

pub fn run(cli: &Cli, cmd: &ConfigCommand) -> Result<()> {
	match cmd {
		ConfigCommand::Init => init(),
		ConfigCommand::Show => show(cli),
	}
}

fn init() -> Result<()> {
	let path = Config::path()?;
	if path.exists() {
		println!("Config already exists at {}", path.display());
		return Ok(());
	}
	Config::default().save()?;
	println!("Wrote default config to {}", path.display());
	Ok(())
}

fn show(cli: &Cli) -> Result<()> {
	let config = Config::load()?;
	let network = resolve_network(cli, &config);
	let keystore = keystore_path(cli, &config)?;

	println!("Network");
	println!("  Name:     {}", network.name);
	println!("  Chain ID: {}", network.chain_id);
	println!("  RPC:      {}", network.rpc_url);
	println!("Keystore:   {}", keystore.display());
	println!(
		"RPC:        timeout {}s, {} attempt(s)",
		config.rpc.timeout_secs, config.rpc.max_attempts
	);
	println!("Fees:       {:?}", config.transaction.fee_mode);
	Ok(())
}
