use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use polyportal_cli::cli::{Cli, Command};
use polyportal_cli::commands;
use polyportal_cli::contracts::Function;

#[tokio::main]
async fn main() -> Result<()> {
	let cli = Cli::parse();
	init_tracing(cli.verbose);

	match &cli.command {
		Command::ImportKey { key_file, force } => {
			commands::key::import(&cli, key_file.as_deref(), *force)
		}
		Command::Address => commands::key::address(&cli),
		Command::Deploy { artifact } => commands::deploy::run(&cli, artifact.as_deref()).await,

		Command::AddEndpoint { contract, url, no_wait } => {
			commands::endpoint::write(&cli, Function::AddEndpoint, *contract, url, *no_wait).await
		}
		Command::RemoveEndpoint { contract, url, no_wait } => {
			commands::endpoint::write(&cli, Function::RemoveEndpoint, *contract, url, *no_wait).await
		}
		Command::AddAdmin { contract, admin, no_wait } => {
			commands::admin::write(&cli, Function::AddAdmin, *contract, *admin, *no_wait).await
		}
		Command::RemoveAdmin { contract, admin, no_wait } => {
			commands::admin::write(&cli, Function::RemoveAdmin, *contract, *admin, *no_wait).await
		}
		Command::TransferOwnership { contract, new_owner, no_wait } => {
			commands::admin::write(&cli, Function::TransferOwnership, *contract, *new_owner, *no_wait)
				.await
		}

		Command::GetEndpoints { contract } => commands::endpoint::list(&cli, *contract).await,
		Command::GetCount { contract } => commands::endpoint::count(&cli, *contract).await,
		Command::GetEndpoint { contract, index } => {
			commands::endpoint::get(&cli, *contract, *index).await
		}
		Command::HasEndpoint { contract, url } => {
			commands::endpoint::has(&cli, *contract, url).await
		}
		Command::Owner { contract } => commands::admin::owner(&cli, *contract).await,
		Command::IsAdmin { contract, admin } => {
			commands::admin::is_admin(&cli, *contract, *admin).await
		}

		Command::TxStatus { tx_hash } => commands::tx::status(&cli, tx_hash).await,
		Command::Config { command } => commands::config::run(&cli, command),
	}
}

/// Logs go to stderr so command output stays pipeable.  `RUST_LOG` wins
/// over `-v`.
fn init_tracing(verbose: u8) {
	let default = match verbose {
		0 => "warn",
		1 => "polyportal_cli=info,warn",
		_ => "polyportal_cli=debug,info",
	};
	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
	tracing_subscriber::fmt()
		.with_env_filter(filter)
		.with_writer(std::io::stderr)
		.with_target(false)
		.init();
}
