use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand};

use crate::config::NetworkPreset;
use crate::types::{Address, TxHash};

#[derive(Parser)]
#[command(
	name = "polyportal",
	about = "Manage a PolyEndpoint registry contract from an encrypted local key.",
	version
)]
pub struct Cli {
	/// Network preset (defaults to the one in config.toml).
	#[arg(long, global = true)]
	pub network: Option<NetworkPreset>,

	/// Override RPC endpoint URL.
	#[arg(long, global = true)]
	pub rpc_url: Option<String>,

	/// Override keystore file location.
	#[arg(long, global = true)]
	pub keystore: Option<PathBuf>,

	/// Log more to stderr (-v info, -vv debug).
	#[arg(short, long, action = ArgAction::Count, global = true)]
	pub verbose: u8,

	#[command(subcommand)]
	pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
	// -- Key management --
	/// Encrypt a private key into the keystore.
	ImportKey {
		/// Read the hex key from a file instead of prompting.
		#[arg(long)]
		key_file: Option<PathBuf>,

		/// Replace an existing keystore.
		#[arg(long)]
		force: bool,
	},

	/// Print the keystore address without unlocking it.
	Address,

	// -- Deployment --
	/// Deploy the registry contract from a compiled artifact.
	Deploy {
		/// Artifact JSON with a `bytecode` field (defaults to config).
		#[arg(long)]
		artifact: Option<PathBuf>,
	},

	// -- Registry writes --
	/// Register an RPC endpoint URL.
	AddEndpoint {
		#[arg(long)]
		contract: Option<Address>,
		#[arg(long)]
		url: String,
		/// Return once submitted instead of waiting for the receipt.
		#[arg(long)]
		no_wait: bool,
	},

	/// Remove an RPC endpoint URL.
	RemoveEndpoint {
		#[arg(long)]
		contract: Option<Address>,
		#[arg(long)]
		url: String,
		#[arg(long)]
		no_wait: bool,
	},

	/// Grant admin rights to an account.
	AddAdmin {
		#[arg(long)]
		contract: Option<Address>,
		#[arg(long)]
		admin: Address,
		#[arg(long)]
		no_wait: bool,
	},

	/// Revoke admin rights from an account.
	RemoveAdmin {
		#[arg(long)]
		contract: Option<Address>,
		#[arg(long)]
		admin: Address,
		#[arg(long)]
		no_wait: bool,
	},

	/// Hand contract ownership to another account.
	TransferOwnership {
		#[arg(long)]
		contract: Option<Address>,
		#[arg(long)]
		new_owner: Address,
		#[arg(long)]
		no_wait: bool,
	},

	// -- Registry reads --
	/// List every registered endpoint.
	GetEndpoints {
		#[arg(long)]
		contract: Option<Address>,
	},

	/// Print the number of registered endpoints.
	GetCount {
		#[arg(long)]
		contract: Option<Address>,
	},

	/// Print the endpoint at an index.
	GetEndpoint {
		#[arg(long)]
		contract: Option<Address>,
		#[arg(long)]
		index: u128,
	},

	/// Check whether a URL is registered.
	HasEndpoint {
		#[arg(long)]
		contract: Option<Address>,
		#[arg(long)]
		url: String,
	},

	/// Print the contract owner.
	Owner {
		#[arg(long)]
		contract: Option<Address>,
	},

	/// Check whether an account is an admin.
	IsAdmin {
		#[arg(long)]
		contract: Option<Address>,
		#[arg(long)]
		admin: Address,
	},

	// -- Utilities --
	/// Check a transaction's receipt.
	TxStatus {
		/// Transaction hash (0x-prefixed).
		tx_hash: TxHash,
	},

	/// Inspect or create the config file.
	Config {
		#[command(subcommand)]
		command: ConfigCommand,
	},
}

#[derive(Subcommand)]
pub enum ConfigCommand {
	/// Write a default config file if none exists.
	Init,

	/// Show the resolved network, keystore and RPC settings.
	Show,
}
