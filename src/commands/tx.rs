use anyhow::Result;

use crate::cli::Cli;
use crate::commands::connect;
use crate::config::Config;
use crate::types::TxHash;

pub async fn status(cli: &Cli, tx_hash: &TxHash) -> Result<()> {
	let config = Config::load()?;
	let (_, registry) = connect(cli, &config)?;

	match registry.rpc().get_transaction_receipt(tx_hash).await? {
		Some(receipt) => {
			let status = match receipt.success {
				Some(true) => "success",
				Some(false) => "reverted",
				None => "mined",
			};
			println!("Transaction: {tx_hash}");
			println!("Status:      {status}");
			println!("Block:       {}", receipt.block_number);
			println!("Gas used:    {}", receipt.gas_used);
			if let Some(addr) = receipt.contract_address {
				println!("Created:     {}", addr.to_checksum());
			}
		}
		None => println!("Transaction not mined or unknown: {tx_hash}"),
	}
	Ok(())
}
