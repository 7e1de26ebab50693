use std::path::Path;

use anyhow::{Context, Result};
use zeroize::Zeroizing;

use crate::cli::Cli;
use crate::commands::{keystore_path, load_keystore, read_new_password};
use crate::config::Config;
use crate::vault::{self, KdfParams};

pub fn import(cli: &Cli, key_file: Option<&Path>, force: bool) -> Result<()> {
	let config = Config::load()?;
	let path = keystore_path(cli, &config)?;
	if path.exists() && !force {
		anyhow::bail!(
			"A keystore already exists at {}. Pass --force to replace it.",
			path.display()
		);
	}

	let key_hex = match key_file {
		Some(file) => Zeroizing::new(
			std::fs::read_to_string(file)
				.with_context(|| format!("reading {}", file.display()))?,
		),
		None => Zeroizing::new(
			rpassword::prompt_password("Private key (hex, with or without 0x): ")
				.context("reading private key")?,
		),
	};
	let password = read_new_password()?;

	println!("Encrypting key (this takes a moment)...");
	let record = vault::import(key_hex.trim(), &password, KdfParams::default())?;
	record.save(&path)?;

	println!("Keystore written to {}", path.display());
	println!("Address: {}", record.address.to_checksum());
	Ok(())
}

pub fn address(cli: &Cli) -> Result<()> {
	let config = Config::load()?;
	let record = load_keystore(cli, &config)?;
	println!("{}", record.address.to_checksum());
	Ok(())
}
