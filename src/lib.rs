pub mod abi;
pub mod atomic;
pub mod cli;
pub mod commands;
pub mod config;
pub mod contracts;
pub mod crypto;
pub mod error;
pub mod nonce;
pub mod registry;
pub mod rlp;
pub mod rpc;
pub mod signer;
pub mod tx_builder;
pub mod types;
pub mod vault;

pub use error::{Error, Result};
