pub mod local;

pub use local::LocalSigner;

use crate::error::Result;
use crate::types::Address;

/// A secp256k1 signature with its recovery bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoverableSignature {
	pub r: [u8; 32],
	pub s: [u8; 32],
	/// 0 or 1.
	pub recovery_id: u8,
}

impl RecoverableSignature {
	pub fn rs(&self) -> [u8; 64] {
		let mut out = [0u8; 64];
		out[..32].copy_from_slice(&self.r);
		out[32..].copy_from_slice(&self.s);
		out
	}
}

/// Something that can sign transaction digests for one account.
///
/// The transaction builder only ever sees this trait, so it never handles
/// key bytes itself.
#[async_trait::async_trait]
pub trait Signer: Send + Sync {
	/// The account this signer controls.
	fn address(&self) -> Address;

	/// Sign a 32-byte keccak digest.  Signatures are low-s normalized.
	async fn sign_prehash(&self, prehash: &[u8; 32]) -> Result<RecoverableSignature>;
}
