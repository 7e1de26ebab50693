use crate::error::{Error, Result};
use crate::types::Address;
use crate::vault::UnlockedKey;

use super::RecoverableSignature;

/// Signs with a key decrypted from the local keystore.
///
/// Owns the `UnlockedKey`, so dropping the signer scrubs the key.
pub struct LocalSigner {
	key: UnlockedKey,
}

impl LocalSigner {
	pub fn new(key: UnlockedKey) -> Self {
		Self { key }
	}
}

#[async_trait::async_trait]
impl super::Signer for LocalSigner {
	fn address(&self) -> Address {
		self.key.address()
	}

	async fn sign_prehash(&self, prehash: &[u8; 32]) -> Result<RecoverableSignature> {
		let signing = self.key.signing_key()?;
		let (sig, recid) = signing
			.sign_prehash_recoverable(prehash)
			.map_err(|e| Error::InvalidArgument(format!("signing failed: {e}")))?;

		let bytes = sig.to_bytes();
		let mut r = [0u8; 32];
		let mut s = [0u8; 32];
		r.copy_from_slice(&bytes[..32]);
		s.copy_from_slice(&bytes[32..]);
		Ok(RecoverableSignature {
			r,
			s,
			recovery_id: recid.to_byte(),
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::crypto;
	use crate::signer::Signer;

	// secp256k1 group order / 2, big-endian.
	const HALF_N: [u8; 32] = [
		0x7f, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
		0xff, 0x5d, 0x57, 0x6e, 0x73, 0x57, 0xa4, 0x50, 0x1d, 0xdf, 0xe9, 0x2f, 0x46, 0x68, 0x1b,
		0x20, 0xa0,
	];

	#[tokio::test]
	async fn signatures_recover_to_signer_address() {
		let key = UnlockedKey::from_bytes(&[0x42u8; 32]).unwrap();
		let signer = LocalSigner::new(key);

		for msg in [&b"a"[..], b"polyportal", b""] {
			let digest = crypto::keccak256(msg);
			let sig = signer.sign_prehash(&digest).await.unwrap();
			assert!(sig.recovery_id <= 1);
			assert!(sig.s <= HALF_N, "s must be normalized");
			let recovered = crypto::recover_address(&digest, &sig.rs(), sig.recovery_id).unwrap();
			assert_eq!(recovered, signer.address());
		}
	}
}
