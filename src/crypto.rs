use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};
use sha3::{Digest, Keccak256};

use crate::error::{Error, Result};
use crate::types::Address;

// -- Hashing --

pub fn keccak256(data: &[u8]) -> [u8; 32] {
	Keccak256::digest(data).into()
}

// -- Addresses --

/// Account address for a public key: the last 20 bytes of
/// `keccak256(x || y)` over the uncompressed point.
pub fn address_of(key: &VerifyingKey) -> Address {
	let point = key.to_encoded_point(false);
	// Skip the 0x04 SEC1 tag.
	let hash = keccak256(&point.as_bytes()[1..]);
	let mut out = [0u8; 20];
	out.copy_from_slice(&hash[12..]);
	Address(out)
}

/// Parse a raw 32-byte secp256k1 scalar, rejecting zero and values >= n.
pub fn signing_key_from_bytes(bytes: &[u8]) -> Result<SigningKey> {
	if bytes.len() != 32 {
		return Err(Error::InvalidArgument(format!(
			"private key must be 32 bytes, got {}",
			bytes.len()
		)));
	}
	SigningKey::from_slice(bytes)
		.map_err(|_| Error::InvalidArgument("private key is not a valid secp256k1 scalar".into()))
}

/// EIP-55 mixed-case checksum encoding, `0x`-prefixed.
pub fn to_checksum(address: &[u8; 20]) -> String {
	let lower = hex::encode(address);
	let hash = keccak256(lower.as_bytes());

	let mut out = String::with_capacity(42);
	out.push_str("0x");
	for (i, c) in lower.chars().enumerate() {
		let nibble = (hash[i / 2] >> if i % 2 == 0 { 4 } else { 0 }) & 0x0f;
		if c.is_ascii_alphabetic() && nibble >= 8 {
			out.push(c.to_ascii_uppercase());
		} else {
			out.push(c);
		}
	}
	out
}

// -- Signatures --

/// Recover the signing address from a prehashed message and a 64-byte
/// `r || s` signature plus its recovery id.
pub fn recover_address(prehash: &[u8; 32], rs: &[u8; 64], recovery_id: u8) -> Result<Address> {
	let sig = Signature::from_slice(rs)
		.map_err(|e| Error::Decode(format!("invalid signature: {e}")))?;
	let rid = RecoveryId::from_byte(recovery_id)
		.ok_or_else(|| Error::Decode(format!("invalid recovery id {recovery_id}")))?;
	let key = VerifyingKey::recover_from_prehash(prehash, &sig, rid)
		.map_err(|e| Error::Decode(format!("signature recovery failed: {e}")))?;
	Ok(address_of(&key))
}
