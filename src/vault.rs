//! Password-protected storage for the single signing key.
//!
//! The raw secp256k1 scalar is encrypted with AES-256-GCM under a key
//! derived from the password by Argon2id.  Salt and nonce are drawn fresh
//! from the OS RNG on every import, and the KDF cost parameters are stored
//! next to the ciphertext so later unlocks reproduce the same derived key.
//! The account address is bound into the AEAD associated data.

use std::fmt;
use std::path::Path;

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Nonce};
use argon2::{Algorithm, Argon2, Params, Version};
use chrono::{DateTime, Utc};
use k256::ecdsa::SigningKey;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::atomic::write_atomic;
use crate::crypto;
use crate::error::{Error, Result};
use crate::types::{strip_hex_prefix, Address};

pub const KEYSTORE_VERSION: u32 = 1;
pub const SALT_LEN: usize = 32;
pub const NONCE_LEN: usize = 12;

const MIN_SALT_LEN: usize = 16;
const KEY_LEN: usize = 32;
const TAG_LEN: usize = 16;
const CIPHER_NAME: &str = "aes-256-gcm";
const AAD_DOMAIN: &[u8] = b"polyportal-keystore-v1";
/// Refuse to honour stored memory costs above 4 GiB.
const MAX_M_COST_KIB: u32 = 4 * 1024 * 1024;
/// Upper bound on stored Argon2 passes.
const MAX_T_COST: u32 = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KdfAlgorithm {
	Argon2id,
}

/// Argon2id cost parameters, persisted with each record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
	pub algorithm: KdfAlgorithm,
	/// Memory cost in KiB.
	pub m_cost: u32,
	pub t_cost: u32,
	pub p_cost: u32,
}

impl Default for KdfParams {
	fn default() -> Self {
		Self {
			algorithm: KdfAlgorithm::Argon2id,
			m_cost: 65_536,
			t_cost: 3,
			p_cost: 4,
		}
	}
}

impl KdfParams {
	pub fn new(m_cost: u32, t_cost: u32, p_cost: u32) -> Self {
		Self {
			algorithm: KdfAlgorithm::Argon2id,
			m_cost,
			t_cost,
			p_cost,
		}
	}

	fn argon2(&self) -> std::result::Result<Argon2<'static>, String> {
		if self.m_cost > MAX_M_COST_KIB {
			return Err(format!("memory cost {} KiB exceeds limit", self.m_cost));
		}
		if self.t_cost > MAX_T_COST {
			return Err(format!("time cost {} exceeds limit of {MAX_T_COST}", self.t_cost));
		}
		let params = Params::new(self.m_cost, self.t_cost, self.p_cost, Some(KEY_LEN))
			.map_err(|e| format!("invalid Argon2 parameters: {e}"))?;
		Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
	}
}

/// The only on-disk representation of the private key.
#[derive(Clone, PartialEq, Eq)]
pub struct KeyRecord {
	pub address: Address,
	pub ciphertext: Vec<u8>,
	pub nonce: [u8; NONCE_LEN],
	pub salt: Vec<u8>,
	pub kdf: KdfParams,
	pub created_at: DateTime<Utc>,
}

impl fmt::Debug for KeyRecord {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("KeyRecord")
			.field("address", &self.address)
			.field("kdf", &self.kdf)
			.field("created_at", &self.created_at)
			.finish_non_exhaustive()
	}
}

/// A decrypted private key.  Scrubbed from memory when dropped, so keep it
/// in the narrowest scope that needs it.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct UnlockedKey {
	secret: [u8; KEY_LEN],
	#[zeroize(skip)]
	address: Address,
}

impl UnlockedKey {
	/// Wrap a raw scalar, validating it.
	pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
		let signing = crypto::signing_key_from_bytes(bytes)?;
		let address = crypto::address_of(signing.verifying_key());
		let mut secret = [0u8; KEY_LEN];
		secret.copy_from_slice(bytes);
		Ok(Self { secret, address })
	}

	pub fn address(&self) -> Address {
		self.address
	}

	/// Short-lived signing handle; `SigningKey` scrubs itself on drop too.
	pub(crate) fn signing_key(&self) -> Result<SigningKey> {
		crypto::signing_key_from_bytes(&self.secret)
	}
}

impl fmt::Debug for UnlockedKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("UnlockedKey")
			.field("address", &self.address)
			.finish_non_exhaustive()
	}
}

// -- Import / unlock --

/// Encrypt a hex private key under `password`.
///
/// Nonce and salt are always generated here; callers cannot supply them.
pub fn import(private_key_hex: &str, password: &str, kdf: KdfParams) -> Result<KeyRecord> {
	if password.is_empty() {
		return Err(Error::InvalidArgument("password must not be empty".into()));
	}

	let raw = Zeroizing::new(
		hex::decode(strip_hex_prefix(private_key_hex.trim()))
			.map_err(|_| Error::InvalidArgument("private key must be 64 hex characters".into()))?,
	);
	let key = UnlockedKey::from_bytes(&raw)?;

	let mut salt = vec![0u8; SALT_LEN];
	OsRng.fill_bytes(&mut salt);
	let mut nonce = [0u8; NONCE_LEN];
	OsRng.fill_bytes(&mut nonce);

	let derived = derive_key(password, &salt, &kdf).map_err(Error::InvalidArgument)?;
	let cipher = Aes256Gcm::new_from_slice(derived.as_slice())
		.map_err(|e| Error::InvalidArgument(format!("cipher init failed: {e}")))?;
	let ciphertext = cipher
		.encrypt(
			Nonce::from_slice(&nonce),
			Payload {
				msg: &key.secret,
				aad: &associated_data(&key.address),
			},
		)
		.map_err(|_| Error::InvalidArgument("encryption failed".into()))?;

	tracing::debug!(address = %key.address, m_cost = kdf.m_cost, "encrypted signing key");

	Ok(KeyRecord {
		address: key.address,
		ciphertext,
		nonce,
		salt,
		kdf,
		created_at: Utc::now(),
	})
}

/// Decrypt a record.  Any tag mismatch is `AuthenticationFailed`, whether
/// the password is wrong or the ciphertext, nonce, salt or address was
/// altered.
pub fn unlock(record: &KeyRecord, password: &str) -> Result<UnlockedKey> {
	let derived = derive_key(password, &record.salt, &record.kdf).map_err(Error::CorruptKeyStore)?;
	let cipher = Aes256Gcm::new_from_slice(derived.as_slice())
		.map_err(|e| Error::CorruptKeyStore(format!("cipher init failed: {e}")))?;

	let plaintext = Zeroizing::new(
		cipher
			.decrypt(
				Nonce::from_slice(&record.nonce),
				Payload {
					msg: &record.ciphertext,
					aad: &associated_data(&record.address),
				},
			)
			.map_err(|_| Error::AuthenticationFailed)?,
	);

	// Authenticated plaintext that is not a usable key means the record was
	// written by something other than `import`.
	let key = UnlockedKey::from_bytes(&plaintext)
		.map_err(|_| Error::CorruptKeyStore("decrypted key is not a valid scalar".into()))?;
	if key.address != record.address {
		return Err(Error::CorruptKeyStore("decrypted key does not match stored address".into()));
	}
	Ok(key)
}

fn derive_key(
	password: &str,
	salt: &[u8],
	kdf: &KdfParams,
) -> std::result::Result<Zeroizing<[u8; KEY_LEN]>, String> {
	let argon2 = kdf.argon2()?;
	let mut out = Zeroizing::new([0u8; KEY_LEN]);
	argon2
		.hash_password_into(password.as_bytes(), salt, out.as_mut_slice())
		.map_err(|e| format!("key derivation failed: {e}"))?;
	Ok(out)
}

fn associated_data(address: &Address) -> Vec<u8> {
	let mut aad = AAD_DOMAIN.to_vec();
	aad.extend_from_slice(address.as_bytes());
	aad
}

// -- On-disk format --

#[derive(Serialize, Deserialize)]
struct KeystoreFile {
	version: u32,
	address: String,
	created_at: DateTime<Utc>,
	crypto: CryptoSection,
}

#[derive(Serialize, Deserialize)]
struct CryptoSection {
	cipher: String,
	ciphertext: String,
	nonce: String,
	salt: String,
	kdf: KdfParams,
}

impl KeyRecord {
	pub fn to_json(&self) -> Result<String> {
		let file = KeystoreFile {
			version: KEYSTORE_VERSION,
			address: self.address.to_checksum(),
			created_at: self.created_at,
			crypto: CryptoSection {
				cipher: CIPHER_NAME.into(),
				ciphertext: hex::encode(&self.ciphertext),
				nonce: hex::encode(self.nonce),
				salt: hex::encode(&self.salt),
				kdf: self.kdf,
			},
		};
		serde_json::to_string_pretty(&file)
			.map_err(|e| Error::InvalidArgument(format!("cannot serialize keystore: {e}")))
	}

	/// Parse and structurally validate a keystore document.  Problems found
	/// here are reported as `CorruptKeyStore` before any decryption attempt.
	pub fn from_json(json: &str) -> Result<Self> {
		let corrupt = |msg: String| Error::CorruptKeyStore(msg);

		let file: KeystoreFile =
			serde_json::from_str(json).map_err(|e| corrupt(format!("unparseable keystore: {e}")))?;
		if file.version != KEYSTORE_VERSION {
			return Err(corrupt(format!("unsupported keystore version {}", file.version)));
		}
		if file.crypto.cipher != CIPHER_NAME {
			return Err(corrupt(format!("unsupported cipher {:?}", file.crypto.cipher)));
		}

		let address: Address = file
			.address
			.parse()
			.map_err(|e| corrupt(format!("bad address: {e}")))?;
		let ciphertext = hex::decode(&file.crypto.ciphertext)
			.map_err(|e| corrupt(format!("bad ciphertext hex: {e}")))?;
		if ciphertext.len() != KEY_LEN + TAG_LEN {
			return Err(corrupt(format!("ciphertext has {} bytes", ciphertext.len())));
		}
		let nonce: [u8; NONCE_LEN] = hex::decode(&file.crypto.nonce)
			.ok()
			.and_then(|n| n.try_into().ok())
			.ok_or_else(|| corrupt("nonce must be 12 bytes of hex".into()))?;
		let salt = hex::decode(&file.crypto.salt).map_err(|e| corrupt(format!("bad salt hex: {e}")))?;
		if salt.len() < MIN_SALT_LEN {
			return Err(corrupt(format!("salt has {} bytes", salt.len())));
		}
		file.crypto.kdf.argon2().map_err(corrupt)?;

		Ok(Self {
			address,
			ciphertext,
			nonce,
			salt,
			kdf: file.crypto.kdf,
			created_at: file.created_at,
		})
	}

	pub fn load(path: &Path) -> Result<Self> {
		let json = std::fs::read_to_string(path).map_err(|e| {
			Error::CorruptKeyStore(format!("cannot read {}: {e}", path.display()))
		})?;
		Self::from_json(&json)
	}

	/// Atomically replace the keystore at `path`.
	pub fn save(&self, path: &Path) -> Result<()> {
		write_atomic(path, self.to_json()?.as_bytes())?;
		tracing::info!(address = %self.address, path = %path.display(), "keystore written");
		Ok(())
	}
}
