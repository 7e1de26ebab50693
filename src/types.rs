use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::crypto;
use crate::error::{Error, Result};

/// A 20-byte account or contract address.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address(pub [u8; 20]);

impl Address {
	pub const ZERO: Address = Address([0u8; 20]);

	pub fn from_slice(bytes: &[u8]) -> Result<Self> {
		let arr: [u8; 20] = bytes.try_into().map_err(|_| {
			Error::InvalidArgument(format!("address must be 20 bytes, got {}", bytes.len()))
		})?;
		Ok(Self(arr))
	}

	pub fn as_bytes(&self) -> &[u8; 20] {
		&self.0
	}

	pub fn is_zero(&self) -> bool {
		self.0 == [0u8; 20]
	}

	/// Mixed-case EIP-55 rendering.
	pub fn to_checksum(&self) -> String {
		crypto::to_checksum(&self.0)
	}
}

impl FromStr for Address {
	type Err = Error;

	/// Accepts `0x`-prefixed or bare hex.  All-lowercase and all-uppercase
	/// input is taken as-is; mixed case must carry a valid EIP-55 checksum.
	fn from_str(s: &str) -> Result<Self> {
		let s = s.trim();
		let body = strip_hex_prefix(s);
		if body.len() != 40 {
			return Err(Error::InvalidArgument(format!(
				"address must be 40 hex characters, got {}",
				body.len()
			)));
		}
		let bytes = hex::decode(body)
			.map_err(|e| Error::InvalidArgument(format!("invalid address hex: {e}")))?;
		let addr = Self::from_slice(&bytes)?;

		let has_lower = body.chars().any(|c| c.is_ascii_lowercase());
		let has_upper = body.chars().any(|c| c.is_ascii_uppercase());
		if has_lower && has_upper && &addr.to_checksum()[2..] != body {
			return Err(Error::InvalidArgument(format!("address checksum mismatch: {s}")));
		}
		Ok(addr)
	}
}

impl TryFrom<String> for Address {
	type Error = Error;

	fn try_from(s: String) -> Result<Self> {
		s.parse()
	}
}

impl From<Address> for String {
	fn from(a: Address) -> String {
		a.to_checksum()
	}
}

impl fmt::Display for Address {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "0x{}", hex::encode(self.0))
	}
}

impl fmt::Debug for Address {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.to_checksum())
	}
}

/// Keccak-256 hash of a serialized signed transaction.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TxHash(pub [u8; 32]);

impl FromStr for TxHash {
	type Err = Error;

	fn from_str(s: &str) -> Result<Self> {
		let bytes = decode_hex(s)?;
		let arr: [u8; 32] = bytes.as_slice().try_into().map_err(|_| {
			Error::InvalidArgument(format!("transaction hash must be 32 bytes, got {}", bytes.len()))
		})?;
		Ok(Self(arr))
	}
}

impl fmt::Display for TxHash {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "0x{}", hex::encode(self.0))
	}
}

impl fmt::Debug for TxHash {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		fmt::Display::fmt(self, f)
	}
}

// -- Hex helpers --

pub fn strip_hex_prefix(s: &str) -> &str {
	s.strip_prefix("0x")
		.or_else(|| s.strip_prefix("0X"))
		.unwrap_or(s)
}

/// Decode `0x`-prefixed (or bare) hex into bytes.
pub fn decode_hex(s: &str) -> Result<Vec<u8>> {
	hex::decode(strip_hex_prefix(s.trim()))
		.map_err(|e| Error::InvalidArgument(format!("invalid hex: {e}")))
}

pub fn encode_hex(bytes: &[u8]) -> String {
	format!("0x{}", hex::encode(bytes))
}

/// Render an integer as a JSON-RPC quantity (`0x`-prefixed, no leading zeros).
pub fn to_quantity(value: u128) -> String {
	format!("0x{value:x}")
}

/// Parse a JSON-RPC quantity such as `"0x1a"`.
pub fn parse_quantity(s: &str) -> Result<u128> {
	let body = strip_hex_prefix(s);
	if body.is_empty() {
		return Err(Error::Decode(format!("empty quantity: {s:?}")));
	}
	u128::from_str_radix(body, 16).map_err(|e| Error::Decode(format!("invalid quantity {s:?}: {e}")))
}
