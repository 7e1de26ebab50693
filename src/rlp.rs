//! Recursive length prefix encoding for transaction envelopes.
//!
//! Decoding is strict: non-canonical length prefixes, leading zeros in
//! lengths and trailing bytes are all rejected.

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RlpItem {
	Bytes(Vec<u8>),
	List(Vec<RlpItem>),
}

impl RlpItem {
	pub fn as_bytes(&self) -> Result<&[u8]> {
		match self {
			Self::Bytes(b) => Ok(b),
			Self::List(_) => Err(Error::Decode("expected RLP string, found list".into())),
		}
	}

	pub fn as_list(&self) -> Result<&[RlpItem]> {
		match self {
			Self::List(items) => Ok(items),
			Self::Bytes(_) => Err(Error::Decode("expected RLP list, found string".into())),
		}
	}

	/// Interpret as a big-endian scalar without leading zeros.
	pub fn as_u128(&self) -> Result<u128> {
		let b = self.as_bytes()?;
		if b.len() > 16 {
			return Err(Error::Decode(format!("scalar of {} bytes is too wide", b.len())));
		}
		if b.first() == Some(&0) {
			return Err(Error::Decode("scalar has leading zero".into()));
		}
		Ok(b.iter().fold(0u128, |acc, x| (acc << 8) | u128::from(*x)))
	}

	pub fn as_u64(&self) -> Result<u64> {
		u64::try_from(self.as_u128()?).map_err(|_| Error::Decode("scalar exceeds 64 bits".into()))
	}
}

// -- Encoding --

pub fn encode_bytes(data: &[u8]) -> Vec<u8> {
	if data.len() == 1 && data[0] < 0x80 {
		return vec![data[0]];
	}
	let mut out = length_prefix(data.len(), 0x80);
	out.extend_from_slice(data);
	out
}

/// Scalars are encoded as minimal big-endian byte strings; zero is empty.
pub fn encode_u128(value: u128) -> Vec<u8> {
	encode_bytes(&trim_leading_zeros(&value.to_be_bytes()))
}

pub fn encode_u64(value: u64) -> Vec<u8> {
	encode_u128(u128::from(value))
}

/// Wrap already-encoded items in a list header.
pub fn encode_list(items: &[Vec<u8>]) -> Vec<u8> {
	let payload_len: usize = items.iter().map(Vec::len).sum();
	let mut out = length_prefix(payload_len, 0xc0);
	for item in items {
		out.extend_from_slice(item);
	}
	out
}

pub fn trim_leading_zeros(bytes: &[u8]) -> Vec<u8> {
	let start = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
	bytes[start..].to_vec()
}

fn length_prefix(len: usize, offset: u8) -> Vec<u8> {
	if len < 56 {
		return vec![offset + len as u8];
	}
	let len_bytes = trim_leading_zeros(&(len as u64).to_be_bytes());
	let mut out = vec![offset + 55 + len_bytes.len() as u8];
	out.extend(len_bytes);
	out
}

// -- Decoding --

/// Decode exactly one item spanning all of `data`.
pub fn decode(data: &[u8]) -> Result<RlpItem> {
	let (item, used) = decode_item(data)?;
	if used != data.len() {
		return Err(Error::Decode(format!(
			"{} trailing byte(s) after RLP item",
			data.len() - used
		)));
	}
	Ok(item)
}

fn decode_item(data: &[u8]) -> Result<(RlpItem, usize)> {
	let prefix = *data
		.first()
		.ok_or_else(|| Error::Decode("unexpected end of RLP input".into()))?;

	match prefix {
		0x00..=0x7f => Ok((RlpItem::Bytes(vec![prefix]), 1)),
		0x80..=0xbf => {
			let (start, len) = payload_bounds(data, prefix, 0x80)?;
			let body = &data[start..start + len];
			if len == 1 && body[0] < 0x80 {
				return Err(Error::Decode("single byte should not carry a prefix".into()));
			}
			Ok((RlpItem::Bytes(body.to_vec()), start + len))
		}
		0xc0..=0xff => {
			let (start, len) = payload_bounds(data, prefix, 0xc0)?;
			let mut items = Vec::new();
			let mut pos = start;
			while pos < start + len {
				let (item, used) = decode_item(&data[pos..start + len])?;
				items.push(item);
				pos += used;
			}
			Ok((RlpItem::List(items), start + len))
		}
	}
}

/// Returns (payload start, payload length) and checks it fits in `data`.
fn payload_bounds(data: &[u8], prefix: u8, offset: u8) -> Result<(usize, usize)> {
	let short = prefix - offset;
	let (start, len) = if short < 56 {
		(1, short as usize)
	} else {
		let len_of_len = (short - 55) as usize;
		let len_bytes = data
			.get(1..1 + len_of_len)
			.ok_or_else(|| Error::Decode("truncated RLP length".into()))?;
		if len_bytes[0] == 0 {
			return Err(Error::Decode("RLP length has leading zero".into()));
		}
		if len_of_len > 8 {
			return Err(Error::Decode("RLP length too large".into()));
		}
		let len = len_bytes.iter().fold(0u64, |acc, b| (acc << 8) | u64::from(*b));
		if len < 56 {
			return Err(Error::Decode("non-canonical long RLP length".into()));
		}
		let len = usize::try_from(len).map_err(|_| Error::Decode("RLP length too large".into()))?;
		(1 + len_of_len, len)
	};

	match start.checked_add(len) {
		Some(end) if end <= data.len() => Ok((start, len)),
		_ => Err(Error::Decode("RLP payload exceeds input".into())),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn encodes_reference_values() {
		assert_eq!(encode_bytes(b"dog"), vec![0x83, b'd', b'o', b'g']);
		assert_eq!(encode_bytes(&[]), vec![0x80]);
		assert_eq!(encode_u64(0), vec![0x80]);
		assert_eq!(encode_u64(15), vec![0x0f]);
		assert_eq!(encode_u64(1024), vec![0x82, 0x04, 0x00]);
		assert_eq!(encode_list(&[]), vec![0xc0]);
		assert_eq!(
			encode_list(&[encode_bytes(b"cat"), encode_bytes(b"dog")]),
			vec![0xc8, 0x83, b'c', b'a', b't', 0x83, b'd', b'o', b'g']
		);
	}

	#[test]
	fn long_string_uses_length_of_length() {
		let data = vec![0xaa; 60];
		let enc = encode_bytes(&data);
		assert_eq!(&enc[..2], &[0xb8, 60]);
		assert_eq!(decode(&enc).unwrap(), RlpItem::Bytes(data));
	}

	#[test]
	fn nested_lists_decode() {
		let enc = encode_list(&[encode_u64(5), encode_list(&[encode_bytes(b"x")]), encode_bytes(&[])]);
		let item = decode(&enc).unwrap();
		let list = item.as_list().unwrap();
		assert_eq!(list[0].as_u64().unwrap(), 5);
		assert_eq!(list[1].as_list().unwrap()[0].as_bytes().unwrap(), b"x");
		assert_eq!(list[2].as_u64().unwrap(), 0);
	}

	#[test]
	fn rejects_malformed_input() {
		assert!(decode(&[]).is_err());
		assert!(decode(&[0x83, b'd', b'o']).is_err());
		assert!(decode(&[0x81, 0x05]).is_err());
		assert!(decode(&[0xb8, 0x05, 1, 2, 3, 4, 5]).is_err());
		assert!(decode(&[0x05, 0x06]).is_err());
		assert!(RlpItem::Bytes(vec![0, 1]).as_u128().is_err());
	}
}
