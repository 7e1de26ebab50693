//! Contract call encoding.
//!
//! Arguments are laid out as a head of 32-byte slots followed by a tail.
//! Static values (address, bool, uint256) sit directly in their head slot.
//! Dynamic values (string, bytes, arrays) put an offset in their head slot
//! pointing at a tail segment of `length || data`, padded to a whole word.
//! Tails are concatenated in argument order after all heads.

use std::fmt;

use crate::crypto::keccak256;
use crate::error::{Error, Result};
use crate::types::{encode_hex, Address};

pub const WORD: usize = 32;

/// Type tags the registry contract uses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbiType {
	Address,
	Bool,
	Uint256,
	String,
	Bytes,
	Array(Box<AbiType>),
}

impl AbiType {
	pub fn is_dynamic(&self) -> bool {
		matches!(self, Self::String | Self::Bytes | Self::Array(_))
	}
}

impl fmt::Display for AbiType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Address => f.write_str("address"),
			Self::Bool => f.write_str("bool"),
			Self::Uint256 => f.write_str("uint256"),
			Self::String => f.write_str("string"),
			Self::Bytes => f.write_str("bytes"),
			Self::Array(inner) => write!(f, "{inner}[]"),
		}
	}
}

/// A typed argument or return value.
///
/// `Uint` holds values up to 128 bits; anything wider coming back from the
/// contract is reported as a decode error rather than truncated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbiValue {
	Address(Address),
	Bool(bool),
	Uint(u128),
	String(String),
	Bytes(Vec<u8>),
	Array(Vec<AbiValue>),
}

impl AbiValue {
	fn kind(&self) -> &'static str {
		match self {
			Self::Address(_) => "address",
			Self::Bool(_) => "bool",
			Self::Uint(_) => "uint256",
			Self::String(_) => "string",
			Self::Bytes(_) => "bytes",
			Self::Array(_) => "array",
		}
	}

	pub fn as_uint(&self) -> Option<u128> {
		match self {
			Self::Uint(v) => Some(*v),
			_ => None,
		}
	}

	pub fn as_bool(&self) -> Option<bool> {
		match self {
			Self::Bool(v) => Some(*v),
			_ => None,
		}
	}

	pub fn as_address(&self) -> Option<Address> {
		match self {
			Self::Address(a) => Some(*a),
			_ => None,
		}
	}

	pub fn as_str(&self) -> Option<&str> {
		match self {
			Self::String(s) => Some(s),
			_ => None,
		}
	}

	/// Flatten a `string[]` value.
	pub fn into_strings(self) -> Option<Vec<String>> {
		match self {
			Self::Array(items) => items
				.into_iter()
				.map(|v| match v {
					Self::String(s) => Some(s),
					_ => None,
				})
				.collect(),
			_ => None,
		}
	}
}

/// Encoded call: selector plus ABI-encoded arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Calldata {
	pub selector: [u8; 4],
	pub encoded_args: Vec<u8>,
}

impl Calldata {
	pub fn to_bytes(&self) -> Vec<u8> {
		let mut out = Vec::with_capacity(4 + self.encoded_args.len());
		out.extend_from_slice(&self.selector);
		out.extend_from_slice(&self.encoded_args);
		out
	}

	pub fn to_hex(&self) -> String {
		encode_hex(&self.to_bytes())
	}
}

/// First four bytes of keccak-256 over the canonical signature.
pub fn selector(signature: &str) -> [u8; 4] {
	let hash = keccak256(signature.as_bytes());
	[hash[0], hash[1], hash[2], hash[3]]
}

// -- Encoding --

/// Encode `values` as a tuple of `types`.
pub fn encode_args(types: &[AbiType], values: &[AbiValue]) -> Result<Vec<u8>> {
	if types.len() != values.len() {
		return Err(Error::InvalidArgument(format!(
			"expected {} argument(s), got {}",
			types.len(),
			values.len()
		)));
	}

	let head_len = types.len() * WORD;
	let mut head = Vec::with_capacity(head_len);
	let mut tail = Vec::new();

	for (ty, value) in types.iter().zip(values) {
		if ty.is_dynamic() {
			head.extend_from_slice(&uint_word((head_len + tail.len()) as u128));
			tail.extend(encode_value(ty, value)?);
		} else {
			head.extend(encode_value(ty, value)?);
		}
	}

	head.extend(tail);
	Ok(head)
}

fn encode_value(ty: &AbiType, value: &AbiValue) -> Result<Vec<u8>> {
	match (ty, value) {
		(AbiType::Address, AbiValue::Address(a)) => {
			let mut word = [0u8; WORD];
			word[12..].copy_from_slice(a.as_bytes());
			Ok(word.to_vec())
		}
		(AbiType::Bool, AbiValue::Bool(b)) => Ok(uint_word(u128::from(*b)).to_vec()),
		(AbiType::Uint256, AbiValue::Uint(v)) => Ok(uint_word(*v).to_vec()),
		(AbiType::String, AbiValue::String(s)) => Ok(encode_packed_bytes(s.as_bytes())),
		(AbiType::Bytes, AbiValue::Bytes(b)) => Ok(encode_packed_bytes(b)),
		(AbiType::Array(inner), AbiValue::Array(items)) => {
			let types = vec![(**inner).clone(); items.len()];
			let mut out = uint_word(items.len() as u128).to_vec();
			out.extend(encode_args(&types, items)?);
			Ok(out)
		}
		(ty, value) => Err(Error::InvalidArgument(format!(
			"expected {ty} argument, got {}",
			value.kind()
		))),
	}
}

/// Length word followed by the raw bytes, right-padded to a word boundary.
fn encode_packed_bytes(data: &[u8]) -> Vec<u8> {
	let padded = data.len().div_ceil(WORD) * WORD;
	let mut out = Vec::with_capacity(WORD + padded);
	out.extend_from_slice(&uint_word(data.len() as u128));
	out.extend_from_slice(data);
	out.resize(WORD + padded, 0);
	out
}

fn uint_word(v: u128) -> [u8; WORD] {
	let mut word = [0u8; WORD];
	word[16..].copy_from_slice(&v.to_be_bytes());
	word
}

// -- Decoding --

/// Decode a tuple of `types` from `data`.
pub fn decode_args(types: &[AbiType], data: &[u8]) -> Result<Vec<AbiValue>> {
	let mut out = Vec::with_capacity(types.len());
	for (i, ty) in types.iter().enumerate() {
		let slot = read_word(data, i * WORD)?;
		if ty.is_dynamic() {
			let offset = word_to_usize(slot)?;
			let rest = data.get(offset..).ok_or_else(|| {
				Error::Decode(format!("offset {offset} points past end of {} byte(s)", data.len()))
			})?;
			out.push(decode_dynamic(ty, rest)?);
		} else {
			out.push(decode_static(ty, slot)?);
		}
	}
	Ok(out)
}

fn decode_static(ty: &AbiType, word: &[u8; WORD]) -> Result<AbiValue> {
	match ty {
		AbiType::Address => {
			if word[..12].iter().any(|b| *b != 0) {
				return Err(Error::Decode("address word has non-zero padding".into()));
			}
			Ok(AbiValue::Address(Address::from_slice(&word[12..])?))
		}
		AbiType::Bool => match word_to_u128(word)? {
			0 => Ok(AbiValue::Bool(false)),
			1 => Ok(AbiValue::Bool(true)),
			other => Err(Error::Decode(format!("bool word holds {other}"))),
		},
		AbiType::Uint256 => Ok(AbiValue::Uint(word_to_u128(word)?)),
		dynamic => Err(Error::Decode(format!("{dynamic} is not a static type"))),
	}
}

fn decode_dynamic(ty: &AbiType, data: &[u8]) -> Result<AbiValue> {
	let len = word_to_usize(read_word(data, 0)?)?;
	match ty {
		AbiType::String | AbiType::Bytes => {
			let body = data
				.get(WORD..)
				.and_then(|rest| rest.get(..len))
				.ok_or_else(|| Error::Decode(format!("{ty} length {len} exceeds available data")))?;
			if *ty == AbiType::String {
				let s = String::from_utf8(body.to_vec())
					.map_err(|e| Error::Decode(format!("string is not valid UTF-8: {e}")))?;
				Ok(AbiValue::String(s))
			} else {
				Ok(AbiValue::Bytes(body.to_vec()))
			}
		}
		AbiType::Array(inner) => {
			let items = &data[WORD..];
			// Each element needs at least one head slot; reject absurd lengths
			// before allocating.
			if len.checked_mul(WORD).map_or(true, |need| need > items.len()) {
				return Err(Error::Decode(format!(
					"array length {len} exceeds available data"
				)));
			}
			let types = vec![(**inner).clone(); len];
			Ok(AbiValue::Array(decode_args(&types, items)?))
		}
		fixed => Err(Error::Decode(format!("{fixed} is not a dynamic type"))),
	}
}

fn read_word(data: &[u8], at: usize) -> Result<&[u8; WORD]> {
	data.get(at..at + WORD)
		.and_then(|s| s.try_into().ok())
		.ok_or_else(|| Error::Decode(format!("need 32 bytes at offset {at}, have {}", data.len())))
}

fn word_to_u128(word: &[u8; WORD]) -> Result<u128> {
	if word[..16].iter().any(|b| *b != 0) {
		return Err(Error::Decode("uint256 value does not fit in 128 bits".into()));
	}
	let mut buf = [0u8; 16];
	buf.copy_from_slice(&word[16..]);
	Ok(u128::from_be_bytes(buf))
}

fn word_to_usize(word: &[u8; WORD]) -> Result<usize> {
	let v = word_to_u128(word)?;
	usize::try_from(v).map_err(|_| Error::Decode(format!("offset or length {v} is too large")))
}

// -- Revert payloads --

const ERROR_STRING_SELECTOR: [u8; 4] = [0x08, 0xc3, 0x79, 0xa0];
const PANIC_SELECTOR: [u8; 4] = [0x4e, 0x48, 0x7b, 0x71];

/// Turn `Error(string)` or `Panic(uint256)` revert data into a reason.
/// Returns `None` for empty data and custom errors.
pub fn decode_revert(data: &[u8]) -> Option<String> {
	let (sel, args) = data.split_first_chunk::<4>()?;
	if *sel == ERROR_STRING_SELECTOR {
		let mut values = decode_args(&[AbiType::String], args).ok()?;
		return match values.pop()? {
			AbiValue::String(reason) => Some(reason),
			_ => None,
		};
	}
	if *sel == PANIC_SELECTOR {
		let code = decode_args(&[AbiType::Uint256], args).ok()?.first()?.as_uint()?;
		let what = match code {
			0x01 => "assertion failed",
			0x11 => "arithmetic overflow or underflow",
			0x12 => "division by zero",
			0x21 => "invalid enum value",
			0x31 => "pop from empty array",
			0x32 => "array index out of bounds",
			0x41 => "out of memory",
			_ => "unknown panic",
		};
		return Some(format!("panic 0x{code:02x} ({what})"));
	}
	None
}

#[cfg(test)]
mod tests {
	use super::*;

	fn word(v: u128) -> Vec<u8> {
		uint_word(v).to_vec()
	}

	#[test]
	fn static_words_are_right_aligned() {
		let addr: Address = "0x00000000000000000000000000000000000000ab".parse().unwrap();
		let out = encode_args(
			&[AbiType::Address, AbiType::Bool, AbiType::Uint256],
			&[AbiValue::Address(addr), AbiValue::Bool(true), AbiValue::Uint(3)],
		)
		.unwrap();
		assert_eq!(out.len(), 3 * WORD);
		assert_eq!(out[31], 0xab);
		assert_eq!(out[63], 1);
		assert_eq!(out[95], 3);
		assert!(out[..31].iter().all(|b| *b == 0));
	}

	#[test]
	fn string_tail_is_length_prefixed_and_padded() {
		let out = encode_args(&[AbiType::String], &[AbiValue::String("hello".into())]).unwrap();
		let mut expected = word(0x20);
		expected.extend(word(5));
		let mut data = b"hello".to_vec();
		data.resize(32, 0);
		expected.extend(data);
		assert_eq!(out, expected);
	}

	#[test]
	fn empty_string_has_zero_length_and_no_data() {
		let out = encode_args(&[AbiType::String], &[AbiValue::String(String::new())]).unwrap();
		let mut expected = word(0x20);
		expected.extend(word(0));
		assert_eq!(out, expected);
	}

	#[test]
	fn exact_word_string_is_not_over_padded() {
		let s = "a".repeat(32);
		let out = encode_args(&[AbiType::String], &[AbiValue::String(s)]).unwrap();
		assert_eq!(out.len(), 3 * WORD);
	}

	#[test]
	fn mixed_static_and_dynamic_keep_declaration_order() {
		let types = [AbiType::String, AbiType::Uint256, AbiType::Bytes];
		let values = [
			AbiValue::String("ab".into()),
			AbiValue::Uint(7),
			AbiValue::Bytes(vec![0xde, 0xad]),
		];
		let out = encode_args(&types, &values).unwrap();

		// Heads: offset(0x60), 7, offset(0x60 + 0x40).
		assert_eq!(&out[0..32], word(0x60).as_slice());
		assert_eq!(&out[32..64], word(7).as_slice());
		assert_eq!(&out[64..96], word(0xa0).as_slice());
		assert_eq!(&out[96..128], word(2).as_slice());
		assert_eq!(&out[128..130], b"ab");
		assert_eq!(&out[160..192], word(2).as_slice());
		assert_eq!(&out[192..194], &[0xde, 0xad]);
		assert_eq!(out.len(), 224);

		assert_eq!(decode_args(&types, &out).unwrap(), values);
	}

	#[test]
	fn string_array_roundtrip() {
		let ty = [AbiType::Array(Box::new(AbiType::String))];
		let value = [AbiValue::Array(vec![
			AbiValue::String("https://a.example".into()),
			AbiValue::String(String::new()),
			AbiValue::String("x".repeat(70)),
		])];
		let out = encode_args(&ty, &value).unwrap();
		assert_eq!(decode_args(&ty, &out).unwrap(), value);
	}

	#[test]
	fn decodes_reference_string_array_layout() {
		// string[] {"a", "bc"} as produced by the EVM.
		let mut data = word(0x20);
		data.extend(word(2));
		data.extend(word(0x40));
		data.extend(word(0x80));
		data.extend(word(1));
		let mut a = b"a".to_vec();
		a.resize(32, 0);
		data.extend(a);
		data.extend(word(2));
		let mut bc = b"bc".to_vec();
		bc.resize(32, 0);
		data.extend(bc);

		let ty = [AbiType::Array(Box::new(AbiType::String))];
		let decoded = decode_args(&ty, &data).unwrap().remove(0);
		assert_eq!(decoded.into_strings().unwrap(), vec!["a".to_string(), "bc".to_string()]);
	}

	#[test]
	fn type_mismatch_and_arity_fail_closed() {
		assert!(matches!(
			encode_args(&[AbiType::Address], &[AbiValue::String("0x12".into())]),
			Err(Error::InvalidArgument(_))
		));
		assert!(matches!(
			encode_args(&[AbiType::Uint256], &[]),
			Err(Error::InvalidArgument(_))
		));
	}

	#[test]
	fn truncated_or_hostile_data_is_rejected() {
		let ty = [AbiType::String];
		assert!(decode_args(&ty, &[0u8; 10]).is_err());

		// Offset beyond the buffer.
		assert!(decode_args(&ty, &word(0x1000)).is_err());

		// Length beyond the buffer.
		let mut data = word(0x20);
		data.extend(word(500));
		assert!(decode_args(&ty, &data).is_err());

		// Array claiming a huge element count.
		let arr = [AbiType::Array(Box::new(AbiType::String))];
		let mut data = word(0x20);
		data.extend(word(u64::MAX as u128));
		assert!(decode_args(&arr, &data).is_err());
	}

	#[test]
	fn oversized_uint_and_dirty_padding_are_rejected() {
		let mut big = [0u8; WORD];
		big[0] = 1;
		assert!(decode_args(&[AbiType::Uint256], &big).is_err());
		assert!(decode_args(&[AbiType::Address], &big).is_err());
		assert!(decode_args(&[AbiType::Bool], &word(2)).is_err());
	}

	#[test]
	fn canonical_type_names() {
		assert_eq!(AbiType::Array(Box::new(AbiType::String)).to_string(), "string[]");
		assert_eq!(AbiType::Uint256.to_string(), "uint256");
	}

	#[test]
	fn calldata_bytes_prefix_selector() {
		let cd = Calldata { selector: [1, 2, 3, 4], encoded_args: vec![9; 32] };
		let bytes = cd.to_bytes();
		assert_eq!(&bytes[..4], &[1, 2, 3, 4]);
		assert_eq!(bytes.len(), 36);
		assert!(cd.to_hex().starts_with("0x01020304"));
	}

	#[test]
	fn revert_reasons_decode() {
		assert_eq!(selector("Error(string)"), ERROR_STRING_SELECTOR);
		assert_eq!(selector("Panic(uint256)"), PANIC_SELECTOR);

		let mut data = ERROR_STRING_SELECTOR.to_vec();
		data.extend(encode_args(&[AbiType::String], &[AbiValue::String("Not admin".into())]).unwrap());
		assert_eq!(decode_revert(&data).as_deref(), Some("Not admin"));

		let mut panic = PANIC_SELECTOR.to_vec();
		panic.extend(word(0x11));
		assert_eq!(
			decode_revert(&panic).as_deref(),
			Some("panic 0x11 (arithmetic overflow or underflow)")
		);

		assert_eq!(decode_revert(&[]), None);
		assert_eq!(decode_revert(&[0xde, 0xad, 0xbe, 0xef]), None);
		assert_eq!(decode_revert(&ERROR_STRING_SELECTOR), None);
	}
}
