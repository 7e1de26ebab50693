use crate::crypto;
use crate::error::{Error, Result};
use crate::rlp::{self, RlpItem};
use crate::signer::{RecoverableSignature, Signer};
use crate::types::{encode_hex, Address, TxHash};

/// Largest calldata (or init code for deployments) the builder will sign.
pub const MAX_CALLDATA_LEN: usize = 128 * 1024;

const EIP1559_TX_TYPE: u8 = 0x02;

/// How the transaction pays for gas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeeParams {
	/// Pre-London pricing, signed with EIP-155 replay protection.
	Legacy { gas_price: u128 },
	/// Type-2 envelope.
	Eip1559 {
		max_fee_per_gas: u128,
		max_priority_fee_per_gas: u128,
	},
}

/// Everything needed to sign one transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionRequest {
	pub chain_id: u64,
	pub nonce: u64,
	/// `None` creates a contract from `data`.
	pub to: Option<Address>,
	pub value: u128,
	pub data: Vec<u8>,
	pub gas_limit: u64,
	pub fees: FeeParams,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransaction {
	pub raw: Vec<u8>,
	pub hash: TxHash,
	pub from: Address,
	pub nonce: u64,
}

impl SignedTransaction {
	pub fn raw_hex(&self) -> String {
		encode_hex(&self.raw)
	}
}

impl TransactionRequest {
	/// Local sanity checks, run before anything is signed.
	pub fn validate(&self) -> Result<()> {
		if self.chain_id == 0 {
			return Err(Error::InvalidArgument("chain id must be non-zero".into()));
		}
		if self.to.is_some_and(|a| a.is_zero()) {
			return Err(Error::InvalidArgument("refusing to send to the zero address".into()));
		}
		if self.to.is_none() && self.data.is_empty() {
			return Err(Error::InvalidArgument("contract creation without init code".into()));
		}
		if self.data.len() > MAX_CALLDATA_LEN {
			return Err(Error::InvalidArgument(format!(
				"calldata of {} bytes exceeds {} byte limit",
				self.data.len(),
				MAX_CALLDATA_LEN
			)));
		}
		if self.gas_limit == 0 {
			return Err(Error::InvalidArgument("gas limit must be non-zero".into()));
		}
		if let FeeParams::Eip1559 {
			max_fee_per_gas,
			max_priority_fee_per_gas,
		} = self.fees
		{
			if max_priority_fee_per_gas > max_fee_per_gas {
				return Err(Error::InvalidArgument(
					"priority fee exceeds max fee per gas".into(),
				));
			}
		}
		Ok(())
	}

	/// The digest the sender signs.
	pub fn signing_hash(&self) -> [u8; 32] {
		crypto::keccak256(&self.encode(None))
	}

	/// Serialize the envelope.  Without a signature this is the signing
	/// payload: for legacy transactions EIP-155 appends `chain_id, 0, 0`.
	fn encode(&self, sig: Option<&RecoverableSignature>) -> Vec<u8> {
		let to = match self.to {
			Some(addr) => rlp::encode_bytes(addr.as_bytes()),
			None => rlp::encode_bytes(&[]),
		};
		match self.fees {
			FeeParams::Legacy { gas_price } => {
				let mut fields = vec![
					rlp::encode_u64(self.nonce),
					rlp::encode_u128(gas_price),
					rlp::encode_u64(self.gas_limit),
					to,
					rlp::encode_u128(self.value),
					rlp::encode_bytes(&self.data),
				];
				match sig {
					Some(sig) => {
						let v = u128::from(sig.recovery_id) + 35 + 2 * u128::from(self.chain_id);
						fields.push(rlp::encode_u128(v));
						fields.extend(encode_rs(sig));
					}
					None => {
						fields.push(rlp::encode_u64(self.chain_id));
						fields.push(rlp::encode_u64(0));
						fields.push(rlp::encode_u64(0));
					}
				}
				rlp::encode_list(&fields)
			}
			FeeParams::Eip1559 {
				max_fee_per_gas,
				max_priority_fee_per_gas,
			} => {
				let mut fields = vec![
					rlp::encode_u64(self.chain_id),
					rlp::encode_u64(self.nonce),
					rlp::encode_u128(max_priority_fee_per_gas),
					rlp::encode_u128(max_fee_per_gas),
					rlp::encode_u64(self.gas_limit),
					to,
					rlp::encode_u128(self.value),
					rlp::encode_bytes(&self.data),
					// Empty access list.
					rlp::encode_list(&[]),
				];
				if let Some(sig) = sig {
					fields.push(rlp::encode_u64(u64::from(sig.recovery_id)));
					fields.extend(encode_rs(sig));
				}
				let mut out = vec![EIP1559_TX_TYPE];
				out.extend(rlp::encode_list(&fields));
				out
			}
		}
	}
}

fn encode_rs(sig: &RecoverableSignature) -> [Vec<u8>; 2] {
	[
		rlp::encode_bytes(&rlp::trim_leading_zeros(&sig.r)),
		rlp::encode_bytes(&rlp::trim_leading_zeros(&sig.s)),
	]
}

/// Validate, sign and serialize a transaction.
///
/// When `expected_sender` is given, signing is refused unless the signer
/// controls exactly that address.
pub async fn build_and_sign(
	signer: &dyn Signer,
	expected_sender: Option<Address>,
	req: &TransactionRequest,
) -> Result<SignedTransaction> {
	req.validate()?;

	let from = signer.address();
	if let Some(expected) = expected_sender {
		if expected != from {
			return Err(Error::SenderMismatch {
				expected: expected.to_checksum(),
				actual: from.to_checksum(),
			});
		}
	}

	let digest = req.signing_hash();
	let sig = signer.sign_prehash(&digest).await?;
	let raw = req.encode(Some(&sig));
	let hash = TxHash(crypto::keccak256(&raw));

	tracing::debug!(%hash, from = %from, nonce = req.nonce, chain_id = req.chain_id, "signed transaction");

	Ok(SignedTransaction {
		raw,
		hash,
		from,
		nonce: req.nonce,
	})
}

// -- Decoding --

/// A parsed signed transaction with its recovered sender.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedTransaction {
	pub request: TransactionRequest,
	pub signature: RecoverableSignature,
	pub from: Address,
	pub hash: TxHash,
}

/// Parse a raw signed transaction (legacy EIP-155 or type 2) and recover
/// its sender from the signature.
pub fn decode_signed(raw: &[u8]) -> Result<DecodedTransaction> {
	let (request, signature) = match raw.first() {
		Some(&EIP1559_TX_TYPE) => decode_eip1559(&raw[1..])?,
		Some(b) if *b >= 0xc0 => decode_legacy(raw)?,
		Some(b) => return Err(Error::Decode(format!("unsupported transaction type 0x{b:02x}"))),
		None => return Err(Error::Decode("empty transaction".into())),
	};

	let from = crypto::recover_address(&request.signing_hash(), &signature.rs(), signature.recovery_id)?;
	Ok(DecodedTransaction {
		request,
		signature,
		from,
		hash: TxHash(crypto::keccak256(raw)),
	})
}

fn decode_legacy(raw: &[u8]) -> Result<(TransactionRequest, RecoverableSignature)> {
	let item = rlp::decode(raw)?;
	let f = expect_fields(&item, 9)?;

	let v = f[6].as_u64()?;
	if v < 35 {
		return Err(Error::Decode(format!("transaction without replay protection (v = {v})")));
	}
	let request = TransactionRequest {
		nonce: f[0].as_u64()?,
		fees: FeeParams::Legacy {
			gas_price: f[1].as_u128()?,
		},
		gas_limit: f[2].as_u64()?,
		to: decode_to(&f[3])?,
		value: f[4].as_u128()?,
		data: f[5].as_bytes()?.to_vec(),
		chain_id: (v - 35) / 2,
	};
	let signature = decode_signature((v - 35) % 2, &f[7], &f[8])?;
	Ok((request, signature))
}

fn decode_eip1559(payload: &[u8]) -> Result<(TransactionRequest, RecoverableSignature)> {
	let item = rlp::decode(payload)?;
	let f = expect_fields(&item, 12)?;

	if !f[8].as_list()?.is_empty() {
		return Err(Error::Decode("non-empty access lists are not supported".into()));
	}
	let request = TransactionRequest {
		chain_id: f[0].as_u64()?,
		nonce: f[1].as_u64()?,
		fees: FeeParams::Eip1559 {
			max_priority_fee_per_gas: f[2].as_u128()?,
			max_fee_per_gas: f[3].as_u128()?,
		},
		gas_limit: f[4].as_u64()?,
		to: decode_to(&f[5])?,
		value: f[6].as_u128()?,
		data: f[7].as_bytes()?.to_vec(),
	};
	let signature = decode_signature(f[9].as_u64()?, &f[10], &f[11])?;
	Ok((request, signature))
}

fn expect_fields(item: &RlpItem, n: usize) -> Result<&[RlpItem]> {
	let fields = item.as_list()?;
	if fields.len() != n {
		return Err(Error::Decode(format!(
			"expected {n} transaction fields, found {}",
			fields.len()
		)));
	}
	Ok(fields)
}

fn decode_to(item: &RlpItem) -> Result<Option<Address>> {
	let b = item.as_bytes()?;
	if b.is_empty() {
		Ok(None)
	} else {
		Address::from_slice(b).map(Some).map_err(|e| Error::Decode(e.to_string()))
	}
}

fn decode_signature(parity: u64, r: &RlpItem, s: &RlpItem) -> Result<RecoverableSignature> {
	if parity > 1 {
		return Err(Error::Decode(format!("invalid signature parity {parity}")));
	}
	Ok(RecoverableSignature {
		r: left_pad_32(r.as_bytes()?)?,
		s: left_pad_32(s.as_bytes()?)?,
		recovery_id: parity as u8,
	})
}

fn left_pad_32(b: &[u8]) -> Result<[u8; 32]> {
	if b.len() > 32 {
		return Err(Error::Decode("signature component exceeds 32 bytes".into()));
	}
	let mut out = [0u8; 32];
	out[32 - b.len()..].copy_from_slice(b);
	Ok(out)
}
