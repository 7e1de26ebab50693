use std::time::{Duration, Instant};

use crate::abi::AbiValue;
use crate::config::{FeeMode, TransactionSection};
use crate::contracts::Function;
use crate::error::{Error, Result};
use crate::nonce::NonceManager;
use crate::rpc::{RpcClient, TransactionReceipt};
use crate::signer::LocalSigner;
use crate::tx_builder::{build_and_sign, FeeParams, SignedTransaction, TransactionRequest};
use crate::types::{Address, TxHash};
use crate::vault::UnlockedKey;

/// How writes are priced and confirmed.
#[derive(Debug, Clone)]
pub struct WriteSettings {
	pub fee_mode: FeeMode,
	pub gas_limit_multiplier_percent: u64,
	pub receipt_timeout: Duration,
	pub poll_interval: Duration,
}

impl From<&TransactionSection> for WriteSettings {
	fn from(t: &TransactionSection) -> Self {
		Self {
			fee_mode: t.fee_mode,
			gas_limit_multiplier_percent: t.gas_limit_multiplier_percent,
			receipt_timeout: Duration::from_secs(t.receipt_timeout_secs),
			poll_interval: Duration::from_millis(t.poll_interval_ms),
		}
	}
}

/// A transaction with all network-sourced fields filled in, ready for a
/// key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedTransaction {
	pub sender: Address,
	pub request: TransactionRequest,
}

/// Typed access to one PolyEndpoint registry deployment's node.
///
/// Reads go straight through `eth_call`.  Writes are prepared without any
/// key material, then signed and submitted in one step.
pub struct RegistryClient {
	rpc: RpcClient,
	nonces: NonceManager,
	chain_id: u64,
	settings: WriteSettings,
}

impl RegistryClient {
	/// `chain_id` is the configured chain; the node must agree before
	/// anything is signed.
	pub fn new(rpc: RpcClient, chain_id: u64, settings: WriteSettings) -> Self {
		Self {
			rpc,
			nonces: NonceManager::new(),
			chain_id,
			settings,
		}
	}

	pub fn rpc(&self) -> &RpcClient {
		&self.rpc
	}

	// -- Reads --

	async fn view(&self, contract: &Address, f: Function, args: &[AbiValue]) -> Result<AbiValue> {
		if !f.is_view() {
			return Err(Error::InvalidArgument(format!("{} is not a read-only function", f.signature())));
		}
		let calldata = f.encode(args)?;
		let raw = self.rpc.call(contract, &calldata.to_bytes()).await?;
		if raw.is_empty() {
			return Err(Error::Decode(format!(
				"{} returned no data; is {} a registry contract?",
				f.name(),
				contract.to_checksum()
			)));
		}
		f.decode_output(&raw)?
			.pop()
			.ok_or_else(|| Error::Decode(format!("{} returned no value", f.name())))
	}

	pub async fn endpoint_count(&self, contract: &Address) -> Result<u128> {
		self.view(contract, Function::GetEndpointCount, &[])
			.await?
			.as_uint()
			.ok_or_else(|| unexpected(Function::GetEndpointCount))
	}

	pub async fn all_endpoints(&self, contract: &Address) -> Result<Vec<String>> {
		self.view(contract, Function::GetAllEndpoints, &[])
			.await?
			.into_strings()
			.ok_or_else(|| unexpected(Function::GetAllEndpoints))
	}

	pub async fn endpoint(&self, contract: &Address, index: u128) -> Result<String> {
		let v = self
			.view(contract, Function::GetEndpoint, &[AbiValue::Uint(index)])
			.await?;
		v.as_str()
			.map(str::to_owned)
			.ok_or_else(|| unexpected(Function::GetEndpoint))
	}

	pub async fn has_endpoint(&self, contract: &Address, url: &str) -> Result<bool> {
		self.view(contract, Function::HasEndpoint, &[AbiValue::String(url.to_owned())])
			.await?
			.as_bool()
			.ok_or_else(|| unexpected(Function::HasEndpoint))
	}

	pub async fn owner(&self, contract: &Address) -> Result<Address> {
		self.view(contract, Function::Owner, &[])
			.await?
			.as_address()
			.ok_or_else(|| unexpected(Function::Owner))
	}

	pub async fn is_admin(&self, contract: &Address, account: &Address) -> Result<bool> {
		self.view(contract, Function::Admins, &[AbiValue::Address(*account)])
			.await?
			.as_bool()
			.ok_or_else(|| unexpected(Function::Admins))
	}

	// -- Writes --

	/// Fetch chain id, gas and fees concurrently, check the chain id, then
	/// reserve a nonce.  No key is needed.
	pub async fn prepare(
		&self,
		sender: Address,
		to: Option<Address>,
		data: Vec<u8>,
	) -> Result<PreparedTransaction> {
		let (chain_id, gas, fees) = tokio::try_join!(
			self.rpc.chain_id(),
			self.rpc.gas_estimate(&sender, to.as_ref(), &data),
			self.fee_params(),
		)?;
		if chain_id != self.chain_id {
			return Err(Error::ChainIdMismatch {
				expected: self.chain_id,
				actual: chain_id,
			});
		}

		let gas_limit = u128::from(gas) * u128::from(self.settings.gas_limit_multiplier_percent) / 100;
		let gas_limit = u64::try_from(gas_limit).unwrap_or(u64::MAX).max(gas);
		let nonce = self.nonces.reserve(&self.rpc, &sender).await?;

		Ok(PreparedTransaction {
			sender,
			request: TransactionRequest {
				chain_id,
				nonce,
				to,
				value: 0,
				data,
				gas_limit,
				fees,
			},
		})
	}

	async fn fee_params(&self) -> Result<FeeParams> {
		match self.settings.fee_mode {
			FeeMode::Legacy => Ok(FeeParams::Legacy {
				gas_price: self.rpc.gas_price().await?,
			}),
			FeeMode::Eip1559 => {
				let (base_fee, priority) =
					tokio::try_join!(self.rpc.latest_base_fee(), self.rpc.max_priority_fee())?;
				let base_fee = base_fee.ok_or_else(|| {
					Error::InvalidArgument("node reports no base fee; use fee_mode = \"legacy\"".into())
				})?;
				Ok(FeeParams::Eip1559 {
					max_fee_per_gas: base_fee.saturating_mul(2).saturating_add(priority),
					max_priority_fee_per_gas: priority,
				})
			}
		}
	}

	/// Sign and submit.  A nonce rejection refreshes the nonce from the
	/// chain, unlocks again and resubmits exactly once.
	///
	/// Any failure releases the reserved nonce so the next write asks the
	/// chain again instead of leaving a gap.
	pub async fn sign_and_submit<F>(&self, unlock: &F, prepared: PreparedTransaction) -> Result<TxHash>
	where
		F: Fn() -> Result<UnlockedKey>,
	{
		let sender = prepared.sender;
		let result = self.submit(unlock, prepared).await;
		if let Err(e) = &result {
			tracing::debug!(sender = %sender, error = %e, "write failed, releasing reserved nonce");
			self.nonces.reset(&sender).await;
		}
		result
	}

	async fn submit<F>(
		&self,
		unlock: &F,
		prepared: PreparedTransaction,
	) -> Result<TxHash>
	where
		F: Fn() -> Result<UnlockedKey>,
	{
		let PreparedTransaction { sender, mut request } = prepared;
		let signed = sign_with(unlock, sender, &request).await?;

		match self.rpc.send_raw_transaction(&signed).await {
			Err(Error::NonceConflict(reason)) => {
				tracing::warn!(nonce = request.nonce, %reason, "nonce conflict, refreshing and resubmitting once");
				self.nonces.reset(&sender).await;
				request.nonce = self.nonces.reserve(&self.rpc, &sender).await?;
				let signed = sign_with(unlock, sender, &request).await?;
				self.rpc.send_raw_transaction(&signed).await
			}
			other => other,
		}
	}

	/// Prepare, then unlock, sign and submit.  `unlock` runs once per
	/// signature and each key is dropped before the transaction is sent.
	pub async fn execute<F>(
		&self,
		sender: Address,
		to: Option<Address>,
		data: Vec<u8>,
		unlock: F,
	) -> Result<TxHash>
	where
		F: Fn() -> Result<UnlockedKey>,
	{
		let prepared = self.prepare(sender, to, data).await?;
		self.sign_and_submit(&unlock, prepared).await
	}

	/// Encode a state-changing registry call and execute it.
	pub async fn transact<F>(
		&self,
		sender: Address,
		contract: Address,
		f: Function,
		args: &[AbiValue],
		unlock: F,
	) -> Result<TxHash>
	where
		F: Fn() -> Result<UnlockedKey>,
	{
		if f.is_view() {
			return Err(Error::InvalidArgument(format!("{} is read-only", f.signature())));
		}
		let calldata = f.encode(args)?;
		self.execute(sender, Some(contract), calldata.to_bytes(), unlock)
			.await
	}

	/// Poll until the transaction is mined.  A failed receipt is reported
	/// as a revert.
	pub async fn wait_for_receipt(&self, hash: &TxHash) -> Result<TransactionReceipt> {
		let started = Instant::now();
		let mut polls = 0u32;
		loop {
			polls += 1;
			if let Some(receipt) = self.rpc.get_transaction_receipt(hash).await? {
				if receipt.success == Some(false) {
					return Err(Error::ApplicationRevert { reason: None });
				}
				tracing::info!(%hash, block = receipt.block_number, "transaction mined");
				return Ok(receipt);
			}
			if started.elapsed() >= self.settings.receipt_timeout {
				return Err(Error::TransportFailure {
					method: "eth_getTransactionReceipt".into(),
					attempts: polls,
					reason: format!(
						"{hash} not mined within {}s",
						self.settings.receipt_timeout.as_secs()
					),
				});
			}
			tokio::time::sleep(self.settings.poll_interval).await;
		}
	}
}

/// Unlock, sign one transaction and drop the key before returning.
async fn sign_with<F>(unlock: &F, sender: Address, request: &TransactionRequest) -> Result<SignedTransaction>
where
	F: Fn() -> Result<UnlockedKey>,
{
	let signer = LocalSigner::new(unlock()?);
	build_and_sign(&signer, Some(sender), request).await
}

fn unexpected(f: Function) -> Error {
	Error::Decode(format!("{} returned an unexpected value type", f.name()))
}

#[cfg(test)]
mod tests {
	use std::sync::atomic::{AtomicUsize, Ordering};

	use serde_json::{json, Value};

	use super::*;
	use crate::rpc::tests::{fast_retry, MockTransport, Reply};
	use crate::tx_builder::decode_signed;

	const HARDHAT_KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
	const CONTRACT: &str = "0x5FbDB2315678afecb367f032d93F642f64180aa3";

	fn settings(fee_mode: FeeMode) -> WriteSettings {
		WriteSettings {
			fee_mode,
			gas_limit_multiplier_percent: 120,
			receipt_timeout: Duration::from_millis(20),
			poll_interval: Duration::from_millis(1),
		}
	}

	fn registry(replies: Vec<Reply>, fee_mode: FeeMode) -> (RegistryClient, MockTransport) {
		let mock = MockTransport::new(replies);
		let rpc = RpcClient::with_transport(Box::new(mock.clone()), fast_retry(1));
		(RegistryClient::new(rpc, 1337, settings(fee_mode)), mock)
	}

	fn key() -> Result<UnlockedKey> {
		UnlockedKey::from_bytes(&hex::decode(HARDHAT_KEY).unwrap())
	}

	fn sender() -> Address {
		key().unwrap().address()
	}

	fn contract() -> Address {
		CONTRACT.parse().unwrap()
	}

	fn word(v: u64) -> String {
		format!("{v:064x}")
	}

	fn sent_raw(mock: &MockTransport, nth: usize) -> Vec<u8> {
		let reqs = mock.requests.lock().unwrap();
		let sends: Vec<&Value> = reqs
			.iter()
			.filter(|r| r["method"] == "eth_sendRawTransaction")
			.collect();
		hex::decode(sends[nth]["params"][0].as_str().unwrap().trim_start_matches("0x")).unwrap()
	}

	#[tokio::test]
	async fn reads_decode_typed_values() {
		let endpoints = format!(
			"0x{}{}{}{}{}{}{}",
			word(0x20),
			word(2),
			word(0x40),
			word(0x80),
			word(1),
			format!("{:0<64}", hex::encode("a")),
			format!("{}{:0<64}", word(2), hex::encode("bc")),
		);
		let (reg, mock) = registry(
			vec![
				Reply::Result(json!(format!("0x{}", word(3)))),
				Reply::Result(json!(endpoints)),
				Reply::Result(json!(format!("0x{}", word(1)))),
				Reply::Result(json!(format!("0x000000000000000000000000{}", &CONTRACT[2..].to_lowercase()))),
			],
			FeeMode::Legacy,
		);
		let c = contract();
		assert_eq!(reg.endpoint_count(&c).await.unwrap(), 3);
		assert_eq!(reg.all_endpoints(&c).await.unwrap(), vec!["a", "bc"]);
		assert!(reg.has_endpoint(&c, "a").await.unwrap());
		assert_eq!(reg.owner(&c).await.unwrap(), c);
		assert!(mock.methods().iter().all(|m| m == "eth_call"));
	}

	#[tokio::test]
	async fn empty_call_result_is_decode_error() {
		let (reg, _) = registry(vec![Reply::Result(json!("0x"))], FeeMode::Legacy);
		assert!(matches!(reg.endpoint_count(&contract()).await, Err(Error::Decode(_))));
	}

	#[tokio::test]
	async fn legacy_write_flow() {
		let (reg, mock) = registry(
			vec![
				Reply::Result(json!("0x539")),
				Reply::Result(json!("0x7530")),
				Reply::Result(json!("0x3b9aca00")),
				Reply::Result(json!("0x5")),
				Reply::Result(json!(format!("0x{}", "ab".repeat(32)))),
			],
			FeeMode::Legacy,
		);
		let admin: Address = "0xabcdabcdabcdabcdabcdabcdabcdabcdabcdabcd".parse().unwrap();
		reg.transact(sender(), contract(), Function::AddAdmin, &[AbiValue::Address(admin)], key)
			.await
			.unwrap();

		assert_eq!(
			mock.methods(),
			[
				"eth_chainId",
				"eth_estimateGas",
				"eth_gasPrice",
				"eth_getTransactionCount",
				"eth_sendRawTransaction"
			]
		);
		let decoded = decode_signed(&sent_raw(&mock, 0)).unwrap();
		assert_eq!(decoded.from, sender());
		assert_eq!(decoded.request.nonce, 5);
		assert_eq!(decoded.request.chain_id, 1337);
		assert_eq!(decoded.request.gas_limit, 36_000);
		assert_eq!(decoded.request.to, Some(contract()));
		assert_eq!(
			Function::AddAdmin.decode_input(&decoded.request.data).unwrap(),
			vec![AbiValue::Address(admin)]
		);
	}

	#[tokio::test]
	async fn eip1559_fees_from_base_fee_and_tip() {
		let (reg, mock) = registry(
			vec![
				Reply::Result(json!("0x539")),
				Reply::Result(json!("0x5208")),
				Reply::Result(json!({ "baseFeePerGas": "0x64" })),
				Reply::Result(json!("0xa")),
				Reply::Result(json!("0x0")),
				Reply::Result(json!(format!("0x{}", "cd".repeat(32)))),
			],
			FeeMode::Eip1559,
		);
		reg.transact(
			sender(),
			contract(),
			Function::AddEndpoint,
			&[AbiValue::String("https://rpc.example.org".into())],
			key,
		)
		.await
		.unwrap();

		let decoded = decode_signed(&sent_raw(&mock, 0)).unwrap();
		assert_eq!(
			decoded.request.fees,
			FeeParams::Eip1559 {
				max_fee_per_gas: 210,
				max_priority_fee_per_gas: 10,
			}
		);
	}

	#[tokio::test]
	async fn nonce_conflict_resubmits_once_with_fresh_nonce() {
		let (reg, mock) = registry(
			vec![
				Reply::Result(json!("0x539")),
				Reply::Result(json!("0x5208")),
				Reply::Result(json!("0x1")),
				Reply::Result(json!("0x5")),
				Reply::Error(json!({ "code": -32000, "message": "nonce too low" })),
				Reply::Result(json!("0x6")),
				Reply::Result(json!(format!("0x{}", "ef".repeat(32)))),
			],
			FeeMode::Legacy,
		);
		let unlocks = AtomicUsize::new(0);
		reg.transact(
			sender(),
			contract(),
			Function::RemoveEndpoint,
			&[AbiValue::String("x".into())],
			|| {
				unlocks.fetch_add(1, Ordering::SeqCst);
				key()
			},
		)
		.await
		.unwrap();

		assert_eq!(decode_signed(&sent_raw(&mock, 0)).unwrap().request.nonce, 5);
		assert_eq!(decode_signed(&sent_raw(&mock, 1)).unwrap().request.nonce, 6);
		// One unlock per signature; the first key is gone before the resubmit.
		assert_eq!(unlocks.load(Ordering::SeqCst), 2);
	}

	/// Replies for one legacy write up to and including the nonce query.
	fn prepare_replies(pending_nonce: u64) -> Vec<Reply> {
		vec![
			Reply::Result(json!("0x539")),
			Reply::Result(json!("0x5208")),
			Reply::Result(json!("0x1")),
			Reply::Result(json!(format!("0x{pending_nonce:x}"))),
		]
	}

	#[tokio::test]
	async fn rejected_write_gives_its_nonce_back() {
		let mut replies = prepare_replies(5);
		replies.push(Reply::Error(json!({
			"code": -32000,
			"message": "insufficient funds for gas * price + value"
		})));
		replies.extend(prepare_replies(5));
		replies.push(Reply::Result(json!(format!("0x{}", "12".repeat(32)))));
		let (reg, mock) = registry(replies, FeeMode::Legacy);
		let url = [AbiValue::String("https://rpc.example.org".into())];

		let err = reg
			.transact(sender(), contract(), Function::AddEndpoint, &url, key)
			.await
			.unwrap_err();
		assert!(matches!(err, Error::RemoteProtocolError { .. }));

		reg.transact(sender(), contract(), Function::AddEndpoint, &url, key)
			.await
			.unwrap();
		assert_eq!(decode_signed(&sent_raw(&mock, 0)).unwrap().request.nonce, 5);
		assert_eq!(decode_signed(&sent_raw(&mock, 1)).unwrap().request.nonce, 5);
	}

	#[tokio::test]
	async fn failed_unlock_gives_its_nonce_back() {
		let mut replies = prepare_replies(5);
		replies.extend(prepare_replies(5));
		replies.push(Reply::Result(json!(format!("0x{}", "34".repeat(32)))));
		let (reg, mock) = registry(replies, FeeMode::Legacy);
		let url = [AbiValue::String("https://rpc.example.org".into())];

		let err = reg
			.transact(sender(), contract(), Function::AddEndpoint, &url, || {
				Err(Error::AuthenticationFailed)
			})
			.await
			.unwrap_err();
		assert!(matches!(err, Error::AuthenticationFailed));

		reg.transact(sender(), contract(), Function::AddEndpoint, &url, key)
			.await
			.unwrap();
		assert_eq!(decode_signed(&sent_raw(&mock, 0)).unwrap().request.nonce, 5);
	}

	#[tokio::test]
	async fn successful_writes_keep_advancing_the_nonce() {
		let mut replies = prepare_replies(5);
		replies.push(Reply::Result(json!(format!("0x{}", "56".repeat(32)))));
		// The node has not seen the first transaction yet.
		replies.extend(prepare_replies(5));
		replies.push(Reply::Result(json!(format!("0x{}", "78".repeat(32)))));
		let (reg, mock) = registry(replies, FeeMode::Legacy);
		let url = [AbiValue::String("https://rpc.example.org".into())];

		for _ in 0..2 {
			reg.transact(sender(), contract(), Function::AddEndpoint, &url, key)
				.await
				.unwrap();
		}
		assert_eq!(decode_signed(&sent_raw(&mock, 0)).unwrap().request.nonce, 5);
		assert_eq!(decode_signed(&sent_raw(&mock, 1)).unwrap().request.nonce, 6);
	}

	#[tokio::test]
	async fn second_nonce_conflict_is_surfaced() {
		let (reg, _) = registry(
			vec![
				Reply::Result(json!("0x539")),
				Reply::Result(json!("0x5208")),
				Reply::Result(json!("0x1")),
				Reply::Result(json!("0x5")),
				Reply::Error(json!({ "code": -32000, "message": "nonce too low" })),
				Reply::Result(json!("0x5")),
				Reply::Error(json!({ "code": -32000, "message": "nonce too low" })),
			],
			FeeMode::Legacy,
		);
		let err = reg
			.transact(sender(), contract(), Function::RemoveAdmin, &[AbiValue::Address(sender())], key)
			.await
			.unwrap_err();
		assert!(matches!(err, Error::NonceConflict(_)));
	}

	#[tokio::test]
	async fn chain_id_mismatch_stops_before_unlock() {
		let (reg, mock) = registry(
			vec![
				Reply::Result(json!("0x1")),
				Reply::Result(json!("0x5208")),
				Reply::Result(json!("0x1")),
			],
			FeeMode::Legacy,
		);
		let err = reg
			.transact(sender(), contract(), Function::TransferOwnership, &[AbiValue::Address(sender())], || {
				panic!("key must not be unlocked")
			})
			.await
			.unwrap_err();
		assert!(matches!(err, Error::ChainIdMismatch { expected: 1337, actual: 1 }));
		assert!(!mock.methods().contains(&"eth_sendRawTransaction".to_string()));
	}

	#[tokio::test]
	async fn wrong_unlocked_key_is_refused() {
		let (reg, mock) = registry(
			vec![
				Reply::Result(json!("0x539")),
				Reply::Result(json!("0x5208")),
				Reply::Result(json!("0x1")),
				Reply::Result(json!("0x0")),
			],
			FeeMode::Legacy,
		);
		let other = || UnlockedKey::from_bytes(&[0x42u8; 32]);
		let err = reg
			.transact(sender(), contract(), Function::AddEndpoint, &[AbiValue::String("x".into())], other)
			.await
			.unwrap_err();
		assert!(matches!(err, Error::SenderMismatch { .. }));
		assert!(!mock.methods().contains(&"eth_sendRawTransaction".to_string()));
	}

	#[tokio::test]
	async fn read_functions_are_not_transactable() {
		let (reg, _) = registry(vec![], FeeMode::Legacy);
		let err = reg
			.transact(sender(), contract(), Function::Owner, &[], key)
			.await
			.unwrap_err();
		assert!(matches!(err, Error::InvalidArgument(_)));
	}

	#[tokio::test]
	async fn receipt_wait_polls_then_reports() {
		let hash = format!("0x{}", "11".repeat(32));
		let receipt = |status: &str| {
			json!({
				"transactionHash": hash,
				"blockNumber": "0x2",
				"status": status,
				"gasUsed": "0x5208",
				"contractAddress": CONTRACT.to_lowercase()
			})
		};
		let (reg, _) = registry(
			vec![
				Reply::Result(Value::Null),
				Reply::Result(receipt("0x1")),
				Reply::Result(receipt("0x0")),
			],
			FeeMode::Legacy,
		);
		let h: TxHash = hash.parse().unwrap();
		let mined = reg.wait_for_receipt(&h).await.unwrap();
		assert_eq!(mined.contract_address, Some(contract()));
		assert!(matches!(
			reg.wait_for_receipt(&h).await,
			Err(Error::ApplicationRevert { reason: None })
		));
	}

	#[tokio::test]
	async fn receipt_wait_times_out() {
		let (reg, _) = registry((0..100).map(|_| Reply::Result(Value::Null)).collect(), FeeMode::Legacy);
		let err = reg.wait_for_receipt(&TxHash([0; 32])).await.unwrap_err();
		assert!(matches!(err, Error::TransportFailure { .. }));
	}
}
