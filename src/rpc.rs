use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde_json::{json, Value};

use crate::abi::decode_revert;
use crate::error::{Error, Result};
use crate::tx_builder::SignedTransaction;
use crate::types::{decode_hex, encode_hex, parse_quantity, Address, TxHash};

/// Failure to get any JSON-RPC response at all.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
	#[error("request timed out")]
	Timeout,
	#[error("connection failed: {0}")]
	Connection(String),
	#[error("HTTP status {0}")]
	Status(u16),
	#[error("invalid response body: {0}")]
	InvalidBody(String),
}

/// Moves one JSON-RPC request body to the node and returns the response
/// body.  The HTTP implementation is the only one used outside tests.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
	async fn send(&self, body: Value) -> std::result::Result<Value, TransportError>;
}

pub struct HttpTransport {
	url: String,
	http: reqwest::Client,
}

impl HttpTransport {
	pub fn new(url: &str, timeout: Duration) -> Result<Self> {
		let http = reqwest::Client::builder()
			.timeout(timeout)
			.build()
			.map_err(|e| Error::InvalidArgument(format!("cannot build HTTP client: {e}")))?;
		Ok(Self {
			url: url.to_owned(),
			http,
		})
	}
}

#[async_trait::async_trait]
impl Transport for HttpTransport {
	async fn send(&self, body: Value) -> std::result::Result<Value, TransportError> {
		let resp = self.http.post(&self.url).json(&body).send().await.map_err(classify)?;
		let status = resp.status();
		let text = resp.text().await.map_err(classify)?;

		// Some nodes pair JSON-RPC errors with a non-2xx status.  Past a
		// failing status only a real JSON-RPC envelope counts as a reply;
		// anything else came from a proxy in front of the node.
		match serde_json::from_str::<Value>(&text) {
			Ok(v) if status.is_success() && v.is_object() => Ok(v),
			Ok(v) if is_rpc_envelope(&v) => Ok(v),
			_ if !status.is_success() => Err(TransportError::Status(status.as_u16())),
			Ok(_) => Err(TransportError::InvalidBody("response is not a JSON object".into())),
			Err(e) => Err(TransportError::InvalidBody(e.to_string())),
		}
	}
}

fn is_rpc_envelope(v: &Value) -> bool {
	v.get("jsonrpc").is_some() && (v.get("result").is_some() || v.get("error").is_some())
}

fn classify(e: reqwest::Error) -> TransportError {
	if e.is_timeout() {
		TransportError::Timeout
	} else {
		TransportError::Connection(e.to_string())
	}
}

/// Bounded exponential backoff for transport failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
	pub max_attempts: u32,
	pub initial_backoff: Duration,
	pub max_backoff: Duration,
}

impl Default for RetryPolicy {
	fn default() -> Self {
		Self {
			max_attempts: 3,
			initial_backoff: Duration::from_millis(250),
			max_backoff: Duration::from_secs(4),
		}
	}
}

impl RetryPolicy {
	/// Delay after failed attempt number `attempt` (1-based).
	pub fn backoff(&self, attempt: u32) -> Duration {
		let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
		self.initial_backoff
			.checked_mul(factor)
			.map_or(self.max_backoff, |d| d.min(self.max_backoff))
	}
}

/// A mined transaction's receipt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionReceipt {
	pub transaction_hash: TxHash,
	pub block_number: u64,
	/// `None` on pre-Byzantium chains that only report a state root.
	pub success: Option<bool>,
	pub gas_used: u128,
	pub contract_address: Option<Address>,
}

/// JSON-RPC 2.0 client for an Ethereum-compatible node.
///
/// Every request carries a fresh id from a per-client counter and the
/// response must echo it.  Only transport failures are retried.
pub struct RpcClient {
	transport: Box<dyn Transport>,
	retry: RetryPolicy,
	next_id: AtomicU64,
}

impl RpcClient {
	pub fn new(url: &str, timeout: Duration, retry: RetryPolicy) -> Result<Self> {
		Ok(Self::with_transport(Box::new(HttpTransport::new(url, timeout)?), retry))
	}

	pub fn with_transport(transport: Box<dyn Transport>, retry: RetryPolicy) -> Self {
		Self {
			transport,
			retry,
			next_id: AtomicU64::new(1),
		}
	}

	/// Send one request, retrying transport failures with backoff.
	pub async fn request(&self, method: &str, params: Value) -> Result<Value> {
		let max = self.retry.max_attempts.max(1);
		let mut attempt = 1;
		loop {
			let id = self.next_id.fetch_add(1, Ordering::Relaxed);
			let body = json!({
				"jsonrpc": "2.0",
				"id": id,
				"method": method,
				"params": params,
			});
			tracing::debug!(method, id, attempt, "rpc request");

			match self.transport.send(body).await {
				Ok(resp) => return parse_response(method, id, resp),
				Err(e) if attempt < max => {
					let delay = self.retry.backoff(attempt);
					tracing::warn!(method, attempt, error = %e, ?delay, "rpc transport failure, retrying");
					tokio::time::sleep(delay).await;
					attempt += 1;
				}
				Err(e) => {
					return Err(Error::TransportFailure {
						method: method.to_owned(),
						attempts: attempt,
						reason: e.to_string(),
					});
				}
			}
		}
	}

	// -- Reads --

	/// `eth_call` against the latest block.  Needs no key.
	pub async fn call(&self, to: &Address, calldata: &[u8]) -> Result<Vec<u8>> {
		let result = self
			.request(
				"eth_call",
				json!([{ "to": to.to_string(), "data": encode_hex(calldata) }, "latest"]),
			)
			.await?;
		decode_hex(as_str(&result, "eth_call")?).map_err(|e| Error::Decode(e.to_string()))
	}

	pub async fn chain_id(&self) -> Result<u64> {
		let v = self.request("eth_chainId", json!([])).await?;
		quantity_u64(&v, "eth_chainId")
	}

	/// Pending transaction count, i.e. the next nonce the node expects.
	pub async fn next_nonce(&self, address: &Address) -> Result<u64> {
		let v = self
			.request("eth_getTransactionCount", json!([address.to_string(), "pending"]))
			.await?;
		quantity_u64(&v, "eth_getTransactionCount")
	}

	pub async fn gas_estimate(
		&self,
		from: &Address,
		to: Option<&Address>,
		data: &[u8],
	) -> Result<u64> {
		let mut tx = json!({ "from": from.to_string(), "data": encode_hex(data) });
		if let Some(to) = to {
			tx["to"] = Value::String(to.to_string());
		}
		let v = self.request("eth_estimateGas", json!([tx])).await?;
		quantity_u64(&v, "eth_estimateGas")
	}

	pub async fn gas_price(&self) -> Result<u128> {
		let v = self.request("eth_gasPrice", json!([])).await?;
		quantity(&v, "eth_gasPrice")
	}

	pub async fn max_priority_fee(&self) -> Result<u128> {
		let v = self.request("eth_maxPriorityFeePerGas", json!([])).await?;
		quantity(&v, "eth_maxPriorityFeePerGas")
	}

	/// Base fee of the latest block, or `None` before London.
	pub async fn latest_base_fee(&self) -> Result<Option<u128>> {
		let block = self
			.request("eth_getBlockByNumber", json!(["latest", false]))
			.await?;
		match block.get("baseFeePerGas") {
			None | Some(Value::Null) => Ok(None),
			Some(v) => quantity(v, "baseFeePerGas").map(Some),
		}
	}

	pub async fn get_transaction_receipt(&self, hash: &TxHash) -> Result<Option<TransactionReceipt>> {
		let v = self
			.request("eth_getTransactionReceipt", json!([hash.to_string()]))
			.await?;
		if v.is_null() {
			return Ok(None);
		}
		parse_receipt(&v).map(Some)
	}

	// -- Writes --

	/// Submit an already-signed transaction.
	///
	/// If the node says it already has this exact transaction (typically
	/// because an earlier attempt landed before its response was lost),
	/// the locally computed hash is returned.
	pub async fn send_raw_transaction(&self, tx: &SignedTransaction) -> Result<TxHash> {
		match self
			.request("eth_sendRawTransaction", json!([tx.raw_hex()]))
			.await
		{
			Ok(v) => {
				let hash: TxHash = as_str(&v, "eth_sendRawTransaction")?
					.parse()
					.map_err(|e: Error| Error::Decode(e.to_string()))?;
				if hash != tx.hash {
					tracing::warn!(node = %hash, local = %tx.hash, "node reported a different transaction hash");
				}
				tracing::info!(%hash, nonce = tx.nonce, "transaction submitted");
				Ok(hash)
			}
			Err(Error::RemoteProtocolError { message, .. }) if is_already_known(&message) => {
				tracing::info!(hash = %tx.hash, "transaction already known to node");
				Ok(tx.hash)
			}
			Err(e) => Err(e),
		}
	}
}

// -- Response handling --

fn parse_response(method: &str, id: u64, resp: Value) -> Result<Value> {
	if resp.get("id").and_then(Value::as_u64) != Some(id) {
		return Err(Error::Decode(format!(
			"{method}: response id {} does not match request id {id}",
			resp.get("id").unwrap_or(&Value::Null)
		)));
	}
	if let Some(err) = resp.get("error").filter(|e| !e.is_null()) {
		return Err(classify_error(err));
	}
	resp.get("result")
		.cloned()
		.ok_or_else(|| Error::Decode(format!("{method}: response has neither result nor error")))
}

/// Map a JSON-RPC error object to the local taxonomy.
fn classify_error(err: &Value) -> Error {
	let code = err.get("code").and_then(Value::as_i64).unwrap_or_default();
	let message = err
		.get("message")
		.and_then(Value::as_str)
		.unwrap_or_default()
		.to_owned();
	let data = revert_data(err.get("data"));

	if let Some(reason) = data.as_deref().and_then(|d| decode_hex(d).ok()).and_then(|b| decode_revert(&b)) {
		return Error::ApplicationRevert {
			reason: Some(reason),
		};
	}
	if is_nonce_error(&message) {
		tracing::warn!(%message, "node rejected transaction nonce");
		return Error::NonceConflict(message);
	}
	Error::RemoteProtocolError {
		code,
		message,
		data,
	}
}

/// Revert data arrives either as a hex string or nested one level down.
fn revert_data(data: Option<&Value>) -> Option<String> {
	match data? {
		Value::String(s) => Some(s.clone()),
		Value::Object(obj) => obj.get("data").and_then(Value::as_str).map(str::to_owned),
		other => Some(other.to_string()),
	}
}

fn is_nonce_error(message: &str) -> bool {
	let m = message.to_ascii_lowercase();
	[
		"nonce too low",
		"nonce too high",
		"invalid nonce",
		"nonce has already been used",
		"replacement transaction underpriced",
	]
	.iter()
	.any(|needle| m.contains(needle))
}

fn is_already_known(message: &str) -> bool {
	let m = message.to_ascii_lowercase();
	m.contains("already known") || m.contains("known transaction")
}

fn parse_receipt(v: &Value) -> Result<TransactionReceipt> {
	let transaction_hash = as_str(field(v, "transactionHash")?, "transactionHash")?
		.parse()
		.map_err(|e: Error| Error::Decode(e.to_string()))?;
	let success = match v.get("status") {
		None | Some(Value::Null) => None,
		Some(s) => Some(quantity(s, "status")? == 1),
	};
	let contract_address = match v.get("contractAddress") {
		None | Some(Value::Null) => None,
		Some(a) => Some(
			as_str(a, "contractAddress")?
				.parse()
				.map_err(|e: Error| Error::Decode(e.to_string()))?,
		),
	};
	Ok(TransactionReceipt {
		transaction_hash,
		block_number: quantity_u64(field(v, "blockNumber")?, "blockNumber")?,
		success,
		gas_used: quantity(field(v, "gasUsed")?, "gasUsed")?,
		contract_address,
	})
}

fn field<'a>(v: &'a Value, name: &str) -> Result<&'a Value> {
	v.get(name)
		.ok_or_else(|| Error::Decode(format!("missing field {name}")))
}

fn as_str<'a>(v: &'a Value, what: &str) -> Result<&'a str> {
	v.as_str()
		.ok_or_else(|| Error::Decode(format!("{what}: expected a string, got {v}")))
}

fn quantity(v: &Value, what: &str) -> Result<u128> {
	parse_quantity(as_str(v, what)?)
}

fn quantity_u64(v: &Value, what: &str) -> Result<u64> {
	u64::try_from(quantity(v, what)?).map_err(|_| Error::Decode(format!("{what} exceeds 64 bits")))
}
