use thiserror::Error;

/// Every failure the registry tooling can report.
///
/// Codec and vault errors are local and end the current operation.  Only
/// `TransportFailure` is retried automatically, and only by the RPC client.
#[derive(Debug, Error)]
pub enum Error {
	#[error("invalid argument: {0}")]
	InvalidArgument(String),

	#[error("malformed data: {0}")]
	Decode(String),

	/// Wrong password and tampered ciphertext are deliberately the same error.
	#[error("unable to unlock keystore: authentication failed")]
	AuthenticationFailed,

	#[error("keystore is corrupt or unreadable: {0}")]
	CorruptKeyStore(String),

	#[error("{method} failed after {attempts} attempt(s): {reason}")]
	TransportFailure {
		method: String,
		attempts: u32,
		reason: String,
	},

	#[error("RPC error {code}: {message}")]
	RemoteProtocolError {
		code: i64,
		message: String,
		data: Option<String>,
	},

	#[error("execution reverted{}", .reason.as_deref().map(|r| format!(": {r}")).unwrap_or_default())]
	ApplicationRevert { reason: Option<String> },

	#[error("nonce rejected by node: {0}")]
	NonceConflict(String),

	#[error("unlocked key controls {actual}, expected sender {expected}")]
	SenderMismatch { expected: String, actual: String },

	#[error("node reports chain id {actual}, configured chain id is {expected}")]
	ChainIdMismatch { expected: u64, actual: u64 },

	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
}

impl Error {
	/// Whether the RPC client may transparently try the request again.
	pub fn is_retryable(&self) -> bool {
		matches!(self, Self::TransportFailure { .. })
	}
}

pub type Result<T> = std::result::Result<T, Error>;
