use std::collections::HashMap;

use tokio::sync::Mutex;

use crate::error::Result;
use crate::rpc::RpcClient;
use crate::types::Address;

/// Hands out transaction nonces per sender.
///
/// Each reservation takes the larger of the node's pending count and the
/// last nonce handed out locally plus one, so concurrent writers for one
/// sender get distinct, increasing nonces even before the node has seen
/// the earlier transactions.  The lock is held across the node query.
#[derive(Default)]
pub struct NonceManager {
	next: Mutex<HashMap<Address, u64>>,
}

impl NonceManager {
	pub fn new() -> Self {
		Self::default()
	}

	pub async fn reserve(&self, rpc: &RpcClient, sender: &Address) -> Result<u64> {
		let mut next = self.next.lock().await;
		let on_chain = rpc.next_nonce(sender).await?;
		let nonce = next.get(sender).map_or(on_chain, |cached| on_chain.max(*cached));
		next.insert(*sender, nonce + 1);
		tracing::debug!(sender = %sender, nonce, on_chain, "reserved nonce");
		Ok(nonce)
	}

	/// Forget the local view for `sender` after a rejected nonce or a write
	/// that never reached the node, so the next reservation trusts the
	/// chain again.
	pub async fn reset(&self, sender: &Address) {
		self.next.lock().await.remove(sender);
	}
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;
	use crate::rpc::tests::{fast_retry, MockTransport, Reply};

	fn rpc(replies: Vec<Reply>) -> RpcClient {
		RpcClient::with_transport(Box::new(MockTransport::new(replies)), fast_retry(1))
	}

	#[tokio::test]
	async fn back_to_back_reservations_are_distinct() {
		// The node still reports N for the second query.
		let rpc = rpc(vec![Reply::Result(json!("0x5")), Reply::Result(json!("0x5"))]);
		let nonces = NonceManager::new();
		let sender = Address([0xaa; 20]);

		assert_eq!(nonces.reserve(&rpc, &sender).await.unwrap(), 5);
		assert_eq!(nonces.reserve(&rpc, &sender).await.unwrap(), 6);
	}

	#[tokio::test]
	async fn concurrent_reservations_never_collide() {
		let rpc = rpc((0..4).map(|_| Reply::Result(json!("0x0"))).collect());
		let nonces = NonceManager::new();
		let sender = Address([0xbb; 20]);

		let (a, b, c, d) = tokio::join!(
			nonces.reserve(&rpc, &sender),
			nonces.reserve(&rpc, &sender),
			nonces.reserve(&rpc, &sender),
			nonces.reserve(&rpc, &sender),
		);
		let mut got = vec![a.unwrap(), b.unwrap(), c.unwrap(), d.unwrap()];
		got.sort_unstable();
		assert_eq!(got, vec![0, 1, 2, 3]);
	}

	#[tokio::test]
	async fn chain_ahead_of_cache_wins_and_reset_clears() {
		let rpc = rpc(vec![
			Reply::Result(json!("0x1")),
			Reply::Result(json!("0xa")),
			Reply::Result(json!("0x3")),
		]);
		let nonces = NonceManager::new();
		let sender = Address([0xcc; 20]);

		assert_eq!(nonces.reserve(&rpc, &sender).await.unwrap(), 1);
		assert_eq!(nonces.reserve(&rpc, &sender).await.unwrap(), 10);
		nonces.reset(&sender).await;
		assert_eq!(nonces.reserve(&rpc, &sender).await.unwrap(), 3);
	}

	#[tokio::test]
	async fn senders_are_independent() {
		let rpc = rpc(vec![Reply::Result(json!("0x2")), Reply::Result(json!("0x7"))]);
		let nonces = NonceManager::new();
		assert_eq!(nonces.reserve(&rpc, &Address([1; 20])).await.unwrap(), 2);
		assert_eq!(nonces.reserve(&rpc, &Address([2; 20])).await.unwrap(), 7);
	}
}
