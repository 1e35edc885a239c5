//! Nonce management for concurrent submissions from shared signers
//!
//! Handles:
//! - Local nonce tracking per (chain, signer) so concurrent relays never collide
//! - Lazy seeding from the node's pending transaction count
//! - Rewinding after a rejected broadcast and resyncing after "nonce too low"

use crate::error::RelayerResult;

use dashmap::DashMap;
use ethers::types::Address;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Per-account nonce state
#[derive(Debug, Default)]
struct AccountNonceState {
    /// Next nonce to hand out; `None` until seeded from the node
    next: Option<u64>,
}

/// Hands out nonces per (chain_id, signer address)
#[derive(Debug, Default)]
pub struct NonceManager {
    accounts: DashMap<(u64, Address), Arc<Mutex<AccountNonceState>>>,
}

impl NonceManager {
    /// Create a new nonce manager
    pub fn new() -> Self {
        Self::default()
    }

    fn account(&self, chain_id: u64, address: Address) -> Arc<Mutex<AccountNonceState>> {
        self.accounts
            .entry((chain_id, address))
            .or_default()
            .clone()
    }

    /// Allocate the next nonce for an account.
    ///
    /// `fetch` is only called when the account has no local state yet; the
    /// account lock is held across it so concurrent first callers seed once.
    pub async fn allocate<F, Fut>(
        &self,
        chain_id: u64,
        address: Address,
        fetch: F,
    ) -> RelayerResult<u64>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = RelayerResult<u64>>,
    {
        let account = self.account(chain_id, address);
        let mut state = account.lock().await;

        let nonce = match state.next {
            Some(next) => next,
            None => {
                let on_chain = fetch().await?;
                debug!(
                    "Seeded nonce for {:?} on chain {}: {}",
                    address, chain_id, on_chain
                );
                on_chain
            }
        };
        state.next = Some(nonce + 1);

        debug!("Allocated nonce {} for {:?} on chain {}", nonce, address, chain_id);
        Ok(nonce)
    }

    /// Give back a nonce whose transaction never reached the node
    pub async fn release(&self, chain_id: u64, address: Address, nonce: u64) {
        let account = self.account(chain_id, address);
        let mut state = account.lock().await;

        match state.next {
            // Latest allocation, can simply be reused
            Some(next) if next == nonce + 1 => state.next = Some(nonce),
            Some(_) => {
                warn!(
                    "Nonce {} for {:?} on chain {} released out of order, resyncing",
                    nonce, address, chain_id
                );
                state.next = None;
            }
            None => {}
        }
    }

    /// Drop local state so the next allocation re-reads the node
    pub async fn resync(&self, chain_id: u64, address: Address) {
        let account = self.account(chain_id, address);
        account.lock().await.next = None;
        debug!("Nonce state for {:?} on chain {} cleared", address, chain_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio_test::assert_ok;

    fn seed(value: u64) -> impl Future<Output = RelayerResult<u64>> {
        async move { Ok(value) }
    }

    #[tokio::test]
    async fn test_sequential_allocation_starts_at_chain_nonce() {
        let manager = NonceManager::new();
        let signer = Address::repeat_byte(1);

        assert_eq!(assert_ok!(manager.allocate(5, signer, || seed(7)).await), 7);
        assert_eq!(assert_ok!(manager.allocate(5, signer, || seed(0)).await), 8);
        // Other chain, other counter
        assert_eq!(assert_ok!(manager.allocate(100, signer, || seed(3)).await), 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_allocations_are_distinct_and_increasing() {
        let manager = Arc::new(NonceManager::new());
        let signer = Address::repeat_byte(2);
        let fetches = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..64)
            .map(|_| {
                let manager = manager.clone();
                let fetches = fetches.clone();
                tokio::spawn(async move {
                    let mut mine = Vec::new();
                    for _ in 0..4 {
                        let nonce = manager
                            .allocate(5, signer, || {
                                fetches.fetch_add(1, Ordering::SeqCst);
                                seed(10)
                            })
                            .await
                            .unwrap();
                        mine.push(nonce);
                        tokio::task::yield_now().await;
                    }
                    mine
                })
            })
            .collect();

        let mut all = Vec::new();
        for result in futures::future::join_all(handles).await {
            let mine = result.unwrap();
            // Each worker sees its own nonces strictly increasing
            assert!(mine.windows(2).all(|w| w[0] < w[1]));
            all.extend(mine);
        }

        all.sort_unstable();
        let expected: Vec<u64> = (10..10 + 256).collect();
        assert_eq!(all, expected);
        assert_eq!(fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_release_latest_nonce_is_reused() {
        let manager = NonceManager::new();
        let signer = Address::repeat_byte(3);

        let nonce = manager.allocate(5, signer, || seed(4)).await.unwrap();
        manager.release(5, signer, nonce).await;

        assert_eq!(manager.allocate(5, signer, || seed(99)).await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_out_of_order_release_forces_resync() {
        let manager = NonceManager::new();
        let signer = Address::repeat_byte(4);

        let first = manager.allocate(5, signer, || seed(4)).await.unwrap();
        let _second = manager.allocate(5, signer, || seed(4)).await.unwrap();
        manager.release(5, signer, first).await;

        assert_eq!(manager.allocate(5, signer, || seed(6)).await.unwrap(), 6);
    }

    #[tokio::test]
    async fn test_seed_failure_leaves_account_unseeded() {
        let manager = NonceManager::new();
        let signer = Address::repeat_byte(5);

        let failed = manager
            .allocate(5, signer, || async {
                Err(crate::error::RelayerError::Internal("node down".into()))
            })
            .await;
        assert!(failed.is_err());

        assert_eq!(manager.allocate(5, signer, || seed(2)).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_resync_rereads_chain() {
        let manager = NonceManager::new();
        let signer = Address::repeat_byte(6);

        manager.allocate(5, signer, || seed(1)).await.unwrap();
        manager.resync(5, signer).await;

        assert_eq!(manager.allocate(5, signer, || seed(12)).await.unwrap(), 12);
    }
}
