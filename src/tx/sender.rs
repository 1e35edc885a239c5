//! ethers-backed transaction submitter

use super::gas::GasEstimator;
use super::nonce::NonceManager;
use super::signer::{RelaySigners, SignerRole};
use super::{MinedTx, SubmittedTx, TransactionSubmitter, TxRequest};
use crate::chain::{ChainEndpoint, ChainProvider, ChainRegistry, GasPrice};
use crate::config::{RelayConfig, TxEncoding};
use crate::error::{RelayerError, RelayerResult, TxContext};

use async_trait::async_trait;
use ethers::prelude::*;
use ethers::signers::{LocalWallet, Signer};
use ethers::types::transaction::eip2718::TypedTransaction;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Submits transactions over JSON-RPC with locally signed raw transactions
pub struct EthersSubmitter {
    /// One provider per registered chain
    providers: HashMap<u64, Arc<ChainProvider>>,
    signers: RelaySigners,
    nonce_manager: NonceManager,
    gas_estimator: GasEstimator,
    config: RelayConfig,
}

impl EthersSubmitter {
    /// Create providers for every chain in the registry
    pub fn new(
        registry: &ChainRegistry,
        signers: RelaySigners,
        config: RelayConfig,
    ) -> RelayerResult<Self> {
        let poll_interval = Duration::from_millis(config.poll_interval_ms);
        let mut providers = HashMap::new();
        for endpoint in registry.endpoints() {
            let provider = ChainProvider::new(endpoint.clone(), poll_interval)?;
            providers.insert(endpoint.chain_id, Arc::new(provider));
        }

        info!(
            "Transaction submitter ready for {} chains (fee payer {:?}, spender {:?})",
            providers.len(),
            signers.address(SignerRole::FeePayer),
            signers.address(SignerRole::Spender)
        );

        Ok(Self {
            providers,
            signers,
            nonce_manager: NonceManager::new(),
            gas_estimator: GasEstimator::new(),
            config,
        })
    }

    fn provider(&self, chain_id: u64) -> RelayerResult<&Arc<ChainProvider>> {
        self.providers
            .get(&chain_id)
            .ok_or(RelayerError::UnsupportedChain { chain_id })
    }

    /// Assemble an unsigned transaction in the requested envelope
    fn build_tx(
        chain_id: u64,
        from: Address,
        request: &TxRequest,
        gas_price: &GasPrice,
    ) -> TypedTransaction {
        match request.tx_type.unwrap_or_default() {
            TxEncoding::Legacy => {
                let price = match gas_price {
                    GasPrice::Legacy(price) => *price,
                    GasPrice::Eip1559 { max_fee_per_gas, .. } => *max_fee_per_gas,
                };
                let tx = TransactionRequest::new()
                    .from(from)
                    .to(request.to)
                    .data(request.data.clone())
                    .value(U256::zero())
                    .gas_price(price)
                    .chain_id(chain_id);
                TypedTransaction::Legacy(tx)
            }
            TxEncoding::Eip1559 => {
                let mut tx = Eip1559TransactionRequest::new()
                    .from(from)
                    .to(request.to)
                    .data(request.data.clone())
                    .value(U256::zero())
                    .chain_id(chain_id);
                tx = match gas_price {
                    GasPrice::Eip1559 {
                        max_fee_per_gas,
                        max_priority_fee_per_gas,
                    } => tx
                        .max_fee_per_gas(*max_fee_per_gas)
                        .max_priority_fee_per_gas(*max_priority_fee_per_gas),
                    GasPrice::Legacy(price) => {
                        tx.max_fee_per_gas(*price).max_priority_fee_per_gas(*price)
                    }
                };
                TypedTransaction::Eip1559(tx)
            }
        }
    }

    async fn sign(wallet: &LocalWallet, tx: &TypedTransaction) -> Result<(Bytes, H256), String> {
        let signature = wallet
            .sign_transaction(tx)
            .await
            .map_err(|e| e.to_string())?;
        Ok((tx.rlp_signed(&signature), tx.hash(&signature)))
    }
}

#[async_trait]
impl TransactionSubmitter for EthersSubmitter {
    fn signer_address(&self, role: SignerRole) -> Address {
        self.signers.address(role)
    }

    async fn submit(
        &self,
        role: SignerRole,
        endpoint: &ChainEndpoint,
        request: &TxRequest,
    ) -> RelayerResult<SubmittedTx> {
        let chain_id = endpoint.chain_id;
        let provider = self.provider(chain_id)?;
        let wallet = self.signers.wallet(role).clone().with_chain_id(chain_id);
        let from = wallet.address();
        let mut context = TxContext {
            chain_id,
            signer: from,
            to: request.to,
            calldata: request.data.clone(),
            tx_hash: None,
        };
        let rejected = |context: &TxContext, message: String| RelayerError::SubmissionRejected {
            context: Box::new(context.clone()),
            message,
        };

        // Gas first: a revert at estimation must not consume a nonce
        let encoding = request.tx_type.unwrap_or_default();
        let gas_price = provider
            .get_gas_price(encoding)
            .await
            .map_err(|e| rejected(&context, format!("gas price lookup failed: {}", e)))?;
        let gas_price = self.gas_estimator.buffered_price(gas_price);
        let mut tx = Self::build_tx(chain_id, from, request, &gas_price);
        let estimated = provider
            .estimate_gas(&tx)
            .await
            .map_err(|e| rejected(&context, format!("gas estimation failed: {}", e)))?;
        let gas_limit = self.gas_estimator.buffered_limit(estimated);
        tx.set_gas(gas_limit);

        let nonce = self
            .nonce_manager
            .allocate(chain_id, from, || provider.get_transaction_count(from))
            .await
            .map_err(|e| rejected(&context, format!("nonce lookup failed: {}", e)))?;
        tx.set_nonce(nonce);

        let (raw, hash) = match Self::sign(&wallet, &tx).await {
            Ok(signed) => signed,
            Err(e) => {
                self.nonce_manager.release(chain_id, from, nonce).await;
                return Err(rejected(&context, format!("signing failed: {}", e)));
            }
        };
        context.tx_hash = Some(hash);

        debug!(
            "Broadcasting {} transaction {:?} on chain {} (nonce {}, gas {})",
            role, hash, chain_id, nonce, gas_limit
        );

        if let Err(e) = provider.http().send_raw_transaction(raw).await {
            let message = e.to_string();
            if message.contains("nonce too low") {
                warn!("Nonce too low for {:?} on chain {}, resyncing", from, chain_id);
                self.nonce_manager.resync(chain_id, from).await;
            } else {
                self.nonce_manager.release(chain_id, from, nonce).await;
            }
            return Err(rejected(&context, message));
        }

        info!(
            "Transaction sent: {:?} on chain {} by {} {:?}",
            hash, chain_id, role, from
        );

        let (legacy_price, max_fee, priority_fee) = match gas_price {
            GasPrice::Legacy(price) => (Some(price), None, None),
            GasPrice::Eip1559 {
                max_fee_per_gas,
                max_priority_fee_per_gas,
            } => (None, Some(max_fee_per_gas), Some(max_priority_fee_per_gas)),
        };

        Ok(SubmittedTx {
            chain_id,
            hash,
            from,
            to: request.to,
            nonce,
            gas_limit,
            gas_price: legacy_price,
            max_fee_per_gas: max_fee,
            max_priority_fee_per_gas: priority_fee,
            data: request.data.clone(),
            value: U256::zero(),
            tx_type: match encoding {
                TxEncoding::Legacy => 0,
                TxEncoding::Eip1559 => 2,
            },
        })
    }

    async fn await_inclusion(
        &self,
        endpoint: &ChainEndpoint,
        submitted: &SubmittedTx,
    ) -> RelayerResult<MinedTx> {
        let chain_id = endpoint.chain_id;
        let provider = self.provider(chain_id)?;
        let context = || {
            Box::new(TxContext {
                chain_id,
                signer: submitted.from,
                to: submitted.to,
                calldata: submitted.data.clone(),
                tx_hash: Some(submitted.hash),
            })
        };

        let pending = PendingTransaction::new(submitted.hash, provider.http())
            .interval(Duration::from_millis(self.config.poll_interval_ms))
            .confirmations(self.config.confirmations.max(1));

        let started = Instant::now();
        let waited_secs = self.config.inclusion_timeout_secs;
        let receipt = match timeout(Duration::from_secs(waited_secs), pending).await {
            Err(_) => {
                warn!(
                    "Transaction {:?} not mined on chain {} after {}s",
                    submitted.hash, chain_id, waited_secs
                );
                return Err(RelayerError::InclusionTimeout {
                    context: context(),
                    waited_secs,
                });
            }
            // Already broadcast: report it as unconfirmed, with the hash
            Ok(Err(e)) => {
                warn!(
                    "Lost track of {:?} on chain {}: {}",
                    submitted.hash, chain_id, e
                );
                return Err(RelayerError::InclusionTimeout {
                    context: context(),
                    waited_secs: started.elapsed().as_secs(),
                });
            }
            Ok(Ok(None)) => {
                warn!(
                    "Transaction {:?} dropped on chain {}, resyncing nonce for {:?}",
                    submitted.hash, chain_id, submitted.from
                );
                self.nonce_manager.resync(chain_id, submitted.from).await;
                return Err(RelayerError::SubmissionRejected {
                    context: context(),
                    message: "transaction dropped from mempool".to_string(),
                })
            }
            Ok(Ok(Some(receipt))) => receipt,
        };

        let block_number = receipt.block_number.map(|b| b.as_u64());
        let status = receipt.status.map(|s| s.as_u64()).unwrap_or(1);
        if status == 0 {
            warn!(
                "Transaction {:?} reverted on chain {} in block {:?}",
                submitted.hash, chain_id, block_number
            );
            return Err(RelayerError::Reverted {
                context: context(),
                block_number,
            });
        }

        debug!(
            "Transaction {:?} mined on chain {} in block {:?}",
            submitted.hash, chain_id, block_number
        );

        Ok(MinedTx {
            chain_id,
            hash: receipt.transaction_hash,
            block_number: block_number.unwrap_or_default(),
            from: receipt.from,
            to: receipt.to,
            gas_used: receipt.gas_used,
            effective_gas_price: receipt.effective_gas_price,
            status,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{routing::post, Json, Router};
    use serde_json::{json, Value};

    const FEE_PAYER_KEY: &str =
        "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
    const SPENDER_KEY: &str = "0x59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d";

    fn submitter(rpc_url: &str) -> (EthersSubmitter, ChainEndpoint) {
        let endpoint = ChainEndpoint {
            chain_id: 5,
            name: "Goerli".to_string(),
            rpc_url: rpc_url.to_string(),
            permit_address: Address::repeat_byte(0x22),
            tx_encoding: TxEncoding::Eip1559,
        };
        let registry = ChainRegistry::new(vec![endpoint.clone()]).unwrap();
        let signers = RelaySigners::new(
            FEE_PAYER_KEY.parse().unwrap(),
            SPENDER_KEY.parse().unwrap(),
        )
        .unwrap();
        let config = RelayConfig {
            inclusion_timeout_secs: 1,
            confirmations: 1,
            poll_interval_ms: 20,
        };
        (EthersSubmitter::new(&registry, signers, config).unwrap(), endpoint)
    }

    fn broadcast(from: Address, nonce: u64) -> SubmittedTx {
        SubmittedTx {
            chain_id: 5,
            hash: H256::repeat_byte(0x99),
            from,
            to: Address::repeat_byte(0x22),
            nonce,
            gas_limit: U256::from(60_000),
            gas_price: None,
            max_fee_per_gas: Some(U256::from(30)),
            max_priority_fee_per_gas: Some(U256::from(2)),
            data: Bytes::from(vec![0xd5, 0x05, 0xac, 0xcf]),
            value: U256::zero(),
            tx_type: 2,
        }
    }

    /// JSON-RPC node that knows no transactions
    async fn spawn_empty_node() -> String {
        async fn rpc(Json(request): Json<Value>) -> Json<Value> {
            Json(json!({ "jsonrpc": "2.0", "id": request["id"].clone(), "result": null }))
        }

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, Router::new().route("/", post(rpc)))
                .await
                .unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_unreachable_node_rejects_with_context() {
        let (submitter, endpoint) = submitter("http://127.0.0.1:1");

        let err = submitter
            .submit(SignerRole::FeePayer, &endpoint, &request(None))
            .await
            .unwrap_err();

        assert!(matches!(err, RelayerError::SubmissionRejected { .. }));
        let context = err.tx_context().unwrap();
        assert_eq!(context.chain_id, 5);
        assert_eq!(context.signer, submitter.signer_address(SignerRole::FeePayer));
        assert_eq!(context.to, Address::repeat_byte(0x22));
        assert_eq!(context.calldata, request(None).data);
        assert!(context.tx_hash.is_none());
    }

    #[tokio::test]
    async fn test_unreachable_node_while_waiting_keeps_tx_hash() {
        let (submitter, endpoint) = submitter("http://127.0.0.1:1");
        let submitted = broadcast(submitter.signer_address(SignerRole::Spender), 3);

        let err = submitter
            .await_inclusion(&endpoint, &submitted)
            .await
            .unwrap_err();

        assert!(matches!(err, RelayerError::InclusionTimeout { .. }));
        assert!(err.is_chain_failure());
        let context = err.tx_context().unwrap();
        assert_eq!(context.tx_hash, Some(submitted.hash));
        assert_eq!(context.signer, submitted.from);
    }

    #[tokio::test]
    async fn test_dropped_transaction_resyncs_nonce() {
        let url = spawn_empty_node().await;
        let (submitter, endpoint) = submitter(&url);
        let from = submitter.signer_address(SignerRole::FeePayer);

        let nonce = submitter
            .nonce_manager
            .allocate(5, from, || async { Ok::<_, RelayerError>(41) })
            .await
            .unwrap();
        assert_eq!(nonce, 41);

        let err = submitter
            .await_inclusion(&endpoint, &broadcast(from, nonce))
            .await
            .unwrap_err();
        assert!(matches!(err, RelayerError::SubmissionRejected { .. }));
        assert_eq!(
            err.tx_context().unwrap().tx_hash,
            Some(H256::repeat_byte(0x99))
        );

        // The gap is not kept: the next allocation re-reads the node
        let next = submitter
            .nonce_manager
            .allocate(5, from, || async { Ok::<_, RelayerError>(41) })
            .await
            .unwrap();
        assert_eq!(next, 41);
    }

    fn request(tx_type: Option<TxEncoding>) -> TxRequest {
        TxRequest {
            to: Address::repeat_byte(0x22),
            data: Bytes::from(vec![0x23, 0xb8, 0x72, 0xdd]),
            tx_type,
        }
    }

    #[test]
    fn test_legacy_override_builds_legacy_envelope() {
        let price = GasPrice::Legacy(U256::from(7));
        let tx = EthersSubmitter::build_tx(
            1442,
            Address::repeat_byte(0x11),
            &request(Some(TxEncoding::Legacy)),
            &price,
        );

        match tx {
            TypedTransaction::Legacy(inner) => {
                assert_eq!(inner.gas_price, Some(U256::from(7)));
                assert_eq!(inner.chain_id.map(|c| c.as_u64()), Some(1442));
            }
            other => panic!("expected legacy transaction, got {:?}", other),
        }
    }

    #[test]
    fn test_default_envelope_is_eip1559() {
        let price = GasPrice::Eip1559 {
            max_fee_per_gas: U256::from(30),
            max_priority_fee_per_gas: U256::from(2),
        };
        let tx = EthersSubmitter::build_tx(5, Address::repeat_byte(0x11), &request(None), &price);

        match tx {
            TypedTransaction::Eip1559(inner) => {
                assert_eq!(inner.max_fee_per_gas, Some(U256::from(30)));
                assert_eq!(inner.max_priority_fee_per_gas, Some(U256::from(2)));
                assert_eq!(inner.to, Some(NameOrAddress::Address(Address::repeat_byte(0x22))));
            }
            other => panic!("expected EIP-1559 transaction, got {:?}", other),
        }
    }
}
