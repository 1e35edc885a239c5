//! JSON-RPC connection to one chain

use super::ChainEndpoint;
use crate::config::TxEncoding;
use crate::error::{RelayerError, RelayerResult};

use ethers::prelude::*;
use ethers::providers::{Http, Provider};
use ethers::types::transaction::eip2718::TypedTransaction;
use std::time::Duration;
use tracing::debug;

/// HTTP provider bound to a registered chain
pub struct ChainProvider {
    endpoint: ChainEndpoint,
    http: Provider<Http>,
}

impl ChainProvider {
    /// Create a new chain provider. No request is made until first use.
    pub fn new(endpoint: ChainEndpoint, poll_interval: Duration) -> RelayerResult<Self> {
        let http = Provider::<Http>::try_from(endpoint.rpc_url.as_str())
            .map_err(|e| RelayerError::ChainConnection {
                chain_id: endpoint.chain_id,
                message: format!("Invalid RPC URL {}: {}", endpoint.rpc_url, e),
            })?
            .interval(poll_interval);

        debug!(
            "Added HTTP provider for chain {}: {}",
            endpoint.chain_id, endpoint.rpc_url
        );

        Ok(Self { endpoint, http })
    }

    pub fn http(&self) -> &Provider<Http> {
        &self.http
    }

    /// Current gas price in the shape the transaction envelope needs
    pub async fn get_gas_price(&self, encoding: TxEncoding) -> RelayerResult<GasPrice> {
        match encoding {
            TxEncoding::Legacy => {
                let price = self
                    .http
                    .get_gas_price()
                    .await
                    .map_err(|e| self.connection_error(e))?;
                Ok(GasPrice::Legacy(price))
            }
            TxEncoding::Eip1559 => {
                let (max_fee_per_gas, max_priority_fee_per_gas) = self
                    .http
                    .estimate_eip1559_fees(None)
                    .await
                    .map_err(|e| self.connection_error(e))?;
                Ok(GasPrice::Eip1559 {
                    max_fee_per_gas,
                    max_priority_fee_per_gas,
                })
            }
        }
    }

    /// Next nonce for `address`, counting transactions still in the mempool
    pub async fn get_transaction_count(&self, address: Address) -> RelayerResult<u64> {
        let count = self
            .http
            .get_transaction_count(address, Some(BlockNumber::Pending.into()))
            .await
            .map_err(|e| self.connection_error(e))?;
        Ok(count.as_u64())
    }

    /// Estimate gas; a revert here surfaces as the raw provider error
    pub async fn estimate_gas(&self, tx: &TypedTransaction) -> Result<U256, ProviderError> {
        self.http.estimate_gas(tx, None).await
    }

    fn connection_error(&self, e: impl std::fmt::Display) -> RelayerError {
        RelayerError::ChainConnection {
            chain_id: self.endpoint.chain_id,
            message: e.to_string(),
        }
    }
}

/// Gas price types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GasPrice {
    Legacy(U256),
    Eip1559 {
        max_fee_per_gas: U256,
        max_priority_fee_per_gas: U256,
    },
}
