//! Transaction submission module with nonce management and gas estimation

mod gas;
mod nonce;
mod sender;
mod signer;

#[cfg(test)]
pub mod test_utils;

pub use sender::EthersSubmitter;
pub use signer::{RelaySigners, SignerRole};

use crate::chain::ChainEndpoint;
use crate::config::TxEncoding;
use crate::error::RelayerResult;

use async_trait::async_trait;
use ethers::types::{Address, Bytes, H256, U256};
use serde::{Deserialize, Serialize};

/// What to send; the submitter fills in nonce, gas and signature
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxRequest {
    pub to: Address,
    pub data: Bytes,
    /// Forces an envelope; `None` means EIP-1559
    pub tx_type: Option<TxEncoding>,
}

/// Snapshot of a broadcast transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmittedTx {
    pub chain_id: u64,
    pub hash: H256,
    pub from: Address,
    pub to: Address,
    pub nonce: u64,
    pub gas_limit: U256,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gas_price: Option<U256>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_fee_per_gas: Option<U256>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_priority_fee_per_gas: Option<U256>,
    pub data: Bytes,
    pub value: U256,
    /// 0 for legacy, 2 for EIP-1559
    pub tx_type: u8,
}

/// Snapshot of a mined transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MinedTx {
    pub chain_id: u64,
    pub hash: H256,
    pub block_number: u64,
    pub from: Address,
    pub to: Option<Address>,
    pub gas_used: Option<U256>,
    pub effective_gas_price: Option<U256>,
    pub status: u64,
}

/// Sign, broadcast and await inclusion. No retries at this layer.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TransactionSubmitter: Send + Sync {
    /// Address of the identity playing `role`
    fn signer_address(&self, role: SignerRole) -> Address;

    /// Broadcast `request` signed by `role` on the endpoint's chain
    async fn submit(
        &self,
        role: SignerRole,
        endpoint: &ChainEndpoint,
        request: &TxRequest,
    ) -> RelayerResult<SubmittedTx>;

    /// Block until `submitted` is mined, reverted, or the timeout passes
    async fn await_inclusion(
        &self,
        endpoint: &ChainEndpoint,
        submitted: &SubmittedTx,
    ) -> RelayerResult<MinedTx>;
}
