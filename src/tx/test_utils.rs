//! In-process submitter that records every call

use super::{MinedTx, SignerRole, SubmittedTx, TransactionSubmitter, TxRequest};
use crate::chain::ChainEndpoint;
use crate::error::{RelayerError, RelayerResult, TxContext};

use async_trait::async_trait;
use ethers::types::{Address, H256, U256};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// A submission the fake received
#[derive(Debug, Clone)]
pub struct RecordedSubmission {
    pub role: SignerRole,
    pub chain_id: u64,
    pub request: TxRequest,
}

/// Where the fake should fail, if anywhere
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailAt {
    Never,
    /// Reject the n-th submit call (0-based)
    Submit(usize),
    /// Revert the n-th awaited transaction (0-based)
    Inclusion(usize),
}

/// Pretends every transaction is broadcast and mined immediately
pub struct RecordingSubmitter {
    fee_payer: Address,
    spender: Address,
    fail_at: FailAt,
    next_nonce: AtomicU64,
    submissions: Mutex<Vec<RecordedSubmission>>,
    awaited: Mutex<Vec<H256>>,
}

impl RecordingSubmitter {
    pub fn new(fail_at: FailAt) -> Self {
        Self {
            fee_payer: Address::repeat_byte(0xfe),
            spender: Address::repeat_byte(0xbb),
            fail_at,
            next_nonce: AtomicU64::new(0),
            submissions: Mutex::new(Vec::new()),
            awaited: Mutex::new(Vec::new()),
        }
    }

    pub fn submissions(&self) -> Vec<RecordedSubmission> {
        self.submissions.lock().unwrap().clone()
    }

    pub fn awaited(&self) -> Vec<H256> {
        self.awaited.lock().unwrap().clone()
    }

    fn context(&self, role: SignerRole, chain_id: u64, request: &TxRequest) -> Box<TxContext> {
        Box::new(TxContext {
            chain_id,
            signer: self.signer_address(role),
            to: request.to,
            calldata: request.data.clone(),
            tx_hash: None,
        })
    }
}

#[async_trait]
impl TransactionSubmitter for RecordingSubmitter {
    fn signer_address(&self, role: SignerRole) -> Address {
        match role {
            SignerRole::FeePayer => self.fee_payer,
            SignerRole::Spender => self.spender,
        }
    }

    async fn submit(
        &self,
        role: SignerRole,
        endpoint: &ChainEndpoint,
        request: &TxRequest,
    ) -> RelayerResult<SubmittedTx> {
        let index = {
            let mut submissions = self.submissions.lock().unwrap();
            submissions.push(RecordedSubmission {
                role,
                chain_id: endpoint.chain_id,
                request: request.clone(),
            });
            submissions.len() - 1
        };

        if self.fail_at == FailAt::Submit(index) {
            return Err(RelayerError::SubmissionRejected {
                context: self.context(role, endpoint.chain_id, request),
                message: "insufficient funds for gas * price + value".to_string(),
            });
        }

        let nonce = self.next_nonce.fetch_add(1, Ordering::SeqCst);
        Ok(SubmittedTx {
            chain_id: endpoint.chain_id,
            hash: H256::from_low_u64_be(index as u64 + 1),
            from: self.signer_address(role),
            to: request.to,
            nonce,
            gas_limit: U256::from(60_000),
            gas_price: None,
            max_fee_per_gas: Some(U256::from(30)),
            max_priority_fee_per_gas: Some(U256::from(2)),
            data: request.data.clone(),
            value: U256::zero(),
            tx_type: if request.tx_type.is_some() { 0 } else { 2 },
        })
    }

    async fn await_inclusion(
        &self,
        endpoint: &ChainEndpoint,
        submitted: &SubmittedTx,
    ) -> RelayerResult<MinedTx> {
        let index = {
            let mut awaited = self.awaited.lock().unwrap();
            awaited.push(submitted.hash);
            awaited.len() - 1
        };

        if self.fail_at == FailAt::Inclusion(index) {
            return Err(RelayerError::Reverted {
                context: Box::new(TxContext {
                    chain_id: endpoint.chain_id,
                    signer: submitted.from,
                    to: submitted.to,
                    calldata: submitted.data.clone(),
                    tx_hash: Some(submitted.hash),
                }),
                block_number: Some(100 + index as u64),
            });
        }

        Ok(MinedTx {
            chain_id: endpoint.chain_id,
            hash: submitted.hash,
            block_number: 100 + index as u64,
            from: submitted.from,
            to: Some(submitted.to),
            gas_used: Some(U256::from(50_000)),
            effective_gas_price: Some(U256::from(20)),
            status: 1,
        })
    }
}
