//! Relay executor
//!
//! Validates a relay request, then submits the user's permit from the fee
//! payer and, once it is mined, a `transferFrom(owner, spender, value)` from
//! the spender. Each step is recorded on the task before moving on, so a
//! failed relay leaves a record of how far it got.

use super::{RelayPhase, RelayRequest, RelayResult};
use crate::chain::{ChainEndpoint, ChainRegistry};
use crate::codec::{self, DecodedPermit};
use crate::config::TxEncoding;
use crate::error::{RelayerError, RelayerResult};
use crate::metrics;
use crate::store::{RelayTask, SubTransaction, TaskStatus, TaskStore, TxCall, TxPhase};
use crate::tx::{MinedTx, SignerRole, TransactionSubmitter, TxRequest};

use ethers::types::{Bytes, U256};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, instrument, warn};

/// A request that passed validation, with everything the relay needs
#[derive(Debug, Clone)]
struct ValidatedRelay {
    endpoint: ChainEndpoint,
    permit_calldata: Bytes,
    permit: DecodedPermit,
}

/// A failed phase: the last state reached and the chain error
type PhaseFailure = (RelayPhase, RelayerError);

pub struct RelayExecutor {
    registry: Arc<ChainRegistry>,
    submitter: Arc<dyn TransactionSubmitter>,
    store: Arc<dyn TaskStore>,
}

impl RelayExecutor {
    pub fn new(
        registry: Arc<ChainRegistry>,
        submitter: Arc<dyn TransactionSubmitter>,
        store: Arc<dyn TaskStore>,
    ) -> Self {
        Self {
            registry,
            submitter,
            store,
        }
    }

    pub fn store(&self) -> &Arc<dyn TaskStore> {
        &self.store
    }

    /// Run a relay to completion.
    ///
    /// Validation errors are returned as-is, before any chain call or store
    /// write. Once a task exists, chain errors come back wrapped in
    /// `RelayFailed` carrying the task id and the last state reached.
    #[instrument(skip(self, request), fields(chain_id = request.chain_id))]
    pub async fn execute_relay(&self, request: RelayRequest) -> RelayerResult<RelayResult> {
        let validated = match self.validate(&request) {
            Ok(validated) => validated,
            Err(e) => {
                metrics::record_relay_rejected(request.chain_id, e.kind());
                return Err(e);
            }
        };
        let ValidatedRelay {
            endpoint,
            permit_calldata,
            permit,
        } = validated;
        let chain_id = endpoint.chain_id;
        let started = Instant::now();
        metrics::record_relay_accepted(chain_id);

        let spender = self.submitter.signer_address(SignerRole::Spender);
        if permit.spender != spender {
            warn!(
                "Permit spender {:?} is not the relay spender {:?}; transferFrom will revert",
                permit.spender, spender
            );
        }

        let mut task = RelayTask::pending_permit(permit.owner, request);
        self.store.create(&task).await?;
        info!(
            "Accepted relay {} for owner {} on chain {}",
            task.id, task.user_address, chain_id
        );

        task.status = TaskStatus::Running;
        self.persist(&task).await;

        let tx_type = endpoint.tx_type_override();
        let transfer_calldata =
            codec::encode_transfer_from(permit.owner, permit.spender, permit.value);

        let permit_receipt = match self
            .run_phase(
                &mut task,
                &endpoint,
                TxPhase::Permit,
                SignerRole::FeePayer,
                permit_calldata,
                tx_type,
            )
            .await
        {
            Ok(receipt) => receipt,
            Err((phase, e)) => return Err(self.fail(task, phase, e, started).await),
        };

        let transfer_receipt = match self
            .run_phase(
                &mut task,
                &endpoint,
                TxPhase::Transfer,
                SignerRole::Spender,
                transfer_calldata,
                tx_type,
            )
            .await
        {
            Ok(receipt) => receipt,
            Err((phase, e)) => return Err(self.fail(task, phase, e, started).await),
        };

        task.status = TaskStatus::Success;
        self.persist(&task).await;
        metrics::record_relay_completed(chain_id, started.elapsed().as_secs_f64());

        info!(
            "Relay {} complete: permit {:?}, transfer {:?}",
            task.id, permit_receipt.hash, transfer_receipt.hash
        );

        Ok(RelayResult {
            task_id: task.id,
            permit_tx_receipt: permit_receipt,
            transfer_tx_receipt: transfer_receipt,
        })
    }

    /// Check amount, chain, target address and calldata, in that order.
    /// No I/O happens here.
    fn validate(&self, request: &RelayRequest) -> RelayerResult<ValidatedRelay> {
        let zero_value = request
            .value
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .and_then(|v| U256::from_dec_str(v).ok())
            .map_or(false, |v| v.is_zero());
        if !zero_value {
            return Err(RelayerError::InvalidAmount {
                value: request.value.clone(),
            });
        }

        let endpoint = self.registry.resolve(request.chain_id)?;

        let address_mismatch = || RelayerError::AddressMismatch {
            expected: endpoint.permit_address,
            actual: request.to_address.clone(),
        };
        let to_address = codec::parse_address(&request.to_address).map_err(|_| address_mismatch())?;
        if to_address != endpoint.permit_address {
            return Err(address_mismatch());
        }

        let permit_calldata = codec::parse_calldata(&request.calldata)?;
        let permit = codec::decode_permit(&permit_calldata)?;

        Ok(ValidatedRelay {
            endpoint: endpoint.clone(),
            permit_calldata,
            permit,
        })
    }

    /// Submit one transaction to the permit contract and wait for it,
    /// recording each step on the task
    async fn run_phase(
        &self,
        task: &mut RelayTask,
        endpoint: &ChainEndpoint,
        phase: TxPhase,
        role: SignerRole,
        data: Bytes,
        tx_type: Option<TxEncoding>,
    ) -> Result<MinedTx, PhaseFailure> {
        let (before_submit, submitted_state, confirmed_state) = match phase {
            TxPhase::Permit => (
                RelayPhase::Validated,
                RelayPhase::PermitSubmitted,
                RelayPhase::PermitConfirmed,
            ),
            TxPhase::Transfer => (
                RelayPhase::PermitConfirmed,
                RelayPhase::TransferSubmitted,
                RelayPhase::TransferConfirmed,
            ),
        };

        let request = TxRequest {
            to: endpoint.permit_address,
            data: data.clone(),
            tx_type,
        };
        task.task_data.tasks.push(SubTransaction::new(
            phase,
            TxCall {
                from: self.submitter.signer_address(role),
                to: endpoint.permit_address,
                data,
            },
        ));

        let submitted = match self.submitter.submit(role, endpoint, &request).await {
            Ok(submitted) => submitted,
            Err(e) => {
                record_error(task, phase, &e);
                return Err((before_submit, e));
            }
        };
        debug!("Relay {} is {} ({:?})", task.id, submitted_state, submitted.hash);
        metrics::record_tx_submitted(endpoint.chain_id, role);
        if let Some(entry) = task.entry_mut(phase) {
            entry.submitted = Some(submitted.clone());
        }
        self.persist(task).await;

        let mined = match self.submitter.await_inclusion(endpoint, &submitted).await {
            Ok(mined) => mined,
            Err(e) => {
                record_error(task, phase, &e);
                return Err((submitted_state, e));
            }
        };
        debug!(
            "Relay {} is {} (block {})",
            task.id, confirmed_state, mined.block_number
        );
        if let Some(entry) = task.entry_mut(phase) {
            entry.mined = Some(mined.clone());
        }
        self.persist(task).await;

        Ok(mined)
    }

    async fn fail(
        &self,
        mut task: RelayTask,
        phase: RelayPhase,
        source: RelayerError,
        started: Instant,
    ) -> RelayerError {
        error!("Relay {} failed after {}: {}", task.id, phase, source);

        task.status = TaskStatus::Failed;
        self.persist(&task).await;
        metrics::record_relay_failed(
            task.task_data.relayer_request.chain_id,
            source.kind(),
            started.elapsed().as_secs_f64(),
        );

        RelayerError::RelayFailed {
            task_id: task.id,
            phase,
            source: Box::new(source),
        }
    }

    /// The chain is authoritative once I/O has begun, so a failed write is
    /// logged and the relay carries on.
    async fn persist(&self, task: &RelayTask) {
        if let Err(e) = self.store.update(task).await {
            error!("Failed to persist relay task {}: {}", task.id, e);
        }
    }
}

fn record_error(task: &mut RelayTask, phase: TxPhase, error: &RelayerError) {
    if let Some(entry) = task.entry_mut(phase) {
        entry.error = Some(error.to_string());
    }
}
