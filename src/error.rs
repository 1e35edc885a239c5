//! Error types for the permit relayer

use crate::relay::RelayPhase;

use ethers::types::{Address, Bytes, H256};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

/// Everything needed to reconcile a chain call by hand: who sent what, where.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TxContext {
    pub chain_id: u64,
    pub signer: Address,
    pub to: Address,
    pub calldata: Bytes,
    pub tx_hash: Option<H256>,
}

impl std::fmt::Display for TxContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "chain={} signer={:?} to={:?} calldata={}",
            self.chain_id, self.signer, self.to, self.calldata
        )?;
        if let Some(hash) = self.tx_hash {
            write!(f, " tx={:?}", hash)?;
        }
        Ok(())
    }
}

/// Main error type for the relayer
#[derive(Error, Debug)]
pub enum RelayerError {
    #[error("value must be 0, got {value:?}")]
    InvalidAmount { value: Option<String> },

    #[error("unsupported chain={chain_id}")]
    UnsupportedChain { chain_id: u64 },

    #[error("toAddress must be {expected:?}, got {actual}")]
    AddressMismatch { expected: Address, actual: String },

    #[error("Malformed calldata: {0}")]
    MalformedCalldata(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Transaction rejected ({context}): {message}")]
    SubmissionRejected {
        context: Box<TxContext>,
        message: String,
    },

    #[error("Timed out after {waited_secs}s waiting for inclusion ({context})")]
    InclusionTimeout {
        context: Box<TxContext>,
        waited_secs: u64,
    },

    #[error("Transaction reverted in block {block_number:?} ({context})")]
    Reverted {
        context: Box<TxContext>,
        block_number: Option<u64>,
    },

    #[error("Relay {task_id} failed at {phase}: {source}")]
    RelayFailed {
        task_id: Uuid,
        phase: RelayPhase,
        #[source]
        source: Box<RelayerError>,
    },

    #[error("Task {id} not found")]
    TaskNotFound { id: Uuid },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Chain connection error for chain {chain_id}: {message}")]
    ChainConnection { chain_id: u64, message: String },

    #[error("Wallet error: {0}")]
    Wallet(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl RelayerError {
    /// Request was rejected before any chain I/O
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            RelayerError::InvalidAmount { .. }
                | RelayerError::UnsupportedChain { .. }
                | RelayerError::AddressMismatch { .. }
                | RelayerError::MalformedCalldata(_)
                | RelayerError::InvalidArgument(_)
        )
    }

    /// The node or the chain refused the transaction
    pub fn is_chain_failure(&self) -> bool {
        match self {
            RelayerError::SubmissionRejected { .. }
            | RelayerError::InclusionTimeout { .. }
            | RelayerError::Reverted { .. }
            | RelayerError::ChainConnection { .. } => true,
            RelayerError::RelayFailed { source, .. } => source.is_chain_failure(),
            _ => false,
        }
    }

    /// Stable machine-readable name, used in HTTP error bodies and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            RelayerError::InvalidAmount { .. } => "InvalidAmount",
            RelayerError::UnsupportedChain { .. } => "UnsupportedChain",
            RelayerError::AddressMismatch { .. } => "AddressMismatch",
            RelayerError::MalformedCalldata(_) => "MalformedCalldata",
            RelayerError::InvalidArgument(_) => "InvalidArgument",
            RelayerError::SubmissionRejected { .. } => "SubmissionRejected",
            RelayerError::InclusionTimeout { .. } => "InclusionTimeout",
            RelayerError::Reverted { .. } => "Reverted",
            RelayerError::RelayFailed { source, .. } => source.kind(),
            RelayerError::TaskNotFound { .. } => "TaskNotFound",
            RelayerError::Config(_) => "Config",
            RelayerError::Database(_) => "Database",
            RelayerError::ChainConnection { .. } => "ChainConnection",
            RelayerError::Wallet(_) => "Wallet",
            RelayerError::Serialization(_) => "Serialization",
            RelayerError::Io(_) => "Io",
            RelayerError::Internal(_) => "Internal",
        }
    }

    /// Reconciliation details of the failed chain call, if any
    pub fn tx_context(&self) -> Option<&TxContext> {
        match self {
            RelayerError::SubmissionRejected { context, .. }
            | RelayerError::InclusionTimeout { context, .. }
            | RelayerError::Reverted { context, .. } => Some(context),
            RelayerError::RelayFailed { source, .. } => source.tx_context(),
            _ => None,
        }
    }
}

/// Result type for relayer operations
pub type RelayerResult<T> = Result<T, RelayerError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> TxContext {
        TxContext {
            chain_id: 5,
            signer: Address::repeat_byte(0x11),
            to: Address::repeat_byte(0x22),
            calldata: Bytes::from(vec![0xd5, 0x05, 0xac, 0xcf]),
            tx_hash: None,
        }
    }

    #[test]
    fn test_validation_errors_are_classified() {
        assert!(RelayerError::InvalidAmount { value: None }.is_validation());
        assert!(RelayerError::UnsupportedChain { chain_id: 9 }.is_validation());
        assert!(RelayerError::MalformedCalldata("x".into()).is_validation());
        assert!(!RelayerError::Internal("x".into()).is_validation());
    }

    #[test]
    fn test_relay_failed_exposes_source() {
        let err = RelayerError::RelayFailed {
            task_id: Uuid::new_v4(),
            phase: RelayPhase::PermitSubmitted,
            source: Box::new(RelayerError::Reverted {
                context: Box::new(context()),
                block_number: Some(42),
            }),
        };

        assert!(err.is_chain_failure());
        assert!(!err.is_validation());
        assert_eq!(err.kind(), "Reverted");
        assert_eq!(err.tx_context().map(|c| c.chain_id), Some(5));
    }

    #[test]
    fn test_context_display_names_signer_and_target() {
        let rendered = context().to_string();
        assert!(rendered.contains("chain=5"));
        assert!(rendered.contains("calldata=0xd505accf"));
    }
}
