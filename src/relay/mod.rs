//! Permit relay: request and result types plus the executor that drives
//! the permit and transferFrom transactions.

mod executor;

pub use executor::RelayExecutor;

use crate::tx::MinedTx;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Body of `POST /send-tx`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayRequest {
    pub chain_id: u64,
    /// Must name the chain's permit contract
    pub to_address: String,
    /// Hex-encoded `permit` call
    pub calldata: String,
    /// Native value; only `"0"` is accepted
    #[serde(default)]
    pub value: Option<String>,
    /// Recorded with the task, not acted upon
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fee: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fee_token: Option<String>,
}

/// Response of a relay where both transactions were mined
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayResult {
    pub task_id: Uuid,
    pub permit_tx_receipt: MinedTx,
    pub transfer_tx_receipt: MinedTx,
}

/// How far a relay got. `Failed` can follow any non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RelayPhase {
    Validated,
    PermitSubmitted,
    PermitConfirmed,
    TransferSubmitted,
    TransferConfirmed,
    Failed,
}

impl RelayPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelayPhase::Validated => "validated",
            RelayPhase::PermitSubmitted => "permit-submitted",
            RelayPhase::PermitConfirmed => "permit-confirmed",
            RelayPhase::TransferSubmitted => "transfer-submitted",
            RelayPhase::TransferConfirmed => "transfer-confirmed",
            RelayPhase::Failed => "failed",
        }
    }
}

impl std::fmt::Display for RelayPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_accepts_camel_case_and_optional_fields() {
        let request: RelayRequest = serde_json::from_str(
            r#"{"chainId":5,"toAddress":"0xabc","calldata":"0xd505accf","value":"0"}"#,
        )
        .unwrap();

        assert_eq!(request.chain_id, 5);
        assert_eq!(request.to_address, "0xabc");
        assert_eq!(request.value.as_deref(), Some("0"));
        assert!(request.fee.is_none());

        let request: RelayRequest =
            serde_json::from_str(r#"{"chainId":5,"toAddress":"0xabc","calldata":"0x"}"#).unwrap();
        assert!(request.value.is_none());
    }

    #[test]
    fn test_phase_names() {
        assert_eq!(RelayPhase::PermitSubmitted.to_string(), "permit-submitted");
        assert_eq!(
            serde_json::to_value(RelayPhase::TransferConfirmed).unwrap(),
            "transferConfirmed"
        );
    }
}
