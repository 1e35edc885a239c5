//! Relay task persistence
//!
//! One record per accepted relay request, holding the original request and
//! an ordered list of sub-transactions (permit, then transfer). Backends:
//! - PostgreSQL for deployments
//! - in-memory when no database is configured, and in tests

mod memory;
mod postgres;

pub use memory::InMemoryTaskStore;
pub use postgres::PgTaskStore;

use crate::error::{RelayerError, RelayerResult};
use crate::relay::RelayRequest;
use crate::tx::{MinedTx, SubmittedTx};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ethers::types::{Address, Bytes};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Success,
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Success => "success",
            TaskStatus::Failed => "failed",
        }
    }
}

impl FromStr for TaskStatus {
    type Err = RelayerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TaskStatus::Pending),
            "running" => Ok(TaskStatus::Running),
            "success" => Ok(TaskStatus::Success),
            "failed" => Ok(TaskStatus::Failed),
            other => Err(RelayerError::Internal(format!("unknown task status {:?}", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestType {
    Permit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxPhase {
    Permit,
    Transfer,
}

/// The call a sub-transaction makes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxCall {
    pub from: Address,
    pub to: Address,
    pub data: Bytes,
}

/// One phase of a relay and how far it got
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubTransaction {
    pub phase: TxPhase,
    pub tx: TxCall,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submitted: Option<SubmittedTx>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mined: Option<MinedTx>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SubTransaction {
    pub fn new(phase: TxPhase, tx: TxCall) -> Self {
        Self {
            phase,
            tx,
            submitted: None,
            mined: None,
            error: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskData {
    pub request_type: RequestType,
    pub relayer_request: RelayRequest,
    pub tasks: Vec<SubTransaction>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayTask {
    pub id: Uuid,
    pub user_address: String,
    pub task_data: TaskData,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RelayTask {
    /// A fresh `pending` permit task for `user`
    pub fn pending_permit(user: Address, request: RelayRequest) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_address: ethers::utils::to_checksum(&user, None),
            task_data: TaskData {
                request_type: RequestType::Permit,
                relayer_request: request,
                tasks: Vec::new(),
            },
            status: TaskStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    #[cfg(test)]
    pub fn entry(&self, phase: TxPhase) -> Option<&SubTransaction> {
        self.task_data.tasks.iter().find(|t| t.phase == phase)
    }

    pub fn entry_mut(&mut self, phase: TxPhase) -> Option<&mut SubTransaction> {
        self.task_data.tasks.iter_mut().find(|t| t.phase == phase)
    }
}

/// Create and point lookup of relay tasks.
///
/// Only the relay executor writes; each task id has a single writer, so
/// backends need per-record isolation and nothing more.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Persist a new task and return its id
    async fn create(&self, task: &RelayTask) -> RelayerResult<Uuid>;

    async fn get(&self, id: Uuid) -> RelayerResult<RelayTask>;

    /// Overwrite an existing task; bumps `updated_at`
    async fn update(&self, task: &RelayTask) -> RelayerResult<()>;

    async fn health_check(&self) -> RelayerResult<()>;
}
