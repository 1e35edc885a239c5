//! In-memory task store

use super::{RelayTask, TaskStore};
use crate::error::{RelayerError, RelayerResult};

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use uuid::Uuid;

/// Keeps tasks for the life of the process; per-key locking via `DashMap`
#[derive(Debug, Default)]
pub struct InMemoryTaskStore {
    tasks: DashMap<Uuid, RelayTask>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn create(&self, task: &RelayTask) -> RelayerResult<Uuid> {
        if self.tasks.contains_key(&task.id) {
            return Err(RelayerError::Internal(format!(
                "Task {} already exists",
                task.id
            )));
        }
        self.tasks.insert(task.id, task.clone());
        Ok(task.id)
    }

    async fn get(&self, id: Uuid) -> RelayerResult<RelayTask> {
        self.tasks
            .get(&id)
            .map(|t| t.clone())
            .ok_or(RelayerError::TaskNotFound { id })
    }

    async fn update(&self, task: &RelayTask) -> RelayerResult<()> {
        let mut stored = self
            .tasks
            .get_mut(&task.id)
            .ok_or(RelayerError::TaskNotFound { id: task.id })?;
        *stored = task.clone();
        stored.updated_at = Utc::now();
        Ok(())
    }

    async fn health_check(&self) -> RelayerResult<()> {
        Ok(())
    }
}
