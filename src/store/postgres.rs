//! PostgreSQL task store

use super::{RelayTask, TaskData, TaskStore};
use crate::config::DatabaseConfig;
use crate::error::{RelayerError, RelayerResult};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::types::Json;
use sqlx::Row;
use tracing::{debug, info};
use uuid::Uuid;

/// Task store backed by the `tx_task` table
pub struct PgTaskStore {
    pool: PgPool,
}

impl PgTaskStore {
    /// Connect a pool using the database settings
    pub async fn new(config: &DatabaseConfig) -> RelayerResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .connect(&config.url)
            .await?;

        Ok(Self { pool })
    }

    /// Create the schema if it does not exist yet
    pub async fn run_migrations(&self) -> RelayerResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS tx_task (
                id UUID PRIMARY KEY,
                user_address VARCHAR(100) NOT NULL,
                task_data JSONB NOT NULL,
                status VARCHAR(20) NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_tx_task_user_address
            ON tx_task (user_address)
            "#,
        )
        .execute(&self.pool)
        .await?;

        info!("Database migrations complete");
        Ok(())
    }

    fn task_from_row(row: PgRow) -> RelayerResult<RelayTask> {
        let status: String = row.try_get("status")?;
        let Json(task_data): Json<TaskData> = row.try_get("task_data")?;

        Ok(RelayTask {
            id: row.try_get("id")?,
            user_address: row.try_get("user_address")?,
            task_data,
            status: status.parse()?,
            created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
            updated_at: row.try_get::<DateTime<Utc>, _>("updated_at")?,
        })
    }
}

#[async_trait]
impl TaskStore for PgTaskStore {
    async fn create(&self, task: &RelayTask) -> RelayerResult<Uuid> {
        sqlx::query(
            r#"
            INSERT INTO tx_task (id, user_address, task_data, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(task.id)
        .bind(&task.user_address)
        .bind(Json(&task.task_data))
        .bind(task.status.as_str())
        .bind(task.created_at)
        .bind(task.updated_at)
        .execute(&self.pool)
        .await?;

        debug!("Created task {} for {}", task.id, task.user_address);
        Ok(task.id)
    }

    async fn get(&self, id: Uuid) -> RelayerResult<RelayTask> {
        let row = sqlx::query(
            r#"
            SELECT id, user_address, task_data, status, created_at, updated_at
            FROM tx_task
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(RelayerError::TaskNotFound { id })?;

        Self::task_from_row(row)
    }

    async fn update(&self, task: &RelayTask) -> RelayerResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE tx_task
            SET user_address = $2, task_data = $3, status = $4, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(task.id)
        .bind(&task.user_address)
        .bind(Json(&task.task_data))
        .bind(task.status.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RelayerError::TaskNotFound { id: task.id });
        }

        debug!("Updated task {} to {}", task.id, task.status.as_str());
        Ok(())
    }

    async fn health_check(&self) -> RelayerResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::RelayRequest;
    use crate::store::TaskStatus;
    use ethers::types::Address;

    /// Needs a disposable database: `TEST_DATABASE_URL=postgres://... cargo test -- --ignored`
    #[tokio::test]
    #[ignore]
    async fn test_postgres_round_trip() {
        let url = std::env::var("TEST_DATABASE_URL").expect("TEST_DATABASE_URL");
        let store = PgTaskStore::new(&DatabaseConfig {
            enabled: true,
            url,
            max_connections: 2,
            min_connections: 1,
        })
        .await
        .unwrap();
        store.run_migrations().await.unwrap();
        store.health_check().await.unwrap();

        let mut task = RelayTask::pending_permit(
            Address::repeat_byte(0xaa),
            RelayRequest {
                chain_id: 5,
                to_address: "0x00000000000000000000000000000000000000aa".to_string(),
                calldata: "0xd505accf".to_string(),
                value: Some("0".to_string()),
                fee: Some("1".to_string()),
                fee_token: None,
            },
        );
        let id = store.create(&task).await.unwrap();

        task.status = TaskStatus::Failed;
        store.update(&task).await.unwrap();

        let stored = store.get(id).await.unwrap();
        assert_eq!(stored.status, TaskStatus::Failed);
        assert_eq!(stored.task_data, task.task_data);

        assert!(matches!(
            store.get(Uuid::new_v4()).await,
            Err(RelayerError::TaskNotFound { .. })
        ));
    }
}
