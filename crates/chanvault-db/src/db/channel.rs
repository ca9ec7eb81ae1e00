use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{PgPool, Postgres};

use chanvault_core::models::Channel;

use crate::traits::ChannelStore;

const CHANNEL_COLUMNS: &str = "id, name, handle, last_scanned_message_id, is_active, added_at";

#[derive(Clone)]
pub struct ChannelRepository {
    pool: PgPool,
}

impl ChannelRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ChannelStore for ChannelRepository {
    async fn list(&self, active_only: bool) -> Result<Vec<Channel>> {
        let where_sql = if active_only { "WHERE is_active" } else { "" };
        let query = format!(
            "SELECT {CHANNEL_COLUMNS} FROM channels {where_sql} ORDER BY added_at DESC"
        );

        sqlx::query_as::<Postgres, Channel>(&query)
            .fetch_all(&self.pool)
            .await
            .context("Failed to list channels")
    }

    async fn get(&self, id: i64) -> Result<Option<Channel>> {
        let query = format!("SELECT {CHANNEL_COLUMNS} FROM channels WHERE id = $1");
        sqlx::query_as::<Postgres, Channel>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch channel")
    }

    async fn upsert(&self, id: i64, name: Option<&str>, handle: Option<&str>) -> Result<Channel> {
        // Re-adding a soft-deleted channel reactivates it; the cursor is
        // preserved so history is not re-scanned.
        let query = format!(
            r#"
            INSERT INTO channels (id, name, handle)
            VALUES ($1, $2, $3)
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                handle = EXCLUDED.handle,
                is_active = TRUE
            RETURNING {CHANNEL_COLUMNS}
            "#
        );

        let channel = sqlx::query_as::<Postgres, Channel>(&query)
            .bind(id)
            .bind(name)
            .bind(handle)
            .fetch_one(&self.pool)
            .await
            .context("Failed to upsert channel")?;

        tracing::info!(channel_id = id, name = ?name, "Channel registered");
        Ok(channel)
    }

    async fn deactivate(&self, id: i64) -> Result<()> {
        let result = sqlx::query("UPDATE channels SET is_active = FALSE WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to deactivate channel")?;
        if result.rows_affected() == 0 {
            return Err(chanvault_core::PipelineError::ChannelNotFound(id).into());
        }

        tracing::info!(channel_id = id, "Channel deactivated");
        Ok(())
    }

    async fn advance_cursor(&self, id: i64, position: i64) -> Result<()> {
        // GREATEST keeps the cursor monotonic even under a concurrent
        // manual scan racing the periodic one.
        sqlx::query(
            r#"
            UPDATE channels
            SET last_scanned_message_id = GREATEST(last_scanned_message_id, $2)
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(position)
        .execute(&self.pool)
        .await
        .context("Failed to advance channel cursor")?;

        tracing::debug!(channel_id = id, position, "Cursor advanced");
        Ok(())
    }
}
