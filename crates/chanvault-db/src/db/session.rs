use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{PgPool, Postgres};

use chanvault_core::models::CredentialSession;

use crate::traits::SessionStore;

/// Single-slot credential store. One row per deployment; the payload is an
/// opaque blob handed unmodified to the message-source client.
#[derive(Clone)]
pub struct SessionRepository {
    pool: PgPool,
}

impl SessionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionStore for SessionRepository {
    async fn load(&self, slot: &str) -> Result<Option<CredentialSession>> {
        sqlx::query_as::<Postgres, CredentialSession>(
            "SELECT slot, payload, created_at, updated_at FROM sessions WHERE slot = $1",
        )
        .bind(slot)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to load credential session")
    }

    async fn save(&self, slot: &str, payload: &[u8]) -> Result<()> {
        // Last-write-wins; authentication is a rare operator-triggered
        // event, never concurrent with itself.
        sqlx::query(
            r#"
            INSERT INTO sessions (slot, payload)
            VALUES ($1, $2)
            ON CONFLICT (slot) DO UPDATE SET
                payload = EXCLUDED.payload,
                updated_at = NOW()
            "#,
        )
        .bind(slot)
        .bind(payload)
        .execute(&self.pool)
        .await
        .context("Failed to save credential session")?;

        tracing::info!(slot = %slot, "Credential session saved");
        Ok(())
    }

    async fn invalidate(&self, slot: &str) -> Result<()> {
        sqlx::query("DELETE FROM sessions WHERE slot = $1")
            .bind(slot)
            .execute(&self.pool)
            .await
            .context("Failed to invalidate credential session")?;

        tracing::warn!(slot = %slot, "Credential session invalidated");
        Ok(())
    }
}
