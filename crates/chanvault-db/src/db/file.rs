use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{PgPool, Postgres};

use chanvault_core::models::{FileRecord, FileStatus, NewFile};
use chanvault_core::PipelineError;

use crate::traits::{FileStats, FileStore, StatusFilter};

const FILE_COLUMNS: &str = r#"
    id,
    channel_id,
    message_id,
    file_name,
    file_size,
    kind,
    mime_type,
    status,
    bucket,
    object_key,
    retry_count,
    error_message,
    queued_at,
    created_at,
    updated_at
"#;

/// Advisory lock key serializing worker claims.
const CLAIM_LOCK_KEY: i64 = 0x6368_616e_7661_756c; // "chanvaul"

/// File registry over Postgres. The status column is the `file_status`
/// enum; every transition is a conditional update so the state machine
/// holds even across racing operators and process restarts.
#[derive(Clone)]
pub struct FileRepository {
    pool: PgPool,
}

impl FileRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl FileStore for FileRepository {
    #[tracing::instrument(skip(self, file), fields(channel_id = file.channel_id, message_id = file.message_id))]
    async fn insert_discovered(&self, file: NewFile) -> Result<Option<FileRecord>> {
        let query = format!(
            r#"
            INSERT INTO files (
                channel_id, message_id, file_name, file_size, kind, mime_type,
                status, bucket, object_key
            )
            VALUES ($1, $2, $3, $4, $5, $6, 'PENDING', $7, $8)
            ON CONFLICT (channel_id, message_id) DO NOTHING
            RETURNING {FILE_COLUMNS}
            "#
        );

        let inserted: Option<FileRecord> = sqlx::query_as::<Postgres, FileRecord>(&query)
            .bind(file.channel_id)
            .bind(file.message_id)
            .bind(&file.file_name)
            .bind(file.file_size)
            .bind(file.kind)
            .bind(file.mime_type.as_deref())
            .bind(&file.bucket)
            .bind(&file.object_key)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to insert discovered file")?;

        if let Some(ref record) = inserted {
            tracing::debug!(
                file_id = record.id,
                file_name = %record.file_name,
                kind = %record.kind,
                "Registered discovered file"
            );
        }

        Ok(inserted)
    }

    async fn get(&self, id: i64) -> Result<Option<FileRecord>> {
        let query = format!("SELECT {FILE_COLUMNS} FROM files WHERE id = $1");
        sqlx::query_as::<Postgres, FileRecord>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch file")
    }

    async fn list(
        &self,
        filter: StatusFilter,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<FileRecord>> {
        let where_sql = match filter {
            StatusFilter::Status(_) => "status = $3",
            StatusFilter::Active => "status IN ('QUEUED', 'DOWNLOADING', 'UPLOADING')",
            StatusFilter::All => "TRUE",
        };
        let query = format!(
            "SELECT {FILE_COLUMNS} FROM files WHERE {where_sql} \
             ORDER BY created_at DESC, id DESC LIMIT $1 OFFSET $2"
        );

        let mut q = sqlx::query_as::<Postgres, FileRecord>(&query)
            .bind(limit)
            .bind(offset);
        if let StatusFilter::Status(status) = filter {
            q = q.bind(status);
        }

        q.fetch_all(&self.pool).await.context("Failed to list files")
    }

    async fn transition(&self, id: i64, from: FileStatus, to: FileStatus) -> Result<FileRecord> {
        if !from.can_transition(to) {
            return Err(PipelineError::InvalidTransition { file_id: id, from, to }.into());
        }

        let queued_sql = if to == FileStatus::Queued {
            ", queued_at = NOW(), error_message = NULL"
        } else {
            ""
        };
        let query = format!(
            r#"
            UPDATE files
            SET status = $3, updated_at = NOW(){queued_sql}
            WHERE id = $1 AND status = $2
            RETURNING {FILE_COLUMNS}
            "#
        );

        let updated: Option<FileRecord> = sqlx::query_as::<Postgres, FileRecord>(&query)
            .bind(id)
            .bind(from)
            .bind(to)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to update file status")?;

        match updated {
            Some(record) => {
                tracing::debug!(file_id = id, from = %from, to = %to, "File status transition");
                Ok(record)
            }
            None => {
                let current = self.get(id).await?;
                match current {
                    Some(record) => Err(PipelineError::InvalidTransition {
                        file_id: id,
                        from: record.status,
                        to,
                    }
                    .into()),
                    None => Err(PipelineError::FileNotFound(id).into()),
                }
            }
        }
    }

    async fn approve_all(&self) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE files
            SET status = 'QUEUED', queued_at = NOW(), updated_at = NOW()
            WHERE status = 'PENDING'
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to approve pending files")?;

        tracing::info!(approved = result.rows_affected(), "Bulk approval");
        Ok(result.rows_affected())
    }

    #[tracing::instrument(skip(self))]
    async fn claim_next(&self) -> Result<Option<FileRecord>> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin claim transaction")?;

        // Claims serialize on a transaction-scoped advisory lock, which
        // makes the in-flight check below race-free: any claim that
        // committed before us is visible here.
        let (locked,): (bool,) =
            sqlx::query_as("SELECT pg_try_advisory_xact_lock($1)")
                .bind(CLAIM_LOCK_KEY)
                .fetch_one(&mut *tx)
                .await
                .context("Failed to take claim lock")?;
        if !locked {
            tx.commit().await.context("Failed to commit empty claim")?;
            return Ok(None);
        }

        // One file in flight at a time, across all processes.
        let in_flight: Option<(i64,)> = sqlx::query_as(
            "SELECT id FROM files WHERE status IN ('DOWNLOADING', 'UPLOADING') LIMIT 1",
        )
        .fetch_optional(&mut *tx)
        .await
        .context("Failed to check for in-flight files")?;
        if in_flight.is_some() {
            tx.commit().await.context("Failed to commit empty claim")?;
            return Ok(None);
        }

        let select = format!(
            r#"
            SELECT {FILE_COLUMNS}
            FROM files
            WHERE status = 'QUEUED'
            ORDER BY queued_at ASC, id ASC
            LIMIT 1
            FOR UPDATE SKIP LOCKED
            "#
        );
        let candidate: Option<FileRecord> = sqlx::query_as::<Postgres, FileRecord>(&select)
            .fetch_optional(&mut *tx)
            .await
            .context("Failed to fetch next queued file")?;

        let Some(candidate) = candidate else {
            tx.commit().await.context("Failed to commit empty claim")?;
            return Ok(None);
        };

        let update = format!(
            r#"
            UPDATE files
            SET status = 'DOWNLOADING', updated_at = NOW()
            WHERE id = $1
            RETURNING {FILE_COLUMNS}
            "#
        );
        let claimed: FileRecord = sqlx::query_as::<Postgres, FileRecord>(&update)
            .bind(candidate.id)
            .fetch_one(&mut *tx)
            .await
            .context("Failed to claim queued file")?;

        tx.commit().await.context("Failed to commit claim")?;

        tracing::info!(
            file_id = claimed.id,
            file_name = %claimed.file_name,
            "Claimed file for transfer"
        );
        Ok(Some(claimed))
    }

    async fn mark_failed(&self, id: i64, reason: &str) -> Result<FileRecord> {
        let query = format!(
            r#"
            UPDATE files
            SET status = 'FAILED', error_message = $2, updated_at = NOW()
            WHERE id = $1 AND status IN ('DOWNLOADING', 'UPLOADING')
            RETURNING {FILE_COLUMNS}
            "#
        );

        let updated: Option<FileRecord> = sqlx::query_as::<Postgres, FileRecord>(&query)
            .bind(id)
            .bind(reason)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to mark file failed")?;

        updated.ok_or_else(|| PipelineError::FileNotFound(id).into())
    }

    async fn record_attempts(&self, id: i64, attempts: i32) -> Result<()> {
        sqlx::query(
            "UPDATE files SET retry_count = retry_count + $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(attempts)
        .execute(&self.pool)
        .await
        .context("Failed to record transfer attempts")?;
        Ok(())
    }

    async fn reset_stale_inflight(&self) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE files
            SET status = 'QUEUED', updated_at = NOW()
            WHERE status IN ('DOWNLOADING', 'UPLOADING')
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to reset stale in-flight files")?;

        Ok(result.rows_affected())
    }

    async fn stats(&self) -> Result<FileStats> {
        let row: (i64, i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT
                COUNT(*) FILTER (WHERE status = 'PENDING'),
                COUNT(*) FILTER (WHERE status IN ('QUEUED', 'DOWNLOADING', 'UPLOADING')),
                COUNT(*) FILTER (WHERE status = 'COMPLETED'),
                COUNT(*) FILTER (WHERE status = 'FAILED')
            FROM files
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .context("Failed to compute file stats")?;

        Ok(FileStats {
            pending: row.0,
            active: row.1,
            completed: row.2,
            failed: row.3,
        })
    }
}
