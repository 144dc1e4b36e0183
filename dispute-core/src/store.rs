//! Postgres persistence for enriched disputes and their status history.
//!
//! The store owns status transitions after the initial load; the pipeline
//! is never re-run when a status changes.

use sqlx::PgPool;
use thiserror::Error;
use tracing::info;

use crate::models::{
    DisputeRecord, DisputeStatus, EnrichedDispute, StatusChangeRecord, UnknownStatus,
};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("dispute not found: {dispute_id}")]
    NotFound { dispute_id: String },

    #[error(transparent)]
    InvalidStatus(#[from] UnknownStatus),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

const CREATE_DISPUTES: &str = r#"
CREATE TABLE IF NOT EXISTS disputes (
    id BIGSERIAL PRIMARY KEY,
    dispute_id TEXT UNIQUE NOT NULL,
    customer_id TEXT,
    txn_id TEXT,
    description TEXT NOT NULL,
    predicted_category TEXT NOT NULL,
    confidence REAL NOT NULL,
    explanation TEXT NOT NULL,
    explanation_fallback BOOLEAN NOT NULL DEFAULT FALSE,
    suggested_action TEXT NOT NULL,
    justification TEXT NOT NULL,
    justification_fallback BOOLEAN NOT NULL DEFAULT FALSE,
    status TEXT NOT NULL DEFAULT 'OPEN',
    created_at TIMESTAMPTZ
)
"#;

const CREATE_HISTORY: &str = r#"
CREATE TABLE IF NOT EXISTS dispute_history (
    id BIGSERIAL PRIMARY KEY,
    dispute_id TEXT NOT NULL REFERENCES disputes(dispute_id),
    field_changed TEXT NOT NULL,
    old_value TEXT,
    new_value TEXT,
    timestamp TIMESTAMPTZ NOT NULL DEFAULT now()
)
"#;

const CREATE_HISTORY_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS dispute_history_dispute_id_idx ON dispute_history (dispute_id)";

const DISPUTE_COLUMNS: &str = "id, dispute_id, customer_id, txn_id, description, \
     predicted_category, confidence, explanation, explanation_fallback, suggested_action, \
     justification, justification_fallback, status, created_at";

#[derive(Debug, Clone)]
pub struct DisputeStore {
    pool: PgPool,
}

impl DisputeStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create both tables if they do not exist yet.
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        for statement in [CREATE_DISPUTES, CREATE_HISTORY, CREATE_HISTORY_INDEX] {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    /// Insert a batch in one transaction. Rows whose `dispute_id` already
    /// exists are left untouched, so reloading the same batch is a no-op.
    /// Returns the number of new rows.
    pub async fn insert_enriched(&self, batch: &[EnrichedDispute]) -> Result<u64, StoreError> {
        let mut tx = self.pool.begin().await?;
        let mut inserted = 0u64;

        for row in batch {
            let result = sqlx::query(
                r#"
                INSERT INTO disputes (
                    dispute_id, customer_id, txn_id, description, predicted_category,
                    confidence, explanation, explanation_fallback, suggested_action,
                    justification, justification_fallback, status, created_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
                ON CONFLICT (dispute_id) DO NOTHING
                "#,
            )
            .bind(&row.dispute.dispute_id)
            .bind(&row.dispute.customer_id)
            .bind(&row.dispute.txn_id)
            .bind(&row.dispute.description)
            .bind(row.category.as_str())
            .bind(row.confidence)
            .bind(row.explanation.text())
            .bind(row.explanation.is_fallback())
            .bind(&row.suggested_action)
            .bind(row.justification.text())
            .bind(row.justification.is_fallback())
            .bind(row.status.as_str())
            .bind(row.dispute.created_at)
            .execute(&mut *tx)
            .await?;
            inserted += result.rows_affected();
        }

        tx.commit().await?;
        info!(
            inserted,
            skipped = batch.len() as u64 - inserted,
            "stored enriched disputes"
        );
        Ok(inserted)
    }

    /// All disputes, newest `created_at` first.
    pub async fn list(&self) -> Result<Vec<DisputeRecord>, StoreError> {
        let rows = sqlx::query_as::<_, DisputeRecord>(&format!(
            "SELECT {DISPUTE_COLUMNS} FROM disputes ORDER BY created_at DESC NULLS LAST, id"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// All disputes in the order they were loaded.
    pub async fn list_in_load_order(&self) -> Result<Vec<DisputeRecord>, StoreError> {
        let rows = sqlx::query_as::<_, DisputeRecord>(&format!(
            "SELECT {DISPUTE_COLUMNS} FROM disputes ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn get(&self, dispute_id: &str) -> Result<DisputeRecord, StoreError> {
        sqlx::query_as::<_, DisputeRecord>(&format!(
            "SELECT {DISPUTE_COLUMNS} FROM disputes WHERE dispute_id = $1"
        ))
        .bind(dispute_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::NotFound {
            dispute_id: dispute_id.to_string(),
        })
    }

    /// Status changes for one dispute, oldest first.
    pub async fn history(&self, dispute_id: &str) -> Result<Vec<StatusChangeRecord>, StoreError> {
        let rows = sqlx::query_as::<_, StatusChangeRecord>(
            r#"
            SELECT id, dispute_id, field_changed, old_value, new_value, timestamp
            FROM dispute_history
            WHERE dispute_id = $1
            ORDER BY timestamp ASC, id ASC
            "#,
        )
        .bind(dispute_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Set a new status and append exactly one history record, atomically.
    pub async fn update_status(
        &self,
        dispute_id: &str,
        new_status: DisputeStatus,
    ) -> Result<StatusChangeRecord, StoreError> {
        let mut tx = self.pool.begin().await?;

        let current: Option<(String,)> =
            sqlx::query_as("SELECT status FROM disputes WHERE dispute_id = $1 FOR UPDATE")
                .bind(dispute_id)
                .fetch_optional(&mut *tx)
                .await?;
        let Some((old_status,)) = current else {
            return Err(StoreError::NotFound {
                dispute_id: dispute_id.to_string(),
            });
        };

        sqlx::query("UPDATE disputes SET status = $2 WHERE dispute_id = $1")
            .bind(dispute_id)
            .bind(new_status.as_str())
            .execute(&mut *tx)
            .await?;

        let change = sqlx::query_as::<_, StatusChangeRecord>(
            r#"
            INSERT INTO dispute_history (dispute_id, field_changed, old_value, new_value)
            VALUES ($1, 'status', $2, $3)
            RETURNING id, dispute_id, field_changed, old_value, new_value, timestamp
            "#,
        )
        .bind(dispute_id)
        .bind(&old_status)
        .bind(new_status.as_str())
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        info!(dispute_id, old = %old_status, new = %new_status, "dispute status updated");
        Ok(change)
    }

    /// Parse then apply a status given as text; unknown values never reach the database.
    pub async fn update_status_str(
        &self,
        dispute_id: &str,
        new_status: &str,
    ) -> Result<StatusChangeRecord, StoreError> {
        let status: DisputeStatus = new_status.parse()?;
        self.update_status(dispute_id, status).await
    }
}
