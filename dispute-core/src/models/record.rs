use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A row of the `disputes` table: one enriched dispute plus its current status.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct DisputeRecord {
    pub id: i64,
    pub dispute_id: String,
    pub customer_id: Option<String>,
    pub txn_id: Option<String>,
    pub description: String,
    pub predicted_category: String,
    pub confidence: f32,
    pub explanation: String,
    pub explanation_fallback: bool,
    pub suggested_action: String,
    pub justification: String,
    pub justification_fallback: bool,
    pub status: String,
    pub created_at: Option<DateTime<Utc>>,
}

/// A row of the append-only `dispute_history` table.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct StatusChangeRecord {
    pub id: i64,
    pub dispute_id: String,
    pub field_changed: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub timestamp: DateTime<Utc>,
}
