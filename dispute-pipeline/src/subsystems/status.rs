//! `status` and `show` commands.

use dispute_core::{
    models::{DisputeRecord, StatusChangeRecord},
    DisputeStore, StoreError,
};
use serde::Serialize;

/// A stored dispute together with its status history.
#[derive(Debug, Clone, Serialize)]
pub struct DisputeDetail {
    pub dispute: DisputeRecord,
    pub history: Vec<StatusChangeRecord>,
}

/// Apply a status given as text. Unknown statuses and unknown ids are errors.
pub async fn set_status(
    store: &DisputeStore,
    dispute_id: &str,
    status: &str,
) -> Result<StatusChangeRecord, StoreError> {
    store.update_status_str(dispute_id, status).await
}

pub async fn show_dispute(store: &DisputeStore, dispute_id: &str) -> Result<DisputeDetail, StoreError> {
    let dispute = store.get(dispute_id).await?;
    let history = store.history(dispute_id).await?;
    Ok(DisputeDetail { dispute, history })
}
