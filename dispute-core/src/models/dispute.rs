use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::{Category, Enrichment};

/// One row of the batch input: the unit of work for the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dispute {
    pub dispute_id: String,
    pub customer_id: Option<String>,
    pub txn_id: Option<String>,
    /// Raw customer text. May be empty; empty input is classified as-is.
    pub description: String,
    pub created_at: Option<DateTime<Utc>>,
}

impl Dispute {
    pub fn new(dispute_id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            dispute_id: dispute_id.into(),
            customer_id: None,
            txn_id: None,
            description: description.into(),
            created_at: None,
        }
    }
}

/// Pipeline output for a single dispute.
///
/// `suggested_action` always comes from the resolution rule table for
/// `category`; only `explanation` and `justification` are generated.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnrichedDispute {
    pub dispute: Dispute,
    pub category: Category,
    pub confidence: f32,
    pub explanation: Enrichment,
    pub suggested_action: String,
    pub justification: Enrichment,
    pub status: DisputeStatus,
}

/// Lifecycle state of a persisted dispute. Only this field mutates after load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DisputeStatus {
    #[default]
    Open,
    InReview,
    Resolved,
    Closed,
}

impl DisputeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "OPEN",
            Self::InReview => "IN_REVIEW",
            Self::Resolved => "RESOLVED",
            Self::Closed => "CLOSED",
        }
    }

    /// Unresolved means anything other than RESOLVED or CLOSED.
    pub fn is_unresolved(&self) -> bool {
        matches!(self, Self::Open | Self::InReview)
    }
}

impl fmt::Display for DisputeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown dispute status: {0:?} (expected OPEN, IN_REVIEW, RESOLVED or CLOSED)")]
pub struct UnknownStatus(pub String);

impl FromStr for DisputeStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "OPEN" => Ok(Self::Open),
            "IN_REVIEW" => Ok(Self::InReview),
            "RESOLVED" => Ok(Self::Resolved),
            "CLOSED" => Ok(Self::Closed),
            _ => Err(UnknownStatus(s.to_string())),
        }
    }
}
