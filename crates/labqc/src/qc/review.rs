use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::repository::QcRecordId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewDecision {
    /// The run is valid despite the flags; its values stay in the series history.
    Accepted,
    /// The run is discarded and no longer counts as history for later evaluations.
    Rejected,
}

impl ReviewDecision {
    pub fn label(self) -> &'static str {
        match self {
            ReviewDecision::Accepted => "accepted",
            ReviewDecision::Rejected => "rejected",
        }
    }
}

/// Reviewer input for a flagged run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewRequest {
    pub decision: ReviewDecision,
    pub reviewer: String,
    #[serde(default)]
    pub note: Option<String>,
}

/// Review decision as stored in the review log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewEntry {
    pub record_id: QcRecordId,
    pub decision: ReviewDecision,
    pub reviewer: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub reviewed_at: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ReviewError {
    #[error("reviewer name is required")]
    MissingReviewer,
    #[error("a note explaining the rejection is required")]
    MissingRejectionNote,
    #[error("record {0} has already been reviewed")]
    AlreadyReviewed(QcRecordId),
}

impl ReviewRequest {
    /// Checks the request and turns it into a log entry for `record_id`.
    pub(crate) fn into_entry(
        self,
        record_id: QcRecordId,
        reviewed_at: DateTime<Utc>,
    ) -> Result<ReviewEntry, ReviewError> {
        let reviewer = self.reviewer.trim().to_string();
        if reviewer.is_empty() {
            return Err(ReviewError::MissingReviewer);
        }

        let note = self
            .note
            .map(|note| note.trim().to_string())
            .filter(|note| !note.is_empty());
        if self.decision == ReviewDecision::Rejected && note.is_none() {
            return Err(ReviewError::MissingRejectionNote);
        }

        Ok(ReviewEntry {
            record_id,
            decision: self.decision,
            reviewer,
            note,
            reviewed_at,
        })
    }
}
