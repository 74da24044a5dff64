//! REST API types for frontend integration.

use serde::Serialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::models::EventId;
use crate::reconcile::UploadOutcome;

/// Response sent after an upload has been reconciled and installed.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    /// Unique job identifier
    pub job_id: String,

    /// Status: "ready" when every row became a candidate, "warning" when
    /// some rows were skipped
    pub status: String,

    /// Event the candidates were installed for
    pub event_id: EventId,

    /// The reconciliation outcome
    #[serde(flatten)]
    pub outcome: UploadOutcome,
}

impl UploadResponse {
    pub fn from_outcome(event_id: impl Into<EventId>, outcome: UploadOutcome) -> Self {
        let status = if outcome.skipped.is_empty() {
            "ready"
        } else {
            "warning"
        };
        Self {
            job_id: Uuid::new_v4().to_string(),
            status: status.to_string(),
            event_id: event_id.into(),
            outcome,
        }
    }
}

/// Optional body for the convert endpoint.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConvertRequest {
    /// Area to record instead of the candidate's own.
    #[serde(default)]
    pub area: Option<String>,
}

/// Create an error response body naming the violated constraint.
pub fn error_response(error: &str) -> Value {
    json!({
        "status": "error",
        "error": error,
    })
}
