//! Tagged requests accepted from callers outside the coordinator.
//!
//! Requests arrive as JSON objects with an `action` tag. The set of actions is
//! closed; anything else is rejected at parse time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::MirrorError;
use crate::reconcile::{PassReport, ReconciliationCoordinator, ReconciliationOutcome};
use crate::records::WorkItem;
use crate::source::SourceService;
use crate::target::TargetService;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum MirrorRequest {
    /// Runs a pass against `targetId`, or the selected target when absent.
    StartSync {
        #[serde(rename = "targetId", default)]
        target_id: Option<String>,
    },
    /// Refreshes the outstanding view without dispatching.
    Compare {
        #[serde(rename = "targetId", default)]
        target_id: Option<String>,
    },
    GetOutstanding,
    GetStatus,
    SelectTarget {
        #[serde(rename = "targetId")]
        target_id: String,
    },
    Cancel,
}

impl MirrorRequest {
    pub fn parse(json: &str) -> Result<Self, MirrorError> {
        serde_json::from_str(json).map_err(|e| MirrorError::InvalidRequest(e.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum MirrorResponse {
    Pass {
        report: PassReport,
    },
    #[serde(rename_all = "camelCase")]
    Outstanding {
        items: Vec<WorkItem>,
        is_reconciling: bool,
    },
    #[serde(rename_all = "camelCase")]
    Status {
        selected_target: Option<String>,
        last_outcome: Option<ReconciliationOutcome>,
        last_attempted_at: Option<DateTime<Utc>>,
        is_reconciling: bool,
    },
    Ack,
    Error {
        message: String,
    },
}

/// Executes one request against the coordinator.
pub async fn handle<T: TargetService, U: SourceService>(
    coordinator: &ReconciliationCoordinator<T, U>,
    request: MirrorRequest,
) -> MirrorResponse {
    match request {
        MirrorRequest::StartSync { target_id } => {
            let report = match target_id {
                Some(id) => coordinator.reconcile(coordinator.mode(), &id).await,
                None => coordinator.trigger_reconciliation().await,
            };
            MirrorResponse::Pass { report }
        }
        MirrorRequest::Compare { target_id } => {
            let Some(id) = target_id.or_else(|| coordinator.selected_target()) else {
                return MirrorResponse::Error {
                    message: MirrorError::NoTarget.to_string(),
                };
            };
            match coordinator.refresh(&id).await {
                Ok(items) => MirrorResponse::Outstanding {
                    items,
                    is_reconciling: coordinator.is_reconciling(),
                },
                Err(e) => MirrorResponse::Error {
                    message: e.to_string(),
                },
            }
        }
        MirrorRequest::GetOutstanding => MirrorResponse::Outstanding {
            items: coordinator.current_outstanding_items(),
            is_reconciling: coordinator.is_reconciling(),
        },
        MirrorRequest::GetStatus => MirrorResponse::Status {
            selected_target: coordinator.selected_target(),
            last_outcome: coordinator.last_outcome(),
            last_attempted_at: coordinator.last_attempted_at(),
            is_reconciling: coordinator.is_reconciling(),
        },
        MirrorRequest::SelectTarget { target_id } => {
            coordinator.select_target(&target_id);
            MirrorResponse::Ack
        }
        MirrorRequest::Cancel => {
            coordinator.cancel();
            MirrorResponse::Ack
        }
    }
}

/// Parses and executes a raw JSON request. Invalid input becomes an `Error` response.
pub async fn handle_json<T: TargetService, U: SourceService>(
    coordinator: &ReconciliationCoordinator<T, U>,
    json: &str,
) -> MirrorResponse {
    match MirrorRequest::parse(json) {
        Ok(request) => handle(coordinator, request).await,
        Err(e) => {
            warn!(error = %e, "rejected request");
            MirrorResponse::Error {
                message: e.to_string(),
            }
        }
    }
}
