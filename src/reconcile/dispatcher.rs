use tracing::{info, warn};

use crate::target::{TargetError, TargetService};

const GENERIC_REJECTION: &str = "sync job was rejected by the server";

/// The backend's immediate answer to a start request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchAck {
    Accepted { job_id: Option<String> },
    Rejected { message: String },
}

/// Sends the one-shot "start mirroring" command.
///
/// `Err` means the job never reached the backend (transport, unreadable error
/// status, unreadable body). `Ok(Rejected)` means the backend answered and
/// refused. There is no retry here.
pub struct JobDispatcher<'a, T> {
    target: &'a T,
}

impl<'a, T: TargetService> JobDispatcher<'a, T> {
    pub fn new(target: &'a T) -> Self {
        Self { target }
    }

    pub async fn start_job(&self, token: &str, target_id: &str) -> Result<DispatchAck, TargetError> {
        let response = match self.target.start_sync(token, target_id).await {
            Ok(r) => r,
            Err(e) => {
                warn!(target_id, transport = e.is_transport(), error = %e, "sync dispatch failed");
                return Err(e);
            }
        };

        if response.accepted() {
            info!(target_id, job_id = ?response.job_id, "sync job accepted");
            Ok(DispatchAck::Accepted {
                job_id: response.job_id,
            })
        } else {
            let message = response
                .error
                .filter(|m| !m.trim().is_empty())
                .unwrap_or_else(|| GENERIC_REJECTION.to_string());
            warn!(target_id, %message, "sync job rejected");
            Ok(DispatchAck::Rejected { message })
        }
    }
}
