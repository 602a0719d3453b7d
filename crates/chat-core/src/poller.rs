use std::sync::Arc;

use protocol::{JobStatus, StatusReply};
use tracing::debug;

use crate::registry::JobRegistry;
use crate::session::SessionStore;

/// Client-facing read side of the job registry.
pub struct StatusPoller {
    sessions: Arc<SessionStore>,
    jobs: Arc<JobRegistry>,
}

impl StatusPoller {
    pub fn new(sessions: Arc<SessionStore>, jobs: Arc<JobRegistry>) -> Self {
        Self { sessions, jobs }
    }

    /// Report a job's status. The first poll that sees a finished job
    /// consumes it; a completed reply is appended to the conversation that
    /// dispatched it at that moment.
    pub fn poll(&self, request_id: &str) -> StatusReply {
        let Some(job) = self.jobs.take(request_id) else {
            debug!(request_id, "poll: not found");
            return StatusReply::not_found();
        };
        debug!(request_id, status = ?job.status, "poll");

        match job.status {
            JobStatus::Processing => StatusReply::processing(),
            JobStatus::Complete => {
                if let (Some(reply), Some(conv)) = (job.reply, self.sessions.get(&job.session_id)) {
                    conv.lock().push_assistant(reply);
                }
                StatusReply::complete(job.message.unwrap_or_default())
            }
            JobStatus::Error => StatusReply::error(job.message.unwrap_or_default()),
            JobStatus::NotFound => StatusReply::not_found(),
        }
    }
}
