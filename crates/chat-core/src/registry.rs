use std::collections::HashMap;
use std::time::Duration;

use parking_lot::Mutex;
use protocol::JobStatus;
use tokio::time::Instant;

use crate::error::RegistryError;

struct JobEntry {
    session_id: String,
    status: JobStatus,
    message: Option<String>,
    reply: Option<String>,
    finished: Option<Instant>,
}

/// Copy of a job handed out by [`JobRegistry::take`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSnapshot {
    pub request_id: String,
    pub session_id: String,
    pub status: JobStatus,
    /// Rendered HTML for complete jobs, apology text for failed ones.
    pub message: Option<String>,
    /// Raw assistant text, folded back into the owning conversation.
    pub reply: Option<String>,
}

/// Status of every in-flight or unconsumed background completion.
///
/// Each method holds the lock for its whole read-modify-write, so a job
/// can be observed as terminal by exactly one caller of `take`.
#[derive(Default)]
pub struct JobRegistry {
    jobs: Mutex<HashMap<String, JobEntry>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, request_id: &str, session_id: &str) -> Result<(), RegistryError> {
        let mut jobs = self.jobs.lock();
        if jobs.contains_key(request_id) {
            return Err(RegistryError::Duplicate(request_id.to_string()));
        }
        jobs.insert(
            request_id.to_string(),
            JobEntry {
                session_id: session_id.to_string(),
                status: JobStatus::Processing,
                message: None,
                reply: None,
                finished: None,
            },
        );
        Ok(())
    }

    /// Mark a processing job complete. Returns false if the job is unknown
    /// or already finished.
    pub fn complete(&self, request_id: &str, html: String, reply: String) -> bool {
        self.finish(request_id, JobStatus::Complete, html, Some(reply))
    }

    pub fn fail(&self, request_id: &str, message: impl Into<String>) -> bool {
        self.finish(request_id, JobStatus::Error, message.into(), None)
    }

    fn finish(&self, request_id: &str, status: JobStatus, message: String, reply: Option<String>) -> bool {
        let mut jobs = self.jobs.lock();
        match jobs.get_mut(request_id) {
            Some(entry) if entry.status == JobStatus::Processing => {
                entry.status = status;
                entry.message = Some(message);
                entry.reply = reply;
                entry.finished = Some(Instant::now());
                true
            }
            _ => false,
        }
    }

    /// Read a job; terminal jobs are removed in the same step.
    pub fn take(&self, request_id: &str) -> Option<JobSnapshot> {
        let mut jobs = self.jobs.lock();
        let status = jobs.get(request_id)?.status;

        if status.is_terminal() {
            let entry = jobs.remove(request_id)?;
            Some(JobSnapshot {
                request_id: request_id.to_string(),
                session_id: entry.session_id,
                status: entry.status,
                message: entry.message,
                reply: entry.reply,
            })
        } else {
            let entry = jobs.get(request_id)?;
            Some(JobSnapshot {
                request_id: request_id.to_string(),
                session_id: entry.session_id.clone(),
                status: entry.status,
                message: None,
                reply: None,
            })
        }
    }

    pub fn status(&self, request_id: &str) -> Option<JobStatus> {
        self.jobs.lock().get(request_id).map(|e| e.status)
    }

    pub fn contains(&self, request_id: &str) -> bool {
        self.jobs.lock().contains_key(request_id)
    }

    /// Drop finished jobs nobody polled within `max_age`.
    pub fn evict_stale(&self, max_age: Duration) -> usize {
        let mut jobs = self.jobs.lock();
        let before = jobs.len();
        jobs.retain(|_, entry| match entry.finished {
            Some(at) => at.elapsed() < max_age,
            None => true,
        });
        before - jobs.len()
    }

    pub fn len(&self) -> usize {
        self.jobs.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.lock().is_empty()
    }
}
