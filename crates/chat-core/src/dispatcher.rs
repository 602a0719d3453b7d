use std::sync::Arc;

use protocol::{DispatchAck, StatusReply};
use tracing::{info, warn};

use crate::error::DispatchError;
use crate::render::markdown_to_html;
use crate::worker::{generate, CompletionJob, JobContext, JobFailure, WorkerPool, APOLOGY};

/// Accepts user messages and hands them to the worker pool.
pub struct Dispatcher {
    ctx: Arc<JobContext>,
    pool: WorkerPool,
}

pub fn generate_request_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

impl Dispatcher {
    pub fn new(ctx: Arc<JobContext>, pool: WorkerPool) -> Self {
        Self { ctx, pool }
    }

    /// Record the message and queue its completion. Returns as soon as the
    /// job is queued; the outcome is only visible through polling.
    ///
    /// A caller-supplied `request_id` is used as-is unless blank; otherwise
    /// one is generated.
    pub fn dispatch(
        &self,
        session_id: &str,
        text: &str,
        request_id: Option<String>,
    ) -> Result<DispatchAck, DispatchError> {
        if text.trim().is_empty() {
            return Err(DispatchError::EmptyMessage);
        }
        let request_id = request_id
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .unwrap_or_else(generate_request_id);

        // Reserve and register before touching history so a rejected
        // dispatch leaves the conversation unchanged.
        let permit = self.pool.try_reserve()?;
        self.ctx.jobs.register(&request_id, session_id)?;

        let job = self.capture(session_id, text, &request_id);
        let summarize = job.summarize;
        permit.send(job);

        // Shutdown may have drained the queue between reserve and send.
        if self.pool.is_shut_down() {
            if let Some(conv) = self.ctx.sessions.get(session_id) {
                conv.lock().end_summary(&request_id);
            }
            self.ctx.jobs.fail(&request_id, APOLOGY);
        }

        info!(request_id = %request_id, session = %session_id, summarize, "message dispatched");
        Ok(DispatchAck::processing(request_id))
    }

    /// Answer inline instead of through the job queue. The reply is folded
    /// into the conversation before returning.
    pub async fn respond_now(&self, session_id: &str, text: &str) -> Result<StatusReply, DispatchError> {
        if text.trim().is_empty() {
            return Err(DispatchError::EmptyMessage);
        }
        if self.pool.is_shut_down() {
            return Err(DispatchError::ShutDown);
        }

        let request_id = generate_request_id();
        let job = self.capture(session_id, text, &request_id);
        let timeout = self.pool.config().job_timeout;

        let outcome = tokio::time::timeout(timeout, generate(&self.ctx, &job))
            .await
            .unwrap_or(Err(JobFailure::TimedOut(timeout)));

        let conversation = self.ctx.sessions.get(session_id);
        if let Some(conv) = &conversation {
            conv.lock().end_summary(&request_id);
        }

        match outcome {
            Ok(reply) => {
                let html = markdown_to_html(&reply);
                if let Some(conv) = conversation {
                    conv.lock().push_assistant(reply);
                }
                Ok(StatusReply::complete(html))
            }
            Err(failure) => {
                warn!(session = %session_id, error = %failure, "inline completion failed");
                Ok(StatusReply::error(APOLOGY))
            }
        }
    }

    /// Append the user message and take the dispatch-time snapshot.
    fn capture(&self, session_id: &str, text: &str, request_id: &str) -> CompletionJob {
        let conversation = self.ctx.sessions.get_or_create(session_id);
        let mut conv = conversation.lock();
        conv.push_user(text);
        let summarize = conv.needs_summary() && conv.begin_summary(request_id);
        CompletionJob {
            request_id: request_id.to_string(),
            session_id: session_id.to_string(),
            snapshot: conv.snapshot(),
            summarize,
        }
    }
}
