use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::history::{assemble_prompt, Message};
use crate::ports::{CompletionPort, SummarizerPort};
use crate::registry::JobRegistry;
use crate::render::markdown_to_html;
use crate::session::SessionStore;
use crate::summarize::summarize_history;

/// Fixed user-facing text stored for any failed completion.
pub const APOLOGY: &str = "Sorry, I couldn't get a response right now. Please try again in a moment.";

#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub workers: usize,
    pub queue_capacity: usize,
    pub job_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            queue_capacity: 64,
            job_timeout: Duration::from_secs(60),
        }
    }
}

/// One queued unit of work: everything the completion step needs, captured
/// at dispatch time.
#[derive(Debug, Clone)]
pub struct CompletionJob {
    pub request_id: String,
    pub session_id: String,
    /// History as of dispatch, including the new user message.
    pub snapshot: Vec<Message>,
    /// The snapshot is over the summarize threshold and this job holds the
    /// conversation's summarization slot.
    pub summarize: bool,
}

/// Collaborators and shared state a job runs against.
pub struct JobContext {
    pub sessions: Arc<SessionStore>,
    pub jobs: Arc<JobRegistry>,
    pub completion: Arc<dyn CompletionPort>,
    pub summarizer: Arc<dyn SummarizerPort>,
}

#[derive(Debug, Error)]
pub enum JobFailure {
    #[error("completion call failed: {0:#}")]
    Call(anyhow::Error),

    #[error("completion returned status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("completion returned no text")]
    Empty,

    #[error("timed out after {0:?}")]
    TimedOut(Duration),

    #[error("cancelled")]
    Cancelled,
}

/// Bounded queue drained by a fixed set of worker tasks.
#[derive(Clone)]
pub struct WorkerPool {
    tx: mpsc::Sender<CompletionJob>,
    cancel: CancellationToken,
    config: PoolConfig,
}

impl WorkerPool {
    pub fn start(config: PoolConfig, ctx: Arc<JobContext>) -> Self {
        let (tx, rx) = mpsc::channel::<CompletionJob>(config.queue_capacity.max(1));
        let rx = Arc::new(Mutex::new(rx));
        let cancel = CancellationToken::new();

        for worker in 0..config.workers.max(1) {
            let rx = rx.clone();
            let ctx = ctx.clone();
            let cancel = cancel.clone();
            let timeout = config.job_timeout;
            tokio::spawn(async move {
                loop {
                    let next = {
                        let mut rx = rx.lock().await;
                        tokio::select! {
                            _ = cancel.cancelled() => None,
                            job = rx.recv() => job,
                        }
                    };
                    let Some(job) = next else { break };
                    run_job(&ctx, job, timeout, cancel.child_token()).await;
                }

                // Jobs still queued at shutdown are registered as processing; end them.
                let stranded = {
                    let mut rx = rx.lock().await;
                    rx.close();
                    let mut jobs = Vec::new();
                    while let Ok(job) = rx.try_recv() {
                        jobs.push(job);
                    }
                    jobs
                };
                if !stranded.is_empty() {
                    debug!(worker, count = stranded.len(), "failing queued jobs");
                }
                for job in stranded {
                    run_job(&ctx, job, timeout, cancel.child_token()).await;
                }
                debug!(worker, "worker stopped");
            });
        }

        info!(workers = config.workers.max(1), capacity = config.queue_capacity.max(1), "worker pool started");
        Self { tx, cancel, config }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Reserve a queue slot without waiting.
    pub fn try_reserve(&self) -> Result<mpsc::Permit<'_, CompletionJob>, crate::DispatchError> {
        if self.cancel.is_cancelled() {
            return Err(crate::DispatchError::ShutDown);
        }
        self.tx.try_reserve().map_err(|e| match e {
            mpsc::error::TrySendError::Full(()) => crate::DispatchError::QueueFull,
            mpsc::error::TrySendError::Closed(()) => crate::DispatchError::ShutDown,
        })
    }

    /// Stop accepting work and cancel every running job. Queued jobs end
    /// in `error` without being run.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    pub fn is_shut_down(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Run one job to a terminal registry state. Never panics, never retries.
pub async fn run_job(ctx: &JobContext, job: CompletionJob, timeout: Duration, cancel: CancellationToken) {
    let request_id = job.request_id.clone();
    let session_id = job.session_id.clone();
    let summarizing = job.summarize;

    let outcome = tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(JobFailure::Cancelled),
        result = tokio::time::timeout(timeout, generate(ctx, &job)) => {
            result.unwrap_or(Err(JobFailure::TimedOut(timeout)))
        }
    };

    if summarizing {
        if let Some(conv) = ctx.sessions.get(&session_id) {
            conv.lock().end_summary(&request_id);
        }
    }

    match outcome {
        Ok(reply) => {
            let html = markdown_to_html(&reply);
            if ctx.jobs.complete(&request_id, html, reply) {
                info!(request_id = %request_id, "completion finished");
            }
        }
        Err(failure) => {
            warn!(request_id = %request_id, error = %failure, "completion failed");
            ctx.jobs.fail(&request_id, APOLOGY);
        }
    }
}

/// Summarize if due, assemble the prompt, call the completion service.
pub async fn generate(ctx: &JobContext, job: &CompletionJob) -> Result<String, JobFailure> {
    let prompt = if job.summarize {
        let summary = summarize_history(ctx.summarizer.as_ref(), &job.snapshot).await;
        if let Some(conv) = ctx.sessions.get(&job.session_id) {
            let mut conv = conv.lock();
            // A reset while summarizing releases the slot; don't collapse the new history.
            if conv.holds_summary(&job.request_id) {
                conv.collapse(job.snapshot.len(), summary.clone());
            }
        }
        assemble_prompt(&[Message::system(summary)])
    } else {
        assemble_prompt(&job.snapshot)
    };

    debug!(request_id = %job.request_id, chars = prompt.len(), "calling completion");
    let reply = ctx.completion.complete(&prompt).await.map_err(JobFailure::Call)?;

    if reply.status_code != 200 {
        return Err(JobFailure::Status {
            status: reply.status_code,
            message: format!(
                "request_id={}, message={}",
                reply.request_id.as_deref().unwrap_or("-"),
                reply.message.as_deref().unwrap_or("-"),
            ),
        });
    }

    reply.success_text().map(str::to_string).ok_or(JobFailure::Empty)
}
