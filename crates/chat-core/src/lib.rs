//! Coordination core of the chat relay: per-session history, background
//! completion jobs, and the poll-to-consume status protocol.

pub mod dispatcher;
pub mod error;
pub mod history;
pub mod mocks;
pub mod poller;
pub mod ports;
pub mod registry;
pub mod render;
pub mod session;
pub mod summarize;
pub mod worker;

use std::sync::Arc;
use std::time::Duration;

use protocol::{DispatchAck, StatusReply};
use tracing::info;

pub use dispatcher::Dispatcher;
pub use error::{DispatchError, RegistryError};
pub use history::{assemble_prompt, Conversation, HistoryPolicy, Message, Role};
pub use poller::StatusPoller;
pub use ports::{CompletionPort, CompletionReply, SummarizerPort};
pub use registry::{JobRegistry, JobSnapshot};
pub use render::markdown_to_html;
pub use session::SessionStore;
pub use worker::{JobContext, PoolConfig, WorkerPool, APOLOGY};

#[derive(Debug, Clone, Default)]
pub struct CoreConfig {
    pub history: HistoryPolicy,
    pub pool: PoolConfig,
}

/// Wires the stores, the worker pool, the dispatcher and the poller.
pub struct ChatCore {
    sessions: Arc<SessionStore>,
    jobs: Arc<JobRegistry>,
    pool: WorkerPool,
    dispatcher: Dispatcher,
    poller: StatusPoller,
}

impl ChatCore {
    /// Must be called from inside a tokio runtime (spawns the workers).
    pub fn start(
        config: CoreConfig,
        completion: Arc<dyn CompletionPort>,
        summarizer: Arc<dyn SummarizerPort>,
    ) -> Self {
        let sessions = Arc::new(SessionStore::new(config.history));
        let jobs = Arc::new(JobRegistry::new());
        let ctx = Arc::new(JobContext {
            sessions: sessions.clone(),
            jobs: jobs.clone(),
            completion,
            summarizer,
        });
        let pool = WorkerPool::start(config.pool, ctx.clone());

        Self {
            dispatcher: Dispatcher::new(ctx, pool.clone()),
            poller: StatusPoller::new(sessions.clone(), jobs.clone()),
            sessions,
            jobs,
            pool,
        }
    }

    pub fn dispatch(
        &self,
        session_id: &str,
        text: &str,
        request_id: Option<String>,
    ) -> Result<DispatchAck, DispatchError> {
        self.dispatcher.dispatch(session_id, text, request_id)
    }

    pub async fn respond_now(&self, session_id: &str, text: &str) -> Result<StatusReply, DispatchError> {
        self.dispatcher.respond_now(session_id, text).await
    }

    pub fn poll(&self, request_id: &str) -> StatusReply {
        self.poller.poll(request_id)
    }

    /// Forget a session's conversation. Jobs already queued still finish.
    pub fn reset_session(&self, session_id: &str) -> bool {
        self.sessions.remove(session_id)
    }

    /// Evict unpolled finished jobs and idle sessions.
    pub fn sweep(&self, job_ttl: Duration, session_ttl: Duration) -> (usize, usize) {
        let jobs = self.jobs.evict_stale(job_ttl);
        let sessions = self.sessions.evict_idle(session_ttl);
        if jobs > 0 || sessions > 0 {
            info!(jobs, sessions, "swept stale state");
        }
        (jobs, sessions)
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    pub fn jobs(&self) -> &Arc<JobRegistry> {
        &self.jobs
    }

    pub fn shutdown(&self) {
        info!("shutting down worker pool");
        self.pool.shutdown();
    }
}
