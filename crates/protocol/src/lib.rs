use serde::{Deserialize, Serialize};

/// Lifecycle of one background completion request as seen by a polling client.
///
/// `NotFound` is never stored; it is what a poll returns for an id that was
/// never dispatched or has already been consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Processing,
    Complete,
    Error,
    NotFound,
}

impl JobStatus {
    /// Complete and error jobs are terminal; they are evicted on first read.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Complete | JobStatus::Error)
    }
}

/// Form body of `POST /get` (also accepted as a query string on `GET /get`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatForm {
    #[serde(default)]
    pub msg: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

/// Immediate answer to a dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchAck {
    pub status: JobStatus,
    pub request_id: String,
}

impl DispatchAck {
    pub fn processing<S: Into<String>>(request_id: S) -> Self {
        Self { status: JobStatus::Processing, request_id: request_id.into() }
    }
}

/// Query of `GET /status`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatusQuery {
    #[serde(default)]
    pub request_id: Option<String>,
}

/// Answer to a status poll. `message` is HTML when `status == Complete`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReply {
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl StatusReply {
    pub fn not_found() -> Self {
        Self { status: JobStatus::NotFound, message: None }
    }

    pub fn processing() -> Self {
        Self { status: JobStatus::Processing, message: None }
    }

    pub fn complete<S: Into<String>>(html: S) -> Self {
        Self { status: JobStatus::Complete, message: Some(html.into()) }
    }

    pub fn error<S: Into<String>>(text: S) -> Self {
        Self { status: JobStatus::Error, message: Some(text.into()) }
    }
}

/// Structured body for synchronous handler failures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Short machine-readable code.
    pub error: String,
    pub detail: String,
}

impl ErrorBody {
    pub fn new<C: Into<String>, D: Into<String>>(error: C, detail: D) -> Self {
        Self { error: error.into(), detail: detail.into() }
    }
}
