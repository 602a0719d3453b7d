use anyhow::Result;
use async_trait::async_trait;

use crate::history::Message;

/// What the completion service said about one call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompletionReply {
    pub status_code: u16,
    pub request_id: Option<String>,
    pub message: Option<String>,
    pub text: Option<String>,
}

impl CompletionReply {
    pub fn ok(text: impl Into<String>) -> Self {
        Self {
            status_code: 200,
            text: Some(text.into()),
            ..Self::default()
        }
    }

    /// Generated text when the call succeeded with a non-empty payload.
    pub fn success_text(&self) -> Option<&str> {
        if self.status_code != 200 {
            return None;
        }
        self.text.as_deref().filter(|t| !t.trim().is_empty())
    }
}

#[async_trait]
pub trait CompletionPort: Send + Sync {
    /// `Err` for transport problems and missing credentials; upstream
    /// rejections come back as a non-200 `status_code`.
    async fn complete(&self, prompt: &str) -> Result<CompletionReply>;
}

#[async_trait]
pub trait SummarizerPort: Send + Sync {
    async fn summarize(&self, messages: &[Message]) -> Result<String>;
}
