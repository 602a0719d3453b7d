//! HTTP clients for the hosted models the chat relay talks to:
//! an application-completion endpoint and a text-summarization endpoint.

pub mod completion;
pub mod error;
pub mod summarizer;

use serde::{Deserialize, Serialize};

pub use completion::{AppResponse, CompletionClient};
pub use error::LlmError;
pub use summarizer::SummarizerClient;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role { System, User, Assistant }

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self { role, content: content.into() }
    }
}

fn http_client() -> Result<reqwest::Client, LlmError> {
    Ok(reqwest::Client::builder().pool_max_idle_per_host(8).build()?)
}

/// Treat blank strings from the environment the same as unset ones.
fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
