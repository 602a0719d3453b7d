//! Scripted port implementations for demos and tests.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Semaphore;

use crate::history::Message;
use crate::ports::{CompletionPort, CompletionReply, SummarizerPort};

#[derive(Debug, Clone)]
enum Behaviour {
    Reply(String),
    Status(u16, String),
    Fail(String),
    Hang,
}

/// Completion service stand-in. Records every prompt it receives.
pub struct MockCompletion {
    behaviour: Behaviour,
    gate: Option<Arc<Semaphore>>,
    prompts: Mutex<Vec<String>>,
}

impl MockCompletion {
    fn with(behaviour: Behaviour) -> Self {
        Self { behaviour, gate: None, prompts: Mutex::new(Vec::new()) }
    }

    pub fn reply(text: impl Into<String>) -> Self {
        Self::with(Behaviour::Reply(text.into()))
    }

    /// Upstream answers with a non-OK status.
    pub fn status(code: u16, message: impl Into<String>) -> Self {
        Self::with(Behaviour::Status(code, message.into()))
    }

    /// The call itself errors (transport, missing credentials).
    pub fn failing(message: impl Into<String>) -> Self {
        Self::with(Behaviour::Fail(message.into()))
    }

    /// Never answers.
    pub fn hanging() -> Self {
        Self::with(Behaviour::Hang)
    }

    /// Hold each call until a permit is added to `gate`.
    pub fn gated(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }
}

#[async_trait]
impl CompletionPort for MockCompletion {
    async fn complete(&self, prompt: &str) -> Result<CompletionReply> {
        self.prompts.lock().push(prompt.to_string());
        if let Some(gate) = &self.gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }
        match &self.behaviour {
            Behaviour::Reply(text) => Ok(CompletionReply {
                status_code: 200,
                request_id: Some("mock".to_string()),
                message: None,
                text: Some(text.clone()),
            }),
            Behaviour::Status(code, message) => Ok(CompletionReply {
                status_code: *code,
                request_id: Some("mock".to_string()),
                message: Some(message.clone()),
                text: None,
            }),
            Behaviour::Fail(message) => Err(anyhow!(message.clone())),
            Behaviour::Hang => std::future::pending().await,
        }
    }
}

/// Summarizer stand-in. Records every request it receives.
pub struct MockSummarizer {
    result: std::result::Result<String, String>,
    gate: Option<Arc<Semaphore>>,
    calls: Mutex<Vec<Vec<Message>>>,
}

impl MockSummarizer {
    fn with(result: std::result::Result<String, String>) -> Self {
        Self { result, gate: None, calls: Mutex::new(Vec::new()) }
    }

    pub fn reply(text: impl Into<String>) -> Self {
        Self::with(Ok(text.into()))
    }

    pub fn failing(message: impl Into<String>) -> Self {
        Self::with(Err(message.into()))
    }

    /// Hold each call until a permit is added to `gate`.
    pub fn gated(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn calls(&self) -> Vec<Vec<Message>> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl SummarizerPort for MockSummarizer {
    async fn summarize(&self, messages: &[Message]) -> Result<String> {
        self.calls.lock().push(messages.to_vec());
        if let Some(gate) = &self.gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }
        self.result.clone().map_err(|e| anyhow!(e))
    }
}
