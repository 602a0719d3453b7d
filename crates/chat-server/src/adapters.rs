use anyhow::Result;
use async_trait::async_trait;
use chat_core::{CompletionPort, CompletionReply, Message, Role, SummarizerPort};
use llm::{ChatMessage, CompletionClient, SummarizerClient};
use tracing::warn;

/// Completion port backed by the hosted application API.
pub struct CompletionAdapter {
    client: CompletionClient,
}

impl CompletionAdapter {
    pub fn new(client: CompletionClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl CompletionPort for CompletionAdapter {
    async fn complete(&self, prompt: &str) -> Result<CompletionReply> {
        let resp = self.client.call(prompt).await?;
        if !resp.is_ok() {
            warn!(
                status = resp.status_code,
                code = resp.code.as_deref().unwrap_or("-"),
                request_id = resp.request_id.as_deref().unwrap_or("-"),
                "completion rejected"
            );
        }
        Ok(CompletionReply {
            status_code: resp.status_code,
            request_id: resp.request_id,
            message: resp.message.or(resp.code),
            text: resp.output_text,
        })
    }
}

/// Summarizer port backed by the hosted inference API.
pub struct SummarizerAdapter {
    client: SummarizerClient,
}

impl SummarizerAdapter {
    pub fn new(client: SummarizerClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SummarizerPort for SummarizerAdapter {
    async fn summarize(&self, messages: &[Message]) -> Result<String> {
        let request: Vec<ChatMessage> = messages.iter().map(to_chat_message).collect();
        Ok(self.client.run(&request).await?)
    }
}

fn to_chat_message(message: &Message) -> ChatMessage {
    let role = match message.role {
        Role::System => llm::Role::System,
        Role::User => llm::Role::User,
        Role::Assistant => llm::Role::Assistant,
    };
    ChatMessage::new(role, message.content.clone())
}
