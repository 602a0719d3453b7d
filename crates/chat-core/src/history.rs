use std::collections::VecDeque;
use std::fmt;

use serde::{Deserialize, Serialize};

pub const DEFAULT_HISTORY_LIMIT: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self { role, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }
}

/// How a conversation is kept bounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryPolicy {
    /// Keep only the newest `max_messages`; older ones are dropped on append.
    Window { max_messages: usize },
    /// Once the history grows past `threshold`, fold it into a single
    /// system message holding a summary.
    Summarize { threshold: usize },
}

impl Default for HistoryPolicy {
    fn default() -> Self {
        HistoryPolicy::Summarize { threshold: DEFAULT_HISTORY_LIMIT }
    }
}

/// Render messages as `role: content` lines in chronological order.
pub fn assemble_prompt<'a, I>(messages: I) -> String
where
    I: IntoIterator<Item = &'a Message>,
{
    messages
        .into_iter()
        .map(|m| format!("{}: {}", m.role, m.content))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Rolling conversation of one session.
#[derive(Debug, Clone)]
pub struct Conversation {
    messages: VecDeque<Message>,
    policy: HistoryPolicy,
    summary_owner: Option<String>,
}

impl Conversation {
    pub fn new(policy: HistoryPolicy) -> Self {
        Self {
            messages: VecDeque::new(),
            policy,
            summary_owner: None,
        }
    }

    fn push(&mut self, message: Message) {
        self.messages.push_back(message);
        if let HistoryPolicy::Window { max_messages } = self.policy {
            while self.messages.len() > max_messages.max(1) {
                self.messages.pop_front();
            }
        }
    }

    pub fn push_user(&mut self, content: impl Into<String>) {
        self.push(Message::user(content));
    }

    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.push(Message::assistant(content));
    }

    /// True when the history is over the summarize threshold and no other
    /// summarization is already in flight for this conversation.
    pub fn needs_summary(&self) -> bool {
        match self.policy {
            HistoryPolicy::Summarize { threshold } => {
                self.summary_owner.is_none() && self.messages.len() > threshold
            }
            HistoryPolicy::Window { .. } => false,
        }
    }

    /// Claim the summarization slot for `owner`. Returns false if another
    /// summarization is already in flight.
    pub fn begin_summary(&mut self, owner: &str) -> bool {
        if self.summary_owner.is_some() {
            return false;
        }
        self.summary_owner = Some(owner.to_string());
        true
    }

    pub fn holds_summary(&self, owner: &str) -> bool {
        self.summary_owner.as_deref() == Some(owner)
    }

    /// Release the slot if `owner` still holds it (its job ended before collapsing).
    pub fn end_summary(&mut self, owner: &str) {
        if self.summary_owner.as_deref() == Some(owner) {
            self.summary_owner = None;
        }
    }

    /// Replace the oldest `covered` messages with one system message holding
    /// `summary`. Messages appended after the summarized snapshot are kept.
    pub fn collapse(&mut self, covered: usize, summary: impl Into<String>) {
        let covered = covered.min(self.messages.len());
        self.messages.drain(..covered);
        self.messages.push_front(Message::system(summary));
        self.summary_owner = None;
    }

    pub fn snapshot(&self) -> Vec<Message> {
        self.messages.iter().cloned().collect()
    }

    pub fn prompt(&self) -> String {
        assemble_prompt(&self.messages)
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new(HistoryPolicy::default())
    }
}
