use tracing::{info, warn};

use crate::history::{assemble_prompt, Message};
use crate::ports::SummarizerPort;

pub const SUMMARY_INSTRUCTION: &str = r#"You condense chat transcripts so a conversation can continue within a small context.

Rules:
• Copy the last two exchanges verbatim
• Compress everything earlier into short factual notes (names, numbers, decisions, open questions)
• Write in the language of the conversation
• Keep the whole output under 300 words"#;

/// Summarize `history` through the summarizer service.
///
/// Never fails: on any error the returned text describes the failure and
/// becomes the conversation content in place of a summary.
pub async fn summarize_history(summarizer: &dyn SummarizerPort, history: &[Message]) -> String {
    let request = vec![
        Message::system(SUMMARY_INSTRUCTION),
        Message::user(format!(
            "Summarize this conversation:\n\n{}",
            assemble_prompt(history)
        )),
    ];

    match summarizer.summarize(&request).await {
        Ok(text) if !text.trim().is_empty() => {
            info!(messages = history.len(), chars = text.len(), "conversation summarized");
            text.trim().to_string()
        }
        Ok(_) => {
            warn!("summarizer returned an empty response");
            "Summary unavailable: the summarizer returned an empty response.".to_string()
        }
        Err(e) => {
            warn!(error = %format!("{e:#}"), "summarization failed");
            format!("Summary unavailable: {e:#}")
        }
    }
}
