use reqwest::Client as Http;
use serde::Deserialize;
use serde_json::json;

use crate::{http_client, non_blank, ChatMessage, LlmError};

pub const DEFAULT_BASE_URL: &str = "https://api.cloudflare.com/client/v4";
pub const DEFAULT_MODEL: &str = "@cf/meta/llama-3.1-8b-instruct";

/// Client for a hosted inference endpoint used to compress transcripts.
#[derive(Clone, Debug)]
pub struct SummarizerClient {
    http: Http,
    base_url: String,
    account_id: Option<String>,
    api_token: Option<String>,
    model: String,
}

#[derive(Debug, Deserialize)]
struct RunResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    result: Option<RunResult>,
    #[serde(default)]
    errors: Vec<RunError>,
}

#[derive(Debug, Deserialize)]
struct RunResult {
    #[serde(default)]
    response: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RunError {
    #[serde(default)]
    message: String,
}

impl SummarizerClient {
    pub fn new(
        base_url: impl Into<String>,
        account_id: Option<String>,
        api_token: Option<String>,
        model: impl Into<String>,
    ) -> Result<Self, LlmError> {
        Ok(Self {
            http: http_client()?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            account_id: non_blank(account_id),
            api_token: non_blank(api_token),
            model: model.into(),
        })
    }

    pub fn has_credentials(&self) -> bool {
        self.account_id.is_some() && self.api_token.is_some()
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub async fn run(&self, messages: &[ChatMessage]) -> Result<String, LlmError> {
        let account = self.account_id.as_deref().ok_or(LlmError::MissingCredentials("summarizer account id"))?;
        let token = self.api_token.as_deref().ok_or(LlmError::MissingCredentials("summarizer api token"))?;

        let url = format!("{}/accounts/{}/ai/run/{}", self.base_url, account, self.model);
        let body = json!({
            "stream": false,
            "messages": messages,
        });

        let resp = self.http.post(url)
            .bearer_auth(token)
            .json(&body)
            .send().await?;

        let status = resp.status();
        let raw = resp.text().await?;
        let parsed: RunResponse = serde_json::from_str(&raw).map_err(|e| {
            if status.is_success() {
                LlmError::Decode(e.to_string())
            } else {
                LlmError::Upstream { status: status.as_u16(), message: raw.clone() }
            }
        })?;

        if !parsed.success || !status.is_success() {
            let message = parsed.errors.iter()
                .map(|e| e.message.as_str())
                .filter(|m| !m.is_empty())
                .collect::<Vec<_>>()
                .join("; ");
            return Err(LlmError::Upstream {
                status: status.as_u16(),
                message: if message.is_empty() { "request was not successful".into() } else { message },
            });
        }

        parsed.result
            .and_then(|r| r.response)
            .ok_or_else(|| LlmError::Decode("missing result.response".into()))
    }
}
