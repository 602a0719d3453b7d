use reqwest::Client as Http;
use serde_json::{json, Value};

use crate::{http_client, non_blank, LlmError};

pub const DEFAULT_BASE_URL: &str = "https://dashscope.aliyuncs.com/api/v1";

/// Client for a hosted "application" completion endpoint: one prompt in,
/// one generated text out, addressed by application id.
#[derive(Clone, Debug)]
pub struct CompletionClient {
    http: Http,
    base_url: String,
    app_id: Option<String>,
    api_key: Option<String>,
}

/// Outcome of an application call that reached the service.
///
/// Non-OK statuses are returned here rather than as `Err` so callers can
/// report the upstream code and message.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AppResponse {
    pub status_code: u16,
    pub request_id: Option<String>,
    pub code: Option<String>,
    pub message: Option<String>,
    pub output_text: Option<String>,
}

impl AppResponse {
    pub fn is_ok(&self) -> bool {
        self.status_code == 200
    }

    /// Generated text, if the call succeeded and produced any.
    pub fn text(&self) -> Option<&str> {
        if !self.is_ok() {
            return None;
        }
        self.output_text.as_deref().filter(|t| !t.trim().is_empty())
    }
}

impl CompletionClient {
    pub fn new(
        base_url: impl Into<String>,
        app_id: Option<String>,
        api_key: Option<String>,
    ) -> Result<Self, LlmError> {
        Ok(Self {
            http: http_client()?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            app_id: non_blank(app_id),
            api_key: non_blank(api_key),
        })
    }

    pub fn has_credentials(&self) -> bool {
        self.app_id.is_some() && self.api_key.is_some()
    }

    pub async fn call(&self, prompt: &str) -> Result<AppResponse, LlmError> {
        let app_id = self.app_id.as_deref().ok_or(LlmError::MissingCredentials("completion app id"))?;
        let api_key = self.api_key.as_deref().ok_or(LlmError::MissingCredentials("completion api key"))?;

        let url = format!("{}/apps/{}/completion", self.base_url, app_id);
        let body = json!({
            "input": { "prompt": prompt },
            "parameters": {},
            "debug": {}
        });

        let resp = self.http.post(url)
            .bearer_auth(api_key)
            .json(&body)
            .send().await?;

        let status_code = resp.status().as_u16();
        let raw = resp.text().await?;

        let v: Value = match serde_json::from_str(&raw) {
            Ok(v) => v,
            Err(e) if status_code == 200 => return Err(LlmError::Decode(e.to_string())),
            // Error pages are not always JSON; keep the text as the message.
            Err(_) => {
                return Ok(AppResponse {
                    status_code,
                    message: Some(raw).filter(|m| !m.is_empty()),
                    ..AppResponse::default()
                });
            }
        };

        let field = |ptr: &str| v.pointer(ptr).and_then(|x| x.as_str()).map(str::to_string);
        Ok(AppResponse {
            status_code,
            request_id: field("/request_id"),
            code: field("/code"),
            message: field("/message"),
            output_text: field("/output/text"),
        })
    }
}
