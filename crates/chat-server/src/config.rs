use std::env;
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use chat_core::history::DEFAULT_HISTORY_LIMIT;
use chat_core::{HistoryPolicy, PoolConfig};

#[derive(Debug, Clone)]
pub struct CompletionSettings {
    pub base_url: String,
    pub app_id: Option<String>,
    pub api_key: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SummarizerSettings {
    pub base_url: String,
    pub account_id: Option<String>,
    pub api_token: Option<String>,
    pub model: String,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub host: String,
    pub port: u16,
    pub completion: CompletionSettings,
    pub summarizer: SummarizerSettings,
    pub history: HistoryPolicy,
    pub pool: PoolConfig,
    pub job_ttl: Duration,
    pub session_idle: Duration,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(get: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let text = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());

        let limit: usize = parse_or(&get, "HISTORY_LIMIT", DEFAULT_HISTORY_LIMIT)?;
        let history = match text("HISTORY_MODE", "summarize").to_ascii_lowercase().as_str() {
            "summarize" => HistoryPolicy::Summarize { threshold: limit },
            "window" if limit == 0 => bail!("HISTORY_LIMIT must be at least 1 in window mode"),
            "window" => HistoryPolicy::Window { max_messages: limit },
            other => bail!("invalid HISTORY_MODE={other:?} (expected \"summarize\" or \"window\")"),
        };

        let workers: usize = parse_or(&get, "WORKERS", 4)?;
        let queue_capacity: usize = parse_or(&get, "QUEUE_CAPACITY", 64)?;
        if workers == 0 || queue_capacity == 0 {
            bail!("WORKERS and QUEUE_CAPACITY must be at least 1");
        }

        Ok(Self {
            host: text("HOST", "0.0.0.0"),
            port: parse_or(&get, "PORT", 5000)?,
            completion: CompletionSettings {
                base_url: text("DASHSCOPE_BASE_URL", llm::completion::DEFAULT_BASE_URL),
                app_id: get("DASHSCOPE_APP_ID"),
                api_key: get("DASHSCOPE_API_KEY"),
            },
            summarizer: SummarizerSettings {
                base_url: text("CF_BASE_URL", llm::summarizer::DEFAULT_BASE_URL),
                account_id: get("CF_ACCOUNT_ID"),
                api_token: get("CF_API_TOKEN"),
                model: text("SUMMARIZER_MODEL", llm::summarizer::DEFAULT_MODEL),
            },
            history,
            pool: PoolConfig {
                workers,
                queue_capacity,
                job_timeout: Duration::from_secs(parse_or(&get, "JOB_TIMEOUT_SECS", 60)?),
            },
            job_ttl: Duration::from_secs(parse_or(&get, "JOB_TTL_SECS", 600)?),
            session_idle: Duration::from_secs(parse_or(&get, "SESSION_IDLE_SECS", 7200)?),
        })
    }
}

fn parse_or<T, F>(get: &F, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
    F: Fn(&str) -> Option<String>,
{
    match get(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow!("invalid {key}={raw:?}: {e}")),
    }
}
