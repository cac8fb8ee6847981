//! Minimal client for an OpenAI-compatible `/chat/completions` endpoint.

use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::config::EnrichmentConfig;

#[derive(Debug, Clone)]
pub struct LlmClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
    referer: Option<String>,
    title: Option<String>,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    response_format: ResponseFormat,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: AssistantMessage,
}

#[derive(Deserialize)]
struct AssistantMessage {
    #[serde(default)]
    content: Option<String>,
}

impl LlmClient {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            api_key: api_key.into(),
            referer: None,
            title: None,
        }
    }

    /// Build from config. `None` when enrichment is disabled or no API key is configured.
    pub fn from_config(config: &EnrichmentConfig) -> Option<Self> {
        if !config.enabled {
            tracing::info!("LLM enrichment disabled by config");
            return None;
        }
        let Some(api_key) = config.api_key.as_deref().filter(|k| !k.trim().is_empty()) else {
            tracing::warn!("no LLM API key configured, enrichment disabled");
            return None;
        };

        let mut client = Self::new(&config.base_url, &config.model, api_key);
        client.referer = config.referer.clone();
        client.title = config.title.clone();
        Some(client)
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Send one system + user exchange and return the assistant's raw content.
    ///
    /// Any status other than 200 is an error; there are no retries.
    pub async fn complete(&self, system: &str, user: &str, timeout: Duration) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
            response_format: ResponseFormat {
                kind: "json_object",
            },
        };

        let url = format!("{}/chat/completions", self.base_url);
        let mut builder = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .timeout(timeout);
        if let Some(referer) = &self.referer {
            builder = builder.header("HTTP-Referer", referer);
        }
        if let Some(title) = &self.title {
            builder = builder.header("X-Title", title);
        }

        let response = builder
            .send()
            .await
            .with_context(|| format!("request to {url} failed"))?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("completions endpoint returned {status}: {body}");
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .context("failed to parse completions response")?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .context("completions response had no message content")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_serializes_as_json_object_mode() {
        let request = ChatRequest {
            model: "m",
            messages: [
                ChatMessage {
                    role: "system",
                    content: "sys",
                },
                ChatMessage {
                    role: "user",
                    content: "Plant name: Rose",
                },
            ],
            response_format: ResponseFormat {
                kind: "json_object",
            },
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "m");
        assert_eq!(json["messages"][1]["role"], "user");
        assert_eq!(json["response_format"]["type"], "json_object");
    }

    #[test]
    fn missing_key_disables_client() {
        let config = EnrichmentConfig::default();
        assert!(config.api_key.is_none());
        assert!(LlmClient::from_config(&config).is_none());

        let blank = EnrichmentConfig {
            api_key: Some("  ".into()),
            ..EnrichmentConfig::default()
        };
        assert!(LlmClient::from_config(&blank).is_none());
    }

    #[test]
    fn disabled_config_wins_over_key() {
        let config = EnrichmentConfig {
            enabled: false,
            api_key: Some("k".into()),
            ..EnrichmentConfig::default()
        };
        assert!(LlmClient::from_config(&config).is_none());
    }

    #[test]
    fn trailing_slash_is_trimmed() {
        let client = LlmClient::new("http://localhost:9/v1/", "m", "k");
        assert_eq!(client.base_url, "http://localhost:9/v1");
        assert_eq!(client.model(), "m");
    }
}
