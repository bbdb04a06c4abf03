use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{build_prompt, Analysis, AnalysisInput, Analyzer};
use crate::{BriefingError, Result};

const MESSAGES_URL: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";

#[derive(Serialize)]
struct Msg<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct Req<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<Msg<'a>>,
}

#[derive(Deserialize)]
struct Resp {
    #[serde(default)]
    content: Vec<Block>,
}

#[derive(Deserialize)]
struct Block {
    text: Option<String>,
}

/// Anthropic Messages API; text input only
pub struct AnthropicAnalyzer {
    http: reqwest::Client,
    api_key: Option<String>,
    model: String,
}

impl AnthropicAnalyzer {
    pub fn new(http: reqwest::Client, api_key: Option<String>, model: String) -> Self {
        Self {
            http,
            api_key,
            model,
        }
    }

    fn api_key(&self) -> Result<&str> {
        self.api_key.as_deref().ok_or_else(|| {
            BriefingError::MissingCredential {
                provider: "anthropic",
                variable: "ANTHROPIC_API_KEY",
            }
            .into()
        })
    }

    async fn message(
        &self,
        api_key: &str,
        user: &str,
        max_tokens: u32,
    ) -> Result<String> {
        let req = Req {
            model: &self.model,
            max_tokens,
            messages: vec![Msg {
                role: "user",
                content: user,
            }],
        };

        let resp = self
            .http
            .post(MESSAGES_URL)
            .header("x-api-key", api_key)
            .header("anthropic-version", API_VERSION)
            .json(&req)
            .send()
            .await
            .context("Anthropic request failed")?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Anthropic returned HTTP {}: {}", status, body.trim());
        }

        let body: Resp = resp
            .json()
            .await
            .context("Failed to decode Anthropic response")?;
        let text: String = body.content.into_iter().filter_map(|b| b.text).collect();
        if text.trim().is_empty() {
            anyhow::bail!("Anthropic returned no text");
        }
        Ok(text)
    }
}

#[async_trait]
impl Analyzer for AnthropicAnalyzer {
    async fn analyze(
        &self,
        input: &AnalysisInput,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<Analysis> {
        let api_key = self.api_key()?;

        if let AnalysisInput::Audio(_) = input {
            return Ok(Analysis::degraded(
                "AI analysis (Anthropic) failed: audio input is not supported",
            ));
        }

        let prompt = build_prompt(input, system_prompt, user_prompt);
        match self.message(api_key, &prompt, 4096).await {
            Ok(text) => Ok(Analysis::from_model_output(&text)),
            Err(e) => {
                tracing::warn!("AI analysis ({}) failed: {:#}", self.describe(), e);
                Ok(Analysis::degraded(format!("AI analysis (Anthropic) failed: {:#}", e)))
            }
        }
    }

    fn supports_audio(&self) -> bool {
        false
    }

    fn describe(&self) -> String {
        format!("anthropic/{}", self.model)
    }

    async fn ping(&self) -> Result<String> {
        let api_key = self.api_key()?;
        self.message(api_key, "Hello", 100).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_key_is_an_error() {
        let analyzer =
            AnthropicAnalyzer::new(reqwest::Client::new(), None, "claude-3-opus".into());
        let err = analyzer.ping().await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<BriefingError>(),
            Some(BriefingError::MissingCredential { provider: "anthropic", .. })
        ));
    }

    #[test]
    fn test_request_shape() {
        let req = Req {
            model: "claude-3-opus",
            max_tokens: 100,
            messages: vec![Msg {
                role: "user",
                content: "Hello",
            }],
        };
        assert_eq!(
            serde_json::to_value(&req).unwrap(),
            serde_json::json!({
                "model": "claude-3-opus",
                "max_tokens": 100,
                "messages": [{"role": "user", "content": "Hello"}]
            })
        );
    }
}
