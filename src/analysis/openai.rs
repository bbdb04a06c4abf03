use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{build_prompt, Analysis, AnalysisInput, Analyzer};
use crate::{BriefingError, Result};

const CHAT_URL: &str = "https://api.openai.com/v1/chat/completions";

#[derive(Serialize)]
struct Msg<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Serialize)]
struct Req<'a> {
    model: &'a str,
    messages: Vec<Msg<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Deserialize)]
struct Resp {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMsg,
}

#[derive(Deserialize)]
struct ChoiceMsg {
    content: Option<String>,
}

/// OpenAI Chat Completions; text input only
pub struct OpenAiAnalyzer {
    http: reqwest::Client,
    api_key: Option<String>,
    model: String,
}

impl OpenAiAnalyzer {
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
                provider: "openai",
                variable: "OPENAI_API_KEY",
            }
            .into()
        })
    }

    async fn chat(&self, api_key: &str, system: &str, user: &str, json: bool) -> Result<String> {
        let req = Req {
            model: &self.model,
            messages: vec![
                Msg {
                    role: "system",
                    content: system,
                },
                Msg {
                    role: "user",
                    content: user,
                },
            ],
            response_format: json.then_some(ResponseFormat {
                kind: "json_object",
            }),
        };

        let resp = self
            .http
            .post(CHAT_URL)
            .bearer_auth(api_key)
            .json(&req)
            .send()
            .await
            .context("OpenAI request failed")?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("OpenAI returned HTTP {}: {}", status, body.trim());
        }

        let body: Resp = resp.json().await.context("Failed to decode OpenAI response")?;
        body.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| anyhow::anyhow!("OpenAI returned no content"))
    }
}

#[async_trait]
impl Analyzer for OpenAiAnalyzer {
    async fn analyze(
        &self,
        input: &AnalysisInput,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<Analysis> {
        let api_key = self.api_key()?;

        if let AnalysisInput::Audio(_) = input {
            return Ok(Analysis::degraded(
                "AI analysis (OpenAI) failed: audio input is not supported",
            ));
        }

        let prompt = build_prompt(input, system_prompt, user_prompt);
        match self
            .chat(api_key, "You are a helpful assistant.", &prompt, true)
            .await
        {
            Ok(text) => Ok(Analysis::from_model_output(&text)),
            Err(e) => {
                tracing::warn!("AI analysis ({}) failed: {:#}", self.describe(), e);
                Ok(Analysis::degraded(format!("AI analysis (OpenAI) failed: {:#}", e)))
            }
        }
    }

    fn supports_audio(&self) -> bool {
        false
    }

    fn describe(&self) -> String {
        format!("openai/{}", self.model)
    }

    async fn ping(&self) -> Result<String> {
        let api_key = self.api_key()?;
        self.chat(api_key, "You are a helpful assistant.", "Hello", false)
            .await
    }
}
