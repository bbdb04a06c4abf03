use anyhow::Context;
use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::{build_prompt, Analysis, AnalysisInput, Analyzer};
use crate::{BriefingError, Result};

const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Inline audio above this size is rejected by the API
const MAX_INLINE_AUDIO_BYTES: u64 = 20 * 1024 * 1024;

#[derive(Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum Part {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
}

#[derive(Serialize)]
struct InlineData {
    #[serde(rename = "mimeType")]
    mime_type: &'static str,
    data: String,
}

#[derive(Serialize)]
struct GenerationConfig {
    #[serde(rename = "responseMimeType", skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<&'static str>,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

/// Google Gemini via the Generative Language REST API
pub struct GeminiAnalyzer {
    http: reqwest::Client,
    api_key: Option<String>,
    model: String,
}

impl GeminiAnalyzer {
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
                provider: "gemini",
                variable: "GEMINI_API_KEY",
            }
            .into()
        })
    }

    async fn generate(&self, api_key: &str, parts: Vec<Part>, json: bool) -> Result<String> {
        let request = GenerateRequest {
            contents: vec![Content { parts }],
            generation_config: GenerationConfig {
                response_mime_type: json.then_some("application/json"),
            },
        };

        let response = self
            .http
            .post(format!("{}/{}:generateContent", API_BASE, self.model))
            .header("x-goog-api-key", api_key)
            .json(&request)
            .send()
            .await
            .context("Gemini request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Gemini returned HTTP {}: {}", status, body.trim());
        }

        let body: GenerateResponse = response
            .json()
            .await
            .context("Failed to decode Gemini response")?;

        let text: String = body
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();

        if text.trim().is_empty() {
            anyhow::bail!("Gemini returned no text");
        }
        Ok(text)
    }

    fn audio_part(path: &Path) -> Result<Part> {
        let size = fs_err::metadata(path)?.len();
        if size > MAX_INLINE_AUDIO_BYTES {
            anyhow::bail!(
                "audio file {} is too large for inline upload ({} bytes)",
                path.display(),
                size
            );
        }

        let bytes = fs_err::read(path)?;
        Ok(Part::InlineData {
            inline_data: InlineData {
                mime_type: "audio/mp3",
                data: base64::engine::general_purpose::STANDARD.encode(bytes),
            },
        })
    }
}

#[async_trait]
impl Analyzer for GeminiAnalyzer {
    async fn analyze(
        &self,
        input: &AnalysisInput,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<Analysis> {
        let api_key = self.api_key()?;

        let mut parts = vec![Part::Text {
            text: build_prompt(input, system_prompt, user_prompt),
        }];
        if let AnalysisInput::Audio(path) = input {
            tracing::info!("Uploading audio file {} to Gemini", path.display());
            match Self::audio_part(path) {
                Ok(part) => parts.push(part),
                Err(e) => {
                    return Ok(Analysis::degraded(format!("Audio upload failed: {:#}", e)));
                }
            }
        }

        match self.generate(api_key, parts, true).await {
            Ok(text) => Ok(Analysis::from_model_output(&text)),
            Err(e) => {
                tracing::warn!("AI analysis ({}) failed: {:#}", self.describe(), e);
                Ok(Analysis::degraded(format!("AI analysis (Gemini) failed: {:#}", e)))
            }
        }
    }

    fn supports_audio(&self) -> bool {
        true
    }

    fn describe(&self) -> String {
        format!("gemini/{}", self.model)
    }

    async fn ping(&self) -> Result<String> {
        let api_key = self.api_key()?;
        self.generate(
            api_key,
            vec![Part::Text {
                text: "Hello".to_string(),
            }],
            false,
        )
        .await
    }
}
