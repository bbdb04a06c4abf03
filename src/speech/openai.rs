use anyhow::Context;
use async_trait::async_trait;
use serde::Serialize;
use std::io::Write;
use std::path::Path;

use super::{chunk_text, clean_for_speech, partial_path, SpeechSynthesizer};
use crate::{BriefingError, Result};

const SPEECH_URL: &str = "https://api.openai.com/v1/audio/speech";
const MAX_CHUNK_CHARS: usize = 4000;

#[derive(Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    voice: &'a str,
    input: &'a str,
    response_format: &'a str,
}

/// OpenAI speech endpoint (`tts-1`). The voice picks the language from the text.
pub struct OpenAiTts {
    http: reqwest::Client,
    api_key: Option<String>,
    voice: String,
}

impl OpenAiTts {
    pub fn new(http: reqwest::Client, api_key: Option<String>) -> Self {
        Self {
            http,
            api_key,
            voice: "alloy".to_string(),
        }
    }
}

#[async_trait]
impl SpeechSynthesizer for OpenAiTts {
    async fn synthesize(&self, text: &str, destination: &Path, _language: &str) -> Result<()> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(BriefingError::MissingCredential {
                provider: "openai",
                variable: "OPENAI_API_KEY",
            })?;

        let chunks = chunk_text(&clean_for_speech(text), MAX_CHUNK_CHARS);
        if chunks.is_empty() {
            anyhow::bail!("Nothing to synthesize");
        }

        let mut audio = Vec::new();
        for chunk in &chunks {
            let response = self
                .http
                .post(SPEECH_URL)
                .bearer_auth(api_key)
                .json(&SpeechRequest {
                    model: "tts-1",
                    voice: &self.voice,
                    input: chunk,
                    response_format: "mp3",
                })
                .send()
                .await
                .context("OpenAI speech request failed")?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                anyhow::bail!("OpenAI speech returned HTTP {}: {}", status, body.trim());
            }
            audio.extend_from_slice(&response.bytes().await?);
        }

        let staging = partial_path(destination);
        let mut file = fs_err::File::create(&staging)?;
        file.write_all(&audio)?;
        file.flush()?;
        drop(file);
        fs_err::rename(&staging, destination)?;
        Ok(())
    }
}
