use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub mod google;
pub mod openai;

pub use google::GoogleTts;
pub use openai::OpenAiTts;

use crate::config::Credentials;
use crate::Result;

/// Renders text as an MP3 file
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Write speech for `text` to `destination`. The file only appears once complete.
    async fn synthesize(&self, text: &str, destination: &Path, language: &str) -> Result<()>;
}

/// Speech backends selectable by tag
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpeechProvider {
    #[default]
    #[serde(alias = "gtts")]
    Google,
    OpenAi,
}

pub fn build_synthesizer(
    provider: SpeechProvider,
    credentials: &Credentials,
    http: reqwest::Client,
) -> Box<dyn SpeechSynthesizer> {
    match provider {
        SpeechProvider::Google => Box::new(GoogleTts::new(http)),
        SpeechProvider::OpenAi => {
            Box::new(OpenAiTts::new(http, credentials.openai_api_key.clone()))
        }
    }
}

/// Drop Markdown emphasis and heading markers that would be read out loud
pub fn clean_for_speech(text: &str) -> String {
    text.replace(['*', '#'], "")
}

/// Split text into pieces of at most `max_chars` characters, breaking at whitespace.
/// Words longer than `max_chars` are split hard.
pub fn chunk_text(text: &str, max_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        let mut word = word;
        while word.chars().count() > max_chars {
            if !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
            }
            let split_at = word
                .char_indices()
                .nth(max_chars)
                .map(|(i, _)| i)
                .unwrap_or(word.len());
            chunks.push(word[..split_at].to_string());
            word = &word[split_at..];
        }
        if word.is_empty() {
            continue;
        }

        let needed = if current.is_empty() {
            word.chars().count()
        } else {
            current.chars().count() + 1 + word.chars().count()
        };
        if needed > max_chars && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Sibling path used while a file is being written
pub(crate) fn partial_path(destination: &Path) -> std::path::PathBuf {
    let mut name = destination
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".partial");
    destination.with_file_name(name)
}
