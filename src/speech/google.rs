use anyhow::Context;
use async_trait::async_trait;
use futures_util::StreamExt;
use std::io::Write;
use std::path::Path;

use super::{chunk_text, clean_for_speech, partial_path, SpeechSynthesizer};
use crate::Result;

const TTS_URL: &str = "https://translate.google.com/translate_tts";

/// The endpoint refuses longer requests
const MAX_CHUNK_CHARS: usize = 200;

/// Google Translate text-to-speech (the endpoint gTTS uses)
pub struct GoogleTts {
    http: reqwest::Client,
}

impl GoogleTts {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }

    fn chunk_url(chunk: &str, language: &str, index: usize, total: usize) -> String {
        format!(
            "{}?ie=UTF-8&client=tw-ob&tl={}&total={}&idx={}&textlen={}&q={}",
            TTS_URL,
            urlencoding::encode(language),
            total,
            index,
            chunk.chars().count(),
            urlencoding::encode(chunk)
        )
    }
}

#[async_trait]
impl SpeechSynthesizer for GoogleTts {
    async fn synthesize(&self, text: &str, destination: &Path, language: &str) -> Result<()> {
        let chunks = chunk_text(&clean_for_speech(text), MAX_CHUNK_CHARS);
        if chunks.is_empty() {
            anyhow::bail!("Nothing to synthesize");
        }

        let staging = partial_path(destination);
        let mut file = fs_err::File::create(&staging)?;

        // MP3 frames can simply be concatenated
        for (index, chunk) in chunks.iter().enumerate() {
            let url = Self::chunk_url(chunk, language, index, chunks.len());
            let response = self
                .http
                .get(&url)
                .send()
                .await
                .context("Text-to-speech request failed")?;

            if !response.status().is_success() {
                drop(file);
                let _ = fs_err::remove_file(&staging);
                anyhow::bail!("Text-to-speech returned HTTP {}", response.status());
            }

            let mut stream = response.bytes_stream();
            while let Some(bytes) = stream.next().await {
                file.write_all(&bytes.context("Text-to-speech download interrupted")?)?;
            }
        }

        file.flush()?;
        drop(file);
        fs_err::rename(&staging, destination)?;

        tracing::debug!(
            "Synthesized {} chunk(s) into {}",
            chunks.len(),
            destination.display()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_url_encodes_text() {
        let url = GoogleTts::chunk_url("Hallo Welt & mehr", "de", 0, 1);
        assert_eq!(
            url,
            "https://translate.google.com/translate_tts?ie=UTF-8&client=tw-ob&tl=de&total=1&idx=0&textlen=17&q=Hallo%20Welt%20%26%20mehr"
        );
    }

    #[tokio::test]
    async fn test_empty_text_is_rejected() {
        let dir = tempfile::TempDir::new().unwrap();
        let destination = dir.path().join("out.mp3");
        let tts = GoogleTts::new(reqwest::Client::new());
        assert!(tts.synthesize("** #", &destination, "en").await.is_err());
        assert!(!destination.exists());
    }
}
