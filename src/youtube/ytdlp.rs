use anyhow::Context;
use async_trait::async_trait;
use indicatif::ProgressBar;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

use super::{watch_url, AudioDownloader, TranscriptSource};
use crate::utils::{normalize_whitespace, spinner};
use crate::Result;

/// Subset of `yt-dlp --dump-json` we care about
#[derive(Debug, Default, Deserialize)]
struct VideoInfo {
    subtitles: Option<HashMap<String, Vec<CaptionTrack>>>,
    automatic_captions: Option<HashMap<String, Vec<CaptionTrack>>>,
}

#[derive(Debug, Clone, Deserialize)]
struct CaptionTrack {
    ext: String,
    url: String,
}

/// YouTube timed-text document (`fmt=json3`)
#[derive(Debug, Deserialize)]
struct TimedText {
    #[serde(default)]
    events: Vec<TimedTextEvent>,
}

#[derive(Debug, Deserialize)]
struct TimedTextEvent {
    #[serde(default)]
    segs: Vec<TimedTextSegment>,
}

#[derive(Debug, Deserialize)]
struct TimedTextSegment {
    #[serde(default)]
    utf8: String,
}

/// Captions and audio through the yt-dlp command line tool
#[derive(Clone)]
pub struct YtDlp {
    yt_dlp_path: String,
    languages: Vec<String>,
    http: reqwest::Client,
    show_progress: bool,
}

impl YtDlp {
    pub fn new(http: reqwest::Client, languages: Vec<String>) -> Self {
        Self {
            yt_dlp_path: "yt-dlp".to_string(),
            languages,
            http,
            show_progress: true,
        }
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    /// Get video information using yt-dlp
    async fn get_video_info(&self, video_id: &str) -> Result<VideoInfo> {
        tracing::debug!("Extracting video info for: {}", video_id);

        let output = Command::new(&self.yt_dlp_path)
            .args(["--dump-json", "--skip-download", "--no-playlist"])
            .arg(watch_url(video_id))
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .context("Failed to run yt-dlp")?;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("yt-dlp failed: {}", error.trim());
        }

        serde_json::from_slice(&output.stdout).context("Failed to parse yt-dlp output")
    }

    async fn download_track(&self, track: &CaptionTrack) -> Result<String> {
        let response = self
            .http
            .get(&track.url)
            .send()
            .await
            .context("Failed to download captions")?;

        if !response.status().is_success() {
            anyhow::bail!("Failed to download captions: HTTP {}", response.status());
        }

        response.text().await.context("Failed to read captions")
    }

    fn spinner(&self, message: &'static str) -> ProgressBar {
        spinner(message, self.show_progress)
    }
}

#[async_trait]
impl TranscriptSource for YtDlp {
    async fn fetch_transcript(&self, video_id: &str) -> Result<Option<String>> {
        let info = self.get_video_info(video_id).await?;

        let track = match select_track(&info, &self.languages) {
            Some(track) => track,
            None => {
                tracing::debug!(video_id, "No caption track in preferred languages");
                return Ok(None);
            }
        };

        let body = self.download_track(&track).await?;
        let text = parse_timed_text(&body)?;

        Ok(Some(text).filter(|t| !t.is_empty()))
    }
}

#[async_trait]
impl AudioDownloader for YtDlp {
    async fn download_audio(&self, video_id: &str, destination: &Path) -> Result<PathBuf> {
        // yt-dlp appends the extension of the converted file itself
        let base = destination.with_extension("");
        let template = format!("{}.%(ext)s", base.display());
        let final_path = base.with_extension("mp3");

        tracing::debug!("Downloading audio for {} to {}", video_id, final_path.display());
        let progress = self.spinner("Downloading audio with yt-dlp...");

        let output = Command::new(&self.yt_dlp_path)
            .args([
                "--output",
                template.as_str(),
                "--format",
                "bestaudio/best",
                "--extract-audio",
                "--audio-format",
                "mp3",
                "--audio-quality",
                "5",
                "--no-playlist",
                "--quiet",
            ])
            .arg(watch_url(video_id))
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .context("Failed to run yt-dlp")?;

        if !output.status.success() {
            progress.finish_with_message("Download failed");
            let error = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("Failed to download audio: {}", error.trim());
        }

        if !final_path.is_file() {
            progress.finish_with_message("Download failed");
            anyhow::bail!("yt-dlp reported success but {} is missing", final_path.display());
        }

        progress.finish_with_message("Download complete");
        Ok(final_path)
    }
}

/// Pick the json3 track for the first preferred language that has one,
/// manual captions before automatic ones
fn select_track(info: &VideoInfo, languages: &[String]) -> Option<CaptionTrack> {
    let find = |tracks: &Option<HashMap<String, Vec<CaptionTrack>>>, lang: &str| {
        tracks
            .as_ref()
            .and_then(|by_lang| by_lang.get(lang))
            .and_then(|formats| formats.iter().find(|t| t.ext == "json3"))
            .cloned()
    };

    languages.iter().find_map(|lang| {
        find(&info.subtitles, lang.as_str())
            .or_else(|| find(&info.automatic_captions, lang.as_str()))
    })
}

/// Flatten a json3 caption document into plain text
fn parse_timed_text(body: &str) -> Result<String> {
    let timed: TimedText = serde_json::from_str(body).context("Failed to parse captions")?;

    let lines: Vec<String> = timed
        .events
        .iter()
        .map(|event| {
            let line: String = event.segs.iter().map(|s| s.utf8.as_str()).collect();
            normalize_whitespace(&line)
        })
        .filter(|line| !line.is_empty())
        .collect();

    Ok(lines.join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(json: &str) -> VideoInfo {
        serde_json::from_str(json).unwrap()
    }

    fn langs(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_select_track_prefers_language_order() {
        let info = info(
            r#"{
                "subtitles": {"en": [{"ext": "vtt", "url": "en-vtt"}, {"ext": "json3", "url": "en-manual"}]},
                "automatic_captions": {"de": [{"ext": "json3", "url": "de-auto"}]}
            }"#,
        );
        let track = select_track(&info, &langs(&["de", "en"])).unwrap();
        assert_eq!(track.url, "de-auto");

        let track = select_track(&info, &langs(&["en", "de"])).unwrap();
        assert_eq!(track.url, "en-manual");
    }

    #[test]
    fn test_select_track_prefers_manual_within_language() {
        let info = info(
            r#"{
                "subtitles": {"en": [{"ext": "json3", "url": "manual"}]},
                "automatic_captions": {"en": [{"ext": "json3", "url": "auto"}]}
            }"#,
        );
        assert_eq!(select_track(&info, &langs(&["en"])).unwrap().url, "manual");
    }

    #[test]
    fn test_select_track_none_available() {
        let info = info(r#"{"subtitles": null, "automatic_captions": {"fr": [{"ext": "json3", "url": "x"}]}}"#);
        assert!(select_track(&info, &langs(&["de", "en"])).is_none());
        assert!(select_track(&VideoInfo::default(), &langs(&["en"])).is_none());
    }

    #[test]
    fn test_parse_timed_text() {
        let body = r#"{"events": [
            {"tStartMs": 0, "segs": [{"utf8": "hello"}, {"utf8": " world"}]},
            {"tStartMs": 10, "segs": [{"utf8": "\n"}]},
            {"tStartMs": 20},
            {"tStartMs": 30, "segs": [{"utf8": "second\nline"}]}
        ]}"#;
        assert_eq!(parse_timed_text(body).unwrap(), "hello world second line");
    }

    #[test]
    fn test_parse_timed_text_rejects_garbage() {
        assert!(parse_timed_text("<html>").is_err());
    }
}
