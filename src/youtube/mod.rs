use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub mod feed;
pub mod ytdlp;

pub use feed::ChannelFeed;
pub use ytdlp::YtDlp;

use crate::Result;

/// A video as listed in a channel feed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoEntry {
    pub id: String,
    pub title: String,
    pub link: String,
    /// Publication timestamp exactly as the feed reports it
    pub published: String,
}

/// Lists the most recent uploads of a channel
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VideoFeed: Send + Sync {
    /// Newest-first entries, at most `limit`
    async fn latest_videos(&self, channel_id: &str, limit: usize) -> Result<Vec<VideoEntry>>;
}

/// Fetches caption text for a video
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TranscriptSource: Send + Sync {
    /// `Ok(None)` when the video has no usable captions; `Err` only for
    /// unexpected transport failures
    async fn fetch_transcript(&self, video_id: &str) -> Result<Option<String>>;
}

/// Downloads the audio track of a video
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AudioDownloader: Send + Sync {
    /// Download into `destination` and return the path of the file actually written
    async fn download_audio(&self, video_id: &str, destination: &Path) -> Result<PathBuf>;
}

/// Canonical watch URL for a video id
pub fn watch_url(video_id: &str) -> String {
    format!("https://www.youtube.com/watch?v={}", video_id)
}
