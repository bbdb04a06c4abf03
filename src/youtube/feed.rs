use anyhow::Context;
use async_trait::async_trait;
use quick_xml::de::from_str;
use serde::Deserialize;
use url::Url;

use super::{watch_url, VideoEntry, VideoFeed};
use crate::Result;

const FEED_URL: &str = "https://www.youtube.com/feeds/videos.xml";

/// Atom document served for a channel
#[derive(Debug, Deserialize)]
struct AtomFeed {
    #[serde(rename = "entry", default)]
    entries: Vec<AtomEntry>,
}

#[derive(Debug, Deserialize)]
struct AtomEntry {
    id: Option<String>,
    #[serde(rename = "videoId", alias = "yt:videoId")]
    video_id: Option<String>,
    title: Option<String>,
    link: Option<AtomLink>,
    published: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AtomLink {
    #[serde(rename = "@href")]
    href: String,
}

/// Channel uploads from the public YouTube Atom feed
pub struct ChannelFeed {
    http: reqwest::Client,
}

impl ChannelFeed {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }

    /// Feed URL for a channel id
    pub fn feed_url(channel_id: &str) -> Result<Url> {
        Ok(Url::parse_with_params(FEED_URL, &[("channel_id", channel_id)])?)
    }

    /// Download the raw feed document
    pub async fn fetch(&self, channel_id: &str) -> Result<String> {
        let url = Self::feed_url(channel_id)?;
        tracing::debug!("Fetching channel feed: {}", url);

        let response = self
            .http
            .get(url)
            .send()
            .await
            .context("Failed to fetch channel feed")?;

        if !response.status().is_success() {
            anyhow::bail!(
                "Channel feed for {} returned HTTP {}",
                channel_id,
                response.status()
            );
        }

        response.text().await.context("Failed to read channel feed")
    }
}

#[async_trait]
impl VideoFeed for ChannelFeed {
    async fn latest_videos(&self, channel_id: &str, limit: usize) -> Result<Vec<VideoEntry>> {
        let xml = self.fetch(channel_id).await?;
        parse_feed(&xml, limit)
    }
}

/// Parse a channel feed, keeping the first `limit` entries that carry a video id
pub fn parse_feed(xml: &str, limit: usize) -> Result<Vec<VideoEntry>> {
    let feed: AtomFeed = from_str(xml).context("Failed to parse channel feed XML")?;

    let videos = feed
        .entries
        .into_iter()
        .take(limit)
        .filter_map(|entry| {
            let id = entry
                .video_id
                .filter(|id| !id.trim().is_empty())
                .or_else(|| {
                    entry
                        .id
                        .as_deref()
                        .and_then(|id| id.strip_prefix("yt:video:"))
                        .map(str::to_string)
                })?
                .trim()
                .to_string();

            let link = entry
                .link
                .map(|link| link.href)
                .unwrap_or_else(|| watch_url(&id));

            Some(VideoEntry {
                title: entry.title.unwrap_or_default(),
                link,
                published: entry.published.unwrap_or_default(),
                id,
            })
        })
        .collect();

    Ok(videos)
}

#[cfg(test)]
mod tests {
    use super::*;

    const FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns:yt="http://www.youtube.com/xml/schemas/2015" xmlns:media="http://search.yahoo.com/mrss/" xmlns="http://www.w3.org/2005/Atom">
 <link rel="self" href="http://www.youtube.com/feeds/videos.xml?channel_id=UC123"/>
 <id>yt:channel:UC123</id>
 <title>Example Channel</title>
 <link rel="alternate" href="https://www.youtube.com/channel/UC123"/>
 <published>2020-01-01T00:00:00+00:00</published>
 <entry>
  <id>yt:video:newest01</id>
  <yt:videoId>newest01</yt:videoId>
  <yt:channelId>UC123</yt:channelId>
  <title>Newest &amp; best</title>
  <link rel="alternate" href="https://www.youtube.com/watch?v=newest01"/>
  <published>2024-05-02T10:00:00+00:00</published>
  <updated>2024-05-02T11:00:00+00:00</updated>
  <media:group>
   <media:title>Newest &amp; best</media:title>
  </media:group>
 </entry>
 <entry>
  <id>yt:video:middle02</id>
  <title>Middle</title>
  <published>2024-05-01T10:00:00+00:00</published>
 </entry>
 <entry>
  <id>yt:video:oldest03</id>
  <yt:videoId>oldest03</yt:videoId>
  <title>Oldest</title>
  <link rel="alternate" href="https://www.youtube.com/watch?v=oldest03"/>
  <published>2024-04-30T10:00:00+00:00</published>
 </entry>
</feed>"#;

    #[test]
    fn test_parse_feed_keeps_order_and_fields() {
        let videos = parse_feed(FEED, 10).unwrap();
        assert_eq!(videos.len(), 3);
        assert_eq!(
            videos[0],
            VideoEntry {
                id: "newest01".to_string(),
                title: "Newest & best".to_string(),
                link: "https://www.youtube.com/watch?v=newest01".to_string(),
                published: "2024-05-02T10:00:00+00:00".to_string(),
            }
        );
        assert_eq!(videos[2].id, "oldest03");
    }

    #[test]
    fn test_parse_feed_falls_back_to_atom_id() {
        let videos = parse_feed(FEED, 10).unwrap();
        assert_eq!(videos[1].id, "middle02");
        assert_eq!(videos[1].link, "https://www.youtube.com/watch?v=middle02");
    }

    #[test]
    fn test_parse_feed_respects_limit() {
        let videos = parse_feed(FEED, 2).unwrap();
        assert_eq!(
            videos.iter().map(|v| v.id.as_str()).collect::<Vec<_>>(),
            vec!["newest01", "middle02"]
        );
    }

    #[test]
    fn test_parse_feed_without_entries() {
        let xml = r#"<feed xmlns="http://www.w3.org/2005/Atom"><title>Empty</title></feed>"#;
        assert!(parse_feed(xml, 3).unwrap().is_empty());
    }

    #[test]
    fn test_feed_url_encodes_channel() {
        let url = ChannelFeed::feed_url("UC a&b").unwrap();
        assert_eq!(
            url.as_str(),
            "https://www.youtube.com/feeds/videos.xml?channel_id=UC+a%26b"
        );
    }
}
