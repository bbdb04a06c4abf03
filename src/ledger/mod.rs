//! Durable record of every video ever discovered.
//!
//! Each call commits immediately; there is no in-memory state to lose between
//! stages. Status only ever moves forward: `new -> processed -> emailed`.

use anyhow::Context;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;

use crate::{BriefingError, Result};

/// Lifecycle of a video in the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoStatus {
    New,
    Processed,
    Emailed,
}

impl VideoStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VideoStatus::New => "new",
            VideoStatus::Processed => "processed",
            VideoStatus::Emailed => "emailed",
        }
    }

    /// Delivered videos are never picked up again
    pub fn is_terminal(&self) -> bool {
        matches!(self, VideoStatus::Emailed)
    }
}

impl FromStr for VideoStatus {
    type Err = BriefingError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "new" => Ok(VideoStatus::New),
            "processed" => Ok(VideoStatus::Processed),
            "emailed" => Ok(VideoStatus::Emailed),
            other => Err(BriefingError::UnknownStatus(other.to_string())),
        }
    }
}

impl std::fmt::Display for VideoStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A row from the `videos` table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoRecord {
    pub id: String,
    pub channel_id: String,
    pub title: String,
    pub summary: Option<String>,
    pub status: VideoStatus,
    pub published_at: String,
}

/// A row from the `channels` table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelRecord {
    pub id: String,
    pub name: String,
    pub user_prompt: String,
}

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS channels (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        user_prompt TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS videos (
        id TEXT PRIMARY KEY,
        channel_id TEXT NOT NULL,
        title TEXT NOT NULL,
        summary TEXT,
        status TEXT NOT NULL DEFAULT 'new',
        published_at TEXT NOT NULL,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        FOREIGN KEY(channel_id) REFERENCES channels(id)
    );

    CREATE TABLE IF NOT EXISTS keywords (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        video_id TEXT NOT NULL,
        keyword TEXT NOT NULL,
        UNIQUE(video_id, keyword),
        FOREIGN KEY(video_id) REFERENCES videos(id)
    );

    CREATE INDEX IF NOT EXISTS idx_videos_status ON videos(status);
";

/// SQLite-backed ledger
pub struct Ledger {
    conn: Connection,
}

impl Ledger {
    /// Open (and create if needed) the ledger database at `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs_err::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open ledger at {}", path.display()))?;
        Self::bootstrap(conn)
    }

    pub fn in_memory() -> Result<Self> {
        Self::bootstrap(Connection::open_in_memory()?)
    }

    fn bootstrap(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)
            .context("Failed to initialise ledger schema")?;
        Ok(Self { conn })
    }

    /// Insert or refresh a channel; unchanged rows are left untouched
    pub fn upsert_channel(&self, id: &str, name: &str, user_prompt: &str) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO channels (id, name, user_prompt)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(id) DO UPDATE SET
                     name = excluded.name,
                     user_prompt = excluded.user_prompt
                 WHERE name != excluded.name OR user_prompt != excluded.user_prompt",
                params![id, name, user_prompt],
            )
            .with_context(|| format!("Failed to upsert channel {}", id))?;
        Ok(())
    }

    pub fn channel(&self, id: &str) -> Result<Option<ChannelRecord>> {
        let record = self
            .conn
            .query_row(
                "SELECT id, name, user_prompt FROM channels WHERE id = ?1",
                params![id],
                |row| {
                    Ok(ChannelRecord {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        user_prompt: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(record)
    }

    pub fn get_video(&self, id: &str) -> Result<Option<VideoRecord>> {
        let row = self
            .conn
            .query_row(
                "SELECT id, channel_id, title, summary, status, published_at
                 FROM videos WHERE id = ?1",
                params![id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, Option<String>>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, String>(5)?,
                    ))
                },
            )
            .optional()
            .with_context(|| format!("Failed to look up video {}", id))?;

        row.map(|(id, channel_id, title, summary, status, published_at)| {
            Ok::<_, anyhow::Error>(VideoRecord {
                id,
                channel_id,
                title,
                summary,
                status: status.parse()?,
                published_at,
            })
        })
        .transpose()
    }

    /// Record a newly discovered video. Returns `false` if the id was already known;
    /// identity fields of an existing row are never overwritten.
    pub fn add_video(
        &self,
        id: &str,
        channel_id: &str,
        title: &str,
        published_at: &str,
        status: VideoStatus,
    ) -> Result<bool> {
        let now = chrono::Utc::now().to_rfc3339();
        let inserted = self
            .conn
            .execute(
                "INSERT OR IGNORE INTO videos
                     (id, channel_id, title, published_at, status, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
                params![id, channel_id, title, published_at, status.as_str(), now],
            )
            .with_context(|| format!("Failed to add video {}", id))?;
        Ok(inserted == 1)
    }

    /// Advance a video's status. Backward moves and unknown ids are ignored;
    /// the return value tells whether the row changed.
    pub fn set_status(&self, id: &str, status: VideoStatus) -> Result<bool> {
        let current = match self.get_video(id)? {
            Some(video) => video.status,
            None => return Ok(false),
        };

        if status <= current {
            if status < current {
                tracing::warn!(
                    video_id = id,
                    from = %current,
                    to = %status,
                    "Ignoring backward status transition"
                );
            }
            return Ok(false);
        }

        self.conn
            .execute(
                "UPDATE videos SET status = ?1, updated_at = ?2 WHERE id = ?3",
                params![status.as_str(), chrono::Utc::now().to_rfc3339(), id],
            )
            .with_context(|| format!("Failed to set status of {}", id))?;
        Ok(true)
    }

    pub fn set_summary(&self, id: &str, summary: &str) -> Result<()> {
        self.conn
            .execute(
                "UPDATE videos SET summary = ?1, updated_at = ?2 WHERE id = ?3",
                params![summary, chrono::Utc::now().to_rfc3339(), id],
            )
            .with_context(|| format!("Failed to store summary of {}", id))?;
        Ok(())
    }

    /// Attach a keyword; returns `false` when the pair already existed
    pub fn add_keyword(&self, id: &str, keyword: &str) -> Result<bool> {
        let inserted = self
            .conn
            .execute(
                "INSERT OR IGNORE INTO keywords (video_id, keyword) VALUES (?1, ?2)",
                params![id, keyword],
            )
            .with_context(|| format!("Failed to add keyword to {}", id))?;
        Ok(inserted == 1)
    }

    pub fn keywords(&self, id: &str) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT keyword FROM keywords WHERE video_id = ?1 ORDER BY id")?;
        let keywords = stmt
            .query_map(params![id], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(keywords)
    }

    pub fn videos_with_status(&self, status: VideoStatus) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id FROM videos WHERE status = ?1 ORDER BY created_at, id")?;
        let ids = stmt
            .query_map(params![status.as_str()], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(ids)
    }

    /// Number of rows changed since the ledger was opened
    pub fn total_changes(&self) -> Result<i64> {
        let changes = self
            .conn
            .query_row("SELECT total_changes()", [], |row| row.get(0))?;
        Ok(changes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn ledger_with_video() -> Ledger {
        let ledger = Ledger::in_memory().unwrap();
        ledger.upsert_channel("c1", "Channel", "Focus").unwrap();
        assert!(ledger
            .add_video("v1", "c1", "T", "P", VideoStatus::New)
            .unwrap());
        ledger
    }

    #[test]
    fn test_add_is_first_write_wins() {
        let ledger = ledger_with_video();
        assert!(!ledger
            .add_video("v1", "c2", "Other title", "Q", VideoStatus::New)
            .unwrap());

        let video = ledger.get_video("v1").unwrap().unwrap();
        assert_eq!(video.channel_id, "c1");
        assert_eq!(video.title, "T");
        assert_eq!(video.published_at, "P");
        assert_eq!(video.status, VideoStatus::New);
        assert_eq!(video.summary, None);
    }

    #[test]
    fn test_missing_video_is_absent() {
        let ledger = Ledger::in_memory().unwrap();
        assert_eq!(ledger.get_video("nope").unwrap(), None);
        assert!(!ledger.set_status("nope", VideoStatus::Processed).unwrap());
    }

    #[test]
    fn test_status_only_moves_forward() {
        let ledger = ledger_with_video();
        assert!(ledger.set_status("v1", VideoStatus::Processed).unwrap());
        assert!(!ledger.set_status("v1", VideoStatus::Processed).unwrap());
        assert!(ledger.set_status("v1", VideoStatus::Emailed).unwrap());
        assert!(!ledger.set_status("v1", VideoStatus::New).unwrap());
        assert!(!ledger.set_status("v1", VideoStatus::Processed).unwrap());
        assert_eq!(
            ledger.get_video("v1").unwrap().unwrap().status,
            VideoStatus::Emailed
        );
    }

    #[test]
    fn test_keyword_insert_is_idempotent() {
        let ledger = ledger_with_video();
        assert!(ledger.add_keyword("v1", "rust").unwrap());
        assert!(!ledger.add_keyword("v1", "rust").unwrap());
        assert!(ledger.add_keyword("v1", "sqlite").unwrap());
        assert_eq!(ledger.keywords("v1").unwrap(), vec!["rust", "sqlite"]);
    }

    #[test]
    fn test_upsert_channel_updates_in_place() {
        let ledger = Ledger::in_memory().unwrap();
        ledger.upsert_channel("c1", "Old", "p1").unwrap();
        ledger.upsert_channel("c1", "New", "p2").unwrap();
        let channel = ledger.channel("c1").unwrap().unwrap();
        assert_eq!(channel.name, "New");
        assert_eq!(channel.user_prompt, "p2");

        let before = ledger.total_changes().unwrap();
        ledger.upsert_channel("c1", "New", "p2").unwrap();
        assert_eq!(ledger.total_changes().unwrap(), before);
    }

    #[test]
    fn test_summary_and_status_query() {
        let ledger = ledger_with_video();
        ledger.add_video("v2", "c1", "T2", "P2", VideoStatus::New).unwrap();
        ledger.set_summary("v1", "S1").unwrap();
        ledger.set_status("v1", VideoStatus::Processed).unwrap();

        assert_eq!(
            ledger.get_video("v1").unwrap().unwrap().summary.as_deref(),
            Some("S1")
        );
        assert_eq!(
            ledger.videos_with_status(VideoStatus::Processed).unwrap(),
            vec!["v1"]
        );
        assert_eq!(ledger.videos_with_status(VideoStatus::New).unwrap(), vec!["v2"]);
    }

    #[test]
    fn test_state_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state").join("ledger.db");

        {
            let ledger = Ledger::open(&path).unwrap();
            ledger.upsert_channel("c1", "Channel", "Focus").unwrap();
            ledger.add_video("v1", "c1", "T", "P", VideoStatus::New).unwrap();
            ledger.set_status("v1", VideoStatus::Processed).unwrap();
            ledger.add_keyword("v1", "a").unwrap();
        }

        let ledger = Ledger::open(&path).unwrap();
        let video = ledger.get_video("v1").unwrap().unwrap();
        assert_eq!(video.status, VideoStatus::Processed);
        assert_eq!(ledger.keywords("v1").unwrap(), vec!["a"]);
    }

    #[test]
    fn test_status_parsing() {
        assert_eq!("emailed".parse::<VideoStatus>().unwrap(), VideoStatus::Emailed);
        assert!("done".parse::<VideoStatus>().is_err());
        assert!(VideoStatus::New < VideoStatus::Processed);
        assert!(VideoStatus::Emailed.is_terminal());
    }
}
