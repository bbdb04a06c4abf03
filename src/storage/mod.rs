//! Per-video artifact cache.
//!
//! Every pipeline stage writes its output under a namespace named after the video id.
//! The presence of an artifact is what tells the pipeline a stage is done, so the
//! storage medium only has to answer `has`/`read`/`write` honestly.

use anyhow::Context;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::utils::is_safe_path_component;
use crate::{BriefingError, Result};

/// Artifacts produced by the pipeline, one per stage output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Raw feed entry as discovered
    Metadata,
    /// Caption text (write-once)
    Transcript,
    /// Audio track downloaded when no transcript exists
    FallbackAudio,
    /// Analysis record (complete or degraded)
    Analysis,
    /// Spoken rendition of the summary
    SummaryAudio,
}

impl Stage {
    pub fn file_name(&self) -> &'static str {
        match self {
            Stage::Metadata => "step1_metadata.json",
            Stage::Transcript => "step2_transcript.txt",
            Stage::FallbackAudio => "step2_fallback_audio.mp3",
            Stage::Analysis => "step3_analysis.json",
            Stage::SummaryAudio => "step4_audio.mp3",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Metadata => "metadata",
            Stage::Transcript => "transcript",
            Stage::FallbackAudio => "fallback_audio",
            Stage::Analysis => "analysis",
            Stage::SummaryAudio => "summary_audio",
        }
    }

    /// Stages that may only be written once per video
    pub fn is_write_once(&self) -> bool {
        matches!(self, Stage::Transcript)
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Key/value store for stage artifacts, keyed by (video id, stage)
pub trait ArtifactStore: Send + Sync {
    /// Whether the artifact exists
    fn has(&self, video_id: &str, stage: Stage) -> bool;

    /// Read an artifact; `Ok(None)` when absent, `Ok(Some(vec![]))` for an empty payload
    fn read(&self, video_id: &str, stage: Stage) -> Result<Option<Vec<u8>>>;

    /// Replace an artifact with `payload`
    fn write(&self, video_id: &str, stage: Stage, payload: &[u8]) -> Result<()>;

    /// Location external tools should write the artifact to
    fn locate(&self, video_id: &str, stage: Stage) -> Result<PathBuf>;

    /// Drop an artifact so the stage runs again
    fn discard(&self, video_id: &str, stage: Stage) -> Result<()>;
}

/// Artifact store backed by `<root>/<video_id>/<stage file>`
pub struct FsArtifactStore {
    root: PathBuf,
}

impl FsArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn video_dir(&self, video_id: &str) -> Result<PathBuf> {
        if !is_safe_path_component(video_id) {
            return Err(BriefingError::InvalidVideoId(video_id.to_string()).into());
        }
        Ok(self.root.join(video_id))
    }

    fn ensure_video_dir(&self, video_id: &str) -> Result<PathBuf> {
        let dir = self.video_dir(video_id)?;
        fs_err::create_dir_all(&dir)
            .with_context(|| format!("Failed to create artifact folder for {}", video_id))?;
        Ok(dir)
    }
}

impl ArtifactStore for FsArtifactStore {
    fn has(&self, video_id: &str, stage: Stage) -> bool {
        self.video_dir(video_id)
            .map(|dir| dir.join(stage.file_name()).is_file())
            .unwrap_or(false)
    }

    fn read(&self, video_id: &str, stage: Stage) -> Result<Option<Vec<u8>>> {
        let path = self.video_dir(video_id)?.join(stage.file_name());
        match std::fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("Failed to read {}", path.display())),
        }
    }

    fn write(&self, video_id: &str, stage: Stage, payload: &[u8]) -> Result<()> {
        let dir = self.ensure_video_dir(video_id)?;
        let path = dir.join(stage.file_name());

        if stage.is_write_once() && path.exists() {
            return Err(BriefingError::ArtifactExists {
                video_id: video_id.to_string(),
                stage: stage.as_str(),
            }
            .into());
        }

        // Readers must never observe a half-written artifact.
        let staging = dir.join(format!("{}.partial", stage.file_name()));
        fs_err::write(&staging, payload)?;
        fs_err::rename(&staging, &path)?;

        tracing::debug!(video_id, %stage, bytes = payload.len(), "Artifact written");
        Ok(())
    }

    fn locate(&self, video_id: &str, stage: Stage) -> Result<PathBuf> {
        Ok(self.ensure_video_dir(video_id)?.join(stage.file_name()))
    }

    fn discard(&self, video_id: &str, stage: Stage) -> Result<()> {
        let path = self.video_dir(video_id)?.join(stage.file_name());
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("Failed to remove {}", path.display())),
        }
    }
}

/// Read a JSON artifact
pub fn load_json<T: DeserializeOwned>(
    store: &dyn ArtifactStore,
    video_id: &str,
    stage: Stage,
) -> Result<Option<T>> {
    match store.read(video_id, stage)? {
        Some(bytes) => {
            let value = serde_json::from_slice(&bytes)
                .with_context(|| format!("Corrupt {} artifact for {}", stage, video_id))?;
            Ok(Some(value))
        }
        None => Ok(None),
    }
}

/// Write a JSON artifact, pretty-printed so the data folder stays inspectable
pub fn save_json<T: Serialize>(
    store: &dyn ArtifactStore,
    video_id: &str,
    stage: Stage,
    value: &T,
) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(value)?;
    store.write(video_id, stage, &bytes)
}

/// Read a UTF-8 text artifact
pub fn load_text(store: &dyn ArtifactStore, video_id: &str, stage: Stage) -> Result<Option<String>> {
    match store.read(video_id, stage)? {
        Some(bytes) => Ok(Some(
            String::from_utf8(bytes)
                .with_context(|| format!("{} artifact for {} is not UTF-8", stage, video_id))?,
        )),
        None => Ok(None),
    }
}
