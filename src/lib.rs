//! YouTube Briefing - monitors YouTube channels and mails a daily digest
//!
//! Each run discovers new videos for the configured channels, obtains a transcript
//! (or falls back to the audio track), asks an LLM for a summary and keywords,
//! optionally renders the summary as speech and sends one HTML email briefing.
//! Every stage persists its output so an interrupted run resumes where it stopped.

pub mod analysis;
pub mod checks;
pub mod cli;
pub mod config;
pub mod ledger;
pub mod pipeline;
pub mod report;
pub mod sources;
pub mod speech;
pub mod storage;
pub mod utils;
pub mod youtube;

pub use analysis::{Analysis, AnalysisInput, Analyzer};
pub use cli::{CheckTarget, Cli, Commands};
pub use config::{Config, Credentials};
pub use ledger::{Ledger, VideoRecord, VideoStatus};
pub use pipeline::{Collaborators, Delivery, MonitorPipeline, PipelineOptions, RunSummary};
pub use report::{ReportDispatcher, ReportEntry};
pub use sources::{Channel, SourceRegistry, Subscription};
pub use storage::{ArtifactStore, FsArtifactStore, Stage};

/// Result type used throughout the library
pub type Result<T> = anyhow::Result<T>;

/// Error types callers need to tell apart
#[derive(thiserror::Error, Debug)]
pub enum BriefingError {
    #[error("Missing credential for {provider}: set {variable}")]
    MissingCredential {
        provider: &'static str,
        variable: &'static str,
    },

    #[error("Invalid video id: {0:?}")]
    InvalidVideoId(String),

    #[error("Artifact {stage} already exists for video {video_id}")]
    ArtifactExists { video_id: String, stage: &'static str },

    #[error("Unknown video status: {0}")]
    UnknownStatus(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}
