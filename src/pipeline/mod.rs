//! Per-video state machine.
//!
//! For every subscribed channel the pipeline lists recent uploads and drives each
//! undelivered video through metadata -> transcript (or audio fallback) ->
//! analysis -> optional speech -> collect. Each stage persists an artifact and a
//! stage whose artifact exists is never run again. The collected batch is
//! dispatched once at the end; only a successful dispatch marks videos `emailed`.

use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;

use crate::analysis::{Analysis, AnalysisInput};
use crate::config::Config;
use crate::ledger::{Ledger, VideoStatus};
use crate::report::{ReportDispatcher, ReportEntry};
use crate::sources::{SourceRegistry, Subscription};
use crate::speech::SpeechSynthesizer;
use crate::storage::{load_text, save_json, ArtifactStore, Stage};
use crate::youtube::{watch_url, AudioDownloader, TranscriptSource, VideoEntry, VideoFeed};
use crate::Result;


/// Run-time switches taken from the configuration
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub system_prompt: String,
    pub max_videos_per_channel: usize,
    pub allow_audio_fallback: bool,
    pub retry_degraded_analysis: bool,
    pub tts_language: String,
}

impl PipelineOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            system_prompt: config.system_prompt.clone(),
            max_videos_per_channel: config.options.max_videos_per_channel,
            allow_audio_fallback: config.options.allow_audio_download_fallback,
            retry_degraded_analysis: config.options.retry_degraded_analysis,
            tts_language: config.tts.language.clone(),
        }
    }
}

/// External services the pipeline talks to
pub struct Collaborators {
    pub feed: Box<dyn VideoFeed>,
    pub transcripts: Box<dyn TranscriptSource>,
    pub audio: Box<dyn AudioDownloader>,
    /// `None` when text-to-speech is disabled
    pub speech: Option<Box<dyn SpeechSynthesizer>>,
    pub dispatcher: Box<dyn ReportDispatcher>,
}

/// What happened to the briefing at the end of a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Delivery {
    #[default]
    NothingToSend,
    Sent,
    NotSent,
}

impl fmt::Display for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Delivery::NothingToSend => f.write_str("nothing to send"),
            Delivery::Sent => f.write_str("sent"),
            Delivery::NotSent => f.write_str("NOT sent"),
        }
    }
}

/// Counters for one run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub channels: usize,
    pub discovered: usize,
    /// Already emailed in an earlier run
    pub skipped_delivered: usize,
    /// Left for the next run (no transcript, download failed)
    pub abandoned: usize,
    /// Hit an error, e.g. a storage failure
    pub failed: usize,
    pub collected: usize,
    pub delivery: Delivery,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} channel(s), {} video(s) discovered, {} already delivered, {} postponed, {} failed, {} in briefing; briefing {}",
            self.channels,
            self.discovered,
            self.skipped_delivered,
            self.abandoned,
            self.failed,
            self.collected,
            self.delivery
        )
    }
}

/// How far a single video got
enum VideoOutcome {
    Delivered,
    Abandoned,
    Collected(ReportEntry),
}

/// What the analysis artifact says about the Analyze stage
enum StoredAnalysis {
    Missing,
    Final(Analysis),
    /// Degraded and retry is enabled; kept until a replacement exists
    Retry(Analysis),
}

/// Failure while processing one video
enum StepError {
    /// Only this video is affected
    Item(anyhow::Error),
    /// Retrying cannot help, stop the run
    Fatal(anyhow::Error),
}

impl From<anyhow::Error> for StepError {
    fn from(err: anyhow::Error) -> Self {
        StepError::Item(err)
    }
}

type StepResult<T> = std::result::Result<T, StepError>;

pub struct MonitorPipeline {
    options: PipelineOptions,
    ledger: Ledger,
    store: Box<dyn ArtifactStore>,
    collaborators: Collaborators,
}

impl MonitorPipeline {
    pub fn new(
        options: PipelineOptions,
        ledger: Ledger,
        store: Box<dyn ArtifactStore>,
        collaborators: Collaborators,
    ) -> Self {
        Self {
            options,
            ledger,
            store,
            collaborators,
        }
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn store(&self) -> &dyn ArtifactStore {
        self.store.as_ref()
    }

    /// Process every subscription and dispatch the briefing.
    ///
    /// Per-video failures are logged and counted; only a fatal analyzer error
    /// (missing credentials) ends the run early with `Err`.
    pub async fn run(&self, registry: &SourceRegistry) -> Result<RunSummary> {
        let mut summary = RunSummary::default();
        let mut batch: Vec<ReportEntry> = Vec::new();
        let mut seen = HashSet::new();

        for subscription in registry.iter() {
            let channel = &subscription.channel;
            summary.channels += 1;
            tracing::info!(channel = %channel.name, "Checking channel");

            if let Err(e) = self
                .ledger
                .upsert_channel(&channel.id, &channel.name, &channel.user_prompt)
            {
                tracing::warn!(channel = %channel.name, "Could not record channel: {:#}", e);
                tracing::debug!(
                    channel_id = %channel.id,
                    "Ledger keeps its previous name and prompt for this channel"
                );
            }

            let candidates = match self
                .collaborators
                .feed
                .latest_videos(&channel.id, self.options.max_videos_per_channel)
                .await
            {
                Ok(candidates) => candidates,
                Err(e) => {
                    tracing::warn!(channel = %channel.name, "Feed unavailable: {:#}", e);
                    Vec::new()
                }
            };
            summary.discovered += candidates.len();

            for candidate in &candidates {
                if !seen.insert(candidate.id.clone()) {
                    continue;
                }

                match self.process_video(subscription, candidate).await {
                    Ok(VideoOutcome::Delivered) => summary.skipped_delivered += 1,
                    Ok(VideoOutcome::Abandoned) => summary.abandoned += 1,
                    Ok(VideoOutcome::Collected(entry)) => {
                        summary.collected += 1;
                        batch.push(entry);
                    }
                    Err(StepError::Item(e)) => {
                        summary.failed += 1;
                        tracing::error!(
                            video_id = %candidate.id,
                            "Processing failed: {:#}",
                            e
                        );
                    }
                    Err(StepError::Fatal(e)) => {
                        tracing::error!(video_id = %candidate.id, "Aborting run: {:#}", e);
                        return Err(e);
                    }
                }
            }
        }

        summary.delivery = self.deliver(&batch).await;
        tracing::info!("Run finished: {}", summary);
        Ok(summary)
    }

    async fn process_video(
        &self,
        subscription: &Subscription,
        candidate: &VideoEntry,
    ) -> StepResult<VideoOutcome> {
        let channel = &subscription.channel;
        let id = candidate.id.as_str();

        // Admission
        let status = match self.ledger.get_video(id)? {
            Some(video) if video.status.is_terminal() => {
                tracing::debug!(video_id = id, "Already emailed, skipping");
                return Ok(VideoOutcome::Delivered);
            }
            Some(video) => video.status,
            None => {
                self.ledger.add_video(
                    id,
                    &channel.id,
                    &candidate.title,
                    &candidate.published,
                    VideoStatus::New,
                )?;
                tracing::info!(video_id = id, title = %candidate.title, "New video");
                VideoStatus::New
            }
        };

        // Acquire
        if !self.store.has(id, Stage::Metadata) {
            save_json(self.store.as_ref(), id, Stage::Metadata, candidate)?;
        }

        // Transcript-or-fallback, then analyze
        let analysis = match self.stored_analysis(id)? {
            StoredAnalysis::Final(analysis) => {
                tracing::debug!(video_id = id, "Reusing analysis");
                if status == VideoStatus::New {
                    // Crashed between writing the artifact and updating the ledger
                    self.record_analysis(id, &analysis)?;
                }
                analysis
            }
            StoredAnalysis::Retry(previous) => {
                tracing::info!(video_id = id, "Retrying degraded analysis");
                match self.analyze(subscription, id).await? {
                    Some(analysis) => analysis,
                    None => {
                        tracing::info!(
                            video_id = id,
                            "Retry not possible, keeping degraded analysis"
                        );
                        if status == VideoStatus::New {
                            self.record_analysis(id, &previous)?;
                        }
                        previous
                    }
                }
            }
            StoredAnalysis::Missing => match self.analyze(subscription, id).await? {
                Some(analysis) => analysis,
                None => return Ok(VideoOutcome::Abandoned),
            },
        };

        // Synthesize
        let audio_path = match &self.collaborators.speech {
            Some(speech) => self.summary_audio(speech.as_ref(), id, analysis.summary()).await,
            None => None,
        };

        // Collect
        let link = if candidate.link.is_empty() {
            watch_url(id)
        } else {
            candidate.link.clone()
        };
        Ok(VideoOutcome::Collected(ReportEntry {
            channel_name: channel.name.clone(),
            title: candidate.title.clone(),
            link,
            video_id: id.to_string(),
            summary: analysis.summary().to_string(),
            keywords: analysis.keywords().to_vec(),
            audio_path,
        }))
    }

    fn stored_analysis(&self, id: &str) -> Result<StoredAnalysis> {
        let bytes = match self.store.read(id, Stage::Analysis)? {
            Some(bytes) => bytes,
            None => return Ok(StoredAnalysis::Missing),
        };

        let analysis: Analysis = match serde_json::from_slice(&bytes) {
            Ok(analysis) => analysis,
            Err(e) => {
                tracing::warn!(video_id = id, "Discarding unreadable analysis artifact: {}", e);
                self.store.discard(id, Stage::Analysis)?;
                return Ok(StoredAnalysis::Missing);
            }
        };

        if analysis.is_degraded() && self.options.retry_degraded_analysis {
            Ok(StoredAnalysis::Retry(analysis))
        } else {
            Ok(StoredAnalysis::Final(analysis))
        }
    }

    /// Run the analyzer and persist its result over any stored one.
    /// `None` means no input could be obtained this run.
    async fn analyze(
        &self,
        subscription: &Subscription,
        id: &str,
    ) -> StepResult<Option<Analysis>> {
        let input = match self.analysis_input(id).await? {
            Some(input) => input,
            None => return Ok(None),
        };

        tracing::info!(
            video_id = id,
            input = input.kind(),
            analyzer = %subscription.analyzer.describe(),
            "Analyzing"
        );
        let analysis = subscription
            .analyzer
            .analyze(
                &input,
                &self.options.system_prompt,
                &subscription.channel.user_prompt,
            )
            .await
            .map_err(StepError::Fatal)?;
        if analysis.is_degraded() {
            tracing::warn!(video_id = id, "Analysis degraded: {}", analysis.summary());
        }

        save_json(self.store.as_ref(), id, Stage::Analysis, &analysis)?;
        self.record_analysis(id, &analysis)?;
        Ok(Some(analysis))
    }

    /// Transcript text if there is one, else the fallback audio if allowed.
    /// `None` postpones the video to the next run.
    async fn analysis_input(&self, id: &str) -> Result<Option<AnalysisInput>> {
        if let Some(text) = load_text(self.store.as_ref(), id, Stage::Transcript)? {
            return Ok(Some(AnalysisInput::Transcript(text)));
        }

        match self.collaborators.transcripts.fetch_transcript(id).await {
            Ok(Some(text)) if !text.trim().is_empty() => {
                self.store.write(id, Stage::Transcript, text.as_bytes())?;
                return Ok(Some(AnalysisInput::Transcript(text)));
            }
            Ok(_) => tracing::info!(video_id = id, "No transcript available"),
            Err(e) => tracing::warn!(video_id = id, "Transcript fetch failed: {:#}", e),
        }

        if !self.options.allow_audio_fallback {
            tracing::info!(video_id = id, "Audio fallback disabled, retrying next run");
            return Ok(None);
        }

        let destination = self.store.locate(id, Stage::FallbackAudio)?;
        if self.store.has(id, Stage::FallbackAudio) {
            return Ok(Some(AnalysisInput::Audio(destination)));
        }

        match self
            .collaborators
            .audio
            .download_audio(id, &destination)
            .await
        {
            Ok(path) => Ok(Some(AnalysisInput::Audio(path))),
            Err(e) => {
                tracing::warn!(video_id = id, "Audio download failed: {:#}", e);
                Ok(None)
            }
        }
    }

    fn record_analysis(&self, id: &str, analysis: &Analysis) -> Result<()> {
        self.ledger.set_summary(id, analysis.summary())?;
        for keyword in analysis.keywords() {
            self.ledger.add_keyword(id, keyword)?;
        }
        self.ledger.set_status(id, VideoStatus::Processed)?;
        Ok(())
    }

    /// Spoken summary; failures only cost the attachment
    async fn summary_audio(
        &self,
        speech: &dyn SpeechSynthesizer,
        id: &str,
        summary: &str,
    ) -> Option<PathBuf> {
        let destination = match self.store.locate(id, Stage::SummaryAudio) {
            Ok(path) => path,
            Err(e) => {
                tracing::warn!(video_id = id, "No place for spoken summary: {:#}", e);
                return None;
            }
        };

        if self.store.has(id, Stage::SummaryAudio) {
            return Some(destination);
        }
        if summary.trim().is_empty() {
            return None;
        }

        match speech
            .synthesize(summary, &destination, &self.options.tts_language)
            .await
        {
            Ok(()) => Some(destination),
            Err(e) => {
                tracing::warn!(video_id = id, "Speech synthesis failed: {:#}", e);
                None
            }
        }
    }

    async fn deliver(&self, batch: &[ReportEntry]) -> Delivery {
        if batch.is_empty() {
            tracing::info!("No new videos, nothing to send");
            return Delivery::NothingToSend;
        }

        if let Err(e) = self.collaborators.dispatcher.dispatch(batch).await {
            tracing::error!(
                "Briefing not sent, {} video(s) stay processed: {:#}",
                batch.len(),
                e
            );
            return Delivery::NotSent;
        }

        for entry in batch {
            if let Err(e) = self.ledger.set_status(&entry.video_id, VideoStatus::Emailed) {
                tracing::error!(video_id = %entry.video_id, "Could not mark as emailed: {:#}", e);
            }
        }
        Delivery::Sent
    }
}
