//! Connectivity self-tests behind `briefing check ...`.

use std::path::PathBuf;

use crate::analysis::{build_analyzer, Provider};
use crate::config::{Config, Credentials};
use crate::report::{EmailDispatcher, ReportDispatcher, ReportEntry};
use crate::speech::build_synthesizer;
use crate::utils::{format_file_size, spinner};
use crate::youtube::VideoFeed;
use crate::Result;

const TTS_TEST_FILE: &str = "sound-test.mp3";

/// Send a briefing with one made-up video
pub async fn check_email(config: &Config, credentials: &Credentials) -> Result<()> {
    println!("Sending test email to {}...", config.email.receiver);

    let dispatcher = EmailDispatcher::new(
        config.project_name.clone(),
        config.email.clone(),
        credentials.email_password.clone(),
    );
    let entry = ReportEntry {
        channel_name: "Test Channel".to_string(),
        title: "Test Video Title".to_string(),
        link: "https://www.youtube.com".to_string(),
        video_id: "test_video_id".to_string(),
        summary: "This is a test summary for the email configuration check.".to_string(),
        keywords: vec!["test".to_string()],
        audio_path: None,
    };

    dispatcher.dispatch(&[entry]).await?;
    println!("✅ Test email sent successfully.");
    Ok(())
}

/// Synthesize `text` into `sound-test.mp3` in the working directory
pub async fn check_tts(
    config: &Config,
    credentials: &Credentials,
    http: reqwest::Client,
    text: &str,
    show_progress: bool,
) -> Result<PathBuf> {
    let destination = PathBuf::from(TTS_TEST_FILE);
    let synthesizer = build_synthesizer(config.tts.provider, credentials, http);

    let progress = spinner(
        format!("Generating speech ({:?}, {})...", config.tts.provider, config.tts.language),
        show_progress,
    );
    let result = synthesizer
        .synthesize(text, &destination, &config.tts.language)
        .await;
    progress.finish_and_clear();
    result?;

    let size = fs_err::metadata(&destination)?.len();
    println!(
        "✅ Saved {} ({})",
        destination.display(),
        format_file_size(size)
    );
    Ok(destination)
}

/// Outcome of fetching one channel feed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedStatus {
    pub channel_name: String,
    pub channel_id: String,
    /// Number of entries, or the error text
    pub result: std::result::Result<usize, String>,
}

/// Fetch the feed of every subscription
pub async fn check_feeds(config: &Config, feed: &dyn VideoFeed) -> Vec<FeedStatus> {
    println!("Checking YouTube channels...");
    let mut statuses = Vec::with_capacity(config.subscriptions.len());

    for sub in &config.subscriptions {
        let result = feed
            .latest_videos(&sub.channel_id, usize::MAX)
            .await
            .map(|entries| entries.len())
            .map_err(|e| format!("{:#}", e));

        match &result {
            Ok(0) => println!(
                "  ⚠️  {} ({}): reachable but no entries",
                sub.channel_name, sub.channel_id
            ),
            Ok(count) => println!(
                "  ✅ {} ({}): OK, {} entries",
                sub.channel_name, sub.channel_id, count
            ),
            Err(e) => println!(
                "  ❌ {} ({}): {} - check the channel id",
                sub.channel_name, sub.channel_id, e
            ),
        }

        statuses.push(FeedStatus {
            channel_name: sub.channel_name.clone(),
            channel_id: sub.channel_id.clone(),
            result,
        });
    }
    statuses
}

/// Which provider/model pairs `check ai` talks to
#[derive(Debug, Default, PartialEq, Eq)]
pub struct AiCheckPlan {
    /// Distinct pairs with a configured key, in first-use order
    pub targets: Vec<(Provider, String)>,
    /// Distinct pairs whose key is missing
    pub skipped: Vec<(Provider, String)>,
    /// Channels without their own provider/model, using the `ai` section
    pub inheriting: Vec<String>,
}

pub fn plan_ai_checks(config: &Config, credentials: &Credentials) -> AiCheckPlan {
    let mut plan = AiCheckPlan::default();

    for sub in &config.subscriptions {
        if sub.provider.is_none() && sub.model.is_none() {
            plan.inheriting.push(sub.channel_name.clone());
        }

        let (provider, model) = config.analyzer_for(sub);
        let pair = (
            provider,
            model.unwrap_or_else(|| provider.default_model().to_string()),
        );
        if plan.targets.contains(&pair) || plan.skipped.contains(&pair) {
            continue;
        }
        if credentials.api_key(provider).is_some() {
            plan.targets.push(pair);
        } else {
            plan.skipped.push(pair);
        }
    }
    plan
}

/// Say "Hello" once per distinct provider/model; returns the number of failures
pub async fn check_ai(
    config: &Config,
    credentials: &Credentials,
    http: reqwest::Client,
    show_progress: bool,
) -> usize {
    println!("Testing AI connections...");
    let plan = plan_ai_checks(config, credentials);

    for channel in &plan.inheriting {
        println!(
            "  ℹ️  {} has no provider/model of its own, using {}",
            channel, config.ai.provider
        );
    }
    for (provider, model) in &plan.skipped {
        println!(
            "  ⏭️  Skipping {}/{} (no API key configured)",
            provider, model
        );
    }

    let mut failures = 0;
    for (provider, model) in &plan.targets {
        let analyzer = build_analyzer(*provider, Some(model.as_str()), credentials, http.clone());
        let progress = spinner(format!("Checking {}...", analyzer.describe()), show_progress);
        let result = analyzer.ping().await;
        progress.finish_and_clear();

        match result {
            Ok(_) => println!("  ✅ {}: OK", analyzer.describe()),
            Err(e) => {
                failures += 1;
                println!("  ❌ {}: FAILED ({:#})", analyzer.describe(), e);
            }
        }
    }
    failures
}
