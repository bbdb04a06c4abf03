use anyhow::Result;
use clap::Parser;
use std::path::Path;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use yt_briefing::report::EmailDispatcher;
use yt_briefing::speech::build_synthesizer;
use yt_briefing::youtube::{ChannelFeed, YtDlp};
use yt_briefing::{
    checks, utils, CheckTarget, Cli, Collaborators, Commands, Config, Credentials, Delivery,
    FsArtifactStore, Ledger, MonitorPipeline, PipelineOptions, SourceRegistry, VideoStatus,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Secrets may live in a .env file next to the config
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_json);

    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Init => init(config_path)?,
        Commands::Run => {
            let Runtime {
                config,
                credentials,
                http,
            } = Runtime::load(config_path)?;

            // Check for required external dependencies (non-fatal)
            let missing_deps = utils::check_dependencies().await;
            if !missing_deps.is_empty() {
                eprintln!("⚠️  Dependency check warnings:");
                for dep in missing_deps {
                    eprintln!("   • {}", dep);
                }
                eprintln!("   (Continuing anyway - tools may be available)");
            }

            let registry = SourceRegistry::from_config(&config, &credentials, http.clone())?;
            let ledger = Ledger::open(&config.storage.database)?;
            let store = FsArtifactStore::new(config.storage.data_dir.clone());

            let ytdlp = YtDlp::new(http.clone(), config.options.transcript_languages.clone())
                .with_progress(!cli.quiet);
            let collaborators = Collaborators {
                feed: Box::new(ChannelFeed::new(http.clone())),
                transcripts: Box::new(ytdlp.clone()),
                audio: Box::new(ytdlp),
                speech: config
                    .tts
                    .enabled
                    .then(|| build_synthesizer(config.tts.provider, &credentials, http.clone())),
                dispatcher: Box::new(EmailDispatcher::new(
                    config.project_name.clone(),
                    config.email.clone(),
                    credentials.email_password.clone(),
                )),
            };

            let pipeline = MonitorPipeline::new(
                PipelineOptions::from_config(&config),
                ledger,
                Box::new(store),
                collaborators,
            );

            tracing::info!("Starting run for {} channel(s)", registry.len());
            let summary = pipeline.run(&registry).await?;

            println!("{}", summary);
            if summary.delivery == Delivery::NotSent {
                let pending = pipeline.ledger().videos_with_status(VideoStatus::Processed)?;
                eprintln!(
                    "⚠️  Briefing was not sent. {} video(s) will be included in the next run.",
                    pending.len()
                );
            }
        }
        Commands::Config { show } => {
            if show {
                Config::load(config_path)?.display();
            } else {
                println!("Edit the config file manually:");
                println!("  {}", Config::config_path(config_path)?.display());
            }
        }
        Commands::Check { target } => {
            let Runtime {
                config,
                credentials,
                http,
            } = Runtime::load(config_path)?;

            match target {
                CheckTarget::Email => checks::check_email(&config, &credentials).await?,
                CheckTarget::Tts { text } => {
                    checks::check_tts(&config, &credentials, http, &text, !cli.quiet).await?;
                }
                CheckTarget::Feeds => {
                    let feed = ChannelFeed::new(http);
                    let statuses = checks::check_feeds(&config, &feed).await;
                    let failed = statuses.iter().filter(|s| s.result.is_err()).count();
                    if failed > 0 {
                        anyhow::bail!("{} of {} feed(s) failed", failed, statuses.len());
                    }
                }
                CheckTarget::Ai => {
                    let failures = checks::check_ai(&config, &credentials, http, !cli.quiet).await;
                    if failures > 0 {
                        anyhow::bail!("{} AI connection(s) failed", failures);
                    }
                }
            }
        }
    }

    Ok(())
}

/// Everything a command needs besides the CLI flags
struct Runtime {
    config: Config,
    credentials: Credentials,
    http: reqwest::Client,
}

impl Runtime {
    fn load(config_path: Option<&Path>) -> Result<Self> {
        let config = Config::load(config_path)?;
        let credentials = Credentials::from_env();
        tracing::debug!(?credentials, "Credentials loaded");

        let http = reqwest::Client::builder()
            .user_agent(concat!("yt-briefing/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(300))
            .build()?;

        Ok(Self {
            config,
            credentials,
            http,
        })
    }
}

fn init_tracing(verbose: bool, json: bool) {
    let default_filter = if verbose {
        "yt_briefing=debug,briefing=debug"
    } else {
        "yt_briefing=info,briefing=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into());
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn init(explicit: Option<&Path>) -> Result<()> {
    let path = Config::config_path(explicit)?;
    if path.exists() {
        println!("{} already exists.", path.display());
        return Ok(());
    }

    Config::example().save(&path)?;
    println!("Created {}", path.display());
    println!("Put your API keys and EMAIL_PASSWORD into the environment or a .env file.");
    Ok(())
}
