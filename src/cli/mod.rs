use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "briefing",
    about = "YouTube Briefing - summarize new videos of your subscriptions into one email",
    version,
    long_about = "Checks the configured YouTube channels for new uploads, summarizes each video with an LLM (from captions, or from the audio track as a fallback), optionally reads the summary aloud and sends everything as a single HTML email. Interrupted runs resume where they stopped."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file (default: ./config.yaml, then the user config dir)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable progress indicators
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Process new videos and send the briefing
    Run,

    /// Write an example configuration file
    Init,

    /// Inspect the configuration
    Config {
        /// Show current configuration
        #[arg(short, long)]
        show: bool,
    },

    /// Test connectivity of one collaborator
    Check {
        #[command(subcommand)]
        target: CheckTarget,
    },
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum CheckTarget {
    /// Send a dummy briefing
    Email,

    /// Synthesize TEXT into sound-test.mp3
    Tts {
        #[arg(value_name = "TEXT")]
        text: String,
    },

    /// Fetch every subscribed channel feed
    Feeds,

    /// Say hello to every configured AI provider/model
    Ai,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_run_with_globals() {
        let cli = Cli::parse_from(["briefing", "--config", "my.yaml", "run", "--verbose"]);
        assert!(matches!(cli.command, Commands::Run));
        assert_eq!(cli.config, Some(PathBuf::from("my.yaml")));
        assert!(cli.verbose);
        assert!(!cli.log_json);
    }

    #[test]
    fn test_parse_check_tts() {
        let cli = Cli::parse_from(["briefing", "check", "tts", "Hallo Welt"]);
        match cli.command {
            Commands::Check { target } => assert_eq!(
                target,
                CheckTarget::Tts {
                    text: "Hallo Welt".into()
                }
            ),
            _ => panic!("expected check command"),
        }
    }
}
