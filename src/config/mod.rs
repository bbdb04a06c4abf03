use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::analysis::Provider;
use crate::speech::SpeechProvider;
use crate::{BriefingError, Result};

const CONFIG_FILE: &str = "config.yaml";
const APP_DIR: &str = "yt-briefing";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Used as the email subject prefix
    #[serde(default = "default_project_name")]
    pub project_name: String,

    /// Instruction sent with every analysis request
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,

    pub email: EmailConfig,

    #[serde(default)]
    pub ai: AiConfig,

    #[serde(default)]
    pub tts: TtsConfig,

    #[serde(default)]
    pub options: OptionsConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub subscriptions: Vec<SubscriptionConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    pub host: String,

    #[serde(default = "default_smtp_port")]
    pub port: u16,

    /// SMTP login, also used as the sender address
    pub user: String,

    pub receiver: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
    #[serde(default = "default_provider")]
    pub provider: Provider,

    /// Provider default when not set
    #[serde(default)]
    pub model: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TtsConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub provider: SpeechProvider,

    #[serde(default = "default_tts_language")]
    pub language: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptionsConfig {
    #[serde(default = "default_max_videos")]
    pub max_videos_per_channel: usize,

    /// Download the audio track when a video has no captions
    #[serde(default)]
    pub allow_audio_download_fallback: bool,

    /// Discard degraded analyses on the next run and ask the backend again
    #[serde(default)]
    pub retry_degraded_analysis: bool,

    /// Caption languages in order of preference
    #[serde(default = "default_transcript_languages")]
    pub transcript_languages: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root of the per-video artifact folders
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// SQLite ledger file
    #[serde(default = "default_database")]
    pub database: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionConfig {
    pub channel_name: String,

    pub channel_id: String,

    #[serde(alias = "analysis_prompt", default = "default_user_prompt")]
    pub user_prompt: String,

    /// Overrides `ai.provider` for this channel
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<Provider>,

    /// Overrides `ai.model` for this channel
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

fn default_project_name() -> String {
    "My YouTube Assistant".to_string()
}

fn default_system_prompt() -> String {
    "You are a helpful assistant. Summarize the following video transcript.".to_string()
}

fn default_user_prompt() -> String {
    "Summarize this video.".to_string()
}

fn default_smtp_port() -> u16 {
    587
}

fn default_provider() -> Provider {
    Provider::Gemini
}

fn default_tts_language() -> String {
    "en".to_string()
}

fn default_max_videos() -> usize {
    3
}

fn default_transcript_languages() -> Vec<String> {
    vec!["de".to_string(), "en".to_string()]
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_database() -> PathBuf {
    PathBuf::from("youtube_assistant.db")
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
        }
    }
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            provider: SpeechProvider::default(),
            language: default_tts_language(),
        }
    }
}

impl Default for OptionsConfig {
    fn default() -> Self {
        Self {
            max_videos_per_channel: default_max_videos(),
            allow_audio_download_fallback: false,
            retry_degraded_analysis: false,
            transcript_languages: default_transcript_languages(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            database: default_database(),
        }
    }
}

impl Config {
    /// Load and validate the configuration file
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let config_path = Self::config_path(explicit)?;

        if !config_path.exists() {
            anyhow::bail!(
                "Configuration file {} not found. Run `briefing init` to create one.",
                config_path.display()
            );
        }

        let content = fs_err::read_to_string(&config_path)
            .context("Failed to read config file")?;
        let config = Self::from_yaml(&content)
            .with_context(|| format!("Invalid config file {}", config_path.display()))?;

        tracing::debug!("Loaded configuration from {}", config_path.display());
        Ok(config)
    }

    /// Parse and validate a YAML document
    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Config =
            serde_yaml::from_str(content).context("Failed to parse config file")?;
        config.validate()?;
        Ok(config)
    }

    /// Write the configuration to `path`, creating parent folders
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs_err::create_dir_all(parent)?;
        }

        let content = serde_yaml::to_string(self).context("Failed to serialize config")?;
        fs_err::write(path, content).context("Failed to write config file")?;
        Ok(())
    }

    /// Resolve the configuration file path
    pub fn config_path(explicit: Option<&Path>) -> Result<PathBuf> {
        if let Some(path) = explicit {
            return Ok(path.to_path_buf());
        }

        // Working directory first, so a project folder carries its own config
        let local_config = PathBuf::from(CONFIG_FILE);
        if local_config.exists() {
            return Ok(local_config);
        }

        let config_dir = dirs::config_dir().context("Could not determine config directory")?;
        Ok(config_dir.join(APP_DIR).join(CONFIG_FILE))
    }

    /// Starting point written by `briefing init`
    pub fn example() -> Self {
        Self {
            project_name: default_project_name(),
            system_prompt: default_system_prompt(),
            email: EmailConfig {
                host: "smtp.example.com".to_string(),
                port: default_smtp_port(),
                user: "me@example.com".to_string(),
                receiver: "you@example.com".to_string(),
            },
            ai: AiConfig {
                provider: Provider::Gemini,
                model: Some(Provider::Gemini.default_model().to_string()),
            },
            tts: TtsConfig {
                enabled: true,
                ..TtsConfig::default()
            },
            options: OptionsConfig::default(),
            storage: StorageConfig::default(),
            subscriptions: vec![SubscriptionConfig {
                channel_name: "Example Channel".to_string(),
                channel_id: "UCxxxxxxxxxxxx".to_string(),
                user_prompt: "Focus on technical details.".to_string(),
                provider: None,
                model: None,
            }],
        }
    }

    fn validate(&self) -> Result<()> {
        let invalid = |msg: String| -> anyhow::Error { BriefingError::InvalidConfig(msg).into() };

        if self.subscriptions.is_empty() {
            return Err(invalid("at least one subscription is required".into()));
        }

        let mut seen = HashSet::new();
        for sub in &self.subscriptions {
            let id = sub.channel_id.trim();
            if id.is_empty() {
                return Err(invalid(format!(
                    "subscription {:?} has an empty channel_id",
                    sub.channel_name
                )));
            }
            if !seen.insert(id) {
                return Err(invalid(format!("channel_id {} is listed twice", id)));
            }
        }

        if self.options.max_videos_per_channel == 0 {
            return Err(invalid("options.max_videos_per_channel must be > 0".into()));
        }

        if self.email.host.trim().is_empty() {
            return Err(invalid("email.host must be set".into()));
        }
        if self.email.receiver.trim().is_empty() {
            return Err(invalid("email.receiver must be set".into()));
        }

        Ok(())
    }

    /// Provider and model a subscription is analyzed with
    pub fn analyzer_for(&self, sub: &SubscriptionConfig) -> (Provider, Option<String>) {
        let provider = sub.provider.unwrap_or(self.ai.provider);
        let model = match &sub.model {
            Some(model) => Some(model.clone()),
            // The global model only makes sense for the global provider
            None if provider == self.ai.provider => self.ai.model.clone(),
            None => None,
        };
        (provider, model)
    }

    /// Display current configuration
    pub fn display(&self) {
        println!("Current Configuration:");
        println!("  Project: {}", self.project_name);
        println!(
            "  Email: {}@{}:{} -> {}",
            self.email.user, self.email.host, self.email.port, self.email.receiver
        );
        println!(
            "  AI: {} ({})",
            self.ai.provider,
            self.ai
                .model
                .as_deref()
                .unwrap_or(self.ai.provider.default_model())
        );
        if self.tts.enabled {
            println!(
                "  TTS: {:?} ({})",
                self.tts.provider, self.tts.language
            );
        } else {
            println!("  TTS: disabled");
        }
        println!(
            "  Max videos per channel: {}",
            self.options.max_videos_per_channel
        );
        println!(
            "  Audio fallback: {}",
            self.options.allow_audio_download_fallback
        );
        println!(
            "  Retry degraded analysis: {}",
            self.options.retry_degraded_analysis
        );
        println!(
            "  Transcript languages: {}",
            self.options.transcript_languages.join(", ")
        );
        println!("  Data dir: {}", self.storage.data_dir.display());
        println!("  Database: {}", self.storage.database.display());
        println!("  Subscriptions:");
        for sub in &self.subscriptions {
            let (provider, model) = self.analyzer_for(sub);
            println!(
                "    • {} ({}) via {}/{}",
                sub.channel_name,
                sub.channel_id,
                provider,
                model.as_deref().unwrap_or(provider.default_model())
            );
        }
    }
}

/// Secrets read from the environment once at startup
#[derive(Clone, Default)]
pub struct Credentials {
    pub gemini_api_key: Option<String>,
    pub openai_api_key: Option<String>,
    pub anthropic_api_key: Option<String>,
    pub email_password: Option<String>,
}

impl Credentials {
    pub fn from_env() -> Self {
        Self {
            gemini_api_key: env_secret("GEMINI_API_KEY"),
            openai_api_key: env_secret("OPENAI_API_KEY"),
            anthropic_api_key: env_secret("ANTHROPIC_API_KEY"),
            email_password: env_secret("EMAIL_PASSWORD"),
        }
    }

    pub fn api_key(&self, provider: Provider) -> Option<&str> {
        match provider {
            Provider::Gemini => self.gemini_api_key.as_deref(),
            Provider::OpenAi => self.openai_api_key.as_deref(),
            Provider::Anthropic => self.anthropic_api_key.as_deref(),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mask = |v: &Option<String>| if v.is_some() { "<set>" } else { "<unset>" };
        f.debug_struct("Credentials")
            .field("gemini_api_key", &mask(&self.gemini_api_key))
            .field("openai_api_key", &mask(&self.openai_api_key))
            .field("anthropic_api_key", &mask(&self.anthropic_api_key))
            .field("email_password", &mask(&self.email_password))
            .finish()
    }
}

fn env_secret(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
email:
  host: smtp.example.com
  user: me@example.com
  receiver: you@example.com
subscriptions:
  - channel_name: Chan
    channel_id: UC1
    analysis_prompt: Focus on tech.
"#;

    #[test]
    fn test_minimal_config_gets_defaults() {
        let config = Config::from_yaml(MINIMAL).unwrap();
        assert_eq!(config.email.port, 587);
        assert_eq!(config.ai.provider, Provider::Gemini);
        assert!(!config.tts.enabled);
        assert_eq!(config.options.max_videos_per_channel, 3);
        assert_eq!(config.options.transcript_languages, ["de", "en"]);
        assert!(!config.options.retry_degraded_analysis);
        assert_eq!(config.storage.data_dir, PathBuf::from("data"));
        assert_eq!(config.subscriptions[0].user_prompt, "Focus on tech.");
    }

    #[test]
    fn test_example_round_trips() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.yaml");
        Config::example().save(&path).unwrap();
        let loaded = Config::load(Some(&path)).unwrap();
        assert_eq!(loaded.subscriptions.len(), 1);
        assert!(loaded.tts.enabled);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let err = Config::load(Some(&dir.path().join("absent.yaml"))).unwrap_err();
        assert!(err.to_string().contains("briefing init"));
    }

    #[test]
    fn test_rejects_duplicate_channels() {
        let yaml = format!(
            "{}  - channel_name: Again\n    channel_id: UC1\n",
            MINIMAL
        );
        let err = Config::from_yaml(&yaml).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<BriefingError>(),
            Some(BriefingError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_rejects_empty_subscriptions() {
        let yaml = "email: {host: h, user: u, receiver: r}\nsubscriptions: []\n";
        assert!(Config::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_rejects_zero_cap() {
        let yaml = format!("{}options:\n  max_videos_per_channel: 0\n", MINIMAL);
        assert!(Config::from_yaml(&yaml).is_err());
    }

    #[test]
    fn test_rejects_unknown_provider() {
        let yaml = format!("{}ai:\n  provider: mistral\n", MINIMAL);
        assert!(Config::from_yaml(&yaml).is_err());
    }

    #[test]
    fn test_analyzer_resolution() {
        let yaml = r#"
email: {host: h, user: u, receiver: r}
ai: {provider: gemini, model: gemini-pro}
subscriptions:
  - {channel_name: A, channel_id: UC1}
  - {channel_name: B, channel_id: UC2, provider: openai}
  - {channel_name: C, channel_id: UC3, model: gemini-ultra}
"#;
        let config = Config::from_yaml(yaml).unwrap();
        let resolved: Vec<_> = config
            .subscriptions
            .iter()
            .map(|s| config.analyzer_for(s))
            .collect();
        assert_eq!(resolved[0], (Provider::Gemini, Some("gemini-pro".into())));
        assert_eq!(resolved[1], (Provider::OpenAi, None));
        assert_eq!(resolved[2], (Provider::Gemini, Some("gemini-ultra".into())));
    }

    #[test]
    fn test_credentials_debug_hides_secrets() {
        let creds = Credentials {
            gemini_api_key: Some("secret-key".into()),
            ..Credentials::default()
        };
        let shown = format!("{:?}", creds);
        assert!(!shown.contains("secret-key"));
        assert!(shown.contains("<set>"));
        assert_eq!(creds.api_key(Provider::Gemini), Some("secret-key"));
        assert_eq!(creds.api_key(Provider::OpenAi), None);
    }
}
