//! Channel subscriptions for one run, each bound to the analyzer it uses.

use std::collections::HashMap;
use std::sync::Arc;

use crate::analysis::{build_analyzer, Analyzer, Provider};
use crate::config::{Config, Credentials};
use crate::{BriefingError, Result};

/// A subscribed YouTube channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channel {
    pub id: String,
    pub name: String,
    /// Channel-specific analysis instruction
    pub user_prompt: String,
}

pub struct Subscription {
    pub channel: Channel,
    pub analyzer: Arc<dyn Analyzer>,
}

/// Ordered, read-only view of the configured subscriptions
pub struct SourceRegistry {
    subscriptions: Vec<Subscription>,
}

impl SourceRegistry {
    pub fn new(subscriptions: Vec<Subscription>) -> Self {
        Self { subscriptions }
    }

    /// Resolve every subscription's analyzer. Subscriptions sharing a
    /// provider/model share one analyzer instance.
    pub fn from_config(
        config: &Config,
        credentials: &Credentials,
        http: reqwest::Client,
    ) -> Result<Self> {
        let mut analyzers: HashMap<(Provider, Option<String>), Arc<dyn Analyzer>> =
            HashMap::new();
        let mut subscriptions = Vec::with_capacity(config.subscriptions.len());

        for sub in &config.subscriptions {
            let (provider, model) = config.analyzer_for(sub);
            let analyzer = analyzers
                .entry((provider, model.clone()))
                .or_insert_with(|| {
                    build_analyzer(provider, model.as_deref(), credentials, http.clone())
                })
                .clone();

            subscriptions.push(Subscription {
                channel: Channel {
                    id: sub.channel_id.trim().to_string(),
                    name: sub.channel_name.clone(),
                    user_prompt: sub.user_prompt.clone(),
                },
                analyzer,
            });
        }

        let registry = Self::new(subscriptions);
        if config.options.allow_audio_download_fallback {
            registry.require_audio_support()?;
        }
        Ok(registry)
    }

    /// With audio fallback every analyzer may be handed an audio file
    pub fn require_audio_support(&self) -> Result<()> {
        for sub in &self.subscriptions {
            if !sub.analyzer.supports_audio() {
                return Err(BriefingError::InvalidConfig(format!(
                    "audio download fallback is enabled but {} (channel {}) cannot analyze audio",
                    sub.analyzer.describe(),
                    sub.channel.name
                ))
                .into());
            }
        }
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Subscription> {
        self.subscriptions.iter()
    }

    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }
}
