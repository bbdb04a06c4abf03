//! LLM analysis of a transcript (or audio track) into summary + keywords.
//!
//! Providers are interchangeable behind [`Analyzer`]; the concrete one is picked
//! once per subscription when configuration is loaded.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

pub mod anthropic;
pub mod gemini;
pub mod openai;

pub use anthropic::AnthropicAnalyzer;
pub use gemini::GeminiAnalyzer;
pub use openai::OpenAiAnalyzer;

use crate::config::Credentials;
use crate::Result;

/// What the analyzer gets to look at
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalysisInput {
    Transcript(String),
    Audio(PathBuf),
}

impl AnalysisInput {
    pub fn kind(&self) -> &'static str {
        match self {
            AnalysisInput::Transcript(_) => "transcript",
            AnalysisInput::Audio(_) => "audio",
        }
    }
}

/// Outcome of an analysis call, persisted verbatim as the analysis artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Analysis {
    Complete {
        summary: String,
        keywords: Vec<String>,
    },
    /// The backend failed or answered with something unusable
    Degraded { reason: String },
}

impl Analysis {
    pub fn complete(summary: impl Into<String>, keywords: Vec<String>) -> Self {
        Analysis::Complete {
            summary: summary.into(),
            keywords: normalize_keywords(keywords),
        }
    }

    pub fn degraded(reason: impl Into<String>) -> Self {
        Analysis::Degraded {
            reason: reason.into(),
        }
    }

    /// Text shown as the summary; a degraded record carries its failure reason
    pub fn summary(&self) -> &str {
        match self {
            Analysis::Complete { summary, .. } => summary,
            Analysis::Degraded { reason } => reason,
        }
    }

    pub fn keywords(&self) -> &[String] {
        match self {
            Analysis::Complete { keywords, .. } => keywords,
            Analysis::Degraded { .. } => &[],
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, Analysis::Degraded { .. })
    }

    /// Interpret a model answer that was asked to be `{"summary": .., "keywords": [..]}`
    pub fn from_model_output(text: &str) -> Self {
        #[derive(Deserialize)]
        struct Answer {
            summary: Option<String>,
            #[serde(default)]
            keywords: Vec<serde_json::Value>,
        }

        let body = strip_code_fences(text);
        let parsed = serde_json::from_str::<Answer>(body).or_else(|err| {
            match extract_json_object(body) {
                Some(object) => serde_json::from_str::<Answer>(object),
                None => Err(err),
            }
        });
        let answer = match parsed {
            Ok(answer) => answer,
            Err(e) => {
                return Analysis::degraded(format!(
                    "AI analysis failed: malformed response ({})",
                    e
                ))
            }
        };

        let summary = match answer.summary.map(|s| s.trim().to_string()) {
            Some(summary) if !summary.is_empty() => summary,
            _ => return Analysis::degraded("AI analysis failed: response contained no summary"),
        };

        let keywords = answer
            .keywords
            .into_iter()
            .filter_map(|k| k.as_str().map(str::to_string))
            .collect();

        Analysis::complete(summary, keywords)
    }
}

/// Capability shared by all analysis backends
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Analyzer: Send + Sync {
    /// Analyze `input`. Backend trouble is reported as [`Analysis::Degraded`];
    /// an `Err` means the analyzer cannot work at all (missing credentials)
    /// and the run must stop.
    async fn analyze(
        &self,
        input: &AnalysisInput,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<Analysis>;

    /// Whether [`AnalysisInput::Audio`] is accepted
    fn supports_audio(&self) -> bool;

    /// `provider/model`, for logs
    fn describe(&self) -> String;

    /// Send a trivial prompt and return the raw answer
    async fn ping(&self) -> Result<String>;
}

/// Analysis backends selectable by tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[serde(alias = "google")]
    Gemini,
    OpenAi,
    Anthropic,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Gemini => "gemini",
            Provider::OpenAi => "openai",
            Provider::Anthropic => "anthropic",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            Provider::Gemini => "gemini-1.5-flash",
            Provider::OpenAi => "gpt-4o",
            Provider::Anthropic => "claude-3-5-sonnet-20240620",
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Construct the analyzer for a provider tag
pub fn build_analyzer(
    provider: Provider,
    model: Option<&str>,
    credentials: &Credentials,
    http: reqwest::Client,
) -> Arc<dyn Analyzer> {
    let model = model.unwrap_or(provider.default_model()).to_string();
    match provider {
        Provider::Gemini => Arc::new(GeminiAnalyzer::new(
            http,
            credentials.gemini_api_key.clone(),
            model,
        )),
        Provider::OpenAi => Arc::new(OpenAiAnalyzer::new(
            http,
            credentials.openai_api_key.clone(),
            model,
        )),
        Provider::Anthropic => Arc::new(AnthropicAnalyzer::new(
            http,
            credentials.anthropic_api_key.clone(),
            model,
        )),
    }
}

/// Prompt asking for the JSON answer `from_model_output` understands
pub fn build_prompt(input: &AnalysisInput, system_prompt: &str, user_prompt: &str) -> String {
    let material = match input {
        AnalysisInput::Transcript(text) => format!("Here is the video transcript:\n{}", text),
        AnalysisInput::Audio(_) => "Analyze the attached audio file.".to_string(),
    };

    format!(
        "{}\nSpecific instructions: {}\n\n\
         Please provide the output in the following JSON format:\n\
         {{\n  \"summary\": \"The summary of the video...\",\n  \"keywords\": [\"keyword1\", \"keyword2\", ...]\n}}\n\n\
         {}",
        system_prompt, user_prompt, material
    )
}

/// Remove a Markdown code fence wrapped around a model answer
pub fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let without_open = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    without_open
        .strip_suffix("```")
        .unwrap_or(without_open)
        .trim()
}

fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

fn normalize_keywords(keywords: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    keywords
        .into_iter()
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty() && seen.insert(k.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_json() {
        let analysis = Analysis::from_model_output(r#"{"summary": "S1", "keywords": ["a", "b"]}"#);
        assert_eq!(analysis, Analysis::complete("S1", vec!["a".into(), "b".into()]));
    }

    #[test]
    fn test_parse_fenced_json() {
        let text = "```json\n{\"summary\": \"Fenced\", \"keywords\": [\"x\"]}\n```";
        let analysis = Analysis::from_model_output(text);
        assert_eq!(analysis.summary(), "Fenced");
        assert_eq!(analysis.keywords(), ["x".to_string()]);
    }

    #[test]
    fn test_parse_json_with_chatter() {
        let text = "Sure! Here you go:\n{\"summary\": \"Inner\"}\nHope that helps.";
        let analysis = Analysis::from_model_output(text);
        assert_eq!(analysis.summary(), "Inner");
        assert!(analysis.keywords().is_empty());
    }

    #[test]
    fn test_parse_malformed_is_degraded() {
        let analysis = Analysis::from_model_output("I cannot help with that.");
        assert!(analysis.is_degraded());
        assert!(analysis.summary().starts_with("AI analysis failed"));
        assert!(analysis.keywords().is_empty());
    }

    #[test]
    fn test_parse_missing_summary_is_degraded() {
        let analysis = Analysis::from_model_output(r#"{"keywords": ["a"]}"#);
        assert!(analysis.is_degraded());
    }

    #[test]
    fn test_keywords_are_cleaned() {
        let analysis =
            Analysis::from_model_output(r#"{"summary": "S", "keywords": [" a ", "a", "", 3, "b"]}"#);
        assert_eq!(analysis.keywords(), ["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_artifact_shape() {
        let complete = Analysis::complete("S1", vec!["a".into()]);
        let json = serde_json::to_value(&complete).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"status": "complete", "summary": "S1", "keywords": ["a"]})
        );

        let degraded: Analysis =
            serde_json::from_str(r#"{"status": "degraded", "reason": "boom"}"#).unwrap();
        assert_eq!(degraded.summary(), "boom");
    }

    #[test]
    fn test_build_prompt_mentions_material() {
        let text = build_prompt(
            &AnalysisInput::Transcript("hello world".into()),
            "You summarize videos.",
            "Focus on tech.",
        );
        assert!(text.starts_with("You summarize videos.\nSpecific instructions: Focus on tech."));
        assert!(text.contains("\"keywords\""));
        assert!(text.ends_with("Here is the video transcript:\nhello world"));

        let audio = build_prompt(&AnalysisInput::Audio("a.mp3".into()), "s", "u");
        assert!(audio.ends_with("Analyze the attached audio file."));
    }

    #[test]
    fn test_provider_tags() {
        let provider: Provider = serde_yaml::from_str("google").unwrap();
        assert_eq!(provider, Provider::Gemini);
        let provider: Provider = serde_yaml::from_str("openai").unwrap();
        assert_eq!(provider, Provider::OpenAi);
        assert!(serde_yaml::from_str::<Provider>("mistral").is_err());
        assert_eq!(Provider::Anthropic.default_model(), "claude-3-5-sonnet-20240620");
    }
}
