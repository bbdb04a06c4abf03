//! The email briefing: one entry per processed video, sent once per run.

use async_trait::async_trait;
use chrono::NaiveDate;
use std::path::PathBuf;

pub mod email;

pub use email::EmailDispatcher;

use crate::Result;

/// One video in the briefing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportEntry {
    pub channel_name: String,
    pub title: String,
    pub link: String,
    pub video_id: String,
    pub summary: String,
    pub keywords: Vec<String>,
    /// Spoken summary, attached when present
    pub audio_path: Option<PathBuf>,
}

impl ReportEntry {
    /// File name the spoken summary is attached under
    pub fn attachment_name(&self) -> String {
        format!("{}.mp3", self.video_id)
    }
}

/// Delivers a finished batch
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ReportDispatcher: Send + Sync {
    /// `Ok` only once the briefing has actually been handed off
    async fn dispatch(&self, entries: &[ReportEntry]) -> Result<()>;
}

/// Subject line, e.g. `My YouTube Assistant - 18.10.2026`
pub fn subject(project_name: &str, date: NaiveDate) -> String {
    format!("{} - {}", project_name, date.format("%d.%m.%Y"))
}

/// HTML body of the briefing
pub fn render_html(entries: &[ReportEntry]) -> String {
    let mut html = String::from("<html><body>");
    html.push_str("<h1>Your YouTube Briefing</h1>");

    if entries.is_empty() {
        html.push_str("<p>No new videos processed.</p>");
    }

    for entry in entries {
        html.push_str("<hr>");
        html.push_str(&format!(
            "<h2>{}</h2>",
            html_escape::encode_text(&entry.channel_name)
        ));
        html.push_str(&format!(
            "<h3><a href=\"{}\">{}</a></h3>",
            html_escape::encode_double_quoted_attribute(&entry.link),
            html_escape::encode_text(&entry.title)
        ));
        html.push_str(&format!(
            "<div style=\"background-color: #f9f9f9; padding: 15px;\">{}</div>",
            markdown_to_html(&entry.summary)
        ));

        if !entry.keywords.is_empty() {
            html.push_str(&format!(
                "<p><b>Keywords:</b> {}</p>",
                html_escape::encode_text(&entry.keywords.join(", "))
            ));
        }

        if entry.audio_path.is_some() {
            html.push_str(&format!(
                "<p><i>Audio summary attached: {}</i></p>",
                html_escape::encode_text(&entry.attachment_name())
            ));
        }
    }

    html.push_str("</body></html>");
    html
}

/// Just enough Markdown for LLM summaries: `**bold**`, bullet lines, line breaks
fn markdown_to_html(text: &str) -> String {
    let escaped = html_escape::encode_text(text.trim());
    let mut html = String::new();

    for (index, line) in escaped.lines().enumerate() {
        if index > 0 {
            html.push_str("<br>");
        }
        let trimmed = line.trim_start();
        match trimmed
            .strip_prefix("* ")
            .or_else(|| trimmed.strip_prefix("- "))
        {
            Some(item) => {
                html.push_str("&bull; ");
                html.push_str(&bold(item));
            }
            None => html.push_str(&bold(line)),
        }
    }
    html
}

fn bold(line: &str) -> String {
    let parts: Vec<&str> = line.split("**").collect();
    // An unmatched trailing marker stays literal
    let balanced = parts.len() % 2 == 1;
    let mut out = String::with_capacity(line.len());

    for (index, part) in parts.iter().enumerate() {
        if index > 0 {
            if !balanced && index == parts.len() - 1 {
                out.push_str("**");
            } else if index % 2 == 1 {
                out.push_str("<b>");
            } else {
                out.push_str("</b>");
            }
        }
        out.push_str(part);
    }
    out
}
