use anyhow::Context;
use async_trait::async_trait;
use chrono::NaiveDate;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, Message, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials as SmtpCredentials;
use lettre::transport::smtp::AsyncSmtpTransport;
use lettre::{AsyncTransport, Tokio1Executor};

use super::{render_html, subject, ReportDispatcher, ReportEntry};
use crate::config::EmailConfig;
use crate::{BriefingError, Result};

/// Sends the briefing through an SMTP relay with STARTTLS
pub struct EmailDispatcher {
    project_name: String,
    settings: EmailConfig,
    password: Option<String>,
}

impl EmailDispatcher {
    pub fn new(project_name: String, settings: EmailConfig, password: Option<String>) -> Self {
        Self {
            project_name,
            settings,
            password,
        }
    }

    /// Assemble the HTML message with spoken summaries attached
    pub fn build_message(&self, entries: &[ReportEntry], date: NaiveDate) -> Result<Message> {
        let from: Mailbox = self
            .settings
            .user
            .parse()
            .with_context(|| format!("Invalid sender address {:?}", self.settings.user))?;
        let to: Mailbox = self
            .settings
            .receiver
            .parse()
            .with_context(|| format!("Invalid receiver address {:?}", self.settings.receiver))?;

        let mut body = MultiPart::mixed().singlepart(SinglePart::html(render_html(entries)));

        let audio_type = ContentType::parse("audio/mpeg").context("audio content type")?;
        for entry in entries {
            let Some(path) = &entry.audio_path else {
                continue;
            };
            match fs_err::read(path) {
                Ok(bytes) => {
                    body = body.singlepart(
                        Attachment::new(entry.attachment_name()).body(bytes, audio_type.clone()),
                    );
                }
                Err(e) => {
                    tracing::warn!(video_id = %entry.video_id, "Could not attach audio: {}", e);
                }
            }
        }

        Message::builder()
            .from(from)
            .to(to)
            .subject(subject(&self.project_name, date))
            .multipart(body)
            .context("build email")
    }
}

#[async_trait]
impl ReportDispatcher for EmailDispatcher {
    async fn dispatch(&self, entries: &[ReportEntry]) -> Result<()> {
        let password = self
            .password
            .clone()
            .ok_or(BriefingError::MissingCredential {
                provider: "email",
                variable: "EMAIL_PASSWORD",
            })?;

        let message = self.build_message(entries, chrono::Local::now().date_naive())?;

        let mailer = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.settings.host)
            .with_context(|| format!("Invalid SMTP host {}", self.settings.host))?
            .port(self.settings.port)
            .credentials(SmtpCredentials::new(self.settings.user.clone(), password))
            .build();

        mailer.send(message).await.context("send email")?;
        tracing::info!(
            "Briefing with {} video(s) sent to {}",
            entries.len(),
            self.settings.receiver
        );
        Ok(())
    }
}
