//! Outbound email delivery seam.
//!
//! The core hands a template name and its data to an [`Emailer`]; rendering
//! and transport live behind the trait. [`RecordingMailer`] captures sends
//! for tests and local development.

use std::fmt;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Mutex;

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("Email delivery failed: {0}")]
    Send(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateName {
    SigninPasswordless,
    EmailVerify,
}

impl TemplateName {
    pub fn as_str(&self) -> &'static str {
        match self {
            TemplateName::SigninPasswordless => "signin-passwordless",
            TemplateName::EmailVerify => "email-verify",
        }
    }
}

/// Everything a template can interpolate. The ticket and OTP are live
/// credentials, so `Debug` keeps them out of logs.
#[derive(Clone, Default)]
pub struct TemplateData {
    pub link: String,
    pub display_name: String,
    pub email: String,
    pub new_email: Option<String>,
    pub ticket: Option<String>,
    pub otp: Option<String>,
    pub redirect_to: Option<String>,
    pub locale: String,
    pub server_url: String,
    pub client_url: String,
}

impl fmt::Debug for TemplateData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TemplateData")
            .field("link", &"<redacted>")
            .field("display_name", &self.display_name)
            .field("email", &self.email)
            .field("new_email", &self.new_email)
            .field("ticket", &self.ticket.as_ref().map(|_| "<redacted>"))
            .field("otp", &self.otp.as_ref().map(|_| "<redacted>"))
            .field("redirect_to", &self.redirect_to)
            .field("locale", &self.locale)
            .finish_non_exhaustive()
    }
}

#[async_trait]
pub trait Emailer: Send + Sync {
    async fn send(
        &self,
        to: &str,
        template: TemplateName,
        data: TemplateData,
    ) -> Result<(), DeliveryError>;
}

#[derive(Debug, Clone)]
pub struct SentEmail {
    pub to: String,
    pub template: TemplateName,
    pub data: TemplateData,
}

/// Mailer that records every send in memory instead of delivering.
#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<SentEmail>>,
}

impl RecordingMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn sent(&self) -> Vec<SentEmail> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl Emailer for RecordingMailer {
    async fn send(
        &self,
        to: &str,
        template: TemplateName,
        data: TemplateData,
    ) -> Result<(), DeliveryError> {
        tracing::debug!(to, template = template.as_str(), "recording outbound email");
        self.sent.lock().await.push(SentEmail {
            to: to.to_string(),
            template,
            data,
        });
        Ok(())
    }
}

/// Mailer that fails every send; exercises the delivery-failure paths.
#[cfg(test)]
pub(crate) struct FailingMailer;

#[cfg(test)]
#[async_trait]
impl Emailer for FailingMailer {
    async fn send(
        &self,
        _to: &str,
        _template: TemplateName,
        _data: TemplateData,
    ) -> Result<(), DeliveryError> {
        Err(DeliveryError::Send("smtp unreachable".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn recording_mailer_captures_sends() {
        let mailer = RecordingMailer::new();
        mailer
            .send(
                "dev@example.com",
                TemplateName::SigninPasswordless,
                TemplateData {
                    email: "dev@example.com".to_string(),
                    otp: Some("123456".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let sent = mailer.sent().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "dev@example.com");
        assert_eq!(sent[0].template, TemplateName::SigninPasswordless);
        assert_eq!(sent[0].data.otp.as_deref(), Some("123456"));
    }

    #[test]
    fn debug_redacts_secrets() {
        let data = TemplateData {
            ticket: Some("passwordlessEmail:sensitive".to_string()),
            otp: Some("123456".to_string()),
            link: "https://auth.example.com/verify?ticket=...".to_string(),
            ..Default::default()
        };
        let rendered = format!("{data:?}");
        assert!(!rendered.contains("sensitive"));
        assert!(!rendered.contains("123456"));
        assert!(!rendered.contains("verify?ticket"));
    }
}
