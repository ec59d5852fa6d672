use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use std::sync::Mutex;

use jiwani_core::{CoreError, CoreResult};
use jiwani_shared::Masked;
use jiwani_store::app_config::MailConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, mail: OutgoingMail) -> CoreResult<()>;
}

/// Sends through an SMTP relay.
pub struct SmtpMailer {
    host: String,
    port: u16,
    credentials: Option<Credentials>,
    from: String,
}

impl SmtpMailer {
    /// `None` when no relay host is configured.
    pub fn from_config(config: &MailConfig) -> Option<Self> {
        let host = config.smtp_host.clone()?;
        let credentials = match (&config.username, &config.password) {
            (Some(user), Some(password)) => Some(Credentials::new(user.clone(), password.clone())),
            _ => None,
        };
        Some(Self { host, port: config.smtp_port, credentials, from: config.from.clone() })
    }

    fn build_transport(&self) -> CoreResult<SmtpTransport> {
        let mut builder = SmtpTransport::relay(&self.host)
            .map_err(|e| CoreError::UpstreamError(format!("SMTP relay error: {}", e)))?
            .port(self.port);
        if let Some(credentials) = &self.credentials {
            builder = builder.credentials(credentials.clone());
        }
        Ok(builder.build())
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, mail: OutgoingMail) -> CoreResult<()> {
        let message = Message::builder()
            .from(self.from.parse().map_err(|e| CoreError::InternalError(format!("Invalid from address: {}", e)))?)
            .to(mail.to.parse().map_err(|e| CoreError::validation(format!("Invalid to address: {}", e)))?)
            .subject(mail.subject)
            .header(ContentType::TEXT_PLAIN)
            .body(mail.body)
            .map_err(|e| CoreError::InternalError(format!("Failed to build email: {}", e)))?;

        let transport = self.build_transport()?;

        // SmtpTransport is blocking
        tokio::task::spawn_blocking(move || transport.send(&message))
            .await
            .map_err(|e| CoreError::InternalError(format!("Email task failed: {}", e)))?
            .map_err(|e| CoreError::UpstreamError(format!("Failed to send email: {}", e)))?;

        Ok(())
    }
}

/// Development mailer: logs the recipient and keeps the mail in memory.
#[derive(Default)]
pub struct LogMailer {
    sent: Mutex<Vec<OutgoingMail>>,
}

impl LogMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<OutgoingMail> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, mail: OutgoingMail) -> CoreResult<()> {
        tracing::info!("Mail '{}' to {} (not delivered: no SMTP relay)", mail.subject, Masked::new(&mail.to));
        tracing::debug!("Mail body: {}", mail.body);
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(mail);
        }
        Ok(())
    }
}
