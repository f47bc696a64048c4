//! Customer email sender using SMTP.

use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::{debug, info};

use crate::error::ChannelError;

/// SMTP configuration for outbound customer mail.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    /// SMTP relay host
    pub host: String,
    /// SMTP port (STARTTLS)
    pub port: u16,
    /// SMTP username
    pub username: String,
    /// SMTP password / app password
    pub password: String,
    /// From address for all outbound mail
    pub from: String,
}

impl SmtpConfig {
    /// Load SMTP configuration from environment variables.
    ///
    /// Returns `None` when `SMTP_HOST` or credentials are absent - the email
    /// path is an optional feature and its absence is not an error.
    #[must_use]
    pub fn from_env() -> Option<Self> {
        let host = std::env::var("SMTP_HOST").ok().filter(|s| !s.is_empty())?;
        let username = std::env::var("SMTP_USERNAME").ok().filter(|s| !s.is_empty())?;
        let password = std::env::var("SMTP_PASSWORD").ok().filter(|s| !s.is_empty())?;
        let from = std::env::var("SMTP_FROM").ok().filter(|s| !s.is_empty())?;
        let port = std::env::var("SMTP_PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(587);

        Some(Self {
            host,
            port,
            username,
            password,
            from,
        })
    }
}

/// Email sender for customer-facing delivery notices.
pub struct EmailSender {
    config: SmtpConfig,
}

impl EmailSender {
    /// Create a new email sender with the given configuration.
    #[must_use]
    pub const fn new(config: SmtpConfig) -> Self {
        Self { config }
    }

    /// Create from environment variables.
    ///
    /// Returns `None` (logged once) when SMTP is not configured, disabling
    /// the customer email path entirely.
    #[must_use]
    pub fn from_env() -> Option<Self> {
        match SmtpConfig::from_env() {
            Some(config) => {
                debug!(host = %config.host, "Customer email enabled");
                Some(Self::new(config))
            }
            None => {
                info!("Customer email disabled (SMTP_* not configured)");
                None
            }
        }
    }

    /// Send a plain-text email.
    pub async fn send_plain(
        &self,
        to: &str,
        subject: &str,
        body: &str,
        reply_to: Option<&str>,
        bcc: Option<&str>,
    ) -> Result<(), ChannelError> {
        let from: Mailbox = self
            .config
            .from
            .parse()
            .map_err(|e| ChannelError::Mail(format!("invalid from address: {e}")))?;
        let to: Mailbox = to
            .parse()
            .map_err(|e| ChannelError::Mail(format!("invalid to address: {e}")))?;

        let mut builder = Message::builder().from(from).to(to).subject(subject);

        if let Some(reply_to) = reply_to {
            let mailbox: Mailbox = reply_to
                .parse()
                .map_err(|e| ChannelError::Mail(format!("invalid reply-to address: {e}")))?;
            builder = builder.reply_to(mailbox);
        }
        if let Some(bcc) = bcc {
            let mailbox: Mailbox = bcc
                .parse()
                .map_err(|e| ChannelError::Mail(format!("invalid bcc address: {e}")))?;
            builder = builder.bcc(mailbox);
        }

        let email = builder
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())
            .map_err(|e| ChannelError::Mail(format!("failed to build message: {e}")))?;

        let creds = Credentials::new(
            self.config.username.clone(),
            self.config.password.clone(),
        );

        let mailer: AsyncSmtpTransport<Tokio1Executor> =
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.config.host)
                .map_err(|e| ChannelError::Mail(format!("failed to create transport: {e}")))?
                .port(self.config.port)
                .credentials(creds)
                .build();

        mailer
            .send(email)
            .await
            .map_err(|e| ChannelError::Mail(format!("SMTP send failed: {e}")))?;

        info!(subject = subject, "Customer email sent");

        Ok(())
    }
}
