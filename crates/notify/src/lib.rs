//! Notification system for shipment monitoring events.
//!
//! This crate provides a fire-and-forget notification system for sending
//! shipment alerts to chat channels, plus an SMTP sender for customer-facing
//! delivery notices.
//!
//! # Usage
//!
//! ```no_run
//! use notify::{NotifyEvent, Notifier};
//!
//! // Create notifier from environment variables
//! let notifier = Notifier::from_env();
//!
//! // Send a notification (fire-and-forget)
//! notifier.notify(NotifyEvent::CustomerNotified {
//!     item_id: "8812".to_string(),
//!     item_name: "PO-4411 spare parts".to_string(),
//!     recipient: "ops@acme.example".to_string(),
//!     reason: "Consignee premises closed".to_string(),
//!     timestamp: chrono::Utc::now(),
//! });
//! ```
//!
//! # Configuration
//!
//! - `SLACK_BOT_TOKEN` / `SLACK_CHANNEL_ID`: enable the Slack channel
//! - `SMTP_HOST` / `SMTP_PORT` / `SMTP_USERNAME` / `SMTP_PASSWORD` /
//!   `SMTP_FROM`: enable the customer email sender
//! - `NOTIFY_DISABLED`: set to "true" to disable all chat notifications
//!
//! # Architecture
//!
//! The chat side uses a trait-based channel design:
//!
//! - [`NotifyChannel`] trait defines the interface for chat channels
//! - [`SlackChannel`] implements the Slack Web API channel
//! - [`Notifier`] dispatches events to all enabled channels
//!
//! Customer email is addressed per-send and therefore lives outside the
//! channel trait, as [`EmailSender`].

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod channels;
pub mod email;
pub mod error;
pub mod events;

pub use channels::slack::{SlackBlock, SlackChannel, SlackText};
pub use channels::NotifyChannel;
pub use email::{EmailSender, SmtpConfig};
pub use error::ChannelError;
pub use events::{NotifyEvent, Severity};

use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Environment variable to disable all notifications.
const ENV_NOTIFY_DISABLED: &str = "NOTIFY_DISABLED";

/// Central notification dispatcher.
///
/// The `Notifier` manages multiple notification channels and dispatches
/// events to all enabled channels in a fire-and-forget manner.
pub struct Notifier {
    channels: Vec<Arc<dyn NotifyChannel>>,
    disabled: bool,
}

impl Notifier {
    /// Create a new notifier from environment variables.
    ///
    /// Auto-detects which channels are configured and enables them.
    #[must_use]
    pub fn from_env() -> Self {
        let disabled = std::env::var(ENV_NOTIFY_DISABLED)
            .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
            .unwrap_or(false);

        if disabled {
            info!("Notifications disabled via NOTIFY_DISABLED");
            return Self {
                channels: vec![],
                disabled: true,
            };
        }

        let mut channels: Vec<Arc<dyn NotifyChannel>> = vec![];

        let slack = SlackChannel::from_env();
        if slack.enabled() {
            info!("Slack notifications enabled");
            channels.push(Arc::new(slack));
        }

        if channels.is_empty() {
            warn!("No notification channels configured");
        } else {
            info!(
                channel_count = channels.len(),
                "Notification system initialized"
            );
        }

        Self {
            channels,
            disabled: false,
        }
    }

    /// Create a notifier with specific channels.
    #[must_use]
    pub fn with_channels(channels: Vec<Arc<dyn NotifyChannel>>) -> Self {
        Self {
            channels,
            disabled: false,
        }
    }

    /// Create a disabled notifier (for testing or when notifications are off).
    #[must_use]
    pub const fn disabled() -> Self {
        Self {
            channels: vec![],
            disabled: true,
        }
    }

    /// Check if any notification channels are enabled.
    #[must_use]
    pub fn has_channels(&self) -> bool {
        !self.disabled && !self.channels.is_empty()
    }

    /// Get the number of enabled channels.
    #[must_use]
    pub fn channel_count(&self) -> usize {
        if self.disabled {
            0
        } else {
            self.channels.len()
        }
    }

    /// Send a notification to all enabled channels (fire-and-forget).
    ///
    /// Spawns async tasks for each channel and returns immediately. Errors
    /// are logged but not propagated to the caller.
    pub fn notify(&self, event: NotifyEvent) {
        if self.disabled {
            debug!("Notifications disabled, skipping event");
            return;
        }

        if self.channels.is_empty() {
            debug!("No channels configured, skipping event");
            return;
        }

        let event = Arc::new(event);

        for channel in &self.channels {
            let channel = Arc::clone(channel);
            let event = Arc::clone(&event);

            tokio::spawn(async move {
                let channel_name = channel.name();

                if !channel.enabled() {
                    debug!(channel = channel_name, "Channel disabled, skipping");
                    return;
                }

                match channel.send(&event).await {
                    Ok(()) => {
                        debug!(channel = channel_name, "Notification sent");
                    }
                    Err(e) => {
                        error!(
                            channel = channel_name,
                            error = %e,
                            "Failed to send notification"
                        );
                    }
                }
            });
        }
    }

    /// Send a notification and wait for all channels to complete.
    ///
    /// Unlike `notify()`, this waits for delivery and collects any errors.
    /// Useful for testing or when delivery confirmation is needed.
    pub async fn notify_and_wait(
        &self,
        event: NotifyEvent,
    ) -> Vec<(String, Result<(), ChannelError>)> {
        if self.disabled || self.channels.is_empty() {
            return vec![];
        }

        let mut results = vec![];

        for channel in &self.channels {
            let channel_name = channel.name().to_string();
            let result = channel.send(&event).await;
            results.push((channel_name, result));
        }

        results
    }
}
