//! Slack chat notification channel.
//!
//! Posts through the Slack Web API (`chat.postMessage`) so messages land in
//! a configured channel and the message timestamp is returned to the caller.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::ChannelError;
use crate::events::NotifyEvent;
use crate::NotifyChannel;

/// Environment variable for the Slack bot token.
const ENV_SLACK_BOT_TOKEN: &str = "SLACK_BOT_TOKEN";

/// Environment variable for the target channel id.
const ENV_SLACK_CHANNEL_ID: &str = "SLACK_CHANNEL_ID";

/// Slack Web API endpoint for posting messages.
const SLACK_POST_MESSAGE_URL: &str = "https://slack.com/api/chat.postMessage";

/// Slack chat notification channel.
pub struct SlackChannel {
    token: Option<String>,
    channel_id: Option<String>,
    api_url: String,
    client: reqwest::Client,
}

impl SlackChannel {
    /// Create a new Slack channel from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        let token = std::env::var(ENV_SLACK_BOT_TOKEN).ok().filter(|s| !s.is_empty());
        let channel_id = std::env::var(ENV_SLACK_CHANNEL_ID).ok().filter(|s| !s.is_empty());

        if token.is_some() && channel_id.is_some() {
            debug!("Slack notifications enabled");
        } else {
            debug!("Slack notifications disabled (SLACK_BOT_TOKEN/SLACK_CHANNEL_ID not set)");
        }

        Self {
            token,
            channel_id,
            api_url: SLACK_POST_MESSAGE_URL.to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// Create a Slack channel with explicit credentials.
    #[must_use]
    pub fn new(token: String, channel_id: String) -> Self {
        Self {
            token: Some(token),
            channel_id: Some(channel_id),
            api_url: SLACK_POST_MESSAGE_URL.to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// Override the API URL (for testing against a mock server).
    #[must_use]
    pub fn with_api_url(mut self, api_url: String) -> Self {
        self.api_url = api_url;
        self
    }

    /// Post a message and return its timestamp id.
    ///
    /// This is the raw chat sink: a fallback text line plus Block Kit blocks.
    pub async fn post_message(
        &self,
        text: &str,
        blocks: Vec<SlackBlock>,
    ) -> Result<String, ChannelError> {
        let token = self
            .token
            .as_ref()
            .ok_or_else(|| ChannelError::NotConfigured(ENV_SLACK_BOT_TOKEN.to_string()))?;
        let channel = self
            .channel_id
            .as_ref()
            .ok_or_else(|| ChannelError::NotConfigured(ENV_SLACK_CHANNEL_ID.to_string()))?;

        let payload = PostMessageRequest {
            channel,
            text,
            blocks,
        };

        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(token)
            .json(&payload)
            .send()
            .await?;

        if response.status() == 429 {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok())
                .unwrap_or(5);

            warn!(
                channel = "slack",
                retry_after_secs = retry_after,
                "Rate limited by Slack"
            );

            return Err(ChannelError::RateLimited {
                retry_after_secs: retry_after,
            });
        }

        let body: PostMessageResponse = response.json().await?;

        if body.ok {
            let ts = body.ts.unwrap_or_default();
            debug!(channel = "slack", ts = %ts, "Message posted");
            Ok(ts)
        } else {
            let error = body.error.unwrap_or_else(|| "unknown_error".to_string());
            warn!(channel = "slack", error = %error, "chat.postMessage failed");
            Err(ChannelError::Api(error))
        }
    }

    /// Format an event as fallback text plus Block Kit blocks.
    fn format_message(event: &NotifyEvent) -> (String, Vec<SlackBlock>) {
        let severity = event.severity();

        match event {
            NotifyEvent::ShipmentAlert {
                item_name,
                issue,
                reason,
                carrier,
                location,
                update_text,
                due_date,
                origin,
                mention,
                ..
            } => {
                let summary = match mention {
                    Some(who) => format!(
                        "{} {who} *{issue}*: {item_name} — {location}",
                        severity.emoji()
                    ),
                    None => format!(
                        "{} *{issue}*: {item_name} — {location}",
                        severity.emoji()
                    ),
                };

                let mut details = vec![
                    format!("*Carrier:* {carrier}"),
                    format!("*Severity:* {}", severity.as_str()),
                    format!("*Reason:* {reason}"),
                ];
                if let Some(due) = due_date {
                    details.push(format!("*Due:* {due}"));
                }

                let blocks = vec![
                    SlackBlock::Section {
                        text: SlackText::mrkdwn(summary.clone()),
                    },
                    SlackBlock::Section {
                        text: SlackText::mrkdwn(details.join(" • ")),
                    },
                    SlackBlock::Section {
                        text: SlackText::mrkdwn(format!("> {update_text}")),
                    },
                    SlackBlock::Context {
                        elements: vec![SlackText::mrkdwn(format!(
                            "{origin} • {}",
                            event.timestamp().format("%Y-%m-%d %H:%M:%S UTC")
                        ))],
                    },
                ];

                (summary, blocks)
            }

            NotifyEvent::CustomerNotified {
                item_name,
                recipient,
                reason,
                ..
            } => {
                let summary = format!(
                    "{} Customer notified for *{item_name}* ({recipient})",
                    severity.emoji()
                );
                let blocks = vec![
                    SlackBlock::Section {
                        text: SlackText::mrkdwn(summary.clone()),
                    },
                    SlackBlock::Context {
                        elements: vec![SlackText::mrkdwn(format!("Reason: {reason}"))],
                    },
                ];
                (summary, blocks)
            }
        }
    }
}

#[async_trait]
impl NotifyChannel for SlackChannel {
    fn name(&self) -> &'static str {
        "slack"
    }

    fn enabled(&self) -> bool {
        self.token.is_some() && self.channel_id.is_some()
    }

    async fn send(&self, event: &NotifyEvent) -> Result<(), ChannelError> {
        let (text, blocks) = Self::format_message(event);
        self.post_message(&text, blocks).await.map(|_| ())
    }
}

// =============================================================================
// Slack API types (Block Kit)
// =============================================================================

#[derive(Debug, Serialize)]
struct PostMessageRequest<'a> {
    channel: &'a str,
    /// Fallback text for notifications
    text: &'a str,
    blocks: Vec<SlackBlock>,
}

#[derive(Debug, Deserialize)]
struct PostMessageResponse {
    ok: bool,
    #[serde(default)]
    ts: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Block Kit block.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SlackBlock {
    /// Section block with text
    Section { text: SlackText },
    /// Divider line
    Divider,
    /// Context block for metadata
    Context { elements: Vec<SlackText> },
}

/// Block Kit text element.
#[derive(Debug, Serialize)]
pub struct SlackText {
    #[serde(rename = "type")]
    text_type: &'static str,
    text: String,
}

impl SlackText {
    /// Markdown-formatted text element.
    #[must_use]
    pub fn mrkdwn(text: impl Into<String>) -> Self {
        Self {
            text_type: "mrkdwn",
            text: text.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::Severity;
    use chrono::Utc;

    fn alert_event(mention: Option<String>) -> NotifyEvent {
        NotifyEvent::ShipmentAlert {
            item_id: "8812".to_string(),
            item_name: "PO-4411 spare parts".to_string(),
            issue: "Held in customs".to_string(),
            severity: Severity::Critical,
            reason: "Import duties requested by carrier".to_string(),
            carrier: "UPS".to_string(),
            location: "Cologne, Germany".to_string(),
            update_text: "Held by customs - import duties required".to_string(),
            due_date: Some("2026-03-02".to_string()),
            origin: "EU board".to_string(),
            mention,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_channel_disabled_without_credentials() {
        std::env::remove_var("SLACK_BOT_TOKEN");
        std::env::remove_var("SLACK_CHANNEL_ID");

        let channel = SlackChannel::from_env();
        assert!(!channel.enabled());
    }

    #[test]
    fn test_alert_summary_includes_mention() {
        let (text, blocks) = SlackChannel::format_message(&alert_event(Some("<@U042>".into())));
        assert!(text.contains("<@U042>"));
        assert!(text.contains("Held in customs"));
        assert!(text.contains("PO-4411 spare parts"));
        assert_eq!(blocks.len(), 4);
    }

    #[test]
    fn test_alert_summary_without_mention_keeps_origin() {
        let (text, blocks) = SlackChannel::format_message(&alert_event(None));
        assert!(!text.contains('@'));

        let context = serde_json::to_string(&blocks).unwrap();
        assert!(context.contains("EU board"));
    }

    #[test]
    fn test_customer_notified_format() {
        let event = NotifyEvent::CustomerNotified {
            item_id: "8812".to_string(),
            item_name: "PO-4411 spare parts".to_string(),
            recipient: "ops@acme.example".to_string(),
            reason: "Consignee premises closed".to_string(),
            timestamp: Utc::now(),
        };

        let (text, blocks) = SlackChannel::format_message(&event);
        assert!(text.contains("ops@acme.example"));
        assert_eq!(blocks.len(), 2);
    }
}
