//! Notification event types for shipment monitoring.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Severity levels for alerts and notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational - normal operations
    Info,
    /// Warning - something needs attention
    Warning,
    /// Critical - immediate action required
    Critical,
}

impl Severity {
    /// Get the embed/attachment color for this severity.
    #[must_use]
    pub const fn color(&self) -> u32 {
        match self {
            Self::Info => 0x0034_98db,     // Blue
            Self::Warning => 0x00f3_9c12,  // Orange
            Self::Critical => 0x00e7_4c3c, // Red
        }
    }

    /// Get display name for this severity.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "Info",
            Self::Warning => "Warning",
            Self::Critical => "Critical",
        }
    }

    /// Get the emoji prefix used in chat messages.
    #[must_use]
    pub const fn emoji(&self) -> &'static str {
        match self {
            Self::Info => ":information_source:",
            Self::Warning => ":warning:",
            Self::Critical => ":rotating_light:",
        }
    }
}

/// Events that can trigger notifications.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotifyEvent {
    /// A shipment update was classified as alert-worthy.
    ShipmentAlert {
        /// Board item id of the shipment
        item_id: String,
        /// Human-readable item name
        item_name: String,
        /// Issue label, e.g. "Held in customs"
        issue: String,
        severity: Severity,
        /// Human-readable reason produced by the classifier
        reason: String,
        /// Carrier display name ("UPS", "DHL", "FedEx", "Unknown")
        carrier: String,
        /// Resolved current location (or the "Unknown Location" sentinel)
        location: String,
        /// Raw carrier update text that triggered the alert
        update_text: String,
        /// Promised delivery date, if the board knows one
        #[serde(default)]
        due_date: Option<String>,
        /// Origin label for the alert (board name/region)
        origin: String,
        /// Coordinator to mention, as a chat mention string (e.g. "<@U123>")
        #[serde(default)]
        mention: Option<String>,
        #[serde(default = "Utc::now")]
        timestamp: DateTime<Utc>,
    },

    /// A customer was notified by email about a delivery problem.
    CustomerNotified {
        item_id: String,
        item_name: String,
        /// Email address the notification went to
        recipient: String,
        /// Why the customer was contacted
        reason: String,
        #[serde(default = "Utc::now")]
        timestamp: DateTime<Utc>,
    },
}

impl NotifyEvent {
    /// Get a short title for this event type.
    #[must_use]
    pub fn title(&self) -> String {
        match self {
            Self::ShipmentAlert {
                item_name, issue, ..
            } => format!("{issue}: {item_name}"),
            Self::CustomerNotified { item_name, .. } => {
                format!("Customer notified: {item_name}")
            }
        }
    }

    /// Get the severity for this event.
    #[must_use]
    pub const fn severity(&self) -> Severity {
        match self {
            Self::ShipmentAlert { severity, .. } => *severity,
            Self::CustomerNotified { .. } => Severity::Info,
        }
    }

    /// Get the timestamp for this event.
    #[must_use]
    pub const fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::ShipmentAlert { timestamp, .. }
            | Self::CustomerNotified { timestamp, .. } => *timestamp,
        }
    }
}
