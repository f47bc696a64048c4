//! Core types for shipment classification.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// The kind of alert-worthy condition detected in a carrier update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IssueKind {
    /// Shipment is held by customs and needs intervention
    HeldInCustoms,
    /// Carrier could not complete delivery (recipient, address, refusal)
    DeliveryFailure,
    /// Problem at a domestic/last-mile delivery partner
    FinalMileIssue,
    /// Delay at a known carrier hub
    HubDelay,
    /// Weather or operational delay in transit
    TransitDelay,
    /// Damage, loss or an open carrier investigation
    DamageOrLoss,
    /// Cross-border paperwork / VAT / duty complexity
    EuCustomsComplexity,
    /// Tracking text has not changed for too long
    StaleTracking,
    /// An ambiguous status persisted past its allowed window
    AmbiguousTimeout,
    /// Shipment appears stuck in transit (assisted classification)
    StuckInTransit,
    /// No alert-worthy condition
    None,
}

impl IssueKind {
    /// Stable identifier used in dedup keys and logs.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::HeldInCustoms => "held-in-customs",
            Self::DeliveryFailure => "delivery-failure",
            Self::FinalMileIssue => "final-mile-issue",
            Self::HubDelay => "hub-delay",
            Self::TransitDelay => "transit-delay",
            Self::DamageOrLoss => "damage-or-loss",
            Self::EuCustomsComplexity => "eu-customs-complexity",
            Self::StaleTracking => "stale-tracking",
            Self::AmbiguousTimeout => "ambiguous-timeout",
            Self::StuckInTransit => "stuck-in-transit",
            Self::None => "none",
        }
    }

    /// Human-readable issue phrase for alert messages.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::HeldInCustoms => "Held in customs",
            Self::DeliveryFailure => "Delivery failure",
            Self::FinalMileIssue => "Final-mile issue",
            Self::HubDelay => "Hub delay",
            Self::TransitDelay => "Transit delay",
            Self::DamageOrLoss => "Damage or loss",
            Self::EuCustomsComplexity => "Customs documentation required",
            Self::StaleTracking => "Stale tracking",
            Self::AmbiguousTimeout => "Status stuck too long",
            Self::StuckInTransit => "Stuck in transit",
            Self::None => "No issue",
        }
    }

    /// Parse an issue kind from an external label (assist service vocabulary).
    #[must_use]
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().replace('_', "-").as_str() {
            "held-in-customs" | "customs-hold" => Some(Self::HeldInCustoms),
            "delivery-failure" | "failed-delivery" => Some(Self::DeliveryFailure),
            "final-mile-issue" => Some(Self::FinalMileIssue),
            "hub-delay" => Some(Self::HubDelay),
            "transit-delay" => Some(Self::TransitDelay),
            "damage-or-loss" | "damage" | "loss" => Some(Self::DamageOrLoss),
            "eu-customs-complexity" | "customs-documentation" => Some(Self::EuCustomsComplexity),
            "stale-tracking" => Some(Self::StaleTracking),
            "ambiguous-timeout" => Some(Self::AmbiguousTimeout),
            "stuck-in-transit" => Some(Self::StuckInTransit),
            "none" | "no-issue" => Some(Self::None),
            _ => None,
        }
    }
}

impl std::fmt::Display for IssueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Severity of a detected issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueSeverity {
    High,
    Medium,
    Low,
}

impl IssueSeverity {
    /// Display name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }

    /// Parse from the assist service vocabulary.
    #[must_use]
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "high" | "critical" => Some(Self::High),
            "medium" | "warning" => Some(Self::Medium),
            "low" | "info" => Some(Self::Low),
            _ => None,
        }
    }

    /// Map to the notification severity scale.
    #[must_use]
    pub const fn to_notify(self) -> notify::Severity {
        match self {
            Self::High => notify::Severity::Critical,
            Self::Medium => notify::Severity::Warning,
            Self::Low => notify::Severity::Info,
        }
    }
}

impl std::fmt::Display for IssueSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Carrier detected in an update text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Carrier {
    Ups,
    Dhl,
    FedEx,
    Unknown,
}

impl Carrier {
    /// Display name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Ups => "UPS",
            Self::Dhl => "DHL",
            Self::FedEx => "FedEx",
            Self::Unknown => "Unknown",
        }
    }

    /// Detect a carrier from name tokens in the text (case-insensitive).
    #[must_use]
    pub fn detect(text: &str) -> Self {
        let lower = text.to_lowercase();
        if lower.contains("ups") {
            Self::Ups
        } else if lower.contains("dhl") {
            Self::Dhl
        } else if lower.contains("fedex") || lower.contains("fed ex") {
            Self::FedEx
        } else {
            Self::Unknown
        }
    }

    /// Parse from the assist service vocabulary.
    #[must_use]
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_lowercase().as_str() {
            "ups" => Self::Ups,
            "dhl" => Self::Dhl,
            "fedex" | "fed ex" => Self::FedEx,
            _ => Self::Unknown,
        }
    }
}

impl std::fmt::Display for Carrier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The structured output of classification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issue {
    /// Kind of issue (`None` is never alerted)
    pub kind: IssueKind,
    /// Severity (meaningful for all kinds except `None`)
    pub severity: IssueSeverity,
    /// Human-readable reason
    pub reason: String,
    /// Carrier the update belongs to
    pub carrier: Carrier,
    /// Route description when known (e.g. "DE -> US")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route: Option<String>,
    /// Location extracted during classification, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

impl Issue {
    /// A non-issue result for the given carrier.
    #[must_use]
    pub const fn none(carrier: Carrier) -> Self {
        Self {
            kind: IssueKind::None,
            severity: IssueSeverity::Low,
            reason: String::new(),
            carrier,
            route: None,
            location: None,
        }
    }

    /// Build an issue with a reason.
    #[must_use]
    pub fn new(
        kind: IssueKind,
        severity: IssueSeverity,
        reason: impl Into<String>,
        carrier: Carrier,
    ) -> Self {
        Self {
            kind,
            severity,
            reason: reason.into(),
            carrier,
            route: None,
            location: None,
        }
    }

    /// Whether this result carries no alert-worthy condition.
    #[must_use]
    pub const fn is_none(&self) -> bool {
        matches!(self.kind, IssueKind::None)
    }
}

/// A tracked shipment fetched fresh from the board for one event.
///
/// `fields` maps board column ids to their text values; the per-board
/// `ColumnMap` names which column holds which attribute.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackedEntity {
    /// Opaque board item id
    pub id: i64,
    /// Item display name
    pub name: String,
    /// Column id -> text value
    #[serde(default)]
    pub fields: HashMap<String, String>,
}

impl TrackedEntity {
    /// Look up a column value, treating empty strings as absent.
    #[must_use]
    pub fn field(&self, column_id: &str) -> Option<&str> {
        self.fields
            .get(column_id)
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_carrier_detection() {
        assert_eq!(Carrier::detect("UPS: package delayed"), Carrier::Ups);
        assert_eq!(Carrier::detect("handed to dhl express"), Carrier::Dhl);
        assert_eq!(Carrier::detect("At local FedEx facility"), Carrier::FedEx);
        assert_eq!(Carrier::detect("package in transit"), Carrier::Unknown);
    }

    #[test]
    fn test_issue_kind_labels_round_trip() {
        for kind in [
            IssueKind::HeldInCustoms,
            IssueKind::DeliveryFailure,
            IssueKind::FinalMileIssue,
            IssueKind::HubDelay,
            IssueKind::TransitDelay,
            IssueKind::DamageOrLoss,
            IssueKind::EuCustomsComplexity,
            IssueKind::StaleTracking,
            IssueKind::AmbiguousTimeout,
            IssueKind::StuckInTransit,
            IssueKind::None,
        ] {
            assert_eq!(IssueKind::from_label(kind.as_str()), Some(kind));
        }
        assert_eq!(IssueKind::from_label("weather"), None);
    }

    #[test]
    fn test_none_issue_is_never_alertable() {
        let issue = Issue::none(Carrier::Ups);
        assert!(issue.is_none());
        assert!(issue.reason.is_empty());
    }

    #[test]
    fn test_entity_field_access_ignores_blank_values() {
        let mut fields = HashMap::new();
        fields.insert("location".to_string(), "  ".to_string());
        fields.insert("customer".to_string(), "Acme GmbH".to_string());
        let entity = TrackedEntity {
            id: 8812,
            name: "PO-4411".to_string(),
            fields,
        };

        assert_eq!(entity.field("location"), None);
        assert_eq!(entity.field("customer"), Some("Acme GmbH"));
        assert_eq!(entity.field("missing"), None);
    }
}
