//! Deterministic status classification.
//!
//! Maps a raw carrier update text to an [`Issue`] through an ordered rule
//! cascade. The order is a contract: terminal-success phrases win over
//! everything, carrier-specific "resolved" phrasing is checked before the
//! generic "active" phrasing, and specific failure classes come before the
//! generic fallbacks. Reordering the rules changes business meaning.

use crate::models::{Carrier, Issue, IssueKind, IssueSeverity};

/// Terminal-success phrases. Any of these ends classification with no issue,
/// regardless of what else appears in the text.
const DELIVERED_PHRASES: &[&str] = &[
    "delivered",
    "delivery completed",
    "signed by",
    "proof of delivery",
    "picked up by recipient",
    "handed to resident",
    "collected by customer",
];

/// Per-carrier phrase sets for normal operation and customs states.
struct CarrierPhrases {
    /// Routine scan events that must not alert
    normal: &'static [&'static str],
    /// Customs phrasing that means the hold is over
    customs_resolved: &'static [&'static str],
    /// Customs phrasing that means the shipment is actively held
    customs_active: &'static [&'static str],
}

static UPS_PHRASES: CarrierPhrases = CarrierPhrases {
    normal: &[
        "on the way",
        "out for delivery",
        "arrived at facility",
        "departed from facility",
        "pickup scan",
        "order processed",
        "your package is moving within the ups network",
    ],
    customs_resolved: &[
        "customs clearance completed",
        "released by customs",
        "cleared customs",
        "your package has cleared customs",
    ],
    customs_active: &[
        "held in customs",
        "held by customs",
        "customs hold",
        "awaiting customs clearance",
        "clearance delay",
        "import duties",
        "duties and taxes required",
        "additional documentation required for clearance",
    ],
};

static DHL_PHRASES: CarrierPhrases = CarrierPhrases {
    normal: &[
        "shipment picked up",
        "processed at",
        "arrived at sort facility",
        "departed facility",
        "with delivery courier",
        "shipment is in transit to destination",
    ],
    customs_resolved: &[
        "clearance processing complete",
        "customs status updated - released",
        "released from customs",
        "clearance completed",
    ],
    customs_active: &[
        "held in customs",
        "held by customs",
        "clearance event",
        "awaiting payment of duties",
        "customs inspection",
        "uplifted from customs",
        "further clearance processing required",
    ],
};

static FEDEX_PHRASES: CarrierPhrases = CarrierPhrases {
    normal: &[
        "left fedex origin facility",
        "at local fedex facility",
        "on fedex vehicle for delivery",
        "arrived at fedex location",
        "shipment information sent",
        "at destination sort facility",
    ],
    customs_resolved: &[
        "international shipment release",
        "clearance completed",
        "released by customs",
    ],
    customs_active: &[
        "held in customs",
        "held by customs",
        "clearance delay",
        "awaiting clearance",
        "broker notified",
        "duties require payment",
    ],
};

/// Fallback phrase sets when no carrier token is present.
static GENERIC_PHRASES: CarrierPhrases = CarrierPhrases {
    normal: &[],
    customs_resolved: &["released by customs", "cleared customs", "clearance completed"],
    customs_active: &[
        "held in customs",
        "held by customs",
        "customs hold",
        "awaiting customs clearance",
        "clearance delay",
        "import duties",
    ],
};

/// Generic delivery-failure phrases (rule 6).
const DELIVERY_FAILURE_PHRASES: &[&str] = &[
    "recipient unavailable",
    "consignee unavailable",
    "consignee premises closed",
    "premises closed",
    "business closed",
    "address incorrect",
    "incorrect address",
    "insufficient address",
    "refused delivery",
    "delivery refused",
    "refused by recipient",
    "unable to deliver",
    "delivery attempted",
    "access to delivery location unavailable",
];

/// Domestic/last-mile partner tokens (rule 7, combined with a delay word).
const FINAL_MILE_PARTNERS: &[&str] = &[
    "usps",
    "post office",
    "local post",
    "deutsche post",
    "la poste",
    "parcelforce",
    "hermes",
    "evri",
    "gls",
    "dpd",
    "yodel",
    "colissimo",
    "postnl",
];

/// Known carrier hub names (rule 8, combined with a delay word).
const HUB_NAMES: &[&str] = &[
    "memphis",
    "louisville",
    "leipzig",
    "cologne",
    "koeln",
    "east midlands",
    "cincinnati",
    "anchorage",
    "hong kong",
    "dubai",
    "paris-charles de gaulle",
    "roissy",
];

/// Words that turn a partner/hub mention into a problem signal.
const DELAY_WORDS: &[&str] = &[
    "delay",
    "delayed",
    "exception",
    "held",
    "problem",
    "unable",
    "missed",
];

/// Transit/weather/operational delay phrases (rule 9).
const TRANSIT_DELAY_PHRASES: &[&str] = &[
    "weather delay",
    "adverse weather",
    "severe weather",
    "operational delay",
    "mechanical delay",
    "flight delay",
    "natural disaster",
    "service disruption",
    "backlog",
    "delay in transit",
];

/// Damage/loss/investigation phrases (rule 10).
const DAMAGE_LOSS_PHRASES: &[&str] = &[
    "damaged",
    "damage reported",
    "lost",
    "missing",
    "investigation opened",
    "under investigation",
    "claim filed",
    "parcel inspection",
];

/// Customs-documentation / regulatory phrases (rule 11).
const EU_CUSTOMS_PHRASES: &[&str] = &[
    "vat",
    "duty owed",
    "duties owed",
    "eori",
    "hs code",
    "commodity code",
    "import declaration",
    "export declaration",
    "customs documentation",
    "commercial invoice required",
    "brokerage",
    "paperwork required",
];

fn phrases_for(carrier: Carrier) -> &'static CarrierPhrases {
    match carrier {
        Carrier::Ups => &UPS_PHRASES,
        Carrier::Dhl => &DHL_PHRASES,
        Carrier::FedEx => &FEDEX_PHRASES,
        Carrier::Unknown => &GENERIC_PHRASES,
    }
}

/// Find the first phrase from `phrases` contained in the (lowercased) text.
fn find_phrase(lower: &str, phrases: &[&'static str]) -> Option<&'static str> {
    phrases.iter().copied().find(|p| lower.contains(p))
}

/// A single classification rule: returns `Some(Issue)` on match.
type Rule = fn(&str, Carrier) -> Option<Issue>;

/// The ordered rule cascade. First match wins; later rules are more generic
/// fallbacks. The names are used by the precedence tests.
pub const RULES: &[(&str, Rule)] = &[
    ("delivered", rule_delivered),
    ("carrier-normal", rule_carrier_normal),
    ("customs-resolved", rule_customs_resolved),
    ("customs-active", rule_customs_active),
    ("delivery-failure", rule_delivery_failure),
    ("final-mile", rule_final_mile),
    ("hub-delay", rule_hub_delay),
    ("transit-delay", rule_transit_delay),
    ("damage-or-loss", rule_damage_or_loss),
    ("eu-customs", rule_eu_customs),
];

/// Classify an update text into an [`Issue`].
///
/// `carrier_hint` short-circuits carrier detection when the caller already
/// knows the carrier (e.g. from a structured board field).
#[must_use]
pub fn classify(update_text: &str, carrier_hint: Option<Carrier>) -> Issue {
    let lower = update_text.to_lowercase();
    let carrier = match carrier_hint {
        Some(c) if c != Carrier::Unknown => c,
        _ => Carrier::detect(update_text),
    };

    for (_, rule) in RULES {
        if let Some(issue) = rule(&lower, carrier) {
            return issue;
        }
    }

    Issue::none(carrier)
}

fn rule_delivered(lower: &str, carrier: Carrier) -> Option<Issue> {
    find_phrase(lower, DELIVERED_PHRASES).map(|_| Issue::none(carrier))
}

fn rule_carrier_normal(lower: &str, carrier: Carrier) -> Option<Issue> {
    find_phrase(lower, phrases_for(carrier).normal).map(|_| Issue::none(carrier))
}

fn rule_customs_resolved(lower: &str, carrier: Carrier) -> Option<Issue> {
    find_phrase(lower, phrases_for(carrier).customs_resolved).map(|_| Issue::none(carrier))
}

fn rule_customs_active(lower: &str, carrier: Carrier) -> Option<Issue> {
    find_phrase(lower, phrases_for(carrier).customs_active).map(|phrase| {
        Issue::new(
            IssueKind::HeldInCustoms,
            IssueSeverity::High,
            format!("Carrier reports an active customs hold (\"{phrase}\")"),
            carrier,
        )
    })
}

fn rule_delivery_failure(lower: &str, carrier: Carrier) -> Option<Issue> {
    find_phrase(lower, DELIVERY_FAILURE_PHRASES).map(|phrase| {
        Issue::new(
            IssueKind::DeliveryFailure,
            IssueSeverity::High,
            format!("Delivery could not be completed (\"{phrase}\")"),
            carrier,
        )
    })
}

fn rule_final_mile(lower: &str, carrier: Carrier) -> Option<Issue> {
    let partner = find_phrase(lower, FINAL_MILE_PARTNERS)?;
    let delay = find_phrase(lower, DELAY_WORDS)?;
    Some(Issue::new(
        IssueKind::FinalMileIssue,
        IssueSeverity::High,
        format!("Last-mile partner {partner} reports \"{delay}\""),
        carrier,
    ))
}

fn rule_hub_delay(lower: &str, carrier: Carrier) -> Option<Issue> {
    let hub = find_phrase(lower, HUB_NAMES)?;
    let delay = find_phrase(lower, DELAY_WORDS)?;
    Some(Issue::new(
        IssueKind::HubDelay,
        IssueSeverity::Medium,
        format!("Delay at carrier hub {hub} (\"{delay}\")"),
        carrier,
    ))
}

fn rule_transit_delay(lower: &str, carrier: Carrier) -> Option<Issue> {
    find_phrase(lower, TRANSIT_DELAY_PHRASES).map(|phrase| {
        Issue::new(
            IssueKind::TransitDelay,
            IssueSeverity::Medium,
            format!("Transit delay reported (\"{phrase}\")"),
            carrier,
        )
    })
}

fn rule_damage_or_loss(lower: &str, carrier: Carrier) -> Option<Issue> {
    find_phrase(lower, DAMAGE_LOSS_PHRASES).map(|phrase| {
        Issue::new(
            IssueKind::DamageOrLoss,
            IssueSeverity::High,
            format!("Possible damage or loss (\"{phrase}\")"),
            carrier,
        )
    })
}

fn rule_eu_customs(lower: &str, carrier: Carrier) -> Option<Issue> {
    find_phrase(lower, EU_CUSTOMS_PHRASES).map(|phrase| {
        Issue::new(
            IssueKind::EuCustomsComplexity,
            IssueSeverity::Medium,
            format!("Cross-border documentation needed (\"{phrase}\")"),
            carrier,
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_order_is_a_contract() {
        let order: Vec<&str> = RULES.iter().map(|(name, _)| *name).collect();
        assert_eq!(
            order,
            vec![
                "delivered",
                "carrier-normal",
                "customs-resolved",
                "customs-active",
                "delivery-failure",
                "final-mile",
                "hub-delay",
                "transit-delay",
                "damage-or-loss",
                "eu-customs",
            ]
        );
    }

    #[test]
    fn test_delivered_wins_over_everything() {
        // Both a terminal phrase and a customs-problem phrase present
        let issue = classify("Delivered after customs hold was released", Some(Carrier::Ups));
        assert!(issue.is_none());

        let issue = classify("DELIVERED - import duties were required", None);
        assert!(issue.is_none());
    }

    #[test]
    fn test_customs_resolved_before_generic_active() {
        // "customs" appears in resolved phrasing - must not alert
        let issue = classify("UPS: Customs clearance completed", None);
        assert!(issue.is_none());

        let issue = classify("DHL clearance processing complete", None);
        assert!(issue.is_none());
    }

    #[test]
    fn test_customs_active_high_severity() {
        let issue = classify("Held by customs - import duties required", Some(Carrier::Ups));
        assert_eq!(issue.kind, IssueKind::HeldInCustoms);
        assert_eq!(issue.severity, IssueSeverity::High);
        assert_eq!(issue.carrier, Carrier::Ups);
        assert!(issue.reason.contains("customs"));
    }

    #[test]
    fn test_customs_active_without_carrier_token() {
        let issue = classify("Awaiting customs clearance at border", None);
        assert_eq!(issue.kind, IssueKind::HeldInCustoms);
        assert_eq!(issue.carrier, Carrier::Unknown);
    }

    #[test]
    fn test_delivery_failure_phrases() {
        for text in [
            "Consignee premises closed",
            "Receiver refused delivery",
            "Address incorrect - contact sender",
            "Delivery attempted; recipient unavailable",
        ] {
            let issue = classify(text, None);
            assert_eq!(issue.kind, IssueKind::DeliveryFailure, "{text}");
            assert_eq!(issue.severity, IssueSeverity::High);
        }
    }

    #[test]
    fn test_final_mile_needs_partner_and_delay() {
        let issue = classify("Handed to USPS - delivery exception", None);
        assert_eq!(issue.kind, IssueKind::FinalMileIssue);

        // Partner mention alone is routine
        let issue = classify("Handed over to USPS for final delivery", None);
        assert!(issue.is_none());
    }

    #[test]
    fn test_hub_delay_is_medium() {
        let issue = classify("Package delayed at Memphis hub", Some(Carrier::FedEx));
        assert_eq!(issue.kind, IssueKind::HubDelay);
        assert_eq!(issue.severity, IssueSeverity::Medium);
    }

    #[test]
    fn test_transit_delay() {
        let issue = classify("Adverse weather conditions in the region", None);
        assert_eq!(issue.kind, IssueKind::TransitDelay);
        assert_eq!(issue.severity, IssueSeverity::Medium);
    }

    #[test]
    fn test_damage_or_loss() {
        let issue = classify("Package damaged, claim filed with carrier", None);
        assert_eq!(issue.kind, IssueKind::DamageOrLoss);
        assert_eq!(issue.severity, IssueSeverity::High);
    }

    #[test]
    fn test_eu_customs_complexity() {
        let issue = classify("Commercial invoice required for import declaration", None);
        assert_eq!(issue.kind, IssueKind::EuCustomsComplexity);
        assert_eq!(issue.severity, IssueSeverity::Medium);
    }

    #[test]
    fn test_unmatched_text_is_none() {
        let issue = classify("Electronic shipping label printed", None);
        assert!(issue.is_none());
    }

    #[test]
    fn test_carrier_hint_beats_detection() {
        let issue = classify("Held by customs", Some(Carrier::Dhl));
        assert_eq!(issue.carrier, Carrier::Dhl);
    }

    #[test]
    fn test_carrier_normal_phrases_do_not_alert() {
        for (text, hint) in [
            ("UPS: your package is moving within the UPS network", None),
            ("DHL shipment picked up", None),
            ("Left FedEx origin facility", None),
        ] {
            let issue = classify(text, hint);
            assert!(issue.is_none(), "{text}");
        }
    }
}
