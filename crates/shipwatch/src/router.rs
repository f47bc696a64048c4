//! Alert routing: internal chat alerts and conditional customer emails.
//!
//! Every non-`None` issue produces an internal chat alert. A customer
//! email goes out only when the update text matches a customer-facing
//! action pattern AND a company/customer name resolves AND the contact
//! lookup succeeds. The two paths are independent: failure of one never
//! blocks the other, and neither blocks the webhook acknowledgment.

use notify::{EmailSender, Notifier, NotifyEvent};
use tracing::{debug, info, warn};

use crate::config::BoardConfig;
use crate::contacts::ContactsClient;
use crate::models::{Issue, TrackedEntity};

/// Customer-facing delivery problems that warrant a direct email.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CustomerAction {
    PremisesClosed,
    ConsigneeUnavailable,
    RefusedDelivery,
    IncorrectAddress,
    DeliveryAttempted,
}

impl CustomerAction {
    /// Match an update text against the customer-action pattern set.
    ///
    /// Ordered specific-to-generic; "delivery attempted" is the generic
    /// catch-all.
    #[must_use]
    pub fn match_text(update_text: &str) -> Option<Self> {
        let lower = update_text.to_lowercase();
        const PATTERNS: &[(CustomerAction, &[&str])] = &[
            (
                CustomerAction::PremisesClosed,
                &["premises closed", "business closed"],
            ),
            (
                CustomerAction::ConsigneeUnavailable,
                &["consignee unavailable", "recipient unavailable"],
            ),
            (CustomerAction::RefusedDelivery, &["refused"]),
            (
                CustomerAction::IncorrectAddress,
                &["address incorrect", "incorrect address", "insufficient address"],
            ),
            (CustomerAction::DeliveryAttempted, &["delivery attempted"]),
        ];

        PATTERNS
            .iter()
            .find(|(_, phrases)| phrases.iter().any(|p| lower.contains(p)))
            .map(|(action, _)| *action)
    }

    /// Short description of the matched reason.
    #[must_use]
    pub const fn reason(&self) -> &'static str {
        match self {
            Self::PremisesClosed => "the delivery location was closed",
            Self::ConsigneeUnavailable => "nobody was available to receive the delivery",
            Self::RefusedDelivery => "the delivery was refused",
            Self::IncorrectAddress => "the delivery address appears to be incorrect",
            Self::DeliveryAttempted => "a delivery attempt could not be completed",
        }
    }

    /// Recommended action for the customer, keyed by the match reason.
    #[must_use]
    pub const fn recommended_action(&self) -> &'static str {
        match self {
            Self::PremisesClosed => {
                "Please confirm your site's opening hours so the carrier can schedule redelivery."
            }
            Self::ConsigneeUnavailable => {
                "Please make sure someone is available to receive the delivery, or nominate a safe drop-off location."
            }
            Self::RefusedDelivery => {
                "The delivery was refused at your address. Please let us know whether this was intentional."
            }
            Self::IncorrectAddress => {
                "Please verify the delivery address we have on file and send any corrections."
            }
            Self::DeliveryAttempted => {
                "Please arrange redelivery with the carrier or collect the shipment at the local depot."
            }
        }
    }
}

/// Dispatches classified issues to the internal channel and, when
/// warranted, to the customer.
pub struct NotificationRouter {
    notifier: Notifier,
    email: Option<EmailSender>,
    contacts: Option<ContactsClient>,
    email_reply_to: Option<String>,
    email_bcc: Option<String>,
}

impl NotificationRouter {
    /// Create a router.
    #[must_use]
    pub fn new(
        notifier: Notifier,
        email: Option<EmailSender>,
        contacts: Option<ContactsClient>,
        email_reply_to: Option<String>,
        email_bcc: Option<String>,
    ) -> Self {
        Self {
            notifier,
            email,
            contacts,
            email_reply_to,
            email_bcc,
        }
    }

    /// Route one issue: customer email first (when warranted), then the
    /// internal alert regardless of the email outcome.
    pub async fn route(
        &self,
        issue: &Issue,
        entity: &TrackedEntity,
        board: &BoardConfig,
        location: &str,
        update_text: &str,
    ) {
        let recipient = match CustomerAction::match_text(update_text) {
            Some(action) => {
                self.try_customer_email(issue, entity, board, location, update_text, action)
                    .await
            }
            None => None,
        };

        let event = build_alert_event(issue, entity, board, location, update_text);
        for (channel, result) in self.notifier.notify_and_wait(event).await {
            if let Err(e) = result {
                warn!(channel = %channel, error = %e, "Internal alert delivery failed");
            }
        }

        if let Some(recipient) = recipient {
            // Informational follow-up; fire-and-forget.
            self.notifier.notify(NotifyEvent::CustomerNotified {
                item_id: entity.id.to_string(),
                item_name: entity.name.clone(),
                recipient,
                reason: update_text.to_string(),
                timestamp: chrono::Utc::now(),
            });
        }
    }

    /// Attempt the customer email path. Returns the recipient address on
    /// success; every miss or failure is logged and swallowed.
    async fn try_customer_email(
        &self,
        issue: &Issue,
        entity: &TrackedEntity,
        board: &BoardConfig,
        location: &str,
        update_text: &str,
        action: CustomerAction,
    ) -> Option<String> {
        let Some(email) = &self.email else {
            debug!("Customer email not configured, skipping");
            return None;
        };
        let Some(contacts) = &self.contacts else {
            debug!("Contact lookup not configured, skipping customer email");
            return None;
        };

        let Some(name) = entity
            .field(&board.columns.company)
            .or_else(|| entity.field(&board.columns.customer))
        else {
            info!(
                item_id = entity.id,
                "No company or customer name on item, skipping customer email"
            );
            return None;
        };

        let contact = match contacts.find_contact(name).await {
            Ok(Some(contact)) => contact,
            Ok(None) => {
                info!(item_id = entity.id, name = %name, "No contact match for customer");
                return None;
            }
            Err(e) => {
                warn!(item_id = entity.id, error = %e, "Contact lookup failed");
                return None;
            }
        };

        let (subject, body) = compose_customer_email(
            entity,
            issue,
            action,
            location,
            update_text,
            contact.first_name.as_deref(),
        );

        match email
            .send_plain(
                &contact.email,
                &subject,
                &body,
                self.email_reply_to.as_deref(),
                self.email_bcc.as_deref(),
            )
            .await
        {
            Ok(()) => {
                info!(item_id = entity.id, recipient = %contact.email, "Customer notified");
                Some(contact.email)
            }
            Err(e) => {
                warn!(item_id = entity.id, error = %e, "Customer email failed");
                None
            }
        }
    }
}

/// Build the internal chat alert event for an issue.
#[must_use]
pub fn build_alert_event(
    issue: &Issue,
    entity: &TrackedEntity,
    board: &BoardConfig,
    location: &str,
    update_text: &str,
) -> NotifyEvent {
    NotifyEvent::ShipmentAlert {
        item_id: entity.id.to_string(),
        item_name: entity.name.clone(),
        issue: issue.kind.label().to_string(),
        severity: issue.severity.to_notify(),
        reason: issue.reason.clone(),
        carrier: issue.carrier.to_string(),
        location: location.to_string(),
        update_text: update_text.to_string(),
        due_date: entity.field(&board.columns.due_date).map(str::to_string),
        origin: board.origin(),
        mention: board.coordinator.clone(),
        timestamp: chrono::Utc::now(),
    }
}

/// Compose the plain-text customer email.
#[must_use]
pub fn compose_customer_email(
    entity: &TrackedEntity,
    issue: &Issue,
    action: CustomerAction,
    location: &str,
    update_text: &str,
    first_name: Option<&str>,
) -> (String, String) {
    let subject = format!("Delivery update for {}: action may be required", entity.name);

    let greeting = match first_name {
        Some(first) => format!("Hello {first},"),
        None => "Hello,".to_string(),
    };

    let mut body = format!(
        "{greeting}\n\n\
         We are monitoring your shipment \"{}\" and the carrier reports that {}.\n\n\
         Latest carrier update:\n    {update_text}\n\n\
         Status: {} ({} severity)\n\
         Current location: {location}\n",
        entity.name,
        action.reason(),
        issue.kind.label(),
        issue.severity,
    );
    body.push_str(&format!(
        "\nRecommended action: {}\n\n\
         If you have any questions, just reply to this email.\n\n\
         Regards,\nYour logistics team\n",
        action.recommended_action()
    ));

    (subject, body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Carrier, IssueKind, IssueSeverity};
    use async_trait::async_trait;
    use notify::{ChannelError, NotifyChannel};
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    /// Records every event it receives.
    struct RecordingChannel {
        events: Arc<Mutex<Vec<NotifyEvent>>>,
    }

    #[async_trait]
    impl NotifyChannel for RecordingChannel {
        fn name(&self) -> &'static str {
            "recording"
        }

        fn enabled(&self) -> bool {
            true
        }

        async fn send(&self, event: &NotifyEvent) -> Result<(), ChannelError> {
            self.events.lock().unwrap().push(event.clone());
            Ok(())
        }
    }

    fn entity_with(fields: &[(&str, &str)]) -> TrackedEntity {
        TrackedEntity {
            id: 8812,
            name: "PO-4411 spare parts".to_string(),
            fields: fields
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect::<HashMap<_, _>>(),
        }
    }

    fn customs_issue() -> Issue {
        Issue::new(
            IssueKind::HeldInCustoms,
            IssueSeverity::High,
            "Carrier reports an active customs hold",
            Carrier::Ups,
        )
    }

    fn board_with_coordinator() -> BoardConfig {
        BoardConfig {
            board_id: 101,
            label: "EU shipments".to_string(),
            region: Some("EU".to_string()),
            coordinator: Some("<@U042>".to_string()),
            columns: crate::config::ColumnMap::default(),
        }
    }

    #[test]
    fn test_customer_action_patterns() {
        assert_eq!(
            CustomerAction::match_text("Consignee premises closed"),
            Some(CustomerAction::PremisesClosed)
        );
        assert_eq!(
            CustomerAction::match_text("Recipient unavailable at address"),
            Some(CustomerAction::ConsigneeUnavailable)
        );
        assert_eq!(
            CustomerAction::match_text("Package refused by receiver"),
            Some(CustomerAction::RefusedDelivery)
        );
        assert_eq!(
            CustomerAction::match_text("Incorrect address - contact sender"),
            Some(CustomerAction::IncorrectAddress)
        );
        assert_eq!(
            CustomerAction::match_text("Delivery attempted at 10:42"),
            Some(CustomerAction::DeliveryAttempted)
        );
        // Internal-only problems never email the customer.
        assert_eq!(CustomerAction::match_text("Held by customs"), None);
    }

    #[test]
    fn test_specific_pattern_beats_generic() {
        // Contains both "premises closed" and "delivery attempted".
        assert_eq!(
            CustomerAction::match_text("Delivery attempted - consignee premises closed"),
            Some(CustomerAction::PremisesClosed)
        );
    }

    #[test]
    fn test_alert_event_carries_coordinator_mention() {
        let entity = entity_with(&[("due_date", "2026-03-02")]);
        let board = board_with_coordinator();
        let event = build_alert_event(
            &customs_issue(),
            &entity,
            &board,
            "Cologne, Germany",
            "Held by customs - import duties required",
        );

        let NotifyEvent::ShipmentAlert {
            mention,
            origin,
            due_date,
            severity,
            ..
        } = event
        else {
            panic!("expected a ShipmentAlert");
        };
        assert_eq!(mention.as_deref(), Some("<@U042>"));
        assert_eq!(origin, "EU shipments (EU)");
        assert_eq!(due_date.as_deref(), Some("2026-03-02"));
        assert_eq!(severity, notify::Severity::Critical);
    }

    #[test]
    fn test_alert_event_without_coordinator_keeps_origin() {
        let entity = entity_with(&[]);
        let board = BoardConfig::fallback(999);
        let event = build_alert_event(
            &customs_issue(),
            &entity,
            &board,
            "Unknown Location",
            "Held by customs",
        );

        let NotifyEvent::ShipmentAlert { mention, origin, .. } = event else {
            panic!("expected a ShipmentAlert");
        };
        assert!(mention.is_none());
        assert_eq!(origin, "board 999");
    }

    #[test]
    fn test_compose_customer_email() {
        let entity = entity_with(&[]);
        let issue = Issue::new(
            IssueKind::DeliveryFailure,
            IssueSeverity::High,
            "Delivery could not be completed",
            Carrier::Dhl,
        );
        let (subject, body) = compose_customer_email(
            &entity,
            &issue,
            CustomerAction::PremisesClosed,
            "Rotterdam",
            "Consignee premises closed",
            Some("Ava"),
        );

        assert!(subject.contains("PO-4411 spare parts"));
        assert!(body.starts_with("Hello Ava,"));
        assert!(body.contains("the delivery location was closed"));
        assert!(body.contains("Consignee premises closed"));
        assert!(body.contains("Rotterdam"));
        assert!(body.contains("opening hours"));
    }

    #[tokio::test]
    async fn test_internal_alert_fires_without_email_config() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let notifier = Notifier::with_channels(vec![Arc::new(RecordingChannel {
            events: Arc::clone(&events),
        })]);
        let router = NotificationRouter::new(notifier, None, None, None, None);

        let entity = entity_with(&[("company", "Acme Robotics")]);
        let issue = Issue::new(
            IssueKind::DeliveryFailure,
            IssueSeverity::High,
            "Delivery could not be completed",
            Carrier::Unknown,
        );

        router
            .route(
                &issue,
                &entity,
                &board_with_coordinator(),
                "Rotterdam",
                "Consignee premises closed",
            )
            .await;

        // Email path disabled: exactly one internal alert, no errors.
        let recorded = events.lock().unwrap();
        assert_eq!(recorded.len(), 1);
        assert!(matches!(recorded[0], NotifyEvent::ShipmentAlert { .. }));
    }

    #[tokio::test]
    async fn test_customs_issue_sends_no_customer_email() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let notifier = Notifier::with_channels(vec![Arc::new(RecordingChannel {
            events: Arc::clone(&events),
        })]);
        let router = NotificationRouter::new(notifier, None, None, None, None);

        let entity = entity_with(&[("company", "Acme Robotics")]);

        router
            .route(
                &customs_issue(),
                &entity,
                &board_with_coordinator(),
                "Cologne, Germany",
                "Held by customs - import duties required",
            )
            .await;

        let recorded = events.lock().unwrap();
        assert_eq!(recorded.len(), 1);
        let NotifyEvent::ShipmentAlert { issue, .. } = &recorded[0] else {
            panic!("expected a ShipmentAlert");
        };
        assert_eq!(issue, "Held in customs");
    }
}
