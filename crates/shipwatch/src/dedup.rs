//! Short-window alert deduplication.
//!
//! Prevents the same (entity, update text, issue kind) alert from being
//! dispatched more than once within the suppression window. The table is
//! swept lazily on each lookup; its size is bounded by active alert
//! traffic.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

use crate::models::IssueKind;

/// Default suppression window in minutes.
pub const DEFAULT_WINDOW_MINS: i64 = 5;

type AlertKey = (i64, String, IssueKind);

/// Recent-alert table with a fixed suppression window.
pub struct DedupSuppressor {
    window: Duration,
    recent: RwLock<HashMap<AlertKey, DateTime<Utc>>>,
}

impl DedupSuppressor {
    /// Create a suppressor with the given window in minutes.
    #[must_use]
    pub fn new(window_mins: i64) -> Self {
        Self {
            window: Duration::minutes(window_mins),
            recent: RwLock::new(HashMap::new()),
        }
    }

    /// Check whether an alert should be suppressed.
    ///
    /// Evicts expired entries first, then records the attempt when it is
    /// not suppressed. Returns `true` when a matching alert already fired
    /// within the window.
    pub async fn should_suppress(
        &self,
        entity_id: i64,
        update_text: &str,
        kind: IssueKind,
        now: DateTime<Utc>,
    ) -> bool {
        let mut recent = self.recent.write().await;

        // Lazy sweep of expired entries.
        let cutoff = now - self.window;
        recent.retain(|_, fired_at| *fired_at >= cutoff);

        let key = (entity_id, update_text.to_string(), kind);
        if recent.contains_key(&key) {
            debug!(
                entity_id,
                kind = kind.as_str(),
                "Suppressing duplicate alert inside window"
            );
            return true;
        }

        recent.insert(key, now);
        false
    }

    /// Number of live entries (for debug output).
    pub async fn live_entries(&self) -> usize {
        self.recent.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_duplicate_inside_window_is_suppressed() {
        let d = DedupSuppressor::new(DEFAULT_WINDOW_MINS);
        let now = Utc::now();

        assert!(
            !d.should_suppress(1, "Held by customs", IssueKind::HeldInCustoms, now)
                .await
        );
        assert!(
            d.should_suppress(
                1,
                "Held by customs",
                IssueKind::HeldInCustoms,
                now + Duration::minutes(2)
            )
            .await
        );
    }

    #[tokio::test]
    async fn test_expired_entry_allows_realert() {
        let d = DedupSuppressor::new(DEFAULT_WINDOW_MINS);
        let now = Utc::now();

        assert!(
            !d.should_suppress(1, "Held by customs", IssueKind::HeldInCustoms, now)
                .await
        );
        // 6 minutes apart: outside the 5-minute window.
        assert!(
            !d.should_suppress(
                1,
                "Held by customs",
                IssueKind::HeldInCustoms,
                now + Duration::minutes(6)
            )
            .await
        );
    }

    #[tokio::test]
    async fn test_key_includes_text_and_kind() {
        let d = DedupSuppressor::new(DEFAULT_WINDOW_MINS);
        let now = Utc::now();

        assert!(
            !d.should_suppress(1, "Held by customs", IssueKind::HeldInCustoms, now)
                .await
        );
        // Different text: separate key.
        assert!(
            !d.should_suppress(1, "Clearance delay", IssueKind::HeldInCustoms, now)
                .await
        );
        // Different kind: separate key.
        assert!(
            !d.should_suppress(1, "Held by customs", IssueKind::StaleTracking, now)
                .await
        );
        // Different entity: separate key.
        assert!(
            !d.should_suppress(2, "Held by customs", IssueKind::HeldInCustoms, now)
                .await
        );
    }

    #[tokio::test]
    async fn test_lazy_sweep_drops_expired_entries() {
        let d = DedupSuppressor::new(DEFAULT_WINDOW_MINS);
        let now = Utc::now();

        d.should_suppress(1, "a", IssueKind::HeldInCustoms, now).await;
        d.should_suppress(2, "b", IssueKind::TransitDelay, now).await;
        assert_eq!(d.live_entries().await, 2);

        d.should_suppress(3, "c", IssueKind::HubDelay, now + Duration::minutes(10))
            .await;
        // The two old entries were evicted during the lookup.
        assert_eq!(d.live_entries().await, 1);
    }
}
