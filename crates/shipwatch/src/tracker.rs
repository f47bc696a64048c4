//! Temporal staleness detection for tracked shipments.
//!
//! Two independent sub-trackers share one store object:
//!
//! - **Same-text staleness**: the identical update text persisting past a
//!   flat threshold (default 36h) means the tracking feed has gone silent.
//! - **Ambiguous-status timeout**: known ambiguous phrases ("on hold",
//!   "clearance event", ...) are normal in small doses but indicate a real
//!   problem when they persist past a phrase-specific window.
//!
//! The store is constructed once at startup and shared through `AppState`;
//! a periodic [`StalenessTracker::sweep`] evicts entities that stopped
//! reporting entirely.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::models::{Carrier, Issue, IssueKind, IssueSeverity};

/// Known ambiguous phrases and their allowed persistence in hours.
///
/// Ordered by ascending timeout: when a text matches several phrases the
/// most-blocking one (shortest window) is tracked.
pub const AMBIGUOUS_TIMEOUTS: &[(&str, i64)] = &[
    ("on hold", 6),
    ("awaiting release", 12),
    ("clearance event", 18),
    ("customs clearance", 18),
    ("processing", 24),
    ("shipment information received", 48),
    ("label created", 48),
    ("in transit", 72),
];

/// Tracker configuration.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Hours after which an unchanged update text is considered stale.
    pub stale_threshold_hours: i64,
    /// When `true`, re-emit the staleness issue on every observation past
    /// the threshold and rely on the duplicate suppressor for rate
    /// limiting. When `false` (default), fire once per continuous run.
    pub stale_realert: bool,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            stale_threshold_hours: 36,
            stale_realert: false,
        }
    }
}

/// Per-entity record of the last seen update text.
#[derive(Debug, Clone)]
pub struct UpdateHistoryRecord {
    /// Last seen update text
    pub text: String,
    /// When this exact text was first seen (resets on text change)
    pub first_seen: DateTime<Utc>,
    /// When any update was last received
    pub last_seen: DateTime<Utc>,
    /// Times this text has repeated
    pub repeats: u32,
    /// Whether the staleness alert already fired for this run
    pub alerted: bool,
}

/// Per-entity record of a matched ambiguous status.
#[derive(Debug, Clone)]
pub struct AmbiguousRecord {
    /// The matched phrase from [`AMBIGUOUS_TIMEOUTS`]
    pub phrase: &'static str,
    /// Update text at match time
    pub text: String,
    /// When the phrase was first observed
    pub first_seen: DateTime<Utc>,
    /// When any update was last received
    pub last_seen: DateTime<Utc>,
    /// Allowed persistence for this phrase
    pub timeout_hours: i64,
}

/// State store for both staleness sub-trackers.
pub struct StalenessTracker {
    config: TrackerConfig,
    history: RwLock<HashMap<i64, UpdateHistoryRecord>>,
    ambiguous: RwLock<HashMap<i64, AmbiguousRecord>>,
}

impl StalenessTracker {
    /// Create a tracker with the given configuration.
    #[must_use]
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            config,
            history: RwLock::new(HashMap::new()),
            ambiguous: RwLock::new(HashMap::new()),
        }
    }

    /// Observe one update event for an entity.
    ///
    /// Returns zero, one or two issues: a same-text staleness issue and/or
    /// an ambiguous-timeout issue. First observations never alert.
    pub async fn observe(&self, entity_id: i64, text: &str, now: DateTime<Utc>) -> Vec<Issue> {
        let mut issues = Vec::new();
        if let Some(issue) = self.observe_same_text(entity_id, text, now).await {
            issues.push(issue);
        }
        if let Some(issue) = self.observe_ambiguous(entity_id, text, now).await {
            issues.push(issue);
        }
        issues
    }

    /// Same-text staleness: unchanged text past the threshold.
    async fn observe_same_text(
        &self,
        entity_id: i64,
        text: &str,
        now: DateTime<Utc>,
    ) -> Option<Issue> {
        let mut history = self.history.write().await;

        let record = match history.entry(entity_id) {
            std::collections::hash_map::Entry::Vacant(slot) => {
                slot.insert(UpdateHistoryRecord {
                    text: text.to_string(),
                    first_seen: now,
                    last_seen: now,
                    repeats: 1,
                    alerted: false,
                });
                return None;
            }
            std::collections::hash_map::Entry::Occupied(slot) => slot.into_mut(),
        };

        if record.text != text {
            // Text changed: restart tracking from this observation.
            record.text = text.to_string();
            record.first_seen = now;
            record.last_seen = now;
            record.repeats = 1;
            record.alerted = false;
            return None;
        }

        record.repeats += 1;
        record.last_seen = now;

        let elapsed_hours = (now - record.first_seen).num_hours();
        if elapsed_hours <= self.config.stale_threshold_hours {
            return None;
        }

        if record.alerted && !self.config.stale_realert {
            debug!(entity_id, "Stale-tracking alert already fired for this run");
            return None;
        }
        record.alerted = true;

        Some(Issue::new(
            IssueKind::StaleTracking,
            IssueSeverity::Medium,
            format!(
                "Tracking text unchanged for {elapsed_hours}h (threshold {}h)",
                self.config.stale_threshold_hours
            ),
            Carrier::detect(text),
        ))
    }

    /// Ambiguous-status timeout: a known phrase persisting past its window.
    async fn observe_ambiguous(
        &self,
        entity_id: i64,
        text: &str,
        now: DateTime<Utc>,
    ) -> Option<Issue> {
        let lower = text.to_lowercase();
        let matched = AMBIGUOUS_TIMEOUTS
            .iter()
            .find(|(phrase, _)| lower.contains(phrase));

        let mut ambiguous = self.ambiguous.write().await;

        let Some(&(phrase, timeout_hours)) = matched else {
            // No known phrase: any existing record is implicitly resolved.
            if ambiguous.remove(&entity_id).is_some() {
                debug!(entity_id, "Ambiguous status resolved");
            }
            return None;
        };

        enum Step {
            /// Timeout exceeded: fire and clear (one-shot per window)
            Fire(&'static str, i64, i64),
            /// Still inside the window
            Keep,
            /// Original phrase gone: resolved, track the new phrase
            Restart,
            /// No record yet
            Start,
        }

        let step = match ambiguous.get_mut(&entity_id) {
            Some(record) if lower.contains(record.phrase) => {
                record.last_seen = now;
                let elapsed_hours = (now - record.first_seen).num_hours();
                if elapsed_hours >= record.timeout_hours {
                    Step::Fire(record.phrase, elapsed_hours, record.timeout_hours)
                } else {
                    Step::Keep
                }
            }
            Some(_) => Step::Restart,
            None => Step::Start,
        };

        match step {
            Step::Fire(fired_phrase, elapsed_hours, allowed_hours) => {
                // Clear so a renewed occurrence restarts tracking.
                ambiguous.remove(&entity_id);
                return Some(Issue::new(
                    IssueKind::AmbiguousTimeout,
                    IssueSeverity::High,
                    format!(
                        "Status \"{fired_phrase}\" persisted for {elapsed_hours}h (allowed {allowed_hours}h)"
                    ),
                    Carrier::detect(text),
                ));
            }
            Step::Keep => return None,
            Step::Restart => {
                // Originally matched phrase is gone: resolved. The
                // currently matched phrase starts a fresh record.
                ambiguous.remove(&entity_id);
                debug!(entity_id, "Ambiguous status resolved, new phrase observed");
            }
            Step::Start => {}
        }

        ambiguous.insert(
            entity_id,
            AmbiguousRecord {
                phrase,
                text: text.to_string(),
                first_seen: now,
                last_seen: now,
                timeout_hours,
            },
        );
        None
    }

    /// Evict records for entities that stopped reporting updates.
    ///
    /// Returns the number of evicted records across both tables.
    pub async fn sweep(&self, now: DateTime<Utc>, max_idle: Duration) -> usize {
        let cutoff = now - max_idle;

        let mut removed = 0;
        {
            let mut history = self.history.write().await;
            let before = history.len();
            history.retain(|_, r| r.last_seen >= cutoff);
            removed += before - history.len();
        }
        {
            let mut ambiguous = self.ambiguous.write().await;
            let before = ambiguous.len();
            ambiguous.retain(|_, r| r.last_seen >= cutoff);
            removed += before - ambiguous.len();
        }

        if removed > 0 {
            info!(removed, "Swept silent entities from staleness tracker");
        }
        removed
    }

    /// Number of entities currently tracked (for readiness/debug output).
    pub async fn tracked_entities(&self) -> usize {
        self.history.read().await.len()
    }
}
