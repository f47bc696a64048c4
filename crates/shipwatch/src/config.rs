//! Configuration for the shipment monitor.
//!
//! Mandatory settings (board API token, Slack credentials) fail startup
//! before any event is accepted; optional features (assisted
//! classification, customer email, contact lookup) disable themselves
//! when unconfigured.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::env;

/// Column-id mapping for one board.
///
/// Boards name their columns freely; this record pins which column holds
/// which shipment attribute.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ColumnMap {
    /// Latest carrier status text
    pub status: String,
    /// Latest/current location
    pub location: String,
    /// Promised delivery date
    pub due_date: String,
    /// Customer contact name
    pub customer: String,
    /// Customer company name
    pub company: String,
    /// Part number
    pub part_number: String,
    /// Carrier tracking token (number or URL)
    pub tracking: String,
}

impl Default for ColumnMap {
    fn default() -> Self {
        Self {
            status: "status".to_string(),
            location: "location".to_string(),
            due_date: "due_date".to_string(),
            customer: "customer".to_string(),
            company: "company".to_string(),
            part_number: "part_number".to_string(),
            tracking: "tracking".to_string(),
        }
    }
}

/// Per-board configuration record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardConfig {
    /// Board id as delivered in webhook events
    pub board_id: i64,
    /// Display label used as the alert origin
    pub label: String,
    /// Region the board covers (e.g. "EU", "US")
    #[serde(default)]
    pub region: Option<String>,
    /// Coordinator chat mention for this region (e.g. "<@U042>")
    #[serde(default)]
    pub coordinator: Option<String>,
    /// Column-id mapping
    #[serde(default)]
    pub columns: ColumnMap,
}

impl BoardConfig {
    /// Fallback configuration for boards without an explicit record.
    ///
    /// Uses default column ids and no coordinator: alerts still fire but
    /// carry no mention, only the origin label.
    #[must_use]
    pub fn fallback(board_id: i64) -> Self {
        Self {
            board_id,
            label: format!("board {board_id}"),
            region: None,
            coordinator: None,
            columns: ColumnMap::default(),
        }
    }

    /// Origin label for alert messages ("EU board" style when a region is
    /// configured).
    #[must_use]
    pub fn origin(&self) -> String {
        match &self.region {
            Some(region) => format!("{} ({region})", self.label),
            None => self.label.clone(),
        }
    }
}

/// Service configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server port
    pub port: u16,
    /// Board API token (mandatory)
    pub board_api_token: String,
    /// Per-board configuration records
    pub boards: Vec<BoardConfig>,
    /// Hours after which an unchanged update text is stale
    pub stale_threshold_hours: i64,
    /// Re-emit staleness alerts on every observation past the threshold
    pub stale_realert: bool,
    /// Duplicate-suppression window in minutes
    pub dedup_window_mins: i64,
    /// Minutes between tracker sweeps
    pub sweep_interval_mins: u64,
    /// Days of silence before a tracked entity is evicted
    pub sweep_max_idle_days: i64,
    /// Reply-to for customer emails
    pub email_reply_to: Option<String>,
    /// Bcc for customer emails (internal archive)
    pub email_bcc: Option<String>,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Fails when mandatory settings are missing: the board API token and
    /// the Slack chat credentials. This is the only hard failure mode and
    /// happens at startup, before any webhook is accepted.
    pub fn from_env() -> Result<Self> {
        let board_api_token = env::var("BOARD_API_TOKEN")
            .ok()
            .filter(|s| !s.is_empty())
            .context("BOARD_API_TOKEN is required")?;

        // The internal alert channel is mandatory; verify the notify crate
        // will find its credentials before accepting any event.
        if env::var("SLACK_BOT_TOKEN").ok().filter(|s| !s.is_empty()).is_none() {
            bail!("SLACK_BOT_TOKEN is required");
        }
        if env::var("SLACK_CHANNEL_ID").ok().filter(|s| !s.is_empty()).is_none() {
            bail!("SLACK_CHANNEL_ID is required");
        }

        let boards = match env::var("SHIPWATCH_BOARDS") {
            Ok(raw) if !raw.trim().is_empty() => serde_json::from_str(&raw)
                .context("SHIPWATCH_BOARDS is not a valid board-config JSON array")?,
            _ => Vec::new(),
        };

        Ok(Self {
            port: env::var("SHIPWATCH_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(8080),
            board_api_token,
            boards,
            stale_threshold_hours: env::var("STALE_THRESHOLD_HOURS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(36),
            stale_realert: env::var("STALE_REALERT")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),
            dedup_window_mins: env::var("DEDUP_WINDOW_MINS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(crate::dedup::DEFAULT_WINDOW_MINS),
            sweep_interval_mins: env::var("SWEEP_INTERVAL_MINS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(60),
            sweep_max_idle_days: env::var("SWEEP_MAX_IDLE_DAYS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(14),
            email_reply_to: env::var("EMAIL_REPLY_TO").ok().filter(|s| !s.is_empty()),
            email_bcc: env::var("EMAIL_BCC").ok().filter(|s| !s.is_empty()),
        })
    }

    /// Look up the configuration for a board id.
    #[must_use]
    pub fn board(&self, board_id: i64) -> Option<&BoardConfig> {
        self.boards.iter().find(|b| b.board_id == board_id)
    }

    /// Board configuration or the fallback record for unknown boards.
    #[must_use]
    pub fn board_or_fallback(&self, board_id: i64) -> BoardConfig {
        self.board(board_id)
            .cloned()
            .unwrap_or_else(|| BoardConfig::fallback(board_id))
    }
}
