//! Webhook-driven shipment-status monitor.
//!
//! This crate provides:
//! - Pattern-based classification of free-text carrier updates
//! - Optional model-assisted classification with deterministic fallback
//! - Temporal staleness detection (unchanged text, ambiguous statuses)
//! - Short-window alert deduplication
//! - Alert routing to a chat channel and, conditionally, customer email
//! - Board API client and webhook HTTP server

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)] // Many async API methods can fail

pub mod assist;
pub mod board;
pub mod classify;
pub mod config;
pub mod contacts;
pub mod dedup;
pub mod location;
pub mod models;
pub mod pipeline;
pub mod router;
pub mod server;
pub mod tracker;

pub use classify::classify;
pub use config::{BoardConfig, ColumnMap, Config};
pub use location::{resolve_location, UNKNOWN_LOCATION};
pub use models::{Carrier, Issue, IssueKind, IssueSeverity, TrackedEntity};
