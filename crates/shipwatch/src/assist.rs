//! Model-assisted classification with deterministic fallback.
//!
//! Sends the update text plus selected structured context to a
//! text-generation service and expects a fixed-shape JSON verdict. The
//! service's output is untrusted: any call failure, non-JSON reply or
//! schema mismatch falls back transparently to the rule cascade in
//! [`crate::classify`]. The fallback boundary is [`classify_update`] - an
//! explicit match on the assisted result, never an incidental catch-all.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::classify;
use crate::models::{Carrier, Issue, IssueKind, IssueSeverity};

/// Text-generation API endpoint.
const ASSIST_API_URL: &str = "https://api.anthropic.com/v1/messages";

/// API version header value.
const ASSIST_API_VERSION: &str = "2023-06-01";

/// Default model.
const DEFAULT_MODEL: &str = "claude-3-5-haiku-20241022";

/// Structured context sent alongside the update text.
#[derive(Debug, Clone, Default)]
pub struct AssistContext {
    /// Item display name
    pub item_name: String,
    /// Structured location column value, if any
    pub location: Option<String>,
    /// Promised delivery date, if any
    pub due_date: Option<String>,
}

/// Fixed-shape verdict expected from the service.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AssistVerdict {
    has_issue: bool,
    #[serde(default)]
    issue_type: Option<String>,
    #[serde(default)]
    severity: Option<String>,
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    location: Option<String>,
    #[serde(default)]
    is_resolved: bool,
    #[serde(default)]
    carrier: Option<String>,
    #[serde(default)]
    route: Option<String>,
}

#[derive(Debug, Serialize)]
struct AssistMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct AssistRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<AssistMessage>,
}

#[derive(Debug, Deserialize)]
struct AssistContent {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct AssistResponse {
    content: Vec<AssistContent>,
}

/// Client for the model-assisted classifier.
pub struct AssistClassifier {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
}

impl AssistClassifier {
    /// Create a classifier with explicit credentials.
    #[must_use]
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: ASSIST_API_URL.to_string(),
            api_key,
            model,
        }
    }

    /// Create from environment variables.
    ///
    /// Returns `None` when `ASSIST_API_KEY` is absent - the assisted path
    /// is optional and the rule cascade stands alone.
    #[must_use]
    pub fn from_env() -> Option<Self> {
        let api_key = std::env::var("ASSIST_API_KEY").ok().filter(|s| !s.is_empty())?;
        let model = std::env::var("ASSIST_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        Some(Self::new(api_key, model))
    }

    /// Override the API URL (for testing against a mock server).
    #[must_use]
    pub fn with_api_url(mut self, api_url: String) -> Self {
        self.api_url = api_url;
        self
    }

    /// Call the text-generation service with a raw prompt.
    async fn generate(&self, prompt: String) -> Result<String> {
        let request = AssistRequest {
            model: self.model.clone(),
            max_tokens: 512,
            messages: vec![AssistMessage {
                role: "user",
                content: prompt,
            }],
        };

        let response = self
            .client
            .post(&self.api_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ASSIST_API_VERSION)
            .json(&request)
            .send()
            .await
            .context("Failed to reach assist service")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("Assist service returned {status}: {body}"));
        }

        let parsed: AssistResponse = response
            .json()
            .await
            .context("Failed to parse assist service envelope")?;

        parsed
            .content
            .first()
            .map(|c| c.text.clone())
            .ok_or_else(|| anyhow!("Assist service returned empty content"))
    }

    /// Classify an update text with model assistance.
    ///
    /// Returns the issue plus the location string the model extracted, if
    /// any. Errors on any malformed reply so the caller can fall back.
    pub async fn classify(
        &self,
        update_text: &str,
        carrier_hint: Option<Carrier>,
        context: &AssistContext,
    ) -> Result<(Issue, Option<String>)> {
        let prompt = build_prompt(update_text, context);
        let reply = self.generate(prompt).await?;
        let verdict: AssistVerdict = serde_json::from_str(strip_code_fences(&reply))
            .context("Assist reply is not valid verdict JSON")?;
        let fallback_carrier =
            carrier_hint.unwrap_or_else(|| Carrier::detect(update_text));
        verdict_to_issue(&verdict, fallback_carrier)
            .map(|issue| (issue, verdict.location.clone()))
    }
}

/// Build the classification prompt.
fn build_prompt(update_text: &str, context: &AssistContext) -> String {
    let mut prompt = String::from(
        "You classify carrier tracking updates for a shipment monitor. \
         Reply with a single JSON object and nothing else, with keys: \
         hasIssue (bool), issueType (one of held-in-customs, \
         delivery-failure, final-mile-issue, hub-delay, transit-delay, \
         damage-or-loss, eu-customs-complexity, stuck-in-transit, none), \
         severity (high|medium|low), reason (string), location (string or \
         null), isResolved (bool), carrier (UPS|DHL|FedEx|unknown), route \
         (string or null).\n\n",
    );
    prompt.push_str(&format!("Shipment: {}\n", context.item_name));
    if let Some(location) = &context.location {
        prompt.push_str(&format!("Last known location: {location}\n"));
    }
    if let Some(due) = &context.due_date {
        prompt.push_str(&format!("Promised delivery date: {due}\n"));
    }
    prompt.push_str(&format!("Carrier update: {update_text}\n"));
    prompt
}

/// Strip markdown code fences the model may wrap around the JSON.
fn strip_code_fences(reply: &str) -> &str {
    let trimmed = reply.trim();
    let trimmed = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    trimmed.strip_suffix("```").unwrap_or(trimmed).trim()
}

/// Convert a verdict to an [`Issue`], erroring on schema mismatches.
fn verdict_to_issue(verdict: &AssistVerdict, fallback_carrier: Carrier) -> Result<Issue> {
    let carrier = verdict
        .carrier
        .as_deref()
        .map_or(fallback_carrier, Carrier::from_label);

    if verdict.is_resolved || !verdict.has_issue {
        return Ok(Issue::none(carrier));
    }

    let label = verdict
        .issue_type
        .as_deref()
        .ok_or_else(|| anyhow!("Verdict has hasIssue=true but no issueType"))?;
    let kind = IssueKind::from_label(label)
        .ok_or_else(|| anyhow!("Unknown issueType in verdict: {label}"))?;
    if kind == IssueKind::None {
        return Ok(Issue::none(carrier));
    }

    let severity = verdict
        .severity
        .as_deref()
        .and_then(IssueSeverity::from_label)
        .ok_or_else(|| anyhow!("Verdict is missing a usable severity"))?;

    let reason = verdict
        .reason
        .clone()
        .filter(|r| !r.trim().is_empty())
        .unwrap_or_else(|| "Flagged by assisted classifier".to_string());

    let mut issue = Issue::new(kind, severity, reason, carrier);
    issue.route = verdict.route.clone();
    issue.location = verdict.location.clone();
    Ok(issue)
}

/// Classify an update, preferring the assisted path when configured.
///
/// This is the strategy seam: the assisted classifier is tried first and
/// *any* error - transport, credentials, malformed reply, schema mismatch -
/// selects the deterministic rule cascade instead. The alerting pipeline
/// never fails here.
pub async fn classify_update(
    assist: Option<&AssistClassifier>,
    update_text: &str,
    carrier_hint: Option<Carrier>,
    context: &AssistContext,
) -> (Issue, Option<String>) {
    if let Some(assist) = assist {
        match assist.classify(update_text, carrier_hint, context).await {
            Ok((issue, location)) => {
                debug!(kind = issue.kind.as_str(), "Assisted classification");
                return (issue, location);
            }
            Err(e) => {
                warn!(error = %e, "Assisted classification failed, using rule cascade");
            }
        }
    }

    (classify::classify(update_text, carrier_hint), None)
}
