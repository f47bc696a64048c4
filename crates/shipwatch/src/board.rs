//! GraphQL client for the project-tracking board.
//!
//! The core only needs two operations: fetch an item with its column
//! values, and write back a single column value (used to normalize a
//! tracking-URL into a bare tracking number).

use anyhow::{anyhow, Context, Result};
use regex::Regex;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::json;
use std::sync::LazyLock;
use tracing::debug;

use crate::models::TrackedEntity;

/// Board API endpoint.
const BOARD_API_URL: &str = "https://api.monday.com/v2";

/// Fetch an item with its column values.
const ITEM_QUERY: &str =
    "query ($ids: [ID!]) { items (ids: $ids) { id name column_values { id text } } }";

/// Write a single column value.
const CHANGE_COLUMN_MUTATION: &str = "mutation ($boardId: ID!, $itemId: ID!, $columnId: String!, $value: String!) { change_simple_column_value (board_id: $boardId, item_id: $itemId, column_id: $columnId, value: $value) { id } }";

/// GraphQL request body.
#[derive(Debug, Serialize)]
struct GraphQLRequest<V: Serialize> {
    query: &'static str,
    variables: V,
}

/// GraphQL response wrapper.
#[derive(Debug, Deserialize)]
struct GraphQLResponse<T> {
    data: Option<T>,
    errors: Option<Vec<GraphQLError>>,
}

/// GraphQL error.
#[derive(Debug, Deserialize)]
struct GraphQLError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct ItemsData {
    items: Vec<WireItem>,
}

#[derive(Debug, Deserialize)]
struct WireItem {
    id: String,
    name: String,
    #[serde(default)]
    column_values: Vec<WireColumnValue>,
}

#[derive(Debug, Deserialize)]
struct WireColumnValue {
    id: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChangeColumnData {
    #[allow(dead_code)]
    change_simple_column_value: Option<ChangedItem>,
}

#[derive(Debug, Deserialize)]
struct ChangedItem {
    #[allow(dead_code)]
    id: String,
}

/// Board GraphQL client.
#[derive(Debug, Clone)]
pub struct BoardClient {
    client: reqwest::Client,
    api_url: String,
}

impl BoardClient {
    /// Create a new board client with an API token.
    pub fn new(api_token: &str) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(api_token).context("Invalid board API token")?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            api_url: BOARD_API_URL.to_string(),
        })
    }

    /// Create a client with custom API URL (for testing).
    #[must_use]
    pub fn with_url(mut self, api_url: String) -> Self {
        self.api_url = api_url;
        self
    }

    /// Execute a GraphQL query/mutation.
    async fn execute<V: Serialize, R: DeserializeOwned>(
        &self,
        query: &'static str,
        variables: V,
    ) -> Result<R> {
        let request = GraphQLRequest { query, variables };

        let response = self
            .client
            .post(&self.api_url)
            .json(&request)
            .send()
            .await
            .context("Failed to send request to board API")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("Board API returned error status {status}: {body}"));
        }

        let gql_response: GraphQLResponse<R> = response
            .json()
            .await
            .context("Failed to parse board API response")?;

        if let Some(errors) = gql_response.errors {
            let messages: Vec<_> = errors.iter().map(|e| e.message.as_str()).collect();
            return Err(anyhow!("Board API errors: {}", messages.join("; ")));
        }

        gql_response
            .data
            .ok_or_else(|| anyhow!("Board API response missing data"))
    }

    /// Fetch an item with its column values. Returns `None` when the item
    /// does not exist.
    pub async fn fetch_item(&self, item_id: i64) -> Result<Option<TrackedEntity>> {
        let data: ItemsData = self
            .execute(ITEM_QUERY, json!({ "ids": [item_id.to_string()] }))
            .await?;

        let Some(item) = data.items.into_iter().next() else {
            return Ok(None);
        };

        let fields = item
            .column_values
            .into_iter()
            .filter_map(|cv| {
                let text = cv.text?;
                if text.trim().is_empty() {
                    None
                } else {
                    Some((cv.id, text))
                }
            })
            .collect();

        Ok(Some(TrackedEntity {
            id: item.id.parse().unwrap_or(item_id),
            name: item.name,
            fields,
        }))
    }

    /// Write a single column value (idempotent).
    pub async fn write_column(
        &self,
        board_id: i64,
        item_id: i64,
        column_id: &str,
        value: &str,
    ) -> Result<()> {
        let _: ChangeColumnData = self
            .execute(
                CHANGE_COLUMN_MUTATION,
                json!({
                    "boardId": board_id.to_string(),
                    "itemId": item_id.to_string(),
                    "columnId": column_id,
                    "value": value,
                }),
            )
            .await?;

        debug!(board_id, item_id, column_id, "Column value written");
        Ok(())
    }
}

// =============================================================================
// Tracking-token normalization
// =============================================================================

/// UPS tracking numbers: 1Z + 16 alphanumerics.
static UPS_TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"1Z[0-9A-Z]{16}").unwrap());

/// Tracking-number query parameters used by carrier tracking URLs.
static QUERY_PARAM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:tracknum|tracking[-_]?id|tracking[-_]?number|tracknumbers)=([A-Za-z0-9]+)")
        .unwrap()
});

/// Fallback: a long digit run (DHL 10, FedEx 12/15, postal 20+).
static DIGIT_RUN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d{10,22}\b").unwrap());

/// Extract a bare tracking number out of a tracking-URL string.
///
/// Returns `None` when the value is not a URL (already a bare token) or no
/// recognizable token can be found in it.
#[must_use]
pub fn extract_tracking_token(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if !trimmed.contains("http") && !trimmed.contains('/') {
        return None;
    }

    if let Some(m) = UPS_TOKEN_RE.find(trimmed) {
        return Some(m.as_str().to_string());
    }

    if let Some(caps) = QUERY_PARAM_RE.captures(trimmed) {
        return Some(caps[1].to_string());
    }

    DIGIT_RUN_RE
        .find(trimmed)
        .map(|m| m.as_str().to_string())
}
