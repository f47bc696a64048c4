//! Contact directory lookup client.
//!
//! Resolves a customer/company name to an email contact by trying several
//! search strategies in sequence and taking the first non-empty result
//! set's first record.

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use tracing::{debug, info};

/// A directory contact.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    pub email: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub company: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<Contact>,
}

/// Contact lookup client.
#[derive(Debug, Clone)]
pub struct ContactsClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl ContactsClient {
    /// Create a client with explicit credentials.
    #[must_use]
    pub fn new(base_url: String, api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }

    /// Create from environment variables.
    ///
    /// Returns `None` (logged once) when the directory is not configured,
    /// disabling the customer email path's lookups.
    #[must_use]
    pub fn from_env() -> Option<Self> {
        let base_url = std::env::var("CONTACTS_API_URL").ok().filter(|s| !s.is_empty());
        let api_key = std::env::var("CONTACTS_API_KEY").ok().filter(|s| !s.is_empty());
        match (base_url, api_key) {
            (Some(base_url), Some(api_key)) => Some(Self::new(base_url, api_key)),
            _ => {
                info!("Contact lookup disabled (CONTACTS_API_URL/CONTACTS_API_KEY not set)");
                None
            }
        }
    }

    /// Find a contact for a customer/company name.
    ///
    /// Strategies, in sequence: the full name, its first token, its last
    /// token, and the local part of any embedded email address. The first
    /// strategy returning results wins.
    pub async fn find_contact(&self, name: &str) -> Result<Option<Contact>> {
        for query in search_queries(name) {
            let results = self.search(&query).await?;
            if let Some(contact) = results.into_iter().next() {
                debug!(query = %query, email = %contact.email, "Contact resolved");
                return Ok(Some(contact));
            }
        }
        Ok(None)
    }

    /// Run one search query against the directory.
    async fn search(&self, query: &str) -> Result<Vec<Contact>> {
        let url = format!("{}/contacts/search", self.base_url);
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.api_key)
            .query(&[("q", query)])
            .send()
            .await
            .context("Failed to reach contact directory")?;

        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!("Contact directory returned {status}"));
        }

        let parsed: SearchResponse = response
            .json()
            .await
            .context("Failed to parse contact search response")?;
        Ok(parsed.results)
    }
}

/// Build the ordered list of search queries for a name.
fn search_queries(name: &str) -> Vec<String> {
    let trimmed = name.trim();
    let mut queries = Vec::new();
    if trimmed.is_empty() {
        return queries;
    }

    queries.push(trimmed.to_string());

    let tokens: Vec<&str> = trimmed.split_whitespace().collect();
    if let Some(first) = tokens.first() {
        if tokens.len() > 1 {
            queries.push((*first).to_string());
        }
    }
    if let Some(last) = tokens.last() {
        if tokens.len() > 1 {
            queries.push((*last).to_string());
        }
    }

    // Email-local-part strategy when the "name" field holds an address.
    if let Some(local) = tokens
        .iter()
        .find(|t| t.contains('@'))
        .and_then(|t| t.split('@').next())
    {
        queries.push(local.to_string());
    }

    queries.dedup();
    queries
}
