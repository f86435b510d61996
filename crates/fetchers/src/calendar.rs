use async_trait::async_trait;

use crate::BriefingFetcher;

/// Pulls today's events from a calendar provider's REST API. The base URL
/// and token are both configurable so the provider can be swapped without
/// touching this fetcher's logic; the token falls back to an env var when
/// not set explicitly.
pub struct CalendarFetcher {
    pub base_url: String,
    pub token: Option<String>,
    client: reqwest::Client,
}

impl CalendarFetcher {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Self {
        Self { base_url: base_url.into(), token, client: reqwest::Client::builder().timeout(std::time::Duration::from_secs(10)).build().unwrap_or_default() }
    }

    fn resolved_token(&self) -> Option<String> {
        self.token.clone().filter(|t| !t.trim().is_empty()).or_else(|| std::env::var("MILTON_CALENDAR_TOKEN").ok().filter(|t| !t.trim().is_empty()))
    }
}

#[async_trait]
impl BriefingFetcher for CalendarFetcher {
    fn section(&self) -> &'static str {
        "calendar"
    }

    async fn fetch(&self) -> anyhow::Result<serde_json::Value> {
        let token = self.resolved_token().ok_or_else(|| anyhow::anyhow!("no calendar token configured"))?;

        let response = self
            .client
            .get(format!("{}/events/today", self.base_url.trim_end_matches('/')))
            .bearer_auth(token)
            .send()
            .await?
            .error_for_status()?;

        Ok(response.json::<serde_json::Value>().await?)
    }
}
