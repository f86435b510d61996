use async_trait::async_trait;

use crate::BriefingFetcher;

/// Pulls account balances and recent transactions from a linked finance
/// provider's REST API.
pub struct FinanceFetcher {
    pub base_url: String,
    pub api_key: Option<String>,
    client: reqwest::Client,
}

impl FinanceFetcher {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self { base_url: base_url.into(), api_key, client: reqwest::Client::builder().timeout(std::time::Duration::from_secs(10)).build().unwrap_or_default() }
    }

    fn resolved_key(&self) -> Option<String> {
        self.api_key.clone().filter(|k| !k.trim().is_empty()).or_else(|| std::env::var("MILTON_FINANCE_API_KEY").ok().filter(|k| !k.trim().is_empty()))
    }
}

#[async_trait]
impl BriefingFetcher for FinanceFetcher {
    fn section(&self) -> &'static str {
        "finance"
    }

    async fn fetch(&self) -> anyhow::Result<serde_json::Value> {
        let key = self.resolved_key().ok_or_else(|| anyhow::anyhow!("no finance api key configured"))?;

        let response = self
            .client
            .get(format!("{}/accounts/summary", self.base_url.trim_end_matches('/')))
            .header("X-Api-Key", key)
            .send()
            .await?
            .error_for_status()?;

        Ok(response.json::<serde_json::Value>().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fetch_without_an_api_key_fails_fast_without_a_network_call() {
        let fetcher = FinanceFetcher::new("https://finance.example.invalid", None);
        unsafe {
            std::env::remove_var("MILTON_FINANCE_API_KEY");
        }
        let result = fetcher.fetch().await;
        assert!(result.is_err());
    }
}
