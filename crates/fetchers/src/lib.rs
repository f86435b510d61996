//! Pluggable morning-briefing fetchers. Each source is independent and
//! fetched concurrently; a single source failing degrades that section of
//! the briefing rather than failing the whole thing ( Open
//! Question — resolved in favor of partial degrade, see DESIGN.md).

pub mod calendar;
pub mod finance;
pub mod weather;

pub use calendar::CalendarFetcher;
pub use finance::FinanceFetcher;
pub use weather::WeatherFetcher;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchStatus {
    Ok,
    Unavailable,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchResult {
    pub section: String,
    pub status: FetchStatus,
    pub data: Option<serde_json::Value>,
    pub detail: Option<String>,
}

#[async_trait]
pub trait BriefingFetcher: Send + Sync {
    fn section(&self) -> &'static str;
    async fn fetch(&self) -> anyhow::Result<serde_json::Value>;
}

/// Runs every fetcher independently and concurrently. A fetcher's error
/// becomes an `Unavailable` section in the result set rather than an
/// `Err` for the whole briefing.
pub async fn gather(fetchers: &[Arc<dyn BriefingFetcher>]) -> Vec<FetchResult> {
    let futures = fetchers.iter().map(|fetcher| async move {
        match fetcher.fetch().await {
            Ok(data) => FetchResult { section: fetcher.section().to_string(), status: FetchStatus::Ok, data: Some(data), detail: None },
            Err(err) => {
                tracing::warn!(section = fetcher.section(), error = %err, "briefing fetcher failed, degrading section");
                FetchResult { section: fetcher.section().to_string(), status: FetchStatus::Unavailable, data: None, detail: Some(err.to_string()) }
            }
        }
    });
    futures::future::join_all(futures).await
}

#[cfg(test)]
mod tests {
    use super::*;

    struct OkFetcher;
    #[async_trait]
    impl BriefingFetcher for OkFetcher {
        fn section(&self) -> &'static str {
            "ok_section"
        }
        async fn fetch(&self) -> anyhow::Result<serde_json::Value> {
            Ok(serde_json::json!({"value": 1}))
        }
    }

    struct FailingFetcher;
    #[async_trait]
    impl BriefingFetcher for FailingFetcher {
        fn section(&self) -> &'static str {
            "failing_section"
        }
        async fn fetch(&self) -> anyhow::Result<serde_json::Value> {
            anyhow::bail!("upstream unreachable")
        }
    }

    #[tokio::test]
    async fn one_failing_fetcher_does_not_affect_others() {
        let fetchers: Vec<Arc<dyn BriefingFetcher>> = vec![Arc::new(OkFetcher), Arc::new(FailingFetcher)];
        let results = gather(&fetchers).await;

        let ok = results.iter().find(|r| r.section == "ok_section").unwrap();
        let failing = results.iter().find(|r| r.section == "failing_section").unwrap();
        assert_eq!(ok.status, FetchStatus::Ok);
        assert_eq!(failing.status, FetchStatus::Unavailable);
        assert!(failing.detail.is_some());
    }
}
