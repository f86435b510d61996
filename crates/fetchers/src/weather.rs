use async_trait::async_trait;

use crate::BriefingFetcher;

/// Fetches current conditions from the free Open-Meteo API (no key
/// required), so the weather section works out of the box without
/// provisioning a secret.
pub struct WeatherFetcher {
    pub latitude: f64,
    pub longitude: f64,
    client: reqwest::Client,
}

impl WeatherFetcher {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude, client: reqwest::Client::builder().timeout(std::time::Duration::from_secs(10)).build().unwrap_or_default() }
    }
}

#[async_trait]
impl BriefingFetcher for WeatherFetcher {
    fn section(&self) -> &'static str {
        "weather"
    }

    async fn fetch(&self) -> anyhow::Result<serde_json::Value> {
        let response = self
            .client
            .get("https://api.open-meteo.com/v1/forecast")
            .query(&[
                ("latitude", self.latitude.to_string()),
                ("longitude", self.longitude.to_string()),
                ("current_weather", "true".to_string()),
            ])
            .send()
            .await?
            .error_for_status()?;

        Ok(response.json::<serde_json::Value>().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn section_name_is_weather() {
        let fetcher = WeatherFetcher::new(37.7749, -122.4194);
        assert_eq!(fetcher.section(), "weather");
    }
}
