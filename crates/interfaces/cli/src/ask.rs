//! Thin HTTP client for `milton ask`, talking to a `milton serve` instance.

use anyhow::{Context, Result};
use serde_json::json;

pub async fn run(base_url: &str, query: String) -> Result<()> {
    let client = reqwest::Client::new();
    let submit: serde_json::Value = client
        .post(format!("{base_url}/api/ask"))
        .json(&json!({ "query": query }))
        .send()
        .await
        .context("submitting query to gateway")?
        .error_for_status()
        .context("gateway rejected the request")?
        .json()
        .await
        .context("parsing gateway response")?;

    let request_id = submit["request_id"].as_str().unwrap_or_default().to_string();
    if request_id.is_empty() {
        println!("{submit}");
        return Ok(());
    }

    let ws_url = format!("{}/ws/request/{request_id}", base_url.replacen("http", "ws", 1));
    println!("watching {ws_url}");

    // Poll recent-requests rather than opening a websocket, since that
    // requires no extra dependency beyond the plain HTTP client already
    // pulled in for `submit`.
    for _ in 0..600 {
        tokio::time::sleep(std::time::Duration::from_millis(500)).await;
        let recent: Vec<serde_json::Value> = client
            .get(format!("{base_url}/api/recent-requests"))
            .send()
            .await?
            .json()
            .await
            .unwrap_or_default();
        if let Some(found) = recent.iter().find(|r| r["id"] == request_id) {
            let status = found["status"].as_str().unwrap_or_default();
            if status == "COMPLETE" || status == "FAILED" {
                println!("{}", serde_json::to_string_pretty(found)?);
                return Ok(());
            }
        }
    }
    anyhow::bail!("request {request_id} did not complete within the poll window")
}
