//! Subcommand handlers.

use abyss_core::{
    roadmap_feed, ApiClient, Freshness, HttpMethod, LocalStore, Payload, RequestBody,
    RequestOptions, TrackedRepo,
};
use anyhow::{Context, Result};
use chrono::{Local, TimeZone};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

pub async fn get(
    client: &ApiClient,
    endpoint: &str,
    retry: u32,
    retry_delay_ms: Option<u64>,
    timeout_ms: Option<u64>,
) -> Result<()> {
    let mut options = RequestOptions::new().with_retry(retry);
    if let Some(ms) = retry_delay_ms {
        options = options.with_retry_delay(Duration::from_millis(ms));
    }
    if let Some(ms) = timeout_ms {
        options = options.with_timeout(Duration::from_millis(ms));
    }

    let payload = client
        .request_payload(HttpMethod::Get, endpoint, RequestBody::Empty, options)
        .await
        .with_context(|| format!("GET {}", client.resolve_url(endpoint)))?;

    match payload {
        Payload::Json(value) => println!("{}", serde_json::to_string_pretty(&value)?),
        Payload::Text(text) => println!("{}", text),
    }
    Ok(())
}

pub async fn roadmap(client: Arc<ApiClient>, store: Arc<dyn LocalStore>, force: bool) -> Result<()> {
    let feed = roadmap_feed(client, store, TrackedRepo::defaults());
    let items = feed.refresh(force).await?;

    for item in &items {
        let marker = match item.freshness {
            Freshness::Fresh => "fresh",
            Freshness::Stale => "stale",
            Freshness::Unavailable => "unavailable",
        };
        println!(
            "[{:<11}] {} ({}): {} milestones, {} issues, updated {}",
            marker,
            item.data.display_name,
            item.data.repo,
            item.data.milestones.len(),
            item.data.issues.len(),
            format_timestamp(item.fetched_at_epoch_ms)
        );
        for milestone in &item.data.milestones {
            println!(
                "    {} {} ({}%)",
                if milestone.is_closed() { "✓" } else { "◎" },
                milestone.title,
                milestone.progress_percent()
            );
        }
    }

    let status = feed.status();
    info!(
        "Roadmap cache: valid={}, age={}s, degraded={}",
        status.is_valid,
        status.age_seconds.unwrap_or_default(),
        status.degraded_count.unwrap_or_default()
    );
    Ok(())
}

fn format_timestamp(epoch_ms: i64) -> String {
    if epoch_ms <= 0 {
        return "never".to_string();
    }
    match Local.timestamp_millis_opt(epoch_ms).single() {
        Some(time) => time.format("%Y-%m-%d %H:%M").to_string(),
        None => "unknown".to_string(),
    }
}
