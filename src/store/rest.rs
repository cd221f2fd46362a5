//! HTTP client for a PostgREST-style observation table (e.g. Supabase).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_RANGE;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{ChangeEvent, ChangeFeed, ChangeKind, ObservationStore};
use crate::config::StoreConfig;
use crate::error::{FetchError, SubscriptionError};
use crate::record::ObservationRecord;

/// Remote store client.
///
/// `fetch_all` pulls every row ordered by `observed_at`, so first-seen
/// bucket order downstream is chronological. The change feed is synthesized
/// by polling a cheap probe (exact row count plus newest timestamp) and
/// emitting an event whenever the probe moves; consumers still see a
/// push-style [`ChangeFeed`] and never touch the probe.
pub struct RestStore {
    client: reqwest::Client,
    config: StoreConfig,
}

impl RestStore {
    pub fn new(config: StoreConfig) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self { client, config })
    }
}

#[async_trait]
impl ObservationStore for RestStore {
    async fn fetch_all(&self) -> Result<Vec<ObservationRecord>, FetchError> {
        let url = rows_url(&self.config);
        let response = authorize(self.client.get(&url), &self.config)
            .send()
            .await?;
        let response = check_status(response).await?;
        let rows: Vec<Value> = response.json().await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in &rows {
            match ObservationRecord::from_row(row) {
                Ok(record) => records.push(record),
                Err(err) => warn!(%err, "skipping malformed observation row"),
            }
        }

        debug!(
            rows = rows.len(),
            records = records.len(),
            "observation set fetched"
        );
        Ok(records)
    }

    async fn subscribe(&self) -> Result<ChangeFeed, SubscriptionError> {
        // Establish the baseline eagerly so a bad URL or key fails the
        // subscribe call instead of a background task.
        let baseline = probe(&self.client, &self.config)
            .await
            .map_err(SubscriptionError::Connect)?;

        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let guard = cancel.clone().drop_guard();

        let client = self.client.clone();
        let config = self.config.clone();
        tokio::spawn(probe_loop(client, config, baseline, tx, cancel));

        Ok(ChangeFeed::new(rx, Some(guard)))
    }
}

/// Snapshot of the table's shape, cheap enough to poll.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
struct Probe {
    count: Option<u64>,
    newest: Option<String>,
}

async fn probe_loop(
    client: reqwest::Client,
    config: StoreConfig,
    mut last: Probe,
    tx: mpsc::UnboundedSender<ChangeEvent>,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(Duration::from_secs(config.probe_interval_secs));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => match probe(&client, &config).await {
                Ok(next) => {
                    if next != last {
                        let kind = classify(&last, &next);
                        debug!(?kind, "observation table changed");
                        if tx.send(ChangeEvent { kind }).is_err() {
                            break;
                        }
                        last = next;
                    }
                }
                Err(err) => warn!(%err, "change probe failed"),
            }
        }
    }
    debug!("change probe stopped");
}

async fn probe(client: &reqwest::Client, config: &StoreConfig) -> Result<Probe, FetchError> {
    let response = authorize(client.get(probe_url(config)), config)
        .header("Prefer", "count=exact")
        .send()
        .await?;
    let response = check_status(response).await?;

    let count = response
        .headers()
        .get(CONTENT_RANGE)
        .and_then(|value| value.to_str().ok())
        .and_then(content_range_total);

    let rows: Vec<Value> = response.json().await?;
    let newest = rows
        .first()
        .and_then(|row| row.get("observed_at"))
        .and_then(Value::as_str)
        .map(str::to_string);

    Ok(Probe { count, newest })
}

fn authorize(request: reqwest::RequestBuilder, config: &StoreConfig) -> reqwest::RequestBuilder {
    request
        .header("apikey", &config.api_key)
        .bearer_auth(&config.api_key)
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, FetchError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(FetchError::Status { status, body })
}

fn rows_url(config: &StoreConfig) -> String {
    format!(
        "{}/rest/v1/{}?select=*&order=observed_at.asc",
        config.base_url.trim_end_matches('/'),
        config.table
    )
}

fn probe_url(config: &StoreConfig) -> String {
    format!(
        "{}/rest/v1/{}?select=observed_at&order=observed_at.desc&limit=1",
        config.base_url.trim_end_matches('/'),
        config.table
    )
}

// Content-Range comes back as "0-24/3573" (or "*/0" for an empty table).
fn content_range_total(raw: &str) -> Option<u64> {
    raw.rsplit('/').next()?.parse().ok()
}

fn classify(prev: &Probe, next: &Probe) -> ChangeKind {
    match (prev.count, next.count) {
        (Some(before), Some(after)) if after > before => ChangeKind::Insert,
        (Some(before), Some(after)) if after < before => ChangeKind::Delete,
        (Some(before), Some(after)) if before == after && prev.newest != next.newest => {
            ChangeKind::Update
        }
        _ => ChangeKind::Unknown,
    }
}
