//! Live mask-count poller for the video overlay.
//!
//! Polls the detector's count endpoint once a second while the stream is
//! active. Poll failures are logged and the loop keeps going; stopping the
//! poller cancels the timer before it can fire again.

use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

const POLL_INTERVAL: Duration = Duration::from_secs(1);
const POLL_TIMEOUT: Duration = Duration::from_secs(5);

/// Counts returned by the detector's live endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveCounts {
    pub mask_count: u64,
    pub no_mask_count: u64,
}

/// Handle to the polling task; lives exactly as long as the stream display.
pub struct LivePoller {
    rx: watch::Receiver<LiveCounts>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl LivePoller {
    /// Starts polling `count_url`. Fails only if the HTTP client cannot be
    /// built; endpoint failures are absorbed by the loop.
    pub fn start(count_url: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(POLL_TIMEOUT)
            .build()
            .context("live poller HTTP client")?;

        let (tx, rx) = watch::channel(LiveCounts::default());
        let cancel = CancellationToken::new();
        let task = tokio::spawn(poll_loop(client, count_url, tx, cancel.clone()));

        Ok(Self { rx, cancel, task })
    }

    /// Latest counts seen; zeroes until the first successful poll.
    pub fn counts(&self) -> LiveCounts {
        *self.rx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<LiveCounts> {
        self.rx.clone()
    }

    /// Stops polling. Cancellation is synchronous with stream-stop: once
    /// this returns, no further poll can fire.
    pub async fn stop(self) -> Result<()> {
        self.cancel.cancel();
        self.task.await.context("live poll task failed to join")
    }
}

async fn poll_loop(
    client: reqwest::Client,
    url: String,
    tx: watch::Sender<LiveCounts>,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(POLL_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => match poll_once(&client, &url).await {
                Ok(counts) => {
                    let _ = tx.send(counts);
                }
                Err(err) => warn!(%err, "live count poll failed"),
            }
        }
    }
    debug!("live poll loop stopped");
}

async fn poll_once(client: &reqwest::Client, url: &str) -> Result<LiveCounts> {
    let counts = client
        .get(url)
        .send()
        .await?
        .error_for_status()?
        .json::<LiveCounts>()
        .await?;
    Ok(counts)
}
