//! Local mirror of the remote observation set.
//!
//! Invalidate-and-refetch: the change feed only says *that* something
//! changed, so every event triggers a wholesale re-fetch and an atomic
//! replacement of the mirror. Consumers hold a watch receiver and never see
//! a partially updated set. Incremental diffing could later replace the
//! re-fetch behind the same interface.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::FetchError;
use crate::record::ObservationRecord;
use crate::store::{ChangeFeed, ObservationStore};

const FETCH_ATTEMPTS: u32 = 3;
const INITIAL_BACKOFF: Duration = Duration::from_millis(500);
const RESUBSCRIBE_BACKOFF_CAP: Duration = Duration::from_secs(30);

/// Handle to the background mirror task.
///
/// The change subscription lives exactly as long as the task: shutdown, or
/// the task bailing out, releases it on every exit path.
pub struct MirrorHandle {
    rx: watch::Receiver<Arc<Vec<ObservationRecord>>>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl MirrorHandle {
    /// Performs the initial full fetch, opens the change subscription, and
    /// spawns the refresh task.
    ///
    /// Initial-fetch and subscribe failures are returned to the caller (fail
    /// fast at startup); after that, refresh failures leave the
    /// last-known-good set in place.
    pub async fn spawn(store: Arc<dyn ObservationStore>) -> Result<Self> {
        let initial = store
            .fetch_all()
            .await
            .context("initial observation fetch failed")?;
        info!(records = initial.len(), "observation mirror primed");

        let feed = store
            .subscribe()
            .await
            .context("change feed subscribe failed")?;

        let (tx, rx) = watch::channel(Arc::new(initial));
        let cancel = CancellationToken::new();
        let task = tokio::spawn(refresh_loop(store, feed, tx, cancel.clone()));

        Ok(Self { rx, cancel, task })
    }

    /// Current record set. Cheap: clones an `Arc`, not the records.
    pub fn records(&self) -> Arc<Vec<ObservationRecord>> {
        self.rx.borrow().clone()
    }

    /// A receiver that observes every mirror replacement.
    pub fn subscribe(&self) -> watch::Receiver<Arc<Vec<ObservationRecord>>> {
        self.rx.clone()
    }

    /// Cancels the refresh task and waits for it to finish. A fetch in
    /// flight at cancellation is discarded, never applied.
    pub async fn shutdown(self) -> Result<()> {
        self.cancel.cancel();
        self.task.await.context("mirror task failed to join")
    }
}

async fn refresh_loop(
    store: Arc<dyn ObservationStore>,
    mut feed: ChangeFeed,
    tx: watch::Sender<Arc<Vec<ObservationRecord>>>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            event = feed.recv() => match event {
                Some(event) => {
                    // Notifications that piled up while we were busy are
                    // covered by the same re-fetch.
                    let mut coalesced = 0usize;
                    while feed.try_recv().is_some() {
                        coalesced += 1;
                    }
                    debug!(kind = ?event.kind, coalesced, "change notification, refreshing mirror");
                    if !refresh(&*store, &tx, &cancel).await {
                        break;
                    }
                }
                None => {
                    warn!("change feed closed, resubscribing");
                    match resubscribe(&*store, &cancel).await {
                        Some(next) => {
                            feed = next;
                            // Cover whatever changed while the feed was down.
                            if !refresh(&*store, &tx, &cancel).await {
                                break;
                            }
                        }
                        None => break,
                    }
                }
            }
        }
    }
    debug!("mirror refresh loop stopped");
}

/// Re-fetches and replaces the mirror. Returns `false` when cancelled; the
/// in-flight result is dropped, not applied.
async fn refresh(
    store: &dyn ObservationStore,
    tx: &watch::Sender<Arc<Vec<ObservationRecord>>>,
    cancel: &CancellationToken,
) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        fetched = fetch_with_retry(store) => {
            match fetched {
                Ok(records) => {
                    debug!(records = records.len(), "mirror replaced");
                    let _ = tx.send(Arc::new(records));
                }
                Err(err) => {
                    warn!(%err, "refresh failed, keeping last-known-good mirror");
                }
            }
            true
        }
    }
}

async fn fetch_with_retry(
    store: &dyn ObservationStore,
) -> Result<Vec<ObservationRecord>, FetchError> {
    let mut backoff = INITIAL_BACKOFF;
    let mut attempt = 1;
    loop {
        match store.fetch_all().await {
            Ok(records) => return Ok(records),
            Err(err) if attempt < FETCH_ATTEMPTS => {
                warn!(%err, attempt, "observation fetch failed, retrying");
                tokio::time::sleep(backoff).await;
                backoff *= 2;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

async fn resubscribe(
    store: &dyn ObservationStore,
    cancel: &CancellationToken,
) -> Option<ChangeFeed> {
    let mut backoff = INITIAL_BACKOFF;
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return None,
            result = store.subscribe() => match result {
                Ok(feed) => return Some(feed),
                Err(err) => {
                    warn!(%err, "resubscribe failed, backing off");
                    tokio::select! {
                        _ = cancel.cancelled() => return None,
                        _ = tokio::time::sleep(backoff) => {}
                    }
                    backoff = (backoff * 2).min(RESUBSCRIBE_BACKOFF_CAP);
                }
            }
        }
    }
}
