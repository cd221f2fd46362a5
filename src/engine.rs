//! Reactive recomputation: (mirror, granularity) -> chart data.
//!
//! Recomputation is a pure function of the current mirror and the current
//! granularity, so the two triggers are idempotent and can interleave
//! freely; the worst case is a stale-then-fresh sequence of published
//! results, never an inconsistent one. No locking: the mirror arrives as an
//! atomically replaced `Arc` snapshot.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::aggregate::bucket::{aggregate, AggregatedBucket, Granularity};
use crate::aggregate::totals::{headline_totals, HeadlineTotals};
use crate::record::ObservationRecord;

/// One published recomputation result: the bucket sequence handed to the
/// chart plus the three formatted headline totals. This pair is the whole
/// data contract with the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChartData {
    pub buckets: Vec<AggregatedBucket>,
    pub totals: HeadlineTotals,
}

/// Handle to the recomputation task.
pub struct EngineHandle {
    granularity_tx: watch::Sender<Granularity>,
    rx: watch::Receiver<Arc<ChartData>>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl EngineHandle {
    /// Computes an initial snapshot from the mirror's current contents and
    /// spawns the recompute task.
    pub fn spawn(
        mirror_rx: watch::Receiver<Arc<Vec<ObservationRecord>>>,
        granularity: Granularity,
    ) -> Self {
        let (granularity_tx, granularity_rx) = watch::channel(granularity);

        let initial = compute(&mirror_rx.borrow(), granularity);
        let (tx, rx) = watch::channel(Arc::new(initial));

        let cancel = CancellationToken::new();
        let task = tokio::spawn(recompute_loop(
            mirror_rx,
            granularity_rx,
            tx,
            cancel.clone(),
        ));

        Self {
            granularity_tx,
            rx,
            cancel,
            task,
        }
    }

    /// The granularity selector: plain enumerated state whose only effect is
    /// triggering a recomputation. Not persisted anywhere.
    pub fn set_granularity(&self, granularity: Granularity) {
        let _ = self.granularity_tx.send(granularity);
    }

    pub fn granularity(&self) -> Granularity {
        *self.granularity_tx.borrow()
    }

    /// Latest published chart data.
    pub fn chart_data(&self) -> Arc<ChartData> {
        self.rx.borrow().clone()
    }

    /// A receiver that observes every recomputation.
    pub fn subscribe(&self) -> watch::Receiver<Arc<ChartData>> {
        self.rx.clone()
    }

    pub async fn shutdown(self) -> Result<()> {
        self.cancel.cancel();
        self.task.await.context("engine task failed to join")
    }
}

async fn recompute_loop(
    mut mirror_rx: watch::Receiver<Arc<Vec<ObservationRecord>>>,
    mut granularity_rx: watch::Receiver<Granularity>,
    tx: watch::Sender<Arc<ChartData>>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            changed = mirror_rx.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            changed = granularity_rx.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }

        // Both inputs are drained here, so simultaneous triggers collapse
        // into one recomputation.
        let records = mirror_rx.borrow_and_update().clone();
        let granularity = *granularity_rx.borrow_and_update();
        debug!(records = records.len(), %granularity, "recomputing chart data");
        let _ = tx.send(Arc::new(compute(&records, granularity)));
    }
    debug!("engine recompute loop stopped");
}

fn compute(records: &[ObservationRecord], granularity: Granularity) -> ChartData {
    let buckets = aggregate(records, granularity);
    let totals = headline_totals(&buckets);
    ChartData { buckets, totals }
}
