//! In-process observation store for tests and local development.

use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{ChangeEvent, ChangeFeed, ChangeKind, ObservationStore};
use crate::error::{FetchError, SubscriptionError};
use crate::record::ObservationRecord;

/// Observation store backed by a plain `Vec`, with working change
/// notifications: every mutation notifies all live subscribers.
#[derive(Default)]
pub struct MemoryStore {
    rows: Mutex<Vec<ObservationRecord>>,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<ChangeEvent>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: Vec<ObservationRecord>) -> Self {
        Self {
            rows: Mutex::new(records),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// Appends a record, notifying subscribers of an insert.
    pub fn push(&self, record: ObservationRecord) {
        self.rows.lock().unwrap().push(record);
        self.notify(ChangeKind::Insert);
    }

    /// Replaces the whole set, notifying subscribers of an update.
    pub fn replace(&self, records: Vec<ObservationRecord>) {
        *self.rows.lock().unwrap() = records;
        self.notify(ChangeKind::Update);
    }

    /// Removes the newest record, notifying subscribers of a delete.
    pub fn remove_last(&self) -> Option<ObservationRecord> {
        let removed = self.rows.lock().unwrap().pop();
        if removed.is_some() {
            self.notify(ChangeKind::Delete);
        }
        removed
    }

    fn notify(&self, kind: ChangeKind) {
        self.subscribers
            .lock()
            .unwrap()
            .retain(|tx| tx.send(ChangeEvent { kind }).is_ok());
    }
}

#[async_trait]
impl ObservationStore for MemoryStore {
    async fn fetch_all(&self) -> Result<Vec<ObservationRecord>, FetchError> {
        Ok(self.rows.lock().unwrap().clone())
    }

    async fn subscribe(&self) -> Result<ChangeFeed, SubscriptionError> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().unwrap().push(tx);
        Ok(ChangeFeed::new(rx, None))
    }
}
