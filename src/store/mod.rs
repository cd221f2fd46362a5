//! The remote observation store seam.
//!
//! [`ObservationStore`] is what the engine consumes: a wholesale fetch plus
//! a push-style change feed. [`RestStore`] implements it over a
//! PostgREST-style HTTP API; [`MemoryStore`] is the in-process variant used
//! by tests and local development.

mod memory;
mod rest;

pub use memory::MemoryStore;
pub use rest::RestStore;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::DropGuard;

use crate::error::{FetchError, SubscriptionError};
use crate::record::ObservationRecord;

/// What kind of change the store reported.
///
/// The feed does not guarantee row payloads, so the kind is advisory; any
/// event means "re-fetch the whole set".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
    Unknown,
}

/// One "something changed" notification from the store.
#[derive(Debug, Clone, Copy)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
}

/// Receiving half of a change subscription.
///
/// Dropping the feed releases the subscription on the store side; there is
/// no separate unsubscribe call to forget.
pub struct ChangeFeed {
    rx: mpsc::UnboundedReceiver<ChangeEvent>,
    _release: Option<DropGuard>,
}

impl ChangeFeed {
    pub(crate) fn new(rx: mpsc::UnboundedReceiver<ChangeEvent>, release: Option<DropGuard>) -> Self {
        Self { rx, _release: release }
    }

    /// Waits for the next change notification. `None` means the feed closed.
    pub async fn recv(&mut self) -> Option<ChangeEvent> {
        self.rx.recv().await
    }

    /// Non-blocking drain of an already-delivered notification.
    pub fn try_recv(&mut self) -> Option<ChangeEvent> {
        self.rx.try_recv().ok()
    }
}

/// A remote set of observation records with a change feed.
#[async_trait]
pub trait ObservationStore: Send + Sync {
    /// Fetches the entire current observation set.
    async fn fetch_all(&self) -> Result<Vec<ObservationRecord>, FetchError>;

    /// Opens a change subscription scoped to the observation table.
    async fn subscribe(&self) -> Result<ChangeFeed, SubscriptionError>;
}
