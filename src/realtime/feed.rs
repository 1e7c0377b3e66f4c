//! Change-feed sources
//!
//! A change feed carries content-free signals: "something in this table
//! changed, re-fetch". Consumers never receive row data through it.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch};
use tracing::{debug, info};

/// Kind of row change reported by the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

impl ChangeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ChangeKind::Insert => "insert",
            ChangeKind::Update => "update",
            ChangeKind::Delete => "delete",
        }
    }
}

/// Content-free change notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSignal {
    pub table: String,
    pub kind: ChangeKind,
}

impl ChangeSignal {
    pub fn new(table: &str, kind: ChangeKind) -> Self {
        Self {
            table: table.to_string(),
            kind,
        }
    }

    /// Topic string, e.g. `notes:insert`
    pub fn topic(&self) -> String {
        format!("{}:{}", self.table, self.kind.as_str())
    }
}

/// Push channel of change signals
pub trait ChangeFeed: Send + Sync {
    fn subscribe(&self) -> broadcast::Receiver<ChangeSignal>;
}

/// In-process feed backed by a tokio broadcast channel
#[derive(Debug, Clone)]
pub struct BroadcastChangeFeed {
    tx: broadcast::Sender<ChangeSignal>,
}

impl BroadcastChangeFeed {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish a signal; returns the number of receivers reached.
    pub fn publish(&self, signal: ChangeSignal) -> usize {
        debug!("Publishing change signal: {}", signal.topic());
        self.tx.send(signal).unwrap_or(0)
    }

    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for BroadcastChangeFeed {
    fn default() -> Self {
        Self::new(64)
    }
}

impl ChangeFeed for BroadcastChangeFeed {
    fn subscribe(&self) -> broadcast::Receiver<ChangeSignal> {
        self.tx.subscribe()
    }
}

/// Feed for transports without push: emits an `update` signal every period.
#[derive(Debug, Clone)]
pub struct PollingChangeFeed {
    inner: BroadcastChangeFeed,
    table: String,
    period: Duration,
}

impl PollingChangeFeed {
    pub fn new(table: &str, period: Duration, capacity: usize) -> Self {
        Self {
            inner: BroadcastChangeFeed::new(capacity),
            table: table.to_string(),
            period,
        }
    }

    /// Tick until `shutdown` flips to true or its sender is dropped.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            "Polling change feed started for '{}' every {:?}",
            self.table, self.period
        );
        let mut ticker = tokio::time::interval(self.period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // the first tick completes immediately; the driver already did an initial load
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.inner.publish(ChangeSignal::new(&self.table, ChangeKind::Update));
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("Polling change feed for '{}' stopped", self.table);
    }
}

impl ChangeFeed for PollingChangeFeed {
    fn subscribe(&self) -> broadcast::Receiver<ChangeSignal> {
        self.inner.subscribe()
    }
}
