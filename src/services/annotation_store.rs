//! Annotation Store
//!
//! Owns the reconciled, newest-first view of every visible note:
//! - full re-fetch on every change-feed signal (the feed carries no diff)
//! - at most one re-fetch in flight; signals arriving meanwhile collapse into
//!   a single follow-up run
//! - optimistic inserts visible immediately and kept until a re-fetch that
//!   started after them confirms or supersedes them
//! - failed re-fetches keep the previous view
//! - listeners never receive a view older than one they already received

use std::cell::Cell;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, ReentrantMutex};
use tracing::{debug, info, warn};

use crate::models::annotation::Annotation;
use crate::observability::SyncMetrics;
use crate::storage::repository::AnnotationRepository;

/// Callback invoked with the updated view after every change.
pub type StoreListener = Arc<dyn Fn(&[Annotation]) + Send + Sync>;

type ListenerMap = Mutex<HashMap<u64, StoreListener>>;

/// Whether a re-fetch is currently running
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreState {
    Fresh,
    Stale,
}

/// Result of a `reconcile_from_feed` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The last re-fetch run by this call succeeded with `count` visible notes
    Applied { count: usize },
    /// The last re-fetch run by this call failed; the view was kept
    Failed,
    /// Another call was already in flight and will run once more
    Coalesced,
}

#[derive(Debug, Clone)]
struct PendingWrite {
    seq: u64,
    annotation: Annotation,
}

#[derive(Debug, Default)]
struct StoreInner {
    annotations: Vec<Annotation>,
    pending: Vec<PendingWrite>,
    write_seq: u64,
    /// Bumped on every change to `annotations`
    view_seq: u64,
    in_flight: bool,
    rerun_requested: bool,
    loaded: bool,
}

impl StoreInner {
    /// Replace the view with `fetched`, keeping optimistic writes the fetch
    /// could not have observed yet.
    fn apply_fetched(&mut self, fetched: Vec<Annotation>, observed_seq: u64) -> usize {
        let fetched_ids: HashSet<&str> = fetched.iter().map(|a| a.id.as_str()).collect();

        let before = self.pending.len();
        self.pending
            .retain(|p| !fetched_ids.contains(p.annotation.id.as_str()) && p.seq > observed_seq);
        if before != self.pending.len() {
            debug!(
                "Resolved {} optimistic note(s), {} still pending",
                before - self.pending.len(),
                self.pending.len()
            );
        }

        let mut seen = HashSet::new();
        let mut merged: Vec<Annotation> = fetched
            .into_iter()
            .filter(|a| seen.insert(a.id.clone()))
            .collect();
        merged.extend(self.pending.iter().map(|p| p.annotation.clone()));
        merged.sort_by(Annotation::newest_first);

        self.annotations = merged;
        self.annotations.len()
    }

    fn insert_sorted(&mut self, annotation: Annotation) {
        self.annotations.retain(|a| a.id != annotation.id);
        let index = self
            .annotations
            .partition_point(|a| Annotation::newest_first(a, &annotation).is_lt());
        self.annotations.insert(index, annotation);
    }
}

/// Clears `in_flight` if a reconciliation future is dropped mid-fetch.
struct InFlightGuard<'a> {
    inner: &'a Mutex<StoreInner>,
    armed: bool,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            let mut inner = self.inner.lock();
            inner.in_flight = false;
        }
    }
}

/// Deregisters its listener when dropped.
#[must_use = "dropping the subscription deregisters the listener"]
pub struct StoreSubscription {
    id: u64,
    listeners: Weak<ListenerMap>,
}

impl StoreSubscription {
    pub fn unsubscribe(self) {}
}

impl Drop for StoreSubscription {
    fn drop(&mut self) {
        if let Some(listeners) = self.listeners.upgrade() {
            listeners.lock().remove(&self.id);
        }
    }
}

/// Annotation Store
pub struct AnnotationStore {
    repository: Arc<dyn AnnotationRepository>,
    inner: Mutex<StoreInner>,
    listeners: Arc<ListenerMap>,
    next_listener_id: AtomicU64,
    /// `view_seq` of the last snapshot handed to listeners
    delivered: ReentrantMutex<Cell<u64>>,
    metrics: Arc<SyncMetrics>,
}

impl AnnotationStore {
    pub fn new(repository: Arc<dyn AnnotationRepository>, metrics: Arc<SyncMetrics>) -> Self {
        Self {
            repository,
            inner: Mutex::new(StoreInner::default()),
            listeners: Arc::new(Mutex::new(HashMap::new())),
            next_listener_id: AtomicU64::new(1),
            delivered: ReentrantMutex::new(Cell::new(0)),
            metrics,
        }
    }

    /// Current view, newest first. Never waits on I/O.
    pub fn current_annotations(&self) -> Vec<Annotation> {
        self.inner.lock().annotations.clone()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().annotations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// False until the first re-fetch has finished (successfully or not).
    pub fn is_loaded(&self) -> bool {
        self.inner.lock().loaded
    }

    pub fn state(&self) -> StoreState {
        if self.inner.lock().in_flight {
            StoreState::Stale
        } else {
            StoreState::Fresh
        }
    }

    /// Optimistic writes not yet observed by a re-fetch
    pub fn pending_count(&self) -> usize {
        self.inner.lock().pending.len()
    }

    /// Distinct authors of the visible notes
    pub fn author_ids(&self) -> BTreeSet<String> {
        self.inner
            .lock()
            .annotations
            .iter()
            .map(|a| a.author_id.clone())
            .collect()
    }

    /// Register a listener; it runs after each applied change.
    pub fn subscribe<F>(&self, listener: F) -> StoreSubscription
    where
        F: Fn(&[Annotation]) + Send + Sync + 'static,
    {
        let id = self.next_listener_id.fetch_add(1, Ordering::SeqCst);
        self.listeners.lock().insert(id, Arc::new(listener));
        StoreSubscription {
            id,
            listeners: Arc::downgrade(&self.listeners),
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }

    /// Show an acknowledged write immediately, ahead of older notes.
    pub fn apply_optimistic_insert(&self, annotation: Annotation) {
        let (view_seq, snapshot) = {
            let mut inner = self.inner.lock();
            inner.write_seq += 1;
            let seq = inner.write_seq;
            inner.pending.retain(|p| p.annotation.id != annotation.id);
            inner.pending.push(PendingWrite {
                seq,
                annotation: annotation.clone(),
            });
            inner.insert_sorted(annotation);
            inner.view_seq += 1;
            (inner.view_seq, inner.annotations.clone())
        };

        SyncMetrics::incr(&self.metrics.optimistic_inserts);
        self.notify(view_seq, &snapshot);
    }

    /// Re-fetch the authoritative collection and replace the view.
    ///
    /// If a re-fetch is already running, this only requests one more run
    /// after it and returns [`ReconcileOutcome::Coalesced`].
    pub async fn reconcile_from_feed(&self) -> ReconcileOutcome {
        {
            let mut inner = self.inner.lock();
            if inner.in_flight {
                inner.rerun_requested = true;
                SyncMetrics::incr(&self.metrics.coalesced_signals);
                debug!("Reconciliation in flight, coalescing signal");
                return ReconcileOutcome::Coalesced;
            }
            inner.in_flight = true;
        }

        let mut guard = InFlightGuard {
            inner: &self.inner,
            armed: true,
        };

        loop {
            let observed_seq = self.inner.lock().write_seq;
            let result = self.repository.fetch_all().await;

            let (outcome, snapshot, rerun) = {
                let mut inner = self.inner.lock();
                let (outcome, snapshot) = match result {
                    Ok(fetched) => {
                        let count = inner.apply_fetched(fetched, observed_seq);
                        inner.view_seq += 1;
                        (
                            ReconcileOutcome::Applied { count },
                            Some((inner.view_seq, inner.annotations.clone())),
                        )
                    }
                    Err(e) => {
                        warn!("Failed to reconcile notes, keeping previous view: {}", e);
                        (ReconcileOutcome::Failed, None)
                    }
                };
                inner.loaded = true;
                let rerun = std::mem::take(&mut inner.rerun_requested);
                if !rerun {
                    inner.in_flight = false;
                    guard.armed = false;
                }
                (outcome, snapshot, rerun)
            };

            self.metrics
                .record_reconciliation(outcome != ReconcileOutcome::Failed);
            if let Some((view_seq, snapshot)) = snapshot {
                info!("Reconciled {} note(s)", snapshot.len());
                self.notify(view_seq, &snapshot);
            }

            if !rerun {
                return outcome;
            }
            debug!("Running coalesced follow-up reconciliation");
        }
    }

    /// Deliver `snapshot` unless a newer view already reached the listeners.
    ///
    /// Delivery is serialized; a listener that mutates the store is delivered
    /// the newer view re-entrantly and the outer, older one is then skipped.
    fn notify(&self, view_seq: u64, snapshot: &[Annotation]) {
        let delivered = self.delivered.lock();
        if view_seq <= delivered.get() {
            debug!("Skipping stale view #{} (delivered #{})", view_seq, delivered.get());
            return;
        }
        delivered.set(view_seq);

        let listeners: Vec<StoreListener> = self.listeners.lock().values().cloned().collect();
        for listener in listeners {
            if delivered.get() != view_seq {
                break;
            }
            listener(snapshot);
        }
    }
}
