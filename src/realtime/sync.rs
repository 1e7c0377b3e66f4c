//! 同步驱动
//!
//! 把变更信号转换成仓库的重新拉取，每次视图变化后批量解析尚未缓存的作者。
//! 每个信号只是“有变化”的提示，内容从不被使用。

use std::collections::BTreeSet;
use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::realtime::feed::{ChangeFeed, ChangeSignal};
use crate::realtime::subscription::TopicFilter;
use crate::services::annotation_store::AnnotationStore;
use crate::services::profile_resolver::ProfileResolver;

pub struct SyncDriver {
    store: Arc<AnnotationStore>,
    profiles: Arc<ProfileResolver>,
    filter: TopicFilter,
}

impl SyncDriver {
    pub fn new(store: Arc<AnnotationStore>, profiles: Arc<ProfileResolver>, topic: &str) -> Self {
        Self {
            store,
            profiles,
            filter: TopicFilter::single(topic),
        }
    }

    /// Subscribe to `feed` and drive the store until `shutdown` flips to true.
    pub fn spawn(self, feed: &dyn ChangeFeed, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        let signals = feed.subscribe();
        tokio::spawn(self.run(signals, shutdown))
    }

    pub async fn run(
        self,
        mut signals: broadcast::Receiver<ChangeSignal>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let (authors_tx, mut authors_rx) = mpsc::unbounded_channel::<BTreeSet<String>>();
        let profiles = self.profiles.clone();
        let _subscription = self.store.subscribe(move |annotations| {
            // authors a failed fetch left unresolved are asked for again on the next change
            let missing: BTreeSet<String> = annotations
                .iter()
                .filter(|a| profiles.cached(&a.author_id).is_none())
                .map(|a| a.author_id.clone())
                .collect();
            if !missing.is_empty() {
                let _ = authors_tx.send(missing);
            }
        });

        info!("Sync driver started, topics: {:?}", self.filter.topics());
        self.trigger_reconcile();

        if *shutdown.borrow() {
            return;
        }

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                signal = signals.recv() => match signal {
                    Ok(signal) => {
                        let topic = signal.topic();
                        if self.filter.accepts(&topic) {
                            debug!("Change signal {}", topic);
                            self.trigger_reconcile();
                        } else {
                            debug!("Ignoring change signal {}", topic);
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Change feed lagged, {} signal(s) dropped", skipped);
                        self.trigger_reconcile();
                    }
                    Err(RecvError::Closed) => {
                        info!("Change feed closed");
                        break;
                    }
                },
                Some(authors) = authors_rx.recv() => {
                    let profiles = self.profiles.clone();
                    tokio::spawn(async move {
                        let resolved = profiles.resolve_all(&authors).await;
                        debug!("Resolved {}/{} author(s)", resolved.len(), authors.len());
                    });
                }
            }
        }

        info!("Sync driver stopped");
    }

    fn trigger_reconcile(&self) {
        let store = self.store.clone();
        tokio::spawn(async move {
            store.reconcile_from_feed().await;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::annotation::Annotation;
    use crate::models::identity::Identity;
    use crate::observability::SyncMetrics;
    use crate::realtime::feed::{BroadcastChangeFeed, ChangeKind};
    use crate::storage::memory::InMemoryBackend;
    use crate::error::{AppError, Result};
    use crate::storage::repository::IdentityRepository;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct Harness {
        backend: Arc<InMemoryBackend>,
        store: Arc<AnnotationStore>,
        profiles: Arc<ProfileResolver>,
        metrics: Arc<SyncMetrics>,
        shutdown: watch::Sender<bool>,
        handle: JoinHandle<()>,
    }

    fn remote_note(id: &str, author: &str) -> Annotation {
        Annotation {
            id: id.to_string(),
            author_id: author.to_string(),
            x: 0.0,
            y: 1.0,
            z: 0.0,
            text: None,
            created_at: Utc::now(),
        }
    }

    fn start(backend: Arc<InMemoryBackend>, topic: &str) -> Harness {
        let metrics = Arc::new(SyncMetrics::default());
        let store = Arc::new(AnnotationStore::new(backend.clone(), metrics.clone()));
        let profiles = Arc::new(ProfileResolver::new(backend.clone(), metrics.clone()));
        let (shutdown, rx) = watch::channel(false);
        let handle = SyncDriver::new(store.clone(), profiles.clone(), topic).spawn(&*backend, rx);
        Harness {
            backend,
            store,
            profiles,
            metrics,
            shutdown,
            handle,
        }
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
        for _ in 0..200 {
            if condition() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        false
    }

    #[tokio::test]
    async fn test_initial_load() {
        let backend = Arc::new(InMemoryBackend::new());
        backend.insert_remote(remote_note("n1", "u1"));

        let h = start(backend, "notes:*");

        assert!(wait_until(|| h.store.is_loaded()).await);
        assert_eq!(h.store.current_annotations()[0].id, "n1");
    }

    #[tokio::test]
    async fn test_remote_insert_triggers_reconcile() {
        let h = start(Arc::new(InMemoryBackend::new()), "notes:*");
        assert!(wait_until(|| h.store.is_loaded()).await);

        h.backend.insert_remote(remote_note("n2", "u2"));

        assert!(wait_until(|| h.store.len() == 1).await);
        assert_eq!(h.store.current_annotations()[0].id, "n2");
    }

    #[tokio::test]
    async fn test_remote_delete_is_reflected() {
        let backend = Arc::new(InMemoryBackend::new());
        backend.insert_remote(remote_note("n1", "u1"));
        let h = start(backend, "notes:*");
        assert!(wait_until(|| h.store.len() == 1).await);

        assert!(h.backend.delete("n1"));

        assert!(wait_until(|| h.store.is_empty()).await);
    }

    #[tokio::test]
    async fn test_new_author_is_resolved() {
        let backend = Arc::new(InMemoryBackend::new());
        backend.put_identity(Identity::new("u1", "elf"));
        let h = start(backend, "notes:*");
        assert!(wait_until(|| h.store.is_loaded()).await);

        h.backend.insert_remote(remote_note("n1", "u1"));

        assert!(wait_until(|| h.profiles.cached("u1").is_some()).await);
        assert_eq!(h.profiles.display_name("u1"), "elf");
    }

    #[tokio::test]
    async fn test_unmatched_topic_is_ignored() {
        let h = start(Arc::new(InMemoryBackend::new()), "profiles:*");
        assert!(wait_until(|| h.store.is_loaded()).await);

        h.backend.insert_remote(remote_note("n1", "u1"));
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(h.store.is_empty());
        assert_eq!(h.metrics.snapshot().reconciliations_total, 1);
    }

    #[tokio::test]
    async fn test_lagged_feed_still_reconciles() {
        let backend = Arc::new(InMemoryBackend::new());
        let metrics = Arc::new(SyncMetrics::default());
        let store = Arc::new(AnnotationStore::new(backend.clone(), metrics.clone()));
        let profiles = Arc::new(ProfileResolver::new(backend.clone(), metrics.clone()));

        let feed = BroadcastChangeFeed::new(1);
        let signals = feed.subscribe();
        for _ in 0..3 {
            feed.publish(ChangeSignal::new("notes", ChangeKind::Update));
        }

        let (_shutdown, rx) = watch::channel(false);
        tokio::spawn(SyncDriver::new(store, profiles, "notes:*").run(signals, rx));

        assert!(wait_until(|| metrics.snapshot().reconciliations_total >= 2).await);
    }

    #[tokio::test]
    async fn test_shutdown_stops_driver() {
        let h = start(Arc::new(InMemoryBackend::new()), "notes:*");
        assert!(wait_until(|| h.store.is_loaded()).await);
        assert_eq!(h.store.listener_count(), 1);
        assert_eq!(h.backend.feed().receiver_count(), 1);

        h.shutdown.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), h.handle)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(h.store.listener_count(), 0);
        assert_eq!(h.backend.feed().receiver_count(), 0);
    }

    /// Fails its first lookup, then delegates to the backend.
    struct FlakyIdentities {
        backend: Arc<InMemoryBackend>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl IdentityRepository for FlakyIdentities {
        async fn fetch_by_ids(&self, ids: &[String]) -> Result<Vec<Identity>> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                return Err(AppError::Connection("profiles timed out".into()));
            }
            self.backend.fetch_by_ids(ids).await
        }
    }

    #[tokio::test]
    async fn test_identity_fetch_is_retried_after_failure() {
        let backend = Arc::new(InMemoryBackend::new());
        backend.put_identity(Identity::new("u1", "elf"));
        let identities = Arc::new(FlakyIdentities {
            backend: backend.clone(),
            calls: AtomicUsize::new(0),
        });
        let metrics = Arc::new(SyncMetrics::default());
        let store = Arc::new(AnnotationStore::new(backend.clone(), metrics.clone()));
        let profiles = Arc::new(ProfileResolver::new(identities.clone(), metrics.clone()));
        let (_shutdown, rx) = watch::channel(false);
        SyncDriver::new(store.clone(), profiles.clone(), "notes:*").spawn(&*backend, rx);
        assert!(wait_until(|| store.is_loaded()).await);

        backend.insert_remote(remote_note("a", "u1"));
        assert!(wait_until(|| metrics.snapshot().identity_fetch_failures == 1).await);
        assert!(profiles.cached("u1").is_none());

        // same author set as before; the miss alone is enough to ask again
        backend.insert_remote(remote_note("b", "u1"));

        assert!(wait_until(|| profiles.cached("u1").is_some()).await);
        assert_eq!(identities.calls.load(Ordering::SeqCst), 2);
    }
}
