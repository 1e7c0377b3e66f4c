//! Profile Resolver
//!
//! Read-through cache of author identities. Identities never change once
//! created, so the cache only grows and is never invalidated.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::{debug, warn};

use crate::models::identity::{Identity, UNKNOWN_AUTHOR};
use crate::observability::SyncMetrics;
use crate::storage::repository::IdentityRepository;

#[derive(Debug, Default)]
struct ResolverState {
    cache: HashMap<String, Identity>,
    /// Ids claimed by a batch fetch that has not finished yet
    in_flight: HashSet<String>,
}

/// Releases claimed ids and wakes waiters, also when the fetch is cancelled.
struct ClaimGuard<'a> {
    resolver: &'a ProfileResolver,
    ids: Vec<String>,
}

impl Drop for ClaimGuard<'_> {
    fn drop(&mut self) {
        {
            let mut state = self.resolver.state.lock();
            for id in &self.ids {
                state.in_flight.remove(id);
            }
        }
        self.resolver.fetched.notify_waiters();
    }
}

pub struct ProfileResolver {
    repository: Arc<dyn IdentityRepository>,
    state: Mutex<ResolverState>,
    fetched: Notify,
    metrics: Arc<SyncMetrics>,
}

impl ProfileResolver {
    pub fn new(repository: Arc<dyn IdentityRepository>, metrics: Arc<SyncMetrics>) -> Self {
        Self {
            repository,
            state: Mutex::new(ResolverState::default()),
            fetched: Notify::new(),
            metrics,
        }
    }

    /// Resolve every requested id, fetching only cache misses in one batch.
    ///
    /// Ids already being fetched by a concurrent call are awaited instead of
    /// fetched again. Ids without an identity are absent from the result. A
    /// failed fetch is logged and only the cache hits are returned.
    pub async fn resolve_all<I, S>(&self, ids: I) -> HashMap<String, Identity>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let requested: BTreeSet<String> = ids
            .into_iter()
            .map(|id| id.as_ref().to_string())
            .filter(|id| !id.is_empty())
            .collect();

        let (claimed, mut awaited) = {
            let mut state = self.state.lock();
            let mut claimed = Vec::new();
            let mut awaited = Vec::new();
            for id in &requested {
                if state.cache.contains_key(id) {
                    continue;
                }
                if state.in_flight.contains(id) {
                    awaited.push(id.clone());
                } else {
                    state.in_flight.insert(id.clone());
                    claimed.push(id.clone());
                }
            }
            (claimed, awaited)
        };

        if !claimed.is_empty() {
            self.fetch_claimed(claimed).await;
        }

        while !awaited.is_empty() {
            let notified = self.fetched.notified();
            tokio::pin!(notified);
            {
                let state = self.state.lock();
                awaited.retain(|id| state.in_flight.contains(id));
                if awaited.is_empty() {
                    break;
                }
                notified.as_mut().enable();
            }
            debug!("Waiting on {} identit(ies) fetched by another call", awaited.len());
            notified.await;
        }

        let state = self.state.lock();
        requested
            .into_iter()
            .filter_map(|id| state.cache.get(&id).map(|identity| (id, identity.clone())))
            .collect()
    }

    async fn fetch_claimed(&self, claimed: Vec<String>) {
        let guard = ClaimGuard {
            resolver: self,
            ids: claimed,
        };

        debug!("Fetching {} identit(ies) not in cache", guard.ids.len());
        match self.repository.fetch_by_ids(&guard.ids).await {
            Ok(found) => {
                self.metrics.record_identity_fetch(true);
                let mut state = self.state.lock();
                for identity in found {
                    // the backend may return rows we did not ask for; keep them anyway
                    state.cache.entry(identity.id.clone()).or_insert(identity);
                }
            }
            Err(e) => {
                self.metrics.record_identity_fetch(false);
                warn!("Failed to fetch identities, using cached entries: {}", e);
            }
        }
    }

    pub fn cached(&self, id: &str) -> Option<Identity> {
        self.state.lock().cache.get(id).cloned()
    }

    /// Display name, or the "Unknown" placeholder.
    pub fn display_name(&self, id: &str) -> String {
        self.state
            .lock()
            .cache
            .get(id)
            .map(|identity| identity.display_name.clone())
            .unwrap_or_else(|| UNKNOWN_AUTHOR.to_string())
    }

    pub fn cache_len(&self) -> usize {
        self.state.lock().cache.len()
    }
}
