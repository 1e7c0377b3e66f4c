use crate::config::AppConfig;
use crate::error::Result;
use crate::models::annotation::Annotation;
use crate::models::identity::UNKNOWN_AUTHOR;
use crate::observability::SyncMetrics;
use crate::picking::PickResult;
use crate::realtime::sync::SyncDriver;
use crate::services::annotation_store::AnnotationStore;
use crate::services::profile_resolver::ProfileResolver;
use crate::services::write_pipeline::WritePipeline;
use crate::storage::memory::InMemoryBackend;
use crate::storage::repository::{AnnotationRepository, IdentityRepository, Notifier, SessionSource};
use serde::Serialize;
use std::sync::Arc;

/// A note as the renderer shows it: position plus hover label
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Marker {
    pub annotation: Annotation,
    /// Author display name, or "Unknown"
    pub author_label: String,
    pub avatar_url: Option<String>,
}

/// Application state containing the shared store, caches and pipeline
#[derive(Clone)]
pub struct AppState {
    /// Current configuration
    pub config: Arc<AppConfig>,
    /// Reconciled view of all notes
    pub store: Arc<AnnotationStore>,
    /// Author identity cache
    pub profiles: Arc<ProfileResolver>,
    /// Note creation
    pub pipeline: Arc<WritePipeline>,
    /// Signed-in user
    pub session: Arc<dyn SessionSource>,
    /// Sync counters
    pub metrics: Arc<SyncMetrics>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("config", &self.config.app_name)
            .field("store", &"Arc<AnnotationStore>")
            .field("profiles", &"Arc<ProfileResolver>")
            .field("pipeline", &"Arc<WritePipeline>")
            .field("session", &"Arc<dyn SessionSource>")
            .field("metrics", &self.metrics.snapshot())
            .finish()
    }
}

impl AppState {
    /// Create new application state
    pub fn new(
        config: AppConfig,
        repository: Arc<dyn AnnotationRepository>,
        identities: Arc<dyn IdentityRepository>,
        notifier: Arc<dyn Notifier>,
        session: Arc<dyn SessionSource>,
    ) -> Self {
        let metrics = Arc::new(SyncMetrics::default());
        let store = Arc::new(AnnotationStore::new(repository.clone(), metrics.clone()));
        let profiles = Arc::new(ProfileResolver::new(identities, metrics.clone()));
        let pipeline = Arc::new(WritePipeline::new(
            repository,
            store.clone(),
            session.clone(),
            notifier,
            profiles.clone(),
            config.notes.clone(),
            config.notification.clone(),
            metrics.clone(),
        ));

        Self {
            config: Arc::new(config),
            store,
            profiles,
            pipeline,
            session,
            metrics,
        }
    }

    /// State backed entirely by one in-memory backend
    pub fn in_memory(
        config: AppConfig,
        backend: Arc<InMemoryBackend>,
        session: Arc<dyn SessionSource>,
    ) -> Self {
        Self::new(config, backend.clone(), backend.clone(), backend, session)
    }

    /// Sync driver for this state's store, filtered by the configured topic
    pub fn sync_driver(&self) -> SyncDriver {
        SyncDriver::new(self.store.clone(), self.profiles.clone(), &self.config.feed.topic)
    }

    /// Current notes joined with whatever identities are cached
    pub fn markers(&self) -> Vec<Marker> {
        self.store
            .current_annotations()
            .into_iter()
            .map(|annotation| {
                let identity = self.profiles.cached(&annotation.author_id);
                Marker {
                    author_label: identity
                        .as_ref()
                        .map(|i| i.display_name.clone())
                        .unwrap_or_else(|| UNKNOWN_AUTHOR.to_string()),
                    avatar_url: identity.and_then(|i| i.avatar_url),
                    annotation,
                }
            })
            .collect()
    }

    /// Write a note at a picked point as the signed-in user
    pub async fn submit_pick(&self, pick: &PickResult, text: &str) -> Result<Annotation> {
        let author_id = self
            .session
            .current_user()
            .map(|user| user.id)
            .unwrap_or_default();
        self.pipeline.submit(&author_id, pick.point, text).await
    }
}
