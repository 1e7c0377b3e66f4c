//! Write Pipeline
//!
//! Creates a note: validate locally, write durably, show it optimistically,
//! then fire a best-effort notification that can never undo the write.

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::config::config::{NotesConfig, NotificationConfig};
use crate::error::{AppError, Result};
use crate::models::annotation::{Annotation, NewAnnotation, ScenePoint};
use crate::models::notification::Notification;
use crate::observability::SyncMetrics;
use crate::services::annotation_store::AnnotationStore;
use crate::services::profile_resolver::ProfileResolver;
use crate::storage::repository::{AnnotationRepository, Notifier, SessionSource};

/// Check note text; returns the trimmed text to persist.
pub fn validate_text(text: &str, max_chars: usize) -> Result<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(AppError::Validation("Note text is required".to_string()));
    }

    let len = trimmed.chars().count();
    if len > max_chars {
        return Err(AppError::Validation(format!(
            "Note text is too long (max: {}, got: {})",
            max_chars, len
        )));
    }

    Ok(trimmed.to_string())
}

#[derive(Clone)]
pub struct WritePipeline {
    repository: Arc<dyn AnnotationRepository>,
    store: Arc<AnnotationStore>,
    session: Arc<dyn SessionSource>,
    notifier: Arc<dyn Notifier>,
    profiles: Arc<ProfileResolver>,
    notes: NotesConfig,
    notification: NotificationConfig,
    metrics: Arc<SyncMetrics>,
}

impl WritePipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        repository: Arc<dyn AnnotationRepository>,
        store: Arc<AnnotationStore>,
        session: Arc<dyn SessionSource>,
        notifier: Arc<dyn Notifier>,
        profiles: Arc<ProfileResolver>,
        notes: NotesConfig,
        notification: NotificationConfig,
        metrics: Arc<SyncMetrics>,
    ) -> Self {
        Self {
            repository,
            store,
            session,
            notifier,
            profiles,
            notes,
            notification,
            metrics,
        }
    }

    /// Persist a note and make it visible before returning.
    ///
    /// On failure nothing is inserted locally and no notification is sent.
    pub async fn submit(&self, author_id: &str, point: ScenePoint, text: &str) -> Result<Annotation> {
        let text = validate_text(text, self.notes.max_text_chars)?;
        if !point.is_finite() {
            return Err(AppError::Validation("Pick target is not a finite point".to_string()));
        }

        let user = self
            .session
            .current_user()
            .ok_or_else(|| AppError::Authentication("No signed-in user".to_string()))?;
        if user.id != author_id {
            return Err(AppError::Authentication(format!(
                "Author {} is not the signed-in user",
                author_id
            )));
        }

        let new_note = NewAnnotation::new(author_id, point, &text);
        let created = match self.repository.insert(&new_note).await {
            Ok(created) => {
                self.metrics.record_write(true);
                created
            }
            Err(e) => {
                self.metrics.record_write(false);
                error!("Failed to write note for {}: {}", author_id, e);
                return Err(e);
            }
        };
        info!(
            "Note {} written by {} at ({:.2}, {:.2}, {:.2})",
            created.id, created.author_id, created.x, created.y, created.z
        );

        self.store.apply_optimistic_insert(created.clone());

        if let Some(email) = user.email.as_deref() {
            self.dispatch_notification(email, author_id);
        }

        Ok(created)
    }

    fn dispatch_notification(&self, email: &str, author_id: &str) {
        if !self.notification.enabled {
            return;
        }

        let name = self
            .profiles
            .cached(author_id)
            .map(|identity| identity.display_name)
            .unwrap_or_else(|| self.notification.fallback_name.clone());
        let message = Notification::from_template(
            email,
            &self.notification.subject,
            &self.notification.html,
            &name,
        );

        let notifier = self.notifier.clone();
        let metrics = self.metrics.clone();
        tokio::spawn(async move {
            match notifier.send(&message).await {
                Ok(()) => {
                    metrics.record_notification(true);
                    info!("Notification sent to {}", message.to);
                }
                Err(e) => {
                    metrics.record_notification(false);
                    warn!("Notification to {} failed: {}", message.to, e);
                }
            }
        });
    }
}
