//! 内存后端
//!
//! 实现全部外部接口，写入/删除时通过内置的变更订阅发出信号。
//! 非特权读取会省略便签正文，与行级安全策略下的真实后端一致。

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use tokio::sync::broadcast;

use crate::error::{AppError, Result};
use crate::models::annotation::{Annotation, NewAnnotation};
use crate::models::identity::Identity;
use crate::models::notification::Notification;
use crate::realtime::feed::{BroadcastChangeFeed, ChangeFeed, ChangeKind, ChangeSignal};
use crate::storage::repository::{AnnotationRepository, IdentityRepository, Notifier};

pub struct InMemoryBackend {
    notes: RwLock<Vec<Annotation>>,
    identities: RwLock<Vec<Identity>>,
    outbox: RwLock<Vec<Notification>>,
    feed: BroadcastChangeFeed,
    table: String,
    privileged: AtomicBool,
    available: AtomicBool,
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self {
            notes: RwLock::new(Vec::new()),
            identities: RwLock::new(Vec::new()),
            outbox: RwLock::new(Vec::new()),
            feed: BroadcastChangeFeed::new(64),
            table: "notes".to_string(),
            privileged: AtomicBool::new(false),
            available: AtomicBool::new(true),
        }
    }

    /// Whether reads include note text
    pub fn set_privileged(&self, privileged: bool) {
        self.privileged.store(privileged, Ordering::SeqCst);
    }

    /// Simulate an outage: every call fails with a connection error
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn ensure_available(&self) -> Result<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(AppError::Connection("backend unavailable".to_string()))
        }
    }

    /// Insert or replace an identity without uniqueness checks
    pub fn put_identity(&self, identity: Identity) {
        let mut identities = self.identities.write();
        identities.retain(|i| i.id != identity.id);
        identities.push(identity);
    }

    /// Create an identity, enforcing display-name uniqueness
    pub fn create_identity(&self, identity: Identity) -> Result<Identity> {
        let mut identities = self.identities.write();
        if identities.iter().any(|i| i.id == identity.id) {
            return Err(AppError::Conflict(format!("identity {} exists", identity.id)));
        }
        if identities
            .iter()
            .any(|i| i.display_name == identity.display_name)
        {
            return Err(AppError::Conflict(format!(
                "username {} is taken",
                identity.display_name
            )));
        }
        identities.push(identity.clone());
        Ok(identity)
    }

    /// Store a note written by another client and signal the change
    pub fn insert_remote(&self, annotation: Annotation) {
        self.notes.write().push(annotation);
        self.feed
            .publish(ChangeSignal::new(&self.table, ChangeKind::Insert));
    }

    /// Delete a note and signal the change; returns whether it existed
    pub fn delete(&self, id: &str) -> bool {
        let removed = {
            let mut notes = self.notes.write();
            let before = notes.len();
            notes.retain(|n| n.id != id);
            before != notes.len()
        };
        if removed {
            self.feed
                .publish(ChangeSignal::new(&self.table, ChangeKind::Delete));
        }
        removed
    }

    pub fn note_count(&self) -> usize {
        self.notes.read().len()
    }

    /// Notifications accepted so far
    pub fn outbox(&self) -> Vec<Notification> {
        self.outbox.read().clone()
    }

    pub fn feed(&self) -> &BroadcastChangeFeed {
        &self.feed
    }
}

#[async_trait]
impl AnnotationRepository for InMemoryBackend {
    async fn insert(&self, note: &NewAnnotation) -> Result<Annotation> {
        self.ensure_available()?;

        let created = Annotation {
            id: uuid::Uuid::new_v4().to_string(),
            author_id: note.author_id.clone(),
            x: note.x,
            y: note.y,
            z: note.z,
            text: Some(note.text.clone()),
            created_at: Utc::now(),
        };
        self.notes.write().push(created.clone());
        self.feed
            .publish(ChangeSignal::new(&self.table, ChangeKind::Insert));
        Ok(created)
    }

    async fn fetch_all(&self) -> Result<Vec<Annotation>> {
        self.ensure_available()?;

        let privileged = self.privileged.load(Ordering::SeqCst);
        let mut notes: Vec<Annotation> = self
            .notes
            .read()
            .iter()
            .cloned()
            .map(|mut n| {
                if !privileged {
                    n.text = None;
                }
                n
            })
            .collect();
        notes.sort_by(Annotation::newest_first);
        Ok(notes)
    }
}

#[async_trait]
impl IdentityRepository for InMemoryBackend {
    async fn fetch_by_ids(&self, ids: &[String]) -> Result<Vec<Identity>> {
        self.ensure_available()?;

        Ok(self
            .identities
            .read()
            .iter()
            .filter(|i| ids.contains(&i.id))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl Notifier for InMemoryBackend {
    async fn send(&self, notification: &Notification) -> Result<()> {
        self.ensure_available()?;
        self.outbox.write().push(notification.clone());
        Ok(())
    }
}

impl ChangeFeed for InMemoryBackend {
    fn subscribe(&self) -> broadcast::Receiver<ChangeSignal> {
        self.feed.subscribe()
    }
}
