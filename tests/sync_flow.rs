// End-to-end flows: pick -> write -> optimistic view -> feed-driven reconcile.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use glam::Vec3;
use serde_json::json;
use tokio::sync::{Notify, watch};
use tree_notes::app_state::AppState;
use tree_notes::config::AppConfig;
use tree_notes::error::{AppError, Result};
use tree_notes::models::annotation::{Annotation, NewAnnotation, ScenePoint};
use tree_notes::models::identity::{Identity, SessionUser, UNKNOWN_AUTHOR};
use tree_notes::picking::{Camera, PointerEvent, Scene, SceneNode, Shape, Viewport, pick};
use tree_notes::services::annotation_store::{AnnotationStore, ReconcileOutcome};
use tree_notes::observability::SyncMetrics;
use tree_notes::storage::memory::InMemoryBackend;
use tree_notes::storage::repository::{AnnotationRepository, StaticSession};
use tree_notes::storage::rest::RestBackend;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn signed_in(email: Option<&str>) -> Arc<StaticSession> {
    let mut user = SessionUser::new("u1");
    if let Some(email) = email {
        user = user.with_email(email);
    }
    Arc::new(StaticSession::signed_in(user))
}

fn tree_scene() -> Scene {
    let tree = SceneNode::group("tree")
        .with_child(
            SceneNode::mesh("foliage", Shape::cone(2.0, 4.0, 24))
                .pickable()
                .at(Vec3::new(0.0, 2.0, 0.0)),
        )
        .with_child(
            SceneNode::mesh("trunk", Shape::Cuboid { half_extents: Vec3::new(0.3, 0.5, 0.3) })
                .pickable()
                .at(Vec3::new(0.0, -0.5, 0.0)),
        );
    Scene::new(SceneNode::group("root").with_child(tree))
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
async fn test_pick_then_submit_shows_marker_first() {
    let backend = Arc::new(InMemoryBackend::new());
    let state = AppState::in_memory(AppConfig::development(), backend.clone(), signed_in(None));

    let viewport = Viewport::new(0.0, 0.0, 800.0, 600.0);
    let camera = Camera::orbit(Vec3::new(0.0, 2.0, 0.0), 10.0, 0.0, 0.0, 50.0, viewport.aspect());
    let hit = pick(PointerEvent::new(410.0, 290.0), &viewport, &camera, &tree_scene())
        .expect("pointer over the tree hits the foliage");
    assert_eq!(hit.surface_id, "foliage");

    let created = state.submit_pick(&hit, "  merry  ").await.unwrap();
    state.profiles.resolve_all(state.store.author_ids()).await;

    let markers = state.markers();
    assert_eq!(markers[0].annotation.id, created.id);
    assert_eq!(markers[0].annotation.text.as_deref(), Some("merry"));
    assert_eq!(markers[0].author_label, UNKNOWN_AUTHOR);
    assert_eq!(backend.note_count(), 1);
}

#[tokio::test]
async fn test_submit_known_point_lands_at_index_zero() {
    let backend = Arc::new(InMemoryBackend::new());
    backend.insert_remote(Annotation {
        id: "older".into(),
        author_id: "u2".into(),
        x: 0.0,
        y: 0.0,
        z: 0.0,
        text: None,
        created_at: Utc::now() - chrono::Duration::minutes(5),
    });
    let state = AppState::in_memory(AppConfig::development(), backend, signed_in(None));
    state.store.reconcile_from_feed().await;

    state
        .pipeline
        .submit("u1", ScenePoint::new(1.0, 2.0, 3.0), "hi")
        .await
        .unwrap();
    state.profiles.resolve_all(state.store.author_ids()).await;

    let markers = state.markers();
    assert_eq!(markers.len(), 2);
    assert_eq!(markers[0].annotation.position(), ScenePoint::new(1.0, 2.0, 3.0));
    assert_eq!(markers[0].author_label, "Unknown");
    assert_eq!(markers[1].annotation.id, "older");
}

#[tokio::test]
async fn test_other_clients_writes_arrive_through_the_feed() {
    let backend = Arc::new(InMemoryBackend::new());
    backend.put_identity(Identity::new("u2", "santa"));
    let state = AppState::in_memory(AppConfig::development(), backend.clone(), signed_in(None));

    let (shutdown, rx) = watch::channel(false);
    let driver = state.sync_driver().spawn(&*backend, rx);
    assert!(wait_until(|| state.store.is_loaded()).await);

    backend.insert_remote(Annotation {
        id: "remote".into(),
        author_id: "u2".into(),
        x: 0.5,
        y: 3.0,
        z: 0.5,
        text: None,
        created_at: Utc::now(),
    });

    assert!(wait_until(|| state.markers().first().map(|m| m.author_label.as_str()) == Some("santa")).await);
    let marker = &state.markers()[0];
    assert_eq!(marker.annotation.id, "remote");
    assert_eq!(marker.annotation.text_or_placeholder(), "(unavailable)");

    shutdown.send(true).unwrap();
    driver.await.unwrap();
}

#[tokio::test]
async fn test_transport_failure_leaves_view_and_sends_nothing() {
    let backend = Arc::new(InMemoryBackend::new());
    let state = AppState::in_memory(
        AppConfig::development(),
        backend.clone(),
        signed_in(Some("u1@tree.test")),
    );
    state.store.reconcile_from_feed().await;
    let before = state.store.current_annotations();

    backend.set_available(false);
    let err = state
        .pipeline
        .submit("u1", ScenePoint::new(1.0, 2.0, 3.0), "hi")
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Connection(_)));
    assert_eq!(state.store.current_annotations(), before);
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(backend.outbox().is_empty());
    assert_eq!(state.metrics.snapshot().write_failures, 1);
}

#[tokio::test]
async fn test_notification_reaches_outbox() {
    let backend = Arc::new(InMemoryBackend::new());
    backend.put_identity(Identity::new("u1", "elf"));
    let state = AppState::in_memory(
        AppConfig::development(),
        backend.clone(),
        signed_in(Some("u1@tree.test")),
    );
    state.profiles.resolve_all(["u1"]).await;

    state
        .pipeline
        .submit("u1", ScenePoint::new(0.0, 1.0, 0.0), "ho ho")
        .await
        .unwrap();

    assert!(wait_until(|| !backend.outbox().is_empty()).await);
    let sent = &backend.outbox()[0];
    assert_eq!(sent.to, "u1@tree.test");
    assert!(sent.html.contains("elf"));
}

/// Blocks the first fetch until released so signals can pile up behind it.
struct GatedRepository {
    fetches: AtomicUsize,
    started: Notify,
    release: Notify,
}

#[async_trait]
impl AnnotationRepository for GatedRepository {
    async fn insert(&self, _note: &NewAnnotation) -> Result<Annotation> {
        Err(AppError::Internal("read-only".into()))
    }

    async fn fetch_all(&self) -> Result<Vec<Annotation>> {
        let n = self.fetches.fetch_add(1, Ordering::SeqCst);
        if n == 0 {
            self.started.notify_one();
            self.release.notified().await;
        }
        Ok(vec![])
    }
}

#[tokio::test]
async fn test_two_signals_in_flight_cause_one_extra_fetch() {
    let repo = Arc::new(GatedRepository {
        fetches: AtomicUsize::new(0),
        started: Notify::new(),
        release: Notify::new(),
    });
    let store = Arc::new(AnnotationStore::new(repo.clone(), Arc::new(SyncMetrics::default())));

    let first = {
        let store = store.clone();
        tokio::spawn(async move { store.reconcile_from_feed().await })
    };
    repo.started.notified().await;

    assert_eq!(store.reconcile_from_feed().await, ReconcileOutcome::Coalesced);
    assert_eq!(store.reconcile_from_feed().await, ReconcileOutcome::Coalesced);
    repo.release.notify_one();

    assert_eq!(first.await.unwrap(), ReconcileOutcome::Applied { count: 0 });
    assert_eq!(repo.fetches.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_rest_backend_end_to_end() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/notes"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": "n1",
            "user_id": "u1",
            "x": 1.0,
            "y": 2.0,
            "z": 3.0,
            "text": "hi",
            "created_at": "2025-12-24T10:00:00Z"
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/functions/v1/send-note-email"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = AppConfig::development();
    config.backend.url = server.uri();
    let backend = Arc::new(RestBackend::new(config.backend.clone(), &config.notification).unwrap());
    let state = AppState::new(
        config,
        backend.clone(),
        backend.clone(),
        backend,
        signed_in(Some("u1@tree.test")),
    );

    let created = state
        .pipeline
        .submit("u1", ScenePoint::new(1.0, 2.0, 3.0), "hi")
        .await
        .unwrap();
    assert_eq!(created.id, "n1");
    assert_eq!(state.markers()[0].annotation.id, "n1");

    assert!(wait_until(|| state.metrics.snapshot().notifications_sent == 1).await);
}
