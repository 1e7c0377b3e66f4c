//! Spatial picking
//!
//! Turns a pointer event into a point on a pickable surface:
//! pixel → NDC (via the viewport's bounding rectangle) → camera ray →
//! nearest pickable intersection → canonical scene space.
//!
//! Picking is synchronous and never fails; "no hit" is `None`.

pub mod camera;
pub mod scene;

use glam::{Vec2, Vec3};
use serde::{Deserialize, Serialize};

use crate::models::annotation::ScenePoint;

pub use camera::{Camera, CameraMode, Ray};
pub use scene::{Hit, Scene, SceneNode, Shape};

/// Pointer position in client (page) pixels
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PointerEvent {
    pub client_x: f32,
    pub client_y: f32,
}

impl PointerEvent {
    pub fn new(client_x: f32, client_y: f32) -> Self {
        Self { client_x, client_y }
    }
}

/// Bounding rectangle of the rendering surface in client pixels
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub left: f32,
    pub top: f32,
    pub width: f32,
    pub height: f32,
}

impl Viewport {
    pub fn new(left: f32, top: f32, width: f32, height: f32) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    pub fn aspect(&self) -> f32 {
        if self.height > 0.0 {
            self.width / self.height
        } else {
            1.0
        }
    }

    /// Normalized device coordinates in [-1, 1], y up.
    ///
    /// `None` for a degenerate rectangle or a pointer outside it.
    pub fn to_ndc(&self, pointer: PointerEvent) -> Option<Vec2> {
        if self.width <= 0.0 || self.height <= 0.0 {
            return None;
        }

        let x = ((pointer.client_x - self.left) / self.width) * 2.0 - 1.0;
        let y = -((pointer.client_y - self.top) / self.height) * 2.0 + 1.0;

        if !(-1.0..=1.0).contains(&x) || !(-1.0..=1.0).contains(&y) {
            return None;
        }
        Some(Vec2::new(x, y))
    }
}

/// Point struck on a pickable surface
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PickResult {
    /// Hit point in the scene root's frame
    pub point: ScenePoint,
    /// Id of the surface struck
    pub surface_id: String,
    /// Distance along the ray from the camera
    pub distance: f32,
}

/// Nearest pickable intersection under the pointer.
///
/// Non-pickable geometry never shadows a pickable surface behind it.
pub fn pick(
    pointer: PointerEvent,
    viewport: &Viewport,
    camera: &Camera,
    scene: &Scene,
) -> Option<PickResult> {
    let ndc = viewport.to_ndc(pointer)?;
    let ray = camera.ray_from_ndc(ndc)?;
    pick_along(&ray, scene)
}

/// Same as [`pick`] for an already constructed ray.
pub fn pick_along(ray: &Ray, scene: &Scene) -> Option<PickResult> {
    let hit = scene.intersect_all(ray).into_iter().find(|hit| hit.pickable)?;
    let local: Vec3 = scene.to_scene_space(hit.point);

    tracing::trace!(surface = %hit.node_id, distance = hit.distance, "pick hit");
    Some(PickResult {
        point: ScenePoint::from(local),
        surface_id: hit.node_id,
        distance: hit.distance,
    })
}
