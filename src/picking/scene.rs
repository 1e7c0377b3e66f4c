//! Pickable scene graph
//!
//! Nodes carry a local transform, an optional shape and the `pickable` tag.
//! Decorative nodes participate in intersection but can never be the result
//! of a pick.

use glam::{Mat4, Vec3};

use super::camera::Ray;

const EPSILON: f32 = 1.0e-6;

#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    /// Sphere centered on the local origin
    Sphere { radius: f32 },
    /// Axis-aligned box centered on the local origin
    Cuboid { half_extents: Vec3 },
    /// Triangle soup, double-sided
    Triangles(Vec<[Vec3; 3]>),
}

impl Shape {
    /// Cone centered on the local origin: base at `-height/2`, apex at `+height/2`.
    pub fn cone(radius: f32, height: f32, segments: usize) -> Self {
        let segments = segments.max(3);
        let apex = Vec3::new(0.0, height * 0.5, 0.0);
        let base_center = Vec3::new(0.0, -height * 0.5, 0.0);
        let rim: Vec<Vec3> = (0..segments)
            .map(|i| {
                let a = i as f32 / segments as f32 * std::f32::consts::TAU;
                Vec3::new(radius * a.cos(), -height * 0.5, radius * a.sin())
            })
            .collect();

        let mut triangles = Vec::with_capacity(segments * 2);
        for i in 0..segments {
            let a = rim[i];
            let b = rim[(i + 1) % segments];
            triangles.push([a, b, apex]);
            triangles.push([b, a, base_center]);
        }
        Shape::Triangles(triangles)
    }

    /// Nearest positive ray parameter in local space.
    fn intersect(&self, origin: Vec3, dir: Vec3) -> Option<f32> {
        match self {
            Shape::Sphere { radius } => intersect_sphere(origin, dir, *radius),
            Shape::Cuboid { half_extents } => intersect_cuboid(origin, dir, *half_extents),
            Shape::Triangles(triangles) => triangles
                .iter()
                .filter_map(|tri| intersect_triangle(origin, dir, tri))
                .min_by(f32::total_cmp),
        }
    }
}

fn intersect_sphere(origin: Vec3, dir: Vec3, radius: f32) -> Option<f32> {
    let a = dir.dot(dir);
    if a <= EPSILON {
        return None;
    }
    let b = origin.dot(dir);
    let c = origin.dot(origin) - radius * radius;
    let disc = b * b - a * c;
    if disc < 0.0 {
        return None;
    }

    let sqrt_disc = disc.sqrt();
    let near = (-b - sqrt_disc) / a;
    if near > EPSILON {
        return Some(near);
    }
    let far = (-b + sqrt_disc) / a;
    (far > EPSILON).then_some(far)
}

fn intersect_cuboid(origin: Vec3, dir: Vec3, half: Vec3) -> Option<f32> {
    let mut t_min = f32::NEG_INFINITY;
    let mut t_max = f32::INFINITY;

    for axis in 0..3 {
        let (o, d, h) = (origin[axis], dir[axis], half[axis]);
        if d.abs() <= EPSILON {
            if o < -h || o > h {
                return None;
            }
            continue;
        }
        let t1 = (-h - o) / d;
        let t2 = (h - o) / d;
        t_min = t_min.max(t1.min(t2));
        t_max = t_max.min(t1.max(t2));
        if t_min > t_max {
            return None;
        }
    }

    if t_min > EPSILON {
        Some(t_min)
    } else if t_max > EPSILON {
        Some(t_max)
    } else {
        None
    }
}

// Möller–Trumbore
fn intersect_triangle(origin: Vec3, dir: Vec3, tri: &[Vec3; 3]) -> Option<f32> {
    let edge1 = tri[1] - tri[0];
    let edge2 = tri[2] - tri[0];
    let p = dir.cross(edge2);
    let det = edge1.dot(p);
    if det.abs() <= EPSILON {
        return None;
    }

    let inv_det = 1.0 / det;
    let s = origin - tri[0];
    let u = s.dot(p) * inv_det;
    if !(0.0..=1.0).contains(&u) {
        return None;
    }
    let q = s.cross(edge1);
    let v = dir.dot(q) * inv_det;
    if v < 0.0 || u + v > 1.0 {
        return None;
    }

    let t = edge2.dot(q) * inv_det;
    (t > EPSILON).then_some(t)
}

#[derive(Debug, Clone, PartialEq)]
pub struct SceneNode {
    pub id: String,
    pub transform: Mat4,
    pub shape: Option<Shape>,
    pub pickable: bool,
    pub children: Vec<SceneNode>,
}

impl SceneNode {
    /// Shapeless node used to group and transform children
    pub fn group(id: &str) -> Self {
        Self {
            id: id.to_string(),
            transform: Mat4::IDENTITY,
            shape: None,
            pickable: false,
            children: Vec::new(),
        }
    }

    pub fn mesh(id: &str, shape: Shape) -> Self {
        Self {
            shape: Some(shape),
            ..Self::group(id)
        }
    }

    pub fn pickable(mut self) -> Self {
        self.pickable = true;
        self
    }

    pub fn with_transform(mut self, transform: Mat4) -> Self {
        self.transform = transform;
        self
    }

    pub fn at(self, translation: Vec3) -> Self {
        self.with_transform(Mat4::from_translation(translation))
    }

    pub fn with_child(mut self, child: SceneNode) -> Self {
        self.children.push(child);
        self
    }
}

/// One ray/surface intersection in world space
#[derive(Debug, Clone, PartialEq)]
pub struct Hit {
    pub node_id: String,
    pub distance: f32,
    pub point: Vec3,
    pub pickable: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Scene {
    pub root: SceneNode,
}

impl Scene {
    pub fn new(root: SceneNode) -> Self {
        Self { root }
    }

    /// Every intersection along the ray, nearest first.
    pub fn intersect_all(&self, ray: &Ray) -> Vec<Hit> {
        let mut hits = Vec::new();
        collect_hits(&self.root, Mat4::IDENTITY, ray, &mut hits);
        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        hits
    }

    /// World point expressed in the root node's local frame.
    pub fn to_scene_space(&self, world: Vec3) -> Vec3 {
        self.root.transform.inverse().transform_point3(world)
    }
}

fn collect_hits(node: &SceneNode, parent: Mat4, ray: &Ray, hits: &mut Vec<Hit>) {
    let world = parent * node.transform;

    if let Some(shape) = &node.shape {
        let inverse = world.inverse();
        if inverse.is_finite() {
            let local_origin = inverse.transform_point3(ray.origin);
            let local_dir = inverse.transform_vector3(ray.dir);
            if let Some(t) = shape.intersect(local_origin, local_dir) {
                let point = world.transform_point3(local_origin + local_dir * t);
                let distance = (point - ray.origin).dot(ray.dir);
                if distance > 0.0 {
                    hits.push(Hit {
                        node_id: node.id.clone(),
                        distance,
                        point,
                        pickable: node.pickable,
                    });
                }
            }
        }
    }

    for child in &node.children {
        collect_hits(child, world, ray, hits);
    }
}
