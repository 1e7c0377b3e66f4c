use glam::{Vec2, Vec3};

/// Orbit pitch stays short of the poles, where the basis degenerates.
const MAX_ORBIT_PITCH: f32 = 89.0 * std::f32::consts::PI / 180.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraMode {
    Perspective,
    Orthographic,
}

/// Half-line in world space; `dir` is unit length.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    pub origin: Vec3,
    pub dir: Vec3,
}

impl Ray {
    pub fn new(origin: Vec3, dir: Vec3) -> Self {
        Self {
            origin,
            dir: dir.normalize_or_zero(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Camera {
    pub eye: Vec3,
    pub forward: Vec3,
    pub right: Vec3,
    pub up: Vec3,
    pub aspect: f32,
    pub fovy: f32,
    pub mode: CameraMode,
    pub ortho_half_h: f32,
}

impl Camera {
    /// Perspective camera at `eye` looking at `target`, world up +Y.
    pub fn look_at(eye: Vec3, target: Vec3, fovy_degrees: f32, aspect: f32) -> Self {
        let forward = (target - eye).normalize_or_zero();
        let right = forward.cross(Vec3::Y).normalize_or_zero();
        let up = right.cross(forward);
        let fovy = fovy_degrees.to_radians();

        Camera {
            eye,
            forward,
            right,
            up,
            aspect: if aspect > 0.0 { aspect } else { 1.0 },
            fovy,
            mode: CameraMode::Perspective,
            ortho_half_h: (0.5 * fovy).tan() * (target - eye).length(),
        }
    }

    /// Camera orbiting `target` at `distance`; yaw and pitch in radians,
    /// yaw 0 and pitch 0 looking down -Z.
    pub fn orbit(target: Vec3, distance: f32, yaw: f32, pitch: f32, fovy_degrees: f32, aspect: f32) -> Self {
        let pitch = pitch.clamp(-MAX_ORBIT_PITCH, MAX_ORBIT_PITCH);
        let (sy, cy) = yaw.sin_cos();
        let (sp, cp) = pitch.sin_cos();
        let offset = Vec3::new(cp * sy, sp, cp * cy) * distance.max(f32::EPSILON);
        Self::look_at(target + offset, target, fovy_degrees, aspect)
    }

    pub fn with_mode(mut self, mode: CameraMode) -> Self {
        self.mode = mode;
        self
    }

    /// Ray through a point in normalized device coordinates.
    ///
    /// Returns `None` when the camera basis is degenerate (eye on target or
    /// looking straight along world up).
    pub fn ray_from_ndc(&self, ndc: Vec2) -> Option<Ray> {
        if self.forward == Vec3::ZERO || self.right == Vec3::ZERO {
            return None;
        }

        match self.mode {
            CameraMode::Perspective => {
                let half_h = (0.5 * self.fovy).tan();
                let half_w = half_h * self.aspect;

                let dir = self.forward
                    + self.right * (ndc.x * half_w)
                    + self.up * (ndc.y * half_h);

                Some(Ray::new(self.eye, dir))
            }
            CameraMode::Orthographic => {
                let half_h = self.ortho_half_h;
                let half_w = half_h * self.aspect;
                let origin = self.eye
                    + self.right * (ndc.x * half_w)
                    + self.up * (ndc.y * half_h);
                Some(Ray::new(origin, self.forward))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_center_ray_follows_forward() {
        let camera = Camera::look_at(Vec3::new(0.0, 0.0, 10.0), Vec3::ZERO, 50.0, 1.5);
        let ray = camera.ray_from_ndc(Vec2::ZERO).unwrap();

        assert_eq!(ray.origin, Vec3::new(0.0, 0.0, 10.0));
        assert!((ray.dir - Vec3::NEG_Z).length() < 1e-5);
    }

    #[test]
    fn test_top_right_ray_tilts_up_and_right() {
        let camera = Camera::look_at(Vec3::new(0.0, 0.0, 10.0), Vec3::ZERO, 50.0, 1.0);
        let ray = camera.ray_from_ndc(Vec2::new(1.0, 1.0)).unwrap();
        assert!(ray.dir.x > 0.0);
        assert!(ray.dir.y > 0.0);
        assert!(ray.dir.z < 0.0);
    }

    #[test]
    fn test_orthographic_rays_are_parallel() {
        let camera = Camera::orbit(Vec3::ZERO, 10.0, 0.0, 0.0, 45.0, 1.0).with_mode(CameraMode::Orthographic);
        let a = camera.ray_from_ndc(Vec2::new(-0.5, 0.0)).unwrap();
        let b = camera.ray_from_ndc(Vec2::new(0.5, 0.0)).unwrap();

        assert!((a.dir - b.dir).length() < 1e-6);
        assert!(a.origin.x < b.origin.x);
    }

    #[test]
    fn test_orbit_positions_eye_around_target() {
        let target = Vec3::new(0.0, 2.0, 0.0);
        let front = Camera::orbit(target, 10.0, 0.0, 0.0, 50.0, 1.0);
        assert!((front.eye - Vec3::new(0.0, 2.0, 10.0)).length() < 1e-5);

        let side = Camera::orbit(target, 10.0, std::f32::consts::FRAC_PI_2, 0.0, 50.0, 1.0);
        assert!((side.eye - Vec3::new(10.0, 2.0, 0.0)).length() < 1e-4);

        let overhead = Camera::orbit(target, 10.0, 0.0, std::f32::consts::FRAC_PI_2, 50.0, 1.0);
        assert!(overhead.ray_from_ndc(Vec2::ZERO).is_some());
    }

    #[test]
    fn test_degenerate_camera_has_no_ray() {
        let camera = Camera::look_at(Vec3::ONE, Vec3::ONE, 50.0, 1.0);
        assert!(camera.ray_from_ndc(Vec2::ZERO).is_none());
    }
}
