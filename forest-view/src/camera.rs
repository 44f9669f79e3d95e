use forest_core::pick::View;
use glam::{Mat4, Vec2, Vec3};

/// Camera circling a target point.
///
/// `yaw` turns around world up, `pitch` tilts above the horizon and
/// `distance` is measured from `target` to the eye.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OrbitCamera {
    pub target: Vec3,
    pub yaw: f32,
    pub pitch: f32,
    pub distance: f32,
    pub fov_y: f32,
}

impl Default for OrbitCamera {
    fn default() -> Self {
        Self {
            target: Vec3::new(0.0, 2.0, 0.0),
            yaw: 0.6,
            pitch: 0.45,
            distance: 60.0,
            fov_y: 55f32.to_radians(),
        }
    }
}

impl OrbitCamera {
    pub const MIN_DISTANCE: f32 = 3.0;
    pub const MAX_DISTANCE: f32 = 400.0;
    const NEAR: f32 = 0.1;
    const FAR: f32 = 1000.0;

    pub fn eye(&self) -> Vec3 {
        let (sy, cy) = self.yaw.sin_cos();
        let (sp, cp) = self.pitch.sin_cos();
        self.target + Vec3::new(sy * cp, sp, cy * cp) * self.distance
    }

    pub fn view_proj(&self, aspect: f32) -> Mat4 {
        let proj = Mat4::perspective_rh(self.fov_y, aspect.max(1e-3), Self::NEAR, Self::FAR);
        let view = Mat4::look_at_rh(self.eye(), self.target, Vec3::Y);
        proj * view
    }

    /// Pick view for a viewport of `size` pixels.
    pub fn view(&self, size: Vec2) -> View {
        let aspect = if size.y > 0.0 { size.x / size.y } else { 1.0 };
        View::new(self.view_proj(aspect), size)
    }

    /// Pixels per world unit at unit depth for a viewport `height` pixels tall.
    pub fn focal_px(&self, height: f32) -> f32 {
        height / (2.0 * (self.fov_y * 0.5).tan())
    }

    /// Applies a pointer drag in pixels.
    pub fn orbit(&mut self, delta: Vec2) {
        self.yaw -= delta.x * 0.005;
        self.pitch = (self.pitch + delta.y * 0.005).clamp(0.05, 1.5);
    }

    /// Applies a scroll amount; positive values move closer.
    pub fn zoom(&mut self, scroll: f32) {
        let factor = (1.0 - scroll * 0.001).clamp(0.5, 2.0);
        self.distance = (self.distance * factor).clamp(Self::MIN_DISTANCE, Self::MAX_DISTANCE);
    }
}
