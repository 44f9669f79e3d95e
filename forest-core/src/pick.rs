//! Screen-space picking.
//!
//! A [`View`] turns a pointer position into a world ray by unprojecting
//! the near and far planes; the registry then resolves that ray to the
//! nearest instance and its owning tree.

use crate::geometry::Ray;
use crate::registry::{InstanceRegistry, PickHit};
use crate::render::InstanceRenderer;
use crate::types::TreeId;
use glam::{Mat4, Vec2, Vec3, Vec4};

/// Camera state needed to build pick rays.
///
/// `view_proj` follows glam's `perspective_rh` convention (NDC depth in
/// `[0, 1]`). Screen coordinates are pixels from the top-left corner of
/// the viewport.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct View {
    pub view_proj: Mat4,
    pub viewport: Vec2,
}

impl View {
    pub fn new(view_proj: Mat4, viewport: Vec2) -> Self {
        Self {
            view_proj,
            viewport,
        }
    }

    /// Normalized device coordinates of a screen point.
    pub fn screen_to_ndc(&self, screen: Vec2) -> Vec2 {
        Vec2::new(
            2.0 * screen.x / self.viewport.x - 1.0,
            1.0 - 2.0 * screen.y / self.viewport.y,
        )
    }

    /// Projects a world point to the screen, or `None` if it is behind
    /// the camera.
    pub fn world_to_screen(&self, p: Vec3) -> Option<Vec2> {
        let clip = self.view_proj * p.extend(1.0);
        if clip.w <= 1e-6 {
            return None;
        }
        let ndc = clip.truncate() / clip.w;
        Some(Vec2::new(
            (ndc.x + 1.0) * 0.5 * self.viewport.x,
            (1.0 - ndc.y) * 0.5 * self.viewport.y,
        ))
    }

    /// World ray through `screen`, or `None` for an empty viewport or a
    /// singular projection.
    pub fn ray(&self, screen: Vec2) -> Option<Ray> {
        if self.viewport.x <= 0.0 || self.viewport.y <= 0.0 {
            return None;
        }
        if self.view_proj.determinant().abs() < f32::EPSILON {
            return None;
        }
        let inv = self.view_proj.inverse();
        let ndc = self.screen_to_ndc(screen);

        let unproject = |z: f32| {
            let p: Vec4 = inv * Vec4::new(ndc.x, ndc.y, z, 1.0);
            (p.w.abs() > 1e-9).then(|| p.truncate() / p.w)
        };
        let near = unproject(0.0)?;
        let far = unproject(1.0)?;
        Ray::new(near, far - near)
    }
}

/// Nearest pickable instance under `screen`.
pub fn pick<R: InstanceRenderer + ?Sized>(
    registry: &InstanceRegistry,
    renderer: &R,
    view: &View,
    screen: Vec2,
    is_pickable: impl Fn(TreeId) -> bool,
) -> Option<PickHit> {
    let ray = view.ray(screen)?;
    registry.pick_nearest(&ray, renderer, is_pickable)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view() -> View {
        let proj = Mat4::perspective_rh(60f32.to_radians(), 4.0 / 3.0, 0.1, 200.0);
        let look = Mat4::look_at_rh(Vec3::new(0.0, 5.0, 20.0), Vec3::ZERO, Vec3::Y);
        View::new(proj * look, Vec2::new(800.0, 600.0))
    }

    #[test]
    fn center_ray_points_at_target() {
        let v = view();
        let ray = v.ray(Vec2::new(400.0, 300.0)).expect("ray");
        let to_target = (Vec3::ZERO - Vec3::new(0.0, 5.0, 20.0)).normalize();
        assert!(ray.dir.dot(to_target) > 0.9999);
    }

    #[test]
    fn ray_through_projected_point_passes_near_it() {
        let v = view();
        for p in [Vec3::new(3.0, 1.0, -2.0), Vec3::new(-6.0, 0.0, 4.0)] {
            let screen = v.world_to_screen(p).expect("in front");
            let ray = v.ray(screen).expect("ray");
            let t = (p - ray.origin).dot(ray.dir);
            let closest = ray.at(t);
            assert!((closest - p).length() < 1e-2, "p={p:?} closest={closest:?}");
        }
    }

    #[test]
    fn degenerate_views_yield_no_ray() {
        let mut v = view();
        v.viewport = Vec2::ZERO;
        assert!(v.ray(Vec2::ZERO).is_none());

        let singular = View::new(Mat4::ZERO, Vec2::new(10.0, 10.0));
        assert!(singular.ray(Vec2::new(5.0, 5.0)).is_none());
    }

    #[test]
    fn points_behind_camera_do_not_project() {
        assert!(view().world_to_screen(Vec3::new(0.0, 5.0, 40.0)).is_none());
    }
}
