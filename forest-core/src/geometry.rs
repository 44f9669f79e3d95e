//! Instance transform construction and ray tests against the unit
//! primitives those transforms place.
//!
//! Branches use a cylinder of radius 1 spanning `y ∈ [-0.5, 0.5]`;
//! leaves use a sphere of radius 1. Both are centred on the origin.

use glam::{Mat4, Quat, Vec3};

/// Shortest segment a branch transform will encode.
pub const MIN_SEGMENT_LENGTH: f32 = 1e-4;

/// Builds the transform that stretches the unit cylinder from `a` to `b`.
///
/// The cylinder is scaled to `(radius, |b - a|, radius)`, rotated so its
/// long axis follows `b - a` and translated to the midpoint. Segments
/// shorter than [`MIN_SEGMENT_LENGTH`] keep that minimum length and
/// point straight up.
pub fn branch_transform(a: Vec3, b: Vec3, radius: f32) -> Mat4 {
    let delta = b - a;
    let len = delta.length();

    let (dir, len) = if len < MIN_SEGMENT_LENGTH {
        (Vec3::Y, MIN_SEGMENT_LENGTH)
    } else {
        (delta / len, len)
    };

    let rotation = Quat::from_rotation_arc(Vec3::Y, dir);
    let midpoint = (a + b) * 0.5;
    Mat4::from_scale_rotation_translation(Vec3::new(radius, len, radius), rotation, midpoint)
}

/// Builds the transform that scales the unit sphere to `size` at `pos`.
pub fn leaf_transform(pos: Vec3, size: f32) -> Mat4 {
    Mat4::from_scale_rotation_translation(Vec3::splat(size), Quat::IDENTITY, pos)
}

/// World-space endpoints of a branch instance's long axis.
pub fn branch_endpoints(transform: &Mat4) -> (Vec3, Vec3) {
    (
        transform.transform_point3(Vec3::new(0.0, -0.5, 0.0)),
        transform.transform_point3(Vec3::new(0.0, 0.5, 0.0)),
    )
}

/// A half-line `origin + t * dir` for `t >= 0`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Ray {
    pub origin: Vec3,
    pub dir: Vec3,
}

impl Ray {
    /// Creates a ray with a normalized direction, or `None` if `dir` is
    /// zero or not finite.
    pub fn new(origin: Vec3, dir: Vec3) -> Option<Self> {
        let dir = dir.try_normalize()?;
        Some(Self { origin, dir })
    }

    #[inline]
    pub fn at(&self, t: f32) -> Vec3 {
        self.origin + self.dir * t
    }

    /// Expresses this ray in the local space of `transform`.
    ///
    /// The local direction is not renormalized, so a parameter `t` found
    /// locally is the same world-space distance along `self`. Returns `None`
    /// only for a singular transform; thin but valid instances stay hittable.
    pub fn to_local(&self, transform: &Mat4) -> Option<Ray> {
        if transform.determinant() == 0.0 {
            return None;
        }
        let inv = transform.inverse();
        if !inv.is_finite() {
            return None;
        }
        Some(Ray {
            origin: inv.transform_point3(self.origin),
            dir: inv.transform_vector3(self.dir),
        })
    }

    /// Parameter at which the ray meets the horizontal plane `y = height`.
    pub fn hit_plane_y(&self, height: f32) -> Option<f32> {
        if self.dir.y.abs() < 1e-6 {
            return None;
        }
        let t = (height - self.origin.y) / self.dir.y;
        (t >= 0.0).then_some(t)
    }
}

/// Both parameters at which `o + t d` crosses the unit sphere, smaller first.
///
/// Solved about the point of closest approach, which stays accurate for the
/// very large `o` and `d` of thin instances' local rays.
fn unit_ball_roots(o: Vec3, d: Vec3) -> Option<(f32, f32)> {
    let dd = d.length_squared();
    if dd <= 0.0 {
        return None;
    }
    let tc = -o.dot(d) / dd;
    let h = o + d * tc;
    let disc = 1.0 - h.length_squared();
    if disc < 0.0 {
        return None;
    }
    let half = (disc / dd).sqrt();
    Some((tc - half, tc + half))
}

/// Nearest intersection of a local-space ray with the unit sphere.
pub fn ray_unit_sphere(ray: &Ray) -> Option<f32> {
    let (t0, t1) = unit_ball_roots(ray.origin, ray.dir)?;
    if t0 >= 0.0 {
        Some(t0)
    } else if t1 >= 0.0 {
        Some(t1)
    } else {
        None
    }
}

/// Nearest intersection of a local-space ray with the capped unit cylinder.
pub fn ray_unit_cylinder(ray: &Ray) -> Option<f32> {
    let (o, d) = (ray.origin, ray.dir);
    let mut best: Option<f32> = None;
    let mut consider = |t: f32| {
        if t >= 0.0 && best.is_none_or(|b| t < b) {
            best = Some(t);
        }
    };

    // Side wall.
    if d.x * d.x + d.z * d.z > 1e-12 {
        let flat = Vec3::new(1.0, 0.0, 1.0);
        if let Some((t0, t1)) = unit_ball_roots(o * flat, d * flat) {
            for t in [t0, t1] {
                let y = o.y + d.y * t;
                if (-0.5..=0.5).contains(&y) {
                    consider(t);
                }
            }
        }
    }

    // End caps.
    if d.y.abs() > 1e-12 {
        for cap in [-0.5_f32, 0.5] {
            let t = (cap - o.y) / d.y;
            let p = o + d * t;
            if p.x * p.x + p.z * p.z <= 1.0 {
                consider(t);
            }
        }
    }

    best
}
