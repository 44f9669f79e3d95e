//! Felling animation.
//!
//! A tree goes `Standing → Falling → Felled`. While falling, every frame
//! recomputes one pivot rotation about the trunk base and applies it to
//! the tree's untouched base transforms, so rotations never accumulate.

use crate::config::FallConfig;
use crate::registry::InstanceRegistry;
use crate::tree::TreeEntity;
use crate::types::TreeId;
use glam::{Mat4, Quat, Vec3};

/// Horizontal fall direction used when the reference point sits on the trunk.
pub const DEFAULT_FALL_DIRECTION: Vec3 = Vec3::new(0.0, 0.0, -1.0);

/// Progress of one fall.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FallState {
    /// Fraction of the animation completed, in `[0, 1]`.
    pub elapsed: f32,
    pub duration_secs: f32,
    pub target_angle: f32,
    /// Unit horizontal rotation axis.
    pub axis: Vec3,
}

impl FallState {
    /// Tilt after easing, in radians.
    #[inline]
    pub fn current_angle(&self) -> f32 {
        ease_out_cubic(self.elapsed) * self.target_angle
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum FallPhase {
    #[default]
    Standing,
    Falling(FallState),
    /// Terminal; the state is frozen at `elapsed == 1`.
    Felled(FallState),
}

/// `1 - (1 - x)^3`, for `x` in `[0, 1]`.
#[inline]
pub fn ease_out_cubic(x: f32) -> f32 {
    let inv = 1.0 - x.clamp(0.0, 1.0);
    1.0 - inv * inv * inv
}

/// Horizontal unit vector pointing from `reference` to `tree_pos`.
pub fn fall_direction(tree_pos: Vec3, reference: Vec3) -> Vec3 {
    let d = Vec3::new(tree_pos.x - reference.x, 0.0, tree_pos.z - reference.z);
    if d.length_squared() < 1e-6 {
        DEFAULT_FALL_DIRECTION
    } else {
        d.normalize()
    }
}

/// Rotation by `angle` about `axis` through `pivot`.
pub fn pivot_transform(pivot: Vec3, axis: Vec3, angle: f32) -> Mat4 {
    Mat4::from_translation(pivot)
        * Mat4::from_quat(Quat::from_axis_angle(axis, angle))
        * Mat4::from_translation(-pivot)
}

/// Drives every falling tree and rewrites its registry slots.
#[derive(Debug, Default)]
pub struct FallAnimator {
    cfg: FallConfig,
    active: Vec<TreeId>,
}

impl FallAnimator {
    pub fn new(cfg: FallConfig) -> Self {
        Self {
            cfg,
            active: Vec::new(),
        }
    }

    pub fn config(&self) -> &FallConfig {
        &self.cfg
    }

    /// Trees currently falling, in the order they were started.
    pub fn active(&self) -> &[TreeId] {
        &self.active
    }

    /// Starts felling `tree` away from `reference`.
    ///
    /// ### Returns
    /// `false` (and does nothing) unless the tree is standing.
    pub fn start(&mut self, tree: &mut TreeEntity, reference: Vec3) -> bool {
        if !matches!(tree.phase, FallPhase::Standing) {
            return false;
        }

        let dir = fall_direction(tree.position, reference);
        let axis = Vec3::Y.cross(dir).normalize();

        tree.phase = FallPhase::Falling(FallState {
            elapsed: 0.0,
            duration_secs: self.cfg.duration_secs,
            target_angle: self.cfg.target_angle(),
            axis,
        });
        self.active.push(tree.id);

        log::info!(
            "tree {} starts falling towards ({:.2}, {:.2})",
            tree.id,
            dir.x,
            dir.z
        );
        true
    }

    /// Advances all falling trees by `dt` seconds.
    ///
    /// ### Parameters
    /// - `dt` - Simulated frame time; clamped to `max_dt` when configured.
    /// - `trees` - Tree arena indexed by [`TreeId`].
    /// - `registry` - Receives the new transforms for every owned slot.
    pub fn update(&mut self, dt: f32, trees: &mut [TreeEntity], registry: &mut InstanceRegistry) {
        if self.active.is_empty() {
            return;
        }
        let dt = match self.cfg.max_dt {
            Some(max) => dt.min(max),
            None => dt,
        }
        .max(0.0);

        self.active.retain(|&id| {
            let Some(tree) = trees.get_mut(id) else {
                return false;
            };
            let FallPhase::Falling(mut state) = tree.phase else {
                return false;
            };

            let step = if state.duration_secs > 0.0 {
                dt / state.duration_secs
            } else {
                1.0
            };
            state.elapsed = (state.elapsed + step).clamp(0.0, 1.0);

            let pivot = pivot_transform(tree.position, state.axis, state.current_angle());
            registry.rewrite_owned(id, |base| pivot * base);

            if state.elapsed >= 1.0 {
                tree.phase = FallPhase::Felled(state);
                log::info!("tree {id} felled");
                false
            } else {
                tree.phase = FallPhase::Falling(state);
                true
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::branch_transform;
    use crate::types::Category;

    const EPS: f32 = 1e-5;

    fn setup(pos: Vec3) -> (Vec<TreeEntity>, InstanceRegistry) {
        let trees = vec![TreeEntity::new(0, pos, 0.2)];
        let mut registry = InstanceRegistry::new();
        registry.add(
            Category::Branch,
            branch_transform(pos, pos + Vec3::Y * 2.0, 0.2),
            0,
        );
        (trees, registry)
    }

    #[test]
    fn ease_out_cubic_hits_endpoints_and_is_monotonic() {
        assert_eq!(ease_out_cubic(0.0), 0.0);
        assert_eq!(ease_out_cubic(1.0), 1.0);
        assert_eq!(ease_out_cubic(2.0), 1.0);
        let mut last = 0.0;
        for i in 1..=100 {
            let v = ease_out_cubic(i as f32 / 100.0);
            assert!(v >= last);
            last = v;
        }
    }

    #[test]
    fn fall_direction_points_away_from_reference() {
        let d = fall_direction(Vec3::new(5.0, 3.0, 0.0), Vec3::new(0.0, -2.0, 0.0));
        assert!((d - Vec3::X).length() < EPS);

        let degenerate = fall_direction(Vec3::new(1.0, 0.0, 1.0), Vec3::new(1.0, 9.0, 1.0));
        assert_eq!(degenerate, DEFAULT_FALL_DIRECTION);
    }

    #[test]
    fn start_sets_horizontal_axis_and_is_idempotent() {
        let (mut trees, _) = setup(Vec3::new(5.0, 0.0, 0.0));
        let mut anim = FallAnimator::new(FallConfig::default());

        assert!(anim.start(&mut trees[0], Vec3::ZERO));
        let state = *trees[0].fall_state().expect("falling");
        assert_eq!(state.elapsed, 0.0);
        assert!((state.axis - Vec3::Y.cross(Vec3::X)).length() < EPS);
        assert!(state.axis.y.abs() < EPS);

        assert!(!anim.start(&mut trees[0], Vec3::new(10.0, 0.0, 0.0)));
        assert_eq!(trees[0].fall_state(), Some(&state));
        assert_eq!(anim.active(), &[0]);
    }

    #[test]
    fn tree_tips_away_from_reference() {
        let pos = Vec3::new(5.0, 0.0, 0.0);
        let (mut trees, mut registry) = setup(pos);
        let mut anim = FallAnimator::new(FallConfig {
            target_fraction: 1.0,
            ..FallConfig::default()
        });

        anim.start(&mut trees[0], Vec3::ZERO);
        anim.update(10.0, &mut trees, &mut registry);

        // The segment's midpoint sat 1 above the base; lying flat it is 1 further out on +X.
        let mid = registry
            .transform_at(Category::Branch, 0)
            .expect("slot")
            .transform_point3(Vec3::ZERO);
        assert!((mid - Vec3::new(6.0, 0.0, 0.0)).length() < 1e-4, "mid={mid:?}");
    }

    #[test]
    fn full_duration_step_fells_at_exact_target() {
        let (mut trees, mut registry) = setup(Vec3::new(5.0, 0.0, 0.0));
        let cfg = FallConfig::default();
        let mut anim = FallAnimator::new(cfg);

        anim.start(&mut trees[0], Vec3::ZERO);
        anim.update(cfg.duration_secs, &mut trees, &mut registry);

        assert!(trees[0].is_dead());
        assert!(!trees[0].is_falling());
        let state = trees[0].fall_state().expect("felled");
        assert_eq!(state.elapsed, 1.0);
        assert_eq!(state.current_angle(), cfg.target_angle());
        assert!(anim.active().is_empty());
    }

    #[test]
    fn angle_is_monotonic_and_frozen_after_felled() {
        let (mut trees, mut registry) = setup(Vec3::new(0.0, 0.0, 3.0));
        let mut anim = FallAnimator::new(FallConfig::default());
        anim.start(&mut trees[0], Vec3::ZERO);

        let mut last = 0.0;
        for _ in 0..40 {
            anim.update(0.07, &mut trees, &mut registry);
            let a = trees[0].tilt();
            assert!(a >= last, "angle went back: {a} < {last}");
            last = a;
        }
        assert!(trees[0].is_dead());

        let frozen = registry.transform_at(Category::Branch, 0).expect("slot");
        let frozen_angle = trees[0].tilt();
        anim.update(1.0, &mut trees, &mut registry);
        assert_eq!(trees[0].tilt(), frozen_angle);
        assert_eq!(registry.transform_at(Category::Branch, 0), Some(frozen));
    }

    #[test]
    fn updates_do_not_compound_rotations() {
        let (mut trees, mut registry) = setup(Vec3::ZERO);
        let mut anim = FallAnimator::new(FallConfig::default());
        anim.start(&mut trees[0], Vec3::new(0.0, 0.0, 1.0));

        anim.update(0.5, &mut trees, &mut registry);
        let state = *trees[0].fall_state().expect("falling");
        let expected = pivot_transform(Vec3::ZERO, state.axis, state.current_angle())
            * registry.base_at(Category::Branch, 0).expect("base");
        let live = registry.transform_at(Category::Branch, 0).expect("live");
        assert!(live.abs_diff_eq(expected, EPS));
    }

    #[test]
    fn max_dt_clamps_each_step() {
        let (mut trees, mut registry) = setup(Vec3::X);
        let mut anim = FallAnimator::new(FallConfig {
            max_dt: Some(0.1),
            ..FallConfig::default()
        });
        anim.start(&mut trees[0], Vec3::ZERO);
        anim.update(5.0, &mut trees, &mut registry);

        let state = trees[0].fall_state().expect("falling");
        assert!((state.elapsed - 0.05).abs() < EPS);
        assert!(trees[0].is_falling());
    }

    #[test]
    fn standing_trees_are_untouched() {
        let (mut trees, mut registry) = setup(Vec3::ZERO);
        let before = registry.transform_at(Category::Branch, 0);
        let mut anim = FallAnimator::new(FallConfig::default());
        anim.update(1.0, &mut trees, &mut registry);
        assert_eq!(registry.transform_at(Category::Branch, 0), before);
        assert_eq!(trees[0].phase, FallPhase::Standing);
    }
}
