//! Turtle interpretation of an expanded L-system string.
//!
//! The turtle walks the string once, left to right. Its cursor starts at
//! the tree base facing world up, and every drawn segment or leaf becomes
//! one placement transform for the instanced primitives in
//! [`crate::geometry`].
//!
//! | symbol | effect |
//! |--------|--------|
//! | `F`    | draw a branch segment forward (and a leaf past the distance threshold) |
//! | `f`    | move forward without drawing |
//! | `+`/`-`| random twist about the heading, then turn by ±angle |
//! | `[`/`]`| push / pop the cursor and radius |
//! | `R`    | shrink the radius |
//! | `L`    | place a leaf |
//!
//! Any other symbol is skipped.

use crate::geometry::{branch_transform, leaf_transform};
use glam::{Mat4, Quat, Vec3};
use rand::Rng;
use std::f32::consts::TAU;

/// Geometric parameters for one interpretation pass.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TurtleParams {
    pub angle_step_rad: f32,
    pub segment_length: f32,
    pub initial_radius: f32,
    pub radius_decay: f32,
    pub min_radius: f32,
    pub leaf_distance_threshold: f32,
    /// Inclusive range leaf sizes are drawn from.
    pub leaf_size: (f32, f32),
}

/// Cursor position, heading and current branch thickness.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TurtleState {
    pub position: Vec3,
    pub orientation: Quat,
    pub radius: f32,
}

impl TurtleState {
    pub fn new(position: Vec3, radius: f32) -> Self {
        Self {
            position,
            orientation: Quat::IDENTITY,
            radius,
        }
    }

    /// Direction the turtle moves in: its local +Y axis.
    #[inline]
    pub fn heading(&self) -> Vec3 {
        self.orientation * Vec3::Y
    }

    #[inline]
    fn advance(&mut self, distance: f32) {
        self.position += self.heading() * distance;
    }

    /// Twists about the heading by `twist`, then turns about the local Z axis.
    #[inline]
    fn turn(&mut self, twist: f32, angle: f32) {
        self.orientation = (self.orientation
            * Quat::from_rotation_y(twist)
            * Quat::from_rotation_z(angle))
        .normalize();
    }
}

/// Output of [`interpret`].
#[derive(Clone, Debug)]
pub struct Interpretation {
    pub branches: Vec<Mat4>,
    pub leaves: Vec<Mat4>,
    /// Cursor after the last symbol.
    pub final_state: TurtleState,
}

/// Converts an expanded string into branch and leaf transforms.
///
/// ### Parameters
/// - `start` - Tree base; the cursor starts here facing `+Y`.
/// - `symbols` - Expanded L-system string.
/// - `params` - Angle, segment length, radius and leaf settings.
/// - `rng` - Source for the per-turn twist and the leaf sizes.
///
/// ### Returns
/// One branch transform per `F`, one leaf per `L`, plus one leaf per `F`
/// whose end point lies farther than `params.leaf_distance_threshold`
/// from `start`.
pub fn interpret(
    start: Vec3,
    symbols: &str,
    params: &TurtleParams,
    rng: &mut impl Rng,
) -> Interpretation {
    let mut state = TurtleState::new(start, params.initial_radius.max(params.min_radius));
    let mut stack: Vec<TurtleState> = Vec::new();
    let mut branches = Vec::new();
    let mut leaves = Vec::new();

    for c in symbols.chars() {
        match c {
            'F' => {
                let from = state.position;
                state.advance(params.segment_length);
                let to = state.position;
                branches.push(branch_transform(from, to, state.radius));

                if to.distance(start) > params.leaf_distance_threshold {
                    leaves.push(random_leaf(to, params.leaf_size, rng));
                }
            }
            'f' => state.advance(params.segment_length),
            '+' | '-' => {
                let twist = rng.random_range(0.0..TAU);
                let angle = if c == '+' {
                    params.angle_step_rad
                } else {
                    -params.angle_step_rad
                };
                state.turn(twist, angle);
            }
            '[' => stack.push(state),
            ']' => match stack.pop() {
                Some(saved) => state = saved,
                None => log::trace!("ignoring `]` with an empty turtle stack"),
            },
            'R' => {
                state.radius = (state.radius * params.radius_decay).max(params.min_radius);
            }
            'L' => leaves.push(random_leaf(state.position, params.leaf_size, rng)),
            _ => {}
        }
    }

    Interpretation {
        branches,
        leaves,
        final_state: state,
    }
}

fn random_leaf(pos: Vec3, (a, b): (f32, f32), rng: &mut impl Rng) -> Mat4 {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    let size = if hi > lo {
        rng.random_range(lo..=hi)
    } else {
        lo
    };
    leaf_transform(pos, size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::branch_endpoints;
    use rand::{SeedableRng, rngs::StdRng};

    const EPS: f32 = 1e-4;

    fn params() -> TurtleParams {
        TurtleParams {
            angle_step_rad: 25f32.to_radians(),
            segment_length: 1.0,
            initial_radius: 0.2,
            radius_decay: 0.5,
            min_radius: 0.03,
            leaf_distance_threshold: 1000.0,
            leaf_size: (0.5, 1.1),
        }
    }

    fn rng() -> StdRng {
        StdRng::seed_from_u64(11)
    }

    #[test]
    fn branch_count_matches_draw_symbols() {
        let s = "F[+F]F[-F]F";
        let out = interpret(Vec3::ZERO, s, &params(), &mut rng());

        assert_eq!(out.branches.len(), 5);
        assert_eq!(out.branches.len(), s.matches('F').count());
        assert!(out.leaves.is_empty());
    }

    #[test]
    fn balanced_brackets_restore_orientation() {
        let out = interpret(Vec3::ZERO, "F[+F]F[-F]F", &params(), &mut rng());
        let end = out.final_state;

        assert!(end.orientation.angle_between(Quat::IDENTITY) < EPS);
        // Three trunk segments outside brackets, straight up.
        assert!((end.position - Vec3::new(0.0, 3.0, 0.0)).length() < EPS);
    }

    #[test]
    fn draw_forward_follows_heading() {
        let start = Vec3::new(2.0, 1.0, -3.0);
        let out = interpret(start, "FF", &params(), &mut rng());

        let (a, b) = branch_endpoints(&out.branches[0]);
        assert!((a - start).length() < EPS);
        assert!((b - (start + Vec3::Y)).length() < EPS);
        let (c, d) = branch_endpoints(&out.branches[1]);
        assert!((c - b).length() < EPS);
        assert!((d - (start + Vec3::Y * 2.0)).length() < EPS);
    }

    #[test]
    fn move_forward_emits_nothing() {
        let out = interpret(Vec3::ZERO, "ffF", &params(), &mut rng());
        assert_eq!(out.branches.len(), 1);
        let (a, _) = branch_endpoints(&out.branches[0]);
        assert!((a - Vec3::new(0.0, 2.0, 0.0)).length() < EPS);
    }

    #[test]
    fn turns_tilt_by_the_angle_step() {
        let p = params();
        for s in ["+", "-"] {
            let out = interpret(Vec3::ZERO, s, &p, &mut rng());
            let heading = out.final_state.heading();
            let tilt = heading.angle_between(Vec3::Y);
            assert!((tilt - p.angle_step_rad).abs() < EPS, "tilt={tilt}");
        }
    }

    #[test]
    fn radius_decays_to_floor() {
        let p = params();
        let out = interpret(Vec3::ZERO, "RFRRRRRF", &p, &mut rng());

        let (s0, _, _) = out.branches[0].to_scale_rotation_translation();
        assert!((s0.x - 0.1).abs() < EPS);
        let (s1, _, _) = out.branches[1].to_scale_rotation_translation();
        assert!((s1.x - p.min_radius).abs() < EPS);
    }

    #[test]
    fn pop_restores_radius_and_position() {
        let out = interpret(Vec3::ZERO, "F[RRfF]F", &params(), &mut rng());
        let (s_last, _, _) = out.branches[2].to_scale_rotation_translation();
        assert!((s_last.x - 0.2).abs() < EPS);
        let (a, _) = branch_endpoints(&out.branches[2]);
        assert!((a - Vec3::Y).length() < EPS);
    }

    #[test]
    fn unmatched_pops_are_ignored() {
        let out = interpret(Vec3::ZERO, "]]F]R[F]]F", &params(), &mut rng());
        assert_eq!(out.branches.len(), 3);

        let end = out.final_state;
        assert!((end.position - Vec3::new(0.0, 2.0, 0.0)).length() < EPS);
        assert!((end.radius - 0.1).abs() < EPS);
    }

    #[test]
    fn leaf_markers_and_threshold_crossings_both_emit_leaves() {
        let mut p = params();
        p.leaf_distance_threshold = 1.5;

        // Ends at 1, 2, 3: the last two are past 1.5. One explicit L.
        let out = interpret(Vec3::ZERO, "FFLF", &p, &mut rng());
        assert_eq!(out.branches.len(), 3);
        assert_eq!(out.leaves.len(), 2 + 1);

        for leaf in &out.leaves {
            let (scale, rot, _) = leaf.to_scale_rotation_translation();
            assert!(scale.x >= 0.5 - EPS && scale.x <= 1.1 + EPS);
            assert!((scale.x - scale.y).abs() < EPS && (scale.x - scale.z).abs() < EPS);
            assert!(rot.angle_between(Quat::IDENTITY) < EPS);
        }
    }

    #[test]
    fn unknown_symbols_are_skipped() {
        let plain = interpret(Vec3::ZERO, "FF", &params(), &mut rng());
        let noisy = interpret(Vec3::ZERO, "XF&^Q|F?", &params(), &mut rng());
        assert_eq!(plain.branches, noisy.branches);
        assert_eq!(plain.final_state, noisy.final_state);
    }

    #[test]
    fn seeded_interpretation_is_reproducible() {
        let s = "F[+FL]F[-F[+FL]]RFL";
        let a = interpret(Vec3::ZERO, s, &params(), &mut StdRng::seed_from_u64(5));
        let b = interpret(Vec3::ZERO, s, &params(), &mut StdRng::seed_from_u64(5));
        assert_eq!(a.branches, b.branches);
        assert_eq!(a.leaves, b.leaves);
    }

    #[test]
    fn fixed_leaf_size_range_uses_that_size() {
        let mut p = params();
        p.leaf_size = (0.7, 0.7);
        let out = interpret(Vec3::ZERO, "L", &p, &mut rng());
        let (scale, _, _) = out.leaves[0].to_scale_rotation_translation();
        assert!((scale.x - 0.7).abs() < EPS);
    }
}
