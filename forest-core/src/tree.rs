use crate::fall::{FallPhase, FallState};
use crate::types::TreeId;
use glam::Vec3;

/// One planted tree.
///
/// The tree does not hold its instances; registry slots record the
/// owning [`TreeId`] instead.
#[derive(Clone, Debug, PartialEq)]
pub struct TreeEntity {
    pub id: TreeId,
    /// Base of the trunk; also the pivot the tree falls around.
    pub position: Vec3,
    pub trunk_radius: f32,
    pub phase: FallPhase,
}

impl TreeEntity {
    pub fn new(id: TreeId, position: Vec3, trunk_radius: f32) -> Self {
        Self {
            id,
            position,
            trunk_radius,
            phase: FallPhase::Standing,
        }
    }

    #[inline]
    pub fn is_falling(&self) -> bool {
        matches!(self.phase, FallPhase::Falling(_))
    }

    /// `true` once the fall has finished.
    #[inline]
    pub fn is_dead(&self) -> bool {
        matches!(self.phase, FallPhase::Felled(_))
    }

    /// Felled trees no longer take part in picking.
    #[inline]
    pub fn is_pickable(&self) -> bool {
        !self.is_dead()
    }

    pub fn fall_state(&self) -> Option<&FallState> {
        match &self.phase {
            FallPhase::Standing => None,
            FallPhase::Falling(s) | FallPhase::Felled(s) => Some(s),
        }
    }

    /// Current tilt in radians; zero while standing.
    pub fn tilt(&self) -> f32 {
        self.fall_state().map_or(0.0, FallState::current_angle)
    }
}
