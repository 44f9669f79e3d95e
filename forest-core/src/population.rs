//! A planted forest: the tree arena, its instance registry and the fall
//! animator, built once and then driven by the frame loop.
//!
//! The typical lifecycle looks like:
//! 1. [`Population::build`] - plant trees, grow each from the grammar and
//!    upload all instances.
//! 2. [`Population::pick`] - resolve a pointer position to a tree.
//! 3. [`Population::start_fall`] - fell it away from the actor.
//! 4. [`Population::update`] - once per frame.

use crate::config::{FallConfig, ForestConfig, GrammarConfig};
use crate::fall::FallAnimator;
use crate::grammar::expand;
use crate::ground::Ground;
use crate::pick::{self, View};
use crate::registry::InstanceRegistry;
use crate::render::InstanceRenderer;
use crate::tree::TreeEntity;
use crate::turtle::interpret;
use crate::types::{Category, TreeId};
use glam::{Vec2, Vec3};
use rand::Rng;

#[derive(Debug)]
pub struct Population {
    trees: Vec<TreeEntity>,
    registry: InstanceRegistry,
    animator: FallAnimator,
}

impl Population {
    /// Plants `cfg.population.count` trees at random positions in the
    /// square `[-half_extent, half_extent]²`, seated on `ground`.
    ///
    /// ### Parameters
    /// - `cfg` - Population size, species grammar and fall settings.
    /// - `ground` - Height lookup for each tree base.
    /// - `rng` - Drives placement, rule choice, twists and leaf sizes.
    /// - `renderer` - Receives one instanced batch per category.
    pub fn build<R: InstanceRenderer + ?Sized>(
        cfg: &ForestConfig,
        ground: &impl Ground,
        rng: &mut impl Rng,
        renderer: &mut R,
    ) -> Self {
        let half = cfg.population.half_extent.max(0.0);
        let positions: Vec<Vec3> = (0..cfg.population.count)
            .map(|_| {
                let x = rng.random_range(-half..=half);
                let z = rng.random_range(-half..=half);
                Vec3::new(x, ground.height_at(x, z), z)
            })
            .collect();

        Self::build_at(&positions, &cfg.grammar, cfg.fall, rng, renderer)
    }

    /// Plants one tree at each of `positions`, in order.
    ///
    /// Trees are grown one after another and their instances appended in
    /// the same order, so tree `i` always owns a contiguous slot range
    /// following tree `i - 1`.
    pub fn build_at<R: InstanceRenderer + ?Sized>(
        positions: &[Vec3],
        grammar: &GrammarConfig,
        fall: FallConfig,
        rng: &mut impl Rng,
        renderer: &mut R,
    ) -> Self {
        let params = grammar.turtle_params();
        let mut trees = Vec::with_capacity(positions.len());
        let mut registry = InstanceRegistry::new();

        for (id, &pos) in positions.iter().enumerate() {
            let symbols = expand(&grammar.axiom, &grammar.rules, grammar.iterations, rng);
            let shape = interpret(pos, &symbols, &params, rng);

            for t in shape.branches {
                registry.add(Category::Branch, t, id);
            }
            for t in shape.leaves {
                registry.add(Category::Leaf, t, id);
            }
            trees.push(TreeEntity::new(id, pos, params.initial_radius));
        }

        registry.build(renderer);
        log::info!(
            "planted {} trees ({} branch and {} leaf instances)",
            trees.len(),
            registry.batch(Category::Branch).len(),
            registry.batch(Category::Leaf).len()
        );

        Self {
            trees,
            registry,
            animator: FallAnimator::new(fall),
        }
    }

    pub fn trees(&self) -> &[TreeEntity] {
        &self.trees
    }

    pub fn tree(&self, id: TreeId) -> Option<&TreeEntity> {
        self.trees.get(id)
    }

    pub fn registry(&self) -> &InstanceRegistry {
        &self.registry
    }

    pub fn falling_count(&self) -> usize {
        self.animator.active().len()
    }

    pub fn felled_count(&self) -> usize {
        self.trees.iter().filter(|t| t.is_dead()).count()
    }

    /// Tree under the pointer, ignoring felled trees.
    pub fn pick<R: InstanceRenderer + ?Sized>(
        &self,
        renderer: &R,
        view: &View,
        screen: Vec2,
    ) -> Option<TreeId> {
        pick::pick(&self.registry, renderer, view, screen, |id| {
            self.trees.get(id).is_some_and(TreeEntity::is_pickable)
        })
        .map(|hit| hit.owner)
    }

    /// Starts felling `id` away from `reference`.
    ///
    /// ### Returns
    /// `false` for unknown ids and for trees that are not standing.
    pub fn start_fall(&mut self, id: TreeId, reference: Vec3) -> bool {
        match self.trees.get_mut(id) {
            Some(tree) => self.animator.start(tree, reference),
            None => false,
        }
    }

    /// Advances every falling tree by `dt` and uploads the changed slots.
    pub fn update<R: InstanceRenderer + ?Sized>(&mut self, dt: f32, renderer: &mut R) {
        self.animator
            .update(dt, &mut self.trees, &mut self.registry);
        self.registry.flush(renderer);
    }
}
