//! Procedural forest library: grows L-system trees, aggregates them into
//! instanced batches, picks them with the pointer and fells them.
//!
//! Main components:
//! - [`grammar`] - stochastic L-system expansion.
//! - [`turtle`] - turns an expanded string into branch and leaf transforms.
//! - [`registry`] - category-partitioned instance slots with owner lookup.
//! - [`fall`] - the felling animation.
//! - [`pick`] - screen-space pick rays and nearest-tree queries.
//! - [`population`] - ties the above together for one forest.
//! - [`render`] - the instanced-renderer seam and a software backend.
//! - [`geometry`] - instance transforms and ray/primitive tests.
//! - [`ground`] - terrain height seam.
//! - [`config`] - species, fall and population settings.
//! - [`tree`] - per-tree state.
//! - [`types`] - shared ids and categories.

pub mod config;
pub mod error;
pub mod fall;
pub mod geometry;
pub mod grammar;
pub mod ground;
pub mod pick;
pub mod population;
pub mod registry;
pub mod render;
pub mod tree;
pub mod turtle;
pub mod types;
