//! Seam to the rendering backend, plus a software backend.
//!
//! The registry only ever talks to an [`InstanceRenderer`]: it creates one
//! instanced batch per [`Category`], writes transforms by index, flags
//! batches for re-upload, and asks for ray hits by index.
//! [`CpuInstanceRenderer`] keeps the instance matrices in memory and does
//! hit testing in primitive-local space; the viewer draws straight from it.

use crate::geometry::{Ray, ray_unit_cylinder, ray_unit_sphere};
use crate::types::Category;
use glam::Mat4;

/// Opaque identifier of a batch created by a renderer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BatchHandle(pub usize);

/// Nearest instance hit by a ray.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct InstanceHit {
    pub index: usize,
    /// Distance along the (normalized) ray.
    pub distance: f32,
}

pub trait InstanceRenderer {
    /// Allocates a batch of `capacity` instances drawing `category`'s
    /// geometry and material.
    fn create_instanced_batch(&mut self, category: Category, capacity: usize) -> BatchHandle;

    fn set_instance_transform(&mut self, batch: BatchHandle, index: usize, transform: Mat4);

    /// Flags the batch's instance data for upload before the next draw.
    fn mark_dirty(&mut self, batch: BatchHandle);

    /// Nearest instance of `batch` hit by `ray`, ignoring indices for which
    /// `skip` returns `true`.
    fn intersect(
        &self,
        batch: BatchHandle,
        ray: &Ray,
        skip: &dyn Fn(usize) -> bool,
    ) -> Option<InstanceHit>;
}

#[derive(Debug)]
pub struct CpuBatch {
    pub category: Category,
    instances: Vec<Mat4>,
    dirty: bool,
}

impl CpuBatch {
    pub fn instances(&self) -> &[Mat4] {
        &self.instances
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }
}

/// In-memory instance renderer.
///
/// Unwritten instances hold the zero matrix, which is never hit.
#[derive(Debug, Default)]
pub struct CpuInstanceRenderer {
    batches: Vec<CpuBatch>,
}

impl CpuInstanceRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn batch(&self, handle: BatchHandle) -> Option<&CpuBatch> {
        self.batches.get(handle.0)
    }

    pub fn batches(&self) -> impl Iterator<Item = (BatchHandle, &CpuBatch)> {
        self.batches
            .iter()
            .enumerate()
            .map(|(i, b)| (BatchHandle(i), b))
    }

    /// Returns and clears the batch's dirty flag.
    pub fn take_dirty(&mut self, handle: BatchHandle) -> bool {
        self.batches
            .get_mut(handle.0)
            .is_some_and(|b| std::mem::take(&mut b.dirty))
    }

    pub fn clear(&mut self) {
        self.batches.clear();
    }
}

impl InstanceRenderer for CpuInstanceRenderer {
    fn create_instanced_batch(&mut self, category: Category, capacity: usize) -> BatchHandle {
        self.batches.push(CpuBatch {
            category,
            instances: vec![Mat4::ZERO; capacity],
            dirty: false,
        });
        BatchHandle(self.batches.len() - 1)
    }

    fn set_instance_transform(&mut self, batch: BatchHandle, index: usize, transform: Mat4) {
        match self
            .batches
            .get_mut(batch.0)
            .and_then(|b| b.instances.get_mut(index))
        {
            Some(slot) => *slot = transform,
            None => log::warn!("instance {index} out of range for batch {batch:?}"),
        }
    }

    fn mark_dirty(&mut self, batch: BatchHandle) {
        if let Some(b) = self.batches.get_mut(batch.0) {
            b.dirty = true;
        }
    }

    fn intersect(
        &self,
        batch: BatchHandle,
        ray: &Ray,
        skip: &dyn Fn(usize) -> bool,
    ) -> Option<InstanceHit> {
        let b = self.batches.get(batch.0)?;
        let test: fn(&Ray) -> Option<f32> = match b.category {
            Category::Branch => ray_unit_cylinder,
            Category::Leaf => ray_unit_sphere,
        };

        let mut best: Option<InstanceHit> = None;
        for (index, m) in b.instances.iter().enumerate() {
            if skip(index) {
                continue;
            }
            let Some(local) = ray.to_local(m) else {
                continue;
            };
            if let Some(distance) = test(&local)
                && best.is_none_or(|h| distance < h.distance)
            {
                best = Some(InstanceHit { index, distance });
            }
        }
        best
    }
}
