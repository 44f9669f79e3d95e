//! Category-partitioned instance storage.
//!
//! Every partition keeps three parallel arrays indexed by slot:
//!
//! - the live transform (what gets drawn),
//! - the base transform recorded when the slot was added,
//! - the owning [`TreeId`].
//!
//! Slots are append-only and never move, so indices handed to the
//! renderer and returned from hit tests stay valid for the lifetime of
//! the registry.

use crate::geometry::Ray;
use crate::render::{BatchHandle, InstanceRenderer};
use crate::types::{Category, SlotIndex, TreeId};
use glam::Mat4;
use std::collections::HashMap;
use std::ops::Range;

/// Slot hit by a pick ray, resolved to its owner.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PickHit {
    pub category: Category,
    pub slot: SlotIndex,
    pub owner: TreeId,
    pub distance: f32,
}

/// All instances of one [`Category`].
#[derive(Debug)]
pub struct InstanceBatch {
    category: Category,
    transforms: Vec<Mat4>,
    base: Vec<Mat4>,
    owners: Vec<TreeId>,
    /// Slot range per owner, valid while `contiguous` holds.
    spans: HashMap<TreeId, Range<SlotIndex>>,
    contiguous: bool,
    handle: Option<BatchHandle>,
    /// Slots written since the last flush, each listed once; only
    /// tracked once built.
    dirty: Vec<SlotIndex>,
    /// `queued[slot]` is set while `slot` is in `dirty`.
    queued: Vec<bool>,
}

impl InstanceBatch {
    pub fn new(category: Category) -> Self {
        Self {
            category,
            transforms: Vec::new(),
            base: Vec::new(),
            owners: Vec::new(),
            spans: HashMap::new(),
            contiguous: true,
            handle: None,
            dirty: Vec::new(),
            queued: Vec::new(),
        }
    }

    #[inline]
    pub fn category(&self) -> Category {
        self.category
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.transforms.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.transforms.is_empty()
    }

    pub fn handle(&self) -> Option<BatchHandle> {
        self.handle
    }

    pub fn transforms(&self) -> &[Mat4] {
        &self.transforms
    }

    pub fn owners(&self) -> &[TreeId] {
        &self.owners
    }

    /// `true` while every owner's slots form one contiguous range.
    pub fn is_contiguous(&self) -> bool {
        self.contiguous
    }

    /// Appends an instance and returns its slot.
    pub fn add(&mut self, transform: Mat4, owner: TreeId) -> SlotIndex {
        let slot = self.transforms.len();
        self.transforms.push(transform);
        self.base.push(transform);
        self.owners.push(owner);
        self.queued.push(false);

        match self.spans.get_mut(&owner) {
            Some(span) if span.end == slot => span.end += 1,
            Some(_) => self.contiguous = false,
            None => {
                self.spans.insert(owner, slot..slot + 1);
            }
        }
        slot
    }

    pub fn transform_at(&self, slot: SlotIndex) -> Option<Mat4> {
        self.transforms.get(slot).copied()
    }

    pub fn base_at(&self, slot: SlotIndex) -> Option<Mat4> {
        self.base.get(slot).copied()
    }

    pub fn owner_at(&self, slot: SlotIndex) -> Option<TreeId> {
        self.owners.get(slot).copied()
    }

    /// Overwrites the live transform of `slot`; the base is kept.
    ///
    /// ### Returns
    /// `false` if `slot` is out of range.
    pub fn set_transform(&mut self, slot: SlotIndex, transform: Mat4) -> bool {
        let Some(t) = self.transforms.get_mut(slot) else {
            log::warn!(
                "ignoring write to {:?} slot {slot} (len {})",
                self.category,
                self.transforms.len()
            );
            return false;
        };
        *t = transform;
        self.queue(slot);
        true
    }

    fn queue(&mut self, slot: SlotIndex) {
        if self.handle.is_some() && !self.queued[slot] {
            self.queued[slot] = true;
            self.dirty.push(slot);
        }
    }

    /// Slots owned by `owner`, in ascending order.
    pub fn owned_slots(&self, owner: TreeId) -> impl Iterator<Item = SlotIndex> + '_ {
        self.search_range(owner)
            .filter(move |&slot| self.owners[slot] == owner)
    }

    fn search_range(&self, owner: TreeId) -> Range<SlotIndex> {
        if self.contiguous {
            self.spans.get(&owner).cloned().unwrap_or(0..0)
        } else {
            0..self.owners.len()
        }
    }

    /// Sets the live transform of each slot owned by `owner` to
    /// `f(base)`.
    ///
    /// ### Returns
    /// Number of slots rewritten.
    pub fn rewrite_owned(&mut self, owner: TreeId, f: impl Fn(Mat4) -> Mat4) -> usize {
        let mut n = 0;
        for slot in self.search_range(owner) {
            if self.owners[slot] != owner {
                continue;
            }
            self.transforms[slot] = f(self.base[slot]);
            self.queue(slot);
            n += 1;
        }
        n
    }

    fn build<R: InstanceRenderer + ?Sized>(&mut self, renderer: &mut R) {
        let handle = renderer.create_instanced_batch(self.category, self.len());
        for (i, t) in self.transforms.iter().enumerate() {
            renderer.set_instance_transform(handle, i, *t);
        }
        renderer.mark_dirty(handle);
        self.handle = Some(handle);
        self.dirty.clear();
        self.queued.fill(false);
    }

    fn flush<R: InstanceRenderer + ?Sized>(&mut self, renderer: &mut R) -> usize {
        let Some(handle) = self.handle else {
            return 0;
        };
        if self.dirty.is_empty() {
            return 0;
        }
        let n = self.dirty.len();
        for slot in self.dirty.drain(..) {
            self.queued[slot] = false;
            renderer.set_instance_transform(handle, slot, self.transforms[slot]);
        }
        renderer.mark_dirty(handle);
        n
    }
}

/// One [`InstanceBatch`] per [`Category`].
#[derive(Debug)]
pub struct InstanceRegistry {
    batches: [InstanceBatch; 2],
}

impl Default for InstanceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl InstanceRegistry {
    pub fn new() -> Self {
        Self {
            batches: Category::ALL.map(InstanceBatch::new),
        }
    }

    #[inline]
    pub fn batch(&self, category: Category) -> &InstanceBatch {
        &self.batches[category.index()]
    }

    pub fn batches(&self) -> impl Iterator<Item = &InstanceBatch> {
        self.batches.iter()
    }

    pub fn total_slots(&self) -> usize {
        self.batches.iter().map(InstanceBatch::len).sum()
    }

    pub fn is_built(&self) -> bool {
        self.batches.iter().all(|b| b.handle.is_some())
    }

    /// Appends `transform` to the `category` partition. O(1).
    ///
    /// Slots added after [`InstanceRegistry::build`] are not part of the
    /// renderer's batch until the registry is built again.
    pub fn add(&mut self, category: Category, transform: Mat4, owner: TreeId) -> SlotIndex {
        let batch = &mut self.batches[category.index()];
        if batch.handle.is_some() {
            log::warn!("adding to built {category:?} batch; rebuild before drawing it");
        }
        batch.add(transform, owner)
    }

    /// Creates one renderer batch per partition and uploads every slot.
    pub fn build<R: InstanceRenderer + ?Sized>(&mut self, renderer: &mut R) {
        for batch in &mut self.batches {
            batch.build(renderer);
        }
        log::debug!(
            "built instance batches: {} branches, {} leaves",
            self.batch(Category::Branch).len(),
            self.batch(Category::Leaf).len()
        );
    }

    pub fn set_transform(&mut self, category: Category, slot: SlotIndex, transform: Mat4) -> bool {
        self.batches[category.index()].set_transform(slot, transform)
    }

    pub fn transform_at(&self, category: Category, slot: SlotIndex) -> Option<Mat4> {
        self.batch(category).transform_at(slot)
    }

    pub fn base_at(&self, category: Category, slot: SlotIndex) -> Option<Mat4> {
        self.batch(category).base_at(slot)
    }

    pub fn owner_at(&self, category: Category, slot: SlotIndex) -> Option<TreeId> {
        self.batch(category).owner_at(slot)
    }

    /// Rewrites `owner`'s slots in every partition from their base transforms.
    pub fn rewrite_owned(&mut self, owner: TreeId, f: impl Fn(Mat4) -> Mat4) -> usize {
        self.batches
            .iter_mut()
            .map(|b| b.rewrite_owned(owner, &f))
            .sum()
    }

    /// Pushes every slot written since the last flush to the renderer and
    /// marks the touched batches dirty.
    ///
    /// ### Returns
    /// Number of instance transforms uploaded.
    pub fn flush<R: InstanceRenderer + ?Sized>(&mut self, renderer: &mut R) -> usize {
        self.batches.iter_mut().map(|b| b.flush(renderer)).sum()
    }

    /// Nearest slot hit by `ray` across all built partitions whose owner
    /// satisfies `is_pickable`.
    ///
    /// Hit testing is delegated to `renderer`; returned indices are mapped
    /// back through [`InstanceRegistry::owner_at`]. On equal distance the
    /// earlier partition wins.
    pub fn pick_nearest<R: InstanceRenderer + ?Sized>(
        &self,
        ray: &Ray,
        renderer: &R,
        is_pickable: impl Fn(TreeId) -> bool,
    ) -> Option<PickHit> {
        let mut best: Option<PickHit> = None;
        for batch in &self.batches {
            let Some(handle) = batch.handle else {
                continue;
            };
            let skip = |i: usize| batch.owner_at(i).is_none_or(|o| !is_pickable(o));
            let Some(hit) = renderer.intersect(handle, ray, &skip) else {
                continue;
            };
            let Some(owner) = batch.owner_at(hit.index) else {
                continue;
            };
            if best.is_none_or(|b| hit.distance < b.distance) {
                best = Some(PickHit {
                    category: batch.category,
                    slot: hit.index,
                    owner,
                    distance: hit.distance,
                });
            }
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{branch_transform, leaf_transform};
    use crate::render::CpuInstanceRenderer;
    use glam::Vec3;

    fn leaf_at(x: f32) -> Mat4 {
        leaf_transform(Vec3::new(x, 0.0, 0.0), 0.5)
    }

    #[test]
    fn add_keeps_parallel_arrays_in_step() {
        let mut reg = InstanceRegistry::new();
        for i in 0..10 {
            let slot = reg.add(Category::Leaf, leaf_at(i as f32), i / 3);
            assert_eq!(slot, i);
            let b = reg.batch(Category::Leaf);
            assert_eq!(b.transforms().len(), b.owners().len());
            assert_eq!(b.base.len(), b.owners().len());
        }
        assert_eq!(reg.batch(Category::Branch).len(), 0);
        assert_eq!(reg.total_slots(), 10);
        assert_eq!(reg.owner_at(Category::Leaf, 4), Some(1));
        assert_eq!(reg.owner_at(Category::Leaf, 10), None);
    }

    #[test]
    fn set_transform_after_build_reaches_renderer_on_flush() {
        let mut reg = InstanceRegistry::new();
        reg.add(Category::Leaf, leaf_at(0.0), 0);
        reg.add(Category::Leaf, leaf_at(1.0), 1);

        let mut renderer = CpuInstanceRenderer::new();
        reg.build(&mut renderer);
        assert!(reg.is_built());
        let handle = reg.batch(Category::Leaf).handle().expect("built");
        assert!(renderer.take_dirty(handle));
        assert_eq!(renderer.batch(handle).expect("batch").instances()[1], leaf_at(1.0));

        let moved = leaf_at(7.0);
        assert!(reg.set_transform(Category::Leaf, 1, moved));
        assert_eq!(reg.batch(Category::Leaf).len(), 2);
        assert_eq!(reg.transform_at(Category::Leaf, 1), Some(moved));
        assert_eq!(reg.base_at(Category::Leaf, 1), Some(leaf_at(1.0)));
        assert_eq!(reg.owner_at(Category::Leaf, 1), Some(1));

        assert_eq!(reg.flush(&mut renderer), 1);
        assert!(renderer.take_dirty(handle));
        assert_eq!(renderer.batch(handle).expect("batch").instances()[1], moved);
        assert_eq!(renderer.batch(handle).expect("batch").instances().len(), 2);

        assert_eq!(reg.flush(&mut renderer), 0);
        assert!(!renderer.take_dirty(handle));
    }

    #[test]
    fn repeated_writes_queue_each_slot_once() {
        let mut reg = InstanceRegistry::new();
        for owner in [0, 0, 0, 1] {
            reg.add(Category::Branch, Mat4::IDENTITY, owner);
        }
        let mut renderer = CpuInstanceRenderer::new();
        reg.build(&mut renderer);

        for frame in 0..100 {
            let lift = Mat4::from_translation(Vec3::Y * frame as f32);
            assert_eq!(reg.rewrite_owned(0, |base| lift * base), 3);
            reg.set_transform(Category::Branch, 1, lift);
        }
        assert_eq!(reg.batch(Category::Branch).dirty.len(), 3);

        let handle = reg.batch(Category::Branch).handle().expect("built");
        assert_eq!(reg.flush(&mut renderer), 3);
        let last = Mat4::from_translation(Vec3::Y * 99.0);
        assert_eq!(renderer.batch(handle).expect("batch").instances()[1], last);

        reg.set_transform(Category::Branch, 1, Mat4::IDENTITY);
        assert_eq!(reg.flush(&mut renderer), 1);
    }

    #[test]
    fn out_of_range_write_is_ignored() {
        let mut reg = InstanceRegistry::new();
        reg.add(Category::Branch, Mat4::IDENTITY, 0);
        assert!(!reg.set_transform(Category::Branch, 5, Mat4::ZERO));
        assert_eq!(reg.batch(Category::Branch).len(), 1);
    }

    #[test]
    fn owned_slots_use_spans_when_contiguous() {
        let mut batch = InstanceBatch::new(Category::Branch);
        for owner in [0, 0, 0, 1, 1, 2] {
            batch.add(Mat4::IDENTITY, owner);
        }
        assert!(batch.is_contiguous());
        assert_eq!(batch.owned_slots(0).collect::<Vec<_>>(), vec![0, 1, 2]);
        assert_eq!(batch.owned_slots(1).collect::<Vec<_>>(), vec![3, 4]);
        assert_eq!(batch.owned_slots(2).collect::<Vec<_>>(), vec![5]);
        assert_eq!(batch.owned_slots(9).count(), 0);
    }

    #[test]
    fn owned_slots_fall_back_to_scan_when_interleaved() {
        let mut batch = InstanceBatch::new(Category::Leaf);
        for owner in [0, 1, 0, 2, 1] {
            batch.add(Mat4::IDENTITY, owner);
        }
        assert!(!batch.is_contiguous());
        assert_eq!(batch.owned_slots(0).collect::<Vec<_>>(), vec![0, 2]);
        assert_eq!(batch.owned_slots(1).collect::<Vec<_>>(), vec![1, 4]);

        let n = batch.rewrite_owned(1, |_| Mat4::ZERO);
        assert_eq!(n, 2);
        assert_eq!(batch.transform_at(1), Some(Mat4::ZERO));
        assert_eq!(batch.transform_at(4), Some(Mat4::ZERO));
        assert_eq!(batch.transform_at(0), Some(Mat4::IDENTITY));
    }

    #[test]
    fn rewrite_owned_reads_from_base() {
        let mut reg = InstanceRegistry::new();
        reg.add(Category::Branch, branch_transform(Vec3::ZERO, Vec3::Y, 0.1), 3);
        reg.add(Category::Leaf, leaf_at(0.0), 3);
        reg.add(Category::Leaf, leaf_at(5.0), 4);

        let shift = Mat4::from_translation(Vec3::Z);
        assert_eq!(reg.rewrite_owned(3, |b| shift * b), 2);
        assert_eq!(reg.rewrite_owned(3, |b| shift * b), 2);

        assert_eq!(
            reg.transform_at(Category::Leaf, 0),
            Some(shift * leaf_at(0.0))
        );
        assert_eq!(reg.transform_at(Category::Leaf, 1), Some(leaf_at(5.0)));
    }

    #[test]
    fn pick_nearest_spans_partitions_and_skips_unpickable_owners() {
        let mut reg = InstanceRegistry::new();
        // Tree 0: trunk at x = 0. Tree 1: leaf at x = -3, in front of it.
        reg.add(
            Category::Branch,
            branch_transform(Vec3::new(0.0, -1.0, 0.0), Vec3::new(0.0, 1.0, 0.0), 0.5),
            0,
        );
        reg.add(Category::Leaf, leaf_at(-3.0), 1);

        let ray = Ray::new(Vec3::new(-10.0, 0.0, 0.0), Vec3::X).expect("ray");

        // Not built yet: nothing to intersect.
        let mut renderer = CpuInstanceRenderer::new();
        assert!(reg.pick_nearest(&ray, &renderer, |_| true).is_none());

        reg.build(&mut renderer);
        let hit = reg.pick_nearest(&ray, &renderer, |_| true).expect("hit");
        assert_eq!(hit.owner, 1);
        assert_eq!(hit.category, Category::Leaf);
        assert!((hit.distance - 6.5).abs() < 1e-4);

        let hit = reg.pick_nearest(&ray, &renderer, |o| o != 1).expect("hit");
        assert_eq!(hit.owner, 0);
        assert_eq!(hit.category, Category::Branch);
        assert!((hit.distance - 9.5).abs() < 1e-4);

        assert!(reg.pick_nearest(&ray, &renderer, |_| false).is_none());

        let miss = Ray::new(Vec3::new(-10.0, 30.0, 0.0), Vec3::X).expect("ray");
        assert!(reg.pick_nearest(&miss, &renderer, |_| true).is_none());
    }
}
