/// Identifier for a tree in a [`crate::population::Population`].
///
/// This is an index into the population's tree arena, and is only
/// meaningful within the lifetime of a given `Population` instance.
pub type TreeId = usize;

/// Index of one instance inside an [`crate::registry::InstanceBatch`].
///
/// Slot indices are assigned in insertion order and never change.
pub type SlotIndex = usize;

/// Visual kind of an instance; each kind owns one registry partition
/// and one instanced draw batch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Category {
    /// A unit cylinder stretched into a branch segment.
    Branch,
    /// A unit sphere scaled into a leaf cluster.
    Leaf,
}

impl Category {
    pub const ALL: [Category; 2] = [Category::Branch, Category::Leaf];

    #[inline]
    pub fn index(self) -> usize {
        match self {
            Category::Branch => 0,
            Category::Leaf => 1,
        }
    }
}
