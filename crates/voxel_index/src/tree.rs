//! Hierarchical (octree / quadtree) indexables.
//!
//! A tree covers a power-of-two hypercube of side `2^max_depth`. Depth 0 is
//! the root node covering the whole cube; depth `max_depth` addresses single
//! cells. Rank 2 gives a quadtree, rank 3 an octree.
//!
//! # Node rules for [`SparseTree`]
//!
//! ```text
//! set_node(index, depth, v)
//!   walk from the root towards `depth`
//!   ├─ leaf above `depth`   → split: allocate 2^N children, each a copy of
//!   │                          the leaf value
//!   ├─ reached `depth`      → replace the node with Leaf(v), dropping any
//!   │                          subtree below it
//!   └─ unwinding            → a branch whose children are all leaves with
//!                              equal values collapses into one leaf
//! ```

use crate::bounds::IndexingBounds;
use crate::error::IndexError;
use crate::index::Index;
use crate::indexable::{BoundedIndexable, BoundedIndexableMut};

/// Largest supported depth; keeps the cube side inside `i32`.
pub const MAX_TREE_DEPTH: u8 = 30;

/// Node-level access shared by tree indexables.
pub trait BoundedTree<const N: usize>: BoundedIndexable<N> {
    /// Depth of single-cell nodes.
    fn max_depth(&self) -> u8;

    /// Value of the node at `depth` covering `index`.
    ///
    /// Returns the enclosing leaf's value when the tree is coarser than
    /// `depth` there, and `None` when the node at `depth` is subdivided or
    /// `index` is out of bounds.
    fn get_node(&self, index: Index<N>, depth: u8) -> Option<Self::Value>;
}

/// Node-level writes.
pub trait BoundedTreeMut<const N: usize>: BoundedTree<N> {
    /// Make the node at `depth` covering `index` a leaf holding `value`.
    fn set_node(&mut self, index: Index<N>, depth: u8, value: Self::Value) -> Result<(), IndexError>;
}

fn tree_bounds<const N: usize>(lower: Index<N>, max_depth: u8) -> IndexingBounds<N> {
    assert!(
        max_depth <= MAX_TREE_DEPTH,
        "tree depth {max_depth} exceeds {MAX_TREE_DEPTH}"
    );
    IndexingBounds::cube(lower, 1 << max_depth)
}

/// Read-only tree made of a single implicit root leaf.
///
/// Behaves like a [`ConstantArray`](crate::ConstantArray) over the tree's
/// cube; every node at every depth reports the same value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConstantTree<T, const N: usize> {
    bounds: IndexingBounds<N>,
    max_depth: u8,
    value: T,
}

pub type ConstantQuadtree<T> = ConstantTree<T, 2>;
pub type ConstantOctree<T> = ConstantTree<T, 3>;

impl<T: Clone, const N: usize> ConstantTree<T, N> {
    pub fn new(lower: Index<N>, max_depth: u8, value: T) -> Self {
        Self {
            bounds: tree_bounds(lower, max_depth),
            max_depth,
            value,
        }
    }

    pub fn value(&self) -> &T {
        &self.value
    }
}

impl<T: Clone, const N: usize> BoundedIndexable<N> for ConstantTree<T, N> {
    type Value = T;

    fn bounds(&self) -> IndexingBounds<N> {
        self.bounds
    }

    fn try_get(&self, index: Index<N>) -> Option<T> {
        self.bounds.contains(index).then(|| self.value.clone())
    }
}

impl<T: Clone, const N: usize> BoundedIndexableMut<N> for ConstantTree<T, N> {
    fn try_set(&mut self, _index: Index<N>, _value: T) -> Result<(), IndexError> {
        Err(IndexError::Unsupported)
    }
}

impl<T: Clone, const N: usize> BoundedTree<N> for ConstantTree<T, N> {
    fn max_depth(&self) -> u8 {
        self.max_depth
    }

    fn get_node(&self, index: Index<N>, depth: u8) -> Option<T> {
        assert!(depth <= self.max_depth, "depth {depth} exceeds max depth {}", self.max_depth);
        self.try_get(index)
    }
}

impl<T: Clone, const N: usize> BoundedTreeMut<N> for ConstantTree<T, N> {
    fn set_node(&mut self, _index: Index<N>, _depth: u8, _value: T) -> Result<(), IndexError> {
        Err(IndexError::Unsupported)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Node<T> {
    Leaf(T),
    Branch(Box<[Node<T>]>),
}

impl<T> Node<T> {
    fn count(&self) -> usize {
        match self {
            Node::Leaf(_) => 1,
            Node::Branch(children) => 1 + children.iter().map(Node::count).sum::<usize>(),
        }
    }
}

/// Mutable sparse tree storing uniform regions as single leaves.
///
/// See the module docs for the split and collapse rules.
///
/// # Example
/// ```
/// use voxel_index::{BoundedIndexable, BoundedTree, BoundedTreeMut, Index3D, SparseOctree};
///
/// let mut tree = SparseOctree::new(Index3D::ZERO, 4, 0u8);
/// tree.set_node(Index3D::new(0, 0, 0), 1, 9).unwrap();
/// assert_eq!(tree.get(Index3D::new(7, 7, 7)), 9);
/// assert_eq!(tree.get(Index3D::new(8, 0, 0)), 0);
/// assert_eq!(tree.get_node(Index3D::ZERO, 0), None);
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SparseTree<T, const N: usize> {
    bounds: IndexingBounds<N>,
    max_depth: u8,
    root: Node<T>,
}

pub type SparseQuadtree<T> = SparseTree<T, 2>;
pub type SparseOctree<T> = SparseTree<T, 3>;

impl<T: Clone + PartialEq, const N: usize> SparseTree<T, N> {
    /// Create a tree whose whole cube holds `value`.
    pub fn new(lower: Index<N>, max_depth: u8, value: T) -> Self {
        assert!(N <= 8, "rank {N} trees would need more than 256 children per node");
        Self {
            bounds: tree_bounds(lower, max_depth),
            max_depth,
            root: Node::Leaf(value),
        }
    }

    /// Total number of allocated nodes (leaves and branches).
    pub fn node_count(&self) -> usize {
        self.root.count()
    }

    /// Whether the whole tree is a single leaf.
    pub fn is_uniform(&self) -> bool {
        matches!(self.root, Node::Leaf(_))
    }

    /// Child slot of `relative` when descending from `level` to `level + 1`.
    fn child_slot(&self, relative: Index<N>, level: u8) -> usize {
        let shift = self.max_depth - level - 1;
        let mut slot = 0;
        for d in 0..N {
            let bit = (relative.get(d) >> shift) & 1;
            slot = (slot << 1) | bit as usize;
        }
        slot
    }

    fn set_recursive(&self, node: &mut Node<T>, relative: Index<N>, level: u8, target: u8, value: T) {
        if level == target {
            *node = Node::Leaf(value);
            return;
        }
        if let Node::Leaf(current) = node {
            let current = current.clone();
            let children: Vec<Node<T>> = (0..1usize << N).map(|_| Node::Leaf(current.clone())).collect();
            *node = Node::Branch(children.into_boxed_slice());
        }
        let Node::Branch(children) = node else {
            unreachable!("leaf was split above");
        };
        let slot = self.child_slot(relative, level);
        self.set_recursive(&mut children[slot], relative, level + 1, target, value);

        let collapsed = match &children[0] {
            Node::Leaf(first) => children
                .iter()
                .all(|child| matches!(child, Node::Leaf(v) if v == first))
                .then(|| first.clone()),
            Node::Branch(_) => None,
        };
        if let Some(uniform) = collapsed {
            *node = Node::Leaf(uniform);
        }
    }
}

impl<T: Clone + PartialEq, const N: usize> BoundedIndexable<N> for SparseTree<T, N> {
    type Value = T;

    fn bounds(&self) -> IndexingBounds<N> {
        self.bounds
    }

    fn try_get(&self, index: Index<N>) -> Option<T> {
        self.get_node(index, self.max_depth)
    }
}

impl<T: Clone + PartialEq, const N: usize> BoundedIndexableMut<N> for SparseTree<T, N> {
    fn try_set(&mut self, index: Index<N>, value: T) -> Result<(), IndexError> {
        self.set_node(index, self.max_depth, value)
    }
}

impl<T: Clone + PartialEq, const N: usize> BoundedTree<N> for SparseTree<T, N> {
    fn max_depth(&self) -> u8 {
        self.max_depth
    }

    fn get_node(&self, index: Index<N>, depth: u8) -> Option<T> {
        assert!(depth <= self.max_depth, "depth {depth} exceeds max depth {}", self.max_depth);
        if !self.bounds.contains(index) {
            return None;
        }
        let relative = index - self.bounds.lower();
        let mut node = &self.root;
        let mut level = 0;
        loop {
            match node {
                Node::Leaf(value) => return Some(value.clone()),
                Node::Branch(_) if level == depth => return None,
                Node::Branch(children) => {
                    node = &children[self.child_slot(relative, level)];
                    level += 1;
                }
            }
        }
    }
}

impl<T: Clone + PartialEq, const N: usize> BoundedTreeMut<N> for SparseTree<T, N> {
    fn set_node(&mut self, index: Index<N>, depth: u8, value: T) -> Result<(), IndexError> {
        assert!(depth <= self.max_depth, "depth {depth} exceeds max depth {}", self.max_depth);
        if !self.bounds.contains(index) {
            return Err(IndexError::invalid(index, &self.bounds));
        }
        let relative = index - self.bounds.lower();
        let mut root = std::mem::replace(&mut self.root, Node::Branch(Box::new([])));
        self.set_recursive(&mut root, relative, 0, depth, value);
        self.root = root;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{Index2D, Index3D};

    #[test]
    fn constant_tree_reports_value_at_every_depth() {
        let tree = ConstantOctree::new(Index3D::splat(-4), 3, 5u8);
        assert_eq!(tree.bounds().dimensions(), Index3D::splat(8));
        for depth in 0..=3 {
            assert_eq!(tree.get_node(Index3D::new(3, 3, 3), depth), Some(5));
        }
        assert_eq!(tree.get_node(Index3D::new(4, 0, 0), 0), None);
    }

    #[test]
    fn constant_tree_rejects_writes() {
        let mut tree = ConstantQuadtree::new(Index2D::ZERO, 2, 1u8);
        assert_eq!(tree.set_node(Index2D::ZERO, 0, 2), Err(IndexError::Unsupported));
        assert_eq!(tree.try_set(Index2D::ZERO, 2), Err(IndexError::Unsupported));
    }

    #[test]
    fn single_cell_write_splits_down_to_max_depth() {
        let mut tree = SparseQuadtree::new(Index2D::ZERO, 2, 0u8);
        tree.set(Index2D::new(3, 0), 1);
        // root branch + 4 children at depth 1, one of which split into 4
        assert_eq!(tree.node_count(), 1 + 4 + 4);
        assert_eq!(tree.get(Index2D::new(3, 0)), 1);
        assert_eq!(tree.get(Index2D::new(2, 0)), 0);
        assert_eq!(tree.get(Index2D::new(0, 3)), 0);
    }

    #[test]
    fn uniform_children_collapse_into_parent() {
        let mut tree = SparseQuadtree::new(Index2D::ZERO, 1, 0u8);
        for index in tree.bounds().iter() {
            tree.set(index, 7);
        }
        assert!(tree.is_uniform());
        assert_eq!(tree.node_count(), 1);
        assert_eq!(tree.get_node(Index2D::ZERO, 0), Some(7));
    }

    #[test]
    fn coarse_set_replaces_subtree() {
        let mut tree = SparseOctree::new(Index3D::ZERO, 3, 0u8);
        tree.set(Index3D::new(1, 1, 1), 4);
        tree.set(Index3D::new(2, 2, 2), 5);
        tree.set_node(Index3D::ZERO, 1, 9).unwrap();
        for index in IndexingBounds::cube(Index3D::ZERO, 4).iter() {
            assert_eq!(tree.get(index), 9);
        }
        assert_eq!(tree.get_node(Index3D::ZERO, 1), Some(9));
        assert_eq!(tree.get_node(Index3D::ZERO, 0), None);
        assert_eq!(tree.node_count(), 1 + 8);
    }

    #[test]
    fn sparse_tree_matches_dense_array_under_random_writes() {
        use crate::dense::DenseArray;
        use rand::Rng;

        let mut rng = rand::thread_rng();
        let lower = Index3D::new(-4, 0, 4);
        let mut tree = SparseOctree::new(lower, 3, 0u8);
        let mut dense = DenseArray::new(tree.bounds(), 0u8);
        for _ in 0..300 {
            let index = lower
                + Index3D::new(rng.gen_range(0..8), rng.gen_range(0..8), rng.gen_range(0..8));
            let value = rng.gen_range(0..3);
            tree.set(index, value);
            dense.set(index, value);
        }
        for (index, value) in dense.iter() {
            assert_eq!(tree.get(index), value, "mismatch at {index}");
        }
    }

    #[test]
    fn out_of_bounds_write_is_invalid_index() {
        let mut tree = SparseQuadtree::new(Index2D::ZERO, 1, 0u8);
        assert!(matches!(
            tree.set_node(Index2D::new(2, 0), 1, 1),
            Err(IndexError::InvalidIndex { .. })
        ));
    }
}
