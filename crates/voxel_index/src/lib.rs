//! N-dimensional bounded indexables.
//!
//! This crate provides the coordinate and storage abstractions shared by the
//! chunk cache, the serializers and the generation pipeline:
//! - [`Index`]: fixed-rank integer coordinates (1D–4D aliases)
//! - [`IndexingBounds`]: lower corner + dimensions, canonical iteration
//! - [`BoundedIndexable`] / [`BoundedIndexableMut`]: the access contract
//! - [`DenseArray`], [`ConstantArray`], [`OffsetArray`]: storage strategies
//! - [`ConstantTree`], [`SparseTree`]: hierarchical storage
//!
//! # Example
//!
//! ```
//! use voxel_index::{BoundedIndexable, BoundedIndexableMut, DenseArray, Index3D, IndexingBounds};
//!
//! let bounds = IndexingBounds::cube(Index3D::ZERO, 16);
//! let mut voxels = DenseArray::new(bounds, 0u16);
//! voxels.set(Index3D::new(1, 2, 3), 4);
//!
//! assert_eq!(voxels.get(Index3D::new(1, 2, 3)), 4);
//! assert_eq!(voxels.iter().filter(|(_, v)| *v != 0).count(), 1);
//! ```

pub mod bounds;
pub mod constant;
pub mod dense;
pub mod error;
pub mod index;
pub mod indexable;
pub mod offset;
pub mod tree;

pub use crate::bounds::{BoundsIter, IndexingBounds};
pub use crate::constant::ConstantArray;
pub use crate::dense::{Array1D, Array2D, Array3D, Array4D, DenseArray};
pub use crate::error::IndexError;
pub use crate::index::{Index, Index1D, Index2D, Index3D, Index4D};
pub use crate::indexable::{BoundedIndexable, BoundedIndexableMut, IndexableIter};
pub use crate::offset::OffsetArray;
pub use crate::tree::{
    BoundedTree, BoundedTreeMut, ConstantOctree, ConstantQuadtree, ConstantTree, SparseOctree,
    SparseQuadtree, SparseTree, MAX_TREE_DEPTH,
};
