//! Overhead height maps describing floating islands.

use voxel_index::{Array2D, BoundedIndexable, Index2D, IndexingBounds};

/// Per-column heights of a floating island, in world units.
///
/// A column with `top <= bottom` has no island.
#[derive(Clone, Debug, PartialEq)]
pub struct SkyIslandMaps {
    pub top: Array2D<f32>,
    pub bottom: Array2D<f32>,
}

impl SkyIslandMaps {
    /// Flat, empty maps for a column of `chunk_size` × `chunk_size` voxels.
    pub fn new(chunk_size: i32) -> Self {
        let bounds = IndexingBounds::cube(Index2D::ZERO, chunk_size);
        Self {
            top: Array2D::new(bounds, 0.0),
            bottom: Array2D::new(bounds, 0.0),
        }
    }

    pub fn chunk_size(&self) -> i32 {
        self.top.bounds().dimensions().x()
    }

    /// Reset both maps to zero.
    pub fn clear(&mut self) {
        self.top.fill(0.0);
        self.bottom.fill(0.0);
    }

    /// Island thickness at a column-local index.
    pub fn thickness(&self, index: Index2D) -> f32 {
        (self.top.get(index) - self.bottom.get(index)).max(0.0)
    }
}

/// Range of heights observed over every column of a stage.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SkyIslandHeightRange {
    pub min_top: f32,
    pub max_top: f32,
    pub min_bottom: f32,
    pub max_bottom: f32,
}

impl Default for SkyIslandHeightRange {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl SkyIslandHeightRange {
    /// The identity for [`merge`](Self::merge).
    pub const EMPTY: Self = Self {
        min_top: f32::INFINITY,
        max_top: f32::NEG_INFINITY,
        min_bottom: f32::INFINITY,
        max_bottom: f32::NEG_INFINITY,
    };

    pub fn is_empty(&self) -> bool {
        self.min_top > self.max_top
    }

    /// Range of one column chunk's maps.
    pub fn of_maps(maps: &SkyIslandMaps) -> Self {
        let mut range = Self::EMPTY;
        for (index, top) in maps.top.iter() {
            let bottom = maps.bottom.get(index);
            range.min_top = range.min_top.min(top);
            range.max_top = range.max_top.max(top);
            range.min_bottom = range.min_bottom.min(bottom);
            range.max_bottom = range.max_bottom.max(bottom);
        }
        range
    }

    pub fn merge(self, other: Self) -> Self {
        Self {
            min_top: self.min_top.min(other.min_top),
            max_top: self.max_top.max(other.max_top),
            min_bottom: self.min_bottom.min(other.min_bottom),
            max_bottom: self.max_bottom.max(other.max_bottom),
        }
    }
}
