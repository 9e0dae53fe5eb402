//! Chunk keys and the chunk grid that maps them to voxels and world space.

use std::fmt;

use glam::Vec3;
use voxel_index::{Index2D, Index3D, IndexingBounds};

/// Key of a 3D chunk in chunk space (not voxel or world space).
///
/// Keys can be negative to support worlds extending in every direction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct ChunkKey(pub Index3D);

/// Key of a column of chunks seen from above: the chunk key without Y.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct ChunkOverheadKey(pub Index2D);

impl ChunkKey {
    pub const ZERO: ChunkKey = ChunkKey(Index3D::ZERO);

    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self(Index3D::new(x, y, z))
    }

    pub const fn index(&self) -> Index3D {
        self.0
    }

    pub const fn x(&self) -> i32 {
        self.0.x()
    }

    pub const fn y(&self) -> i32 {
        self.0.y()
    }

    pub const fn z(&self) -> i32 {
        self.0.z()
    }

    /// The column this chunk belongs to.
    pub const fn to_overhead_key(&self) -> ChunkOverheadKey {
        ChunkOverheadKey(self.0.project_down())
    }

    /// The 6 face-adjacent neighbors, in order +X, -X, +Y, -Y, +Z, -Z.
    pub fn neighbors(&self) -> [ChunkKey; 6] {
        let (x, y, z) = (self.x(), self.y(), self.z());
        [
            ChunkKey::new(x + 1, y, z),
            ChunkKey::new(x - 1, y, z),
            ChunkKey::new(x, y + 1, z),
            ChunkKey::new(x, y - 1, z),
            ChunkKey::new(x, y, z + 1),
            ChunkKey::new(x, y, z - 1),
        ]
    }
}

impl ChunkOverheadKey {
    pub const fn new(x: i32, z: i32) -> Self {
        Self(Index2D::new(x, z))
    }

    pub const fn index(&self) -> Index2D {
        self.0
    }

    pub const fn x(&self) -> i32 {
        self.0.x()
    }

    /// The Z coordinate (second component of the overhead index).
    pub const fn z(&self) -> i32 {
        self.0.y()
    }

    /// The chunk of this column at height `y`.
    pub const fn with_y(&self, y: i32) -> ChunkKey {
        ChunkKey(self.0.lift(y))
    }
}

impl From<Index3D> for ChunkKey {
    fn from(index: Index3D) -> Self {
        Self(index)
    }
}

impl From<Index2D> for ChunkOverheadKey {
    fn from(index: Index2D) -> Self {
        Self(index)
    }
}

impl From<ChunkKey> for ChunkOverheadKey {
    fn from(key: ChunkKey) -> Self {
        key.to_overhead_key()
    }
}

impl fmt::Display for ChunkKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "chunk {}", self.0)
    }
}

impl fmt::Display for ChunkOverheadKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "column {}", self.0)
    }
}

/// Size of chunks in voxels and of voxels in world units.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ChunkGrid {
    /// Voxels per chunk along each axis.
    pub chunk_size: i32,
    /// World units per voxel.
    pub voxel_size: f32,
}

impl Default for ChunkGrid {
    fn default() -> Self {
        Self {
            chunk_size: 32,
            voxel_size: 1.0,
        }
    }
}

impl ChunkGrid {
    /// # Panics
    /// Panics unless both sizes are positive.
    pub fn new(chunk_size: i32, voxel_size: f32) -> Self {
        assert!(chunk_size > 0, "chunk size must be positive, got {chunk_size}");
        assert!(voxel_size > 0.0, "voxel size must be positive, got {voxel_size}");
        Self {
            chunk_size,
            voxel_size,
        }
    }

    fn chunk_world_size(&self) -> f32 {
        self.chunk_size as f32 * self.voxel_size
    }

    /// Bounds of one chunk's local voxel storage: `[0, chunk_size)` per axis.
    pub fn local_bounds(&self) -> IndexingBounds<3> {
        IndexingBounds::cube(Index3D::ZERO, self.chunk_size)
    }

    /// Bounds of one column's local overhead storage.
    pub fn local_overhead_bounds(&self) -> IndexingBounds<2> {
        IndexingBounds::cube(Index2D::ZERO, self.chunk_size)
    }

    /// Chunk containing a world-space position.
    ///
    /// # Example
    /// ```
    /// use chunk_gen::{ChunkGrid, ChunkKey};
    /// use glam::Vec3;
    ///
    /// let grid = ChunkGrid::new(16, 0.5);
    /// assert_eq!(grid.key_at_world(Vec3::new(7.9, 0.0, -0.1)), ChunkKey::new(0, 0, -1));
    /// assert_eq!(grid.key_at_world(Vec3::new(8.0, 0.0, 0.0)), ChunkKey::new(1, 0, 0));
    /// ```
    pub fn key_at_world(&self, position: Vec3) -> ChunkKey {
        let chunk = (position / self.chunk_world_size()).floor();
        ChunkKey::new(chunk.x as i32, chunk.y as i32, chunk.z as i32)
    }

    /// Chunk containing a voxel. Uses Euclidean division so negative voxels
    /// land in negative chunks.
    pub fn key_at_voxel(&self, voxel: Index3D) -> ChunkKey {
        ChunkKey(voxel.div_euclid(Index3D::splat(self.chunk_size)))
    }

    /// Position of a voxel inside its chunk, in `[0, chunk_size)`.
    pub fn voxel_to_local(&self, voxel: Index3D) -> Index3D {
        voxel.rem_euclid(Index3D::splat(self.chunk_size))
    }

    /// Voxel coordinates of the chunk's minimum corner.
    pub fn voxel_origin(&self, key: ChunkKey) -> Index3D {
        key.0 * self.chunk_size
    }

    /// Overhead voxel coordinates of the column's minimum corner.
    pub fn overhead_voxel_origin(&self, key: ChunkOverheadKey) -> Index2D {
        key.0 * self.chunk_size
    }

    /// Voxel bounds of a chunk in stage coordinates.
    pub fn voxel_bounds(&self, key: ChunkKey) -> IndexingBounds<3> {
        self.local_bounds().translated(self.voxel_origin(key))
    }

    /// World-space minimum corner of a chunk.
    pub fn origin_world(&self, key: ChunkKey) -> Vec3 {
        Vec3::new(key.x() as f32, key.y() as f32, key.z() as f32) * self.chunk_world_size()
    }

    /// World-space center of a chunk.
    pub fn center_world(&self, key: ChunkKey) -> Vec3 {
        self.origin_world(key) + Vec3::splat(self.chunk_world_size() * 0.5)
    }

    /// World-space center of a voxel given in stage coordinates.
    pub fn voxel_center_world(&self, voxel: Index3D) -> Vec3 {
        (Vec3::new(voxel.x() as f32, voxel.y() as f32, voxel.z() as f32) + Vec3::splat(0.5))
            * self.voxel_size
    }

    /// Squared distance from a chunk's center to a world position.
    pub fn distance_squared_to(&self, key: ChunkKey, position: Vec3) -> f32 {
        self.center_world(key).distance_squared(position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid() -> ChunkGrid {
        ChunkGrid::new(62, 1.0)
    }

    #[test]
    fn overhead_key_drops_y() {
        let key = ChunkKey::new(3, -7, 9);
        assert_eq!(key.to_overhead_key(), ChunkOverheadKey::new(3, 9));
        assert_eq!(key.to_overhead_key().with_y(-7), key);
    }

    #[test]
    fn neighbors_returns_six() {
        let neighbors = ChunkKey::new(5, 10, 15).neighbors();
        assert_eq!(neighbors[0], ChunkKey::new(6, 10, 15));
        assert_eq!(neighbors[1], ChunkKey::new(4, 10, 15));
        assert_eq!(neighbors[2], ChunkKey::new(5, 11, 15));
        assert_eq!(neighbors[3], ChunkKey::new(5, 9, 15));
        assert_eq!(neighbors[4], ChunkKey::new(5, 10, 16));
        assert_eq!(neighbors[5], ChunkKey::new(5, 10, 14));
    }

    #[test]
    fn key_at_world_positive() {
        assert_eq!(grid().key_at_world(Vec3::ZERO), ChunkKey::ZERO);
        assert_eq!(grid().key_at_world(Vec3::splat(31.0)), ChunkKey::ZERO);
        assert_eq!(grid().key_at_world(Vec3::new(62.0, 0.0, 0.0)), ChunkKey::new(1, 0, 0));
    }

    #[test]
    fn key_at_world_negative() {
        assert_eq!(grid().key_at_world(Vec3::new(-0.1, 0.0, 0.0)), ChunkKey::new(-1, 0, 0));
        assert_eq!(grid().key_at_world(Vec3::splat(-100.0)), ChunkKey::new(-2, -2, -2));
    }

    #[test]
    fn key_at_voxel_uses_euclidean_division() {
        assert_eq!(grid().key_at_voxel(Index3D::new(61, 61, 61)), ChunkKey::ZERO);
        assert_eq!(grid().key_at_voxel(Index3D::new(62, 0, 0)), ChunkKey::new(1, 0, 0));
        assert_eq!(grid().key_at_voxel(Index3D::new(-1, 0, 0)), ChunkKey::new(-1, 0, 0));
        assert_eq!(grid().key_at_voxel(Index3D::new(-62, 0, 0)), ChunkKey::new(-1, 0, 0));
        assert_eq!(grid().key_at_voxel(Index3D::new(-63, 0, 0)), ChunkKey::new(-2, 0, 0));
    }

    #[test]
    fn voxel_to_local_wraps_negative_voxels() {
        assert_eq!(grid().voxel_to_local(Index3D::new(63, 1, 2)), Index3D::new(1, 1, 2));
        assert_eq!(grid().voxel_to_local(Index3D::new(-1, 0, 0)), Index3D::new(61, 0, 0));
        assert_eq!(grid().voxel_to_local(Index3D::new(-62, 0, 0)), Index3D::ZERO);
    }

    #[test]
    fn voxel_bounds_start_at_chunk_origin() {
        let grid = ChunkGrid::new(16, 1.0);
        let bounds = grid.voxel_bounds(ChunkKey::new(-1, 2, 0));
        assert_eq!(bounds.lower(), Index3D::new(-16, 32, 0));
        assert_eq!(bounds.upper(), Index3D::new(-1, 47, 15));
    }

    #[test]
    fn center_and_distance() {
        let center = grid().center_world(ChunkKey::new(1, 0, 0));
        assert_eq!(center, Vec3::new(93.0, 31.0, 31.0));
        assert!(grid().distance_squared_to(ChunkKey::ZERO, Vec3::splat(31.0)) < 0.001);
        let expected = 31.0 * 31.0 * 3.0;
        assert!((grid().distance_squared_to(ChunkKey::ZERO, Vec3::ZERO) - expected).abs() < 0.001);
    }

    #[test]
    #[should_panic(expected = "chunk size must be positive")]
    fn zero_chunk_size_panics() {
        ChunkGrid::new(0, 1.0);
    }
}
