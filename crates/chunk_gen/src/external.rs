//! Interfaces of collaborators that live outside this crate: procedural
//! noise and surface extraction.

use glam::DVec3;

use crate::error::GenerationError;
use crate::key::ChunkKey;
use crate::voxel::VoxelGrid;

/// A density field sampled at world positions.
pub trait Noise: Send + Sync {
    fn sample(&self, position: DVec3) -> f64;
}

impl<F> Noise for F
where
    F: Fn(DVec3) -> f64 + Send + Sync,
{
    fn sample(&self, position: DVec3) -> f64 {
        self(position)
    }
}

/// A mesh that can be split into pieces small enough for one draw call.
pub trait DivisibleMesh: Send + Sized + 'static {
    fn vertex_count(&self) -> usize;

    /// Split into pieces of at most `max_vertices` vertices each.
    fn divide(self, max_vertices: usize) -> Vec<Self>;
}

/// Extracts a surface mesh from a chunk's voxels.
pub trait Contour: Send + Sync + 'static {
    type Mesh: DivisibleMesh;

    fn contour(&self, key: ChunkKey, voxels: &VoxelGrid) -> Result<Self::Mesh, GenerationError>;
}
