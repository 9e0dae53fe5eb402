use std::borrow::Borrow;
use std::fmt;

use futures::future::{BoxFuture, FutureExt};
use log::trace;

use super::ChunkProcessor;
use crate::chunk::Chunk;
use crate::error::GenerationError;
use crate::external::{Contour, DivisibleMesh};
use crate::key::ChunkKey;
use crate::voxel::VoxelGrid;

/// Receives the meshes of each contoured chunk.
pub trait MeshSink<M>: Send + Sync {
    /// `meshes` is empty when the chunk has no surface.
    fn accept(&self, key: ChunkKey, meshes: Vec<M>) -> BoxFuture<'_, Result<(), GenerationError>>;
}

impl<M, S: MeshSink<M> + ?Sized> MeshSink<M> for std::sync::Arc<S> {
    fn accept(&self, key: ChunkKey, meshes: Vec<M>) -> BoxFuture<'_, Result<(), GenerationError>> {
        (**self).accept(key, meshes)
    }
}

/// Contours each chunk's voxels and hands the mesh to a sink, split into
/// pieces of at most `max_vertices` vertices.
pub struct ContourProcessor<Ct, S> {
    contour: Ct,
    sink: S,
    max_vertices: usize,
}

impl<Ct, S> fmt::Debug for ContourProcessor<Ct, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContourProcessor")
            .field("max_vertices", &self.max_vertices)
            .finish_non_exhaustive()
    }
}

impl<Ct: Contour, S: MeshSink<Ct::Mesh>> ContourProcessor<Ct, S> {
    /// 16-bit index buffers cap a mesh at this many vertices.
    pub const DEFAULT_MAX_VERTICES: usize = u16::MAX as usize + 1;

    pub fn new(contour: Ct, sink: S) -> Self {
        Self::with_max_vertices(contour, sink, Self::DEFAULT_MAX_VERTICES)
    }

    /// # Panics
    /// Panics if `max_vertices` is zero.
    pub fn with_max_vertices(contour: Ct, sink: S, max_vertices: usize) -> Self {
        assert!(max_vertices > 0, "max vertices must be positive");
        Self {
            contour,
            sink,
            max_vertices,
        }
    }

    fn split(&self, mesh: Ct::Mesh) -> Vec<Ct::Mesh> {
        match mesh.vertex_count() {
            0 => Vec::new(),
            n if n <= self.max_vertices => vec![mesh],
            _ => mesh.divide(self.max_vertices),
        }
    }
}

impl<Ct, S, R> ChunkProcessor<Chunk<ChunkKey, R>> for ContourProcessor<Ct, S>
where
    Ct: Contour,
    S: MeshSink<Ct::Mesh>,
    R: Borrow<VoxelGrid> + Sync,
{
    fn process_chunk<'a>(
        &'a self,
        chunk: &'a Chunk<ChunkKey, R>,
    ) -> BoxFuture<'a, Result<(), GenerationError>> {
        let key = chunk.key();
        let meshes = match self.contour.contour(key, chunk.voxels()) {
            Ok(mesh) => self.split(mesh),
            Err(err) => return futures::future::ready(Err(err)).boxed(),
        };
        trace!("contoured {key} into {} meshes", meshes.len());
        self.sink.accept(key, meshes)
    }
}
