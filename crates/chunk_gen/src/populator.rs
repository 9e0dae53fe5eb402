//! Populators fill freshly borrowed chunk resources with data.

use std::borrow::BorrowMut;
use std::fmt;
use std::marker::PhantomData;

use futures::future::{BoxFuture, FutureExt};
use glam::DVec3;
use log::trace;
use voxel_index::{BoundedIndexable, BoundedIndexableMut};

use crate::chunk::Chunk;
use crate::error::GenerationError;
use crate::external::Noise;
use crate::key::{ChunkGrid, ChunkKey, ChunkOverheadKey};
use crate::persist::{ChunkPersister, ChunkStore};
use crate::phase::CancellationToken;
use crate::sky_island::SkyIslandMaps;
use crate::voxel::{MaterialId, Voxel, VoxelGrid};

/// Fills a chunk's resources synchronously.
pub trait ChunkPopulator<C>: Send + Sync {
    fn populate(&self, chunk: &mut C) -> Result<(), GenerationError>;
}

/// Fills a chunk's resources, possibly waiting on I/O.
pub trait AsyncChunkPopulator<C>: Send + Sync {
    fn populate<'a>(&'a self, chunk: &'a mut C) -> BoxFuture<'a, Result<(), GenerationError>>;
}

impl<C, P: AsyncChunkPopulator<C> + ?Sized> AsyncChunkPopulator<C> for std::sync::Arc<P> {
    fn populate<'a>(&'a self, chunk: &'a mut C) -> BoxFuture<'a, Result<(), GenerationError>> {
        (**self).populate(chunk)
    }
}

/// Runs a synchronous populator where an async one is expected.
#[derive(Clone, Debug)]
pub struct SyncPopulator<P>(pub P);

impl<C: Send, P: ChunkPopulator<C>> AsyncChunkPopulator<C> for SyncPopulator<P> {
    fn populate<'a>(&'a self, chunk: &'a mut C) -> BoxFuture<'a, Result<(), GenerationError>> {
        futures::future::ready(self.0.populate(chunk)).boxed()
    }
}

/// Fills every voxel with one value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UniformPopulator {
    pub voxel: Voxel,
}

impl UniformPopulator {
    pub fn new(voxel: Voxel) -> Self {
        Self { voxel }
    }

    pub fn material(material: MaterialId) -> Self {
        Self::new(Voxel::solid(material))
    }
}

impl<R: BorrowMut<VoxelGrid>> ChunkPopulator<Chunk<ChunkKey, R>> for UniformPopulator {
    fn populate(&self, chunk: &mut Chunk<ChunkKey, R>) -> Result<(), GenerationError> {
        chunk.voxels_mut().fill(self.voxel);
        Ok(())
    }
}

/// Samples a density field at every voxel center. Voxels with positive
/// density become `material`, the rest air.
pub struct NoisePopulator<N> {
    noise: N,
    grid: ChunkGrid,
    material: MaterialId,
    density_scale: f64,
}

impl<N> fmt::Debug for NoisePopulator<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NoisePopulator")
            .field("grid", &self.grid)
            .field("material", &self.material)
            .finish_non_exhaustive()
    }
}

impl<N: Noise> NoisePopulator<N> {
    pub fn new(noise: N, grid: ChunkGrid, material: MaterialId) -> Self {
        Self {
            noise,
            grid,
            material,
            density_scale: i16::MAX as f64,
        }
    }

    /// Multiplier from noise output to stored `i16` density.
    pub fn with_density_scale(mut self, scale: f64) -> Self {
        self.density_scale = scale;
        self
    }

    fn voxel_at(&self, density: f64) -> Voxel {
        let stored = (density * self.density_scale).clamp(i16::MIN as f64, i16::MAX as f64) as i16;
        if density > 0.0 {
            Voxel::new(self.material, stored)
        } else {
            Voxel::new(Voxel::AIR.material, stored)
        }
    }
}

impl<N: Noise, R: BorrowMut<VoxelGrid>> ChunkPopulator<Chunk<ChunkKey, R>> for NoisePopulator<N> {
    fn populate(&self, chunk: &mut Chunk<ChunkKey, R>) -> Result<(), GenerationError> {
        let mut stage = chunk.stage_voxels_mut();
        let bounds = stage.bounds();
        for voxel in bounds.iter() {
            let center = self.grid.voxel_center_world(voxel).as_dvec3();
            stage.try_set(voxel, self.voxel_at(self.noise.sample(center)))?;
        }
        Ok(())
    }
}

/// Loads chunks from a store, falling back to another populator for chunks
/// that were never persisted.
pub struct StoredChunkPopulator<K, P, S, Pe, F> {
    store: S,
    persister: Pe,
    fallback: F,
    cancellation: CancellationToken,
    _marker: PhantomData<fn(K, P)>,
}

impl<K, P, S, Pe, F> fmt::Debug for StoredChunkPopulator<K, P, S, Pe, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoredChunkPopulator").finish_non_exhaustive()
    }
}

impl<K, P, S, Pe, F> StoredChunkPopulator<K, P, S, Pe, F> {
    /// Store lookups observe `cancellation`.
    pub fn new(store: S, persister: Pe, fallback: F, cancellation: CancellationToken) -> Self {
        Self {
            store,
            persister,
            fallback,
            cancellation,
            _marker: PhantomData,
        }
    }
}

impl<K, R, P, S, Pe, F> AsyncChunkPopulator<Chunk<K, R>> for StoredChunkPopulator<K, P, S, Pe, F>
where
    K: Copy + fmt::Debug + Send + Sync,
    R: Send,
    P: Send,
    S: ChunkStore<K, P>,
    Pe: ChunkPersister<Chunk<K, R>, P>,
    F: AsyncChunkPopulator<Chunk<K, R>>,
{
    fn populate<'a>(
        &'a self,
        chunk: &'a mut Chunk<K, R>,
    ) -> BoxFuture<'a, Result<(), GenerationError>> {
        async move {
            let key = chunk.key();
            match self.store.try_get(&key, &self.cancellation).await? {
                Some(persisted) => {
                    trace!("loaded {key:?} from store");
                    self.persister.from_persistable(&persisted, chunk)
                }
                None => self.fallback.populate(chunk).await,
            }
        }
        .boxed()
    }
}

/// Shape of generated floating islands.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SkyIslandShape {
    /// Height islands are centered on.
    pub mid_height: f32,
    /// Height above `mid_height` at full noise strength.
    pub top_amplitude: f32,
    /// Depth below `mid_height` at full noise strength.
    pub bottom_amplitude: f32,
    /// World units to noise units.
    pub noise_scale: f64,
}

impl Default for SkyIslandShape {
    fn default() -> Self {
        Self {
            mid_height: 128.0,
            top_amplitude: 16.0,
            bottom_amplitude: 48.0,
            noise_scale: 1.0 / 64.0,
        }
    }
}

/// Fills sky-island height maps from a 2D slice of a noise field.
///
/// Positive noise raises an island around `mid_height`; elsewhere top and
/// bottom meet at `mid_height` (no island).
pub struct SkyIslandMapPopulator<N> {
    noise: N,
    grid: ChunkGrid,
    shape: SkyIslandShape,
}

impl<N> fmt::Debug for SkyIslandMapPopulator<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SkyIslandMapPopulator")
            .field("grid", &self.grid)
            .field("shape", &self.shape)
            .finish_non_exhaustive()
    }
}

impl<N: Noise> SkyIslandMapPopulator<N> {
    pub fn new(noise: N, grid: ChunkGrid, shape: SkyIslandShape) -> Self {
        Self { noise, grid, shape }
    }
}

impl<N: Noise, R: BorrowMut<SkyIslandMaps>> ChunkPopulator<Chunk<ChunkOverheadKey, R>>
    for SkyIslandMapPopulator<N>
{
    fn populate(&self, chunk: &mut Chunk<ChunkOverheadKey, R>) -> Result<(), GenerationError> {
        let origin = self.grid.overhead_voxel_origin(chunk.key());
        let maps = chunk.maps_mut();
        let bounds = maps.top.bounds();
        for local in bounds.iter() {
            let column = origin + local;
            let position = DVec3::new(
                (column.x() as f64 + 0.5) * self.grid.voxel_size as f64,
                self.shape.mid_height as f64,
                (column.y() as f64 + 0.5) * self.grid.voxel_size as f64,
            ) * self.shape.noise_scale;
            let strength = self.noise.sample(position).clamp(0.0, 1.0) as f32;
            maps.top.try_set(local, self.shape.mid_height + strength * self.shape.top_amplitude)?;
            maps.bottom
                .try_set(local, self.shape.mid_height - strength * self.shape.bottom_amplitude)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persist::{MemoryChunkStore, SerializedChunk, VoxelChunkPersister};
    use crate::voxel::empty_grid;
    use voxel_index::{Index2D, Index3D, IndexingBounds};
    use voxel_serial::Endianness;

    fn grid() -> ChunkGrid {
        ChunkGrid::new(4, 1.0)
    }

    fn chunk(key: ChunkKey) -> Chunk<ChunkKey, VoxelGrid> {
        Chunk::new(key, empty_grid(grid().local_bounds()))
    }

    #[test]
    fn uniform_fills_everything() {
        let mut chunk = chunk(ChunkKey::ZERO);
        ChunkPopulator::populate(&UniformPopulator::material(3), &mut chunk).unwrap();
        assert!(chunk.voxels().iter().all(|(_, v)| v == Voxel::solid(3)));
    }

    #[test]
    fn noise_is_sampled_in_world_space() {
        // Solid below y = 4 in world space.
        let ground = |p: DVec3| 4.0 - p.y;
        let populator = NoisePopulator::new(ground, grid(), 2).with_density_scale(1.0);

        let mut low = chunk(ChunkKey::ZERO);
        ChunkPopulator::populate(&populator, &mut low).unwrap();
        assert!(low.voxels().iter().all(|(_, v)| v.material == 2));

        let mut high = chunk(ChunkKey::new(0, 1, 0));
        ChunkPopulator::populate(&populator, &mut high).unwrap();
        assert!(high.voxels().iter().all(|(_, v)| v.is_empty()));
        assert_eq!(high.voxels().get(Index3D::ZERO).density, 0);
    }

    #[tokio::test]
    async fn stored_chunks_take_precedence() {
        let store = MemoryChunkStore::<ChunkKey, SerializedChunk<ChunkKey>>::new();
        let persister = VoxelChunkPersister::new(grid().local_bounds(), Endianness::Little);
        let mut saved = chunk(ChunkKey::new(1, 0, 0));
        saved.voxels_mut().set(Index3D::new(1, 1, 1), Voxel::solid(9));
        store.insert(persister.to_persistable(&saved).unwrap());

        let populator = StoredChunkPopulator::new(
            store,
            persister,
            SyncPopulator(UniformPopulator::material(5)),
            CancellationToken::new(),
        );

        let mut loaded = chunk(ChunkKey::new(1, 0, 0));
        AsyncChunkPopulator::populate(&populator, &mut loaded).await.unwrap();
        assert_eq!(loaded.voxels(), saved.voxels());

        let mut generated = chunk(ChunkKey::new(2, 0, 0));
        AsyncChunkPopulator::populate(&populator, &mut generated).await.unwrap();
        assert!(generated.voxels().iter().all(|(_, v)| v == Voxel::solid(5)));
    }

    #[tokio::test]
    async fn canceled_store_lookup_fails() {
        let token = CancellationToken::new();
        token.cancel();
        let populator = StoredChunkPopulator::new(
            MemoryChunkStore::<ChunkKey, SerializedChunk<ChunkKey>>::new(),
            VoxelChunkPersister::new(grid().local_bounds(), Endianness::Little),
            SyncPopulator(UniformPopulator::material(5)),
            token,
        );
        let mut target = chunk(ChunkKey::ZERO);
        let err = AsyncChunkPopulator::populate(&populator, &mut target).await.unwrap_err();
        assert!(matches!(err, GenerationError::Store(_)));
    }

    #[test]
    fn sky_island_maps_follow_noise() {
        let island_east = |p: DVec3| if p.x > 0.0 { 1.0 } else { -1.0 };
        let shape = SkyIslandShape {
            mid_height: 100.0,
            top_amplitude: 10.0,
            bottom_amplitude: 30.0,
            noise_scale: 1.0,
        };
        let populator = SkyIslandMapPopulator::new(island_east, grid(), shape);

        let mut east = Chunk::new(ChunkOverheadKey::new(0, 0), SkyIslandMaps::new(4));
        populator.populate(&mut east).unwrap();
        assert_eq!(east.maps().top.get(Index2D::new(1, 1)), 110.0);
        assert_eq!(east.maps().bottom.get(Index2D::new(1, 1)), 70.0);

        let mut west = Chunk::new(ChunkOverheadKey::new(-1, 0), SkyIslandMaps::new(4));
        populator.populate(&mut west).unwrap();
        assert_eq!(west.maps().thickness(Index2D::new(3, 0)), 0.0);
        assert_eq!(west.maps().top.bounds(), IndexingBounds::cube(Index2D::ZERO, 4));
    }
}
