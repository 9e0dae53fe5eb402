//! Persisting chunks: conversion to storable form and the store contract.

use std::borrow::BorrowMut;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::Mutex;

use futures::future::{BoxFuture, FutureExt};
use log::trace;
use voxel_index::IndexingBounds;
use voxel_serial::{
    BinaryFormat, BoundsFormat, ByteRead, DeserializeError, Deserializer, Endianness,
    FixedConstantSerializer, PrimitiveSerializer, Serializer, SliceReader,
};

use crate::chunk::Chunk;
use crate::error::{GenerationError, StoreError};
use crate::key::ChunkKey;
use crate::phase::CancellationToken;
use crate::voxel::{voxel_grid_serializer, VoxelGrid, VoxelGridSerializer};

/// Converts chunks to and from a storable representation `P`.
pub trait ChunkPersister<C, P>: Send + Sync {
    fn to_persistable(&self, chunk: &C) -> Result<P, GenerationError>;

    /// Overwrite `chunk`'s data in place from `persistable`.
    fn from_persistable(&self, persistable: &P, chunk: &mut C) -> Result<(), GenerationError>;
}

/// Durable storage of persisted chunks keyed by `K`.
///
/// A missing key is `Ok(None)`, never an error.
pub trait ChunkStore<K, P>: Send + Sync {
    fn add_or_update_all<'a>(
        &'a self,
        chunks: Vec<P>,
        cancellation: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<(), StoreError>>;

    fn try_get<'a>(
        &'a self,
        key: &'a K,
        cancellation: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<Option<P>, StoreError>>;
}

impl<K, P, S: ChunkStore<K, P> + ?Sized> ChunkStore<K, P> for std::sync::Arc<S> {
    fn add_or_update_all<'a>(
        &'a self,
        chunks: Vec<P>,
        cancellation: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<(), StoreError>> {
        (**self).add_or_update_all(chunks, cancellation)
    }

    fn try_get<'a>(
        &'a self,
        key: &'a K,
        cancellation: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<Option<P>, StoreError>> {
        (**self).try_get(key, cancellation)
    }
}

/// Anything stored under a chunk key.
pub trait Keyed<K> {
    fn key(&self) -> &K;
}

/// A chunk's key and its serialized bytes.
#[derive(Clone, PartialEq, Eq)]
pub struct SerializedChunk<K> {
    pub key: K,
    pub bytes: Vec<u8>,
}

impl<K> Keyed<K> for SerializedChunk<K> {
    fn key(&self) -> &K {
        &self.key
    }
}

impl<K: fmt::Debug> fmt::Debug for SerializedChunk<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerializedChunk")
            .field("key", &self.key)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Current layout version of persisted voxel chunks.
pub const VOXEL_CHUNK_FORMAT_VERSION: u32 = 1;

/// Persists voxel chunks as a version header followed by every voxel in
/// canonical order.
pub struct VoxelChunkPersister {
    version: FixedConstantSerializer<PrimitiveSerializer<u32>>,
    grid: VoxelGridSerializer,
}

impl fmt::Debug for VoxelChunkPersister {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VoxelChunkPersister")
            .field("bounds", self.grid.format())
            .field("endianness", &self.grid.cell().endianness())
            .finish()
    }
}

impl VoxelChunkPersister {
    /// Persister for chunks whose local voxel bounds are `bounds`.
    pub fn new(bounds: IndexingBounds<3>, endianness: Endianness) -> Self {
        Self {
            version: FixedConstantSerializer::new(
                PrimitiveSerializer::new(endianness),
                VOXEL_CHUNK_FORMAT_VERSION,
            ),
            grid: voxel_grid_serializer(bounds, endianness),
        }
    }

    /// Exact byte length of one persisted chunk.
    pub fn persisted_len(&self) -> usize {
        let header = self.version.constant_len().unwrap_or(0);
        let cells = match self.grid.format() {
            BoundsFormat::Constant(bounds) => bounds.len(),
            _ => 0,
        };
        header + cells * self.grid.cell().constant_len().unwrap_or(0)
    }

    fn read(&self, bytes: &[u8], voxels: &mut VoxelGrid) -> Result<(), DeserializeError> {
        let mut reader = SliceReader::new(bytes);
        self.version.read(&mut reader)?;
        self.grid.read_into(&mut reader, voxels)?;
        match reader.remaining() {
            Some(0) | None => Ok(()),
            Some(extra) => Err(DeserializeError::TrailingBytes(extra)),
        }
    }
}

impl<R> ChunkPersister<Chunk<ChunkKey, R>, SerializedChunk<ChunkKey>> for VoxelChunkPersister
where
    R: BorrowMut<VoxelGrid>,
{
    fn to_persistable(
        &self,
        chunk: &Chunk<ChunkKey, R>,
    ) -> Result<SerializedChunk<ChunkKey>, GenerationError> {
        let mut bytes = Vec::with_capacity(self.persisted_len());
        self.version.write(&VOXEL_CHUNK_FORMAT_VERSION, &mut bytes);
        self.grid.write_indexable(chunk.voxels(), &mut bytes);
        Ok(SerializedChunk {
            key: chunk.key(),
            bytes,
        })
    }

    fn from_persistable(
        &self,
        persistable: &SerializedChunk<ChunkKey>,
        chunk: &mut Chunk<ChunkKey, R>,
    ) -> Result<(), GenerationError> {
        assert_eq!(
            persistable.key,
            chunk.key(),
            "persisted chunk restored into a chunk with a different key"
        );
        self.read(&persistable.bytes, chunk.voxels_mut())?;
        Ok(())
    }
}

/// A chunk store held in memory. Records the size of every batch written.
pub struct MemoryChunkStore<K, P> {
    chunks: Mutex<HashMap<K, P>>,
    batches: Mutex<Vec<usize>>,
}

impl<K, P> Default for MemoryChunkStore<K, P> {
    fn default() -> Self {
        Self {
            chunks: Mutex::new(HashMap::new()),
            batches: Mutex::new(Vec::new()),
        }
    }
}

impl<K, P> fmt::Debug for MemoryChunkStore<K, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryChunkStore")
            .field("chunks", &self.len())
            .field("batches", &self.batch_sizes().len())
            .finish()
    }
}

impl<K, P> MemoryChunkStore<K, P> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        lock(&self.chunks).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Size of each `add_or_update_all` call, in call order.
    pub fn batch_sizes(&self) -> Vec<usize> {
        lock(&self.batches).clone()
    }
}

impl<K: Eq + Hash + Clone, P: Keyed<K> + Clone> MemoryChunkStore<K, P> {
    pub fn get(&self, key: &K) -> Option<P> {
        lock(&self.chunks).get(key).cloned()
    }

    pub fn insert(&self, chunk: P) {
        lock(&self.chunks).insert(chunk.key().clone(), chunk);
    }
}

impl<K, P> ChunkStore<K, P> for MemoryChunkStore<K, P>
where
    K: Eq + Hash + Clone + fmt::Debug + Send + Sync,
    P: Keyed<K> + Clone + Send + Sync,
{
    fn add_or_update_all<'a>(
        &'a self,
        chunks: Vec<P>,
        cancellation: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<(), StoreError>> {
        async move {
            tokio::task::yield_now().await;
            cancellation.check(|| StoreError::Canceled)?;
            trace!("storing batch of {} chunks", chunks.len());
            lock(&self.batches).push(chunks.len());
            let mut stored = lock(&self.chunks);
            for chunk in chunks {
                stored.insert(chunk.key().clone(), chunk);
            }
            Ok(())
        }
        .boxed()
    }

    fn try_get<'a>(
        &'a self,
        key: &'a K,
        cancellation: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<Option<P>, StoreError>> {
        async move {
            cancellation.check(|| StoreError::Canceled)?;
            Ok(lock(&self.chunks).get(key).cloned())
        }
        .boxed()
    }
}

/// Lock a mutex, recovering the data if a panicking holder poisoned it.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::voxel::{empty_grid, Voxel};
    use voxel_index::{BoundedIndexableMut, Index3D};

    fn persister() -> VoxelChunkPersister {
        VoxelChunkPersister::new(IndexingBounds::cube(Index3D::ZERO, 4), Endianness::Big)
    }

    fn chunk(key: ChunkKey) -> Chunk<ChunkKey, VoxelGrid> {
        Chunk::new(key, empty_grid(IndexingBounds::cube(Index3D::ZERO, 4)))
    }

    #[test]
    fn persisted_chunk_has_header_and_cells() {
        let mut source = chunk(ChunkKey::new(1, 2, 3));
        source.voxels_mut().set(Index3D::new(0, 0, 1), Voxel::new(0x0a0b, 5));
        let persisted = persister().to_persistable(&source).unwrap();

        assert_eq!(persisted.key, ChunkKey::new(1, 2, 3));
        assert_eq!(persisted.bytes.len(), persister().persisted_len());
        assert_eq!(persisted.bytes.len(), 4 + 64 * 4);
        assert_eq!(&persisted.bytes[..4], &[0, 0, 0, 1]);
        assert_eq!(&persisted.bytes[8..12], &[0x0a, 0x0b, 0, 5]);
    }

    #[test]
    fn restores_in_place() {
        let mut source = chunk(ChunkKey::ZERO);
        source.voxels_mut().fill(Voxel::solid(4));
        let persisted = persister().to_persistable(&source).unwrap();

        let mut target = chunk(ChunkKey::ZERO);
        persister().from_persistable(&persisted, &mut target).unwrap();
        assert_eq!(target.voxels(), source.voxels());
    }

    #[test]
    fn wrong_version_is_an_error() {
        let mut persisted = persister().to_persistable(&chunk(ChunkKey::ZERO)).unwrap();
        persisted.bytes[3] = 9;
        let err = persister()
            .from_persistable(&persisted, &mut chunk(ChunkKey::ZERO))
            .unwrap_err();
        assert!(matches!(err, GenerationError::Deserialize(_)));
    }

    #[test]
    fn truncated_bytes_are_an_error() {
        let mut persisted = persister().to_persistable(&chunk(ChunkKey::ZERO)).unwrap();
        persisted.bytes.truncate(100);
        let mut target = chunk(ChunkKey::ZERO);
        assert!(persister().from_persistable(&persisted, &mut target).is_err());
    }

    #[tokio::test]
    async fn memory_store_records_batches() {
        let store = MemoryChunkStore::<ChunkKey, SerializedChunk<ChunkKey>>::new();
        let token = CancellationToken::new();
        let blob = |x| SerializedChunk {
            key: ChunkKey::new(x, 0, 0),
            bytes: vec![x as u8],
        };
        store.add_or_update_all(vec![blob(1), blob(2)], &token).await.unwrap();
        store.add_or_update_all(vec![blob(2)], &token).await.unwrap();

        assert_eq!(store.batch_sizes(), vec![2, 1]);
        assert_eq!(store.len(), 2);
        let found = store.try_get(&ChunkKey::new(1, 0, 0), &token).await.unwrap();
        assert_eq!(found, Some(blob(1)));
        let missing = store.try_get(&ChunkKey::new(9, 0, 0), &token).await.unwrap();
        assert_eq!(missing, None);
    }

    #[tokio::test]
    async fn memory_store_observes_cancellation() {
        let store = MemoryChunkStore::<ChunkKey, SerializedChunk<ChunkKey>>::new();
        let token = CancellationToken::new();
        token.cancel();
        let result = store.add_or_update_all(vec![], &token).await;
        assert!(matches!(result, Err(StoreError::Canceled)));
        assert!(store.batch_sizes().is_empty());
    }
}
