//! Aggregates sky island heights over a stage and stores the range for
//! later phases.

use std::borrow::Borrow;
use std::fmt;
use std::sync::Mutex;

use futures::future::{self, BoxFuture, FutureExt};
use log::info;

use super::ChunkProcessor;
use crate::chunk::Chunk;
use crate::error::{GenerationError, StoreError};
use crate::key::ChunkOverheadKey;
use crate::persist::lock;
use crate::sky_island::{SkyIslandHeightRange, SkyIslandMaps};
use crate::stats_store::{KeyValueStore, KeyValueStoreExt, ValueKey};

fn format_height(value: &f32) -> String {
    value.to_string()
}

fn parse_height(raw: &str) -> Option<f32> {
    raw.parse().ok()
}

/// Store keys of the sky island height range.
#[derive(Clone, Copy, Debug)]
pub struct SkyIslandStatKeys;

impl SkyIslandStatKeys {
    pub const MIN_TOP: ValueKey<f32> = ValueKey::new("sky_island.min_top", format_height, parse_height);
    pub const MAX_TOP: ValueKey<f32> = ValueKey::new("sky_island.max_top", format_height, parse_height);
    pub const MIN_BOTTOM: ValueKey<f32> =
        ValueKey::new("sky_island.min_bottom", format_height, parse_height);
    pub const MAX_BOTTOM: ValueKey<f32> =
        ValueKey::new("sky_island.max_bottom", format_height, parse_height);

    pub async fn store<S: KeyValueStore + ?Sized>(
        store: &S,
        range: &SkyIslandHeightRange,
    ) -> Result<(), StoreError> {
        store.add_or_update(&Self::MIN_TOP, &range.min_top).await?;
        store.add_or_update(&Self::MAX_TOP, &range.max_top).await?;
        store.add_or_update(&Self::MIN_BOTTOM, &range.min_bottom).await?;
        store.add_or_update(&Self::MAX_BOTTOM, &range.max_bottom).await
    }

    /// The stored range, or `None` unless all four values are present.
    pub async fn load<S: KeyValueStore + ?Sized>(
        store: &S,
    ) -> Result<Option<SkyIslandHeightRange>, StoreError> {
        let (Some(min_top), Some(max_top), Some(min_bottom), Some(max_bottom)) = (
            store.try_get(&Self::MIN_TOP).await?,
            store.try_get(&Self::MAX_TOP).await?,
            store.try_get(&Self::MIN_BOTTOM).await?,
            store.try_get(&Self::MAX_BOTTOM).await?,
        ) else {
            return Ok(None);
        };
        Ok(Some(SkyIslandHeightRange {
            min_top,
            max_top,
            min_bottom,
            max_bottom,
        }))
    }
}

/// Merges the height range of every processed column and stores it when
/// the phase completes. An empty stage stores nothing.
pub struct SkyIslandStatsProcessor<S> {
    store: S,
    range: Mutex<SkyIslandHeightRange>,
}

impl<S> fmt::Debug for SkyIslandStatsProcessor<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SkyIslandStatsProcessor")
            .field("range", &self.range())
            .finish_non_exhaustive()
    }
}

impl<S> SkyIslandStatsProcessor<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            range: Mutex::new(SkyIslandHeightRange::EMPTY),
        }
    }

    /// Range merged so far.
    pub fn range(&self) -> SkyIslandHeightRange {
        *lock(&self.range)
    }
}

impl<S, R> ChunkProcessor<Chunk<ChunkOverheadKey, R>> for SkyIslandStatsProcessor<S>
where
    S: KeyValueStore,
    R: Borrow<SkyIslandMaps> + Sync,
{
    fn process_chunk<'a>(
        &'a self,
        chunk: &'a Chunk<ChunkOverheadKey, R>,
    ) -> BoxFuture<'a, Result<(), GenerationError>> {
        let column = SkyIslandHeightRange::of_maps(chunk.maps());
        let mut range = lock(&self.range);
        *range = range.merge(column);
        future::ready(Ok(())).boxed()
    }

    fn on_completed(&self) -> BoxFuture<'_, Result<(), GenerationError>> {
        async move {
            let range = self.range();
            if range.is_empty() {
                return Ok(());
            }
            SkyIslandStatKeys::store(&self.store, &range).await?;
            info!(
                "sky island tops span {}..{}, bottoms span {}..{}",
                range.min_top, range.max_top, range.min_bottom, range.max_bottom
            );
            Ok(())
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats_store::MemoryKeyValueStore;
    use std::sync::Arc;
    use voxel_index::{BoundedIndexableMut, Index2D};

    fn column(x: i32, top: f32, bottom: f32) -> Chunk<ChunkOverheadKey, SkyIslandMaps> {
        let mut maps = SkyIslandMaps::new(2);
        maps.top.set(Index2D::new(1, 1), top);
        maps.bottom.set(Index2D::new(1, 1), bottom);
        Chunk::new(ChunkOverheadKey::new(x, 0), maps)
    }

    #[tokio::test]
    async fn merges_columns_and_stores_on_completion() {
        let store = Arc::new(MemoryKeyValueStore::new());
        let processor = SkyIslandStatsProcessor::new(Arc::clone(&store));
        processor.process_chunk(&column(0, 20.0, -4.0)).await.unwrap();
        processor.process_chunk(&column(1, 35.5, -1.0)).await.unwrap();
        assert!(SkyIslandStatKeys::load(&*store).await.unwrap().is_none());

        ChunkProcessor::<Chunk<ChunkOverheadKey, SkyIslandMaps>>::on_completed(&processor)
            .await
            .unwrap();
        let stored = SkyIslandStatKeys::load(&*store).await.unwrap().unwrap();
        assert_eq!(stored, processor.range());
        assert_eq!(stored.max_top, 35.5);
        assert_eq!(stored.min_bottom, -4.0);
        assert_eq!(store.snapshot()["sky_island.max_top"], "35.5");
    }

    #[tokio::test]
    async fn empty_stage_stores_nothing() {
        let store = Arc::new(MemoryKeyValueStore::new());
        let processor = SkyIslandStatsProcessor::new(Arc::clone(&store));
        ChunkProcessor::<Chunk<ChunkOverheadKey, SkyIslandMaps>>::on_completed(&processor)
            .await
            .unwrap();
        assert!(store.snapshot().is_empty());
    }
}
