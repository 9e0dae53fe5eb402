//! A string-keyed store for scalar statistics shared between phases.

use std::collections::BTreeMap;
use std::fmt;
use std::marker::PhantomData;
use std::str::FromStr;
use std::sync::Mutex;

use futures::future::{BoxFuture, FutureExt};

use crate::error::StoreError;
use crate::persist::lock;

/// A named, typed value stored as a string.
pub struct ValueKey<T> {
    name: &'static str,
    format: fn(&T) -> String,
    parse: fn(&str) -> Option<T>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for ValueKey<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for ValueKey<T> {}

impl<T> fmt::Debug for ValueKey<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ValueKey").field(&self.name).finish()
    }
}

impl<T> ValueKey<T> {
    pub const fn new(
        name: &'static str,
        format: fn(&T) -> String,
        parse: fn(&str) -> Option<T>,
    ) -> Self {
        Self {
            name,
            format,
            parse,
            _marker: PhantomData,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn format(&self, value: &T) -> String {
        (self.format)(value)
    }

    pub fn parse(&self, raw: &str) -> Option<T> {
        (self.parse)(raw)
    }
}

impl<T: ToString + FromStr> ValueKey<T> {
    /// Key using `T`'s `Display`/`FromStr` round trip.
    pub fn parsed(name: &'static str) -> Self {
        Self::new(name, |value| value.to_string(), |raw| raw.parse().ok())
    }
}

/// Raw string storage behind [`KeyValueStoreExt`].
pub trait KeyValueStore: Send + Sync {
    fn try_get_raw<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<String>, StoreError>>;

    fn add_or_update_raw<'a>(
        &'a self,
        key: &'a str,
        value: String,
    ) -> BoxFuture<'a, Result<(), StoreError>>;
}

/// Typed access to a [`KeyValueStore`].
pub trait KeyValueStoreExt: KeyValueStore {
    /// `Ok(None)` when absent; [`StoreError::Corrupt`] when the stored string
    /// does not parse.
    fn try_get<'a, T: Send + 'a>(
        &'a self,
        key: &'a ValueKey<T>,
    ) -> BoxFuture<'a, Result<Option<T>, StoreError>> {
        async move {
            let Some(raw) = self.try_get_raw(key.name()).await? else {
                return Ok(None);
            };
            match key.parse(&raw) {
                Some(value) => Ok(Some(value)),
                None => Err(StoreError::Corrupt {
                    key: key.name().to_string(),
                    value: raw,
                }),
            }
        }
        .boxed()
    }

    fn add_or_update<'a, T>(
        &'a self,
        key: &'a ValueKey<T>,
        value: &T,
    ) -> BoxFuture<'a, Result<(), StoreError>> {
        let raw = key.format(value);
        self.add_or_update_raw(key.name(), raw)
    }
}

impl<S: KeyValueStore + ?Sized> KeyValueStoreExt for S {}

impl<S: KeyValueStore + ?Sized> KeyValueStore for std::sync::Arc<S> {
    fn try_get_raw<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<String>, StoreError>> {
        (**self).try_get_raw(key)
    }

    fn add_or_update_raw<'a>(
        &'a self,
        key: &'a str,
        value: String,
    ) -> BoxFuture<'a, Result<(), StoreError>> {
        (**self).add_or_update_raw(key, value)
    }
}

/// In-memory [`KeyValueStore`].
#[derive(Debug, Default)]
pub struct MemoryKeyValueStore {
    values: Mutex<BTreeMap<String, String>>,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every stored pair, sorted by key.
    pub fn snapshot(&self) -> BTreeMap<String, String> {
        lock(&self.values).clone()
    }
}

impl KeyValueStore for MemoryKeyValueStore {
    fn try_get_raw<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<String>, StoreError>> {
        let value = lock(&self.values).get(key).cloned();
        futures::future::ready(Ok(value)).boxed()
    }

    fn add_or_update_raw<'a>(
        &'a self,
        key: &'a str,
        value: String,
    ) -> BoxFuture<'a, Result<(), StoreError>> {
        lock(&self.values).insert(key.to_string(), value);
        futures::future::ready(Ok(())).boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn max_top() -> ValueKey<f32> {
        ValueKey::parsed("sky_island.max_top")
    }

    #[tokio::test]
    async fn typed_round_trip() {
        let store = MemoryKeyValueStore::new();
        assert_eq!(store.try_get(&max_top()).await.unwrap(), None);

        store.add_or_update(&max_top(), &42.5).await.unwrap();
        assert_eq!(store.try_get(&max_top()).await.unwrap(), Some(42.5));
        assert_eq!(store.snapshot()["sky_island.max_top"], "42.5");
    }

    #[tokio::test]
    async fn unparsable_value_is_corrupt() {
        let store = MemoryKeyValueStore::new();
        store.add_or_update_raw(max_top().name(), "tall".to_string()).await.unwrap();
        match store.try_get(&max_top()).await {
            Err(StoreError::Corrupt { key, value }) => {
                assert_eq!(key, "sky_island.max_top");
                assert_eq!(value, "tall");
            }
            other => panic!("expected corrupt value, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn custom_format() {
        let bounds: ValueKey<(i32, i32)> = ValueKey::new(
            "bounds",
            |(lo, hi)| format!("{lo}..{hi}"),
            |raw| {
                let (lo, hi) = raw.split_once("..")?;
                Some((lo.parse().ok()?, hi.parse().ok()?))
            },
        );
        let store = MemoryKeyValueStore::new();
        store.add_or_update(&bounds, &(-3, 7)).await.unwrap();
        assert_eq!(store.snapshot()["bounds"], "-3..7");
        assert_eq!(store.try_get(&bounds).await.unwrap(), Some((-3, 7)));
    }
}
