//! A pool paired with an expiry stash sized from its capacity.

use crate::error::ConfigError;
use crate::expiry::{ExpiryStash, StashCapacity};
use crate::pool::{Pool, PoolConfig, PoolHooks};

/// Sizing of a [`PoolStash`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PoolStashConfig {
    pub pool: PoolConfig,
    /// Stash capacity as a multiple of the pool capacity. `0` expires
    /// unpinned values immediately.
    pub stash_capacity_multiplier: usize,
}

impl Default for PoolStashConfig {
    fn default() -> Self {
        Self {
            pool: PoolConfig::bounded(64),
            stash_capacity_multiplier: 2,
        }
    }
}

impl PoolStashConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.pool.validate()?;
        if let Some(capacity) = self.pool.capacity {
            if capacity.checked_mul(self.stash_capacity_multiplier).is_none() {
                return Err(ConfigError::new(
                    "stash capacity multiplier",
                    format!("{} x {capacity} overflows", self.stash_capacity_multiplier),
                ));
            }
        }
        Ok(())
    }

    /// Stash strategy: `multiplier × pool capacity` tokens, unbounded when
    /// the pool is unbounded, instant when the multiplier is zero.
    pub fn stash_capacity(&self) -> StashCapacity {
        match (self.pool.capacity, self.stash_capacity_multiplier) {
            (_, 0) => StashCapacity::Instant,
            (None, _) => StashCapacity::Unbounded,
            (Some(capacity), multiplier) => {
                StashCapacity::from_len(capacity.checked_mul(multiplier))
            }
        }
    }
}

/// A resource pool and the matching stash strategy for a cache of values
/// built from that pool, so evicted-but-unexpired entries never outnumber
/// a small multiple of the pool.
#[derive(Debug)]
pub struct PoolStash<T> {
    pool: Pool<T>,
    stash_capacity: StashCapacity,
}

impl<T> Clone for PoolStash<T> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            stash_capacity: self.stash_capacity,
        }
    }
}

impl<T> PoolStash<T> {
    /// # Panics
    /// Panics if `config` is invalid.
    pub fn new(config: PoolStashConfig, pool: Pool<T>) -> Self {
        if let Err(err) = config.validate() {
            panic!("{err}");
        }
        assert_eq!(
            pool.bounded_capacity(),
            config.pool.capacity,
            "pool capacity differs from the pool stash config"
        );
        Self {
            pool,
            stash_capacity: config.stash_capacity(),
        }
    }

    /// Builds a pre-filled pool for a bounded config, or an empty one.
    pub fn filled(config: PoolStashConfig, hooks: PoolHooks<T>, factory: impl FnMut() -> T) -> Self {
        let pool = match config.pool.capacity {
            Some(_) => Pool::filled(config.pool, hooks, factory),
            None => Pool::with_hooks(config.pool, hooks),
        };
        Self::new(config, pool)
    }

    pub fn pool(&self) -> &Pool<T> {
        &self.pool
    }

    pub fn stash_capacity(&self) -> StashCapacity {
        self.stash_capacity
    }

    /// A fresh stash with this pool's capacity strategy.
    pub fn new_stash<K>(&self) -> ExpiryStash<K> {
        ExpiryStash::new(self.stash_capacity)
    }

    pub fn close(&self) {
        self.pool.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stash_capacity_scales_with_pool() {
        let config = PoolStashConfig {
            pool: PoolConfig::bounded(8),
            stash_capacity_multiplier: 3,
        };
        assert_eq!(config.stash_capacity(), StashCapacity::Bounded(24));
    }

    #[test]
    fn zero_multiplier_is_instant() {
        let config = PoolStashConfig {
            pool: PoolConfig::bounded(8),
            stash_capacity_multiplier: 0,
        };
        assert_eq!(config.stash_capacity(), StashCapacity::Instant);
    }

    #[test]
    fn unbounded_pool_gets_unbounded_stash() {
        let config = PoolStashConfig {
            pool: PoolConfig::unbounded(),
            stash_capacity_multiplier: 4,
        };
        assert_eq!(config.stash_capacity(), StashCapacity::Unbounded);
    }

    #[test]
    fn overflowing_multiplier_is_invalid() {
        let config = PoolStashConfig {
            pool: PoolConfig::bounded(usize::MAX >> 4),
            stash_capacity_multiplier: usize::MAX,
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn filled_pool_stash_shares_its_pool() {
        let stash = PoolStash::filled(PoolStashConfig::default(), PoolHooks::new(), || 0u8);
        assert_eq!(stash.pool().available_count(), 64);
        let clone = stash.clone();
        clone.pool().try_take().unwrap();
        assert_eq!(stash.pool().available_count(), 63);
        assert_eq!(stash.new_stash::<u32>().capacity(), StashCapacity::Bounded(128));
    }
}
