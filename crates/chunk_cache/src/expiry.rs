//! Deferred disposal of unpinned cache entries.
//!
//! When an entry's last pin is released the cache hands an [`ExpiryToken`]
//! to the stash instead of tearing the value down. The stash decides when
//! the token must be expired:
//!
//! | capacity      | behaviour                                              |
//! |---------------|--------------------------------------------------------|
//! | `Instant`     | every token expires as soon as it is added             |
//! | `Unbounded`   | tokens queue until `pop_oldest`                        |
//! | `Bounded(n)`  | queue of at most `n`; when full, stale tokens are      |
//! |               | compacted away, then the oldest is forced out          |
//!
//! Expiry only tears an entry down if the token's version is still the
//! entry's current version. Re-pinning an entry bumps its version, so a
//! token issued before the re-pin is harmless.

use std::collections::VecDeque;

use crate::error::ConfigError;

/// How many expiry tokens a stash keeps before forcing expirations.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StashCapacity {
    Instant,
    Unbounded,
    Bounded(usize),
}

impl StashCapacity {
    /// `Some(0)` is `Instant`, `None` is `Unbounded`.
    pub fn from_len(len: Option<usize>) -> Self {
        match len {
            None => Self::Unbounded,
            Some(0) => Self::Instant,
            Some(n) => Self::Bounded(n),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        match self {
            Self::Bounded(0) => Err(ConfigError::new(
                "stash capacity",
                "a bounded stash needs room for at least one token (use Instant)",
            )),
            _ => Ok(()),
        }
    }
}

impl Default for StashCapacity {
    fn default() -> Self {
        Self::Unbounded
    }
}

/// A deferred-disposal ticket for one unpinned entry generation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExpiryToken<K> {
    key: K,
    entry: u64,
    version: u64,
}

impl<K> ExpiryToken<K> {
    pub fn new(key: K, entry: u64, version: u64) -> Self {
        Self {
            key,
            entry,
            version,
        }
    }

    pub fn key(&self) -> &K {
        &self.key
    }

    /// Identity of the entry the token was issued for. A key that is
    /// evicted and re-created gets a new entry id.
    pub fn entry(&self) -> u64 {
        self.entry
    }

    pub fn version(&self) -> u64 {
        self.version
    }
}

/// FIFO of expiry tokens with a capacity strategy.
#[derive(Debug)]
pub struct ExpiryStash<K> {
    capacity: StashCapacity,
    queue: VecDeque<ExpiryToken<K>>,
}

impl<K> ExpiryStash<K> {
    /// # Panics
    /// Panics on `Bounded(0)`.
    pub fn new(capacity: StashCapacity) -> Self {
        if let Err(err) = capacity.validate() {
            panic!("{err}");
        }
        Self {
            capacity,
            queue: VecDeque::new(),
        }
    }

    pub fn capacity(&self) -> StashCapacity {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Queue `token`, returning a token that must be expired right now, if
    /// any. `is_current` reports whether a queued token still refers to the
    /// current version of its entry; a full bounded stash drops tokens that
    /// are no longer current before evicting live ones.
    pub fn add(
        &mut self,
        token: ExpiryToken<K>,
        is_current: impl Fn(&ExpiryToken<K>) -> bool,
    ) -> Option<ExpiryToken<K>> {
        match self.capacity {
            StashCapacity::Instant => Some(token),
            StashCapacity::Unbounded => {
                self.queue.push_back(token);
                None
            }
            StashCapacity::Bounded(limit) => {
                if self.queue.len() >= limit {
                    self.queue.retain(|queued| is_current(queued));
                }
                let forced = if self.queue.len() >= limit {
                    self.queue.pop_front()
                } else {
                    None
                };
                self.queue.push_back(token);
                forced
            }
        }
    }

    /// Remove and return the oldest queued token.
    pub fn pop_oldest(&mut self) -> Option<ExpiryToken<K>> {
        self.queue.pop_front()
    }

    /// Remove every queued token, oldest first.
    pub fn drain(&mut self) -> impl Iterator<Item = ExpiryToken<K>> + '_ {
        self.queue.drain(..)
    }
}
