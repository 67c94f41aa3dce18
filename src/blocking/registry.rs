use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use crate::{error::BlockError, utils::clock::Clock};

/// Display form of an active block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockStatus {
    pub key: String,
    pub expires_at: DateTime<Utc>,
    /// Rounded up, so an active block never shows 0.
    pub minutes_remaining: i64,
}

/// Authoritative state of what is currently blocked.
///
/// Keys are lowercased fragments of process names. An entry whose expiry has passed is treated as
/// absent by every reader, but stays in the map until something touches it. The lock is never held
/// across I/O.
pub struct BlockRegistry {
    entries: Mutex<HashMap<String, DateTime<Utc>>>,
    clock: Arc<dyn Clock>,
}

impl BlockRegistry {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock,
        }
    }

    /// Blocks `key` for `minutes` starting now. A later call always wins, even if it shortens the
    /// block.
    pub fn block(&self, key: &str, minutes: u32) -> Result<DateTime<Utc>, BlockError> {
        let key = normalize_key(key).ok_or(BlockError::EmptyKey)?;
        let expiry = self.clock.time() + Duration::minutes(i64::from(minutes));
        debug!("Blocking {key} until {expiry}");
        self.entries().insert(key, expiry);
        Ok(expiry)
    }

    /// Evicts the entry if it already expired.
    pub fn is_blocked(&self, key: &str) -> bool {
        let Some(key) = normalize_key(key) else {
            return false;
        };
        let now = self.clock.time();
        let mut entries = self.entries();
        match entries.get(&key) {
            Some(expiry) if *expiry > now => true,
            Some(_) => {
                entries.remove(&key);
                false
            }
            None => false,
        }
    }

    /// Returns whether there was anything to remove.
    pub fn unblock(&self, key: &str) -> bool {
        normalize_key(key)
            .map(|key| self.entries().remove(&key).is_some())
            .unwrap_or(false)
    }

    /// Active blocks ordered by key. Doesn't evict anything.
    pub fn snapshot(&self) -> Vec<BlockStatus> {
        let now = self.clock.time();
        let mut statuses = self
            .entries()
            .iter()
            .filter_map(|(key, expiry)| {
                let remaining = (*expiry - now).num_seconds();
                let minutes_remaining = (remaining + 59).div_euclid(60);
                (remaining > 0).then(|| BlockStatus {
                    key: key.clone(),
                    expires_at: *expiry,
                    minutes_remaining,
                })
            })
            .collect::<Vec<_>>();
        statuses.sort_by(|a, b| a.key.cmp(&b.key));
        statuses
    }

    /// Point-in-time list of blocked keys. Expired entries are evicted on the way.
    pub fn active_keys(&self) -> Vec<String> {
        let now = self.clock.time();
        let mut entries = self.entries();
        entries.retain(|_, expiry| *expiry > now);
        entries.keys().cloned().collect()
    }

    /// Removes every expired entry, returning how many were removed.
    pub fn sweep(&self) -> usize {
        let now = self.clock.time();
        let mut entries = self.entries();
        let before = entries.len();
        entries.retain(|_, expiry| *expiry > now);
        before - entries.len()
    }

    #[cfg(test)]
    fn stored_len(&self) -> usize {
        self.entries().len()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, DateTime<Utc>>> {
        // Every critical section leaves the map consistent, so a poisoned lock is still usable.
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn normalize_key(key: &str) -> Option<String> {
    let key = key.trim().to_lowercase();
    (!key.is_empty()).then_some(key)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Duration;

    use crate::{error::BlockError, utils::clock::test_clock::TestClock};

    use super::BlockRegistry;

    fn registry() -> (Arc<TestClock>, BlockRegistry) {
        let clock = Arc::new(TestClock::new());
        let registry = BlockRegistry::new(clock.clone());
        (clock, registry)
    }

    #[test]
    fn test_block_and_expire() {
        let (clock, registry) = registry();
        registry.block("Chrome", 10).unwrap();
        assert!(registry.is_blocked("chrome"));
        assert_eq!(registry.stored_len(), 1);

        clock.advance(Duration::minutes(10) + Duration::seconds(1));

        assert!(!registry.is_blocked("chrome"));
        assert_eq!(registry.stored_len(), 0);
    }

    #[test]
    fn test_last_write_wins() {
        let (clock, registry) = registry();
        registry.block("chrome", 30).unwrap();
        registry.block("chrome", 5).unwrap();

        clock.advance(Duration::minutes(6));

        assert!(!registry.is_blocked("chrome"));
    }

    #[test]
    fn test_snapshot_is_not_destructive() {
        let (clock, registry) = registry();
        registry.block("steam", 1).unwrap();
        registry.block("reddit", 20).unwrap();

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].key, "reddit");
        assert_eq!(snapshot[0].minutes_remaining, 20);

        clock.advance(Duration::minutes(2));

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].key, "reddit");
        assert_eq!(snapshot[0].minutes_remaining, 18);
        // The expired entry is still stored until something evicts it.
        assert_eq!(registry.stored_len(), 2);
        assert_eq!(registry.sweep(), 1);
        assert_eq!(registry.stored_len(), 1);
    }

    #[test]
    fn test_active_keys_evicts() {
        let (clock, registry) = registry();
        registry.block("steam", 1).unwrap();
        registry.block("reddit", 20).unwrap();
        clock.advance(Duration::minutes(1));

        assert_eq!(registry.active_keys(), vec!["reddit".to_string()]);
        assert_eq!(registry.stored_len(), 1);
    }

    #[test]
    fn test_unblock() {
        let (_, registry) = registry();
        registry.block("steam", 60).unwrap();
        assert!(registry.unblock("STEAM"));
        assert!(!registry.unblock("steam"));
        assert!(!registry.is_blocked("steam"));
    }

    #[test]
    fn test_empty_key_rejected() {
        let (_, registry) = registry();
        assert_eq!(registry.block("  ", 5), Err(BlockError::EmptyKey));
        assert!(registry.active_keys().is_empty());
    }
}
