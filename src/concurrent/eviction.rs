use crate::config::ConcurrentEvictionListConfig;
use crate::eviction::{EvictPredicate, EvictionList, Segment};
use crate::metrics::{CacheMetrics, EvictionStats};
use core::borrow::Borrow;
use core::hash::{BuildHasher, Hash};
use parking_lot::Mutex;
use std::collections::BTreeMap;

#[cfg(feature = "hashbrown")]
use hashbrown::DefaultHashBuilder;

#[cfg(not(feature = "hashbrown"))]
use std::collections::hash_map::RandomState as DefaultHashBuilder;

/// A thread-safe two-list eviction list with sharded storage.
pub struct ConcurrentEvictionList<K, V, S = DefaultHashBuilder> {
    shards: Box<[Mutex<EvictionList<K, V, S>>]>,
    hash_builder: S,
}

impl<K, V> ConcurrentEvictionList<K, V, DefaultHashBuilder>
where
    K: Hash + Eq + Clone + Send,
    V: Send,
{
    /// Creates a concurrent list from a configuration.
    ///
    /// The whole-list bounds are split evenly across shards.
    pub fn init(config: ConcurrentEvictionListConfig, hasher: Option<DefaultHashBuilder>) -> Self {
        Self::build(config, hasher.unwrap_or_default(), None)
    }

    /// Creates a concurrent list whose shards share one eviction predicate.
    pub fn with_eviction_predicate(
        config: ConcurrentEvictionListConfig,
        can_evict: EvictPredicate<V>,
    ) -> Self {
        Self::build(config, DefaultHashBuilder::default(), Some(can_evict))
    }
}

impl<K, V, S> ConcurrentEvictionList<K, V, S>
where
    K: Hash + Eq + Clone + Send,
    V: Send,
    S: BuildHasher + Clone + Send,
{
    fn build(
        config: ConcurrentEvictionListConfig,
        hash_builder: S,
        can_evict: Option<EvictPredicate<V>>,
    ) -> Self {
        let shard_config = config.shard_config();
        let shards: Vec<_> = (0..config.shards())
            .map(|_| {
                let list = EvictionList::with_hasher(shard_config, hash_builder.clone());
                let list = match &can_evict {
                    Some(predicate) => list.with_eviction_predicate(predicate.clone()),
                    None => list,
                };
                Mutex::new(list)
            })
            .collect();

        Self {
            shards: shards.into_boxed_slice(),
            hash_builder,
        }
    }

    #[inline]
    fn shard<Q>(&self, key: &Q) -> &Mutex<EvictionList<K, V, S>>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash,
    {
        let idx = (self.hash_builder.hash_one(key) as usize) % self.shards.len();
        &self.shards[idx]
    }

    /// Number of shards.
    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// Total entries across all shards.
    pub fn len(&self) -> usize {
        self.shards.iter().map(|s| s.lock().len()).sum()
    }

    /// Returns `true` if every shard is empty.
    pub fn is_empty(&self) -> bool {
        self.shards.iter().all(|s| s.lock().is_empty())
    }

    /// Gets a clone of the value, promoting it.
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
        V: Clone,
    {
        self.shard(key).lock().get(key).cloned()
    }

    /// Applies `f` to the value while holding the shard lock, promoting it.
    pub fn get_with<Q, F, R>(&self, key: &Q, f: F) -> Option<R>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
        F: FnOnce(&V) -> R,
    {
        self.shard(key).lock().get(key).map(f)
    }

    /// Returns the value for `key`, inserting `make()` if absent.
    ///
    /// Lookup and insertion happen under one shard lock, so concurrent
    /// callers for the same key always observe the same value. The boolean
    /// is `true` when an existing value was returned.
    pub fn get_or_insert_with<F>(&self, key: K, make: F) -> (V, bool)
    where
        V: Clone,
        F: FnOnce() -> V,
    {
        let mut shard = self.shard(&key).lock();
        if let Some(existing) = shard.get(&key) {
            return (existing.clone(), true);
        }
        let value = make();
        shard.put(key, value.clone());
        (value, false)
    }

    /// Inserts or replaces a value, returning the previous one.
    pub fn put(&self, key: K, value: V) -> Option<V> {
        self.shard(&key).lock().put(key, value)
    }

    /// Removes `key`, returning its value.
    pub fn remove<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.shard(key).lock().remove(key)
    }

    /// Removes `key` only if `allow` accepts its current value. The check and
    /// the removal happen under one shard lock.
    pub fn remove_if<Q, F>(&self, key: &Q, allow: F) -> Option<V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
        F: FnOnce(&V) -> bool,
    {
        let mut shard = self.shard(key).lock();
        if !shard.peek(key).is_some_and(allow) {
            return None;
        }
        shard.remove(key)
    }

    /// Returns `true` if `key` is present. Does not promote.
    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.shard(key).lock().contains(key)
    }

    /// Segment holding `key`, if present.
    pub fn segment_of<Q>(&self, key: &Q) -> Option<Segment>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.shard(key).lock().segment_of(key)
    }

    /// Clears every shard.
    pub fn clear(&self) {
        for shard in self.shards.iter() {
            shard.lock().clear();
        }
    }

    /// Retries overflow eviction on every shard.
    pub fn evict_overflow(&self) -> usize {
        self.shards.iter().map(|s| s.lock().evict_overflow()).sum()
    }

    /// Aggregated snapshot across shards.
    pub fn stats(&self) -> EvictionStats {
        let mut total = EvictionStats::default();
        for shard in self.shards.iter() {
            total += shard.lock().stats();
        }
        total
    }
}

impl<K, V, S> CacheMetrics for ConcurrentEvictionList<K, V, S>
where
    K: Hash + Eq + Clone + Send,
    V: Send,
    S: BuildHasher + Clone + Send,
{
    fn metrics(&self) -> BTreeMap<String, f64> {
        self.stats().to_btreemap()
    }

    fn component_name(&self) -> &'static str {
        "ConcurrentEvictionList"
    }
}

impl<K, V, S> core::fmt::Debug for ConcurrentEvictionList<K, V, S>
where
    K: Hash + Eq + Clone + Send,
    V: Send,
    S: BuildHasher + Clone + Send,
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ConcurrentEvictionList")
            .field("shard_count", &self.shards.len())
            .field("total_len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::eviction::non_zero;
    use std::sync::Arc;
    use std::thread;

    fn make_config(
        max_active: usize,
        max_inactive: usize,
        shards: usize,
    ) -> ConcurrentEvictionListConfig {
        ConcurrentEvictionListConfig::new(non_zero(max_active), non_zero(max_inactive))
            .with_shards(shards)
    }

    #[test]
    fn test_basic_operations() {
        let list: ConcurrentEvictionList<String, i32> =
            ConcurrentEvictionList::init(make_config(16, 64, 4), None);

        list.put("a".to_string(), 1);
        list.put("b".to_string(), 2);

        assert_eq!(list.get("a"), Some(1));
        assert_eq!(list.segment_of("a"), Some(Segment::Active));
        assert_eq!(list.segment_of("b"), Some(Segment::Inactive));
        assert_eq!(list.remove("b"), Some(2));
        assert!(!list.contains("b"));
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn test_concurrent_access() {
        let list: Arc<ConcurrentEvictionList<String, usize>> =
            Arc::new(ConcurrentEvictionList::init(make_config(256, 1024, 8), None));

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let list = Arc::clone(&list);
                thread::spawn(move || {
                    for i in 0..500 {
                        let key = format!("key_{t}_{i}");
                        list.put(key.clone(), i);
                        let _ = list.get(&key);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        let stats = list.stats();
        assert!(stats.active <= stats.max_active);
        assert!(stats.inactive <= stats.max_inactive);
    }

    #[test]
    fn test_get_or_insert_with_is_atomic_per_key() {
        let list: Arc<ConcurrentEvictionList<String, Arc<u32>>> =
            Arc::new(ConcurrentEvictionList::init(make_config(8, 8, 2), None));

        let values: Vec<Arc<u32>> = (0..8)
            .map(|_| {
                let list = Arc::clone(&list);
                thread::spawn(move || list.get_or_insert_with("k".to_string(), || Arc::new(7)).0)
            })
            .collect::<Vec<_>>()
            .into_iter()
            .map(|h| h.join().unwrap())
            .collect();

        for pair in values.windows(2) {
            assert!(Arc::ptr_eq(&pair[0], &pair[1]));
        }
    }

    #[test]
    fn test_shared_predicate_applies_to_every_shard() {
        let list: ConcurrentEvictionList<u32, u32> = ConcurrentEvictionList::with_eviction_predicate(
            make_config(2, 2, 2),
            Arc::new(|_: &u32| false),
        );
        for i in 0..20 {
            list.put(i, i);
        }
        let stats = list.stats();
        assert_eq!(stats.total, 20);
        assert_eq!(stats.total_evictions, 0);
        assert!(stats.blocked_evictions > 0);
    }

    #[test]
    fn test_stats_and_metrics_aggregate() {
        let list: ConcurrentEvictionList<u32, u32> =
            ConcurrentEvictionList::init(make_config(8, 8, 4), None);
        for i in 0..4 {
            list.put(i, i);
        }
        assert_eq!(list.stats().max_inactive, 8);
        assert_eq!(list.metrics().get("total"), Some(&4.0));
        assert_eq!(list.component_name(), "ConcurrentEvictionList");

        list.clear();
        assert!(list.is_empty());
    }
}
