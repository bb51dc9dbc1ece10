//! Two-List Eviction List
//!
//! A segmented LRU container that separates entries touched more than once
//! (the **active** segment) from eviction candidates (the **inactive**
//! segment). A burst of one-off keys only churns the inactive segment and
//! never pushes frequently used entries out.
//!
//! Unlike a plain cache, eviction here is *negotiated*: every candidate is
//! offered to an injected predicate and only removed when the predicate
//! agrees. The lock pool uses this to guarantee it never drops a mutex
//! somebody holds.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │  ACTIVE   MRU ◀──▶ [hot_1] ◀──▶ [hot_2] ◀──▶ ... ◀──▶ [tail] LRU      │
//! │                                                  │ demote  ▲ promote  │
//! │                                                  ▼         │ (get)    │
//! │  INACTIVE MRU ◀──▶ [new_1] ◀──▶ [new_2] ◀──▶ ... ◀──▶ [tail] LRU      │
//! │              ▲                                         │              │
//! │            insert                          evict if can_evict(value)  │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Entry Lifecycle
//!
//! 1. **Insert**: new keys enter the inactive head.
//! 2. **Hit in inactive**: the entry moves to the active head. If active now
//!    exceeds `max_active`, the active tail is demoted to the inactive head.
//! 3. **Inactive overflow**: candidates are scanned from the inactive tail
//!    towards the head and the first one the predicate accepts is removed.
//!    This repeats until the segment is within bounds or nothing is evictable.
//!
//! # Soft Bounds
//!
//! When no inactive entry is evictable the overflow is left in place and the
//! attempt is counted in [`EvictionStats::blocked_evictions`]. The next
//! mutating operation (or an explicit [`EvictionList::evict_overflow`]) tries
//! again, so the overflow shrinks as soon as entries become evictable.
//!
//! # Examples
//!
//! ```
//! use cache_shield::EvictionList;
//! use cache_shield::config::EvictionListConfig;
//! use core::num::NonZeroUsize;
//!
//! let config = EvictionListConfig::new(
//!     NonZeroUsize::new(2).unwrap(),
//!     NonZeroUsize::new(2).unwrap(),
//! );
//! let mut list = EvictionList::init(config, None);
//!
//! list.put("a", 1);
//! list.put("b", 2);
//! assert_eq!(list.get(&"a"), Some(&1)); // promoted to active
//!
//! list.put("c", 3);
//! list.put("d", 4); // inactive overflow evicts "b"
//! assert!(!list.contains(&"b"));
//! assert!(list.contains(&"a"));
//! ```

use crate::config::EvictionListConfig;
use crate::list::{Arena, List, NodeId};
use crate::metrics::{CacheMetrics, EvictionStats};
use core::borrow::Borrow;
use core::fmt;
use core::hash::{BuildHasher, Hash};
use std::collections::BTreeMap;
use std::sync::Arc;

#[cfg(feature = "hashbrown")]
use hashbrown::DefaultHashBuilder;
#[cfg(feature = "hashbrown")]
use hashbrown::HashMap;

#[cfg(not(feature = "hashbrown"))]
use std::collections::hash_map::RandomState as DefaultHashBuilder;
#[cfg(not(feature = "hashbrown"))]
use std::collections::HashMap;

/// Predicate deciding whether a value may be evicted right now.
pub type EvictPredicate<V> = Arc<dyn Fn(&V) -> bool + Send + Sync>;

/// Segment an entry currently lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Segment {
    /// Protected, recently promoted entries.
    Active,
    /// Eviction candidates.
    Inactive,
}

struct Node<K, V> {
    key: K,
    value: V,
    segment: Segment,
}

#[derive(Debug, Default, Clone, Copy)]
struct Counters {
    evictions: u64,
    blocked: u64,
    promotions: u64,
    demotions: u64,
    hits: u64,
    misses: u64,
}

/// Single-threaded two-list eviction list.
///
/// For shared access use [`ConcurrentEvictionList`](crate::ConcurrentEvictionList),
/// which shards the key space across several of these behind mutexes.
pub struct EvictionList<K, V, S = DefaultHashBuilder> {
    config: EvictionListConfig,
    map: HashMap<K, NodeId, S>,
    arena: Arena<Node<K, V>>,
    active: List,
    inactive: List,
    can_evict: Option<EvictPredicate<V>>,
    counters: Counters,
}

impl<K: Hash + Eq + Clone, V> EvictionList<K, V, DefaultHashBuilder> {
    /// Creates a list from a configuration.
    ///
    /// `hasher` defaults to the crate's default hash builder. Every entry is
    /// evictable until a predicate is installed with
    /// [`with_eviction_predicate`](Self::with_eviction_predicate).
    pub fn init(config: EvictionListConfig, hasher: Option<DefaultHashBuilder>) -> Self {
        Self::with_hasher(config, hasher.unwrap_or_default())
    }
}

impl<K: Hash + Eq + Clone, V, S: BuildHasher> EvictionList<K, V, S> {
    /// Creates a list with a custom hash builder.
    pub fn with_hasher(config: EvictionListConfig, hash_builder: S) -> Self {
        let capacity = config.capacity();
        Self {
            config,
            map: HashMap::with_capacity_and_hasher(capacity.min(4096), hash_builder),
            arena: Arena::with_capacity(capacity.min(4096)),
            active: List::new(),
            inactive: List::new(),
            can_evict: None,
            counters: Counters::default(),
        }
    }

    /// Installs the eviction predicate.
    #[must_use]
    pub fn with_eviction_predicate(mut self, can_evict: EvictPredicate<V>) -> Self {
        self.can_evict = Some(can_evict);
        self
    }

    /// Returns the configuration.
    pub fn config(&self) -> &EvictionListConfig {
        &self.config
    }

    /// Number of entries across both segments.
    #[inline]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Returns `true` if the list holds no entries.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Returns `true` if `key` is present. Does not promote.
    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.map.contains_key(key)
    }

    /// Segment holding `key`, if present.
    pub fn segment_of<Q>(&self, key: &Q) -> Option<Segment>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let id = *self.map.get(key)?;
        self.arena.get(id).map(|node| node.segment)
    }

    /// Looks up `key` without touching recency or segments.
    pub fn peek<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let id = *self.map.get(key)?;
        self.arena.get(id).map(|node| &node.value)
    }

    /// Looks up `key`, promoting an inactive hit to the active segment.
    pub fn get<Q>(&mut self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let Some(&id) = self.map.get(key) else {
            self.counters.misses += 1;
            return None;
        };
        self.counters.hits += 1;
        self.touch(id);
        self.arena.get(id).map(|node| &node.value)
    }

    /// Inserts or replaces a value, returning the previous value for `key`.
    ///
    /// A replaced entry keeps its segment and moves to that segment's head.
    /// A new entry enters the inactive head and may trigger eviction of
    /// other inactive entries.
    pub fn put(&mut self, key: K, value: V) -> Option<V> {
        if let Some(&id) = self.map.get(&key) {
            let segment = self.arena.get(id).map(|node| node.segment)?;
            match segment {
                Segment::Active => self.active.move_to_front(&mut self.arena, id),
                Segment::Inactive => self.inactive.move_to_front(&mut self.arena, id),
            }
            let node = self.arena.get_mut(id)?;
            return Some(core::mem::replace(&mut node.value, value));
        }

        let id = self.arena.insert(Node {
            key: key.clone(),
            value,
            segment: Segment::Inactive,
        });
        self.inactive.push_front(&mut self.arena, id);
        self.map.insert(key, id);
        self.evict_excluding(Some(id));
        None
    }

    /// Removes `key`, returning its value.
    pub fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let id = self.map.remove(key)?;
        self.unlink_and_free(id).map(|(_, value)| value)
    }

    /// Drops every entry. Counters are kept.
    pub fn clear(&mut self) {
        self.map.clear();
        self.arena.clear();
        self.active.reset();
        self.inactive.reset();
    }

    /// Retries eviction of inactive overflow, returning how many entries
    /// were removed.
    pub fn evict_overflow(&mut self) -> usize {
        self.evict_excluding(None)
    }

    /// Keys in the active segment, most recently used first.
    pub fn active_keys(&self) -> Vec<K> {
        self.keys_of(&self.active)
    }

    /// Keys in the inactive segment, most recently used first.
    pub fn inactive_keys(&self) -> Vec<K> {
        self.keys_of(&self.inactive)
    }

    /// Snapshot of segment sizes and counters.
    pub fn stats(&self) -> EvictionStats {
        EvictionStats {
            total: self.len(),
            active: self.active.len(),
            inactive: self.inactive.len(),
            max_active: self.config.max_active().get(),
            max_inactive: self.config.max_inactive().get(),
            total_evictions: self.counters.evictions,
            blocked_evictions: self.counters.blocked,
            promotions: self.counters.promotions,
            demotions: self.counters.demotions,
            hits: self.counters.hits,
            misses: self.counters.misses,
        }
    }

    fn touch(&mut self, id: NodeId) {
        let Some(segment) = self.arena.get(id).map(|node| node.segment) else {
            return;
        };
        match segment {
            Segment::Active => self.active.move_to_front(&mut self.arena, id),
            Segment::Inactive => {
                self.inactive.unlink(&mut self.arena, id);
                self.active.push_front(&mut self.arena, id);
                self.set_segment(id, Segment::Active);
                self.counters.promotions += 1;
                self.demote_overflow();
            }
        }
    }

    fn demote_overflow(&mut self) {
        let mut demoted = false;
        while self.active.len() > self.config.max_active().get() {
            let Some(tail) = self.active.back() else {
                break;
            };
            self.active.unlink(&mut self.arena, tail);
            self.inactive.push_front(&mut self.arena, tail);
            self.set_segment(tail, Segment::Inactive);
            self.counters.demotions += 1;
            demoted = true;
        }
        if demoted {
            self.evict_excluding(None);
        }
    }

    fn evict_excluding(&mut self, keep: Option<NodeId>) -> usize {
        let mut evicted = 0;
        while self.inactive.len() > self.config.max_inactive().get() {
            let Some(victim) = self.find_victim(keep) else {
                self.counters.blocked += 1;
                break;
            };
            if let Some((key, _)) = self.unlink_and_free(victim) {
                self.map.remove(&key);
            }
            self.counters.evictions += 1;
            evicted += 1;
        }
        evicted
    }

    fn find_victim(&self, keep: Option<NodeId>) -> Option<NodeId> {
        let mut cursor = self.inactive.back();
        while let Some(id) = cursor {
            if Some(id) != keep {
                let evictable = match (&self.can_evict, self.arena.get(id)) {
                    (Some(can_evict), Some(node)) => can_evict(&node.value),
                    (None, Some(_)) => true,
                    (_, None) => false,
                };
                if evictable {
                    return Some(id);
                }
            }
            cursor = List::prev(&self.arena, id);
        }
        None
    }

    fn unlink_and_free(&mut self, id: NodeId) -> Option<(K, V)> {
        let segment = self.arena.get(id)?.segment;
        match segment {
            Segment::Active => self.active.unlink(&mut self.arena, id),
            Segment::Inactive => self.inactive.unlink(&mut self.arena, id),
        }
        self.arena.remove(id).map(|node| (node.key, node.value))
    }

    fn set_segment(&mut self, id: NodeId, segment: Segment) {
        if let Some(node) = self.arena.get_mut(id) {
            node.segment = segment;
        }
    }

    fn keys_of(&self, list: &List) -> Vec<K> {
        let mut keys = Vec::with_capacity(list.len());
        let mut cursor = list.back();
        while let Some(id) = cursor {
            if let Some(node) = self.arena.get(id) {
                keys.push(node.key.clone());
            }
            cursor = List::prev(&self.arena, id);
        }
        keys.reverse();
        keys
    }
}

impl<K: Hash + Eq + Clone, V, S: BuildHasher> CacheMetrics for EvictionList<K, V, S> {
    fn metrics(&self) -> BTreeMap<String, f64> {
        self.stats().to_btreemap()
    }

    fn component_name(&self) -> &'static str {
        "EvictionList"
    }
}

impl<K, V, S> fmt::Debug for EvictionList<K, V, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EvictionList")
            .field("config", &self.config)
            .field("active", &self.active.len())
            .field("inactive", &self.inactive.len())
            .field("has_predicate", &self.can_evict.is_some())
            .finish()
    }
}
