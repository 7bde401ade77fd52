//! Weighted LRU cache
//!
//! Entries live in an arena of slots addressed by index. Recency order is a
//! doubly-linked list threaded through those indices (head is most recently
//! used) and a hash map resolves keys to slots. Freed slots are recycled.

use std::borrow::Borrow;
use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;

use parking_lot::Mutex;

use crate::config::WeightedCacheConfig;
use crate::error::{CacheError, CacheResult};
use crate::stats::{CacheMetrics, CacheStats};

struct Node<K, V> {
    key: K,
    value: V,
    weight: u64,
    prev: Option<usize>,
    next: Option<usize>,
}

struct Entries<K, V> {
    index: HashMap<K, usize>,
    slots: Vec<Option<Node<K, V>>>,
    free: Vec<usize>,
    head: Option<usize>,
    tail: Option<usize>,
    total_weight: u64,
}

impl<K: Eq + Hash + Clone, V> Entries<K, V> {
    fn new() -> Self {
        Self {
            index: HashMap::new(),
            slots: Vec::new(),
            free: Vec::new(),
            head: None,
            tail: None,
            total_weight: 0,
        }
    }

    fn node(&self, slot: usize) -> Option<&Node<K, V>> {
        self.slots.get(slot).and_then(Option::as_ref)
    }

    fn node_mut(&mut self, slot: usize) -> Option<&mut Node<K, V>> {
        self.slots.get_mut(slot).and_then(Option::as_mut)
    }

    fn allocate(&mut self, node: Node<K, V>) -> usize {
        if let Some(slot) = self.free.pop() {
            self.slots[slot] = Some(node);
            slot
        } else {
            self.slots.push(Some(node));
            self.slots.len() - 1
        }
    }

    fn unlink(&mut self, slot: usize) {
        let Some((prev, next)) = self.node(slot).map(|n| (n.prev, n.next)) else {
            return;
        };

        match prev {
            Some(p) => {
                if let Some(node) = self.node_mut(p) {
                    node.next = next;
                }
            }
            None => self.head = next,
        }
        match next {
            Some(n) => {
                if let Some(node) = self.node_mut(n) {
                    node.prev = prev;
                }
            }
            None => self.tail = prev,
        }

        if let Some(node) = self.node_mut(slot) {
            node.prev = None;
            node.next = None;
        }
    }

    fn push_front(&mut self, slot: usize) {
        let old_head = self.head;
        if let Some(node) = self.node_mut(slot) {
            node.prev = None;
            node.next = old_head;
        }
        match old_head {
            Some(h) => {
                if let Some(node) = self.node_mut(h) {
                    node.prev = Some(slot);
                }
            }
            None => self.tail = Some(slot),
        }
        self.head = Some(slot);
    }

    fn release(&mut self, slot: usize) -> Option<Node<K, V>> {
        self.unlink(slot);
        let node = self.slots.get_mut(slot)?.take()?;
        self.free.push(slot);
        self.index.remove(&node.key);
        self.total_weight = self.total_weight.saturating_sub(node.weight);
        Some(node)
    }

    fn pop_back(&mut self) -> Option<Node<K, V>> {
        let slot = self.tail?;
        self.release(slot)
    }
}

/// Thread-safe LRU cache bounded by the sum of entry weights
///
/// Every operation takes the same lock for its whole duration. Values are
/// returned by clone, so large values are usually stored behind an `Arc`.
///
/// Inserting evicts least-recently-used entries one at a time while the total
/// weight exceeds the budget and more than one entry remains. An entry that
/// alone exceeds the budget is therefore kept until the next insert, which
/// makes the budget a soft limit in that single case.
pub struct WeightedCache<K, V> {
    config: WeightedCacheConfig,
    entries: Mutex<Entries<K, V>>,
    metrics: CacheMetrics,
}

impl<K, V> WeightedCache<K, V>
where
    K: Eq + Hash + Clone + Debug,
    V: Clone,
{
    /// Create a cache from a validated configuration
    pub fn new(config: WeightedCacheConfig) -> CacheResult<Self> {
        config
            .validate()
            .map_err(CacheError::InvalidConfiguration)?;

        Ok(Self {
            config,
            entries: Mutex::new(Entries::new()),
            metrics: CacheMetrics::default(),
        })
    }

    /// Create a named cache with the given budget
    pub fn with_budget(name: impl Into<String>, budget: u64) -> CacheResult<Self> {
        Self::new(
            WeightedCacheConfig::new()
                .with_name(name)
                .with_budget(budget),
        )
    }

    /// Cache configuration
    pub fn config(&self) -> &WeightedCacheConfig {
        &self.config
    }

    /// Insert a new most-recently-used entry
    ///
    /// Fails with [`CacheError::DuplicateKey`] if the key is present; callers
    /// either ignore that or [`remove`](Self::remove) the old entry first.
    pub fn insert(&self, key: K, value: V, weight: u64) -> CacheResult<()> {
        let mut entries = self.entries.lock();
        if entries.index.contains_key(&key) {
            return Err(CacheError::DuplicateKey(format!("{key:?}")));
        }

        let slot = entries.allocate(Node {
            key: key.clone(),
            value,
            weight,
            prev: None,
            next: None,
        });
        entries.index.insert(key, slot);
        entries.push_front(slot);
        entries.total_weight = entries.total_weight.saturating_add(weight);
        self.metrics.record_insert();

        while entries.total_weight > self.config.budget && entries.index.len() > 1 {
            let Some(evicted) = entries.pop_back() else {
                break;
            };
            self.metrics.record_eviction();
            self.log_eviction(&evicted.key, evicted.weight, entries.total_weight);
        }

        Ok(())
    }

    /// Look up an entry and promote it to most recently used
    pub fn retrieve<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let mut entries = self.entries.lock();
        let Some(slot) = entries.index.get(key).copied() else {
            self.metrics.record_retrieve(false);
            return None;
        };

        entries.unlink(slot);
        entries.push_front(slot);
        self.metrics.record_retrieve(true);
        entries.node(slot).map(|node| node.value.clone())
    }

    /// Whether the key is cached, without promoting it
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries.lock().index.contains_key(key)
    }

    /// Remove an entry, returning its value
    pub fn remove<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let mut entries = self.entries.lock();
        let slot = entries.index.get(key).copied()?;
        entries.release(slot).map(|node| node.value)
    }

    /// Drop every entry
    pub fn clear(&self) {
        let mut entries = self.entries.lock();
        #[cfg(feature = "tracing")]
        tracing::debug!(
            cache = %self.config.name,
            entries = entries.index.len(),
            weight = entries.total_weight,
            "clearing cache"
        );
        *entries = Entries::new();
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        self.entries.lock().index.len()
    }

    /// Whether the cache holds no entries
    pub fn is_empty(&self) -> bool {
        self.entries.lock().index.is_empty()
    }

    /// Sum of the weights of live entries
    pub fn total_weight(&self) -> u64 {
        self.entries.lock().total_weight
    }

    /// Statistics snapshot
    pub fn stats(&self) -> CacheStats {
        let (entry_count, total_weight) = {
            let entries = self.entries.lock();
            (entries.index.len(), entries.total_weight)
        };
        self.metrics.snapshot(
            &self.config.name,
            entry_count,
            total_weight,
            self.config.budget,
        )
    }

    #[cfg_attr(not(feature = "tracing"), allow(unused_variables, clippy::unused_self))]
    fn log_eviction(&self, key: &K, weight: u64, remaining: u64) {
        #[cfg(feature = "tracing")]
        tracing::debug!(
            cache = %self.config.name,
            key = ?key,
            weight,
            remaining,
            budget = self.config.budget,
            "evicted entry"
        );
    }
}

impl<K, V> std::fmt::Debug for WeightedCache<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let entries = self.entries.lock();
        f.debug_struct("WeightedCache")
            .field("name", &self.config.name)
            .field("budget", &self.config.budget)
            .field("entries", &entries.index.len())
            .field("total_weight", &entries.total_weight)
            .finish_non_exhaustive()
    }
}
