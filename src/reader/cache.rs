use indexmap::IndexMap;
use std::sync::Arc;

/// Least-recently-used map from block index to decoded block text.
///
/// Entries are kept in recency order: index 0 is the eviction candidate,
/// the last entry is the most recently used one.
pub(crate) struct BlockCache {
    capacity: usize,
    map: IndexMap<usize, Arc<[char]>>,
}

impl BlockCache {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            map: IndexMap::new(),
        }
    }

    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.map.len()
    }

    pub(crate) fn get(&mut self, key: usize) -> Option<Arc<[char]>> {
        let index = self.map.get_index_of(&key)?;
        let value = Arc::clone(self.map.get_index(index)?.1);
        if index + 1 != self.map.len() {
            self.map.move_index(index, self.map.len() - 1);
        }
        Some(value)
    }

    /// Inserts a block as most recently used, evicting the oldest entry first
    /// when the cache is full. Returns the evicted block index, if any.
    pub(crate) fn insert(&mut self, key: usize, block: Arc<[char]>) -> Option<usize> {
        if self.map.contains_key(&key) {
            self.map.shift_remove(&key);
        }
        let evicted = if self.map.len() >= self.capacity {
            self.map.shift_remove_index(0).map(|(evicted, _)| evicted)
        } else {
            None
        };
        self.map.insert(key, block);
        evicted
    }

    pub(crate) fn keys(&self) -> Vec<usize> {
        self.map.keys().copied().collect()
    }
}
