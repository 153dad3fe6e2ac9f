use std::fmt;
use std::sync::Mutex;

use indexmap::IndexMap;

use crate::path::VirtualPath;

struct CacheEntry {
    data: Vec<u8>,
}

struct Inner {
    /// Insertion/touch-ordered: index 0 is the oldest (next to evict), the
    /// last entry is the youngest (most recently inserted or touched).
    entries: IndexMap<VirtualPath, CacheEntry>,
    total: usize,
}

/// A bounded, thread-safe, whole-file LRU byte store.
///
/// Files enter only through [`ByteCache::insert`] (driven by the fetch
/// worker); they leave only through eviction. Reads never block on the
/// fetch worker — the only contention point is this cache's mutex, held for
/// short, bounded work.
pub struct ByteCache {
    budget: usize,
    inner: Mutex<Inner>,
}

/// A diagnostic snapshot of the cache, oldest resident first.
pub struct CacheStatus {
    pub total_bytes: usize,
    pub budget: usize,
    pub resident: Vec<VirtualPath>,
}

impl fmt::Display for CacheStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "cache: {}/{} bytes | files: {}",
            self.total_bytes,
            self.budget,
            self.resident
                .iter()
                .map(VirtualPath::as_str)
                .collect::<Vec<_>>()
                .join(", ")
        )
    }
}

impl ByteCache {
    pub fn new(budget: usize) -> Self {
        Self {
            budget,
            inner: Mutex::new(Inner {
                entries: IndexMap::new(),
                total: 0,
            }),
        }
    }

    pub fn budget(&self) -> usize {
        self.budget
    }

    /// Returns bytes `[offset, offset+size)` of the cached file, or `None` if
    /// the file is not resident. Touches recency on hit. An out-of-range
    /// slice returns whatever fits (possibly empty), never an error.
    pub fn lookup_range(&self, path: &VirtualPath, size: usize, offset: usize) -> Option<Vec<u8>> {
        let mut inner = self.inner.lock().expect("cache mutex poisoned");
        let entry = inner.entries.shift_remove(path)?;

        let len = entry.data.len();
        let slice = if offset >= len {
            Vec::new()
        } else {
            let end = (offset + size).min(len);
            entry.data[offset..end].to_vec()
        };

        inner.entries.insert(path.clone(), entry);
        Some(slice)
    }

    /// Membership test. Touches recency.
    pub fn contains(&self, path: &VirtualPath) -> bool {
        let mut inner = self.inner.lock().expect("cache mutex poisoned");
        match inner.entries.shift_remove(path) {
            Some(entry) => {
                inner.entries.insert(path.clone(), entry);
                true
            }
            None => false,
        }
    }

    /// Insert a whole file, evicting from the old end until it fits. Returns
    /// whether the insertion succeeded. Called only by the fetch worker.
    pub fn insert(&self, path: VirtualPath, buffer: Vec<u8>) -> bool {
        if self.budget == 0 {
            return false;
        }

        let len = buffer.len();
        if len > self.budget {
            return false;
        }

        let mut inner = self.inner.lock().expect("cache mutex poisoned");

        if let Some(existing) = inner.entries.shift_remove(&path) {
            inner.total -= existing.data.len();
        }

        while inner.total + len > self.budget {
            match inner.entries.shift_remove_index(0) {
                Some((_, evicted)) => inner.total -= evicted.data.len(),
                None => break,
            }
        }

        if inner.total + len > self.budget {
            return false;
        }

        inner.total += len;
        inner.entries.insert(path, CacheEntry { data: buffer });
        true
    }

    pub fn status(&self) -> CacheStatus {
        let inner = self.inner.lock().expect("cache mutex poisoned");
        CacheStatus {
            total_bytes: inner.total,
            budget: self.budget,
            resident: inner.entries.keys().cloned().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vp(s: &str) -> VirtualPath {
        crate::path::normalize(s)
    }

    #[test]
    fn insert_then_contains() {
        let cache = ByteCache::new(1024);
        assert!(cache.insert(vp("a"), vec![1, 2, 3]));
        assert!(cache.contains(&vp("a")));
    }

    #[test]
    fn lru_eviction_order() {
        let cache = ByteCache::new(300);
        assert!(cache.insert(vp("a"), vec![0u8; 100]));
        assert!(cache.insert(vp("b"), vec![0u8; 100]));
        assert!(cache.insert(vp("c"), vec![0u8; 100]));

        // Touch `a` so `b` becomes the oldest.
        assert!(cache.contains(&vp("a")));

        assert!(cache.insert(vp("d"), vec![0u8; 100]));

        let status = cache.status();
        assert_eq!(status.total_bytes, 300);
        assert!(!cache.contains(&vp("b")), "b should have been evicted");
        assert!(cache.contains(&vp("c")));
        assert!(cache.contains(&vp("d")));
        assert!(cache.contains(&vp("a")));
    }

    #[test]
    fn oversize_file_refused() {
        let cache = ByteCache::new(10);
        assert!(!cache.insert(vp("big"), vec![0u8; 20]));
        assert!(!cache.contains(&vp("big")));
    }

    #[test]
    fn zero_budget_refuses_everything() {
        let cache = ByteCache::new(0);
        assert!(!cache.insert(vp("a"), Vec::new()));
        assert!(cache.lookup_range(&vp("a"), 1, 0).is_none());
    }

    #[test]
    fn offset_past_end_returns_empty_not_none() {
        let cache = ByteCache::new(100);
        cache.insert(vp("a"), vec![1, 2, 3]);
        let bytes = cache.lookup_range(&vp("a"), 10, 100).unwrap();
        assert!(bytes.is_empty());
    }

    #[test]
    fn lookup_range_slices_correctly() {
        let cache = ByteCache::new(100);
        cache.insert(vp("a"), vec![10, 11, 12, 13, 14]);
        assert_eq!(cache.lookup_range(&vp("a"), 2, 1).unwrap(), vec![11, 12]);
        // Request past the end should clamp, not panic.
        assert_eq!(
            cache.lookup_range(&vp("a"), 100, 3).unwrap(),
            vec![13, 14]
        );
    }

    #[test]
    fn reinserting_same_path_touches_recency_without_double_counting() {
        let cache = ByteCache::new(300);
        cache.insert(vp("a"), vec![0u8; 100]);
        cache.insert(vp("b"), vec![0u8; 100]);
        cache.insert(vp("a"), vec![0u8; 100]);

        assert_eq!(cache.status().total_bytes, 200);
    }

    #[test]
    fn file_size_equals_budget_then_next_evicts_it() {
        let cache = ByteCache::new(100);
        assert!(cache.insert(vp("a"), vec![0u8; 100]));
        assert!(cache.contains(&vp("a")));
        assert!(cache.insert(vp("b"), vec![0u8; 10]));
        assert!(!cache.contains(&vp("a")));
    }
}
