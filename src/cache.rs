//! The in-memory template cache.
//!
//! Loader backed templates are held in a bounded LRU cache keyed by
//! template name.  The cache tracks hit and miss counters and remembers
//! the modification time reported by the loader so that auto reloading
//! can consult `uptodate` cheaply.

use std::collections::HashMap;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::SystemTime;

use crate::template::CompiledTemplate;

/// The default number of compiled templates kept in memory.
pub const DEFAULT_CACHE_CAPACITY: usize = 400;

#[derive(Clone)]
pub(crate) struct CachedTemplate {
    pub template: Arc<CompiledTemplate>,
    pub last_modified: Option<SystemTime>,
}

/// Statistics of the template cache.
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheStats {
    /// The number of templates currently held.
    pub size: usize,
    /// The maximum number of templates held.
    pub capacity: usize,
    /// The number of lookups that were answered from the cache.
    pub hits: u64,
    /// The number of lookups that had to compile.
    pub misses: u64,
}

impl CacheStats {
    /// The ratio of hits to total lookups.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// A bounded LRU cache for compiled templates.
pub(crate) struct TemplateCache {
    map: HashMap<Arc<str>, CachedTemplate>,
    // most recently used entries sit at the back
    order: VecDeque<Arc<str>>,
    capacity: usize,
    hits: u64,
    misses: u64,
}

impl TemplateCache {
    pub fn new(capacity: usize) -> TemplateCache {
        TemplateCache {
            map: HashMap::new(),
            order: VecDeque::new(),
            capacity: capacity.max(1),

            hits: 0,
            misses: 0,
        }
    }

    fn touch(&mut self, name: &str) {
        if let Some(pos) = self.order.iter().position(|x| x as &str == name) {
            let key = self.order.remove(pos).unwrap();
            self.order.push_back(key);
        }
    }

    /// Looks up a template, marking it as most recently used.
    pub fn get(&mut self, name: &str) -> Option<CachedTemplate> {
        match self.map.get(name).cloned() {
            Some(rv) => {
                self.hits += 1;
                self.touch(name);
                Some(rv)
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    /// Inserts a template, evicting the least recently used entry when
    /// the capacity is exceeded.
    pub fn put(
        &mut self,
        name: &str,
        template: Arc<CompiledTemplate>,
        last_modified: Option<SystemTime>,
    ) {
        let key: Arc<str> = Arc::from(name);
        if self.map.contains_key(name) {
            self.touch(name);
        } else {
            self.order.push_back(key.clone());
        }
        self.map.insert(
            key,
            CachedTemplate {
                template,
                last_modified,
            },
        );
        while self.map.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.map.remove(&oldest);
            } else {
                break;
            }
        }
    }

    /// Removes a single entry.
    pub fn invalidate(&mut self, name: &str) {
        if self.map.remove(name).is_some() {
            if let Some(pos) = self.order.iter().position(|x| x as &str == name) {
                self.order.remove(pos);
            }
        }
    }

    /// Removes all entries.
    pub fn clear(&mut self) {
        self.map.clear();
        self.order.clear();
    }

    /// Returns the current statistics.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            size: self.map.len(),
            capacity: self.capacity,
            hits: self.hits,
            misses: self.misses,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use similar_asserts::assert_eq;

    fn make_template(name: &str) -> Arc<CompiledTemplate> {
        let env = crate::Environment::new();
        Arc::new(CompiledTemplate::new(name, "x", &env).unwrap())
    }

    #[test]
    fn test_lru_eviction_order() {
        let mut cache = TemplateCache::new(2);
        cache.put("a", make_template("a"), None);
        cache.put("b", make_template("b"), None);
        // touch a so b becomes the least recently used entry
        assert!(cache.get("a").is_some());
        cache.put("c", make_template("c"), None);
        assert!(cache.get("b").is_none());
        assert!(cache.get("a").is_some());
        assert!(cache.get("c").is_some());
    }

    #[test]
    fn test_stats() {
        let mut cache = TemplateCache::new(2);
        cache.put("a", make_template("a"), None);
        assert!(cache.get("a").is_some());
        assert!(cache.get("missing").is_none());
        let stats = cache.stats();
        assert_eq!(stats.size, 1);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert!((stats.hit_rate() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_invalidate_and_clear() {
        let mut cache = TemplateCache::new(4);
        cache.put("a", make_template("a"), None);
        cache.put("b", make_template("b"), None);
        cache.invalidate("a");
        assert!(cache.get("a").is_none());
        cache.clear();
        assert!(cache.get("b").is_none());
        assert_eq!(cache.stats().size, 0);
    }
}
