//! Literal → resolved rule memo shared across passes.

use crate::matcher::MatchedUtility;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

/// `None` inside a filled slot is the "no match" sentinel.
type Slot = OnceLock<Option<Arc<MatchedUtility>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    pub hits: usize,
    pub misses: usize,
    pub entries: usize,
}

/// Incremental resolution cache.
///
/// The map lock is only held to find or insert a slot. Computation happens
/// inside the slot's `OnceLock`, so concurrent lookups of one literal wait for
/// a single winner while other literals proceed independently. A slot is only
/// filled once its computation returns.
#[derive(Debug)]
pub struct Cache {
    enabled: bool,
    slots: Mutex<HashMap<String, Arc<Slot>>>,
    hits: AtomicUsize,
    misses: AtomicUsize,
}

impl Default for Cache {
    fn default() -> Self {
        Self::new()
    }
}

impl Cache {
    pub fn new() -> Self {
        Self {
            enabled: true,
            slots: Mutex::new(HashMap::new()),
            hits: AtomicUsize::new(0),
            misses: AtomicUsize::new(0),
        }
    }

    /// A cache that never stores anything.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::new()
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn lookup_or_compute<F>(&self, literal: &str, compute: F) -> Option<Arc<MatchedUtility>>
    where
        F: FnOnce() -> Option<MatchedUtility>,
    {
        if !self.enabled {
            self.misses.fetch_add(1, Ordering::Relaxed);
            return compute().map(Arc::new);
        }

        let slot = self.slot(literal);
        let mut computed = false;
        let value = slot.get_or_init(|| {
            computed = true;
            compute().map(Arc::new)
        });
        if computed {
            self.misses.fetch_add(1, Ordering::Relaxed);
        } else {
            self.hits.fetch_add(1, Ordering::Relaxed);
        }
        value.clone()
    }

    /// Returns the committed entry for `literal`, if any, without computing.
    pub fn peek(&self, literal: &str) -> Option<Option<Arc<MatchedUtility>>> {
        let slot = self.slots.lock().get(literal).cloned()?;
        slot.get().cloned()
    }

    pub fn clear(&self) {
        self.slots.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.slots
            .lock()
            .values()
            .filter(|slot| slot.get().is_some())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.len(),
        }
    }

    fn slot(&self, literal: &str) -> Arc<Slot> {
        let mut slots = self.slots.lock();
        if let Some(slot) = slots.get(literal) {
            return Arc::clone(slot);
        }
        let slot = Arc::new(Slot::new());
        slots.insert(literal.to_string(), Arc::clone(&slot));
        slot
    }
}

#[cfg(test)]
mod tests {
    use super::Cache;
    use crate::config::Config;
    use crate::matcher::{MatchedUtility, match_candidate};
    use crate::theme::{default_theme, resolve};
    use crate::variants::VariantContext;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    fn resolve_literal(literal: &str) -> Option<MatchedUtility> {
        let config = Config::new(["a"]);
        let theme = resolve(&default_theme(), &config.theme).expect("theme should resolve");
        let context = VariantContext::new(&config, &theme);
        match_candidate(literal, &theme, &context)
    }

    #[test]
    fn hit_does_not_recompute() {
        let cache = Cache::new();
        let calls = AtomicUsize::new(0);
        for _ in 0..3 {
            let value = cache.lookup_or_compute("scale-50", || {
                calls.fetch_add(1, Ordering::SeqCst);
                resolve_literal("scale-50")
            });
            assert!(value.is_some());
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses, stats.entries), (2, 1, 1));
    }

    #[test]
    fn remembers_no_match_sentinel() {
        let cache = Cache::new();
        assert!(cache.lookup_or_compute("hello", || resolve_literal("hello")).is_none());
        assert_eq!(cache.peek("hello"), Some(None));
        assert_eq!(cache.peek("unseen"), None);
        let value = cache.lookup_or_compute("hello", || panic!("sentinel should be reused"));
        assert!(value.is_none());
    }

    #[test]
    fn clear_drops_every_entry() {
        let cache = Cache::new();
        cache.lookup_or_compute("scale-50", || resolve_literal("scale-50"));
        cache.lookup_or_compute("opacity-50", || resolve_literal("opacity-50"));
        assert_eq!(cache.len(), 2);
        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn disabled_cache_computes_every_time_with_same_result() {
        let cache = Cache::disabled();
        let enabled = Cache::new();
        assert!(!cache.is_enabled() && enabled.is_enabled());
        let first = cache.lookup_or_compute("z-10", || resolve_literal("z-10"));
        let second = cache.lookup_or_compute("z-10", || resolve_literal("z-10"));
        let cached = enabled.lookup_or_compute("z-10", || resolve_literal("z-10"));
        assert_eq!(first, second);
        assert_eq!(first, cached);
        assert_eq!(cache.stats().misses, 2);
        assert!(cache.is_empty());
    }

    #[test]
    fn concurrent_lookups_of_one_literal_compute_once() {
        let cache = Arc::new(Cache::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let handles = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let calls = Arc::clone(&calls);
                thread::spawn(move || {
                    cache.lookup_or_compute("flex-1", || {
                        calls.fetch_add(1, Ordering::SeqCst);
                        thread::sleep(Duration::from_millis(20));
                        resolve_literal("flex-1")
                    })
                })
            })
            .collect::<Vec<_>>();
        let results = handles
            .into_iter()
            .map(|handle| handle.join().expect("lookup thread panicked"))
            .collect::<Vec<_>>();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(results.iter().all(|result| result == &results[0]));
        assert!(results[0].is_some());
    }
}
