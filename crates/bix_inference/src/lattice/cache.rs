use crate::types::Type;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

type PairKey = (Type, Type);

/// Aggregated metrics describing cache effectiveness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct CacheMetrics {
    pub lookups: u64,
    pub hits: u64,
    pub misses: u64,
}

impl CacheMetrics {
    pub fn record_hit(&mut self) {
        self.lookups = self.lookups.saturating_add(1);
        self.hits = self.hits.saturating_add(1);
    }

    pub fn record_miss(&mut self) {
        self.lookups = self.lookups.saturating_add(1);
        self.misses = self.misses.saturating_add(1);
    }

    pub fn hit_rate(&self) -> Option<f64> {
        if self.lookups == 0 {
            None
        } else {
            Some(self.hits as f64 / self.lookups as f64)
        }
    }
}

/// Join/meet memo tables. Safe to share between sessions running on different threads;
/// answers never depend on whether an entry was present.
#[derive(Debug, Default)]
pub struct LatticeCache {
    joins: RwLock<FxHashMap<PairKey, Option<Type>>>,
    meets: RwLock<FxHashMap<PairKey, Option<Type>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LatticeOp {
    Join,
    Meet,
}

impl LatticeCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self, op: LatticeOp) -> &RwLock<FxHashMap<PairKey, Option<Type>>> {
        match op {
            LatticeOp::Join => &self.joins,
            LatticeOp::Meet => &self.meets,
        }
    }

    /// Outer `None` is a miss; inner `None` is a memoized "no such type".
    pub(crate) fn lookup(&self, op: LatticeOp, a: &Type, b: &Type) -> Option<Option<Type>> {
        let key = (a.clone(), b.clone());
        let found = self.table(op).read().get(&key).cloned();
        if found.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        found
    }

    pub(crate) fn store(&self, op: LatticeOp, a: &Type, b: &Type, result: Option<Type>) {
        self.table(op)
            .write()
            .insert((a.clone(), b.clone()), result);
    }

    pub fn len(&self) -> usize {
        self.joins.read().len() + self.meets.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn metrics(&self) -> CacheMetrics {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        CacheMetrics {
            lookups: hits + misses,
            hits,
            misses,
        }
    }

    pub fn clear(&self) {
        self.joins.write().clear();
        self.meets.write().clear();
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_hits_and_misses() {
        let cache = LatticeCache::new();
        let int = Type::concrete("Int");
        let double = Type::concrete("Double");

        assert_eq!(cache.lookup(LatticeOp::Join, &int, &double), None);
        cache.store(LatticeOp::Join, &int, &double, Some(Type::concrete("Number")));
        assert_eq!(
            cache.lookup(LatticeOp::Join, &int, &double),
            Some(Some(Type::concrete("Number")))
        );
        assert_eq!(cache.lookup(LatticeOp::Meet, &int, &double), None);

        let metrics = cache.metrics();
        assert_eq!(metrics.lookups, 3);
        assert_eq!(metrics.hits, 1);
        assert_eq!(metrics.misses, 2);
        assert_eq!(cache.len(), 1);

        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.metrics(), CacheMetrics::default());
    }

    #[test]
    fn memoizes_absent_meets() {
        let cache = LatticeCache::new();
        let string = Type::concrete("String");
        let int = Type::concrete("Int");
        cache.store(LatticeOp::Meet, &string, &int, None);
        assert_eq!(cache.lookup(LatticeOp::Meet, &string, &int), Some(None));
    }
}
