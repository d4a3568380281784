//! Numeric cache of formula values.
//!
//! The cache has one slot per arena entry. A slot is either empty (never
//! computed, or invalidated) or holds the flattened potential of its formula.
//! Filled slots only ever depend on filled slots: invalidating a slot empties
//! everything that transitively reads it, walking the reverse-dependency lists
//! of the arena and stopping at slots that are already empty.

use log::debug;
use serde::Serialize;

use crate::arena::Formulas;
use crate::types::FormulaId;

/// Counters describing cache activity since construction.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Lookups answered from a filled slot.
    pub hits: usize,
    /// Lookups that found an empty slot.
    pub misses: usize,
    /// Slots filled by evaluation.
    pub computations: usize,
    /// Slots emptied by invalidation.
    pub invalidations: usize,
    /// Slots currently filled.
    pub filled: usize,
}

#[derive(Debug, Clone)]
pub struct PotentialCache {
    slots: Vec<Option<Vec<f64>>>,
    hits: usize,
    misses: usize,
    computations: usize,
    invalidations: usize,
}

impl PotentialCache {
    /// Creates an empty cache for an arena of `size` formulas.
    pub fn new(size: usize) -> Self {
        Self {
            slots: vec![None; size],
            hits: 0,
            misses: 0,
            computations: 0,
            invalidations: 0,
        }
    }

    /// Returns the number of slots.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns true if there are no slots at all.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn hits(&self) -> usize {
        self.hits
    }
    pub fn misses(&self) -> usize {
        self.misses
    }
    pub fn computations(&self) -> usize {
        self.computations
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits,
            misses: self.misses,
            computations: self.computations,
            invalidations: self.invalidations,
            filled: self.slots.iter().filter(|s| s.is_some()).count(),
        }
    }

    /// Raw slots, indexed by formula id.
    pub fn slots(&self) -> &[Option<Vec<f64>>] {
        &self.slots
    }

    /// Looks up a slot, counting the hit or miss.
    #[inline]
    pub fn get(&mut self, id: FormulaId) -> Option<&[f64]> {
        match self.slots.get(id.index()) {
            Some(Some(values)) => {
                self.hits += 1;
                Some(values)
            }
            _ => {
                self.misses += 1;
                None
            }
        }
    }

    /// Looks up a slot without touching the counters.
    pub fn peek(&self, id: FormulaId) -> Option<&[f64]> {
        self.slots.get(id.index()).and_then(|s| s.as_deref())
    }

    pub fn is_filled(&self, id: FormulaId) -> bool {
        self.peek(id).is_some()
    }

    /// Stores a freshly computed value.
    pub fn insert(&mut self, id: FormulaId, values: Vec<f64>) {
        self.computations += 1;
        self.slots[id.index()] = Some(values);
    }

    /// Stores a value that was supplied rather than computed, such as a CPT.
    pub fn replace(&mut self, id: FormulaId, values: Vec<f64>) {
        self.slots[id.index()] = Some(values);
    }

    /// Empties a single slot, returning whether it was filled.
    pub fn clear(&mut self, id: FormulaId) -> bool {
        let was_filled = self.slots[id.index()].take().is_some();
        if was_filled {
            self.invalidations += 1;
        }
        was_filled
    }

    /// Empties every filled slot that transitively depends on `root`.
    ///
    /// The slot of `root` itself is left alone. A branch of the walk stops at
    /// the first slot that is already empty, since nothing filled can depend
    /// on it. Returns the number of slots emptied.
    pub fn invalidate_dependents(&mut self, formulas: &Formulas, root: FormulaId) -> usize {
        let mut emptied = 0;
        let mut stack: Vec<FormulaId> = formulas.dependents(root).to_vec();
        while let Some(id) = stack.pop() {
            if !self.clear(id) {
                continue;
            }
            emptied += 1;
            stack.extend_from_slice(formulas.dependents(id));
        }
        debug!("invalidate: {} emptied {} dependent slots", root, emptied);
        emptied
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use test_log::test;

    use crate::formula::Formula;
    use crate::types::NodeId;

    /// ε(v0), ε(v1), Π(ε0, ε1), Σ({1}, Π).
    fn arena() -> (Formulas, [FormulaId; 4]) {
        let mut formulas = Formulas::new();
        let e0 = formulas.upsert(Formula::evidence_function(NodeId::new(0), 2)).unwrap();
        let e1 = formulas.upsert(Formula::evidence_function(NodeId::new(1), 2)).unwrap();
        let product = formulas.mult(vec![e0.clone(), e1.clone()]).unwrap();
        let product = formulas.upsert(product).unwrap();
        let marginal = formulas.marginalize(&[NodeId::new(0)], &product).unwrap();
        let marginal = formulas.upsert(marginal).unwrap();
        formulas.update_references();
        let ids = [e0, e1, product, marginal].map(|f| f.require_id().unwrap());
        (formulas, ids)
    }

    #[test]
    fn test_counters() {
        let mut cache = PotentialCache::new(4);
        let id = FormulaId::new(2);
        assert_eq!(cache.get(id), None);
        cache.insert(id, vec![1.0, 2.0]);
        assert_eq!(cache.get(id), Some(&[1.0, 2.0][..]));
        assert_eq!(cache.peek(id), Some(&[1.0, 2.0][..]));

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.computations, 1);
        assert_eq!(stats.filled, 1);
    }

    #[test]
    fn test_replace_is_not_a_computation() {
        let mut cache = PotentialCache::new(1);
        cache.replace(FormulaId::new(0), vec![0.5, 0.5]);
        assert!(cache.is_filled(FormulaId::new(0)));
        assert_eq!(cache.computations(), 0);
    }

    #[test]
    fn test_invalidate_walks_outward() {
        let (formulas, [e0, e1, product, marginal]) = arena();
        let mut cache = PotentialCache::new(formulas.len());
        for id in [e0, e1, product, marginal] {
            cache.insert(id, vec![1.0; formulas[id].size()]);
        }

        assert_eq!(cache.invalidate_dependents(&formulas, e1), 2);
        assert!(cache.is_filled(e0));
        assert!(cache.is_filled(e1));
        assert!(!cache.is_filled(product));
        assert!(!cache.is_filled(marginal));
        assert_eq!(cache.stats().invalidations, 2);
    }

    #[test]
    fn test_invalidate_stops_at_empty_slots() {
        let (formulas, [e0, _, product, marginal]) = arena();
        let mut cache = PotentialCache::new(formulas.len());
        cache.insert(e0, vec![1.0, 1.0]);
        // The product is empty, so the walk stops there even though the marginal
        // is (inconsistently) filled.
        cache.insert(marginal, vec![1.0, 1.0]);
        assert_eq!(cache.invalidate_dependents(&formulas, e0), 0);
        assert!(!cache.is_filled(product));
        assert!(cache.is_filled(marginal));
    }
}
