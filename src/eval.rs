//! Demand-driven numeric evaluation of formulas.
//!
//! [`Evaluator::evaluate`] computes the flattened potential of a formula,
//! filling every empty cache slot it needs on the way. Warm formulas are
//! answered straight from the cache; a cold formula costs roughly the product
//! of domain sizes over its cold dependency subtree.

use log::debug;

use crate::arena::Formulas;
use crate::cache::PotentialCache;
use crate::error::{Error, Result};
use crate::formula::FormulaKind;
use crate::potential::{indicator, marginalize, multiply, Factor};
use crate::types::FormulaId;

/// Evaluates formulas of an arena into a cache.
///
/// The arena is only read; evidence levels are taken from the evidence
/// functions as they are at the time of the call.
pub struct Evaluator<'a> {
    formulas: &'a Formulas,
    cache: &'a mut PotentialCache,
}

impl<'a> Evaluator<'a> {
    pub fn new(formulas: &'a Formulas, cache: &'a mut PotentialCache) -> Self {
        Self { formulas, cache }
    }

    /// The value of formula `id`.
    pub fn evaluate(&mut self, id: FormulaId) -> Result<&[f64]> {
        self.fill(id)?;
        self.cache
            .peek(id)
            .ok_or_else(|| Error::internal(format!("slot {} is empty after evaluation", id)))
    }

    fn fill(&mut self, id: FormulaId) -> Result<()> {
        if self.cache.get(id).is_some() {
            return Ok(());
        }
        let formulas = self.formulas;
        let formula = formulas.get(id)?;

        let values = match formula.kind() {
            FormulaKind::Unit => {
                return Err(Error::internal(format!("unit formula {} cannot be evaluated", id)));
            }
            FormulaKind::NodePotential { node } => {
                return Err(Error::internal(format!("CPT slot {} of {} is empty", id, node)));
            }
            FormulaKind::EvidenceFunction { level, .. } => indicator(formula.size(), *level),
            FormulaKind::Reference { target } => {
                self.fill(*target)?;
                self.value(*target)?.to_vec()
            }
            FormulaKind::Product { factors } => {
                for &factor in factors {
                    self.fill(factor)?;
                }
                let views = factors
                    .iter()
                    .map(|&factor| {
                        let f = formulas.get(factor)?;
                        Ok(Factor::new(f.domain(), f.levels(), self.value(factor)?))
                    })
                    .collect::<Result<Vec<_>>>()?;
                multiply(formula.domain(), formula.levels(), &views)
            }
            FormulaKind::Marginal { potential, .. } => {
                self.fill(*potential)?;
                let inner = formulas.get(*potential)?;
                let view = Factor::new(inner.domain(), inner.levels(), self.value(*potential)?);
                marginalize(formula.domain(), formula.levels(), view)
            }
        };

        debug!("eval: computed {} ({} cells)", formula.name(), values.len());
        self.cache.insert(id, values);
        Ok(())
    }

    fn value(&self, id: FormulaId) -> Result<&[f64]> {
        self.cache
            .peek(id)
            .ok_or_else(|| Error::internal(format!("dependency {} was not filled", id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use test_log::test;

    use crate::formula::Formula;
    use crate::types::NodeId;

    /// Φ(A) = [0.6, 0.4] and Φ(B | A) over {A, B}, with both evidence functions,
    /// their product and the marginal onto B.
    struct Fixture {
        formulas: Formulas,
        cache: PotentialCache,
        ea: FormulaId,
        product: FormulaId,
        onto_b: FormulaId,
    }

    fn fixture() -> Fixture {
        let a = NodeId::new(0);
        let b = NodeId::new(1);
        let mut formulas = Formulas::new();
        let pa = formulas.upsert(Formula::node_potential(a, vec![a], vec![2])).unwrap();
        let pb = formulas.upsert(Formula::node_potential(b, vec![a, b], vec![2, 2])).unwrap();
        let ea = formulas.upsert(Formula::evidence_function(a, 2)).unwrap();
        let eb = formulas.upsert(Formula::evidence_function(b, 2)).unwrap();
        let product = formulas
            .mult(vec![
                formulas.reference(pa.require_id().unwrap()).unwrap(),
                formulas.reference(pb.require_id().unwrap()).unwrap(),
                ea.clone(),
                eb,
            ])
            .unwrap();
        let product = formulas.upsert(product).unwrap();
        let onto_b = formulas.marginalize(&[b], &product).unwrap();
        let onto_b = formulas.upsert(onto_b).unwrap();
        formulas.update_references();

        let mut cache = PotentialCache::new(formulas.len());
        cache.replace(pa.require_id().unwrap(), vec![0.6, 0.4]);
        cache.replace(pb.require_id().unwrap(), vec![0.9, 0.1, 0.2, 0.8]);
        Fixture {
            formulas,
            cache,
            ea: ea.require_id().unwrap(),
            product: product.require_id().unwrap(),
            onto_b: onto_b.require_id().unwrap(),
        }
    }

    fn assert_close(actual: &[f64], expected: &[f64]) {
        assert_eq!(actual.len(), expected.len());
        for (x, y) in actual.iter().zip(expected) {
            assert!((x - y).abs() < 1e-12, "{:?} != {:?}", actual, expected);
        }
    }

    #[test]
    fn test_evaluate_marginal() {
        let mut f = fixture();
        let mut evaluator = Evaluator::new(&f.formulas, &mut f.cache);
        assert_close(evaluator.evaluate(f.onto_b).unwrap(), &[0.62, 0.38]);
        assert_close(evaluator.evaluate(f.product).unwrap(), &[0.54, 0.06, 0.08, 0.32]);
    }

    #[test]
    fn test_second_evaluation_is_free() {
        let mut f = fixture();
        Evaluator::new(&f.formulas, &mut f.cache).evaluate(f.onto_b).unwrap();
        let computed = f.cache.computations();
        Evaluator::new(&f.formulas, &mut f.cache).evaluate(f.onto_b).unwrap();
        assert_eq!(f.cache.computations(), computed);
    }

    #[test]
    fn test_evidence_level_is_read_at_evaluation() {
        let mut f = fixture();
        Evaluator::new(&f.formulas, &mut f.cache).evaluate(f.onto_b).unwrap();

        f.formulas.set_evidence_level(f.ea, Some(1)).unwrap();
        f.cache.clear(f.ea);
        f.cache.invalidate_dependents(&f.formulas, f.ea);

        let mut evaluator = Evaluator::new(&f.formulas, &mut f.cache);
        assert_close(evaluator.evaluate(f.ea).unwrap(), &[0.0, 1.0]);
        assert_close(evaluator.evaluate(f.onto_b).unwrap(), &[0.08, 0.32]);
    }

    #[test]
    fn test_empty_cpt_slot_is_an_error() {
        let mut f = fixture();
        f.cache = PotentialCache::new(f.formulas.len());
        let err = Evaluator::new(&f.formulas, &mut f.cache).evaluate(f.onto_b).unwrap_err();
        assert!(matches!(err, Error::InternalConsistency(_)));
    }
}
