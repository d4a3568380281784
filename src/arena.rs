//! The formula arena: an append-only, hash-consed store of formulas.
//!
//! This plays the role the unique table plays for decision diagrams: every
//! formula is keyed by its canonical name, and inserting a formula whose name
//! is already known returns the existing entry instead. Composite names are
//! built from the arena ids of their operands, which are themselves already
//! deduplicated, so structural equality collapses to name equality.
//!
//! The arena only grows. Ids handed out by [`Formulas::upsert`] stay valid for
//! the lifetime of the arena.

use std::collections::HashMap;
use std::ops::Index;

use log::debug;

use crate::error::{Error, Result};
use crate::formula::{Formula, FormulaKind};
use crate::types::{FormulaId, NodeId};

#[derive(Debug, Clone, Default)]
pub struct Formulas {
    formulas: Vec<Formula>,
    lookup: HashMap<String, FormulaId>,
}

impl Formulas {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.formulas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.formulas.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Formula> {
        self.formulas.iter()
    }

    /// Dereference an arena id.
    pub fn get(&self, id: FormulaId) -> Result<&Formula> {
        self.formulas
            .get(id.index())
            .ok_or_else(|| Error::internal(format!("reference to unpopulated arena slot {}", id)))
    }

    pub(crate) fn get_mut(&mut self, id: FormulaId) -> Result<&mut Formula> {
        self.formulas
            .get_mut(id.index())
            .ok_or_else(|| Error::internal(format!("reference to unpopulated arena slot {}", id)))
    }

    /// Set the level of an evidence function, returning the previous level.
    ///
    /// The name of the formula does not change, so neither does its place in
    /// the arena; only its value does.
    pub fn set_evidence_level(&mut self, id: FormulaId, level: Option<usize>) -> Result<Option<usize>> {
        let formula = self.get_mut(id)?;
        match &mut formula.kind {
            FormulaKind::EvidenceFunction { level: current, .. } => Ok(std::mem::replace(current, level)),
            _ => Err(Error::internal(format!("{} is not an evidence function", formula.name))),
        }
    }

    /// Arena id of the formula with the given canonical name.
    pub fn lookup(&self, name: &str) -> Option<FormulaId> {
        self.lookup.get(name).copied()
    }

    /// Formulas that read `id` directly.
    pub fn dependents(&self, id: FormulaId) -> &[FormulaId] {
        self.formulas
            .get(id.index())
            .map_or(&[], |f| f.referenced_by.as_slice())
    }

    /// An alias of the arena entry `id`.
    ///
    /// Units and references are returned as they are, so references never
    /// stack.
    pub fn reference(&self, id: FormulaId) -> Result<Formula> {
        let target = self.get(id)?;
        match target.kind {
            FormulaKind::Unit | FormulaKind::Reference { .. } => Ok(target.clone()),
            _ => Ok(Formula::new(
                FormulaKind::Reference { target: id },
                target.domain.clone(),
                target.levels.clone(),
                format!("ref({})", id),
            )),
        }
    }

    /// Product of `factors`.
    ///
    /// Units are dropped; no factor left gives the unit, a single factor is
    /// returned unchanged.
    pub fn mult(&self, factors: Vec<Formula>) -> Result<Formula> {
        let mut factors: Vec<Formula> = factors.into_iter().filter(|f| !f.is_unit()).collect();
        if factors.len() <= 1 {
            return Ok(factors.pop().unwrap_or_else(Formula::unit));
        }

        let ids = factors
            .iter()
            .map(|f| {
                f.handle()
                    .ok_or_else(|| Error::internal(format!("product factor {} is not in the arena", f.name)))
            })
            .collect::<Result<Vec<_>>>()?;

        let mut domain: Vec<NodeId> = factors.iter().flat_map(|f| f.domain.iter().copied()).collect();
        domain.sort_unstable();
        domain.dedup();

        let levels = domain
            .iter()
            .map(|&v| {
                factors.iter().find_map(|f| f.cardinality(v)).ok_or_else(|| {
                    Error::internal(format!("product variable {} belongs to none of its factors", v))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let name = format!(
            "Π({})",
            ids.iter().map(|id| id.to_string()).collect::<Vec<_>>().join(",")
        );
        Ok(Formula::new(FormulaKind::Product { factors: ids }, domain, levels, name))
    }

    /// Sum `potential` down to the variables of `keep`.
    ///
    /// An empty intersection gives the unit and a full intersection returns the
    /// potential unchanged. Marginalizing a marginal marginalizes its inner
    /// potential directly, so marginals never nest.
    pub fn marginalize(&self, keep: &[NodeId], potential: &Formula) -> Result<Formula> {
        let domain: Vec<NodeId> = potential
            .domain
            .iter()
            .copied()
            .filter(|v| keep.contains(v))
            .collect();
        if domain.is_empty() {
            return Ok(Formula::unit());
        }
        if domain.len() == potential.domain.len() {
            return Ok(potential.clone());
        }
        match &potential.kind {
            FormulaKind::Marginal { potential: inner, .. } => self.new_marginal(domain, self.get(*inner)?),
            FormulaKind::Unit => Ok(potential.clone()),
            _ => self.new_marginal(domain, potential),
        }
    }

    fn new_marginal(&self, domain: Vec<NodeId>, inner: &Formula) -> Result<Formula> {
        let id = inner
            .handle()
            .ok_or_else(|| Error::internal(format!("marginalized potential {} is not in the arena", inner.name)))?;
        let marginalized: Vec<NodeId> = inner
            .domain
            .iter()
            .copied()
            .filter(|v| domain.binary_search(v).is_err())
            .collect();
        let levels = domain
            .iter()
            .map(|&v| {
                inner
                    .cardinality(v)
                    .ok_or_else(|| Error::internal(format!("marginal variable {} is not in {}", v, inner.name)))
            })
            .collect::<Result<Vec<_>>>()?;
        let name = format!(
            "Σ({{{}}},{})",
            marginalized.iter().map(|v| v.get().to_string()).collect::<Vec<_>>().join(","),
            id
        );
        Ok(Formula::new(
            FormulaKind::Marginal {
                potential: id,
                marginalized,
            },
            domain,
            levels,
            name,
        ))
    }

    /// Insert `formula` unless an entry with the same name exists, and return
    /// the arena entry.
    ///
    /// References resolve to their target and the unit is returned as is; neither
    /// is ever stored.
    pub fn upsert(&mut self, mut formula: Formula) -> Result<Formula> {
        match formula.kind {
            FormulaKind::Unit => Ok(formula),
            FormulaKind::Reference { target } => self.get(target).cloned(),
            FormulaKind::NodePotential { .. }
            | FormulaKind::EvidenceFunction { .. }
            | FormulaKind::Product { .. }
            | FormulaKind::Marginal { .. } => {
                if let Some(&id) = self.lookup.get(&formula.name) {
                    debug!("upsert: {} already at {}", formula.name, id);
                    return self.get(id).cloned();
                }
                let id = FormulaId::from(self.formulas.len());
                debug!("upsert: {} -> {}", formula.name, id);
                formula.id = Some(id);
                self.lookup.insert(formula.name.clone(), id);
                self.formulas.push(formula.clone());
                Ok(formula)
            }
        }
    }

    /// Rebuild the reverse-dependency lists of every formula.
    ///
    /// Must run after the last upsert and before anything is evaluated or
    /// invalidated.
    pub fn update_references(&mut self) {
        for formula in self.formulas.iter_mut() {
            formula.referenced_by.clear();
        }
        for i in 0..self.formulas.len() {
            let id = FormulaId::from(i);
            for dependency in self.formulas[i].dependencies() {
                let referenced_by = &mut self.formulas[dependency.index()].referenced_by;
                if !referenced_by.contains(&id) {
                    referenced_by.push(id);
                }
            }
        }
    }

    /// All formulas reachable from `roots` through dependencies, in
    /// depth-first discovery order.
    pub fn descendants(&self, roots: impl IntoIterator<Item = FormulaId>) -> Vec<FormulaId> {
        let mut visited = vec![false; self.formulas.len()];
        let mut order = Vec::new();
        let mut stack: Vec<FormulaId> = roots.into_iter().collect();
        stack.reverse();
        while let Some(id) = stack.pop() {
            if id.index() >= visited.len() || visited[id.index()] {
                continue;
            }
            visited[id.index()] = true;
            order.push(id);
            let mut dependencies = self.formulas[id.index()].dependencies();
            dependencies.reverse();
            stack.extend(dependencies);
        }
        order
    }
}

impl Index<FormulaId> for Formulas {
    type Output = Formula;

    fn index(&self, id: FormulaId) -> &Self::Output {
        &self.formulas[id.index()]
    }
}
