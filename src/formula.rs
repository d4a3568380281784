//! Symbolic formulas: the nodes of the computation graph.
//!
//! The variant set is closed. Every algorithm over formulas (the algebra in
//! [`arena`][crate::arena], the evaluator in [`eval`][crate::eval]) matches on
//! [`FormulaKind`] exhaustively.

use std::fmt::{Display, Formatter};

use serde::Serialize;

use crate::error::{Error, Result};
use crate::types::{FormulaId, NodeId};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind")]
pub enum FormulaKind {
    /// Multiplicative identity. Never inserted, never evaluated.
    Unit,
    /// Alias of another arena entry.
    Reference { target: FormulaId },
    /// The CPT of a node, over the node's family.
    NodePotential { node: NodeId },
    /// Hard-evidence indicator of a node; `None` means no evidence.
    EvidenceFunction { node: NodeId, level: Option<usize> },
    Product { factors: Vec<FormulaId> },
    Marginal { potential: FormulaId, marginalized: Vec<NodeId> },
}

/// A formula together with its domain and its place in the arena.
///
/// `domain` is sorted ascending and `levels[i]` is the cardinality of
/// `domain[i]`. `name` is the canonical structural key: two formulas with the
/// same name are the same formula.
#[derive(Debug, Clone, Serialize)]
pub struct Formula {
    pub(crate) id: Option<FormulaId>,
    pub(crate) kind: FormulaKind,
    pub(crate) domain: Vec<NodeId>,
    pub(crate) levels: Vec<usize>,
    pub(crate) size: usize,
    pub(crate) name: String,
    pub(crate) referenced_by: Vec<FormulaId>,
}

impl Formula {
    pub(crate) fn new(kind: FormulaKind, domain: Vec<NodeId>, levels: Vec<usize>, name: String) -> Self {
        debug_assert!(domain.windows(2).all(|w| w[0] < w[1]), "domain must be sorted");
        debug_assert_eq!(domain.len(), levels.len());
        Self {
            id: None,
            kind,
            size: levels.iter().product(),
            domain,
            levels,
            name,
            referenced_by: Vec::new(),
        }
    }

    pub fn unit() -> Self {
        Self {
            id: None,
            kind: FormulaKind::Unit,
            domain: Vec::new(),
            levels: Vec::new(),
            size: 0,
            name: "1".to_string(),
            referenced_by: Vec::new(),
        }
    }

    /// The CPT of `node`, whose sorted family domain is given.
    pub fn node_potential(node: NodeId, domain: Vec<NodeId>, levels: Vec<usize>) -> Self {
        Self::new(
            FormulaKind::NodePotential { node },
            domain,
            levels,
            format!("Φ({})", node),
        )
    }

    /// Evidence indicator of `node`, initially without evidence.
    pub fn evidence_function(node: NodeId, cardinality: usize) -> Self {
        Self::new(
            FormulaKind::EvidenceFunction { node, level: None },
            vec![node],
            vec![cardinality],
            format!("ε({})", node),
        )
    }

    pub fn id(&self) -> Option<FormulaId> {
        self.id
    }

    /// The arena id, failing for formulas that are not in the arena.
    pub fn require_id(&self) -> Result<FormulaId> {
        self.id
            .ok_or_else(|| Error::internal(format!("formula {} is not in the arena", self.name)))
    }

    /// The arena entry this formula stands for: its own id, or the target of
    /// a reference.
    pub fn handle(&self) -> Option<FormulaId> {
        match self.kind {
            FormulaKind::Reference { target } => Some(target),
            _ => self.id,
        }
    }

    pub fn kind(&self) -> &FormulaKind {
        &self.kind
    }
    pub fn domain(&self) -> &[NodeId] {
        &self.domain
    }
    pub fn levels(&self) -> &[usize] {
        &self.levels
    }
    pub fn size(&self) -> usize {
        self.size
    }
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn referenced_by(&self) -> &[FormulaId] {
        &self.referenced_by
    }

    pub fn is_unit(&self) -> bool {
        matches!(self.kind, FormulaKind::Unit)
    }

    /// Cardinality of `node` if it is in the domain.
    pub fn cardinality(&self, node: NodeId) -> Option<usize> {
        self.domain.binary_search(&node).ok().map(|i| self.levels[i])
    }

    /// Arena entries this formula reads when evaluated.
    pub fn dependencies(&self) -> Vec<FormulaId> {
        match &self.kind {
            FormulaKind::Unit | FormulaKind::NodePotential { .. } | FormulaKind::EvidenceFunction { .. } => Vec::new(),
            FormulaKind::Reference { target } => vec![*target],
            FormulaKind::Product { factors } => factors.clone(),
            FormulaKind::Marginal { potential, .. } => vec![*potential],
        }
    }
}

impl Display for Formula {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.id {
            Some(id) => write!(f, "{} = {}", id, self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit() {
        let unit = Formula::unit();
        assert!(unit.is_unit());
        assert_eq!(unit.size(), 0);
        assert!(unit.domain().is_empty());
        assert_eq!(unit.handle(), None);
        assert!(unit.require_id().is_err());
    }

    #[test]
    fn test_node_potential() {
        let f = Formula::node_potential(NodeId::new(2), vec![NodeId::new(0), NodeId::new(2)], vec![3, 2]);
        assert_eq!(f.size(), 6);
        assert_eq!(f.name(), "Φ(v2)");
        assert_eq!(f.cardinality(NodeId::new(0)), Some(3));
        assert_eq!(f.cardinality(NodeId::new(1)), None);
        assert!(f.dependencies().is_empty());
    }

    #[test]
    fn test_evidence_function() {
        let f = Formula::evidence_function(NodeId::new(4), 3);
        assert_eq!(f.domain(), &[NodeId::new(4)]);
        assert_eq!(f.size(), 3);
        assert_eq!(
            f.kind(),
            &FormulaKind::EvidenceFunction {
                node: NodeId::new(4),
                level: None
            }
        );
    }
}
