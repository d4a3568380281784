use serde::Serialize;

use crate::types::{CliqueId, FormulaId, NodeId};

/// A network variable as the engine sees it.
///
/// All links are ids into the engine's flat arrays. The record is built once
/// by the assembler and never changes afterwards; evidence lives in the
/// node's evidence function, not here.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Node {
    pub id: NodeId,
    pub name: String,
    pub states: Vec<String>,
    pub parents: Vec<NodeId>,
    pub children: Vec<NodeId>,
    /// The node's CPT, a `NodePotential`.
    pub potential: FormulaId,
    /// The node's `EvidenceFunction`.
    pub evidence_function: FormulaId,
    /// Unnormalized posterior marginal over `{node}`.
    pub posterior: FormulaId,
    /// Cliques containing the node, in clique order.
    pub cliques: Vec<CliqueId>,
}

impl Node {
    pub fn cardinality(&self) -> usize {
        self.states.len()
    }

    /// Index of `state` among the node's states.
    pub fn level(&self, state: &str) -> Option<usize> {
        self.states.iter().position(|s| s == state)
    }

    pub fn has_parent(&self, parent: NodeId) -> bool {
        self.parents.contains(&parent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level() {
        let node = Node {
            id: NodeId::new(0),
            name: "A".to_string(),
            states: vec!["a0".to_string(), "a1".to_string()],
            parents: vec![],
            children: vec![NodeId::new(1)],
            potential: FormulaId::new(0),
            evidence_function: FormulaId::new(2),
            posterior: FormulaId::new(7),
            cliques: vec![CliqueId::new(0)],
        };
        assert_eq!(node.cardinality(), 2);
        assert_eq!(node.level("a1"), Some(1));
        assert_eq!(node.level("a2"), None);
        assert!(!node.has_parent(NodeId::new(1)));
    }
}
