use serde::Serialize;

use crate::types::{CliqueId, ComponentId, FormulaId, NodeId, SeparatorId};

/// A clique of the junction tree.
///
/// `neighbors`, `separators` and `messages` are parallel: the `k`-th neighbor
/// is joined through the `k`-th separator and sent the `k`-th message list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Clique {
    pub id: CliqueId,
    pub name: String,
    /// Nodes whose CPT is assigned to this clique.
    pub factors: Vec<NodeId>,
    /// Sorted member nodes.
    pub domain: Vec<NodeId>,
    pub levels: Vec<usize>,
    pub neighbors: Vec<CliqueId>,
    pub separators: Vec<SeparatorId>,
    /// Formulas received from each neighbor, with units dropped.
    pub messages: Vec<Vec<FormulaId>>,
    /// Product of the assigned CPTs; `None` when no CPT is assigned.
    pub prior: Option<FormulaId>,
    pub posterior: FormulaId,
    /// Evidence function of each domain node, parallel to `domain`.
    pub evidence: Vec<FormulaId>,
    pub component: ComponentId,
}

impl Clique {
    pub fn contains(&self, node: NodeId) -> bool {
        self.domain.binary_search(&node).is_ok()
    }

    /// Whether every node of `nodes` is a member.
    pub fn covers(&self, nodes: &[NodeId]) -> bool {
        nodes.iter().all(|&node| self.contains(node))
    }

    /// Number of cells of a potential over the whole clique.
    pub fn size(&self) -> usize {
        self.levels.iter().product()
    }
}

/// A junction tree edge between two distinct cliques.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Separator {
    pub id: SeparatorId,
    pub cliques: (CliqueId, CliqueId),
    /// Sorted shared nodes.
    pub shared: Vec<NodeId>,
    /// Marginal of the smaller adjacent posterior onto `shared`; `None` when
    /// nothing is shared.
    pub potential: Option<FormulaId>,
}

impl Separator {
    /// The clique on the other side of `clique`.
    pub fn other(&self, clique: CliqueId) -> CliqueId {
        if self.cliques.0 == clique {
            self.cliques.1
        } else {
            self.cliques.0
        }
    }
}
