//! Debug utilities for inspecting formulas and their values.
//!
//! These are primarily useful in tests and during development.

use crate::arena::Formulas;
use crate::formula::{Formula, FormulaKind};
use crate::node::Node;
use crate::potential::index_to_combination;
use crate::types::FormulaId;

/// One formula of a [`FormulaTree`].
#[derive(Debug, Clone)]
pub struct FormulaInfo {
    pub id: FormulaId,
    pub name: String,
    /// Variant name
    pub kind: &'static str,
    pub size: usize,
    pub dependencies: Vec<FormulaId>,
    pub dependents: Vec<FormulaId>,
}

impl std::fmt::Display for FormulaInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {}(size={}) = {} <- {:?}",
            self.id, self.kind, self.size, self.name, self.dependents
        )
    }
}

/// Everything reachable from a root formula.
#[derive(Debug, Clone)]
pub struct FormulaTree {
    pub root: FormulaId,
    pub formulas: Vec<FormulaInfo>,
}

impl std::fmt::Display for FormulaTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Formula tree (root = {}):", self.root)?;
        for info in &self.formulas {
            writeln!(f, "  {}", info)?;
        }
        Ok(())
    }
}

fn kind_name(formula: &Formula) -> &'static str {
    match formula.kind() {
        FormulaKind::Unit => "Unit",
        FormulaKind::Reference { .. } => "Reference",
        FormulaKind::NodePotential { .. } => "NodePotential",
        FormulaKind::EvidenceFunction { .. } => "EvidenceFunction",
        FormulaKind::Product { .. } => "Product",
        FormulaKind::Marginal { .. } => "Marginal",
    }
}

impl Formulas {
    pub fn formula_info(&self, id: FormulaId) -> FormulaInfo {
        let formula = &self[id];
        FormulaInfo {
            id,
            name: formula.name().to_string(),
            kind: kind_name(formula),
            size: formula.size(),
            dependencies: formula.dependencies(),
            dependents: self.dependents(id).to_vec(),
        }
    }

    /// All formulas reachable from `root`, sorted by id (so leaves come first).
    pub fn debug_tree(&self, root: FormulaId) -> FormulaTree {
        let mut ids = self.descendants([root]);
        ids.sort_unstable();
        FormulaTree {
            root,
            formulas: ids.into_iter().map(|id| self.formula_info(id)).collect(),
        }
    }

    /// Dump the whole arena, one formula per line.
    pub fn dump_state(&self) -> String {
        let mut result = String::new();
        result.push_str(&format!("=== Formulas: count={} ===\n", self.len()));
        for formula in self.iter() {
            if let Some(id) = formula.id() {
                result.push_str(&format!("  {}\n", self.formula_info(id)));
            }
        }
        result
    }
}

/// Render a potential as a table, one row per cell, with the state labels of
/// every domain variable.
///
/// `nodes` is indexed by node id.
pub fn show_potential(formula: &Formula, values: &[f64], nodes: &[Node]) -> String {
    let mut result = String::new();
    let names: Vec<&str> = formula
        .domain()
        .iter()
        .map(|v| nodes.get(v.index()).map_or("?", |n| n.name.as_str()))
        .collect();
    result.push_str(&format!("{} | {}\n", names.join(" | "), formula.name()));
    for (index, value) in values.iter().enumerate() {
        let combination = index_to_combination(index, formula.levels());
        let states: Vec<&str> = formula
            .domain()
            .iter()
            .zip(&combination)
            .map(|(v, &level)| {
                nodes
                    .get(v.index())
                    .and_then(|n| n.states.get(level))
                    .map_or("?", String::as_str)
            })
            .collect();
        result.push_str(&format!("{} | {:.6}\n", states.join(" | "), value));
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::types::{CliqueId, NodeId};

    fn nodes() -> Vec<Node> {
        ["A", "B"]
            .iter()
            .enumerate()
            .map(|(i, name)| Node {
                id: NodeId::from(i),
                name: name.to_string(),
                states: vec![format!("{}0", name.to_lowercase()), format!("{}1", name.to_lowercase())],
                parents: vec![],
                children: vec![],
                potential: FormulaId::from(i),
                evidence_function: FormulaId::from(i + 2),
                posterior: FormulaId::from(i),
                cliques: vec![CliqueId::new(0)],
            })
            .collect()
    }

    #[test]
    fn test_show_potential() {
        let formula = Formula::node_potential(NodeId::new(1), vec![NodeId::new(0), NodeId::new(1)], vec![2, 2]);
        let table = show_potential(&formula, &[0.9, 0.1, 0.2, 0.8], &nodes());
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines[0], "A | B | Φ(v1)");
        assert_eq!(lines[1], "a0 | b0 | 0.900000");
        assert_eq!(lines[4], "a1 | b1 | 0.800000");
    }

    #[test]
    fn test_debug_tree() {
        let mut formulas = Formulas::new();
        let a = formulas.upsert(Formula::evidence_function(NodeId::new(0), 2)).unwrap();
        let b = formulas.upsert(Formula::evidence_function(NodeId::new(1), 2)).unwrap();
        let product = formulas.mult(vec![a, b]).unwrap();
        let product = formulas.upsert(product).unwrap();
        formulas.update_references();

        let tree = formulas.debug_tree(product.id().unwrap());
        assert_eq!(tree.formulas.len(), 3);
        assert_eq!(tree.formulas[2].kind, "Product");
        assert_eq!(tree.formulas[0].dependents, vec![FormulaId::new(2)]);
        assert!(tree.to_string().contains("Π(#0,#1)"));
        assert!(formulas.dump_state().contains("count=3"));
    }
}
