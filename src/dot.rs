//! Formula graph to DOT (Graphviz) conversion.
//!
//! The generated graph follows these conventions:
//! - **Leaves** (CPTs and evidence functions) are placed together at the bottom (sink rank)
//! - **Products** and **marginals** get their own shapes
//! - **Edges** point from a formula to the formulas it reads
//! - **Root labels** are rendered at the top (source rank)
//!
//! # Examples
//!
//! ```
//! use lazyprop_rs::arena::Formulas;
//! use lazyprop_rs::formula::Formula;
//! use lazyprop_rs::types::NodeId;
//!
//! let mut formulas = Formulas::new();
//! let a = formulas.upsert(Formula::evidence_function(NodeId::new(0), 2)).unwrap();
//! let b = formulas.upsert(Formula::evidence_function(NodeId::new(1), 2)).unwrap();
//! let product = formulas.mult(vec![a, b]).unwrap();
//! let product = formulas.upsert(product).unwrap();
//!
//! let dot = formulas.to_dot(&[product.id().unwrap()]).unwrap();
//! // Render with: dot -Tpng output.dot -o output.png
//! ```

use std::fmt::Write as _;

use crate::arena::Formulas;
use crate::formula::FormulaKind;
use crate::types::FormulaId;

/// Configuration options for DOT output generation.
///
/// ```
/// use lazyprop_rs::dot::DotConfig;
///
/// let config = DotConfig {
///     product_shape: "box3d",
///     ..DotConfig::default()
/// };
/// ```
#[derive(Debug, Clone)]
pub struct DotConfig {
    /// Shape for CPT leaves (default: "box")
    pub potential_shape: &'static str,
    /// Shape for evidence function leaves (default: "diamond")
    pub evidence_shape: &'static str,
    /// Shape for products (default: "circle")
    pub product_shape: &'static str,
    /// Shape for marginals (default: "ellipse")
    pub marginal_shape: &'static str,
    /// Shape for root labels (default: "rect")
    pub root_shape: &'static str,
    /// Whether to include the domain of each formula in its label (default: true)
    pub show_domains: bool,
}

impl Default for DotConfig {
    fn default() -> Self {
        Self {
            potential_shape: "box",
            evidence_shape: "diamond",
            product_shape: "circle",
            marginal_shape: "ellipse",
            root_shape: "rect",
            show_domains: true,
        }
    }
}

impl Formulas {
    /// Converts the formulas reachable from `roots` to DOT format.
    pub fn to_dot(&self, roots: &[FormulaId]) -> Result<String, std::fmt::Error> {
        self.to_dot_with_config(roots, &DotConfig::default())
    }

    /// Converts the formulas reachable from `roots` to DOT format with custom
    /// configuration.
    pub fn to_dot_with_config(&self, roots: &[FormulaId], config: &DotConfig) -> Result<String, std::fmt::Error> {
        let mut dot = String::new();
        writeln!(dot, "digraph {{")?;

        let reachable = self.descendants(roots.iter().copied());
        let label = |id: FormulaId| {
            let f = &self[id];
            if config.show_domains {
                let domain: Vec<String> = f.domain().iter().map(|v| v.to_string()).collect();
                format!("\"{}\\n{}\\n{{{}}}\"", id, f.name(), domain.join(","))
            } else {
                format!("\"{}\\n{}\"", id, f.name())
            }
        };

        // Leaves share the bottom rank.
        writeln!(dot, "{{ rank=sink")?;
        for &id in &reachable {
            let shape = match self[id].kind() {
                FormulaKind::NodePotential { .. } => config.potential_shape,
                FormulaKind::EvidenceFunction { .. } => config.evidence_shape,
                _ => continue,
            };
            writeln!(dot, "f{} [shape={}, label={}];", id.get(), shape, label(id))?;
        }
        writeln!(dot, "}}")?;

        for &id in &reachable {
            let shape = match self[id].kind() {
                FormulaKind::Product { .. } => config.product_shape,
                FormulaKind::Marginal { .. } => config.marginal_shape,
                FormulaKind::Unit
                | FormulaKind::Reference { .. }
                | FormulaKind::NodePotential { .. }
                | FormulaKind::EvidenceFunction { .. } => continue,
            };
            writeln!(dot, "f{} [shape={}, label={}];", id.get(), shape, label(id))?;
        }

        for &id in &reachable {
            for dependency in self[id].dependencies() {
                writeln!(dot, "f{} -> f{};", id.get(), dependency.get())?;
            }
        }

        writeln!(dot, "{{ rank=source")?;
        for (i, root) in roots.iter().enumerate() {
            writeln!(dot, "r{} [shape={}, label=\"{}\"];", i, config.root_shape, root)?;
        }
        writeln!(dot, "}}")?;
        for (i, root) in roots.iter().enumerate() {
            writeln!(dot, "r{} -> f{};", i, root.get())?;
        }

        writeln!(dot, "}}")?;
        Ok(dot)
    }
}
