//! Junction-tree topology consumed by the engine.
//!
//! Building a junction tree (moralization, triangulation, clique discovery,
//! separator computation) and assigning CPTs to cliques happen elsewhere. The
//! engine only consumes the result through [`TopologyProvider`], once, at
//! construction.

use std::collections::HashSet;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::network::Network;

/// A clique: a named set of network nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CliqueSpec {
    pub name: String,
    pub members: Vec<String>,
}

/// A junction tree edge: two clique indices and the nodes they share.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeparatorSpec {
    pub cliques: (usize, usize),
    pub shared: Vec<String>,
}

/// A junction tree over the nodes of a network.
///
/// `factors` assigns every node's CPT to one clique (by index) that contains
/// the node's whole family. The separators are the tree edges; the adjacency is
/// derived from them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JunctionTree {
    pub cliques: Vec<CliqueSpec>,
    pub separators: Vec<SeparatorSpec>,
    pub factors: IndexMap<String, usize>,
}

/// Something that can produce the junction tree of a network.
pub trait TopologyProvider {
    fn junction_tree(&self, network: &Network) -> Result<JunctionTree>;
}

/// A precomputed junction tree is its own provider.
impl TopologyProvider for JunctionTree {
    fn junction_tree(&self, _network: &Network) -> Result<JunctionTree> {
        Ok(self.clone())
    }
}

impl JunctionTree {
    /// Neighbor clique indices of `clique`, in separator order.
    pub fn neighbors(&self, clique: usize) -> Vec<usize> {
        self.separators
            .iter()
            .filter_map(|s| match s.cliques {
                (a, b) if a == clique => Some(b),
                (a, b) if b == clique => Some(a),
                _ => None,
            })
            .collect()
    }

    /// Indices of the separators touching `clique`, parallel to [`neighbors`].
    ///
    /// [`neighbors`]: JunctionTree::neighbors
    pub fn separators_of(&self, clique: usize) -> Vec<usize> {
        self.separators
            .iter()
            .enumerate()
            .filter(|(_, s)| s.cliques.0 == clique || s.cliques.1 == clique)
            .map(|(i, _)| i)
            .collect()
    }

    /// Connected components of the clique graph, each listed in breadth-first
    /// order from its lowest-indexed clique (the component root).
    pub fn components(&self) -> Vec<Vec<usize>> {
        let mut seen = vec![false; self.cliques.len()];
        let mut components = Vec::new();
        for root in 0..self.cliques.len() {
            if seen[root] {
                continue;
            }
            seen[root] = true;
            let mut component = vec![root];
            let mut head = 0;
            while head < component.len() {
                let current = component[head];
                head += 1;
                for neighbor in self.neighbors(current) {
                    if neighbor < seen.len() && !seen[neighbor] {
                        seen[neighbor] = true;
                        component.push(neighbor);
                    }
                }
            }
            components.push(component);
        }
        components
    }

    /// Check the topology against the network it claims to describe.
    ///
    /// Separators that do not join two distinct cliques are left for the
    /// assembler, which treats them as a broken internal precondition.
    pub fn validate(&self, network: &Network) -> Result<()> {
        let mut covered = HashSet::new();
        for clique in &self.cliques {
            if clique.members.is_empty() {
                return Err(Error::InvalidTopology(format!("clique '{}' is empty", clique.name)));
            }
            for member in &clique.members {
                if network.get(member).is_none() {
                    return Err(Error::InvalidTopology(format!(
                        "clique '{}' contains unknown node '{}'",
                        clique.name, member
                    )));
                }
                covered.insert(member.as_str());
            }
        }
        if let Some(missing) = network.names().find(|name| !covered.contains(name)) {
            return Err(Error::InvalidTopology(format!("node '{}' belongs to no clique", missing)));
        }

        for separator in &self.separators {
            let (a, b) = separator.cliques;
            for &c in &[a, b] {
                if let Some(clique) = self.cliques.get(c) {
                    if let Some(stray) = separator.shared.iter().find(|n| !clique.members.contains(*n)) {
                        return Err(Error::InvalidTopology(format!(
                            "separator node '{}' is not in clique '{}'",
                            stray, clique.name
                        )));
                    }
                }
            }
        }

        for (name, spec) in network.iter() {
            let &index = self
                .factors
                .get(name)
                .ok_or_else(|| Error::InvalidTopology(format!("no clique assigned to the CPT of '{}'", name)))?;
            let clique = self
                .cliques
                .get(index)
                .ok_or_else(|| Error::InvalidTopology(format!("CPT of '{}' assigned to missing clique {}", name, index)))?;
            let family = std::iter::once(name).chain(spec.parents.iter().map(String::as_str));
            for member in family {
                if !clique.members.iter().any(|m| m == member) {
                    return Err(Error::InvalidTopology(format!(
                        "clique '{}' cannot hold the CPT of '{}': '{}' is missing",
                        clique.name, name, member
                    )));
                }
            }
        }
        Ok(())
    }
}
