//! Network input model.
//!
//! A [`Network`] is an ordered map from node name to [`NodeSpec`]. Node order
//! matters: it fixes the [`NodeId`] numbering and therefore the layout of every
//! potential the engine builds. Networks deserialize from JSON of the form
//!
//! ```json
//! {
//!   "A": { "parents": [], "states": ["a0", "a1"], "cpt": { "a0": 0.6, "a1": 0.4 } },
//!   "B": {
//!     "parents": ["A"],
//!     "states": ["b0", "b1"],
//!     "cpt": [
//!       { "when": { "A": "a0" }, "then": { "b0": 0.9, "b1": 0.1 } },
//!       { "when": { "A": "a1" }, "then": { "b0": 0.2, "b1": 0.8 } }
//!     ]
//!   }
//! }
//! ```

use std::collections::HashSet;

use indexmap::IndexMap;
use num_bigint::BigUint;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::potential::{cpt_to_potential, Family};
use crate::types::NodeId;

/// A conditional probability table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Cpt {
    /// State → probability, for a parentless node.
    Prior(IndexMap<String, f64>),
    /// One row per parent-state combination.
    Conditional(Vec<CptRow>),
}

/// One row of a conditional table: the parent states it applies to and the
/// resulting distribution over the node's states.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CptRow {
    pub when: IndexMap<String, String>,
    pub then: IndexMap<String, f64>,
}

/// A node of the network as supplied by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSpec {
    pub parents: Vec<String>,
    pub states: Vec<String>,
    pub cpt: Cpt,
}

/// A discrete Bayesian network.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Network {
    nodes: IndexMap<String, NodeSpec>,
}

impl Network {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert (or replace) a node, returning the previous spec if any.
    ///
    /// Replacing keeps the node's original position.
    pub fn insert(&mut self, name: impl Into<String>, spec: NodeSpec) -> Option<NodeSpec> {
        self.nodes.insert(name.into(), spec)
    }

    pub fn get(&self, name: &str) -> Option<&NodeSpec> {
        self.nodes.get(name)
    }

    /// Position of the node, which becomes its [`NodeId`].
    pub fn node_id(&self, name: &str) -> Option<NodeId> {
        self.nodes.get_index_of(name).map(NodeId::from)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &NodeSpec)> {
        self.nodes.iter().map(|(name, spec)| (name.as_str(), spec))
    }

    /// The CPT family of a node, with ids taken from network order.
    pub(crate) fn family(&self, name: &str) -> Result<Family<'_>> {
        let (index, name, spec) = self
            .nodes
            .get_full(name)
            .ok_or_else(|| Error::NotFound(name.to_string()))?;
        let parents = spec
            .parents
            .iter()
            .map(|parent| {
                let (i, parent, pspec) = self
                    .nodes
                    .get_full(parent)
                    .ok_or_else(|| Error::InvalidNetwork(format!("'{}' has unknown parent '{}'", name, parent)))?;
                Ok((NodeId::from(i), parent.as_str(), pspec.states.as_slice()))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Family {
            node: (NodeId::from(index), name.as_str(), spec.states.as_slice()),
            parents,
        })
    }

    /// Validate the whole network: parents exist, states are non-empty and
    /// unique, the graph is acyclic, and every CPT is a complete table of
    /// probability distributions.
    pub fn validate(&self) -> Result<()> {
        if self.nodes.is_empty() {
            return Err(Error::InvalidNetwork("network has no nodes".to_string()));
        }
        for (name, spec) in &self.nodes {
            if spec.states.is_empty() {
                return Err(Error::InvalidNetwork(format!("'{}' has no states", name)));
            }
            let mut seen = HashSet::new();
            if let Some(dup) = spec.states.iter().find(|s| !seen.insert(s.as_str())) {
                return Err(Error::InvalidNetwork(format!("'{}' has duplicate state '{}'", name, dup)));
            }
            let mut seen = HashSet::new();
            for parent in &spec.parents {
                if parent == name {
                    return Err(Error::InvalidNetwork(format!("'{}' is its own parent", name)));
                }
                if !seen.insert(parent.as_str()) {
                    return Err(Error::InvalidNetwork(format!("'{}' lists parent '{}' twice", name, parent)));
                }
            }
            let family = self.family(name)?;
            cpt_to_potential(&family, &spec.cpt)?;
        }
        self.check_acyclic()
    }

    /// Kahn's algorithm over parent edges.
    fn check_acyclic(&self) -> Result<()> {
        let mut pending: Vec<usize> = self.nodes.values().map(|spec| spec.parents.len()).collect();
        let mut children: Vec<Vec<usize>> = vec![Vec::new(); self.nodes.len()];
        for (i, spec) in self.nodes.values().enumerate() {
            for parent in &spec.parents {
                if let Some(p) = self.nodes.get_index_of(parent) {
                    children[p].push(i);
                }
            }
        }
        let mut ready: Vec<usize> = (0..pending.len()).filter(|&i| pending[i] == 0).collect();
        let mut visited = 0;
        while let Some(i) = ready.pop() {
            visited += 1;
            for &child in &children[i] {
                pending[child] -= 1;
                if pending[child] == 0 {
                    ready.push(child);
                }
            }
        }
        if visited != self.nodes.len() {
            return Err(Error::InvalidNetwork("network contains a directed cycle".to_string()));
        }
        Ok(())
    }

    /// Number of joint configurations of all variables.
    ///
    /// This is the size of the table naive enumeration would need, and grows
    /// past machine words quickly, hence the big integer.
    pub fn joint_state_count(&self) -> BigUint {
        self.nodes
            .values()
            .fold(BigUint::from(1u32), |acc, spec| acc * BigUint::from(spec.states.len()))
    }
}

impl FromIterator<(String, NodeSpec)> for Network {
    fn from_iter<T: IntoIterator<Item = (String, NodeSpec)>>(iter: T) -> Self {
        Self {
            nodes: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use test_log::test;

    fn chain() -> Network {
        serde_json::from_str(
            r#"{
                "A": { "parents": [], "states": ["a0", "a1"], "cpt": { "a0": 0.6, "a1": 0.4 } },
                "B": {
                    "parents": ["A"],
                    "states": ["b0", "b1"],
                    "cpt": [
                        { "when": { "A": "a0" }, "then": { "b0": 0.9, "b1": 0.1 } },
                        { "when": { "A": "a1" }, "then": { "b0": 0.2, "b1": 0.8 } }
                    ]
                }
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_deserialize() {
        let network = chain();
        assert_eq!(network.len(), 2);
        assert_eq!(network.names().collect::<Vec<_>>(), vec!["A", "B"]);
        assert_eq!(network.node_id("B"), Some(NodeId::new(1)));
        assert!(matches!(network.get("A").unwrap().cpt, Cpt::Prior(_)));
        assert!(matches!(network.get("B").unwrap().cpt, Cpt::Conditional(ref rows) if rows.len() == 2));
        network.validate().unwrap();
    }

    #[test]
    fn test_unknown_parent() {
        let mut network = chain();
        let mut b = network.get("B").unwrap().clone();
        b.parents = vec!["Z".to_string()];
        network.insert("B", b);
        assert!(matches!(network.validate(), Err(Error::InvalidNetwork(_))));
    }

    #[test]
    fn test_duplicate_state() {
        let mut network = chain();
        let mut a = network.get("A").unwrap().clone();
        a.states = vec!["a0".to_string(), "a0".to_string()];
        network.insert("A", a);
        let err = network.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate state"));
    }

    #[test]
    fn test_cycle() {
        let mut network = chain();
        let mut a = network.get("A").unwrap().clone();
        a.parents = vec!["B".to_string()];
        a.cpt = Cpt::Conditional(vec![
            CptRow {
                when: IndexMap::from([("B".to_string(), "b0".to_string())]),
                then: IndexMap::from([("a0".to_string(), 0.5), ("a1".to_string(), 0.5)]),
            },
            CptRow {
                when: IndexMap::from([("B".to_string(), "b1".to_string())]),
                then: IndexMap::from([("a0".to_string(), 0.5), ("a1".to_string(), 0.5)]),
            },
        ]);
        network.insert("A", a);
        let err = network.validate().unwrap_err();
        assert!(err.to_string().contains("cycle"));
    }

    #[test]
    fn test_bad_cpt() {
        let mut network = chain();
        let mut a = network.get("A").unwrap().clone();
        a.cpt = Cpt::Prior(IndexMap::from([("a0".to_string(), 0.7), ("a1".to_string(), 0.4)]));
        network.insert("A", a);
        assert!(matches!(network.validate(), Err(Error::InvalidDistribution { .. })));
    }

    #[test]
    fn test_joint_state_count() {
        let network = chain();
        assert_eq!(network.joint_state_count(), BigUint::from(4u32));

        let wide: Network = (0..80)
            .map(|i| {
                (
                    format!("X{}", i),
                    NodeSpec {
                        parents: vec![],
                        states: vec!["t".to_string(), "f".to_string()],
                        cpt: Cpt::Prior(IndexMap::from([("t".to_string(), 0.5), ("f".to_string(), 0.5)])),
                    },
                )
            })
            .collect();
        assert_eq!(wide.joint_state_count(), BigUint::from(2u32).pow(80));
    }
}
