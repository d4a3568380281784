//! Structural snapshot of an engine, for inspection and export.
//!
//! A snapshot is a plain serializable view of the engine: its cliques and
//! components, the junction tree edges, the current evidence, every cache slot
//! and every formula name. Taking a snapshot never evaluates anything; the
//! marginals it reports are the ones that happen to be cached already.
//! Rebuilding an engine from a snapshot is not supported.

use indexmap::IndexMap;
use serde::Serialize;

use crate::engine::{Evidence, InferenceEngine, LazyPropagationEngine};
use crate::error::Result;
use crate::potential::normalize;
use crate::types::FormulaId;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CliqueSnapshot {
    pub name: String,
    pub members: Vec<String>,
    pub factors: Vec<String>,
    pub component: usize,
    pub prior: Option<FormulaId>,
    pub posterior: FormulaId,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeparatorSnapshot {
    pub cliques: (String, String),
    pub shared: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineSnapshot {
    pub cliques: Vec<CliqueSnapshot>,
    /// Clique names of each connected component.
    pub components: Vec<Vec<String>>,
    pub evidence: Evidence,
    /// Directed message edges, `"source->target"`, with their formula ids.
    pub junction_tree: IndexMap<String, Vec<FormulaId>>,
    /// Normalized marginals of the nodes whose posterior is already cached.
    pub marginals: IndexMap<String, IndexMap<String, f64>>,
    /// Every cache slot, indexed by formula id.
    pub potentials: Vec<Option<Vec<f64>>>,
    pub separators: Vec<SeparatorSnapshot>,
    pub separator_potentials: Vec<Option<FormulaId>>,
    /// Canonical name of every formula, indexed by formula id.
    pub formulas: Vec<String>,
}

impl LazyPropagationEngine {
    pub fn snapshot(&self) -> EngineSnapshot {
        let node_name = |id: crate::types::NodeId| self.nodes[id.index()].name.clone();
        let clique_name = |id: crate::types::CliqueId| self.cliques[id.index()].name.clone();

        let cliques = self
            .cliques
            .iter()
            .map(|c| CliqueSnapshot {
                name: c.name.clone(),
                members: c.domain.iter().map(|&v| node_name(v)).collect(),
                factors: c.factors.iter().map(|&v| node_name(v)).collect(),
                component: c.component.index(),
                prior: c.prior,
                posterior: c.posterior,
            })
            .collect();

        let components = self
            .components()
            .into_iter()
            .map(|component| component.into_iter().map(clique_name).collect())
            .collect();

        let marginals = self
            .nodes
            .iter()
            .filter_map(|node| {
                let mut values = self.cache.peek(node.posterior)?.to_vec();
                normalize(&mut values);
                Some((node.name.clone(), node.states.iter().cloned().zip(values).collect()))
            })
            .collect();

        let separators = self
            .separators
            .iter()
            .map(|s| SeparatorSnapshot {
                cliques: (clique_name(s.cliques.0), clique_name(s.cliques.1)),
                shared: s.shared.iter().map(|&v| node_name(v)).collect(),
            })
            .collect();

        EngineSnapshot {
            cliques,
            components,
            evidence: self.evidence(),
            junction_tree: self.messages.clone(),
            marginals,
            potentials: self.cache.slots().to_vec(),
            separators,
            separator_potentials: self.separator_potentials(),
            formulas: self.formulas.iter().map(|f| f.name().to_string()).collect(),
        }
    }

    /// The snapshot rendered as pretty-printed JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.snapshot())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use test_log::test;

    use crate::engine::InferAllOptions;
    use crate::network::Network;
    use crate::topology::{CliqueSpec, JunctionTree, SeparatorSpec};

    fn engine() -> LazyPropagationEngine {
        let network: Network = serde_json::from_str(
            r#"{
                "A": { "parents": [], "states": ["a0", "a1"], "cpt": { "a0": 0.6, "a1": 0.4 } },
                "B": {
                    "parents": ["A"],
                    "states": ["b0", "b1"],
                    "cpt": [
                        { "when": { "A": "a0" }, "then": { "b0": 0.9, "b1": 0.1 } },
                        { "when": { "A": "a1" }, "then": { "b0": 0.2, "b1": 0.8 } }
                    ]
                },
                "C": { "parents": [], "states": ["c0", "c1"], "cpt": { "c0": 0.5, "c1": 0.5 } }
            }"#,
        )
        .unwrap();
        let tree = JunctionTree {
            cliques: vec![
                CliqueSpec {
                    name: "A".to_string(),
                    members: vec!["A".to_string()],
                },
                CliqueSpec {
                    name: "AB".to_string(),
                    members: vec!["A".to_string(), "B".to_string()],
                },
                CliqueSpec {
                    name: "C".to_string(),
                    members: vec!["C".to_string()],
                },
            ],
            separators: vec![SeparatorSpec {
                cliques: (0, 1),
                shared: vec!["A".to_string()],
            }],
            factors: IndexMap::from([("A".to_string(), 0), ("B".to_string(), 1), ("C".to_string(), 2)]),
        };
        LazyPropagationEngine::new(network, &tree).unwrap()
    }

    #[test]
    fn test_snapshot_structure() {
        let engine = engine();
        let snapshot = engine.snapshot();
        assert_eq!(snapshot.cliques.len(), 3);
        assert_eq!(snapshot.cliques[1].members, vec!["A", "B"]);
        assert_eq!(snapshot.components, vec![vec!["A", "AB"], vec!["C"]]);
        assert_eq!(snapshot.separators[0].cliques, ("A".to_string(), "AB".to_string()));
        assert_eq!(snapshot.junction_tree.len(), 2);
        assert_eq!(snapshot.formulas.len(), engine.formulas().len());
        assert_eq!(snapshot.potentials.len(), engine.formulas().len());
        assert_eq!(snapshot.formulas[0], "Φ(v0)");
    }

    #[test]
    fn test_snapshot_does_not_evaluate() {
        let mut engine = engine();
        let before = engine.cache_stats();
        let snapshot = engine.snapshot();
        assert!(snapshot.marginals.is_empty());
        assert_eq!(engine.cache_stats(), before);

        engine.infer_all(&InferAllOptions::default()).unwrap();
        let snapshot = engine.snapshot();
        assert_eq!(snapshot.marginals.keys().collect::<Vec<_>>(), vec!["A", "B", "C"]);
        assert!((snapshot.marginals["B"]["b0"] - 0.62).abs() < 1e-9);
    }

    #[test]
    fn test_to_json() {
        let mut engine = engine();
        engine
            .set_evidence(&IndexMap::from([("C".to_string(), "c1".to_string())]))
            .unwrap();
        let json: serde_json::Value = serde_json::from_str(&engine.to_json().unwrap()).unwrap();
        assert_eq!(json["evidence"]["C"], "c1");
        assert_eq!(json["separators"][0]["shared"][0], "A");
        assert!(json["formulas"].as_array().unwrap().len() > 6);
    }
}
