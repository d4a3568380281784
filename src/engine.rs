//! The inference engine.
//!
//! [`LazyPropagationEngine`] builds the complete formula graph of a network
//! once, at construction, and evaluates it on demand. Evidence and CPT
//! changes never touch the graph: they only change the value of one leaf
//! formula (an evidence function or a node potential) and empty the cache
//! slots of everything that depends on it. Queries then recompute only what
//! was emptied.
//!
//! ```
//! use indexmap::IndexMap;
//! use lazyprop_rs::engine::{InferenceEngine, LazyPropagationEngine};
//! use lazyprop_rs::network::Network;
//! use lazyprop_rs::topology::{CliqueSpec, JunctionTree};
//!
//! let network: Network = serde_json::from_str(r#"{
//!     "A": { "parents": [], "states": ["a0", "a1"], "cpt": { "a0": 0.6, "a1": 0.4 } },
//!     "B": {
//!         "parents": ["A"],
//!         "states": ["b0", "b1"],
//!         "cpt": [
//!             { "when": { "A": "a0" }, "then": { "b0": 0.9, "b1": 0.1 } },
//!             { "when": { "A": "a1" }, "then": { "b0": 0.2, "b1": 0.8 } }
//!         ]
//!     }
//! }"#).unwrap();
//! let tree = JunctionTree {
//!     cliques: vec![CliqueSpec { name: "AB".into(), members: vec!["A".into(), "B".into()] }],
//!     separators: vec![],
//!     factors: IndexMap::from([("A".to_string(), 0), ("B".to_string(), 0)]),
//! };
//!
//! let mut engine = LazyPropagationEngine::new(network, &tree).unwrap();
//! let b0 = IndexMap::from([("B".to_string(), "b0".to_string())]);
//! assert!((engine.infer(&b0).unwrap() - 0.62).abs() < 1e-9);
//!
//! engine.set_evidence(&IndexMap::from([("A".to_string(), "a1".to_string())])).unwrap();
//! assert!((engine.infer(&b0).unwrap() - 0.2).abs() < 1e-9);
//! ```

use indexmap::IndexMap;
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::arena::Formulas;
use crate::assembly::{assemble, Assembly};
use crate::cache::{CacheStats, PotentialCache};
use crate::clique::{Clique, Separator};
use crate::error::{Error, Result};
use crate::eval::Evaluator;
use crate::formula::FormulaKind;
use crate::network::{Cpt, Network};
use crate::node::Node;
use crate::potential::{
    combination_to_index, cpt_to_potential, divide, marginalize, multiply, normalize, potential_to_cpt, union_domain,
    Factor,
};
use crate::topology::TopologyProvider;
use crate::types::{CliqueId, ComponentId, FormulaId, NodeId, SeparatorId};

/// Hard evidence: node name → observed state.
pub type Evidence = IndexMap<String, String>;

/// A conjunctive event: node name → state.
pub type Event = IndexMap<String, String>;

/// Node name → state → probability.
pub type NetworkResult = IndexMap<String, IndexMap<String, f64>>;

/// Filters for [`InferenceEngine::infer_all`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InferAllOptions {
    /// Report only these nodes.
    pub only_variables: Option<Vec<String>>,
    /// Report only nodes that carry evidence.
    pub only_evidence: bool,
}

/// An inference engine over one Bayesian network.
///
/// Once built, an engine is mutated only through these methods, which keeps
/// whatever it caches internally consistent.
pub trait InferenceEngine {
    fn has_variable(&self, name: &str) -> bool;
    fn variables(&self) -> Vec<&str>;
    fn parents(&self, name: &str) -> Result<Vec<&str>>;
    fn has_parent(&self, name: &str, parent: &str) -> Result<bool>;
    fn levels(&self, name: &str) -> Result<&[String]>;
    fn has_level(&self, name: &str, level: &str) -> Result<bool>;

    /// The current CPT of a node.
    fn distribution(&self, name: &str) -> Result<Cpt>;
    /// Replace the CPT of a node.
    fn set_distribution(&mut self, name: &str, cpt: Cpt) -> Result<()>;

    fn has_evidence_for(&self, name: &str) -> Result<bool>;
    /// The observed state of a node, if any.
    fn evidence_for(&self, name: &str) -> Result<Option<&str>>;
    /// All current evidence, in node order.
    fn evidence(&self) -> Evidence;

    /// Apply the given observations, leaving other nodes untouched.
    ///
    /// The whole batch is validated first; on error nothing changes.
    fn set_evidence(&mut self, evidence: &Evidence) -> Result<()>;
    /// Same as [`set_evidence`](InferenceEngine::set_evidence).
    fn update_evidence(&mut self, evidence: &Evidence) -> Result<()>;
    fn remove_evidence(&mut self, name: &str) -> Result<()>;
    fn remove_all_evidence(&mut self) -> Result<()>;

    /// Posterior probability of `event` given the current evidence.
    fn infer(&mut self, event: &Event) -> Result<f64>;
    /// Posterior marginals of (a subset of) all nodes.
    fn infer_all(&mut self, options: &InferAllOptions) -> Result<NetworkResult>;
}

/// Lazy propagation over a symbolic junction tree.
#[derive(Debug, Clone)]
pub struct LazyPropagationEngine {
    pub(crate) network: Network,
    pub(crate) nodes: Vec<Node>,
    pub(crate) cliques: Vec<Clique>,
    pub(crate) separators: Vec<Separator>,
    pub(crate) formulas: Formulas,
    pub(crate) cache: PotentialCache,
    pub(crate) messages: IndexMap<String, Vec<FormulaId>>,
}

impl LazyPropagationEngine {
    /// Build an engine for `network` over the junction tree supplied by
    /// `topology`.
    ///
    /// The network and the tree are validated before anything is built.
    pub fn new<T: TopologyProvider + ?Sized>(network: Network, topology: &T) -> Result<Self> {
        network.validate()?;
        let tree = topology.junction_tree(&network)?;
        tree.validate(&network)?;

        let Assembly {
            nodes,
            cliques,
            separators,
            formulas,
            messages,
            priors,
        } = assemble(&network, &tree)?;

        let mut cache = PotentialCache::new(formulas.len());
        for (node, prior) in nodes.iter().zip(priors) {
            cache.replace(node.potential, prior);
        }
        let messages = messages
            .into_iter()
            .map(|(name, formulas)| (name, formulas.iter().filter_map(|f| f.id()).collect()))
            .collect();

        debug!(
            "engine: {} nodes, {} cliques, {} formulas, {} joint states",
            nodes.len(),
            cliques.len(),
            formulas.len(),
            network.joint_state_count()
        );
        Ok(Self {
            network,
            nodes,
            cliques,
            separators,
            formulas,
            cache,
            messages,
        })
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn cliques(&self) -> &[Clique] {
        &self.cliques
    }

    pub fn separators(&self) -> &[Separator] {
        &self.separators
    }

    pub fn formulas(&self) -> &Formulas {
        &self.formulas
    }

    pub fn network(&self) -> &Network {
        &self.network
    }

    /// Formula ids of the message sent along `source -> target`.
    pub fn message(&self, source: CliqueId, target: CliqueId) -> Option<&[FormulaId]> {
        self.messages
            .get(&crate::propagation::message_name(source, target))
            .map(Vec::as_slice)
    }

    /// Separator potential formula of every separator.
    pub fn separator_potentials(&self) -> Vec<Option<FormulaId>> {
        self.separators.iter().map(|s| s.potential).collect()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Raw cached value of a formula, without evaluating anything.
    pub fn cached(&self, id: FormulaId) -> Option<&[f64]> {
        self.cache.peek(id)
    }

    /// Evaluate formula `id`, filling the cache along the way.
    pub fn evaluate(&mut self, id: FormulaId) -> Result<&[f64]> {
        Evaluator::new(&self.formulas, &mut self.cache).evaluate(id)?;
        self.cache
            .peek(id)
            .ok_or_else(|| Error::internal(format!("slot {} is empty after evaluation", id)))
    }

    /// Cliques of each connected component of the junction tree.
    pub fn components(&self) -> Vec<Vec<CliqueId>> {
        let mut components: IndexMap<ComponentId, Vec<CliqueId>> = IndexMap::new();
        for clique in &self.cliques {
            components.entry(clique.component).or_default().push(clique.id);
        }
        components.into_values().collect()
    }

    /// Normalized posterior marginal of a node.
    pub fn marginal(&mut self, node: NodeId) -> Result<Vec<f64>> {
        let posterior = self.node(node)?.posterior;
        let mut values = self.evaluate(posterior)?.to_vec();
        if normalize(&mut values) == 0.0 {
            warn!("marginal of {} has zero mass: evidence is impossible", node);
        }
        Ok(values)
    }

    pub(crate) fn node_id(&self, name: &str) -> Result<NodeId> {
        self.network
            .node_id(name)
            .ok_or_else(|| Error::NotFound(name.to_string()))
    }

    fn node(&self, id: NodeId) -> Result<&Node> {
        self.nodes
            .get(id.index())
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }

    fn node_by_name(&self, name: &str) -> Result<&Node> {
        self.node(self.node_id(name)?)
    }

    pub(crate) fn evidence_level(&self, node: &Node) -> Option<usize> {
        match self.formulas[node.evidence_function].kind() {
            FormulaKind::EvidenceFunction { level, .. } => *level,
            _ => None,
        }
    }

    /// Resolve names and states, failing before anything is touched.
    fn resolve(&self, assignment: &IndexMap<String, String>) -> Result<Vec<(NodeId, usize)>> {
        assignment
            .iter()
            .map(|(name, state)| {
                let node = self.node_by_name(name)?;
                let level = node.level(state).ok_or_else(|| Error::InvalidState {
                    node: name.clone(),
                    state: state.clone(),
                })?;
                Ok((node.id, level))
            })
            .collect()
    }

    /// Set the evidence level of one node and invalidate what depends on it.
    fn apply_evidence(&mut self, node: NodeId, level: Option<usize>) -> Result<()> {
        let function = self.node(node)?.evidence_function;
        let previous = self.formulas.set_evidence_level(function, level)?;
        if previous == level {
            return Ok(());
        }
        debug!("evidence: {} {:?} -> {:?}", node, previous, level);
        self.cache.clear(function);
        self.cache.invalidate_dependents(&self.formulas, function);
        Ok(())
    }

    fn component_of(&self, node: NodeId) -> Result<ComponentId> {
        let clique = self
            .node(node)?
            .cliques
            .first()
            .copied()
            .ok_or_else(|| Error::internal(format!("{} belongs to no clique", node)))?;
        Ok(self.cliques[clique.index()].component)
    }

    /// Probability of an event whose nodes all lie in one component.
    fn infer_connected(&mut self, event: &[(NodeId, usize)]) -> Result<f64> {
        if let [(node, level)] = event {
            return self.infer_from_marginal(*node, *level);
        }
        let nodes: Vec<NodeId> = event.iter().map(|&(node, _)| node).collect();
        let smallest = self
            .cliques
            .iter()
            .filter(|c| c.covers(&nodes))
            .min_by_key(|c| c.size())
            .map(|c| c.id);
        if let Some(clique) = smallest {
            return self.infer_from_clique(clique, event);
        }
        self.infer_from_joint(event)
    }

    fn infer_from_marginal(&mut self, node: NodeId, level: usize) -> Result<f64> {
        let marginal = self.marginal(node)?;
        marginal
            .get(level)
            .copied()
            .ok_or_else(|| Error::internal(format!("level {} out of range for {}", level, node)))
    }

    fn infer_from_clique(&mut self, clique: CliqueId, event: &[(NodeId, usize)]) -> Result<f64> {
        let posterior = self.cliques[clique.index()].posterior;
        let values = self.evaluate(posterior)?.to_vec();
        let formula = &self.formulas[posterior];
        Ok(event_probability(event, formula.domain(), formula.levels(), &values))
    }

    /// Multiply the posteriors of the smallest subtree connecting the event's
    /// nodes and divide out the separators between them.
    fn infer_from_joint(&mut self, event: &[(NodeId, usize)]) -> Result<f64> {
        let terminals = event
            .iter()
            .map(|&(node, _)| {
                self.node(node)?
                    .cliques
                    .first()
                    .copied()
                    .ok_or_else(|| Error::internal(format!("{} belongs to no clique", node)))
            })
            .collect::<Result<Vec<_>>>()?;
        let nodes: Vec<NodeId> = event.iter().map(|&(node, _)| node).collect();
        let (cliques, edges) = self.steiner_subtree(&terminals, &nodes)?;
        debug!("infer: joint over {} cliques for {} nodes", cliques.len(), event.len());

        let mut tables = Vec::with_capacity(cliques.len());
        for &clique in &cliques {
            let posterior = self.cliques[clique.index()].posterior;
            let values = self.evaluate(posterior)?.to_vec();
            tables.push((posterior, values));
        }
        let views: Vec<Factor<'_>> = tables
            .iter()
            .map(|(id, values)| {
                let f = &self.formulas[*id];
                Factor::new(f.domain(), f.levels(), values)
            })
            .collect();
        let (domain, levels) = union_domain(&views);
        let mut joint = multiply(&domain, &levels, &views);
        drop(views);

        for separator in edges {
            let Some(potential) = self.separators[separator.index()].potential else {
                continue;
            };
            let values = self.evaluate(potential)?.to_vec();
            let f = &self.formulas[potential];
            joint = divide(
                Factor::new(&domain, &levels, &joint),
                Factor::new(f.domain(), f.levels(), &values),
            );
        }
        Ok(event_probability(event, &domain, &levels, &joint))
    }

    /// Cliques and separators of the minimal subtree spanning `terminals`
    /// that still covers every node of `nodes`.
    fn steiner_subtree(
        &self,
        terminals: &[CliqueId],
        nodes: &[NodeId],
    ) -> Result<(Vec<CliqueId>, Vec<SeparatorId>)> {
        let root = terminals
            .first()
            .copied()
            .ok_or_else(|| Error::internal("empty subtree requested"))?;
        let mut parent: Vec<Option<(CliqueId, SeparatorId)>> = vec![None; self.cliques.len()];
        let mut seen = vec![false; self.cliques.len()];
        seen[root.index()] = true;
        let mut queue = vec![root];
        let mut head = 0;
        while head < queue.len() {
            let current = &self.cliques[queue[head].index()];
            head += 1;
            for (&neighbor, &separator) in current.neighbors.iter().zip(&current.separators) {
                if !seen[neighbor.index()] {
                    seen[neighbor.index()] = true;
                    parent[neighbor.index()] = Some((current.id, separator));
                    queue.push(neighbor);
                }
            }
        }

        let mut in_tree = vec![false; self.cliques.len()];
        in_tree[root.index()] = true;
        let mut cliques = vec![root];
        let mut edges = Vec::new();
        for &terminal in terminals {
            if !seen[terminal.index()] {
                return Err(Error::internal(format!("{} is not connected to {}", terminal, root)));
            }
            let mut current = terminal;
            while !in_tree[current.index()] {
                in_tree[current.index()] = true;
                cliques.push(current);
                let (up, separator) = parent[current.index()]
                    .ok_or_else(|| Error::internal(format!("{} has no path to {}", current, root)))?;
                edges.push(separator);
                current = up;
            }
        }

        // Drop leaves whose nodes are covered by the rest of the subtree.
        while cliques.len() > 1 {
            let removable = cliques.iter().enumerate().find_map(|(k, &leaf)| {
                let incident: Vec<usize> = edges
                    .iter()
                    .enumerate()
                    .filter(|(_, s)| {
                        let (a, b) = self.separators[s.index()].cliques;
                        a == leaf || b == leaf
                    })
                    .map(|(i, _)| i)
                    .collect();
                let covered = nodes.iter().all(|&v| {
                    !self.cliques[leaf.index()].contains(v)
                        || cliques
                            .iter()
                            .any(|&c| c != leaf && self.cliques[c.index()].contains(v))
                });
                (incident.len() == 1 && covered).then(|| (k, incident[0]))
            });
            let Some((k, edge)) = removable else {
                break;
            };
            cliques.remove(k);
            edges.remove(edge);
        }
        cliques.sort_unstable();
        edges.sort_unstable();
        Ok((cliques, edges))
    }
}

/// Normalized probability mass of `event` in a potential whose domain covers
/// the event's nodes.
fn event_probability(event: &[(NodeId, usize)], domain: &[NodeId], levels: &[usize], values: &[f64]) -> f64 {
    let mut event = event.to_vec();
    event.sort_unstable();
    let keep: Vec<NodeId> = event.iter().map(|&(node, _)| node).collect();
    let keep_levels: Vec<usize> = keep
        .iter()
        .map(|node| domain.binary_search(node).map_or(1, |k| levels[k]))
        .collect();
    let combination: Vec<usize> = event.iter().map(|&(_, level)| level).collect();

    let mut marginal = marginalize(&keep, &keep_levels, Factor::new(domain, levels, values));
    if normalize(&mut marginal) == 0.0 {
        warn!("event over {:?} has zero mass: evidence is impossible", keep);
    }
    marginal[combination_to_index(&combination, &keep_levels)]
}

impl InferenceEngine for LazyPropagationEngine {
    fn has_variable(&self, name: &str) -> bool {
        self.network.node_id(name).is_some()
    }

    fn variables(&self) -> Vec<&str> {
        self.nodes.iter().map(|n| n.name.as_str()).collect()
    }

    fn parents(&self, name: &str) -> Result<Vec<&str>> {
        let node = self.node_by_name(name)?;
        Ok(node
            .parents
            .iter()
            .map(|p| self.nodes[p.index()].name.as_str())
            .collect())
    }

    fn has_parent(&self, name: &str, parent: &str) -> Result<bool> {
        let node = self.node_by_name(name)?;
        Ok(self.network.node_id(parent).is_some_and(|p| node.has_parent(p)))
    }

    fn levels(&self, name: &str) -> Result<&[String]> {
        Ok(&self.node_by_name(name)?.states)
    }

    fn has_level(&self, name: &str, level: &str) -> Result<bool> {
        Ok(self.node_by_name(name)?.level(level).is_some())
    }

    fn distribution(&self, name: &str) -> Result<Cpt> {
        let node = self.node_by_name(name)?;
        let values = self
            .cache
            .peek(node.potential)
            .ok_or_else(|| Error::internal(format!("CPT slot of '{}' is empty", name)))?;
        let family = self.network.family(name)?;
        Ok(potential_to_cpt(&family, values))
    }

    fn set_distribution(&mut self, name: &str, cpt: Cpt) -> Result<()> {
        let node = self.node_by_name(name)?;
        let potential = node.potential;
        let values = cpt_to_potential(&self.network.family(name)?, &cpt)?;

        self.cache.replace(potential, values);
        let emptied = self.cache.invalidate_dependents(&self.formulas, potential);
        debug!("distribution of '{}' replaced, {} slots invalidated", name, emptied);

        if let Some(mut spec) = self.network.get(name).cloned() {
            spec.cpt = cpt;
            self.network.insert(name, spec);
        }
        Ok(())
    }

    fn has_evidence_for(&self, name: &str) -> Result<bool> {
        Ok(self.evidence_level(self.node_by_name(name)?).is_some())
    }

    fn evidence_for(&self, name: &str) -> Result<Option<&str>> {
        let node = self.node_by_name(name)?;
        Ok(self.evidence_level(node).map(|level| node.states[level].as_str()))
    }

    fn evidence(&self) -> Evidence {
        self.nodes
            .iter()
            .filter_map(|node| {
                self.evidence_level(node)
                    .map(|level| (node.name.clone(), node.states[level].clone()))
            })
            .collect()
    }

    fn set_evidence(&mut self, evidence: &Evidence) -> Result<()> {
        self.update_evidence(evidence)
    }

    fn update_evidence(&mut self, evidence: &Evidence) -> Result<()> {
        let resolved = self.resolve(evidence)?;
        for (node, level) in resolved {
            self.apply_evidence(node, Some(level))?;
        }
        Ok(())
    }

    fn remove_evidence(&mut self, name: &str) -> Result<()> {
        let node = self.node_id(name)?;
        self.apply_evidence(node, None)
    }

    fn remove_all_evidence(&mut self) -> Result<()> {
        let observed: Vec<NodeId> = self
            .nodes
            .iter()
            .filter(|node| self.evidence_level(node).is_some())
            .map(|node| node.id)
            .collect();
        for node in observed {
            self.apply_evidence(node, None)?;
        }
        Ok(())
    }

    fn infer(&mut self, event: &Event) -> Result<f64> {
        let event = self.resolve(event)?;
        if event.is_empty() {
            return Ok(1.0);
        }

        // Components of the junction tree are independent.
        let mut groups: IndexMap<ComponentId, Vec<(NodeId, usize)>> = IndexMap::new();
        for &(node, level) in &event {
            groups.entry(self.component_of(node)?).or_default().push((node, level));
        }
        let mut probability = 1.0;
        for group in groups.values() {
            probability *= self.infer_connected(group)?;
        }
        Ok(probability)
    }

    fn infer_all(&mut self, options: &InferAllOptions) -> Result<NetworkResult> {
        let ids = match &options.only_variables {
            Some(names) => names.iter().map(|name| self.node_id(name)).collect::<Result<Vec<_>>>()?,
            None => self.nodes.iter().map(|n| n.id).collect(),
        };

        let mut result = NetworkResult::new();
        for id in ids {
            let node = &self.nodes[id.index()];
            if options.only_evidence && self.evidence_level(node).is_none() {
                continue;
            }
            let marginal = self.marginal(id)?;
            let node = &self.nodes[id.index()];
            let row = node.states.iter().cloned().zip(marginal).collect();
            result.insert(node.name.clone(), row);
        }
        Ok(result)
    }
}
