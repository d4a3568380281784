//! Potential assembly: from a validated network and junction tree to node and
//! clique records plus the complete formula arena.
//!
//! Everything here is evidence-independent and runs once per engine. The steps
//! run in a fixed order so that assembling the same inputs twice produces
//! arenas with the same names in the same slots:
//!
//! 1. node potentials, then children links;
//! 2. evidence functions;
//! 3. clique records with their priors, then node-to-clique links;
//! 4. symbolic messages;
//! 5. clique posteriors;
//! 6. separator potentials;
//! 7. node posterior marginals;
//! 8. reverse dependencies, and the eager CPT vectors.

use std::collections::HashSet;

use log::debug;

use crate::arena::Formulas;
use crate::clique::{Clique, Separator};
use crate::error::{Error, Result};
use crate::formula::Formula;
use crate::network::Network;
use crate::node::Node;
use crate::potential::cpt_to_potential;
use crate::propagation::{message_name, propagate, Messages};
use crate::topology::JunctionTree;
use crate::types::{CliqueId, ComponentId, FormulaId, NodeId, SeparatorId};

/// The evidence-independent part of an engine.
#[derive(Debug, Clone)]
pub struct Assembly {
    pub nodes: Vec<Node>,
    pub cliques: Vec<Clique>,
    pub separators: Vec<Separator>,
    pub formulas: Formulas,
    pub messages: Messages,
    /// Flattened CPT of every node, parallel to `nodes`.
    pub priors: Vec<Vec<f64>>,
}

/// Assemble the engine structure.
///
/// The network and the tree are expected to have passed validation; what is
/// checked here are the preconditions whose violation means the topology
/// provider is broken, reported as [`Error::InternalConsistency`].
pub fn assemble(network: &Network, tree: &JunctionTree) -> Result<Assembly> {
    let mut formulas = Formulas::new();

    // Node potentials.
    let mut potentials = Vec::with_capacity(network.len());
    let mut priors = Vec::with_capacity(network.len());
    let mut parents = Vec::with_capacity(network.len());
    for (i, (name, spec)) in network.iter().enumerate() {
        let family = network.family(name)?;
        let (domain, levels) = family.domain();
        let potential = formulas.upsert(Formula::node_potential(NodeId::from(i), domain, levels))?;
        potentials.push(potential.require_id()?);
        priors.push(cpt_to_potential(&family, &spec.cpt)?);
        parents.push(family.parents.iter().map(|&(id, _, _)| id).collect::<Vec<_>>());
    }

    // Children.
    let mut children = vec![Vec::new(); network.len()];
    for (child, parents) in parents.iter().enumerate() {
        for parent in parents {
            children[parent.index()].push(NodeId::from(child));
        }
    }

    // Evidence functions.
    let mut evidence = Vec::with_capacity(network.len());
    for (i, (_, spec)) in network.iter().enumerate() {
        let function = formulas.upsert(Formula::evidence_function(NodeId::from(i), spec.states.len()))?;
        evidence.push(function.require_id()?);
    }

    let separators = separators(network, tree)?;
    let mut cliques = cliques(network, tree, &separators, &potentials, &evidence, &mut formulas)?;

    let mut node_cliques = vec![Vec::new(); network.len()];
    for clique in &cliques {
        for &node in &clique.domain {
            node_cliques[node.index()].push(clique.id);
        }
    }

    let messages = propagate(&mut formulas, &cliques, &separators)?;

    // Clique posteriors.
    for clique in cliques.iter_mut() {
        let mut received = Vec::with_capacity(clique.neighbors.len());
        let mut factors = Vec::new();
        if let Some(prior) = clique.prior {
            factors.push(formulas.reference(prior)?);
        }
        for &neighbor in &clique.neighbors {
            let name = message_name(neighbor, clique.id);
            let message = messages
                .get(&name)
                .ok_or_else(|| Error::internal(format!("message {} was never built", name)))?;
            let message: Vec<&Formula> = message.iter().filter(|f| !f.is_unit()).collect();
            received.push(message.iter().map(|f| f.require_id()).collect::<Result<Vec<_>>>()?);
            factors.extend(message.into_iter().cloned());
        }
        for &function in &clique.evidence {
            factors.push(formulas.get(function)?.clone());
        }
        let posterior = formulas.mult(factors)?;
        let posterior = formulas.upsert(posterior)?;
        clique.messages = received;
        clique.posterior = posterior.require_id()?;
        debug!("assemble: posterior of {} is {}", clique.id, posterior.name());
    }

    // Separator potentials, from the smaller adjacent posterior.
    let mut separators = separators;
    for separator in separators.iter_mut() {
        let (a, b) = separator.cliques;
        let (a, b) = (&cliques[a.index()], &cliques[b.index()]);
        let smaller = if formulas.get(b.posterior)?.size() < formulas.get(a.posterior)?.size() {
            b.posterior
        } else {
            a.posterior
        };
        let posterior = formulas.get(smaller)?.clone();
        let potential = formulas.marginalize(&separator.shared, &posterior)?;
        separator.potential = formulas.upsert(potential)?.id();
    }

    // Node posteriors, from the smallest formula that contains the node.
    let mut posteriors = Vec::with_capacity(network.len());
    for (i, containing) in node_cliques.iter().enumerate() {
        let node = NodeId::from(i);
        let mut best: Option<&Formula> = None;
        for clique in containing {
            let candidate = formulas.get(cliques[clique.index()].posterior)?;
            if best.map_or(true, |b| candidate.size() < b.size()) {
                best = Some(candidate);
            }
        }
        for separator in separators.iter().filter(|s| s.shared.binary_search(&node).is_ok()) {
            if let Some(potential) = separator.potential {
                let candidate = formulas.get(potential)?;
                if best.map_or(true, |b| candidate.size() < b.size()) {
                    best = Some(candidate);
                }
            }
        }
        let best = best
            .cloned()
            .ok_or_else(|| Error::internal(format!("{} belongs to no clique", node)))?;
        let marginal = formulas.marginalize(&[node], &best)?;
        posteriors.push(formulas.upsert(marginal)?.require_id()?);
    }

    formulas.update_references();
    debug!(
        "assemble: {} nodes, {} cliques, {} separators, {} formulas, {} messages",
        network.len(),
        cliques.len(),
        separators.len(),
        formulas.len(),
        messages.len()
    );

    let nodes = network
        .iter()
        .enumerate()
        .map(|(i, (name, spec))| Node {
            id: NodeId::from(i),
            name: name.to_string(),
            states: spec.states.clone(),
            parents: parents[i].clone(),
            children: children[i].clone(),
            potential: potentials[i],
            evidence_function: evidence[i],
            posterior: posteriors[i],
            cliques: node_cliques[i].clone(),
        })
        .collect();

    Ok(Assembly {
        nodes,
        cliques,
        separators,
        formulas,
        messages,
        priors,
    })
}

/// Separator records, after checking that every separator joins two distinct
/// existing cliques and that no edge is listed twice.
fn separators(network: &Network, tree: &JunctionTree) -> Result<Vec<Separator>> {
    let mut edges = HashSet::new();
    let mut separators = Vec::with_capacity(tree.separators.len());
    for (i, spec) in tree.separators.iter().enumerate() {
        let (a, b) = spec.cliques;
        if a == b || a >= tree.cliques.len() || b >= tree.cliques.len() {
            return Err(Error::internal(format!(
                "separator {} does not join two distinct cliques: ({}, {})",
                i, a, b
            )));
        }
        if !edges.insert((a.min(b), a.max(b))) {
            return Err(Error::internal(format!(
                "separator {} repeats the edge between cliques {} and {}",
                i, a, b
            )));
        }
        let mut shared = node_ids(network, &spec.shared)?;
        shared.sort_unstable();
        shared.dedup();
        separators.push(Separator {
            id: SeparatorId::from(i),
            cliques: (CliqueId::from(a), CliqueId::from(b)),
            shared,
            potential: None,
        });
    }
    Ok(separators)
}

/// Clique records with priors; messages and posteriors are filled in later.
fn cliques(
    network: &Network,
    tree: &JunctionTree,
    separators: &[Separator],
    potentials: &[FormulaId],
    evidence: &[FormulaId],
    formulas: &mut Formulas,
) -> Result<Vec<Clique>> {
    let mut component_of = vec![ComponentId::new(0); tree.cliques.len()];
    for (k, component) in tree.components().iter().enumerate() {
        for &c in component {
            component_of[c] = ComponentId::from(k);
        }
    }

    let cardinality: Vec<usize> = network.iter().map(|(_, spec)| spec.states.len()).collect();
    let mut cliques = Vec::with_capacity(tree.cliques.len());
    for (c, spec) in tree.cliques.iter().enumerate() {
        let id = CliqueId::from(c);
        let mut domain = node_ids(network, &spec.members)?;
        domain.sort_unstable();
        domain.dedup();
        let levels = domain.iter().map(|v| cardinality[v.index()]).collect();

        let factors: Vec<NodeId> = network
            .names()
            .enumerate()
            .filter(|(_, name)| tree.factors.get(*name) == Some(&c))
            .map(|(i, _)| NodeId::from(i))
            .collect();
        let references = factors
            .iter()
            .map(|v| formulas.reference(potentials[v.index()]))
            .collect::<Result<Vec<_>>>()?;
        let prior = formulas.mult(references)?;
        let prior = formulas.upsert(prior)?.id();

        let (neighbors, separator_ids): (Vec<CliqueId>, Vec<SeparatorId>) = separators
            .iter()
            .filter(|s| s.cliques.0 == id || s.cliques.1 == id)
            .map(|s| (s.other(id), s.id))
            .unzip();

        cliques.push(Clique {
            id,
            name: spec.name.clone(),
            factors,
            evidence: domain.iter().map(|v| evidence[v.index()]).collect(),
            domain,
            levels,
            neighbors,
            separators: separator_ids,
            messages: Vec::new(),
            prior,
            posterior: FormulaId::new(0),
            component: component_of[c],
        });
    }
    Ok(cliques)
}

fn node_ids(network: &Network, names: &[String]) -> Result<Vec<NodeId>> {
    names
        .iter()
        .map(|name| network.node_id(name).ok_or_else(|| Error::NotFound(name.clone())))
        .collect()
}
