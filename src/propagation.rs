//! Symbolic message passing over the junction tree.
//!
//! Messages are built as formulas, not numbers. The message from clique `s` to
//! its neighbor `t` is
//!
//! ```text
//! Σ_{dom(s) \ sep(s,t)} ( ref(prior(s)) · Π messages into s except from t · Π ε(v), v ∈ dom(s) )
//! ```
//!
//! Each component of the tree is handled with one collect pass (leaves to the
//! root) followed by one distribute pass (root to leaves), so every message is
//! built after all of its prerequisites. The passes run once, at engine
//! construction; evidence and queries later only touch the potential cache.

use indexmap::IndexMap;
use log::debug;

use crate::arena::Formulas;
use crate::clique::{Clique, Separator};
use crate::error::{Error, Result};
use crate::formula::Formula;
use crate::types::CliqueId;

/// Directed-edge name → formulas of the message sent along that edge.
pub type Messages = IndexMap<String, Vec<Formula>>;

/// Canonical name of the directed edge `source -> target`.
pub fn message_name(source: CliqueId, target: CliqueId) -> String {
    format!("{}->{}", source, target)
}

/// Build every message of the junction tree.
///
/// `cliques` must have `domain`, `neighbors`, `separators`, `prior` and
/// `evidence` filled in; `messages` and `posterior` are not read.
pub fn propagate(formulas: &mut Formulas, cliques: &[Clique], separators: &[Separator]) -> Result<Messages> {
    let mut messages = Messages::new();
    let mut visited = vec![false; cliques.len()];

    for root in 0..cliques.len() {
        if visited[root] {
            continue;
        }
        let (order, parent) = spanning_tree(cliques, CliqueId::from(root), &mut visited);
        debug!("propagate: component rooted at c{} has {} cliques", root, order.len());

        // Collect: each clique sends to its parent once all its children have.
        for &clique in order.iter().rev() {
            if let Some(target) = parent[clique.index()] {
                send(formulas, cliques, separators, clique, target, &mut messages)?;
            }
        }
        // Distribute: each clique sends to its children once its parent has.
        for &clique in &order {
            for &target in &cliques[clique.index()].neighbors {
                if parent[target.index()] == Some(clique) {
                    send(formulas, cliques, separators, clique, target, &mut messages)?;
                }
            }
        }
    }

    Ok(messages)
}

/// Breadth-first order of the component containing `root`, with the parent of
/// every clique in the traversal.
fn spanning_tree(cliques: &[Clique], root: CliqueId, visited: &mut [bool]) -> (Vec<CliqueId>, Vec<Option<CliqueId>>) {
    let mut parent = vec![None; cliques.len()];
    let mut order = vec![root];
    visited[root.index()] = true;
    let mut head = 0;
    while head < order.len() {
        let current = order[head];
        head += 1;
        for &neighbor in &cliques[current.index()].neighbors {
            if !visited[neighbor.index()] {
                visited[neighbor.index()] = true;
                parent[neighbor.index()] = Some(current);
                order.push(neighbor);
            }
        }
    }
    (order, parent)
}

fn send(
    formulas: &mut Formulas,
    cliques: &[Clique],
    separators: &[Separator],
    source: CliqueId,
    target: CliqueId,
    messages: &mut Messages,
) -> Result<()> {
    let clique = &cliques[source.index()];
    let k = clique
        .neighbors
        .iter()
        .position(|&n| n == target)
        .ok_or_else(|| Error::internal(format!("{} is not a neighbor of {}", target, source)))?;
    let separator = &separators[clique.separators[k].index()];

    let mut factors = Vec::new();
    if let Some(prior) = clique.prior {
        factors.push(formulas.reference(prior)?);
    }
    for &neighbor in clique.neighbors.iter().filter(|&&n| n != target) {
        let name = message_name(neighbor, source);
        let incoming = messages
            .get(&name)
            .ok_or_else(|| Error::internal(format!("message {} is needed before it exists", name)))?;
        factors.extend(incoming.iter().cloned());
    }
    for &evidence in &clique.evidence {
        factors.push(formulas.get(evidence)?.clone());
    }

    let product = formulas.mult(factors)?;
    let product = formulas.upsert(product)?;
    let message = formulas.marginalize(&separator.shared, &product)?;
    let message = formulas.upsert(message)?;

    let name = message_name(source, target);
    debug!("propagate: {} = {}", name, message.name());
    messages.insert(name, vec![message]);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use test_log::test;

    use crate::types::{ComponentId, FormulaId, NodeId, SeparatorId};

    fn v(i: u32) -> NodeId {
        NodeId::new(i)
    }

    /// Three cliques in a path over binary variables: {0,1} - {1,2} - {2,3}.
    fn path() -> (Formulas, Vec<Clique>, Vec<Separator>) {
        let mut formulas = Formulas::new();
        let domains = [vec![v(0), v(1)], vec![v(1), v(2)], vec![v(2), v(3)]];
        let mut potentials = Vec::new();
        for (i, domain) in domains.iter().enumerate() {
            let f = formulas
                .upsert(Formula::node_potential(v(i as u32 + 1), domain.clone(), vec![2, 2]))
                .unwrap();
            potentials.push(f.require_id().unwrap());
        }
        let evidence: Vec<FormulaId> = (0..4)
            .map(|i| {
                formulas
                    .upsert(Formula::evidence_function(v(i), 2))
                    .unwrap()
                    .require_id()
                    .unwrap()
            })
            .collect();

        let separators = vec![
            Separator {
                id: SeparatorId::new(0),
                cliques: (CliqueId::new(0), CliqueId::new(1)),
                shared: vec![v(1)],
                potential: None,
            },
            Separator {
                id: SeparatorId::new(1),
                cliques: (CliqueId::new(1), CliqueId::new(2)),
                shared: vec![v(2)],
                potential: None,
            },
        ];
        let neighbors = [vec![1], vec![0, 2], vec![1]];
        let seps = [vec![0], vec![0, 1], vec![1]];
        let cliques = (0..3)
            .map(|i| Clique {
                id: CliqueId::from(i),
                name: format!("C{}", i),
                factors: vec![],
                domain: domains[i].clone(),
                levels: vec![2, 2],
                neighbors: neighbors[i].iter().map(|&n: &usize| CliqueId::from(n)).collect(),
                separators: seps[i].iter().map(|&s: &usize| SeparatorId::from(s)).collect(),
                messages: vec![],
                prior: Some(potentials[i]),
                posterior: FormulaId::new(0),
                evidence: domains[i].iter().map(|d| evidence[d.index()]).collect(),
                component: ComponentId::new(0),
            })
            .collect();
        (formulas, cliques, separators)
    }

    #[test]
    fn test_message_name() {
        assert_eq!(message_name(CliqueId::new(2), CliqueId::new(0)), "c2->c0");
    }

    #[test]
    fn test_two_messages_per_edge() {
        let (mut formulas, cliques, separators) = path();
        let messages = propagate(&mut formulas, &cliques, &separators).unwrap();
        // Collect order first, then distribute.
        assert_eq!(
            messages.keys().collect::<Vec<_>>(),
            vec!["c2->c1", "c1->c0", "c0->c1", "c1->c2"]
        );
        for (name, formulas) in &messages {
            assert_eq!(formulas.len(), 1, "{}", name);
        }
        assert_eq!(messages["c1->c0"][0].domain(), &[v(1)]);
        assert_eq!(messages["c1->c2"][0].domain(), &[v(2)]);
    }

    #[test]
    fn test_message_uses_other_neighbors_only() {
        let (mut formulas, cliques, separators) = path();
        let messages = propagate(&mut formulas, &cliques, &separators).unwrap();
        let to_leaf = &messages["c1->c2"][0];
        let incoming = messages["c0->c1"][0].require_id().unwrap();
        let back = messages["c2->c1"][0].require_id().unwrap();

        let product = match to_leaf.kind() {
            crate::formula::FormulaKind::Marginal { potential, .. } => *potential,
            other => panic!("expected a marginal, got {:?}", other),
        };
        let factors = formulas[product].dependencies();
        assert!(factors.contains(&incoming));
        assert!(!factors.contains(&back));
    }

    #[test]
    fn test_rebuild_is_deterministic() {
        let (mut first, cliques, separators) = path();
        propagate(&mut first, &cliques, &separators).unwrap();
        let (mut second, cliques, separators) = path();
        propagate(&mut second, &cliques, &separators).unwrap();
        assert_eq!(first.len(), second.len());
        assert!(first.iter().zip(second.iter()).all(|(a, b)| a.name() == b.name()));
    }

    #[test]
    fn test_cycle_is_rejected() {
        let (mut formulas, mut cliques, mut separators) = path();
        // Close the path into a triangle.
        separators.push(Separator {
            id: SeparatorId::new(2),
            cliques: (CliqueId::new(0), CliqueId::new(2)),
            shared: vec![],
            potential: None,
        });
        cliques[0].neighbors.push(CliqueId::new(2));
        cliques[0].separators.push(SeparatorId::new(2));
        cliques[2].neighbors.push(CliqueId::new(0));
        cliques[2].separators.push(SeparatorId::new(2));

        let err = propagate(&mut formulas, &cliques, &separators).unwrap_err();
        assert!(matches!(err, Error::InternalConsistency(_)));
    }
}
