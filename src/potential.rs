//! Flat numeric potentials over mixed-radix domains.
//!
//! A potential over the sorted domain `[v0, v1, ..., vk]` with cardinalities
//! `[n0, n1, ..., nk]` is stored as a flat `Vec<f64>` of length
//! `n0 * n1 * ... * nk`, in row-major order: the *last* domain variable varies
//! fastest. [`combination_to_index`] and [`index_to_combination`] convert
//! between the two views.
//!
//! The kernels in this module ([`multiply`], [`marginalize`], [`divide`]) never
//! decode indices cell by cell. Instead they walk the output domain with a
//! cursor that keeps one running offset per input table, so each step costs
//! O(number of tables) amortized.

use std::collections::HashMap;

use indexmap::IndexMap;

use crate::error::{Error, Result};
use crate::network::{Cpt, CptRow};
use crate::types::NodeId;

/// Tolerance for CPT rows summing to one.
pub const PROBABILITY_TOLERANCE: f64 = 1e-6;

/// Number of cells of a potential with the given cardinalities.
pub fn size_of(levels: &[usize]) -> usize {
    levels.iter().product()
}

/// Row-major strides for the given cardinalities.
///
/// ```
/// use lazyprop_rs::potential::strides;
///
/// assert_eq!(strides(&[2, 3, 4]), vec![12, 4, 1]);
/// ```
pub fn strides(levels: &[usize]) -> Vec<usize> {
    let mut strides = vec![1; levels.len()];
    for i in (0..levels.len().saturating_sub(1)).rev() {
        strides[i] = strides[i + 1] * levels[i + 1];
    }
    strides
}

/// Encode a combination of level indices into a flat index.
///
/// ```
/// use lazyprop_rs::potential::{combination_to_index, index_to_combination};
///
/// let levels = [2, 3];
/// assert_eq!(combination_to_index(&[1, 2], &levels), 5);
/// assert_eq!(index_to_combination(5, &levels), vec![1, 2]);
/// ```
pub fn combination_to_index(combination: &[usize], levels: &[usize]) -> usize {
    debug_assert_eq!(combination.len(), levels.len());
    combination
        .iter()
        .zip(levels)
        .fold(0, |acc, (&c, &n)| acc * n + c)
}

/// Decode a flat index into a combination of level indices.
pub fn index_to_combination(index: usize, levels: &[usize]) -> Vec<usize> {
    let mut combination = vec![0; levels.len()];
    let mut rest = index;
    for i in (0..levels.len()).rev() {
        combination[i] = rest % levels[i];
        rest /= levels[i];
    }
    combination
}

/// Uniform indicator (no level) or one-hot indicator at `level`.
pub fn indicator(size: usize, level: Option<usize>) -> Vec<f64> {
    match level {
        None => vec![1.0; size],
        Some(level) => {
            let mut values = vec![0.0; size];
            values[level] = 1.0;
            values
        }
    }
}

/// Scale `values` so that they sum to one, returning the original total.
///
/// A zero total leaves the values untouched.
pub fn normalize(values: &mut [f64]) -> f64 {
    let total: f64 = values.iter().sum();
    if total > 0.0 {
        for value in values.iter_mut() {
            *value /= total;
        }
    }
    total
}

/// A borrowed view of a potential: sorted domain, cardinalities and cells.
#[derive(Debug, Copy, Clone)]
pub struct Factor<'a> {
    pub domain: &'a [NodeId],
    pub levels: &'a [usize],
    pub values: &'a [f64],
}

impl<'a> Factor<'a> {
    pub fn new(domain: &'a [NodeId], levels: &'a [usize], values: &'a [f64]) -> Self {
        debug_assert_eq!(domain.len(), levels.len());
        debug_assert_eq!(size_of(levels), values.len());
        Self {
            domain,
            levels,
            values,
        }
    }
}

/// Sorted union of the factor domains, with cardinalities taken from
/// whichever factor contains each variable.
pub fn union_domain(factors: &[Factor<'_>]) -> (Vec<NodeId>, Vec<usize>) {
    let mut cardinality = HashMap::new();
    for factor in factors {
        for (&v, &n) in factor.domain.iter().zip(factor.levels) {
            cardinality.entry(v).or_insert(n);
        }
    }
    let mut domain: Vec<NodeId> = cardinality.keys().copied().collect();
    domain.sort_unstable();
    let levels = domain.iter().map(|v| cardinality[v]).collect();
    (domain, levels)
}

/// Strides of `domain` expressed over the positions of `outer`.
///
/// Variables of `outer` absent from `domain` get stride 0, so moving along
/// them does not move inside the projected table.
fn projected_strides(outer: &[NodeId], domain: &[NodeId], levels: &[usize]) -> Vec<usize> {
    let own = strides(levels);
    outer
        .iter()
        .map(|v| domain.binary_search(v).map_or(0, |k| own[k]))
        .collect()
}

/// Row-major walk over a domain, tracking the offset of the current
/// combination inside each projected table.
struct Cursor<'a> {
    levels: &'a [usize],
    combination: Vec<usize>,
    strides: Vec<Vec<usize>>,
    offsets: Vec<usize>,
}

impl<'a> Cursor<'a> {
    fn new(domain: &[NodeId], levels: &'a [usize], projections: &[(&[NodeId], &[usize])]) -> Self {
        let strides: Vec<Vec<usize>> = projections
            .iter()
            .map(|(d, l)| {
                debug_assert!(d.iter().all(|v| domain.binary_search(v).is_ok()));
                projected_strides(domain, d, l)
            })
            .collect();
        Self {
            levels,
            combination: vec![0; levels.len()],
            offsets: vec![0; strides.len()],
            strides,
        }
    }

    fn offset(&self, k: usize) -> usize {
        self.offsets[k]
    }

    fn advance(&mut self) {
        for pos in (0..self.levels.len()).rev() {
            self.combination[pos] += 1;
            for (offset, strides) in self.offsets.iter_mut().zip(&self.strides) {
                *offset += strides[pos];
            }
            if self.combination[pos] < self.levels[pos] {
                return;
            }
            for (offset, strides) in self.offsets.iter_mut().zip(&self.strides) {
                *offset -= strides[pos] * self.levels[pos];
            }
            self.combination[pos] = 0;
        }
    }
}

/// Pointwise product of `factors`, broadcast over `domain`.
///
/// Every factor variable must belong to `domain`.
pub fn multiply(domain: &[NodeId], levels: &[usize], factors: &[Factor<'_>]) -> Vec<f64> {
    let projections: Vec<_> = factors.iter().map(|f| (f.domain, f.levels)).collect();
    let mut cursor = Cursor::new(domain, levels, &projections);
    let mut values = vec![0.0; size_of(levels)];
    for cell in values.iter_mut() {
        *cell = factors
            .iter()
            .enumerate()
            .map(|(k, f)| f.values[cursor.offset(k)])
            .product();
        cursor.advance();
    }
    values
}

/// Sum `inner` over every variable not in `keep`.
///
/// `keep` must be a (sorted) subset of the inner domain.
pub fn marginalize(keep: &[NodeId], keep_levels: &[usize], inner: Factor<'_>) -> Vec<f64> {
    let mut cursor = Cursor::new(inner.domain, inner.levels, &[(keep, keep_levels)]);
    let mut values = vec![0.0; size_of(keep_levels)];
    for &value in inner.values {
        values[cursor.offset(0)] += value;
        cursor.advance();
    }
    values
}

/// Pointwise `numerator / denominator` over the numerator's domain, with
/// `x / 0 = 0`.
///
/// The denominator domain must be a subset of the numerator domain.
pub fn divide(numerator: Factor<'_>, denominator: Factor<'_>) -> Vec<f64> {
    let mut cursor = Cursor::new(
        numerator.domain,
        numerator.levels,
        &[(denominator.domain, denominator.levels)],
    );
    let mut values = Vec::with_capacity(numerator.values.len());
    for &value in numerator.values {
        let d = denominator.values[cursor.offset(0)];
        values.push(if d == 0.0 { 0.0 } else { value / d });
        cursor.advance();
    }
    values
}

/// The variables a CPT ranges over: a node and its parents, with state labels.
#[derive(Debug, Clone)]
pub struct Family<'a> {
    pub node: (NodeId, &'a str, &'a [String]),
    pub parents: Vec<(NodeId, &'a str, &'a [String])>,
}

impl Family<'_> {
    /// Sorted family domain and its cardinalities.
    pub fn domain(&self) -> (Vec<NodeId>, Vec<usize>) {
        let mut members: Vec<(NodeId, usize)> = std::iter::once(&self.node)
            .chain(&self.parents)
            .map(|&(id, _, states)| (id, states.len()))
            .collect();
        members.sort_unstable_by_key(|&(id, _)| id);
        members.into_iter().unzip()
    }

    fn name(&self) -> &str {
        self.node.1
    }

    fn parent_levels(&self) -> Vec<usize> {
        self.parents.iter().map(|(_, _, s)| s.len()).collect()
    }

    /// Probabilities of one table row, in state order.
    fn row(&self, then: &IndexMap<String, f64>) -> Result<Vec<f64>> {
        let states = self.node.2;
        if let Some(extra) = then.keys().find(|k| !states.contains(*k)) {
            return Err(Error::distribution(self.name(), format!("unknown state '{}'", extra)));
        }
        let row = states
            .iter()
            .map(|s| {
                let p = *then
                    .get(s)
                    .ok_or_else(|| Error::distribution(self.name(), format!("missing probability for state '{}'", s)))?;
                if !p.is_finite() || !(0.0..=1.0).contains(&p) {
                    return Err(Error::distribution(self.name(), format!("probability {} of state '{}' is outside [0, 1]", p, s)));
                }
                Ok(p)
            })
            .collect::<Result<Vec<_>>>()?;
        let total: f64 = row.iter().sum();
        if (total - 1.0).abs() > PROBABILITY_TOLERANCE {
            return Err(Error::distribution(self.name(), format!("row sums to {}", total)));
        }
        Ok(row)
    }

    /// Parent level indices selected by a conditional row.
    fn row_key(&self, row: &CptRow) -> Result<Vec<usize>> {
        if let Some(extra) = row.when.keys().find(|k| !self.parents.iter().any(|(_, name, _)| *name == k.as_str())) {
            return Err(Error::distribution(self.name(), format!("'{}' is not a parent", extra)));
        }
        self.parents
            .iter()
            .map(|&(_, name, states)| {
                let state = row
                    .when
                    .get(name)
                    .ok_or_else(|| Error::distribution(self.name(), format!("row does not fix parent '{}'", name)))?;
                states
                    .iter()
                    .position(|s| s == state)
                    .ok_or_else(|| Error::distribution(self.name(), format!("parent '{}' has no state '{}'", name, state)))
            })
            .collect()
    }
}

/// Flatten a CPT into a potential over the sorted family domain.
///
/// The table is validated completely: every parent combination must have
/// exactly one row and every row must be a probability distribution.
pub fn cpt_to_potential(family: &Family<'_>, cpt: &Cpt) -> Result<Vec<f64>> {
    let parent_levels = family.parent_levels();
    let mut rows: HashMap<Vec<usize>, Vec<f64>> = HashMap::new();
    match cpt {
        Cpt::Prior(then) => {
            if !family.parents.is_empty() {
                return Err(Error::distribution(family.name(), "node has parents, expected a conditional table"));
            }
            rows.insert(Vec::new(), family.row(then)?);
        }
        Cpt::Conditional(table) => {
            for row in table {
                let key = family.row_key(row)?;
                let values = family.row(&row.then)?;
                if rows.insert(key, values).is_some() {
                    return Err(Error::distribution(family.name(), format!("duplicate row for {:?}", row.when)));
                }
            }
            let expected = size_of(&parent_levels);
            if rows.len() != expected {
                return Err(Error::distribution(
                    family.name(),
                    format!("expected {} rows, found {}", expected, rows.len()),
                ));
            }
        }
    }

    let (domain, levels) = family.domain();
    let position = |id: NodeId| domain.iter().position(|&v| v == id).unwrap_or_default();
    let node_pos = position(family.node.0);
    let parent_pos: Vec<usize> = family.parents.iter().map(|&(id, _, _)| position(id)).collect();

    let mut values = Vec::with_capacity(size_of(&levels));
    for index in 0..size_of(&levels) {
        let combination = index_to_combination(index, &levels);
        let key: Vec<usize> = parent_pos.iter().map(|&p| combination[p]).collect();
        let row = rows
            .get(&key)
            .ok_or_else(|| Error::distribution(family.name(), format!("missing row for parent levels {:?}", key)))?;
        values.push(row[combination[node_pos]]);
    }
    Ok(values)
}

/// Rebuild a CPT from a potential laid out by [`cpt_to_potential`].
///
/// Conditional rows are listed with the first parent varying slowest.
pub fn potential_to_cpt(family: &Family<'_>, values: &[f64]) -> Cpt {
    let (domain, levels) = family.domain();
    let position = |id: NodeId| domain.iter().position(|&v| v == id).unwrap_or_default();
    let node_pos = position(family.node.0);
    let states = family.node.2;

    let then_for = |parent_combination: &[usize]| -> IndexMap<String, f64> {
        let mut combination = vec![0; domain.len()];
        for (k, &(id, _, _)) in family.parents.iter().enumerate() {
            combination[position(id)] = parent_combination[k];
        }
        states
            .iter()
            .enumerate()
            .map(|(level, state)| {
                combination[node_pos] = level;
                (state.clone(), values[combination_to_index(&combination, &levels)])
            })
            .collect()
    };

    if family.parents.is_empty() {
        return Cpt::Prior(then_for(&[]));
    }

    let parent_levels = family.parent_levels();
    let rows = (0..size_of(&parent_levels))
        .map(|index| {
            let parent_combination = index_to_combination(index, &parent_levels);
            let when = family
                .parents
                .iter()
                .zip(&parent_combination)
                .map(|(&(_, name, states), &level)| (name.to_string(), states[level].clone()))
                .collect();
            CptRow {
                when,
                then: then_for(&parent_combination),
            }
        })
        .collect();
    Cpt::Conditional(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    use test_log::test;

    fn ids(raw: &[u32]) -> Vec<NodeId> {
        raw.iter().map(|&i| NodeId::new(i)).collect()
    }

    fn states(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_index_combination_inverse() {
        let levels = [2, 3, 4];
        for index in 0..size_of(&levels) {
            let combination = index_to_combination(index, &levels);
            assert_eq!(combination_to_index(&combination, &levels), index);
        }
        assert_eq!(index_to_combination(0, &levels), vec![0, 0, 0]);
        assert_eq!(index_to_combination(23, &levels), vec![1, 2, 3]);
        // The last variable varies fastest.
        assert_eq!(index_to_combination(1, &levels), vec![0, 0, 1]);
    }

    #[test]
    fn test_empty_domain() {
        assert_eq!(size_of(&[]), 1);
        assert_eq!(combination_to_index(&[], &[]), 0);
        assert!(index_to_combination(0, &[]).is_empty());
    }

    #[test]
    fn test_indicator() {
        assert_eq!(indicator(3, None), vec![1.0, 1.0, 1.0]);
        assert_eq!(indicator(3, Some(1)), vec![0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_normalize() {
        let mut values = vec![1.0, 3.0];
        assert_eq!(normalize(&mut values), 4.0);
        assert_eq!(values, vec![0.25, 0.75]);

        let mut zeros = vec![0.0, 0.0];
        assert_eq!(normalize(&mut zeros), 0.0);
        assert_eq!(zeros, vec![0.0, 0.0]);
    }

    #[test]
    fn test_multiply_broadcast() {
        // f(a) * g(a, b) over {a, b}
        let a = ids(&[0]);
        let ab = ids(&[0, 1]);
        let f = [0.6, 0.4];
        let g = [0.9, 0.1, 0.2, 0.8];
        let values = multiply(
            &ab,
            &[2, 2],
            &[Factor::new(&a, &[2], &f), Factor::new(&ab, &[2, 2], &g)],
        );
        let expected = [0.54, 0.06, 0.08, 0.32];
        for (x, y) in values.iter().zip(expected) {
            assert!((x - y).abs() < 1e-12);
        }
    }

    #[test]
    fn test_multiply_disjoint_domains() {
        // f(a) * g(c) is an outer product.
        let a = ids(&[0]);
        let c = ids(&[2]);
        let ac = ids(&[0, 2]);
        let values = multiply(
            &ac,
            &[2, 3],
            &[Factor::new(&a, &[2], &[1.0, 2.0]), Factor::new(&c, &[3], &[1.0, 10.0, 100.0])],
        );
        assert_eq!(values, vec![1.0, 10.0, 100.0, 2.0, 20.0, 200.0]);
    }

    #[test]
    fn test_marginalize() {
        let abc = ids(&[0, 1, 2]);
        let levels = [2, 2, 2];
        let values: Vec<f64> = (0..8).map(|i| i as f64).collect();
        let inner = Factor::new(&abc, &levels, &values);

        // Keep a: sum over b, c.
        assert_eq!(marginalize(&ids(&[0]), &[2], inner), vec![6.0, 22.0]);
        // Keep c: sum over a, b.
        assert_eq!(marginalize(&ids(&[2]), &[2], inner), vec![12.0, 16.0]);
        // Keep a, c.
        assert_eq!(marginalize(&ids(&[0, 2]), &[2, 2], inner), vec![2.0, 4.0, 10.0, 12.0]);
        // Keep nothing: total mass.
        assert_eq!(marginalize(&[], &[], inner), vec![28.0]);
    }

    #[test]
    fn test_divide() {
        let ab = ids(&[0, 1]);
        let b = ids(&[1]);
        let values = divide(
            Factor::new(&ab, &[2, 2], &[1.0, 2.0, 3.0, 4.0]),
            Factor::new(&b, &[2], &[2.0, 0.0]),
        );
        assert_eq!(values, vec![0.5, 0.0, 1.5, 0.0]);
    }

    #[test]
    fn test_union_domain() {
        let a = ids(&[3]);
        let b = ids(&[1, 3]);
        let (domain, levels) = union_domain(&[
            Factor::new(&a, &[4], &[0.0; 4]),
            Factor::new(&b, &[2, 4], &[0.0; 8]),
        ]);
        assert_eq!(domain, ids(&[1, 3]));
        assert_eq!(levels, vec![2, 4]);
    }

    #[test]
    fn test_cpt_roundtrip_with_parent_before_node() {
        // Node v1 with parent v0: the sorted domain is [parent, node].
        let b_states = states(&["b0", "b1"]);
        let a_states = states(&["a0", "a1"]);
        let family = Family {
            node: (NodeId::new(1), "B", &b_states),
            parents: vec![(NodeId::new(0), "A", &a_states)],
        };
        let cpt = Cpt::Conditional(vec![
            CptRow {
                when: IndexMap::from([("A".to_string(), "a0".to_string())]),
                then: IndexMap::from([("b0".to_string(), 0.9), ("b1".to_string(), 0.1)]),
            },
            CptRow {
                when: IndexMap::from([("A".to_string(), "a1".to_string())]),
                then: IndexMap::from([("b0".to_string(), 0.2), ("b1".to_string(), 0.8)]),
            },
        ]);
        let values = cpt_to_potential(&family, &cpt).unwrap();
        assert_eq!(values, vec![0.9, 0.1, 0.2, 0.8]);
        assert_eq!(potential_to_cpt(&family, &values), cpt);
    }

    #[test]
    fn test_cpt_layout_with_parent_after_node() {
        // Node v0 with parent v2: the sorted domain is [node, parent].
        let x_states = states(&["x0", "x1"]);
        let p_states = states(&["p0", "p1"]);
        let family = Family {
            node: (NodeId::new(0), "X", &x_states),
            parents: vec![(NodeId::new(2), "P", &p_states)],
        };
        let cpt = Cpt::Conditional(vec![
            CptRow {
                when: IndexMap::from([("P".to_string(), "p1".to_string())]),
                then: IndexMap::from([("x0".to_string(), 0.3), ("x1".to_string(), 0.7)]),
            },
            CptRow {
                when: IndexMap::from([("P".to_string(), "p0".to_string())]),
                then: IndexMap::from([("x0".to_string(), 0.5), ("x1".to_string(), 0.5)]),
            },
        ]);
        let values = cpt_to_potential(&family, &cpt).unwrap();
        // Cells: (x0,p0) (x0,p1) (x1,p0) (x1,p1)
        assert_eq!(values, vec![0.5, 0.3, 0.5, 0.7]);
    }

    #[test]
    fn test_cpt_rejects_bad_tables() {
        let a_states = states(&["a0", "a1"]);
        let family = Family {
            node: (NodeId::new(0), "A", &a_states),
            parents: vec![],
        };

        let not_normalized = Cpt::Prior(IndexMap::from([("a0".to_string(), 0.5), ("a1".to_string(), 0.6)]));
        assert!(matches!(
            cpt_to_potential(&family, &not_normalized),
            Err(Error::InvalidDistribution { .. })
        ));

        let missing_state = Cpt::Prior(IndexMap::from([("a0".to_string(), 1.0)]));
        assert!(cpt_to_potential(&family, &missing_state).is_err());

        let unknown_state = Cpt::Prior(IndexMap::from([
            ("a0".to_string(), 0.5),
            ("a1".to_string(), 0.5),
            ("a2".to_string(), 0.0),
        ]));
        assert!(cpt_to_potential(&family, &unknown_state).is_err());
    }

    #[test]
    fn test_cpt_rejects_incomplete_conditional() {
        let b_states = states(&["b0", "b1"]);
        let a_states = states(&["a0", "a1"]);
        let family = Family {
            node: (NodeId::new(1), "B", &b_states),
            parents: vec![(NodeId::new(0), "A", &a_states)],
        };
        let cpt = Cpt::Conditional(vec![CptRow {
            when: IndexMap::from([("A".to_string(), "a0".to_string())]),
            then: IndexMap::from([("b0".to_string(), 0.9), ("b1".to_string(), 0.1)]),
        }]);
        let err = cpt_to_potential(&family, &cpt).unwrap_err();
        assert!(err.to_string().contains("expected 2 rows"));

        let prior = Cpt::Prior(IndexMap::from([("b0".to_string(), 0.5), ("b1".to_string(), 0.5)]));
        assert!(cpt_to_potential(&family, &prior).is_err());
    }
}
