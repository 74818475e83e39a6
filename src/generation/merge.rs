//! Structural merging of candidate nodes.
//!
//! Candidate tasks are unified when their model sets are ordered by
//! inclusion (or one concrete model fulfills the other's request), their
//! arguments and deployment groups are compatible, unifying them does not
//! create a directed cycle that did not already exist, and the merged node's
//! input ports keep a single writer each. Merging proceeds greedily from the
//! most specific pairs and is repeated to a fixpoint, since one merge can
//! collapse sources and thereby enable further merges.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use tracing::debug;

use super::candidates::{CandidateGraph, CandidateNode};
use crate::model::ModelRegistry;
use crate::requirements::ArgumentValue;

struct UnionFind {
    parent: Vec<usize>,
}

impl UnionFind {
    fn new(len: usize) -> Self {
        Self {
            parent: (0..len).collect(),
        }
    }

    fn find(&mut self, index: usize) -> usize {
        if self.parent[index] != index {
            let root = self.find(self.parent[index]);
            self.parent[index] = root;
        }
        self.parent[index]
    }

    fn union(&mut self, a: usize, b: usize) -> usize {
        let root_a = self.find(a);
        let root_b = self.find(b);
        // keep the smaller index as representative for determinism
        let (keep, fold) = if root_a <= root_b {
            (root_a, root_b)
        } else {
            (root_b, root_a)
        };
        self.parent[fold] = keep;
        keep
    }
}

/// Merge candidates to a fixpoint and return the compacted graph
pub fn merge_candidates(mut graph: CandidateGraph, registry: &ModelRegistry) -> CandidateGraph {
    let len = graph.nodes.len();
    let mut uf = UnionFind::new(len);

    loop {
        if !merge_round(&mut graph, &mut uf, registry) {
            break;
        }
    }

    compact(graph, &mut uf)
}

/// Attempt one merge; returns whether anything was unified
fn merge_round(
    graph: &mut CandidateGraph,
    uf: &mut UnionFind,
    registry: &ModelRegistry,
) -> bool {
    let mut reps: Vec<usize> = (0..graph.nodes.len()).map(|i| uf.find(i)).collect();
    reps.sort_unstable();
    reps.dedup();

    // most specific pairs first: fully concrete nodes merge before abstract
    // ones, names break ties for reproducibility
    let mut pairs: Vec<(usize, usize)> = Vec::new();
    for (position, &a) in reps.iter().enumerate() {
        for &b in &reps[position + 1..] {
            pairs.push((a, b));
        }
    }
    pairs.sort_by_key(|&(a, b)| {
        let singletons = usize::from(graph.nodes[a].models.len() == 1)
            + usize::from(graph.nodes[b].models.len() == 1);
        (
            std::cmp::Reverse(singletons),
            graph.nodes[a].path.clone(),
            graph.nodes[b].path.clone(),
        )
    });

    for (a, b) in pairs {
        let Some(merged) = mergeable(graph, a, b, registry) else {
            continue;
        };
        if creates_new_cycle(graph, uf, a, b) {
            continue;
        }
        if !ports_stay_consistent(graph, uf, a, b, &merged.models, registry) {
            continue;
        }

        debug!(
            kept = %graph.nodes[a.min(b)].path,
            folded = %graph.nodes[a.max(b)].path,
            "🧩 GENERATION: Merged candidates"
        );
        let keep = uf.union(a, b);
        graph.nodes[keep] = merged;
        return true;
    }
    false
}

/// Build the merged node if the two candidates are structurally compatible
fn mergeable(
    graph: &CandidateGraph,
    a: usize,
    b: usize,
    registry: &ModelRegistry,
) -> Option<CandidateNode> {
    let node_a = &graph.nodes[a];
    let node_b = &graph.nodes[b];

    let models = merged_models(&node_a.models, &node_b.models, registry)?;
    let arguments = merged_arguments(&node_a.arguments, &node_b.arguments)?;
    let deployment_group = match (&node_a.deployment_group, &node_b.deployment_group) {
        (Some(x), Some(y)) if x != y => return None,
        (Some(x), _) => Some(x.clone()),
        (None, y) => y.clone(),
    };

    Some(CandidateNode {
        path: node_a.path.clone().min(node_b.path.clone()),
        models,
        arguments,
        deployment_group,
        refs: node_a.refs.union(&node_b.refs).copied().collect(),
    })
}

fn merged_models(
    a: &BTreeSet<String>,
    b: &BTreeSet<String>,
    registry: &ModelRegistry,
) -> Option<BTreeSet<String>> {
    if a.is_superset(b) && !b.is_empty() {
        return Some(b.clone());
    }
    if b.is_superset(a) && !a.is_empty() {
        return Some(a.clone());
    }
    if let (Some(x), Some(y)) = (only_model(a), only_model(b)) {
        if registry.fulfills(x, y) {
            return Some(a.clone());
        }
        if registry.fulfills(y, x) {
            return Some(b.clone());
        }
    }
    None
}

fn only_model(set: &BTreeSet<String>) -> Option<&str> {
    if set.len() == 1 {
        set.iter().next().map(String::as_str)
    } else {
        None
    }
}

fn merged_arguments(
    a: &BTreeMap<String, ArgumentValue>,
    b: &BTreeMap<String, ArgumentValue>,
) -> Option<BTreeMap<String, ArgumentValue>> {
    let mut merged = a.clone();
    for (name, theirs) in b {
        match merged.get(name) {
            None => {
                merged.insert(name.clone(), theirs.clone());
            }
            Some(ours) => match (ours, theirs) {
                (ArgumentValue::Bound(x), ArgumentValue::Bound(y)) => {
                    if x != y {
                        return None;
                    }
                }
                (ArgumentValue::Unbound { .. }, ArgumentValue::Bound(_)) => {
                    merged.insert(name.clone(), theirs.clone());
                }
                (ArgumentValue::Bound(_), ArgumentValue::Unbound { .. }) => {}
                (
                    ArgumentValue::Unbound { placeholder: x },
                    ArgumentValue::Unbound { placeholder: y },
                ) => {
                    if y < x {
                        merged.insert(name.clone(), theirs.clone());
                    }
                }
            },
        }
    }
    Some(merged)
}

/// Whether folding `a` and `b` together would create a directed cycle that
/// the candidate graph does not already contain
fn creates_new_cycle(graph: &CandidateGraph, uf: &mut UnionFind, a: usize, b: usize) -> bool {
    let forward = reaches(graph, uf, a, b);
    let backward = reaches(graph, uf, b, a);
    // a path in exactly one direction becomes a loop through the merged
    // node; paths in both directions mean the cycle predates the merge
    forward != backward
}

fn reaches(graph: &CandidateGraph, uf: &mut UnionFind, from: usize, to: usize) -> bool {
    let from = uf.find(from);
    let to = uf.find(to);
    let mut queue = VecDeque::from([from]);
    let mut seen = BTreeSet::from([from]);
    while let Some(current) = queue.pop_front() {
        for connection in &graph.connections {
            if uf.find(connection.source) != current {
                continue;
            }
            let next = uf.find(connection.sink);
            if next == to && current != to {
                return true;
            }
            if seen.insert(next) {
                queue.push_back(next);
            }
        }
    }
    false
}

/// Whether the merged node's named input ports keep a single writer each
fn ports_stay_consistent(
    graph: &CandidateGraph,
    uf: &mut UnionFind,
    a: usize,
    b: usize,
    merged_models: &BTreeSet<String>,
    registry: &ModelRegistry,
) -> bool {
    let rep_a = uf.find(a);
    let rep_b = uf.find(b);
    let mut writers: BTreeMap<String, BTreeSet<(usize, Option<String>)>> = BTreeMap::new();

    for connection in &graph.connections {
        let sink = uf.find(connection.sink);
        if sink != rep_a && sink != rep_b {
            continue;
        }
        let Some(port) = &connection.sink_port else {
            continue;
        };
        let mut source = uf.find(connection.source);
        // the writer set must be computed as if the merge already happened
        if source == rep_b {
            source = rep_a;
        }
        writers
            .entry(port.clone())
            .or_default()
            .insert((source, connection.source_port.clone()));
    }

    for (port, sources) in writers {
        if sources.len() <= 1 {
            continue;
        }
        let multiplexing = merged_models.iter().any(|model| {
            registry
                .resolve_port(model, &port)
                .ok()
                .flatten()
                .is_some_and(|p| p.multiplexing)
        });
        if !multiplexing {
            return false;
        }
    }
    true
}

/// Rebuild a dense graph from the union-find representatives
fn compact(graph: CandidateGraph, uf: &mut UnionFind) -> CandidateGraph {
    let len = graph.nodes.len();
    let mut rep_to_new: BTreeMap<usize, usize> = BTreeMap::new();
    let mut compacted = CandidateGraph::new();

    for index in 0..len {
        let rep = uf.find(index);
        if rep == index {
            let new_index = compacted.add_node(graph.nodes[index].clone());
            rep_to_new.insert(rep, new_index);
        }
    }

    let mut seen = BTreeSet::new();
    for connection in &graph.connections {
        let mut remapped = connection.clone();
        remapped.source = rep_to_new[&uf.find(connection.source)];
        remapped.sink = rep_to_new[&uf.find(connection.sink)];
        let key = (
            remapped.source,
            remapped.source_port.clone(),
            remapped.sink,
            remapped.sink_port.clone(),
            remapped.policy,
        );
        if seen.insert(key) {
            compacted.add_connection(remapped);
        }
    }

    compacted
}
