//! Intermediate candidate graph built during generation, before merging has
//! produced the final concrete task set.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;

use crate::graph::ConnectionPolicy;
use crate::requirements::{ArgumentValue, RequirementId};

/// One candidate task node.
///
/// `path` is the qualified role path the node came from (requirement id and
/// composition roles), used for error context and for deterministic ordering;
/// merged nodes keep the lexicographically smallest path.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateNode {
    pub path: String,
    pub models: BTreeSet<String>,
    pub arguments: BTreeMap<String, ArgumentValue>,
    pub deployment_group: Option<String>,
    pub refs: BTreeSet<RequirementId>,
}

impl CandidateNode {
    /// The single concrete model, once narrowed
    pub fn concrete_model(&self) -> Option<&str> {
        if self.models.len() == 1 {
            self.models.iter().next().map(String::as_str)
        } else {
            None
        }
    }

    /// Arguments with a bound value; unresolved placeholders stay behind
    pub fn bound_arguments(&self) -> BTreeMap<String, Value> {
        self.arguments
            .iter()
            .filter_map(|(name, value)| {
                value.as_value().map(|v| (name.clone(), v.clone()))
            })
            .collect()
    }
}

/// A candidate connection; ports may still be unresolved
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateConnection {
    pub source: usize,
    pub source_port: Option<String>,
    pub sink: usize,
    pub sink_port: Option<String>,
    pub policy: ConnectionPolicy,
}

/// Candidate nodes plus their connections, indexed positionally
#[derive(Debug, Clone, Default)]
pub struct CandidateGraph {
    pub nodes: Vec<CandidateNode>,
    pub connections: Vec<CandidateConnection>,
}

impl CandidateGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, node: CandidateNode) -> usize {
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    pub fn add_connection(&mut self, connection: CandidateConnection) {
        self.connections.push(connection);
    }
}
