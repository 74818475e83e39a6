//! Connection resolution: turning partially-specified candidate connections
//! into concrete port-to-port edges.
//!
//! Ambiguity is resolved by exact port-name match first, then by unique type
//! match; several candidates of equal specificity fail with
//! `AmbiguousConnection` naming all of them, sorted by qualified name for
//! reproducibility.

use super::candidates::CandidateGraph;
use super::errors::GenerationError;
use crate::graph::ConnectionPolicy;
use crate::model::{ModelRegistry, Port, PortDirection};

/// A fully resolved connection between two candidate nodes
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedConnection {
    pub source: usize,
    pub source_port: String,
    pub sink: usize,
    pub sink_port: String,
    pub policy: ConnectionPolicy,
}

/// Resolve every candidate connection whose endpoints are concrete.
///
/// Failures are pushed into `errors`; resolution continues so one pass
/// reports every problem in the batch.
pub fn resolve_connections(
    graph: &CandidateGraph,
    registry: &ModelRegistry,
    errors: &mut Vec<GenerationError>,
) -> Vec<ResolvedConnection> {
    let mut resolved: Vec<ResolvedConnection> = Vec::new();

    for connection in &graph.connections {
        let source_node = &graph.nodes[connection.source];
        let sink_node = &graph.nodes[connection.sink];
        let (Some(source_model), Some(sink_model)) =
            (source_node.concrete_model(), sink_node.concrete_model())
        else {
            // abstract endpoints are reported by the concreteness check
            continue;
        };

        let ports = match (&connection.source_port, &connection.sink_port) {
            (Some(source_port), Some(sink_port)) => {
                let mut ok = true;
                if !port_exists(registry, source_model, source_port, PortDirection::Output) {
                    errors.push(GenerationError::MissingPort {
                        task: source_node.path.clone(),
                        model: source_model.to_string(),
                        port: source_port.clone(),
                    });
                    ok = false;
                }
                if !port_exists(registry, sink_model, sink_port, PortDirection::Input) {
                    errors.push(GenerationError::MissingPort {
                        task: sink_node.path.clone(),
                        model: sink_model.to_string(),
                        port: sink_port.clone(),
                    });
                    ok = false;
                }
                ok.then(|| (source_port.clone(), sink_port.clone()))
            }
            (Some(source_port), None) => resolve_one_side(
                registry,
                source_model,
                source_port,
                sink_model,
                &sink_node.path,
                PortDirection::Input,
                errors,
                &source_node.path,
            )
            .map(|sink_port| (source_port.clone(), sink_port)),
            (None, Some(sink_port)) => resolve_one_side(
                registry,
                sink_model,
                sink_port,
                source_model,
                &source_node.path,
                PortDirection::Output,
                errors,
                &sink_node.path,
            )
            .map(|source_port| (source_port, sink_port.clone())),
            (None, None) => resolve_by_type(
                registry,
                source_model,
                &source_node.path,
                sink_model,
                &sink_node.path,
                errors,
            ),
        };

        if let Some((source_port, sink_port)) = ports {
            let entry = ResolvedConnection {
                source: connection.source,
                source_port,
                sink: connection.sink,
                sink_port,
                policy: connection.policy,
            };
            if !resolved.contains(&entry) {
                resolved.push(entry);
            }
        }
    }

    resolved
}

/// One endpoint is named; find the matching port on the other side
#[allow(clippy::too_many_arguments)]
fn resolve_one_side(
    registry: &ModelRegistry,
    named_model: &str,
    named_port: &str,
    other_model: &str,
    other_path: &str,
    other_direction: PortDirection,
    errors: &mut Vec<GenerationError>,
    named_path: &str,
) -> Option<String> {
    let Some(port) = lookup(registry, named_model, named_port) else {
        errors.push(GenerationError::MissingPort {
            task: named_path.to_string(),
            model: named_model.to_string(),
            port: named_port.to_string(),
        });
        return None;
    };

    let candidates: Vec<Port> = ports_of(registry, other_model, other_direction)
        .into_iter()
        .filter(|p| p.data_type.is_compatible_with(&port.data_type))
        .collect();

    // exact port-name match beats type matching
    if let Some(exact) = candidates.iter().find(|p| p.name == named_port) {
        return Some(exact.name.clone());
    }

    match candidates.as_slice() {
        [] => {
            errors.push(GenerationError::NoConnectionCandidate {
                task: other_path.to_string(),
                model: other_model.to_string(),
                other: format!("{named_path}.{named_port}"),
            });
            None
        }
        [only] => Some(only.name.clone()),
        many => {
            let mut names: Vec<String> =
                many.iter().map(|p| format!("{other_path}.{}", p.name)).collect();
            names.sort();
            errors.push(GenerationError::AmbiguousConnection {
                source_id: format!("{named_path}.{named_port}"),
                sink: other_path.to_string(),
                candidates: names,
            });
            None
        }
    }
}

/// Neither endpoint is named; pair the ports by name, then by unique type
fn resolve_by_type(
    registry: &ModelRegistry,
    source_model: &str,
    source_path: &str,
    sink_model: &str,
    sink_path: &str,
    errors: &mut Vec<GenerationError>,
) -> Option<(String, String)> {
    let outputs = ports_of(registry, source_model, PortDirection::Output);
    let inputs = ports_of(registry, sink_model, PortDirection::Input);

    let mut pairs: Vec<(String, String)> = Vec::new();
    for output in &outputs {
        for input in &inputs {
            if output.data_type.is_compatible_with(&input.data_type) {
                pairs.push((output.name.clone(), input.name.clone()));
            }
        }
    }

    let name_matched: Vec<&(String, String)> =
        pairs.iter().filter(|(o, i)| o == i).collect();
    let chosen = match name_matched.as_slice() {
        [only] => Some((*only).clone()),
        [] => match pairs.as_slice() {
            [] => {
                errors.push(GenerationError::NoConnectionCandidate {
                    task: source_path.to_string(),
                    model: source_model.to_string(),
                    other: sink_path.to_string(),
                });
                None
            }
            [only] => Some(only.clone()),
            _ => {
                report_ambiguous(source_path, sink_path, &pairs, errors);
                None
            }
        },
        _ => {
            let matched: Vec<(String, String)> =
                name_matched.into_iter().cloned().collect();
            report_ambiguous(source_path, sink_path, &matched, errors);
            None
        }
    };
    chosen
}

fn report_ambiguous(
    source_path: &str,
    sink_path: &str,
    pairs: &[(String, String)],
    errors: &mut Vec<GenerationError>,
) {
    let mut candidates: Vec<String> = pairs
        .iter()
        .map(|(o, i)| format!("{source_path}.{o} -> {sink_path}.{i}"))
        .collect();
    candidates.sort();
    errors.push(GenerationError::AmbiguousConnection {
        source_id: source_path.to_string(),
        sink: sink_path.to_string(),
        candidates,
    });
}

fn lookup(registry: &ModelRegistry, model: &str, port: &str) -> Option<Port> {
    registry.resolve_port(model, port).ok().flatten()
}

fn port_exists(
    registry: &ModelRegistry,
    model: &str,
    port: &str,
    direction: PortDirection,
) -> bool {
    lookup(registry, model, port).is_some_and(|p| p.direction == direction)
}

fn ports_of(registry: &ModelRegistry, model: &str, direction: PortDirection) -> Vec<Port> {
    registry
        .effective_ports(model)
        .unwrap_or_default()
        .into_iter()
        .filter(|p| p.direction == direction)
        .collect()
}
