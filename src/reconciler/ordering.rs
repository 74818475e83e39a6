//! Safety ordering of the per-cycle operation list.

use super::operations::Operation;

/// Sort operations into their execution order.
///
/// Operations run phase by phase (see [`Operation::phase`]); within a phase
/// the order is by name, so repeated runs over the same delta produce the
/// same list.
pub fn order_operations(mut operations: Vec<Operation>) -> Vec<Operation> {
    operations.sort_by(|a, b| {
        a.phase()
            .cmp(&b.phase())
            .then_with(|| a.sort_key().cmp(&b.sort_key()))
    });
    operations
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::ConnectionPolicy;
    use crate::reconciler::operations::ConnectionSpec;

    fn connection() -> ConnectionSpec {
        ConnectionSpec {
            source: "camera".to_string(),
            source_port: "frames".to_string(),
            sink: "filter".to_string(),
            sink_port: "frames".to_string(),
            policy: ConnectionPolicy::data(),
        }
    }

    #[test]
    fn test_connect_comes_after_configure_and_start() {
        let ordered = order_operations(vec![
            Operation::Connect {
                connection: connection(),
            },
            Operation::Start {
                task: "camera".to_string(),
            },
            Operation::Configure {
                task: "camera".to_string(),
            },
        ]);
        assert!(matches!(ordered[0], Operation::Configure { .. }));
        assert!(matches!(ordered[1], Operation::Start { .. }));
        assert!(matches!(ordered[2], Operation::Connect { .. }));
    }

    #[test]
    fn test_policy_change_orders_disconnect_first() {
        let ordered = order_operations(vec![
            Operation::Connect {
                connection: connection(),
            },
            Operation::Disconnect {
                connection: connection(),
            },
        ]);
        assert!(matches!(ordered[0], Operation::Disconnect { .. }));
        assert!(matches!(ordered[1], Operation::Connect { .. }));
    }

    #[test]
    fn test_within_phase_ordering_is_by_name() {
        let ordered = order_operations(vec![
            Operation::Start {
                task: "zeta".to_string(),
            },
            Operation::Start {
                task: "alpha".to_string(),
            },
        ]);
        assert_eq!(
            ordered,
            vec![
                Operation::Start {
                    task: "alpha".to_string()
                },
                Operation::Start {
                    task: "zeta".to_string()
                },
            ]
        );
    }
}
