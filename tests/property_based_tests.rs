//! Property-based tests for the requirement algebra, generation invariants,
//! and operation ordering.

mod common;

use std::collections::BTreeMap;

use proptest::prelude::*;

use composer_core::generation::GenerationEngine;
use composer_core::model::{ComponentModel, Model, ModelRegistry};
use composer_core::reconciler::{order_operations, ConnectionSpec, Operation};
use composer_core::requirements::{ArgumentValue, InstanceRequirements, RequirementId};
use composer_core::ConnectionPolicy;

use common::test_context;

/// A four-deep refinement chain: stage3 refines stage2 refines stage1
/// refines stage0. Model sets drawn as chain suffixes are always ordered by
/// inclusion, which is what `merge` requires.
fn chain_registry() -> ModelRegistry {
    let mut registry = ModelRegistry::new();
    registry
        .register(Model::Component(ComponentModel::new("stage0")))
        .unwrap();
    for index in 1..4 {
        registry
            .register(Model::Component(
                ComponentModel::new(format!("stage{index}"))
                    .with_parent(format!("stage{}", index - 1)),
            ))
            .unwrap();
    }
    registry
}

fn argument_strategy() -> impl Strategy<Value = ArgumentValue> {
    prop_oneof![
        Just(ArgumentValue::bound(7)),
        "[pq]".prop_map(ArgumentValue::unbound),
    ]
}

fn requirement_strategy() -> impl Strategy<Value = InstanceRequirements> {
    (
        0usize..4,
        proptest::collection::btree_map("[ab]", argument_strategy(), 0..3),
    )
        .prop_map(|(start, arguments)| {
            let mut ir = InstanceRequirements::of_models(
                (start..4).map(|index| format!("stage{index}")),
            );
            ir.arguments = arguments;
            ir
        })
}

proptest! {
    /// Property: merging two requirements is commutative
    #[test]
    fn merge_is_commutative(a in requirement_strategy(), b in requirement_strategy()) {
        let registry = chain_registry();
        let ab = a.merge(&b, &registry);
        let ba = b.merge(&a, &registry);
        prop_assert_eq!(ab.unwrap(), ba.unwrap());
    }

    /// Property: merging is associative for mergeable requirements
    #[test]
    fn merge_is_associative(
        a in requirement_strategy(),
        b in requirement_strategy(),
        c in requirement_strategy(),
    ) {
        let registry = chain_registry();
        let left = a.merge(&b, &registry).unwrap().merge(&c, &registry).unwrap();
        let right = a.merge(&b.merge(&c, &registry).unwrap(), &registry).unwrap();
        prop_assert_eq!(left, right);
    }

    /// Property: merging narrows the model set to the more specific side
    #[test]
    fn merge_narrows_to_the_smaller_model_set(
        a in requirement_strategy(),
        b in requirement_strategy(),
    ) {
        let registry = chain_registry();
        let merged = a.merge(&b, &registry).unwrap();
        let smaller = if a.models.len() <= b.models.len() { &a } else { &b };
        prop_assert_eq!(&merged.models, &smaller.models);
    }

    /// Property: every graph produced by generation has no dangling edges
    /// and every task concrete and deployed
    #[test]
    fn generated_graphs_have_no_dangling_edges(
        roots in proptest::sample::subsequence(
            vec!["vision_pipeline", "video_source", "image_source", "recorder"],
            1..=4,
        ),
    ) {
        let context = test_context();
        let requirements: BTreeMap<RequirementId, InstanceRequirements> = roots
            .iter()
            .enumerate()
            .map(|(index, model)| {
                (
                    RequirementId(index as u64 + 1),
                    InstanceRequirements::of_model(*model),
                )
            })
            .collect();

        let graph = GenerationEngine::new(&context).generate(&requirements).unwrap();
        prop_assert!(graph.check_consistency().is_ok());
        for (_, task) in graph.tasks() {
            prop_assert!(task.deployment.is_some());
            prop_assert!(context.models.is_component(&task.model));
        }
    }
}

fn operation_strategy() -> impl Strategy<Value = Operation> {
    let connection = ("[a-c]", "[a-c]").prop_map(|(source, sink)| ConnectionSpec {
        source,
        source_port: "out".to_string(),
        sink,
        sink_port: "in".to_string(),
        policy: ConnectionPolicy::data(),
    });
    prop_oneof![
        "[a-c]".prop_map(|task| Operation::Stop { task }),
        "[a-c]".prop_map(|task| Operation::Start { task }),
        "[a-c]".prop_map(|task| Operation::Configure { task }),
        "[a-c]".prop_map(|task| Operation::Remove { task }),
        "[a-c]".prop_map(|deployment| Operation::Spawn { deployment }),
        connection.clone().prop_map(|connection| Operation::Connect { connection }),
        connection.prop_map(|connection| Operation::Disconnect { connection }),
    ]
}

proptest! {
    /// Property: ordered operation lists have non-decreasing phases and are
    /// a permutation of the input
    #[test]
    fn ordering_is_a_monotone_permutation(
        operations in proptest::collection::vec(operation_strategy(), 0..12),
    ) {
        let ordered = order_operations(operations.clone());
        prop_assert_eq!(ordered.len(), operations.len());
        for window in ordered.windows(2) {
            prop_assert!(window[0].phase() <= window[1].phase());
        }
        for operation in &operations {
            let in_input = operations.iter().filter(|o| *o == operation).count();
            let in_output = ordered.iter().filter(|o| *o == operation).count();
            prop_assert_eq!(in_input, in_output);
        }
    }

    /// Property: ordering is idempotent
    #[test]
    fn ordering_twice_changes_nothing(
        operations in proptest::collection::vec(operation_strategy(), 0..12),
    ) {
        let once = order_operations(operations);
        let twice = order_operations(once.clone());
        prop_assert_eq!(once, twice);
    }
}
