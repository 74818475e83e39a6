//! Integration tests for the network generation engine.

mod common;

use std::collections::BTreeMap;

use composer_core::context::OrchestratorContext;
use composer_core::config::ConfigurationManager;
use composer_core::deployment::{ConfiguredDeployment, Deployment, DeploymentRegistry};
use composer_core::generation::{GenerationEngine, GenerationError};
use composer_core::model::{ComponentModel, Model};
use composer_core::requirements::{
    ArgumentValue, InstanceRequirements, RequirementError, RequirementId,
};

use common::test_context;

fn generate(
    context: &OrchestratorContext,
    requirements: Vec<InstanceRequirements>,
) -> Result<composer_core::DataFlowGraph, composer_core::generation::GenerationFailure> {
    let map: BTreeMap<RequirementId, InstanceRequirements> = requirements
        .into_iter()
        .enumerate()
        .map(|(index, ir)| (RequirementId(index as u64 + 1), ir))
        .collect();
    GenerationEngine::new(context).generate(&map)
}

#[test]
fn two_identical_requirements_produce_one_task() {
    let context = test_context();
    let graph = generate(
        &context,
        vec![
            InstanceRequirements::of_model("video_source"),
            InstanceRequirements::of_model("video_source"),
        ],
    )
    .unwrap();

    assert_eq!(graph.task_count(), 1);
    let (_, task) = graph.tasks().next().unwrap();
    assert_eq!(task.model, "video_source");
    // the merged task is referenced by both requirements
    assert_eq!(task.requirement_refs.len(), 2);
}

#[test]
fn conflicting_arguments_produce_separate_tasks() {
    let context = test_context();
    let result = generate(
        &context,
        vec![
            InstanceRequirements::of_model("video_source")
                .with_argument("device", ArgumentValue::bound("/dev/video0")),
            InstanceRequirements::of_model("video_source")
                .with_argument("device", ArgumentValue::bound("/dev/video1")),
        ],
    );

    // two distinct cameras, but only one camera slot is deployed
    let failure = result.unwrap_err();
    assert!(failure
        .errors
        .iter()
        .any(|e| matches!(e, GenerationError::MissingDeployment { .. })));
}

#[test]
fn pipeline_composition_expands_and_connects() {
    let context = test_context();
    let graph = generate(
        &context,
        vec![InstanceRequirements::of_model("vision_pipeline")],
    )
    .unwrap();

    assert_eq!(graph.task_count(), 2);
    assert_eq!(graph.connections().len(), 1);
    graph.check_consistency().unwrap();

    let camera = graph.by_name("vision_proc.camera").unwrap();
    let filter = graph.by_name("vision_proc.filter").unwrap();
    assert_eq!(camera.model, "video_source");
    assert_eq!(filter.model, "edge_detector");

    let connection = &graph.connections()[0];
    assert_eq!(connection.source_port, "frames");
    assert_eq!(connection.sink_port, "frames");
}

#[test]
fn pipeline_and_bare_camera_share_one_source() {
    let context = test_context();
    let graph = generate(
        &context,
        vec![
            InstanceRequirements::of_model("vision_pipeline"),
            InstanceRequirements::of_model("video_source"),
        ],
    )
    .unwrap();

    // the bare camera request merges into the pipeline's source
    assert_eq!(graph.task_count(), 2);
    let camera = graph.by_name("vision_proc.camera").unwrap();
    assert_eq!(camera.requirement_refs.len(), 2);
}

#[test]
fn service_with_two_providers_is_ambiguous() {
    let mut context = test_context();
    context
        .models
        .register(Model::Component(
            ComponentModel::new("file_replay").providing("image_source", []),
        ))
        .unwrap();

    let failure = generate(
        &context,
        vec![InstanceRequirements::of_model("image_source")],
    )
    .unwrap_err();

    let ambiguous = failure.errors.iter().find_map(|e| match e {
        GenerationError::Requirement(RequirementError::AmbiguousSelection {
            candidates, ..
        }) => Some(candidates.clone()),
        _ => None,
    });
    let candidates = ambiguous.expect("expected an AmbiguousSelection error");
    assert_eq!(
        candidates,
        vec!["file_replay".to_string(), "video_source".to_string()]
    );
}

#[test]
fn service_with_single_provider_resolves() {
    let context = test_context();
    let graph = generate(
        &context,
        vec![InstanceRequirements::of_model("image_source")],
    )
    .unwrap();
    assert_eq!(graph.task_count(), 1);
    let (_, task) = graph.tasks().next().unwrap();
    assert_eq!(task.model, "video_source");
}

#[test]
fn every_error_is_reported_at_once() {
    let mut context = test_context();
    context
        .models
        .register(Model::Component(ComponentModel::new("unhosted")))
        .unwrap();

    let failure = generate(
        &context,
        vec![
            // no deployment can host this model
            InstanceRequirements::of_model("unhosted"),
            // this model was never registered
            InstanceRequirements::of_model("nonexistent"),
        ],
    )
    .unwrap_err();

    assert!(failure.errors.len() >= 2, "got: {failure}");
    assert!(failure
        .errors
        .iter()
        .any(|e| matches!(e, GenerationError::MissingDeployment { .. })));
    assert!(failure
        .errors
        .iter()
        .any(|e| matches!(e, GenerationError::CannotInstallMissingModel { .. })));
}

#[test]
fn explicit_deployment_group_overrides_default_choice() {
    let mut deployments = DeploymentRegistry::new();
    deployments.register(
        ConfiguredDeployment::new(
            Deployment::new("main_proc").hosting("camera", "video_source"),
            "localhost",
        )
        .with_priority(100),
    );
    deployments.register_in_group(
        ConfiguredDeployment::new(
            Deployment::new("replay_proc").hosting("camera", "video_source"),
            "replay_host",
        ),
        "replay",
    );
    let context = OrchestratorContext::new(
        common::model_registry(),
        deployments,
        ConfigurationManager::for_testing(),
    );

    let graph = generate(
        &context,
        vec![InstanceRequirements::of_model("video_source").with_deployment_group("replay")],
    )
    .unwrap();
    let (_, task) = graph.tasks().next().unwrap();
    assert_eq!(
        task.deployment.as_ref().unwrap().deployment,
        "replay_proc"
    );

    // without the group, the higher-priority deployment wins
    let graph = generate(&context, vec![InstanceRequirements::of_model("video_source")])
        .unwrap();
    let (_, task) = graph.tasks().next().unwrap();
    assert_eq!(task.deployment.as_ref().unwrap().deployment, "main_proc");
}

#[test]
fn generation_is_deterministic() {
    let context = test_context();
    let requirements = vec![
        InstanceRequirements::of_model("vision_pipeline"),
        InstanceRequirements::of_model("recorder"),
    ];

    let first = generate(&context, requirements.clone()).unwrap();
    let second = generate(&context, requirements).unwrap();

    let names = |graph: &composer_core::DataFlowGraph| {
        graph
            .tasks()
            .map(|(_, t)| (t.name.clone(), t.model.clone()))
            .collect::<Vec<_>>()
    };
    assert_eq!(names(&first), names(&second));
    assert_eq!(first.connections().len(), second.connections().len());
}

#[test]
fn generated_tasks_start_selected_for_deployment() {
    let context = test_context();
    let graph = generate(
        &context,
        vec![InstanceRequirements::of_model("vision_pipeline")],
    )
    .unwrap();
    for (_, task) in graph.tasks() {
        assert_eq!(
            task.state,
            composer_core::DeploymentState::SelectedForDeployment
        );
        assert!(task.deployment.is_some());
    }
}
