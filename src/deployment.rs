//! # Deployments
//!
//! Process specifications (which component instances a process hosts, under
//! which names) and their binding to concrete process servers.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::model::ModelRegistry;

/// A named process specification: the component instances it hosts when
/// started, with optional renames
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deployment {
    pub name: String,
    /// logical task name -> component model hosted under that name
    pub tasks: BTreeMap<String, String>,
    /// logical task name -> name the task gets inside the running process
    #[serde(default)]
    pub name_mappings: BTreeMap<String, String>,
}

impl Deployment {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tasks: BTreeMap::new(),
            name_mappings: BTreeMap::new(),
        }
    }

    pub fn hosting(mut self, task: impl Into<String>, model: impl Into<String>) -> Self {
        self.tasks.insert(task.into(), model.into());
        self
    }

    pub fn renaming(mut self, task: impl Into<String>, remote: impl Into<String>) -> Self {
        self.name_mappings.insert(task.into(), remote.into());
        self
    }

    /// Logical name of a hosted task able to run `model`, if any
    pub fn slot_for(&self, model: &str, registry: &ModelRegistry) -> Option<&str> {
        self.slots_for(model, registry).into_iter().next()
    }

    /// All hosted task slots able to run `model`, in name order
    pub fn slots_for(&self, model: &str, registry: &ModelRegistry) -> Vec<&str> {
        self.tasks
            .iter()
            .filter(|(_, hosted)| registry.fulfills(hosted, model))
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// The name a logical task goes by inside the running process
    pub fn remote_name<'a>(&'a self, task: &'a str) -> &'a str {
        self.name_mappings
            .get(task)
            .map(String::as_str)
            .unwrap_or(task)
    }
}

/// A deployment bound to a concrete process-server target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfiguredDeployment {
    pub deployment: Deployment,
    /// Process server that will execute the deployment (e.g. a host name)
    pub process_server: String,
    /// Tie-break weight when several deployments can host a task; higher
    /// wins, names break remaining ties
    #[serde(default)]
    pub priority: i32,
}

impl ConfiguredDeployment {
    pub fn new(deployment: Deployment, process_server: impl Into<String>) -> Self {
        Self {
            deployment,
            process_server: process_server.into(),
            priority: 0,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn name(&self) -> &str {
        &self.deployment.name
    }
}

/// Registry of configured deployments and deployment groups.
#[derive(Debug, Clone, Default)]
pub struct DeploymentRegistry {
    deployments: BTreeMap<String, ConfiguredDeployment>,
    groups: BTreeMap<String, BTreeSet<String>>,
}

impl DeploymentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, configured: ConfiguredDeployment) {
        debug!(
            deployment = %configured.name(),
            process_server = %configured.process_server,
            "🚀 DEPLOYMENT: Registered"
        );
        self.deployments
            .insert(configured.name().to_string(), configured);
    }

    pub fn register_in_group(&mut self, configured: ConfiguredDeployment, group: impl Into<String>) {
        self.groups
            .entry(group.into())
            .or_default()
            .insert(configured.name().to_string());
        self.register(configured);
    }

    pub fn get(&self, name: &str) -> Option<&ConfiguredDeployment> {
        self.deployments.get(name)
    }

    pub fn deployments(&self) -> impl Iterator<Item = &ConfiguredDeployment> {
        self.deployments.values()
    }

    /// Select the deployment to host a task of `model`.
    ///
    /// An explicit group restricts the candidates to that group; otherwise
    /// every registered deployment is considered. Several valid candidates
    /// are not an error: the pick is deterministic (highest declared
    /// priority first, then lexicographically smallest deployment name) and
    /// remains overridable by an explicit group selection.
    pub fn select_for(
        &self,
        model: &str,
        group: Option<&str>,
        registry: &ModelRegistry,
    ) -> Option<&ConfiguredDeployment> {
        self.candidates_for(model, group, registry).into_iter().next()
    }

    /// All deployments able to host `model`, in selection order
    pub fn candidates_for(
        &self,
        model: &str,
        group: Option<&str>,
        registry: &ModelRegistry,
    ) -> Vec<&ConfiguredDeployment> {
        let in_group: Option<&BTreeSet<String>> = match group {
            Some(g) => match self.groups.get(g) {
                Some(members) => Some(members),
                None => return Vec::new(),
            },
            None => None,
        };

        let mut candidates: Vec<&ConfiguredDeployment> = self
            .deployments
            .values()
            .filter(|c| {
                in_group.map_or(true, |members| members.contains(c.name()))
            })
            .filter(|c| c.deployment.slot_for(model, registry).is_some())
            .collect();

        candidates.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then_with(|| a.name().cmp(b.name()))
        });
        candidates
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ComponentModel, Model};

    fn registry() -> ModelRegistry {
        let mut registry = ModelRegistry::new();
        registry
            .register(Model::Component(ComponentModel::new("video_source")))
            .unwrap();
        registry
            .register(Model::Component(ComponentModel::new("edge_detector")))
            .unwrap();
        registry
    }

    fn configured(name: &str, model: &str, priority: i32) -> ConfiguredDeployment {
        ConfiguredDeployment::new(
            Deployment::new(name).hosting(format!("{name}_task"), model),
            "localhost",
        )
        .with_priority(priority)
    }

    #[test]
    fn test_selection_prefers_priority_then_name() {
        let models = registry();
        let mut deployments = DeploymentRegistry::new();
        deployments.register(configured("beta", "video_source", 0));
        deployments.register(configured("alpha", "video_source", 0));
        deployments.register(configured("gamma", "video_source", 10));

        let selected = deployments
            .select_for("video_source", None, &models)
            .unwrap();
        assert_eq!(selected.name(), "gamma");

        let mut deployments = DeploymentRegistry::new();
        deployments.register(configured("beta", "video_source", 0));
        deployments.register(configured("alpha", "video_source", 0));
        let selected = deployments
            .select_for("video_source", None, &models)
            .unwrap();
        assert_eq!(selected.name(), "alpha");
    }

    #[test]
    fn test_group_restricts_candidates() {
        let models = registry();
        let mut deployments = DeploymentRegistry::new();
        deployments.register(configured("alpha", "video_source", 100));
        deployments.register_in_group(configured("beta", "video_source", 0), "vision");

        let selected = deployments
            .select_for("video_source", Some("vision"), &models)
            .unwrap();
        assert_eq!(selected.name(), "beta");

        assert!(deployments
            .select_for("video_source", Some("missing_group"), &models)
            .is_none());
    }

    #[test]
    fn test_no_deployment_for_unhosted_model() {
        let models = registry();
        let mut deployments = DeploymentRegistry::new();
        deployments.register(configured("alpha", "video_source", 0));
        assert!(deployments
            .select_for("edge_detector", None, &models)
            .is_none());
    }

    #[test]
    fn test_remote_name_mapping() {
        let deployment = Deployment::new("vision")
            .hosting("camera", "video_source")
            .renaming("camera", "vision_camera");
        assert_eq!(deployment.remote_name("camera"), "vision_camera");
        assert_eq!(deployment.remote_name("other"), "other");
    }
}
