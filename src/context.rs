//! # Orchestrator Context
//!
//! One explicit struct holding what used to be ambient global state: the
//! model registry, the configured deployments, and the engine configuration.
//! Created at orchestrator startup, passed by reference to the generation and
//! reconciliation engines, torn down at shutdown.

use crate::config::ConfigurationManager;
use crate::deployment::DeploymentRegistry;
use crate::model::ModelRegistry;

/// Shared, read-mostly state of one orchestrator instance.
///
/// The model registry is immutable after load; the deployment registry is
/// only mutated between cycles; configuration is replaced wholesale by
/// `reload_config`.
#[derive(Debug)]
pub struct OrchestratorContext {
    pub models: ModelRegistry,
    pub deployments: DeploymentRegistry,
    pub configuration: ConfigurationManager,
}

impl OrchestratorContext {
    pub fn new(
        models: ModelRegistry,
        deployments: DeploymentRegistry,
        configuration: ConfigurationManager,
    ) -> Self {
        Self {
            models,
            deployments,
            configuration,
        }
    }

    /// Context with empty registries and test configuration
    pub fn for_testing() -> Self {
        Self {
            models: ModelRegistry::new(),
            deployments: DeploymentRegistry::new(),
            configuration: ConfigurationManager::for_testing(),
        }
    }
}
