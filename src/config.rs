//! # Configuration Manager
//!
//! YAML-driven configuration for the orchestration engine with
//! environment-specific overlays.
//!
//! ## Configuration Structure
//!
//! ```yaml
//! # composer-config.yaml
//! execution:
//!   max_operations_per_cycle: 256
//!
//! auto_restart:
//!   enabled: true
//!
//! process:
//!   spawn_timeout_seconds: 30
//!   stop_timeout_seconds: 10
//!
//! property_defaults:
//!   video_source:
//!     frame_rate: 30
//!
//! environments:
//!   test:
//!     process:
//!       spawn_timeout_seconds: 2
//! ```
//!
//! The `property_defaults` section is the layer `reload_config` refreshes at
//! runtime without triggering a redeploy: per-model property values merged
//! under task-specific arguments when properties are committed.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::error::{ComposerError, Result};

/// Execution settings for the reconciliation cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Upper bound on operations executed in a single cycle; the remainder
    /// is deferred to the next cycle
    pub max_operations_per_cycle: usize,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            max_operations_per_cycle: 256,
        }
    }
}

/// Quarantine auto-restart policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoRestartConfig {
    /// When enabled, a quarantined task gets exactly one automatic
    /// clear-and-respawn per quarantine episode
    pub enabled: bool,
}

impl Default for AutoRestartConfig {
    fn default() -> Self {
        Self { enabled: false }
    }
}

/// Deployment process handling settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessConfig {
    pub spawn_timeout_seconds: u64,
    pub stop_timeout_seconds: u64,
    /// Escalate to a hard kill when a clean stop exceeds the stop timeout
    pub kill_hard_on_timeout: bool,
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            spawn_timeout_seconds: 30,
            stop_timeout_seconds: 10,
            kill_hard_on_timeout: true,
        }
    }
}

/// Complete engine configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ComposerConfig {
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub auto_restart: AutoRestartConfig,
    #[serde(default)]
    pub process: ProcessConfig,
    /// Per-model property defaults: model name -> property name -> value
    #[serde(default)]
    pub property_defaults: BTreeMap<String, BTreeMap<String, Value>>,
    /// Environment-specific overlays applied over the base document
    #[serde(default)]
    pub environments: BTreeMap<String, ConfigOverlay>,
}

/// Partial configuration used for environment overlays
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ConfigOverlay {
    pub execution: Option<ExecutionConfig>,
    pub auto_restart: Option<AutoRestartConfig>,
    pub process: Option<ProcessConfig>,
    pub property_defaults: Option<BTreeMap<String, BTreeMap<String, Value>>>,
}

impl ComposerConfig {
    /// Apply the overlay for the given environment, if one is declared
    fn apply_environment(&mut self, environment: &str) {
        let Some(overlay) = self.environments.remove(environment) else {
            return;
        };
        if let Some(execution) = overlay.execution {
            self.execution = execution;
        }
        if let Some(auto_restart) = overlay.auto_restart {
            self.auto_restart = auto_restart;
        }
        if let Some(process) = overlay.process {
            self.process = process;
        }
        if let Some(defaults) = overlay.property_defaults {
            self.property_defaults = defaults;
        }
    }

    /// Property defaults declared for a model, if any
    pub fn property_defaults_for(&self, model: &str) -> Option<&BTreeMap<String, Value>> {
        self.property_defaults.get(model)
    }
}

/// Loads and owns the engine configuration, tracking the source path so the
/// property-defaults layer can be reloaded at runtime.
#[derive(Debug, Clone)]
pub struct ConfigurationManager {
    config: ComposerConfig,
    source_path: Option<PathBuf>,
    environment: String,
}

impl ConfigurationManager {
    /// Create a manager around explicit configuration (no backing file)
    pub fn new(config: ComposerConfig) -> Self {
        Self {
            config,
            source_path: None,
            environment: detect_environment(),
        }
    }

    /// Load configuration from a YAML file, applying the overlay for the
    /// current environment
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let environment = detect_environment();
        let config = read_config(path, &environment)?;

        info!(
            path = %path.display(),
            environment = %environment,
            "⚙️ CONFIG: Loaded configuration"
        );

        Ok(Self {
            config,
            source_path: Some(path.to_path_buf()),
            environment,
        })
    }

    /// Configuration optimized for tests: tight timeouts, auto-restart off
    pub fn for_testing() -> Self {
        let config = ComposerConfig {
            process: ProcessConfig {
                spawn_timeout_seconds: 2,
                stop_timeout_seconds: 1,
                kill_hard_on_timeout: true,
            },
            ..ComposerConfig::default()
        };
        Self {
            config,
            source_path: None,
            environment: "test".to_string(),
        }
    }

    pub fn config(&self) -> &ComposerConfig {
        &self.config
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// Re-read only the property-defaults layer from the backing file.
    ///
    /// Used by the `reload_config` operator command: defaults change without
    /// a redeploy, and the reconciler picks them up on its next property
    /// synchronization pass.
    pub fn reload_property_defaults(&mut self) -> Result<usize> {
        let Some(path) = self.source_path.clone() else {
            return Err(ComposerError::configuration(
                "no configuration file to reload property defaults from",
            ));
        };
        let fresh = read_config(&path, &self.environment)?;
        self.config.property_defaults = fresh.property_defaults;

        let models = self.config.property_defaults.len();
        debug!(
            path = %path.display(),
            models = models,
            "⚙️ CONFIG: Reloaded property defaults"
        );
        Ok(models)
    }
}

fn read_config(path: &Path, environment: &str) -> Result<ComposerConfig> {
    let raw = std::fs::read_to_string(path).map_err(|e| {
        ComposerError::configuration(format!(
            "cannot read configuration file {}: {e}",
            path.display()
        ))
    })?;
    let mut config: ComposerConfig = serde_yaml::from_str(&raw).map_err(|e| {
        ComposerError::configuration(format!(
            "invalid configuration file {}: {e}",
            path.display()
        ))
    })?;
    config.apply_environment(environment);
    Ok(config)
}

fn detect_environment() -> String {
    std::env::var("COMPOSER_ENV")
        .or_else(|_| std::env::var("APP_ENV"))
        .unwrap_or_else(|_| "development".to_string())
}
