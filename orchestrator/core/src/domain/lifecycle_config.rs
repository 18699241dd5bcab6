// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Lifecycle Configuration Types
//
// Defines the configuration schema for the runtime lifecycle orchestrator:
// - Kubernetes-style manifest format (apiVersion/kind/metadata/spec)
// - Control plane connection (region, account, endpoint) passed explicitly
//   into the control plane client, never read from ambient process state
// - Deployment ownership tags and runtime image settings
// - Polling budgets and fan-out
// - Registry, notification and observability backends

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const API_VERSION: &str = "agentruntime.io/v1";
pub const KIND: &str = "LifecycleConfig";

/// Top-level Kubernetes-style lifecycle configuration manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleConfigManifest {
    /// API version (must be "agentruntime.io/v1")
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Resource kind (must be "LifecycleConfig")
    pub kind: String,

    pub metadata: ManifestMetadata,

    pub spec: LifecycleConfigSpec,
}

/// Manifest metadata (Kubernetes-style)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestMetadata {
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LifecycleConfigSpec {
    #[serde(default)]
    pub control_plane: ControlPlaneConfig,

    #[serde(default)]
    pub deployment: DeploymentConfig,

    #[serde(default)]
    pub polling: PollingConfig,

    #[serde(default)]
    pub registry: RegistryConfig,

    #[serde(default)]
    pub notifications: NotificationConfig,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub observability: Option<ObservabilityConfig>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlPlaneBackend {
    Http,
    /// In-process control plane, for local runs and tests
    #[default]
    Simulated,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlPlaneConfig {
    #[serde(default)]
    pub backend: ControlPlaneBackend,

    /// Base URL of the control plane REST API (required for `http`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    #[serde(default = "default_region")]
    pub region: String,

    #[serde(default = "default_account_id")]
    pub account_id: String,

    /// Per-request timeout for control plane calls
    #[serde(default = "default_request_timeout", with = "humantime_serde")]
    pub request_timeout: Duration,
}

impl Default for ControlPlaneConfig {
    fn default() -> Self {
        Self {
            backend: ControlPlaneBackend::default(),
            endpoint: None,
            region: default_region(),
            account_id: default_account_id(),
            request_timeout: default_request_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentConfig {
    /// Value of the `Stack` ownership tag
    #[serde(default = "default_stack_tag")]
    pub stack_tag: String,

    /// Value of the `Environment` ownership tag; omitted from tags when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub environment_tag: Option<String>,

    #[serde(default = "default_role_arn")]
    pub role_arn: String,

    #[serde(default = "default_container_uri")]
    pub container_uri: String,

    /// Image used for `swarm` architecture runtimes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub swarm_container_uri: Option<String>,

    #[serde(default = "default_network_mode")]
    pub network_mode: String,

    /// Retention of short-term memory events
    #[serde(default = "default_memory_event_expiry_days")]
    pub memory_event_expiry_days: u32,

    /// Extra environment variables passed to every runtime version
    #[serde(default)]
    pub runtime_environment: BTreeMap<String, String>,
}

impl Default for DeploymentConfig {
    fn default() -> Self {
        Self {
            stack_tag: default_stack_tag(),
            environment_tag: None,
            role_arn: default_role_arn(),
            container_uri: default_container_uri(),
            swarm_container_uri: None,
            network_mode: default_network_mode(),
            memory_event_expiry_days: default_memory_event_expiry_days(),
            runtime_environment: BTreeMap::new(),
        }
    }
}

impl DeploymentConfig {
    /// The ownership tags stamped on every memory and runtime
    pub fn ownership_tags(&self) -> BTreeMap<String, String> {
        let mut tags = BTreeMap::new();
        tags.insert("Stack".to_string(), self.stack_tag.clone());
        if let Some(environment) = &self.environment_tag {
            tags.insert("Environment".to_string(), environment.clone());
        }
        tags
    }

    /// Whether a remote resource's tags say it belongs to this deployment
    pub fn owns(&self, tags: &HashMap<String, String>) -> bool {
        tags.get("Stack") == Some(&self.stack_tag)
            && tags.get("Environment") == self.environment_tag.as_ref()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    #[serde(default = "default_initial_delay", with = "humantime_serde")]
    pub initial_delay: Duration,

    #[serde(default = "default_max_delay", with = "humantime_serde")]
    pub max_delay: Duration,

    #[serde(default = "default_multiplier")]
    pub multiplier: f64,

    /// Cumulative wait allowed per polling state
    #[serde(default = "default_budget", with = "humantime_serde")]
    pub budget: Duration,

    /// How long a check may see "not found" right after a start call
    #[serde(default = "default_propagation_grace", with = "humantime_serde")]
    pub propagation_grace: Duration,

    /// Concurrent endpoint deletions per run
    #[serde(default = "default_endpoint_fan_out")]
    pub endpoint_fan_out: usize,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            multiplier: default_multiplier(),
            budget: default_budget(),
            propagation_grace: default_propagation_grace(),
            endpoint_fan_out: default_endpoint_fan_out(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum RegistryConfig {
    #[default]
    InMemory,
    Postgres {
        /// Supports "env:VAR_NAME"
        connection_string: String,
        #[serde(default = "default_max_connections")]
        max_connections: u32,
    },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum NotificationConfig {
    #[default]
    EventBus,
    Webhook {
        url: String,
        #[serde(default = "default_request_timeout", with = "humantime_serde")]
        timeout: Duration,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level (e.g., "info", "debug", "trace")
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Prometheus exporter port; no exporter when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics_port: Option<u16>,
}

impl Default for LifecycleConfigManifest {
    fn default() -> Self {
        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            metadata: ManifestMetadata {
                name: "agent-runtime-orchestrator".to_string(),
                version: Some("1.0.0".to_string()),
                labels: None,
            },
            spec: LifecycleConfigSpec::default(),
        }
    }
}

impl LifecycleConfigManifest {
    /// Load configuration from YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to YAML file
    pub fn to_yaml_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Discover configuration file using precedence order
    /// 1. ARO_CONFIG_PATH environment variable
    /// 2. ./aro-config.yaml (working directory)
    /// 3. ~/.aro/config.yaml (user home)
    /// 4. /etc/aro/config.yaml (system, Unix) or C:\ProgramData\Aro\config.yaml (Windows)
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("ARO_CONFIG_PATH") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./aro-config.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".aro").join("config.yaml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        #[cfg(unix)]
        let system_config = PathBuf::from("/etc/aro/config.yaml");
        #[cfg(windows)]
        let system_config = PathBuf::from("C:\\ProgramData\\Aro\\config.yaml");

        if system_config.exists() {
            return Some(system_config);
        }

        None
    }

    /// Load configuration with discovery, fallback to default
    pub fn load_or_default(cli_path: Option<PathBuf>) -> anyhow::Result<Self> {
        // Explicit CLI path fails if missing or invalid
        if let Some(path) = cli_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            let mut config = Self::from_yaml_file(&path).map_err(|e| {
                anyhow::anyhow!("Failed to load config at {:?}: {}", path, e)
            })?;
            config.apply_env_overrides();
            return Ok(config);
        }

        if let Some(config_path) = Self::discover_config() {
            tracing::info!("Loading configuration from discovered path: {:?}", config_path);
            let mut config = Self::from_yaml_file(config_path)?;
            config.apply_env_overrides();
            Ok(config)
        } else {
            tracing::warn!("No configuration file found in standard locations. Using defaults.");
            let mut config = Self::default();
            config.apply_env_overrides();
            Ok(config)
        }
    }

    /// Apply environment variable overrides to configuration
    /// This allows container deployments to override config via env vars
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("ARO_CONTROL_PLANE_ENDPOINT") {
            tracing::info!("Environment override: ARO_CONTROL_PLANE_ENDPOINT={}", val);
            self.spec.control_plane.endpoint = Some(val);
            self.spec.control_plane.backend = ControlPlaneBackend::Http;
        }

        if let Ok(val) = std::env::var("ARO_REGION") {
            tracing::info!("Environment override: ARO_REGION={}", val);
            self.spec.control_plane.region = val;
        }

        if let Ok(val) = std::env::var("ARO_ACCOUNT_ID") {
            tracing::info!("Environment override: ARO_ACCOUNT_ID={}", val);
            self.spec.control_plane.account_id = val;
        }

        if let Ok(val) = std::env::var("ARO_DATABASE_URL") {
            tracing::info!("Environment override: ARO_DATABASE_URL=<redacted>");
            self.spec.registry = RegistryConfig::Postgres {
                connection_string: val,
                max_connections: default_max_connections(),
            };
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_version != API_VERSION {
            anyhow::bail!(
                "Invalid apiVersion: '{}'. Must be '{}'",
                self.api_version,
                API_VERSION
            );
        }

        if self.kind != KIND {
            anyhow::bail!("Invalid kind: '{}'. Must be '{}'", self.kind, KIND);
        }

        if self.metadata.name.is_empty() {
            anyhow::bail!("metadata.name cannot be empty");
        }

        let control_plane = &self.spec.control_plane;
        if control_plane.backend == ControlPlaneBackend::Http
            && control_plane.endpoint.as_deref().map_or(true, str::is_empty)
        {
            anyhow::bail!("spec.control_plane.endpoint is required for the http backend");
        }
        if control_plane.region.is_empty() {
            anyhow::bail!("spec.control_plane.region cannot be empty");
        }
        if control_plane.account_id.is_empty() {
            anyhow::bail!("spec.control_plane.account_id cannot be empty");
        }

        let deployment = &self.spec.deployment;
        if deployment.stack_tag.is_empty() {
            anyhow::bail!("spec.deployment.stack_tag cannot be empty");
        }
        if deployment.environment_tag.as_deref() == Some("") {
            anyhow::bail!("spec.deployment.environment_tag cannot be empty when set");
        }
        if deployment.container_uri.is_empty() {
            anyhow::bail!("spec.deployment.container_uri cannot be empty");
        }

        let polling = &self.spec.polling;
        if polling.initial_delay.is_zero() || polling.max_delay.is_zero() {
            anyhow::bail!("spec.polling delays must be greater than zero");
        }
        if polling.max_delay < polling.initial_delay {
            anyhow::bail!("spec.polling.max_delay cannot be smaller than initial_delay");
        }
        if polling.multiplier < 1.0 {
            anyhow::bail!("spec.polling.multiplier must be at least 1.0");
        }
        if polling.budget.is_zero() {
            anyhow::bail!("spec.polling.budget must be greater than zero");
        }
        if polling.endpoint_fan_out == 0 {
            anyhow::bail!("spec.polling.endpoint_fan_out must be greater than zero");
        }

        if let RegistryConfig::Postgres { connection_string, .. } = &self.spec.registry {
            if connection_string.is_empty() {
                anyhow::bail!("spec.registry.connection_string cannot be empty");
            }
        }

        if let NotificationConfig::Webhook { url, .. } = &self.spec.notifications {
            url::Url::parse(url)
                .map_err(|e| anyhow::anyhow!("Invalid spec.notifications.url '{}': {}", url, e))?;
        }

        Ok(())
    }
}

/// Resolve "env:VAR_NAME" indirections used for secrets in the manifest
pub fn resolve_env_value(value: &str) -> anyhow::Result<String> {
    match value.strip_prefix("env:") {
        Some(var) => std::env::var(var)
            .map_err(|_| anyhow::anyhow!("Environment variable '{}' is not set", var)),
        None => Ok(value.to_string()),
    }
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_account_id() -> String {
    "000000000000".to_string()
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_stack_tag() -> String {
    "agent-runtime".to_string()
}

fn default_role_arn() -> String {
    "arn:aws:iam::000000000000:role/agent-runtime".to_string()
}

fn default_container_uri() -> String {
    "agent-runtime:latest".to_string()
}

fn default_network_mode() -> String {
    "PUBLIC".to_string()
}

fn default_memory_event_expiry_days() -> u32 {
    90
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(5)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(60)
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_budget() -> Duration {
    Duration::from_secs(15 * 60)
}

fn default_propagation_grace() -> Duration {
    Duration::from_secs(30)
}

fn default_endpoint_fan_out() -> usize {
    4
}

fn default_max_connections() -> u32 {
    5
}

fn default_log_level() -> String {
    "info".to_string()
}
