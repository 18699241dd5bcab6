// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Runtime Registry Records
//!
//! The two persisted aggregates owned by the orchestrator:
//!
//! | Aggregate | Key | Mutability |
//! |-----------|-----|------------|
//! | [`RuntimeVersion`] | (agent name, created-at) | immutable, removed only on full teardown |
//! | [`RuntimeSummary`] | agent name | mutated by every step, doubles as workflow checkpoint |
//!
//! `created-at` is a [`VersionKey`]: the first 53 bits of the SHA-256 of the
//! submitted configuration bytes. It never depends on the wall clock, so a
//! resubmitted configuration always lands on the same record.
//!
//! ⚠️ The truncation to 53 bits keeps the key inside the exactly representable
//! integer range of the numeric sort key. Two distinct configurations can in
//! principle collide on the same key; the probability is negligible for the
//! version counts a single agent accumulates, but it is not zero.

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::lifecycle::{LifecyclePhase, WorkflowKind};

/// Width of the numeric version key
pub const VERSION_KEY_BITS: u32 = 53;

/// Qualifier of the implicit endpoint that always tracks the newest version
pub const DEFAULT_QUALIFIER: &str = "DEFAULT";

fn resource_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[a-zA-Z][a-zA-Z0-9_]{0,47}$").expect("resource name pattern is valid")
    })
}

/// Validate an endpoint qualifier against the control plane's naming rules
pub fn validate_endpoint_name(name: &str) -> Result<(), RuntimeError> {
    if resource_name_pattern().is_match(name) {
        Ok(())
    } else {
        Err(RuntimeError::InvalidEndpointName(name.to_string()))
    }
}

// ============================================================================
// Identifiers
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AgentName(String);

impl AgentName {
    pub fn new(name: impl Into<String>) -> Result<Self, RuntimeError> {
        let name = name.into();
        if !resource_name_pattern().is_match(&name) {
            return Err(RuntimeError::InvalidAgentName(name));
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Name requested when creating the agent's memory resource
    pub fn memory_name(&self) -> String {
        format!("{}Memory", self.0)
    }

    /// Prefix of every memory id the control plane assigns to that name
    pub fn memory_id_prefix(&self) -> String {
        format!("{}Memory-", self.0)
    }
}

impl TryFrom<String> for AgentName {
    type Error = RuntimeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<AgentName> for String {
    fn from(name: AgentName) -> Self {
        name.0
    }
}

impl fmt::Display for AgentName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuntimeId(pub String);

impl RuntimeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RuntimeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemoryId(pub String);

impl MemoryId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MemoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Deterministic created-at key of a runtime version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionKey(pub u64);

impl VersionKey {
    /// Derive the key from raw configuration bytes
    pub fn derive(bytes: &[u8]) -> Self {
        let digest = Sha256::digest(bytes);
        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&digest[..8]);
        Self(u64::from_be_bytes(prefix) >> (64 - VERSION_KEY_BITS))
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for VersionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Configuration value
// ============================================================================

/// Serialized agent configuration as submitted by the caller.
///
/// The orchestrator treats the content as opaque except for the `useMemory`
/// flag, which decides whether the Create workflow provisions memory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ConfigurationValue {
    raw: String,
    requires_memory: bool,
}

impl ConfigurationValue {
    pub fn new(raw: impl Into<String>) -> Result<Self, RuntimeError> {
        let raw = raw.into();
        let parsed: serde_json::Value = serde_json::from_str(&raw)
            .map_err(|e| RuntimeError::InvalidConfiguration(e.to_string()))?;
        if !parsed.is_object() {
            return Err(RuntimeError::InvalidConfiguration(
                "configuration must be a JSON object".to_string(),
            ));
        }
        let requires_memory = parsed
            .get("useMemory")
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false);
        Ok(Self { raw, requires_memory })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn requires_memory(&self) -> bool {
        self.requires_memory
    }

    pub fn version_key(&self) -> VersionKey {
        VersionKey::derive(self.raw.as_bytes())
    }
}

impl TryFrom<String> for ConfigurationValue {
    type Error = RuntimeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ConfigurationValue> for String {
    fn from(value: ConfigurationValue) -> Self {
        value.raw
    }
}

/// Which container image family the runtime is built from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ArchitectureType {
    #[default]
    Single,
    Swarm,
}

impl FromStr for ArchitectureType {
    type Err = RuntimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "single" => Ok(ArchitectureType::Single),
            "swarm" => Ok(ArchitectureType::Swarm),
            other => Err(RuntimeError::InvalidConfiguration(format!(
                "unknown architecture type '{}'. Supported: single, swarm",
                other
            ))),
        }
    }
}

// ============================================================================
// Aggregate: RuntimeVersion
// ============================================================================

/// One immutable record per successfully created runtime version
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeVersion {
    pub agent_name: AgentName,
    pub created_at: VersionKey,
    pub runtime_id: RuntimeId,
    pub runtime_arn: String,
    pub runtime_version: String,
    pub configuration: ConfigurationValue,
    #[serde(default)]
    pub architecture: ArchitectureType,
    /// Informational only; never part of the key
    pub recorded_at: DateTime<Utc>,
}

// ============================================================================
// Aggregate: RuntimeSummary
// ============================================================================

/// How a run attached itself to the summary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStart {
    /// Started at the workflow's initial phase
    Fresh,
    /// Picked up a non-terminal run of the same kind at its persisted phase
    Resumed(LifecyclePhase),
}

/// Arguments of an endpoint run, kept so a resumed run can tell whether it
/// was submitted for the same endpoints
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RunTarget {
    /// Sorted and deduplicated; empty means every named endpoint
    Endpoints { names: Vec<String> },
    Tag {
        qualifier: String,
        runtime_version: String,
    },
}

impl RunTarget {
    pub fn endpoints(names: &[String]) -> Self {
        let mut names = names.to_vec();
        names.sort();
        names.dedup();
        Self::Endpoints { names }
    }
}

/// Per-agent status record and workflow checkpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeSummary {
    pub agent_name: AgentName,
    pub workflow: Option<WorkflowKind>,
    pub phase: LifecyclePhase,
    pub run_id: Option<Uuid>,

    /// Version key of the Create run in flight
    pub version_key: Option<VersionKey>,
    /// Endpoints or tag target of the endpoint run in flight
    #[serde(default)]
    pub run_target: Option<RunTarget>,
    pub memory_id: Option<MemoryId>,
    pub runtime_id: Option<RuntimeId>,
    pub runtime_arn: Option<String>,
    /// Runtime version started but not yet seeded
    pub pending_runtime_version: Option<String>,
    /// Endpoint names still awaiting deletion (or, for tagging, creation)
    #[serde(default)]
    pub pending_endpoints: Vec<String>,

    #[serde(default)]
    pub number_of_versions: u32,
    #[serde(default)]
    pub qualifier_to_version: BTreeMap<String, String>,

    pub last_error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl RuntimeSummary {
    pub fn new(agent_name: AgentName) -> Self {
        Self {
            agent_name,
            workflow: None,
            phase: LifecyclePhase::Completed,
            run_id: None,
            version_key: None,
            run_target: None,
            memory_id: None,
            runtime_id: None,
            runtime_arn: None,
            pending_runtime_version: None,
            pending_endpoints: Vec::new(),
            number_of_versions: 0,
            qualifier_to_version: BTreeMap::new(),
            last_error: None,
            updated_at: Utc::now(),
        }
    }

    pub fn is_in_flight(&self) -> bool {
        !self.phase.is_terminal()
    }

    pub fn status(&self) -> &'static str {
        self.phase.status_label(self.workflow)
    }

    /// Attach a new run. A non-terminal run of another kind blocks the
    /// submission; a non-terminal run of the same kind is resumed.
    pub fn begin(&mut self, kind: WorkflowKind, run_id: Uuid) -> Result<RunStart, RuntimeError> {
        if self.is_in_flight() {
            match self.workflow {
                Some(current) if current == kind => {
                    self.run_id = Some(run_id);
                    self.touch();
                    return Ok(RunStart::Resumed(self.phase));
                }
                current => {
                    return Err(RuntimeError::WorkflowInProgress {
                        agent_name: self.agent_name.to_string(),
                        workflow: current,
                        phase: self.phase,
                    })
                }
            }
        }
        self.restart(kind, run_id);
        Ok(RunStart::Fresh)
    }

    /// Discard whatever run was attached and start `kind` from its initial phase
    pub fn restart(&mut self, kind: WorkflowKind, run_id: Uuid) {
        self.workflow = Some(kind);
        self.phase = kind.initial_phase();
        self.run_id = Some(run_id);
        self.last_error = None;
        self.pending_endpoints.clear();
        self.run_target = None;
        if kind != WorkflowKind::Create {
            self.version_key = None;
            self.pending_runtime_version = None;
        }
        self.touch();
    }

    /// Move to `next`. Re-entering the current phase is a retry and allowed;
    /// moving backwards or into another workflow's phase is not.
    pub fn enter_phase(&mut self, next: LifecyclePhase) -> Result<(), RuntimeError> {
        let kind = self.workflow.ok_or(RuntimeError::NoActiveWorkflow)?;
        if next < self.phase || !next.belongs_to(kind) {
            return Err(RuntimeError::InvalidPhaseTransition {
                from: self.phase,
                to: next,
            });
        }
        self.phase = next;
        self.touch();
        Ok(())
    }

    pub fn complete(&mut self) {
        self.phase = LifecyclePhase::Completed;
        self.last_error = None;
        self.touch();
    }

    pub fn fail(&mut self, reason: impl Into<String>) {
        self.phase = LifecyclePhase::Failed;
        self.last_error = Some(reason.into());
        self.touch();
    }

    pub fn partially_fail(&mut self, reason: impl Into<String>) {
        self.phase = LifecyclePhase::PartiallyFailed;
        self.last_error = Some(reason.into());
        self.touch();
    }

    /// Bookkeeping after a version has been written to the registry
    pub fn record_seeded_version(&mut self, version: &RuntimeVersion) {
        self.number_of_versions = self.number_of_versions.saturating_add(1);
        self.qualifier_to_version
            .insert(DEFAULT_QUALIFIER.to_string(), version.runtime_version.clone());
        self.runtime_id = Some(version.runtime_id.clone());
        self.runtime_arn = Some(version.runtime_arn.clone());
        self.pending_runtime_version = None;
        self.touch();
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("Invalid agent name '{0}': must match [a-zA-Z][a-zA-Z0-9_]{{0,47}}")]
    InvalidAgentName(String),

    #[error("Invalid endpoint name '{0}': must match [a-zA-Z][a-zA-Z0-9_]{{0,47}}")]
    InvalidEndpointName(String),

    #[error("Invalid configuration value: {0}")]
    InvalidConfiguration(String),

    #[error("Agent {agent_name} already has a {workflow:?} workflow in phase {phase}")]
    WorkflowInProgress {
        agent_name: String,
        workflow: Option<WorkflowKind>,
        phase: LifecyclePhase,
    },

    #[error("Invalid phase transition from {from} to {to}")]
    InvalidPhaseTransition {
        from: LifecyclePhase,
        to: LifecyclePhase,
    },

    #[error("No workflow is attached to this summary")]
    NoActiveWorkflow,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agent(name: &str) -> AgentName {
        AgentName::new(name).unwrap()
    }

    #[test]
    fn test_agent_name_validation() {
        assert!(AgentName::new("demo").is_ok());
        assert!(AgentName::new("my_agent_2").is_ok());
        assert!(AgentName::new("").is_err());
        assert!(AgentName::new("2fast").is_err());
        assert!(AgentName::new("has-dash").is_err());
        assert!(AgentName::new("a".repeat(49)).is_err());
    }

    #[test]
    fn test_agent_name_deserialization_is_validated() {
        let ok: Result<AgentName, _> = serde_json::from_str("\"demo\"");
        assert!(ok.is_ok());
        let bad: Result<AgentName, _> = serde_json::from_str("\"not valid\"");
        assert!(bad.is_err());
    }

    #[test]
    fn test_memory_naming() {
        let name = agent("demo");
        assert_eq!(name.memory_name(), "demoMemory");
        assert_eq!(name.memory_id_prefix(), "demoMemory-");
    }

    #[test]
    fn test_version_key_is_deterministic_and_53_bits() {
        let a = ConfigurationValue::new(r#"{"model":"x"}"#).unwrap();
        let b = ConfigurationValue::new(r#"{"model":"x"}"#).unwrap();
        let c = ConfigurationValue::new(r#"{"model":"y"}"#).unwrap();

        assert_eq!(a.version_key(), b.version_key());
        assert_ne!(a.version_key(), c.version_key());
        assert!(a.version_key().value() < (1u64 << VERSION_KEY_BITS));
    }

    #[test]
    fn test_version_key_matches_hash_prefix() {
        let raw = r#"{"model":"x"}"#;
        let digest = Sha256::digest(raw.as_bytes());
        let hex_prefix = hex::encode(&digest[..8]);
        let expected = u64::from_str_radix(&hex_prefix, 16).unwrap() >> 11;
        assert_eq!(VersionKey::derive(raw.as_bytes()).value(), expected);
    }

    #[test]
    fn test_configuration_memory_flag() {
        let no_memory = ConfigurationValue::new(r#"{"model":"x"}"#).unwrap();
        let with_memory = ConfigurationValue::new(r#"{"model":"x","useMemory":true}"#).unwrap();
        assert!(!no_memory.requires_memory());
        assert!(with_memory.requires_memory());
    }

    #[test]
    fn test_configuration_must_be_json_object() {
        assert!(ConfigurationValue::new("not json").is_err());
        assert!(ConfigurationValue::new("[1,2]").is_err());
    }

    #[test]
    fn test_architecture_parsing() {
        assert_eq!("swarm".parse::<ArchitectureType>().unwrap(), ArchitectureType::Swarm);
        assert_eq!("SINGLE".parse::<ArchitectureType>().unwrap(), ArchitectureType::Single);
        assert!("cluster".parse::<ArchitectureType>().is_err());
    }

    #[test]
    fn test_summary_phase_transitions_are_monotonic() {
        let mut summary = RuntimeSummary::new(agent("demo"));
        summary.begin(WorkflowKind::Create, Uuid::new_v4()).unwrap();
        assert_eq!(summary.phase, LifecyclePhase::Init);

        summary.enter_phase(LifecyclePhase::CreateRuntime).unwrap();
        // Retrying the same phase is allowed
        summary.enter_phase(LifecyclePhase::CreateRuntime).unwrap();
        // Going back is not
        assert!(summary.enter_phase(LifecyclePhase::EnsureMemory).is_err());
        // Neither is jumping into another workflow
        assert!(summary.enter_phase(LifecyclePhase::DeleteRuntime).is_err());
    }

    #[test]
    fn test_in_flight_run_blocks_other_kinds_and_resumes_same_kind() {
        let mut summary = RuntimeSummary::new(agent("demo"));
        summary.begin(WorkflowKind::Create, Uuid::new_v4()).unwrap();
        summary.enter_phase(LifecyclePhase::AwaitRuntime).unwrap();

        let blocked = summary.begin(WorkflowKind::Delete, Uuid::new_v4());
        assert!(matches!(blocked, Err(RuntimeError::WorkflowInProgress { .. })));

        let resumed = summary.begin(WorkflowKind::Create, Uuid::new_v4()).unwrap();
        assert_eq!(resumed, RunStart::Resumed(LifecyclePhase::AwaitRuntime));
    }

    #[test]
    fn test_endpoint_target_ignores_order_and_duplicates() {
        let a = RunTarget::endpoints(&["green".to_string(), "blue".to_string(), "blue".to_string()]);
        let b = RunTarget::endpoints(&["blue".to_string(), "green".to_string()]);
        assert_eq!(a, b);
        assert_ne!(a, RunTarget::endpoints(&["blue".to_string()]));

        let mut summary = RuntimeSummary::new(agent("demo"));
        summary.begin(WorkflowKind::DeleteEndpoints, Uuid::new_v4()).unwrap();
        summary.run_target = Some(a);
        summary.restart(WorkflowKind::DeleteEndpoints, Uuid::new_v4());
        assert!(summary.run_target.is_none());
    }

    #[test]
    fn test_terminal_summary_accepts_new_run() {
        let mut summary = RuntimeSummary::new(agent("demo"));
        summary.begin(WorkflowKind::Create, Uuid::new_v4()).unwrap();
        summary.fail("boom");
        assert_eq!(summary.status(), "Failed");

        let start = summary.begin(WorkflowKind::Delete, Uuid::new_v4()).unwrap();
        assert_eq!(start, RunStart::Fresh);
        assert_eq!(summary.phase, LifecyclePhase::ListEndpoints);
        assert!(summary.last_error.is_none());
    }

    #[test]
    fn test_seeded_version_bookkeeping() {
        let mut summary = RuntimeSummary::new(agent("demo"));
        let configuration = ConfigurationValue::new(r#"{"model":"x"}"#).unwrap();
        let version = RuntimeVersion {
            agent_name: agent("demo"),
            created_at: configuration.version_key(),
            runtime_id: RuntimeId::new("rt-1"),
            runtime_arn: "arn:runtime/rt-1".to_string(),
            runtime_version: "3".to_string(),
            configuration,
            architecture: ArchitectureType::Single,
            recorded_at: Utc::now(),
        };
        summary.pending_runtime_version = Some("3".to_string());
        summary.record_seeded_version(&version);

        assert_eq!(summary.number_of_versions, 1);
        assert_eq!(summary.qualifier_to_version.get(DEFAULT_QUALIFIER).map(String::as_str), Some("3"));
        assert!(summary.pending_runtime_version.is_none());
        assert_eq!(summary.runtime_id, Some(RuntimeId::new("rt-1")));
    }
}
