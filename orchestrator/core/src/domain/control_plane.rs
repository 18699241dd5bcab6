// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Control Plane Domain Interface
//!
//! Anti-corruption boundary around the external runtime control plane. Every
//! mutating call is fire-and-forget: it returns an initial status or a
//! handle, never a completion guarantee. Completion is observed by polling
//! the `get_*` calls.
//!
//! Adapters live in `crate::infrastructure::control_plane`; the retry-aware
//! wrapper that normalizes errors per intent lives in
//! `crate::application::control_plane_client`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

use crate::domain::runtime::{MemoryId, RuntimeId};

/// Page size used for every list call
pub const PAGE_SIZE: u32 = 20;

/// The five ways a control plane call can fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    AlreadyExists,
    NotFound,
    Throttled,
    Transient,
    Permanent,
}

impl ErrorClass {
    /// Throttled and transient errors are retried under the polling budget
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorClass::Throttled | ErrorClass::Transient)
    }
}

#[derive(Debug, Clone, Error)]
pub enum ControlPlaneError {
    #[error("Resource already exists: {0}")]
    AlreadyExists(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Request throttled: {0}")]
    Throttled(String),

    #[error("Transient control plane error: {0}")]
    Transient(String),

    #[error("Control plane rejected the request: {0}")]
    Permanent(String),

    #[error("Malformed control plane response: {0}")]
    Serialization(String),
}

impl ControlPlaneError {
    pub fn class(&self) -> ErrorClass {
        match self {
            ControlPlaneError::AlreadyExists(_) => ErrorClass::AlreadyExists,
            ControlPlaneError::NotFound(_) => ErrorClass::NotFound,
            ControlPlaneError::Throttled(_) => ErrorClass::Throttled,
            ControlPlaneError::Transient(_) => ErrorClass::Transient,
            ControlPlaneError::Permanent(_) | ControlPlaneError::Serialization(_) => {
                ErrorClass::Permanent
            }
        }
    }
}

impl From<reqwest::Error> for ControlPlaneError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() {
            ControlPlaneError::Transient(err.to_string())
        } else if err.is_decode() {
            ControlPlaneError::Serialization(err.to_string())
        } else {
            ControlPlaneError::Permanent(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ControlPlaneError {
    fn from(err: serde_json::Error) -> Self {
        ControlPlaneError::Serialization(err.to_string())
    }
}

// ============================================================================
// Remote status values
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MemoryStatus {
    Creating,
    Active,
    Failed,
    Deleting,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RuntimeStatus {
    Creating,
    CreateFailed,
    Updating,
    UpdateFailed,
    Ready,
    Deleting,
    #[serde(other)]
    Unknown,
}

/// Endpoints share the runtime's status vocabulary
pub type EndpointStatus = RuntimeStatus;

// ============================================================================
// Descriptions returned by describe / list calls
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryDescription {
    pub id: MemoryId,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arn: Option<String>,
    pub status: MemoryStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeDescription {
    pub agent_runtime_id: RuntimeId,
    pub agent_runtime_name: String,
    pub agent_runtime_arn: String,
    #[serde(default)]
    pub agent_runtime_version: String,
    pub status: RuntimeStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointDescription {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub live_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_version: Option<String>,
    pub status: EndpointStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_token: Option<String>,
}

/// Handle returned by runtime create/update
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeHandle {
    pub agent_runtime_id: RuntimeId,
    pub agent_runtime_arn: String,
    pub agent_runtime_version: String,
    pub status: RuntimeStatus,
}

// ============================================================================
// Requests
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMemoryRequest {
    pub name: String,
    pub event_expiry_duration: u32,
    pub tags: BTreeMap<String, String>,
}

/// Everything a runtime version is built from; shared by create and update
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeSpec {
    pub container_uri: String,
    pub role_arn: String,
    pub network_mode: String,
    pub environment_variables: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRuntimeRequest {
    pub agent_runtime_name: String,
    #[serde(flatten)]
    pub spec: RuntimeSpec,
    pub tags: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateEndpointRequest {
    pub agent_runtime_id: RuntimeId,
    pub name: String,
    pub agent_runtime_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Raw control plane operations. Implementations classify failures but never
/// retry or normalize them.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    async fn create_memory(
        &self,
        request: &CreateMemoryRequest,
    ) -> Result<MemoryDescription, ControlPlaneError>;

    async fn get_memory(&self, memory_id: &MemoryId) -> Result<MemoryDescription, ControlPlaneError>;

    async fn list_memories(
        &self,
        next_token: Option<&str>,
        max_results: u32,
    ) -> Result<Page<MemoryDescription>, ControlPlaneError>;

    async fn delete_memory(&self, memory_id: &MemoryId) -> Result<(), ControlPlaneError>;

    async fn list_runtimes(
        &self,
        next_token: Option<&str>,
        max_results: u32,
    ) -> Result<Page<RuntimeDescription>, ControlPlaneError>;

    async fn create_runtime(
        &self,
        request: &CreateRuntimeRequest,
    ) -> Result<RuntimeHandle, ControlPlaneError>;

    /// Adds a new version to an existing runtime
    async fn update_runtime(
        &self,
        runtime_id: &RuntimeId,
        spec: &RuntimeSpec,
    ) -> Result<RuntimeHandle, ControlPlaneError>;

    /// Describe the runtime, optionally at a specific version
    async fn get_runtime(
        &self,
        runtime_id: &RuntimeId,
        version: Option<&str>,
    ) -> Result<RuntimeDescription, ControlPlaneError>;

    async fn delete_runtime(&self, runtime_id: &RuntimeId) -> Result<(), ControlPlaneError>;

    async fn list_endpoints(
        &self,
        runtime_id: &RuntimeId,
        next_token: Option<&str>,
        max_results: u32,
    ) -> Result<Page<EndpointDescription>, ControlPlaneError>;

    async fn create_endpoint(
        &self,
        request: &CreateEndpointRequest,
    ) -> Result<EndpointDescription, ControlPlaneError>;

    async fn get_endpoint(
        &self,
        runtime_id: &RuntimeId,
        name: &str,
    ) -> Result<EndpointDescription, ControlPlaneError>;

    async fn delete_endpoint(&self, runtime_id: &RuntimeId, name: &str)
        -> Result<(), ControlPlaneError>;

    async fn list_tags(&self, resource_arn: &str)
        -> Result<HashMap<String, String>, ControlPlaneError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classes() {
        assert_eq!(
            ControlPlaneError::AlreadyExists("x".into()).class(),
            ErrorClass::AlreadyExists
        );
        assert_eq!(ControlPlaneError::Serialization("x".into()).class(), ErrorClass::Permanent);
        assert!(ControlPlaneError::Throttled("x".into()).class().is_retryable());
        assert!(!ControlPlaneError::NotFound("x".into()).class().is_retryable());
    }

    #[test]
    fn test_unknown_status_does_not_fail_decoding() {
        let status: RuntimeStatus = serde_json::from_str("\"MIGRATING\"").unwrap();
        assert_eq!(status, RuntimeStatus::Unknown);
        let status: RuntimeStatus = serde_json::from_str("\"CREATE_FAILED\"").unwrap();
        assert_eq!(status, RuntimeStatus::CreateFailed);
    }

    #[test]
    fn test_create_runtime_request_is_flattened() {
        let request = CreateRuntimeRequest {
            agent_runtime_name: "demo".into(),
            spec: RuntimeSpec {
                container_uri: "img".into(),
                role_arn: "role".into(),
                network_mode: "PUBLIC".into(),
                environment_variables: BTreeMap::new(),
            },
            tags: BTreeMap::new(),
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["agentRuntimeName"], "demo");
        assert_eq!(json["containerUri"], "img");
        assert_eq!(json["networkMode"], "PUBLIC");
    }
}
