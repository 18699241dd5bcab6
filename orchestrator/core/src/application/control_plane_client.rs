// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Control Plane Client
//!
//! Wraps a raw [`ControlPlane`] adapter and normalizes its errors per intent:
//! `AlreadyExists` is success for creates, `NotFound` is success for deletes.
//! It also owns the deployment-specific knowledge (ownership tags, runtime
//! image, role, environment) and the pagination of every list call.
//!
//! The client holds no state between calls.

use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::domain::control_plane::{
    ControlPlane, ControlPlaneError, CreateEndpointRequest, CreateMemoryRequest,
    CreateRuntimeRequest, EndpointDescription, MemoryDescription, MemoryStatus,
    RuntimeDescription, RuntimeHandle, RuntimeSpec, PAGE_SIZE,
};
use crate::domain::lifecycle_config::{ControlPlaneConfig, DeploymentConfig};
use crate::domain::runtime::{
    AgentName, ArchitectureType, MemoryId, RuntimeId, VersionKey, DEFAULT_QUALIFIER,
};

/// Everything the client needs to build one runtime version
#[derive(Debug, Clone)]
pub struct RuntimeVersionInput<'a> {
    pub agent_name: &'a AgentName,
    pub version_key: VersionKey,
    pub architecture: ArchitectureType,
    pub memory_id: Option<&'a MemoryId>,
}

pub struct ControlPlaneClient {
    control_plane: Arc<dyn ControlPlane>,
    deployment: DeploymentConfig,
    account_id: String,
}

impl ControlPlaneClient {
    pub fn new(
        control_plane: Arc<dyn ControlPlane>,
        connection: &ControlPlaneConfig,
        deployment: DeploymentConfig,
    ) -> Self {
        Self {
            control_plane,
            deployment,
            account_id: connection.account_id.clone(),
        }
    }

    pub fn deployment(&self) -> &DeploymentConfig {
        &self.deployment
    }

    // ------------------------------------------------------------------
    // Memory
    // ------------------------------------------------------------------

    /// Start creating the agent's memory. An existing memory with the same
    /// name is adopted instead.
    pub async fn create_memory(&self, agent_name: &AgentName) -> Result<MemoryId, ControlPlaneError> {
        let request = CreateMemoryRequest {
            name: agent_name.memory_name(),
            event_expiry_duration: self.deployment.memory_event_expiry_days,
            tags: self.deployment.ownership_tags(),
        };

        match self.control_plane.create_memory(&request).await {
            Ok(memory) => {
                info!(agent_name = %agent_name, memory_id = %memory.id, "Memory creation started");
                Ok(memory.id)
            }
            Err(ControlPlaneError::AlreadyExists(_)) => {
                info!(agent_name = %agent_name, "Memory already exists, adopting it");
                self.find_agent_memory(agent_name, false).await?.ok_or_else(|| {
                    ControlPlaneError::Transient(format!(
                        "memory {} exists but is not listed yet",
                        request.name
                    ))
                })
            }
            Err(e) => Err(e),
        }
    }

    /// `None` when the memory is gone
    pub async fn describe_memory(
        &self,
        memory_id: &MemoryId,
    ) -> Result<Option<MemoryDescription>, ControlPlaneError> {
        match self.control_plane.get_memory(memory_id).await {
            Ok(memory) => Ok(Some(memory)),
            Err(ControlPlaneError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Find the memory owned by this deployment for the agent: its id starts
    /// with `{agent}Memory-` and its tags match. With `active_only`, memories
    /// that are not ACTIVE are skipped.
    pub async fn find_agent_memory(
        &self,
        agent_name: &AgentName,
        active_only: bool,
    ) -> Result<Option<MemoryId>, ControlPlaneError> {
        let prefix = agent_name.memory_id_prefix();
        let mut candidates = Vec::new();
        let mut next_token: Option<String> = None;

        loop {
            let page = self
                .control_plane
                .list_memories(next_token.as_deref(), PAGE_SIZE)
                .await?;
            candidates.extend(page.items.into_iter().filter(|memory| {
                memory.id.as_str().starts_with(&prefix)
                    && match memory.status {
                        MemoryStatus::Active => true,
                        MemoryStatus::Deleting => false,
                        _ => !active_only,
                    }
            }));
            next_token = page.next_token;
            if next_token.is_none() {
                break;
            }
        }

        for candidate in candidates {
            let arn = match candidate.arn {
                Some(arn) if !arn.is_empty() => arn,
                _ => match self.describe_memory(&candidate.id).await? {
                    Some(MemoryDescription { arn: Some(arn), .. }) => arn,
                    _ => continue,
                },
            };
            if self.is_owned(&arn).await? {
                debug!(agent_name = %agent_name, memory_id = %candidate.id, "Matched agent memory");
                return Ok(Some(candidate.id));
            }
            debug!(memory_id = %candidate.id, "Memory name matches but belongs to another deployment");
        }

        Ok(None)
    }

    pub async fn delete_memory(&self, memory_id: &MemoryId) -> Result<(), ControlPlaneError> {
        match self.control_plane.delete_memory(memory_id).await {
            Ok(()) => Ok(()),
            Err(ControlPlaneError::NotFound(_)) => {
                debug!(memory_id = %memory_id, "Memory already gone");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    // ------------------------------------------------------------------
    // Runtime
    // ------------------------------------------------------------------

    pub async fn find_runtime_by_name(
        &self,
        agent_name: &AgentName,
    ) -> Result<Option<RuntimeDescription>, ControlPlaneError> {
        let mut next_token: Option<String> = None;
        loop {
            let page = self
                .control_plane
                .list_runtimes(next_token.as_deref(), PAGE_SIZE)
                .await?;
            if let Some(found) = page
                .items
                .into_iter()
                .find(|runtime| runtime.agent_runtime_name == agent_name.as_str())
            {
                return Ok(Some(found));
            }
            next_token = page.next_token;
            if next_token.is_none() {
                return Ok(None);
            }
        }
    }

    /// Like [`Self::find_runtime_by_name`], but a runtime tagged for another
    /// deployment counts as absent.
    pub async fn find_owned_runtime_by_name(
        &self,
        agent_name: &AgentName,
    ) -> Result<Option<RuntimeDescription>, ControlPlaneError> {
        let Some(runtime) = self.find_runtime_by_name(agent_name).await? else {
            return Ok(None);
        };
        match self.is_owned(&runtime.agent_runtime_arn).await {
            Ok(true) => Ok(Some(runtime)),
            Ok(false) => {
                warn!(
                    agent_name = %agent_name,
                    runtime_id = %runtime.agent_runtime_id,
                    "Ignoring runtime owned by another deployment"
                );
                Ok(None)
            }
            // Vanished between the listing and the tag lookup
            Err(ControlPlaneError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Build the runtime specification for one version
    pub fn runtime_spec(&self, input: &RuntimeVersionInput<'_>) -> Result<RuntimeSpec, ControlPlaneError> {
        let container_uri = match input.architecture {
            ArchitectureType::Single => self.deployment.container_uri.clone(),
            ArchitectureType::Swarm => self
                .deployment
                .swarm_container_uri
                .clone()
                .filter(|uri| !uri.is_empty())
                .ok_or_else(|| {
                    ControlPlaneError::Permanent(
                        "swarm architecture requested but no swarm container URI is configured"
                            .to_string(),
                    )
                })?,
        };

        let mut environment_variables: BTreeMap<String, String> =
            self.deployment.runtime_environment.clone();
        environment_variables.insert("agentName".to_string(), input.agent_name.to_string());
        environment_variables.insert("createdAt".to_string(), input.version_key.to_string());
        environment_variables.insert("accountId".to_string(), self.account_id.clone());
        if let Some(memory_id) = input.memory_id {
            environment_variables.insert("memoryId".to_string(), memory_id.to_string());
        }

        Ok(RuntimeSpec {
            container_uri,
            role_arn: self.deployment.role_arn.clone(),
            network_mode: self.deployment.network_mode.clone(),
            environment_variables,
        })
    }

    /// Create the runtime, or add a version when one with the agent's name
    /// already exists and belongs to this deployment.
    pub async fn create_or_update_runtime(
        &self,
        input: &RuntimeVersionInput<'_>,
    ) -> Result<RuntimeHandle, ControlPlaneError> {
        let spec = self.runtime_spec(input)?;

        if let Some(existing) = self.find_runtime_by_name(input.agent_name).await? {
            return self.update_owned_runtime(&existing, &spec).await;
        }

        info!(agent_name = %input.agent_name, "Creating a new runtime");
        let request = CreateRuntimeRequest {
            agent_runtime_name: input.agent_name.to_string(),
            spec: spec.clone(),
            tags: self.deployment.ownership_tags(),
        };
        match self.control_plane.create_runtime(&request).await {
            Ok(handle) => Ok(handle),
            Err(ControlPlaneError::AlreadyExists(_)) => {
                // Lost a race with another creator; converge onto the existing runtime
                match self.find_runtime_by_name(input.agent_name).await? {
                    Some(existing) => self.update_owned_runtime(&existing, &spec).await,
                    None => Err(ControlPlaneError::Transient(format!(
                        "runtime {} exists but is not listed yet",
                        input.agent_name
                    ))),
                }
            }
            Err(e) => Err(e),
        }
    }

    async fn update_owned_runtime(
        &self,
        existing: &RuntimeDescription,
        spec: &RuntimeSpec,
    ) -> Result<RuntimeHandle, ControlPlaneError> {
        if !self.is_owned(&existing.agent_runtime_arn).await? {
            return Err(ControlPlaneError::Permanent(format!(
                "runtime {} was not created by this stack and environment",
                existing.agent_runtime_name
            )));
        }
        info!(
            runtime_id = %existing.agent_runtime_id,
            "Runtime already exists, adding a new version"
        );
        self.control_plane
            .update_runtime(&existing.agent_runtime_id, spec)
            .await
    }

    /// `None` when the runtime is gone
    pub async fn describe_runtime(
        &self,
        runtime_id: &RuntimeId,
        version: Option<&str>,
    ) -> Result<Option<RuntimeDescription>, ControlPlaneError> {
        match self.control_plane.get_runtime(runtime_id, version).await {
            Ok(runtime) => Ok(Some(runtime)),
            Err(ControlPlaneError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn delete_runtime(&self, runtime_id: &RuntimeId) -> Result<(), ControlPlaneError> {
        match self.control_plane.delete_runtime(runtime_id).await {
            Ok(()) => Ok(()),
            Err(ControlPlaneError::NotFound(_)) => {
                debug!(runtime_id = %runtime_id, "Runtime already gone");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    // ------------------------------------------------------------------
    // Endpoints
    // ------------------------------------------------------------------

    /// Every named endpoint of the runtime; the implicit DEFAULT endpoint is
    /// excluded because it goes away with the runtime.
    pub async fn list_endpoints(
        &self,
        runtime_id: &RuntimeId,
    ) -> Result<Vec<EndpointDescription>, ControlPlaneError> {
        let mut endpoints = Vec::new();
        let mut next_token: Option<String> = None;
        loop {
            let page = self
                .control_plane
                .list_endpoints(runtime_id, next_token.as_deref(), PAGE_SIZE)
                .await?;
            endpoints.extend(
                page.items
                    .into_iter()
                    .filter(|endpoint| endpoint.name != DEFAULT_QUALIFIER),
            );
            next_token = page.next_token;
            if next_token.is_none() {
                return Ok(endpoints);
            }
        }
    }

    pub async fn create_endpoint(
        &self,
        request: &CreateEndpointRequest,
    ) -> Result<(), ControlPlaneError> {
        match self.control_plane.create_endpoint(request).await {
            Ok(endpoint) => {
                info!(endpoint = %endpoint.name, status = ?endpoint.status, "Endpoint creation started");
                Ok(())
            }
            Err(ControlPlaneError::AlreadyExists(_)) => {
                warn!(endpoint = %request.name, "Endpoint already exists, waiting on it");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// `None` when the endpoint is gone
    pub async fn describe_endpoint(
        &self,
        runtime_id: &RuntimeId,
        name: &str,
    ) -> Result<Option<EndpointDescription>, ControlPlaneError> {
        match self.control_plane.get_endpoint(runtime_id, name).await {
            Ok(endpoint) => Ok(Some(endpoint)),
            Err(ControlPlaneError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn delete_endpoint(&self, runtime_id: &RuntimeId, name: &str) -> Result<(), ControlPlaneError> {
        match self.control_plane.delete_endpoint(runtime_id, name).await {
            Ok(()) => Ok(()),
            Err(ControlPlaneError::NotFound(_)) => {
                debug!(endpoint = %name, "Endpoint already gone");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    // ------------------------------------------------------------------
    // Tags
    // ------------------------------------------------------------------

    /// Whether the resource carries this deployment's `Stack`/`Environment` tags
    pub async fn is_owned(&self, resource_arn: &str) -> Result<bool, ControlPlaneError> {
        let tags = self.control_plane.list_tags(resource_arn).await?;
        Ok(self.deployment.owns(&tags))
    }
}
