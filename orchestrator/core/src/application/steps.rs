// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Lifecycle Steps
//!
//! Individually invocable units the orchestrator sequences into workflows.
//! Each step takes only the identifiers its phase needs, performs at most one
//! mutating control plane call, and reports a [`StepOutcome`]. Steps never
//! call each other and never decide workflow outcomes; the orchestrator writes
//! their results back onto the `RuntimeSummary`.
//!
//! Check steps run after a start step whose effect may not be visible yet.
//! "Not found" right after a create is reported as
//! [`PendingReason::PropagationPending`], which the polling helper tolerates
//! for a bounded grace period.

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::application::control_plane_client::{ControlPlaneClient, RuntimeVersionInput};
use crate::domain::control_plane::{
    ControlPlaneError, CreateEndpointRequest, EndpointDescription, MemoryStatus,
    RuntimeDescription, RuntimeHandle, RuntimeStatus,
};
use crate::domain::repository::{RuntimeSummaryRepository, RuntimeVersionRepository};
use crate::domain::runtime::{AgentName, MemoryId, RuntimeId, RuntimeVersion};
use crate::domain::step::{PendingReason, StepOutcome};
use crate::infrastructure::notifications::BestEffortNotifier;

/// Result of the `ListEndpoints` step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointListing {
    /// `None` when no runtime could be resolved for the agent
    pub runtime_id: Option<RuntimeId>,
    /// Named endpoints, DEFAULT excluded
    pub endpoints: Vec<String>,
}

/// Map a control plane error onto a step outcome. Only the retryable
/// classes are transient; `AlreadyExists`/`NotFound` that reach this point
/// were not normalized by the client and are unexpected for the intent.
fn classify<T>(error: ControlPlaneError) -> StepOutcome<T> {
    if error.class().is_retryable() {
        StepOutcome::Transient(error.to_string())
    } else {
        StepOutcome::Permanent(error.to_string())
    }
}

fn failure_reason(reason: Option<String>, status: impl std::fmt::Debug) -> String {
    reason.unwrap_or_else(|| format!("remote status {:?}", status))
}

pub struct LifecycleSteps {
    client: Arc<ControlPlaneClient>,
    versions: Arc<dyn RuntimeVersionRepository>,
    summaries: Arc<dyn RuntimeSummaryRepository>,
    notifier: BestEffortNotifier,
}

impl LifecycleSteps {
    pub fn new(
        client: Arc<ControlPlaneClient>,
        versions: Arc<dyn RuntimeVersionRepository>,
        summaries: Arc<dyn RuntimeSummaryRepository>,
        notifier: BestEffortNotifier,
    ) -> Self {
        Self {
            client,
            versions,
            summaries,
            notifier,
        }
    }

    pub fn client(&self) -> &ControlPlaneClient {
        &self.client
    }

    // ------------------------------------------------------------------
    // Memory
    // ------------------------------------------------------------------

    pub async fn start_memory_creation(&self, agent_name: &AgentName) -> StepOutcome<MemoryId> {
        match self.client.create_memory(agent_name).await {
            Ok(memory_id) => StepOutcome::Done(memory_id),
            Err(e) => classify(e),
        }
    }

    pub async fn check_memory_created(&self, memory_id: &MemoryId) -> StepOutcome<()> {
        match self.client.describe_memory(memory_id).await {
            Ok(None) => StepOutcome::Pending(PendingReason::PropagationPending),
            Ok(Some(memory)) => match memory.status {
                MemoryStatus::Active => StepOutcome::Done(()),
                MemoryStatus::Failed | MemoryStatus::Deleting => StepOutcome::Permanent(format!(
                    "memory {} did not become active: {}",
                    memory_id,
                    failure_reason(memory.failure_reason, memory.status)
                )),
                status => StepOutcome::in_progress(status),
            },
            Err(e) => classify(e),
        }
    }

    /// Re-derive the memory from the control plane. A stored id is described
    /// directly; without one the agent's memory is discovered by name and tags.
    pub async fn check_memory_exists(
        &self,
        agent_name: &AgentName,
        memory_id: Option<&MemoryId>,
    ) -> StepOutcome<Option<MemoryId>> {
        let result = match memory_id {
            Some(memory_id) => self
                .client
                .describe_memory(memory_id)
                .await
                .map(|memory| memory.map(|m| m.id)),
            None => self.client.find_agent_memory(agent_name, true).await,
        };
        match result {
            Ok(found) => {
                debug!(agent_name = %agent_name, memory_id = ?found, "Memory existence checked");
                StepOutcome::Done(found)
            }
            Err(e) => classify(e),
        }
    }

    pub async fn start_memory_deletion(&self, memory_id: &MemoryId) -> StepOutcome<()> {
        match self.client.delete_memory(memory_id).await {
            Ok(()) => StepOutcome::Done(()),
            Err(e) => classify(e),
        }
    }

    pub async fn check_memory_deleted(&self, memory_id: &MemoryId) -> StepOutcome<()> {
        match self.client.describe_memory(memory_id).await {
            Ok(None) => StepOutcome::Done(()),
            Ok(Some(memory)) => StepOutcome::in_progress(memory.status),
            Err(e) => classify(e),
        }
    }

    // ------------------------------------------------------------------
    // Runtime
    // ------------------------------------------------------------------

    pub async fn start_runtime_version_creation(
        &self,
        input: &RuntimeVersionInput<'_>,
    ) -> StepOutcome<RuntimeHandle> {
        match self.client.create_or_update_runtime(input).await {
            Ok(handle) => {
                info!(
                    agent_name = %input.agent_name,
                    runtime_id = %handle.agent_runtime_id,
                    runtime_version = %handle.agent_runtime_version,
                    "Runtime version creation started"
                );
                StepOutcome::Done(handle)
            }
            Err(e) => classify(e),
        }
    }

    pub async fn check_runtime_created(
        &self,
        runtime_id: &RuntimeId,
        runtime_version: &str,
    ) -> StepOutcome<RuntimeDescription> {
        match self.client.describe_runtime(runtime_id, Some(runtime_version)).await {
            Ok(None) => StepOutcome::Pending(PendingReason::PropagationPending),
            Ok(Some(runtime)) => match runtime.status {
                RuntimeStatus::Ready => StepOutcome::Done(runtime),
                RuntimeStatus::CreateFailed | RuntimeStatus::UpdateFailed => {
                    StepOutcome::Permanent(format!(
                        "runtime {} version {} failed: {}",
                        runtime_id,
                        runtime_version,
                        failure_reason(runtime.failure_reason, runtime.status)
                    ))
                }
                status => StepOutcome::in_progress(status),
            },
            Err(e) => classify(e),
        }
    }

    /// Write the RuntimeVersion record. Returns whether a new record was
    /// written; an existing record with the same key is left untouched.
    pub async fn seed_runtime_version(&self, version: &RuntimeVersion) -> StepOutcome<bool> {
        match self.versions.put_version(version).await {
            Ok(inserted) => {
                if !inserted {
                    debug!(
                        agent_name = %version.agent_name,
                        created_at = %version.created_at,
                        "Runtime version already recorded"
                    );
                }
                StepOutcome::Done(inserted)
            }
            Err(e) => StepOutcome::Transient(e.to_string()),
        }
    }

    pub async fn start_runtime_deletion(&self, runtime_id: &RuntimeId) -> StepOutcome<()> {
        match self.client.delete_runtime(runtime_id).await {
            Ok(()) => StepOutcome::Done(()),
            Err(e) => classify(e),
        }
    }

    /// Gone only when the runtime is absent from both a describe and a
    /// listing by name, so one stale `NotFound` cannot confirm the deletion.
    pub async fn check_runtime_deleted(
        &self,
        agent_name: &AgentName,
        runtime_id: Option<&RuntimeId>,
    ) -> StepOutcome<()> {
        if let Some(runtime_id) = runtime_id {
            match self.client.describe_runtime(runtime_id, None).await {
                Ok(None) => {}
                Ok(Some(runtime)) => return StepOutcome::in_progress(runtime.status),
                Err(e) => return classify(e),
            }
        }
        let runtime = match self.client.find_runtime_by_name(agent_name).await {
            Ok(None) => return StepOutcome::Done(()),
            Ok(Some(runtime)) => runtime,
            Err(e) => return classify(e),
        };
        if runtime_id == Some(&runtime.agent_runtime_id) {
            return StepOutcome::in_progress(runtime.status);
        }
        // A runtime of the same name that another deployment owns is not ours to wait on
        match self.client.is_owned(&runtime.agent_runtime_arn).await {
            Ok(false) | Err(ControlPlaneError::NotFound(_)) => StepOutcome::Done(()),
            Ok(true) => {
                if runtime_id.is_some() {
                    warn!(
                        agent_name = %agent_name,
                        runtime_id = %runtime.agent_runtime_id,
                        "A different runtime with the agent's name is still listed"
                    );
                }
                StepOutcome::in_progress(runtime.status)
            }
            Err(e) => classify(e),
        }
    }

    /// The only place RuntimeVersion and RuntimeSummary records are removed
    pub async fn remove_runtime_references(&self, agent_name: &AgentName) -> StepOutcome<usize> {
        let removed = match self.versions.delete_versions(agent_name).await {
            Ok(removed) => removed,
            Err(e) => return StepOutcome::Transient(e.to_string()),
        };
        if let Err(e) = self.summaries.delete_summary(agent_name).await {
            return StepOutcome::Transient(e.to_string());
        }
        info!(agent_name = %agent_name, removed_versions = removed, "Registry references removed");
        StepOutcome::Done(removed)
    }

    // ------------------------------------------------------------------
    // Endpoints
    // ------------------------------------------------------------------

    /// Enumerate the runtime's named endpoints live. The runtime id comes
    /// from the summary, else the newest recorded version, else a lookup by
    /// the agent's name among the runtimes this deployment owns.
    pub async fn list_endpoints(
        &self,
        agent_name: &AgentName,
        known_runtime_id: Option<&RuntimeId>,
    ) -> StepOutcome<EndpointListing> {
        let runtime_id = match known_runtime_id {
            Some(runtime_id) => Some(runtime_id.clone()),
            None => match self.versions.list_versions(agent_name).await {
                Ok(versions) => versions.into_iter().next().map(|v| v.runtime_id),
                Err(e) => return StepOutcome::Transient(e.to_string()),
            },
        };
        let runtime_id = match runtime_id {
            Some(runtime_id) => Some(runtime_id),
            None => match self.client.find_owned_runtime_by_name(agent_name).await {
                Ok(found) => found.map(|runtime| runtime.agent_runtime_id),
                Err(e) => return classify(e),
            },
        };

        let Some(runtime_id) = runtime_id else {
            debug!(agent_name = %agent_name, "No runtime found, nothing to enumerate");
            return StepOutcome::Done(EndpointListing {
                runtime_id: None,
                endpoints: Vec::new(),
            });
        };

        match self.client.list_endpoints(&runtime_id).await {
            Ok(endpoints) => StepOutcome::Done(EndpointListing {
                runtime_id: Some(runtime_id),
                endpoints: endpoints.into_iter().map(|endpoint| endpoint.name).collect(),
            }),
            Err(ControlPlaneError::NotFound(_)) => StepOutcome::Done(EndpointListing {
                runtime_id: Some(runtime_id),
                endpoints: Vec::new(),
            }),
            Err(e) => classify(e),
        }
    }

    pub async fn start_endpoint_deletion(&self, runtime_id: &RuntimeId, name: &str) -> StepOutcome<()> {
        match self.client.delete_endpoint(runtime_id, name).await {
            Ok(()) => StepOutcome::Done(()),
            Err(e) => classify(e),
        }
    }

    pub async fn check_endpoint_deleted(&self, runtime_id: &RuntimeId, name: &str) -> StepOutcome<()> {
        match self.client.describe_endpoint(runtime_id, name).await {
            Ok(None) => StepOutcome::Done(()),
            Ok(Some(endpoint)) => StepOutcome::in_progress(endpoint.status),
            Err(e) => classify(e),
        }
    }

    pub async fn start_endpoint_creation(&self, request: &CreateEndpointRequest) -> StepOutcome<()> {
        match self.client.create_endpoint(request).await {
            Ok(()) => StepOutcome::Done(()),
            Err(e) => classify(e),
        }
    }

    /// Ready only when the endpoint serves the requested version
    pub async fn check_endpoint_created(
        &self,
        runtime_id: &RuntimeId,
        name: &str,
        runtime_version: &str,
    ) -> StepOutcome<EndpointDescription> {
        match self.client.describe_endpoint(runtime_id, name).await {
            Ok(None) => StepOutcome::Pending(PendingReason::PropagationPending),
            Ok(Some(endpoint)) => match endpoint.status {
                RuntimeStatus::Ready => {
                    let serving = endpoint
                        .live_version
                        .as_deref()
                        .or(endpoint.target_version.as_deref());
                    if serving == Some(runtime_version) {
                        StepOutcome::Done(endpoint)
                    } else {
                        StepOutcome::Permanent(format!(
                            "endpoint {} already exists and points at version {}",
                            name,
                            serving.unwrap_or("unknown")
                        ))
                    }
                }
                RuntimeStatus::CreateFailed | RuntimeStatus::UpdateFailed => {
                    StepOutcome::Permanent(format!(
                        "endpoint {} failed: {}",
                        name,
                        failure_reason(endpoint.failure_reason, endpoint.status)
                    ))
                }
                status => StepOutcome::in_progress(status),
            },
            Err(e) => classify(e),
        }
    }

    // ------------------------------------------------------------------
    // Notification
    // ------------------------------------------------------------------

    /// Best effort; never affects the workflow
    pub async fn notify_runtime_update(&self, agent_name: &AgentName) {
        self.notifier.notify(agent_name).await;
    }
}
