// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Lifecycle Orchestrator
//!
//! Drives the Create, Delete, Delete-Endpoints and Tag workflows as explicit
//! state machines. Each workflow is a loop over [`LifecyclePhase`]: the
//! current phase's work runs, its transition function picks the next phase,
//! and the summary is checkpointed on entry to that phase. A run that died
//! mid-way is resumed from the persisted phase by resubmitting the same
//! workflow.
//!
//! Every wait (and every retry of a start call) goes through
//! [`poll_until`]. Budget exhaustion is a hard failure for Create and Tag and
//! degrades to `PartiallyFailed` with the remaining work enumerated for the
//! delete workflows.
//!
//! # Ordering guarantees
//!
//! - The runtime is never deleted before every endpoint deletion has reached
//!   a terminal state; a stuck endpoint stops the run before `DeleteRuntime`.
//! - Registry records are removed only in `RemoveRegistryReferences`, which
//!   is entered only after the control plane confirmed the runtime is gone.

use chrono::Utc;
use futures::stream::{self, StreamExt};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::application::control_plane_client::RuntimeVersionInput;
use crate::application::polling::{poll_until, PollError, PollingPolicy};
use crate::application::steps::LifecycleSteps;
use crate::domain::control_plane::CreateEndpointRequest;
use crate::domain::events::RuntimeLifecycleEvent;
use crate::domain::lifecycle::{LifecyclePhase, WorkflowKind, WorkflowOutcome};
use crate::domain::repository::{
    RepositoryError, RuntimeSummaryRepository, RuntimeVersionRepository,
};
use crate::domain::runtime::{
    validate_endpoint_name, AgentName, ArchitectureType, ConfigurationValue, RunStart,
    RunTarget, RuntimeError, RuntimeSummary, RuntimeVersion, VersionKey, DEFAULT_QUALIFIER,
};
use crate::infrastructure::event_bus::EventBus;

/// What a finished run reports back to the submitter
#[derive(Debug, Clone)]
pub struct WorkflowReport {
    pub agent_name: AgentName,
    pub workflow: WorkflowKind,
    pub run_id: Uuid,
    pub outcome: WorkflowOutcome,
    /// Phase the run picked up from when it resumed a previous run
    pub resumed_from: Option<LifecyclePhase>,
    pub version_key: Option<VersionKey>,
    pub duration: Duration,
}

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    #[error("Registry error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("No runtime is registered for agent {0}")]
    UnknownAgent(String),
}

/// Why a workflow body stopped before `NotifyAndComplete`
enum Stop {
    /// Terminal `Failed` or `PartiallyFailed` outcome
    Halt(WorkflowOutcome),
    /// Infrastructure error; the run cannot be checkpointed reliably
    Error(LifecycleError),
}

impl From<LifecycleError> for Stop {
    fn from(e: LifecycleError) -> Self {
        Stop::Error(e)
    }
}

impl From<RuntimeError> for Stop {
    fn from(e: RuntimeError) -> Self {
        Stop::Error(e.into())
    }
}

impl From<RepositoryError> for Stop {
    fn from(e: RepositoryError) -> Self {
        Stop::Error(e.into())
    }
}

fn failed(reason: impl Into<String>) -> Stop {
    Stop::Halt(WorkflowOutcome::Failed {
        reason: reason.into(),
    })
}

/// Translate a polling failure into the workflow's terminal outcome
fn stop_on(kind: WorkflowKind, error: PollError, remaining: Vec<String>) -> Stop {
    match &error {
        PollError::BudgetExceeded { .. } if kind.tolerates_partial_failure() => {
            Stop::Halt(WorkflowOutcome::PartiallyFailed {
                reason: error.to_string(),
                remaining,
            })
        }
        _ => failed(error.to_string()),
    }
}

/// One workflow run in progress
struct Run {
    kind: WorkflowKind,
    run_id: Uuid,
    summary: RuntimeSummary,
    resumed_from: Option<LifecyclePhase>,
    started: Instant,
    /// Set once the summary record has been deleted; nothing may recreate it
    registry_removed: bool,
}

pub struct LifecycleOrchestrator {
    steps: Arc<LifecycleSteps>,
    versions: Arc<dyn RuntimeVersionRepository>,
    summaries: Arc<dyn RuntimeSummaryRepository>,
    policy: PollingPolicy,
    endpoint_fan_out: usize,
    event_bus: Arc<EventBus>,
}

impl LifecycleOrchestrator {
    pub fn new(
        steps: Arc<LifecycleSteps>,
        versions: Arc<dyn RuntimeVersionRepository>,
        summaries: Arc<dyn RuntimeSummaryRepository>,
        policy: PollingPolicy,
        endpoint_fan_out: usize,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            steps,
            versions,
            summaries,
            policy,
            endpoint_fan_out: endpoint_fan_out.max(1),
            event_bus,
        }
    }

    pub fn policy(&self) -> &PollingPolicy {
        &self.policy
    }

    // ========================================================================
    // Entry points
    // ========================================================================

    /// Create (or converge onto) the runtime version derived from
    /// `configuration`
    pub async fn run_create(
        &self,
        agent_name: AgentName,
        configuration: ConfigurationValue,
        architecture: ArchitectureType,
        run_id: Uuid,
    ) -> Result<WorkflowReport, LifecycleError> {
        let span = info_span!("workflow", workflow = "create", agent_name = %agent_name, %run_id);
        async move {
            let version_key = configuration.version_key();
            let existing = self.summaries.find_summary(&agent_name).await?;
            let mut run = self
                .begin(WorkflowKind::Create, agent_name, existing, run_id, Some(version_key), None)
                .await?;
            let result = self.create_body(&mut run, &configuration, architecture).await;
            self.finish(run, result).await
        }
        .instrument(span)
        .await
    }

    /// Tear down endpoints, memory and runtime, then the registry records
    pub async fn run_delete(
        &self,
        agent_name: AgentName,
        run_id: Uuid,
    ) -> Result<WorkflowReport, LifecycleError> {
        let span = info_span!("workflow", workflow = "delete", agent_name = %agent_name, %run_id);
        async move {
            let existing = self.summaries.find_summary(&agent_name).await?;
            if existing.is_none() {
                info!("No summary recorded, deleting whatever the control plane still has");
            }
            let mut run = self
                .begin(WorkflowKind::Delete, agent_name, existing, run_id, None, None)
                .await?;
            let result = self.delete_body(&mut run, &[]).await;
            self.finish(run, result).await
        }
        .instrument(span)
        .await
    }

    /// Delete the named endpoints only. An empty list means every named
    /// endpoint of the runtime.
    pub async fn run_delete_endpoints(
        &self,
        agent_name: AgentName,
        endpoint_names: Vec<String>,
        run_id: Uuid,
    ) -> Result<WorkflowReport, LifecycleError> {
        let span = info_span!(
            "workflow",
            workflow = "delete_endpoints",
            agent_name = %agent_name,
            %run_id
        );
        async move {
            for name in &endpoint_names {
                validate_qualifier(name)?;
            }
            let existing = self
                .summaries
                .find_summary(&agent_name)
                .await?
                .ok_or_else(|| LifecycleError::UnknownAgent(agent_name.to_string()))?;
            let mut run = self
                .begin(
                    WorkflowKind::DeleteEndpoints,
                    agent_name,
                    Some(existing),
                    run_id,
                    None,
                    Some(RunTarget::endpoints(&endpoint_names)),
                )
                .await?;
            let result = self.delete_body(&mut run, &endpoint_names).await;
            self.finish(run, result).await
        }
        .instrument(span)
        .await
    }

    /// Point a new named endpoint at an existing runtime version
    pub async fn run_tag_endpoint(
        &self,
        agent_name: AgentName,
        runtime_version: String,
        qualifier: String,
        description: Option<String>,
        run_id: Uuid,
    ) -> Result<WorkflowReport, LifecycleError> {
        let span = info_span!("workflow", workflow = "tag_endpoint", agent_name = %agent_name, %run_id);
        async move {
            validate_qualifier(&qualifier)?;
            let existing = self
                .summaries
                .find_summary(&agent_name)
                .await?
                .filter(|summary| summary.runtime_id.is_some())
                .ok_or_else(|| LifecycleError::UnknownAgent(agent_name.to_string()))?;
            let mut run = self
                .begin(
                    WorkflowKind::TagEndpoint,
                    agent_name,
                    Some(existing),
                    run_id,
                    None,
                    Some(RunTarget::Tag {
                        qualifier: qualifier.clone(),
                        runtime_version: runtime_version.clone(),
                    }),
                )
                .await?;
            let result = self
                .tag_body(&mut run, &runtime_version, &qualifier, description)
                .await;
            self.finish(run, result).await
        }
        .instrument(span)
        .await
    }

    // ========================================================================
    // Run bookkeeping
    // ========================================================================

    async fn begin(
        &self,
        kind: WorkflowKind,
        agent_name: AgentName,
        existing: Option<RuntimeSummary>,
        run_id: Uuid,
        version_key: Option<VersionKey>,
        target: Option<RunTarget>,
    ) -> Result<Run, LifecycleError> {
        let mut summary = existing.unwrap_or_else(|| RuntimeSummary::new(agent_name));
        let mut resumed_from = match summary.begin(kind, run_id)? {
            RunStart::Fresh => None,
            RunStart::Resumed(phase) => Some(phase),
        };

        // A stale run submitted with different arguments is abandoned
        if resumed_from.is_some() {
            if version_key.is_some() && summary.version_key != version_key {
                info!(
                    previous_key = ?summary.version_key,
                    "Discarding stale run for a different configuration"
                );
                summary.restart(kind, run_id);
                resumed_from = None;
            } else if target.is_some() && summary.run_target != target {
                info!(
                    previous_target = ?summary.run_target,
                    "Discarding stale run for different endpoints"
                );
                summary.restart(kind, run_id);
                resumed_from = None;
            }
        }
        if version_key.is_some() {
            summary.version_key = version_key;
        }
        summary.run_target = target;

        self.summaries.save_summary(&summary).await?;

        match resumed_from {
            Some(phase) => info!(%phase, "Resuming workflow"),
            None => info!(phase = %summary.phase, "Workflow started"),
        }
        self.event_bus
            .publish_lifecycle_event(RuntimeLifecycleEvent::WorkflowStarted {
                agent_name: summary.agent_name.clone(),
                workflow: kind,
                run_id,
                resumed_at_phase: resumed_from,
                started_at: Utc::now(),
            });

        Ok(Run {
            kind,
            run_id,
            summary,
            resumed_from,
            started: Instant::now(),
            registry_removed: false,
        })
    }

    /// Enter `phase` and checkpoint it
    async fn advance(&self, run: &mut Run, phase: LifecyclePhase) -> Result<(), Stop> {
        run.summary.enter_phase(phase)?;
        if !run.registry_removed {
            self.summaries.save_summary(&run.summary).await?;
        }
        debug!(%phase, "Entered phase");
        self.event_bus
            .publish_lifecycle_event(RuntimeLifecycleEvent::PhaseEntered {
                agent_name: run.summary.agent_name.clone(),
                workflow: run.kind,
                run_id: run.run_id,
                phase,
                entered_at: Utc::now(),
            });
        Ok(())
    }

    async fn finish(
        &self,
        mut run: Run,
        result: Result<(), Stop>,
    ) -> Result<WorkflowReport, LifecycleError> {
        let agent_name = run.summary.agent_name.clone();

        let outcome = match result {
            Ok(()) => {
                run.summary.complete();
                info!("Workflow completed");
                WorkflowOutcome::Completed
            }
            Err(Stop::Halt(outcome)) => {
                match &outcome {
                    WorkflowOutcome::PartiallyFailed { reason, remaining } => {
                        run.summary.partially_fail(reason.clone());
                        warn!(%reason, ?remaining, "Workflow partially failed");
                    }
                    WorkflowOutcome::Failed { reason } => {
                        run.summary.fail(reason.clone());
                        error!(%reason, "Workflow failed");
                    }
                    WorkflowOutcome::Completed => run.summary.complete(),
                }
                outcome
            }
            Err(Stop::Error(e)) => {
                error!(error = %e, "Workflow aborted");
                run.summary.fail(e.to_string());
                if !run.registry_removed {
                    if let Err(save_error) = self.summaries.save_summary(&run.summary).await {
                        warn!(error = %save_error, "Could not record the aborted run");
                    }
                }
                self.steps.notify_runtime_update(&agent_name).await;
                self.record_finished(&run, &WorkflowOutcome::Failed {
                    reason: e.to_string(),
                });
                return Err(e);
            }
        };

        if !run.registry_removed {
            self.summaries.save_summary(&run.summary).await?;
        }
        self.steps.notify_runtime_update(&agent_name).await;
        self.record_finished(&run, &outcome);

        Ok(WorkflowReport {
            agent_name,
            workflow: run.kind,
            run_id: run.run_id,
            outcome,
            resumed_from: run.resumed_from,
            version_key: run.summary.version_key,
            duration: run.started.elapsed(),
        })
    }

    fn record_finished(&self, run: &Run, outcome: &WorkflowOutcome) {
        metrics::counter!(
            "aro_workflows_total",
            "workflow" => run.kind.as_str(),
            "outcome" => outcome.label()
        )
        .increment(1);
        metrics::histogram!("aro_workflow_duration_seconds", "workflow" => run.kind.as_str())
            .record(run.started.elapsed().as_secs_f64());

        self.event_bus
            .publish_lifecycle_event(RuntimeLifecycleEvent::WorkflowFinished {
                agent_name: run.summary.agent_name.clone(),
                workflow: run.kind,
                run_id: run.run_id,
                outcome: outcome.clone(),
                finished_at: Utc::now(),
            });
    }

    // ========================================================================
    // Create
    // ========================================================================

    async fn create_body(
        &self,
        run: &mut Run,
        configuration: &ConfigurationValue,
        architecture: ArchitectureType,
    ) -> Result<(), Stop> {
        let agent_name = run.summary.agent_name.clone();
        let version_key = configuration.version_key();
        let kind = run.kind;
        let mut phase = run.summary.phase;

        loop {
            let next = match phase {
                LifecyclePhase::Init => {
                    if let Some(existing) = self.versions.find_version(&agent_name, version_key).await? {
                        info!(%version_key, runtime_version = %existing.runtime_version, "Version already exists, converging");
                        if run.summary.runtime_id.is_none() {
                            run.summary.runtime_id = Some(existing.runtime_id.clone());
                            run.summary.runtime_arn = Some(existing.runtime_arn.clone());
                        }
                        LifecyclePhase::NotifyAndComplete
                    } else if configuration.requires_memory() {
                        LifecyclePhase::EnsureMemory
                    } else {
                        debug!("Configuration has no memory requirement");
                        LifecyclePhase::CreateRuntime
                    }
                }

                LifecyclePhase::EnsureMemory => {
                    let memory_id = poll_until(&self.policy, "start_memory_creation", || {
                        self.steps.start_memory_creation(&agent_name)
                    })
                    .await
                    .map_err(|e| stop_on(kind, e, Vec::new()))?;
                    run.summary.memory_id = Some(memory_id);
                    LifecyclePhase::AwaitMemory
                }

                LifecyclePhase::AwaitMemory => {
                    let memory_id = run
                        .summary
                        .memory_id
                        .clone()
                        .ok_or_else(|| failed("no memory id recorded for the memory being created"))?;
                    poll_until(&self.policy, "check_memory_created", || {
                        self.steps.check_memory_created(&memory_id)
                    })
                    .await
                    .map_err(|e| stop_on(kind, e, Vec::new()))?;
                    info!(%memory_id, "Memory is active");
                    self.steps.notify_runtime_update(&agent_name).await;
                    LifecyclePhase::CreateRuntime
                }

                LifecyclePhase::CreateRuntime => {
                    let memory_id = if configuration.requires_memory() {
                        run.summary.memory_id.clone()
                    } else {
                        None
                    };
                    let input = RuntimeVersionInput {
                        agent_name: &agent_name,
                        version_key,
                        architecture,
                        memory_id: memory_id.as_ref(),
                    };
                    let handle = poll_until(&self.policy, "start_runtime_version_creation", || {
                        self.steps.start_runtime_version_creation(&input)
                    })
                    .await
                    .map_err(|e| stop_on(kind, e, Vec::new()))?;
                    run.summary.runtime_id = Some(handle.agent_runtime_id);
                    run.summary.runtime_arn = Some(handle.agent_runtime_arn);
                    run.summary.pending_runtime_version = Some(handle.agent_runtime_version);
                    LifecyclePhase::AwaitRuntime
                }

                LifecyclePhase::AwaitRuntime => {
                    let (runtime_id, runtime_version) = match (
                        run.summary.runtime_id.clone(),
                        run.summary.pending_runtime_version.clone(),
                    ) {
                        (Some(id), Some(version)) => (id, version),
                        _ => return Err(failed("no runtime version recorded for the runtime being created")),
                    };
                    poll_until(&self.policy, "check_runtime_created", || {
                        self.steps.check_runtime_created(&runtime_id, &runtime_version)
                    })
                    .await
                    .map_err(|e| stop_on(kind, e, Vec::new()))?;
                    info!(%runtime_id, %runtime_version, "Runtime version is ready");
                    self.steps.notify_runtime_update(&agent_name).await;
                    LifecyclePhase::Seed
                }

                LifecyclePhase::Seed => {
                    let version = match (
                        run.summary.runtime_id.clone(),
                        run.summary.runtime_arn.clone(),
                        run.summary.pending_runtime_version.clone(),
                    ) {
                        (Some(runtime_id), Some(runtime_arn), Some(runtime_version)) => RuntimeVersion {
                            agent_name: agent_name.clone(),
                            created_at: version_key,
                            runtime_id,
                            runtime_arn,
                            runtime_version,
                            configuration: configuration.clone(),
                            architecture,
                            recorded_at: Utc::now(),
                        },
                        _ => return Err(failed("no ready runtime version to record")),
                    };
                    let inserted = poll_until(&self.policy, "seed_runtime_version", || {
                        self.steps.seed_runtime_version(&version)
                    })
                    .await
                    .map_err(|e| stop_on(kind, e, Vec::new()))?;
                    if inserted {
                        run.summary.record_seeded_version(&version);
                    } else {
                        run.summary.pending_runtime_version = None;
                    }
                    LifecyclePhase::NotifyAndComplete
                }

                LifecyclePhase::NotifyAndComplete => return Ok(()),

                other => {
                    return Err(RuntimeError::InvalidPhaseTransition {
                        from: other,
                        to: LifecyclePhase::NotifyAndComplete,
                    }
                    .into())
                }
            };

            self.advance(run, next).await?;
            phase = next;
        }
    }

    // ========================================================================
    // Delete and DeleteEndpoints
    // ========================================================================

    /// Shared by both delete workflows. `requested` narrows the endpoints a
    /// DeleteEndpoints run removes; it is ignored by the full Delete.
    async fn delete_body(&self, run: &mut Run, requested: &[String]) -> Result<(), Stop> {
        let agent_name = run.summary.agent_name.clone();
        let kind = run.kind;
        let mut phase = run.summary.phase;

        loop {
            let next = match phase {
                LifecyclePhase::ListEndpoints => {
                    let listing = poll_until(&self.policy, "list_endpoints", || {
                        self.steps.list_endpoints(&agent_name, run.summary.runtime_id.as_ref())
                    })
                    .await
                    .map_err(|e| stop_on(kind, e, Vec::new()))?;

                    if listing.runtime_id.is_some() {
                        run.summary.runtime_id = listing.runtime_id;
                    }
                    let targets = if kind == WorkflowKind::DeleteEndpoints && !requested.is_empty() {
                        let wanted: BTreeSet<&str> = requested.iter().map(String::as_str).collect();
                        // Requested endpoints that no longer exist count as deleted
                        for gone in wanted
                            .iter()
                            .filter(|name| !listing.endpoints.iter().any(|e| e.as_str() == **name))
                        {
                            debug!(endpoint = %gone, "Endpoint already absent");
                            run.summary.qualifier_to_version.remove(*gone);
                        }
                        listing
                            .endpoints
                            .into_iter()
                            .filter(|name| wanted.contains(name.as_str()))
                            .collect()
                    } else {
                        listing.endpoints
                    };
                    info!(endpoints = ?targets, "Endpoints to delete");
                    run.summary.pending_endpoints = targets;

                    match (run.summary.pending_endpoints.is_empty(), kind) {
                        (false, _) => LifecyclePhase::DeleteEndpoints,
                        (true, WorkflowKind::Delete) => LifecyclePhase::CheckMemoryExists,
                        (true, _) => LifecyclePhase::NotifyAndComplete,
                    }
                }

                LifecyclePhase::DeleteEndpoints => {
                    self.start_endpoint_deletions(run).await?;
                    LifecyclePhase::AwaitEndpointsDeleted
                }

                LifecyclePhase::AwaitEndpointsDeleted => {
                    self.await_endpoint_deletions(run).await?;
                    if kind == WorkflowKind::Delete {
                        LifecyclePhase::CheckMemoryExists
                    } else {
                        LifecyclePhase::NotifyAndComplete
                    }
                }

                LifecyclePhase::CheckMemoryExists => {
                    let found = poll_until(&self.policy, "check_memory_exists", || {
                        self.steps
                            .check_memory_exists(&agent_name, run.summary.memory_id.as_ref())
                    })
                    .await
                    .map_err(|e| stop_on(kind, e, Vec::new()))?;
                    match found {
                        Some(memory_id) => {
                            info!(%memory_id, "Memory still exists");
                            run.summary.memory_id = Some(memory_id);
                            LifecyclePhase::DeleteMemory
                        }
                        None => {
                            info!("No memory left to delete");
                            run.summary.memory_id = None;
                            LifecyclePhase::DeleteRuntime
                        }
                    }
                }

                LifecyclePhase::DeleteMemory => {
                    let memory_id = run
                        .summary
                        .memory_id
                        .clone()
                        .ok_or_else(|| failed("no memory id recorded for deletion"))?;
                    poll_until(&self.policy, "start_memory_deletion", || {
                        self.steps.start_memory_deletion(&memory_id)
                    })
                    .await
                    .map_err(|e| stop_on(kind, e, vec![format!("memory:{}", memory_id)]))?;
                    LifecyclePhase::AwaitMemoryDeleted
                }

                LifecyclePhase::AwaitMemoryDeleted => {
                    if let Some(memory_id) = run.summary.memory_id.clone() {
                        poll_until(&self.policy, "check_memory_deleted", || {
                            self.steps.check_memory_deleted(&memory_id)
                        })
                        .await
                        .map_err(|e| stop_on(kind, e, vec![format!("memory:{}", memory_id)]))?;
                        info!(%memory_id, "Memory deleted");
                    }
                    run.summary.memory_id = None;
                    LifecyclePhase::DeleteRuntime
                }

                LifecyclePhase::DeleteRuntime => {
                    match run.summary.runtime_id.clone() {
                        Some(runtime_id) => {
                            poll_until(&self.policy, "start_runtime_deletion", || {
                                self.steps.start_runtime_deletion(&runtime_id)
                            })
                            .await
                            .map_err(|e| stop_on(kind, e, vec![format!("runtime:{}", runtime_id)]))?;
                        }
                        None => debug!("No runtime id known, confirming absence by name"),
                    }
                    LifecyclePhase::AwaitRuntimeDeleted
                }

                LifecyclePhase::AwaitRuntimeDeleted => {
                    let remaining = format!(
                        "runtime:{}",
                        run.summary
                            .runtime_id
                            .as_ref()
                            .map(ToString::to_string)
                            .unwrap_or_else(|| agent_name.to_string())
                    );
                    poll_until(&self.policy, "check_runtime_deleted", || {
                        self.steps
                            .check_runtime_deleted(&agent_name, run.summary.runtime_id.as_ref())
                    })
                    .await
                    .map_err(|e| stop_on(kind, e, vec![remaining.clone()]))?;
                    info!("Runtime deletion confirmed");
                    LifecyclePhase::RemoveRegistryReferences
                }

                LifecyclePhase::RemoveRegistryReferences => {
                    poll_until(&self.policy, "remove_runtime_references", || {
                        self.steps.remove_runtime_references(&agent_name)
                    })
                    .await
                    .map_err(|e| stop_on(kind, e, vec![format!("registry:{}", agent_name)]))?;
                    run.registry_removed = true;
                    LifecyclePhase::NotifyAndComplete
                }

                LifecyclePhase::NotifyAndComplete => return Ok(()),

                other => {
                    return Err(RuntimeError::InvalidPhaseTransition {
                        from: other,
                        to: LifecyclePhase::NotifyAndComplete,
                    }
                    .into())
                }
            };

            self.advance(run, next).await?;
            phase = next;
        }
    }

    /// Issue every pending deletion concurrently. Starts that exhaust their
    /// budget stay pending and surface when awaiting.
    async fn start_endpoint_deletions(&self, run: &mut Run) -> Result<(), Stop> {
        let Some(runtime_id) = run.summary.runtime_id.clone() else {
            return Err(failed("endpoints are pending but no runtime id is known"));
        };
        let policy = &self.policy;
        let steps = &self.steps;
        let runtime_id = &runtime_id;

        let results: Vec<(String, Result<(), PollError>)> =
            stream::iter(run.summary.pending_endpoints.clone())
                .map(|name| async move {
                    let result = poll_until(policy, "start_endpoint_deletion", || {
                        steps.start_endpoint_deletion(runtime_id, &name)
                    })
                    .await;
                    (name, result)
                })
                .buffer_unordered(self.endpoint_fan_out)
                .collect()
                .await;

        let mut rejected = Vec::new();
        for (name, result) in results {
            match result {
                Ok(()) => debug!(endpoint = %name, "Endpoint deletion started"),
                Err(e @ PollError::BudgetExceeded { .. }) => {
                    warn!(endpoint = %name, error = %e, "Endpoint deletion could not be started")
                }
                Err(e) => rejected.push(format!("{}: {}", name, e)),
            }
        }
        if !rejected.is_empty() {
            return Err(failed(format!(
                "endpoint deletion rejected: {}",
                rejected.join("; ")
            )));
        }
        Ok(())
    }

    /// Wait for every pending endpoint concurrently. Only the endpoints that
    /// are still present when their budget runs out stay pending.
    async fn await_endpoint_deletions(&self, run: &mut Run) -> Result<(), Stop> {
        let Some(runtime_id) = run.summary.runtime_id.clone() else {
            return Err(failed("endpoints are pending but no runtime id is known"));
        };
        let policy = &self.policy;
        let steps = &self.steps;
        let runtime_id = &runtime_id;

        let results: Vec<(String, Result<(), PollError>)> =
            stream::iter(run.summary.pending_endpoints.clone())
                .map(|name| async move {
                    let result = poll_until(policy, "check_endpoint_deleted", || {
                        steps.check_endpoint_deleted(runtime_id, &name)
                    })
                    .await;
                    (name, result)
                })
                .buffer_unordered(self.endpoint_fan_out)
                .collect()
                .await;

        let mut stuck = Vec::new();
        let mut rejected: Vec<(String, PollError)> = Vec::new();
        for (name, result) in results {
            match result {
                Ok(()) => {
                    info!(endpoint = %name, "Endpoint deleted");
                    run.summary.qualifier_to_version.remove(&name);
                }
                Err(PollError::BudgetExceeded { .. }) => stuck.push(name),
                Err(e) => rejected.push((name, e)),
            }
        }
        stuck.sort();

        let mut remaining = stuck.clone();
        remaining.extend(rejected.iter().map(|(name, _)| name.clone()));
        remaining.sort();
        run.summary.pending_endpoints = remaining;

        if !rejected.is_empty() {
            let details: Vec<String> = rejected
                .iter()
                .map(|(name, e)| format!("{}: {}", name, e))
                .collect();
            return Err(failed(format!("endpoint deletion failed: {}", details.join("; "))));
        }
        if !stuck.is_empty() {
            let reason = format!(
                "{} endpoint(s) still deleting after a budget of {:?}",
                stuck.len(),
                self.policy.budget
            );
            return Err(if run.kind.tolerates_partial_failure() {
                Stop::Halt(WorkflowOutcome::PartiallyFailed {
                    reason,
                    remaining: stuck,
                })
            } else {
                failed(reason)
            });
        }
        Ok(())
    }

    // ========================================================================
    // Tag
    // ========================================================================

    async fn tag_body(
        &self,
        run: &mut Run,
        runtime_version: &str,
        qualifier: &str,
        description: Option<String>,
    ) -> Result<(), Stop> {
        let kind = run.kind;
        let runtime_id = run
            .summary
            .runtime_id
            .clone()
            .ok_or_else(|| failed("no runtime id recorded for the agent"))?;
        let mut phase = run.summary.phase;

        loop {
            let next = match phase {
                LifecyclePhase::CreateEndpoint => {
                    let request = CreateEndpointRequest {
                        agent_runtime_id: runtime_id.clone(),
                        name: qualifier.to_string(),
                        agent_runtime_version: runtime_version.to_string(),
                        description: description.clone(),
                    };
                    poll_until(&self.policy, "start_endpoint_creation", || {
                        self.steps.start_endpoint_creation(&request)
                    })
                    .await
                    .map_err(|e| stop_on(kind, e, Vec::new()))?;
                    run.summary.pending_endpoints = vec![qualifier.to_string()];
                    LifecyclePhase::AwaitEndpointReady
                }

                LifecyclePhase::AwaitEndpointReady => {
                    poll_until(&self.policy, "check_endpoint_created", || {
                        self.steps
                            .check_endpoint_created(&runtime_id, qualifier, runtime_version)
                    })
                    .await
                    .map_err(|e| stop_on(kind, e, Vec::new()))?;
                    info!(%qualifier, %runtime_version, "Endpoint is ready");
                    run.summary
                        .qualifier_to_version
                        .insert(qualifier.to_string(), runtime_version.to_string());
                    run.summary.pending_endpoints.clear();
                    LifecyclePhase::NotifyAndComplete
                }

                LifecyclePhase::NotifyAndComplete => return Ok(()),

                other => {
                    return Err(RuntimeError::InvalidPhaseTransition {
                        from: other,
                        to: LifecyclePhase::NotifyAndComplete,
                    }
                    .into())
                }
            };

            self.advance(run, next).await?;
            phase = next;
        }
    }
}

/// Named endpoints only; DEFAULT is managed by the control plane
fn validate_qualifier(name: &str) -> Result<(), RuntimeError> {
    if name == DEFAULT_QUALIFIER {
        return Err(RuntimeError::InvalidEndpointName(name.to_string()));
    }
    validate_endpoint_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn budget_exceeded() -> PollError {
        PollError::BudgetExceeded {
            step: "check_endpoint_deleted",
            budget: Duration::from_secs(1),
            last_status: "in progress (Deleting)".to_string(),
        }
    }

    #[test]
    fn test_budget_exceeded_degrades_only_for_delete_workflows() {
        let remaining = vec!["blue".to_string()];
        match stop_on(WorkflowKind::Delete, budget_exceeded(), remaining.clone()) {
            Stop::Halt(WorkflowOutcome::PartiallyFailed { remaining: r, .. }) => {
                assert_eq!(r, remaining)
            }
            _ => panic!("expected a partial failure"),
        }
        assert!(matches!(
            stop_on(WorkflowKind::Create, budget_exceeded(), Vec::new()),
            Stop::Halt(WorkflowOutcome::Failed { .. })
        ));
    }

    #[test]
    fn test_permanent_poll_error_always_fails() {
        let error = PollError::Permanent {
            step: "check_memory_created",
            reason: "FAILED".to_string(),
        };
        assert!(matches!(
            stop_on(WorkflowKind::DeleteEndpoints, error, Vec::new()),
            Stop::Halt(WorkflowOutcome::Failed { .. })
        ));
    }

    #[test]
    fn test_default_qualifier_is_reserved() {
        assert!(validate_qualifier("DEFAULT").is_err());
        assert!(validate_qualifier("blue").is_ok());
        assert!(validate_qualifier("1blue").is_err());
    }
}
