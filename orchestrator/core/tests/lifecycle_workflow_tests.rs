// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Integration tests for the lifecycle workflows
//!
//! Every workflow runs end to end against the simulated control plane with
//! millisecond polling so that propagation lag, stuck resources and injected
//! faults can be exercised deterministically:
//! 1. Create (idempotency, memory, ownership, architecture)
//! 2. Delete (ordering, registry durability, out-of-band memory deletion)
//! 3. Delete-Endpoints (partial failure surfacing)
//! 4. Tagging and submission single-flight

use agent_runtime_orchestrator_core::application::control_plane_client::ControlPlaneClient;
use agent_runtime_orchestrator_core::application::lifecycle::{
    LifecycleError, LifecycleOrchestrator, WorkflowReport,
};
use agent_runtime_orchestrator_core::application::lifecycle_service::{
    RuntimeLifecycleService, ServiceError,
};
use agent_runtime_orchestrator_core::application::polling::PollingPolicy;
use agent_runtime_orchestrator_core::application::steps::LifecycleSteps;
use agent_runtime_orchestrator_core::domain::control_plane::ControlPlaneError;
use agent_runtime_orchestrator_core::domain::events::RuntimeLifecycleEvent;
use agent_runtime_orchestrator_core::domain::lifecycle::{
    LifecyclePhase, WorkflowKind, WorkflowOutcome,
};
use agent_runtime_orchestrator_core::domain::lifecycle_config::{
    ControlPlaneConfig, DeploymentConfig,
};
use agent_runtime_orchestrator_core::domain::repository::{
    RuntimeSummaryRepository, RuntimeVersionRepository,
};
use agent_runtime_orchestrator_core::domain::runtime::{
    AgentName, ArchitectureType, ConfigurationValue, RuntimeError, VersionKey,
};
use agent_runtime_orchestrator_core::infrastructure::control_plane::{
    Operation, SimulatedControlPlane, SimulationSettings,
};
use agent_runtime_orchestrator_core::infrastructure::event_bus::{DomainEvent, EventBus, EventReceiver};
use agent_runtime_orchestrator_core::infrastructure::notifications::BestEffortNotifier;
use agent_runtime_orchestrator_core::infrastructure::repositories::InMemoryRuntimeRegistry;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

struct Harness {
    control_plane: Arc<SimulatedControlPlane>,
    registry: InMemoryRuntimeRegistry,
    orchestrator: Arc<LifecycleOrchestrator>,
    event_bus: Arc<EventBus>,
}

impl Harness {
    fn new() -> Self {
        Self::with(SimulationSettings::default(), DeploymentConfig::default(), fast_policy())
    }

    fn with(settings: SimulationSettings, deployment: DeploymentConfig, policy: PollingPolicy) -> Self {
        let control_plane = Arc::new(SimulatedControlPlane::new(settings));
        let registry = InMemoryRuntimeRegistry::new();
        let event_bus = Arc::new(EventBus::with_default_capacity());

        let client = ControlPlaneClient::new(
            control_plane.clone(),
            &ControlPlaneConfig::default(),
            deployment,
        );
        let steps = LifecycleSteps::new(
            Arc::new(client),
            Arc::new(registry.clone()),
            Arc::new(registry.clone()),
            BestEffortNotifier::new(event_bus.clone()),
        );
        let orchestrator = LifecycleOrchestrator::new(
            Arc::new(steps),
            Arc::new(registry.clone()),
            Arc::new(registry.clone()),
            policy,
            4,
            event_bus.clone(),
        );

        Self {
            control_plane,
            registry,
            orchestrator: Arc::new(orchestrator),
            event_bus,
        }
    }

    fn service(&self) -> RuntimeLifecycleService {
        RuntimeLifecycleService::new(
            self.orchestrator.clone(),
            Arc::new(self.registry.clone()),
            Arc::new(self.registry.clone()),
        )
    }

    async fn create(&self, configuration: &str) -> WorkflowReport {
        self.orchestrator
            .run_create(
                agent(),
                ConfigurationValue::new(configuration).unwrap(),
                ArchitectureType::Single,
                Uuid::new_v4(),
            )
            .await
            .unwrap()
    }

    async fn delete(&self) -> WorkflowReport {
        self.orchestrator
            .run_delete(agent(), Uuid::new_v4())
            .await
            .unwrap()
    }
}

fn fast_policy() -> PollingPolicy {
    PollingPolicy {
        initial_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(2),
        multiplier: 2.0,
        budget: Duration::from_millis(60),
        propagation_grace: Duration::from_millis(20),
    }
}

/// Keeps polling effectively forever, for runs that are aborted by the test
fn patient_policy() -> PollingPolicy {
    PollingPolicy {
        budget: Duration::from_secs(30),
        ..fast_policy()
    }
}

fn agent() -> AgentName {
    AgentName::new("demo").unwrap()
}

/// Phases entered by `workflow`, in order
fn phases_entered(receiver: &mut EventReceiver, workflow: WorkflowKind) -> Vec<LifecyclePhase> {
    let mut phases = Vec::new();
    while let Ok(event) = receiver.try_recv() {
        if let DomainEvent::Lifecycle(RuntimeLifecycleEvent::PhaseEntered {
            workflow: kind,
            phase,
            ..
        }) = event
        {
            if kind == workflow {
                phases.push(phase);
            }
        }
    }
    phases
}

fn position(calls: &[Operation], operation: Operation) -> Vec<usize> {
    calls
        .iter()
        .enumerate()
        .filter(|(_, op)| **op == operation)
        .map(|(i, _)| i)
        .collect()
}

// ============================================================================
// Create
// ============================================================================

#[tokio::test]
async fn test_create_without_memory_skips_memory_phases() {
    let harness = Harness::new();
    let mut events = harness.event_bus.subscribe();

    let report = harness.create(r#"{"model":"x"}"#).await;

    assert_eq!(report.outcome, WorkflowOutcome::Completed);
    let expected_key = VersionKey::derive(br#"{"model":"x"}"#);
    assert_eq!(report.version_key, Some(expected_key));

    let phases = phases_entered(&mut events, WorkflowKind::Create);
    assert!(!phases.contains(&LifecyclePhase::EnsureMemory));
    assert!(!phases.contains(&LifecyclePhase::AwaitMemory));
    assert_eq!(
        phases,
        vec![
            LifecyclePhase::CreateRuntime,
            LifecyclePhase::AwaitRuntime,
            LifecyclePhase::Seed,
            LifecyclePhase::NotifyAndComplete,
        ]
    );
    assert!(harness.control_plane.calls_to(Operation::CreateMemory).is_empty());

    let versions = harness.registry.list_versions(&agent()).await.unwrap();
    assert_eq!(versions.len(), 1);
    assert_eq!(versions[0].created_at, expected_key);
    assert_eq!(versions[0].runtime_version, "1");

    let summary = harness.registry.find_summary(&agent()).await.unwrap().unwrap();
    assert_eq!(summary.phase, LifecyclePhase::Completed);
    assert_eq!(summary.status(), "Ready");
    assert_eq!(summary.number_of_versions, 1);
    assert_eq!(summary.qualifier_to_version.get("DEFAULT").map(String::as_str), Some("1"));
    assert!(summary.memory_id.is_none());
}

#[tokio::test]
async fn test_identical_create_converges_on_one_version() {
    let harness = Harness::new();

    let first = harness.create(r#"{"model":"x"}"#).await;
    let second = harness.create(r#"{"model":"x"}"#).await;

    assert_eq!(first.outcome, WorkflowOutcome::Completed);
    assert_eq!(second.outcome, WorkflowOutcome::Completed);
    assert_eq!(first.version_key, second.version_key);
    assert_eq!(harness.registry.list_versions(&agent()).await.unwrap().len(), 1);
    assert_eq!(harness.control_plane.calls_to(Operation::CreateRuntime).len(), 1);
    assert!(harness.control_plane.calls_to(Operation::UpdateRuntime).is_empty());
}

#[tokio::test]
async fn test_new_configuration_adds_a_runtime_version() {
    let harness = Harness::new();

    harness.create(r#"{"model":"x"}"#).await;
    let report = harness.create(r#"{"model":"y"}"#).await;

    assert_eq!(report.outcome, WorkflowOutcome::Completed);
    assert_eq!(harness.control_plane.calls_to(Operation::UpdateRuntime).len(), 1);

    let versions = harness.registry.list_versions(&agent()).await.unwrap();
    assert_eq!(versions.len(), 2);
    let summary = harness.registry.find_summary(&agent()).await.unwrap().unwrap();
    assert_eq!(summary.number_of_versions, 2);
    assert_eq!(summary.qualifier_to_version.get("DEFAULT").map(String::as_str), Some("2"));
}

#[tokio::test]
async fn test_create_with_memory_passes_memory_to_runtime() {
    let harness = Harness::new();
    let mut events = harness.event_bus.subscribe();

    let report = harness.create(r#"{"model":"x","useMemory":true}"#).await;
    assert_eq!(report.outcome, WorkflowOutcome::Completed);

    let phases = phases_entered(&mut events, WorkflowKind::Create);
    assert!(phases.contains(&LifecyclePhase::EnsureMemory));
    assert!(phases.contains(&LifecyclePhase::AwaitMemory));

    let summary = harness.registry.find_summary(&agent()).await.unwrap().unwrap();
    let memory_id = summary.memory_id.clone().unwrap();
    assert!(memory_id.as_str().starts_with("demoMemory-"));

    let runtime_id = summary.runtime_id.clone().unwrap();
    let environment = harness.control_plane.runtime_environment(&runtime_id).unwrap();
    assert_eq!(environment.get("agentName").map(String::as_str), Some("demo"));
    assert_eq!(environment.get("memoryId"), Some(&memory_id.to_string()));
    assert_eq!(
        environment.get("createdAt"),
        Some(&report.version_key.unwrap().to_string())
    );
    assert!(environment.contains_key("accountId"));
}

#[tokio::test]
async fn test_check_before_visibility_is_retried() {
    let harness = Harness::with(
        SimulationSettings {
            propagation_polls: 2,
            ..Default::default()
        },
        DeploymentConfig::default(),
        fast_policy(),
    );

    let report = harness.create(r#"{"model":"x","useMemory":true}"#).await;

    assert_eq!(report.outcome, WorkflowOutcome::Completed);
    // Two not-found answers, one transitional answer, then ACTIVE / READY
    assert!(harness.control_plane.calls_to(Operation::GetMemory).len() >= 4);
    assert!(harness.control_plane.calls_to(Operation::GetRuntime).len() >= 4);
}

#[tokio::test]
async fn test_resource_that_never_appears_fails_after_grace() {
    let harness = Harness::with(
        SimulationSettings {
            propagation_polls: 10_000,
            ..Default::default()
        },
        DeploymentConfig::default(),
        fast_policy(),
    );

    let report = harness.create(r#"{"model":"x"}"#).await;

    assert!(matches!(report.outcome, WorkflowOutcome::Failed { .. }));
    let summary = harness.registry.find_summary(&agent()).await.unwrap().unwrap();
    assert_eq!(summary.phase, LifecyclePhase::Failed);
    assert!(summary.last_error.unwrap().contains("not visible"));
    assert!(harness.registry.list_versions(&agent()).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_runtime_owned_by_another_stack_is_not_updated() {
    let harness = Harness::new();
    harness.control_plane.insert_runtime(
        "demo",
        HashMap::from([("Stack".to_string(), "someone-else".to_string())]),
    );

    let report = harness.create(r#"{"model":"x"}"#).await;

    match report.outcome {
        WorkflowOutcome::Failed { reason } => assert!(reason.contains("not created by this stack")),
        other => panic!("expected a failure, got {:?}", other),
    }
    assert!(harness.control_plane.calls_to(Operation::UpdateRuntime).is_empty());
}

#[tokio::test]
async fn test_swarm_without_container_uri_fails_before_remote_calls() {
    let harness = Harness::new();

    let report = harness
        .orchestrator
        .run_create(
            agent(),
            ConfigurationValue::new(r#"{"model":"x"}"#).unwrap(),
            ArchitectureType::Swarm,
            Uuid::new_v4(),
        )
        .await
        .unwrap();

    assert!(matches!(report.outcome, WorkflowOutcome::Failed { .. }));
    assert!(harness.control_plane.calls_to(Operation::ListRuntimes).is_empty());
    assert!(harness.control_plane.calls_to(Operation::CreateRuntime).is_empty());
}

#[tokio::test]
async fn test_throttling_is_retried_within_budget() {
    let harness = Harness::new();
    harness
        .control_plane
        .fail_next(Operation::CreateRuntime, ControlPlaneError::Throttled("rate exceeded".into()));
    harness
        .control_plane
        .fail_next(Operation::GetRuntime, ControlPlaneError::Transient("503".into()));

    let report = harness.create(r#"{"model":"x"}"#).await;

    assert_eq!(report.outcome, WorkflowOutcome::Completed);
    assert_eq!(harness.control_plane.calls_to(Operation::CreateRuntime).len(), 2);
}

// ============================================================================
// Delete
// ============================================================================

#[tokio::test]
async fn test_delete_removes_endpoints_before_runtime() {
    let harness = Harness::new();
    harness.create(r#"{"model":"x","useMemory":true}"#).await;
    let runtime_id = harness
        .registry
        .find_summary(&agent())
        .await
        .unwrap()
        .unwrap()
        .runtime_id
        .unwrap();
    harness.control_plane.insert_endpoint(&runtime_id, "blue");
    harness.control_plane.insert_endpoint(&runtime_id, "green");

    let report = harness.delete().await;
    assert_eq!(report.outcome, WorkflowOutcome::Completed);

    let calls: Vec<Operation> = harness
        .control_plane
        .calls()
        .into_iter()
        .map(|call| call.operation)
        .collect();
    let delete_runtime = position(&calls, Operation::DeleteRuntime);
    assert_eq!(delete_runtime.len(), 1);
    let last_endpoint_call = position(&calls, Operation::DeleteEndpoint)
        .into_iter()
        .chain(position(&calls, Operation::GetEndpoint))
        .max()
        .unwrap();
    assert!(last_endpoint_call < delete_runtime[0]);

    assert!(harness.control_plane.runtime_by_name("demo").is_none());
    assert!(harness.control_plane.memory_ids().is_empty());
    assert!(harness.registry.find_summary(&agent()).await.unwrap().is_none());
    assert!(harness.registry.list_versions(&agent()).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_registry_outlives_unconfirmed_runtime_deletion() {
    let harness = Harness::new();
    harness.create(r#"{"model":"x"}"#).await;
    let runtime_id = harness
        .registry
        .find_summary(&agent())
        .await
        .unwrap()
        .unwrap()
        .runtime_id
        .unwrap();

    harness.control_plane.stick(runtime_id.as_str());
    // A stale "not found" arrives before the deletion is real
    harness
        .control_plane
        .fail_next(Operation::GetRuntime, ControlPlaneError::NotFound("stale read".into()));

    let report = harness.delete().await;

    match report.outcome {
        WorkflowOutcome::PartiallyFailed { remaining, .. } => {
            assert_eq!(remaining, vec![format!("runtime:{}", runtime_id)])
        }
        other => panic!("expected a partial failure, got {:?}", other),
    }
    let summary = harness.registry.find_summary(&agent()).await.unwrap().unwrap();
    assert_eq!(summary.phase, LifecyclePhase::PartiallyFailed);
    assert!(summary.last_error.is_some());
    assert_eq!(harness.registry.list_versions(&agent()).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_memory_deleted_out_of_band_is_skipped() {
    let harness = Harness::new();
    harness.create(r#"{"model":"x","useMemory":true}"#).await;
    let memory_id = harness
        .registry
        .find_summary(&agent())
        .await
        .unwrap()
        .unwrap()
        .memory_id
        .unwrap();
    harness.control_plane.remove_memory_out_of_band(&memory_id);

    let mut events = harness.event_bus.subscribe();
    let report = harness.delete().await;

    assert_eq!(report.outcome, WorkflowOutcome::Completed);
    let phases = phases_entered(&mut events, WorkflowKind::Delete);
    assert!(!phases.contains(&LifecyclePhase::DeleteMemory));
    assert!(!phases.contains(&LifecyclePhase::AwaitMemoryDeleted));
    let check = phases
        .iter()
        .position(|p| *p == LifecyclePhase::CheckMemoryExists)
        .unwrap();
    assert_eq!(phases[check + 1], LifecyclePhase::DeleteRuntime);
    assert!(harness.control_plane.calls_to(Operation::DeleteMemory).is_empty());
}

#[tokio::test]
async fn test_stuck_endpoint_blocks_runtime_deletion() {
    let harness = Harness::new();
    harness.create(r#"{"model":"x"}"#).await;
    let runtime_id = harness
        .registry
        .find_summary(&agent())
        .await
        .unwrap()
        .unwrap()
        .runtime_id
        .unwrap();
    harness.control_plane.insert_endpoint(&runtime_id, "blue");
    harness.control_plane.stick("blue");

    let report = harness.delete().await;

    assert!(matches!(report.outcome, WorkflowOutcome::PartiallyFailed { .. }));
    assert!(harness.control_plane.calls_to(Operation::DeleteRuntime).is_empty());
    assert!(harness.control_plane.runtime_by_name("demo").is_some());
    assert!(harness.registry.find_summary(&agent()).await.unwrap().is_some());
}

#[tokio::test]
async fn test_delete_of_unknown_agent_completes() {
    let harness = Harness::new();

    let report = harness.delete().await;

    assert_eq!(report.outcome, WorkflowOutcome::Completed);
    assert!(harness.registry.find_summary(&agent()).await.unwrap().is_none());
    assert!(harness.control_plane.calls_to(Operation::DeleteRuntime).is_empty());
}

#[tokio::test]
async fn test_delete_leaves_runtime_of_another_stack_alone() {
    let harness = Harness::new();
    let foreign = harness.control_plane.insert_runtime(
        "demo",
        HashMap::from([("Stack".to_string(), "someone-else".to_string())]),
    );
    harness.control_plane.insert_endpoint(&foreign, "blue");

    let report = harness.delete().await;

    assert_eq!(report.outcome, WorkflowOutcome::Completed);
    assert!(harness.control_plane.runtime_by_name("demo").is_some());
    assert!(harness
        .control_plane
        .endpoint_names(&foreign)
        .contains(&"blue".to_string()));
    assert!(harness.control_plane.calls_to(Operation::DeleteEndpoint).is_empty());
    assert!(harness.control_plane.calls_to(Operation::DeleteRuntime).is_empty());
}

// ============================================================================
// Delete endpoints
// ============================================================================

#[tokio::test]
async fn test_one_stuck_endpoint_of_three_is_reported() {
    let harness = Harness::new();
    harness.create(r#"{"model":"x"}"#).await;
    let runtime_id = harness
        .registry
        .find_summary(&agent())
        .await
        .unwrap()
        .unwrap()
        .runtime_id
        .unwrap();
    for name in ["blue", "green", "red"] {
        harness.control_plane.insert_endpoint(&runtime_id, name);
    }
    harness.control_plane.stick("green");

    let report = harness
        .orchestrator
        .run_delete_endpoints(agent(), Vec::new(), Uuid::new_v4())
        .await
        .unwrap();

    match report.outcome {
        WorkflowOutcome::PartiallyFailed { remaining, .. } => {
            assert_eq!(remaining, vec!["green".to_string()])
        }
        other => panic!("expected a partial failure, got {:?}", other),
    }
    let summary = harness.registry.find_summary(&agent()).await.unwrap().unwrap();
    assert_eq!(summary.pending_endpoints, vec!["green".to_string()]);
    assert_eq!(summary.status(), "PartiallyDeleted");
    assert_eq!(harness.control_plane.endpoint_names(&runtime_id), vec!["green".to_string()]);
    assert!(harness.control_plane.calls_to(Operation::DeleteRuntime).is_empty());

    // Once the endpoint settles a re-run finishes the job
    harness.control_plane.unstick("green");
    let rerun = harness
        .orchestrator
        .run_delete_endpoints(agent(), Vec::new(), Uuid::new_v4())
        .await
        .unwrap();
    assert_eq!(rerun.outcome, WorkflowOutcome::Completed);
    assert!(harness.control_plane.endpoint_names(&runtime_id).is_empty());
}

#[tokio::test]
async fn test_delete_endpoints_only_touches_requested_names() {
    let harness = Harness::new();
    harness.create(r#"{"model":"x"}"#).await;
    let runtime_id = harness
        .registry
        .find_summary(&agent())
        .await
        .unwrap()
        .unwrap()
        .runtime_id
        .unwrap();
    harness.control_plane.insert_endpoint(&runtime_id, "blue");
    harness.control_plane.insert_endpoint(&runtime_id, "green");

    let report = harness
        .orchestrator
        .run_delete_endpoints(
            agent(),
            vec!["blue".to_string(), "missing".to_string()],
            Uuid::new_v4(),
        )
        .await
        .unwrap();

    assert_eq!(report.outcome, WorkflowOutcome::Completed);
    assert_eq!(harness.control_plane.endpoint_names(&runtime_id), vec!["green".to_string()]);
}

#[tokio::test]
async fn test_delete_endpoints_for_unknown_agent_is_rejected() {
    let harness = Harness::new();

    let result = harness
        .orchestrator
        .run_delete_endpoints(agent(), Vec::new(), Uuid::new_v4())
        .await;

    assert!(matches!(result, Err(LifecycleError::UnknownAgent(_))));
}

// ============================================================================
// Tagging
// ============================================================================

#[tokio::test]
async fn test_tag_then_delete_endpoint_updates_qualifiers() {
    let harness = Harness::new();
    harness.create(r#"{"model":"x"}"#).await;

    let tagged = harness
        .orchestrator
        .run_tag_endpoint(agent(), "1".to_string(), "blue".to_string(), None, Uuid::new_v4())
        .await
        .unwrap();
    assert_eq!(tagged.outcome, WorkflowOutcome::Completed);
    let summary = harness.registry.find_summary(&agent()).await.unwrap().unwrap();
    assert_eq!(summary.qualifier_to_version.get("blue").map(String::as_str), Some("1"));

    let deleted = harness
        .orchestrator
        .run_delete_endpoints(agent(), vec!["blue".to_string()], Uuid::new_v4())
        .await
        .unwrap();
    assert_eq!(deleted.outcome, WorkflowOutcome::Completed);
    let summary = harness.registry.find_summary(&agent()).await.unwrap().unwrap();
    assert!(!summary.qualifier_to_version.contains_key("blue"));
    assert!(summary.qualifier_to_version.contains_key("DEFAULT"));
}

#[tokio::test]
async fn test_tag_rejects_reserved_and_unknown_targets() {
    let harness = Harness::new();

    let unknown = harness
        .orchestrator
        .run_tag_endpoint(agent(), "1".to_string(), "blue".to_string(), None, Uuid::new_v4())
        .await;
    assert!(matches!(unknown, Err(LifecycleError::UnknownAgent(_))));

    harness.create(r#"{"model":"x"}"#).await;
    let reserved = harness
        .orchestrator
        .run_tag_endpoint(agent(), "1".to_string(), "DEFAULT".to_string(), None, Uuid::new_v4())
        .await;
    assert!(matches!(
        reserved,
        Err(LifecycleError::Runtime(RuntimeError::InvalidEndpointName(_)))
    ));
}

// ============================================================================
// Submission
// ============================================================================

async fn wait_for_phase(harness: &Harness, phase: LifecyclePhase) {
    for _ in 0..500 {
        if let Some(summary) = harness.registry.find_summary(&agent()).await.unwrap() {
            if summary.phase == phase {
                return;
            }
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    panic!("summary never reached {:?}", phase);
}

#[tokio::test]
async fn test_live_run_blocks_second_submission() {
    let harness = Harness::with(
        SimulationSettings::default(),
        DeploymentConfig::default(),
        patient_policy(),
    );
    harness.control_plane.stick("demo");
    let service = harness.service();

    let first = service
        .submit_create(
            agent(),
            ConfigurationValue::new(r#"{"model":"x"}"#).unwrap(),
            ArchitectureType::Single,
        )
        .await
        .unwrap();
    assert!(service.is_active(&agent()));

    let second = service.submit_delete(agent()).await;
    assert!(matches!(second, Err(ServiceError::AgentBusy { .. })));

    first.handle.abort();
    let _ = first.handle.await;
    assert!(!service.is_active(&agent()));
}

#[tokio::test]
async fn test_stale_create_is_resumed_by_resubmission() {
    let harness = Harness::with(
        SimulationSettings::default(),
        DeploymentConfig::default(),
        patient_policy(),
    );
    harness.control_plane.stick("demo");
    let service = harness.service();
    let configuration = ConfigurationValue::new(r#"{"model":"x"}"#).unwrap();

    let crashed = service
        .submit_create(agent(), configuration.clone(), ArchitectureType::Single)
        .await
        .unwrap();
    wait_for_phase(&harness, LifecyclePhase::AwaitRuntime).await;
    crashed.handle.abort();
    let _ = crashed.handle.await;

    // The stale Create still blocks other workflows
    let blocked = service.submit_delete(agent()).await;
    assert!(matches!(
        blocked,
        Err(ServiceError::Lifecycle(LifecycleError::Runtime(
            RuntimeError::WorkflowInProgress { .. }
        )))
    ));

    harness.control_plane.unstick("demo");
    let report = service
        .submit_create(agent(), configuration, ArchitectureType::Single)
        .await
        .unwrap()
        .wait()
        .await
        .unwrap();

    assert_eq!(report.outcome, WorkflowOutcome::Completed);
    assert_eq!(report.resumed_from, Some(LifecyclePhase::AwaitRuntime));
    assert_eq!(harness.control_plane.calls_to(Operation::CreateRuntime).len(), 1);
    assert_eq!(service.list_versions(&agent()).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_stale_endpoint_deletion_restarts_for_other_endpoints() {
    let harness = Harness::with(
        SimulationSettings::default(),
        DeploymentConfig::default(),
        patient_policy(),
    );
    harness.create(r#"{"model":"x"}"#).await;
    let runtime_id = harness
        .registry
        .find_summary(&agent())
        .await
        .unwrap()
        .unwrap()
        .runtime_id
        .unwrap();
    harness.control_plane.insert_endpoint(&runtime_id, "blue");
    harness.control_plane.insert_endpoint(&runtime_id, "green");
    harness.control_plane.stick("blue");
    let service = harness.service();

    let crashed = service
        .submit_delete_endpoints(agent(), vec!["blue".to_string()])
        .await
        .unwrap();
    wait_for_phase(&harness, LifecyclePhase::AwaitEndpointsDeleted).await;
    crashed.handle.abort();
    let _ = crashed.handle.await;

    let report = service
        .submit_delete_endpoints(agent(), vec!["green".to_string()])
        .await
        .unwrap()
        .wait()
        .await
        .unwrap();

    assert_eq!(report.outcome, WorkflowOutcome::Completed);
    assert_eq!(report.resumed_from, None);
    assert!(!harness
        .control_plane
        .endpoint_names(&runtime_id)
        .contains(&"green".to_string()));
}

#[tokio::test]
async fn test_stale_tag_restarts_for_another_qualifier() {
    let harness = Harness::with(
        SimulationSettings::default(),
        DeploymentConfig::default(),
        patient_policy(),
    );
    harness.create(r#"{"model":"x"}"#).await;
    harness.control_plane.stick("blue");
    let service = harness.service();

    let crashed = service
        .submit_tag(agent(), "1".to_string(), "blue".to_string(), None)
        .await
        .unwrap();
    wait_for_phase(&harness, LifecyclePhase::AwaitEndpointReady).await;
    crashed.handle.abort();
    let _ = crashed.handle.await;

    let report = service
        .submit_tag(agent(), "1".to_string(), "green".to_string(), None)
        .await
        .unwrap()
        .wait()
        .await
        .unwrap();

    assert_eq!(report.outcome, WorkflowOutcome::Completed);
    assert_eq!(report.resumed_from, None);
    let summary = harness.registry.find_summary(&agent()).await.unwrap().unwrap();
    assert_eq!(summary.qualifier_to_version.get("green").map(String::as_str), Some("1"));
    assert!(!summary.qualifier_to_version.contains_key("blue"));
}

#[tokio::test]
async fn test_every_finished_workflow_notifies() {
    let harness = Harness::new();
    let mut receiver = harness.event_bus.subscribe_agent(agent());

    harness.create(r#"{"model":"x"}"#).await;

    let mut notifications = 0;
    let mut finished = None;
    while let Ok(Ok(event)) =
        tokio::time::timeout(Duration::from_millis(50), receiver.recv()).await
    {
        match event {
            DomainEvent::RuntimeChanged(notification) => {
                assert_eq!(notification.agent_name, agent());
                notifications += 1;
            }
            DomainEvent::Lifecycle(RuntimeLifecycleEvent::WorkflowFinished { outcome, .. }) => {
                finished = Some(outcome);
            }
            DomainEvent::Lifecycle(_) => {}
        }
    }

    // Runtime readiness checkpoint plus the end of the workflow
    assert_eq!(notifications, 2);
    assert_eq!(finished, Some(WorkflowOutcome::Completed));
}
