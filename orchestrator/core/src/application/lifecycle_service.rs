// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Runtime Lifecycle Service
//!
//! Submission facade in front of the [`LifecycleOrchestrator`]. Each accepted
//! submission runs as its own tokio task; different agents run in parallel.
//!
//! Single-flight per agent:
//! - an agent with a workflow task alive in this process is rejected with
//!   [`ServiceError::AgentBusy`];
//! - a non-terminal summary with no live task is a run left behind by a crash.
//!   Resubmitting the same workflow kind resumes it; any other kind is
//!   rejected until that run reaches a terminal phase.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::info;
use uuid::Uuid;

use crate::application::lifecycle::{LifecycleError, LifecycleOrchestrator, WorkflowReport};
use crate::domain::lifecycle::WorkflowKind;
use crate::domain::repository::{
    RepositoryError, RuntimeSummaryRepository, RuntimeVersionRepository,
};
use crate::domain::runtime::{
    AgentName, ArchitectureType, ConfigurationValue, RuntimeError, RuntimeSummary, RuntimeVersion,
};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Agent {agent_name} already has a workflow running (run {run_id})")]
    AgentBusy { agent_name: String, run_id: Uuid },

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error("Registry error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("Workflow task ended abnormally: {0}")]
    Join(String),
}

impl From<RuntimeError> for ServiceError {
    fn from(e: RuntimeError) -> Self {
        ServiceError::Lifecycle(LifecycleError::Runtime(e))
    }
}

/// Handle to a submitted workflow
pub struct SubmittedWorkflow {
    pub run_id: Uuid,
    pub handle: JoinHandle<Result<WorkflowReport, LifecycleError>>,
}

impl SubmittedWorkflow {
    /// Wait for the workflow to reach a terminal phase
    pub async fn wait(self) -> Result<WorkflowReport, ServiceError> {
        match self.handle.await {
            Ok(result) => Ok(result?),
            Err(e) => Err(ServiceError::Join(e.to_string())),
        }
    }
}

/// Frees the agent's slot when the task ends, panics included
struct ActiveRunGuard {
    active: Arc<DashMap<AgentName, Uuid>>,
    agent_name: AgentName,
}

impl Drop for ActiveRunGuard {
    fn drop(&mut self) {
        self.active.remove(&self.agent_name);
    }
}

pub struct RuntimeLifecycleService {
    orchestrator: Arc<LifecycleOrchestrator>,
    versions: Arc<dyn RuntimeVersionRepository>,
    summaries: Arc<dyn RuntimeSummaryRepository>,
    active: Arc<DashMap<AgentName, Uuid>>,
}

impl RuntimeLifecycleService {
    pub fn new(
        orchestrator: Arc<LifecycleOrchestrator>,
        versions: Arc<dyn RuntimeVersionRepository>,
        summaries: Arc<dyn RuntimeSummaryRepository>,
    ) -> Self {
        Self {
            orchestrator,
            versions,
            summaries,
            active: Arc::new(DashMap::new()),
        }
    }

    pub fn is_active(&self, agent_name: &AgentName) -> bool {
        self.active.contains_key(agent_name)
    }

    // ------------------------------------------------------------------
    // Submissions
    // ------------------------------------------------------------------

    pub async fn submit_create(
        &self,
        agent_name: AgentName,
        configuration: ConfigurationValue,
        architecture: ArchitectureType,
    ) -> Result<SubmittedWorkflow, ServiceError> {
        let name = agent_name.clone();
        self.submit(WorkflowKind::Create, agent_name, move |orchestrator, run_id| async move {
            orchestrator
                .run_create(name, configuration, architecture, run_id)
                .await
        })
        .await
    }

    pub async fn submit_delete(&self, agent_name: AgentName) -> Result<SubmittedWorkflow, ServiceError> {
        let name = agent_name.clone();
        self.submit(WorkflowKind::Delete, agent_name, move |orchestrator, run_id| async move {
            orchestrator.run_delete(name, run_id).await
        })
        .await
    }

    pub async fn submit_delete_endpoints(
        &self,
        agent_name: AgentName,
        endpoint_names: Vec<String>,
    ) -> Result<SubmittedWorkflow, ServiceError> {
        let name = agent_name.clone();
        self.submit(
            WorkflowKind::DeleteEndpoints,
            agent_name,
            move |orchestrator, run_id| async move {
                orchestrator
                    .run_delete_endpoints(name, endpoint_names, run_id)
                    .await
            },
        )
        .await
    }

    pub async fn submit_tag(
        &self,
        agent_name: AgentName,
        runtime_version: String,
        qualifier: String,
        description: Option<String>,
    ) -> Result<SubmittedWorkflow, ServiceError> {
        let name = agent_name.clone();
        self.submit(
            WorkflowKind::TagEndpoint,
            agent_name,
            move |orchestrator, run_id| async move {
                orchestrator
                    .run_tag_endpoint(name, runtime_version, qualifier, description, run_id)
                    .await
            },
        )
        .await
    }

    async fn submit<F, Fut>(
        &self,
        kind: WorkflowKind,
        agent_name: AgentName,
        run: F,
    ) -> Result<SubmittedWorkflow, ServiceError>
    where
        F: FnOnce(Arc<LifecycleOrchestrator>, Uuid) -> Fut,
        Fut: Future<Output = Result<WorkflowReport, LifecycleError>> + Send + 'static,
    {
        let run_id = Uuid::new_v4();
        match self.active.entry(agent_name.clone()) {
            Entry::Occupied(entry) => {
                return Err(ServiceError::AgentBusy {
                    agent_name: agent_name.to_string(),
                    run_id: *entry.get(),
                })
            }
            Entry::Vacant(entry) => {
                entry.insert(run_id);
            }
        }
        let guard = ActiveRunGuard {
            active: self.active.clone(),
            agent_name: agent_name.clone(),
        };

        // Reject early instead of from inside the task
        if let Some(summary) = self.summaries.find_summary(&agent_name).await? {
            if summary.is_in_flight() && summary.workflow != Some(kind) {
                return Err(RuntimeError::WorkflowInProgress {
                    agent_name: agent_name.to_string(),
                    workflow: summary.workflow,
                    phase: summary.phase,
                }
                .into());
            }
        }

        info!(agent_name = %agent_name, workflow = %kind, %run_id, "Workflow submitted");
        let future = run(self.orchestrator.clone(), run_id);
        let handle = tokio::spawn(async move {
            let _guard = guard;
            future.await
        });

        Ok(SubmittedWorkflow { run_id, handle })
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub async fn get_summary(&self, agent_name: &AgentName) -> Result<Option<RuntimeSummary>, ServiceError> {
        Ok(self.summaries.find_summary(agent_name).await?)
    }

    pub async fn list_summaries(&self) -> Result<Vec<RuntimeSummary>, ServiceError> {
        Ok(self.summaries.list_summaries().await?)
    }

    pub async fn list_versions(&self, agent_name: &AgentName) -> Result<Vec<RuntimeVersion>, ServiceError> {
        Ok(self.versions.list_versions(agent_name).await?)
    }
}
