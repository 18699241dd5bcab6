// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Workflow Kinds and Lifecycle Phases
//!
//! Every workflow run is a walk through [`LifecyclePhase`] values. The phase is
//! persisted on the `RuntimeSummary` after each transition, which makes it both
//! the crash/resume checkpoint and the per-agent mutual-exclusion signal.
//!
//! Variants are declared so that, within any single workflow, each phase sorts
//! after every phase that precedes it. `Ord` on the enum is therefore the
//! monotonicity check: a run may re-enter its current phase (retry) but never
//! go back to an earlier one.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The top-level workflows the orchestrator knows how to drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowKind {
    Create,
    Delete,
    DeleteEndpoints,
    TagEndpoint,
}

impl WorkflowKind {
    /// First non-terminal phase of a fresh run
    pub fn initial_phase(&self) -> LifecyclePhase {
        match self {
            WorkflowKind::Create => LifecyclePhase::Init,
            WorkflowKind::Delete | WorkflowKind::DeleteEndpoints => LifecyclePhase::ListEndpoints,
            WorkflowKind::TagEndpoint => LifecyclePhase::CreateEndpoint,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowKind::Create => "create",
            WorkflowKind::Delete => "delete",
            WorkflowKind::DeleteEndpoints => "delete_endpoints",
            WorkflowKind::TagEndpoint => "tag_endpoint",
        }
    }

    /// Whether budget exhaustion degrades to `PartiallyFailed` instead of `Failed`
    pub fn tolerates_partial_failure(&self) -> bool {
        matches!(self, WorkflowKind::Delete | WorkflowKind::DeleteEndpoints)
    }
}

impl fmt::Display for WorkflowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecyclePhase {
    // Create
    Init,
    EnsureMemory,
    AwaitMemory,
    CreateRuntime,
    AwaitRuntime,
    Seed,

    // Delete and DeleteEndpoints
    ListEndpoints,
    DeleteEndpoints,
    AwaitEndpointsDeleted,
    CheckMemoryExists,
    DeleteMemory,
    AwaitMemoryDeleted,
    DeleteRuntime,
    AwaitRuntimeDeleted,
    RemoveRegistryReferences,

    // TagEndpoint
    CreateEndpoint,
    AwaitEndpointReady,

    NotifyAndComplete,

    // Terminal
    Completed,
    Failed,
    PartiallyFailed,
}

impl LifecyclePhase {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            LifecyclePhase::Completed | LifecyclePhase::Failed | LifecyclePhase::PartiallyFailed
        )
    }

    /// Whether this phase is part of the given workflow's state machine.
    /// Terminal phases belong to every workflow.
    pub fn belongs_to(&self, kind: WorkflowKind) -> bool {
        use LifecyclePhase::*;
        if self.is_terminal() || *self == NotifyAndComplete {
            return true;
        }
        match kind {
            WorkflowKind::Create => matches!(
                self,
                Init | EnsureMemory | AwaitMemory | CreateRuntime | AwaitRuntime | Seed
            ),
            WorkflowKind::Delete => matches!(
                self,
                ListEndpoints
                    | DeleteEndpoints
                    | AwaitEndpointsDeleted
                    | CheckMemoryExists
                    | DeleteMemory
                    | AwaitMemoryDeleted
                    | DeleteRuntime
                    | AwaitRuntimeDeleted
                    | RemoveRegistryReferences
            ),
            WorkflowKind::DeleteEndpoints => {
                matches!(self, ListEndpoints | DeleteEndpoints | AwaitEndpointsDeleted)
            }
            WorkflowKind::TagEndpoint => matches!(self, CreateEndpoint | AwaitEndpointReady),
        }
    }

    /// Operator-facing status label shown next to the agent
    pub fn status_label(&self, kind: Option<WorkflowKind>) -> &'static str {
        match self {
            LifecyclePhase::Completed => "Ready",
            LifecyclePhase::Failed => "Failed",
            LifecyclePhase::PartiallyFailed => "PartiallyDeleted",
            _ => match kind {
                Some(WorkflowKind::Create) | None => "Creating",
                Some(WorkflowKind::Delete) => "Deleting",
                Some(WorkflowKind::DeleteEndpoints) => "DeletingEndpoints",
                Some(WorkflowKind::TagEndpoint) => "Tagging",
            },
        }
    }
}

impl fmt::Display for LifecyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// How a workflow run ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum WorkflowOutcome {
    Completed,
    Failed {
        reason: String,
    },
    /// Only reachable from delete workflows. `remaining` enumerates the
    /// sub-resources a re-run still has to remove.
    PartiallyFailed {
        reason: String,
        remaining: Vec<String>,
    },
}

impl WorkflowOutcome {
    pub fn phase(&self) -> LifecyclePhase {
        match self {
            WorkflowOutcome::Completed => LifecyclePhase::Completed,
            WorkflowOutcome::Failed { .. } => LifecyclePhase::Failed,
            WorkflowOutcome::PartiallyFailed { .. } => LifecyclePhase::PartiallyFailed,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            WorkflowOutcome::Completed => "completed",
            WorkflowOutcome::Failed { .. } => "failed",
            WorkflowOutcome::PartiallyFailed { .. } => "partially_failed",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, WorkflowOutcome::Completed)
    }
}
