// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::lifecycle::{LifecyclePhase, WorkflowKind, WorkflowOutcome};
use crate::domain::runtime::AgentName;

/// The single outbound message consumers receive. It carries no snapshot;
/// consumers re-query the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeChangeNotification {
    #[serde(rename = "agentName")]
    pub agent_name: AgentName,
}

impl RuntimeChangeNotification {
    pub fn new(agent_name: AgentName) -> Self {
        Self { agent_name }
    }
}

/// In-process lifecycle events, published on the event bus for observers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RuntimeLifecycleEvent {
    WorkflowStarted {
        agent_name: AgentName,
        workflow: WorkflowKind,
        run_id: Uuid,
        resumed_at_phase: Option<LifecyclePhase>,
        started_at: DateTime<Utc>,
    },
    PhaseEntered {
        agent_name: AgentName,
        workflow: WorkflowKind,
        run_id: Uuid,
        phase: LifecyclePhase,
        entered_at: DateTime<Utc>,
    },
    WorkflowFinished {
        agent_name: AgentName,
        workflow: WorkflowKind,
        run_id: Uuid,
        outcome: WorkflowOutcome,
        finished_at: DateTime<Utc>,
    },
}

impl RuntimeLifecycleEvent {
    pub fn agent_name(&self) -> &AgentName {
        match self {
            RuntimeLifecycleEvent::WorkflowStarted { agent_name, .. }
            | RuntimeLifecycleEvent::PhaseEntered { agent_name, .. }
            | RuntimeLifecycleEvent::WorkflowFinished { agent_name, .. } => agent_name,
        }
    }
}

#[derive(Debug, Error)]
pub enum NotifierError {
    #[error("Notification delivery failed: {0}")]
    Delivery(String),

    #[error("Notification channel closed")]
    ChannelClosed,
}

/// Outbound publish-only interface for change notifications
#[async_trait]
pub trait ChangeNotifier: Send + Sync {
    async fn publish(&self, notification: RuntimeChangeNotification) -> Result<(), NotifierError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notification_payload_shape() {
        let notification = RuntimeChangeNotification::new(AgentName::new("demo").unwrap());
        let json = serde_json::to_value(&notification).unwrap();
        assert_eq!(json, serde_json::json!({ "agentName": "demo" }));
    }
}
