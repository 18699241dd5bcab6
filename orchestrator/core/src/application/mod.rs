// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod control_plane_client;
pub mod lifecycle;
pub mod lifecycle_service;
pub mod polling;
pub mod repository_factory;
pub mod steps;

// Re-export use cases for convenience
pub use lifecycle::{LifecycleError, LifecycleOrchestrator, WorkflowReport};
pub use lifecycle_service::{RuntimeLifecycleService, ServiceError, SubmittedWorkflow};
pub use repository_factory::{create_runtime_registry, RuntimeRegistry};
