// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Repository Factory - Application Layer
//!
//! Creates the concrete runtime registry selected by the `registry` section of
//! the lifecycle configuration. Keeps the domain layer free of infrastructure
//! dependencies.

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

use crate::domain::lifecycle_config::{resolve_env_value, RegistryConfig};
use crate::domain::repository::{RuntimeSummaryRepository, RuntimeVersionRepository};
use crate::infrastructure::repositories::{InMemoryRuntimeRegistry, PostgresRuntimeRegistry};

/// Both registry collections, usually backed by one store
#[derive(Clone)]
pub struct RuntimeRegistry {
    pub versions: Arc<dyn RuntimeVersionRepository>,
    pub summaries: Arc<dyn RuntimeSummaryRepository>,
}

impl RuntimeRegistry {
    pub fn in_memory() -> Self {
        let registry = InMemoryRuntimeRegistry::new();
        Self {
            versions: Arc::new(registry.clone()),
            summaries: Arc::new(registry),
        }
    }
}

/// Creates the registry for the configured backend. Postgres connections run
/// pending migrations before returning.
pub async fn create_runtime_registry(config: &RegistryConfig) -> Result<RuntimeRegistry> {
    match config {
        RegistryConfig::InMemory => {
            info!("Using in-memory runtime registry");
            Ok(RuntimeRegistry::in_memory())
        }
        RegistryConfig::Postgres {
            connection_string,
            max_connections,
        } => {
            let connection_string = resolve_env_value(connection_string)
                .context("Failed to resolve registry connection string")?;
            let registry = PostgresRuntimeRegistry::connect(&connection_string, *max_connections)
                .await
                .context("Failed to connect to the runtime registry database")?;
            info!(max_connections, "Using PostgreSQL runtime registry");
            let registry = Arc::new(registry);
            Ok(RuntimeRegistry {
                versions: registry.clone(),
                summaries: registry,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::runtime::{AgentName, RuntimeSummary};

    #[tokio::test]
    async fn test_in_memory_registry_shares_one_store() {
        let registry = create_runtime_registry(&RegistryConfig::InMemory).await.unwrap();
        let agent_name = AgentName::new("demo").unwrap();
        registry
            .summaries
            .save_summary(&RuntimeSummary::new(agent_name.clone()))
            .await
            .unwrap();
        assert!(registry.summaries.find_summary(&agent_name).await.unwrap().is_some());
        assert!(registry.versions.list_versions(&agent_name).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unresolvable_connection_string_is_an_error() {
        let config = RegistryConfig::Postgres {
            connection_string: "env:ARO_TEST_UNSET_DATABASE_URL".to_string(),
            max_connections: 1,
        };
        assert!(create_runtime_registry(&config).await.is_err());
    }
}
