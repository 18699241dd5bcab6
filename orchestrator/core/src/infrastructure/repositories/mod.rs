// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Repository Implementations
//!
//! Infrastructure implementations of the runtime registry traits defined in
//! `crate::domain::repository`.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure
//! - **Purpose:** Persist and retrieve RuntimeVersion and RuntimeSummary records
//! - **Pattern:** Repository (DDD), Adapter (Hexagonal Architecture)
//!
//! # Available Implementations
//!
//! - **InMemoryRuntimeRegistry** - lock-protected maps, for tests and local runs
//! - **PostgresRuntimeRegistry** - durable storage, survives restarts
//!
//! Both types implement both traits so one instance serves as the whole
//! registry.

pub mod postgres_runtime;

pub use postgres_runtime::PostgresRuntimeRegistry;

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::domain::repository::{
    RepositoryError, RuntimeSummaryRepository, RuntimeVersionRepository,
};
use crate::domain::runtime::{AgentName, RuntimeSummary, RuntimeVersion, VersionKey};

#[derive(Clone, Default)]
pub struct InMemoryRuntimeRegistry {
    versions: Arc<RwLock<HashMap<AgentName, BTreeMap<VersionKey, RuntimeVersion>>>>,
    summaries: Arc<RwLock<HashMap<AgentName, RuntimeSummary>>>,
}

impl InMemoryRuntimeRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RuntimeVersionRepository for InMemoryRuntimeRegistry {
    async fn put_version(&self, version: &RuntimeVersion) -> Result<bool, RepositoryError> {
        let mut versions = self.versions.write();
        let agent_versions = versions.entry(version.agent_name.clone()).or_default();
        if agent_versions.contains_key(&version.created_at) {
            return Ok(false);
        }
        agent_versions.insert(version.created_at, version.clone());
        Ok(true)
    }

    async fn find_version(
        &self,
        agent_name: &AgentName,
        created_at: VersionKey,
    ) -> Result<Option<RuntimeVersion>, RepositoryError> {
        let versions = self.versions.read();
        Ok(versions
            .get(agent_name)
            .and_then(|agent_versions| agent_versions.get(&created_at))
            .cloned())
    }

    async fn list_versions(
        &self,
        agent_name: &AgentName,
    ) -> Result<Vec<RuntimeVersion>, RepositoryError> {
        let versions = self.versions.read();
        let mut list: Vec<RuntimeVersion> = versions
            .get(agent_name)
            .map(|agent_versions| agent_versions.values().cloned().collect())
            .unwrap_or_default();
        list.sort_by(|a, b| b.recorded_at.cmp(&a.recorded_at));
        Ok(list)
    }

    async fn delete_versions(&self, agent_name: &AgentName) -> Result<usize, RepositoryError> {
        let mut versions = self.versions.write();
        Ok(versions.remove(agent_name).map(|removed| removed.len()).unwrap_or(0))
    }
}

#[async_trait]
impl RuntimeSummaryRepository for InMemoryRuntimeRegistry {
    async fn save_summary(&self, summary: &RuntimeSummary) -> Result<(), RepositoryError> {
        let mut summaries = self.summaries.write();
        summaries.insert(summary.agent_name.clone(), summary.clone());
        Ok(())
    }

    async fn find_summary(
        &self,
        agent_name: &AgentName,
    ) -> Result<Option<RuntimeSummary>, RepositoryError> {
        let summaries = self.summaries.read();
        Ok(summaries.get(agent_name).cloned())
    }

    async fn list_summaries(&self) -> Result<Vec<RuntimeSummary>, RepositoryError> {
        let summaries = self.summaries.read();
        let mut list: Vec<RuntimeSummary> = summaries.values().cloned().collect();
        list.sort_by(|a, b| a.agent_name.cmp(&b.agent_name));
        Ok(list)
    }

    async fn delete_summary(&self, agent_name: &AgentName) -> Result<(), RepositoryError> {
        let mut summaries = self.summaries.write();
        summaries.remove(agent_name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::lifecycle::WorkflowKind;
    use crate::domain::runtime::{ArchitectureType, ConfigurationValue, RuntimeId};
    use chrono::Utc;
    use uuid::Uuid;

    fn version(agent: &str, config: &str, runtime_version: &str) -> RuntimeVersion {
        let configuration = ConfigurationValue::new(config).unwrap();
        RuntimeVersion {
            agent_name: AgentName::new(agent).unwrap(),
            created_at: configuration.version_key(),
            runtime_id: RuntimeId::new(format!("{}-rt", agent)),
            runtime_arn: format!("arn:runtime/{}-rt", agent),
            runtime_version: runtime_version.to_string(),
            configuration,
            architecture: ArchitectureType::Single,
            recorded_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_put_version_is_insert_only() {
        let registry = InMemoryRuntimeRegistry::new();
        let first = version("demo", r#"{"model":"x"}"#, "1");
        let mut duplicate = first.clone();
        duplicate.runtime_version = "2".to_string();

        assert!(registry.put_version(&first).await.unwrap());
        assert!(!registry.put_version(&duplicate).await.unwrap());

        let stored = registry
            .find_version(&first.agent_name, first.created_at)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.runtime_version, "1");
    }

    #[tokio::test]
    async fn test_delete_versions_is_scoped_to_agent() {
        let registry = InMemoryRuntimeRegistry::new();
        registry.put_version(&version("a", r#"{"model":"x"}"#, "1")).await.unwrap();
        registry.put_version(&version("a", r#"{"model":"y"}"#, "2")).await.unwrap();
        registry.put_version(&version("b", r#"{"model":"x"}"#, "1")).await.unwrap();

        let a = AgentName::new("a").unwrap();
        let b = AgentName::new("b").unwrap();
        assert_eq!(registry.delete_versions(&a).await.unwrap(), 2);
        assert!(registry.list_versions(&a).await.unwrap().is_empty());
        assert_eq!(registry.list_versions(&b).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_summary_crud() {
        let registry = InMemoryRuntimeRegistry::new();
        let name = AgentName::new("demo").unwrap();
        let mut summary = RuntimeSummary::new(name.clone());
        summary.begin(WorkflowKind::Create, Uuid::new_v4()).unwrap();

        registry.save_summary(&summary).await.unwrap();
        let found = registry.find_summary(&name).await.unwrap().unwrap();
        assert_eq!(found.workflow, Some(WorkflowKind::Create));
        assert_eq!(registry.list_summaries().await.unwrap().len(), 1);

        registry.delete_summary(&name).await.unwrap();
        assert!(registry.find_summary(&name).await.unwrap().is_none());
    }
}
