// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Domain Repository Interfaces
//!
//! Persistence contracts for the runtime registry, one repository per
//! aggregate root. Interfaces live in the domain layer and are implemented in
//! `crate::infrastructure::repositories`.
//!
//! | Trait | Aggregate | Implementations |
//! |-------|-----------|----------------|
//! | `RuntimeVersionRepository` | `RuntimeVersion` | `InMemoryRuntimeRegistry`, `PostgresRuntimeRegistry` |
//! | `RuntimeSummaryRepository` | `RuntimeSummary` | `InMemoryRuntimeRegistry`, `PostgresRuntimeRegistry` |
//!
//! ## Storage Backend Abstraction
//!
//! The concrete backend is selected at startup from the `registry` section of
//! `aro-config.yaml`. In-memory storage is used for development and tests;
//! PostgreSQL for anything that must survive a process restart.

use async_trait::async_trait;

use crate::domain::runtime::{AgentName, RuntimeSummary, RuntimeVersion, VersionKey};

/// Repository interface for RuntimeVersion records.
/// Records are immutable; (agent name, created-at) is unique.
#[async_trait]
pub trait RuntimeVersionRepository: Send + Sync {
    /// Insert the version unless one with the same key exists.
    /// Returns `true` when a new record was written.
    async fn put_version(&self, version: &RuntimeVersion) -> Result<bool, RepositoryError>;

    async fn find_version(
        &self,
        agent_name: &AgentName,
        created_at: VersionKey,
    ) -> Result<Option<RuntimeVersion>, RepositoryError>;

    /// All versions of an agent, newest recorded first
    async fn list_versions(
        &self,
        agent_name: &AgentName,
    ) -> Result<Vec<RuntimeVersion>, RepositoryError>;

    /// Bulk remove by agent name. Returns the number of removed records.
    async fn delete_versions(&self, agent_name: &AgentName) -> Result<usize, RepositoryError>;
}

/// Repository interface for RuntimeSummary records (status + checkpoint)
#[async_trait]
pub trait RuntimeSummaryRepository: Send + Sync {
    /// Save summary (create or update)
    async fn save_summary(&self, summary: &RuntimeSummary) -> Result<(), RepositoryError>;

    async fn find_summary(
        &self,
        agent_name: &AgentName,
    ) -> Result<Option<RuntimeSummary>, RepositoryError>;

    async fn list_summaries(&self) -> Result<Vec<RuntimeSummary>, RepositoryError>;

    async fn delete_summary(&self, agent_name: &AgentName) -> Result<(), RepositoryError>;
}

/// Repository errors
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl From<sqlx::Error> for RepositoryError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => RepositoryError::NotFound("Row not found".to_string()),
            _ => RepositoryError::Database(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for RepositoryError {
    fn from(err: serde_json::Error) -> Self {
        RepositoryError::Serialization(err.to_string())
    }
}

impl From<crate::domain::runtime::RuntimeError> for RepositoryError {
    fn from(err: crate::domain::runtime::RuntimeError) -> Self {
        RepositoryError::Serialization(err.to_string())
    }
}
