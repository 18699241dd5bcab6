// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Postgres Runtime Registry
//!
//! Durable RuntimeVersion and RuntimeSummary storage.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure Layer
//! - **Purpose:** Implements both registry traits on one connection pool
//!
//! Version rows are insert-only (`ON CONFLICT DO NOTHING`); the summary row is
//! upserted as a JSONB document with its phase denormalized for queries.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use tracing::info;

use crate::domain::repository::{
    RepositoryError, RuntimeSummaryRepository, RuntimeVersionRepository,
};
use crate::domain::runtime::{
    AgentName, ArchitectureType, ConfigurationValue, RuntimeId, RuntimeSummary, RuntimeVersion,
    VersionKey,
};

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

pub struct PostgresRuntimeRegistry {
    pool: PgPool,
}

impl PostgresRuntimeRegistry {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect and bring the schema up to date
    pub async fn connect(connection_string: &str, max_connections: u32) -> Result<Self, RepositoryError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(connection_string)
            .await?;
        let registry = Self::new(pool);
        registry.migrate().await?;
        Ok(registry)
    }

    pub async fn migrate(&self) -> Result<(), RepositoryError> {
        MIGRATOR
            .run(&self.pool)
            .await
            .map_err(|e| RepositoryError::Database(format!("Failed to apply migrations: {}", e)))?;
        info!("Runtime registry schema is up to date");
        Ok(())
    }
}

fn key_to_db(key: VersionKey) -> Result<i64, RepositoryError> {
    i64::try_from(key.value())
        .map_err(|_| RepositoryError::Serialization(format!("version key {} out of range", key)))
}

fn architecture_to_db(architecture: ArchitectureType) -> &'static str {
    match architecture {
        ArchitectureType::Single => "SINGLE",
        ArchitectureType::Swarm => "SWARM",
    }
}

#[async_trait]
impl RuntimeVersionRepository for PostgresRuntimeRegistry {
    async fn put_version(&self, version: &RuntimeVersion) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            r#"
            INSERT INTO runtime_versions (
                agent_name, created_at, runtime_id, runtime_arn,
                runtime_version, configuration, architecture, recorded_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (agent_name, created_at) DO NOTHING
            "#,
        )
        .bind(version.agent_name.as_str())
        .bind(key_to_db(version.created_at)?)
        .bind(version.runtime_id.as_str())
        .bind(&version.runtime_arn)
        .bind(&version.runtime_version)
        .bind(version.configuration.as_str())
        .bind(architecture_to_db(version.architecture))
        .bind(version.recorded_at)
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(format!("Failed to save runtime version: {}", e)))?;

        Ok(result.rows_affected() == 1)
    }

    async fn find_version(
        &self,
        agent_name: &AgentName,
        created_at: VersionKey,
    ) -> Result<Option<RuntimeVersion>, RepositoryError> {
        let row = sqlx::query(
            r#"
            SELECT agent_name, created_at, runtime_id, runtime_arn,
                   runtime_version, configuration, architecture, recorded_at
            FROM runtime_versions
            WHERE agent_name = $1 AND created_at = $2
            "#,
        )
        .bind(agent_name.as_str())
        .bind(key_to_db(created_at)?)
        .fetch_optional(&self.pool)
        .await?;

        row.map(parse_version_row).transpose()
    }

    async fn list_versions(
        &self,
        agent_name: &AgentName,
    ) -> Result<Vec<RuntimeVersion>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT agent_name, created_at, runtime_id, runtime_arn,
                   runtime_version, configuration, architecture, recorded_at
            FROM runtime_versions
            WHERE agent_name = $1
            ORDER BY recorded_at DESC
            "#,
        )
        .bind(agent_name.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(parse_version_row).collect()
    }

    async fn delete_versions(&self, agent_name: &AgentName) -> Result<usize, RepositoryError> {
        let result = sqlx::query("DELETE FROM runtime_versions WHERE agent_name = $1")
            .bind(agent_name.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() as usize)
    }
}

#[async_trait]
impl RuntimeSummaryRepository for PostgresRuntimeRegistry {
    async fn save_summary(&self, summary: &RuntimeSummary) -> Result<(), RepositoryError> {
        let summary_json = serde_json::to_value(summary)?;
        let phase = phase_column(&summary_json)?;

        sqlx::query(
            r#"
            INSERT INTO runtime_summaries (agent_name, workflow, phase, summary, updated_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (agent_name) DO UPDATE SET
                workflow = EXCLUDED.workflow,
                phase = EXCLUDED.phase,
                summary = EXCLUDED.summary,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(summary.agent_name.as_str())
        .bind(summary.workflow.map(|kind| kind.as_str()))
        .bind(phase)
        .bind(summary_json)
        .bind(summary.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(format!("Failed to save runtime summary: {}", e)))?;

        Ok(())
    }

    async fn find_summary(
        &self,
        agent_name: &AgentName,
    ) -> Result<Option<RuntimeSummary>, RepositoryError> {
        let row = sqlx::query("SELECT summary FROM runtime_summaries WHERE agent_name = $1")
            .bind(agent_name.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.map(parse_summary_row).transpose()
    }

    async fn list_summaries(&self) -> Result<Vec<RuntimeSummary>, RepositoryError> {
        let rows = sqlx::query("SELECT summary FROM runtime_summaries ORDER BY agent_name")
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(parse_summary_row).collect()
    }

    async fn delete_summary(&self, agent_name: &AgentName) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM runtime_summaries WHERE agent_name = $1")
            .bind(agent_name.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

fn parse_version_row(row: PgRow) -> Result<RuntimeVersion, RepositoryError> {
    let agent_name: String = row.try_get("agent_name")?;
    let created_at: i64 = row.try_get("created_at")?;
    let runtime_id: String = row.try_get("runtime_id")?;
    let runtime_arn: String = row.try_get("runtime_arn")?;
    let runtime_version: String = row.try_get("runtime_version")?;
    let configuration: String = row.try_get("configuration")?;
    let architecture: String = row.try_get("architecture")?;
    let recorded_at: DateTime<Utc> = row.try_get("recorded_at")?;

    let created_at = u64::try_from(created_at).map_err(|_| {
        RepositoryError::Serialization(format!("negative version key {}", created_at))
    })?;

    Ok(RuntimeVersion {
        agent_name: AgentName::new(agent_name)?,
        created_at: VersionKey(created_at),
        runtime_id: RuntimeId::new(runtime_id),
        runtime_arn,
        runtime_version,
        configuration: ConfigurationValue::new(configuration)?,
        architecture: architecture.parse()?,
        recorded_at,
    })
}

fn parse_summary_row(row: PgRow) -> Result<RuntimeSummary, RepositoryError> {
    let summary: serde_json::Value = row.try_get("summary")?;
    serde_json::from_value(summary).map_err(|e| {
        RepositoryError::Serialization(format!("Failed to deserialize runtime summary: {}", e))
    })
}

/// The phase column holds the same serde form as the JSONB document
fn phase_column(document: &serde_json::Value) -> Result<String, RepositoryError> {
    document
        .get("phase")
        .and_then(serde_json::Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| RepositoryError::Serialization("summary document has no phase".to_string()))
}
