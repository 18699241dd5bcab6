// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Runtime lifecycle commands
//!
//! Commands: create, delete, delete-endpoints, tag, status, versions

use anyhow::{Context, Result};
use clap::{Subcommand, ValueEnum};
use colored::Colorize;
use std::path::PathBuf;
use std::time::Duration;
use tokio::task::JoinHandle;

use agent_runtime_orchestrator_core::domain::lifecycle::WorkflowOutcome;
use agent_runtime_orchestrator_core::domain::runtime::{
    AgentName, ArchitectureType, ConfigurationValue,
};
use agent_runtime_orchestrator_core::application::{ServiceError, SubmittedWorkflow, WorkflowReport};

use crate::embedded::EmbeddedOrchestrator;

const PRINTER_DRAIN: Duration = Duration::from_secs(2);

#[derive(Subcommand)]
pub enum RuntimeCommand {
    /// Create the agent's runtime, or add a version for a new configuration
    Create {
        /// Agent name
        #[arg(long = "agent", value_name = "AGENT")]
        agent_name: String,

        /// Path to the agent configuration (JSON object)
        #[arg(long, value_name = "FILE", conflicts_with = "config_value")]
        config_file: Option<PathBuf>,

        /// Inline agent configuration (JSON object)
        #[arg(long, value_name = "JSON")]
        config_value: Option<String>,

        /// Container image family
        #[arg(long, value_enum, default_value = "single")]
        architecture: Architecture,
    },

    /// Delete every endpoint, the memory, the runtime and the registry records
    Delete {
        #[arg(long = "agent", value_name = "AGENT")]
        agent_name: String,
    },

    /// Delete named endpoints, or all of them when none are given
    DeleteEndpoints {
        #[arg(long = "agent", value_name = "AGENT")]
        agent_name: String,

        /// Endpoint to delete; repeat for several
        #[arg(long = "endpoint", value_name = "ENDPOINT")]
        endpoints: Vec<String>,
    },

    /// Point a named endpoint at a runtime version
    Tag {
        #[arg(long = "agent", value_name = "AGENT")]
        agent_name: String,

        /// Runtime version the endpoint serves
        #[arg(long)]
        version: String,

        /// Endpoint name
        #[arg(long)]
        qualifier: String,

        #[arg(long)]
        description: Option<String>,
    },

    /// Show the status of one agent, or of every agent
    Status {
        #[arg(long = "agent", value_name = "AGENT")]
        agent_name: Option<String>,

        /// Print raw JSON
        #[arg(long)]
        json: bool,
    },

    /// List the recorded runtime versions of an agent
    Versions {
        #[arg(long = "agent", value_name = "AGENT")]
        agent_name: String,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum Architecture {
    Single,
    Swarm,
}

impl From<Architecture> for ArchitectureType {
    fn from(value: Architecture) -> Self {
        match value {
            Architecture::Single => ArchitectureType::Single,
            Architecture::Swarm => ArchitectureType::Swarm,
        }
    }
}

pub async fn handle_command(command: RuntimeCommand, config_path: Option<PathBuf>) -> Result<()> {
    let orchestrator = EmbeddedOrchestrator::new(config_path).await?;

    match command {
        RuntimeCommand::Create {
            agent_name,
            config_file,
            config_value,
            architecture,
        } => {
            let agent_name = parse_agent(&agent_name)?;
            let raw = match (config_file, config_value) {
                (Some(path), _) => std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read configuration from {:?}", path))?,
                (None, Some(inline)) => inline,
                (None, None) => anyhow::bail!("Provide --config-file or --config-value"),
            };
            let configuration = ConfigurationValue::new(raw.trim())?;
            let printer = orchestrator.follow(agent_name.clone());
            let submitted = orchestrator
                .service()
                .submit_create(agent_name, configuration, architecture.into())
                .await;
            run_to_completion(printer, submitted).await
        }
        RuntimeCommand::Delete { agent_name } => {
            let agent_name = parse_agent(&agent_name)?;
            let printer = orchestrator.follow(agent_name.clone());
            let submitted = orchestrator.service().submit_delete(agent_name).await;
            run_to_completion(printer, submitted).await
        }
        RuntimeCommand::DeleteEndpoints {
            agent_name,
            endpoints,
        } => {
            let agent_name = parse_agent(&agent_name)?;
            let printer = orchestrator.follow(agent_name.clone());
            let submitted = orchestrator
                .service()
                .submit_delete_endpoints(agent_name, endpoints)
                .await;
            run_to_completion(printer, submitted).await
        }
        RuntimeCommand::Tag {
            agent_name,
            version,
            qualifier,
            description,
        } => {
            let agent_name = parse_agent(&agent_name)?;
            let printer = orchestrator.follow(agent_name.clone());
            let submitted = orchestrator
                .service()
                .submit_tag(agent_name, version, qualifier, description)
                .await;
            run_to_completion(printer, submitted).await
        }
        RuntimeCommand::Status { agent_name, json } => {
            status(&orchestrator, agent_name.as_deref(), json).await
        }
        RuntimeCommand::Versions { agent_name } => {
            versions(&orchestrator, &parse_agent(&agent_name)?).await
        }
    }
}

fn parse_agent(name: &str) -> Result<AgentName> {
    AgentName::new(name).with_context(|| format!("Invalid agent name '{}'", name))
}

/// Wait for the submitted run while `printer` echoes its lifecycle events
async fn run_to_completion(
    printer: JoinHandle<()>,
    submitted: Result<SubmittedWorkflow, ServiceError>,
) -> Result<()> {
    let submitted = match submitted {
        Ok(submitted) => submitted,
        Err(e) => {
            printer.abort();
            return Err(e.into());
        }
    };
    println!("{} {}", "Run".dimmed(), submitted.run_id.to_string().dimmed());

    let report = submitted.wait().await;
    if report.is_ok() {
        // The finishing event is already published; give the printer a moment to drain it
        let _ = tokio::time::timeout(PRINTER_DRAIN, printer).await;
    } else {
        printer.abort();
    }

    let report = report?;
    print_report(&report);
    match report.outcome {
        WorkflowOutcome::Completed => Ok(()),
        WorkflowOutcome::Failed { reason } => anyhow::bail!("{} failed: {}", report.workflow, reason),
        WorkflowOutcome::PartiallyFailed { remaining, .. } => anyhow::bail!(
            "{} left {} resource(s) behind; re-run to finish",
            report.workflow,
            remaining.len()
        ),
    }
}

fn print_report(report: &WorkflowReport) {
    println!();
    println!("{}", "Summary:".bold());
    println!("  Agent: {}", report.agent_name);
    println!("  Workflow: {}", report.workflow);
    println!("  Outcome: {}", report.outcome.label());
    if let Some(phase) = report.resumed_from {
        println!("  Resumed from: {}", phase);
    }
    if let Some(key) = report.version_key {
        println!("  Version key: {}", key);
    }
    println!("  Duration: {:.1}s", report.duration.as_secs_f64());
}

async fn status(
    orchestrator: &EmbeddedOrchestrator,
    agent_name: Option<&str>,
    json: bool,
) -> Result<()> {
    let summaries = match agent_name {
        Some(name) => {
            let agent_name = parse_agent(name)?;
            orchestrator
                .service()
                .get_summary(&agent_name)
                .await?
                .into_iter()
                .collect()
        }
        None => orchestrator.service().list_summaries().await?,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&summaries)?);
        return Ok(());
    }

    if summaries.is_empty() {
        println!("{}", "No agents found".yellow());
        return Ok(());
    }

    println!(
        "{:<24} {:<18} {:<24} {:<9} {}",
        "AGENT", "STATUS", "PHASE", "VERSIONS", "ENDPOINTS"
    );
    for summary in summaries {
        let status = match summary.status() {
            "Ready" => summary.status().green(),
            "Failed" => summary.status().red(),
            "PartiallyDeleted" => summary.status().yellow(),
            other => other.cyan(),
        };
        let endpoints: Vec<String> = summary
            .qualifier_to_version
            .iter()
            .map(|(qualifier, version)| format!("{}={}", qualifier, version))
            .collect();
        println!(
            "{:<24} {:<18} {:<24} {:<9} {}",
            summary.agent_name.as_str().bold(),
            status,
            summary.phase.to_string(),
            summary.number_of_versions,
            endpoints.join(",")
        );
        if let Some(error) = &summary.last_error {
            println!("  {} {}", "last error:".dimmed(), error);
        }
        if !summary.pending_endpoints.is_empty() {
            println!(
                "  {} {}",
                "pending endpoints:".dimmed(),
                summary.pending_endpoints.join(", ")
            );
        }
    }

    Ok(())
}

async fn versions(orchestrator: &EmbeddedOrchestrator, agent_name: &AgentName) -> Result<()> {
    let versions = orchestrator.service().list_versions(agent_name).await?;

    if versions.is_empty() {
        println!("{}", format!("No versions recorded for {}", agent_name).yellow());
        return Ok(());
    }

    println!("{:<20} {:<10} {:<8} {}", "CREATED AT", "VERSION", "ARCH", "RECORDED");
    for version in versions {
        println!(
            "{:<20} {:<10} {:<8} {}",
            version.created_at.to_string(),
            version.runtime_version,
            format!("{:?}", version.architecture),
            version.recorded_at.to_rfc3339()
        );
    }

    Ok(())
}
