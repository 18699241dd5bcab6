// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate, generate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use agent_runtime_orchestrator_core::domain::lifecycle_config::{
    LifecycleConfigManifest, NotificationConfig, RegistryConfig,
};

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Show config file paths checked
        #[arg(long)]
        paths: bool,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (default: discover)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// Generate sample configuration
    Generate {
        /// Output path (default: ./aro-config.yaml)
        #[arg(short, long, default_value = "./aro-config.yaml")]
        output: PathBuf,

        /// Include examples and comments
        #[arg(long)]
        examples: bool,
    },
}

pub async fn handle_command(
    command: ConfigCommand,
    config_override: Option<PathBuf>,
) -> Result<()> {
    match command {
        ConfigCommand::Show { paths } => show(config_override, paths),
        ConfigCommand::Validate { file } => validate(file.or(config_override)),
        ConfigCommand::Generate { output, examples } => generate(output, examples),
    }
}

fn show(config_override: Option<PathBuf>, show_paths: bool) -> Result<()> {
    let config = LifecycleConfigManifest::load_or_default(config_override.clone())
        .context("Failed to load configuration")?;

    if show_paths {
        println!("{}", "Configuration discovery paths:".bold());
        if let Some(path) = &config_override {
            println!("  1. --config flag: {}", path.display());
        } else {
            println!("  1. --config flag: {}", "(not set)".dimmed());
        }
        println!(
            "  2. ARO_CONFIG_PATH: {}",
            std::env::var("ARO_CONFIG_PATH")
                .unwrap_or_else(|_| "(not set)".to_string())
                .dimmed()
        );
        println!("  3. ./aro-config.yaml");
        println!("  4. ~/.aro/config.yaml");
        println!("  5. /etc/aro/config.yaml");
        println!();
    }

    println!("{}", "Current configuration:".bold());
    println!();

    let spec = &config.spec;
    println!("{}", "Control Plane:".bold());
    println!("  Backend: {:?}", spec.control_plane.backend);
    if let Some(endpoint) = &spec.control_plane.endpoint {
        println!("  Endpoint: {}", endpoint);
    }
    println!("  Region: {}", spec.control_plane.region);
    println!("  Account: {}", spec.control_plane.account_id);
    println!();

    println!("{}", "Deployment:".bold());
    println!("  Stack tag: {}", spec.deployment.stack_tag);
    println!(
        "  Environment tag: {}",
        spec.deployment.environment_tag.as_deref().unwrap_or("(none)")
    );
    println!("  Container: {}", spec.deployment.container_uri);
    if let Some(swarm) = &spec.deployment.swarm_container_uri {
        println!("  Swarm container: {}", swarm);
    }
    println!();

    println!("{}", "Polling:".bold());
    println!(
        "  Delay: {:?} → {:?} (x{})",
        spec.polling.initial_delay, spec.polling.max_delay, spec.polling.multiplier
    );
    println!("  Budget: {:?}", spec.polling.budget);
    println!("  Propagation grace: {:?}", spec.polling.propagation_grace);
    println!("  Endpoint fan-out: {}", spec.polling.endpoint_fan_out);
    println!();

    println!("{}", "Registry:".bold());
    match &spec.registry {
        RegistryConfig::InMemory => println!("  Backend: in-memory"),
        RegistryConfig::Postgres { max_connections, .. } => {
            println!("  Backend: postgres ({} connections)", max_connections)
        }
    }
    println!();

    println!("{}", "Notifications:".bold());
    match &spec.notifications {
        NotificationConfig::EventBus => println!("  Backend: event bus"),
        NotificationConfig::Webhook { url, .. } => println!("  Backend: webhook ({})", url),
    }

    Ok(())
}

fn validate(config_path: Option<PathBuf>) -> Result<()> {
    println!("Validating configuration...");

    let config = LifecycleConfigManifest::load_or_default(config_path)
        .context("Failed to load configuration")?;

    config
        .validate()
        .context("Configuration validation failed")?;

    println!("{}", "✓ Configuration is valid".green());

    Ok(())
}

fn generate(output: PathBuf, with_examples: bool) -> Result<()> {
    let sample = if with_examples {
        include_str!("../../templates/config-with-examples.yaml")
    } else {
        include_str!("../../templates/config-minimal.yaml")
    };

    std::fs::write(&output, sample)
        .with_context(|| format!("Failed to write config to {:?}", output))?;

    println!(
        "{}",
        format!("✓ Configuration generated: {}", output.display()).green()
    );

    Ok(())
}
