// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Embedded orchestrator
//!
//! Builds the whole service graph in-process from a [`LifecycleConfigManifest`]:
//! control plane backend, runtime registry, change notifier, lifecycle steps,
//! orchestrator and submission service.

use anyhow::{Context, Result};
use colored::Colorize;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

use agent_runtime_orchestrator_core::{
    application::{
        control_plane_client::ControlPlaneClient, create_runtime_registry,
        lifecycle::LifecycleOrchestrator, polling::PollingPolicy, steps::LifecycleSteps,
        RuntimeLifecycleService,
    },
    domain::events::{ChangeNotifier, RuntimeLifecycleEvent},
    domain::lifecycle::WorkflowOutcome,
    domain::lifecycle_config::{LifecycleConfigManifest, NotificationConfig},
    domain::runtime::AgentName,
    infrastructure::{
        control_plane::build_control_plane,
        event_bus::{DomainEvent, EventBus},
        notifications::{BestEffortNotifier, WebhookNotifier},
    },
};

pub struct EmbeddedOrchestrator {
    service: RuntimeLifecycleService,
    event_bus: Arc<EventBus>,
}

impl EmbeddedOrchestrator {
    pub async fn new(config_path: Option<PathBuf>) -> Result<Self> {
        let config = LifecycleConfigManifest::load_or_default(config_path)
            .context("Failed to load configuration")?;
        config
            .validate()
            .context("Configuration validation failed")?;
        Self::from_config(&config).await
    }

    pub async fn from_config(config: &LifecycleConfigManifest) -> Result<Self> {
        let spec = &config.spec;

        if let Some(port) = spec.observability.as_ref().and_then(|o| o.metrics_port) {
            install_metrics_exporter(port)?;
        }

        let control_plane = build_control_plane(&spec.control_plane)
            .context("Failed to initialize control plane backend")?;
        let registry = create_runtime_registry(&spec.registry)
            .await
            .context("Failed to initialize runtime registry")?;
        let event_bus = Arc::new(EventBus::with_default_capacity());

        let notifier: Arc<dyn ChangeNotifier> = match &spec.notifications {
            NotificationConfig::EventBus => event_bus.clone() as Arc<dyn ChangeNotifier>,
            NotificationConfig::Webhook { url, timeout } => {
                info!(%url, "Publishing runtime change notifications to webhook");
                Arc::new(
                    WebhookNotifier::new(url.clone(), *timeout)
                        .context("Failed to initialize webhook notifier")?,
                )
            }
        };

        let client = Arc::new(ControlPlaneClient::new(
            control_plane,
            &spec.control_plane,
            spec.deployment.clone(),
        ));
        let steps = Arc::new(LifecycleSteps::new(
            client,
            registry.versions.clone(),
            registry.summaries.clone(),
            BestEffortNotifier::new(notifier),
        ));
        let orchestrator = Arc::new(LifecycleOrchestrator::new(
            steps,
            registry.versions.clone(),
            registry.summaries.clone(),
            PollingPolicy::from(&spec.polling),
            spec.polling.endpoint_fan_out,
            event_bus.clone(),
        ));
        let service =
            RuntimeLifecycleService::new(orchestrator, registry.versions, registry.summaries);

        debug!("Embedded orchestrator ready");
        Ok(Self { service, event_bus })
    }

    pub fn service(&self) -> &RuntimeLifecycleService {
        &self.service
    }

    /// Print the agent's lifecycle events until its workflow finishes
    pub fn follow(&self, agent_name: AgentName) -> tokio::task::JoinHandle<()> {
        let mut receiver = self.event_bus.subscribe_agent(agent_name);
        tokio::spawn(async move {
            while let Ok(event) = receiver.recv().await {
                let finished = print_event(&event);
                if finished {
                    break;
                }
            }
        })
    }
}

fn install_metrics_exporter(port: u16) -> Result<()> {
    let address = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(address)
        .install()
        .context("Failed to install Prometheus exporter")?;
    info!(%address, "Prometheus metrics exporter listening");
    Ok(())
}

/// Returns true on the event that ends a workflow
fn print_event(event: &DomainEvent) -> bool {
    match event {
        DomainEvent::Lifecycle(RuntimeLifecycleEvent::WorkflowStarted {
            workflow,
            resumed_at_phase,
            ..
        }) => {
            match resumed_at_phase {
                Some(phase) => println!("{} {} (resumed at {})", "▶".cyan(), workflow, phase),
                None => println!("{} {}", "▶".cyan(), workflow),
            }
            false
        }
        DomainEvent::Lifecycle(RuntimeLifecycleEvent::PhaseEntered { phase, .. }) => {
            println!("  {} {}", "→".dimmed(), phase);
            false
        }
        DomainEvent::Lifecycle(RuntimeLifecycleEvent::WorkflowFinished { outcome, .. }) => {
            match outcome {
                WorkflowOutcome::Completed => println!("{}", "✓ Completed".green()),
                WorkflowOutcome::Failed { reason } => {
                    println!("{} {}", "✗ Failed:".red(), reason)
                }
                WorkflowOutcome::PartiallyFailed { reason, remaining } => {
                    println!("{} {}", "⚠ Partially failed:".yellow(), reason);
                    for resource in remaining {
                        println!("    still present: {}", resource);
                    }
                }
            }
            true
        }
        DomainEvent::RuntimeChanged(_) => {
            println!("  {}", "runtime change notified".dimmed());
            false
        }
    }
}
