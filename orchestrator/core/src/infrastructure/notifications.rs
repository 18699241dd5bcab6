// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Change Notifier Adapters
//!
//! - [`WebhookNotifier`] posts `{ "agentName": ... }` to an HTTP endpoint.
//! - [`BestEffortNotifier`] wraps any notifier so that a delivery failure is
//!   logged, counted and dropped. Workflows only ever see this wrapper.

use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::domain::events::{ChangeNotifier, NotifierError, RuntimeChangeNotification};
use crate::domain::runtime::AgentName;

pub struct WebhookNotifier {
    client: Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, NotifierError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NotifierError::Delivery(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl ChangeNotifier for WebhookNotifier {
    async fn publish(&self, notification: RuntimeChangeNotification) -> Result<(), NotifierError> {
        let response = self
            .client
            .post(&self.url)
            .json(&notification)
            .send()
            .await
            .map_err(|e| NotifierError::Delivery(e.to_string()))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(NotifierError::Delivery(format!(
                "webhook returned status {}",
                response.status()
            )))
        }
    }
}

/// Publish-and-forget wrapper; `notify` never fails
#[derive(Clone)]
pub struct BestEffortNotifier {
    inner: Arc<dyn ChangeNotifier>,
}

impl BestEffortNotifier {
    pub fn new(inner: Arc<dyn ChangeNotifier>) -> Self {
        Self { inner }
    }

    pub async fn notify(&self, agent_name: &AgentName) {
        let notification = RuntimeChangeNotification::new(agent_name.clone());
        match self.inner.publish(notification).await {
            Ok(()) => debug!(agent_name = %agent_name, "Runtime change notification published"),
            Err(e) => {
                metrics::counter!("aro_notifications_dropped_total").increment(1);
                warn!(agent_name = %agent_name, error = %e, "Dropping runtime change notification");
            }
        }
    }
}
