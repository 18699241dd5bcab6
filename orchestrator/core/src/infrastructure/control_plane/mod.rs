// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Control plane adapters

pub mod http;
pub mod simulated;

pub use http::HttpControlPlane;
pub use simulated::{Operation, RecordedCall, SimulatedControlPlane, SimulationSettings};

use std::sync::Arc;
use tracing::info;

use crate::domain::control_plane::{ControlPlane, ControlPlaneError};
use crate::domain::lifecycle_config::{ControlPlaneBackend, ControlPlaneConfig};

/// Build the control plane adapter selected by configuration
pub fn build_control_plane(config: &ControlPlaneConfig) -> Result<Arc<dyn ControlPlane>, ControlPlaneError> {
    match config.backend {
        ControlPlaneBackend::Http => {
            info!(endpoint = ?config.endpoint, region = %config.region, "Using HTTP control plane");
            Ok(Arc::new(HttpControlPlane::new(config)?))
        }
        ControlPlaneBackend::Simulated => {
            info!("Using simulated control plane");
            Ok(Arc::new(SimulatedControlPlane::new(SimulationSettings {
                region: config.region.clone(),
                account_id: config.account_id.clone(),
                ..Default::default()
            })))
        }
    }
}
