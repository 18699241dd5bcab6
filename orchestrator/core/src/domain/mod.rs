// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain Layer
//!
//! Runtime registry aggregates, lifecycle phases, the control plane
//! boundary and the notifier contract.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Types and traits with no infrastructure dependencies

pub mod control_plane;
pub mod events;
pub mod lifecycle;
pub mod lifecycle_config;
pub mod repository;
pub mod runtime;
pub mod step;
