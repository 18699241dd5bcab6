// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Agent Runtime Lifecycle Orchestrator
//!
//! Creates, versions and tears down agent runtimes together with their
//! memory resource and named endpoints on an eventually-consistent control
//! plane.
//!
//! # Architecture
//!
//! - **Domain:** runtime records, lifecycle phases, control plane contract,
//!   configuration manifest
//! - **Application:** control plane client, steps, bounded polling, the
//!   lifecycle orchestrator and its submission service
//! - **Infrastructure:** HTTP and simulated control planes, registries,
//!   event bus and notifiers

pub mod domain;
pub mod application;
pub mod infrastructure;

pub use domain::*;
