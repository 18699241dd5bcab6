// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Command implementations for the aro CLI

pub mod config;
pub mod runtime;

pub use self::config::ConfigCommand;
pub use self::runtime::RuntimeCommand;
