// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Step results. Steps report what happened; only the orchestrator decides
//! whether to retry, advance or terminate.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingReason {
    /// The remote resource exists and reports a non-terminal status
    InProgress(String),
    /// The resource a start step just created is not visible yet
    PropagationPending,
}

impl fmt::Display for PendingReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PendingReason::InProgress(status) => write!(f, "in progress ({})", status),
            PendingReason::PropagationPending => f.write_str("propagation pending"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome<T> {
    Done(T),
    Pending(PendingReason),
    Transient(String),
    Permanent(String),
}

impl<T> StepOutcome<T> {
    pub fn in_progress(status: impl fmt::Debug) -> Self {
        StepOutcome::Pending(PendingReason::InProgress(format!("{:?}", status)))
    }

    pub fn is_done(&self) -> bool {
        matches!(self, StepOutcome::Done(_))
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> StepOutcome<U> {
        match self {
            StepOutcome::Done(value) => StepOutcome::Done(f(value)),
            StepOutcome::Pending(reason) => StepOutcome::Pending(reason),
            StepOutcome::Transient(reason) => StepOutcome::Transient(reason),
            StepOutcome::Permanent(reason) => StepOutcome::Permanent(reason),
        }
    }
}
