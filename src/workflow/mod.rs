// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Generation workflow controller
//!
//! Owns the entire lifecycle of one avatar-generation attempt: image intake,
//! safety screening, user confirmation, the 3-phase x402 payment protocol and
//! success/error/retry handling. The machine itself is pure and synchronous;
//! the engine drives it on tokio and executes its commands.

mod context;
mod engine;
mod machine;

pub use context::WorkflowContext;
pub use engine::{EngineDeps, WorkflowEngine, WorkflowHandle, WorkflowSnapshot};
pub use machine::{
    Command, FailurePhase, GenerationPhase, Settlement, WorkflowEvent, WorkflowMachine,
    WorkflowState,
};
