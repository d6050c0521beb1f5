// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Workflow error taxonomy and payment error classification

use serde::{Deserialize, Serialize};

/// Kind of a classified workflow failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Screening rejected the image; not retryable
    Nsfw,
    /// The 402 discovery step failed; retry restarts from discovery
    PaymentDiscovery,
    /// Generic signing-phase failure; retry resumes at signing
    PaymentSigning,
    /// The user declined the wallet prompt; retry resumes at signing
    PaymentRejected,
    /// The payer cannot cover the quoted amount; retry resumes at signing
    InsufficientBalance,
    /// The paid generation call failed; retry resumes at execution
    Generation,
}

/// A classified failure surfaced to the presentation layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowError {
    pub kind: ErrorKind,
    pub message: String,
    pub retryable: bool,
}

impl WorkflowError {
    pub fn new(kind: ErrorKind, message: impl Into<String>, retryable: bool) -> Self {
        Self {
            kind,
            message: message.into(),
            retryable,
        }
    }

    /// The screening rejection. The only path forward is RESET with a new image.
    pub fn nsfw() -> Self {
        Self::new(
            ErrorKind::Nsfw,
            "This image contains inappropriate content and cannot be processed.",
            false,
        )
    }
}

impl std::fmt::Display for WorkflowError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Which payment phase produced a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentPhase {
    Discovery,
    Signing,
    Execution,
}

/// Classify a payment-phase failure from its message text.
///
/// The signing and execution phases inspect the message (case-insensitive)
/// for known wallet substrings; discovery failures are always the generic
/// retryable discovery kind.
pub fn classify_payment_error(phase: PaymentPhase, message: &str) -> WorkflowError {
    let lower = message.to_lowercase();

    if matches!(phase, PaymentPhase::Signing | PaymentPhase::Execution) {
        if lower.contains("rejected")
            || lower.contains("denied")
            || lower.contains("cancelled")
            || lower.contains("user rejected")
        {
            return WorkflowError::new(
                ErrorKind::PaymentRejected,
                "Payment was rejected. Please try again.",
                true,
            );
        }

        if lower.contains("insufficient") || lower.contains("balance") {
            return WorkflowError::new(
                ErrorKind::InsufficientBalance,
                "Insufficient USDC balance. Please add funds and try again.",
                true,
            );
        }
    }

    match phase {
        PaymentPhase::Discovery => WorkflowError::new(
            ErrorKind::PaymentDiscovery,
            format!("Payment discovery failed: {message}"),
            true,
        ),
        PaymentPhase::Signing => WorkflowError::new(
            ErrorKind::PaymentSigning,
            format!("Payment failed: {message}"),
            true,
        ),
        PaymentPhase::Execution => WorkflowError::new(
            ErrorKind::Generation,
            format!("Avatar generation failed: {message}"),
            true,
        ),
    }
}
