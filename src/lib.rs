// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod client;
pub mod config;
pub mod error;
pub mod media;
pub mod screening;
pub mod styles;
pub mod wallet;
pub mod workflow;
pub mod x402;

// Re-export the main types the presentation layer needs
pub use client::{GenerationEndpoint, GenerationOutput, GenerationRequest, HttpGenerationEndpoint};
pub use config::EngineConfig;
pub use error::{ErrorKind, WorkflowError};
pub use media::{CompressionOptions, ImageCompressor, ImageFile, JpegCompressor};
pub use screening::{ClassifierLoader, FixedClassifier, ImageClassifier, Prediction};
pub use styles::{style_by_id, StyleId, StyleOption, STYLE_CATALOG};
pub use wallet::{LocalWalletSigner, WalletSigner};
pub use workflow::{
    EngineDeps, FailurePhase, GenerationPhase, WorkflowEngine, WorkflowEvent, WorkflowHandle,
    WorkflowSnapshot, WorkflowState,
};
pub use x402::{
    decode_payment_header, ExactEvmAuthorization, ExactEvmPayload, PaymentPayload,
    PaymentRequiredResponse, PaymentRequirements, X402_VERSION,
};
