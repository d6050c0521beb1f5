// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Mutable state owned exclusively by the workflow controller

use std::fmt;
use std::sync::Arc;

use crate::error::WorkflowError;
use crate::media::ImageFile;
use crate::screening::ImageClassifier;
use crate::styles::StyleId;
use crate::wallet::WalletSigner;
use crate::x402::{PaymentPayload, PaymentRequirements};

/// Attempt-scoped and session-scoped workflow state.
///
/// Only the controller's own transition actions mutate this; there is no
/// external writer.
#[derive(Clone, Default)]
pub struct WorkflowContext {
    /// Chosen generation style; survives resets
    pub selected_style: StyleId,
    /// Original image as a data URL, kept unmodified for display
    pub raw_image: Option<String>,
    /// Original file backing `raw_image`
    pub raw_file: Option<ImageFile>,
    /// Recompressed variant used only for network transport
    pub transport_image: Option<String>,
    /// Lazily-loaded classifier; survives resets
    pub classifier: Option<Arc<dyn ImageClassifier>>,
    /// Last computed unsafe score in [0,1]
    pub classification_score: Option<f32>,
    /// URL of the produced artifact
    pub generated_image: Option<String>,
    /// Persisted-record id returned by the endpoint
    pub generation_record_id: Option<String>,
    /// Platform user id forwarded for persistence attribution
    pub payer_fid: Option<u64>,
    /// Requirements selected from the 402 challenge
    pub payment_challenge: Option<PaymentRequirements>,
    /// Signed authorization produced by the wallet
    pub payment_token: Option<PaymentPayload>,
    /// Connected signer; set/cleared by wallet events, survives resets
    pub wallet: Option<Arc<dyn WalletSigner>>,
    /// The single classified failure, if any
    pub last_error: Option<WorkflowError>,
}

impl WorkflowContext {
    /// Restore all attempt-scoped fields to their defaults, preserving
    /// `selected_style`, the classifier and the wallet handle.
    pub fn reset(&mut self) {
        self.raw_image = None;
        self.raw_file = None;
        self.transport_image = None;
        self.classification_score = None;
        self.generated_image = None;
        self.generation_record_id = None;
        self.payer_fid = None;
        self.payment_challenge = None;
        self.payment_token = None;
        self.last_error = None;
    }

    pub fn has_image(&self) -> bool {
        self.raw_image.is_some()
    }

    pub fn wallet_connected(&self) -> bool {
        self.wallet.is_some()
    }

    /// Image to send over the network: the compressed variant when present,
    /// falling back to the original.
    pub fn transport_or_raw(&self) -> Option<String> {
        self.transport_image
            .clone()
            .or_else(|| self.raw_image.clone())
    }
}

impl fmt::Debug for WorkflowContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkflowContext")
            .field("selected_style", &self.selected_style)
            .field("has_raw_image", &self.raw_image.is_some())
            .field("has_transport_image", &self.transport_image.is_some())
            .field("classifier_ready", &self.classifier.is_some())
            .field("classification_score", &self.classification_score)
            .field("generated_image", &self.generated_image)
            .field("generation_record_id", &self.generation_record_id)
            .field("payer_fid", &self.payer_fid)
            .field("has_payment_challenge", &self.payment_challenge.is_some())
            .field("has_payment_token", &self.payment_token.is_some())
            .field("wallet_connected", &self.wallet.is_some())
            .field("last_error", &self.last_error)
            .finish()
    }
}
