// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! X-PAYMENT header encoding: base64 over the canonical JSON payload

use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};

use super::types::PaymentPayload;

/// Header name carrying the signed payment token
pub const PAYMENT_HEADER: &str = "X-PAYMENT";

/// Encode a signed payment payload into its header value
pub fn encode_payment_header(payload: &PaymentPayload) -> Result<String> {
    let json = serde_json::to_vec(payload).context("failed to serialize payment payload")?;
    Ok(STANDARD.encode(json))
}

/// Decode a header value back into a payment payload
pub fn decode_payment_header(header: &str) -> Result<PaymentPayload> {
    let json = STANDARD
        .decode(header)
        .context("payment header is not valid base64")?;
    serde_json::from_slice(&json).context("payment header is not a valid payload")
}
