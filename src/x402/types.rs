// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! x402 payment protocol wire types (exact-EVM scheme)

use anyhow::{Context, Result};
use ethers::types::U256;
use serde::{Deserialize, Serialize};

/// Protocol version attached to payment payloads
pub const X402_VERSION: u32 = 1;

/// A single acceptable payment option from a 402 challenge.
///
/// Opaque to the controller beyond network/scheme selection and the amount
/// cap; the wallet collaborator understands the rest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequirements {
    pub scheme: String,
    pub network: String,
    /// Atomic token units as a decimal string
    pub max_amount_required: String,
    #[serde(default)]
    pub resource: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub mime_type: String,
    pub pay_to: String,
    #[serde(default)]
    pub max_timeout_seconds: u64,
    pub asset: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<serde_json::Value>,
}

impl PaymentRequirements {
    /// Quoted amount in atomic units
    pub fn amount(&self) -> Result<U256> {
        U256::from_dec_str(&self.max_amount_required).with_context(|| {
            format!(
                "invalid maxAmountRequired: {:?}",
                self.max_amount_required
            )
        })
    }
}

/// Body of a well-formed HTTP 402 discovery response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequiredResponse {
    pub x402_version: u32,
    #[serde(default)]
    pub accepts: Vec<PaymentRequirements>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// EIP-3009 transfer authorization carried in an exact-EVM payment payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExactEvmAuthorization {
    pub from: String,
    pub to: String,
    /// Atomic token units as a decimal string
    pub value: String,
    pub valid_after: String,
    pub valid_before: String,
    /// 32-byte 0x-prefixed hex nonce
    pub nonce: String,
}

/// Signed payload for the exact-EVM scheme
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExactEvmPayload {
    pub signature: String,
    pub authorization: ExactEvmAuthorization,
}

/// The signed payment token replayed with the generation request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentPayload {
    pub x402_version: u32,
    pub scheme: String,
    pub network: String,
    pub payload: ExactEvmPayload,
}

/// Deterministically select one requirement from a 402 challenge: prefer the
/// configured network/scheme pairing if offered, otherwise the first option.
pub fn select_payment_requirements<'a>(
    accepts: &'a [PaymentRequirements],
    network: &str,
    scheme: &str,
) -> Option<&'a PaymentRequirements> {
    accepts
        .iter()
        .find(|r| r.network == network && r.scheme == scheme)
        .or_else(|| accepts.first())
}

/// Reject a quoted amount above the configured payment cap
pub fn ensure_within_cap(requirements: &PaymentRequirements, max_amount: U256) -> Result<()> {
    let amount = requirements.amount()?;
    if amount > max_amount {
        anyhow::bail!(
            "payment amount {} exceeds maximum allowed {}",
            amount,
            max_amount
        );
    }
    Ok(())
}
