// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Wallet signer collaborator: turns a selected payment requirement into a
//! signed EIP-3009 authorization for the exact-EVM x402 scheme

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use ethers::signers::{LocalWallet, Signer};
use ethers::types::transaction::eip712::TypedData;
use ethers::types::Address;
use rand::Rng;
use serde_json::json;
use tracing::debug;

use crate::x402::{
    ExactEvmAuthorization, ExactEvmPayload, PaymentPayload, PaymentRequirements, X402_VERSION,
};

/// Clock-skew allowance on the authorization validity window (seconds)
const VALID_AFTER_BUFFER_SECS: i64 = 600;

/// Fallback authorization lifetime when the challenge carries no timeout
const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Produces signed payment authorizations. This is the only collaborator
/// that can prompt a human and be declined.
#[async_trait]
pub trait WalletSigner: Send + Sync {
    /// Payer address the authorization transfers from
    fn address(&self) -> Address;

    /// Sign an authorization over the selected payment requirement
    async fn sign_payment(&self, requirements: &PaymentRequirements) -> Result<PaymentPayload>;
}

/// Chain id for an x402 network identifier
pub fn chain_id_for_network(network: &str) -> Option<u64> {
    match network {
        "base" => Some(8453),
        "base-sepolia" => Some(84532),
        "ethereum" => Some(1),
        _ => None,
    }
}

/// In-process signer backed by an ethers `LocalWallet`.
///
/// Signs the EIP-712 `TransferWithAuthorization` message (EIP-3009) over the
/// token contract named in the requirement's `asset` field.
pub struct LocalWalletSigner {
    wallet: LocalWallet,
}

impl LocalWalletSigner {
    pub fn new(wallet: LocalWallet) -> Self {
        Self { wallet }
    }

    pub fn from_private_key(hex_key: &str) -> Result<Self> {
        let wallet: LocalWallet = hex_key
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid private key: {e}"))?;
        Ok(Self { wallet })
    }
}

#[async_trait]
impl WalletSigner for LocalWalletSigner {
    fn address(&self) -> Address {
        self.wallet.address()
    }

    async fn sign_payment(&self, requirements: &PaymentRequirements) -> Result<PaymentPayload> {
        let chain_id = chain_id_for_network(&requirements.network)
            .with_context(|| format!("unsupported payment network: {}", requirements.network))?;

        // EIP-712 domain of the token contract; USDC values as fallback
        let (domain_name, domain_version) = match &requirements.extra {
            Some(extra) => (
                extra
                    .get("name")
                    .and_then(|v| v.as_str())
                    .unwrap_or("USD Coin")
                    .to_string(),
                extra
                    .get("version")
                    .and_then(|v| v.as_str())
                    .unwrap_or("2")
                    .to_string(),
            ),
            None => ("USD Coin".to_string(), "2".to_string()),
        };

        let now = Utc::now().timestamp();
        let valid_after = (now - VALID_AFTER_BUFFER_SECS).max(0) as u64;
        let timeout = if requirements.max_timeout_seconds > 0 {
            requirements.max_timeout_seconds
        } else {
            DEFAULT_TIMEOUT_SECS
        };
        let valid_before = now as u64 + timeout;

        let mut nonce = [0u8; 32];
        rand::thread_rng().fill(&mut nonce[..]);
        let nonce_hex = format!("0x{}", hex::encode(nonce));

        let from = format!("{:#x}", self.wallet.address());
        let authorization = ExactEvmAuthorization {
            from: from.clone(),
            to: requirements.pay_to.clone(),
            value: requirements.max_amount_required.clone(),
            valid_after: valid_after.to_string(),
            valid_before: valid_before.to_string(),
            nonce: nonce_hex.clone(),
        };

        let typed_data: TypedData = serde_json::from_value(json!({
            "types": {
                "EIP712Domain": [
                    { "name": "name", "type": "string" },
                    { "name": "version", "type": "string" },
                    { "name": "chainId", "type": "uint256" },
                    { "name": "verifyingContract", "type": "address" }
                ],
                "TransferWithAuthorization": [
                    { "name": "from", "type": "address" },
                    { "name": "to", "type": "address" },
                    { "name": "value", "type": "uint256" },
                    { "name": "validAfter", "type": "uint256" },
                    { "name": "validBefore", "type": "uint256" },
                    { "name": "nonce", "type": "bytes32" }
                ]
            },
            "primaryType": "TransferWithAuthorization",
            "domain": {
                "name": domain_name,
                "version": domain_version,
                "chainId": chain_id,
                "verifyingContract": requirements.asset,
            },
            "message": {
                "from": from,
                "to": requirements.pay_to,
                "value": requirements.max_amount_required,
                "validAfter": authorization.valid_after,
                "validBefore": authorization.valid_before,
                "nonce": nonce_hex,
            }
        }))
        .context("failed to build EIP-712 typed data")?;

        let signature = self
            .wallet
            .sign_typed_data(&typed_data)
            .await
            .context("wallet refused to sign payment authorization")?;

        debug!(
            "signed payment authorization: payer={} amount={} network={}",
            authorization.from, authorization.value, requirements.network
        );

        Ok(PaymentPayload {
            x402_version: X402_VERSION,
            scheme: requirements.scheme.clone(),
            network: requirements.network.clone(),
            payload: ExactEvmPayload {
                signature: format!("0x{signature}"),
                authorization,
            },
        })
    }
}
