// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Engine configuration with environment overrides

use ethers::types::U256;
use std::time::Duration;

use crate::media::CompressionOptions;

/// Tunable parameters for the generation workflow engine
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Generation endpoint URL
    pub endpoint_url: String,
    /// Preferred x402 network identifier
    pub network: String,
    /// Preferred x402 payment scheme
    pub scheme: String,
    /// Maximum payment in atomic token units (USDC has 6 decimals)
    pub max_payment_amount: U256,
    /// Unsafe score at or above this blocks the upload
    pub nsfw_threshold: f32,
    /// Minimum wall-clock duration of the intake analysis
    pub analysis_floor: Duration,
    /// Transport compression targets
    pub compression: CompressionOptions,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            endpoint_url: "http://localhost:3000/api/generate-avatar".to_string(),
            network: "base".to_string(),
            scheme: "exact".to_string(),
            // 0.25 USDC cap; the endpoint quotes 0.20
            max_payment_amount: U256::from(250_000u64),
            nsfw_threshold: 0.7,
            analysis_floor: Duration::from_millis(1500),
            compression: CompressionOptions::default(),
        }
    }
}

impl EngineConfig {
    /// Build a config from environment variables, falling back to defaults
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();
        let defaults = Self::default();

        Self {
            endpoint_url: std::env::var("AVATAR_ENDPOINT_URL")
                .unwrap_or(defaults.endpoint_url),
            network: std::env::var("AVATAR_PAYMENT_NETWORK").unwrap_or(defaults.network),
            scheme: std::env::var("AVATAR_PAYMENT_SCHEME").unwrap_or(defaults.scheme),
            max_payment_amount: std::env::var("AVATAR_MAX_PAYMENT_ATOMIC")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .map(U256::from)
                .unwrap_or(defaults.max_payment_amount),
            nsfw_threshold: std::env::var("AVATAR_NSFW_THRESHOLD")
                .ok()
                .and_then(|v| v.parse::<f32>().ok())
                .unwrap_or(defaults.nsfw_threshold),
            analysis_floor: std::env::var("AVATAR_ANALYSIS_FLOOR_MS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.analysis_floor),
            compression: defaults.compression,
        }
    }
}
