// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Generation endpoint client: 402 discovery and paid execution

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

use crate::styles::StyleId;
use crate::x402::{PaymentRequiredResponse, PAYMENT_HEADER};

/// JSON body of the generation request. Identical for the discovery call and
/// the paid replay; only the payment header differs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// Image as a data URL
    pub image: String,
    pub style: StyleId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fid: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerationResponse {
    image_url: String,
    #[serde(default)]
    generation_id: Option<String>,
    /// Absent means success; only an explicit `false` marks a failed body
    #[serde(default = "default_success")]
    success: bool,
}

fn default_success() -> bool {
    true
}

impl GenerationResponse {
    fn into_output(self) -> Result<GenerationOutput> {
        if !self.success {
            anyhow::bail!("generation endpoint reported failure");
        }
        Ok(GenerationOutput {
            image_url: self.image_url,
            generation_id: self.generation_id,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
struct GenerationErrorResponse {
    error: String,
    #[serde(default)]
    details: Option<Vec<String>>,
}

/// The produced artifact
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationOutput {
    pub image_url: String,
    pub generation_id: Option<String>,
}

/// Generation endpoint collaborator.
///
/// `discover` sends the real request body without any payment credential and
/// expects a 402 challenge back; `execute` replays the identical body with
/// the signed payment header attached.
#[async_trait]
pub trait GenerationEndpoint: Send + Sync {
    async fn discover(&self, request: &GenerationRequest) -> Result<PaymentRequiredResponse>;
    async fn execute(
        &self,
        request: &GenerationRequest,
        payment_header: &str,
    ) -> Result<GenerationOutput>;
}

/// HTTP implementation over reqwest
pub struct HttpGenerationEndpoint {
    client: Client,
    endpoint: String,
}

impl HttpGenerationEndpoint {
    pub fn new(endpoint: &str) -> Result<Self> {
        Url::parse(endpoint).context("invalid generation endpoint URL")?;

        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()?;

        let endpoint = endpoint.trim_end_matches('/').to_string();
        info!("Generation endpoint configured: {}", endpoint);

        Ok(Self { client, endpoint })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl GenerationEndpoint for HttpGenerationEndpoint {
    async fn discover(&self, request: &GenerationRequest) -> Result<PaymentRequiredResponse> {
        debug!("discovery POST {}", self.endpoint);

        let response = self.client.post(&self.endpoint).json(request).send().await?;

        let status = response.status();
        if status != StatusCode::PAYMENT_REQUIRED {
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("expected 402 payment challenge, got {}: {}", status, text);
        }

        let challenge: PaymentRequiredResponse = response
            .json()
            .await
            .context("malformed payment challenge body")?;

        if challenge.accepts.is_empty() {
            let detail = challenge
                .error
                .map(|e| format!(": {e}"))
                .unwrap_or_default();
            anyhow::bail!("payment challenge offered no payment options{detail}");
        }

        Ok(challenge)
    }

    async fn execute(
        &self,
        request: &GenerationRequest,
        payment_header: &str,
    ) -> Result<GenerationOutput> {
        debug!("paid generation POST {}", self.endpoint);

        let response = self
            .client
            .post(&self.endpoint)
            .header(PAYMENT_HEADER, payment_header)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return match response.json::<GenerationErrorResponse>().await {
                Ok(body) => {
                    let details = body
                        .details
                        .filter(|d| !d.is_empty())
                        .map(|d| format!(" ({})", d.join("; ")))
                        .unwrap_or_default();
                    anyhow::bail!("{}{}", body.error, details)
                }
                Err(_) => anyhow::bail!("generation endpoint returned {}", status),
            };
        }

        let body: GenerationResponse = response
            .json()
            .await
            .context("malformed generation response body")?;

        let output = body.into_output()?;
        info!("avatar generated: {}", output.image_url);

        Ok(output)
    }
}
