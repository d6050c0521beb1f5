// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Image classifier collaborator interface

use anyhow::Result;
use async_trait::async_trait;
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Categories that block an upload. Matches the MobileNetV2 NSFW label set.
pub const DISALLOWED_CATEGORIES: &[&str] = &["Porn", "Hentai"];

/// A single category confidence from the classifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub category: String,
    pub probability: f32,
}

/// Classifies a decoded bitmap into per-category confidence scores
#[async_trait]
pub trait ImageClassifier: Send + Sync {
    async fn classify(&self, image: &DynamicImage) -> Result<Vec<Prediction>>;
}

/// Loads a classifier asynchronously. The load is best-effort: a failure is
/// swallowed by the workflow and screening fails open.
#[async_trait]
pub trait ClassifierLoader: Send + Sync {
    async fn load(&self) -> Result<Arc<dyn ImageClassifier>>;
}

/// The image's unsafe score: the maximum probability across the
/// disallowed category set.
pub fn unsafe_score(predictions: &[Prediction]) -> f32 {
    predictions
        .iter()
        .filter(|p| DISALLOWED_CATEGORIES.contains(&p.category.as_str()))
        .map(|p| p.probability)
        .fold(0.0, f32::max)
}
