// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Intake pipeline: compress, classify and enforce the minimum wall-clock floor
//!
//! Compression runs first so the classifier sees exactly the bytes the
//! endpoint will receive; the combined work is held to a minimum duration so
//! the UI never flashes a verdict.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::media::{decode_image, CompressedImage, CompressionOptions, ImageCompressor, ImageFile};

use super::classifier::{unsafe_score, ImageClassifier};

/// Outcome of a completed intake analysis
#[derive(Debug, Clone)]
pub struct AnalysisReport {
    pub unsafe_score: f32,
    pub is_nsfw: bool,
    pub compressed: CompressedImage,
}

/// Run the intake pipeline over a freshly selected file.
///
/// Any error here (classifier unavailable, decode failure, compression
/// failure) is treated as fail-open by the caller: the workflow proceeds
/// with no score and no compression applied.
pub async fn analyze_image(
    file: &ImageFile,
    classifier: Option<Arc<dyn ImageClassifier>>,
    compressor: &dyn ImageCompressor,
    options: &CompressionOptions,
    threshold: f32,
    floor: Duration,
) -> Result<AnalysisReport> {
    let work = async {
        let classifier = classifier.ok_or_else(|| anyhow!("NSFW classifier not available"))?;

        let compressed = compressor.compress(file, options).await?;
        let bitmap = decode_image(&compressed.file.bytes)?;
        let predictions = classifier.classify(&bitmap).await?;

        let score = unsafe_score(&predictions);
        Ok::<_, anyhow::Error>(AnalysisReport {
            unsafe_score: score,
            is_nsfw: score >= threshold,
            compressed,
        })
    };

    // The returned result waits on max(real work, floor)
    let (report, _) = tokio::join!(work, tokio::time::sleep(floor));
    report
}

/// Fixed-output classifier for exercising the pipeline without a model
pub struct FixedClassifier {
    predictions: Vec<super::Prediction>,
}

impl FixedClassifier {
    pub fn new(predictions: Vec<super::Prediction>) -> Self {
        Self { predictions }
    }
}

#[async_trait]
impl ImageClassifier for FixedClassifier {
    async fn classify(&self, _image: &image::DynamicImage) -> Result<Vec<super::Prediction>> {
        Ok(self.predictions.clone())
    }
}
