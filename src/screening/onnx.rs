// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! ONNX-backed NSFW classifier (MobileNetV2)
//!
//! Wraps ONNX Runtime around the standard 5-category NSFW model:
//! 224x224 RGB input normalized to [0,1], softmax output over
//! Drawing/Hentai/Neutral/Porn/Sexy.

use anyhow::{Context, Result};
use async_trait::async_trait;
use image::imageops::FilterType;
use image::DynamicImage;
use ndarray::Array4;
use ort::execution_providers::CPUExecutionProvider;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Value;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::info;

use super::classifier::{ClassifierLoader, ImageClassifier, Prediction};

/// Output label order of the MobileNetV2 NSFW model
pub const NSFW_CATEGORIES: &[&str] = &["Drawing", "Hentai", "Neutral", "Porn", "Sexy"];

/// Model input edge length in pixels
const INPUT_SIZE: u32 = 224;

/// ONNX-based NSFW image classifier
///
/// # Thread Safety
/// The session is wrapped in `Arc<Mutex>` for thread-safe shared access.
#[derive(Clone)]
pub struct OnnxNsfwClassifier {
    session: Arc<Mutex<Session>>,
    input_name: String,
}

impl std::fmt::Debug for OnnxNsfwClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnnxNsfwClassifier")
            .field("input_name", &self.input_name)
            .finish_non_exhaustive()
    }
}

impl OnnxNsfwClassifier {
    /// Load the model from an ONNX file on disk
    pub fn new<P: AsRef<Path>>(model_path: P) -> Result<Self> {
        let model_path = model_path.as_ref();
        if !model_path.exists() {
            anyhow::bail!("ONNX model file not found: {}", model_path.display());
        }

        let session = Session::builder()
            .context("Failed to create session builder")?
            .with_execution_providers([CPUExecutionProvider::default().build()])
            .context("Failed to set CPU execution provider")?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .context("Failed to set optimization level")?
            .with_intra_threads(2)
            .context("Failed to set intra threads")?
            .commit_from_file(model_path)
            .context(format!(
                "Failed to load ONNX model from {}",
                model_path.display()
            ))?;

        // A graph with no outputs would make every inference unusable
        if session.outputs.is_empty() {
            anyhow::bail!(
                "ONNX model declares no outputs: {}",
                model_path.display()
            );
        }

        info!("NSFW classifier loaded from {}", model_path.display());

        Ok(Self {
            session: Arc::new(Mutex::new(session)),
            input_name: "input_1".to_string(),
        })
    }

    /// Override the graph input tensor name (defaults to `input_1`)
    pub fn with_input_name(mut self, name: impl Into<String>) -> Self {
        self.input_name = name.into();
        self
    }
}

#[async_trait]
impl ImageClassifier for OnnxNsfwClassifier {
    async fn classify(&self, image: &DynamicImage) -> Result<Vec<Prediction>> {
        // Preprocess: square resize to model input, RGB, [0,1] floats, NHWC
        let resized = image
            .resize_exact(INPUT_SIZE, INPUT_SIZE, FilterType::Triangle)
            .to_rgb8();

        let size = INPUT_SIZE as usize;
        let mut input = Array4::<f32>::zeros((1, size, size, 3));
        for (x, y, pixel) in resized.enumerate_pixels() {
            for c in 0..3 {
                input[[0, y as usize, x as usize, c]] = pixel[c] as f32 / 255.0;
            }
        }

        // Run inference (ort 2.0 API) - lock session for thread-safe access
        let mut session_guard = self.session.lock().unwrap();
        let outputs = session_guard.run(ort::inputs![
            self.input_name.as_str() => Value::from_array(input)?
        ])?;

        // Extract output tensor by index; output names vary across exports.
        // At least one output is guaranteed by the load-time arity check.
        let output_array = outputs[0]
            .try_extract_array::<f32>()
            .context("Failed to extract output tensor")?;

        let scores: Vec<f32> = output_array.iter().copied().collect();
        if scores.len() < NSFW_CATEGORIES.len() {
            anyhow::bail!(
                "Model output has {} scores (expected {})",
                scores.len(),
                NSFW_CATEGORIES.len()
            );
        }

        // The model's final layer already applies softmax
        Ok(NSFW_CATEGORIES
            .iter()
            .zip(scores)
            .map(|(category, probability)| Prediction {
                category: category.to_string(),
                probability,
            })
            .collect())
    }
}

/// Loads an [`OnnxNsfwClassifier`] from a configured model path
pub struct OnnxClassifierLoader {
    model_path: PathBuf,
}

impl OnnxClassifierLoader {
    pub fn new(model_path: impl Into<PathBuf>) -> Self {
        Self {
            model_path: model_path.into(),
        }
    }
}

#[async_trait]
impl ClassifierLoader for OnnxClassifierLoader {
    async fn load(&self) -> Result<Arc<dyn ImageClassifier>> {
        let path = self.model_path.clone();
        let classifier = tokio::task::spawn_blocking(move || OnnxNsfwClassifier::new(path))
            .await
            .context("classifier load task panicked")??;
        Ok(Arc::new(classifier))
    }
}
