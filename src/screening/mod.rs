// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Client-side NSFW screening for uploaded selfies

mod analyzer;
mod classifier;
mod onnx;

pub use analyzer::{analyze_image, AnalysisReport, FixedClassifier};
pub use classifier::{
    unsafe_score, ClassifierLoader, ImageClassifier, Prediction, DISALLOWED_CATEGORIES,
};
pub use onnx::{OnnxClassifierLoader, OnnxNsfwClassifier, NSFW_CATEGORIES};
