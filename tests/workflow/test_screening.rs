// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Intake screening behavior through the engine: blocking, failing open
//! and discarding superseded analysis results

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use avatar_engine::media::{CompressedImage, CompressionOptions};
use avatar_engine::{ErrorKind, ImageCompressor, ImageFile, WorkflowEvent};

use super::support::{
    fixed_classifier, sample_image_file, spawn_engine, spawn_engine_with_compressor,
    FailingLoader, MockEndpoint,
};

#[tokio::test]
async fn test_safe_image_proceeds_to_confirmation_with_score() {
    let endpoint = MockEndpoint::new();
    let mut handle = spawn_engine(
        endpoint,
        Some(fixed_classifier("Porn", 0.12)),
        Duration::ZERO,
    );
    handle.wait_for(|s| s.classifier_ready).await.unwrap();

    handle.send(WorkflowEvent::FileSelected {
        file: sample_image_file(),
    });
    let snapshot = handle.wait_for(|s| s.is_user_confirming()).await.unwrap();

    assert_eq!(snapshot.classification_score, Some(0.12));
    let raw = snapshot.raw_image.unwrap();
    let transport = snapshot.transport_image.unwrap();
    // Original kept for display, recompressed variant for transport
    assert!(raw.starts_with("data:image/png;base64,"));
    assert!(transport.starts_with("data:image/jpeg;base64,"));
    assert!(snapshot.last_error.is_none());
}

#[tokio::test]
async fn test_nsfw_image_is_blocked_before_any_network_call() {
    let endpoint = MockEndpoint::new();
    let mut handle = spawn_engine(
        endpoint.clone(),
        Some(fixed_classifier("Porn", 0.95)),
        Duration::ZERO,
    );
    handle.wait_for(|s| s.classifier_ready).await.unwrap();

    handle.send(WorkflowEvent::FileSelected {
        file: sample_image_file(),
    });
    let snapshot = handle.wait_for(|s| s.is_nsfw_violation()).await.unwrap();

    assert_eq!(snapshot.classification_score, Some(0.95));
    let error = snapshot.last_error.unwrap();
    assert_eq!(error.kind, ErrorKind::Nsfw);
    assert!(!error.retryable);
    assert_eq!(endpoint.discover_count(), 0);

    // RESET is the only way out and clears the attempt
    handle.send(WorkflowEvent::Reset);
    let snapshot = handle.wait_for(|s| s.is_idle()).await.unwrap();
    assert!(snapshot.classification_score.is_none());
    assert!(snapshot.raw_image.is_none());
    assert!(snapshot.last_error.is_none());
}

#[tokio::test]
async fn test_classifier_load_failure_fails_open() {
    let endpoint = MockEndpoint::new();
    let mut handle = spawn_engine(endpoint, Some(Arc::new(FailingLoader)), Duration::ZERO);

    handle.send(WorkflowEvent::FileSelected {
        file: sample_image_file(),
    });
    let snapshot = handle.wait_for(|s| s.is_user_confirming()).await.unwrap();

    // No verdict and no compression applied, but the user is not blocked
    assert!(snapshot.classification_score.is_none());
    assert!(snapshot.transport_image.is_none());
    assert!(snapshot.raw_image.is_some());
    assert!(snapshot.last_error.is_none());
}

#[tokio::test]
async fn test_absent_loader_fails_open() {
    let endpoint = MockEndpoint::new();
    let mut handle = spawn_engine(endpoint, None, Duration::ZERO);

    handle.send(WorkflowEvent::FileSelected {
        file: sample_image_file(),
    });
    let snapshot = handle.wait_for(|s| s.is_user_confirming()).await.unwrap();
    assert!(snapshot.classification_score.is_none());
    assert!(!snapshot.classifier_ready);
}

#[tokio::test]
async fn test_cancel_during_analysis_discards_the_late_result() {
    let endpoint = MockEndpoint::new();
    // A generous floor holds the analyzing state open
    let mut handle = spawn_engine(
        endpoint,
        Some(fixed_classifier("Porn", 0.95)),
        Duration::from_millis(250),
    );
    handle.wait_for(|s| s.classifier_ready).await.unwrap();

    handle.send(WorkflowEvent::FileSelected {
        file: sample_image_file(),
    });
    handle.wait_for(|s| s.is_analyzing()).await.unwrap();

    handle.send(WorkflowEvent::Cancel);
    let snapshot = handle.wait_for(|s| s.is_idle()).await.unwrap();
    assert!(snapshot.raw_image.is_none());

    // The in-flight analysis settles after the floor; it must not surface
    tokio::time::sleep(Duration::from_millis(400)).await;
    let snapshot = handle.snapshot();
    assert!(snapshot.is_idle());
    assert!(snapshot.classification_score.is_none());
    assert!(snapshot.last_error.is_none());
}

struct PanickingCompressor;

#[async_trait]
impl ImageCompressor for PanickingCompressor {
    async fn compress(
        &self,
        _file: &ImageFile,
        _options: &CompressionOptions,
    ) -> Result<CompressedImage> {
        panic!("compressor blew up")
    }
}

#[tokio::test]
async fn test_analysis_task_panic_fails_open() {
    let endpoint = MockEndpoint::new();
    let mut handle = spawn_engine_with_compressor(
        endpoint,
        Some(fixed_classifier("Porn", 0.95)),
        Duration::ZERO,
        Arc::new(PanickingCompressor),
    );
    handle.wait_for(|s| s.classifier_ready).await.unwrap();

    handle.send(WorkflowEvent::FileSelected {
        file: sample_image_file(),
    });

    // The panicked analysis must settle as a failure, not strand the
    // workflow in analyzing
    let snapshot = handle.wait_for(|s| s.is_user_confirming()).await.unwrap();
    assert!(snapshot.classification_score.is_none());
    assert!(snapshot.transport_image.is_none());
    assert!(snapshot.last_error.is_none());
}

#[tokio::test]
async fn test_cancel_from_confirmation_clears_the_attempt() {
    let endpoint = MockEndpoint::new();
    let mut handle = spawn_engine(
        endpoint,
        Some(fixed_classifier("Porn", 0.05)),
        Duration::ZERO,
    );
    handle.wait_for(|s| s.classifier_ready).await.unwrap();

    handle.send(WorkflowEvent::FileSelected {
        file: sample_image_file(),
    });
    handle.wait_for(|s| s.is_user_confirming()).await.unwrap();

    handle.send(WorkflowEvent::Cancel);
    let snapshot = handle.wait_for(|s| s.is_idle()).await.unwrap();
    assert!(snapshot.raw_image.is_none());
    assert!(snapshot.transport_image.is_none());
    assert!(snapshot.classification_score.is_none());
}
