// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! End-to-end tests of the 3-phase payment protocol through the engine

use std::sync::Arc;
use std::time::Duration;

use avatar_engine::{decode_payment_header, ErrorKind, FailurePhase, WorkflowEvent, WorkflowHandle};

use super::support::{
    challenge, fixed_classifier, generation_output, sample_image_file, spawn_engine, MockEndpoint,
    MockWallet,
};

/// Drive a fresh engine to the confirmation screen with a connected wallet
async fn confirming(endpoint: Arc<MockEndpoint>, wallet: Arc<MockWallet>) -> WorkflowHandle {
    let mut handle = spawn_engine(
        endpoint,
        Some(fixed_classifier("Porn", 0.05)),
        Duration::ZERO,
    );
    handle
        .wait_for(|s| s.classifier_ready)
        .await
        .expect("classifier never loaded");
    handle.send(WorkflowEvent::WalletConnected(wallet));
    handle.send(WorkflowEvent::FileSelected {
        file: sample_image_file(),
    });
    handle
        .wait_for(|s| s.is_user_confirming())
        .await
        .expect("never reached confirmation");
    handle
}

#[tokio::test]
async fn test_full_paid_generation_flow() {
    let endpoint = MockEndpoint::new();
    endpoint.queue_discover(Ok(challenge("200000")));
    endpoint.queue_execute(Ok(generation_output()));
    let wallet = MockWallet::accepting();

    let mut handle = confirming(endpoint.clone(), wallet.clone()).await;
    handle.send(WorkflowEvent::ConfirmPay { fid: Some(777) });
    let snapshot = handle.wait_for(|s| s.is_success()).await.unwrap();

    assert_eq!(
        snapshot.generated_image.as_deref(),
        Some("https://cdn.example.com/avatars/abc.png")
    );
    assert_eq!(snapshot.generation_record_id.as_deref(), Some("gen_abc"));
    assert!(snapshot.last_error.is_none());
    assert_eq!(endpoint.discover_count(), 1);
    assert_eq!(endpoint.execute_count(), 1);
    assert_eq!(wallet.sign_count(), 1);
}

#[tokio::test]
async fn test_replay_carries_decodable_payment_header_and_same_body() {
    let endpoint = MockEndpoint::new();
    endpoint.queue_discover(Ok(challenge("200000")));
    endpoint.queue_execute(Ok(generation_output()));
    let wallet = MockWallet::accepting();

    let mut handle = confirming(endpoint.clone(), wallet).await;
    handle.send(WorkflowEvent::ConfirmPay { fid: Some(777) });
    handle.wait_for(|s| s.is_success()).await.unwrap();

    let header = endpoint
        .last_payment_header
        .lock()
        .unwrap()
        .clone()
        .expect("no payment header attached");
    let payload = decode_payment_header(&header).unwrap();
    assert_eq!(payload.scheme, "exact");
    assert_eq!(payload.network, "base");
    assert_eq!(payload.payload.authorization.value, "200000");

    let request = endpoint.last_request.lock().unwrap().clone().unwrap();
    assert_eq!(request.fid, Some(777));
    assert!(request.image.starts_with("data:image/jpeg;base64,"));
}

#[tokio::test]
async fn test_wallet_rejection_then_retry_skips_discovery() {
    let endpoint = MockEndpoint::new();
    endpoint.queue_discover(Ok(challenge("200000")));
    endpoint.queue_execute(Ok(generation_output()));
    let wallet = MockWallet::rejecting_first(1, "User rejected the request");

    let mut handle = confirming(endpoint.clone(), wallet.clone()).await;
    handle.send(WorkflowEvent::ConfirmPay { fid: None });
    let snapshot = handle.wait_for(|s| s.is_failed()).await.unwrap();

    assert_eq!(snapshot.failed_phase(), Some(FailurePhase::Payment));
    let error = snapshot.last_error.unwrap();
    assert_eq!(error.kind, ErrorKind::PaymentRejected);
    assert!(error.retryable);
    assert_eq!(endpoint.discover_count(), 1);
    assert_eq!(wallet.sign_count(), 1);

    // The challenge is kept, so retry goes straight back to the wallet
    handle.send(WorkflowEvent::Retry);
    let snapshot = handle.wait_for(|s| s.is_success()).await.unwrap();
    assert!(snapshot.last_error.is_none());
    assert_eq!(endpoint.discover_count(), 1);
    assert_eq!(wallet.sign_count(), 2);
    assert_eq!(endpoint.execute_count(), 1);
}

#[tokio::test]
async fn test_discovery_failure_then_retry_restarts_discovery() {
    let endpoint = MockEndpoint::new();
    endpoint.queue_discover(Err(anyhow::anyhow!(
        "expected 402 payment challenge, got 500 Internal Server Error"
    )));
    endpoint.queue_discover(Ok(challenge("200000")));
    endpoint.queue_execute(Ok(generation_output()));
    let wallet = MockWallet::accepting();

    let mut handle = confirming(endpoint.clone(), wallet).await;
    handle.send(WorkflowEvent::ConfirmPay { fid: None });
    let snapshot = handle.wait_for(|s| s.is_failed()).await.unwrap();

    assert_eq!(snapshot.failed_phase(), Some(FailurePhase::Discovery));
    assert_eq!(snapshot.last_error.unwrap().kind, ErrorKind::PaymentDiscovery);

    handle.send(WorkflowEvent::Retry);
    handle.wait_for(|s| s.is_success()).await.unwrap();
    assert_eq!(endpoint.discover_count(), 2);
}

#[tokio::test]
async fn test_quoted_amount_above_cap_never_reaches_the_wallet() {
    let endpoint = MockEndpoint::new();
    // Default cap is 250000 atomic units
    endpoint.queue_discover(Ok(challenge("300000")));
    let wallet = MockWallet::accepting();

    let mut handle = confirming(endpoint.clone(), wallet.clone()).await;
    handle.send(WorkflowEvent::ConfirmPay { fid: None });
    let snapshot = handle.wait_for(|s| s.is_failed()).await.unwrap();

    assert_eq!(snapshot.failed_phase(), Some(FailurePhase::Payment));
    let error = snapshot.last_error.unwrap();
    assert_eq!(error.kind, ErrorKind::PaymentSigning);
    assert!(error.message.contains("exceeds maximum"));
    assert_eq!(wallet.sign_count(), 0);
}

#[tokio::test]
async fn test_insufficient_balance_on_execution_is_classified() {
    let endpoint = MockEndpoint::new();
    endpoint.queue_discover(Ok(challenge("200000")));
    endpoint.queue_execute(Err(anyhow::anyhow!("transfer amount exceeds balance")));
    let wallet = MockWallet::accepting();

    let mut handle = confirming(endpoint.clone(), wallet).await;
    handle.send(WorkflowEvent::ConfirmPay { fid: None });
    let snapshot = handle.wait_for(|s| s.is_failed()).await.unwrap();

    assert_eq!(snapshot.failed_phase(), Some(FailurePhase::Generation));
    assert_eq!(
        snapshot.last_error.unwrap().kind,
        ErrorKind::InsufficientBalance
    );
}

#[tokio::test]
async fn test_execution_failure_retries_with_the_existing_token() {
    let endpoint = MockEndpoint::new();
    endpoint.queue_discover(Ok(challenge("200000")));
    endpoint.queue_execute(Err(anyhow::anyhow!("upstream timeout")));
    endpoint.queue_execute(Ok(generation_output()));
    let wallet = MockWallet::accepting();

    let mut handle = confirming(endpoint.clone(), wallet.clone()).await;
    handle.send(WorkflowEvent::ConfirmPay { fid: None });
    let snapshot = handle.wait_for(|s| s.is_failed()).await.unwrap();
    assert_eq!(snapshot.last_error.unwrap().kind, ErrorKind::Generation);

    handle.send(WorkflowEvent::Retry);
    handle.wait_for(|s| s.is_success()).await.unwrap();

    // No fresh discovery and no second signature
    assert_eq!(endpoint.discover_count(), 1);
    assert_eq!(wallet.sign_count(), 1);
    assert_eq!(endpoint.execute_count(), 2);
}

#[tokio::test]
async fn test_confirm_without_wallet_is_rejected_by_the_guard() {
    let endpoint = MockEndpoint::new();
    let mut handle = spawn_engine(
        endpoint.clone(),
        Some(fixed_classifier("Porn", 0.05)),
        Duration::ZERO,
    );
    handle.wait_for(|s| s.classifier_ready).await.unwrap();
    handle.send(WorkflowEvent::FileSelected {
        file: sample_image_file(),
    });
    handle.wait_for(|s| s.is_user_confirming()).await.unwrap();

    handle.send(WorkflowEvent::ConfirmPay { fid: None });
    tokio::time::sleep(Duration::from_millis(50)).await;

    let snapshot = handle.snapshot();
    assert!(snapshot.is_user_confirming());
    assert_eq!(endpoint.discover_count(), 0);
}

#[tokio::test]
async fn test_start_over_after_success_keeps_wallet_and_style() {
    let endpoint = MockEndpoint::new();
    endpoint.queue_discover(Ok(challenge("200000")));
    endpoint.queue_execute(Ok(generation_output()));
    let wallet = MockWallet::accepting();

    let mut handle = confirming(endpoint.clone(), wallet).await;
    handle.send(WorkflowEvent::ConfirmPay { fid: Some(1) });
    handle.wait_for(|s| s.is_success()).await.unwrap();

    handle.send(WorkflowEvent::StartOver);
    let snapshot = handle.wait_for(|s| s.is_idle()).await.unwrap();
    assert!(snapshot.wallet_connected);
    assert!(snapshot.raw_image.is_none());
    assert!(snapshot.generated_image.is_none());
    assert!(snapshot.last_error.is_none());
}
