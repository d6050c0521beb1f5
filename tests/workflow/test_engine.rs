// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Engine plumbing: snapshots, style selection and wallet session events

use std::time::Duration;

use avatar_engine::{StyleId, WorkflowEvent};

use super::support::{fixed_classifier, sample_image_file, spawn_engine, MockEndpoint, MockWallet};

#[tokio::test]
async fn test_initial_snapshot() {
    let handle = spawn_engine(MockEndpoint::new(), None, Duration::ZERO);
    let snapshot = handle.snapshot();
    assert!(snapshot.is_idle());
    assert_eq!(snapshot.selected_style, StyleId::default());
    assert!(!snapshot.wallet_connected);
    assert!(!snapshot.classifier_ready);
    assert!(snapshot.raw_image.is_none());
    assert!(snapshot.last_error.is_none());
}

#[tokio::test]
async fn test_style_selection_is_published() {
    let mut handle = spawn_engine(MockEndpoint::new(), None, Duration::ZERO);
    handle.send(WorkflowEvent::SelectStyle(StyleId::Heritage));
    let snapshot = handle
        .wait_for(|s| s.selected_style == StyleId::Heritage)
        .await
        .unwrap();
    assert!(snapshot.is_idle());
}

#[tokio::test]
async fn test_wallet_session_events_apply_in_any_state() {
    let mut handle = spawn_engine(
        MockEndpoint::new(),
        Some(fixed_classifier("Porn", 0.05)),
        Duration::ZERO,
    );
    handle.wait_for(|s| s.classifier_ready).await.unwrap();

    handle.send(WorkflowEvent::WalletConnected(MockWallet::accepting()));
    handle.wait_for(|s| s.wallet_connected).await.unwrap();

    // Still applies after leaving idle
    handle.send(WorkflowEvent::FileSelected {
        file: sample_image_file(),
    });
    handle.wait_for(|s| s.is_user_confirming()).await.unwrap();
    handle.send(WorkflowEvent::WalletDisconnected);
    let snapshot = handle.wait_for(|s| !s.wallet_connected).await.unwrap();
    assert!(snapshot.is_user_confirming());
}

#[tokio::test]
async fn test_handles_are_cloneable_and_observe_the_same_machine() {
    let mut handle = spawn_engine(MockEndpoint::new(), None, Duration::ZERO);
    let mut observer = handle.clone();

    handle.send(WorkflowEvent::SelectStyle(StyleId::CyberLink));
    observer
        .wait_for(|s| s.selected_style == StyleId::CyberLink)
        .await
        .unwrap();
    handle
        .wait_for(|s| s.selected_style == StyleId::CyberLink)
        .await
        .unwrap();
}
