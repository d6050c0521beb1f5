// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use anyhow::{Context, Result};
use avatar_engine::{
    EngineConfig, EngineDeps, HttpGenerationEndpoint, ImageFile, JpegCompressor,
    LocalWalletSigner, StyleId, WorkflowEngine, WorkflowEvent,
};
use avatar_engine::screening::{ClassifierLoader, OnnxClassifierLoader};
use std::{env, sync::Arc};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber for logging
    if env::var("RUST_LOG").is_err() {
        env::set_var("RUST_LOG", "info");
    }
    tracing_subscriber::fmt::init();

    let mut args = env::args().skip(1);
    let image_path = args
        .next()
        .context("usage: avatar-engine <image-path> [style-id]")?;
    let style = StyleId::parse_or_default(&args.next().unwrap_or_default());

    let config = EngineConfig::from_env();
    println!("🎨 Avatar generation against {}", config.endpoint_url);

    let key = env::var("AVATAR_PRIVATE_KEY")
        .context("AVATAR_PRIVATE_KEY must hold the payer's private key")?;
    let wallet = Arc::new(LocalWalletSigner::from_private_key(&key)?);

    let classifier_loader: Option<Arc<dyn ClassifierLoader>> = env::var("AVATAR_NSFW_MODEL_PATH")
        .ok()
        .map(|path| Arc::new(OnnxClassifierLoader::new(path)) as Arc<dyn ClassifierLoader>);
    if classifier_loader.is_none() {
        println!("⚠️  AVATAR_NSFW_MODEL_PATH not set, screening will fail open");
    }

    let bytes = tokio::fs::read(&image_path)
        .await
        .with_context(|| format!("failed to read {image_path}"))?;
    let media_type = match image_path.rsplit('.').next() {
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        _ => "image/jpeg",
    };
    let file = ImageFile::new(bytes, media_type);

    let fid = env::var("AVATAR_FID").ok().and_then(|v| v.parse().ok());
    let endpoint = Arc::new(HttpGenerationEndpoint::new(&config.endpoint_url)?);

    let screening_enabled = classifier_loader.is_some();
    let mut handle = WorkflowEngine::spawn(EngineDeps {
        endpoint,
        compressor: Arc::new(JpegCompressor),
        classifier_loader,
        config,
    });

    // Screening is best-effort, but for a one-shot run give the model a
    // chance to load before intake starts
    if screening_enabled {
        let ready = tokio::time::timeout(
            std::time::Duration::from_secs(30),
            handle.wait_for(|s| s.classifier_ready),
        )
        .await;
        if ready.is_err() {
            println!("⚠️  NSFW model did not load in time, screening will fail open");
        }
    }

    handle.send(WorkflowEvent::WalletConnected(wallet));
    handle.send(WorkflowEvent::SelectStyle(style));
    handle.send(WorkflowEvent::FileSelected { file });

    let snapshot = handle
        .wait_for(|s| s.is_user_confirming() || s.is_nsfw_violation())
        .await?;
    if snapshot.is_nsfw_violation() {
        anyhow::bail!("image rejected by NSFW screening");
    }
    if let Some(score) = snapshot.classification_score {
        println!("✅ Screening passed (score {score:.3})");
    }

    handle.send(WorkflowEvent::ConfirmPay { fid });
    let snapshot = handle
        .wait_for(|s| s.is_success() || s.is_failed())
        .await?;

    match snapshot.generated_image {
        Some(url) => {
            println!("🖼️  Avatar ready: {url}");
            if let Some(id) = snapshot.generation_record_id {
                println!("    record id: {id}");
            }
            Ok(())
        }
        None => {
            let error = snapshot
                .last_error
                .map(|e| e.message)
                .unwrap_or_else(|| "unknown failure".to_string());
            anyhow::bail!("generation failed: {error}")
        }
    }
}
