// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Bounded JPEG recompression for network transport
//!
//! The compressor preserves enough detail for downstream AI analysis while
//! keeping the payload within the endpoint's transport limits: longest edge
//! capped, high initial JPEG quality stepped down until the byte budget is
//! met, and never upscaling a smaller source. Re-encoding also strips any
//! EXIF metadata from the original.

use anyhow::{Context, Result};
use async_trait::async_trait;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::DynamicImage;
use thiserror::Error;
use tracing::debug;

use super::data_url::encode_data_url;

/// Lowest JPEG quality the size-fitting loop will accept
const MIN_QUALITY: u8 = 40;

/// Custom error types for image processing
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("image data is empty")]
    EmptyData,

    #[error("image data is too large: {0} bytes (max: {1} bytes)")]
    TooLarge(usize, usize),

    #[error("failed to decode image: {0}")]
    DecodeFailed(String),

    #[error("failed to encode image: {0}")]
    EncodeFailed(String),
}

/// Compression targets for transport payloads
#[derive(Debug, Clone)]
pub struct CompressionOptions {
    /// Target upper bound for the re-encoded file (bytes)
    pub max_bytes: usize,
    /// Longest-edge cap in pixels
    pub max_dimension: u32,
    /// Initial JPEG quality (0-100)
    pub quality: u8,
    /// Strip metadata from the source (re-encoding always does)
    pub strip_metadata: bool,
    /// Never enlarge a source smaller than the dimension cap
    pub allow_upscale: bool,
}

impl Default for CompressionOptions {
    fn default() -> Self {
        Self {
            max_bytes: 2 * 1024 * 1024,
            max_dimension: 1536,
            quality: 90,
            strip_metadata: true,
            allow_upscale: false,
        }
    }
}

/// An image file held in memory with its MIME type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageFile {
    pub bytes: Vec<u8>,
    pub media_type: String,
}

impl ImageFile {
    pub fn new(bytes: Vec<u8>, media_type: impl Into<String>) -> Self {
        Self {
            bytes,
            media_type: media_type.into(),
        }
    }

    /// Displayable/transportable data-URL form of this file
    pub fn to_data_url(&self) -> String {
        encode_data_url(&self.media_type, &self.bytes)
    }
}

/// Result of recompressing an image for transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressedImage {
    pub file: ImageFile,
    pub data_url: String,
    pub width: u32,
    pub height: u32,
}

/// Compressor collaborator: re-encodes a raw file to the configured targets
/// and produces both the file and a displayable data-URL representation.
#[async_trait]
pub trait ImageCompressor: Send + Sync {
    async fn compress(
        &self,
        file: &ImageFile,
        options: &CompressionOptions,
    ) -> Result<CompressedImage>;
}

/// Default compressor backed by the `image` crate, re-encoding to JPEG
pub struct JpegCompressor;

#[async_trait]
impl ImageCompressor for JpegCompressor {
    async fn compress(
        &self,
        file: &ImageFile,
        options: &CompressionOptions,
    ) -> Result<CompressedImage> {
        let bytes = file.bytes.clone();
        let options = options.clone();
        let compressed =
            tokio::task::spawn_blocking(move || compress_blocking(&bytes, &options))
                .await
                .context("compression task panicked")??;
        Ok(compressed)
    }
}

/// Decode raw image bytes into a bitmap
pub fn decode_image(bytes: &[u8]) -> Result<DynamicImage, MediaError> {
    if bytes.is_empty() {
        return Err(MediaError::EmptyData);
    }
    image::load_from_memory(bytes).map_err(|e| MediaError::DecodeFailed(e.to_string()))
}

/// Synchronous compression core. CPU-bound; call from `spawn_blocking`.
pub fn compress_blocking(
    bytes: &[u8],
    options: &CompressionOptions,
) -> Result<CompressedImage, MediaError> {
    let img = decode_image(bytes)?;
    let (orig_width, orig_height) = (img.width(), img.height());

    let longest = img.width().max(img.height());
    let resized = if longest > options.max_dimension {
        img.resize(
            options.max_dimension,
            options.max_dimension,
            FilterType::Lanczos3,
        )
    } else {
        // Source already within bounds; resizing up would fabricate detail
        img
    };

    let rgb = resized.to_rgb8();
    let mut quality = options.quality;
    loop {
        let mut out = Vec::new();
        let mut encoder = JpegEncoder::new_with_quality(&mut out, quality);
        encoder
            .encode_image(&rgb)
            .map_err(|e| MediaError::EncodeFailed(e.to_string()))?;

        if out.len() <= options.max_bytes || quality <= MIN_QUALITY {
            debug!(
                "compressed image: {}x{} -> {}x{}, {} bytes at quality {}",
                orig_width,
                orig_height,
                rgb.width(),
                rgb.height(),
                out.len(),
                quality
            );
            let file = ImageFile::new(out, "image/jpeg");
            let data_url = file.to_data_url();
            return Ok(CompressedImage {
                file,
                data_url,
                width: rgb.width(),
                height: rgb.height(),
            });
        }

        quality = quality.saturating_sub(10);
    }
}
