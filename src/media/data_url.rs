// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Data-URL encoding for image transport payloads

use base64::{engine::general_purpose::STANDARD, Engine as _};
use thiserror::Error;

/// MIME types the generation endpoint accepts
pub const SUPPORTED_IMAGE_TYPES: &[&str] =
    &["image/jpeg", "image/png", "image/webp", "image/gif"];

/// Maximum decoded transport size accepted by the generation endpoint (5MB)
pub const MAX_TRANSPORT_SIZE: usize = 5 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum DataUrlError {
    #[error("data URL is empty")]
    Empty,

    #[error("malformed data URL; expected data:image/<type>;base64,<data>")]
    Malformed,

    #[error("unsupported media type: {0}")]
    UnsupportedType(String),

    #[error("invalid base64 payload: {0}")]
    InvalidBase64(#[from] base64::DecodeError),

    #[error("image payload is too large: {0} bytes (max: {1} bytes)")]
    TooLarge(usize, usize),
}

/// Encode raw image bytes as a `data:<mime>;base64,<data>` URL
pub fn encode_data_url(media_type: &str, bytes: &[u8]) -> String {
    format!("data:{};base64,{}", media_type, STANDARD.encode(bytes))
}

/// A parsed image data URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedDataUrl {
    pub media_type: String,
    pub bytes: Vec<u8>,
}

/// Parse and validate an image data URL against the endpoint's transport rules
pub fn parse_data_url(url: &str) -> Result<ParsedDataUrl, DataUrlError> {
    if url.is_empty() {
        return Err(DataUrlError::Empty);
    }
    let rest = url.strip_prefix("data:").ok_or(DataUrlError::Malformed)?;
    let (media_type, payload) = rest.split_once(";base64,").ok_or(DataUrlError::Malformed)?;
    if !SUPPORTED_IMAGE_TYPES.contains(&media_type) {
        return Err(DataUrlError::UnsupportedType(media_type.to_string()));
    }
    let bytes = STANDARD.decode(payload)?;
    if bytes.len() > MAX_TRANSPORT_SIZE {
        return Err(DataUrlError::TooLarge(bytes.len(), MAX_TRANSPORT_SIZE));
    }
    Ok(ParsedDataUrl {
        media_type: media_type.to_string(),
        bytes,
    })
}
