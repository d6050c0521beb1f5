// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Image intake: decoding, bounded recompression and data-URL transport forms

mod compress;
mod data_url;

pub use compress::{
    compress_blocking, decode_image, CompressedImage, CompressionOptions, ImageCompressor,
    ImageFile, JpegCompressor, MediaError,
};
pub use data_url::{
    encode_data_url, parse_data_url, DataUrlError, ParsedDataUrl, MAX_TRANSPORT_SIZE,
    SUPPORTED_IMAGE_TYPES,
};
