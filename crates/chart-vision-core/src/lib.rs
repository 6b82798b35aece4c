#![warn(missing_docs)]
//! # chart-vision-core
//!
//! ## Purpose
//! Defines the image data model shared across the `chart-vision` workspace.
//!
//! ## Responsibilities
//! - Represent a user-selected image file as a lazily-read handle.
//! - Derive and sniff image MIME types.
//! - Encode/decode base64 image payloads for the model request.
//!
//! ## Data flow
//! The uploader produces an [`ImageFile`] handle. At analysis time the bytes
//! are read through an image source and packaged into an [`ImagePayload`],
//! which the request service embeds as inline data.
//!
//! ## Ownership and lifetimes
//! Handles and payloads own their strings and buffers so they can move freely
//! between the uploader, the session and the request service.
//!
//! ## Error model
//! Invalid handles and undecodable payloads return [`CoreError`] variants.
//!
//! ## Security and privacy notes
//! This crate never logs image bytes or encoded payloads.
//!
//! ## Example
//! ```rust
//! use chart_vision_core::ImagePayload;
//!
//! let payload = ImagePayload::encode(&[1, 2, 3], "image/png");
//! assert_eq!(payload.data, "AQID");
//! assert_eq!(payload.decode().unwrap(), vec![1, 2, 3]);
//! ```

use std::path::{Path, PathBuf};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use image::ImageFormat;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// MIME type used when a file's format cannot be determined.
pub const UNKNOWN_MIME_TYPE: &str = "application/octet-stream";

/// Handle to one user-selected file.
///
/// Bytes are not held here; they are read when an analysis starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageFile {
    /// Location the bytes are read from.
    pub path: PathBuf,
    /// Display name (final path component).
    pub name: String,
    /// Declared MIME type.
    pub mime_type: String,
}

impl ImageFile {
    /// Creates a handle from a path, deriving name and MIME type.
    ///
    /// # Errors
    /// Returns [`CoreError::InvalidFileName`] when the path has no file name.
    pub fn from_path(path: impl Into<PathBuf>) -> Result<Self, CoreError> {
        let path = path.into();
        let name = path
            .file_name()
            .and_then(|name| name.to_str())
            .filter(|name| !name.trim().is_empty())
            .ok_or_else(|| CoreError::InvalidFileName(path.display().to_string()))?
            .to_string();
        let mime_type = mime_type_for_path(&path).to_string();

        Ok(Self {
            path,
            name,
            mime_type,
        })
    }

    /// Creates a handle with an explicitly declared MIME type.
    pub fn with_mime_type(
        path: impl Into<PathBuf>,
        name: impl Into<String>,
        mime_type: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into(),
            name: name.into(),
            mime_type: mime_type.into(),
        }
    }

    /// Returns `true` when the declared MIME type is an image type.
    pub fn is_image(&self) -> bool {
        is_image_mime(&self.mime_type)
    }
}

/// Base64 image data plus MIME type, ready for inline transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImagePayload {
    /// Standard-alphabet, padded base64 of the file bytes.
    pub data: String,
    /// Declared MIME type of the bytes.
    pub mime_type: String,
}

impl ImagePayload {
    /// Encodes raw bytes into a payload.
    pub fn encode(bytes: &[u8], mime_type: impl Into<String>) -> Self {
        Self {
            data: STANDARD.encode(bytes),
            mime_type: mime_type.into(),
        }
    }

    /// Decodes the payload back into raw bytes.
    ///
    /// # Errors
    /// Returns [`CoreError::Base64`] when `data` is not valid base64.
    pub fn decode(&self) -> Result<Vec<u8>, CoreError> {
        STANDARD.decode(&self.data).map_err(CoreError::Base64)
    }

    /// Serializes payload to compact JSON bytes.
    ///
    /// # Errors
    /// Returns [`CoreError::Codec`] when JSON serialization fails.
    pub fn to_json_bytes(&self) -> Result<Vec<u8>, CoreError> {
        serde_json::to_vec(self).map_err(CoreError::Codec)
    }

    /// Returns encoded length in bytes.
    pub fn encoded_len(&self) -> usize {
        self.data.len()
    }
}

/// Returns `true` for MIME types in the `image/` family.
pub fn is_image_mime(mime_type: &str) -> bool {
    mime_type
        .trim()
        .to_ascii_lowercase()
        .starts_with("image/")
}

/// Maps a file extension to an image MIME type.
///
/// Unknown or missing extensions map to [`UNKNOWN_MIME_TYPE`].
pub fn mime_type_for_path(path: &Path) -> &'static str {
    path.extension()
        .and_then(ImageFormat::from_extension)
        .map(|format| format.to_mime_type())
        .unwrap_or(UNKNOWN_MIME_TYPE)
}

/// Identifies an image MIME type from magic bytes.
pub fn sniff_mime_type(bytes: &[u8]) -> Option<&'static str> {
    image::guess_format(bytes)
        .ok()
        .map(|format| format.to_mime_type())
}

/// Error type for core validation and codec failures.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Path does not name a file.
    #[error("invalid file name: {0}")]
    InvalidFileName(String),
    /// Base64 payload could not be decoded.
    #[error("payload base64 failure: {0}")]
    Base64(#[from] base64::DecodeError),
    /// JSON encoding/decoding error.
    #[error("payload codec failure: {0}")]
    Codec(#[from] serde_json::Error),
}
