#![warn(missing_docs)]
//! # chart-vision-intake
//!
//! ## Purpose
//! Provides image selection, preview and byte acquisition for chart uploads.
//!
//! ## Responsibilities
//! - Define a backend-agnostic image source trait.
//! - Read real files from disk.
//! - Expose a deterministic in-memory source for CI and unit tests.
//! - Track uploader state: current selection, drag highlight, previews.
//! - Encode a selected file into a transport payload.
//!
//! ## Data flow
//! User picks or drops a file -> [`ImageUploader::accept_file`] validates the
//! MIME type and issues a preview -> at analysis time [`encode_image`] reads
//! the bytes through an [`ImageSource`] and returns an
//! [`chart_vision_core::ImagePayload`].
//!
//! ## Ownership and lifetimes
//! The uploader owns its selection and preview handles. Read buffers are
//! owned values that never outlive the encode call.
//!
//! ## Error model
//! Unreadable files are reported as [`IntakeError`] values. Non-image files
//! are not errors; the uploader ignores them.
//!
//! ## Security and privacy notes
//! Image bytes are read into memory only for the duration of one analysis and
//! are never written back to disk.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use chart_vision_core::{ImageFile, ImagePayload, sniff_mime_type};
use rand::Rng;
use thiserror::Error;

/// URL prefix of issued preview resources.
pub const PREVIEW_URL_PREFIX: &str = "blob:chart-vision/";

/// Trait implemented by concrete byte sources.
pub trait ImageSource: Send + Sync {
    /// Reads all bytes of a selected file.
    ///
    /// # Errors
    /// Returns [`IntakeError::Read`] when the bytes cannot be obtained.
    fn read_bytes(&self, file: &ImageFile) -> Result<Vec<u8>, IntakeError>;
}

/// Filesystem-backed image source.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsImageSource;

impl ImageSource for FsImageSource {
    fn read_bytes(&self, file: &ImageFile) -> Result<Vec<u8>, IntakeError> {
        std::fs::read(&file.path).map_err(|error| IntakeError::Read {
            name: file.name.clone(),
            detail: error.to_string(),
        })
    }
}

/// Deterministic in-memory source for test and demo usage.
#[derive(Debug, Clone, Default)]
pub struct InMemoryImageSource {
    files: HashMap<PathBuf, Vec<u8>>,
}

impl InMemoryImageSource {
    /// Creates an empty source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers bytes under a path and returns the builder.
    pub fn with_file(mut self, path: impl Into<PathBuf>, bytes: Vec<u8>) -> Self {
        self.files.insert(path.into(), bytes);
        self
    }
}

impl ImageSource for InMemoryImageSource {
    fn read_bytes(&self, file: &ImageFile) -> Result<Vec<u8>, IntakeError> {
        self.files
            .get(&file.path)
            .cloned()
            .ok_or_else(|| IntakeError::Read {
                name: file.name.clone(),
                detail: "file is no longer available".to_string(),
            })
    }
}

/// Reads a selected file and encodes it for the model request.
///
/// The declared MIME type is sent as-is; a disagreeing magic-byte sniff is
/// only logged.
///
/// # Errors
/// Returns [`IntakeError::Read`] when the source cannot provide the bytes.
pub fn encode_image(source: &dyn ImageSource, file: &ImageFile) -> Result<ImagePayload, IntakeError> {
    let bytes = source.read_bytes(file)?;

    if let Some(sniffed) = sniff_mime_type(&bytes)
        && sniffed != file.mime_type
    {
        log::warn!(
            "intake | encode | declared={} sniffed={} name={}",
            file.mime_type,
            sniffed,
            file.name
        );
    }

    log::debug!("intake | encode | bytes={} name={}", bytes.len(), file.name);
    Ok(ImagePayload::encode(&bytes, file.mime_type.clone()))
}

/// Preview resource issued for a selected file.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PreviewHandle {
    /// Opaque preview URL.
    pub url: String,
}

/// Issues and revokes preview URLs.
#[derive(Debug, Clone, Default)]
pub struct PreviewRegistry {
    live: HashSet<String>,
}

impl PreviewRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Issues a fresh preview URL for `file`.
    pub fn create(&mut self, file: &ImageFile) -> PreviewHandle {
        let token: u64 = rand::rng().random();
        let url = format!("{PREVIEW_URL_PREFIX}{token:016x}");
        log::debug!("intake | preview_create | name={} url={url}", file.name);
        self.live.insert(url.clone());
        PreviewHandle { url }
    }

    /// Revokes a preview. Returns `false` when it was not live.
    pub fn revoke(&mut self, handle: &PreviewHandle) -> bool {
        self.live.remove(&handle.url)
    }

    /// Returns `true` while the URL has not been revoked.
    pub fn is_live(&self, url: &str) -> bool {
        self.live.contains(url)
    }

    /// Returns number of unrevoked previews.
    pub fn live_count(&self) -> usize {
        self.live.len()
    }
}

/// Accepted file together with its preview.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedImage {
    /// Selected file handle.
    pub file: ImageFile,
    /// Preview issued for the file.
    pub preview: PreviewHandle,
}

/// Uploader state: selection, drag highlight and previews.
#[derive(Debug, Clone, Default)]
pub struct ImageUploader {
    current: Option<UploadedImage>,
    drag_active: bool,
    previews: PreviewRegistry,
}

impl ImageUploader {
    /// Creates an uploader with no selection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Accepts a file when it has an image MIME type.
    ///
    /// # Returns
    /// `true` when the file replaced the current selection. Non-image files
    /// are ignored and leave the selection untouched.
    pub fn accept_file(&mut self, file: ImageFile) -> bool {
        if !file.is_image() {
            log::debug!(
                "intake | reject | name={} mime={}",
                file.name,
                file.mime_type
            );
            return false;
        }

        self.release_current();
        let preview = self.previews.create(&file);
        log::info!("intake | accept | name={} mime={}", file.name, file.mime_type);
        self.current = Some(UploadedImage { file, preview });
        true
    }

    /// Pointer entered the drop target.
    pub fn drag_enter(&mut self) {
        self.drag_active = true;
    }

    /// Pointer is moving over the drop target.
    pub fn drag_over(&mut self) {
        self.drag_active = true;
    }

    /// Pointer left the drop target.
    pub fn drag_leave(&mut self) {
        self.drag_active = false;
    }

    /// Files were dropped. Only the first file is considered.
    pub fn drop_files(&mut self, files: Vec<ImageFile>) -> bool {
        self.drag_active = false;
        match files.into_iter().next() {
            Some(file) => self.accept_file(file),
            None => false,
        }
    }

    /// Clears the selection and revokes its preview.
    pub fn reset(&mut self) {
        self.release_current();
        self.drag_active = false;
    }

    /// Returns current selection.
    pub fn current(&self) -> Option<&UploadedImage> {
        self.current.as_ref()
    }

    /// Returns `true` while a drag hovers the drop target.
    pub fn is_drag_active(&self) -> bool {
        self.drag_active
    }

    /// Returns preview registry snapshot.
    pub fn previews(&self) -> &PreviewRegistry {
        &self.previews
    }

    fn release_current(&mut self) {
        if let Some(previous) = self.current.take() {
            self.previews.revoke(&previous.preview);
        }
    }
}

/// Intake layer error type.
#[derive(Debug, Error)]
pub enum IntakeError {
    /// File bytes could not be read.
    #[error("could not read {name}: {detail}")]
    Read {
        /// Display name of the file.
        name: String,
        /// Underlying failure description.
        detail: String,
    },
}
