//! Untrusted image payload to stored JPEG
//!
//! Decode, aspect check, shrink and re-encode all happen in memory. Only a
//! fully encoded image touches the disk, through an exclusive create, so a
//! failure leaves no file behind.

use crate::error::EditError;
use crate::services::asset_store::{AssetStore, AssetTarget};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::{codecs::jpeg::JpegEncoder, imageops::FilterType, DynamicImage};
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::sync::Arc;
use tierview_common::codes::CodeGenerator;
use tierview_common::config::{ImageProfile, Limits};
use tracing::{debug, info};

/// Transcodes and stores images for one storage root
pub struct ImageTranscoder {
    store: AssetStore,
    codes: Arc<dyn CodeGenerator>,
    aspect_tolerance: f32,
    retry_count: usize,
    code_len: usize,
}

impl ImageTranscoder {
    pub fn new(store: AssetStore, codes: Arc<dyn CodeGenerator>, limits: &Limits) -> Self {
        Self {
            store,
            codes,
            aspect_tolerance: limits.aspect_tolerance,
            retry_count: limits.retry_count,
            code_len: limits.code_len,
        }
    }

    pub fn store(&self) -> &AssetStore {
        &self.store
    }

    /// Store `payload` for `target` and return its relative reference
    pub fn transcode(
        &self,
        target: &AssetTarget,
        profile: &ImageProfile,
        payload: &str,
    ) -> Result<String, EditError> {
        let bytes = decode_payload(payload)?;
        let image =
            image::load_from_memory(&bytes).map_err(|e| EditError::Decode(e.to_string()))?;

        check_aspect(
            image.width(),
            image.height(),
            profile.aspect_ratio,
            self.aspect_tolerance,
        )?;

        let image = shrink_to_edge(image, profile.max_edge);
        let encoded = encode_jpeg(&image, profile.quality)?;
        let reference = self.write_new(target, &profile.name_prefix, &encoded)?;

        info!(
            reference = %reference,
            width = image.width(),
            height = image.height(),
            bytes = encoded.len(),
            "Stored image"
        );
        Ok(reference)
    }

    fn write_new(
        &self,
        target: &AssetTarget,
        prefix: &str,
        bytes: &[u8],
    ) -> Result<String, EditError> {
        let dir = self.store.entity_dir(target).map_err(EditError::Storage)?;
        std::fs::create_dir_all(&dir).map_err(EditError::Storage)?;

        for attempt in 0..self.retry_count {
            let code = self.codes.generate(&target.seed(attempt), self.code_len);
            let reference = target.file_reference(&format!("{}{}.jpg", prefix, code));
            let path = self.store.resolve(&reference).map_err(EditError::Storage)?;

            let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => file,
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    debug!(reference = %reference, attempt, "File name collision");
                    continue;
                }
                Err(e) => return Err(EditError::Storage(e)),
            };

            if let Err(e) = file.write_all(bytes).and_then(|_| file.sync_all()) {
                drop(file);
                let _ = std::fs::remove_file(&path);
                return Err(EditError::Storage(e));
            }
            return Ok(reference);
        }

        Err(EditError::RetryExhausted {
            attempts: self.retry_count,
        })
    }
}

/// Base64 body, optionally wrapped in a `data:<mime>;base64,` URL
fn decode_payload(payload: &str) -> Result<Vec<u8>, EditError> {
    let trimmed = payload.trim();
    let body = match trimmed.strip_prefix("data:") {
        Some(rest) => rest
            .split_once(";base64,")
            .map(|(_, data)| data)
            .ok_or_else(|| EditError::Decode("data URL is not base64".to_string()))?,
        None => trimmed,
    };
    if body.is_empty() {
        return Err(EditError::Decode("empty image payload".to_string()));
    }
    STANDARD
        .decode(body)
        .map_err(|e| EditError::Decode(format!("invalid base64: {}", e)))
}

/// Symmetric band check: `|(w/h)/expected - 1| <= tolerance`
pub fn check_aspect(
    width: u32,
    height: u32,
    expected: Option<f32>,
    tolerance: f32,
) -> Result<(), EditError> {
    let Some(expected) = expected else {
        return Ok(());
    };
    if width == 0 || height == 0 {
        return Err(EditError::Decode("image has no pixels".to_string()));
    }
    let ratio = width as f32 / height as f32;
    if (ratio / expected - 1.0).abs() > tolerance {
        return Err(EditError::Aspect { ratio, expected });
    }
    Ok(())
}

/// Fit the long edge to `max_edge` with nearest-neighbour sampling
fn shrink_to_edge(image: DynamicImage, max_edge: u32) -> DynamicImage {
    if image.width().max(image.height()) <= max_edge {
        return image;
    }
    image.resize(max_edge, max_edge, FilterType::Nearest)
}

fn encode_jpeg(image: &DynamicImage, quality: u8) -> Result<Vec<u8>, EditError> {
    let rgb = image.to_rgb8();
    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, quality)
        .encode_image(&rgb)
        .map_err(|e| EditError::Storage(io::Error::new(io::ErrorKind::Other, e.to_string())))?;
    Ok(buf)
}
