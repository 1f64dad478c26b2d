//! Media intake: validation and out-of-band storage of uploads.
//!
//! Intake either accepts an upload completely (validated, durably stored,
//! opaque reference returned) or rejects it with a typed validation error.
//! There is no partial acceptance.

use std::sync::Arc;

use crate::domain::MediaRef;
use crate::infra::{BlobStore, EngineError, Result};

/// Content types accepted by default
pub const DEFAULT_ALLOWED_MEDIA_TYPES: &[&str] = &["video/mp4", "video/webm", "video/quicktime"];

/// Maximum upload size accepted by default (50 MiB)
pub const DEFAULT_MAX_MEDIA_BYTES: u64 = 50 * 1024 * 1024;

/// Intake constraints.
#[derive(Debug, Clone)]
pub struct IntakeConfig {
    pub allowed_types: Vec<String>,
    pub max_bytes: u64,
}

impl Default for IntakeConfig {
    fn default() -> Self {
        Self {
            allowed_types: DEFAULT_ALLOWED_MEDIA_TYPES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            max_bytes: DEFAULT_MAX_MEDIA_BYTES,
        }
    }
}

/// Validates uploads and stores accepted media in the blob store.
pub struct MediaIntake {
    config: IntakeConfig,
    blobs: Arc<dyn BlobStore>,
}

impl MediaIntake {
    pub fn new(config: IntakeConfig, blobs: Arc<dyn BlobStore>) -> Self {
        Self { config, blobs }
    }

    /// Validate an upload without storing it.
    ///
    /// `declared_len` is the size the caller announced (Content-Length);
    /// when present it must agree with the actual byte count.
    pub fn validate(
        &self,
        content_type: &str,
        declared_len: Option<u64>,
        bytes: &[u8],
    ) -> Result<()> {
        if !self
            .config
            .allowed_types
            .iter()
            .any(|t| t.eq_ignore_ascii_case(content_type))
        {
            return Err(EngineError::UnsupportedMediaType(content_type.to_string()));
        }
        if bytes.is_empty() {
            return Err(EngineError::Validation("empty upload".to_string()));
        }
        let actual = bytes.len() as u64;
        if let Some(declared) = declared_len {
            if declared != actual {
                return Err(EngineError::Validation(format!(
                    "declared size {} does not match received {} bytes",
                    declared, actual
                )));
            }
        }
        if actual > self.config.max_bytes {
            return Err(EngineError::MediaTooLarge {
                size: actual,
                max: self.config.max_bytes,
            });
        }
        Ok(())
    }

    /// Validate and store an upload, returning the stored reference and size.
    pub async fn accept(
        &self,
        content_type: &str,
        declared_len: Option<u64>,
        bytes: Vec<u8>,
    ) -> Result<(MediaRef, u64)> {
        self.validate(content_type, declared_len, &bytes)?;
        let size = bytes.len() as u64;
        let media_ref = self.blobs.write(bytes, content_type).await?;
        Ok((media_ref, size))
    }
}
