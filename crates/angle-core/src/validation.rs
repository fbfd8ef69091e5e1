//! Client-side validation applied before anything is sent to the server.

use std::path::Path;

use bytes::Bytes;
use thiserror::Error;

use crate::config::ClientConfig;

/// MIME types accepted by the upload endpoint.
pub const ALLOWED_IMAGE_MIME_TYPES: &[&str] = &["image/jpeg", "image/png", "image/webp", "image/gif"];

/// Default per-file upload cap (10 MiB).
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 10 * 1024 * 1024;

/// Default number of images an item may hold.
pub const DEFAULT_MAX_IMAGES: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{file}: unsupported file type {mime_type} (allowed: JPEG, PNG, WebP, GIF)")]
    UnsupportedMimeType { file: String, mime_type: String },
    #[error("{file}: {size} bytes exceeds the {max} byte limit")]
    FileTooLarge { file: String, size: u64, max: u64 },
    #[error("{file}: file is empty")]
    EmptyFile { file: String },
    #[error("{0} is required")]
    MissingField(&'static str),
    #[error("{field} {reason}")]
    InvalidField { field: &'static str, reason: String },
}

/// A file chosen by the user for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSelection {
    pub name: String,
    pub mime_type: String,
    pub bytes: Bytes,
}

impl FileSelection {
    /// Build a selection, inferring the MIME type from the name when the
    /// declared type is missing or generic.
    pub fn new(name: impl Into<String>, declared_type: Option<&str>, bytes: impl Into<Bytes>) -> Self {
        let name = name.into();
        let mime_type = infer_mime_type(declared_type, &name);
        Self {
            name,
            mime_type,
            bytes: bytes.into(),
        }
    }

    /// Read a selection from disk.
    pub async fn from_path(path: &Path) -> std::io::Result<Self> {
        let bytes = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .map_or_else(|| "file".to_string(), |name| name.to_string_lossy().into_owned());
        Ok(Self::new(name, None, bytes))
    }

    #[must_use]
    pub fn size(&self) -> u64 {
        u64::try_from(self.bytes.len()).unwrap_or(u64::MAX)
    }
}

/// Limits applied to image uploads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadPolicy {
    pub allowed_mime_types: Vec<String>,
    pub max_file_bytes: u64,
    /// Single-image owners accept at most one image in total.
    pub multiple: bool,
    pub max_images: usize,
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self {
            allowed_mime_types: ALLOWED_IMAGE_MIME_TYPES
                .iter()
                .map(ToString::to_string)
                .collect(),
            max_file_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            multiple: true,
            max_images: DEFAULT_MAX_IMAGES,
        }
    }
}

impl UploadPolicy {
    /// Policy derived from client configuration.
    pub fn from_config(config: &ClientConfig, multiple: bool) -> Self {
        Self {
            max_file_bytes: config.max_upload_bytes,
            max_images: config.max_images,
            multiple,
            ..Self::default()
        }
    }

    /// Policy for owners holding a single image (avatars, store logos).
    #[must_use]
    pub fn single() -> Self {
        Self {
            multiple: false,
            max_images: 1,
            ..Self::default()
        }
    }

    /// Total number of images (confirmed + pending) this policy allows.
    #[must_use]
    pub fn capacity(&self) -> usize {
        if self.multiple {
            self.max_images
        } else {
            1
        }
    }

    pub fn validate_file(&self, file: &FileSelection) -> Result<(), ValidationError> {
        if file.bytes.is_empty() {
            return Err(ValidationError::EmptyFile {
                file: file.name.clone(),
            });
        }
        let allowed = self
            .allowed_mime_types
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(&file.mime_type));
        if !allowed {
            return Err(ValidationError::UnsupportedMimeType {
                file: file.name.clone(),
                mime_type: file.mime_type.clone(),
            });
        }
        if file.size() > self.max_file_bytes {
            return Err(ValidationError::FileTooLarge {
                file: file.name.clone(),
                size: file.size(),
                max: self.max_file_bytes,
            });
        }
        Ok(())
    }

    /// Split `incoming` into the prefix that fits the remaining capacity and
    /// the number of files dropped.
    pub fn fit_capacity<T>(&self, occupied: usize, mut incoming: Vec<T>) -> (Vec<T>, usize) {
        let remaining = self.capacity().saturating_sub(occupied);
        let dropped = incoming.len().saturating_sub(remaining);
        incoming.truncate(remaining);
        (incoming, dropped)
    }
}

/// Resolve the MIME type for an upload from a declared type and the file name.
pub fn infer_mime_type(declared_type: Option<&str>, file_name: &str) -> String {
    if let Some(declared) = declared_type {
        let trimmed = declared.trim().to_ascii_lowercase();
        if !trimmed.is_empty() && trimmed != "application/octet-stream" {
            return trimmed;
        }
    }

    mime_guess::from_path(file_name)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jpeg(name: &str, size: usize) -> FileSelection {
        FileSelection::new(name, Some("image/jpeg"), vec![0u8; size])
    }

    #[test]
    fn infers_type_from_extension() {
        assert_eq!(infer_mime_type(None, "photo.PNG"), "image/png");
        assert_eq!(
            infer_mime_type(Some("application/octet-stream"), "photo.webp"),
            "image/webp"
        );
        assert_eq!(infer_mime_type(Some(" Image/JPEG "), "x.bin"), "image/jpeg");
        assert_eq!(infer_mime_type(None, "notes"), "application/octet-stream");
    }

    #[test]
    fn rejects_disallowed_types_and_sizes() {
        let policy = UploadPolicy::default();
        assert!(policy.validate_file(&jpeg("ok.jpg", 2 * 1024 * 1024)).is_ok());

        let pdf = FileSelection::new("doc.pdf", None, vec![1u8; 10]);
        assert!(matches!(
            policy.validate_file(&pdf),
            Err(ValidationError::UnsupportedMimeType { .. })
        ));

        let huge = jpeg("huge.jpg", usize::try_from(DEFAULT_MAX_UPLOAD_BYTES).unwrap() + 1);
        assert!(matches!(
            policy.validate_file(&huge),
            Err(ValidationError::FileTooLarge { .. })
        ));

        assert!(matches!(
            policy.validate_file(&jpeg("empty.jpg", 0)),
            Err(ValidationError::EmptyFile { .. })
        ));
    }

    #[test]
    fn fit_capacity_keeps_submission_prefix() {
        let policy = UploadPolicy {
            max_images: 5,
            ..UploadPolicy::default()
        };
        let (accepted, dropped) = policy.fit_capacity(3, vec!["a", "b", "c", "d"]);
        assert_eq!(accepted, vec!["a", "b"]);
        assert_eq!(dropped, 2);

        let (accepted, dropped) = policy.fit_capacity(5, vec!["a"]);
        assert!(accepted.is_empty());
        assert_eq!(dropped, 1);
    }

    #[test]
    fn single_mode_caps_at_one() {
        let policy = UploadPolicy::single();
        assert_eq!(policy.capacity(), 1);
        let (accepted, dropped) = policy.fit_capacity(0, vec![1, 2]);
        assert_eq!(accepted, vec![1]);
        assert_eq!(dropped, 1);
        let (accepted, dropped) = policy.fit_capacity(1, vec![1]);
        assert!(accepted.is_empty());
        assert_eq!(dropped, 1);
    }
}
