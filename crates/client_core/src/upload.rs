//! Controller for a single image-valued form field.
//!
//! The enclosing form owns the committed value and the error channel; the
//! controller keeps only what the field needs to render itself: the picked
//! file and its local preview handle.

use std::sync::Arc;

use shared::domain::UserId;
use thiserror::Error;
use tracing::debug;

use crate::{
    form::{FieldValue, FileBlob, FormStateStore},
    preview::{PreviewRef, PreviewRegistry},
};

/// 5 MiB, checked client-side only.
pub const MAX_UPLOAD_BYTES: u64 = 5_242_880;
pub const ACCEPTED_IMAGE_TYPES: [&str; 4] = ["image/jpeg", "image/png", "image/gif", "image/webp"];
pub const THUMBNAIL_SIZE: &str = "100x100";

/// Browsers report picked files through this fake directory.
const SIMULATED_PATH_PREFIX: &str = "C:\\fakepath\\";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UploadError {
    #[error("File too large (5MB max)")]
    TooLarge { size: u64 },
    #[error("Unsupported file type (jpeg, png, gif or webp only)")]
    UnsupportedType { mime_type: Option<String> },
}

pub fn is_accepted_image(mime_type: Option<&str>) -> bool {
    mime_type.is_some_and(|mime_type| ACCEPTED_IMAGE_TYPES.contains(&mime_type))
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum PreviewToken {
    #[default]
    Unset,
    LocalPreview(PreviewRef),
    /// The user removed the stored asset.
    Deleted,
}

/// The file already stored on the backend for this field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteAsset {
    pub user_id: UserId,
    pub name: String,
}

pub fn thumbnail_url(origin: &str, asset: &RemoteAsset) -> String {
    format!(
        "{}/api/files/users/{}/{}?thumb={THUMBNAIL_SIZE}",
        origin.trim_end_matches('/'),
        asset.user_id,
        asset.name
    )
}

/// `avatar` -> `Avatar`; names shorter than two characters are kept as is.
pub fn default_label(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if name.chars().count() >= 2 => {
            let mut label: String = first.to_uppercase().collect();
            label.push_str(&chars.as_str().to_lowercase());
            label
        }
        _ => name.to_string(),
    }
}

pub fn strip_simulated_path(name: &str) -> &str {
    name.strip_prefix(SIMULATED_PATH_PREFIX).unwrap_or(name)
}

pub struct UploadFieldController {
    name: String,
    label: String,
    form: Arc<dyn FormStateStore>,
    previews: Arc<dyn PreviewRegistry>,
    origin: String,
    remote_asset: Option<RemoteAsset>,
    selected_file: Option<FileBlob>,
    preview: PreviewToken,
}

impl UploadFieldController {
    pub fn new(
        name: impl Into<String>,
        form: Arc<dyn FormStateStore>,
        previews: Arc<dyn PreviewRegistry>,
        origin: impl Into<String>,
    ) -> Self {
        let name = name.into();
        Self {
            label: default_label(&name),
            name,
            form,
            previews,
            origin: origin.into(),
            remote_asset: None,
            selected_file: None,
            preview: PreviewToken::Unset,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_remote_asset(mut self, asset: Option<RemoteAsset>) -> Self {
        self.remote_asset = asset;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn selected_file(&self) -> Option<&FileBlob> {
        self.selected_file.as_ref()
    }

    pub fn preview_token(&self) -> &PreviewToken {
        &self.preview
    }

    pub fn error(&self) -> Option<String> {
        self.form.error(&self.name)
    }

    /// Stages `blob` as the field value. A rejected file leaves the previous
    /// selection and preview untouched and reports through the form error.
    pub fn select_file(&mut self, blob: FileBlob) -> Result<(), UploadError> {
        if !is_accepted_image(blob.mime_type.as_deref()) {
            let error = UploadError::UnsupportedType {
                mime_type: blob.mime_type.clone(),
            };
            self.form.set_error(&self.name, &error.to_string());
            debug!(field = %self.name, mime_type = ?blob.mime_type, "rejected file type");
            return Err(error);
        }
        let size = blob.size();
        if size > MAX_UPLOAD_BYTES {
            let error = UploadError::TooLarge { size };
            self.form.set_error(&self.name, &error.to_string());
            debug!(field = %self.name, size, "rejected oversized file");
            return Err(error);
        }

        self.form.clear_error(&self.name);
        self.release_preview();
        self.preview = PreviewToken::LocalPreview(self.previews.create(&blob));
        self.selected_file = Some(blob.clone());
        self.form.set_value(&self.name, FieldValue::File(blob));
        Ok(())
    }

    pub fn clear_file(&mut self) {
        self.release_preview();
        self.selected_file = None;
        self.preview = PreviewToken::Deleted;
        self.form.set_value(&self.name, FieldValue::Null);
    }

    /// Whether the stored asset is shown and may be removed.
    pub fn can_delete(&self) -> bool {
        self.remote_asset.is_some() && self.preview != PreviewToken::Deleted
    }

    /// Text for the read-only input next to the picker.
    pub fn display_value(&self) -> String {
        if let FieldValue::File(committed) = self.form.value(&self.name) {
            let name = self
                .selected_file
                .as_ref()
                .map_or(committed.name.as_str(), |file| file.name.as_str());
            return strip_simulated_path(name).to_string();
        }
        match &self.remote_asset {
            Some(asset) if self.preview != PreviewToken::Deleted => asset.name.clone(),
            _ => String::new(),
        }
    }

    pub fn preview_image(&self) -> Option<String> {
        if let FieldValue::File(_) = self.form.value(&self.name) {
            return match &self.preview {
                PreviewToken::LocalPreview(preview) => Some(preview.as_str().to_string()),
                _ => None,
            };
        }
        match &self.remote_asset {
            Some(asset) if self.preview != PreviewToken::Deleted => {
                Some(thumbnail_url(&self.origin, asset))
            }
            _ => None,
        }
    }

    fn release_preview(&mut self) {
        if let PreviewToken::LocalPreview(preview) = &self.preview {
            self.previews.revoke(preview);
            self.preview = PreviewToken::Unset;
        }
    }
}

impl Drop for UploadFieldController {
    fn drop(&mut self) {
        self.release_preview();
    }
}

#[cfg(test)]
#[path = "tests/upload_tests.rs"]
mod tests;
