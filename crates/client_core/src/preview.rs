//! Revocable local preview handles for files that are not uploaded yet.

use std::{
    collections::HashSet,
    fmt,
    sync::{Mutex, PoisonError},
};

use tracing::debug;
use uuid::Uuid;

use crate::form::FileBlob;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PreviewRef(String);

impl PreviewRef {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PreviewRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Process-wide allocator of preview handles. Every handle returned by
/// `create` must eventually be passed to `revoke`.
pub trait PreviewRegistry: Send + Sync {
    fn create(&self, blob: &FileBlob) -> PreviewRef;
    fn revoke(&self, preview: &PreviewRef);
}

/// Issues `blob:<origin>/<uuid>` handles and tracks the live ones.
#[derive(Debug)]
pub struct ObjectUrlRegistry {
    origin: String,
    live: Mutex<HashSet<PreviewRef>>,
}

impl ObjectUrlRegistry {
    pub fn new(origin: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            live: Mutex::new(HashSet::new()),
        }
    }

    pub fn live_count(&self) -> usize {
        self.live.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_live(&self, preview: &PreviewRef) -> bool {
        self.live
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(preview)
    }
}

impl Default for ObjectUrlRegistry {
    fn default() -> Self {
        Self::new("taskdesk")
    }
}

impl PreviewRegistry for ObjectUrlRegistry {
    fn create(&self, blob: &FileBlob) -> PreviewRef {
        let preview = PreviewRef(format!("blob:{}/{}", self.origin, Uuid::new_v4()));
        debug!(preview = %preview, file = %blob.name, size = blob.size(), "preview allocated");
        self.live
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(preview.clone());
        preview
    }

    fn revoke(&self, preview: &PreviewRef) {
        let removed = self
            .live
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(preview);
        if removed {
            debug!(preview = %preview, "preview released");
        }
    }
}
