//! Form state owned outside the field controllers.

use std::{
    collections::HashMap,
    path::Path,
    sync::{Arc, Mutex, PoisonError},
};

/// A file chosen by the user but not yet uploaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileBlob {
    pub name: String,
    pub mime_type: Option<String>,
    pub data: Arc<[u8]>,
}

impl FileBlob {
    pub fn new(name: impl Into<String>, mime_type: Option<String>, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime_type,
            data: data.into(),
        }
    }

    pub fn from_path(path: &Path) -> std::io::Result<Self> {
        let data = std::fs::read(path)?;
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let mime_type = mime_guess::from_path(path).first_raw().map(str::to_string);
        Ok(Self::new(name, mime_type, data))
    }

    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }
}

/// Value of a file-valued field.
///
/// `Null` means the user explicitly removed the stored file; `Absent` means
/// the field was left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum FieldValue {
    #[default]
    Absent,
    Null,
    File(FileBlob),
}

impl FieldValue {
    pub fn as_file(&self) -> Option<&FileBlob> {
        match self {
            FieldValue::File(blob) => Some(blob),
            _ => None,
        }
    }
}

pub trait FormStateStore: Send + Sync {
    fn value(&self, field: &str) -> FieldValue;
    fn set_value(&self, field: &str, value: FieldValue);
    fn error(&self, field: &str) -> Option<String>;
    fn set_error(&self, field: &str, message: &str);
    fn clear_error(&self, field: &str);
}

#[derive(Debug, Default)]
struct FormInner {
    values: HashMap<String, FieldValue>,
    errors: HashMap<String, String>,
}

#[derive(Debug, Default)]
pub struct FormState {
    inner: Mutex<FormInner>,
}

impl FormState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.values.clear();
        inner.errors.clear();
    }
}

impl FormStateStore for FormState {
    fn value(&self, field: &str) -> FieldValue {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values
            .get(field)
            .cloned()
            .unwrap_or_default()
    }

    fn set_value(&self, field: &str, value: FieldValue) {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values
            .insert(field.to_string(), value);
    }

    fn error(&self, field: &str) -> Option<String> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .errors
            .get(field)
            .cloned()
    }

    fn set_error(&self, field: &str, message: &str) {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .errors
            .insert(field.to_string(), message.to_string());
    }

    fn clear_error(&self, field: &str) {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .errors
            .remove(field);
    }
}
