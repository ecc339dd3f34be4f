//! Persists the signed-in session between invocations.

use std::{fs, io::ErrorKind, path::Path};

use anyhow::Context;
use client_core::{AuthSnapshot, AuthStore};
use tracing::debug;

pub fn load_auth(path: &Path) -> anyhow::Result<AuthStore> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(error) if error.kind() == ErrorKind::NotFound => {
            debug!(path = %path.display(), "no stored session");
            return Ok(AuthStore::new());
        }
        Err(error) => {
            return Err(error)
                .with_context(|| format!("failed to read session file '{}'", path.display()))
        }
    };
    let snapshot: AuthSnapshot = serde_json::from_str(&raw)
        .with_context(|| format!("corrupt session file '{}'", path.display()))?;
    Ok(AuthStore::restore(snapshot))
}

pub fn save_auth(path: &Path, auth: &AuthStore) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| {
            format!("failed to create session directory '{}'", parent.display())
        })?;
    }
    let raw = serde_json::to_string_pretty(&auth.snapshot())?;
    fs::write(path, raw)
        .with_context(|| format!("failed to write session file '{}'", path.display()))
}

pub fn remove_auth(path: &Path) -> anyhow::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(error) if error.kind() == ErrorKind::NotFound => Ok(()),
        Err(error) => Err(error)
            .with_context(|| format!("failed to remove session file '{}'", path.display())),
    }
}

#[cfg(test)]
#[path = "tests/auth_file_tests.rs"]
mod tests;
