use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{bail, Context};
use serde::Deserialize;
use url::Url;

pub const CONFIG_FILE: &str = "taskdesk.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub server_url: String,
    pub log_filter: String,
    pub request_timeout_secs: u64,
    pub redirect_limit: usize,
    pub auth_file: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:8090".into(),
            log_filter: "info".into(),
            request_timeout_secs: 30,
            redirect_limit: 8,
            auth_file: PathBuf::from(".taskdesk/auth.json"),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct FileSettings {
    server_url: Option<String>,
    log_filter: Option<String>,
    request_timeout_secs: Option<u64>,
    redirect_limit: Option<usize>,
    auth_file: Option<PathBuf>,
}

pub fn load_settings() -> Settings {
    load_settings_from(Path::new(CONFIG_FILE), |key| std::env::var(key).ok())
}

/// Defaults, then the config file (if readable), then environment overrides.
pub fn load_settings_from(path: &Path, env: impl Fn(&str) -> Option<String>) -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string(path) {
        match toml::from_str::<FileSettings>(&raw) {
            Ok(file_cfg) => {
                if let Some(v) = file_cfg.server_url {
                    settings.server_url = v;
                }
                if let Some(v) = file_cfg.log_filter {
                    settings.log_filter = v;
                }
                if let Some(v) = file_cfg.request_timeout_secs {
                    settings.request_timeout_secs = v;
                }
                if let Some(v) = file_cfg.redirect_limit {
                    settings.redirect_limit = v;
                }
                if let Some(v) = file_cfg.auth_file {
                    settings.auth_file = v;
                }
            }
            Err(error) => eprintln!("ignoring {}: {error}", path.display()),
        }
    }

    if let Some(v) = env("TASKDESK_SERVER_URL") {
        settings.server_url = v;
    }
    if let Some(v) = env("APP__SERVER_URL") {
        settings.server_url = v;
    }

    if let Some(v) = env("APP__LOG_FILTER") {
        settings.log_filter = v;
    }

    if let Some(v) = env("APP__REQUEST_TIMEOUT_SECS") {
        if let Ok(parsed) = v.parse::<u64>() {
            settings.request_timeout_secs = parsed;
        }
    }

    if let Some(v) = env("APP__REDIRECT_LIMIT") {
        if let Ok(parsed) = v.parse::<usize>() {
            settings.redirect_limit = parsed;
        }
    }

    if let Some(v) = env("APP__AUTH_FILE") {
        settings.auth_file = PathBuf::from(v);
    }

    settings
}

/// Trims the server URL, drops trailing slashes and defaults the scheme to
/// `http://`.
pub fn normalize_server_url(raw: &str) -> anyhow::Result<String> {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        bail!("server url is empty");
    }
    let with_scheme = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("http://{trimmed}")
    };
    let parsed =
        Url::parse(&with_scheme).with_context(|| format!("invalid server url '{raw}'"))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        bail!("unsupported server url scheme '{}'", parsed.scheme());
    }
    Ok(with_scheme)
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
