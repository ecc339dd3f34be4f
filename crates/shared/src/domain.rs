use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Backend record ids are short lowercase alphanumeric strings.
pub const RECORD_ID_MAX_LEN: usize = 15;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordIdError {
    #[error("record id must not be empty")]
    Empty,
    #[error("record id exceeds {max} characters")]
    TooLong { max: usize },
    #[error("record id contains invalid character {0:?}")]
    InvalidChar(char),
}

pub fn validate_record_id(raw: &str) -> Result<(), RecordIdError> {
    if raw.is_empty() {
        return Err(RecordIdError::Empty);
    }
    if raw.chars().count() > RECORD_ID_MAX_LEN {
        return Err(RecordIdError::TooLong {
            max: RECORD_ID_MAX_LEN,
        });
    }
    if let Some(bad) = raw
        .chars()
        .find(|c| !(c.is_ascii_lowercase() || c.is_ascii_digit()))
    {
        return Err(RecordIdError::InvalidChar(bad));
    }
    Ok(())
}

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn parse(raw: &str) -> Result<Self, RecordIdError> {
                validate_record_id(raw)?;
                Ok(Self(raw.to_string()))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

id_newtype!(UserId);
id_newtype!(TaskId);
id_newtype!(SettingsId);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Theme {
    Light,
    Dark,
    #[default]
    #[serde(other)]
    System,
}

impl Theme {
    pub fn as_str(self) -> &'static str {
        match self {
            Theme::Light => "light",
            Theme::Dark => "dark",
            Theme::System => "system",
        }
    }
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A day on which a task was marked done.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskHistoryDate(pub NaiveDate);

#[cfg(test)]
#[path = "tests/domain_tests.rs"]
mod tests;
