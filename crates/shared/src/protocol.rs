use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
    domain::{SettingsId, TaskHistoryDate, TaskId, Theme, UserId},
    error::ValidationError,
};

pub const TASK_TITLE_MAX_CHARS: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default)]
    pub history: Vec<TaskHistoryDate>,
}

impl Task {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: String::new(),
            color: None,
            history: Vec::new(),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        let title = self.title.trim();
        if title.is_empty() {
            return Err(ValidationError::new("title", "title is required"));
        }
        if title.chars().count() > TASK_TITLE_MAX_CHARS {
            return Err(ValidationError::new(
                "title",
                format!("title must be at most {TASK_TITLE_MAX_CHARS} characters"),
            ));
        }
        if let Some(color) = &self.color {
            let hex = color.strip_prefix('#').unwrap_or_default();
            if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
                return Err(ValidationError::new("color", "color must be #rrggbb"));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: TaskId,
    pub user: UserId,
    #[serde(default)]
    pub created: String,
    #[serde(default)]
    pub updated: String,
    #[serde(flatten)]
    pub task: Task,
}

impl TaskRecord {
    pub fn validate(&self) -> Result<(), ValidationError> {
        crate::domain::validate_record_id(self.id.as_str())
            .map_err(|e| ValidationError::new("id", e.to_string()))?;
        self.task.validate()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateTaskRequest<'a> {
    #[serde(flatten)]
    pub task: &'a Task,
    pub user: &'a UserId,
}

#[derive(Debug, Clone, Serialize)]
pub struct UpdateTaskHistoryRequest<'a> {
    pub history: &'a [TaskHistoryDate],
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: UserId,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub avatar: String,
    #[serde(default)]
    pub verified: bool,
}

impl UserRecord {
    pub fn avatar(&self) -> Option<&str> {
        Some(self.avatar.as_str()).filter(|name| !name.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsRecord {
    pub id: SettingsId,
    pub user: UserId,
    #[serde(default)]
    pub remind_email: String,
    #[serde(default)]
    pub remind_by_email_enabled: bool,
    #[serde(default)]
    pub theme: Theme,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentUser {
    pub user: UserRecord,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<SettingsRecord>,
}

impl CurrentUser {
    pub fn theme(&self) -> Option<Theme> {
        self.settings.as_ref().map(|settings| settings.theme)
    }
}

/// Settings form payload: user profile fields plus the settings record fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateUserSettingsFields {
    pub name: Option<String>,
    pub username: Option<String>,
    pub old_password: Option<String>,
    pub password: Option<String>,
    pub password_confirm: Option<String>,
    pub remind_email: String,
    pub remind_by_email_enabled: bool,
    pub theme: Theme,
}

impl UpdateUserSettingsFields {
    pub fn is_changing_password(&self) -> bool {
        [&self.old_password, &self.password, &self.password_confirm]
            .iter()
            .all(|value| value.as_deref().is_some_and(|v| !v.is_empty()))
    }

    pub fn user_update(&self) -> UserUpdateRequest<'_> {
        UserUpdateRequest {
            name: self.name.as_deref(),
            username: self.username.as_deref(),
            old_password: self.old_password.as_deref(),
            password: self.password.as_deref(),
            password_confirm: self.password_confirm.as_deref(),
        }
    }

    pub fn settings_update(&self) -> SettingsUpdateRequest<'_> {
        SettingsUpdateRequest {
            remind_email: &self.remind_email,
            remind_by_email_enabled: self.remind_by_email_enabled,
            theme: self.theme,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserUpdateRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_password: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password_confirm: Option<&'a str>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsUpdateRequest<'a> {
    pub remind_email: &'a str,
    pub remind_by_email_enabled: bool,
    pub theme: Theme,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PasswordAuthRequest {
    pub identity: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthResponse {
    pub token: String,
    pub record: UserRecord,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub password_confirm: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailRequest {
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenRequest {
    pub token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmPasswordResetRequest {
    pub token: String,
    pub password: String,
    pub password_confirm: String,
}

/// Page envelope of list endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListResult<T> {
    pub page: u32,
    pub per_page: u32,
    pub total_items: i64,
    pub total_pages: u32,
    pub items: Vec<T>,
}

pub type SearchParams = BTreeMap<String, String>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyEmailParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl VerifyEmailParams {
    pub fn from_search(search: &SearchParams) -> Result<Self, ValidationError> {
        let email = search
            .get("email")
            .map(|raw| raw.trim().to_string())
            .filter(|raw| !raw.is_empty());
        if let Some(email) = &email {
            if !email.contains('@') {
                return Err(ValidationError::new("email", "invalid email address"));
            }
        }
        Ok(Self { email })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResetPasswordParams {
    pub token: String,
}

impl ResetPasswordParams {
    pub fn from_search(search: &SearchParams) -> Result<Self, ValidationError> {
        let token = search
            .get("token")
            .map(|raw| raw.trim())
            .filter(|raw| !raw.is_empty())
            .ok_or_else(|| ValidationError::new("token", "reset token is required"))?;
        Ok(Self {
            token: token.to_string(),
        })
    }
}

#[cfg(test)]
#[path = "tests/protocol_tests.rs"]
mod tests;
