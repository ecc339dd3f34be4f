use std::sync::Arc;

use reqwest::{
    multipart::{Form, Part},
    Method,
};
use shared::{
    domain::UserId,
    protocol::{SettingsRecord, UpdateUserSettingsFields, UserRecord},
};
use tracing::{debug, info};

use super::auth::{AuthApi, SETTINGS_COLLECTION, USERS_COLLECTION};
use crate::{
    error::ClientError,
    form::FieldValue,
    transport::{filter_literal, BackendClient},
    upload::strip_simulated_path,
};

pub const AVATAR_FIELD: &str = "avatar";

#[derive(Clone)]
pub struct SettingsApi {
    client: Arc<BackendClient>,
}

impl SettingsApi {
    pub fn new(client: Arc<BackendClient>) -> Self {
        Self { client }
    }

    /// Settings of `user_id`, or of the signed-in user when `None`.
    pub async fn get_settings(
        &self,
        user_id: Option<&UserId>,
    ) -> Result<SettingsRecord, ClientError> {
        let user_id = match user_id {
            Some(user_id) => user_id.clone(),
            None => self
                .client
                .auth()
                .model()
                .map(|model| model.id)
                .ok_or(ClientError::NotAuthenticated)?,
        };
        let filter = format!("user={}", filter_literal(user_id.as_str()));
        self.client
            .first_list_item(SETTINGS_COLLECTION, &filter)
            .await
    }

    /// Saves the settings form: profile fields (and avatar) on the user
    /// record, then the reminder and theme fields on the settings record.
    ///
    /// A completed password change signs in again with the new password. A
    /// user without a settings record gets no settings update.
    pub async fn update_user_settings(
        &self,
        user_id: &UserId,
        fields: &UpdateUserSettingsFields,
        avatar: &FieldValue,
    ) -> Result<UserRecord, ClientError> {
        let url = self
            .client
            .collection_url(USERS_COLLECTION, &format!("records/{user_id}"))?;
        let request = self.client.request(Method::PATCH, url);
        let request = match avatar {
            FieldValue::Absent => request.json(&fields.user_update()),
            _ => request.multipart(user_form(fields, avatar)?),
        };
        let user: UserRecord = self.client.send_json(request).await?;

        if fields.is_changing_password() {
            if let Some(password) = fields.password.as_deref() {
                AuthApi::new(self.client.clone())
                    .login_with_password(&user.email, password)
                    .await?;
            }
        } else if self
            .client
            .auth()
            .model()
            .is_some_and(|model| model.id == user.id)
        {
            self.client.auth().update_model(user.clone());
        }

        let settings = match self.get_settings(Some(&user.id)).await {
            Ok(settings) => settings,
            Err(error) if error.is_not_found() => {
                debug!(user_id = %user.id, "no settings record; skipping settings update");
                return Ok(user);
            }
            Err(error) => return Err(error),
        };

        let url = self
            .client
            .collection_url(SETTINGS_COLLECTION, &format!("records/{}", settings.id))?;
        let _: SettingsRecord = self
            .client
            .send_json(
                self.client
                    .request(Method::PATCH, url)
                    .json(&fields.settings_update()),
            )
            .await?;
        info!(user_id = %user.id, "settings saved");
        Ok(user)
    }
}

fn user_form(fields: &UpdateUserSettingsFields, avatar: &FieldValue) -> Result<Form, ClientError> {
    let update = fields.user_update();
    let text_fields = [
        ("name", update.name),
        ("username", update.username),
        ("oldPassword", update.old_password),
        ("password", update.password),
        ("passwordConfirm", update.password_confirm),
    ];
    let mut form = text_fields
        .into_iter()
        .filter_map(|(key, value)| value.map(|value| (key, value.to_string())))
        .fold(Form::new(), |form, (key, value)| form.text(key, value));

    form = match avatar {
        FieldValue::File(blob) => {
            let mut part = Part::bytes(blob.data.to_vec())
                .file_name(strip_simulated_path(&blob.name).to_string());
            if let Some(mime) = &blob.mime_type {
                part = part.mime_str(mime)?;
            }
            form.part(AVATAR_FIELD, part)
        }
        FieldValue::Null => form.text(AVATAR_FIELD, ""),
        FieldValue::Absent => form,
    };
    Ok(form)
}
