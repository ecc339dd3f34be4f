use std::sync::Arc;

use reqwest::Method;
use shared::protocol::{
    AuthResponse, ConfirmPasswordResetRequest, CurrentUser, EmailRequest, PasswordAuthRequest,
    RegisterRequest, SettingsRecord, TokenRequest, UserRecord,
};
use tracing::info;

use crate::{
    error::ClientError,
    transport::{filter_literal, BackendClient},
};

pub const USERS_COLLECTION: &str = "users";
pub const SETTINGS_COLLECTION: &str = "settings";

#[derive(Clone)]
pub struct AuthApi {
    client: Arc<BackendClient>,
}

impl AuthApi {
    pub fn new(client: Arc<BackendClient>) -> Self {
        Self { client }
    }

    pub async fn login_with_password(
        &self,
        identity: &str,
        password: &str,
    ) -> Result<UserRecord, ClientError> {
        let url = self
            .client
            .collection_url(USERS_COLLECTION, "auth-with-password")?;
        let response: AuthResponse = self
            .client
            .send_json(self.client.request(Method::POST, url).json(&PasswordAuthRequest {
                identity: identity.to_string(),
                password: password.to_string(),
            }))
            .await?;
        info!(user_id = %response.record.id, verified = response.record.verified, "signed in");
        self.client
            .auth()
            .save(response.token, response.record.clone());
        Ok(response.record)
    }

    /// Creates the account and asks the backend to send the verification mail.
    pub async fn register(&self, request: &RegisterRequest) -> Result<UserRecord, ClientError> {
        if request.password != request.password_confirm {
            return Err(shared::error::ValidationError::new(
                "passwordConfirm",
                "passwords do not match",
            )
            .into());
        }
        let url = self.client.collection_url(USERS_COLLECTION, "records")?;
        let user: UserRecord = self
            .client
            .send_json(self.client.request(Method::POST, url).json(request))
            .await?;
        self.request_verification(&request.email).await?;
        Ok(user)
    }

    pub async fn request_verification(&self, email: &str) -> Result<(), ClientError> {
        let url = self
            .client
            .collection_url(USERS_COLLECTION, "request-verification")?;
        self.client
            .send_empty(self.client.request(Method::POST, url).json(&EmailRequest {
                email: email.to_string(),
            }))
            .await
    }

    pub async fn confirm_verification(&self, token: &str) -> Result<(), ClientError> {
        let url = self
            .client
            .collection_url(USERS_COLLECTION, "confirm-verification")?;
        self.client
            .send_empty(self.client.request(Method::POST, url).json(&TokenRequest {
                token: token.to_string(),
            }))
            .await
    }

    pub async fn request_password_reset(&self, email: &str) -> Result<(), ClientError> {
        let url = self
            .client
            .collection_url(USERS_COLLECTION, "request-password-reset")?;
        self.client
            .send_empty(self.client.request(Method::POST, url).json(&EmailRequest {
                email: email.to_string(),
            }))
            .await
    }

    pub async fn confirm_password_reset(
        &self,
        request: &ConfirmPasswordResetRequest,
    ) -> Result<(), ClientError> {
        let url = self
            .client
            .collection_url(USERS_COLLECTION, "confirm-password-reset")?;
        self.client
            .send_empty(self.client.request(Method::POST, url).json(request))
            .await
    }

    /// Exchanges the stored token for a fresh one and updates the user model.
    pub async fn refresh_auth(&self) -> Result<UserRecord, ClientError> {
        if self.client.auth().token().is_none() {
            return Err(ClientError::NotAuthenticated);
        }
        let url = self
            .client
            .collection_url(USERS_COLLECTION, "auth-refresh")?;
        let response: AuthResponse = self
            .client
            .send_json(self.client.request(Method::POST, url))
            .await?;
        self.client
            .auth()
            .save(response.token, response.record.clone());
        Ok(response.record)
    }

    pub fn logout(&self) {
        self.client.auth().clear();
        info!("signed out");
    }

    /// The signed-in user with their settings record, if one exists.
    pub async fn current_user(&self) -> Result<CurrentUser, ClientError> {
        let user_id = self
            .client
            .auth()
            .model()
            .map(|model| model.id)
            .ok_or(ClientError::NotAuthenticated)?;
        let url = self
            .client
            .collection_url(USERS_COLLECTION, &format!("records/{user_id}"))?;
        let user: UserRecord = self
            .client
            .send_json(self.client.request(Method::GET, url))
            .await?;
        self.client.auth().update_model(user.clone());

        let filter = format!("user={}", filter_literal(user.id.as_str()));
        let settings = match self
            .client
            .first_list_item::<SettingsRecord>(SETTINGS_COLLECTION, &filter)
            .await
        {
            Ok(settings) => Some(settings),
            Err(error) if error.is_not_found() => None,
            Err(error) => return Err(error),
        };
        Ok(CurrentUser { user, settings })
    }
}
