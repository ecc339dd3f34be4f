//! Session oracle: answers the three auth questions the router guards ask.

use std::sync::{PoisonError, RwLock};

use chrono::Utc;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use shared::{domain::Theme, protocol::UserRecord};

use crate::{
    cache::{QueryCache, Resource, ResourceKey},
    error::ClientError,
};

#[derive(Debug, Deserialize)]
struct TokenClaims {
    exp: i64,
}

/// Reads the `exp` claim of a backend auth token. The signature is not verified.
pub fn token_expiry(token: &str) -> Result<i64, ClientError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.required_spec_claims.clear();

    decode::<TokenClaims>(token, &DecodingKey::from_secret(&[]), &validation)
        .map(|data| data.claims.exp)
        .map_err(|e| ClientError::InvalidToken(e.to_string()))
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthSnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<UserRecord>,
}

/// Token and user model of the signed-in account.
#[derive(Debug, Default)]
pub struct AuthStore {
    inner: RwLock<AuthSnapshot>,
}

impl AuthStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn restore(snapshot: AuthSnapshot) -> Self {
        Self {
            inner: RwLock::new(snapshot),
        }
    }

    pub fn snapshot(&self) -> AuthSnapshot {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn save(&self, token: String, model: UserRecord) {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        inner.token = Some(token);
        inner.model = Some(model);
    }

    pub fn update_model(&self, model: UserRecord) {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .model = Some(model);
    }

    pub fn clear(&self) {
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = AuthSnapshot::default();
    }

    pub fn token(&self) -> Option<String> {
        self.snapshot().token
    }

    pub fn model(&self) -> Option<UserRecord> {
        self.snapshot().model
    }

    pub fn is_valid(&self) -> bool {
        let Some(token) = self.token() else {
            return false;
        };
        match token_expiry(&token) {
            Ok(exp) => exp > Utc::now().timestamp(),
            Err(error) => {
                tracing::debug!(%error, "stored auth token is unreadable");
                false
            }
        }
    }
}

/// Point-in-time answers of a [`SessionOracle`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionState {
    pub authenticated: bool,
    pub logged_in: bool,
    pub email_verified: bool,
    pub theme: Option<Theme>,
}

impl SessionState {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn unverified() -> Self {
        Self {
            logged_in: true,
            ..Self::default()
        }
    }

    pub fn verified() -> Self {
        Self {
            authenticated: true,
            logged_in: true,
            email_verified: true,
            theme: None,
        }
    }

    pub fn with_theme(mut self, theme: Theme) -> Self {
        self.theme = Some(theme);
        self
    }
}

pub trait SessionOracle: Send + Sync {
    fn is_authenticated(&self) -> bool;
    fn is_logged_in(&self) -> bool;
    fn is_email_verified(&self) -> bool;

    fn theme(&self) -> Option<Theme> {
        None
    }

    fn snapshot(&self) -> SessionState {
        SessionState {
            authenticated: self.is_authenticated(),
            logged_in: self.is_logged_in(),
            email_verified: self.is_email_verified(),
            theme: self.theme(),
        }
    }
}

impl SessionOracle for SessionState {
    fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    fn is_logged_in(&self) -> bool {
        self.logged_in
    }

    fn is_email_verified(&self) -> bool {
        self.email_verified
    }

    fn theme(&self) -> Option<Theme> {
        self.theme
    }
}

/// Oracle backed by the auth store and the cached current-user resource.
#[derive(Clone)]
pub struct BackendSession {
    auth: std::sync::Arc<AuthStore>,
    cache: QueryCache,
}

impl BackendSession {
    pub fn new(auth: std::sync::Arc<AuthStore>, cache: QueryCache) -> Self {
        Self { auth, cache }
    }
}

impl SessionOracle for BackendSession {
    fn is_authenticated(&self) -> bool {
        self.is_logged_in() && self.is_email_verified()
    }

    fn is_logged_in(&self) -> bool {
        self.auth.is_valid()
    }

    fn is_email_verified(&self) -> bool {
        self.auth.model().is_some_and(|model| model.verified)
    }

    fn theme(&self) -> Option<Theme> {
        match self.cache.get(&ResourceKey::CurrentUser) {
            Some(Resource::CurrentUser(user)) => user.theme(),
            _ => None,
        }
    }
}

#[cfg(test)]
#[path = "tests/session_tests.rs"]
mod tests;
