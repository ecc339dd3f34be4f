use shared::error::{ApiError, ErrorCode, ValidationError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("{code:?}: {message}")]
    Api { code: ErrorCode, message: String },
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("invalid response payload: {0}")]
    Decode(String),
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),
    #[error("no authenticated user")]
    NotAuthenticated,
    #[error("invalid auth token: {0}")]
    InvalidToken(String),
    #[error("invalid server url: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl ClientError {
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            ClientError::Api { code, .. } => Some(*code),
            ClientError::Validation(_) => Some(ErrorCode::Validation),
            ClientError::NotAuthenticated | ClientError::InvalidToken(_) => {
                Some(ErrorCode::Unauthorized)
            }
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.code() == Some(ErrorCode::NotFound)
    }

    pub(crate) fn not_found(message: impl Into<String>) -> Self {
        ClientError::Api {
            code: ErrorCode::NotFound,
            message: message.into(),
        }
    }
}

impl From<ApiError> for ClientError {
    fn from(value: ApiError) -> Self {
        ClientError::Api {
            code: value.code,
            message: value.message,
        }
    }
}
