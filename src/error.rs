use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Please complete all fields.")]
    MissingFields,

    #[error("Username already exists.")]
    UsernameTaken,

    #[error("Account with this email already exists.")]
    EmailTaken,

    #[error("Incorrect Username or Password")]
    InvalidCredentials,

    #[error("Password should be at least {0} characters.")]
    WeakPassword(usize),

    #[error("Usernames may only use letters, digits, '.', '_' and '-' (at most {0} characters).")]
    InvalidUsername(usize),

    #[error("That doesn't look like an email address.")]
    InvalidEmail,

    #[error("Sign in first.")]
    NotSignedIn,

    #[error("No user named {0}")]
    UnknownUser(String),

    #[error("No conversation with {0} yet.")]
    NoConversation(String),

    #[error("You can't start a chat with yourself.")]
    SelfChat,

    #[error("Malformed payload")]
    MalformedPayload,

    #[error("Internal error: {0}")]
    Internal(anyhow::Error),
}

impl AppError {
    /// Rejections a form can show back to the user as a one-line message.
    pub fn is_form_error(&self) -> bool {
        !matches!(self, AppError::Internal(_) | AppError::NotSignedIn)
    }

    pub fn status(&self) -> StatusCode {
        use AppError::*;
        match self {
            MissingFields | WeakPassword(_) | InvalidUsername(_) | InvalidEmail | SelfChat
            | MalformedPayload => StatusCode::BAD_REQUEST,
            UsernameTaken | EmailTaken => StatusCode::CONFLICT,
            InvalidCredentials | NotSignedIn => StatusCode::UNAUTHORIZED,
            UnknownUser(_) | NoConversation(_) => StatusCode::NOT_FOUND,
            Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if let AppError::Internal(err) = &self {
            error!("{err:#}");
            return (status, "Something went wrong.").into_response();
        }

        (status, self.to_string()).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err)
    }
}

macro_rules! apperr_impl {
    ($E:ty) => {
        impl From<$E> for AppError {
            fn from(err: $E) -> Self {
                Self::Internal(anyhow::Error::from(err))
            }
        }
    };
}

apperr_impl!(serde_json::Error);
apperr_impl!(sqlx::Error);
apperr_impl!(tower_sessions::session::Error);
apperr_impl!(axum::Error);

#[cfg(test)]
mod tests {
    use axum::{http::StatusCode, response::IntoResponse};

    use super::AppError;

    #[test]
    fn rejections_keep_their_message() {
        let response = AppError::UsernameTaken.into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert_eq!(AppError::UsernameTaken.to_string(), "Username already exists.");
    }

    #[test]
    fn internal_errors_are_not_form_errors() {
        let err = AppError::from(sqlx::Error::RowNotFound);
        assert!(!err.is_form_error());
        assert_eq!(err.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(AppError::EmailTaken.is_form_error());
    }
}
