use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

/// The uniform response envelope: `{success, data?, message?}`.
#[derive(Serialize, Debug)]
pub struct Envelope<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T: Serialize> Envelope<T> {
    pub fn data(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            message: None,
        })
    }

    pub fn with_message(data: T, message: impl Into<String>) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            message: Some(message.into()),
        })
    }
}

impl Envelope<()> {
    pub fn message(message: impl Into<String>) -> Json<Self> {
        Json(Self {
            success: true,
            data: None,
            message: Some(message.into()),
        })
    }
}

/// Error detail attached to 5xx responses so the logging layer can persist it.
#[derive(Clone, Debug)]
pub struct ErrorDetail(pub String);

/// `axum`-compatible error taxonomy. Each variant maps to one HTTP status;
/// handlers construct the variant that matches the failure and the envelope
/// is produced here.
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed or missing input.
    #[error("{0}")]
    Validation(String),
    /// Uniqueness violation (email, case number, badge number).
    #[error("{0}")]
    Conflict(String),
    /// Unknown identity or bad credentials.
    #[error("{0}")]
    Auth(String),
    /// Known identity, operation not permitted (inactive account, role).
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    /// Verification/reset code mismatch.
    #[error("{0}")]
    InvalidCode(String),
    /// Code matched but its expiry has passed.
    #[error("{0}")]
    ExpiredCode(String),
    /// A collaborator call failed where the call was the entire purpose.
    #[error("{0}")]
    External(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Auth(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    const fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_)
            | Self::Conflict(_)
            | Self::InvalidCode(_)
            | Self::ExpiredCode(_) => StatusCode::BAD_REQUEST,
            Self::Auth(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::External(_) => StatusCode::BAD_GATEWAY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        Self::Internal(anyhow::Error::new(err))
    }
}

/// True when a sqlx error is a SQLite UNIQUE-constraint violation. The
/// constraint is the actual uniqueness guarantee; callers translate this
/// into a `Conflict` instead of pre-checking.
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => db.is_unique_violation(),
        _ => false,
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status();

        let message = match &self {
            Self::Internal(err) => {
                error!("{err:?}");
                // N.B: The error chain is for the server log. Forward it to
                // the requester only in debug builds.
                if cfg!(debug_assertions) {
                    format!("{err:?}")
                } else {
                    "Internal server error".to_owned()
                }
            }
            other => other.to_string(),
        };

        let mut response = (
            status,
            Json(Envelope::<()> {
                success: false,
                data: None,
                message: Some(message.clone()),
            }),
        )
            .into_response();

        if status.is_server_error() {
            response.extensions_mut().insert(ErrorDetail(message));
        }

        response
    }
}
