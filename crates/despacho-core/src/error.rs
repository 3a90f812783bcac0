use thiserror::Error;

use crate::security::SecurityError;

#[derive(Error, Debug)]
pub enum DespachoError {
    #[error("{mensaje}")]
    BadRequest {
        mensaje: String,
        sugerencias: Vec<String>,
    },

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("Database error: {0}")]
    Database(sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Security error: {0}")]
    Security(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl DespachoError {
    pub fn bad_request(mensaje: impl Into<String>) -> Self {
        Self::BadRequest {
            mensaje: mensaje.into(),
            sugerencias: Vec::new(),
        }
    }
}

// Unique-index violations surface as conflicts so a lost race on
// (usuario_id, base_id) or on an email reads the same as the explicit check.
impl From<sqlx::Error> for DespachoError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                Self::Conflict("El registro ya existe".to_string())
            }
            _ => Self::Database(err),
        }
    }
}

impl From<SecurityError> for DespachoError {
    fn from(err: SecurityError) -> Self {
        match err {
            SecurityError::MissingToken | SecurityError::ExpiredToken => {
                Self::Unauthorized(err.to_string())
            }
            SecurityError::InvalidToken => Self::Forbidden(err.to_string()),
            other => Self::Security(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, DespachoError>;
