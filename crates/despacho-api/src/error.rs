use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use despacho_core::{DespachoError, SecurityError};
use serde_json::json;
use thiserror::Error;
use tracing::error;

const GENERIC_SERVER_ERROR: &str = "Error en el servidor";

#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Despacho(#[from] DespachoError),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Forbidden(String),

    #[error(transparent)]
    Auth(#[from] SecurityError),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Despacho(err) => match err {
                DespachoError::BadRequest { .. } => StatusCode::BAD_REQUEST,
                DespachoError::NotFound(_) => StatusCode::NOT_FOUND,
                DespachoError::Conflict(_) => StatusCode::CONFLICT,
                DespachoError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
                DespachoError::Forbidden(_) => StatusCode::FORBIDDEN,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::Auth(err) => match err {
                SecurityError::MissingToken | SecurityError::ExpiredToken => {
                    StatusCode::UNAUTHORIZED
                }
                SecurityError::InvalidToken => StatusCode::FORBIDDEN,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        if status.is_server_error() {
            error!(error = %self, "Request failed");
            let body = Json(json!({ "mensaje": GENERIC_SERVER_ERROR }));
            return (status, body).into_response();
        }

        let body = match self {
            ApiError::Despacho(DespachoError::BadRequest {
                mensaje,
                sugerencias,
            }) if !sugerencias.is_empty() => json!({
                "mensaje": mensaje,
                "sugerencias": sugerencias,
            }),
            other => json!({ "mensaje": other.to_string() }),
        };

        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        let cases = [
            (ApiError::from(DespachoError::bad_request("x")), StatusCode::BAD_REQUEST),
            (
                ApiError::from(DespachoError::NotFound("x".into())),
                StatusCode::NOT_FOUND,
            ),
            (
                ApiError::from(DespachoError::Conflict("x".into())),
                StatusCode::CONFLICT,
            ),
            (
                ApiError::from(DespachoError::Internal("x".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (ApiError::BadRequest("x".into()), StatusCode::BAD_REQUEST),
            (ApiError::from(SecurityError::MissingToken), StatusCode::UNAUTHORIZED),
            (ApiError::from(SecurityError::ExpiredToken), StatusCode::UNAUTHORIZED),
            (ApiError::from(SecurityError::InvalidToken), StatusCode::FORBIDDEN),
        ];
        for (err, expected) in cases {
            assert_eq!(err.status(), expected);
        }
    }

    #[test]
    fn internal_details_are_not_exposed() {
        let response =
            ApiError::from(DespachoError::Internal("relation \"x\" does not exist".into()))
                .into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
