use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use despacho_core::{AuthContext, CatalogKind, SecurityError, SecurityEvent, SecurityLogger};
use uuid::Uuid;

use crate::{ApiError, ApiResult, AppState};

/// Verifies the bearer token and stores the caller's [`AuthContext`] in the
/// request extensions.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or(SecurityError::MissingToken)?;

    let auth_context = state.jwt.validate_token(token)?;
    req.extensions_mut().insert(auth_context);

    Ok(next.run(req).await)
}

fn deny(auth: &AuthContext, resource: String) -> ApiError {
    SecurityLogger::log_event(SecurityEvent::PermissionDenied {
        user_id: auth.user_id,
        resource,
    });
    ApiError::Forbidden("No tiene permiso para esta operación".to_string())
}

/// Callers act on their own data unless they are administrators.
pub fn ensure_self(state: &AppState, auth: &AuthContext, usuario_id: Uuid) -> ApiResult<()> {
    if auth.user_id == usuario_id || state.is_admin(auth) {
        return Ok(());
    }
    Err(deny(auth, format!("usuario:{usuario_id}")))
}

pub fn ensure_admin(state: &AppState, auth: &AuthContext, action: &str) -> ApiResult<()> {
    if state.is_admin(auth) {
        SecurityLogger::log_event(SecurityEvent::AdminAccess {
            user_id: auth.user_id,
            action: action.to_string(),
            resource: "catalog".to_string(),
        });
        return Ok(());
    }
    Err(deny(auth, format!("admin:{action}")))
}

/// A relation may only be removed by its owner. Unknown ids fall through so
/// the delete itself reports them as not found.
pub async fn ensure_relation_owner(
    state: &AppState,
    auth: &AuthContext,
    kind: CatalogKind,
    relation_id: Uuid,
) -> ApiResult<()> {
    if state.is_admin(auth) {
        return Ok(());
    }
    match state.lifecycle.relation_owner(kind, relation_id).await? {
        Some(owner) if owner != auth.user_id => {
            Err(deny(auth, format!("{}:{relation_id}", kind.relation_noun())))
        }
        _ => Ok(()),
    }
}

/// Editing a shared base row requires holding a relation to it.
pub async fn ensure_holds_base(
    state: &AppState,
    auth: &AuthContext,
    kind: CatalogKind,
    base_id: Uuid,
) -> ApiResult<()> {
    if state.is_admin(auth)
        || state
            .lifecycle
            .holds_base(kind, auth.user_id, base_id)
            .await?
    {
        return Ok(());
    }
    Err(deny(auth, format!("{}_base:{base_id}", kind.noun())))
}
