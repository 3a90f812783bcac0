use axum::{
    extract::State,
    Extension, Json,
};
use despacho_core::AuthContext;
use serde_json::Value;
use uuid::Uuid;

use crate::auth::ensure_admin;
use crate::extract::ApiPath;
use crate::{mensaje, ApiResult, AppState};

/// Re-links the default catalog for an existing account.
pub async fn sembrar_usuario(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    ApiPath(usuario_id): ApiPath<Uuid>,
) -> ApiResult<Json<Value>> {
    ensure_admin(&state, &auth, "reseed_user")?;
    let report = state.seeder.seed_user_defaults(usuario_id).await?;
    Ok(mensaje("Contenido por defecto sembrado", report))
}

pub async fn purgar_avance(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<Value>> {
    ensure_admin(&state, &auth, "purge_reserved_label")?;
    let report = state.lifecycle.purge_reserved_label().await?;
    Ok(mensaje("Plantillas reservadas eliminadas", report))
}
