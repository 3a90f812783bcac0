use axum::{
    extract::State,
    http::StatusCode,
    Extension, Json,
};
use despacho_core::{
    ApplicativeFields, AuthContext, BaseFields, BaseRow, CatalogKind, RelationView,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use crate::auth::{ensure_admin, ensure_holds_base, ensure_relation_owner, ensure_self};
use crate::extract::{ApiJson, ApiPath, ApiQuery};
use crate::{mensaje, ApiResult, AppState};

#[derive(Deserialize)]
pub struct AplicativosQuery {
    /// Defaults to the caller.
    pub usuario_id: Option<Uuid>,
}

#[derive(Deserialize)]
pub struct CrearAplicativoRequest {
    pub usuario_id: Uuid,
    #[serde(flatten)]
    pub fields: ApplicativeFields,
}

#[derive(Deserialize)]
pub struct AsignarAplicativoRequest {
    pub usuario_id: Uuid,
    pub aplicativo_base_id: Uuid,
}

pub async fn obtener_aplicativos(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    ApiQuery(query): ApiQuery<AplicativosQuery>,
) -> ApiResult<Json<Vec<RelationView>>> {
    let usuario_id = query.usuario_id.unwrap_or(auth.user_id);
    ensure_self(&state, &auth, usuario_id)?;
    let aplicativos = state
        .lifecycle
        .list_relations(CatalogKind::Applicative, usuario_id)
        .await?;
    Ok(Json(aplicativos))
}

pub async fn aplicativos_disponibles(
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<BaseRow>>> {
    let aplicativos = state
        .lifecycle
        .list_available_bases(CatalogKind::Applicative)
        .await?;
    Ok(Json(aplicativos))
}

pub async fn agregar_aplicativo(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    ApiJson(req): ApiJson<CrearAplicativoRequest>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    ensure_self(&state, &auth, req.usuario_id)?;
    let created = state
        .lifecycle
        .create_personal(req.usuario_id, BaseFields::Applicative(req.fields))
        .await?;
    Ok((
        StatusCode::CREATED,
        mensaje("Aplicativo agregado exitosamente", created),
    ))
}

pub async fn asignar_aplicativo(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    ApiJson(req): ApiJson<AsignarAplicativoRequest>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    ensure_self(&state, &auth, req.usuario_id)?;
    let relation_id = state
        .lifecycle
        .create_relation(
            CatalogKind::Applicative,
            req.usuario_id,
            req.aplicativo_base_id,
        )
        .await?;
    Ok((
        StatusCode::CREATED,
        mensaje("Aplicativo asignado correctamente", json!({ "id": relation_id })),
    ))
}

pub async fn modificar_aplicativo_base(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(fields): ApiJson<ApplicativeFields>,
) -> ApiResult<Json<Value>> {
    ensure_holds_base(&state, &auth, CatalogKind::Applicative, id).await?;
    let aplicativo = state
        .lifecycle
        .modify_base(CatalogKind::Applicative, id, BaseFields::Applicative(fields))
        .await?;
    Ok(mensaje(
        "Aplicativo actualizado correctamente",
        json!({ "aplicativo": aplicativo }),
    ))
}

pub async fn eliminar_aplicativo_base(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Json<Value>> {
    ensure_admin(&state, &auth, "delete_applicative_base")?;
    let deletion = state
        .lifecycle
        .delete_base(CatalogKind::Applicative, id)
        .await?;
    info!(base_id = %id, by = %auth.user_id, "Applicative base deleted");
    Ok(mensaje("Aplicativo eliminado completamente", deletion))
}

pub async fn eliminar_aplicativo(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Json<Value>> {
    ensure_relation_owner(&state, &auth, CatalogKind::Applicative, id).await?;
    let outcome = state
        .lifecycle
        .delete_relation(CatalogKind::Applicative, id)
        .await?;
    Ok(mensaje("Aplicativo eliminado correctamente", outcome))
}
