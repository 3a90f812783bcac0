use axum::{
    extract::State,
    http::StatusCode,
    Extension, Json,
};
use despacho_core::{AuthContext, BaseFields, BaseRow, CatalogKind, RelationView, TemplateFields};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use crate::auth::{ensure_admin, ensure_holds_base, ensure_relation_owner, ensure_self};
use crate::extract::{ApiJson, ApiPath};
use crate::{mensaje, ApiResult, AppState};

#[derive(Deserialize)]
pub struct CrearNotaRequest {
    pub usuario_id: Uuid,
    #[serde(flatten)]
    pub fields: TemplateFields,
}

#[derive(Deserialize)]
pub struct AsignarPlantillaRequest {
    pub usuario_id: Uuid,
    pub plantilla_id: Uuid,
}

pub async fn obtener_notas(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    ApiPath(usuario_id): ApiPath<Uuid>,
) -> ApiResult<Json<Vec<RelationView>>> {
    ensure_self(&state, &auth, usuario_id)?;
    let notas = state
        .lifecycle
        .list_relations(CatalogKind::Template, usuario_id)
        .await?;
    Ok(Json(notas))
}

pub async fn obtener_notas_avances(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    ApiPath(usuario_id): ApiPath<Uuid>,
) -> ApiResult<Json<Vec<RelationView>>> {
    ensure_self(&state, &auth, usuario_id)?;
    Ok(Json(state.lifecycle.list_avances(usuario_id).await?))
}

pub async fn plantillas_disponibles(
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<BaseRow>>> {
    let plantillas = state
        .lifecycle
        .list_available_bases(CatalogKind::Template)
        .await?;
    Ok(Json(plantillas))
}

/// Creates a personalized template for the user.
pub async fn crear_nota(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    ApiJson(req): ApiJson<CrearNotaRequest>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    ensure_self(&state, &auth, req.usuario_id)?;
    let created = state
        .lifecycle
        .create_personal(req.usuario_id, BaseFields::Template(req.fields))
        .await?;
    Ok((
        StatusCode::CREATED,
        mensaje("Nota personalizada creada correctamente", created),
    ))
}

pub async fn asignar_plantilla(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    ApiJson(req): ApiJson<AsignarPlantillaRequest>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    ensure_self(&state, &auth, req.usuario_id)?;
    let relation_id = state
        .lifecycle
        .create_relation(CatalogKind::Template, req.usuario_id, req.plantilla_id)
        .await?;
    Ok((
        StatusCode::CREATED,
        mensaje("Nota agregada correctamente", json!({ "id": relation_id })),
    ))
}

pub async fn modificar_plantilla(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(fields): ApiJson<TemplateFields>,
) -> ApiResult<Json<Value>> {
    ensure_holds_base(&state, &auth, CatalogKind::Template, id).await?;
    let plantilla = state
        .lifecycle
        .modify_base(CatalogKind::Template, id, BaseFields::Template(fields))
        .await?;
    Ok(mensaje(
        "Plantilla actualizada correctamente",
        json!({ "plantilla": plantilla }),
    ))
}

pub async fn limpiar_avances(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Json<Value>> {
    ensure_holds_base(&state, &auth, CatalogKind::Template, id).await?;
    state.lifecycle.clear_avances(id).await?;
    Ok(mensaje("Nota de avances eliminada correctamente", json!({})))
}

/// Removes a base template and every note that references it.
pub async fn eliminar_plantilla(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Json<Value>> {
    ensure_admin(&state, &auth, "delete_template_base")?;
    let deletion = state
        .lifecycle
        .delete_base(CatalogKind::Template, id)
        .await?;
    info!(base_id = %id, by = %auth.user_id, "Template base deleted");
    Ok(mensaje("Plantilla eliminada completamente", deletion))
}

pub async fn eliminar_nota(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Json<Value>> {
    ensure_relation_owner(&state, &auth, CatalogKind::Template, id).await?;
    let outcome = state
        .lifecycle
        .delete_relation(CatalogKind::Template, id)
        .await?;
    Ok(mensaje("Nota eliminada correctamente", outcome))
}
