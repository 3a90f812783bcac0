use axum::{extract::State, http::StatusCode, Extension, Json};
use despacho_core::AuthContext;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::extract::ApiJson;
use crate::{mensaje, ApiResult, AppState};

#[derive(Deserialize)]
pub struct RegistroRequest {
    #[serde(default)]
    pub nombre: String,
    #[serde(default)]
    pub email: String,
    #[serde(default, rename = "contraseña", alias = "contrasena", alias = "password")]
    pub password: String,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default, rename = "contraseña", alias = "contrasena", alias = "password")]
    pub password: String,
}

#[derive(Deserialize)]
pub struct CambiarContrasenaRequest {
    pub actual: String,
    pub nueva: String,
}

#[derive(Deserialize)]
pub struct RecuperarContrasenaRequest {
    pub email: String,
    pub nueva: String,
}

pub async fn registro(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<RegistroRequest>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let registration = state
        .accounts
        .register(&req.nombre, &req.email, &req.password)
        .await?;
    Ok((
        StatusCode::CREATED,
        mensaje("Registro exitoso", registration),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<LoginRequest>,
) -> ApiResult<Json<Value>> {
    let session = state.accounts.login(&req.email, &req.password).await?;
    Ok(mensaje("Inicio de sesión exitoso", session))
}

pub async fn cambiar_contrasena(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    ApiJson(req): ApiJson<CambiarContrasenaRequest>,
) -> ApiResult<Json<Value>> {
    state
        .accounts
        .change_password(auth.user_id, &req.actual, &req.nueva)
        .await?;
    Ok(mensaje("Contraseña actualizada correctamente", json!({})))
}

pub async fn recuperar_contrasena(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<RecuperarContrasenaRequest>,
) -> ApiResult<Json<Value>> {
    state
        .accounts
        .recover_password(&req.email, &req.nueva)
        .await?;
    Ok(mensaje("Contraseña restablecida correctamente", json!({})))
}
