use axum::Json;
use serde::Serialize;
use serde_json::{json, Value};

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// `{"mensaje": ...}` merged with the fields of `extra` when it serializes to
/// an object.
pub fn mensaje<T: Serialize>(mensaje: &str, extra: T) -> Json<Value> {
    let mut body = json!({ "mensaje": mensaje });
    if let (Some(target), Ok(Value::Object(fields))) =
        (body.as_object_mut(), serde_json::to_value(extra))
    {
        target.extend(fields);
    }
    Json(body)
}
