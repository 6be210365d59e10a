use axum::Json;
use serde_json::{json, Value};

const SERVICE_NAME: &str = "pedimentos";

/// GET /health
pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": SERVICE_NAME,
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// GET /
pub async fn root() -> Json<Value> {
    Json(json!({
        "message": "Pedimentos processing service",
        "version": env!("CARGO_PKG_VERSION"),
        "health": "/health",
    }))
}
