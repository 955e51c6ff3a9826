pub mod admin;
pub mod generate;
pub mod providers;

use axum::extract::{FromRequest, FromRequestParts, Path, Query};
use axum::Json;
use serde_json::{json, Value};

use crate::error::AppError;

/// `Json` whose rejection renders as the API error envelope.
#[derive(Debug, FromRequest)]
#[from_request(via(Json), rejection(AppError))]
pub struct AppJson<T>(pub T);

/// `Query` whose rejection renders as the API error envelope.
#[derive(Debug, FromRequestParts)]
#[from_request(via(Query), rejection(AppError))]
pub struct AppQuery<T>(pub T);

/// `Path` whose rejection renders as the API error envelope.
#[derive(Debug, FromRequestParts)]
#[from_request(via(Path), rejection(AppError))]
pub struct AppPath<T>(pub T);

/// GET /health
pub async fn health() -> Json<Value> {
    Json(json!({ "status": "healthy" }))
}
