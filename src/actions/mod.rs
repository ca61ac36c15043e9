pub mod admin;
pub mod consultations;
pub mod views;
pub mod webhook;

pub use admin::*;
pub use consultations::*;
pub use webhook::*;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json},
};

/// JSON error payload shared by all handlers
pub fn json_error(status: StatusCode, message: &str) -> impl IntoResponse {
    (status, Json(serde_json::json!({ "error": message })))
}
