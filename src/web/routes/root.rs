use axum::Json;
use serde_json::{json, Value};

pub async fn index_handler() -> &'static str {
    "Blood Donation Management System API is running"
}

pub async fn welcome_handler() -> Json<Value> {
    Json(json!({ "message": "Welcome to BloodShare API!" }))
}
