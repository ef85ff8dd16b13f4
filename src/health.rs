use axum::Json;
use serde::Serialize;

use crate::db::now_iso;

pub const SERVICE_NAME: &str = "LedgerFlow Backend";

#[derive(Debug, Clone, Serialize)]
pub struct Health {
    pub status: &'static str,
    pub service: &'static str,
    pub timestamp: String,
}

pub async fn health() -> Json<Health> {
    Json(Health {
        status: "healthy",
        service: SERVICE_NAME,
        timestamp: now_iso(),
    })
}
