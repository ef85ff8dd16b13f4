//! Request extractors whose rejections render as `{"error": ...}`, and the
//! small acknowledgement body returned by writes.

use axum::extract::rejection::PathRejection;
use axum::extract::{FromRequest, FromRequestParts};
use serde::Serialize;

use crate::error::ApiError;

#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct JsonBody<T>(pub T);

#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(ApiError))]
pub struct QueryParams<T>(pub T);

#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(ApiError))]
pub struct PathParam<T>(pub T);

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::BadRequest(format!("Invalid record id: {}", rejection.body_text()))
    }
}

/// `{"status":"ok"}`, optionally with the affected id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Ack {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<i64>,
}

impl Ack {
    pub fn ok() -> Self {
        Self { status: "ok", id: None }
    }

    pub fn with_id(id: i64) -> Self {
        Self { status: "ok", id: Some(id) }
    }
}
