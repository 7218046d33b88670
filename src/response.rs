//! Standard response envelopes.

use axum::{http::StatusCode, Json};
use serde::Serialize;

/// `{success, message, data?}` returned by create, update, delete and bulk actions.
#[derive(Debug, Serialize)]
pub struct MutationResponse<T> {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

#[derive(Debug, Serialize)]
pub struct DataResponse<T> {
    pub data: T,
}

#[derive(Debug, Serialize)]
pub struct SpecResponse<T> {
    pub spec: T,
}

pub fn mutation<T: Serialize>(
    status: StatusCode,
    message: impl Into<String>,
    data: Option<T>,
) -> (StatusCode, Json<MutationResponse<T>>) {
    (
        status,
        Json(MutationResponse {
            success: true,
            message: message.into(),
            data,
        }),
    )
}

pub fn data<T: Serialize>(data: T) -> Json<DataResponse<T>> {
    Json(DataResponse { data })
}

pub fn spec<T: Serialize>(spec: T) -> Json<SpecResponse<T>> {
    Json(SpecResponse { spec })
}
