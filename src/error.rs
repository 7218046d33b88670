//! Typed errors, constraint translation and HTTP mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use regex::Regex;
use serde::Serialize;
use std::sync::OnceLock;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing reference: {kind} '{id}'")]
    MissingReference { kind: &'static str, id: String },
    #[error("table '{0}' has no columns")]
    EmptyTable(String),
    #[error("model '{model}': lookup column '{column}' must be a primary key or unique column")]
    InvalidLookupColumn { model: String, column: String },
    #[error("relation '{relation}': {reason}")]
    Relation { relation: String, reason: String },
    #[error("model '{model}': filter '{field}': {reason}")]
    UnsupportedFilter { model: String, field: String, reason: String },
    #[error("model '{model}': invalid field path '{path}'")]
    InvalidPath { model: String, path: String },
    #[error("duplicate model label: {0}")]
    DuplicateLabel(String),
    #[error("config load: {0}")]
    Load(String),
    #[error("validation: {0}")]
    Validation(String),
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("validation: {0}")]
    Validation(String),
    #[error("database: {0}")]
    Db(#[from] sqlx::Error),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("relation '{relation}': {message}")]
    RelationConstraint { relation: String, message: String },
    #[error("fetch failed")]
    FetchFailed(#[source] sqlx::Error),
}

#[derive(Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            AppError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "config_error"),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            AppError::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "validation_error"),
            AppError::Db(e) => {
                if let sqlx::Error::RowNotFound = e {
                    (StatusCode::NOT_FOUND, "not_found")
                } else {
                    (StatusCode::INTERNAL_SERVER_ERROR, "database_error")
                }
            }
            AppError::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
            AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            AppError::RelationConstraint { .. } => (StatusCode::CONFLICT, "relation_constraint"),
            AppError::FetchFailed(_) => (StatusCode::INTERNAL_SERVER_ERROR, "fetch_failed"),
        };
        // Database internals are logged, never sent to the client.
        let message = match &self {
            AppError::Db(e) if !matches!(e, sqlx::Error::RowNotFound) => {
                log_db_error(e);
                "internal database error".to_string()
            }
            AppError::FetchFailed(e) => {
                log_db_error(e);
                "failed to fetch records".to_string()
            }
            other => other.to_string(),
        };
        let body = ErrorBody {
            error: ErrorDetail {
                code: code.to_string(),
                message,
                details: None,
            },
        };
        (status, Json(body)).into_response()
    }
}

fn log_db_error(e: &sqlx::Error) {
    match e.as_database_error() {
        Some(db) => tracing::error!(code = ?db.code(), message = %db.message(), "database error"),
        None => tracing::error!(error = %e, "database error"),
    }
}

const UNIQUE_VIOLATION: &str = "23505";
const FOREIGN_KEY_VIOLATION: &str = "23503";
const NOT_NULL_VIOLATION: &str = "23502";
const INVALID_TEXT_REPRESENTATION: &str = "22P02";

fn sqlstate(e: &sqlx::Error) -> Option<String> {
    e.as_database_error().and_then(|db| db.code()).map(|c| c.into_owned())
}

fn pg_detail(e: &sqlx::Error) -> Option<String> {
    e.as_database_error()
        .and_then(|db| db.try_downcast_ref::<sqlx::postgres::PgDatabaseError>())
        .and_then(|pg| pg.detail())
        .map(str::to_string)
}

/// Column list from a Postgres detail such as `Key (email)=(a@b.c) already exists.`
pub fn key_columns_from_detail(detail: &str) -> Option<String> {
    static KEY_RE: OnceLock<Option<Regex>> = OnceLock::new();
    let re = KEY_RE.get_or_init(|| Regex::new(r"Key \(([^)]+)\)=").ok()).as_ref()?;
    re.captures(detail)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().replace('"', ""))
}

/// User-facing message for a unique violation on `table`.
pub fn unique_violation_message(table: &str, detail: Option<&str>) -> String {
    match detail.and_then(key_columns_from_detail) {
        Some(cols) => format!("a {} record with the same {} already exists", table, cols),
        None => format!("a {} record with the same unique value already exists", table),
    }
}

/// Translate an insert/update failure on `table` into a domain error.
pub fn translate_write_error(e: sqlx::Error, table: &str) -> AppError {
    match sqlstate(&e).as_deref() {
        Some(UNIQUE_VIOLATION) => {
            let detail = pg_detail(&e);
            AppError::Conflict(unique_violation_message(table, detail.as_deref()))
        }
        Some(FOREIGN_KEY_VIOLATION) => {
            AppError::Conflict(format!("a {} value references a record that does not exist", table))
        }
        Some(NOT_NULL_VIOLATION) => AppError::Validation(format!("a required {} value is missing", table)),
        Some(INVALID_TEXT_REPRESENTATION) => AppError::BadRequest(format!("invalid value for {}", table)),
        _ => AppError::Db(e),
    }
}

/// Translate a delete failure on `table` into a domain error.
pub fn translate_delete_error(e: sqlx::Error, table: &str) -> AppError {
    match sqlstate(&e).as_deref() {
        Some(FOREIGN_KEY_VIOLATION) => {
            AppError::Conflict(format!("{} record is referenced by another record", table))
        }
        Some(INVALID_TEXT_REPRESENTATION) => AppError::BadRequest(format!("invalid lookup value for {}", table)),
        _ => AppError::Db(e),
    }
}

/// Translate a failure while clearing one-to-many parentage.
pub fn translate_unset_error(e: sqlx::Error, relation: &str, child_table: &str) -> AppError {
    match sqlstate(&e).as_deref() {
        Some(NOT_NULL_VIOLATION) => AppError::RelationConstraint {
            relation: relation.to_string(),
            message: format!(
                "{} rows cannot be detached because their parent reference is required",
                child_table
            ),
        },
        _ => translate_write_error(e, child_table),
    }
}
