//! List filters: type resolution, option loading and SQL conditions.

mod compiler;
pub use compiler::*;

pub use crate::sql::Condition;

use crate::error::AppError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::PgPool;
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterKind {
    Boolean,
    Date,
    #[serde(rename = "daterange")]
    DateRange,
    Text,
    Select,
    Relation,
    Custom,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FilterOption {
    pub label: String,
    pub value: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<i64>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterSpec {
    pub field: String,
    pub label: String,
    #[serde(rename = "type")]
    pub kind: FilterKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<FilterOption>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub choices_endpoint: Option<String>,
    /// Current value from the request, echoed back.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    /// "ms" for millisecond epoch columns, "s" for second epoch columns.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub precision: Option<&'static str>,
}

/// Caller-supplied filter: lists its own options and produces its own conditions.
///
/// Conditions use `?` placeholders, bound in order as text; cast where needed (`?::numeric`).
/// The listed table is aliased `main`.
#[async_trait]
pub trait CustomFilter: fmt::Debug + Send + Sync {
    async fn options(&self, pool: &PgPool) -> Result<Vec<FilterOption>, AppError>;

    fn conditions(&self, value: &str) -> Result<Vec<Condition>, AppError>;
}
