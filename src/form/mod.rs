//! UI-agnostic form descriptions derived from table metadata and relations.

mod generator;
pub use generator::*;

use crate::config::ValidationRule;
use crate::field_id::FieldId;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FormFieldType {
    Text,
    Number,
    Boolean,
    Select,
    Date,
    Blob,
    Json,
    Relation,
    RelationMany,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RelationKind {
    ManyToOne,
    ManyToMany,
    OneToMany,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationConfig {
    pub kind: RelationKind,
    pub table: String,
    pub value_column: String,
    pub label_column: String,
    pub choices_endpoint: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Choice {
    pub label: String,
    pub value: Value,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FormFieldSpec {
    pub name: FieldId,
    pub label: String,
    #[serde(rename = "type")]
    pub kind: FormFieldType,
    pub required: bool,
    pub rules: ValidationRule,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<Choice>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relation_config: Option<RelationConfig>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FormSpec {
    pub model: String,
    pub title: String,
    pub endpoint: String,
    pub lookup_column: String,
    pub fields: Vec<FormFieldSpec>,
    /// Current values in update mode; empty when creating.
    pub values: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label_string: Option<String>,
}
