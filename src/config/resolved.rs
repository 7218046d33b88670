//! Resolved model: config validated against the schema and flattened for runtime use.

use crate::config::{AccessorFn, ModelConfig, ValidationRule};
use crate::filters::{CustomFilter, FilterKind};
use crate::relations::{M2MRelation, O2MRelation};
use crate::schema::{ColumnDescriptor, DateMode, ForeignKeyDescriptor, TableInfo};
use std::collections::HashMap;
use std::sync::Arc;

/// A validated column reference: a base column or one joined hop through a foreign key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FieldPath {
    Column(String),
    Related {
        foreign_key: ForeignKeyDescriptor,
        column: String,
    },
}

impl FieldPath {
    /// Result key: `column` or `<fk>__<foreignColumn>`.
    pub fn accessor_key(&self) -> String {
        match self {
            FieldPath::Column(c) => c.clone(),
            FieldPath::Related { foreign_key, column } => format!("{}__{}", foreign_key.column, column),
        }
    }

    /// Join dedup key and alias: `<fkColumn>_<foreignColumn>`.
    pub fn join_alias(&self) -> Option<String> {
        match self {
            FieldPath::Column(_) => None,
            FieldPath::Related { foreign_key, .. } => Some(join_alias(foreign_key)),
        }
    }
}

pub fn join_alias(fk: &ForeignKeyDescriptor) -> String {
    format!("{}_{}", fk.column, fk.foreign_column)
}

#[derive(Clone, Debug)]
pub struct ResolvedListColumn {
    pub accessor_key: String,
    pub header: String,
    /// Underlying column; `None` only for computed columns whose field names no real column.
    pub path: Option<FieldPath>,
    pub sort: Option<FieldPath>,
    /// Original `sort_key` string as configured (or defaulted).
    pub sort_key: Option<String>,
    pub accessor: Option<AccessorFn>,
    pub column_type: &'static str,
}

#[derive(Clone, Debug)]
pub struct ResolvedFilter {
    pub field: String,
    pub label: String,
    pub kind: FilterKind,
    pub column: Option<ColumnDescriptor>,
    pub foreign_key: Option<ForeignKeyDescriptor>,
    pub date_mode: Option<DateMode>,
    pub custom: Option<Arc<dyn CustomFilter>>,
}

#[derive(Clone, Debug)]
pub struct ResolvedModel {
    pub config: ModelConfig,
    pub label: String,
    pub title: String,
    pub table: TableInfo,
    pub lookup_column: ColumnDescriptor,
    pub label_column: String,
    pub list_columns: Vec<ResolvedListColumn>,
    pub search_fields: Vec<FieldPath>,
    pub filters: Vec<ResolvedFilter>,
    pub many_to_many: Vec<M2MRelation>,
    pub one_to_many: Vec<O2MRelation>,
    pub rules: HashMap<String, ValidationRule>,
}

impl ResolvedModel {
    pub fn select_all(&self) -> bool {
        self.list_columns.iter().any(|c| c.accessor.is_some())
    }

    pub fn list_column(&self, accessor_key: &str) -> Option<&ResolvedListColumn> {
        self.list_columns.iter().find(|c| c.accessor_key == accessor_key)
    }

    pub fn has_collection_relations(&self) -> bool {
        !self.many_to_many.is_empty() || !self.one_to_many.is_empty()
    }
}
