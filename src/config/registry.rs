//! Immutable model registry, built and validated once at startup.

use crate::case::humanize;
use crate::config::{
    resolve_path, validate_tables, FieldPath, ListField, ModelConfig, RegistryConfig, ResolvedListColumn,
    ResolvedModel, TableDef, ValidationRule,
};
use crate::error::{AppError, ConfigError};
use crate::field_id::FieldId;
use crate::filters::resolve_filters;
use crate::relations::{resolve_many_to_many, resolve_one_to_many};
use crate::schema::{TableInfo, TableMap};
use crate::sql::{resolve_ordering, RESERVED_QUERY_KEYS};
use std::collections::HashMap;

/// Labels that would collide with fixed route segments.
const RESERVED_LABELS: &[&str] = &["bulk", "formspec"];

#[derive(Debug)]
pub struct ModelRegistry {
    prefix: String,
    tables: TableMap,
    models: HashMap<String, ResolvedModel>,
    order: Vec<String>,
}

fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim().trim_end_matches('/');
    if trimmed.is_empty() || trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    }
}

impl ModelRegistry {
    pub fn build(
        tables: Vec<TableDef>,
        models: Vec<ModelConfig>,
        api_prefix: impl AsRef<str>,
    ) -> Result<Self, ConfigError> {
        let tables = validate_tables(&tables)?;
        let mut resolved = HashMap::new();
        let mut order = Vec::with_capacity(models.len());
        for config in models {
            if RESERVED_LABELS.contains(&config.label.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "model label '{}' is reserved",
                    config.label
                )));
            }
            if resolved.contains_key(&config.label) {
                return Err(ConfigError::DuplicateLabel(config.label));
            }
            let model = resolve_model(config, &tables)?;
            order.push(model.label.clone());
            resolved.insert(model.label.clone(), model);
        }
        tracing::info!(models = order.len(), tables = tables.len(), "model registry built");
        Ok(ModelRegistry {
            prefix: normalize_prefix(api_prefix.as_ref()),
            tables,
            models: resolved,
            order,
        })
    }

    /// Build from a JSON document `{ "tables": [...], "models": [...] }`.
    pub fn from_json(json: &str, api_prefix: impl AsRef<str>) -> Result<Self, ConfigError> {
        let config: RegistryConfig = serde_json::from_str(json).map_err(|e| ConfigError::Load(e.to_string()))?;
        Self::build(config.tables, config.models, api_prefix)
    }

    pub fn model(&self, label: &str) -> Result<&ResolvedModel, AppError> {
        self.models
            .get(label)
            .ok_or_else(|| AppError::NotFound(format!("model '{}'", label)))
    }

    pub fn table(&self, name: &str) -> Option<&TableInfo> {
        self.tables.get(name)
    }

    pub fn tables(&self) -> &TableMap {
        &self.tables
    }

    /// Model labels in registration order.
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn list_endpoint(&self, label: &str) -> String {
        format!("{}/{}", self.prefix, label)
    }

    pub fn choices_endpoint(&self, label: &str, column: &str) -> String {
        format!("{}/formspec/{}/choices/{}", self.prefix, label, column)
    }

    pub fn choices_many_endpoint(&self, label: &str, relation: &str, column: &str) -> String {
        format!("{}/formspec/{}/choices-many/{}___{}", self.prefix, label, relation, column)
    }
}

fn resolve_list_column(model: &str, table: &TableInfo, tables: &TableMap, field: &ListField) -> Result<ResolvedListColumn, ConfigError> {
    let path = match resolve_path(model, table, tables, &field.field) {
        Ok(p) => Some(p),
        // Computed columns may name a key with no backing column.
        Err(_) if field.accessor.is_some() => None,
        Err(e) => return Err(e),
    };
    let (sort, sort_key) = match (&field.sort_key, &path) {
        (Some(key), _) => (Some(resolve_path(model, table, tables, key)?), Some(key.clone())),
        (None, Some(p)) if field.accessor.is_none() => (Some(p.clone()), Some(field.field.clone())),
        _ => (None, None),
    };
    let column_type = match &path {
        Some(FieldPath::Column(c)) => table.column(c).map(|c| c.semantic_type.as_str()),
        Some(FieldPath::Related { foreign_key, column }) => tables
            .get(&foreign_key.foreign_table)
            .and_then(|t| t.column(column))
            .map(|c| c.semantic_type.as_str()),
        None => None,
    }
    .unwrap_or("computed");
    let accessor_key = path
        .as_ref()
        .map(FieldPath::accessor_key)
        .unwrap_or_else(|| field.field.clone());
    Ok(ResolvedListColumn {
        header: field.header.clone().unwrap_or_else(|| humanize(&accessor_key)),
        accessor_key,
        path,
        sort,
        sort_key,
        accessor: field.accessor.clone(),
        column_type,
    })
}

fn resolve_model(config: ModelConfig, tables: &TableMap) -> Result<ResolvedModel, ConfigError> {
    let label = config.label.clone();
    let table = tables
        .get(&config.table)
        .cloned()
        .ok_or_else(|| ConfigError::MissingReference {
            kind: "table",
            id: config.table.clone(),
        })?;

    let lookup_name = config
        .lookup_column
        .clone()
        .or_else(|| table.primary_key.clone())
        .ok_or_else(|| ConfigError::InvalidLookupColumn {
            model: label.clone(),
            column: "<none>".into(),
        })?;
    let lookup_column = table
        .column(&lookup_name)
        .filter(|c| c.is_primary || c.is_unique)
        .cloned()
        .ok_or_else(|| ConfigError::InvalidLookupColumn {
            model: label.clone(),
            column: lookup_name.clone(),
        })?;

    let label_column = match &config.label_column {
        Some(c) if table.column(c).is_some() => c.clone(),
        Some(c) => {
            return Err(ConfigError::InvalidPath {
                model: label.clone(),
                path: c.clone(),
            })
        }
        None => table.label_column.clone(),
    };

    let fields: Vec<ListField> = if config.list.fields.is_empty() {
        table.columns.iter().map(|c| ListField::new(&c.name)).collect()
    } else {
        config.list.fields.clone()
    };
    let list_columns = fields
        .iter()
        .map(|f| resolve_list_column(&label, &table, tables, f))
        .collect::<Result<Vec<_>, _>>()?;

    let search_fields = if config.list.search.enabled {
        config
            .list
            .search
            .fields
            .iter()
            .map(|f| resolve_path(&label, &table, tables, f))
            .collect::<Result<Vec<_>, _>>()?
    } else {
        Vec::new()
    };

    let filters = resolve_filters(&label, &config.list.filter, &table, tables)?;
    if let Some(f) = filters.iter().find(|f| RESERVED_QUERY_KEYS.contains(&f.field.as_str())) {
        return Err(ConfigError::Validation(format!(
            "filter '{}' on model '{}' clashes with a reserved list parameter",
            f.field, label
        )));
    }
    let many_to_many = resolve_many_to_many(&config, &table, tables)?;
    let one_to_many = resolve_one_to_many(&config, &table, tables)?;

    let mut rules: HashMap<String, ValidationRule> = HashMap::new();
    for o in config.fields.iter().flatten() {
        let id = FieldId::parse(&o.name);
        let known = match &id {
            FieldId::Column(c) => table.column(c).is_some(),
            FieldId::ManyToMany { .. } => many_to_many.iter().any(|r| r.field_id() == id),
            FieldId::OneToMany { .. } => one_to_many.iter().any(|r| r.field_id() == id),
        };
        if !known {
            return Err(ConfigError::InvalidPath {
                model: label.clone(),
                path: o.name.clone(),
            });
        }
        let mut rule = o.rules.clone();
        if rule.required.is_none() {
            rule.required = o.required;
        }
        rules.insert(id.to_string(), rule);
    }

    let title = config.list.title.clone().unwrap_or_else(|| humanize(&label));
    let default_ordering = config.list.default_ordering.clone();
    let model = ResolvedModel {
        config,
        label,
        title,
        table,
        lookup_column,
        label_column,
        list_columns,
        search_fields,
        filters,
        many_to_many,
        one_to_many,
        rules,
    };
    if let Some(raw) = default_ordering {
        resolve_ordering(&model, &raw).map_err(|_| ConfigError::InvalidPath {
            model: model.label.clone(),
            path: raw.clone(),
        })?;
    }
    Ok(model)
}
