//! Raw config types: table definitions and per-model CRUD configuration.

use crate::filters::{CustomFilter, FilterKind};
use crate::form::FormFieldType;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TableDef {
    pub name: String,
    #[serde(default = "default_schema")]
    pub schema: String,
    pub columns: Vec<ColumnDef>,
    #[serde(default)]
    pub foreign_keys: Vec<ForeignKeyDef>,
}

fn default_schema() -> String {
    "public".into()
}

impl TableDef {
    pub fn new(name: impl Into<String>) -> Self {
        TableDef {
            name: name.into(),
            schema: default_schema(),
            columns: Vec::new(),
            foreign_keys: Vec::new(),
        }
    }

    pub fn schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = schema.into();
        self
    }

    pub fn column(mut self, column: ColumnDef) -> Self {
        self.columns.push(column);
        self
    }

    pub fn foreign_key(
        mut self,
        column: impl Into<String>,
        foreign_table: impl Into<String>,
        foreign_column: impl Into<String>,
    ) -> Self {
        self.foreign_keys.push(ForeignKeyDef {
            column: column.into(),
            foreign_table: foreign_table.into(),
            foreign_column: foreign_column.into(),
        });
        self
    }
}

/// Integer columns holding unix epochs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnMode {
    Timestamp,
    TimestampMs,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    /// SQL type name as declared (e.g. "serial", "text", "timestamptz", "post_status").
    #[serde(rename = "type")]
    pub type_: String,
    #[serde(default = "default_true")]
    pub nullable: bool,
    #[serde(default)]
    pub primary_key: bool,
    #[serde(default)]
    pub unique: bool,
    #[serde(default)]
    pub default: Option<String>,
    #[serde(default)]
    pub enum_values: Vec<String>,
    #[serde(default)]
    pub mode: Option<ColumnMode>,
}

fn default_true() -> bool {
    true
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, type_: impl Into<String>) -> Self {
        ColumnDef {
            name: name.into(),
            type_: type_.into(),
            nullable: true,
            primary_key: false,
            unique: false,
            default: None,
            enum_values: Vec::new(),
            mode: None,
        }
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.nullable = false;
        self
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn default_sql(mut self, expression: impl Into<String>) -> Self {
        self.default = Some(expression.into());
        self
    }

    pub fn enum_values<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.enum_values = values.into_iter().map(Into::into).collect();
        self
    }

    pub fn mode(mut self, mode: ColumnMode) -> Self {
        self.mode = Some(mode);
        self
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ForeignKeyDef {
    pub column: String,
    pub foreign_table: String,
    pub foreign_column: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ValidationRule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_length: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum: Option<f64>,
}

/// Computes a list cell from the full row. Its presence makes the list query select every column.
#[derive(Clone)]
pub struct AccessorFn(Arc<dyn Fn(&Map<String, Value>) -> Value + Send + Sync>);

impl AccessorFn {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&Map<String, Value>) -> Value + Send + Sync + 'static,
    {
        AccessorFn(Arc::new(f))
    }

    pub fn call(&self, row: &Map<String, Value>) -> Value {
        (self.0)(row)
    }
}

impl fmt::Debug for AccessorFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessorFn(..)")
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct ListField {
    /// Column name, or `fk_column.foreign_column` for one joined hop.
    pub field: String,
    #[serde(default)]
    pub header: Option<String>,
    #[serde(default)]
    pub sort_key: Option<String>,
    #[serde(skip)]
    pub accessor: Option<AccessorFn>,
}

impl ListField {
    pub fn new(field: impl Into<String>) -> Self {
        ListField {
            field: field.into(),
            header: None,
            sort_key: None,
            accessor: None,
        }
    }

    pub fn header(mut self, header: impl Into<String>) -> Self {
        self.header = Some(header.into());
        self
    }

    pub fn sort_key(mut self, sort_key: impl Into<String>) -> Self {
        self.sort_key = Some(sort_key.into());
        self
    }

    pub fn accessor<F>(mut self, f: F) -> Self
    where
        F: Fn(&Map<String, Value>) -> Value + Send + Sync + 'static,
    {
        self.accessor = Some(AccessorFn::new(f));
        self
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub fields: Vec<String>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        SearchConfig {
            enabled: true,
            fields: Vec::new(),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct FilterField {
    pub field: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<FilterKind>,
    #[serde(skip)]
    pub custom: Option<Arc<dyn CustomFilter>>,
}

impl FilterField {
    pub fn new(field: impl Into<String>) -> Self {
        FilterField {
            field: field.into(),
            label: None,
            kind: None,
            custom: None,
        }
    }

    pub fn kind(mut self, kind: FilterKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn custom(mut self, filter: Arc<dyn CustomFilter>) -> Self {
        self.kind = Some(FilterKind::Custom);
        self.custom = Some(filter);
        self
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct FilterConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Empty means auto-select boolean, enum and date columns.
    #[serde(default)]
    pub fields: Vec<FilterField>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        FilterConfig {
            enabled: true,
            fields: Vec::new(),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct ListConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub title: Option<String>,
    /// Empty means every base column.
    #[serde(default)]
    pub fields: Vec<ListField>,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub filter: FilterConfig,
    /// `<accessorKey>:<asc|desc>` applied when the request has no `ordering`.
    #[serde(default)]
    pub default_ordering: Option<String>,
    #[serde(default)]
    pub page_size: Option<u32>,
}

impl Default for ListConfig {
    fn default() -> Self {
        ListConfig {
            enabled: true,
            title: None,
            fields: Vec::new(),
            search: SearchConfig::default(),
            filter: FilterConfig::default(),
            default_ordering: None,
            page_size: None,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct OperationConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for OperationConfig {
    fn default() -> Self {
        OperationConfig { enabled: true }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct ManyToManyConfig {
    /// Junction table holding a foreign key to this model and to the other side.
    pub through: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct OneToManyConfig {
    /// Child table holding a foreign key to this model.
    pub table: String,
}

/// Per-column form override. When any are configured, only these columns are shown.
#[derive(Clone, Debug, Deserialize)]
pub struct FieldOverride {
    pub name: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<FormFieldType>,
    #[serde(default)]
    pub required: Option<bool>,
    #[serde(default)]
    pub rules: ValidationRule,
}

impl FieldOverride {
    pub fn new(name: impl Into<String>) -> Self {
        FieldOverride {
            name: name.into(),
            label: None,
            kind: None,
            required: None,
            rules: ValidationRule::default(),
        }
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn rules(mut self, rules: ValidationRule) -> Self {
        self.rules = rules;
        self
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct ModelConfig {
    /// Registry key and URL segment.
    pub label: String,
    pub table: String,
    #[serde(default)]
    pub lookup_column: Option<String>,
    #[serde(default)]
    pub label_column: Option<String>,
    #[serde(default)]
    pub list: ListConfig,
    #[serde(default)]
    pub create: OperationConfig,
    #[serde(default)]
    pub update: OperationConfig,
    #[serde(default)]
    pub delete: OperationConfig,
    #[serde(default)]
    pub many_to_many: BTreeMap<String, ManyToManyConfig>,
    #[serde(default)]
    pub one_to_many: BTreeMap<String, OneToManyConfig>,
    #[serde(default)]
    pub fields: Option<Vec<FieldOverride>>,
}

impl ModelConfig {
    pub fn new(label: impl Into<String>, table: impl Into<String>) -> Self {
        ModelConfig {
            label: label.into(),
            table: table.into(),
            lookup_column: None,
            label_column: None,
            list: ListConfig::default(),
            create: OperationConfig::default(),
            update: OperationConfig::default(),
            delete: OperationConfig::default(),
            many_to_many: BTreeMap::new(),
            one_to_many: BTreeMap::new(),
            fields: None,
        }
    }

    pub fn lookup_column(mut self, column: impl Into<String>) -> Self {
        self.lookup_column = Some(column.into());
        self
    }

    pub fn label_column(mut self, column: impl Into<String>) -> Self {
        self.label_column = Some(column.into());
        self
    }

    pub fn list_field(mut self, field: ListField) -> Self {
        self.list.fields.push(field);
        self
    }

    pub fn search_field(mut self, field: impl Into<String>) -> Self {
        self.list.search.fields.push(field.into());
        self
    }

    pub fn filter_field(mut self, field: FilterField) -> Self {
        self.list.filter.fields.push(field);
        self
    }

    pub fn many_to_many(mut self, name: impl Into<String>, through: impl Into<String>) -> Self {
        self.many_to_many.insert(
            name.into(),
            ManyToManyConfig {
                through: through.into(),
            },
        );
        self
    }

    pub fn one_to_many(mut self, name: impl Into<String>, table: impl Into<String>) -> Self {
        self.one_to_many.insert(name.into(), OneToManyConfig { table: table.into() });
        self
    }

    pub fn field(mut self, field: FieldOverride) -> Self {
        self.fields.get_or_insert_with(Vec::new).push(field);
        self
    }
}

/// Tables plus model configs, as loaded from a JSON document.
#[derive(Clone, Debug, Deserialize)]
pub struct RegistryConfig {
    pub tables: Vec<TableDef>,
    pub models: Vec<ModelConfig>,
}
