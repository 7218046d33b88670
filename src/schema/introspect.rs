//! Column and foreign-key descriptors derived from table definitions. Pure, no I/O.

use crate::config::{ColumnDef, ColumnMode, TableDef};
use crate::error::ConfigError;
use crate::sql::{qualified_table, quoted};
use std::collections::HashMap;

/// How a date-like column stores its value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DateMode {
    Date,
    Timestamp,
    TimestampTz,
    EpochSeconds,
    EpochMillis,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SemanticType {
    String,
    Number,
    Boolean,
    Date(DateMode),
    Enum(Vec<String>),
    Blob,
    Json,
}

impl SemanticType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SemanticType::String => "string",
            SemanticType::Number => "number",
            SemanticType::Boolean => "boolean",
            SemanticType::Date(_) => "date",
            SemanticType::Enum(_) => "enum",
            SemanticType::Blob => "blob",
            SemanticType::Json => "json",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ColumnDescriptor {
    pub name: String,
    pub semantic_type: SemanticType,
    /// Type used in `$n::<type>` casts.
    pub sql_type: String,
    pub nullable: bool,
    pub is_primary: bool,
    pub is_unique: bool,
    pub has_default: bool,
}

impl ColumnDescriptor {
    /// Select expression for this column, optionally qualified by `alias`. Enums and numerics come back as text.
    pub fn select_expr(&self, alias: Option<&str>) -> String {
        let expr = match alias {
            Some(a) => format!("{}.{}", a, quoted(&self.name)),
            None => quoted(&self.name),
        };
        let lower = self.sql_type.to_lowercase();
        if matches!(self.semantic_type, SemanticType::Enum(_))
            || lower.starts_with("numeric")
            || lower.starts_with("decimal")
            || lower == "money"
        {
            format!("{}::text", expr)
        } else {
            expr
        }
    }

    pub fn is_integer(&self) -> bool {
        is_integer(&self.sql_type.trim().to_lowercase())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ForeignKeyDescriptor {
    pub column: String,
    pub foreign_column: String,
    pub foreign_table: String,
}

const LABEL_PRIORITY: &[&str] = &["name", "title", "label", "slug"];

fn is_serial(lower: &str) -> bool {
    matches!(lower, "serial" | "bigserial" | "smallserial" | "serial4" | "serial8" | "serial2")
}

fn is_integer(lower: &str) -> bool {
    ["int", "integer", "bigint", "smallint", "int2", "int4", "int8"].contains(&lower) || is_serial(lower)
}

pub fn semantic_type_of(col: &ColumnDef) -> SemanticType {
    let lower = col.type_.trim().to_lowercase();
    if !col.enum_values.is_empty() {
        return SemanticType::Enum(col.enum_values.clone());
    }
    if let Some(mode) = col.mode {
        if is_integer(&lower) {
            return SemanticType::Date(match mode {
                ColumnMode::Timestamp => DateMode::EpochSeconds,
                ColumnMode::TimestampMs => DateMode::EpochMillis,
            });
        }
    }
    if lower == "bool" || lower == "boolean" {
        SemanticType::Boolean
    } else if lower == "date" {
        SemanticType::Date(DateMode::Date)
    } else if lower.starts_with("timestamptz") || lower.starts_with("timestamp with time zone") {
        SemanticType::Date(DateMode::TimestampTz)
    } else if lower.starts_with("timestamp") {
        SemanticType::Date(DateMode::Timestamp)
    } else if lower == "bytea" || lower == "blob" {
        SemanticType::Blob
    } else if lower == "json" || lower == "jsonb" {
        SemanticType::Json
    } else if is_integer(&lower)
        || ["numeric", "decimal", "real", "double", "float", "money"]
            .iter()
            .any(|p| lower.starts_with(p))
    {
        SemanticType::Number
    } else {
        SemanticType::String
    }
}

fn cast_type(col: &ColumnDef) -> String {
    match col.type_.trim().to_lowercase().as_str() {
        "serial" | "serial4" => "integer".into(),
        "bigserial" | "serial8" => "bigint".into(),
        "smallserial" | "serial2" => "smallint".into(),
        _ => col.type_.trim().to_string(),
    }
}

pub fn columns_of(table: &TableDef) -> Result<Vec<ColumnDescriptor>, ConfigError> {
    if table.columns.is_empty() {
        return Err(ConfigError::EmptyTable(table.name.clone()));
    }
    Ok(table
        .columns
        .iter()
        .map(|c| {
            let lower = c.type_.trim().to_lowercase();
            ColumnDescriptor {
                name: c.name.clone(),
                semantic_type: semantic_type_of(c),
                sql_type: cast_type(c),
                nullable: c.nullable && !c.primary_key,
                is_primary: c.primary_key,
                is_unique: c.unique,
                has_default: c.default.is_some() || is_serial(&lower),
            }
        })
        .collect())
}

pub fn foreign_keys_of(table: &TableDef) -> Vec<ForeignKeyDescriptor> {
    table
        .foreign_keys
        .iter()
        .map(|fk| ForeignKeyDescriptor {
            column: fk.column.clone(),
            foreign_column: fk.foreign_column.clone(),
            foreign_table: fk.foreign_table.clone(),
        })
        .collect()
}

pub fn foreign_keys_of_column(table: &TableDef, column_name: &str) -> Vec<ForeignKeyDescriptor> {
    foreign_keys_of(table)
        .into_iter()
        .filter(|fk| fk.column == column_name)
        .collect()
}

/// Label column by priority: name, title, label, slug, else the first column.
pub fn label_column(columns: &[ColumnDescriptor]) -> Option<&str> {
    LABEL_PRIORITY
        .iter()
        .find_map(|p| columns.iter().find(|c| c.name == *p))
        .or_else(|| columns.first())
        .map(|c| c.name.as_str())
}

/// Descriptors for one table, computed once at registry build.
#[derive(Clone, Debug)]
pub struct TableInfo {
    pub schema: String,
    pub name: String,
    pub columns: Vec<ColumnDescriptor>,
    pub foreign_keys: Vec<ForeignKeyDescriptor>,
    pub primary_key: Option<String>,
    pub label_column: String,
}

pub type TableMap = HashMap<String, TableInfo>;

impl TableInfo {
    pub fn from_def(def: &TableDef) -> Result<Self, ConfigError> {
        let columns = columns_of(def)?;
        let label = label_column(&columns)
            .map(str::to_string)
            .ok_or_else(|| ConfigError::EmptyTable(def.name.clone()))?;
        let primary_key = columns.iter().find(|c| c.is_primary).map(|c| c.name.clone());
        Ok(TableInfo {
            schema: def.schema.clone(),
            name: def.name.clone(),
            foreign_keys: foreign_keys_of(def),
            columns,
            primary_key,
            label_column: label,
        })
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn foreign_keys_of_column<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a ForeignKeyDescriptor> + 'a {
        self.foreign_keys.iter().filter(move |fk| fk.column == name)
    }

    pub fn primary_column(&self) -> Option<&ColumnDescriptor> {
        self.primary_key.as_deref().and_then(|pk| self.column(pk))
    }

    pub fn qualified_name(&self) -> String {
        qualified_table(&self.schema, &self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn posts() -> TableDef {
        TableDef::new("posts")
            .column(ColumnDef::new("id", "serial").primary_key())
            .column(ColumnDef::new("title", "text").not_null())
            .column(ColumnDef::new("status", "post_status").enum_values(["draft", "published"]))
            .column(ColumnDef::new("published", "boolean").default_sql("false"))
            .column(ColumnDef::new("createdAt", "bigint").mode(ColumnMode::TimestampMs))
            .column(ColumnDef::new("authorId", "integer"))
            .column(ColumnDef::new("editorId", "integer"))
            .foreign_key("authorId", "users", "id")
            .foreign_key("editorId", "users", "id")
    }

    #[test]
    fn test_columns_of_maps_semantic_types() {
        let cols = columns_of(&posts()).unwrap();
        assert_eq!(cols.len(), 7);
        assert_eq!(cols[0].semantic_type, SemanticType::Number);
        assert_eq!(cols[0].sql_type, "integer");
        assert!(cols[0].is_primary && cols[0].has_default && !cols[0].nullable);
        assert_eq!(cols[1].semantic_type, SemanticType::String);
        assert!(!cols[1].nullable && !cols[1].has_default);
        assert_eq!(
            cols[2].semantic_type,
            SemanticType::Enum(vec!["draft".into(), "published".into()])
        );
        assert_eq!(cols[3].semantic_type, SemanticType::Boolean);
        assert!(cols[3].has_default);
        assert_eq!(cols[4].semantic_type, SemanticType::Date(DateMode::EpochMillis));
    }

    #[test]
    fn test_other_type_names() {
        let ty = |t: &str| semantic_type_of(&ColumnDef::new("c", t));
        assert_eq!(ty("timestamptz"), SemanticType::Date(DateMode::TimestampTz));
        assert_eq!(ty("timestamp(3)"), SemanticType::Date(DateMode::Timestamp));
        assert_eq!(ty("date"), SemanticType::Date(DateMode::Date));
        assert_eq!(ty("jsonb"), SemanticType::Json);
        assert_eq!(ty("bytea"), SemanticType::Blob);
        assert_eq!(ty("numeric(10,2)"), SemanticType::Number);
        assert_eq!(ty("varchar(255)"), SemanticType::String);
        assert_eq!(ty("uuid"), SemanticType::String);
    }

    #[test]
    fn test_empty_table_is_fatal() {
        assert!(matches!(columns_of(&TableDef::new("nothing")), Err(ConfigError::EmptyTable(_))));
    }

    #[test]
    fn test_foreign_keys_of_column() {
        let t = posts();
        assert_eq!(foreign_keys_of(&t).len(), 2);
        let fks = foreign_keys_of_column(&t, "authorId");
        assert_eq!(fks.len(), 1);
        assert_eq!(fks[0].foreign_table, "users");
        assert_eq!(fks[0].foreign_column, "id");
        assert!(foreign_keys_of_column(&t, "title").is_empty());
    }

    #[test]
    fn test_label_column_priority() {
        let t = TableDef::new("t")
            .column(ColumnDef::new("id", "serial").primary_key())
            .column(ColumnDef::new("slug", "text"))
            .column(ColumnDef::new("title", "text"));
        let cols = columns_of(&t).unwrap();
        assert_eq!(label_column(&cols), Some("title"));

        let t = TableDef::new("t").column(ColumnDef::new("code", "text"));
        let cols = columns_of(&t).unwrap();
        assert_eq!(label_column(&cols), Some("code"));
    }

    #[test]
    fn test_select_expr_casts_enums_to_text() {
        let info = TableInfo::from_def(&posts()).unwrap();
        assert_eq!(info.column("status").unwrap().select_expr(Some("main")), "main.\"status\"::text");
        assert_eq!(info.column("title").unwrap().select_expr(None), "\"title\"");
        assert_eq!(info.label_column, "title");
        assert_eq!(info.primary_key.as_deref(), Some("id"));
        assert_eq!(info.qualified_name(), "\"public\".\"posts\"");
    }
}
