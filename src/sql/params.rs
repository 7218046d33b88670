//! Convert serde_json::Value to bindable parameters and coerce request values per column.

use crate::error::AppError;
use crate::schema::{ColumnDescriptor, SemanticType};
use serde_json::Value;
use sqlx::encode::{Encode, IsNull};
use sqlx::postgres::{PgTypeInfo, Postgres};
use sqlx::Database;

/// Every parameter is sent as text; the SQL casts it (`$n::<type>`), so statement param types never vary.
#[derive(Clone, Debug, PartialEq)]
pub enum PgBindValue {
    Null,
    Text(String),
}

impl PgBindValue {
    pub fn from_json(v: &Value) -> Self {
        match v {
            Value::Null => PgBindValue::Null,
            Value::String(s) => PgBindValue::Text(s.clone()),
            Value::Bool(b) => PgBindValue::Text(b.to_string()),
            Value::Number(n) => PgBindValue::Text(n.to_string()),
            Value::Array(_) | Value::Object(_) => PgBindValue::Text(v.to_string()),
        }
    }
}

impl<'q> Encode<'q, Postgres> for PgBindValue {
    fn encode_by_ref(
        &self,
        buf: &mut <Postgres as Database>::ArgumentBuffer<'q>,
    ) -> Result<IsNull, Box<dyn std::error::Error + Send + Sync>> {
        match self {
            PgBindValue::Null => <Option<&str> as Encode<Postgres>>::encode_by_ref(&None, buf),
            PgBindValue::Text(s) => <&str as Encode<Postgres>>::encode_by_ref(&s.as_str(), buf),
        }
    }
}

impl sqlx::Type<Postgres> for PgBindValue {
    fn type_info() -> PgTypeInfo {
        PgTypeInfo::with_name("TEXT")
    }
}

/// Normalize a submitted value for `column`: empty strings clear non-text columns, JSON columns get JSON text.
pub fn coerce_for_column(column: &ColumnDescriptor, v: &Value) -> Value {
    match (&column.semantic_type, v) {
        (SemanticType::String, _) | (_, Value::Null) => v.clone(),
        (_, Value::String(s)) if s.trim().is_empty() => Value::Null,
        (SemanticType::Json, Value::String(s)) => {
            if serde_json::from_str::<Value>(s).is_ok() {
                v.clone()
            } else {
                Value::String(v.to_string())
            }
        }
        (SemanticType::Json, other) => Value::String(other.to_string()),
        _ => v.clone(),
    }
}

/// Parse a raw path or query value for `column`, rejecting values the column type cannot hold.
pub fn parse_for_column(column: &ColumnDescriptor, raw: &str) -> Result<Value, AppError> {
    let raw = raw.trim();
    let invalid = || AppError::BadRequest(format!("invalid value '{}' for '{}'", raw, column.name));
    match &column.semantic_type {
        SemanticType::Number => {
            if let Ok(n) = raw.parse::<i64>() {
                Ok(Value::from(n))
            } else if !column.is_integer() && raw.parse::<f64>().map(f64::is_finite).unwrap_or(false) {
                Ok(Value::String(raw.to_string()))
            } else {
                Err(invalid())
            }
        }
        SemanticType::Boolean => match raw.to_ascii_lowercase().as_str() {
            "true" | "1" | "t" => Ok(Value::Bool(true)),
            "false" | "0" | "f" => Ok(Value::Bool(false)),
            _ => Err(invalid()),
        },
        SemanticType::Date(crate::schema::DateMode::EpochSeconds | crate::schema::DateMode::EpochMillis) => {
            raw.parse::<i64>().map(Value::from).map_err(|_| invalid())
        }
        SemanticType::Enum(values) => {
            if values.iter().any(|v| v == raw) {
                Ok(Value::String(raw.to_string()))
            } else {
                Err(invalid())
            }
        }
        _ if column.sql_type.eq_ignore_ascii_case("uuid") => uuid::Uuid::parse_str(raw)
            .map(|u| Value::String(u.to_string()))
            .map_err(|_| invalid()),
        _ => Ok(Value::String(raw.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ColumnDef, ColumnMode, TableDef};
    use crate::schema::TableInfo;
    use serde_json::json;

    fn table() -> TableInfo {
        TableInfo::from_def(
            &TableDef::new("t")
                .column(ColumnDef::new("id", "uuid").primary_key())
                .column(ColumnDef::new("count", "integer"))
                .column(ColumnDef::new("price", "numeric"))
                .column(ColumnDef::new("active", "boolean"))
                .column(ColumnDef::new("meta", "jsonb"))
                .column(ColumnDef::new("note", "text"))
                .column(ColumnDef::new("at", "bigint").mode(ColumnMode::TimestampMs)),
        )
        .unwrap()
    }

    #[test]
    fn test_bind_values_are_text() {
        assert_eq!(PgBindValue::from_json(&json!(7)), PgBindValue::Text("7".into()));
        assert_eq!(PgBindValue::from_json(&json!(true)), PgBindValue::Text("true".into()));
        assert_eq!(PgBindValue::from_json(&json!({"a": 1})), PgBindValue::Text("{\"a\":1}".into()));
        assert_eq!(PgBindValue::from_json(&Value::Null), PgBindValue::Null);
    }

    #[test]
    fn test_coerce_for_column() {
        let t = table();
        assert_eq!(coerce_for_column(t.column("count").unwrap(), &json!("")), Value::Null);
        assert_eq!(coerce_for_column(t.column("note").unwrap(), &json!("")), json!(""));
        assert_eq!(
            coerce_for_column(t.column("meta").unwrap(), &json!({"k": [1]})),
            json!("{\"k\":[1]}")
        );
        assert_eq!(coerce_for_column(t.column("meta").unwrap(), &json!("{\"k\":1}")), json!("{\"k\":1}"));
        assert_eq!(coerce_for_column(t.column("meta").unwrap(), &json!("plain")), json!("\"plain\""));
    }

    #[test]
    fn test_parse_for_column() {
        let t = table();
        assert_eq!(parse_for_column(t.column("count").unwrap(), "12").unwrap(), json!(12));
        assert!(parse_for_column(t.column("count").unwrap(), "1.5").is_err());
        assert_eq!(parse_for_column(t.column("price").unwrap(), "1.5").unwrap(), json!("1.5"));
        assert_eq!(parse_for_column(t.column("active").unwrap(), "t").unwrap(), json!(true));
        assert!(parse_for_column(t.column("id").unwrap(), "nope").is_err());
        assert!(parse_for_column(t.column("id").unwrap(), "67e55044-10b1-426f-9247-bb680e5fe0c8").is_ok());
        assert!(matches!(
            parse_for_column(t.column("at").unwrap(), "yesterday"),
            Err(AppError::BadRequest(_))
        ));
        assert_eq!(parse_for_column(t.column("note").unwrap(), " hi ").unwrap(), json!("hi"));
    }
}
