//! Resolves filter fields at registry build, then per request loads options and compiles conditions.

use super::{FilterKind, FilterOption, FilterSpec};
use crate::case::humanize;
use crate::config::{FilterConfig, FilterField, ModelRegistry, ResolvedFilter, ResolvedModel};
use crate::error::{AppError, ConfigError};
use crate::schema::{ColumnDescriptor, DateMode, SemanticType, TableInfo, TableMap};
use crate::sql::{
    display_value, exec, parse_for_column, quoted, select_choice_by_value, select_distinct_values, Condition,
    MAIN_ALIAS, RESERVED_QUERY_KEYS,
};
use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, NaiveTime, SecondsFormat, TimeZone};
use serde_json::Value;
use sqlx::PgPool;
use std::collections::HashMap;

fn unsupported(model: &str, field: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::UnsupportedFilter {
        model: model.to_string(),
        field: field.to_string(),
        reason: reason.into(),
    }
}

/// Filter type for a column when none is declared. `None` means the column cannot be filtered.
pub fn infer_kind(column: &ColumnDescriptor, has_foreign_key: bool) -> Option<FilterKind> {
    if has_foreign_key {
        return Some(FilterKind::Relation);
    }
    match column.semantic_type {
        SemanticType::Boolean => Some(FilterKind::Boolean),
        SemanticType::Date(_) => Some(FilterKind::Date),
        SemanticType::Enum(_) => Some(FilterKind::Select),
        SemanticType::String | SemanticType::Number => Some(FilterKind::Text),
        SemanticType::Blob | SemanticType::Json => None,
    }
}

fn date_mode(column: &ColumnDescriptor) -> Option<DateMode> {
    match column.semantic_type {
        SemanticType::Date(mode) => Some(mode),
        _ => None,
    }
}

/// Filterable fields for a model. With no fields configured, every boolean, enum and date column is used.
pub fn resolve_filters(
    model: &str,
    config: &FilterConfig,
    table: &TableInfo,
    tables: &TableMap,
) -> Result<Vec<ResolvedFilter>, ConfigError> {
    if !config.enabled {
        return Ok(Vec::new());
    }
    if config.fields.is_empty() {
        let auto = table
            .columns
            .iter()
            .filter(|c| !RESERVED_QUERY_KEYS.contains(&c.name.as_str()))
            .filter_map(|c| {
                let kind = match c.semantic_type {
                    SemanticType::Boolean => FilterKind::Boolean,
                    SemanticType::Enum(_) => FilterKind::Select,
                    SemanticType::Date(_) => FilterKind::Date,
                    _ => return None,
                };
                Some(ResolvedFilter {
                    field: c.name.clone(),
                    label: humanize(&c.name),
                    kind,
                    column: Some(c.clone()),
                    foreign_key: None,
                    date_mode: date_mode(c),
                    custom: None,
                })
            })
            .collect();
        return Ok(auto);
    }
    config
        .fields
        .iter()
        .map(|f| resolve_filter(model, f, table, tables))
        .collect()
}

fn resolve_filter(
    model: &str,
    field: &FilterField,
    table: &TableInfo,
    tables: &TableMap,
) -> Result<ResolvedFilter, ConfigError> {
    let label = field.label.clone().unwrap_or_else(|| humanize(&field.field));
    if field.kind == Some(FilterKind::Custom) || field.custom.is_some() {
        let custom = field
            .custom
            .clone()
            .ok_or_else(|| unsupported(model, &field.field, "custom filter has no resolver"))?;
        return Ok(ResolvedFilter {
            field: field.field.clone(),
            label,
            kind: FilterKind::Custom,
            column: table.column(&field.field).cloned(),
            foreign_key: None,
            date_mode: None,
            custom: Some(custom),
        });
    }

    let column = table
        .column(&field.field)
        .ok_or_else(|| unsupported(model, &field.field, format!("no column '{}' in '{}'", field.field, table.name)))?;
    let foreign_key = table.foreign_keys_of_column(&field.field).next().cloned();
    let kind = match field.kind {
        Some(kind) => kind,
        None => infer_kind(column, foreign_key.is_some()).ok_or_else(|| {
            unsupported(
                model,
                &field.field,
                format!("cannot filter {} columns", column.semantic_type.as_str()),
            )
        })?,
    };
    let mode = date_mode(column);
    match kind {
        FilterKind::Relation => {
            let fk = foreign_key
                .as_ref()
                .ok_or_else(|| unsupported(model, &field.field, "relation filter requires a foreign key"))?;
            if !tables.contains_key(&fk.foreign_table) {
                return Err(ConfigError::MissingReference {
                    kind: "table",
                    id: fk.foreign_table.clone(),
                });
            }
        }
        FilterKind::Date | FilterKind::DateRange => {
            if mode.is_none() {
                return Err(unsupported(model, &field.field, "date filter on a non-date column"));
            }
        }
        FilterKind::Select => {
            if !matches!(column.semantic_type, SemanticType::Enum(_)) {
                return Err(unsupported(model, &field.field, "select filter requires enum values"));
            }
        }
        FilterKind::Boolean => {
            if column.semantic_type != SemanticType::Boolean {
                return Err(unsupported(model, &field.field, "boolean filter on a non-boolean column"));
            }
        }
        FilterKind::Text => {
            if matches!(column.semantic_type, SemanticType::Blob | SemanticType::Json) {
                return Err(unsupported(model, &field.field, "text filter on a blob or json column"));
            }
        }
        FilterKind::Custom => return Err(unsupported(model, &field.field, "custom filter has no resolver")),
    }
    Ok(ResolvedFilter {
        field: field.field.clone(),
        label,
        kind,
        column: Some(column.clone()),
        foreign_key,
        date_mode: mode,
        custom: None,
    })
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

pub fn parse_date(raw: &str) -> Result<NaiveDate, AppError> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| AppError::BadRequest(format!("invalid date '{}' (expected YYYY-MM-DD)", raw)))
}

/// `start,end` with either side optional. A value without a comma is a single day.
pub fn parse_date_range(raw: &str) -> Result<(Option<NaiveDate>, Option<NaiveDate>), AppError> {
    let side = |s: &str| -> Result<Option<NaiveDate>, AppError> {
        let s = s.trim();
        if s.is_empty() {
            Ok(None)
        } else {
            parse_date(s).map(Some)
        }
    };
    match raw.split_once(',') {
        Some((start, end)) => Ok((side(start)?, side(end)?)),
        None => {
            let day = side(raw)?;
            Ok((day, day))
        }
    }
}

fn local_instant(naive: NaiveDateTime) -> DateTime<Local> {
    Local
        .from_local_datetime(&naive)
        .earliest()
        .unwrap_or_else(|| Local.from_utc_datetime(&naive))
}

/// Start of `day` (00:00:00 local) in the column's storage representation.
pub fn day_start(mode: DateMode, day: NaiveDate) -> Value {
    let at = day.and_time(NaiveTime::MIN);
    match mode {
        DateMode::Date => Value::String(day.format("%Y-%m-%d").to_string()),
        DateMode::Timestamp => Value::String(at.format("%Y-%m-%d %H:%M:%S").to_string()),
        DateMode::TimestampTz => Value::String(local_instant(at).to_rfc3339_opts(SecondsFormat::Secs, false)),
        DateMode::EpochSeconds => Value::from(local_instant(at).timestamp()),
        DateMode::EpochMillis => Value::from(local_instant(at).timestamp_millis()),
    }
}

/// End of `day` (23:59:59 local, plus the sub-second remainder the column can store).
pub fn day_end(mode: DateMode, day: NaiveDate) -> Result<Value, AppError> {
    let invalid = || AppError::BadRequest(format!("invalid date '{}'", day));
    Ok(match mode {
        DateMode::Date => Value::String(day.format("%Y-%m-%d").to_string()),
        DateMode::Timestamp => {
            let at = day.and_hms_micro_opt(23, 59, 59, 999_999).ok_or_else(invalid)?;
            Value::String(at.format("%Y-%m-%d %H:%M:%S%.6f").to_string())
        }
        DateMode::TimestampTz => {
            let at = day.and_hms_micro_opt(23, 59, 59, 999_999).ok_or_else(invalid)?;
            Value::String(local_instant(at).to_rfc3339_opts(SecondsFormat::Micros, false))
        }
        DateMode::EpochSeconds => {
            let at = day.and_hms_opt(23, 59, 59).ok_or_else(invalid)?;
            Value::from(local_instant(at).timestamp())
        }
        DateMode::EpochMillis => {
            let at = day.and_hms_milli_opt(23, 59, 59, 999).ok_or_else(invalid)?;
            Value::from(local_instant(at).timestamp_millis())
        }
    })
}

/// Inclusive day range condition on `column` (aliased under `main`).
pub fn date_range_condition(
    column: &ColumnDescriptor,
    mode: DateMode,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
) -> Result<Option<Condition>, AppError> {
    let expr = format!("{}.{}", MAIN_ALIAS, quoted(&column.name));
    let cast = &column.sql_type;
    Ok(match (start, end) {
        (Some(s), Some(e)) => Some(Condition::new(
            format!("{} BETWEEN ?::{} AND ?::{}", expr, cast, cast),
            vec![day_start(mode, s), day_end(mode, e)?],
        )),
        (Some(s), None) => Some(Condition::new(format!("{} >= ?::{}", expr, cast), vec![day_start(mode, s)])),
        (None, Some(e)) => Some(Condition::new(format!("{} <= ?::{}", expr, cast), vec![day_end(mode, e)?])),
        (None, None) => None,
    })
}

fn filter_condition(filter: &ResolvedFilter, raw: &str) -> Result<Vec<Condition>, AppError> {
    if let Some(custom) = &filter.custom {
        return custom.conditions(raw);
    }
    let Some(column) = &filter.column else {
        return Ok(Vec::new());
    };
    let expr = format!("{}.{}", MAIN_ALIAS, quoted(&column.name));
    let cast = &column.sql_type;
    let condition = match filter.kind {
        FilterKind::Boolean => {
            let b = parse_bool(raw)
                .ok_or_else(|| AppError::BadRequest(format!("invalid boolean '{}' for filter '{}'", raw, filter.field)))?;
            Some(Condition::new(format!("{} = ?::boolean", expr), vec![Value::Bool(b)]))
        }
        FilterKind::Text | FilterKind::Relation => {
            let value = parse_for_column(column, raw)?;
            Some(Condition::new(format!("{} = ?::{}", expr, cast), vec![value]))
        }
        FilterKind::Select => {
            if let SemanticType::Enum(values) = &column.semantic_type {
                if !values.iter().any(|v| v == raw) {
                    return Err(AppError::BadRequest(format!(
                        "invalid value '{}' for filter '{}'",
                        raw, filter.field
                    )));
                }
            }
            Some(Condition::new(format!("{} = ?::{}", expr, cast), vec![Value::String(raw.to_string())]))
        }
        FilterKind::Date => {
            let day = parse_date(raw)?;
            let mode = filter.date_mode.unwrap_or(DateMode::Date);
            date_range_condition(column, mode, Some(day), Some(day))?
        }
        FilterKind::DateRange => {
            let (start, end) = parse_date_range(raw)?;
            let mode = filter.date_mode.unwrap_or(DateMode::Date);
            date_range_condition(column, mode, start, end)?
        }
        FilterKind::Custom => None,
    };
    Ok(condition.into_iter().collect())
}

/// Conditions for every filter with a non-empty value in `values`. Callers AND them together.
pub fn filter_conditions(
    filters: &[ResolvedFilter],
    values: &HashMap<String, String>,
) -> Result<Vec<Condition>, AppError> {
    let mut out = Vec::new();
    for filter in filters {
        let Some(raw) = values.get(&filter.field).map(|s| s.trim()).filter(|s| !s.is_empty()) else {
            continue;
        };
        out.extend(filter_condition(filter, raw)?);
    }
    Ok(out)
}

fn precision(mode: Option<DateMode>) -> Option<&'static str> {
    match mode {
        Some(DateMode::EpochMillis) => Some("ms"),
        Some(DateMode::EpochSeconds) => Some("s"),
        _ => None,
    }
}

/// Filter specs for the list response. Text options reflect live distinct values, so they are never cached.
pub async fn load_filter_specs(
    pool: &PgPool,
    registry: &ModelRegistry,
    model: &ResolvedModel,
    values: &HashMap<String, String>,
) -> Result<Vec<FilterSpec>, AppError> {
    let mut specs = Vec::with_capacity(model.filters.len());
    for filter in &model.filters {
        let current = values
            .get(&filter.field)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        let mut spec = FilterSpec {
            field: filter.field.clone(),
            label: filter.label.clone(),
            kind: filter.kind,
            options: None,
            choices_endpoint: None,
            value: current.clone(),
            precision: precision(filter.date_mode),
        };
        match filter.kind {
            FilterKind::Boolean | FilterKind::Date | FilterKind::DateRange => {}
            FilterKind::Text => {
                if let Some(column) = &filter.column {
                    let q = select_distinct_values(&model.table, column);
                    let rows = exec::fetch_all(pool, &q).await.map_err(AppError::FetchFailed)?;
                    spec.options = Some(
                        rows.into_iter()
                            .map(|row| {
                                let value = row.get("value").cloned().unwrap_or(Value::Null);
                                FilterOption {
                                    label: display_value(&value),
                                    value,
                                    count: row.get("count").and_then(Value::as_i64),
                                }
                            })
                            .collect(),
                    );
                }
            }
            FilterKind::Select => {
                if let Some(SemanticType::Enum(values)) = filter.column.as_ref().map(|c| &c.semantic_type) {
                    spec.options = Some(
                        values
                            .iter()
                            .map(|v| FilterOption {
                                label: v.clone(),
                                value: Value::String(v.clone()),
                                count: None,
                            })
                            .collect(),
                    );
                }
            }
            FilterKind::Relation => {
                spec.choices_endpoint = Some(registry.choices_endpoint(&model.label, &filter.field));
                if let (Some(fk), Some(raw)) = (&filter.foreign_key, current.as_deref()) {
                    let foreign = registry
                        .table(&fk.foreign_table)
                        .ok_or_else(|| ConfigError::MissingReference {
                            kind: "table",
                            id: fk.foreign_table.clone(),
                        })?;
                    if let Some(value_col) = foreign.column(&fk.foreign_column) {
                        let value = parse_for_column(value_col, raw)?;
                        let q = select_choice_by_value(foreign, value_col, &foreign.label_column, value);
                        let rows = exec::fetch_all(pool, &q).await.map_err(AppError::FetchFailed)?;
                        spec.options = Some(
                            rows.into_iter()
                                .map(|row| FilterOption {
                                    label: row.get("label").map(display_value).unwrap_or_default(),
                                    value: row.get("value").cloned().unwrap_or(Value::Null),
                                    count: None,
                                })
                                .collect(),
                        );
                    }
                }
            }
            FilterKind::Custom => {
                if let Some(custom) = &filter.custom {
                    spec.options = Some(custom.options(pool).await?);
                }
            }
        }
        specs.push(spec);
    }
    Ok(specs)
}
