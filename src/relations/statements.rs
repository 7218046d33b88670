//! SQL for relation membership: junction rows and child parentage.

use super::{M2MRelation, O2MRelation};
use crate::error::{AppError, ConfigError};
use crate::schema::TableInfo;
use crate::sql::{display_value, quoted, QueryBuf};
use serde_json::Value;

fn column_type<'a>(table: &'a TableInfo, column: &str) -> Result<&'a str, AppError> {
    table
        .column(column)
        .map(|c| c.sql_type.as_str())
        .ok_or_else(|| {
            ConfigError::MissingReference {
                kind: "column",
                id: format!("{}.{}", table.name, column),
            }
            .into()
        })
}

fn placeholders(q: &mut QueryBuf, ids: &[Value], sql_type: &str) -> String {
    ids.iter()
        .map(|v| q.placeholder(v.clone(), sql_type))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Canonical comparison key, so `7` and `"7"` are the same id.
pub fn id_key(v: &Value) -> String {
    display_value(v)
}

/// Ids from a submitted relation value: arrays as-is, null as empty, a scalar as one id. Nulls and duplicates dropped.
pub fn ids_from_value(v: &Value) -> Vec<Value> {
    let items: Vec<Value> = match v {
        Value::Null => Vec::new(),
        Value::Array(items) => items.clone(),
        Value::String(s) if s.trim().is_empty() => Vec::new(),
        other => vec![other.clone()],
    };
    let mut seen = std::collections::HashSet::new();
    items
        .into_iter()
        .filter(|v| !v.is_null())
        .filter(|v| seen.insert(id_key(v)))
        .collect()
}

/// `(to_delete, to_insert)`: existing ids not submitted, submitted ids not existing.
pub fn diff_ids(existing: &[Value], submitted: &[Value]) -> (Vec<Value>, Vec<Value>) {
    let existing_keys: std::collections::HashSet<String> = existing.iter().map(id_key).collect();
    let submitted_keys: std::collections::HashSet<String> = submitted.iter().map(id_key).collect();
    let to_delete = existing
        .iter()
        .filter(|v| !submitted_keys.contains(&id_key(v)))
        .cloned()
        .collect();
    let to_insert = submitted
        .iter()
        .filter(|v| !existing_keys.contains(&id_key(v)))
        .cloned()
        .collect();
    (to_delete, to_insert)
}

pub fn m2m_delete_all(rel: &M2MRelation, junction: &TableInfo, self_value: Value) -> Result<QueryBuf, AppError> {
    let mut q = QueryBuf::new();
    let ph = q.placeholder(self_value, column_type(junction, &rel.self_column)?);
    q.sql = format!(
        "DELETE FROM {} WHERE {} = {}",
        junction.qualified_name(),
        quoted(&rel.self_column),
        ph
    );
    Ok(q)
}

/// Junction rows removed for `other_ids` only. `None` when there is nothing to delete.
pub fn m2m_delete_some(
    rel: &M2MRelation,
    junction: &TableInfo,
    self_value: Value,
    other_ids: &[Value],
) -> Result<Option<QueryBuf>, AppError> {
    if other_ids.is_empty() {
        return Ok(None);
    }
    let mut q = QueryBuf::new();
    let self_ph = q.placeholder(self_value, column_type(junction, &rel.self_column)?);
    let list = placeholders(&mut q, other_ids, column_type(junction, &rel.other_column)?);
    q.sql = format!(
        "DELETE FROM {} WHERE {} = {} AND {} IN ({})",
        junction.qualified_name(),
        quoted(&rel.self_column),
        self_ph,
        quoted(&rel.other_column),
        list
    );
    Ok(Some(q))
}

/// One junction row per other id, self value bound once. `None` when `other_ids` is empty.
pub fn m2m_insert(
    rel: &M2MRelation,
    junction: &TableInfo,
    self_value: Value,
    other_ids: &[Value],
) -> Result<Option<QueryBuf>, AppError> {
    if other_ids.is_empty() {
        return Ok(None);
    }
    let mut q = QueryBuf::new();
    let self_ph = q.placeholder(self_value, column_type(junction, &rel.self_column)?);
    let other_type = column_type(junction, &rel.other_column)?;
    let rows: Vec<String> = other_ids
        .iter()
        .map(|v| format!("({}, {})", self_ph, q.placeholder(v.clone(), other_type)))
        .collect();
    q.sql = format!(
        "INSERT INTO {} ({}, {}) VALUES {}",
        junction.qualified_name(),
        quoted(&rel.self_column),
        quoted(&rel.other_column),
        rows.join(", ")
    );
    Ok(Some(q))
}

/// Other ids currently linked to the self value.
pub fn m2m_existing(rel: &M2MRelation, junction: &TableInfo, self_value: Value) -> Result<QueryBuf, AppError> {
    let mut q = QueryBuf::new();
    let ph = q.placeholder(self_value, column_type(junction, &rel.self_column)?);
    q.sql = format!(
        "SELECT {} AS \"value\" FROM {} WHERE {} = {} AND {} IS NOT NULL",
        quoted(&rel.other_column),
        junction.qualified_name(),
        quoted(&rel.self_column),
        ph,
        quoted(&rel.other_column)
    );
    Ok(q)
}

/// `{value, label}` for every other-side record linked to the self value.
pub fn m2m_members(
    rel: &M2MRelation,
    junction: &TableInfo,
    other: &TableInfo,
    self_value: Value,
) -> Result<QueryBuf, AppError> {
    let mut q = QueryBuf::new();
    let ph = q.placeholder(self_value, column_type(junction, &rel.self_column)?);
    let value_expr = other
        .column(&rel.other_foreign_column)
        .map(|c| c.select_expr(Some("o")))
        .unwrap_or_else(|| format!("o.{}", quoted(&rel.other_foreign_column)));
    q.sql = format!(
        "SELECT {} AS \"value\", o.{}::text AS \"label\" FROM {} j JOIN {} o ON o.{} = j.{} WHERE j.{} = {} ORDER BY 2",
        value_expr,
        quoted(&other.label_column),
        junction.qualified_name(),
        other.qualified_name(),
        quoted(&rel.other_foreign_column),
        quoted(&rel.other_column),
        quoted(&rel.self_column),
        ph
    );
    Ok(q)
}

/// `{value, label}` for every child currently pointing at the parent value.
pub fn o2m_members(rel: &O2MRelation, child: &TableInfo, parent_value: Value) -> Result<QueryBuf, AppError> {
    let mut q = QueryBuf::new();
    let ph = q.placeholder(parent_value, column_type(child, &rel.child_foreign_column)?);
    let value_expr = child
        .column(&rel.child_primary_column)
        .map(|c| c.select_expr(None))
        .unwrap_or_else(|| quoted(&rel.child_primary_column));
    q.sql = format!(
        "SELECT {} AS \"value\", {}::text AS \"label\" FROM {} WHERE {} = {} ORDER BY 2",
        value_expr,
        quoted(&child.label_column),
        child.qualified_name(),
        quoted(&rel.child_foreign_column),
        ph
    );
    Ok(q)
}

/// Phase 1: detach children of the parent whose ids are not in `keep`.
pub fn o2m_unset(
    rel: &O2MRelation,
    child: &TableInfo,
    parent_value: Value,
    keep: &[Value],
) -> Result<QueryBuf, AppError> {
    let mut q = QueryBuf::new();
    let ph = q.placeholder(parent_value, column_type(child, &rel.child_foreign_column)?);
    let mut sql = format!(
        "UPDATE {} SET {} = NULL WHERE {} = {}",
        child.qualified_name(),
        quoted(&rel.child_foreign_column),
        quoted(&rel.child_foreign_column),
        ph
    );
    if !keep.is_empty() {
        let list = placeholders(&mut q, keep, column_type(child, &rel.child_primary_column)?);
        sql.push_str(&format!(" AND {} NOT IN ({})", quoted(&rel.child_primary_column), list));
    }
    q.sql = sql;
    Ok(q)
}

/// Phase 2: attach the submitted children. `None` when nothing was submitted.
pub fn o2m_set(
    rel: &O2MRelation,
    child: &TableInfo,
    parent_value: Value,
    ids: &[Value],
) -> Result<Option<QueryBuf>, AppError> {
    if ids.is_empty() {
        return Ok(None);
    }
    let mut q = QueryBuf::new();
    let ph = q.placeholder(parent_value, column_type(child, &rel.child_foreign_column)?);
    let list = placeholders(&mut q, ids, column_type(child, &rel.child_primary_column)?);
    q.sql = format!(
        "UPDATE {} SET {} = {} WHERE {} IN ({})",
        child.qualified_name(),
        quoted(&rel.child_foreign_column),
        ph,
        quoted(&rel.child_primary_column),
        list
    );
    Ok(Some(q))
}
