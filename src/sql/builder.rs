//! Builds parameterized SELECT, INSERT, UPDATE, DELETE for resolved models.

use super::params::coerce_for_column;
use crate::config::ResolvedModel;
use crate::error::{AppError, ConfigError};
use crate::schema::{ColumnDescriptor, TableInfo};
use serde_json::{Map, Value};

/// Alias of the listed table in list queries and custom filter conditions.
pub const MAIN_ALIAS: &str = "main";

/// Quote identifier for PostgreSQL (safe: only from validated config).
pub fn quoted(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

/// Full qualified table name.
pub fn qualified_table(schema: &str, table: &str) -> String {
    format!("{}.{}", quoted(schema), quoted(table))
}

/// A WHERE fragment with `?` placeholders, bound in order.
#[derive(Clone, Debug, PartialEq)]
pub struct Condition {
    pub sql: String,
    pub params: Vec<Value>,
}

impl Condition {
    pub fn new(sql: impl Into<String>, params: Vec<Value>) -> Self {
        Condition {
            sql: sql.into(),
            params,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct QueryBuf {
    pub sql: String,
    pub params: Vec<Value>,
}

impl QueryBuf {
    pub fn new() -> Self {
        QueryBuf::default()
    }

    pub fn push_param(&mut self, v: Value) -> u32 {
        let n = self.params.len() as u32 + 1;
        self.params.push(v);
        n
    }

    /// Bind `v` and return its placeholder cast to `sql_type`.
    pub fn placeholder(&mut self, v: Value, sql_type: &str) -> String {
        let n = self.push_param(v);
        format!("${}::{}", n, sql_type)
    }

    /// Bind a condition's params and return its SQL with `?` renumbered to `$n`.
    pub fn push_condition(&mut self, cond: &Condition) -> Result<String, AppError> {
        let expected = cond.sql.matches('?').count();
        if expected != cond.params.len() {
            return Err(ConfigError::Validation(format!(
                "condition '{}' has {} placeholders but {} params",
                cond.sql,
                expected,
                cond.params.len()
            ))
            .into());
        }
        let mut out = String::with_capacity(cond.sql.len() + 8);
        let mut params = cond.params.iter();
        for ch in cond.sql.chars() {
            if ch == '?' {
                if let Some(v) = params.next() {
                    let n = self.push_param(v.clone());
                    out.push('$');
                    out.push_str(&n.to_string());
                    continue;
                }
            }
            out.push(ch);
        }
        Ok(out)
    }
}

/// `expr AS "name"` for every column, optionally qualified by `alias`.
pub fn select_column_list(table: &TableInfo, alias: Option<&str>) -> String {
    table
        .columns
        .iter()
        .map(|c| format!("{} AS {}", c.select_expr(alias), quoted(&c.name)))
        .collect::<Vec<_>>()
        .join(", ")
}

fn lookup_clause(q: &mut QueryBuf, lookup: &ColumnDescriptor, value: Value) -> String {
    let ph = q.placeholder(value, &lookup.sql_type);
    format!("{} = {}", quoted(&lookup.name), ph)
}

/// SELECT one row by the model's lookup column.
pub fn select_by_lookup(model: &ResolvedModel, lookup: Value) -> QueryBuf {
    let mut q = QueryBuf::new();
    let cond = lookup_clause(&mut q, &model.lookup_column, lookup);
    q.sql = format!(
        "SELECT {} FROM {} WHERE {}",
        select_column_list(&model.table, None),
        model.table.qualified_name(),
        cond
    );
    q
}

/// INSERT from body. Columns absent from the body are omitted when they have a default, else bound as NULL.
pub fn insert(table: &TableInfo, body: &Map<String, Value>) -> QueryBuf {
    let mut q = QueryBuf::new();
    let mut cols = Vec::new();
    let mut placeholders = Vec::new();
    for c in &table.columns {
        let val = match body.get(&c.name) {
            Some(v) => coerce_for_column(c, v),
            None if c.has_default => continue,
            None => Value::Null,
        };
        cols.push(quoted(&c.name));
        placeholders.push(q.placeholder(val, &c.sql_type));
    }
    let returning = select_column_list(table, None);
    q.sql = if cols.is_empty() {
        format!("INSERT INTO {} DEFAULT VALUES RETURNING {}", table.qualified_name(), returning)
    } else {
        format!(
            "INSERT INTO {} ({}) VALUES ({}) RETURNING {}",
            table.qualified_name(),
            cols.join(", "),
            placeholders.join(", "),
            returning
        )
    };
    q
}

/// UPDATE by lookup: SET only non-primary columns present in body. With nothing to set this is a plain SELECT.
pub fn update(model: &ResolvedModel, lookup: Value, body: &Map<String, Value>) -> QueryBuf {
    let mut q = QueryBuf::new();
    let mut sets = Vec::new();
    for c in &model.table.columns {
        if c.is_primary {
            continue;
        }
        let Some(v) = body.get(&c.name) else { continue };
        let rhs = q.placeholder(coerce_for_column(c, v), &c.sql_type);
        sets.push(format!("{} = {}", quoted(&c.name), rhs));
    }
    if sets.is_empty() {
        return select_by_lookup(model, lookup);
    }
    let cond = lookup_clause(&mut q, &model.lookup_column, lookup);
    q.sql = format!(
        "UPDATE {} SET {} WHERE {} RETURNING {}",
        model.table.qualified_name(),
        sets.join(", "),
        cond,
        select_column_list(&model.table, None)
    );
    q
}

/// DELETE by lookup, returning the deleted row.
pub fn delete(model: &ResolvedModel, lookup: Value) -> QueryBuf {
    let mut q = QueryBuf::new();
    let cond = lookup_clause(&mut q, &model.lookup_column, lookup);
    q.sql = format!(
        "DELETE FROM {} WHERE {} RETURNING {}",
        model.table.qualified_name(),
        cond,
        select_column_list(&model.table, None)
    );
    q
}

/// Distinct non-null values of one column with their row counts, for text filter options.
pub fn select_distinct_values(table: &TableInfo, column: &ColumnDescriptor) -> QueryBuf {
    const MAX_OPTIONS: u32 = 200;
    let mut q = QueryBuf::new();
    q.sql = format!(
        "SELECT {} AS \"value\", COUNT(*) AS \"count\" FROM {} WHERE {} IS NOT NULL GROUP BY 1 ORDER BY 1 LIMIT {}",
        column.select_expr(None),
        table.qualified_name(),
        quoted(&column.name),
        MAX_OPTIONS
    );
    q
}

/// `{value, label}` choices from a related table, optionally narrowed by a label search.
pub fn select_choices(
    table: &TableInfo,
    value_column: &ColumnDescriptor,
    label_column: &str,
    search: Option<&str>,
) -> QueryBuf {
    const MAX_CHOICES: u32 = 100;
    let mut q = QueryBuf::new();
    let label = format!("{}::text", quoted(label_column));
    let where_clause = match search.map(str::trim).filter(|s| !s.is_empty()) {
        Some(term) => {
            let n = q.push_param(Value::String(like_pattern(term)));
            format!(" WHERE {} ILIKE ${}", label, n)
        }
        None => String::new(),
    };
    q.sql = format!(
        "SELECT {} AS \"value\", {} AS \"label\" FROM {}{} ORDER BY 2 LIMIT {}",
        value_column.select_expr(None),
        label,
        table.qualified_name(),
        where_clause,
        MAX_CHOICES
    );
    q
}

/// The single `{value, label}` choice for `value`, used to preload a current selection.
pub fn select_choice_by_value(
    table: &TableInfo,
    value_column: &ColumnDescriptor,
    label_column: &str,
    value: Value,
) -> QueryBuf {
    let mut q = QueryBuf::new();
    let ph = q.placeholder(value, &value_column.sql_type);
    q.sql = format!(
        "SELECT {} AS \"value\", {}::text AS \"label\" FROM {} WHERE {} = {} LIMIT 1",
        value_column.select_expr(None),
        quoted(label_column),
        table.qualified_name(),
        quoted(&value_column.name),
        ph
    );
    q
}

/// `%term%` with LIKE wildcards in the term escaped.
pub fn like_pattern(term: &str) -> String {
    let mut out = String::with_capacity(term.len() + 2);
    out.push('%');
    for ch in term.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(ch);
    }
    out.push('%');
    out
}
