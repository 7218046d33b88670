//! Paginated list query: joins, search, filters, sorting, and a COUNT sharing the same predicate.

use super::builder::{like_pattern, quoted, QueryBuf, MAIN_ALIAS};
use crate::config::{join_alias, FieldPath, ResolvedModel};
use crate::error::{AppError, ConfigError};
use crate::filters::filter_conditions;
use crate::schema::{ColumnDescriptor, ForeignKeyDescriptor, TableMap};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;

pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 1000;

/// List query keys with a fixed meaning. No filter may use one of these names.
pub const RESERVED_QUERY_KEYS: &[&str] = &["search", "ordering", "page", "size"];

/// Query-string parameters of a list request. Keys other than the reserved ones are filter values.
#[derive(Clone, Debug, Default)]
pub struct ListParams {
    pub search: Option<String>,
    pub ordering: Option<String>,
    pub page: Option<u32>,
    pub size: Option<u32>,
    pub filters: HashMap<String, String>,
}

fn parse_positive(key: &str, raw: &str) -> Result<Option<u32>, AppError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    raw.parse::<u32>()
        .map(Some)
        .map_err(|_| AppError::BadRequest(format!("'{}' must be a positive integer", key)))
}

impl ListParams {
    pub fn from_query(query: &HashMap<String, String>) -> Result<Self, AppError> {
        let mut params = ListParams::default();
        for (key, value) in query {
            match key.as_str() {
                "search" => params.search = Some(value.clone()),
                "ordering" => params.ordering = Some(value.clone()),
                "page" => params.page = parse_positive(key, value)?,
                "size" => params.size = parse_positive(key, value)?,
                _ => {
                    params.filters.insert(key.clone(), value.clone());
                }
            }
        }
        Ok(params)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_sql(self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

/// Split `key:asc|desc`. A missing direction means ascending.
pub fn parse_ordering(raw: &str) -> Result<(String, SortDirection), AppError> {
    let raw = raw.trim();
    let (key, dir) = match raw.rsplit_once(':') {
        Some((key, dir)) => (key.trim(), dir.trim()),
        None => (raw, "asc"),
    };
    let dir = match dir.to_ascii_lowercase().as_str() {
        "asc" | "" => SortDirection::Asc,
        "desc" => SortDirection::Desc,
        other => {
            return Err(AppError::BadRequest(format!(
                "invalid ordering direction '{}' (expected asc or desc)",
                other
            )))
        }
    };
    if key.is_empty() {
        return Err(AppError::BadRequest("ordering requires a column key".into()));
    }
    Ok((key.to_string(), dir))
}

/// Sort path for an ordering string, resolved only through the column's sort key.
pub fn resolve_ordering<'m>(model: &'m ResolvedModel, raw: &str) -> Result<(&'m FieldPath, SortDirection), AppError> {
    let (key, dir) = parse_ordering(raw)?;
    let column = model
        .list_column(&key)
        .ok_or_else(|| AppError::BadRequest(format!("unknown ordering column '{}'", key)))?;
    let path = column
        .sort
        .as_ref()
        .ok_or_else(|| AppError::BadRequest(format!("column '{}' is not sortable", key)))?;
    Ok((path, dir))
}

/// LEFT JOINs deduplicated by `<fk>_<foreignColumn>`, in first-use order.
#[derive(Default)]
struct Joins {
    entries: Vec<(String, ForeignKeyDescriptor)>,
}

impl Joins {
    fn add(&mut self, fk: &ForeignKeyDescriptor) -> String {
        let alias = join_alias(fk);
        if !self.entries.iter().any(|(a, _)| *a == alias) {
            self.entries.push((alias.clone(), fk.clone()));
        }
        quoted(&alias)
    }

    fn render(&self, tables: &TableMap) -> Result<String, AppError> {
        let mut out = String::new();
        for (alias, fk) in &self.entries {
            let foreign = tables.get(&fk.foreign_table).ok_or_else(|| ConfigError::MissingReference {
                kind: "table",
                id: fk.foreign_table.clone(),
            })?;
            let alias = quoted(alias);
            out.push_str(&format!(
                " LEFT JOIN {} {} ON {}.{} = {}.{}",
                foreign.qualified_name(),
                alias,
                alias,
                quoted(&fk.foreign_column),
                MAIN_ALIAS,
                quoted(&fk.column)
            ));
        }
        Ok(out)
    }
}

fn path_column<'a>(model: &'a ResolvedModel, tables: &'a TableMap, path: &FieldPath) -> Result<&'a ColumnDescriptor, AppError> {
    let found = match path {
        FieldPath::Column(c) => model.table.column(c),
        FieldPath::Related { foreign_key, column } => tables
            .get(&foreign_key.foreign_table)
            .and_then(|t| t.column(column)),
    };
    found.ok_or_else(|| {
        ConfigError::InvalidPath {
            model: model.label.clone(),
            path: path.accessor_key(),
        }
        .into()
    })
}

/// Table alias for a path, registering its join.
fn path_alias(joins: &mut Joins, path: &FieldPath) -> String {
    match path {
        FieldPath::Column(_) => MAIN_ALIAS.to_string(),
        FieldPath::Related { foreign_key, .. } => joins.add(foreign_key),
    }
}

/// The SELECT and COUNT for one list request. Both share joins, WHERE and params.
#[derive(Clone, Debug)]
pub struct ListQuery {
    pub select: QueryBuf,
    pub count: QueryBuf,
    pub select_all: bool,
    pub page: u32,
    pub size: u32,
}

pub fn build_list_query(model: &ResolvedModel, tables: &TableMap, params: &ListParams) -> Result<ListQuery, AppError> {
    let select_all = model.select_all();
    let mut joins = Joins::default();
    let mut q = QueryBuf::new();

    // Projection.
    let mut select_parts: Vec<String> = Vec::new();
    if select_all {
        for c in &model.table.columns {
            select_parts.push(format!("{} AS {}", c.select_expr(Some(MAIN_ALIAS)), quoted(&c.name)));
        }
        for col in &model.list_columns {
            if let Some(path) = &col.path {
                path_alias(&mut joins, path);
            }
        }
        for (alias, fk) in &joins.entries {
            let foreign = tables.get(&fk.foreign_table).ok_or_else(|| ConfigError::MissingReference {
                kind: "table",
                id: fk.foreign_table.clone(),
            })?;
            let alias = quoted(alias);
            for c in &foreign.columns {
                select_parts.push(format!(
                    "{} AS {}",
                    c.select_expr(Some(&alias)),
                    quoted(&format!("{}__{}", fk.column, c.name))
                ));
            }
        }
    } else {
        let mut seen: Vec<String> = Vec::new();
        for col in &model.list_columns {
            let Some(path) = &col.path else { continue };
            let key = path.accessor_key();
            if seen.contains(&key) {
                continue;
            }
            let column = path_column(model, tables, path)?;
            let alias = path_alias(&mut joins, path);
            select_parts.push(format!("{} AS {}", column.select_expr(Some(&alias)), quoted(&key)));
            seen.push(key);
        }
        if !seen.contains(&model.lookup_column.name) {
            select_parts.push(format!(
                "{} AS {}",
                model.lookup_column.select_expr(Some(MAIN_ALIAS)),
                quoted(&model.lookup_column.name)
            ));
        }
    }

    // Predicate: filters ANDed, then the search OR-group ANDed on.
    let mut where_parts = Vec::new();
    for cond in filter_conditions(&model.filters, &params.filters)? {
        where_parts.push(q.push_condition(&cond)?);
    }
    if let Some(term) = params.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        if !model.search_fields.is_empty() {
            let n = q.push_param(Value::String(like_pattern(term)));
            let mut ors = Vec::with_capacity(model.search_fields.len());
            for path in &model.search_fields {
                let column = path_column(model, tables, path)?;
                let alias = path_alias(&mut joins, path);
                ors.push(format!("{}.{}::text ILIKE ${}", alias, quoted(&column.name), n));
            }
            where_parts.push(format!("({})", ors.join(" OR ")));
        }
    }

    // Ordering, always ending on the lookup column for stable pages.
    let ordering = params
        .ordering
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .or(model.config.list.default_ordering.as_deref());
    let lookup_expr = format!("{}.{}", MAIN_ALIAS, quoted(&model.lookup_column.name));
    let mut order_parts = Vec::new();
    if let Some(raw) = ordering {
        let (path, dir) = resolve_ordering(model, raw)?;
        let column = path_column(model, tables, path)?;
        let alias = path_alias(&mut joins, path);
        let expr = format!("{}.{}", alias, quoted(&column.name));
        if expr != lookup_expr {
            order_parts.push(format!("{} {}", expr, dir.as_sql()));
            order_parts.push(format!("{} ASC", lookup_expr));
        } else {
            order_parts.push(format!("{} {}", expr, dir.as_sql()));
        }
    } else {
        order_parts.push(format!("{} ASC", lookup_expr));
    }

    let from = format!("{} {}{}", model.table.qualified_name(), MAIN_ALIAS, joins.render(tables)?);
    let where_clause = if where_parts.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", where_parts.join(" AND "))
    };

    let page = params.page.unwrap_or(1).max(1);
    let size = params
        .size
        .or(model.config.list.page_size)
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(1, MAX_PAGE_SIZE);
    let offset = u64::from(page - 1) * u64::from(size);

    let count = QueryBuf {
        sql: format!("SELECT COUNT(*) AS \"count\" FROM {}{}", from, where_clause),
        params: q.params.clone(),
    };
    q.sql = format!(
        "SELECT {} FROM {}{} ORDER BY {} LIMIT {} OFFSET {}",
        select_parts.join(", "),
        from,
        where_clause,
        order_parts.join(", "),
        size,
        offset
    );
    Ok(ListQuery {
        select: q,
        count,
        select_all,
        page,
        size,
    })
}

/// Run accessors (select-all mode) and project each row to the configured keys plus the lookup column.
pub fn project_rows(model: &ResolvedModel, rows: Vec<Map<String, Value>>, select_all: bool) -> Vec<Map<String, Value>> {
    if !select_all {
        return rows;
    }
    rows.into_iter()
        .map(|row| {
            let mut out = Map::new();
            for col in &model.list_columns {
                let v = match &col.accessor {
                    Some(f) => f.call(&row),
                    None => row.get(&col.accessor_key).cloned().unwrap_or(Value::Null),
                };
                out.insert(col.accessor_key.clone(), v);
            }
            let lookup = &model.lookup_column.name;
            if !out.contains_key(lookup) {
                out.insert(lookup.clone(), row.get(lookup).cloned().unwrap_or(Value::Null));
            }
            out
        })
        .collect()
}

/// Column definition for list UIs.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListColumnDef {
    pub id: String,
    pub accessor_key: String,
    pub header: String,
    #[serde(rename = "type")]
    pub column_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort_key: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListSpec {
    pub endpoint: String,
    pub title: String,
    pub columns: Vec<ListColumnDef>,
    pub lookup_column: String,
}

pub fn list_spec(model: &ResolvedModel, endpoint: String) -> ListSpec {
    ListSpec {
        endpoint,
        title: model.title.clone(),
        columns: model
            .list_columns
            .iter()
            .map(|c| ListColumnDef {
                id: c.accessor_key.clone(),
                accessor_key: c.accessor_key.clone(),
                header: c.header.clone(),
                column_type: c.column_type,
                sort_key: c.sort_key.clone(),
            })
            .collect(),
        lookup_column: model.lookup_column.name.clone(),
    }
}
