//! Generic CRUD execution against PostgreSQL for registered models.

use super::RequestValidator;
use crate::config::{ModelRegistry, ResolvedModel};
use crate::error::{translate_delete_error, translate_write_error, AppError};
use crate::filters::{load_filter_specs, FilterSpec};
use crate::form::{self, Choice, FormSpec};
use crate::pagination::Pagination;
use crate::relations::{take_submissions, RelationSynchronizer, Submission};
use crate::sql::{
    build_list_query, delete, display_value, exec, insert, list_spec, parse_for_column, project_rows,
    select_by_lookup, update, ListParams, ListSpec,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlx::PgPool;
use std::collections::HashMap;

#[derive(Debug, Serialize)]
pub struct ListResponse {
    pub results: Vec<Map<String, Value>>,
    pub pagination: Pagination,
    pub filters: Vec<FilterSpec>,
    pub spec: ListSpec,
}

/// Body of `POST <prefix>/bulk/:action`.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkRequest {
    pub model_label: String,
    #[serde(default)]
    pub row_lookups: Vec<Value>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BulkAction {
    Delete,
}

impl BulkAction {
    pub fn parse(action: &str) -> Result<Self, AppError> {
        match action {
            "delete" => Ok(BulkAction::Delete),
            other => Err(AppError::BadRequest(format!("unknown bulk action '{}'", other))),
        }
    }
}

fn ensure_enabled(enabled: bool, op: &str, model: &ResolvedModel) -> Result<(), AppError> {
    if enabled {
        Ok(())
    } else {
        Err(AppError::BadRequest(format!("{} is not allowed for model '{}'", op, model.label)))
    }
}

fn body_to_map(value: Value) -> Result<Map<String, Value>, AppError> {
    match value {
        Value::Object(m) => Ok(m),
        _ => Err(AppError::BadRequest("body must be a JSON object".into())),
    }
}

fn warn_unknown_fields(model: &ResolvedModel, body: &Map<String, Value>) {
    for key in body.keys() {
        if model.table.column(key).is_none() {
            tracing::warn!(model = %model.label, field = %key, "ignoring unknown field");
        }
    }
}

/// Split a write body into column values and relation submissions, then check both against the
/// model's rules. Relation rules see the normalised id list, so `[]` and `[null]` count as blank.
fn prepare_write<'m>(
    model: &'m ResolvedModel,
    body: Value,
    partial: bool,
) -> Result<(Map<String, Value>, Vec<Submission<'m>>), AppError> {
    let mut body = body_to_map(body)?;
    let submissions = take_submissions(model, &mut body)?;
    let mut checked = body.clone();
    for s in &submissions {
        checked.insert(s.field_id().to_string(), Value::Array(s.ids().to_vec()));
    }
    let validator = RequestValidator::new(&model.rules);
    if partial {
        validator.check_update(&checked)?;
    } else {
        validator.check_create(&checked)?;
    }
    warn_unknown_fields(model, &body);
    Ok((body, submissions))
}

fn lookup_value(model: &ResolvedModel, raw: &str) -> Result<Value, AppError> {
    parse_for_column(&model.lookup_column, raw)
}

pub struct CrudService;

impl CrudService {
    /// Paginated, filtered, searched and sorted rows plus filter and column specs.
    pub async fn list(
        pool: &PgPool,
        registry: &ModelRegistry,
        model: &ResolvedModel,
        query: &HashMap<String, String>,
    ) -> Result<ListResponse, AppError> {
        ensure_enabled(model.config.list.enabled, "list", model)?;
        let params = ListParams::from_query(query)?;
        let q = build_list_query(model, registry.tables(), &params)?;
        let (rows, count) = tokio::try_join!(exec::fetch_all(pool, &q.select), exec::fetch_count(pool, &q.count))
            .map_err(AppError::FetchFailed)?;
        let results = project_rows(model, rows, q.select_all);
        let filters = load_filter_specs(pool, registry, model, &params.filters).await?;
        Ok(ListResponse {
            results,
            pagination: Pagination::new(count.max(0) as u64, q.page, q.size),
            filters,
            spec: list_spec(model, registry.list_endpoint(&model.label)),
        })
    }

    /// Fetch one row by lookup value.
    pub async fn read(pool: &PgPool, model: &ResolvedModel, lookup: &str) -> Result<Map<String, Value>, AppError> {
        let q = select_by_lookup(model, lookup_value(model, lookup)?);
        exec::fetch_optional(pool, &q)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("{} '{}'", model.label, lookup)))
    }

    /// Insert one row and sync submitted relations, atomically. Returns the created row.
    pub async fn create(
        pool: &PgPool,
        registry: &ModelRegistry,
        model: &ResolvedModel,
        body: Value,
    ) -> Result<Map<String, Value>, AppError> {
        ensure_enabled(model.config.create.enabled, "create", model)?;
        let (body, submissions) = prepare_write(model, body, false)?;

        let q = insert(&model.table, &body);
        let mut tx = pool.begin().await?;
        let row = exec::fetch_optional(&mut *tx, &q)
            .await
            .map_err(|e| translate_write_error(e, &model.table.name))?
            .ok_or(AppError::Db(sqlx::Error::RowNotFound))?;
        RelationSynchronizer::new(registry.tables())
            .sync(&mut *tx, &row, &submissions)
            .await?;
        tx.commit().await?;
        tracing::debug!(model = %model.label, relations = submissions.len(), "created");
        Ok(row)
    }

    /// Update the row addressed by `lookup` and sync submitted relations, atomically.
    pub async fn update(
        pool: &PgPool,
        registry: &ModelRegistry,
        model: &ResolvedModel,
        lookup: &str,
        body: Value,
    ) -> Result<Map<String, Value>, AppError> {
        ensure_enabled(model.config.update.enabled, "update", model)?;
        let id = lookup_value(model, lookup)?;
        let (body, submissions) = prepare_write(model, body, true)?;

        let q = update(model, id, &body);
        let mut tx = pool.begin().await?;
        let row = exec::fetch_optional(&mut *tx, &q)
            .await
            .map_err(|e| translate_write_error(e, &model.table.name))?
            .ok_or_else(|| AppError::NotFound(format!("{} '{}'", model.label, lookup)))?;
        RelationSynchronizer::new(registry.tables())
            .sync(&mut *tx, &row, &submissions)
            .await?;
        tx.commit().await?;
        tracing::debug!(model = %model.label, relations = submissions.len(), "updated");
        Ok(row)
    }

    /// Delete the row addressed by `lookup`. Returns the deleted row.
    pub async fn delete(pool: &PgPool, model: &ResolvedModel, lookup: &str) -> Result<Map<String, Value>, AppError> {
        ensure_enabled(model.config.delete.enabled, "delete", model)?;
        let q = delete(model, lookup_value(model, lookup)?);
        exec::fetch_optional(pool, &q)
            .await
            .map_err(|e| translate_delete_error(e, &model.table.name))?
            .ok_or_else(|| AppError::NotFound(format!("{} '{}'", model.label, lookup)))
    }

    /// Run a bulk action in one transaction. Returns the number of affected rows.
    pub async fn bulk(
        pool: &PgPool,
        registry: &ModelRegistry,
        action: BulkAction,
        request: &BulkRequest,
    ) -> Result<u64, AppError> {
        let model = registry.model(&request.model_label)?;
        match action {
            BulkAction::Delete => {
                ensure_enabled(model.config.delete.enabled, "delete", model)?;
                let mut tx = pool.begin().await?;
                let mut deleted = 0;
                for lookup in &request.row_lookups {
                    let raw = display_value(lookup);
                    let q = delete(model, lookup_value(model, &raw)?);
                    let row = exec::fetch_optional(&mut *tx, &q)
                        .await
                        .map_err(|e| translate_delete_error(e, &model.table.name))?;
                    if row.is_some() {
                        deleted += 1;
                    } else {
                        tracing::warn!(model = %model.label, lookup = %raw, "bulk delete: no such record");
                    }
                }
                tx.commit().await?;
                Ok(deleted)
            }
        }
    }

    pub async fn form_spec(
        pool: &PgPool,
        registry: &ModelRegistry,
        model: &ResolvedModel,
        lookup: Option<&str>,
    ) -> Result<FormSpec, AppError> {
        form::form_spec(pool, registry, model, lookup).await
    }

    pub async fn choices(
        pool: &PgPool,
        registry: &ModelRegistry,
        model: &ResolvedModel,
        column: &str,
        search: Option<&str>,
    ) -> Result<Vec<Choice>, AppError> {
        form::choices(pool, registry, model, column, search).await
    }

    pub async fn choices_many(
        pool: &PgPool,
        registry: &ModelRegistry,
        model: &ResolvedModel,
        edge: &str,
        search: Option<&str>,
    ) -> Result<Vec<Choice>, AppError> {
        form::choices_many(pool, registry, model, edge, search).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_bulk_action_parse() {
        assert_eq!(BulkAction::parse("delete").unwrap(), BulkAction::Delete);
        assert!(matches!(BulkAction::parse("archive"), Err(AppError::BadRequest(_))));
    }

    #[test]
    fn test_bulk_request_shape() {
        let req: BulkRequest =
            serde_json::from_str(r#"{"modelLabel": "tags", "rowLookups": [1, "2"]}"#).unwrap();
        assert_eq!(req.model_label, "tags");
        assert_eq!(req.row_lookups.len(), 2);
    }

    fn registry_with_required_tags() -> ModelRegistry {
        use crate::config::{ColumnDef, FieldOverride, ModelConfig, TableDef, ValidationRule};
        let tables = vec![
            TableDef::new("posts")
                .column(ColumnDef::new("id", "serial").primary_key())
                .column(ColumnDef::new("title", "text").not_null()),
            TableDef::new("tags")
                .column(ColumnDef::new("id", "serial").primary_key())
                .column(ColumnDef::new("name", "text").not_null()),
            TableDef::new("post_tags")
                .column(ColumnDef::new("postId", "integer").not_null())
                .column(ColumnDef::new("tagId", "integer").not_null())
                .foreign_key("postId", "posts", "id")
                .foreign_key("tagId", "tags", "id"),
        ];
        let posts = ModelConfig::new("posts", "posts")
            .many_to_many("tags", "post_tags")
            .field(FieldOverride::new("___tags___tagId").rules(ValidationRule {
                required: Some(true),
                ..Default::default()
            }));
        ModelRegistry::build(tables, vec![posts], "/api").unwrap()
    }

    #[test]
    fn test_create_accepts_submitted_required_relation() {
        let reg = registry_with_required_tags();
        let model = reg.model("posts").unwrap();
        let (body, subs) = prepare_write(model, json!({"title": "Hello", "___tags___tagId": [1, 2]}), false).unwrap();
        assert_eq!(body, json!({"title": "Hello"}).as_object().cloned().unwrap());
        assert_eq!(subs.len(), 1);
        assert_eq!(subs[0].ids().len(), 2);
    }

    #[test]
    fn test_create_without_required_relation_is_rejected() {
        let reg = registry_with_required_tags();
        let model = reg.model("posts").unwrap();
        for body in [json!({"title": "Hello"}), json!({"title": "Hello", "___tags___tagId": [null]})] {
            let err = prepare_write(model, body, false).unwrap_err();
            assert!(err.to_string().contains("___tags___tagId is required"), "{}", err);
        }
    }

    #[test]
    fn test_update_cannot_clear_required_relation() {
        let reg = registry_with_required_tags();
        let model = reg.model("posts").unwrap();
        let err = prepare_write(model, json!({"___tags___tagId": []}), true).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        // Leaving the relation out of a partial update is fine.
        assert!(prepare_write(model, json!({"title": "Renamed"}), true).is_ok());
        assert!(prepare_write(model, json!({"___tags___tagId": ["3"]}), true).is_ok());
    }

    #[test]
    fn test_body_must_be_object() {
        assert!(body_to_map(serde_json::json!([1])).is_err());
        assert!(body_to_map(serde_json::json!({"a": 1})).is_ok());
    }
}
