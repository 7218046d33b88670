//! Form field derivation, current-value preloading and relation choices.

use super::{Choice, FormFieldSpec, FormFieldType, FormSpec, RelationConfig, RelationKind};
use crate::case::humanize;
use crate::config::{FieldOverride, ModelRegistry, ResolvedModel};
use crate::error::{AppError, ConfigError};
use crate::field_id::FieldId;
use crate::relations::statements::{m2m_members, o2m_members};
use crate::schema::{ColumnDescriptor, SemanticType, TableInfo};
use crate::sql::{display_value, exec, parse_for_column, select_by_lookup, select_choice_by_value, select_choices};
use serde_json::{Map, Value};
use sqlx::PgPool;

pub fn column_field_type(column: &ColumnDescriptor) -> FormFieldType {
    match column.semantic_type {
        SemanticType::String => FormFieldType::Text,
        SemanticType::Number => FormFieldType::Number,
        SemanticType::Boolean => FormFieldType::Boolean,
        SemanticType::Enum(_) => FormFieldType::Select,
        SemanticType::Date(_) => FormFieldType::Date,
        SemanticType::Blob => FormFieldType::Blob,
        SemanticType::Json => FormFieldType::Json,
    }
}

fn override_for<'m>(model: &'m ResolvedModel, name: &str) -> Option<&'m FieldOverride> {
    model.config.fields.iter().flatten().find(|o| o.name == name)
}

/// Columns shown in the form. With overrides, only overridden columns in their order; the primary key
/// is appended when collection relations exist, because syncing them needs it.
fn visible_columns(model: &ResolvedModel) -> Vec<&ColumnDescriptor> {
    let Some(overrides) = &model.config.fields else {
        return model.table.columns.iter().collect();
    };
    let mut cols: Vec<&ColumnDescriptor> = overrides
        .iter()
        .filter_map(|o| match FieldId::parse(&o.name) {
            FieldId::Column(c) => model.table.column(&c),
            _ => None,
        })
        .collect();
    if model.has_collection_relations() {
        if let Some(pk) = model.table.primary_column() {
            if !cols.iter().any(|c| c.name == pk.name) {
                cols.push(pk);
            }
        }
    }
    cols
}

fn label_of(registry: &ModelRegistry, table: &str) -> String {
    registry
        .table(table)
        .map(|t| t.label_column.clone())
        .unwrap_or_default()
}

fn column_field(registry: &ModelRegistry, model: &ResolvedModel, column: &ColumnDescriptor) -> FormFieldSpec {
    let over = override_for(model, &column.name);
    let rules = model.rules.get(&column.name).cloned().unwrap_or_default();
    let (kind, options, relation_config) = match model.table.foreign_keys_of_column(&column.name).next() {
        Some(fk) => (
            FormFieldType::Relation,
            None,
            Some(RelationConfig {
                kind: RelationKind::ManyToOne,
                table: fk.foreign_table.clone(),
                value_column: fk.foreign_column.clone(),
                label_column: label_of(registry, &fk.foreign_table),
                choices_endpoint: registry.choices_endpoint(&model.label, &column.name),
            }),
        ),
        None => {
            let options = match &column.semantic_type {
                SemanticType::Enum(values) => Some(
                    values
                        .iter()
                        .map(|v| Choice {
                            label: humanize(v),
                            value: Value::String(v.clone()),
                        })
                        .collect(),
                ),
                _ => None,
            };
            (column_field_type(column), options, None)
        }
    };
    FormFieldSpec {
        name: FieldId::Column(column.name.clone()),
        label: over
            .and_then(|o| o.label.clone())
            .unwrap_or_else(|| humanize(&column.name)),
        kind: over.and_then(|o| o.kind).unwrap_or(kind),
        required: rules.required.unwrap_or(!(column.nullable || column.has_default)),
        rules,
        options,
        relation_config,
    }
}

fn relation_field(model: &ResolvedModel, name: FieldId, relation: &str, config: RelationConfig) -> FormFieldSpec {
    let key = name.to_string();
    let over = override_for(model, &key);
    let rules = model.rules.get(&key).cloned().unwrap_or_default();
    FormFieldSpec {
        label: over
            .and_then(|o| o.label.clone())
            .unwrap_or_else(|| humanize(relation)),
        name,
        kind: FormFieldType::RelationMany,
        required: rules.required.unwrap_or(false),
        rules,
        options: None,
        relation_config: Some(config),
    }
}

/// Field list for a model, without any database access.
pub fn form_fields(registry: &ModelRegistry, model: &ResolvedModel) -> Vec<FormFieldSpec> {
    let mut fields: Vec<FormFieldSpec> = visible_columns(model)
        .into_iter()
        .map(|c| column_field(registry, model, c))
        .collect();
    for rel in &model.many_to_many {
        let config = RelationConfig {
            kind: RelationKind::ManyToMany,
            table: rel.other_table.clone(),
            value_column: rel.other_foreign_column.clone(),
            label_column: label_of(registry, &rel.other_table),
            choices_endpoint: registry.choices_many_endpoint(&model.label, &rel.name, &rel.other_column),
        };
        fields.push(relation_field(model, rel.field_id(), &rel.name, config));
    }
    for rel in &model.one_to_many {
        let config = RelationConfig {
            kind: RelationKind::OneToMany,
            table: rel.child_table.clone(),
            value_column: rel.child_primary_column.clone(),
            label_column: label_of(registry, &rel.child_table),
            choices_endpoint: registry.choices_many_endpoint(&model.label, &rel.name, &rel.child_primary_column),
        };
        fields.push(relation_field(model, rel.field_id(), &rel.name, config));
    }
    fields
}

fn table<'a>(registry: &'a ModelRegistry, name: &str) -> Result<&'a TableInfo, AppError> {
    registry.table(name).ok_or_else(|| {
        ConfigError::MissingReference {
            kind: "table",
            id: name.to_string(),
        }
        .into()
    })
}

fn value_column<'a>(table: &'a TableInfo, name: &str) -> Result<&'a ColumnDescriptor, AppError> {
    table.column(name).ok_or_else(|| {
        ConfigError::MissingReference {
            kind: "column",
            id: format!("{}.{}", table.name, name),
        }
        .into()
    })
}

fn rows_to_choices(rows: Vec<Map<String, Value>>) -> Vec<Choice> {
    rows.into_iter()
        .map(|mut row| Choice {
            label: row.get("label").map(display_value).unwrap_or_default(),
            value: row.remove("value").unwrap_or(Value::Null),
        })
        .collect()
}

/// Current members of a collection relation field for the loaded `row`.
async fn load_members(
    pool: &PgPool,
    registry: &ModelRegistry,
    model: &ResolvedModel,
    name: &FieldId,
    row: &Map<String, Value>,
) -> Result<Vec<Choice>, AppError> {
    let q = match name {
        FieldId::ManyToMany { relation, column } => {
            let Some(rel) = model
                .many_to_many
                .iter()
                .find(|r| &r.name == relation && &r.other_column == column)
            else {
                return Ok(Vec::new());
            };
            let Some(self_value) = row.get(&rel.self_foreign_column).filter(|v| !v.is_null()) else {
                return Ok(Vec::new());
            };
            let junction = table(registry, &rel.junction_table)?;
            let other = table(registry, &rel.other_table)?;
            m2m_members(rel, junction, other, self_value.clone())?
        }
        FieldId::OneToMany { relation, column } => {
            let Some(rel) = model
                .one_to_many
                .iter()
                .find(|r| &r.name == relation && &r.child_primary_column == column)
            else {
                return Ok(Vec::new());
            };
            let Some(parent_value) = row.get(&rel.parent_primary_column).filter(|v| !v.is_null()) else {
                return Ok(Vec::new());
            };
            let child = table(registry, &rel.child_table)?;
            o2m_members(rel, child, parent_value.clone())?
        }
        FieldId::Column(_) => return Ok(Vec::new()),
    };
    Ok(rows_to_choices(exec::fetch_all(pool, &q).await?))
}

/// Form spec for creating (`lookup` absent) or updating the record addressed by `lookup`.
pub async fn form_spec(
    pool: &PgPool,
    registry: &ModelRegistry,
    model: &ResolvedModel,
    lookup: Option<&str>,
) -> Result<FormSpec, AppError> {
    let mut fields = form_fields(registry, model);
    let mut values = Map::new();
    let mut label_string = None;

    if let Some(raw) = lookup {
        let lookup_value = parse_for_column(&model.lookup_column, raw)?;
        let row = exec::fetch_optional(pool, &select_by_lookup(model, lookup_value))
            .await?
            .ok_or_else(|| AppError::NotFound(format!("{} '{}'", model.label, raw)))?;

        for field in fields.iter_mut() {
            match &field.name {
                FieldId::Column(c) => {
                    let v = row.get(c).cloned().unwrap_or(Value::Null);
                    if let (Some(rc), false) = (&field.relation_config, v.is_null()) {
                        let foreign = table(registry, &rc.table)?;
                        let col = value_column(foreign, &rc.value_column)?;
                        let q = select_choice_by_value(foreign, col, &foreign.label_column, v.clone());
                        field.options = Some(rows_to_choices(exec::fetch_all(pool, &q).await?));
                    }
                    values.insert(c.clone(), v);
                }
                name => {
                    let members = load_members(pool, registry, model, name, &row).await?;
                    values.insert(
                        name.to_string(),
                        Value::Array(members.iter().map(|m| m.value.clone()).collect()),
                    );
                    field.options = Some(members);
                }
            }
        }

        let label_visible = fields
            .iter()
            .any(|f| matches!(&f.name, FieldId::Column(c) if *c == model.label_column));
        if !label_visible {
            label_string = row.get(&model.label_column).map(display_value);
        }
    }

    Ok(FormSpec {
        model: model.label.clone(),
        title: model.title.clone(),
        endpoint: registry.list_endpoint(&model.label),
        lookup_column: model.lookup_column.name.clone(),
        fields,
        values,
        label_string,
    })
}

/// Choices for a many-to-one column, narrowed by `search` on the related label column.
pub async fn choices(
    pool: &PgPool,
    registry: &ModelRegistry,
    model: &ResolvedModel,
    column: &str,
    search: Option<&str>,
) -> Result<Vec<Choice>, AppError> {
    let fk = model
        .table
        .foreign_keys_of_column(column)
        .next()
        .ok_or_else(|| AppError::NotFound(format!("relation field '{}' on model '{}'", column, model.label)))?;
    let foreign = table(registry, &fk.foreign_table)?;
    let col = value_column(foreign, &fk.foreign_column)?;
    let q = select_choices(foreign, col, &foreign.label_column, search);
    Ok(rows_to_choices(exec::fetch_all(pool, &q).await?))
}

/// Choices for a collection relation addressed as `<relation>___<column>`.
pub async fn choices_many(
    pool: &PgPool,
    registry: &ModelRegistry,
    model: &ResolvedModel,
    edge: &str,
    search: Option<&str>,
) -> Result<Vec<Choice>, AppError> {
    let not_found = || AppError::NotFound(format!("relation '{}' on model '{}'", edge, model.label));
    let (relation, column) = FieldId::parse_edge(edge).ok_or_else(not_found)?;
    let (target, value_name) = if let Some(rel) = model
        .many_to_many
        .iter()
        .find(|r| r.name == relation && r.other_column == column)
    {
        (&rel.other_table, &rel.other_foreign_column)
    } else if let Some(rel) = model
        .one_to_many
        .iter()
        .find(|r| r.name == relation && r.child_primary_column == column)
    {
        (&rel.child_table, &rel.child_primary_column)
    } else {
        return Err(not_found());
    };
    let target = table(registry, target)?;
    let col = value_column(target, value_name)?;
    let q = select_choices(target, col, &target.label_column, search);
    Ok(rows_to_choices(exec::fetch_all(pool, &q).await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ColumnDef, FieldOverride, ModelConfig, TableDef, ValidationRule};

    fn registry(posts: ModelConfig) -> ModelRegistry {
        let tables = vec![
            TableDef::new("users")
                .column(ColumnDef::new("id", "serial").primary_key())
                .column(ColumnDef::new("name", "text").not_null()),
            TableDef::new("posts")
                .column(ColumnDef::new("id", "serial").primary_key())
                .column(ColumnDef::new("title", "text").not_null())
                .column(ColumnDef::new("status", "post_status").enum_values(["draft", "published"]).not_null().default_sql("'draft'"))
                .column(ColumnDef::new("body", "text"))
                .column(ColumnDef::new("meta", "jsonb"))
                .column(ColumnDef::new("authorId", "integer").not_null())
                .foreign_key("authorId", "users", "id"),
            TableDef::new("tags")
                .column(ColumnDef::new("id", "serial").primary_key())
                .column(ColumnDef::new("name", "text")),
            TableDef::new("post_tags")
                .column(ColumnDef::new("postId", "integer").not_null())
                .column(ColumnDef::new("tagId", "integer").not_null())
                .foreign_key("postId", "posts", "id")
                .foreign_key("tagId", "tags", "id"),
            TableDef::new("comments")
                .column(ColumnDef::new("id", "serial").primary_key())
                .column(ColumnDef::new("body", "text"))
                .column(ColumnDef::new("postId", "integer"))
                .foreign_key("postId", "posts", "id"),
        ];
        ModelRegistry::build(tables, vec![posts], "/api").unwrap()
    }

    fn names(fields: &[FormFieldSpec]) -> Vec<String> {
        fields.iter().map(|f| f.name.to_string()).collect()
    }

    #[test]
    fn test_fields_map_types_and_required() {
        let reg = registry(ModelConfig::new("posts", "posts"));
        let m = reg.model("posts").unwrap();
        let fields = form_fields(&reg, m);
        assert_eq!(names(&fields), vec!["id", "title", "status", "body", "meta", "authorId"]);
        let by = |n: &str| fields.iter().find(|f| f.name.to_string() == n).unwrap();
        assert!(!by("id").required);
        assert!(by("title").required);
        assert_eq!(by("status").kind, FormFieldType::Select);
        assert!(!by("status").required);
        assert_eq!(by("status").options.as_ref().unwrap().len(), 2);
        assert_eq!(by("meta").kind, FormFieldType::Json);
        let author = by("authorId");
        assert_eq!(author.kind, FormFieldType::Relation);
        assert!(author.required);
        let rc = author.relation_config.as_ref().unwrap();
        assert_eq!(rc.kind, RelationKind::ManyToOne);
        assert_eq!(rc.label_column, "name");
        assert_eq!(rc.choices_endpoint, "/api/formspec/posts/choices/authorId");
    }

    #[test]
    fn test_collection_relations_append_pseudo_fields() {
        let cfg = ModelConfig::new("posts", "posts")
            .many_to_many("tags", "post_tags")
            .one_to_many("comments", "comments");
        let reg = registry(cfg);
        let fields = form_fields(&reg, reg.model("posts").unwrap());
        let n = names(&fields);
        assert!(n.contains(&"___tags___tagId".to_string()));
        assert!(n.contains(&"___o2m___comments___id".to_string()));
        let tags = fields.iter().find(|f| f.name.to_string() == "___tags___tagId").unwrap();
        assert_eq!(tags.kind, FormFieldType::RelationMany);
        assert_eq!(
            tags.relation_config.as_ref().unwrap().choices_endpoint,
            "/api/formspec/posts/choices-many/tags___tagId"
        );
    }

    #[test]
    fn test_overrides_restrict_and_force_primary_key() {
        let cfg = ModelConfig::new("posts", "posts")
            .many_to_many("tags", "post_tags")
            .field(FieldOverride::new("title").label("Headline").rules(ValidationRule {
                max_length: Some(80),
                ..Default::default()
            }))
            .field(FieldOverride::new("body"));
        let reg = registry(cfg);
        let fields = form_fields(&reg, reg.model("posts").unwrap());
        assert_eq!(names(&fields), vec!["title", "body", "id", "___tags___tagId"]);
        assert_eq!(fields[0].label, "Headline");
        assert_eq!(fields[0].rules.max_length, Some(80));
    }

    #[test]
    fn test_overrides_without_collections_do_not_add_primary_key() {
        let cfg = ModelConfig::new("posts", "posts").field(FieldOverride::new("title"));
        let reg = registry(cfg);
        let fields = form_fields(&reg, reg.model("posts").unwrap());
        assert_eq!(names(&fields), vec!["title"]);
    }

    #[test]
    fn test_field_spec_serializes_wire_names() {
        let cfg = ModelConfig::new("posts", "posts").many_to_many("tags", "post_tags");
        let reg = registry(cfg);
        let fields = form_fields(&reg, reg.model("posts").unwrap());
        let json = serde_json::to_value(fields.last().unwrap()).unwrap();
        assert_eq!(json["name"], "___tags___tagId");
        assert_eq!(json["type"], "relation-many");
        assert_eq!(json["relationConfig"]["kind"], "many-to-many");
    }
}
