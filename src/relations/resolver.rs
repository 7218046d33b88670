//! Resolves declared many-to-many and one-to-many relations against table foreign keys.

use crate::config::ModelConfig;
use crate::error::ConfigError;
use crate::field_id::FieldId;
use crate::schema::{TableInfo, TableMap};
use serde::Serialize;

/// One many-to-many edge. A junction with several "other" foreign keys yields one entry per key,
/// all sharing the declared name.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct M2MRelation {
    pub name: String,
    pub junction_table: String,
    /// Junction column pointing at the owning table.
    pub self_column: String,
    /// Owning-table column referenced by `self_column`.
    pub self_foreign_column: String,
    pub other_table: String,
    /// Junction column pointing at the other table.
    pub other_column: String,
    /// Other-table column referenced by `other_column`.
    pub other_foreign_column: String,
    #[serde(skip)]
    pub junction_column_count: usize,
}

impl M2MRelation {
    /// Junctions with columns beyond the two keys must be synced by diff so row metadata survives.
    pub fn has_extra_columns(&self) -> bool {
        self.junction_column_count > 2
    }

    pub fn field_id(&self) -> FieldId {
        FieldId::ManyToMany {
            relation: self.name.clone(),
            column: self.other_column.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct O2MRelation {
    pub name: String,
    pub child_table: String,
    pub child_foreign_column: String,
    pub child_foreign_nullable: bool,
    pub child_primary_column: String,
    pub parent_primary_column: String,
}

impl O2MRelation {
    pub fn field_id(&self) -> FieldId {
        FieldId::OneToMany {
            relation: self.name.clone(),
            column: self.child_primary_column.clone(),
        }
    }
}

fn lookup_table<'a>(tables: &'a TableMap, relation: &str, name: &str) -> Result<&'a TableInfo, ConfigError> {
    tables.get(name).ok_or_else(|| ConfigError::Relation {
        relation: relation.to_string(),
        reason: format!("table '{}' is not defined", name),
    })
}

pub fn resolve_many_to_many(
    config: &ModelConfig,
    owner: &TableInfo,
    tables: &TableMap,
) -> Result<Vec<M2MRelation>, ConfigError> {
    let mut out = Vec::new();
    for (name, decl) in &config.many_to_many {
        let junction = lookup_table(tables, name, &decl.through)?;
        let (to_owner, to_others): (Vec<_>, Vec<_>) = junction
            .foreign_keys
            .iter()
            .partition(|fk| fk.foreign_table == owner.name);
        let self_fk = match to_owner.as_slice() {
            [fk] => *fk,
            [] => {
                return Err(ConfigError::Relation {
                    relation: name.clone(),
                    reason: format!(
                        "junction table '{}' has no foreign key referencing '{}'",
                        junction.name, owner.name
                    ),
                })
            }
            _ => {
                return Err(ConfigError::Relation {
                    relation: name.clone(),
                    reason: format!(
                        "junction table '{}' has more than one foreign key referencing '{}'",
                        junction.name, owner.name
                    ),
                })
            }
        };
        if to_others.is_empty() {
            return Err(ConfigError::Relation {
                relation: name.clone(),
                reason: format!("junction table '{}' references no other table", junction.name),
            });
        }
        for fk in to_others {
            lookup_table(tables, name, &fk.foreign_table)?;
            out.push(M2MRelation {
                name: name.clone(),
                junction_table: junction.name.clone(),
                self_column: self_fk.column.clone(),
                self_foreign_column: self_fk.foreign_column.clone(),
                other_table: fk.foreign_table.clone(),
                other_column: fk.column.clone(),
                other_foreign_column: fk.foreign_column.clone(),
                junction_column_count: junction.columns.len(),
            });
        }
    }
    Ok(out)
}

pub fn resolve_one_to_many(
    config: &ModelConfig,
    parent: &TableInfo,
    tables: &TableMap,
) -> Result<Vec<O2MRelation>, ConfigError> {
    let mut out = Vec::new();
    for (name, decl) in &config.one_to_many {
        let child = lookup_table(tables, name, &decl.table)?;
        let fk = child
            .foreign_keys
            .iter()
            .find(|fk| fk.foreign_table == parent.name)
            .ok_or_else(|| ConfigError::Relation {
                relation: name.clone(),
                reason: format!(
                    "one-to-many relation requires a foreign key in related table '{}' referencing '{}'",
                    child.name, parent.name
                ),
            })?;
        let child_pk = child.primary_key.clone().ok_or_else(|| ConfigError::Relation {
            relation: name.clone(),
            reason: format!("related table '{}' has no primary key", child.name),
        })?;
        let nullable = child.column(&fk.column).map(|c| c.nullable).unwrap_or(true);
        out.push(O2MRelation {
            name: name.clone(),
            child_table: child.name.clone(),
            child_foreign_column: fk.column.clone(),
            child_foreign_nullable: nullable,
            child_primary_column: child_pk,
            parent_primary_column: fk.foreign_column.clone(),
        });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ColumnDef, TableDef};

    fn tables(defs: Vec<TableDef>) -> TableMap {
        defs.iter()
            .map(|d| (d.name.clone(), TableInfo::from_def(d).unwrap()))
            .collect()
    }

    fn base() -> Vec<TableDef> {
        vec![
            TableDef::new("posts")
                .column(ColumnDef::new("id", "serial").primary_key())
                .column(ColumnDef::new("title", "text")),
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
        ]
    }

    #[test]
    fn test_resolve_many_to_many_simple_junction() {
        let t = tables(base());
        let cfg = ModelConfig::new("posts", "posts").many_to_many("tags", "post_tags");
        let rels = resolve_many_to_many(&cfg, &t["posts"], &t).unwrap();
        assert_eq!(rels.len(), 1);
        let r = &rels[0];
        assert_eq!(r.self_column, "postId");
        assert_eq!(r.self_foreign_column, "id");
        assert_eq!(r.other_table, "tags");
        assert_eq!(r.other_column, "tagId");
        assert!(!r.has_extra_columns());
        assert_eq!(r.field_id().to_string(), "___tags___tagId");
    }

    #[test]
    fn test_junction_with_three_foreign_keys_yields_two_entries() {
        let mut defs = base();
        defs.push(
            TableDef::new("categories")
                .column(ColumnDef::new("id", "serial").primary_key())
                .column(ColumnDef::new("name", "text")),
        );
        defs[2] = defs[2]
            .clone()
            .column(ColumnDef::new("categoryId", "integer"))
            .foreign_key("categoryId", "categories", "id");
        let t = tables(defs);
        let cfg = ModelConfig::new("posts", "posts").many_to_many("links", "post_tags");
        let rels = resolve_many_to_many(&cfg, &t["posts"], &t).unwrap();
        assert_eq!(rels.len(), 2);
        assert!(rels.iter().all(|r| r.name == "links" && r.has_extra_columns()));
        let others: Vec<_> = rels.iter().map(|r| r.other_column.as_str()).collect();
        assert_eq!(others, vec!["tagId", "categoryId"]);
    }

    #[test]
    fn test_junction_without_owner_key_is_fatal() {
        let t = tables(base());
        let cfg = ModelConfig::new("tags", "tags").many_to_many("oops", "comments");
        let err = resolve_many_to_many(&cfg, &t["tags"], &t).unwrap_err();
        assert!(matches!(err, ConfigError::Relation { .. }));
    }

    #[test]
    fn test_resolve_one_to_many() {
        let t = tables(base());
        let cfg = ModelConfig::new("posts", "posts").one_to_many("comments", "comments");
        let rels = resolve_one_to_many(&cfg, &t["posts"], &t).unwrap();
        assert_eq!(rels.len(), 1);
        assert_eq!(rels[0].child_foreign_column, "postId");
        assert_eq!(rels[0].child_primary_column, "id");
        assert_eq!(rels[0].parent_primary_column, "id");
        assert!(rels[0].child_foreign_nullable);
        assert_eq!(rels[0].field_id().to_string(), "___o2m___comments___id");
    }

    #[test]
    fn test_one_to_many_without_foreign_key_is_fatal() {
        let t = tables(base());
        let cfg = ModelConfig::new("posts", "posts").one_to_many("tags", "tags");
        let err = resolve_one_to_many(&cfg, &t["posts"], &t).unwrap_err();
        assert!(err.to_string().contains("requires a foreign key"));
    }
}
