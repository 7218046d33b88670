//! Brings relation membership in line with submitted pseudo-field values after a parent write.

use super::statements::{
    diff_ids, ids_from_value, m2m_delete_all, m2m_delete_some, m2m_existing, m2m_insert, o2m_set, o2m_unset,
};
use super::{M2MRelation, O2MRelation};
use crate::config::ResolvedModel;
use crate::error::{translate_unset_error, translate_write_error, AppError, ConfigError};
use crate::field_id::FieldId;
use crate::schema::{TableInfo, TableMap};
use crate::sql::exec;
use serde_json::{Map, Value};
use sqlx::PgConnection;

/// One submitted relation pseudo-field, matched to its relation.
#[derive(Clone, Debug)]
pub enum Submission<'m> {
    ManyToMany { relation: &'m M2MRelation, ids: Vec<Value> },
    OneToMany { relation: &'m O2MRelation, ids: Vec<Value> },
}

impl Submission<'_> {
    pub fn field_id(&self) -> FieldId {
        match self {
            Submission::ManyToMany { relation, .. } => relation.field_id(),
            Submission::OneToMany { relation, .. } => relation.field_id(),
        }
    }

    /// Normalised ids, with nulls and duplicates already dropped.
    pub fn ids(&self) -> &[Value] {
        match self {
            Submission::ManyToMany { ids, .. } | Submission::OneToMany { ids, .. } => ids,
        }
    }
}

/// Remove relation pseudo-fields from `body` and match each to a relation of `model`.
/// Relations that were not submitted are left untouched.
pub fn take_submissions<'m>(
    model: &'m ResolvedModel,
    body: &mut Map<String, Value>,
) -> Result<Vec<Submission<'m>>, AppError> {
    let keys: Vec<String> = body
        .keys()
        .filter(|k| FieldId::parse(k).is_relation())
        .cloned()
        .collect();
    let mut out = Vec::with_capacity(keys.len());
    for key in keys {
        let value = body.remove(&key).unwrap_or(Value::Null);
        let ids = ids_from_value(&value);
        let submission = match FieldId::parse(&key) {
            FieldId::ManyToMany { relation, column } => model
                .many_to_many
                .iter()
                .find(|r| r.name == relation && r.other_column == column)
                .map(|r| Submission::ManyToMany { relation: r, ids }),
            FieldId::OneToMany { relation, column } => model
                .one_to_many
                .iter()
                .find(|r| r.name == relation && r.child_primary_column == column)
                .map(|r| Submission::OneToMany { relation: r, ids }),
            FieldId::Column(_) => None,
        };
        match submission {
            Some(s) => out.push(s),
            None => {
                return Err(AppError::BadRequest(format!(
                    "unknown relation field '{}' for model '{}'",
                    key, model.label
                )))
            }
        }
    }
    Ok(out)
}

fn table<'a>(tables: &'a TableMap, name: &str) -> Result<&'a TableInfo, AppError> {
    tables.get(name).ok_or_else(|| {
        ConfigError::MissingReference {
            kind: "table",
            id: name.to_string(),
        }
        .into()
    })
}

fn row_value(row: &Map<String, Value>, column: &str, relation: &str) -> Result<Value, AppError> {
    match row.get(column) {
        Some(v) if !v.is_null() => Ok(v.clone()),
        _ => Err(ConfigError::Relation {
            relation: relation.to_string(),
            reason: format!("written row has no value for '{}'", column),
        }
        .into()),
    }
}

/// Runs relation statements on the caller's connection, normally inside the parent write's transaction.
pub struct RelationSynchronizer<'a> {
    tables: &'a TableMap,
}

impl<'a> RelationSynchronizer<'a> {
    pub fn new(tables: &'a TableMap) -> Self {
        RelationSynchronizer { tables }
    }

    /// Sync every submission against the freshly written parent `row`.
    pub async fn sync(
        &self,
        conn: &mut PgConnection,
        row: &Map<String, Value>,
        submissions: &[Submission<'_>],
    ) -> Result<(), AppError> {
        for submission in submissions {
            match submission {
                Submission::ManyToMany { relation, ids } => {
                    let self_value = row_value(row, &relation.self_foreign_column, &relation.name)?;
                    self.sync_many_to_many(conn, relation, self_value, ids).await?;
                }
                Submission::OneToMany { relation, ids } => {
                    let parent_value = row_value(row, &relation.parent_primary_column, &relation.name)?;
                    self.sync_one_to_many(conn, relation, parent_value, ids).await?;
                }
            }
        }
        Ok(())
    }

    pub async fn sync_many_to_many(
        &self,
        conn: &mut PgConnection,
        relation: &M2MRelation,
        self_value: Value,
        ids: &[Value],
    ) -> Result<(), AppError> {
        let junction = table(self.tables, &relation.junction_table)?;
        let on_err = |e: sqlx::Error| translate_write_error(e, &relation.junction_table);
        if !relation.has_extra_columns() {
            let q = m2m_delete_all(relation, junction, self_value.clone())?;
            exec::execute(&mut *conn, &q).await.map_err(on_err)?;
            if let Some(q) = m2m_insert(relation, junction, self_value, ids)? {
                exec::execute(&mut *conn, &q).await.map_err(on_err)?;
            }
            tracing::debug!(relation = %relation.name, linked = ids.len(), "many-to-many replaced");
            return Ok(());
        }

        let q = m2m_existing(relation, junction, self_value.clone())?;
        let existing: Vec<Value> = exec::fetch_all(&mut *conn, &q)
            .await
            .map_err(on_err)?
            .into_iter()
            .filter_map(|mut r| r.remove("value"))
            .collect();
        let (to_delete, to_insert) = diff_ids(&existing, ids);
        if let Some(q) = m2m_delete_some(relation, junction, self_value.clone(), &to_delete)? {
            exec::execute(&mut *conn, &q).await.map_err(on_err)?;
        }
        if let Some(q) = m2m_insert(relation, junction, self_value, &to_insert)? {
            exec::execute(&mut *conn, &q).await.map_err(on_err)?;
        }
        tracing::debug!(
            relation = %relation.name,
            removed = to_delete.len(),
            added = to_insert.len(),
            "many-to-many diffed"
        );
        Ok(())
    }

    /// Detach dropped children first, then attach the submitted ones.
    pub async fn sync_one_to_many(
        &self,
        conn: &mut PgConnection,
        relation: &O2MRelation,
        parent_value: Value,
        ids: &[Value],
    ) -> Result<(), AppError> {
        let child = table(self.tables, &relation.child_table)?;
        let q = o2m_unset(relation, child, parent_value.clone(), ids)?;
        let detached = exec::execute(&mut *conn, &q)
            .await
            .map_err(|e| translate_unset_error(e, &relation.name, &relation.child_table))?;
        if let Some(q) = o2m_set(relation, child, parent_value, ids)? {
            exec::execute(&mut *conn, &q)
                .await
                .map_err(|e| translate_write_error(e, &relation.child_table))?;
        }
        tracing::debug!(relation = %relation.name, detached, attached = ids.len(), "one-to-many synced");
        Ok(())
    }
}
