//! Config validation: table referential integrity and field path checks.

use crate::config::{FieldPath, TableDef};
use crate::error::ConfigError;
use crate::schema::{TableInfo, TableMap};
use std::collections::HashSet;

/// Check foreign keys point at defined tables and columns, then build the descriptor map.
pub fn validate_tables(defs: &[TableDef]) -> Result<TableMap, ConfigError> {
    let mut names = HashSet::new();
    for t in defs {
        if !names.insert(t.name.as_str()) {
            return Err(ConfigError::Validation(format!("table '{}' defined twice", t.name)));
        }
    }
    for t in defs {
        for fk in &t.foreign_keys {
            if !t.columns.iter().any(|c| c.name == fk.column) {
                return Err(ConfigError::MissingReference {
                    kind: "column",
                    id: format!("{}.{}", t.name, fk.column),
                });
            }
            let target = defs
                .iter()
                .find(|d| d.name == fk.foreign_table)
                .ok_or_else(|| ConfigError::MissingReference {
                    kind: "table",
                    id: fk.foreign_table.clone(),
                })?;
            if !target.columns.iter().any(|c| c.name == fk.foreign_column) {
                return Err(ConfigError::MissingReference {
                    kind: "column",
                    id: format!("{}.{}", fk.foreign_table, fk.foreign_column),
                });
            }
        }
    }
    defs.iter()
        .map(|d| TableInfo::from_def(d).map(|info| (d.name.clone(), info)))
        .collect()
}

/// Resolve `column` or `fk_column.foreign_column` against `table`. Deeper paths are rejected.
pub fn resolve_path(model: &str, table: &TableInfo, tables: &TableMap, path: &str) -> Result<FieldPath, ConfigError> {
    let invalid = || ConfigError::InvalidPath {
        model: model.to_string(),
        path: path.to_string(),
    };
    let parts: Vec<&str> = path.split('.').collect();
    match parts.as_slice() {
        [column] => {
            table.column(column).ok_or_else(invalid)?;
            Ok(FieldPath::Column(column.to_string()))
        }
        [fk_column, column] => {
            let fk = table.foreign_keys_of_column(fk_column).next().ok_or_else(invalid)?;
            let foreign = tables.get(&fk.foreign_table).ok_or_else(invalid)?;
            foreign.column(column).ok_or_else(invalid)?;
            Ok(FieldPath::Related {
                foreign_key: fk.clone(),
                column: column.to_string(),
            })
        }
        _ => Err(invalid()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ColumnDef;

    fn defs() -> Vec<TableDef> {
        vec![
            TableDef::new("users")
                .column(ColumnDef::new("id", "serial").primary_key())
                .column(ColumnDef::new("name", "text")),
            TableDef::new("posts")
                .column(ColumnDef::new("id", "serial").primary_key())
                .column(ColumnDef::new("title", "text"))
                .column(ColumnDef::new("authorId", "integer"))
                .foreign_key("authorId", "users", "id"),
        ]
    }

    #[test]
    fn test_validate_tables_rejects_dangling_foreign_keys() {
        let mut bad = defs();
        bad[1] = bad[1].clone().foreign_key("authorId", "people", "id");
        assert!(matches!(
            validate_tables(&bad),
            Err(ConfigError::MissingReference { kind: "table", .. })
        ));

        let mut bad = defs();
        bad[1] = bad[1].clone().foreign_key("editorId", "users", "id");
        assert!(matches!(
            validate_tables(&bad),
            Err(ConfigError::MissingReference { kind: "column", .. })
        ));
    }

    #[test]
    fn test_resolve_path() {
        let tables = validate_tables(&defs()).unwrap();
        let posts = &tables["posts"];
        assert_eq!(
            resolve_path("posts", posts, &tables, "title").unwrap(),
            FieldPath::Column("title".into())
        );
        let related = resolve_path("posts", posts, &tables, "authorId.name").unwrap();
        assert_eq!(related.accessor_key(), "authorId__name");
        assert_eq!(related.join_alias().as_deref(), Some("authorId_id"));
        for bad in ["nope", "title.name", "authorId.email", "authorId.name.x"] {
            assert!(matches!(
                resolve_path("posts", posts, &tables, bad),
                Err(ConfigError::InvalidPath { .. })
            ));
        }
    }
}
