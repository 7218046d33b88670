//! Structured form field identifiers.
//!
//! Relation edges travel through flat submissions as pseudo-field names:
//! `___<relation>___<column>` for many-to-many and `___o2m___<relation>___<column>` for
//! one-to-many. The string form exists only at the wire boundary.

use serde::{Serialize, Serializer};
use std::fmt;

const MARKER: &str = "___";
const O2M_MARKER: &str = "___o2m___";

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum FieldId {
    Column(String),
    ManyToMany { relation: String, column: String },
    OneToMany { relation: String, column: String },
}

fn split_edge(rest: &str) -> Option<(String, String)> {
    let (relation, column) = rest.rsplit_once(MARKER)?;
    if relation.is_empty() || column.is_empty() {
        return None;
    }
    Some((relation.to_string(), column.to_string()))
}

impl FieldId {
    pub fn parse(s: &str) -> FieldId {
        if let Some((relation, column)) = s.strip_prefix(O2M_MARKER).and_then(split_edge) {
            return FieldId::OneToMany { relation, column };
        }
        if let Some((relation, column)) = s.strip_prefix(MARKER).and_then(split_edge) {
            return FieldId::ManyToMany { relation, column };
        }
        FieldId::Column(s.to_string())
    }

    /// Parse the `<relation>___<column>` segment used by the choices-many endpoint.
    pub fn parse_edge(s: &str) -> Option<(String, String)> {
        split_edge(s)
    }

    pub fn is_relation(&self) -> bool {
        !matches!(self, FieldId::Column(_))
    }
}

impl fmt::Display for FieldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldId::Column(c) => f.write_str(c),
            FieldId::ManyToMany { relation, column } => write!(f, "{MARKER}{relation}{MARKER}{column}"),
            FieldId::OneToMany { relation, column } => write!(f, "{O2M_MARKER}{relation}{MARKER}{column}"),
        }
    }
}

impl Serialize for FieldId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
