//! Identifier case helpers used to derive human-readable labels from column names.

/// Convert a single identifier from camelCase to snake_case.
/// e.g. "authorId" -> "author_id", "createdAt" -> "created_at"
pub fn to_snake_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 4);
    for (i, c) in s.chars().enumerate() {
        if c.is_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// Label for a column or relation name.
/// e.g. "authorId" -> "Author Id", "created_at" -> "Created At", "authorId__name" -> "Author Id Name"
pub fn humanize(s: &str) -> String {
    to_snake_case(s)
        .split(|c: char| c == '_' || c == '.' || c.is_whitespace())
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
