//! SQL text builders
//!
//! The remote store has no prepared statements, so every value reaches it
//! as an escaped literal.

use crate::value::{Row, Value};

/// Render a value as a SQL literal.
pub fn literal(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(true) => "TRUE".to_string(),
        Value::Bool(false) => "FALSE".to_string(),
        Value::Int(i) => i.to_string(),
        Value::Float(f) => f.to_string(),
        Value::Text(s) => quote(s),
        Value::Blob(bytes) => quote(&String::from_utf8_lossy(bytes)),
    }
}

/// Single-quote a string, doubling embedded quotes.
pub fn quote(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}

/// `WHERE <predicate>`, or nothing for an absent/blank predicate.
pub fn where_clause(predicate: Option<&str>) -> String {
    match predicate.map(str::trim) {
        Some(p) if !p.is_empty() => format!("WHERE {}", p),
        _ => String::new(),
    }
}

/// Join clause fragments with single spaces, skipping empty ones.
pub fn join_clauses<'a>(parts: impl IntoIterator<Item = &'a str>) -> String {
    parts
        .into_iter()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn build_insert(table: &str, row: &Row) -> String {
    let columns = row.column_names().collect::<Vec<_>>().join(", ");
    let values = row
        .iter()
        .map(|(_, value)| literal(value))
        .collect::<Vec<_>>()
        .join(", ");
    format!("INSERT INTO {} ({}) VALUES ({})", table, columns, values)
}

pub fn build_update(table: &str, changes: &Row, predicate: &str) -> String {
    let assignments = changes
        .iter()
        .map(|(column, value)| format!("{} = {}", column, literal(value)))
        .collect::<Vec<_>>()
        .join(", ");
    format!("UPDATE {} SET {} WHERE {}", table, assignments, predicate)
}

pub fn build_delete(table: &str, predicate: &str) -> String {
    format!("DELETE FROM {} WHERE {}", table, predicate)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literals() {
        assert_eq!(literal(&Value::Null), "NULL");
        assert_eq!(literal(&Value::Bool(true)), "TRUE");
        assert_eq!(literal(&Value::Int(-4)), "-4");
        assert_eq!(literal(&Value::Float(12.5)), "12.5");
        assert_eq!(literal(&Value::Text("Mama Mboga's".into())), "'Mama Mboga''s'");
    }

    #[test]
    fn test_where_clause() {
        assert_eq!(where_clause(None), "");
        assert_eq!(where_clause(Some("   ")), "");
        assert_eq!(where_clause(Some("type = 'expense'")), "WHERE type = 'expense'");
    }

    #[test]
    fn test_join_clauses_skips_empty() {
        assert_eq!(
            join_clauses(["SELECT *", "FROM t", "", "  ", "LIMIT 1"]),
            "SELECT * FROM t LIMIT 1"
        );
    }

    #[test]
    fn test_build_insert() {
        let row = Row::new()
            .with("id", "cat-food")
            .with("user_id", Value::Null)
            .with("is_default", true);
        assert_eq!(
            build_insert("categories", &row),
            "INSERT INTO categories (id, user_id, is_default) VALUES ('cat-food', NULL, TRUE)"
        );
    }

    #[test]
    fn test_build_update_and_delete() {
        let changes = Row::new().with("amount", 250.0).with("period", "weekly");
        assert_eq!(
            build_update("budgets", &changes, "id = 'b1'"),
            "UPDATE budgets SET amount = 250, period = 'weekly' WHERE id = 'b1'"
        );
        assert_eq!(
            build_delete("budgets", "id = 'b1'"),
            "DELETE FROM budgets WHERE id = 'b1'"
        );
    }
}
