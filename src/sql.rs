//! Statement text for the generated SQL.
//!
//! Column lists always start with `id` followed by the registered fields in
//! declaration order.

use crate::schema::FieldDescriptor;

fn column_list(fields: &[FieldDescriptor]) -> String {
    std::iter::once("id")
        .chain(fields.iter().map(|f| f.name()))
        .collect::<Vec<_>>()
        .join(", ")
}

/// `CREATE TABLE IF NOT EXISTS t (id INTEGER PRIMARY KEY AUTOINCREMENT, f1 T1, ...)`
pub fn create_table(table: &str, fields: &[FieldDescriptor]) -> String {
    let columns = std::iter::once("id INTEGER PRIMARY KEY AUTOINCREMENT".to_string())
        .chain(
            fields
                .iter()
                .map(|f| format!("{} {}", f.name(), f.sql_type())),
        )
        .collect::<Vec<_>>()
        .join(", ");
    format!("CREATE TABLE IF NOT EXISTS {} ({})", table, columns)
}

/// `INSERT OR REPLACE INTO t (id, f1, ...) VALUES (NULL|<id>, :f1, ...)`
///
/// `id` is the already-rendered identity literal, or `None` for a new row.
pub fn upsert(table: &str, fields: &[FieldDescriptor], id: Option<&str>) -> String {
    let values = std::iter::once(id.unwrap_or("NULL").to_string())
        .chain(fields.iter().map(|f| placeholder(f.name())))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "INSERT OR REPLACE INTO {} ({}) VALUES ({})",
        table,
        column_list(fields),
        values
    )
}

/// `DELETE FROM t WHERE id = :id`
pub fn delete(table: &str) -> String {
    format!("DELETE FROM {} WHERE id = :id", table)
}

/// `SELECT id, f1, ... FROM t [WHERE <predicate>] [LIMIT 1]`
pub fn select(
    table: &str,
    fields: &[FieldDescriptor],
    predicate: Option<&str>,
    first_only: bool,
) -> String {
    let mut sql = format!("SELECT {} FROM {}", column_list(fields), table);
    if let Some(predicate) = predicate {
        sql.push_str(" WHERE ");
        sql.push_str(predicate);
    }
    if first_only {
        sql.push_str(" LIMIT 1");
    }
    sql
}

/// Named placeholder for a field, e.g. `:name`.
pub fn placeholder(field: &str) -> String {
    format!(":{}", field)
}
