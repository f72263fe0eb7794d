//! Error types for the mapping layer.

use thiserror::Error;

/// Errors raised by the mapping layer.
///
/// Everything except [`Error::Sqlite`] signals a declaration or programming
/// defect; absence of a row is never an error and shows up as `None` or an
/// empty `Vec` instead.
#[derive(Debug, Error)]
pub enum Error {
    /// A primitive kind outside the supported set was boxed.
    #[error("unsupported value type: {0}")]
    UnsupportedType(String),

    /// A stored column could not be decoded as the field's declared kind.
    #[error("field `{field}` holds a value of unknown type: {found}")]
    UnknownFieldType { field: String, found: String },

    /// A value of the wrong kind was assigned to a field.
    #[error("field `{field}` expects {expected}, got {found}")]
    TypeMismatch {
        field: String,
        expected: &'static str,
        found: &'static str,
    },

    /// The field was never registered for the record type.
    #[error("table `{table}` has no field `{field}`")]
    UnknownField { table: &'static str, field: String },

    /// The relation was never registered for the record type.
    #[error("table `{table}` has no relation {relation}")]
    UnknownRelation { table: &'static str, relation: String },

    /// Failure reported by the SQLite driver, passed through unmodified.
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
