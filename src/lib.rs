//! Declarative object-relational mapping over SQLite for the Runar ecosystem.
//!
//! # Intention
//!
//! - Describe a record type once (fields, defaults, relations) and persist,
//!   query and cascade-manage its instances without hand-written SQL.
//! - Encapsulate SQLite-specific logic, types, and error handling.
//!
//! # Architectural Boundaries
//!
//! - Only mapping and SQLite/database code belongs here.
//! - Connection management beyond a single shared handle, migrations and
//!   query planning are out of scope.

pub mod dao;
pub mod error;
pub mod record;
pub mod relation;
pub mod schema;
pub mod sql;
pub mod sqlite;
pub mod value;

pub use dao::Dao;
pub use error::{Error, Result};
pub use record::Record;
pub use relation::{set_parent, BelongsTo, HasMany, HasManyRelation, Relation, RelationKind};
pub use schema::{
    fields_of, is_registered, relations_of, schema_of, FieldDescriptor, Model, Schema,
    SchemaBuilder, SqlType,
};
pub use sqlite::{CascadeMode, Database, Params, SqliteConfig};
pub use value::{SqlDate, Value, ValueKind};
