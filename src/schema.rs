//! Field descriptors, record type declarations and the schema registry.
//!
//! Each record type declares its fields and relations once through
//! [`Model::declare`]. The declaration is evaluated the first time the type is
//! touched (first instance or first [`crate::Dao`]) and the resulting
//! [`Schema`] lives for the rest of the process. Field order is declaration
//! order, and it fixes the column order of every generated statement.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::record::Record;
use crate::relation::{BelongsTo, HasMany, HasManyRelation, Relation, RelationKind};
use crate::value::{Value, ValueKind};

/// Declared storage type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SqlType {
    Text,
    Integer,
    Num,
    Real,
    Date,
}

impl SqlType {
    pub fn as_str(self) -> &'static str {
        match self {
            SqlType::Text => "TEXT",
            SqlType::Integer => "INTEGER",
            SqlType::Num => "NUM",
            SqlType::Real => "REAL",
            SqlType::Date => "DATE",
        }
    }
}

impl fmt::Display for SqlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Static metadata for one column of a record type.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDescriptor {
    name: String,
    sql_type: SqlType,
    default: Value,
}

impl FieldDescriptor {
    pub fn new(name: impl Into<String>, sql_type: SqlType, default: Value) -> Self {
        Self {
            name: name.into(),
            sql_type,
            default,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn sql_type(&self) -> SqlType {
        self.sql_type
    }

    pub fn default_value(&self) -> &Value {
        &self.default
    }

    /// Kind every value of this field must have.
    pub fn kind(&self) -> ValueKind {
        self.default.kind()
    }
}

/// A persisted record type.
///
/// Implementors own a [`Record`] plus one [`HasMany`] per one-to-many
/// relation, and describe their columns in [`Model::declare`].
pub trait Model: Clone + 'static {
    /// Name of the table backing this type.
    fn table_name() -> &'static str;

    /// Declare fields and relations, in column order.
    fn declare(schema: &mut SchemaBuilder<Self>);

    /// Wrap a materialized record. Has-many collections start empty.
    fn from_record(record: Record) -> Self;

    fn record(&self) -> &Record;

    fn record_mut(&mut self) -> &mut Record;

    /// A new, unsaved instance with every field at its default.
    fn instantiate() -> Self {
        Self::from_record(Record::new::<Self>())
    }

    fn id(&self) -> Option<i64> {
        self.record().id()
    }
}

/// Collects the declaration of a record type.
pub struct SchemaBuilder<T: Model> {
    fields: Vec<FieldDescriptor>,
    relations: Vec<Box<dyn Relation<T>>>,
}

impl<T: Model> SchemaBuilder<T> {
    fn new() -> Self {
        Self {
            fields: Vec::new(),
            relations: Vec::new(),
        }
    }

    /// Declare a field whose column type follows from the default's kind.
    pub fn field(&mut self, name: &str, default: impl Into<Value>) -> &mut Self {
        let default = default.into();
        let sql_type = default.kind().sql_type();
        self.typed_field(name, sql_type, default)
    }

    /// Declare a field with an explicit column type, e.g. `NUM`.
    pub fn typed_field(
        &mut self,
        name: &str,
        sql_type: SqlType,
        default: impl Into<Value>,
    ) -> &mut Self {
        if name == "id" || self.fields.iter().any(|f| f.name() == name) {
            warn!(table = T::table_name(), field = name, "field declared twice, ignoring");
            return self;
        }
        self.fields
            .push(FieldDescriptor::new(name, sql_type, default.into()));
        self
    }

    /// Declare a many-to-one relation. Adds an INTEGER `<name>_id` column
    /// holding the parent's identity, `-1` while unset. Ignored when that
    /// column or relation name is already taken.
    pub fn belongs_to<P: Model>(&mut self, name: &str) -> &mut Self {
        let foreign_key = format!("{}_id", name);
        let taken = foreign_key == "id" || self.fields.iter().any(|f| f.name() == foreign_key);
        if taken || self.relations.iter().any(|r| r.name() == name) {
            warn!(
                table = T::table_name(),
                relation = name,
                column = %foreign_key,
                "belongs-to conflicts with an earlier declaration, ignoring"
            );
            return self;
        }
        self.typed_field(&foreign_key, SqlType::Integer, Value::Int64(-1));
        self.relations
            .push(Box::new(BelongsTo::<T, P>::new(name, foreign_key)));
        self
    }

    /// Declare a one-to-many relation stored in the owner's `HasMany<C>`.
    /// The child type must declare a `belongs_to` back to this type.
    pub fn has_many<C: Model>(
        &mut self,
        name: &str,
        get: fn(&T) -> &HasMany<C>,
        get_mut: fn(&mut T) -> &mut HasMany<C>,
    ) -> &mut Self {
        if self.relations.iter().any(|r| r.name() == name) {
            warn!(table = T::table_name(), relation = name, "relation declared twice, ignoring");
            return self;
        }
        self.relations
            .push(Box::new(HasManyRelation::<T, C>::new(name, get, get_mut)));
        self
    }
}

/// Registered fields and relations of one record type.
pub struct Schema<T: Model> {
    fields: Vec<FieldDescriptor>,
    relations: Vec<Box<dyn Relation<T>>>,
    _model: PhantomData<fn() -> T>,
}

impl<T: Model> Schema<T> {
    fn build() -> Self {
        let mut builder = SchemaBuilder::new();
        T::declare(&mut builder);
        Self {
            fields: builder.fields,
            relations: builder.relations,
            _model: PhantomData,
        }
    }

    pub fn table(&self) -> &'static str {
        T::table_name()
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    pub fn relations(&self) -> &[Box<dyn Relation<T>>] {
        &self.relations
    }

    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name() == name)
    }

    /// True for `id` and every registered field.
    pub fn has_column(&self, name: &str) -> bool {
        name == "id" || self.field(name).is_some()
    }

    /// Foreign key column of the belongs-to relation targeting `P`.
    pub fn foreign_key_to<P: Model>(&self) -> Option<&str> {
        self.relations
            .iter()
            .filter(|r| r.kind() == RelationKind::BelongsTo && r.target() == TypeId::of::<P>())
            .find_map(|r| r.foreign_key())
    }

    /// Has-many relation named `name` whose children are `C`.
    pub fn has_many<C: Model>(&self, name: &str) -> Option<&HasManyRelation<T, C>> {
        self.relations
            .iter()
            .filter(|r| r.name() == name)
            .find_map(|r| r.as_any().downcast_ref::<HasManyRelation<T, C>>())
    }
}

impl<T: Model> fmt::Debug for Schema<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Schema")
            .field("table", &T::table_name())
            .field("fields", &self.fields)
            .field("relations", &self.relations)
            .finish()
    }
}

type Registry = HashMap<TypeId, &'static (dyn Any + Send + Sync)>;

static REGISTRY: Lazy<RwLock<Registry>> = Lazy::new(|| RwLock::new(HashMap::new()));

fn lookup<T: Model>() -> Option<&'static Schema<T>> {
    let registry = REGISTRY.read();
    let entry: &'static (dyn Any + Send + Sync) = *registry.get(&TypeId::of::<T>())?;
    entry.downcast_ref::<Schema<T>>()
}

/// Schema of `T`, registering it on first use.
///
/// The declaration runs outside the registry lock, so declarations may refer
/// to other record types. When two threads race, the first insert wins and
/// the loser's copy is discarded.
pub fn schema_of<T: Model>() -> &'static Schema<T> {
    if let Some(schema) = lookup::<T>() {
        return schema;
    }
    let built: &'static Schema<T> = Box::leak(Box::new(Schema::<T>::build()));
    let mut registry = REGISTRY.write();
    let entry: &'static (dyn Any + Send + Sync) =
        *registry.entry(TypeId::of::<T>()).or_insert_with(|| {
            debug!(
                table = T::table_name(),
                fields = built.fields.len(),
                relations = built.relations.len(),
                "registered schema"
            );
            built as &'static (dyn Any + Send + Sync)
        });
    entry.downcast_ref::<Schema<T>>().unwrap_or(built)
}

/// Whether `T` has been registered yet.
pub fn is_registered<T: Model>() -> bool {
    REGISTRY.read().contains_key(&TypeId::of::<T>())
}

/// Registered fields of `T` in column order.
pub fn fields_of<T: Model>() -> &'static [FieldDescriptor] {
    schema_of::<T>().fields()
}

pub fn relations_of<T: Model>() -> &'static [Box<dyn Relation<T>>] {
    schema_of::<T>().relations()
}
