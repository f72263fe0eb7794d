//! Data-access engine: table provisioning, save/remove with cascades, and
//! field-qualified queries for one record type.

use indexmap::IndexMap;
use rusqlite::types::ToSql;
use rusqlite::{named_params, Row};
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::record::Record;
use crate::schema::{schema_of, Model, Schema};
use crate::sql;
use crate::sqlite::{Database, Params};
use crate::value::Value;

/// Data-access engine bound to record type `T`.
///
/// Creating one provisions `T`'s table on the connection if that has not
/// happened yet. Engines are cheap; create them where needed.
pub struct Dao<'db, T: Model> {
    db: &'db Database,
    schema: &'static Schema<T>,
}

impl<'db, T: Model> Dao<'db, T> {
    pub fn new(db: &'db Database) -> Result<Self> {
        db.provision::<T>()?;
        Ok(Self {
            db,
            schema: schema_of::<T>(),
        })
    }

    pub fn database(&self) -> &'db Database {
        self.db
    }

    pub fn schema(&self) -> &'static Schema<T> {
        self.schema
    }

    /// Insert or replace `record`, then save its has-many children.
    ///
    /// A new record receives its row id; children receive the owner's id in
    /// their foreign key. Under [`crate::CascadeMode::Atomic`] a failure rolls
    /// back the whole cascade: every record in the tree that received its id
    /// during this save is left unsaved again, and its children's foreign
    /// keys are unset.
    pub fn save(&self, record: &mut T) -> Result<()> {
        let cascade = self.db.begin_cascade()?;
        let atomic = cascade.is_atomic();
        let result = self.save_tree(record).and_then(|()| cascade.commit());
        Self::settle(record, result.is_ok() || !atomic);
        result
    }

    /// Settle the ids assigned by the last save of `record` and its children.
    pub(crate) fn settle(record: &mut T, committed: bool) {
        if record.record_mut().settle(committed) {
            debug!(table = T::table_name(), "save rolled back, id revoked");
        }
        for relation in schema_of::<T>().relations() {
            relation.settle_children(record, committed);
        }
    }

    pub(crate) fn save_tree(&self, record: &mut T) -> Result<()> {
        let fields = self.schema.fields();
        let id_literal = record.id().map(|id| Value::Int64(id).render());
        let q = sql::upsert(self.schema.table(), fields, id_literal.as_deref());
        debug!(sql = %q, "save");

        let placeholders: Vec<String> = fields.iter().map(|f| sql::placeholder(f.name())).collect();
        {
            let mut bindings: Vec<(&str, &dyn ToSql)> = Vec::with_capacity(fields.len());
            for (field, placeholder) in fields.iter().zip(&placeholders) {
                let value = record
                    .record()
                    .get(field.name())
                    .unwrap_or_else(|| field.default_value());
                trace!(param = %placeholder, value = %value.render(), "bind");
                bindings.push((placeholder.as_str(), value as &dyn ToSql));
            }
            let mut stmt = self.db.connection().prepare(&q)?;
            stmt.execute(bindings.as_slice())?;
        }

        if !record.record().is_saved() {
            let id = self.db.last_insert_rowid();
            trace!(table = self.schema.table(), id, "assigned id");
            record.record_mut().assign_id(id);
        }

        for relation in self.schema.relations() {
            relation.save_children(self.db, record)?;
        }
        Ok(())
    }

    /// Delete `record` after deleting its stored has-many children.
    ///
    /// Children are looked up in storage, not in memory. The instance stays
    /// usable but no longer denotes a row. Removing an unsaved record does
    /// nothing.
    pub fn remove(&self, record: &T) -> Result<()> {
        let cascade = self.db.begin_cascade()?;
        self.remove_tree(record)?;
        cascade.commit()
    }

    pub(crate) fn remove_tree(&self, record: &T) -> Result<()> {
        let Some(id) = record.id() else {
            debug!(table = self.schema.table(), "remove of unsaved record ignored");
            return Ok(());
        };
        for relation in self.schema.relations() {
            relation.remove_children(self.db, record)?;
        }
        let q = sql::delete(self.schema.table());
        debug!(sql = %q, id, "remove");
        let mut stmt = self.db.connection().prepare(&q)?;
        stmt.execute(named_params! { ":id": id })?;
        Ok(())
    }

    /// First record whose `field` equals `value`.
    pub fn query_by_field(&self, field: &str, value: impl Into<Value>) -> Result<Option<T>> {
        let value = value.into();
        let predicate = self.equality(field)?;
        let q = sql::select(self.schema.table(), self.schema.fields(), Some(&predicate), true);
        trace!(param = ":v", value = %value.render(), "bind");
        Ok(self.load(&q, &[(":v", &value as &dyn ToSql)])?.into_iter().next())
    }

    /// Every record whose `field` equals `value`, in storage order.
    pub fn query_all_by_field(&self, field: &str, value: impl Into<Value>) -> Result<Vec<T>> {
        let value = value.into();
        let predicate = self.equality(field)?;
        let q = sql::select(self.schema.table(), self.schema.fields(), Some(&predicate), false);
        trace!(param = ":v", value = %value.render(), "bind");
        self.load(&q, &[(":v", &value as &dyn ToSql)])
    }

    pub fn query_all(&self) -> Result<Vec<T>> {
        let q = sql::select(self.schema.table(), self.schema.fields(), None, false);
        self.load(&q, &[])
    }

    /// Records matching a custom predicate, e.g. `"score > :min"`, with its
    /// placeholders bound from `params`.
    pub fn query_all_where(&self, predicate: &str, params: &Params) -> Result<Vec<T>> {
        let q = sql::select(self.schema.table(), self.schema.fields(), Some(predicate), false);
        self.load(&q, &params.as_named())
    }

    pub fn query_first(&self) -> Result<Option<T>> {
        let q = sql::select(self.schema.table(), self.schema.fields(), None, true);
        Ok(self.load(&q, &[])?.into_iter().next())
    }

    pub fn query_first_where(&self, predicate: &str, params: &Params) -> Result<Option<T>> {
        let q = sql::select(self.schema.table(), self.schema.fields(), Some(predicate), true);
        Ok(self.load(&q, &params.as_named())?.into_iter().next())
    }

    /// Parent of `record` through its belongs-to relation to `P`. `None`
    /// when the foreign key is unset or points at no row.
    pub fn parent<P: Model>(&self, record: &T) -> Result<Option<P>> {
        let foreign_key = self.foreign_key_to::<P>()?;
        match record.record().get(foreign_key) {
            Some(Value::Int64(id)) if *id != -1 => Dao::<P>::new(self.db)?.query_by_field("id", *id),
            _ => Ok(None),
        }
    }

    /// Every record whose belongs-to foreign key points at `parent`.
    pub fn query_by_parent<P: Model>(&self, parent: &P) -> Result<Vec<T>> {
        let foreign_key = self.foreign_key_to::<P>()?;
        match parent.id() {
            Some(id) => self.query_all_by_field(foreign_key, id),
            None => Ok(Vec::new()),
        }
    }

    /// Refresh the has-many collection `relation` of `owner` from storage and
    /// return the fetched children. Unsaved in-memory entries are dropped.
    pub fn fetch_children<C: Model>(&self, owner: &mut T, relation: &str) -> Result<Vec<C>> {
        self.schema
            .has_many::<C>(relation)
            .ok_or_else(|| Error::UnknownRelation {
                table: self.schema.table(),
                relation: format!("`{}`", relation),
            })?
            .fetch(self.db, owner)
    }

    fn foreign_key_to<P: Model>(&self) -> Result<&'static str> {
        self.schema
            .foreign_key_to::<P>()
            .ok_or_else(|| Error::UnknownRelation {
                table: self.schema.table(),
                relation: format!("belonging to `{}`", P::table_name()),
            })
    }

    fn equality(&self, field: &str) -> Result<String> {
        if !self.schema.has_column(field) {
            return Err(Error::UnknownField {
                table: self.schema.table(),
                field: field.to_string(),
            });
        }
        Ok(format!("{} = :v", field))
    }

    fn load(&self, q: &str, params: &[(&str, &dyn ToSql)]) -> Result<Vec<T>> {
        debug!(sql = %q, "query");
        let mut stmt = self.db.connection().prepare(q)?;
        let mut rows = stmt.query(params)?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(self.materialize(row)?);
        }
        Ok(out)
    }

    fn materialize(&self, row: &Row<'_>) -> Result<T> {
        let id: i64 = row.get(0)?;
        let fields = self.schema.fields();
        let mut values = IndexMap::with_capacity(fields.len());
        for (i, field) in fields.iter().enumerate() {
            let value = Value::decode(field.name(), field.kind(), row.get_ref(i + 1)?)?;
            values.insert(field.name().to_string(), value);
        }
        Ok(T::from_record(Record::materialized(self.schema.table(), id, values)))
    }
}
