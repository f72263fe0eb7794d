//! Instance state shared by every record type.

use indexmap::IndexMap;
use serde::Serialize;

use crate::error::{Error, Result};
use crate::schema::{schema_of, Model};
use crate::value::Value;

/// Identity plus current field values of one record.
///
/// `values` always holds exactly one entry per registered field, in column
/// order, and each entry keeps the kind of that field's default.
#[derive(Debug, Clone, Serialize)]
pub struct Record {
    table: &'static str,
    id: Option<i64>,
    values: IndexMap<String, Value>,
    /// The id was assigned by a save whose outcome is not settled yet.
    #[serde(skip)]
    unsettled: bool,
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        self.table == other.table && self.id == other.id && self.values == other.values
    }
}

impl Record {
    /// An unsaved record of type `T` with every field at its default.
    pub fn new<T: Model>() -> Self {
        let schema = schema_of::<T>();
        let values = schema
            .fields()
            .iter()
            .map(|f| (f.name().to_string(), f.default_value().clone()))
            .collect();
        Self {
            table: schema.table(),
            id: None,
            values,
            unsettled: false,
        }
    }

    pub(crate) fn materialized(table: &'static str, id: i64, values: IndexMap<String, Value>) -> Self {
        Self {
            table,
            id: Some(id),
            values,
            unsettled: false,
        }
    }

    pub fn table(&self) -> &'static str {
        self.table
    }

    /// Row identity, `None` until the record is first saved.
    pub fn id(&self) -> Option<i64> {
        self.id
    }

    pub fn is_saved(&self) -> bool {
        self.id.is_some()
    }

    pub(crate) fn assign_id(&mut self, id: i64) {
        self.id = Some(id);
        self.unsettled = true;
    }

    /// Close out the save that assigned the id. When that save was rolled
    /// back the id is dropped again; returns whether it was.
    pub(crate) fn settle(&mut self, committed: bool) -> bool {
        let revoked = self.unsettled && !committed;
        if revoked {
            self.id = None;
        }
        self.unsettled = false;
        revoked
    }

    /// Two records denote the same stored row.
    pub fn same_identity(&self, other: &Record) -> bool {
        self.table == other.table && self.id.is_some() && self.id == other.id
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.values.get(field)
    }

    /// Replace a field's value. The new value must have the field's kind.
    pub fn set(&mut self, field: &str, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        let table = self.table;
        let slot = self
            .values
            .get_mut(field)
            .ok_or_else(|| Error::UnknownField {
                table,
                field: field.to_string(),
            })?;
        if slot.kind() != value.kind() {
            return Err(Error::TypeMismatch {
                field: field.to_string(),
                expected: slot.kind().name(),
                found: value.kind().name(),
            });
        }
        *slot = value;
        Ok(())
    }

    /// Field values in column order.
    pub fn values(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
