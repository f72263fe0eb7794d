//! One-to-many and many-to-one relations between record types.
//!
//! A belongs-to relation is an INTEGER foreign key column on the child. A
//! has-many relation is not stored at all: it is an in-memory [`HasMany`]
//! collection on the owner, written out (with the foreign key filled in)
//! whenever the owner is saved and removed from storage before the owner is.

use std::any::{Any, TypeId};
use std::fmt;
use std::marker::PhantomData;

use tracing::trace;

use crate::dao::Dao;
use crate::error::{Error, Result};
use crate::record::Record;
use crate::schema::{schema_of, Model};
use crate::sqlite::Database;
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationKind {
    BelongsTo,
    HasMany,
}

/// Relation descriptor registered on owner type `T`.
///
/// The engine calls [`Relation::save_children`] after every save of an owner
/// and [`Relation::remove_children`] before every delete.
pub trait Relation<T: Model>: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    fn kind(&self) -> RelationKind;

    /// Type id of the related record type.
    fn target(&self) -> TypeId;

    fn target_table(&self) -> &'static str;

    /// Foreign key column on `T`, for belongs-to relations.
    fn foreign_key(&self) -> Option<&str> {
        None
    }

    fn save_children(&self, db: &Database, owner: &mut T) -> Result<()>;

    fn remove_children(&self, db: &Database, owner: &T) -> Result<()>;

    /// Called once the save that cascaded to the children has committed or
    /// rolled back.
    fn settle_children(&self, _owner: &mut T, _committed: bool) {}

    fn as_any(&self) -> &dyn Any;
}

/// `T` belongs to `P` through the `<name>_id` column.
pub struct BelongsTo<T, P> {
    name: String,
    foreign_key: String,
    _types: PhantomData<fn() -> (T, P)>,
}

impl<T: Model, P: Model> BelongsTo<T, P> {
    pub(crate) fn new(name: &str, foreign_key: String) -> Self {
        Self {
            name: name.to_string(),
            foreign_key,
            _types: PhantomData,
        }
    }
}

impl<T, P> fmt::Debug for BelongsTo<T, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BelongsTo")
            .field("name", &self.name)
            .field("foreign_key", &self.foreign_key)
            .finish()
    }
}

impl<T: Model, P: Model> Relation<T> for BelongsTo<T, P> {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> RelationKind {
        RelationKind::BelongsTo
    }

    fn target(&self) -> TypeId {
        TypeId::of::<P>()
    }

    fn target_table(&self) -> &'static str {
        P::table_name()
    }

    fn foreign_key(&self) -> Option<&str> {
        Some(&self.foreign_key)
    }

    fn save_children(&self, _db: &Database, _owner: &mut T) -> Result<()> {
        Ok(())
    }

    fn remove_children(&self, _db: &Database, _owner: &T) -> Result<()> {
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// `T` has many `C`, held in a [`HasMany<C>`] field of `T`.
pub struct HasManyRelation<T, C> {
    name: String,
    get: fn(&T) -> &HasMany<C>,
    get_mut: fn(&mut T) -> &mut HasMany<C>,
}

impl<T: Model, C: Model> HasManyRelation<T, C> {
    pub(crate) fn new(
        name: &str,
        get: fn(&T) -> &HasMany<C>,
        get_mut: fn(&mut T) -> &mut HasMany<C>,
    ) -> Self {
        Self {
            name: name.to_string(),
            get,
            get_mut,
        }
    }

    pub fn children<'a>(&self, owner: &'a T) -> &'a HasMany<C> {
        (self.get)(owner)
    }

    pub fn children_mut<'a>(&self, owner: &'a mut T) -> &'a mut HasMany<C> {
        (self.get_mut)(owner)
    }

    /// Foreign key column on `C` pointing back at `T`.
    pub fn child_key(&self) -> Result<&'static str> {
        schema_of::<C>()
            .foreign_key_to::<T>()
            .ok_or_else(|| Error::UnknownRelation {
                table: C::table_name(),
                relation: format!("belonging to `{}`", T::table_name()),
            })
    }

    /// Replace the in-memory collection with the children currently stored
    /// for `owner`, and return them.
    pub fn fetch(&self, db: &Database, owner: &mut T) -> Result<Vec<C>> {
        let fetched = Dao::<C>::new(db)?.query_by_parent(&*owner)?;
        self.children_mut(owner).set(fetched.clone());
        Ok(fetched)
    }
}

impl<T, C> fmt::Debug for HasManyRelation<T, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HasManyRelation")
            .field("name", &self.name)
            .finish()
    }
}

impl<T: Model, C: Model> Relation<T> for HasManyRelation<T, C> {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> RelationKind {
        RelationKind::HasMany
    }

    fn target(&self) -> TypeId {
        TypeId::of::<C>()
    }

    fn target_table(&self) -> &'static str {
        C::table_name()
    }

    fn save_children(&self, db: &Database, owner: &mut T) -> Result<()> {
        let Some(id) = owner.id() else {
            return Ok(());
        };
        let foreign_key = self.child_key()?;
        let dao = Dao::<C>::new(db)?;
        for child in self.children_mut(owner).iter_mut() {
            trace!(relation = %self.name, owner = id, "cascade save");
            child.record_mut().set(foreign_key, Value::Int64(id))?;
            dao.save_tree(child)?;
        }
        Ok(())
    }

    fn remove_children(&self, db: &Database, owner: &T) -> Result<()> {
        let Some(id) = owner.id() else {
            return Ok(());
        };
        let dao = Dao::<C>::new(db)?;
        for child in dao.query_by_parent(owner)? {
            trace!(relation = %self.name, owner = id, child = ?child.id(), "cascade remove");
            dao.remove_tree(&child)?;
        }
        Ok(())
    }

    fn settle_children(&self, owner: &mut T, committed: bool) {
        let orphaned = owner.id().is_none();
        let foreign_key = self.child_key().ok();
        for child in self.children_mut(owner).iter_mut() {
            Dao::<C>::settle(child, committed);
            let Some(foreign_key) = foreign_key.filter(|_| orphaned) else {
                continue;
            };
            trace!(relation = %self.name, "owner id revoked, unsetting foreign key");
            // The key was registered as Int64, so this cannot mismatch.
            let _ = child.record_mut().set(foreign_key, Value::Int64(-1));
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// In-memory children of a has-many relation.
///
/// Mutations stay in memory until the owner is next saved.
#[derive(Debug, Clone)]
pub struct HasMany<C> {
    items: Vec<C>,
}

impl<C> Default for HasMany<C> {
    fn default() -> Self {
        Self { items: Vec::new() }
    }
}

impl<C: Model> HasMany<C> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, child: C) {
        self.items.push(child);
    }

    /// Drop every entry denoting `child`: the same row once saved, an equal
    /// record before that.
    pub fn remove(&mut self, child: &C) {
        self.items
            .retain(|item| !same_child(item.record(), child.record()));
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn get(&self) -> &[C] {
        &self.items
    }

    pub fn get_mut(&mut self) -> &mut Vec<C> {
        &mut self.items
    }

    pub fn set(&mut self, items: Vec<C>) {
        self.items = items;
    }

    pub fn iter(&self) -> std::slice::Iter<'_, C> {
        self.items.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, C> {
        self.items.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

fn same_child(a: &Record, b: &Record) -> bool {
    if a.is_saved() || b.is_saved() {
        a.same_identity(b)
    } else {
        a == b
    }
}

/// Point `child`'s foreign key at `parent`, or unset it (`-1`) when the
/// parent has not been saved yet.
pub fn set_parent<T: Model, P: Model>(child: &mut T, parent: &P) -> Result<()> {
    let foreign_key = schema_of::<T>()
        .foreign_key_to::<P>()
        .ok_or_else(|| Error::UnknownRelation {
            table: T::table_name(),
            relation: format!("belonging to `{}`", P::table_name()),
        })?;
    child
        .record_mut()
        .set(foreign_key, Value::Int64(parent.id().unwrap_or(-1)))
}
