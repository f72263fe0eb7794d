use std::any::TypeId;
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};

use rusqlite::types::ToSql;
use rusqlite::{Connection, Transaction};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::error::Result;
use crate::schema::{schema_of, Model};
use crate::sql;
use crate::value::Value;

/// Parameter bindings for ad-hoc predicates
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Params {
    pub values: HashMap<String, Value>,
}

impl Params {
    /// Create a new Params object
    pub fn new() -> Self {
        Self::default()
    }
    /// Add a named value. The name is the placeholder as written in the
    /// predicate, e.g. `":score"`.
    pub fn with_value(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.values.insert(name.to_string(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Named bindings in the shape rusqlite expects.
    pub(crate) fn as_named(&self) -> Vec<(&str, &dyn ToSql)> {
        self.values
            .iter()
            .map(|(name, value)| {
                trace!(param = %name, value = %value.render(), "bind");
                (name.as_str(), value as &dyn ToSql)
            })
            .collect()
    }
}

/// How cascading save/remove interacts with transactions.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CascadeMode {
    /// Each statement commits on its own. A failure midway leaves the
    /// statements that already ran in place.
    #[default]
    BestEffort,
    /// A top-level save/remove and its whole cascade run in one transaction.
    /// Joins the caller's transaction when one is already open.
    Atomic,
}

/// SQLite configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SqliteConfig {
    /// Path to the SQLite database file, `:memory:` for an in-memory store
    pub db_path: String,
    /// Transaction behaviour of cascades
    #[serde(default)]
    pub cascade: CascadeMode,
}

impl SqliteConfig {
    /// Create a new SQLite config with path and the default cascade mode
    pub fn new(db_path: impl Into<String>) -> Self {
        Self {
            db_path: db_path.into(),
            cascade: CascadeMode::default(),
        }
    }

    pub fn with_cascade(mut self, cascade: CascadeMode) -> Self {
        self.cascade = cascade;
        self
    }
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self::new(":memory:")
    }
}

/// Connection shared by every [`crate::Dao`].
///
/// Tables are provisioned at most once per record type for the lifetime of
/// the connection. Not thread safe: SQLite's own connection guarantees are
/// the only protection.
#[derive(Debug)]
pub struct Database {
    conn: Connection,
    config: SqliteConfig,
    provisioned: RefCell<HashSet<TypeId>>,
    /// Types provisioned inside the open cascade transaction, if any.
    pending: RefCell<Option<Vec<TypeId>>>,
}

impl Database {
    pub fn open(config: SqliteConfig) -> Result<Self> {
        debug!(path = %config.db_path, cascade = ?config.cascade, "opening sqlite database");
        let conn = if config.db_path == ":memory:" {
            Connection::open_in_memory()?
        } else {
            Connection::open(&config.db_path)?
        };
        Ok(Self {
            conn,
            config,
            provisioned: RefCell::new(HashSet::new()),
            pending: RefCell::new(None),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::open(SqliteConfig::default())
    }

    pub fn config(&self) -> &SqliteConfig {
        &self.config
    }

    /// The underlying driver handle.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Execute raw SQL, possibly several statements.
    pub fn execute(&self, sql: &str) -> Result<()> {
        debug!(sql, "execute");
        self.conn.execute_batch(sql)?;
        Ok(())
    }

    pub fn is_provisioned<T: Model>(&self) -> bool {
        self.provisioned.borrow().contains(&TypeId::of::<T>())
    }

    /// Create the table of `T` unless this connection already did.
    pub(crate) fn provision<T: Model>(&self) -> Result<()> {
        if self.is_provisioned::<T>() {
            return Ok(());
        }
        let schema = schema_of::<T>();
        let q = sql::create_table(schema.table(), schema.fields());
        debug!(sql = %q, "provisioning table");
        self.conn.execute_batch(&q)?;
        self.provisioned.borrow_mut().insert(TypeId::of::<T>());
        if let Some(pending) = self.pending.borrow_mut().as_mut() {
            pending.push(TypeId::of::<T>());
        }
        Ok(())
    }

    pub(crate) fn last_insert_rowid(&self) -> i64 {
        self.conn.last_insert_rowid()
    }

    /// Open a transaction for a top-level cascade when configured to, and
    /// when the caller has none open already.
    pub(crate) fn begin_cascade(&self) -> Result<Cascade<'_>> {
        if self.config.cascade != CascadeMode::Atomic || !self.conn.is_autocommit() {
            return Ok(Cascade { db: self, tx: None });
        }
        trace!("begin cascade transaction");
        let tx = self.conn.unchecked_transaction()?;
        *self.pending.borrow_mut() = Some(Vec::new());
        Ok(Cascade { db: self, tx: Some(tx) })
    }

    /// Tables created inside a rolled-back transaction no longer exist.
    fn forget_pending(&self) {
        let Some(pending) = self.pending.borrow_mut().take() else {
            return;
        };
        let mut provisioned = self.provisioned.borrow_mut();
        for type_id in pending {
            provisioned.remove(&type_id);
        }
    }
}

/// Scope of one top-level save/remove. Rolls back on drop unless committed.
pub(crate) struct Cascade<'db> {
    db: &'db Database,
    tx: Option<Transaction<'db>>,
}

impl Cascade<'_> {
    pub(crate) fn is_atomic(&self) -> bool {
        self.tx.is_some()
    }

    pub(crate) fn commit(mut self) -> Result<()> {
        let Some(tx) = self.tx.take() else {
            return Ok(());
        };
        match tx.commit() {
            Ok(()) => {
                trace!("cascade committed");
                self.db.pending.borrow_mut().take();
                Ok(())
            }
            Err(err) => {
                self.db.forget_pending();
                Err(err.into())
            }
        }
    }
}

impl Drop for Cascade<'_> {
    fn drop(&mut self) {
        if let Some(tx) = self.tx.take() {
            trace!("cascade rolled back");
            drop(tx);
            self.db.forget_pending();
        }
    }
}
