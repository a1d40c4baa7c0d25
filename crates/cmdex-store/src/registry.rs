//! SQLite-backed session registry
//!
//! Sessions read committed rows; [`SessionRegistry::transact`] runs the
//! pending batch inside one SQLite transaction. Revision checks are
//! conditional `UPDATE ... WHERE revision = ?` statements, so a row changed
//! by another writer since it was read updates nothing and surfaces as a
//! `ConcurrencyConflict`.

#![allow(clippy::result_large_err)]

use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use cmdex_core::errors::EngineError;
use cmdex_core::model::{AuditRecord, IdentityLink, Task, User};
use cmdex_core::session::{
    AuditLogSink, Mutation, Record, Session, SessionKey, SessionRegistry, UnitOfWork,
};
use rusqlite::{params, Connection, OptionalExtension};

use crate::db;
use crate::errors::{from_rusqlite, lock_poisoned, Result};
use crate::migrations::apply_migrations;
use crate::rows::{
    audit_from_row, link_from_row, revision_to_sql, task_from_row, user_from_row, AUDIT_COLUMNS,
    LINK_COLUMNS, TASK_COLUMNS, USER_COLUMNS,
};

/// Session registry over one SQLite connection
///
/// Cloning shares the connection.
#[derive(Debug, Clone)]
pub struct SqliteRegistry {
    conn: Arc<Mutex<Connection>>,
}

fn lock(conn: &Mutex<Connection>) -> Result<MutexGuard<'_, Connection>> {
    conn.lock().map_err(|_| lock_poisoned())
}

impl SqliteRegistry {
    /// Open (or create) the database at `path` and migrate it
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::initialize(db::open(path)?)
    }

    /// Fresh migrated in-memory database
    pub fn open_in_memory() -> Result<Self> {
        Self::initialize(db::open_in_memory()?)
    }

    fn initialize(mut conn: Connection) -> Result<Self> {
        db::configure(&conn)?;
        apply_migrations(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Insert or overwrite a task as-is, bypassing commands
    pub fn insert_task(&self, task: &Task) -> Result<()> {
        let conn = lock(&self.conn)?;
        conn.execute(
            "INSERT INTO tasks (id, name, revision) VALUES (?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET name = excluded.name, revision = excluded.revision",
            params![task.id, task.name, revision_to_sql(task.revision)],
        )
        .map_err(from_rusqlite)?;
        Ok(())
    }

    /// Insert or overwrite a user as-is, bypassing commands
    pub fn insert_user(&self, user: &User) -> Result<()> {
        let conn = lock(&self.conn)?;
        let hash = password_hash(user);
        conn.execute(
            "INSERT INTO users (id, first_name, last_name, email, password_hash, revision)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(id) DO UPDATE SET
                first_name = excluded.first_name,
                last_name = excluded.last_name,
                email = excluded.email,
                password_hash = excluded.password_hash,
                revision = excluded.revision",
            params![
                user.id,
                user.first_name,
                user.last_name,
                user.email,
                hash,
                revision_to_sql(user.revision)
            ],
        )
        .map_err(from_rusqlite)?;
        Ok(())
    }

    pub fn task(&self, id: &str) -> Result<Option<Task>> {
        query_task(&*lock(&self.conn)?, id)
    }

    pub fn user(&self, id: &str) -> Result<Option<User>> {
        query_user(&*lock(&self.conn)?, id)
    }

    /// Committed links of `target_id`, in insertion order
    pub fn identity_links(&self, target_id: &str) -> Result<Vec<IdentityLink>> {
        query_links(&*lock(&self.conn)?, target_id)
    }

    /// Committed audit records, in append order
    pub fn audit_log(&self) -> Result<Vec<AuditRecord>> {
        let conn = lock(&self.conn)?;
        let mut stmt = conn
            .prepare(&format!("SELECT {AUDIT_COLUMNS} FROM audit_log ORDER BY seq"))
            .map_err(from_rusqlite)?;
        let records = stmt
            .query_map([], audit_from_row)
            .map_err(from_rusqlite)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(from_rusqlite)?;
        Ok(records)
    }
}

fn password_hash(user: &User) -> Option<&str> {
    user.credential.as_ref().map(|c| c.hash.as_str())
}

fn query_task(conn: &Connection, id: &str) -> Result<Option<Task>> {
    conn.query_row(
        &format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1"),
        [id],
        task_from_row,
    )
    .optional()
    .map_err(from_rusqlite)
}

fn query_user(conn: &Connection, id: &str) -> Result<Option<User>> {
    conn.query_row(
        &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
        [id],
        user_from_row,
    )
    .optional()
    .map_err(from_rusqlite)
}

fn query_links(conn: &Connection, target_id: &str) -> Result<Vec<IdentityLink>> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {LINK_COLUMNS} FROM identity_links WHERE target_id = ?1 ORDER BY seq"
        ))
        .map_err(from_rusqlite)?;
    let links = stmt
        .query_map([target_id], link_from_row)
        .map_err(from_rusqlite)?
        .collect::<rusqlite::Result<Vec<_>>>()
        .map_err(from_rusqlite)?;
    Ok(links)
}

struct SqliteSession {
    key: SessionKey,
    conn: Arc<Mutex<Connection>>,
}

impl Session for SqliteSession {
    fn key(&self) -> SessionKey {
        self.key
    }

    fn load(&mut self, id: &str) -> Result<Option<Record>> {
        let conn = lock(&self.conn)?;
        let record = match self.key {
            SessionKey::Task => query_task(&conn, id)?.map(Record::Task),
            SessionKey::User => query_user(&conn, id)?.map(Record::User),
            SessionKey::IdentityLink => Some(Record::IdentityLinks(query_links(&conn, id)?)),
        };
        Ok(record)
    }
}

struct SqliteUnitOfWork<'a> {
    conn: &'a Connection,
    touched: HashSet<(&'static str, String)>,
}

impl SqliteUnitOfWork<'_> {
    /// `true` the first time an entity is touched in this unit of work
    fn first_touch(&mut self, entity_type: &'static str, id: &str) -> bool {
        self.touched.insert((entity_type, id.to_string()))
    }

    fn update_user(&mut self, user: &User) -> Result<usize> {
        let hash = password_hash(user);
        let changed = if self.first_touch(User::ENTITY_TYPE, &user.id) {
            self.conn.execute(
                "UPDATE users SET first_name = ?2, last_name = ?3, email = ?4,
                    password_hash = ?5, revision = revision + 1
                 WHERE id = ?1 AND revision = ?6",
                params![
                    user.id,
                    user.first_name,
                    user.last_name,
                    user.email,
                    hash,
                    revision_to_sql(user.revision)
                ],
            )
        } else {
            self.conn.execute(
                "UPDATE users SET first_name = ?2, last_name = ?3, email = ?4, password_hash = ?5
                 WHERE id = ?1",
                params![user.id, user.first_name, user.last_name, user.email, hash],
            )
        };
        changed.map_err(from_rusqlite)
    }
}

impl AuditLogSink for SqliteUnitOfWork<'_> {
    fn append(&mut self, record: &AuditRecord) -> Result<()> {
        self.conn
            .execute(
                &format!(
                    "INSERT INTO audit_log ({AUDIT_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"
                ),
                params![
                    record.id,
                    record.operation_type.as_str(),
                    record.entity_type,
                    record.entity_id,
                    record.timestamp,
                    record.actor_id,
                    record.property,
                    record.old_value,
                    record.new_value
                ],
            )
            .map_err(from_rusqlite)?;
        Ok(())
    }
}

impl UnitOfWork for SqliteUnitOfWork<'_> {
    fn apply(&mut self, mutation: &Mutation) -> Result<()> {
        match mutation {
            Mutation::TouchTask { task_id, revision } => {
                if !self.first_touch(Task::ENTITY_TYPE, task_id) {
                    return Ok(());
                }
                let changed = self
                    .conn
                    .execute(
                        "UPDATE tasks SET revision = revision + 1 WHERE id = ?1 AND revision = ?2",
                        params![task_id, revision_to_sql(*revision)],
                    )
                    .map_err(from_rusqlite)?;
                if changed == 0 {
                    return Err(EngineError::concurrency(Task::ENTITY_TYPE, task_id.as_str()));
                }
            }
            Mutation::InsertIdentityLink(link) => {
                self.conn
                    .execute(
                        &format!(
                            "INSERT INTO identity_links ({LINK_COLUMNS})
                             VALUES (?1, ?2, ?3, ?4, ?5, ?6)"
                        ),
                        params![
                            link.id,
                            link.target_id,
                            link.link_type.name(),
                            link.link_type.cardinality().as_str(),
                            link.principal.kind.as_str(),
                            link.principal.id
                        ],
                    )
                    .map_err(from_rusqlite)?;
            }
            Mutation::DeleteIdentityLink { link_id, .. } => {
                let changed = self
                    .conn
                    .execute("DELETE FROM identity_links WHERE id = ?1", [link_id])
                    .map_err(from_rusqlite)?;
                if changed == 0 {
                    return Err(EngineError::concurrency("IdentityLink", link_id.as_str()));
                }
            }
            Mutation::UpdateUser(user) => {
                if self.update_user(user)? == 0 {
                    return Err(EngineError::concurrency(User::ENTITY_TYPE, user.id.as_str()));
                }
            }
        }
        Ok(())
    }
}

impl SessionRegistry for SqliteRegistry {
    fn open_session(&self, key: SessionKey) -> Result<Box<dyn Session>> {
        Ok(Box::new(SqliteSession {
            key,
            conn: self.conn.clone(),
        }))
    }

    fn transact(&self, work: &mut dyn FnMut(&mut dyn UnitOfWork) -> Result<()>) -> Result<()> {
        let mut conn = lock(&self.conn)?;
        let tx = conn.transaction().map_err(from_rusqlite)?;
        {
            let mut uow = SqliteUnitOfWork {
                conn: &tx,
                touched: HashSet::new(),
            };
            // Dropping `tx` on error rolls back
            work(&mut uow)?;
        }
        tx.commit().map_err(from_rusqlite)
    }
}
