//! `SQLite` backend for user storage.
//!
//! Stores one row per user. The roles field and the host profile are kept
//! as JSON text so the grouped and ungrouped shapes round-trip unchanged.
//! Filters, sorting, and paging run in SQL through the JSON1 functions, so a
//! cursor page reads only the rows it returns.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, OptionalExtension, Row, params, params_from_iter};

use crate::models::{
    FindOptions, IdMatch, RolesField, RolesUpdate, SortDirection, SortKey, UpdateOptions,
    UserFilter, UserRecord,
};

use super::cursor::{PageSource, UserCursor};
use super::document;
use super::traits::{StoreError, StoreResult, UserStore};

/// Matches users whose grouped roles hold any of a JSON array of names in
/// one group. Binds the group key, then the names.
const GROUP_ROLE_PREDICATE: &str = "json_type(users.roles) = 'object' AND EXISTS (
    SELECT 1
    FROM json_each(users.roles) AS grp,
         json_each(CASE WHEN grp.type = 'array' THEN grp.value ELSE '[]' END) AS held
    WHERE grp.key = ? AND held.value IN (SELECT value FROM json_each(?))
)";

/// Value of one top-level profile field; binds the field name.
const PROFILE_FIELD: &str = "(SELECT value FROM json_each(users.profile) WHERE key = ?)";

/// SQLite-based user store.
pub struct SqliteUserStore {
    /// Database connection (mutex for interior mutability, shared with open
    /// cursors).
    conn: Arc<Mutex<Connection>>,
}

fn lock_connection(conn: &Mutex<Connection>) -> StoreResult<MutexGuard<'_, Connection>> {
    conn.lock()
        .map_err(|e| StoreError::connection(format!("lock connection: {e}")))
}

/// Pages of one find; each page is its own `LIMIT`/`OFFSET` select.
struct SqlitePages {
    conn: Arc<Mutex<Connection>>,
    filter: UserFilter,
    sort: Vec<SortKey>,
}

impl PageSource for SqlitePages {
    fn fetch_page(&mut self, skip: usize, limit: usize) -> StoreResult<Vec<UserRecord>> {
        let conn = lock_connection(&self.conn)?;
        query_users(&conn, &self.filter, &self.sort, skip, Some(limit))
    }
}

/// Runs a filtered, sorted, paged select and decodes the rows.
///
/// Id and role lists are bound as JSON arrays and expanded with `json_each`,
/// so their length is not bounded by the host-parameter limit. Ties keep
/// insertion order.
fn query_users(
    conn: &Connection,
    filter: &UserFilter,
    sort: &[SortKey],
    skip: usize,
    limit: Option<usize>,
) -> StoreResult<Vec<UserRecord>> {
    let mut sql = String::from("SELECT id, roles, profile FROM users");
    let mut values: Vec<SqlValue> = Vec::new();
    let mut clauses: Vec<&str> = Vec::new();

    match &filter.id {
        None => {},
        Some(IdMatch::Eq(id)) => {
            clauses.push("id = ?");
            values.push(SqlValue::Text(id.clone()));
        },
        Some(IdMatch::In(ids)) => {
            clauses.push("id IN (SELECT value FROM json_each(?))");
            values.push(SqlValue::Text(json_array(ids)?));
        },
    }
    if let Some(predicate) = &filter.roles {
        clauses.push(GROUP_ROLE_PREDICATE);
        values.push(SqlValue::Text(predicate.group.as_str().to_string()));
        values.push(SqlValue::Text(json_array(predicate.roles.names())?));
    }
    if !clauses.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
    }

    sql.push_str(" ORDER BY ");
    for key in sort {
        if key.is_id() {
            sql.push_str("id");
        } else {
            sql.push_str(PROFILE_FIELD);
            values.push(SqlValue::Text(key.field.clone()));
        }
        sql.push_str(match key.direction {
            SortDirection::Ascending => " ASC, ",
            SortDirection::Descending => " DESC, ",
        });
    }
    // A negative limit is unbounded in SQLite.
    sql.push_str("rowid LIMIT ? OFFSET ?");
    values.push(SqlValue::Integer(limit.map_or(-1, to_sql_integer)));
    values.push(SqlValue::Integer(to_sql_integer(skip)));

    let mut stmt = conn.prepare(&sql).map_err(read_error)?;
    let rows = stmt
        .query_map(params_from_iter(values), decode_row)
        .map_err(read_error)?
        .collect::<rusqlite::Result<Vec<_>>>()
        .map_err(read_error)?;

    rows.into_iter().map(RawUser::into_record).collect()
}

fn json_array(names: &[String]) -> StoreResult<String> {
    serde_json::to_string(names).map_err(|e| StoreError::schema(format!("encode list: {e}")))
}

fn to_sql_integer(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

impl SqliteUserStore {
    /// Opens (or creates) a `SQLite` user store at the specified path.
    ///
    /// The schema is not created until [`UserStore::initialize`] is called.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::connection(format!("create {}: {e}", parent.display()))
            })?;
        }

        let conn = Connection::open(path)
            .map_err(|e| StoreError::connection(format!("open {}: {e}", path.display())))?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Creates an in-memory `SQLite` user store (for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be created.
    pub fn in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| StoreError::connection(format!("open in-memory database: {e}")))?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Returns the default database path, `<config dir>/scoped-roles/users.db`.
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        directories::BaseDirs::new().map(|d| d.config_dir().join("scoped-roles").join("users.db"))
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        lock_connection(&self.conn)
    }

    /// Returns `true` if a user with `id` exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be read.
    pub fn contains(&self, id: &str) -> StoreResult<bool> {
        let conn = self.lock()?;
        let found: Option<i64> = conn
            .query_row("SELECT 1 FROM users WHERE id = ?1", params![id], |row| {
                row.get(0)
            })
            .optional()
            .map_err(read_error)?;
        Ok(found.is_some())
    }

    /// Gets the current Unix timestamp as i64 (for `SQLite` compatibility).
    #[allow(clippy::cast_possible_wrap)]
    fn now() -> i64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0)
    }
}

/// Row as stored, before JSON decoding.
struct RawUser {
    id: String,
    roles: Option<String>,
    profile: String,
}

impl RawUser {
    fn into_record(self) -> StoreResult<UserRecord> {
        let roles = self
            .roles
            .as_deref()
            .map(serde_json::from_str::<RolesField>)
            .transpose()
            .map_err(|e| StoreError::schema(format!("decode roles of user {}: {e}", self.id)))?;
        let profile = serde_json::from_str(&self.profile)
            .map_err(|e| StoreError::schema(format!("decode profile of user {}: {e}", self.id)))?;

        Ok(UserRecord {
            id: self.id,
            roles,
            profile,
        })
    }
}

fn decode_row(row: &Row<'_>) -> rusqlite::Result<RawUser> {
    Ok(RawUser {
        id: row.get(0)?,
        roles: row.get(1)?,
        profile: row.get(2)?,
    })
}

fn encode_roles(roles: Option<&RolesField>) -> StoreResult<Option<String>> {
    roles
        .map(serde_json::to_string)
        .transpose()
        .map_err(|e| StoreError::schema(format!("encode roles: {e}")))
}

#[allow(clippy::needless_pass_by_value)]
fn read_error(e: rusqlite::Error) -> StoreError {
    StoreError::read(e.to_string())
}

#[allow(clippy::needless_pass_by_value)]
fn write_error(e: rusqlite::Error) -> StoreError {
    StoreError::write(e.to_string())
}

impl UserStore for SqliteUserStore {
    fn initialize(&self) -> StoreResult<()> {
        let conn = self.lock()?;

        conn.execute_batch(
            r"
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                roles TEXT,
                profile TEXT NOT NULL DEFAULT '{}',
                created_at INTEGER NOT NULL
            );
            ",
        )
        .map_err(|e| StoreError::schema(format!("initialize user schema: {e}")))?;

        tracing::debug!("user store schema ready");
        Ok(())
    }

    fn insert(&self, user: UserRecord) -> StoreResult<()> {
        let conn = self.lock()?;

        let roles = encode_roles(user.roles.as_ref())?;
        let profile = serde_json::to_string(&user.profile)
            .map_err(|e| StoreError::schema(format!("encode profile: {e}")))?;

        conn.execute(
            "INSERT INTO users (id, roles, profile, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![user.id, roles, profile, Self::now()],
        )
        .map_err(|e| {
            if e.to_string().contains("UNIQUE constraint failed") {
                StoreError::write(format!("E11000 duplicate key error: id \"{}\"", user.id))
            } else {
                write_error(e)
            }
        })?;

        Ok(())
    }

    fn find_one(
        &self,
        filter: &UserFilter,
        options: &FindOptions,
    ) -> StoreResult<Option<UserRecord>> {
        let single = FindOptions {
            limit: Some(1),
            ..options.clone()
        };
        self.find(filter, &single)?.next().transpose()
    }

    fn find(&self, filter: &UserFilter, options: &FindOptions) -> StoreResult<UserCursor> {
        let pages = SqlitePages {
            conn: Arc::clone(&self.conn),
            filter: filter.clone(),
            sort: options.sort.clone(),
        };
        Ok(UserCursor::new(pages, options))
    }

    fn update(
        &self,
        filter: &UserFilter,
        update: &RolesUpdate,
        options: UpdateOptions,
    ) -> StoreResult<usize> {
        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(write_error)?;

        let limit = (!options.multi).then_some(1);
        let matched_users = query_users(&tx, filter, &[], 0, limit)?;
        let matched = matched_users.len();
        for user in matched_users {
            // Dropping `tx` on an early return rolls back earlier rows.
            let updated = document::apply_update(user.roles, update)?;
            let encoded = encode_roles(updated.as_ref())?;
            tx.execute(
                "UPDATE users SET roles = ?1 WHERE id = ?2",
                params![encoded, user.id],
            )
            .map_err(write_error)?;
        }

        tx.commit().map_err(write_error)?;
        Ok(matched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{GroupKey, Projection, RoleMatch};
    use tempfile::TempDir;

    fn key(raw: &str) -> GroupKey {
        GroupKey::canonicalize(raw).expect("valid group")
    }

    fn create_store() -> SqliteUserStore {
        let store = SqliteUserStore::in_memory().expect("Failed to create store");
        store.initialize().expect("Failed to initialize schema");
        store
    }

    #[test]
    fn test_initialize_is_idempotent() {
        let store = create_store();
        store.initialize().expect("second initialize");
    }

    #[test]
    fn test_insert_and_find_roundtrip() {
        let store = create_store();
        let user = UserRecord::new("eve")
            .with_profile_field("username", "eve")
            .with_roles(RolesField::grouped().with_group("g1", ["admin", "user"]));
        store.insert(user.clone()).expect("insert");

        let found = store
            .find_one(&UserFilter::by_id("eve"), &FindOptions::default())
            .expect("find")
            .expect("eve exists");
        assert_eq!(found, user);
        assert!(store.contains("eve").expect("contains"));
        assert!(!store.contains("bob").expect("contains"));

        let err = store.insert(UserRecord::new("eve")).expect_err("duplicate");
        assert!(err.message.contains("duplicate key"));
    }

    #[test]
    fn test_update_union_and_lookup_by_role() {
        let store = create_store();
        for id in ["eve", "bob", "joe"] {
            store.insert(UserRecord::new(id)).expect("insert");
        }

        let update = RolesUpdate::AddToSet {
            group: key("g1"),
            roles: vec!["admin".into(), "user".into()],
        };
        let matched = store
            .update(
                &UserFilter::by_ids(vec!["eve".into(), "joe".into()]),
                &update,
                UpdateOptions::multi(),
            )
            .expect("update");
        assert_eq!(matched, 2);

        let filter = UserFilter::default().with_group_roles(key("g1"), RoleMatch::Eq("admin".into()));
        let ids = store
            .find(&filter, &FindOptions::default())
            .expect("find")
            .ids()
            .expect("ids");
        assert_eq!(ids, vec!["eve", "joe"]);

        let projected = store
            .find_one(
                &UserFilter::by_id("eve"),
                &FindOptions::default().with_projection(Projection::GroupRoles(key("g2"))),
            )
            .expect("find")
            .expect("eve exists");
        assert_eq!(projected.roles, Some(RolesField::grouped()));
    }

    #[test]
    fn test_conflict_rolls_back_whole_update() {
        let store = create_store();
        store.insert(UserRecord::new("a")).expect("insert");
        store
            .insert(UserRecord::new("b").with_roles(RolesField::ungrouped(["admin"])))
            .expect("insert");

        let update = RolesUpdate::Set {
            group: key("g1"),
            roles: vec!["user".into()],
        };
        let err = store
            .update(
                &UserFilter::by_ids(vec!["a".into(), "b".into()]),
                &update,
                UpdateOptions::multi(),
            )
            .expect_err("shape conflict");
        assert!(err.message.contains("Cannot create field"));

        let a = store
            .find_one(&UserFilter::by_id("a"), &FindOptions::default())
            .expect("find")
            .expect("a exists");
        assert_eq!(a.roles, None);
    }

    #[test]
    fn test_file_backed_store_persists() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("nested").join("users.db");

        {
            let store = SqliteUserStore::open(&path).expect("open");
            store.initialize().expect("initialize");
            store
                .insert(UserRecord::new("eve").with_roles(RolesField::ungrouped(["legacy"])))
                .expect("insert");
        }

        let store = SqliteUserStore::open(&path).expect("reopen");
        store.initialize().expect("initialize");
        let eve = store
            .find_one(&UserFilter::by_id("eve"), &FindOptions::default())
            .expect("find")
            .expect("eve persisted");
        assert_eq!(eve.roles, Some(RolesField::ungrouped(["legacy"])));
    }

    #[test]
    fn test_update_with_more_ids_than_host_parameters() {
        let store = create_store();
        store.insert(UserRecord::new("eve")).expect("insert");

        let mut ids: Vec<String> = (0..40_000).map(|i| format!("absent-{i}")).collect();
        ids.push("eve".to_string());
        let update = RolesUpdate::AddToSet {
            group: key("g1"),
            roles: vec!["admin".into()],
        };
        let matched = store
            .update(&UserFilter::by_ids(ids.clone()), &update, UpdateOptions::multi())
            .expect("update");
        assert_eq!(matched, 1);

        let found = store
            .find(&UserFilter::by_ids(ids), &FindOptions::default())
            .expect("find")
            .ids()
            .expect("ids");
        assert_eq!(found, vec!["eve"]);
    }

    #[test]
    fn test_find_sorts_and_pages_in_sql() {
        let store = create_store();
        let users = [("u1", "mallory"), ("u2", "alice"), ("u3", "trent"), ("u4", "bob")];
        for (id, name) in users {
            store
                .insert(UserRecord::new(id).with_profile_field("username", name))
                .expect("insert");
        }

        let options = FindOptions {
            sort: vec![SortKey::ascending("username")],
            skip: 1,
            limit: Some(2),
            ..FindOptions::default()
        };
        let ids = store
            .find(&UserFilter::default(), &options)
            .expect("find")
            .ids()
            .expect("ids");
        assert_eq!(ids, vec!["u4", "u1"]);

        let conn = store.lock().expect("lock");
        let sort = [SortKey::descending("id")];
        let page = query_users(&conn, &UserFilter::default(), &sort, 0, Some(1)).expect("query");
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].id, "u4");
    }

    #[test]
    fn test_group_role_predicate_ignores_ungrouped_users() {
        let store = create_store();
        store
            .insert(UserRecord::new("old").with_roles(RolesField::ungrouped(["admin"])))
            .expect("insert");
        store
            .insert(
                UserRecord::new("new")
                    .with_roles(RolesField::grouped().with_group("admin", ["admin"])),
            )
            .expect("insert");

        let filter = UserFilter::default()
            .with_group_roles(key("admin"), RoleMatch::In(vec!["admin".into()]));
        let ids = store
            .find(&filter, &FindOptions::default())
            .expect("find")
            .ids()
            .expect("ids");
        assert_eq!(ids, vec!["new"]);
    }
}
