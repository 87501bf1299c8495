//! In-memory user store for testing.
//!
//! Provides a fast, non-persistent implementation of [`UserStore`] for use
//! in unit tests and development scenarios.

use std::sync::{Arc, RwLock, RwLockReadGuard};

use indexmap::IndexMap;

use crate::models::{
    FindOptions, RolesField, RolesUpdate, SortKey, UpdateOptions, UserFilter, UserRecord,
};

use super::cursor::{PageSource, UserCursor};
use super::document;
use super::traits::{StoreError, StoreResult, UserStore};

/// In-memory user store.
///
/// Uses `RwLock` for thread-safe access with reader-writer semantics.
/// Users are kept in insertion order. Data is not persisted between runs.
///
/// # Example
///
/// ```rust
/// use scoped_roles::models::UserRecord;
/// use scoped_roles::storage::{InMemoryUserStore, UserStore};
///
/// let store = InMemoryUserStore::new();
/// store.insert(UserRecord::new("eve")).unwrap();
/// assert_eq!(store.user_count().unwrap(), 1);
/// ```
#[derive(Debug, Default)]
pub struct InMemoryUserStore {
    users: Arc<RwLock<UserMap>>,
}

type UserMap = IndexMap<String, UserRecord>;

fn read_users(users: &RwLock<UserMap>) -> StoreResult<RwLockReadGuard<'_, UserMap>> {
    users
        .read()
        .map_err(|e| StoreError::connection(format!("user store lock poisoned: {e}")))
}

/// Pages of one find, evaluated against the live map on each fetch.
struct MemoryPages {
    users: Arc<RwLock<UserMap>>,
    filter: UserFilter,
    sort: Vec<SortKey>,
}

impl PageSource for MemoryPages {
    fn fetch_page(&mut self, skip: usize, limit: usize) -> StoreResult<Vec<UserRecord>> {
        let users = read_users(&self.users)?;
        Ok(document::select(
            users.values(),
            &self.filter,
            &self.sort,
            skip,
            Some(limit),
        ))
    }
}

impl InMemoryUserStore {
    /// Creates a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of users stored.
    ///
    /// # Errors
    ///
    /// Returns a connection error if the lock is poisoned.
    pub fn user_count(&self) -> StoreResult<usize> {
        Ok(read_users(&self.users)?.len())
    }
}

impl UserStore for InMemoryUserStore {
    fn initialize(&self) -> StoreResult<()> {
        Ok(())
    }

    fn insert(&self, user: UserRecord) -> StoreResult<()> {
        let mut users = self
            .users
            .write()
            .map_err(|e| StoreError::connection(format!("user store lock poisoned: {e}")))?;

        if users.contains_key(&user.id) {
            return Err(StoreError::write(format!(
                "E11000 duplicate key error: id \"{}\"",
                user.id
            )));
        }

        users.insert(user.id.clone(), user);
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
        let pages = MemoryPages {
            users: Arc::clone(&self.users),
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
        let mut users = self
            .users
            .write()
            .map_err(|e| StoreError::connection(format!("user store lock poisoned: {e}")))?;

        // Compute every new field before writing any, so a conflict leaves
        // all users untouched.
        let mut staged: Vec<(String, Option<RolesField>)> = Vec::new();
        for user in users.values().filter(|u| document::matches(filter, u)) {
            let updated = document::apply_update(user.roles.clone(), update)?;
            staged.push((user.id.clone(), updated));
            if !options.multi {
                break;
            }
        }

        let matched = staged.len();
        for (id, roles) in staged {
            if let Some(user) = users.get_mut(&id) {
                user.roles = roles;
            }
        }

        Ok(matched)
    }
}
